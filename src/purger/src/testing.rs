//! Test doubles for purge callers.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use common::Bucket;

use crate::backup::{BackupArtifact, BackupError, BackupSink};

/// A backup sink whose writes always fail.
#[derive(Debug, Default)]
pub struct FailingBackupSink {
    attempts: AtomicUsize,
}

impl FailingBackupSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of write calls received.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackupSink for FailingBackupSink {
    async fn write(
        &self,
        _buckets: &[Bucket],
        _destination: Option<&str>,
    ) -> Result<BackupArtifact, BackupError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(BackupError::Unavailable("simulated backup failure".to_string()))
    }
}

//! Purge state machine.
//!
//! ```text
//! resolving -> finding --(no matches)--> done_empty
//!                 |
//!                 v
//!             backing_up --(failure)--> aborted_no_delete
//!                 |
//!                 v
//!              deleting --(failure)--> partial_purge
//!                 |
//!                 v
//!             done_purged
//! ```
//!
//! The delete step only runs after the backup has been published. Buckets
//! inserted into the interval between the find and the delete are removed
//! without being part of the backup; the service does not lock the range
//! against concurrent ingestion. A differing delete count is logged.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use common::interval::{self, Granularity, Interval, IntervalError};
use common::{BucketStore, DateRepresentation, StoreError};
use thiserror::Error;

use crate::backup::{BackupArtifact, BackupError, BackupSink};
use crate::metrics::PurgeMetrics;

#[derive(Debug, Error)]
pub enum PurgeError {
    #[error(transparent)]
    Interval(#[from] IntervalError),

    /// Finding the buckets failed; nothing was backed up or deleted.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The backup could not be published; nothing was deleted.
    #[error("Backup failed, no data was deleted: {0}")]
    BackupWriteFailed(#[source] BackupError),

    /// The backup was published but the buckets are still in the store.
    #[error("Data was backed up to '{}' but could not be deleted: {source}", .artifact.path)]
    PartialPurge {
        artifact: BackupArtifact,
        #[source]
        source: StoreError,
    },
}

/// A completed purge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeReport {
    pub interval: Interval,
    /// Buckets found and written to the backup
    pub matched: usize,
    /// Buckets removed by the delete
    pub deleted: u64,
    pub artifact: BackupArtifact,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurgeOutcome {
    /// No bucket lies in the interval; nothing was written or deleted.
    NothingToPurge { interval: Interval },
    Purged(PurgeReport),
}

#[derive(Debug, Clone)]
pub struct PurgeService {
    store: Arc<dyn BucketStore>,
    backup: Arc<dyn BackupSink>,
    metrics: PurgeMetrics,
    tz: Tz,
}

impl PurgeService {
    pub fn new(
        store: Arc<dyn BucketStore>,
        backup: Arc<dyn BackupSink>,
        metrics: PurgeMetrics,
        tz: Tz,
    ) -> Self {
        Self {
            store,
            backup,
            metrics,
            tz,
        }
    }

    pub fn metrics(&self) -> &PurgeMetrics {
        &self.metrics
    }

    /// Purge the interval selected by `granularity`/`value` relative to now.
    pub async fn purge_granularity(
        &self,
        representation: DateRepresentation,
        granularity: Granularity,
        value: i64,
    ) -> Result<PurgeOutcome, PurgeError> {
        let now = Utc::now().with_timezone(&self.tz);
        self.purge_granularity_at(representation, granularity, value, &now)
            .await
    }

    pub async fn purge_granularity_at(
        &self,
        representation: DateRepresentation,
        granularity: Granularity,
        value: i64,
        now: &DateTime<Tz>,
    ) -> Result<PurgeOutcome, PurgeError> {
        tracing::debug!(stage = "resolving", %representation, %granularity, value);
        let interval = interval::resolve(granularity, value, now)?;
        self.purge(representation, interval).await
    }

    /// Purge an explicit `startDate`/`endDate` range.
    pub async fn purge_range(
        &self,
        representation: DateRepresentation,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<PurgeOutcome, PurgeError> {
        tracing::debug!(stage = "resolving", %representation, ?start, ?end);
        let interval = interval::parse_range(start, end, &self.tz)?;
        self.purge(representation, interval).await
    }

    /// Back up and then delete every bucket of `representation` in `interval`.
    pub async fn purge(
        &self,
        representation: DateRepresentation,
        interval: Interval,
    ) -> Result<PurgeOutcome, PurgeError> {
        let started = Instant::now();
        self.metrics.record_started();

        let result = self.run(representation, interval).await;

        self.metrics
            .record_duration_ms(started.elapsed().as_millis() as u64);
        match &result {
            Ok(PurgeOutcome::NothingToPurge { .. }) => self.metrics.record_empty(),
            Ok(PurgeOutcome::Purged(_)) => self.metrics.record_completed(),
            Err(PurgeError::PartialPurge { .. }) => self.metrics.record_partial(),
            Err(_) => self.metrics.record_aborted(),
        }
        result
    }

    async fn run(
        &self,
        representation: DateRepresentation,
        interval: Interval,
    ) -> Result<PurgeOutcome, PurgeError> {
        tracing::debug!(stage = "finding", %representation, %interval);
        let buckets = self
            .store
            .find_in_range(representation, &interval)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    stage = "aborted_no_delete",
                    %representation,
                    %interval,
                    error = %e,
                    "Failed to find buckets"
                );
            })?;

        if buckets.is_empty() {
            tracing::info!(stage = "done_empty", %representation, %interval, "Nothing to purge");
            return Ok(PurgeOutcome::NothingToPurge { interval });
        }

        tracing::debug!(stage = "backing_up", %representation, buckets = buckets.len());
        let artifact = match self.backup.write(&buckets, None).await {
            Ok(artifact) => artifact,
            Err(e) => {
                tracing::error!(
                    stage = "aborted_no_delete",
                    %representation,
                    %interval,
                    error = %e,
                    "Backup failed, nothing deleted"
                );
                return Err(PurgeError::BackupWriteFailed(e));
            }
        };
        self.metrics
            .record_backup(artifact.bucket_count as u64, artifact.size_bytes as u64);

        tracing::debug!(stage = "deleting", %representation, backup = %artifact.path);
        let deleted = match self.store.delete_in_range(representation, &interval).await {
            Ok(deleted) => deleted,
            Err(source) => {
                tracing::error!(
                    stage = "partial_purge",
                    %representation,
                    %interval,
                    backup = %artifact.path,
                    error = %source,
                    "Backed up but failed to delete; data remains in the store"
                );
                return Err(PurgeError::PartialPurge { artifact, source });
            }
        };
        self.metrics.record_deleted(deleted);

        if deleted != buckets.len() as u64 {
            tracing::warn!(
                %representation,
                %interval,
                backed_up = buckets.len(),
                deleted,
                backup = %artifact.path,
                "Deleted bucket count differs from backed up count"
            );
        }

        tracing::info!(
            stage = "done_purged",
            %representation,
            %interval,
            deleted,
            backup = %artifact.path,
            "Purge completed"
        );

        Ok(PurgeOutcome::Purged(PurgeReport {
            interval,
            matched: buckets.len(),
            deleted,
            artifact,
        }))
    }
}

//! Backup artifacts.
//!
//! A backup is the pretty-printed JSON array of the buckets a purge is about
//! to delete, published under `<prefix>/backup_<epoch-millis>.json`. Publishing
//! uses [`PutMode::Create`], so an artifact either appears complete under its
//! final name or not at all, and an existing artifact is never replaced. A
//! purge that lands on a taken name moves on to `backup_<epoch-millis>_<n>`.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use common::Bucket;
use object_store::path::Path;
use object_store::{ObjectStore, PutMode, PutOptions, PutPayload};
use serde::Serialize;
use thiserror::Error;

/// Names tried per millisecond before giving up on a collision
const MAX_NAME_ATTEMPTS: usize = 64;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Failed to serialize backup: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Backup artifact '{0}' already exists")]
    AlreadyExists(String),

    #[error("Failed to write backup artifact '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: object_store::Error,
    },

    #[error("Backup sink unavailable: {0}")]
    Unavailable(String),
}

/// A published backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupArtifact {
    /// File stem, `backup_<epoch-millis>` or `backup_<epoch-millis>_<n>`
    pub id: String,
    /// Location inside the backup object store
    pub path: String,
    pub bucket_count: usize,
    pub size_bytes: usize,
}

/// Destination for backups.
#[async_trait]
pub trait BackupSink: std::fmt::Debug + Send + Sync + 'static {
    /// Publish `buckets` as one artifact. `destination` overrides the
    /// configured prefix.
    async fn write(
        &self,
        buckets: &[Bucket],
        destination: Option<&str>,
    ) -> Result<BackupArtifact, BackupError>;
}

/// Writes backups to an [`ObjectStore`].
#[derive(Debug, Clone)]
pub struct ObjectStoreBackupWriter {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl ObjectStoreBackupWriter {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    fn artifact_path(prefix: &str, id: &str) -> String {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{id}.json")
        } else {
            format!("{prefix}/{id}.json")
        }
    }
}

#[async_trait]
impl BackupSink for ObjectStoreBackupWriter {
    async fn write(
        &self,
        buckets: &[Bucket],
        destination: Option<&str>,
    ) -> Result<BackupArtifact, BackupError> {
        self.write_at(buckets, destination, Utc::now().timestamp_millis())
            .await
    }
}

impl ObjectStoreBackupWriter {
    /// Publish under `backup_<millis>`, falling back to `backup_<millis>_<n>`
    /// while earlier names are taken.
    pub(crate) async fn write_at(
        &self,
        buckets: &[Bucket],
        destination: Option<&str>,
        millis: i64,
    ) -> Result<BackupArtifact, BackupError> {
        let body = Bytes::from(serde_json::to_string_pretty(buckets)?);
        let size_bytes = body.len();
        let prefix = destination.unwrap_or(&self.prefix);

        let mut last_taken = String::new();
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let id = if attempt == 0 {
                format!("backup_{millis}")
            } else {
                format!("backup_{millis}_{attempt}")
            };
            let path = Self::artifact_path(prefix, &id);

            let options = PutOptions {
                mode: PutMode::Create,
                ..Default::default()
            };
            let payload = PutPayload::from(body.clone());

            match self
                .store
                .put_opts(&Path::from(path.as_str()), payload, options)
                .await
            {
                Ok(_) => {
                    tracing::debug!(
                        path = %path,
                        buckets = buckets.len(),
                        size_bytes,
                        attempt,
                        "Published backup artifact"
                    );
                    return Ok(BackupArtifact {
                        id,
                        path,
                        bucket_count: buckets.len(),
                        size_bytes,
                    });
                }
                Err(object_store::Error::AlreadyExists { .. }) => {
                    tracing::debug!(path = %path, "Backup name taken, trying next");
                    last_taken = path;
                }
                Err(source) => return Err(BackupError::Write { path, source }),
            }
        }

        Err(BackupError::AlreadyExists(last_taken))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::DateRepresentation;
    use common::testing::{bucket_on, utc_midnight};
    use object_store::local::LocalFileSystem;
    use object_store::memory::InMemory;

    async fn read(store: &dyn ObjectStore, path: &str) -> String {
        let bytes = store
            .get(&Path::from(path))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_backup_round_trips_buckets() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let writer = ObjectStoreBackupWriter::new(store.clone(), "backups");

        let mut buckets = vec![
            bucket_on(utc_midnight(2024, 1, 1), DateRepresentation::Calendar, 24),
            bucket_on(utc_midnight(2024, 1, 2), DateRepresentation::Epoch, 3),
        ];
        buckets[0].id = Some(7);
        buckets[1].measurements[0].value = 0.1 + 0.2;

        let artifact = writer.write(&buckets, None).await.unwrap();
        assert!(artifact.path.starts_with("backups/backup_"));
        assert!(artifact.path.ends_with(".json"));
        assert_eq!(artifact.bucket_count, 2);

        let body = read(store.as_ref(), &artifact.path).await;
        assert_eq!(body.len(), artifact.size_bytes);
        let restored: Vec<Bucket> = serde_json::from_str(&body).unwrap();
        assert_eq!(restored, buckets);
    }

    #[tokio::test]
    async fn test_backup_format_is_indented_with_stable_field_order() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let writer = ObjectStoreBackupWriter::new(store.clone(), "");

        let mut bucket = bucket_on(utc_midnight(2024, 1, 1), DateRepresentation::Epoch, 1);
        bucket.id = Some(1);
        let artifact = writer.write(&[bucket], None).await.unwrap();
        assert!(!artifact.path.contains('/'));

        let body = read(store.as_ref(), &artifact.path).await;
        assert!(body.starts_with("[\n  {\n    \"id\": 1,\n    \"date\": 1704067200000,"));
        let id_at = body.find("\"id\"").unwrap();
        let date_at = body.find("\"date\"").unwrap();
        let measurements_at = body.find("\"measurements\"").unwrap();
        assert!(id_at < date_at && date_at < measurements_at);
    }

    #[tokio::test]
    async fn test_backup_to_local_filesystem() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let store: Arc<dyn ObjectStore> =
            Arc::new(LocalFileSystem::new_with_prefix(temp_dir.path()).unwrap());
        let writer = ObjectStoreBackupWriter::new(store, "backups");

        let buckets = vec![bucket_on(
            utc_midnight(2024, 6, 1),
            DateRepresentation::Calendar,
            24,
        )];
        let artifact = writer.write(&buckets, Some("archive/june")).await.unwrap();

        let file = temp_dir.path().join(&artifact.path);
        assert!(artifact.path.starts_with("archive/june/backup_"));
        let restored: Vec<Bucket> =
            serde_json::from_str(&std::fs::read_to_string(file).unwrap()).unwrap();
        assert_eq!(restored, buckets);

        // Nothing but the final artifact is left behind
        let entries: Vec<_> = std::fs::read_dir(temp_dir.path().join("archive/june"))
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_same_millisecond_gets_a_distinct_name() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let writer = ObjectStoreBackupWriter::new(store.clone(), "backups");
        let buckets = vec![bucket_on(
            utc_midnight(2024, 1, 1),
            DateRepresentation::Calendar,
            1,
        )];

        let first = writer.write_at(&buckets, None, 1_000).await.unwrap();
        let second = writer.write_at(&buckets, None, 1_000).await.unwrap();
        let third = writer.write_at(&buckets, None, 1_000).await.unwrap();

        assert_eq!(first.path, "backups/backup_1000.json");
        assert_eq!(second.path, "backups/backup_1000_1.json");
        assert_eq!(third.id, "backup_1000_2");
    }

    #[tokio::test]
    async fn test_existing_artifact_is_never_overwritten() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let writer = ObjectStoreBackupWriter::new(store.clone(), "backups");
        let buckets = vec![bucket_on(
            utc_midnight(2024, 1, 1),
            DateRepresentation::Calendar,
            1,
        )];

        let mut taken = vec!["backups/backup_1000.json".to_string()];
        taken.extend(
            (1..MAX_NAME_ATTEMPTS).map(|n| format!("backups/backup_1000_{n}.json")),
        );
        for path in &taken {
            store
                .put(&Path::from(path.as_str()), PutPayload::from_static(b"[]"))
                .await
                .unwrap();
        }

        let result = writer.write_at(&buckets, None, 1_000).await;
        let Err(BackupError::AlreadyExists(path)) = result else {
            panic!("expected a name collision, got {result:?}");
        };
        assert_eq!(path, taken[taken.len() - 1]);
        for path in &taken {
            assert_eq!(read(store.as_ref(), path).await, "[]");
        }
    }
}

//! Purging: back up the buckets of an interval, then delete them.

pub mod backup;
pub mod metrics;
pub mod service;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use backup::{BackupArtifact, BackupError, BackupSink, ObjectStoreBackupWriter};
pub use metrics::{PurgeMetrics, PurgeMetricsSnapshot};
pub use service::{PurgeError, PurgeOutcome, PurgeReport, PurgeService};

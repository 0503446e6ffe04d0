//! Bucket store adapter.
//!
//! Calendar and epoch buckets live in separate collections; every operation
//! names the [`DateRepresentation`] it targets, so a range predicate is never
//! evaluated against dates of the other representation.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::DatabaseConfig;
use crate::interval::Interval;
use crate::model::{Bucket, DateRepresentation};

pub mod memory;
pub mod sql;

pub use memory::InMemoryBucketStore;
pub use sql::SqlBucketStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached or rejected the operation.
    /// Nothing was mutated.
    #[error("Bucket store unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt bucket in collection '{collection}': {message}")]
    Corrupt {
        collection: &'static str,
        message: String,
    },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistent collection of buckets.
#[async_trait]
pub trait BucketStore: std::fmt::Debug + Send + Sync + 'static {
    /// All buckets of `representation` whose date lies in `[interval.start, interval.end)`,
    /// ordered by date and then insertion order.
    async fn find_in_range(
        &self,
        representation: DateRepresentation,
        interval: &Interval,
    ) -> StoreResult<Vec<Bucket>>;

    /// Append one bucket to the collection matching its date representation.
    /// Returns the bucket with its assigned id.
    async fn insert(&self, bucket: Bucket) -> StoreResult<Bucket>;

    /// Delete every bucket of `representation` in the interval with a single
    /// atomic operation. Returns the number of buckets removed.
    async fn delete_in_range(
        &self,
        representation: DateRepresentation,
        interval: &Interval,
    ) -> StoreResult<u64>;

    /// Number of buckets in a collection.
    async fn count(&self, representation: DateRepresentation) -> StoreResult<u64>;

    /// Release connections. Later calls fail with [`StoreError::Unavailable`].
    async fn close(&self);
}

/// Open the store named by `config.dsn`.
///
/// `memory://` selects [`InMemoryBucketStore`]; `sqlite:` and `postgres://`
/// select [`SqlBucketStore`].
pub async fn connect(config: &DatabaseConfig) -> StoreResult<Arc<dyn BucketStore>> {
    if config.dsn.starts_with("memory:") {
        log::info!("Using in-memory bucket store");
        return Ok(Arc::new(InMemoryBucketStore::new()));
    }

    let store = SqlBucketStore::connect(config).await?;
    Ok(Arc::new(store))
}

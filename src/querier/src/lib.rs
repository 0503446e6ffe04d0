//! Retrieval: resolves a calendar selection and returns the buckets inside it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use common::interval::{self, Granularity, Interval, IntervalError};
use common::{Bucket, BucketStore, DateRepresentation, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum QuerierError {
    #[error(transparent)]
    Interval(#[from] IntervalError),
    #[error("Query failed: {0}")]
    QueryFailed(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct RetrievalService {
    store: Arc<dyn BucketStore>,
    tz: Tz,
}

impl RetrievalService {
    pub fn new(store: Arc<dyn BucketStore>, tz: Tz) -> Self {
        Self { store, tz }
    }

    /// Buckets selected by `granularity`/`value` relative to the current time.
    pub async fn query(
        &self,
        representation: DateRepresentation,
        granularity: Granularity,
        value: i64,
    ) -> Result<Vec<Bucket>, QuerierError> {
        let now = Utc::now().with_timezone(&self.tz);
        self.query_at(representation, granularity, value, &now).await
    }

    pub async fn query_at(
        &self,
        representation: DateRepresentation,
        granularity: Granularity,
        value: i64,
        now: &DateTime<Tz>,
    ) -> Result<Vec<Bucket>, QuerierError> {
        let interval = interval::resolve(granularity, value, now)?;
        tracing::debug!(
            %representation,
            %granularity,
            value,
            %interval,
            "Resolved query interval"
        );
        self.query_range(representation, &interval).await
    }

    /// Buckets whose date lies in `interval`.
    pub async fn query_range(
        &self,
        representation: DateRepresentation,
        interval: &Interval,
    ) -> Result<Vec<Bucket>, QuerierError> {
        let buckets = self.store.find_in_range(representation, interval).await?;
        tracing::info!(
            %representation,
            %interval,
            buckets = buckets.len(),
            "Query completed"
        );
        Ok(buckets)
    }
}

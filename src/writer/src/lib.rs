//! Ingestion: synthesizes one day of hourly measurements and commits it as a
//! single bucket.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use common::interval::start_of_day;
use common::{Bucket, BucketDate, BucketStore, DateRepresentation, Measurement, StoreError};
use rand::Rng;

/// Measurements per synthesized bucket, one per hour
pub const MEASUREMENTS_PER_DAY: i64 = 24;

/// Upper bound (exclusive) of synthesized measurement values
const MAX_VALUE: f64 = 100.0;

#[derive(thiserror::Error, Debug)]
pub enum WriterError {
    #[error("Local midnight of {0} is not representable")]
    NoMidnight(String),
    #[error("Failed to insert bucket: {0}")]
    Store(#[from] StoreError),
}

/// Start of the local day containing `now`, and 24 hourly measurements from it.
pub fn synthesize_day<Z: TimeZone, R: Rng + ?Sized>(
    now: &DateTime<Z>,
    rng: &mut R,
) -> Result<(DateTime<Utc>, Vec<Measurement>), WriterError> {
    let day = now.date_naive();
    let midnight = start_of_day(&now.timezone(), day)
        .ok_or_else(|| WriterError::NoMidnight(day.to_string()))?;

    let measurements = (0..MEASUREMENTS_PER_DAY)
        .map(|hour| Measurement {
            timestamp: midnight + TimeDelta::hours(hour),
            value: rng.gen_range(0.0..MAX_VALUE),
        })
        .collect();

    Ok((midnight, measurements))
}

#[derive(Debug, Clone)]
pub struct IngestService {
    store: Arc<dyn BucketStore>,
    tz: Tz,
}

impl IngestService {
    pub fn new(store: Arc<dyn BucketStore>, tz: Tz) -> Self {
        Self { store, tz }
    }

    /// Ingest today's bucket into the collection for `representation`.
    pub async fn ingest(&self, representation: DateRepresentation) -> Result<Bucket, WriterError> {
        let now = Utc::now().with_timezone(&self.tz);
        self.ingest_at(representation, &now).await
    }

    pub async fn ingest_at(
        &self,
        representation: DateRepresentation,
        now: &DateTime<Tz>,
    ) -> Result<Bucket, WriterError> {
        let (midnight, measurements) = synthesize_day(now, &mut rand::thread_rng())?;
        let bucket = Bucket::new(BucketDate::from_instant(midnight, representation), measurements);

        let inserted = self.store.insert(bucket).await.inspect_err(|e| {
            tracing::error!(%representation, error = %e, "Failed to insert bucket");
        })?;

        tracing::info!(
            %representation,
            id = ?inserted.id,
            date = %midnight.to_rfc3339(),
            measurements = inserted.measurements.len(),
            "Inserted bucket"
        );
        Ok(inserted)
    }
}

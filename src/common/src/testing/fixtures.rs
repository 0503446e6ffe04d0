use chrono::{DateTime, TimeDelta, TimeZone, Utc};

use crate::model::{Bucket, BucketDate, DateRepresentation, Measurement};
use crate::store::BucketStore;

/// A fixed "now" (2024-02-10 13:45:30 UTC) for deterministic interval tests.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 10, 13, 45, 30)
        .single()
        .expect("valid fixed timestamp")
}

pub fn utc_midnight(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .expect("valid calendar date")
}

/// A bucket for `day` holding `hours` hourly measurements with distinct values.
pub fn bucket_on(day: DateTime<Utc>, representation: DateRepresentation, hours: i64) -> Bucket {
    let measurements = (0..hours)
        .map(|hour| Measurement {
            timestamp: day + TimeDelta::hours(hour),
            value: hour as f64 * 1.25 + day.timestamp() as f64 / 1e9,
        })
        .collect();
    Bucket::new(BucketDate::from_instant(day, representation), measurements)
}

/// Insert one 24-measurement bucket per day; returns them with assigned ids.
pub async fn seed_days(
    store: &dyn BucketStore,
    representation: DateRepresentation,
    days: &[DateTime<Utc>],
) -> Vec<Bucket> {
    let mut inserted = Vec::with_capacity(days.len());
    for day in days {
        let bucket = store
            .insert(bucket_on(*day, representation, 24))
            .await
            .expect("seed insert");
        inserted.push(bucket);
    }
    inserted
}

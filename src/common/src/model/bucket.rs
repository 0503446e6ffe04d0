use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A single sampled value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// The collection a bucket lives in, decided by how its `date` is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateRepresentation {
    /// `date` is a calendar instant
    Calendar,
    /// `date` is an integer count of milliseconds since the Unix epoch
    Epoch,
}

impl DateRepresentation {
    /// Name of the backing table/collection.
    pub fn collection(&self) -> &'static str {
        match self {
            DateRepresentation::Calendar => "buckets",
            DateRepresentation::Epoch => "buckets_unix",
        }
    }
}

impl fmt::Display for DateRepresentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateRepresentation::Calendar => write!(f, "calendar"),
            DateRepresentation::Epoch => write!(f, "epoch"),
        }
    }
}

/// Start of the day a bucket covers.
///
/// Serialized untagged: calendar dates as RFC 3339 strings, epoch dates as
/// plain integers, so the JSON form is exactly what the collection holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BucketDate {
    Calendar(DateTime<Utc>),
    Epoch(i64),
}

impl BucketDate {
    pub fn representation(&self) -> DateRepresentation {
        match self {
            BucketDate::Calendar(_) => DateRepresentation::Calendar,
            BucketDate::Epoch(_) => DateRepresentation::Epoch,
        }
    }

    /// Build a date in the given representation from an instant.
    pub fn from_instant(instant: DateTime<Utc>, representation: DateRepresentation) -> Self {
        match representation {
            DateRepresentation::Calendar => BucketDate::Calendar(instant),
            DateRepresentation::Epoch => BucketDate::Epoch(instant.timestamp_millis()),
        }
    }

    pub fn timestamp_millis(&self) -> i64 {
        match self {
            BucketDate::Calendar(instant) => instant.timestamp_millis(),
            BucketDate::Epoch(millis) => *millis,
        }
    }

    /// The instant this date denotes, if it is representable.
    pub fn to_instant(&self) -> Option<DateTime<Utc>> {
        match self {
            BucketDate::Calendar(instant) => Some(*instant),
            BucketDate::Epoch(millis) => Utc.timestamp_millis_opt(*millis).single(),
        }
    }
}

/// One day's worth of measurements; the unit of storage and deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    /// Assigned by the store on insert
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub date: BucketDate,
    pub measurements: Vec<Measurement>,
}

impl Bucket {
    pub fn new(date: BucketDate, measurements: Vec<Measurement>) -> Self {
        Self {
            id: None,
            date,
            measurements,
        }
    }

    pub fn representation(&self) -> DateRepresentation {
        self.date.representation()
    }
}

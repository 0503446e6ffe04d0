pub mod cli;
pub mod config;
pub mod interval;
pub mod model;
pub mod storage;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use interval::{EpochInterval, Granularity, Interval, IntervalError};
pub use model::{Bucket, BucketDate, DateRepresentation, Measurement};
pub use store::{BucketStore, StoreError};

pub mod bucket;

pub use bucket::{Bucket, BucketDate, DateRepresentation, Measurement};

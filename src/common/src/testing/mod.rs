//! Test utilities for bucketdb.
//!
//! Only available when the `testing` feature is enabled or during tests:
//!
//! ```toml
//! [dev-dependencies]
//! common = { path = "../common", features = ["testing"] }
//! ```

mod fixtures;

pub use fixtures::{bucket_on, fixed_now, seed_days, utc_midnight};

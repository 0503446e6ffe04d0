use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{BucketStore, StoreError, StoreResult};
use crate::interval::Interval;
use crate::model::{Bucket, BucketDate, DateRepresentation};

/// In-memory bucket store.
///
/// Used for `memory://` deployments and tests. Individual operations can be
/// made to fail to exercise error paths of callers.
#[derive(Debug, Default)]
pub struct InMemoryBucketStore {
    collections: Mutex<Collections>,
    fail_inserts: AtomicBool,
    fail_finds: AtomicBool,
    fail_deletes: AtomicBool,
    closed: AtomicBool,
}

#[derive(Debug, Default)]
struct Collections {
    next_id: i64,
    calendar: Vec<Bucket>,
    epoch: Vec<Bucket>,
}

impl Collections {
    fn get(&self, representation: DateRepresentation) -> &Vec<Bucket> {
        match representation {
            DateRepresentation::Calendar => &self.calendar,
            DateRepresentation::Epoch => &self.epoch,
        }
    }

    fn get_mut(&mut self, representation: DateRepresentation) -> &mut Vec<Bucket> {
        match representation {
            DateRepresentation::Calendar => &mut self.calendar,
            DateRepresentation::Epoch => &mut self.epoch,
        }
    }
}

fn in_range(date: &BucketDate, interval: &Interval) -> bool {
    match date {
        BucketDate::Calendar(instant) => interval.contains(instant),
        BucketDate::Epoch(millis) => interval.to_epoch().contains(*millis),
    }
}

impl InMemoryBucketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_finds(&self, fail: bool) {
        self.fail_finds.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Copy of every bucket in a collection, in insertion order.
    pub async fn snapshot(&self, representation: DateRepresentation) -> Vec<Bucket> {
        self.collections.lock().await.get(representation).clone()
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is closed".to_string()));
        }
        Ok(())
    }

    fn check(&self, flag: &AtomicBool, operation: &str) -> StoreResult<()> {
        self.ensure_open()?;
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "simulated {operation} failure"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl BucketStore for InMemoryBucketStore {
    async fn find_in_range(
        &self,
        representation: DateRepresentation,
        interval: &Interval,
    ) -> StoreResult<Vec<Bucket>> {
        self.check(&self.fail_finds, "find")?;

        let collections = self.collections.lock().await;
        let mut found: Vec<Bucket> = collections
            .get(representation)
            .iter()
            .filter(|bucket| in_range(&bucket.date, interval))
            .cloned()
            .collect();
        found.sort_by_key(|bucket| (bucket.date.timestamp_millis(), bucket.id));
        Ok(found)
    }

    async fn insert(&self, mut bucket: Bucket) -> StoreResult<Bucket> {
        self.check(&self.fail_inserts, "insert")?;

        let mut collections = self.collections.lock().await;
        collections.next_id += 1;
        bucket.id = Some(collections.next_id);
        collections
            .get_mut(bucket.representation())
            .push(bucket.clone());
        Ok(bucket)
    }

    async fn delete_in_range(
        &self,
        representation: DateRepresentation,
        interval: &Interval,
    ) -> StoreResult<u64> {
        self.check(&self.fail_deletes, "delete")?;

        let mut collections = self.collections.lock().await;
        let buckets = collections.get_mut(representation);
        let before = buckets.len();
        buckets.retain(|bucket| !in_range(&bucket.date, interval));
        Ok((before - buckets.len()) as u64)
    }

    async fn count(&self, representation: DateRepresentation) -> StoreResult<u64> {
        self.ensure_open()?;
        Ok(self.collections.lock().await.get(representation).len() as u64)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

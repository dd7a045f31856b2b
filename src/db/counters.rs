use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::{
    error::AppResult,
    models::{BucketId, CounterRow},
};

/// Trait for trending play-counter storage
///
/// Counters are keyed by (bucket, item id) and never decrease. Stores that can
/// increment atomically override [`CounterStore::increment`]; the aggregator
/// falls back to a serialized read-modify-write otherwise.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CounterStore: Send + Sync {
    async fn read(&self, bucket: &BucketId, item_id: &str) -> AppResult<Option<u64>>;

    async fn write(&self, bucket: &BucketId, item_id: &str, count: u64) -> AppResult<()>;

    async fn read_bucket(&self, bucket: &BucketId) -> AppResult<Vec<CounterRow>>;

    async fn read_all(&self) -> AppResult<Vec<CounterRow>>;

    /// Atomically adds one and returns the new count, or `None` when the
    /// store has no atomic primitive
    async fn increment(&self, _bucket: &BucketId, _item_id: &str) -> AppResult<Option<u64>> {
        Ok(None)
    }
}

/// In-process counter store
pub struct MemoryCounterStore {
    counters: Mutex<HashMap<(BucketId, String), u64>>,
    atomic_increment: bool,
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            atomic_increment: true,
        }
    }

    /// A store that only offers read and write, like a plain key-value backend
    pub fn without_increment() -> Self {
        Self {
            atomic_increment: false,
            ..Self::new()
        }
    }
}

fn rows<'a>(entries: impl Iterator<Item = (&'a (BucketId, String), &'a u64)>) -> Vec<CounterRow> {
    entries
        .map(|((bucket, item_id), count)| CounterRow {
            bucket: bucket.clone(),
            item_id: item_id.clone(),
            count: *count,
        })
        .collect()
}

#[async_trait::async_trait]
impl CounterStore for MemoryCounterStore {
    async fn read(&self, bucket: &BucketId, item_id: &str) -> AppResult<Option<u64>> {
        let counters = self.counters.lock().await;
        Ok(counters.get(&(bucket.clone(), item_id.to_string())).copied())
    }

    async fn write(&self, bucket: &BucketId, item_id: &str, count: u64) -> AppResult<()> {
        self.counters
            .lock()
            .await
            .insert((bucket.clone(), item_id.to_string()), count);
        Ok(())
    }

    async fn read_bucket(&self, bucket: &BucketId) -> AppResult<Vec<CounterRow>> {
        let counters = self.counters.lock().await;
        Ok(rows(counters.iter().filter(|((b, _), _)| b == bucket)))
    }

    async fn read_all(&self) -> AppResult<Vec<CounterRow>> {
        let counters = self.counters.lock().await;
        Ok(rows(counters.iter()))
    }

    async fn increment(&self, bucket: &BucketId, item_id: &str) -> AppResult<Option<u64>> {
        if !self.atomic_increment {
            return Ok(None);
        }
        let mut counters = self.counters.lock().await;
        let count = counters
            .entry((bucket.clone(), item_id.to_string()))
            .or_insert(0);
        *count += 1;
        Ok(Some(*count))
    }
}

//! Play counters and trending rankings.
//!
//! Plays are counted per ISO-week bucket. Rankings cover either one bucket
//! (current period) or the sum over all buckets (all time), highest count
//! first with ties broken by item id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::instrument;

use crate::{
    db::{CatalogStore, CounterStore},
    error::AppResult,
    models::{BucketId, CounterRow, TrendingEntry},
};

type CounterKey = (BucketId, String);
type KeyLocks = Mutex<HashMap<CounterKey, Arc<tokio::sync::Mutex<()>>>>;

/// A caller's share of a per-key lock. Dropping the last share removes the
/// entry, including when the owning future is cancelled mid-increment.
struct KeyLock<'a> {
    locks: &'a KeyLocks,
    key: CounterKey,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl<'a> KeyLock<'a> {
    fn acquire(locks: &'a KeyLocks, key: CounterKey) -> Self {
        let lock = locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_default()
            .clone();
        Self { locks, key, lock }
    }
}

impl Drop for KeyLock<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // The map's share plus this one
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 2)
        {
            locks.remove(&self.key);
        }
    }
}

pub struct TrendingAggregator {
    counters: Arc<dyn CounterStore>,
    catalog: Arc<dyn CatalogStore>,
    /// One async lock per counter currently being incremented
    key_locks: KeyLocks,
}

impl TrendingAggregator {
    pub fn new(counters: Arc<dyn CounterStore>, catalog: Arc<dyn CatalogStore>) -> Self {
        Self {
            counters,
            catalog,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Counts one play of `item_id` in `bucket` and returns the new count.
    ///
    /// Uses the store's atomic increment when it has one. Otherwise the
    /// read-modify-write runs under a per-key lock, so increments through
    /// this aggregator never overwrite each other.
    #[instrument(skip(self))]
    pub async fn record_play(&self, item_id: &str, bucket: &BucketId) -> AppResult<u64> {
        let count = match self.counters.increment(bucket, item_id).await? {
            Some(count) => count,
            None => self.serialized_increment(bucket, item_id).await?,
        };

        tracing::info!(item_id = %item_id, bucket = %bucket, count, "Recorded play");
        Ok(count)
    }

    async fn serialized_increment(&self, bucket: &BucketId, item_id: &str) -> AppResult<u64> {
        let key_lock = KeyLock::acquire(&self.key_locks, (bucket.clone(), item_id.to_string()));
        let _guard = key_lock.lock.lock().await;
        self.read_modify_write(bucket, item_id).await
    }

    async fn read_modify_write(&self, bucket: &BucketId, item_id: &str) -> AppResult<u64> {
        let next = self.counters.read(bucket, item_id).await?.unwrap_or(0) + 1;
        self.counters.write(bucket, item_id, next).await?;
        Ok(next)
    }

    /// Top `k` items by plays in the current week
    pub async fn top_current_period(&self, k: usize) -> AppResult<Vec<TrendingEntry>> {
        self.top_in_bucket(&BucketId::current(), k).await
    }

    #[instrument(skip(self))]
    pub async fn top_in_bucket(
        &self,
        bucket: &BucketId,
        k: usize,
    ) -> AppResult<Vec<TrendingEntry>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let rows = self.counters.read_bucket(bucket).await?;
        self.enrich(rank(rows, k)).await
    }

    /// Top `k` items by plays summed over every bucket
    #[instrument(skip(self))]
    pub async fn top_all_time(&self, k: usize) -> AppResult<Vec<TrendingEntry>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let rows = self.counters.read_all().await?;
        self.enrich(rank(rows, k)).await
    }

    /// Attaches catalog records. Ids without a record are dropped, so fewer
    /// than `k` entries may come back.
    async fn enrich(&self, ranked: Vec<(String, u64)>) -> AppResult<Vec<TrendingEntry>> {
        let mut entries = Vec::with_capacity(ranked.len());
        for (item_id, plays) in ranked {
            match self.catalog.get_by_id(&item_id).await? {
                Some(item) => entries.push(TrendingEntry { item, plays }),
                None => tracing::debug!(item_id = %item_id, "Trending item missing from catalog"),
            }
        }
        Ok(entries)
    }
}

/// Sums counts per item, then orders by count desc, item id asc
fn rank(rows: Vec<CounterRow>, k: usize) -> Vec<(String, u64)> {
    let mut totals: HashMap<String, u64> = HashMap::new();
    for row in rows {
        *totals.entry(row.item_id).or_default() += row.count;
    }

    let mut ranked: Vec<(String, u64)> = totals.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(k);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::counters::MockCounterStore;
    use crate::db::{MemoryCatalog, MemoryCounterStore};
    use crate::error::AppError;
    use crate::models::CatalogItem;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use tokio::sync::Barrier;

    fn catalog(ids: &[&str]) -> Arc<MemoryCatalog> {
        Arc::new(MemoryCatalog::new(ids.iter().map(|id| CatalogItem {
            item_id: id.to_string(),
            title: format!("Title {}", id),
            ..Default::default()
        })))
    }

    fn entry_ids(entries: &[TrendingEntry]) -> Vec<(&str, u64)> {
        entries
            .iter()
            .map(|e| (e.item.item_id.as_str(), e.plays))
            .collect()
    }

    #[tokio::test]
    async fn test_record_play_twice_yields_two() {
        for store in [
            MemoryCounterStore::new(),
            MemoryCounterStore::without_increment(),
        ] {
            let store = Arc::new(store);
            let aggregator = TrendingAggregator::new(store.clone(), catalog(&["mov_1"]));
            let bucket = BucketId::from("2024-W10");

            assert_eq!(aggregator.record_play("mov_1", &bucket).await.unwrap(), 1);
            assert_eq!(aggregator.record_play("mov_1", &bucket).await.unwrap(), 2);
            assert_eq!(store.read(&bucket, "mov_1").await.unwrap(), Some(2));
        }
    }

    /// A store without atomic increments whose reads all complete before any
    /// caller gets to write
    struct InterleavingStore {
        inner: MemoryCounterStore,
        barrier: Barrier,
    }

    #[async_trait::async_trait]
    impl CounterStore for InterleavingStore {
        async fn read(&self, bucket: &BucketId, item_id: &str) -> AppResult<Option<u64>> {
            let count = self.inner.read(bucket, item_id).await;
            self.barrier.wait().await;
            count
        }

        async fn write(&self, bucket: &BucketId, item_id: &str, count: u64) -> AppResult<()> {
            self.inner.write(bucket, item_id, count).await
        }

        async fn read_bucket(&self, bucket: &BucketId) -> AppResult<Vec<CounterRow>> {
            self.inner.read_bucket(bucket).await
        }

        async fn read_all(&self) -> AppResult<Vec<CounterRow>> {
            self.inner.read_all().await
        }
    }

    #[tokio::test]
    async fn test_unserialized_writers_lose_increments() {
        // Separate aggregators stand in for separate processes: their key
        // locks are not shared, so nothing orders the read-modify-writes.
        const WRITERS: usize = 8;
        let store = Arc::new(InterleavingStore {
            inner: MemoryCounterStore::without_increment(),
            barrier: Barrier::new(WRITERS),
        });
        let bucket = BucketId::from("2024-W10");

        let tasks: Vec<_> = (0..WRITERS)
            .map(|_| {
                let aggregator = TrendingAggregator::new(store.clone(), catalog(&["mov_1"]));
                let bucket = bucket.clone();
                tokio::spawn(async move { aggregator.record_play("mov_1", &bucket).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let count = store.read_all().await.unwrap()[0].count;
        assert!(count < WRITERS as u64, "lost-increment hazard not reproduced");
        assert_eq!(count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_serialized_increments_are_exact() {
        const PLAYS: u64 = 50;
        let store = Arc::new(MemoryCounterStore::without_increment());
        let aggregator = Arc::new(TrendingAggregator::new(store.clone(), catalog(&["mov_1"])));
        let bucket = BucketId::from("2024-W10");

        let tasks: Vec<_> = (0..PLAYS)
            .map(|_| {
                let aggregator = aggregator.clone();
                let bucket = bucket.clone();
                tokio::spawn(async move { aggregator.record_play("mov_1", &bucket).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.read(&bucket, "mov_1").await.unwrap(), Some(PLAYS));
        assert!(aggregator.key_locks.lock().unwrap().is_empty());
    }

    /// A store without atomic increments whose reads never complete
    #[derive(Default)]
    struct StalledStore {
        reads: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl CounterStore for StalledStore {
        async fn read(&self, _bucket: &BucketId, _item_id: &str) -> AppResult<Option<u64>> {
            self.reads.fetch_add(1, AtomicOrdering::SeqCst);
            std::future::pending().await
        }

        async fn write(&self, _bucket: &BucketId, _item_id: &str, _count: u64) -> AppResult<()> {
            Ok(())
        }

        async fn read_bucket(&self, _bucket: &BucketId) -> AppResult<Vec<CounterRow>> {
            Ok(Vec::new())
        }

        async fn read_all(&self) -> AppResult<Vec<CounterRow>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_cancelled_plays_release_key_locks() {
        const PLAYS: usize = 100;
        let store = Arc::new(StalledStore::default());
        let aggregator = Arc::new(TrendingAggregator::new(store.clone(), catalog(&[])));
        let bucket = BucketId::from("2024-W10");

        let tasks: Vec<_> = (0..PLAYS)
            .map(|n| {
                let aggregator = aggregator.clone();
                let bucket = bucket.clone();
                // Half the plays share a key, so some wait on a held lock
                let item_id = if n % 2 == 0 {
                    "mov_shared".to_string()
                } else {
                    format!("mov_{}", n)
                };
                tokio::spawn(async move { aggregator.record_play(&item_id, &bucket).await })
            })
            .collect();

        // One stalled read per distinct key: the shared key plus each odd play
        while store.reads.load(AtomicOrdering::SeqCst) < PLAYS / 2 + 1 {
            tokio::task::yield_now().await;
        }
        assert_eq!(aggregator.key_locks.lock().unwrap().len(), PLAYS / 2 + 1);

        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            assert!(task.await.unwrap_err().is_cancelled());
        }

        assert!(aggregator.key_locks.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_atomic_increments_are_exact() {
        const PLAYS: u64 = 50;
        let store = Arc::new(MemoryCounterStore::new());
        let bucket = BucketId::from("2024-W10");

        let tasks: Vec<_> = (0..PLAYS)
            .map(|_| {
                let aggregator = TrendingAggregator::new(store.clone(), catalog(&["mov_1"]));
                let bucket = bucket.clone();
                tokio::spawn(async move { aggregator.record_play("mov_1", &bucket).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.read(&bucket, "mov_1").await.unwrap(), Some(PLAYS));
    }

    #[tokio::test]
    async fn test_all_time_sums_across_buckets() {
        let store = Arc::new(MemoryCounterStore::new());
        store.write(&"2024-W01".into(), "mov_1", 3).await.unwrap();
        store.write(&"2024-W02".into(), "mov_1", 4).await.unwrap();
        store.write(&"2024-W01".into(), "mov_2", 5).await.unwrap();
        let aggregator = TrendingAggregator::new(store, catalog(&["mov_1", "mov_2"]));

        let top = tokio_test::assert_ok!(aggregator.top_all_time(10).await);

        assert_eq!(entry_ids(&top), vec![("mov_1", 7), ("mov_2", 5)]);
    }

    #[tokio::test]
    async fn test_bucket_ranking_ties_break_on_item_id() {
        let store = Arc::new(MemoryCounterStore::new());
        let bucket = BucketId::from("2024-W10");
        store.write(&bucket, "mov_3", 2).await.unwrap();
        store.write(&bucket, "mov_2", 2).await.unwrap();
        store.write(&bucket, "mov_1", 9).await.unwrap();
        store.write(&"2024-W09".into(), "mov_3", 100).await.unwrap();
        let aggregator = TrendingAggregator::new(store, catalog(&["mov_1", "mov_2", "mov_3"]));

        let top = aggregator.top_in_bucket(&bucket, 3).await.unwrap();

        assert_eq!(
            entry_ids(&top),
            vec![("mov_1", 9), ("mov_2", 2), ("mov_3", 2)]
        );
    }

    #[tokio::test]
    async fn test_current_period_reads_current_bucket() {
        let store = Arc::new(MemoryCounterStore::new());
        let aggregator = TrendingAggregator::new(store.clone(), catalog(&["mov_1"]));

        aggregator
            .record_play("mov_1", &BucketId::current())
            .await
            .unwrap();
        store.write(&"1999-W01".into(), "mov_1", 40).await.unwrap();

        let top = aggregator.top_current_period(5).await.unwrap();
        assert_eq!(entry_ids(&top), vec![("mov_1", 1)]);
    }

    #[tokio::test]
    async fn test_missing_catalog_records_dropped_after_cut() {
        let store = Arc::new(MemoryCounterStore::new());
        let bucket = BucketId::from("2024-W10");
        store.write(&bucket, "gone", 9).await.unwrap();
        store.write(&bucket, "mov_2", 5).await.unwrap();
        store.write(&bucket, "mov_3", 3).await.unwrap();
        let aggregator = TrendingAggregator::new(store, catalog(&["mov_2", "mov_3"]));

        let top = aggregator.top_in_bucket(&bucket, 2).await.unwrap();

        assert_eq!(entry_ids(&top), vec![("mov_2", 5)]);
    }

    #[tokio::test]
    async fn test_zero_k_is_empty() {
        let mut counters = MockCounterStore::new();
        counters.expect_read_all().never();
        let aggregator = TrendingAggregator::new(Arc::new(counters), catalog(&[]));

        assert!(aggregator.top_all_time(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_counter_store_failure_is_surfaced() {
        let mut counters = MockCounterStore::new();
        counters
            .expect_read_all()
            .returning(|| Err(AppError::backend("counter_store.read_all", "connection refused")));
        let aggregator = TrendingAggregator::new(Arc::new(counters), catalog(&[]));

        let err = tokio_test::assert_err!(aggregator.top_all_time(10).await);
        assert_eq!(err.operation(), Some("counter_store.read_all"));
    }

    #[test]
    fn test_rank_sparse_sum() {
        let rows = vec![
            CounterRow {
                bucket: "w1".into(),
                item_id: "a".to_string(),
                count: 1,
            },
            CounterRow {
                bucket: "w2".into(),
                item_id: "b".to_string(),
                count: 2,
            },
            CounterRow {
                bucket: "w3".into(),
                item_id: "a".to_string(),
                count: 2,
            },
        ];
        assert_eq!(rank(rows, 1), vec![("a".to_string(), 3)]);
    }
}

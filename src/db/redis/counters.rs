use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use tracing::instrument;

use crate::{
    db::counters::CounterStore,
    error::{AppResult, BackendContext},
    models::{BucketId, CounterRow},
};

const KEY_PREFIX: &str = "trending:";
/// Set of every bucket that has ever been written
const BUCKETS_KEY: &str = "trending:buckets";

fn bucket_key(bucket: &BucketId) -> String {
    format!("{}{}", KEY_PREFIX, bucket)
}

/// Play counters stored as one Redis hash per bucket (`trending:{bucket}`,
/// field = item id), incremented with `HINCRBY`
#[derive(Clone)]
pub struct RedisCounterStore {
    redis_client: Client,
}

impl RedisCounterStore {
    pub fn new(redis_client: Client) -> Self {
        Self { redis_client }
    }

    async fn connection(
        &self,
        operation: &'static str,
    ) -> AppResult<redis::aio::MultiplexedConnection> {
        self.redis_client
            .get_multiplexed_async_connection()
            .await
            .during(operation)
    }
}

fn rows(bucket: &BucketId, counts: HashMap<String, u64>) -> Vec<CounterRow> {
    counts
        .into_iter()
        .map(|(item_id, count)| CounterRow {
            bucket: bucket.clone(),
            item_id,
            count,
        })
        .collect()
}

#[async_trait::async_trait]
impl CounterStore for RedisCounterStore {
    async fn read(&self, bucket: &BucketId, item_id: &str) -> AppResult<Option<u64>> {
        let mut conn = self.connection("counter_store.read").await?;
        conn.hget(bucket_key(bucket), item_id)
            .await
            .during("counter_store.read")
    }

    async fn write(&self, bucket: &BucketId, item_id: &str, count: u64) -> AppResult<()> {
        let mut conn = self.connection("counter_store.write").await?;
        redis::pipe()
            .atomic()
            .hset(bucket_key(bucket), item_id, count)
            .ignore()
            .sadd(BUCKETS_KEY, bucket.as_str())
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .during("counter_store.write")
    }

    async fn read_bucket(&self, bucket: &BucketId) -> AppResult<Vec<CounterRow>> {
        let mut conn = self.connection("counter_store.read_bucket").await?;
        let counts: HashMap<String, u64> = conn
            .hgetall(bucket_key(bucket))
            .await
            .during("counter_store.read_bucket")?;
        Ok(rows(bucket, counts))
    }

    #[instrument(skip(self))]
    async fn read_all(&self) -> AppResult<Vec<CounterRow>> {
        let mut conn = self.connection("counter_store.read_all").await?;
        let buckets: Vec<String> = conn
            .smembers(BUCKETS_KEY)
            .await
            .during("counter_store.read_all")?;

        let mut all = Vec::new();
        for bucket in buckets.into_iter().map(BucketId::from) {
            let counts: HashMap<String, u64> = conn
                .hgetall(bucket_key(&bucket))
                .await
                .during("counter_store.read_all")?;
            all.extend(rows(&bucket, counts));
        }

        tracing::debug!(rows = all.len(), "Read all trending counters");
        Ok(all)
    }

    async fn increment(&self, bucket: &BucketId, item_id: &str) -> AppResult<Option<u64>> {
        let mut conn = self.connection("counter_store.increment").await?;
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .hincr(bucket_key(bucket), item_id, 1)
            .sadd(BUCKETS_KEY, bucket.as_str())
            .ignore()
            .query_async(&mut conn)
            .await
            .during("counter_store.increment")?;
        Ok(Some(count))
    }
}

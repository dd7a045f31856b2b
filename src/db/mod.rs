pub mod catalog;
pub mod counters;
pub mod postgres;
pub mod redis;

pub use catalog::{CatalogStore, MemoryCatalog};
pub use counters::{CounterStore, MemoryCounterStore};
pub use postgres::{create_pool, PgCatalogStore};
pub use redis::{create_redis_client, Cache, CacheKey, CacheWriterHandle, RedisCounterStore};

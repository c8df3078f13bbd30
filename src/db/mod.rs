pub mod edge_store;
pub mod postgres;
pub mod redis;

pub use edge_store::{EdgeStore, InMemoryEdgeStore};
pub use postgres::{create_pool, PgEdgeStore};
pub use self::redis::create_redis_client;
pub use self::redis::Cache;
pub use self::redis::CacheKey;

//! Cache revalidation adapters

pub mod redis_revalidator;

pub use redis_revalidator::{CacheError, RedisRevalidator, STALE_MESSAGE};

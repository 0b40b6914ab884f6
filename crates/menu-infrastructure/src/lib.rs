//! # Menu Infrastructure
//! 
//! Store and cache implementations (adapters) for the menu tree engine.

pub mod database;
pub mod cache;

pub use database::{create_pool, run_migrations, InMemoryMenuStore, PgMenuStore};
pub use cache::RedisRevalidator;

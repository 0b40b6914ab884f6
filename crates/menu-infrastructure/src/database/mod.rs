//! Database module (store adapters)

pub mod connection;
pub mod postgres;
pub mod memory;

pub use connection::{create_pool, run_migrations};
pub use postgres::PgMenuStore;
pub use memory::InMemoryMenuStore;

//! In-memory store implementation

pub mod keyed_lock;
pub mod menu_store_impl;

pub use keyed_lock::KeyedLocks;
pub use menu_store_impl::{InMemoryMenuStore, MemoryMenuTransaction};

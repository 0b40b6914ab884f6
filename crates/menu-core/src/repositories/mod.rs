//! Repository traits (ports)

pub mod menu_store;
pub mod revalidator;

pub use menu_store::{ChildrenSource, MenuStore, MenuTransaction};
pub use revalidator::{MenuRevalidator, NoopRevalidator};

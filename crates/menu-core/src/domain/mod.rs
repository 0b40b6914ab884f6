//! # Menu Core - Domain Module
//! 
//! Domain entities for the menu tree.

pub mod section;
pub mod item;
pub mod tree;
pub mod commands;

// Re-export all entities and enums
pub use section::{Section, SectionType};
pub use item::{Item, ItemType, NewItem, Scope};
pub use tree::{build_menu, ItemNode, SectionTree};
pub use commands::{
    ItemInput, MoveOutcome, MoveRequest, SortEntry, SortItemError, SortOutcome, SortStatus,
    UpsertMenuRequest,
};

//! Common types

/// Primary key of a menu item row.
pub type ItemId = i64;

/// Primary key of a menu section row; also the section lock key.
pub type SectionId = i64;

/// Ordering key of an item inside its (section, parent) scope.
pub type Position = i32;

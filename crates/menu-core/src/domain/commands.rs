// ============================================================================
// Menu Core - Mutation Commands
// File: crates/menu-core/src/domain/commands.rs
// Description: Typed inputs and outcomes of the tree mutation operations
// ============================================================================

use serde::{Deserialize, Deserializer, Serialize};

use menu_shared::{ItemId, Position, SectionId};

use super::item::ItemType;
use super::tree::SectionTree;

/// Relocate one subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub item_id: ItemId,
    #[serde(default)]
    pub parent_id: Option<ItemId>,
    pub position: Position,
    /// Defaults to the moved item's current section.
    #[serde(default)]
    pub section_id: Option<SectionId>,
}

impl MoveRequest {
    pub fn to_root(item_id: ItemId, position: Position) -> Self {
        Self { item_id, parent_id: None, position, section_id: None }
    }

    pub fn under(item_id: ItemId, parent_id: ItemId, position: Position) -> Self {
        Self { item_id, parent_id: Some(parent_id), position, section_id: None }
    }

    pub fn in_section(mut self, section_id: SectionId) -> Self {
        self.section_id = Some(section_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOutcome {
    pub status: String,
    /// Every id whose row was rewritten, ascending.
    pub subtree_ids: Vec<ItemId>,
}

/// Present-but-null must stay distinguishable from absent.
fn deserialize_some<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// One entry of a bulk sort batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortEntry {
    #[serde(default)]
    pub id: Option<ItemId>,
    pub position: Position,
    /// `None`: keep the current parent. `Some(None)`: make root.
    #[serde(default, deserialize_with = "deserialize_some", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Option<ItemId>>,
    #[serde(default)]
    pub section_id: Option<SectionId>,
}

impl SortEntry {
    pub fn new(id: ItemId, position: Position) -> Self {
        Self { id: Some(id), position, parent_id: None, section_id: None }
    }

    pub fn with_parent(mut self, parent_id: Option<ItemId>) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_section(mut self, section_id: SectionId) -> Self {
        self.section_id = Some(section_id);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortStatus {
    Success,
    /// Some entries failed; the rest were committed.
    Partial,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortItemError {
    pub id: Option<ItemId>,
    pub message: String,
}

impl SortItemError {
    pub fn new(id: Option<ItemId>, message: impl Into<String>) -> Self {
        Self { id, message: message.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOutcome {
    pub status: SortStatus,
    pub updated_count: usize,
    pub errors: Vec<SortItemError>,
    /// Whole menu as read back after the batch.
    pub items: Vec<SectionTree>,
}

impl SortOutcome {
    pub fn error_for(&self, id: ItemId) -> Option<&SortItemError> {
        self.errors.iter().find(|e| e.id == Some(id))
    }
}

/// Nested payload item for a full-replace upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInput {
    /// Client-side identity; only used to reject self-parenting payloads.
    #[serde(default)]
    pub id: Option<ItemId>,
    #[serde(default)]
    pub item_type: ItemType,
    pub label: String,
    #[serde(default)]
    pub link: Option<String>,
    /// Falls back to the index among siblings.
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub parent_id: Option<ItemId>,
    #[serde(default)]
    pub items: Vec<ItemInput>,
}

impl ItemInput {
    pub fn link(label: &str, link: &str) -> Self {
        Self {
            id: None,
            item_type: ItemType::Link,
            label: label.to_string(),
            link: Some(link.to_string()),
            position: None,
            parent_id: None,
            items: Vec::new(),
        }
    }

    pub fn header(label: &str, items: Vec<ItemInput>) -> Self {
        Self {
            id: None,
            item_type: ItemType::Header,
            label: label.to_string(),
            link: None,
            position: None,
            parent_id: None,
            items,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertMenuRequest {
    #[serde(default)]
    pub left: Vec<ItemInput>,
    #[serde(default)]
    pub main: Vec<ItemInput>,
    /// `None` leaves the right section untouched.
    #[serde(default)]
    pub right: Option<Vec<ItemInput>>,
}

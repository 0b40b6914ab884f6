// ============================================================================
// Menu Core - Item Entity
// File: crates/menu-core/src/domain/item.rs
// Description: Tree node with ordering scope (section, parent)
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use menu_shared::{ItemId, Position, SectionId};

use crate::error::DomainError;

/// Item type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    /// Navigates somewhere; requires a non-empty link.
    Link,
    /// Container only.
    Header,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Link => "link",
            ItemType::Header => "header",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "link" => Some(ItemType::Link),
            "header" => Some(ItemType::Header),
            _ => None,
        }
    }
}

impl Default for ItemType {
    fn default() -> Self {
        ItemType::Link
    }
}

/// Ordering scope. Positions are only comparable inside one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    pub section_id: SectionId,
    pub parent_id: Option<ItemId>,
}

impl Scope {
    pub fn new(section_id: SectionId, parent_id: Option<ItemId>) -> Self {
        Self { section_id, parent_id }
    }
}

fn check_link(item_type: ItemType, link: Option<&str>) -> Result<(), ValidationError> {
    if item_type == ItemType::Link && link.map_or(true, |l| l.trim().is_empty()) {
        return Err(ValidationError::new("link_required")
            .with_message("Link items require a non-empty link".into()));
    }
    Ok(())
}

fn validate_item_shape(item: &Item) -> Result<(), ValidationError> {
    check_link(item.item_type, item.link.as_deref())?;
    if item.parent_id == Some(item.id) {
        return Err(ValidationError::new("self_parent")
            .with_message("Item cannot be parent of itself".into()));
    }
    Ok(())
}

fn validate_new_item_shape(item: &NewItem) -> Result<(), ValidationError> {
    check_link(item.item_type, item.link.as_deref())
}

/// Item entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_item_shape", skip_on_field_errors = false))]
pub struct Item {
    pub id: ItemId,
    pub item_type: ItemType,

    #[validate(length(min = 1, max = 255, message = "Label must be between 1 and 255 characters"))]
    pub label: String,

    #[validate(length(max = 2048, message = "Link too long"))]
    pub link: Option<String>,

    #[validate(range(min = 0, message = "Position must not be negative"))]
    pub position: Position,

    pub section_id: SectionId,
    pub parent_id: Option<ItemId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    pub fn scope(&self) -> Scope {
        Scope::new(self.section_id, self.parent_id)
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Row-level check run before every write of an existing item.
    pub fn validate_row(&self) -> Result<(), DomainError> {
        self.validate().map_err(DomainError::from)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Item that has not been persisted yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_new_item_shape", skip_on_field_errors = false))]
pub struct NewItem {
    #[serde(default)]
    pub item_type: ItemType,

    #[validate(length(min = 1, max = 255, message = "Label must be between 1 and 255 characters"))]
    pub label: String,

    #[validate(length(max = 2048, message = "Link too long"))]
    #[serde(default)]
    pub link: Option<String>,

    #[validate(range(min = 0, message = "Position must not be negative"))]
    pub position: Position,

    pub section_id: SectionId,

    #[serde(default)]
    pub parent_id: Option<ItemId>,
}

impl NewItem {
    pub fn new(
        item_type: ItemType,
        label: String,
        link: Option<String>,
        position: Position,
        section_id: SectionId,
        parent_id: Option<ItemId>,
    ) -> Result<Self, DomainError> {
        let item = Self {
            item_type,
            label: label.trim().to_string(),
            link: link
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty()),
            position,
            section_id,
            parent_id,
        };

        item.validate()?;
        Ok(item)
    }

    pub fn link(label: &str, link: &str, position: Position, section_id: SectionId) -> Result<Self, DomainError> {
        Self::new(ItemType::Link, label.to_string(), Some(link.to_string()), position, section_id, None)
    }

    pub fn header(label: &str, position: Position, section_id: SectionId) -> Result<Self, DomainError> {
        Self::new(ItemType::Header, label.to_string(), None, position, section_id, None)
    }

    pub fn under(mut self, parent_id: ItemId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Materialize with a storage-assigned id.
    pub fn into_item(self, id: ItemId) -> Item {
        let now = Utc::now();
        Item {
            id,
            item_type: self.item_type,
            label: self.label,
            link: self.link,
            position: self.position,
            section_id: self.section_id,
            parent_id: self.parent_id,
            created_at: now,
            updated_at: now,
        }
    }
}

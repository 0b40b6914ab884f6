// ============================================================================
// Menu Core - Section Entity
// File: crates/menu-core/src/domain/section.rs
// Description: Positional zone of the menu (left, main, right)
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use menu_shared::SectionId;

/// Section type enumeration. Each type exists at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    Left,
    Main,
    Right,
}

impl SectionType {
    pub const ALL: [SectionType; 3] = [SectionType::Left, SectionType::Main, SectionType::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionType::Left => "left",
            SectionType::Main => "main",
            SectionType::Right => "right",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "left" => Some(SectionType::Left),
            "main" => Some(SectionType::Main),
            "right" => Some(SectionType::Right),
            _ => None,
        }
    }
}

/// Section entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    pub section_type: SectionType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Section {
    pub fn new(id: SectionId, section_type: SectionType) -> Self {
        let now = Utc::now();
        Self {
            id,
            section_type,
            created_at: now,
            updated_at: now,
        }
    }
}

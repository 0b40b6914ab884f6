//! Menu store traits (ports)
//!
//! Every mutation runs against one [`MenuTransaction`]. Dropping a transaction
//! without calling `commit` discards its writes and releases its locks.

use async_trait::async_trait;

use menu_shared::{ItemId, Position, SectionId};

use crate::domain::{Item, NewItem, Scope, Section, SectionType};
use crate::error::DomainError;

/// Downward edges of the parent-link graph.
#[async_trait]
pub trait ChildrenSource: Send {
    /// Direct children of every id in `parents`, in no particular order.
    async fn children_of(&mut self, parents: &[ItemId]) -> Result<Vec<Item>, DomainError>;
}

#[async_trait]
pub trait MenuTransaction: ChildrenSource {
    /// Section-scoped advisory lock held until commit or rollback.
    /// Fails with `Busy` when not granted within the store's lock timeout.
    async fn lock_section(&mut self, section_id: SectionId) -> Result<(), DomainError>;

    /// Fetch and row-lock the given items. Missing ids are simply absent.
    async fn lock_items(&mut self, ids: &[ItemId]) -> Result<Vec<Item>, DomainError>;

    async fn find_item(&mut self, id: ItemId) -> Result<Option<Item>, DomainError>;
    async fn find_items(&mut self, ids: &[ItemId]) -> Result<Vec<Item>, DomainError>;
    async fn list_items(&mut self) -> Result<Vec<Item>, DomainError>;

    async fn find_section(&mut self, id: SectionId) -> Result<Option<Section>, DomainError>;
    async fn find_section_by_type(&mut self, section_type: SectionType) -> Result<Option<Section>, DomainError>;
    async fn create_section(&mut self, section_type: SectionType) -> Result<Section, DomainError>;
    async fn list_sections(&mut self) -> Result<Vec<Section>, DomainError>;

    async fn insert_item(&mut self, item: &NewItem) -> Result<Item, DomainError>;

    /// Write one row. A failure here leaves the rest of the transaction usable.
    async fn update_item(&mut self, item: &Item) -> Result<(), DomainError>;

    async fn set_positions(&mut self, positions: &[(ItemId, Position)]) -> Result<(), DomainError>;

    /// Add one to every position `>= from` in `scope`, skipping `exclude`.
    async fn shift_scope(
        &mut self,
        scope: Scope,
        from: Position,
        exclude: &[ItemId],
    ) -> Result<u64, DomainError>;

    async fn set_parent(&mut self, id: ItemId, parent_id: Option<ItemId>) -> Result<(), DomainError>;
    async fn set_section(&mut self, ids: &[ItemId], section_id: SectionId) -> Result<(), DomainError>;

    async fn delete_items(&mut self, ids: &[ItemId]) -> Result<u64, DomainError>;
    async fn delete_section_items(&mut self, section_id: SectionId) -> Result<u64, DomainError>;
    async fn delete_section(&mut self, section_id: SectionId) -> Result<bool, DomainError>;

    async fn commit(self: Box<Self>) -> Result<(), DomainError>;
    async fn rollback(self: Box<Self>) -> Result<(), DomainError>;
}

#[async_trait]
pub trait MenuStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn MenuTransaction>, DomainError>;

    fn backend_name(&self) -> &'static str;
}

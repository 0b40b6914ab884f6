// ============================================================================
// Menu Infrastructure - In-Memory Menu Store
// File: crates/menu-infrastructure/src/database/memory/menu_store_impl.rs
// Description: Process-local store with staged writes and keyed locks
// ============================================================================

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use menu_core::domain::{Item, NewItem, Scope, Section, SectionType};
use menu_core::error::DomainError;
use menu_core::repositories::{ChildrenSource, MenuStore, MenuTransaction};
use menu_shared::config::EngineSettings;
use menu_shared::{ItemId, Position, SectionId};

use super::keyed_lock::{KeyGuard, KeyedLocks};

/// Committed rows plus the id sequences.
struct MemoryState {
    sections: BTreeMap<SectionId, Section>,
    items: BTreeMap<ItemId, Item>,
    next_section_id: SectionId,
    next_item_id: ItemId,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            sections: BTreeMap::new(),
            items: BTreeMap::new(),
            next_section_id: 1,
            next_item_id: 1,
        }
    }
}

/// Shared, cloneable handle. Clones see the same rows and the same locks.
#[derive(Clone)]
pub struct InMemoryMenuStore {
    state: Arc<Mutex<MemoryState>>,
    section_locks: Arc<KeyedLocks>,
    item_locks: Arc<KeyedLocks>,
    lock_timeout: Duration,
}

impl InMemoryMenuStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            section_locks: Arc::new(KeyedLocks::new()),
            item_locks: Arc::new(KeyedLocks::new()),
            lock_timeout,
        }
    }

    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self::new(Duration::from_millis(settings.lock_timeout_ms))
    }

    /// Committed items, ordered by id.
    pub fn items(&self) -> Vec<Item> {
        self.state.lock().items.values().cloned().collect()
    }

    pub fn item(&self, id: ItemId) -> Option<Item> {
        self.state.lock().items.get(&id).cloned()
    }

    pub fn sections(&self) -> Vec<Section> {
        self.state.lock().sections.values().cloned().collect()
    }
}

#[async_trait]
impl MenuStore for InMemoryMenuStore {
    async fn begin(&self) -> Result<Box<dyn MenuTransaction>, DomainError> {
        Ok(Box::new(MemoryMenuTransaction {
            state: Arc::clone(&self.state),
            section_locks: Arc::clone(&self.section_locks),
            item_locks: Arc::clone(&self.item_locks),
            lock_timeout: self.lock_timeout,
            sections: BTreeMap::new(),
            items: BTreeMap::new(),
            section_guards: HashMap::new(),
            item_guards: HashMap::new(),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Writes are staged here (`None` marks a delete) and applied on commit.
/// Every staged row is held under its item lock until the transaction ends.
pub struct MemoryMenuTransaction {
    state: Arc<Mutex<MemoryState>>,
    section_locks: Arc<KeyedLocks>,
    item_locks: Arc<KeyedLocks>,
    lock_timeout: Duration,
    sections: BTreeMap<SectionId, Option<Section>>,
    items: BTreeMap<ItemId, Option<Item>>,
    section_guards: HashMap<SectionId, KeyGuard>,
    item_guards: HashMap<ItemId, KeyGuard>,
}

impl MemoryMenuTransaction {
    fn current_item(&self, id: ItemId) -> Option<Item> {
        match self.items.get(&id) {
            Some(staged) => staged.clone(),
            None => self.state.lock().items.get(&id).cloned(),
        }
    }

    fn current_section(&self, id: SectionId) -> Option<Section> {
        match self.sections.get(&id) {
            Some(staged) => staged.clone(),
            None => self.state.lock().sections.get(&id).cloned(),
        }
    }

    fn merged_items(&self) -> Vec<Item> {
        let mut rows: BTreeMap<ItemId, Item> = self.state.lock().items.clone();
        overlay(&mut rows, &self.items);
        rows.into_values().collect()
    }

    fn merged_sections(&self) -> Vec<Section> {
        let mut rows: BTreeMap<SectionId, Section> = self.state.lock().sections.clone();
        overlay(&mut rows, &self.sections);
        rows.into_values().collect()
    }

    async fn lock_item(&mut self, id: ItemId) -> Result<(), DomainError> {
        if self.item_guards.contains_key(&id) {
            return Ok(());
        }
        let guard = self
            .item_locks
            .acquire(id, self.lock_timeout)
            .await
            .ok_or_else(|| DomainError::Busy(format!("item {} is locked", id)))?;
        self.item_guards.insert(id, guard);
        Ok(())
    }

    /// Lock `id` and return its latest version, ready to be modified.
    async fn stage(&mut self, id: ItemId) -> Result<Option<Item>, DomainError> {
        self.lock_item(id).await?;
        Ok(self.current_item(id))
    }

    fn put(&mut self, item: Item) {
        self.items.insert(item.id, Some(item));
    }

    fn require_section(&self, section_id: SectionId) -> Result<(), DomainError> {
        match self.current_section(section_id) {
            Some(_) => Ok(()),
            None => Err(DomainError::StorageFailure(format!(
                "foreign key violation: section {} does not exist",
                section_id
            ))),
        }
    }

    fn require_parent(&self, id: Option<ItemId>, parent_id: Option<ItemId>) -> Result<(), DomainError> {
        let Some(parent_id) = parent_id else { return Ok(()) };
        if Some(parent_id) == id {
            return Err(DomainError::StorageFailure(format!(
                "check violation: item {} cannot be its own parent",
                parent_id
            )));
        }
        match self.current_item(parent_id) {
            Some(_) => Ok(()),
            None => Err(DomainError::StorageFailure(format!(
                "foreign key violation: parent {} does not exist",
                parent_id
            ))),
        }
    }

    /// `ids` plus everything hanging below them.
    fn with_descendants(&self, ids: &[ItemId]) -> Vec<ItemId> {
        let rows = self.merged_items();
        let mut doomed: HashSet<ItemId> = ids.iter().copied().collect();
        loop {
            let before = doomed.len();
            for item in &rows {
                if item.parent_id.is_some_and(|p| doomed.contains(&p)) {
                    doomed.insert(item.id);
                }
            }
            if doomed.len() == before {
                break;
            }
        }
        let mut doomed: Vec<ItemId> = doomed.into_iter().collect();
        doomed.sort_unstable();
        doomed
    }

    async fn remove_items(&mut self, ids: &[ItemId]) -> Result<(), DomainError> {
        for &id in ids {
            if self.stage(id).await?.is_some() {
                self.items.insert(id, None);
            }
        }
        Ok(())
    }
}

fn overlay<K: Ord + Copy, V: Clone>(rows: &mut BTreeMap<K, V>, staged: &BTreeMap<K, Option<V>>) {
    for (key, value) in staged {
        match value {
            Some(v) => {
                rows.insert(*key, v.clone());
            }
            None => {
                rows.remove(key);
            }
        }
    }
}

/// Sibling positions must be unique in every scope this transaction wrote to.
fn check_unique_positions(rows: &BTreeMap<ItemId, Item>, touched: &HashSet<Scope>) -> Result<(), DomainError> {
    let mut seen: HashMap<(Scope, Position), ItemId> = HashMap::new();
    for item in rows.values().filter(|i| touched.contains(&i.scope())) {
        if let Some(other) = seen.insert((item.scope(), item.position), item.id) {
            return Err(DomainError::StorageFailure(format!(
                "unique violation: items {} and {} share position {} in section {} under parent {:?}",
                other, item.id, item.position, item.section_id, item.parent_id
            )));
        }
    }
    Ok(())
}

fn check_unique_section_types(sections: &BTreeMap<SectionId, Section>) -> Result<(), DomainError> {
    let mut seen: HashMap<SectionType, SectionId> = HashMap::new();
    for section in sections.values() {
        if let Some(other) = seen.insert(section.section_type, section.id) {
            return Err(DomainError::StorageFailure(format!(
                "unique violation: sections {} and {} share type {}",
                other,
                section.id,
                section.section_type.as_str()
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl ChildrenSource for MemoryMenuTransaction {
    async fn children_of(&mut self, parents: &[ItemId]) -> Result<Vec<Item>, DomainError> {
        let parents: HashSet<ItemId> = parents.iter().copied().collect();
        Ok(self
            .merged_items()
            .into_iter()
            .filter(|i| i.parent_id.is_some_and(|p| parents.contains(&p)))
            .collect())
    }
}

#[async_trait]
impl MenuTransaction for MemoryMenuTransaction {
    async fn lock_section(&mut self, section_id: SectionId) -> Result<(), DomainError> {
        if self.section_guards.contains_key(&section_id) {
            return Ok(());
        }
        let guard = self
            .section_locks
            .acquire(section_id, self.lock_timeout)
            .await
            .ok_or_else(|| DomainError::Busy(format!("section {} is locked", section_id)))?;
        self.section_guards.insert(section_id, guard);
        Ok(())
    }

    async fn lock_items(&mut self, ids: &[ItemId]) -> Result<Vec<Item>, DomainError> {
        let mut ordered = ids.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let mut found = Vec::with_capacity(ordered.len());
        for id in ordered {
            if let Some(item) = self.stage(id).await? {
                found.push(item);
            }
        }
        Ok(found)
    }

    async fn find_item(&mut self, id: ItemId) -> Result<Option<Item>, DomainError> {
        Ok(self.current_item(id))
    }

    async fn find_items(&mut self, ids: &[ItemId]) -> Result<Vec<Item>, DomainError> {
        let mut ordered = ids.to_vec();
        ordered.sort_unstable();
        ordered.dedup();
        Ok(ordered.into_iter().filter_map(|id| self.current_item(id)).collect())
    }

    async fn list_items(&mut self) -> Result<Vec<Item>, DomainError> {
        Ok(self.merged_items())
    }

    async fn find_section(&mut self, id: SectionId) -> Result<Option<Section>, DomainError> {
        Ok(self.current_section(id))
    }

    async fn find_section_by_type(&mut self, section_type: SectionType) -> Result<Option<Section>, DomainError> {
        Ok(self
            .merged_sections()
            .into_iter()
            .find(|s| s.section_type == section_type))
    }

    async fn create_section(&mut self, section_type: SectionType) -> Result<Section, DomainError> {
        if let Some(existing) = self.find_section_by_type(section_type).await? {
            return Ok(existing);
        }
        info!("Creating section: {}", section_type.as_str());

        let id = {
            let mut state = self.state.lock();
            let id = state.next_section_id;
            state.next_section_id += 1;
            id
        };
        let section = Section::new(id, section_type);
        self.sections.insert(id, Some(section.clone()));
        Ok(section)
    }

    async fn list_sections(&mut self) -> Result<Vec<Section>, DomainError> {
        Ok(self.merged_sections())
    }

    async fn insert_item(&mut self, item: &NewItem) -> Result<Item, DomainError> {
        self.require_section(item.section_id)?;
        self.require_parent(None, item.parent_id)?;

        let id = {
            let mut state = self.state.lock();
            let id = state.next_item_id;
            state.next_item_id += 1;
            id
        };
        self.lock_item(id).await?;

        let created = item.clone().into_item(id);
        self.put(created.clone());
        Ok(created)
    }

    async fn update_item(&mut self, item: &Item) -> Result<(), DomainError> {
        self.require_section(item.section_id)?;
        self.require_parent(Some(item.id), item.parent_id)?;

        match self.stage(item.id).await? {
            Some(_) => {
                self.put(item.clone());
                Ok(())
            }
            None => Err(DomainError::ItemNotFound(item.id)),
        }
    }

    async fn set_positions(&mut self, positions: &[(ItemId, Position)]) -> Result<(), DomainError> {
        for &(id, position) in positions {
            if let Some(mut item) = self.stage(id).await? {
                item.position = position;
                item.touch();
                self.put(item);
            }
        }
        debug!("Set {} positions", positions.len());
        Ok(())
    }

    async fn shift_scope(&mut self, scope: Scope, from: Position, exclude: &[ItemId]) -> Result<u64, DomainError> {
        let targets: Vec<ItemId> = self
            .merged_items()
            .into_iter()
            .filter(|i| i.scope() == scope && i.position >= from && !exclude.contains(&i.id))
            .map(|i| i.id)
            .collect();

        let mut shifted = 0;
        for id in targets {
            if let Some(mut item) = self.stage(id).await? {
                // re-check: the row may have changed before the lock was granted
                if item.scope() != scope || item.position < from {
                    continue;
                }
                item.position += 1;
                item.touch();
                self.put(item);
                shifted += 1;
            }
        }
        Ok(shifted)
    }

    async fn set_parent(&mut self, id: ItemId, parent_id: Option<ItemId>) -> Result<(), DomainError> {
        self.require_parent(Some(id), parent_id)?;
        if let Some(mut item) = self.stage(id).await? {
            item.parent_id = parent_id;
            item.touch();
            self.put(item);
        }
        Ok(())
    }

    async fn set_section(&mut self, ids: &[ItemId], section_id: SectionId) -> Result<(), DomainError> {
        self.require_section(section_id)?;
        for &id in ids {
            if let Some(mut item) = self.stage(id).await? {
                item.section_id = section_id;
                item.touch();
                self.put(item);
            }
        }
        Ok(())
    }

    async fn delete_items(&mut self, ids: &[ItemId]) -> Result<u64, DomainError> {
        let existing = ids.iter().filter(|&&id| self.current_item(id).is_some()).count() as u64;
        let doomed = self.with_descendants(ids);
        self.remove_items(&doomed).await?;
        Ok(existing)
    }

    async fn delete_section_items(&mut self, section_id: SectionId) -> Result<u64, DomainError> {
        let doomed: Vec<ItemId> = self
            .merged_items()
            .into_iter()
            .filter(|i| i.section_id == section_id)
            .map(|i| i.id)
            .collect();
        self.remove_items(&doomed).await?;
        Ok(doomed.len() as u64)
    }

    async fn delete_section(&mut self, section_id: SectionId) -> Result<bool, DomainError> {
        if self.current_section(section_id).is_none() {
            return Ok(false);
        }
        self.delete_section_items(section_id).await?;
        self.sections.insert(section_id, None);
        Ok(true)
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        let touched: HashSet<Scope> = self.items.values().flatten().map(Item::scope).collect();

        let mut state = self.state.lock();
        let mut rows = state.items.clone();
        overlay(&mut rows, &self.items);
        let mut sections = state.sections.clone();
        overlay(&mut sections, &self.sections);
        check_unique_positions(&rows, &touched)
            .and_then(|()| check_unique_section_types(&sections))
            .map_err(|e| {
                warn!(error = %e, "Commit rejected");
                e
            })?;

        state.items = rows;
        state.sections = sections;
        drop(state);

        debug!(
            items = self.items.len(),
            sections = self.sections.len(),
            "Memory transaction committed"
        );
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        debug!(staged = self.items.len(), "Memory transaction rolled back");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> InMemoryMenuStore {
        InMemoryMenuStore::new(Duration::from_millis(50))
    }

    async fn seeded() -> (InMemoryMenuStore, SectionId) {
        let store = store();
        let mut tx = store.begin().await.unwrap();
        let section = tx.create_section(SectionType::Main).await.unwrap();
        tx.insert_item(&NewItem::link("Home", "/", 1, section.id).unwrap()).await.unwrap();
        tx.insert_item(&NewItem::link("Blog", "/blog", 2, section.id).unwrap()).await.unwrap();
        tx.commit().await.unwrap();
        (store, section.id)
    }

    #[tokio::test]
    async fn test_commit_makes_rows_visible() {
        let (store, section_id) = seeded().await;
        let items = store.items();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.section_id == section_id));
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_writes() {
        let (store, _) = seeded().await;
        {
            let mut tx = store.begin().await.unwrap();
            tx.delete_items(&[1]).await.unwrap();
        }
        assert!(store.item(1).is_some());
    }

    #[tokio::test]
    async fn test_duplicate_position_fails_commit() {
        let (store, _) = seeded().await;
        let mut tx = store.begin().await.unwrap();
        tx.set_positions(&[(2, 1)]).await.unwrap();
        let err = tx.commit().await.unwrap_err();
        assert!(matches!(err, DomainError::StorageFailure(_)));
        assert_eq!(store.item(2).unwrap().position, 2);
    }

    #[tokio::test]
    async fn test_locked_row_reports_busy() {
        let (store, _) = seeded().await;
        let mut first = store.begin().await.unwrap();
        first.lock_items(&[1]).await.unwrap();

        let mut second = store.begin().await.unwrap();
        let err = second.set_positions(&[(1, 9)]).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_section_lock_is_reentrant_within_transaction() {
        let (store, section_id) = seeded().await;
        let mut tx = store.begin().await.unwrap();
        tx.lock_section(section_id).await.unwrap();
        tx.lock_section(section_id).await.unwrap();

        let mut other = store.begin().await.unwrap();
        assert!(matches!(other.lock_section(section_id).await, Err(DomainError::Busy(_))));
    }

    #[tokio::test]
    async fn test_delete_cascades_to_children() {
        let (store, section_id) = seeded().await;
        let mut tx = store.begin().await.unwrap();
        let child = NewItem::link("Post", "/blog/1", 1, section_id).unwrap().under(2);
        tx.insert_item(&child).await.unwrap();
        assert_eq!(tx.delete_items(&[2]).await.unwrap(), 1);
        tx.commit().await.unwrap();

        let ids: Vec<ItemId> = store.items().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test]
    async fn test_update_missing_parent_leaves_row_untouched() {
        let (store, _) = seeded().await;
        let mut tx = store.begin().await.unwrap();
        let mut row = tx.find_item(1).await.unwrap().unwrap();
        row.parent_id = Some(99);
        assert!(tx.update_item(&row).await.is_err());
        assert_eq!(tx.find_item(1).await.unwrap().unwrap().parent_id, None);
    }

    #[tokio::test]
    async fn test_create_section_is_idempotent_per_type() {
        let store = store();
        let mut tx = store.begin().await.unwrap();
        let a = tx.create_section(SectionType::Left).await.unwrap();
        let b = tx.create_section(SectionType::Left).await.unwrap();
        assert_eq!(a.id, b.id);
        tx.commit().await.unwrap();
        assert_eq!(store.sections().len(), 1);
    }

    #[tokio::test]
    async fn test_racing_section_creates_keep_one_per_type() {
        let store = store();
        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first.create_section(SectionType::Right).await.unwrap();
        second.create_section(SectionType::Right).await.unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();

        assert!(matches!(err, DomainError::StorageFailure(_)));
        assert_eq!(store.sections().len(), 1);
    }
}

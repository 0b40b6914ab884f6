//! Shared fixtures for engine tests against the in-memory store.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use menu_core::domain::{Item, NewItem, SectionType, UpsertMenuRequest};
use menu_core::error::DomainError;
use menu_core::repositories::{MenuRevalidator, NoopRevalidator};
use menu_core::{EngineOptions, MenuTreeEngine};
use menu_infrastructure::InMemoryMenuStore;
use menu_shared::{ItemId, Position, SectionId};

/// Sends one message per notification.
pub struct RecordingRevalidator {
    tx: mpsc::UnboundedSender<()>,
}

#[async_trait]
impl MenuRevalidator for RecordingRevalidator {
    async fn menu_stale(&self) -> Result<(), DomainError> {
        let _ = self.tx.send(());
        Ok(())
    }
}

pub struct FailingRevalidator;

#[async_trait]
impl MenuRevalidator for FailingRevalidator {
    async fn menu_stale(&self) -> Result<(), DomainError> {
        Err(DomainError::StorageFailure("cache unreachable".into()))
    }
}

pub struct Fixture {
    pub store: InMemoryMenuStore,
    pub engine: Arc<MenuTreeEngine>,
    pub left: SectionId,
    pub main: SectionId,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_revalidator(Arc::new(NoopRevalidator), Duration::from_secs(2)).await
    }

    pub async fn recording() -> (Self, mpsc::UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let fixture =
            Self::with_revalidator(Arc::new(RecordingRevalidator { tx }), Duration::from_secs(2)).await;
        (fixture, rx)
    }

    pub async fn with_revalidator(revalidator: Arc<dyn MenuRevalidator>, lock_timeout: Duration) -> Self {
        let store = InMemoryMenuStore::new(lock_timeout);
        let engine = MenuTreeEngine::new(Arc::new(store.clone()), revalidator, EngineOptions::default());
        engine
            .upsert_menu(UpsertMenuRequest::default())
            .await
            .expect("sections created");

        let sections = store.sections();
        let id_of = |t: SectionType| {
            sections
                .iter()
                .find(|s| s.section_type == t)
                .map(|s| s.id)
                .expect("section exists")
        };
        let (left, main) = (id_of(SectionType::Left), id_of(SectionType::Main));

        Self { store, engine: Arc::new(engine), left, main }
    }

    pub async fn link(&self, label: &str, position: Position, section_id: SectionId, parent: Option<ItemId>) -> ItemId {
        let mut item = NewItem::link(label, &format!("/{}", label.to_lowercase()), position, section_id)
            .expect("valid item");
        if let Some(parent_id) = parent {
            item = item.under(parent_id);
        }
        self.engine.create_item(item).await.expect("item created").id
    }

    pub fn item(&self, id: ItemId) -> Item {
        self.store.item(id).expect("item exists")
    }

    /// Children of `parent` in `section`, ordered by position.
    pub fn children(&self, section_id: SectionId, parent: Option<ItemId>) -> Vec<ItemId> {
        let mut rows: Vec<Item> = self
            .store
            .items()
            .into_iter()
            .filter(|i| i.section_id == section_id && i.parent_id == parent)
            .collect();
        rows.sort_by_key(|i| (i.position, i.id));
        rows.into_iter().map(|i| i.id).collect()
    }
}

/// Every item reaches a root within `items.len()` parent hops, and no item
/// is its own parent.
pub fn assert_acyclic(items: &[Item]) {
    let parents: HashMap<ItemId, Option<ItemId>> = items.iter().map(|i| (i.id, i.parent_id)).collect();
    for item in items {
        assert_ne!(item.parent_id, Some(item.id), "item {} is its own parent", item.id);
        let mut current = item.parent_id;
        let mut hops = 0;
        while let Some(id) = current {
            hops += 1;
            assert!(hops <= items.len(), "cycle reachable from item {}", item.id);
            current = parents.get(&id).copied().flatten();
        }
    }
}

/// No two items share a (section, parent, position) triple.
pub fn assert_unique_positions(items: &[Item]) {
    let mut seen = HashSet::new();
    for item in items {
        assert!(
            seen.insert((item.section_id, item.parent_id, item.position)),
            "duplicate position {} in section {} under {:?}",
            item.position,
            item.section_id,
            item.parent_id
        );
    }
}

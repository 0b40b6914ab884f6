// ============================================================================
// Menu Core - Tree Engine
// File: crates/menu-core/src/services/engine.rs
// ============================================================================
//! Entry point for every menu tree mutation: opens the transaction, runs the
//! operation, commits or rolls back, then tells the revalidator.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use validator::Validate;

use menu_shared::config::EngineSettings;
use menu_shared::constants::DEFAULT_MAX_TREE_DEPTH;
use menu_shared::{ItemId, SectionId};

use crate::domain::{
    build_menu, Item, MoveOutcome, MoveRequest, NewItem, Scope, SectionTree, SortEntry,
    SortOutcome, UpsertMenuRequest,
};
use crate::error::DomainError;
use crate::repositories::{MenuRevalidator, MenuStore, MenuTransaction};

use super::move_service::{self, MoveState, MoveTracker};
use super::{serializer, sort_service, traversal, upsert_service};

#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub max_tree_depth: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { max_tree_depth: DEFAULT_MAX_TREE_DEPTH }
    }
}

impl From<&EngineSettings> for EngineOptions {
    fn from(settings: &EngineSettings) -> Self {
        Self { max_tree_depth: settings.max_tree_depth }
    }
}

/// Fire-and-forget "menu is stale" notification.
pub fn spawn_revalidation(revalidator: Arc<dyn MenuRevalidator>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = revalidator.menu_stale().await {
            warn!(error = %e, "Menu revalidation failed; cached views may be stale");
        }
    })
}

async fn finish<T>(tx: Box<dyn MenuTransaction>, result: Result<T, DomainError>) -> Result<T, DomainError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                error!(error = %rollback_err, "Rollback failed");
            }
            Err(e)
        }
    }
}

pub struct MenuTreeEngine {
    store: Arc<dyn MenuStore>,
    revalidator: Arc<dyn MenuRevalidator>,
    options: EngineOptions,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl MenuTreeEngine {
    pub fn new(
        store: Arc<dyn MenuStore>,
        revalidator: Arc<dyn MenuRevalidator>,
        options: EngineOptions,
    ) -> Self {
        Self {
            store,
            revalidator,
            options,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    async fn notify_stale(&self) {
        let handle = spawn_revalidation(Arc::clone(&self.revalidator));
        let mut pending = self.pending.lock().await;
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Wait for notifications already sent. Short-lived callers run this before exit.
    pub async fn flush_notifications(&self) {
        let handles = std::mem::take(&mut *self.pending.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Revalidation task did not finish");
            }
        }
    }

    /// Move a subtree. All-or-nothing: any failure leaves the tree untouched.
    pub async fn move_subtree(&self, request: MoveRequest) -> Result<MoveOutcome, DomainError> {
        info!(
            item_id = request.item_id,
            parent_id = ?request.parent_id,
            position = request.position,
            section_id = ?request.section_id,
            "Move requested"
        );
        let mut tracker = MoveTracker::new(request.item_id);

        let result = async {
            let mut tx = self.store.begin().await?;
            let outcome =
                move_service::move_subtree(tx.as_mut(), &request, self.options.max_tree_depth, &mut tracker)
                    .await;
            finish(tx, outcome).await
        }
        .await;

        match result {
            Ok(outcome) => {
                tracker.advance(MoveState::Committed);
                self.notify_stale().await;
                Ok(outcome)
            }
            Err(e) => {
                tracker.abort(&e);
                Err(e)
            }
        }
    }

    /// Apply a sort batch. Entry-level failures come back in `errors`.
    pub async fn sort_items(&self, entries: Vec<SortEntry>) -> Result<SortOutcome, DomainError> {
        info!(entries = entries.len(), "Sort requested");
        let mut tx = self.store.begin().await?;
        let outcome = sort_service::sort_items(tx.as_mut(), &entries, self.options.max_tree_depth).await;
        let outcome = finish(tx, outcome).await?;

        if outcome.updated_count > 0 {
            self.notify_stale().await;
        }
        Ok(outcome)
    }

    /// Replace the left/main (and optionally right) sections wholesale.
    pub async fn upsert_menu(&self, request: UpsertMenuRequest) -> Result<Vec<SectionTree>, DomainError> {
        info!(
            left = request.left.len(),
            main = request.main.len(),
            right = ?request.right.as_ref().map(|r| r.len()),
            "Menu upsert requested"
        );
        let mut tx = self.store.begin().await?;
        let menu = upsert_service::upsert_menu(tx.as_mut(), &request).await;
        let menu = finish(tx, menu).await?;

        self.notify_stale().await;
        Ok(menu)
    }

    pub async fn load_menu(&self) -> Result<Vec<SectionTree>, DomainError> {
        let mut tx = self.store.begin().await?;
        let menu = async {
            let sections = tx.list_sections().await?;
            let items = tx.list_items().await?;
            Ok::<_, DomainError>(build_menu(sections, items))
        }
        .await;
        finish(tx, menu).await
    }

    /// Insert one item; siblings at or after its position shift down by one.
    pub async fn create_item(&self, item: NewItem) -> Result<Item, DomainError> {
        let mut tx = self.store.begin().await?;
        let created = self.create_in(tx.as_mut(), &item).await;
        let created = finish(tx, created).await?;

        info!(item_id = created.id, section_id = created.section_id, "Item created");
        self.notify_stale().await;
        Ok(created)
    }

    async fn create_in(&self, tx: &mut dyn MenuTransaction, item: &NewItem) -> Result<Item, DomainError> {
        item.validate()?;
        if tx.find_section(item.section_id).await?.is_none() {
            return Err(DomainError::SectionNotFound(item.section_id));
        }
        serializer::lock_sections(tx, &[item.section_id]).await?;

        if let Some(parent_id) = item.parent_id {
            let parent = tx
                .find_item(parent_id)
                .await?
                .ok_or(DomainError::ParentNotFound(parent_id))?;
            if parent.section_id != item.section_id {
                return Err(DomainError::InvalidArgument(format!(
                    "parent {} belongs to section {}, not {}",
                    parent_id, parent.section_id, item.section_id
                )));
            }
        }

        tx.shift_scope(Scope::new(item.section_id, item.parent_id), item.position, &[])
            .await?;
        tx.insert_item(item).await
    }

    /// Delete an item and everything beneath it. Returns the removed ids.
    pub async fn delete_item(&self, id: ItemId) -> Result<Vec<ItemId>, DomainError> {
        let mut tx = self.store.begin().await?;
        let removed = self.delete_in(tx.as_mut(), id).await;
        let removed = finish(tx, removed).await?;

        info!(item_id = id, removed = removed.len(), "Item deleted");
        self.notify_stale().await;
        Ok(removed)
    }

    async fn delete_in(&self, tx: &mut dyn MenuTransaction, id: ItemId) -> Result<Vec<ItemId>, DomainError> {
        let item = tx.find_item(id).await?.ok_or(DomainError::ItemNotFound(id))?;
        serializer::lock_sections(tx, &[item.section_id]).await?;

        let item = tx.find_item(id).await?.ok_or(DomainError::ItemNotFound(id))?;
        let ids = traversal::subtree_of(tx, &item, self.options.max_tree_depth)
            .await?
            .ids();
        tx.delete_items(&ids).await?;
        Ok(ids)
    }

    /// Delete a section and all of its items. Returns the number of items removed.
    pub async fn delete_section(&self, section_id: SectionId) -> Result<u64, DomainError> {
        let mut tx = self.store.begin().await?;
        let removed = async {
            tx.find_section(section_id)
                .await?
                .ok_or(DomainError::SectionNotFound(section_id))?;
            serializer::lock_sections(tx.as_mut(), &[section_id]).await?;
            let removed = tx.delete_section_items(section_id).await?;
            tx.delete_section(section_id).await?;
            Ok::<_, DomainError>(removed)
        }
        .await;
        let removed = finish(tx, removed).await?;

        info!(section_id, removed, "Section deleted");
        self.notify_stale().await;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::revalidator::MockMenuRevalidator;

    #[tokio::test]
    async fn test_revalidation_failure_is_swallowed() {
        let mut mock = MockMenuRevalidator::new();
        mock.expect_menu_stale()
            .times(1)
            .returning(|| Err(DomainError::StorageFailure("redis down".into())));

        let handle = spawn_revalidation(Arc::new(mock));
        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn test_revalidation_success() {
        let mut mock = MockMenuRevalidator::new();
        mock.expect_menu_stale().times(1).returning(|| Ok(()));

        spawn_revalidation(Arc::new(mock)).await.unwrap();
    }

    #[test]
    fn test_options_from_settings() {
        let settings = EngineSettings { lock_timeout_ms: 10, max_tree_depth: 7 };
        assert_eq!(EngineOptions::from(&settings).max_tree_depth, 7);
    }
}

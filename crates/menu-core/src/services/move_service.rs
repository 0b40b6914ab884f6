// ============================================================================
// Menu Core - Move Operation
// File: crates/menu-core/src/services/move_service.rs
// Description: Relocate one subtree to a new parent/position/section
// ============================================================================

use tracing::{debug, info, warn};

use menu_shared::constants::SENTINEL_POSITION_BASE;
use menu_shared::{ItemId, Position, SectionId};

use crate::domain::{Item, MoveOutcome, MoveRequest, Scope};
use crate::error::DomainError;
use crate::repositories::MenuTransaction;

use super::serializer;
use super::traversal;

/// Lifecycle of one move. Any state except `Committed` may go to `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveState {
    Validating,
    Locking,
    CycleChecking,
    Enumerating,
    Reindexing,
    Committed,
    Aborted,
}

#[derive(Debug)]
pub struct MoveTracker {
    item_id: ItemId,
    state: MoveState,
}

impl MoveTracker {
    pub fn new(item_id: ItemId) -> Self {
        Self { item_id, state: MoveState::Validating }
    }

    pub fn state(&self) -> MoveState {
        self.state
    }

    pub fn advance(&mut self, next: MoveState) {
        debug!(item_id = self.item_id, from = ?self.state, to = ?next, "Move state transition");
        self.state = next;
    }

    pub fn abort(&mut self, error: &DomainError) {
        if self.state == MoveState::Committed {
            return;
        }
        warn!(item_id = self.item_id, at = ?self.state, error = %error, "Move aborted");
        self.state = MoveState::Aborted;
    }
}

/// Everything validation learned about the request.
#[derive(Debug)]
struct MovePlan {
    item: Item,
    parent: Option<Item>,
    position: Position,
    destination: SectionId,
}

async fn validate(tx: &mut dyn MenuTransaction, request: &MoveRequest) -> Result<MovePlan, DomainError> {
    let item = tx
        .find_item(request.item_id)
        .await?
        .ok_or(DomainError::ItemNotFound(request.item_id))?;

    let parent = match request.parent_id {
        // moving into itself is reported by the cycle guard
        Some(parent_id) if parent_id == item.id => None,
        Some(parent_id) => Some(
            tx.find_item(parent_id)
                .await?
                .ok_or(DomainError::ParentNotFound(parent_id))?,
        ),
        None => None,
    };

    if request.position <= 0 {
        return Err(DomainError::InvalidArgument(format!(
            "position must be a positive integer, got {}",
            request.position
        )));
    }

    let destination = match (&parent, request.section_id) {
        (Some(parent), Some(section_id)) if parent.section_id != section_id => {
            return Err(DomainError::InvalidArgument(format!(
                "parent {} belongs to section {}, not {}",
                parent.id, parent.section_id, section_id
            )));
        }
        (Some(parent), _) => parent.section_id,
        (None, Some(section_id)) => section_id,
        (None, None) => item.section_id,
    };

    if destination != item.section_id && tx.find_section(destination).await?.is_none() {
        return Err(DomainError::SectionNotFound(destination));
    }

    Ok(MovePlan { item, parent, position: request.position, destination })
}

/// Under the lock, the rows validation read must still sit in the sections
/// that were locked; otherwise another writer got in first.
async fn recheck(tx: &mut dyn MenuTransaction, plan: &mut MovePlan) -> Result<(), DomainError> {
    let item = tx
        .find_item(plan.item.id)
        .await?
        .ok_or(DomainError::ItemNotFound(plan.item.id))?;
    if item.section_id != plan.item.section_id {
        return Err(DomainError::Busy(format!(
            "item {} moved to section {} concurrently",
            item.id, item.section_id
        )));
    }
    plan.item = item;

    if let Some(parent) = &plan.parent {
        let fresh = tx
            .find_item(parent.id)
            .await?
            .ok_or(DomainError::ParentNotFound(parent.id))?;
        if fresh.section_id != plan.destination {
            return Err(DomainError::Busy(format!(
                "parent {} moved to section {} concurrently",
                fresh.id, fresh.section_id
            )));
        }
        plan.parent = Some(fresh);
    }
    Ok(())
}

/// Run a move inside `tx`. The caller owns commit/rollback.
pub async fn move_subtree(
    tx: &mut dyn MenuTransaction,
    request: &MoveRequest,
    max_depth: usize,
    tracker: &mut MoveTracker,
) -> Result<MoveOutcome, DomainError> {
    let mut plan = validate(tx, request).await?;

    tracker.advance(MoveState::Locking);
    serializer::lock_sections(tx, &[plan.item.section_id, plan.destination]).await?;
    recheck(tx, &mut plan).await?;

    tracker.advance(MoveState::CycleChecking);
    if let Some(parent_id) = request.parent_id {
        if traversal::would_create_cycle(tx, plan.item.id, parent_id, max_depth).await? {
            return Err(DomainError::InvalidOperation(format!(
                "cannot move item {} into own descendant {}",
                plan.item.id, parent_id
            )));
        }
    }

    tracker.advance(MoveState::Enumerating);
    let subtree = traversal::subtree_of(tx, &plan.item, max_depth).await?;
    let order = subtree.preorder();
    let ids = subtree.ids();

    tracker.advance(MoveState::Reindexing);
    let parked: Vec<(ItemId, Position)> = order
        .iter()
        .enumerate()
        .map(|(idx, &id)| (id, SENTINEL_POSITION_BASE - idx as Position))
        .collect();
    tx.set_positions(&parked).await?;

    if plan.destination != plan.item.section_id {
        tx.set_section(&ids, plan.destination).await?;
    }
    let parent_id = plan.parent.as_ref().map(|p| p.id);
    tx.set_parent(plan.item.id, parent_id).await?;

    let shifted = tx
        .shift_scope(Scope::new(plan.destination, parent_id), plan.position, &ids)
        .await?;

    let mut fresh = Vec::with_capacity(order.len());
    for (idx, &id) in order.iter().enumerate() {
        let position = Position::try_from(idx)
            .ok()
            .and_then(|offset| plan.position.checked_add(offset))
            .ok_or_else(|| DomainError::InvalidArgument(format!(
                "position {} leaves no room for {} items",
                plan.position,
                order.len()
            )))?;
        fresh.push((id, position));
    }
    tx.set_positions(&fresh).await?;

    info!(
        item_id = plan.item.id,
        parent_id = ?parent_id,
        section_id = plan.destination,
        position = plan.position,
        subtree = ids.len(),
        shifted,
        "Subtree reindexed"
    );

    Ok(MoveOutcome { status: "success".to_string(), subtree_ids: ids })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_transitions() {
        let mut tracker = MoveTracker::new(1);
        assert_eq!(tracker.state(), MoveState::Validating);
        tracker.advance(MoveState::Locking);
        tracker.abort(&DomainError::Busy("section 1".into()));
        assert_eq!(tracker.state(), MoveState::Aborted);
    }

    #[test]
    fn test_committed_move_is_not_aborted() {
        let mut tracker = MoveTracker::new(1);
        tracker.advance(MoveState::Committed);
        tracker.abort(&DomainError::InternalError("late".into()));
        assert_eq!(tracker.state(), MoveState::Committed);
    }
}

// ============================================================================
// Menu Core - Bulk Sort Operation
// File: crates/menu-core/src/services/sort_service.rs
// Description: Batch (position, parent, section) assignment with per-item errors
// ============================================================================

use std::collections::{HashMap, HashSet};

use tracing::{info, warn};

use menu_shared::{ItemId, Position, SectionId};

use crate::domain::{build_menu, Item, Scope, SortEntry, SortItemError, SortOutcome, SortStatus};
use crate::error::DomainError;
use crate::repositories::MenuTransaction;

/// An entry that passed the up-front checks, carrying the row it would write.
#[derive(Debug)]
struct Candidate {
    index: usize,
    id: ItemId,
    reparents: bool,
    row: Item,
}

/// Parent links as they will look once the admitted entries are applied.
struct ParentMap {
    parents: HashMap<ItemId, Option<ItemId>>,
    max_depth: usize,
}

impl ParentMap {
    fn new(items: &[Item], max_depth: usize) -> Self {
        let parents = items.iter().map(|i| (i.id, i.parent_id)).collect();
        Self { parents, max_depth }
    }

    /// Walk upward from `new_parent`; reaching `id` means the link closes a loop.
    fn would_close_loop(&self, id: ItemId, new_parent: ItemId) -> bool {
        let mut current = Some(new_parent);
        let mut steps = 0;
        while let Some(node) = current {
            if node == id {
                return true;
            }
            steps += 1;
            if steps > self.max_depth {
                // ancestry this long is already corrupt; refuse to extend it
                return true;
            }
            current = self.parents.get(&node).copied().flatten();
        }
        false
    }

    fn link(&mut self, id: ItemId, parent: Option<ItemId>) {
        self.parents.insert(id, parent);
    }
}

async fn known_sections(
    tx: &mut dyn MenuTransaction,
    entries: &[SortEntry],
) -> Result<HashSet<SectionId>, DomainError> {
    let mut requested: Vec<SectionId> = entries.iter().filter_map(|e| e.section_id).collect();
    requested.sort_unstable();
    requested.dedup();

    let mut known = HashSet::new();
    for section_id in requested {
        if tx.find_section(section_id).await?.is_some() {
            known.insert(section_id);
        }
    }
    Ok(known)
}

/// Entries in `admitted` whose final slot is held by another row. Rows
/// outside the batch keep their slot; among batch rows the earlier one wins.
fn position_conflicts(
    items: &[Item],
    ordered: &[Candidate],
    admitted: &[usize],
) -> Vec<(usize, String)> {
    let moving: HashSet<ItemId> = admitted.iter().map(|&k| ordered[k].id).collect();
    let mut taken: HashMap<(Scope, Position), ItemId> = items
        .iter()
        .filter(|i| !moving.contains(&i.id))
        .map(|i| ((i.scope(), i.position), i.id))
        .collect();

    let mut conflicts = Vec::new();
    for &k in admitted {
        let row = &ordered[k].row;
        let slot = (row.scope(), row.position);
        match taken.get(&slot) {
            Some(&holder) => conflicts.push((
                k,
                format!(
                    "position {} is already taken by item {} in section {}",
                    row.position, holder, row.section_id
                ),
            )),
            None => {
                taken.insert(slot, row.id);
            }
        }
    }
    conflicts
}

/// True when following parent links from some row never reaches a root.
fn has_cycle(items: &[Item]) -> bool {
    let parents: HashMap<ItemId, Option<ItemId>> = items.iter().map(|i| (i.id, i.parent_id)).collect();
    items.iter().any(|item| {
        let mut current = item.parent_id;
        let mut steps = 0;
        while let Some(node) = current {
            steps += 1;
            if node == item.id || steps > parents.len() {
                return true;
            }
            current = parents.get(&node).copied().flatten();
        }
        false
    })
}

/// Apply a sort batch inside `tx`. Per-entry failures are collected, not
/// raised; only storage failures outside a single row abort the batch.
pub async fn sort_items(
    tx: &mut dyn MenuTransaction,
    entries: &[SortEntry],
    max_depth: usize,
) -> Result<SortOutcome, DomainError> {
    let mut errors = Vec::new();

    let mut ids: Vec<ItemId> = entries.iter().filter_map(|e| e.id).collect();
    ids.sort_unstable();
    ids.dedup();

    let rows: HashMap<ItemId, Item> = tx
        .lock_items(&ids)
        .await?
        .into_iter()
        .map(|i| (i.id, i))
        .collect();

    let mut wanted_parents: Vec<ItemId> = entries
        .iter()
        .filter_map(|e| e.parent_id.flatten())
        .filter(|p| !rows.contains_key(p))
        .collect();
    wanted_parents.sort_unstable();
    wanted_parents.dedup();
    let outside_parents: HashSet<ItemId> = tx
        .find_items(&wanted_parents)
        .await?
        .into_iter()
        .map(|i| i.id)
        .collect();

    let sections = known_sections(tx, entries).await?;

    let mut seen = HashSet::new();
    let mut ordered: Vec<Candidate> = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        let Some(id) = entry.id else {
            errors.push(SortItemError::new(None, format!("entry {} is missing an item id", index)));
            continue;
        };
        let Some(current) = rows.get(&id) else {
            errors.push(SortItemError::new(Some(id), format!("item {} not found", id)));
            continue;
        };
        if entry.parent_id == Some(Some(id)) {
            errors.push(SortItemError::new(Some(id), format!("item {} cannot be parent of itself", id)));
            continue;
        }
        if let Some(Some(parent_id)) = entry.parent_id {
            if !rows.contains_key(&parent_id) && !outside_parents.contains(&parent_id) {
                errors.push(SortItemError::new(Some(id), format!("parent {} not found", parent_id)));
                continue;
            }
        }
        if let Some(section_id) = entry.section_id {
            if !sections.contains(&section_id) {
                errors.push(SortItemError::new(Some(id), format!("section {} not found", section_id)));
                continue;
            }
        }
        if !seen.insert(id) {
            errors.push(SortItemError::new(Some(id), format!("item {} appears more than once in the batch", id)));
            continue;
        }

        let mut row = current.clone();
        row.position = entry.position;
        if let Some(parent) = entry.parent_id {
            row.parent_id = parent;
        }
        if let Some(section_id) = entry.section_id {
            row.section_id = section_id;
        }
        if let Err(e) = row.validate_row() {
            errors.push(SortItemError::new(Some(id), e.to_string()));
            continue;
        }
        // children carry the section too; a lone row cannot change it
        if row.section_id != current.section_id && !tx.children_of(&[id]).await?.is_empty() {
            errors.push(SortItemError::new(
                Some(id),
                format!("item {} has children; use move to change its section", id),
            ));
            continue;
        }
        row.touch();

        ordered.push(Candidate { index, id, reparents: entry.parent_id.is_some(), row });
    }

    // Grouped by destination parent, then by requested position.
    ordered.sort_by_key(|c| (c.row.parent_id, c.row.position, c.index));

    // Admit against the simulated final tree. A rejection changes that tree,
    // so admission reruns until it settles.
    let everything = tx.list_items().await?;
    let mut rejected: HashSet<usize> = HashSet::new();
    let admitted = loop {
        let mut links = ParentMap::new(&everything, max_depth);
        let mut admitted = Vec::with_capacity(ordered.len());
        let mut fresh = Vec::new();
        for (k, candidate) in ordered.iter().enumerate() {
            if rejected.contains(&k) {
                continue;
            }
            if candidate.reparents {
                if let Some(parent_id) = candidate.row.parent_id {
                    if links.would_close_loop(candidate.id, parent_id) {
                        fresh.push((
                            k,
                            format!("moving item {} under {} would create a cycle", candidate.id, parent_id),
                        ));
                        continue;
                    }
                }
                links.link(candidate.id, candidate.row.parent_id);
            }
            admitted.push(k);
        }
        fresh.extend(position_conflicts(&everything, &ordered, &admitted));

        if fresh.is_empty() {
            break admitted;
        }
        for (k, message) in fresh {
            rejected.insert(k);
            errors.push(SortItemError::new(Some(ordered[k].id), message));
        }
    };

    let mut updated_count = 0;
    let mut write_failed = false;
    for k in admitted {
        let candidate = &ordered[k];
        match tx.update_item(&candidate.row).await {
            Ok(()) => updated_count += 1,
            Err(e) => {
                warn!(item_id = candidate.id, error = %e, "Sort entry rejected");
                write_failed = true;
                errors.push(SortItemError::new(Some(candidate.id), e.to_string()));
            }
        }
    }

    let items = tx.list_items().await?;
    if write_failed && has_cycle(&items) {
        // a later entry leaned on a parent link that was never written
        return Err(DomainError::InvalidOperation(
            "sort batch would leave a cycle after a failed row write".to_string(),
        ));
    }
    let menu = build_menu(tx.list_sections().await?, items);

    let status = if errors.is_empty() { SortStatus::Success } else { SortStatus::Partial };
    info!(
        requested = entries.len(),
        updated = updated_count,
        failed = errors.len(),
        status = ?status,
        "Sort batch applied"
    );

    Ok(SortOutcome { status, updated_count, errors, items: menu })
}

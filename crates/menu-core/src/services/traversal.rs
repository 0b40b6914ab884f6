// ============================================================================
// Menu Core - Tree Traversal
// File: crates/menu-core/src/services/traversal.rs
// Description: Cycle guard and subtree enumeration over parent links
// ============================================================================
//! Both walks go *downward* from a node, one `children_of` query per level,
//! with a visited set and a depth bound so corrupted (cyclic) data still
//! terminates.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use menu_shared::ItemId;

use crate::domain::Item;
use crate::error::DomainError;
use crate::repositories::ChildrenSource;

fn depth_exceeded(root: ItemId, max_depth: usize) -> DomainError {
    DomainError::InvalidOperation(format!(
        "subtree of item {} is deeper than {} levels",
        root, max_depth
    ))
}

/// True when `candidate_parent_id` is `moved_id` itself or one of its descendants.
pub async fn would_create_cycle<S>(
    source: &mut S,
    moved_id: ItemId,
    candidate_parent_id: ItemId,
    max_depth: usize,
) -> Result<bool, DomainError>
where
    S: ChildrenSource + ?Sized,
{
    if moved_id == candidate_parent_id {
        return Ok(true);
    }

    let mut visited = HashSet::from([moved_id]);
    let mut frontier = vec![moved_id];
    let mut depth = 0;

    while !frontier.is_empty() {
        if depth >= max_depth {
            return Err(depth_exceeded(moved_id, max_depth));
        }
        let children = source.children_of(&frontier).await?;
        frontier.clear();
        for child in children {
            if child.id == candidate_parent_id {
                debug!(moved_id, candidate_parent_id, depth, "Candidate parent is a descendant");
                return Ok(true);
            }
            if visited.insert(child.id) {
                frontier.push(child.id);
            }
        }
        depth += 1;
    }

    Ok(false)
}

/// A node plus all of its descendants, as read inside one transaction.
#[derive(Debug, Clone)]
pub struct Subtree {
    root_id: ItemId,
    members: HashMap<ItemId, Item>,
    children: HashMap<ItemId, Vec<ItemId>>,
}

impl Subtree {
    pub fn root_id(&self) -> ItemId {
        self.root_id
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.members.contains_key(&id)
    }

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.members.get(&id)
    }

    /// Member ids in ascending order.
    pub fn ids(&self) -> Vec<ItemId> {
        let mut ids: Vec<ItemId> = self.members.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Root first, then depth-first with siblings in (position, id) order.
    pub fn preorder(&self) -> Vec<ItemId> {
        let mut out = Vec::with_capacity(self.members.len());
        let mut stack = vec![self.root_id];
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(kids) = self.children.get(&id) {
                stack.extend(kids.iter().rev());
            }
        }
        out
    }
}

pub async fn subtree_of<S>(source: &mut S, root: &Item, max_depth: usize) -> Result<Subtree, DomainError>
where
    S: ChildrenSource + ?Sized,
{
    let mut members = HashMap::from([(root.id, root.clone())]);
    let mut children: HashMap<ItemId, Vec<ItemId>> = HashMap::new();
    let mut frontier = vec![root.id];
    let mut depth = 0;

    while !frontier.is_empty() {
        if depth >= max_depth {
            return Err(depth_exceeded(root.id, max_depth));
        }
        let mut level = source.children_of(&frontier).await?;
        level.sort_by_key(|i| (i.position, i.id));
        frontier.clear();
        for child in level {
            let Some(parent_id) = child.parent_id else { continue };
            if members.contains_key(&child.id) {
                continue;
            }
            children.entry(parent_id).or_default().push(child.id);
            frontier.push(child.id);
            members.insert(child.id, child);
        }
        depth += 1;
    }

    debug!(root_id = root.id, size = members.len(), depth, "Enumerated subtree");
    Ok(Subtree { root_id: root.id, members, children })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewItem;
    use async_trait::async_trait;

    struct Rows(Vec<Item>);

    #[async_trait]
    impl ChildrenSource for Rows {
        async fn children_of(&mut self, parents: &[ItemId]) -> Result<Vec<Item>, DomainError> {
            Ok(self
                .0
                .iter()
                .filter(|i| i.parent_id.map_or(false, |p| parents.contains(&p)))
                .cloned()
                .collect())
        }
    }

    fn row(id: ItemId, parent: Option<ItemId>, position: i32) -> Item {
        let mut new = NewItem::header(&format!("n{id}"), position, 1).unwrap();
        new.parent_id = parent;
        new.into_item(id)
    }

    //  1
    //  ├── 2 (pos 2)
    //  │   └── 4
    //  └── 3 (pos 1)
    //  5
    fn sample() -> Rows {
        Rows(vec![
            row(1, None, 1),
            row(2, Some(1), 2),
            row(3, Some(1), 1),
            row(4, Some(2), 1),
            row(5, None, 2),
        ])
    }

    #[tokio::test]
    async fn test_cycle_into_self() {
        let mut rows = sample();
        assert!(would_create_cycle(&mut rows, 1, 1, 8).await.unwrap());
    }

    #[tokio::test]
    async fn test_cycle_into_grandchild() {
        let mut rows = sample();
        assert!(would_create_cycle(&mut rows, 1, 4, 8).await.unwrap());
    }

    #[tokio::test]
    async fn test_no_cycle_into_sibling_tree() {
        let mut rows = sample();
        assert!(!would_create_cycle(&mut rows, 2, 3, 8).await.unwrap());
        assert!(!would_create_cycle(&mut rows, 1, 5, 8).await.unwrap());
        // moving a child under its ancestor is fine
        assert!(!would_create_cycle(&mut rows, 4, 1, 8).await.unwrap());
    }

    #[tokio::test]
    async fn test_cycle_guard_terminates_on_corrupt_data() {
        let mut rows = Rows(vec![row(1, Some(2), 1), row(2, Some(1), 1), row(3, None, 1)]);
        assert!(!would_create_cycle(&mut rows, 1, 3, 8).await.unwrap());
    }

    #[tokio::test]
    async fn test_subtree_preorder_follows_positions() {
        let mut rows = sample();
        let root = rows.0[0].clone();
        let subtree = subtree_of(&mut rows, &root, 8).await.unwrap();
        assert_eq!(subtree.ids(), vec![1, 2, 3, 4]);
        assert_eq!(subtree.preorder(), vec![1, 3, 2, 4]);
        assert!(!subtree.contains(5));
    }

    #[tokio::test]
    async fn test_subtree_of_leaf() {
        let mut rows = sample();
        let leaf = rows.0[3].clone();
        let subtree = subtree_of(&mut rows, &leaf, 8).await.unwrap();
        assert_eq!(subtree.ids(), vec![4]);
        assert_eq!(subtree.len(), 1);
    }

    #[tokio::test]
    async fn test_subtree_depth_bound() {
        let mut rows = Rows((1..=10).map(|id| row(id, if id == 1 { None } else { Some(id - 1) }, 1)).collect());
        let root = rows.0[0].clone();
        let err = subtree_of(&mut rows, &root, 3).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidOperation(_)));
        assert!(subtree_of(&mut rows, &root, 16).await.is_ok());
    }

    #[tokio::test]
    async fn test_subtree_terminates_on_corrupt_data() {
        let mut rows = Rows(vec![row(1, Some(2), 1), row(2, Some(1), 1)]);
        let root = rows.0[0].clone();
        let subtree = subtree_of(&mut rows, &root, 8).await.unwrap();
        assert_eq!(subtree.ids(), vec![1, 2]);
    }
}

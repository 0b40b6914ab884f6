//! Nested read model of the menu, assembled from flat rows.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use menu_shared::{ItemId, SectionId};

use super::item::Item;
use super::section::Section;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemNode {
    #[serde(flatten)]
    pub item: Item,
    pub children: Vec<ItemNode>,
}

impl ItemNode {
    /// Ids of this node and its descendants in display order.
    pub fn flatten_ids(&self) -> Vec<ItemId> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node.item.id);
            stack.extend(node.children.iter().rev());
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionTree {
    #[serde(flatten)]
    pub section: Section,
    pub items: Vec<ItemNode>,
}

impl SectionTree {
    pub fn find(&self, id: ItemId) -> Option<&ItemNode> {
        let mut stack: Vec<&ItemNode> = self.items.iter().collect();
        while let Some(node) = stack.pop() {
            if node.item.id == id {
                return Some(node);
            }
            stack.extend(node.children.iter());
        }
        None
    }

    pub fn root_ids(&self) -> Vec<ItemId> {
        self.items.iter().map(|n| n.item.id).collect()
    }
}

/// Assemble section trees. Siblings are ordered by (position, id). Rows not
/// reachable from a section root (orphans, cycles) are left out.
pub fn build_menu(mut sections: Vec<Section>, items: Vec<Item>) -> Vec<SectionTree> {
    sections.sort_by_key(|s| (s.section_type, s.id));

    let mut roots: HashMap<SectionId, Vec<Item>> = HashMap::new();
    let mut children: HashMap<ItemId, Vec<Item>> = HashMap::new();
    for item in items {
        match item.parent_id {
            Some(parent) => children.entry(parent).or_default().push(item),
            None => roots.entry(item.section_id).or_default().push(item),
        }
    }
    for list in roots.values_mut().chain(children.values_mut()) {
        list.sort_by_key(|i| (i.position, i.id));
    }

    let mut visited = HashSet::new();
    sections
        .into_iter()
        .map(|section| {
            let items = roots
                .remove(&section.id)
                .unwrap_or_default()
                .into_iter()
                .filter_map(|item| attach(item, &mut children, &mut visited))
                .collect();
            SectionTree { section, items }
        })
        .collect()
}

fn attach(
    item: Item,
    children: &mut HashMap<ItemId, Vec<Item>>,
    visited: &mut HashSet<ItemId>,
) -> Option<ItemNode> {
    if !visited.insert(item.id) {
        return None;
    }
    let kids = children.remove(&item.id).unwrap_or_default();
    let nodes = kids
        .into_iter()
        .filter_map(|child| attach(child, children, visited))
        .collect();
    Some(ItemNode { item, children: nodes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewItem, SectionType};

    fn item(id: ItemId, section: SectionId, parent: Option<ItemId>, position: i32) -> Item {
        let mut new = NewItem::header(&format!("item-{id}"), position, section).unwrap();
        new.parent_id = parent;
        new.into_item(id)
    }

    #[test]
    fn test_build_orders_siblings_by_position() {
        let sections = vec![Section::new(2, SectionType::Main), Section::new(1, SectionType::Left)];
        let items = vec![
            item(1, 1, None, 2),
            item(2, 1, None, 1),
            item(3, 1, Some(1), 0),
            item(4, 2, None, 0),
        ];

        let menu = build_menu(sections, items);
        assert_eq!(menu[0].section.section_type, SectionType::Left);
        assert_eq!(menu[0].root_ids(), vec![2, 1]);
        assert_eq!(menu[0].find(1).unwrap().children[0].item.id, 3);
        assert_eq!(menu[1].root_ids(), vec![4]);
    }

    #[test]
    fn test_cyclic_rows_are_dropped() {
        let sections = vec![Section::new(1, SectionType::Main)];
        let items = vec![item(1, 1, None, 0), item(2, 1, Some(3), 0), item(3, 1, Some(2), 0)];

        let menu = build_menu(sections, items);
        assert_eq!(menu[0].root_ids(), vec![1]);
        assert!(menu[0].find(2).is_none());
    }

    #[test]
    fn test_flatten_ids_is_preorder() {
        let sections = vec![Section::new(1, SectionType::Main)];
        let items = vec![
            item(1, 1, None, 0),
            item(2, 1, Some(1), 1),
            item(3, 1, Some(1), 0),
            item(4, 1, Some(3), 0),
        ];
        let menu = build_menu(sections, items);
        assert_eq!(menu[0].items[0].flatten_ids(), vec![1, 3, 4, 2]);
    }
}

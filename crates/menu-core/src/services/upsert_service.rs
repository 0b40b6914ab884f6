//! Full-replace upsert of positional sections.

use std::collections::VecDeque;

use tracing::info;

use menu_shared::{ItemId, Position, SectionId};

use crate::domain::{build_menu, ItemInput, NewItem, Section, SectionTree, SectionType, UpsertMenuRequest};
use crate::error::DomainError;
use crate::repositories::MenuTransaction;

use super::serializer;

fn position_of(input: &ItemInput, index: usize) -> Result<Position, DomainError> {
    match input.position {
        Some(position) => Ok(position),
        None => Position::try_from(index + 1)
            .map_err(|_| DomainError::InvalidArgument("too many sibling items".to_string())),
    }
}

fn to_new_item(
    input: &ItemInput,
    index: usize,
    section_id: SectionId,
    parent_id: Option<ItemId>,
) -> Result<NewItem, DomainError> {
    NewItem::new(
        input.item_type,
        input.label.clone(),
        input.link.clone(),
        position_of(input, index)?,
        section_id,
        parent_id,
    )
}

/// Reject the whole payload before anything is deleted.
pub fn check_payload(inputs: &[ItemInput]) -> Result<(), DomainError> {
    let mut stack: Vec<(usize, &ItemInput)> = inputs.iter().enumerate().collect();
    while let Some((index, input)) = stack.pop() {
        if let (Some(id), Some(parent_id)) = (input.id, input.parent_id) {
            if id == parent_id {
                return Err(DomainError::InvalidArgument(format!(
                    "item {} cannot be parent of itself",
                    id
                )));
            }
        }
        to_new_item(input, index, 0, None)?;
        stack.extend(input.items.iter().enumerate());
    }
    Ok(())
}

async fn section_for(
    tx: &mut dyn MenuTransaction,
    section_type: SectionType,
) -> Result<Section, DomainError> {
    match tx.find_section_by_type(section_type).await? {
        Some(section) => Ok(section),
        None => {
            info!(section_type = section_type.as_str(), "Creating section on first reference");
            tx.create_section(section_type).await
        }
    }
}

async fn rebuild(
    tx: &mut dyn MenuTransaction,
    section_id: SectionId,
    inputs: &[ItemInput],
) -> Result<usize, DomainError> {
    let removed = tx.delete_section_items(section_id).await?;

    let mut created = 0;
    let mut queue: VecDeque<(Option<ItemId>, usize, &ItemInput)> =
        inputs.iter().enumerate().map(|(i, input)| (None, i, input)).collect();
    while let Some((parent_id, index, input)) = queue.pop_front() {
        let item = tx.insert_item(&to_new_item(input, index, section_id, parent_id)?).await?;
        created += 1;
        queue.extend(input.items.iter().enumerate().map(|(i, child)| (Some(item.id), i, child)));
    }

    info!(section_id, removed, created, "Section rebuilt");
    Ok(created)
}

pub async fn upsert_menu(
    tx: &mut dyn MenuTransaction,
    request: &UpsertMenuRequest,
) -> Result<Vec<SectionTree>, DomainError> {
    let mut plan: Vec<(SectionType, &[ItemInput])> = vec![
        (SectionType::Left, request.left.as_slice()),
        (SectionType::Main, request.main.as_slice()),
    ];
    if let Some(right) = &request.right {
        plan.push((SectionType::Right, right.as_slice()));
    }

    for (_, inputs) in &plan {
        check_payload(inputs)?;
    }

    let mut targets = Vec::with_capacity(plan.len());
    for (section_type, inputs) in plan {
        let section = section_for(tx, section_type).await?;
        targets.push((section.id, inputs));
    }

    let keys: Vec<SectionId> = targets.iter().map(|(id, _)| *id).collect();
    serializer::lock_sections(tx, &keys).await?;

    for (section_id, inputs) in targets {
        rebuild(tx, section_id, inputs).await?;
    }

    Ok(build_menu(tx.list_sections().await?, tx.list_items().await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_self_parent_rejected() {
        let mut child = ItemInput::link("Shoes", "/shoes");
        child.id = Some(12);
        child.parent_id = Some(12);
        let payload = vec![ItemInput::header("Shop", vec![child])];
        let err = check_payload(&payload).unwrap_err();
        assert!(matches!(err, DomainError::InvalidArgument(_)));
    }

    #[test]
    fn test_payload_link_without_target_rejected() {
        let mut broken = ItemInput::link("Blog", "");
        broken.link = None;
        assert!(check_payload(&[broken]).is_err());
    }

    #[test]
    fn test_payload_ok() {
        let payload = vec![
            ItemInput::link("Home", "/"),
            ItemInput::header("Shop", vec![ItemInput::link("Shoes", "/shoes")]),
        ];
        assert!(check_payload(&payload).is_ok());
    }

    #[test]
    fn test_position_falls_back_to_index() {
        let input = ItemInput::link("Home", "/");
        assert_eq!(position_of(&input, 0).unwrap(), 1);
        let mut pinned = input.clone();
        pinned.position = Some(7);
        assert_eq!(position_of(&pinned, 0).unwrap(), 7);
    }
}

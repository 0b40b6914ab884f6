//! Concurrent writers against one store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use common::{assert_acyclic, assert_unique_positions, Fixture};
use menu_core::domain::MoveRequest;
use menu_core::error::DomainError;
use menu_core::repositories::{MenuStore, NoopRevalidator};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_moves_in_one_section_keep_positions_unique() {
    let fx = Fixture::new().await;
    let parent = fx.link("Parent", 1, fx.main, None).await;
    let mut children = Vec::new();
    for position in 1..=6 {
        children.push(fx.link(&format!("Child{}", position), position, fx.main, Some(parent)).await);
    }

    let handles: Vec<_> = children
        .iter()
        .map(|&id| {
            let engine = Arc::clone(&fx.engine);
            tokio::spawn(async move { engine.move_subtree(MoveRequest::to_root(id, 1)).await })
        })
        .collect();

    for result in join_all(handles).await {
        result.unwrap().unwrap();
    }

    let items = fx.store.items();
    assert_unique_positions(&items);
    assert_acyclic(&items);
    assert!(fx.children(fx.main, Some(parent)).is_empty());
    assert_eq!(fx.children(fx.main, None).len(), 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_crossing_moves_never_build_a_cycle() {
    let fx = Fixture::new().await;
    let a = fx.link("A", 1, fx.main, None).await;
    let b = fx.link("B", 2, fx.main, None).await;

    let first = {
        let engine = Arc::clone(&fx.engine);
        tokio::spawn(async move { engine.move_subtree(MoveRequest::under(a, b, 1)).await })
    };
    let second = {
        let engine = Arc::clone(&fx.engine);
        tokio::spawn(async move { engine.move_subtree(MoveRequest::under(b, a, 1)).await })
    };

    let results = [first.await.unwrap(), second.await.unwrap()];
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(DomainError::InvalidOperation(_)))));

    let items = fx.store.items();
    assert_acyclic(&items);
    assert_unique_positions(&items);
}

#[tokio::test]
async fn test_other_sections_proceed_while_one_is_locked() {
    let fx = Fixture::with_revalidator(Arc::new(NoopRevalidator), Duration::from_millis(50)).await;
    let m = fx.link("M", 1, fx.main, None).await;
    let l1 = fx.link("L1", 1, fx.left, None).await;
    let l2 = fx.link("L2", 2, fx.left, None).await;

    let mut holder = fx.store.begin().await.unwrap();
    holder.lock_section(fx.main).await.unwrap();

    fx.engine.move_subtree(MoveRequest::under(l2, l1, 1)).await.unwrap();
    assert_eq!(fx.item(l2).parent_id, Some(l1));

    let blocked = fx.engine.move_subtree(MoveRequest::to_root(m, 2)).await;
    assert!(matches!(blocked, Err(DomainError::Busy(_))));

    drop(holder);
    fx.engine.move_subtree(MoveRequest::to_root(m, 2)).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_waiting_move_runs_after_lock_release() {
    let fx = Fixture::new().await;
    let a = fx.link("A", 1, fx.main, None).await;
    fx.link("B", 2, fx.main, None).await;

    let mut holder = fx.store.begin().await.unwrap();
    holder.lock_section(fx.main).await.unwrap();

    let waiting = {
        let engine = Arc::clone(&fx.engine);
        tokio::spawn(async move { engine.move_subtree(MoveRequest::to_root(a, 3)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiting.is_finished());

    holder.commit().await.unwrap();
    waiting.await.unwrap().unwrap();
    assert_eq!(fx.item(a).position, 3);
}

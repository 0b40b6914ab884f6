//! Per-key async mutexes with a bounded wait. Idle keys are dropped from the
//! map as soon as nobody holds or waits on them.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<i64, Arc<Mutex<()>>>;

/// Remove `key` when the map holds the only reference to its mutex.
fn forget_if_idle(map: &LockMap, key: i64) {
    map.remove_if(&key, |_, mutex| Arc::strong_count(mutex) == 1);
}

/// Held lock on one key. Dropping it releases the key.
pub struct KeyGuard {
    key: i64,
    map: Arc<LockMap>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // the guard owns a reference to the mutex; release it before counting
        self.guard.take();
        forget_if_idle(&self.map, self.key);
    }
}

#[derive(Default)]
pub struct KeyedLocks {
    map: Arc<LockMap>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait up to `timeout` for `key`. `None` means the wait ran out.
    pub async fn acquire(&self, key: i64, timeout: Duration) -> Option<KeyGuard> {
        let mutex = {
            let entry = self.map.entry(key).or_insert_with(|| Arc::new(Mutex::new(())));
            Arc::clone(entry.value())
        };
        match tokio::time::timeout(timeout, mutex.lock_owned()).await {
            Ok(guard) => Some(KeyGuard { key, map: Arc::clone(&self.map), guard: Some(guard) }),
            Err(_) => {
                // the holder may have let go while this wait was being cancelled
                forget_if_idle(&self.map, key);
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_acquire_times_out() {
        let locks = KeyedLocks::new();
        let held = locks.acquire(7, Duration::from_millis(50)).await;
        assert!(held.is_some());
        assert!(locks.acquire(7, Duration::from_millis(20)).await.is_none());
        assert!(locks.acquire(8, Duration::from_millis(20)).await.is_some());
    }

    #[tokio::test]
    async fn test_release_on_drop() {
        let locks = KeyedLocks::new();
        drop(locks.acquire(1, Duration::from_millis(50)).await);
        assert!(locks.is_empty());

        let again = locks.acquire(1, Duration::from_millis(50)).await;
        assert!(again.is_some());
        assert_eq!(locks.len(), 1);
        drop(again);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_idle_keys_are_forgotten() {
        let locks = KeyedLocks::new();
        for key in 0..100 {
            drop(locks.acquire(key, Duration::from_millis(50)).await);
        }
        assert!(locks.is_empty());

        let held = locks.acquire(5, Duration::from_millis(50)).await;
        assert!(locks.acquire(5, Duration::from_millis(10)).await.is_none());
        assert_eq!(locks.len(), 1);
        drop(held);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_waiter_keeps_key_alive() {
        let locks = Arc::new(KeyedLocks::new());
        let held = locks.acquire(3, Duration::from_millis(50)).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move { locks.acquire(3, Duration::from_secs(2)).await.is_some() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        assert!(waiter.await.unwrap());
        assert!(locks.is_empty());
    }
}

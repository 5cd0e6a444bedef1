//! Per-page mutual exclusion for structural mutations.
//!
//! Every create, update, move, delete, instantiate, and revert holds the lock
//! of its page for the whole read-then-write sequence. Locks are in-process
//! only; separate processes sharing a database are not serialized.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

type LockMap = DashMap<Uuid, Arc<Mutex<()>>>;

/// Registry of per-page async mutexes.
///
/// An entry lives only while some task holds or waits on its page.
#[derive(Clone, Default)]
pub struct PageLocks {
    locks: Arc<LockMap>,
}

impl PageLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `page_id`.
    pub async fn lock(&self, page_id: Uuid) -> PageGuard {
        // Clone out of the map so no shard guard is held across the await.
        let mutex = self.locks.entry(page_id).or_default().clone();
        let guard = mutex.lock_owned().await;
        PageGuard {
            guard: Some(guard),
            locks: self.locks.clone(),
            page_id,
        }
    }

    /// Number of pages with a tracked lock.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Exclusive access to one page; released on drop.
pub struct PageGuard {
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
    page_id: Uuid,
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Waiters hold a clone of the mutex, so only the map's own reference
        // left means the page is idle. The shard lock taken by `remove_if`
        // excludes a concurrent `lock` cloning the entry.
        self.locks
            .remove_if(&self.page_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl std::fmt::Debug for PageLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageLocks")
            .field("pages", &self.locks.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_page_is_serialized() {
        let locks = PageLocks::new();
        let page = Uuid::now_v7();

        let guard = locks.lock(page).await;
        let contender = locks.clone();
        let waiting = tokio::spawn(async move {
            let _guard = contender.lock(page).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn different_pages_do_not_block() {
        let locks = PageLocks::new();
        let _a = locks.lock(Uuid::now_v7()).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock(Uuid::now_v7())).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn released_pages_are_forgotten() {
        let locks = PageLocks::new();
        let held = Uuid::now_v7();
        let _guard = locks.lock(held).await;
        drop(locks.lock(Uuid::now_v7()).await);

        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn entry_survives_while_a_waiter_remains() {
        let locks = PageLocks::new();
        let page = Uuid::now_v7();

        let guard = locks.lock(page).await;
        let contender = locks.clone();
        let waiting = tokio::spawn(async move { contender.lock(page).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(guard);
        let second = tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(locks.len(), 1);

        drop(second);
        assert!(locks.is_empty());
    }
}

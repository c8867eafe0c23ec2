//! Bounded pool of connection handlers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Caps the number of connections served at once.
///
/// A slot is reserved before a connection is accepted, so once the pool is
/// full the worker stops accepting and new clients wait in the listen
/// backlog. A reserved slot only counts as active once it is
/// [activated](PoolSlot::activate) for an accepted connection.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    capacity: usize,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            capacity,
        }
    }

    /// Wait for a free slot. Returns `None` once the pool is closed.
    pub async fn reserve(&self) -> Option<PoolSlot> {
        let permit = self.semaphore.clone().acquire_owned().await.ok()?;
        Some(PoolSlot {
            _permit: permit,
            active: self.active.clone(),
            peak: self.peak.clone(),
            activated: false,
        })
    }

    /// Stop handing out slots. Pending and future `reserve` calls return `None`.
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Accepted connections currently holding a slot.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of slots ever held at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A reserved pool slot; released on drop.
#[derive(Debug)]
pub struct PoolSlot {
    _permit: OwnedSemaphorePermit,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    activated: bool,
}

impl PoolSlot {
    /// Count this slot as an active connection.
    pub fn activate(&mut self) {
        if self.activated {
            return;
        }
        self.activated = true;
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }
}

impl Drop for PoolSlot {
    fn drop(&mut self) {
        if self.activated {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn reserved_slots_count_once_activated() {
        let pool = WorkerPool::new(2);
        let mut slot = pool.reserve().await.unwrap();
        assert_eq!(pool.active(), 0);

        slot.activate();
        slot.activate();
        assert_eq!(pool.active(), 1);
        assert_eq!(pool.peak(), 1);

        drop(slot);
        assert_eq!(pool.active(), 0);

        let idle = pool.reserve().await.unwrap();
        drop(idle);
        assert_eq!(pool.active(), 0);
        assert_eq!(pool.peak(), 1);
    }

    #[tokio::test]
    async fn slots_are_bounded_and_released() {
        let pool = WorkerPool::new(2);
        let mut a = pool.reserve().await.unwrap();
        let mut b = pool.reserve().await.unwrap();
        a.activate();
        b.activate();
        assert_eq!(pool.active(), 2);

        let third = tokio::time::timeout(Duration::from_millis(20), pool.reserve()).await;
        assert!(third.is_err(), "a third slot must wait while the pool is full");

        drop(a);
        let mut c = tokio::time::timeout(Duration::from_millis(100), pool.reserve())
            .await
            .unwrap()
            .unwrap();
        c.activate();
        assert_eq!(pool.active(), 2);
        drop(c);
        assert_eq!(pool.active(), 1);
        assert_eq!(pool.peak(), 2);
    }

    #[tokio::test]
    async fn close_wakes_waiters() {
        let pool = WorkerPool::new(1);
        let _held = pool.reserve().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.reserve().await.is_none() })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        pool.close();

        assert!(waiter.await.unwrap());
    }
}

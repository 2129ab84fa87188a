//! Name-scoped mutual exclusion.
//!
//! [`NamedLocker`] hands out one async mutex per arbitrary string key. Calls
//! with different keys never block each other; calls with the same key are
//! mutually exclusive. Lock objects are created lazily on first use and the
//! creation step is guarded by a single map lock, so two callers racing on an
//! unseen key always end up sharing one mutex.
//!
//! Unlocking is the guard's `Drop`, which makes an unlock without a matching
//! lock unrepresentable.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Lazily-populated set of per-key async mutexes.
#[derive(Default)]
pub struct NamedLocker {
    lockers: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Proof of exclusive access to one key. Released on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct NamedGuard {
    _guard: OwnedMutexGuard<()>,
}

impl NamedLocker {
    /// Create an empty locker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no one else holds `name`, then take it.
    pub async fn lock(&self, name: &str) -> NamedGuard {
        let locker = self.get_locker(name);
        NamedGuard {
            _guard: locker.lock_owned().await,
        }
    }

    /// Take `name` only if it is free right now.
    pub fn try_lock(&self, name: &str) -> Option<NamedGuard> {
        let locker = self.get_locker(name);
        locker
            .try_lock_owned()
            .ok()
            .map(|guard| NamedGuard { _guard: guard })
    }

    /// Drop the lock object for `name` if nobody holds or waits on it.
    ///
    /// Returns `true` if an entry was removed. Holders and waiters keep a
    /// reference to the mutex, so a strong count of one under the map lock
    /// means the entry is idle and no new caller can observe it afterwards.
    pub fn prune(&self, name: &str) -> bool {
        let mut lockers = self.lockers.lock();
        let idle = lockers
            .get(name)
            .is_some_and(|locker| Arc::strong_count(locker) == 1);
        if idle {
            let _ = lockers.remove(name);
        }
        idle
    }

    /// Number of lock objects currently tracked.
    pub fn len(&self) -> usize {
        self.lockers.lock().len()
    }

    /// Whether no lock objects are tracked.
    pub fn is_empty(&self) -> bool {
        self.lockers.lock().is_empty()
    }

    fn get_locker(&self, name: &str) -> Arc<AsyncMutex<()>> {
        let mut lockers = self.lockers.lock();
        Arc::clone(
            lockers
                .entry(name.to_owned())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }
}

//! Per-path write locks for the local backend.
//!
//! Each virtual path maps to a `tokio::sync::RwLock<()>`.  A mutation takes
//! the target exclusively and every ancestor directory shared, so editing
//! `d/f` and moving or deleting `d` exclude each other while unrelated paths
//! never contend.  Locks are always acquired in path order, which keeps
//! overlapping multi-path acquisitions deadlock free.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::path::VirtualPath;

/// Entries are only pruned once the map grows past this size.
const PRUNE_THRESHOLD: usize = 256;

/// Guards held for one mutation; released together on drop.
pub(crate) struct PathGuard {
    _shared: Vec<OwnedRwLockReadGuard<()>>,
    _exclusive: Vec<OwnedRwLockWriteGuard<()>>,
}

#[derive(Default)]
pub(crate) struct PathLocks {
    locks: Mutex<HashMap<VirtualPath, Arc<RwLock<()>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, path: &VirtualPath) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock();
        if locks.len() > PRUNE_THRESHOLD {
            locks.retain(|_, m| Arc::strong_count(m) > 1);
        }
        locks
            .entry(path.clone())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    pub async fn lock(&self, path: &VirtualPath) -> PathGuard {
        self.lock_all(&[path]).await
    }

    /// Lock both ends of a rename.
    pub async fn lock_pair(&self, a: &VirtualPath, b: &VirtualPath) -> PathGuard {
        self.lock_all(&[a, b]).await
    }

    async fn lock_all(&self, targets: &[&VirtualPath]) -> PathGuard {
        // true = exclusive.  A target wins over the same path seen as an
        // ancestor of another target.
        let mut plan: BTreeMap<VirtualPath, bool> = BTreeMap::new();
        for target in targets {
            for ancestor in target.ancestors() {
                plan.entry(ancestor).or_insert(false);
            }
            plan.insert((*target).clone(), true);
        }

        let mut shared = Vec::new();
        let mut held = Vec::new();
        for (path, exclusive) in plan {
            let lock = self.handle(&path);
            if exclusive {
                held.push(lock.write_owned().await);
            } else {
                shared.push(lock.read_owned().await);
            }
        }
        PathGuard {
            _shared: shared,
            _exclusive: held,
        }
    }

    /// Number of tracked paths.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

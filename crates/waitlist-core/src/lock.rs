//! Per-equipment critical sections
//!
//! Every mutation of one equipment's queue runs while holding that
//! equipment's lock. Locks for different equipment never nest.
//!
//! Entries live only while someone holds or waits on them, so the registry
//! stays bounded by the number of equipment items currently in use.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::ids::EquipmentId;

type Registry = Arc<Mutex<HashMap<EquipmentId, Arc<AsyncMutex<()>>>>>;

/// Registry of one async mutex per equipment item
#[derive(Debug, Clone, Default)]
pub struct EquipmentLocks {
    locks: Registry,
}

/// Exclusive access to one equipment's queue, released on drop
#[derive(Debug)]
pub struct EquipmentGuard {
    // Field order matters: the mutex is released before the lease is returned.
    _guard: OwnedMutexGuard<()>,
    _lease: Lease,
}

/// A registered interest in an equipment's mutex
#[derive(Debug)]
struct Lease {
    registry: Registry,
    equipment_id: EquipmentId,
    lock: Arc<AsyncMutex<()>>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        let mut locks = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let unused = locks
            .get(&self.equipment_id)
            .is_some_and(|entry| Arc::ptr_eq(entry, &self.lock) && Arc::strong_count(entry) == 2);
        if unused {
            locks.remove(&self.equipment_id);
        }
    }
}

impl EquipmentLocks {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to an equipment's queue.
    ///
    /// The guard releases the lock when dropped.
    pub async fn acquire(&self, equipment_id: &EquipmentId) -> EquipmentGuard {
        let lease = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Lease {
                registry: Arc::clone(&self.locks),
                equipment_id: equipment_id.clone(),
                lock: Arc::clone(locks.entry(equipment_id.clone()).or_default()),
            }
        };
        let guard = Arc::clone(&lease.lock).lock_owned().await;
        EquipmentGuard {
            _guard: guard,
            _lease: lease,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

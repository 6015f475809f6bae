use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// One async mutex per employee.
///
/// Held across the load-decide-write sequence of a single punch so two
/// concurrent deliveries for the same employee never interleave. Distinct
/// employees never contend.
#[derive(Debug, Default)]
pub struct EmployeeLocks {
    slots: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl EmployeeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, employee_id: Uuid) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().await;
            // A slot only the map references has no holder and no waiter.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            slots.entry(employee_id).or_default().clone()
        };
        slot.lock_owned().await
    }

    #[cfg(test)]
    async fn slot_count(&self) -> usize {
        self.slots.lock().await.len()
    }
}

//! Exclusión mutua por orden de trabajo
//!
//! Cada orden tiene su propio mutex async; la escritura sobre una orden
//! (write-back de extracción, edición, generación) se serializa con él.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct OrderLocks {
    locks: Arc<Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adquirir el lock de una orden
    pub async fn lock(&self, order_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            // Limpiar entradas que nadie está usando
            locks.retain(|id, lock| *id == order_id || Arc::strong_count(lock) > 1);
            locks
                .entry(order_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        lock.lock_owned().await
    }
}

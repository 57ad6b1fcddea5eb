use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::AbortHandle;

/// Live background tasks spawned by the runner.
///
/// Every task is registered for exactly as long as a caller is waiting on
/// it; the guard's drop aborts and unregisters it on every exit path.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    inner: Arc<Mutex<HashMap<u64, AbortHandle>>>,
    next_id: Arc<AtomicU64>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handle: AbortHandle) -> TaskGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, handle);
        TaskGuard {
            id,
            registry: self.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Abort everything still registered.
    pub fn abort_all(&self) {
        for (_, handle) in self.lock().drain() {
            handle.abort();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, AbortHandle>> {
        self.inner.lock().unwrap_or_else(|e| {
            tracing::warn!("task registry mutex was poisoned, recovering");
            e.into_inner()
        })
    }
}

/// Registration of one task; dropping it releases the task.
#[derive(Debug)]
pub struct TaskGuard {
    id: u64,
    registry: TaskRegistry,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.registry.lock().remove(&self.id) {
            handle.abort();
        }
    }
}

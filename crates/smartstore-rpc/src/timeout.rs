//! Per-attempt deadlines.
//!
//! Each armed deadline is a sleeping task keyed by correlation id. Disarming
//! aborts the task; disarming twice, or disarming an id that was never armed,
//! does nothing.

use crate::domain::correlation::CorrelationId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// Deadline timers for in-flight attempts
#[derive(Debug, Default)]
pub struct TimeoutGuard {
    armed: DashMap<CorrelationId, AbortHandle>,
    fired: AtomicU64,
}

impl TimeoutGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a deadline for `id`. `on_expire` runs once if the deadline is
    /// reached before [`TimeoutGuard::disarm`].
    ///
    /// Re-arming an id replaces its previous deadline.
    pub fn arm<F>(self: &Arc<Self>, id: CorrelationId, after: Duration, on_expire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let guard = Arc::clone(self);
        let spawn_timer = move || {
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                guard.fired.fetch_add(1, Ordering::Relaxed);
                warn!(
                    correlation_id = %id,
                    timeout_ms = after.as_millis() as u64,
                    "Deadline reached"
                );
                on_expire();
                guard.armed.remove(&id);
            })
            .abort_handle()
        };

        // The shard lock is held while spawning so the timer cannot remove
        // its own entry before it is inserted.
        match self.armed.entry(id) {
            Entry::Occupied(mut slot) => {
                let previous = slot.insert(spawn_timer());
                previous.abort();
            }
            Entry::Vacant(slot) => {
                slot.insert(spawn_timer());
            }
        }

        debug!(correlation_id = %id, timeout_ms = after.as_millis() as u64, "Deadline armed");
    }

    /// Stop the deadline for `id`. Returns false if none was armed.
    pub fn disarm(&self, id: CorrelationId) -> bool {
        match self.armed.remove(&id) {
            Some((_, timer)) => {
                timer.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, id: CorrelationId) -> bool {
        self.armed.contains_key(&id)
    }

    /// Number of deadlines currently running
    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }

    /// Deadlines that expired since creation
    pub fn fired_count(&self) -> u64 {
        self.fired.load(Ordering::Relaxed)
    }
}

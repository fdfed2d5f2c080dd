//! Correlation registry - the only shared mutable state of the client.
//!
//! Maps each in-flight attempt to exactly one pending settlement. Every
//! inbound message goes through one shared channel ([`Inbound`]) and is
//! matched by correlation id; a message for an id that is no longer pending
//! (settled, cancelled, never registered) is dropped.
//!
//! Flow:
//! 1. The client calls `register()` and receives a oneshot receiver
//! 2. The client arms a deadline and spawns the transport task
//! 3. The transport calls `Inbound::settle()` with the decoded envelope,
//!    or the deadline calls `cancel()` with `TIMEOUT`
//! 4. Whichever comes first removes the entry, disarms the deadline and
//!    delivers; the other is a no-op

use crate::domain::correlation::CorrelationId;
use crate::domain::envelope::Envelope;
use crate::domain::error::{ErrorKind, RpcError};
use crate::timeout::TimeoutGuard;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// Result delivered to the waiting attempt
pub type Settlement = Result<Envelope, RpcError>;

/// One attempt awaiting its response
struct PendingEntry {
    sender: oneshot::Sender<Settlement>,
    operation: String,
    attempt: u32,
    registered_at: Instant,
    transport: Option<AbortHandle>,
}

/// Registry counters
#[derive(Debug, Default)]
pub struct RegistryStats {
    /// Attempts registered
    pub registered: AtomicU64,
    /// Attempts settled by an inbound message or transport failure
    pub settled: AtomicU64,
    /// Attempts cancelled (timeouts included)
    pub cancelled: AtomicU64,
    /// Cancellations caused by a deadline
    pub timed_out: AtomicU64,
    /// Attempts whose waiter was gone at settlement time
    pub abandoned: AtomicU64,
    /// Inbound messages for ids that were not pending
    pub stray: AtomicU64,
}

/// Map of correlation id to pending settlement.
pub struct CorrelationRegistry {
    pending: DashMap<CorrelationId, PendingEntry>,
    deadlines: Arc<TimeoutGuard>,
    stats: RegistryStats,
}

impl CorrelationRegistry {
    pub fn new(deadlines: Arc<TimeoutGuard>) -> Self {
        Self {
            pending: DashMap::new(),
            deadlines,
            stats: RegistryStats::default(),
        }
    }

    /// Register a new attempt under a fresh id.
    ///
    /// The id never collides with one that is currently pending.
    pub fn register(
        &self,
        operation: &str,
        attempt: u32,
    ) -> (CorrelationId, oneshot::Receiver<Settlement>) {
        let (sender, receiver) = oneshot::channel();
        let entry = PendingEntry {
            sender,
            operation: operation.to_string(),
            attempt,
            registered_at: Instant::now(),
            transport: None,
        };

        let id = loop {
            let candidate = CorrelationId::new();
            if let Entry::Vacant(slot) = self.pending.entry(candidate) {
                slot.insert(entry);
                break candidate;
            }
        };

        self.stats.registered.fetch_add(1, Ordering::Relaxed);
        debug!(
            correlation_id = %id,
            operation = operation,
            attempt = attempt,
            "Registered pending attempt"
        );

        (id, receiver)
    }

    /// Record the task running the transport for `id`, so a cancellation can
    /// stop it. Returns false if `id` already left the registry.
    pub fn attach_transport(&self, id: CorrelationId, task: AbortHandle) -> bool {
        match self.pending.get_mut(&id) {
            Some(mut entry) => {
                entry.transport = Some(task);
                true
            }
            None => false,
        }
    }

    /// Deliver the outcome of an attempt.
    ///
    /// Returns true if this call settled the attempt; false if `id` was not
    /// pending, in which case nothing happens.
    pub fn settle(&self, id: CorrelationId, settlement: Settlement) -> bool {
        let Some((_, entry)) = self.pending.remove(&id) else {
            self.stats.stray.fetch_add(1, Ordering::Relaxed);
            warn!(correlation_id = %id, "Inbound message for unknown or settled correlation ID");
            return false;
        };

        self.deadlines.disarm(id);
        let elapsed = entry.registered_at.elapsed();

        let outcome = match &settlement {
            Ok(_) => "envelope",
            Err(e) => e.code(),
        };

        if entry.sender.send(settlement).is_ok() {
            self.stats.settled.fetch_add(1, Ordering::Relaxed);
            debug!(
                correlation_id = %id,
                operation = entry.operation,
                attempt = entry.attempt,
                outcome = outcome,
                elapsed_ms = elapsed.as_millis() as u64,
                "Settled pending attempt"
            );
        } else {
            self.stats.abandoned.fetch_add(1, Ordering::Relaxed);
            debug!(
                correlation_id = %id,
                operation = entry.operation,
                "Waiter dropped before settlement"
            );
        }

        true
    }

    /// Cancel a pending attempt with `reason`, stopping its transport task.
    ///
    /// Same at-most-once guarantee as [`CorrelationRegistry::settle`].
    pub fn cancel(&self, id: CorrelationId, reason: RpcError) -> bool {
        let Some((_, entry)) = self.pending.remove(&id) else {
            debug!(correlation_id = %id, "Cancel for unknown or settled correlation ID");
            return false;
        };

        self.deadlines.disarm(id);
        if let Some(task) = &entry.transport {
            task.abort();
        }

        self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
        if reason.kind() == ErrorKind::Timeout {
            self.stats.timed_out.fetch_add(1, Ordering::Relaxed);
        }

        debug!(
            correlation_id = %id,
            operation = entry.operation,
            attempt = entry.attempt,
            reason = %reason,
            "Cancelled pending attempt"
        );

        // The waiter may already be gone; the entry is removed either way.
        let _ = entry.sender.send(Err(reason));
        true
    }

    /// Drop a pending attempt whose waiter went away, without delivering.
    pub(crate) fn abandon(&self, id: CorrelationId) -> bool {
        let Some((_, entry)) = self.pending.remove(&id) else {
            return false;
        };
        self.deadlines.disarm(id);
        if let Some(task) = &entry.transport {
            task.abort();
        }
        self.stats.abandoned.fetch_add(1, Ordering::Relaxed);
        debug!(correlation_id = %id, operation = entry.operation, "Abandoned pending attempt");
        true
    }

    /// Handle given to transports for delivering inbound messages
    pub fn inbound(self: &Arc<Self>) -> Inbound {
        Inbound {
            registry: Arc::clone(self),
        }
    }

    /// Get number of currently pending attempts
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Check if a correlation ID is pending
    pub fn is_pending(&self, id: CorrelationId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Get statistics
    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }
}

/// The shared inbound channel.
///
/// Transports settle their attempt through this handle; it carries no
/// per-attempt state, so a stale or duplicated message is harmless.
#[derive(Clone)]
pub struct Inbound {
    registry: Arc<CorrelationRegistry>,
}

impl Inbound {
    /// Deliver a decoded outcome for `id`.
    pub fn settle(&self, id: CorrelationId, settlement: Settlement) -> bool {
        self.registry.settle(id, settlement)
    }

    /// Decode a raw response body and deliver it for `id`.
    pub fn deliver(&self, id: CorrelationId, body: &[u8]) -> bool {
        self.registry.settle(id, Envelope::decode(body))
    }

    /// Report that the channel could not deliver for `id`.
    pub fn fail(&self, id: CorrelationId, cause: impl std::fmt::Display) -> bool {
        self.registry.settle(id, Err(RpcError::transport(cause)))
    }

    pub fn is_pending(&self, id: CorrelationId) -> bool {
        self.registry.is_pending(id)
    }
}

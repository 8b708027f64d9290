//! Global admission gate for tile jobs.
//!
//! One gate is shared by every source and layer. It bounds how many jobs
//! may be past admission (opening sources, fetching ranges, decoding) at
//! the same time.
//!
//! ```text
//! request ──► acquire() ──┬─ slot free ─► GatePermit ─► work ─► drop ─► release
//!                         └─ saturated ─► FIFO wait ──┘
//! ```
//!
//! Waiters are resumed in arrival order (`tokio::sync::Semaphore` is
//! fair). The slot is returned when the [`GatePermit`] drops, so errors,
//! panics and cancelled futures all release it exactly once.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::metrics;

/// Returned when a cancellable acquire is cancelled while waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("gate wait cancelled")]
pub struct GateCancelled;

/// Bounded FIFO admission for tile jobs.
#[derive(Debug)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    counters: Arc<GateCounters>,
}

#[derive(Debug, Default)]
struct GateCounters {
    active: AtomicUsize,
    peak: AtomicUsize,
    admitted: AtomicU64,
    released: AtomicU64,
}

/// Point-in-time view of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateStats {
    pub max_concurrent: usize,
    pub active: usize,
    pub peak: usize,
    pub admitted: u64,
    pub released: u64,
}

impl ConcurrencyGate {
    /// Create a gate admitting at most `max_concurrent` jobs.
    ///
    /// # Panics
    ///
    /// Panics if `max_concurrent` is 0; configuration validation rejects it.
    pub fn new(max_concurrent: usize) -> Self {
        assert!(max_concurrent > 0, "max_concurrent must be > 0");
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            counters: Arc::new(GateCounters::default()),
        }
    }

    /// Wait for a slot.
    pub async fn acquire(&self) -> GatePermit {
        let started = Instant::now();
        let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            // The semaphore lives as long as the gate and is never closed.
            Err(_) => unreachable!("gate semaphore closed"),
        };
        self.admit(permit, started.elapsed())
    }

    /// Wait for a slot unless `cancel` fires first.
    ///
    /// A cancelled wait never holds a slot.
    pub async fn acquire_cancellable(
        &self,
        cancel: &CancellationToken,
    ) -> Result<GatePermit, GateCancelled> {
        if cancel.is_cancelled() {
            return Err(GateCancelled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Gate wait cancelled");
                Err(GateCancelled)
            }
            permit = self.acquire() => Ok(permit),
        }
    }

    /// Take a slot only if one is free right now.
    pub fn try_acquire(&self) -> Option<GatePermit> {
        let permit = Arc::clone(&self.semaphore).try_acquire_owned().ok()?;
        Some(self.admit(permit, Duration::ZERO))
    }

    fn admit(&self, permit: OwnedSemaphorePermit, waited: Duration) -> GatePermit {
        let active = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(active, Ordering::SeqCst);
        self.counters.admitted.fetch_add(1, Ordering::Relaxed);

        metrics::record_gate_admit(waited);
        trace!(active, waited_ms = waited.as_millis() as u64, "Gate admitted");

        GatePermit {
            _permit: permit,
            counters: Arc::clone(&self.counters),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Jobs currently holding a slot.
    pub fn active(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            max_concurrent: self.max_concurrent,
            active: self.counters.active.load(Ordering::SeqCst),
            peak: self.counters.peak.load(Ordering::SeqCst),
            admitted: self.counters.admitted.load(Ordering::Relaxed),
            released: self.counters.released.load(Ordering::Relaxed),
        }
    }
}

/// An admitted slot; released on drop.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    counters: Arc<GateCounters>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        // Fields drop after this body: the count falls before the slot is
        // handed on, so `active` never exceeds the maximum.
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
        self.counters.released.fetch_add(1, Ordering::Relaxed);
        metrics::record_gate_release();
    }
}

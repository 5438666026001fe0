//! Exclusive capture gate: one exposure in flight across all shot kinds.
//!
//! The physical device accepts a single outstanding capture. Every shot loop
//! acquires this gate before touching the device and holds the returned
//! permit through its result handler; dropping the permit releases the gate
//! on every path (success, failure, timeout). tokio's mutex queues waiters,
//! so no kind can be starved indefinitely by a higher-frequency one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Shared mutual-exclusion gate over the one physical device.
#[derive(Clone)]
pub struct CaptureGate {
    lock: Arc<Mutex<()>>,
    in_flight: Arc<AtomicBool>,
}

impl CaptureGate {
    pub fn new() -> Self {
        Self {
            lock: Arc::new(Mutex::new(())),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Wait until no other shot kind holds the gate, then claim it.
    pub async fn acquire(&self) -> CapturePermit {
        let guard = Arc::clone(&self.lock).lock_owned().await;
        let was_in_flight = self.in_flight.swap(true, Ordering::SeqCst);
        debug_assert!(!was_in_flight, "capture gate acquired while a capture is in flight");
        CapturePermit {
            _guard: guard,
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    /// Whether a capture currently holds the gate.
    pub fn in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }
}

impl Default for CaptureGate {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII permit for one capture. Releasing is dropping.
pub struct CapturePermit {
    _guard: OwnedMutexGuard<()>,
    in_flight: Arc<AtomicBool>,
}

impl Drop for CapturePermit {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

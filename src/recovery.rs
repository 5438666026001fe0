//! Reconnect supervision: one recovery attempt per outage.
//!
//! Shot loops report every capture failure here. Failures from the same
//! outage arrive repeatedly (every loop iteration until the link is back),
//! so reports are debounced against the connection generation they
//! observed: once an attempt has been made for a generation, further reports
//! for it are ignored. Concurrent reports collapse: whoever gets the slot
//! attempts, everyone else returns immediately. A failed attempt leaves the
//! session in terminal failure; no further automatic action is taken.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::device::DeviceSession;

pub struct ReconnectSupervisor {
    session: Arc<DeviceSession>,
    /// Highest generation a reconnect has been attempted for.
    attempted: AtomicU64,
    /// Held for the duration of an attempt; concurrent reports `try_lock`
    /// and bail instead of queueing a second attempt.
    slot: Mutex<()>,
}

impl ReconnectSupervisor {
    pub fn new(session: Arc<DeviceSession>) -> Self {
        Self {
            session,
            attempted: AtomicU64::new(0),
            slot: Mutex::new(()),
        }
    }

    /// Report a capture failure observed at `generation` (the session
    /// generation current when the capture began).
    pub async fn report_failure(&self, generation: u64) {
        let Ok(_slot) = self.slot.try_lock() else {
            debug!(generation, "reconnect already in progress, ignoring report");
            return;
        };

        if self.attempted.load(Ordering::SeqCst) >= generation {
            debug!(generation, "reconnect already attempted for this outage");
            return;
        }
        self.attempted.store(generation, Ordering::SeqCst);

        warn!(generation, "capture failure, attempting device reconnect");
        if self.session.reconnect().await {
            info!("device recovered");
        } else {
            error!("reconnect failed, device requires manual intervention");
        }
    }

    pub async fn is_terminally_failed(&self) -> bool {
        self.session.is_terminally_failed().await
    }
}

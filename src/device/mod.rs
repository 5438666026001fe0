//! Device session: the single connection to the capture device.
//!
//! Owns the connection state machine and bridges the driver's one-shot
//! completion callback into an awaitable capture result. The bridge creates
//! a fresh oneshot channel per exposure, hands the driver a closure that
//! fires it, and awaits under a bound of exposure plus a fixed margin, so a
//! caller is never left suspended by a device that went away mid-exposure.
//!
//! State machine: `Disconnected → Connected` via connect/reconnect;
//! `Connected → Disconnected` on any capture failure; `Disconnected →
//! TerminalFailure` when a reconnect attempt fails. Terminal failure is
//! absorbing and only cleared by restarting the process.

mod driver;
#[cfg(feature = "simulator")]
mod simulator;

pub use driver::{CameraDriver, CaptureCompletion};
#[cfg(feature = "simulator")]
pub use simulator::SimulatorDriver;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{oneshot, Mutex, RwLock};
use tracing::{error, info, warn};

use crate::config::{ColorMode, ShotConfig};
use crate::error::{CameraError, Result};

/// Delay after property writes before starting the exposure, so the device
/// latches gain/mode changes.
const PROPERTY_SETTLE: Duration = Duration::from_millis(100);

/// Added on top of the exposure duration to bound the completion wait.
const CAPTURE_TIMEOUT_MARGIN: Duration = Duration::from_secs(10);

/// Wait after rebuilding the driver binding before trusting its link state.
const RECONNECT_SETTLE: Duration = Duration::from_secs(5);

/// Connection state, owned exclusively by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    /// Reconnect failed; requires external intervention.
    TerminalFailure,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connected => "connected",
            ConnectionState::TerminalFailure => "terminal-failure",
        };
        f.write_str(s)
    }
}

/// Per-capture exposure parameters, built fresh from the shot config each
/// iteration.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub exposure_secs: f64,
    pub gain: f64,
    pub color_mode: ColorMode,
}

impl From<&ShotConfig> for CaptureRequest {
    fn from(cfg: &ShotConfig) -> Self {
        Self {
            exposure_secs: cfg.exposure_secs,
            gain: cfg.gain,
            color_mode: cfg.color_mode,
        }
    }
}

/// The single session over the physical device.
///
/// The capture gate guarantees at most one `capture` in flight; this type
/// does not re-enforce that, it only bridges and tracks state.
pub struct DeviceSession {
    driver: Arc<dyn CameraDriver>,
    state: RwLock<ConnectionState>,
    /// Bumped on every successful (re)connect. Failure reports carry the
    /// generation they observed so the recovery layer can tell a new outage
    /// from echoes of one already handled.
    generation: AtomicU64,
    reconnect_lock: Mutex<()>,
}

impl DeviceSession {
    pub fn new(driver: Arc<dyn CameraDriver>) -> Self {
        Self {
            driver,
            state: RwLock::new(ConnectionState::Disconnected),
            generation: AtomicU64::new(0),
            reconnect_lock: Mutex::new(()),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub async fn is_terminally_failed(&self) -> bool {
        self.state().await == ConnectionState::TerminalFailure
    }

    /// Connection generation at this instant; see the field docs.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Initial connection. Fails if the device cannot be reached.
    pub async fn connect(&self) -> Result<()> {
        if self.state().await == ConnectionState::TerminalFailure {
            return Err(CameraError::TerminalFailure);
        }
        self.driver.connect().await?;
        *self.state.write().await = ConnectionState::Connected;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(generation, "device connected");
        Ok(())
    }

    /// Run one exposure and await its result.
    ///
    /// Any failure (driver fault, dropped completion, bounded wait expired)
    /// flips the session out of `Connected` so the recovery layer knows the
    /// link is suspect.
    pub async fn capture(&self, req: &CaptureRequest) -> Result<Bytes> {
        match self.state().await {
            ConnectionState::Connected => {}
            ConnectionState::TerminalFailure => return Err(CameraError::TerminalFailure),
            ConnectionState::Disconnected => {
                return Err(CameraError::ConnectionLost("device not connected".into()))
            }
        }

        let result = self.run_exposure(req).await;
        if result.is_err() {
            self.mark_disconnected().await;
        }
        result
    }

    async fn run_exposure(&self, req: &CaptureRequest) -> Result<Bytes> {
        let exposure = Duration::from_secs_f64(req.exposure_secs);

        self.driver.set_color_mode(req.color_mode).await?;
        self.driver.set_gain(req.gain).await?;
        tokio::time::sleep(PROPERTY_SETTLE).await;

        let (tx, rx) = oneshot::channel();
        let on_done: CaptureCompletion = Box::new(move |outcome| {
            let _ = tx.send(outcome);
        });
        self.driver.begin_exposure(exposure, on_done).await?;

        let bound = exposure + CAPTURE_TIMEOUT_MARGIN;
        match tokio::time::timeout(bound, rx).await {
            Ok(Ok(Ok(bytes))) => Ok(bytes),
            Ok(Ok(Err(reason))) => Err(CameraError::CaptureFailed(reason)),
            // The driver dropped the callback without firing it.
            Ok(Err(_)) => Err(CameraError::CaptureFailed("completion dropped without firing".into())),
            Err(_) => Err(CameraError::CaptureTimeout(bound)),
        }
    }

    /// Tear down and rebuild the device binding.
    ///
    /// Returns `true` if the session ends up connected. Overlapping calls
    /// collapse into one attempt: later callers wait on the internal lock
    /// and then observe the first caller's outcome. A failed attempt flips
    /// the session into the absorbing `TerminalFailure` state.
    pub async fn reconnect(&self) -> bool {
        let _guard = self.reconnect_lock.lock().await;
        match self.state().await {
            ConnectionState::Connected => return true,
            ConnectionState::TerminalFailure => return false,
            ConnectionState::Disconnected => {}
        }

        info!("rebuilding device connection");
        self.driver.disconnect().await;
        if let Err(e) = self.driver.connect().await {
            warn!(error = %e, "reconnect failed to reach device");
            *self.state.write().await = ConnectionState::TerminalFailure;
            return false;
        }

        tokio::time::sleep(RECONNECT_SETTLE).await;
        if self.driver.is_connected() {
            *self.state.write().await = ConnectionState::Connected;
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            info!(generation, "device reconnected");
            true
        } else {
            error!("device still unreachable after reconnect, entering terminal failure");
            *self.state.write().await = ConnectionState::TerminalFailure;
            false
        }
    }

    async fn mark_disconnected(&self) {
        let mut state = self.state.write().await;
        if *state == ConnectionState::Connected {
            warn!("marking device disconnected after capture failure");
            *state = ConnectionState::Disconnected;
        }
    }
}

//! Camera driver seam.
//!
//! The hardware driver lives outside this crate (vendor SDK, INDI/INDIGO
//! binding, ...). The core only needs connection management, the per-shot
//! property writes, and a fire-and-forget exposure start whose completion
//! arrives through a one-shot callback. The session layer bridges that
//! callback into an awaitable result.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::ColorMode;
use crate::error::Result;

/// One-shot exposure completion: raw sensor bytes on success, the driver's
/// reason string on failure. Invoked at most once.
pub type CaptureCompletion = Box<dyn FnOnce(std::result::Result<Bytes, String>) + Send + 'static>;

/// Driver-side surface of a single capture device.
///
/// At most one exposure may be outstanding; enforcing that is the caller's
/// job (the capture gate), not the driver's.
#[async_trait]
pub trait CameraDriver: Send + Sync {
    /// Reach the device. Errors with `ConnectionLost` when unreachable.
    async fn connect(&self) -> Result<()>;

    /// Tear down the device binding. Idempotent.
    async fn disconnect(&self);

    /// Current link state as reported by the driver.
    fn is_connected(&self) -> bool;

    async fn set_color_mode(&self, mode: ColorMode) -> Result<()>;

    async fn set_gain(&self, gain: f64) -> Result<()>;

    /// Start an exposure and return immediately. `on_done` fires exactly once
    /// when the driver delivers the image or reports a fault; if the device
    /// drops mid-exposure the callback may never fire, which the session's
    /// bounded wait converts into a timeout failure.
    async fn begin_exposure(&self, duration: Duration, on_done: CaptureCompletion) -> Result<()>;
}

//! Error taxonomy for the camera service.
//!
//! Every failure inside a shot loop is converted into one of these kinds at
//! the iteration boundary; none of them terminate a loop. Only
//! `TerminalFailure` persists as user-visible degraded state.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the camera core.
#[derive(Debug, Error)]
pub enum CameraError {
    /// A shot-kind config entry was malformed or unsupported. The entry is
    /// dropped with a diagnostic; the rest of the config swap proceeds.
    #[error("invalid config entry '{kind}': {reason}")]
    ConfigInvalid { kind: String, reason: String },

    /// The device reported an error for this exposure.
    #[error("capture failed: {0}")]
    CaptureFailed(String),

    /// The device never delivered a completion within the bounded wait
    /// (exposure duration plus a fixed safety margin).
    #[error("capture timed out after {0:?}")]
    CaptureTimeout(Duration),

    /// The device is unreachable.
    #[error("device connection lost: {0}")]
    ConnectionLost(String),

    /// A reconnect attempt failed. Absorbing: cleared only by external
    /// intervention (process restart).
    #[error("device in terminal failure state, manual intervention required")]
    TerminalFailure,
}

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CameraError>;

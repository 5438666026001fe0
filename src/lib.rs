//! Allsky - unattended all-sky camera service
//!
//! A scheduler issues periodic exposures of several independent kinds (live
//! preview, archival save-to-disk, connectivity test), serializes them
//! against the single physical device, bridges the driver's completion
//! callbacks into awaitable results, and fans the latest preview out to any
//! number of HTTP/WebSocket viewers.
//!
//! Module map:
//!
//! - **`config`**: per-kind shot configuration, swap store, file watcher
//! - **`device`**: driver seam, device session, callback bridge, simulator
//! - **`gate`**: exclusive capture gate over the one physical device
//! - **`scheduler`**: one periodic shot loop per kind
//! - **`handlers`**: per-kind capture consumers (preview, archive, test)
//! - **`feed`**: latest-preview broadcast to independent subscribers
//! - **`recovery`**: one reconnect attempt per outage, terminal on failure
//! - **`conditions`** / **`codec`**: sky-condition and preview-encoding seams
//! - **`service`**: composition root and the surface the web layer consumes
//! - **`web`**: axum HTTP + WebSocket API

pub mod codec;
pub mod conditions;
pub mod config;
pub mod device;
pub mod error;
pub mod feed;
pub mod gate;
pub mod handlers;
pub mod recovery;
pub mod scheduler;
pub mod service;
pub mod web;

pub use config::{ColorMode, ConfigStore, ShotConfig, ShotConfigMap, ShotKind};
pub use device::{CameraDriver, CaptureRequest, ConnectionState, DeviceSession};
pub use error::{CameraError, Result};
pub use feed::{FeedSubscriber, Metadata, PreviewFeed, PreviewFrame};
pub use gate::CaptureGate;
pub use service::CameraService;

#[cfg(feature = "simulator")]
pub use device::SimulatorDriver;

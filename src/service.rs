//! Camera service: composition root and external surface.
//!
//! Owns the device session, config store, preview feed, capture gate, and
//! reconnect supervisor; spawns one shot loop per kind. Everything the web
//! layer needs (the feed, latest metadata, forced reconnects, degraded
//! state) goes through a cheaply clonable handle over shared inner state.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tracing::info;

use crate::codec::PreviewCodec;
use crate::conditions::SkyConditions;
use crate::config::{ConfigStore, ShotConfigMap, ShotKind};
use crate::device::{CameraDriver, ConnectionState, DeviceSession};
use crate::error::Result;
use crate::feed::{FeedSubscriber, Metadata, PreviewFeed, PreviewFrame};
use crate::gate::CaptureGate;
use crate::handlers::{ArchiveHandler, PreviewHandler, ShotHandler, TestingHandler};
use crate::recovery::ReconnectSupervisor;
use crate::scheduler::ShotScheduler;

/// Service-wide status snapshot for the API layer.
#[derive(Debug, Clone)]
pub struct ServiceStatus {
    pub connection: ConnectionState,
    pub terminally_failed: bool,
    pub frames_published: u64,
    pub uptime_secs: u64,
}

struct ServiceInner {
    session: Arc<DeviceSession>,
    config: Arc<ConfigStore>,
    feed: Arc<PreviewFeed>,
    gate: CaptureGate,
    recovery: Arc<ReconnectSupervisor>,
    conditions: Arc<dyn SkyConditions>,
    codec: Arc<dyn PreviewCodec>,
    archive_dir: PathBuf,
    started: Instant,
}

/// Handle to the running camera service. Clone freely.
#[derive(Clone)]
pub struct CameraService {
    inner: Arc<ServiceInner>,
}

impl CameraService {
    pub fn new(
        driver: Arc<dyn CameraDriver>,
        codec: Arc<dyn PreviewCodec>,
        conditions: Arc<dyn SkyConditions>,
        initial_config: ShotConfigMap,
        archive_dir: PathBuf,
    ) -> Self {
        let session = Arc::new(DeviceSession::new(driver));
        Self {
            inner: Arc::new(ServiceInner {
                recovery: Arc::new(ReconnectSupervisor::new(Arc::clone(&session))),
                session,
                config: Arc::new(ConfigStore::new(initial_config)),
                feed: Arc::new(PreviewFeed::new()),
                gate: CaptureGate::new(),
                conditions,
                codec,
                archive_dir,
                started: Instant::now(),
            }),
        }
    }

    /// Establish the initial device connection.
    pub async fn connect(&self) -> Result<()> {
        self.inner.session.connect().await
    }

    /// Spawn one shot loop per kind. Loops run until the handles are
    /// aborted or the process exits.
    pub fn spawn_shot_loops(&self) -> Vec<JoinHandle<()>> {
        let preview: Arc<dyn ShotHandler> = Arc::new(PreviewHandler::new(
            Arc::clone(&self.inner.codec),
            Arc::clone(&self.inner.feed),
            Arc::clone(&self.inner.config),
            Arc::clone(&self.inner.conditions),
        ));
        let archive: Arc<dyn ShotHandler> = Arc::new(ArchiveHandler::new(
            self.inner.archive_dir.clone(),
            Arc::clone(&self.inner.conditions),
        ));
        let testing: Arc<dyn ShotHandler> = Arc::new(TestingHandler);

        let kinds: [(ShotKind, Arc<dyn ShotHandler>); 3] = [
            (ShotKind::Preview, preview),
            (ShotKind::SaveToDisk, archive),
            (ShotKind::Testing, testing),
        ];

        info!("spawning shot loops");
        kinds
            .into_iter()
            .map(|(kind, handler)| {
                let scheduler = ShotScheduler::new(
                    kind,
                    Arc::clone(&self.inner.config),
                    Arc::clone(&self.inner.session),
                    self.inner.gate.clone(),
                    Arc::clone(&self.inner.recovery),
                    handler,
                );
                tokio::spawn(scheduler.run())
            })
            .collect()
    }

    /// Independent cursor over the preview feed.
    pub fn observe_feed(&self) -> FeedSubscriber {
        self.inner.feed.subscribe()
    }

    /// The most recently published preview frame, if any.
    pub fn latest_preview(&self) -> Option<Arc<PreviewFrame>> {
        self.inner.feed.latest()
    }

    /// Metadata of the latest preview, if any.
    pub fn latest_metadata(&self) -> Option<Metadata> {
        self.inner.feed.latest_metadata()
    }

    /// Operator-requested reconnect. Returns `false` exactly when the
    /// session is (or has just become) terminally failed.
    pub async fn force_reconnect(&self) -> bool {
        self.inner.session.reconnect().await
    }

    pub async fn is_terminally_failed(&self) -> bool {
        self.inner.session.is_terminally_failed().await
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.inner.session.state().await
    }

    /// Current sky/environment readings.
    pub fn conditions(&self) -> Metadata {
        self.inner.conditions.readings()
    }

    /// Shared config store (for the reload path / file watcher).
    pub fn config_store(&self) -> Arc<ConfigStore> {
        Arc::clone(&self.inner.config)
    }

    pub async fn status(&self) -> ServiceStatus {
        let connection = self.inner.session.state().await;
        ServiceStatus {
            connection,
            terminally_failed: connection == ConnectionState::TerminalFailure,
            frames_published: self.inner.feed.frames_published(),
            uptime_secs: self.inner.started.elapsed().as_secs(),
        }
    }

    /// The preview feed itself, for components that publish or inspect it
    /// directly.
    pub fn feed(&self) -> Arc<PreviewFeed> {
        Arc::clone(&self.inner.feed)
    }
}

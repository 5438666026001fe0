//! Per-kind shot handlers: what happens to a successful capture.
//!
//! Each shot kind pairs an admission predicate (may this kind fire right
//! now?) with a consumer for the raw image. The scheduler evaluates
//! admission fresh on every iteration and runs the consumer while still
//! holding the capture gate, so a kind's handler always finishes before its
//! next shot can start.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::codec::PreviewCodec;
use crate::conditions::SkyConditions;
use crate::config::{ConfigStore, ShotConfig, ShotKind};
use crate::error::Result;
use crate::feed::PreviewFeed;

/// Admission predicate plus capture consumer for one shot kind.
#[async_trait]
pub trait ShotHandler: Send + Sync {
    /// Whether this kind should fire under the given config. Called fresh
    /// every iteration; gating state (sky conditions) must not be cached.
    fn admits(&self, cfg: &ShotConfig) -> bool {
        cfg.enabled
    }

    /// Consume a successful capture's raw bytes.
    async fn on_capture(&self, raw: Bytes) -> Result<()>;
}

/// Encodes the capture and publishes it to the preview feed, with metadata
/// enriched by shot time, the active preview period, and a snapshot of the
/// current sky conditions.
pub struct PreviewHandler {
    codec: Arc<dyn PreviewCodec>,
    feed: Arc<PreviewFeed>,
    config: Arc<ConfigStore>,
    conditions: Arc<dyn SkyConditions>,
}

impl PreviewHandler {
    pub fn new(
        codec: Arc<dyn PreviewCodec>,
        feed: Arc<PreviewFeed>,
        config: Arc<ConfigStore>,
        conditions: Arc<dyn SkyConditions>,
    ) -> Self {
        Self { codec, feed, config, conditions }
    }
}

#[async_trait]
impl ShotHandler for PreviewHandler {
    async fn on_capture(&self, raw: Bytes) -> Result<()> {
        let (image, mut metadata) = self.codec.encode_preview(&raw)?;

        metadata.insert("shot_utc".into(), Utc::now().to_rfc3339().into());
        if let Some(cfg) = self.config.get(ShotKind::Preview) {
            metadata.insert("period_secs".into(), cfg.period_secs.into());
        }
        metadata.insert(
            "conditions".into(),
            serde_json::Value::Object(self.conditions.readings()),
        );

        self.feed.publish(image, metadata);
        Ok(())
    }
}

/// Writes the raw capture to the archive directory under a timestamped name.
///
/// Only fires under a dark sky: enabled AND (override OR (astronomical
/// night AND moonless)), re-evaluated on every iteration.
pub struct ArchiveHandler {
    dir: PathBuf,
    conditions: Arc<dyn SkyConditions>,
}

impl ArchiveHandler {
    pub fn new(dir: PathBuf, conditions: Arc<dyn SkyConditions>) -> Self {
        Self { dir, conditions }
    }

    fn image_name() -> String {
        Utc::now().format("image_%Y_%m_%d_%H_%M_%S.fits").to_string()
    }
}

#[async_trait]
impl ShotHandler for ArchiveHandler {
    fn admits(&self, cfg: &ShotConfig) -> bool {
        if !cfg.enabled {
            return false;
        }
        if cfg.override_gating {
            return true;
        }
        self.conditions.is_astronomical_night() && self.conditions.is_moonless()
    }

    async fn on_capture(&self, raw: Bytes) -> Result<()> {
        let path = self.dir.join(Self::image_name());
        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            warn!(dir = %self.dir.display(), error = %e, "cannot create archive directory");
            return Ok(());
        }
        match tokio::fs::write(&path, &raw).await {
            Ok(()) => info!(path = %path.display(), bytes = raw.len(), "archived capture"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to archive capture"),
        }
        Ok(())
    }
}

/// Connectivity-test handler: the capture itself is the test, so the result
/// is only logged. Usually disabled in server configs.
pub struct TestingHandler;

#[async_trait]
impl ShotHandler for TestingHandler {
    async fn on_capture(&self, raw: Bytes) -> Result<()> {
        debug!(bytes = raw.len(), "test capture completed");
        Ok(())
    }
}

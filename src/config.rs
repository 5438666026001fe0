//! Shot-kind configuration: types, the swap store, and the file watcher.
//!
//! Every shot kind (preview, save-to-disk, testing) has its own schedule and
//! exposure parameters. The whole mapping is replaced wholesale on reload;
//! individual entries are never mutated in place, so readers always observe
//! a consistent snapshot.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::CameraError;

/// A named periodic capture purpose with its own schedule and gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShotKind {
    /// Live preview published to the feed.
    #[serde(rename = "preview")]
    Preview,
    /// Archival capture written to disk, gated on sky conditions.
    #[serde(rename = "savetodisk")]
    SaveToDisk,
    /// Connectivity test, handler only logs. Usually disabled on servers.
    #[serde(rename = "testing")]
    Testing,
}

impl ShotKind {
    /// All known kinds, in scheduling order.
    pub const ALL: [ShotKind; 3] = [ShotKind::Preview, ShotKind::SaveToDisk, ShotKind::Testing];

    /// The config-file key for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ShotKind::Preview => "preview",
            ShotKind::SaveToDisk => "savetodisk",
            ShotKind::Testing => "testing",
        }
    }

    fn from_key(key: &str) -> Option<ShotKind> {
        match key {
            "preview" => Some(ShotKind::Preview),
            "savetodisk" => Some(ShotKind::SaveToDisk),
            "testing" => Some(ShotKind::Testing),
            _ => None,
        }
    }
}

impl fmt::Display for ShotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sensor readout mode requested per shot kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    Greyscale,
    #[default]
    Rgb,
}

/// Schedule and exposure parameters for one shot kind.
///
/// Constructed on config load, replaced wholesale on every reload, read-only
/// to the shot loops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotConfig {
    /// Exposure duration in seconds. Must be positive.
    pub exposure_secs: f64,
    /// Sensor gain. Non-negative.
    #[serde(default)]
    pub gain: f64,
    /// Readout mode. Defaults to RGB.
    #[serde(default)]
    pub color_mode: ColorMode,
    /// Target interval between shots of this kind, in seconds. Must be
    /// positive; best-effort, not an exact wall-clock guarantee.
    pub period_secs: f64,
    /// Whether this kind fires at all.
    pub enabled: bool,
    /// Bypass the kind's gating predicate (e.g. force archival captures in
    /// daylight).
    #[serde(default)]
    pub override_gating: bool,
}

impl ShotConfig {
    fn validate(&self) -> std::result::Result<(), String> {
        if !(self.exposure_secs > 0.0) {
            return Err(format!("exposure_secs must be positive, got {}", self.exposure_secs));
        }
        if self.gain < 0.0 {
            return Err(format!("gain must be non-negative, got {}", self.gain));
        }
        if !(self.period_secs > 0.0) {
            return Err(format!("period_secs must be positive, got {}", self.period_secs));
        }
        Ok(())
    }
}

/// The full per-kind configuration mapping.
pub type ShotConfigMap = HashMap<ShotKind, ShotConfig>;

/// Parse a raw JSON object (`kind name -> entry`) into a config mapping.
///
/// Invalid entries (unknown kind names, malformed bodies, non-positive
/// period or exposure) are dropped with a diagnostic and never fail the
/// whole parse. A dropped entry behaves exactly like an absent one: the kind
/// is treated as disabled.
pub fn parse_shot_configs(raw: &serde_json::Value) -> ShotConfigMap {
    let mut map = ShotConfigMap::new();
    let Some(entries) = raw.as_object() else {
        warn!("config root is not an object, treating all kinds as disabled");
        return map;
    };

    for (key, value) in entries {
        let Some(kind) = ShotKind::from_key(key) else {
            let valid: Vec<&str> = ShotKind::ALL.iter().map(|k| k.as_str()).collect();
            warn!(
                entry = %key,
                "unknown shot kind in config, ignoring (valid kinds: {})",
                valid.join(", ")
            );
            continue;
        };
        let entry = match serde_json::from_value::<ShotConfig>(value.clone()) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(kind = %kind, error = %e, "malformed config entry, ignoring");
                continue;
            }
        };
        if let Err(reason) = entry.validate() {
            let err = CameraError::ConfigInvalid { kind: kind.to_string(), reason };
            warn!(error = %err, "dropping config entry");
            continue;
        }
        map.insert(kind, entry);
    }
    map
}

/// Shared store for the current shot configuration.
///
/// Readers take cheap `Arc` snapshots; `replace` swaps the whole mapping
/// atomically and notifies watchers. Single writer (the reload path), many
/// readers.
pub struct ConfigStore {
    tx: watch::Sender<Arc<ShotConfigMap>>,
}

impl ConfigStore {
    pub fn new(initial: ShotConfigMap) -> Self {
        let (tx, _) = watch::channel(Arc::new(initial));
        Self { tx }
    }

    /// Snapshot of the current mapping.
    pub fn current(&self) -> Arc<ShotConfigMap> {
        self.tx.borrow().clone()
    }

    /// The current entry for one kind, if present.
    pub fn get(&self, kind: ShotKind) -> Option<ShotConfig> {
        self.tx.borrow().get(&kind).cloned()
    }

    /// Atomically replace the whole mapping. Visible to every reader on its
    /// next read; watchers are woken.
    pub fn replace(&self, new_map: ShotConfigMap) {
        info!(entries = new_map.len(), "shot configuration replaced");
        self.tx.send_replace(Arc::new(new_map));
    }

    /// Subscribe to replacement notifications.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ShotConfigMap>> {
        self.tx.subscribe()
    }
}

/// How often the config-file watcher polls for modification.
const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Watch a JSON config file and swap the store whenever it changes.
///
/// Polls the file's mtime rather than using inotify: the file lives on
/// whatever filesystem the deployment provides (possibly network-mounted),
/// and a few seconds of reload latency is irrelevant at shot-period
/// timescales. An unreadable or unparsable file leaves the previous
/// configuration in place.
pub async fn watch_config_file(path: PathBuf, store: Arc<ConfigStore>) {
    let mut last_mtime: Option<SystemTime> = current_mtime(&path).await;
    info!(path = %path.display(), "config file watcher started");

    loop {
        tokio::time::sleep(CONFIG_POLL_INTERVAL).await;
        let mtime = current_mtime(&path).await;
        if mtime == last_mtime {
            continue;
        }
        last_mtime = mtime;

        match load_config_file(&path).await {
            Ok(map) => {
                info!(path = %path.display(), "config file changed, reloading");
                store.replace(map);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "config reload failed, keeping previous");
            }
        }
    }
}

/// Read and parse a JSON config file into a mapping.
pub async fn load_config_file(path: &PathBuf) -> anyhow::Result<ShotConfigMap> {
    let contents = tokio::fs::read_to_string(path).await?;
    let raw: serde_json::Value = serde_json::from_str(&contents)?;
    let map = parse_shot_configs(&raw);
    debug!(entries = map.len(), "parsed config file");
    Ok(map)
}

async fn current_mtime(path: &PathBuf) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok().and_then(|m| m.modified().ok())
}

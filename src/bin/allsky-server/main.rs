//! Allsky Server Binary
//!
//! Runs the full camera service: shot loops against the device, the config
//! file watcher, and the HTTP/WebSocket API.
//!
//! ## Usage
//!
//! ```bash
//! # All settings come from the environment
//! export ALLSKY_BIND=0.0.0.0:8080
//! export ALLSKY_CONFIG=/etc/allsky/shots.json   # optional, hot-reloaded
//! export ALLSKY_ARCHIVE_DIR=/var/lib/allsky/images
//! export CAMERA_MODE=Simulator
//!
//! allsky-server
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;

use allsky::codec::GrayscalePreviewCodec;
use allsky::conditions::FixedConditions;
use allsky::config::{load_config_file, parse_shot_configs, watch_config_file, ShotConfigMap};
use allsky::device::SimulatorDriver;
use allsky::{web, CameraDriver, CameraService};

/// Server configuration from environment variables.
struct Config {
    /// Address for the HTTP/WebSocket API
    bind: SocketAddr,
    /// Optional shot-config file, watched for changes
    config_path: Option<PathBuf>,
    /// Directory for archival captures
    archive_dir: PathBuf,
    /// Camera driver selection ('Real' or 'Simulator')
    camera_mode: String,
}

impl Config {
    fn from_env() -> Result<Self> {
        let bind = std::env::var("ALLSKY_BIND")
            .unwrap_or_else(|_| "0.0.0.0:8080".into())
            .parse()
            .context("Invalid ALLSKY_BIND address")?;

        let config_path = std::env::var("ALLSKY_CONFIG").ok().map(PathBuf::from);

        let archive_dir = std::env::var("ALLSKY_ARCHIVE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("images"));

        let camera_mode = std::env::var("CAMERA_MODE").unwrap_or_else(|_| "Simulator".into());

        Ok(Self { bind, config_path, archive_dir, camera_mode })
    }
}

/// Shot schedule used when no config file is given: previews only.
fn default_shot_configs() -> ShotConfigMap {
    parse_shot_configs(&serde_json::json!({
        "preview": {
            "exposure_secs": 0.1,
            "gain": 100.0,
            "period_secs": 30.0,
            "enabled": true
        },
        "savetodisk": {
            "exposure_secs": 1.0,
            "gain": 50.0,
            "color_mode": "greyscale",
            "period_secs": 300.0,
            "enabled": false
        },
        "testing": {
            "exposure_secs": 0.1,
            "period_secs": 60.0,
            "enabled": false
        }
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("allsky=info".parse().unwrap()),
        )
        .init();

    let config = Config::from_env()?;

    let driver: Arc<dyn CameraDriver> = match config.camera_mode.as_str() {
        "Simulator" => Arc::new(SimulatorDriver::new()),
        "Real" => {
            bail!("Real camera mode needs a vendor driver binding; this build ships the simulator only")
        }
        other => {
            bail!("CAMERA_MODE must be 'Real' or 'Simulator' (preferably set in .env), got '{other}'")
        }
    };

    let shot_configs = match &config.config_path {
        Some(path) => load_config_file(path)
            .await
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => default_shot_configs(),
    };

    info!("Allsky server starting");
    info!("  Bind: {}", config.bind);
    info!("  Archive dir: {:?}", config.archive_dir);
    info!("  Camera mode: {}", config.camera_mode);
    info!("  Config file: {:?}", config.config_path);

    let service = CameraService::new(
        driver,
        Arc::new(GrayscalePreviewCodec),
        Arc::new(FixedConditions::default()),
        shot_configs,
        config.archive_dir.clone(),
    );

    service
        .connect()
        .await
        .context("Initial camera connection failed")?;

    let _shot_loops = service.spawn_shot_loops();

    if let Some(path) = config.config_path.clone() {
        let store = service.config_store();
        tokio::spawn(watch_config_file(path, store));
    }

    web::start(service, config.bind).await
}

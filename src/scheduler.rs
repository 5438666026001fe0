//! Per-kind periodic shot loop.
//!
//! One loop per shot kind, all multiplexed on the runtime and serialized
//! against the device by the capture gate. Each iteration re-reads the
//! config and the kind's admission predicate, so reloads and gating changes
//! take effect by the very next iteration. A failed capture is reported and
//! the loop simply proceeds to its sleep; the next iteration is the retry.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{ConfigStore, ShotConfig, ShotKind};
use crate::device::{CaptureRequest, DeviceSession};
use crate::gate::CaptureGate;
use crate::handlers::ShotHandler;
use crate::recovery::ReconnectSupervisor;

/// Floor for the inter-iteration sleep. Keeps a disabled or gated-off kind
/// re-checking its config periodically without busy-looping, and bounds how
/// fast any kind can cycle.
pub const MIN_PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// The periodic loop for one shot kind.
pub struct ShotScheduler {
    kind: ShotKind,
    config: Arc<ConfigStore>,
    session: Arc<DeviceSession>,
    gate: CaptureGate,
    recovery: Arc<ReconnectSupervisor>,
    handler: Arc<dyn ShotHandler>,
}

impl ShotScheduler {
    pub fn new(
        kind: ShotKind,
        config: Arc<ConfigStore>,
        session: Arc<DeviceSession>,
        gate: CaptureGate,
        recovery: Arc<ReconnectSupervisor>,
        handler: Arc<dyn ShotHandler>,
    ) -> Self {
        Self { kind, config, session, gate, recovery, handler }
    }

    /// Run forever. Shutdown is dropping the task; an in-flight capture
    /// finishes or times out on its own.
    pub async fn run(self) {
        info!(kind = %self.kind, "shot loop started");
        loop {
            let iteration_start = Instant::now();
            let cfg = self.config.get(self.kind);

            let fired = match cfg.as_ref() {
                Some(cfg) if self.handler.admits(cfg) => {
                    self.take_shot(cfg).await;
                    true
                }
                Some(_) => {
                    debug!(kind = %self.kind, "shot kind disabled or gated off");
                    false
                }
                None => {
                    debug!(kind = %self.kind, "no config entry for shot kind");
                    false
                }
            };

            // Aim for one shot per period: subtract the time this iteration
            // spent capturing, floored so idle kinds still re-check config.
            let elapsed = if fired { iteration_start.elapsed() } else { Duration::ZERO };
            let period = cfg
                .map(|c| Duration::from_secs_f64(c.period_secs))
                .unwrap_or(Duration::ZERO);
            let sleep_for = period.saturating_sub(elapsed).max(MIN_PROBE_INTERVAL);
            tokio::time::sleep(sleep_for).await;
        }
    }

    async fn take_shot(&self, cfg: &ShotConfig) {
        let request = CaptureRequest::from(cfg);
        let mut failure = None;

        {
            let _permit = self.gate.acquire().await;
            let generation = self.session.generation();
            debug!(kind = %self.kind, exposure = request.exposure_secs, "starting capture");
            match self.session.capture(&request).await {
                Ok(raw) => {
                    if let Err(e) = self.handler.on_capture(raw).await {
                        warn!(kind = %self.kind, error = %e, "shot handler failed");
                    }
                }
                Err(e) => failure = Some((e, generation)),
            }
            // Permit drops here: the gate is free before any reconnect work.
        }

        if let Some((e, generation)) = failure {
            warn!(kind = %self.kind, error = %e, "capture failed");
            self.recovery.report_failure(generation).await;
        }
    }
}

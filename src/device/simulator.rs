//! Synthetic camera source: develop and test without hardware.
//!
//! Produces gradient payloads after the requested exposure time, with knobs
//! to script payloads, inject exposure faults, refuse connections, or hold a
//! completion forever (exercising the session's bounded wait). Counters let
//! tests assert exactly how many captures were issued.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::config::ColorMode;
use crate::error::{CameraError, Result};

use super::driver::{CameraDriver, CaptureCompletion};

/// Synthetic frame dimensions (QVGA-ish, enough to look like an image).
const FRAME_BYTES: usize = 64 * 48;

pub struct SimulatorDriver {
    connected: AtomicBool,
    refuse_connections: AtomicBool,
    fail_exposures: AtomicBool,
    hold_completions: AtomicBool,
    scripted: Mutex<VecDeque<Bytes>>,
    held: Mutex<Vec<CaptureCompletion>>,
    captures_started: AtomicU64,
    connects: AtomicU64,
    last_gain: Mutex<f64>,
    last_color_mode: Mutex<ColorMode>,
}

impl SimulatorDriver {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            refuse_connections: AtomicBool::new(false),
            fail_exposures: AtomicBool::new(false),
            hold_completions: AtomicBool::new(false),
            scripted: Mutex::new(VecDeque::new()),
            held: Mutex::new(Vec::new()),
            captures_started: AtomicU64::new(0),
            connects: AtomicU64::new(0),
            last_gain: Mutex::new(0.0),
            last_color_mode: Mutex::new(ColorMode::Rgb),
        }
    }

    /// Queue payloads to be returned by the next exposures, in order. Once
    /// the queue is empty, synthetic gradients are produced again.
    pub fn script_payloads<I>(&self, payloads: I)
    where
        I: IntoIterator<Item = Bytes>,
    {
        self.scripted.lock().unwrap().extend(payloads);
    }

    /// Make `connect` fail until cleared.
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    /// Make every exposure complete with a fault.
    pub fn fail_exposures(&self, fail: bool) {
        self.fail_exposures.store(fail, Ordering::SeqCst);
    }

    /// Hold completions forever instead of firing them, as a device that
    /// went away mid-exposure would.
    pub fn hold_completions(&self, hold: bool) {
        self.hold_completions.store(hold, Ordering::SeqCst);
    }

    /// Drop the link without going through `disconnect`.
    pub fn sever_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn captures_started(&self) -> u64 {
        self.captures_started.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn last_gain(&self) -> f64 {
        *self.last_gain.lock().unwrap()
    }

    pub fn last_color_mode(&self) -> ColorMode {
        *self.last_color_mode.lock().unwrap()
    }

    fn next_payload(&self) -> Bytes {
        if let Some(scripted) = self.scripted.lock().unwrap().pop_front() {
            return scripted;
        }
        let shot = self.captures_started.load(Ordering::SeqCst);
        let pixels: Vec<u8> = (0..FRAME_BYTES)
            .map(|i| ((i as u64 + shot * 17) % 251) as u8)
            .collect();
        Bytes::from(pixels)
    }
}

impl Default for SimulatorDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraDriver for SimulatorDriver {
    async fn connect(&self) -> Result<()> {
        if self.refuse_connections.load(Ordering::SeqCst) {
            return Err(CameraError::ConnectionLost("simulated connection refusal".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        self.connects.fetch_add(1, Ordering::SeqCst);
        debug!("simulator connected");
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        debug!("simulator disconnected");
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn set_color_mode(&self, mode: ColorMode) -> Result<()> {
        if !self.is_connected() {
            return Err(CameraError::ConnectionLost("simulator not connected".into()));
        }
        *self.last_color_mode.lock().unwrap() = mode;
        Ok(())
    }

    async fn set_gain(&self, gain: f64) -> Result<()> {
        if !self.is_connected() {
            return Err(CameraError::ConnectionLost("simulator not connected".into()));
        }
        *self.last_gain.lock().unwrap() = gain;
        Ok(())
    }

    async fn begin_exposure(&self, duration: Duration, on_done: CaptureCompletion) -> Result<()> {
        if !self.is_connected() {
            return Err(CameraError::ConnectionLost("simulator not connected".into()));
        }
        self.captures_started.fetch_add(1, Ordering::SeqCst);

        if self.hold_completions.load(Ordering::SeqCst) {
            // Keep the callback alive so it neither fires nor drops.
            self.held.lock().unwrap().push(on_done);
            return Ok(());
        }

        let outcome = if self.fail_exposures.load(Ordering::SeqCst) {
            Err("simulated exposure fault".to_string())
        } else {
            Ok(self.next_payload())
        };

        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            on_done(outcome);
        });
        Ok(())
    }
}

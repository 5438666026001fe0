//! Sky and environment condition seam.
//!
//! Archival captures only make sense under a dark sky, so the save-to-disk
//! loop asks these predicates before every shot. Real providers (ephemeris
//! computation, weather station readout) live outside this crate; the
//! switchable implementation here backs simulator runs and tests.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;

use crate::feed::Metadata;

/// Current sky/environment state, queried fresh on every scheduling
/// decision. Astronomical state changes continuously and is never cached
/// here.
pub trait SkyConditions: Send + Sync {
    /// Sun more than 18 degrees below the horizon.
    fn is_astronomical_night(&self) -> bool;

    /// Moon below the horizon.
    fn is_moonless(&self) -> bool;

    /// Full readings map for status reporting and frame metadata.
    fn readings(&self) -> Metadata;
}

/// Fixed, externally togglable conditions.
///
/// Used by the simulator binary (dark sky by default so archival capture is
/// exercisable) and by tests that need to flip day/night mid-run.
pub struct FixedConditions {
    night: AtomicBool,
    moonless: AtomicBool,
}

impl FixedConditions {
    pub fn new(night: bool, moonless: bool) -> Self {
        Self {
            night: AtomicBool::new(night),
            moonless: AtomicBool::new(moonless),
        }
    }

    pub fn set_night(&self, night: bool) {
        self.night.store(night, Ordering::SeqCst);
    }

    pub fn set_moonless(&self, moonless: bool) {
        self.moonless.store(moonless, Ordering::SeqCst);
    }
}

impl Default for FixedConditions {
    fn default() -> Self {
        Self::new(true, true)
    }
}

impl SkyConditions for FixedConditions {
    fn is_astronomical_night(&self) -> bool {
        self.night.load(Ordering::SeqCst)
    }

    fn is_moonless(&self) -> bool {
        self.moonless.load(Ordering::SeqCst)
    }

    fn readings(&self) -> Metadata {
        let mut m = Metadata::new();
        m.insert("local_time".into(), Utc::now().to_rfc3339().into());
        m.insert("is_astronomical_night".into(), self.is_astronomical_night().into());
        m.insert("is_moonless".into(), self.is_moonless().into());
        m
    }
}

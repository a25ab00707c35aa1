//! Clock provider boundary
//!
//! Interval gating and debounce windows run on monotonic seconds, while the
//! timestamps exposed to users are wall-clock time. Both are captured once per
//! tick in a [`Tick`] and held constant for that tick's computations.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

/// Both clocks read once at the start of a tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// Monotonic seconds; only differences are meaningful
    pub monotonic: f64,

    /// Civil time used for externally visible timestamps
    pub wall: DateTime<Utc>,
}

impl Tick {
    pub fn new(monotonic: f64, wall: DateTime<Utc>) -> Self {
        Self { monotonic, wall }
    }
}

/// Source of monotonic and wall-clock time
pub trait Clock: Send + Sync {
    /// Monotonic seconds, unaffected by wall-clock adjustments
    fn monotonic(&self) -> f64;

    /// Current wall-clock time
    fn wall_clock(&self) -> DateTime<Utc>;

    /// Read both clocks once
    fn tick(&self) -> Tick {
        Tick {
            monotonic: self.monotonic(),
            wall: self.wall_clock(),
        }
    }
}

/// Clock backed by [`Instant`] and [`Utc::now`]
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn monotonic(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A controllable clock for tests and replay
///
/// Advancing moves the monotonic counter and the wall clock together, so
/// timestamps stay consistent with elapsed time. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<RwLock<Tick>>,
}

impl ManualClock {
    /// Start at monotonic zero and the given wall-clock time
    pub fn at(wall: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(RwLock::new(Tick::new(0.0, wall))),
        }
    }

    /// Start at monotonic zero and the current wall-clock time
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Advance both clocks by fractional seconds
    pub fn advance_secs_f64(&self, seconds: f64) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        current.monotonic += seconds;
        current.wall += Duration::milliseconds((seconds * 1000.0).round() as i64);
    }

    /// Advance both clocks by whole seconds
    pub fn advance_seconds(&self, seconds: u64) {
        self.advance_secs_f64(seconds as f64);
    }

    /// Set the monotonic counter to an absolute value, moving the wall clock
    /// by the same delta
    pub fn set_monotonic(&self, monotonic: f64) {
        let delta = monotonic - self.monotonic();
        self.advance_secs_f64(delta);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn monotonic(&self) -> f64 {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .monotonic
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .wall
    }

    fn tick(&self) -> Tick {
        *self.current.read().unwrap_or_else(PoisonError::into_inner)
    }
}

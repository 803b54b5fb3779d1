//! Time source abstraction.
//!
//! Window boundaries are always computed against "now", and "now" must be
//! consistent across worker tasks and controllable in tests. Production code
//! uses [`SystemClock`]; tests drive a [`SimulatedClock`] forward manually.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Shared handle to a clock.
pub type SharedClock = Arc<dyn Clock>;

/// A source of the current time in Unix milliseconds.
pub trait Clock: Send + Sync {
    /// Current time (Unix timestamp in milliseconds).
    fn now_millis(&self) -> i64;
}

/// Wall-clock time via `chrono`.
#[derive(Debug, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a shared wall clock.
    pub fn shared() -> SharedClock {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct SimulatedClock {
    now: AtomicI64,
}

impl SimulatedClock {
    /// Create a simulated clock starting at the given time.
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    /// Create a shared simulated clock starting at the given time.
    pub fn shared(start_millis: i64) -> Arc<Self> {
        Arc::new(Self::new(start_millis))
    }

    /// Advance the clock by the given number of milliseconds.
    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    /// Jump the clock to an absolute time.
    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for SimulatedClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

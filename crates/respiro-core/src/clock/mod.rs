//! One-shot, cancelable callback scheduling.
//!
//! The session engine never sleeps or spawns on its own. Every timed effect
//! goes through a [`Scheduler`], which makes the engine drivable by a
//! deterministic [`ManualClock`] in tests and by a [`TokioScheduler`] at
//! runtime.

mod manual;
mod runtime;

pub use manual::ManualClock;
pub use runtime::TokioScheduler;

use serde::{Deserialize, Serialize};

/// Work run once when a scheduled delay elapses.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Opaque handle to one pending scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskHandle(u64);

impl TaskHandle {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// A single logical clock that runs callbacks after a delay.
///
/// Implementations must run callbacks serially with respect to each other and
/// must not hold internal locks while a callback runs (callbacks schedule and
/// cancel further work).
pub trait Scheduler: Send + Sync {
    /// Run `callback` once, `delay_ms` after this call.
    fn schedule(&self, delay_ms: u64, callback: Callback) -> TaskHandle;

    /// Prevent a pending callback from running.
    ///
    /// Idempotent: canceling a fired or already-canceled handle does nothing.
    fn cancel(&self, handle: TaskHandle);

    /// Milliseconds on this scheduler's clock.
    fn now_ms(&self) -> u64;
}

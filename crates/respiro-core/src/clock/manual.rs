//! Deterministic virtual clock.
//!
//! Time only moves when [`ManualClock::advance`] is called. Callbacks due
//! inside the advanced window fire in (due time, schedule order) order, and
//! callbacks scheduled by those callbacks fire too if they land inside the
//! window.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::{Callback, Scheduler, TaskHandle};

#[derive(Default)]
struct ClockState {
    now_ms: u64,
    next_id: u64,
    /// Keyed by (due time, id) so equal due times keep schedule order.
    queue: BTreeMap<(u64, u64), Callback>,
    due_by_id: HashMap<u64, u64>,
}

/// A [`Scheduler`] whose clock is advanced by hand.
#[derive(Default)]
pub struct ManualClock {
    state: Mutex<ClockState>,
    /// Held for the whole of an advance so callbacks never interleave.
    firing: Mutex<()>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move the clock forward by `ms`, firing every callback that falls due.
    ///
    /// Returns the number of callbacks fired.
    pub fn advance(&self, ms: u64) -> usize {
        let _serial = self.firing.lock().unwrap_or_else(|e| e.into_inner());
        let target = self.lock().now_ms.saturating_add(ms);
        let mut fired = 0;

        loop {
            let next = {
                let mut state = self.lock();
                let key = match state.queue.keys().next() {
                    Some(&(due, id)) if due <= target => (due, id),
                    _ => break,
                };
                state.due_by_id.remove(&key.1);
                state.now_ms = key.0;
                state.queue.remove(&key)
            };
            // Lock released: the callback may schedule or cancel.
            if let Some(callback) = next {
                callback();
                fired += 1;
            }
        }

        let mut state = self.lock();
        state.now_ms = state.now_ms.max(target);
        fired
    }

    /// Advance to an absolute time. Does nothing if `t` is in the past.
    pub fn advance_to(&self, t: u64) -> usize {
        let now = self.now_ms();
        self.advance(t.saturating_sub(now))
    }

    /// Number of callbacks still waiting to fire.
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Due time of the earliest pending callback.
    pub fn next_due(&self) -> Option<u64> {
        self.lock().queue.keys().next().map(|&(due, _)| due)
    }
}

impl Scheduler for ManualClock {
    fn schedule(&self, delay_ms: u64, callback: Callback) -> TaskHandle {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        let due = state.now_ms.saturating_add(delay_ms);
        state.queue.insert((due, id), callback);
        state.due_by_id.insert(id, due);
        TaskHandle::new(id)
    }

    fn cancel(&self, handle: TaskHandle) {
        let mut state = self.lock();
        if let Some(due) = state.due_by_id.remove(&handle.id()) {
            state.queue.remove(&(due, handle.id()));
        }
    }

    fn now_ms(&self) -> u64 {
        self.lock().now_ms
    }
}

impl std::fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ManualClock")
            .field("now_ms", &state.now_ms)
            .field("pending", &state.queue.len())
            .finish()
    }
}

use std::sync::{Arc, Mutex};

use super::{AnimationDriver, RESTING_SCALE};
use crate::clock::Scheduler;
use crate::error::FeedbackError;

#[derive(Debug, Clone, Copy)]
struct Segment {
    from: f32,
    to: f32,
    start_ms: u64,
    duration_ms: u64,
}

impl Segment {
    fn value_at(&self, now_ms: u64) -> f32 {
        if self.duration_ms == 0 {
            return self.to;
        }
        let elapsed = now_ms.saturating_sub(self.start_ms).min(self.duration_ms);
        let t = elapsed as f32 / self.duration_ms as f32;
        self.from + (self.to - self.from) * t
    }
}

/// Linear scalar animation timed against a [`Scheduler`] clock.
///
/// Nothing runs in the background; the value is computed when read, so it
/// stays consistent with whatever clock drives the session.
pub struct ScaleAnimation {
    clock: Arc<dyn Scheduler>,
    segment: Mutex<Segment>,
}

impl ScaleAnimation {
    pub fn new(clock: Arc<dyn Scheduler>) -> Self {
        let now = clock.now_ms();
        Self {
            clock,
            segment: Mutex::new(Segment {
                from: RESTING_SCALE,
                to: RESTING_SCALE,
                start_ms: now,
                duration_ms: 0,
            }),
        }
    }

    /// Target of the running (or last) animation.
    pub fn target(&self) -> f32 {
        self.segment.lock().unwrap_or_else(|e| e.into_inner()).to
    }
}

impl AnimationDriver for ScaleAnimation {
    fn animate_to(&self, target: f32, duration_ms: u64) -> Result<(), FeedbackError> {
        let now = self.clock.now_ms();
        let mut segment = self.segment.lock().unwrap_or_else(|e| e.into_inner());
        let from = segment.value_at(now);
        *segment = Segment {
            from,
            to: target,
            start_ms: now,
            duration_ms,
        };
        Ok(())
    }

    fn set_immediate(&self, value: f32) -> Result<(), FeedbackError> {
        let now = self.clock.now_ms();
        *self.segment.lock().unwrap_or_else(|e| e.into_inner()) = Segment {
            from: value,
            to: value,
            start_ms: now,
            duration_ms: 0,
        };
        Ok(())
    }

    fn current_value(&self) -> f32 {
        let now = self.clock.now_ms();
        self.segment
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .value_at(now)
    }
}

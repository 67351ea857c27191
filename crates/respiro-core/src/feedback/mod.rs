//! Feedback capability ports.
//!
//! The engine drives three independent channels: a scalar animation, two
//! sound cues and haptic pulses. Each is a small trait so a front-end can
//! plug in whatever backend it has, or nothing at all ([`NoopFeedback`]).
//!
//! Port failures are reported as [`FeedbackError`] and never stop a session;
//! the engine logs them and keeps its schedule.

mod animation;

pub use animation::ScaleAnimation;

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::FeedbackError;

/// Scale the animation rests at outside of inhale.
pub const RESTING_SCALE: f32 = 0.8;
/// Scale reached at the end of inhale.
pub const EXPANDED_SCALE: f32 = 1.2;

/// Named sound cues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cue {
    Inhale,
    Exhale,
}

impl Cue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cue::Inhale => "inhale",
            Cue::Exhale => "exhale",
        }
    }
}

/// Strength of a single haptic pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PulseIntensity {
    Light,
    Heavy,
}

/// Drives one continuous scalar (the breathing circle's scale).
pub trait AnimationDriver: Send + Sync {
    /// Start moving from the current value to `target` over `duration_ms`.
    /// Returns immediately.
    fn animate_to(&self, target: f32, duration_ms: u64) -> Result<(), FeedbackError>;

    /// Jump to `value`, interrupting any running animation.
    fn set_immediate(&self, value: f32) -> Result<(), FeedbackError>;

    fn current_value(&self) -> f32;
}

/// Replays one of the named cues.
pub trait SoundPlayer: Send + Sync {
    /// Play `cue` from the beginning.
    fn play(&self, cue: Cue) -> Result<(), FeedbackError>;

    fn stop_all(&self) -> Result<(), FeedbackError>;
}

/// Emits discrete haptic pulses.
pub trait HapticPulser: Send + Sync {
    fn pulse(&self, intensity: PulseIntensity) -> Result<(), FeedbackError>;
}

/// Port implementation that does nothing.
///
/// The animation value still follows the requested targets so readers of
/// [`AnimationDriver::current_value`] see something sensible.
#[derive(Debug)]
pub struct NoopFeedback {
    value: Mutex<f32>,
}

impl Default for NoopFeedback {
    fn default() -> Self {
        Self {
            value: Mutex::new(RESTING_SCALE),
        }
    }
}

impl NoopFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self, value: f32) {
        *self.value.lock().unwrap_or_else(|e| e.into_inner()) = value;
    }
}

impl AnimationDriver for NoopFeedback {
    fn animate_to(&self, target: f32, _duration_ms: u64) -> Result<(), FeedbackError> {
        self.store(target);
        Ok(())
    }

    fn set_immediate(&self, value: f32) -> Result<(), FeedbackError> {
        self.store(value);
        Ok(())
    }

    fn current_value(&self) -> f32 {
        *self.value.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SoundPlayer for NoopFeedback {
    fn play(&self, _cue: Cue) -> Result<(), FeedbackError> {
        Ok(())
    }

    fn stop_all(&self) -> Result<(), FeedbackError> {
        Ok(())
    }
}

impl HapticPulser for NoopFeedback {
    fn pulse(&self, _intensity: PulseIntensity) -> Result<(), FeedbackError> {
        Ok(())
    }
}

/// The set of ports injected into a [`crate::SessionEngine`].
#[derive(Clone)]
pub struct FeedbackPorts {
    pub animation: Arc<dyn AnimationDriver>,
    pub sound: Arc<dyn SoundPlayer>,
    pub haptics: Arc<dyn HapticPulser>,
}

impl Default for FeedbackPorts {
    fn default() -> Self {
        let noop = Arc::new(NoopFeedback::new());
        Self {
            animation: noop.clone(),
            sound: noop.clone(),
            haptics: noop,
        }
    }
}

impl FeedbackPorts {
    pub fn with_animation(mut self, animation: Arc<dyn AnimationDriver>) -> Self {
        self.animation = animation;
        self
    }

    pub fn with_sound(mut self, sound: Arc<dyn SoundPlayer>) -> Self {
        self.sound = sound;
        self
    }

    pub fn with_haptics(mut self, haptics: Arc<dyn HapticPulser>) -> Self {
        self.haptics = haptics;
        self
    }
}

impl std::fmt::Debug for FeedbackPorts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackPorts")
            .field("animation_value", &self.animation.current_value())
            .finish_non_exhaustive()
    }
}

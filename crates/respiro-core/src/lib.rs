//! # Respiro Core Library
//!
//! Core logic for Respiro, a guided 4-7-8 breathing timer. Front-ends (the
//! `respiro` CLI, or any GUI) are thin layers over this crate: they read
//! settings, call `start`/`stop`, and render the engine's state.
//!
//! ## Architecture
//!
//! - **Session Engine**: phase state machine (inhale 4s, hold 7s, exhale 8s)
//!   driven by scheduled callbacks, with generation-checked cancellation
//! - **Clock**: one-shot cancelable scheduling, either virtual
//!   ([`ManualClock`]) or on tokio ([`TokioScheduler`])
//! - **Feedback**: animation, sound and haptic capability ports
//! - **Storage**: SQLite key/value settings and session history
//!
//! ## Key Components
//!
//! - [`SessionEngine`]: Core breathing state machine
//! - [`Scheduler`]: Clock abstraction the engine runs on
//! - [`FeedbackPorts`]: Injected feedback channels
//! - [`Settings`]: Typed view over the persisted preferences
//! - [`Database`]: Settings store and session history

pub mod clock;
pub mod error;
pub mod events;
pub mod feedback;
pub mod storage;
pub mod timer;

pub use clock::{ManualClock, Scheduler, TaskHandle, TokioScheduler};
pub use error::{CoreError, EngineError, FeedbackError, Result, SettingsError};
pub use events::Event;
pub use feedback::{
    AnimationDriver, Cue, FeedbackPorts, HapticPulser, NoopFeedback, PulseIntensity,
    ScaleAnimation, SoundPlayer,
};
pub use storage::{
    Database, MemorySettingsStore, SessionRecord, SettingKey, Settings, SettingsStore, Stats,
};
pub use timer::{CycleCount, Phase, Progress, SessionConfig, SessionEngine, SessionOutcome, SessionState};

mod config;
mod engine;
mod phase;

pub use config::{CycleCount, SessionConfig};
pub use engine::{Progress, SessionEngine, SessionOutcome, SessionState};
pub use phase::{
    Phase, CYCLE_MS, EXHALE_MS, EXHALE_PULSES, EXHALE_PULSE_SPACING_MS, HOLD_MS, INHALE_MS,
    SETTLE_MS,
};

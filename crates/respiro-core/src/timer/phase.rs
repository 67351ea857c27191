use serde::{Deserialize, Serialize};

pub const INHALE_MS: u64 = 4_000;
pub const HOLD_MS: u64 = 7_000;
pub const EXHALE_MS: u64 = 8_000;
/// One full inhale + hold + exhale.
pub const CYCLE_MS: u64 = INHALE_MS + HOLD_MS + EXHALE_MS;
/// Pause after a session ends before returning to idle.
pub const SETTLE_MS: u64 = 3_000;
/// Light pulses emitted during exhale, one per second.
pub const EXHALE_PULSES: u64 = 8;
pub const EXHALE_PULSE_SPACING_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Inhale,
    Hold,
    Exhale,
    Completed,
}

impl Phase {
    /// Fixed duration of a timed phase. `None` for the markers.
    pub fn duration_ms(&self) -> Option<u64> {
        match self {
            Phase::Inhale => Some(INHALE_MS),
            Phase::Hold => Some(HOLD_MS),
            Phase::Exhale => Some(EXHALE_MS),
            Phase::Idle | Phase::Completed => None,
        }
    }

    /// Successor within one cycle. Exhale has none: what follows it depends
    /// on the cycle count.
    pub fn next(&self) -> Option<Phase> {
        match self {
            Phase::Inhale => Some(Phase::Hold),
            Phase::Hold => Some(Phase::Exhale),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.duration_ms().is_some()
    }

    /// Milliseconds into a cycle at which this phase starts.
    pub fn offset_in_cycle_ms(&self) -> u64 {
        match self {
            Phase::Inhale => 0,
            Phase::Hold => INHALE_MS,
            Phase::Exhale => INHALE_MS + HOLD_MS,
            Phase::Idle | Phase::Completed => 0,
        }
    }

    /// Prompt shown while this phase runs.
    pub fn prompt(&self) -> &'static str {
        match self {
            Phase::Idle => "Tap to begin",
            Phase::Inhale => "Inhale",
            Phase::Hold => "Hold",
            Phase::Exhale => "Exhale",
            Phase::Completed => "Session complete.",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Inhale => "inhale",
            Phase::Hold => "hold",
            Phase::Exhale => "exhale",
            Phase::Completed => "completed",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

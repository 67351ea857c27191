use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::timer::{Phase, SessionOutcome};

/// Every state change of the session engine produces an Event.
/// Front-ends subscribe to them or poll `StateSnapshot`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SessionStarted {
        session_id: Uuid,
        cycle_count: u32,
        total_ms: u64,
        at: DateTime<Utc>,
    },
    PhaseEntered {
        session_id: Uuid,
        phase: Phase,
        cycle_index: u32,
        cycle_count: u32,
        duration_ms: u64,
        prompt: Option<String>,
        at: DateTime<Utc>,
    },
    /// Session ended, either naturally or through `stop()`.
    SessionCompleted {
        session_id: Uuid,
        outcome: SessionOutcome,
        cycle_count: u32,
        cycles_completed: u32,
        started_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    /// Settle delay elapsed; engine is idle again.
    SessionIdle {
        at: DateTime<Utc>,
    },
    StateSnapshot {
        phase: Phase,
        cycle_index: u32,
        cycle_count: u32,
        running: bool,
        prompt: Option<String>,
        phase_elapsed_ms: u64,
        phase_total_ms: u64,
        session_pct: f64,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// Short type name, matching the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::SessionStarted { .. } => "SessionStarted",
            Event::PhaseEntered { .. } => "PhaseEntered",
            Event::SessionCompleted { .. } => "SessionCompleted",
            Event::SessionIdle { .. } => "SessionIdle",
            Event::StateSnapshot { .. } => "StateSnapshot",
        }
    }
}

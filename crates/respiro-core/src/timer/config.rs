use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Number of cycles in a session. Only the offered options are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum CycleCount {
    #[default]
    Four,
    Eight,
    Twelve,
}

impl CycleCount {
    pub const ALL: [CycleCount; 3] = [CycleCount::Four, CycleCount::Eight, CycleCount::Twelve];

    pub fn get(&self) -> u32 {
        match self {
            CycleCount::Four => 4,
            CycleCount::Eight => 8,
            CycleCount::Twelve => 12,
        }
    }

    /// The option the settings screen marks as recommended.
    pub fn is_recommended(&self) -> bool {
        *self == CycleCount::Four
    }
}

impl TryFrom<u32> for CycleCount {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            4 => Ok(CycleCount::Four),
            8 => Ok(CycleCount::Eight),
            12 => Ok(CycleCount::Twelve),
            other => Err(format!("cycle count must be 4, 8 or 12 (got {other})")),
        }
    }
}

impl From<CycleCount> for u32 {
    fn from(count: CycleCount) -> Self {
        count.get()
    }
}

impl FromStr for CycleCount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n: u32 = s
            .trim()
            .parse()
            .map_err(|_| format!("'{s}' is not a number"))?;
        CycleCount::try_from(n)
    }
}

impl std::fmt::Display for CycleCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// Configuration snapshot for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub cycle_count: CycleCount,
    #[serde(default)]
    pub sound_enabled: bool,
    #[serde(default = "default_true")]
    pub haptic_enabled: bool,
    #[serde(default = "default_true")]
    pub text_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cycle_count: CycleCount::default(),
            sound_enabled: false,
            haptic_enabled: true,
            text_enabled: true,
        }
    }
}

impl SessionConfig {
    /// Total scheduled time from start to completion.
    pub fn session_ms(&self) -> u64 {
        self.cycle_count.get() as u64 * super::phase::CYCLE_MS
    }
}

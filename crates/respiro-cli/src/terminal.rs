//! Terminal stand-ins for the feedback ports.

use std::io::{IsTerminal, Write};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use respiro_core::{Cue, FeedbackError, HapticPulser, PulseIntensity, SoundPlayer};

const BAR_WIDTH: usize = 30;
const PULSE_VISIBLE: Duration = Duration::from_millis(300);

/// Rings the terminal bell for each cue.
#[derive(Debug, Default)]
pub struct TerminalBell;

impl SoundPlayer for TerminalBell {
    fn play(&self, cue: Cue) -> Result<(), FeedbackError> {
        let mut err = std::io::stderr();
        if !err.is_terminal() {
            return Err(FeedbackError::Unavailable { channel: "sound" });
        }
        tracing::trace!(cue = cue.as_str(), "bell");
        err.write_all(b"\x07")
            .and_then(|_| err.flush())
            .map_err(|e| FeedbackError::Backend {
                channel: "sound",
                message: e.to_string(),
            })
    }

    fn stop_all(&self) -> Result<(), FeedbackError> {
        Ok(())
    }
}

/// Shows haptic pulses as a short-lived glyph next to the scale bar.
#[derive(Debug, Default)]
pub struct PulseIndicator {
    last: Mutex<Option<(PulseIntensity, Instant)>>,
}

impl PulseIndicator {
    pub fn glyph(&self) -> &'static str {
        let last = *self.last.lock().unwrap_or_else(|e| e.into_inner());
        match last {
            Some((PulseIntensity::Heavy, at)) if at.elapsed() < PULSE_VISIBLE => "●",
            Some((PulseIntensity::Light, at)) if at.elapsed() < PULSE_VISIBLE => "•",
            _ => " ",
        }
    }
}

impl HapticPulser for PulseIndicator {
    fn pulse(&self, intensity: PulseIntensity) -> Result<(), FeedbackError> {
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = Some((intensity, Instant::now()));
        Ok(())
    }
}

/// Horizontal bar for an animation scale in 0.6 ..= 1.2.
pub fn scale_bar(value: f32) -> String {
    let filled = (((value - 0.6) / 0.6) * BAR_WIDTH as f32)
        .round()
        .clamp(0.0, BAR_WIDTH as f32) as usize;
    format!("{}{}", "█".repeat(filled), "·".repeat(BAR_WIDTH - filled))
}

//! Breathing session engine.
//!
//! The engine is a phase state machine driven entirely by a [`Scheduler`].
//! It never sleeps and owns no threads: every transition is either a direct
//! call (`start`, `stop`) or a scheduled callback it created itself.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Inhale -> Hold -> Exhale -> (Inhale | Completed) -> Idle
//!            \________\________\______ stop() ___/
//! ```
//!
//! `Completed` lasts for the settle delay so a front-end can show the
//! completion message, then the engine returns to `Idle` on its own. The
//! session still counts as running until then: `start` is rejected and `stop`
//! does nothing during the settle delay.
//!
//! ## Configuration
//!
//! The engine holds the configured preferences (from construction or
//! [`SessionEngine::set_config`]) separately from the snapshot a session runs
//! with. Idle state always reflects the preferences, so a one-off `start`
//! config never outlives its session.
//!
//! ## Generations
//!
//! Every scheduled callback captures the generation it was issued under.
//! `start`, `stop` and natural completion bump the generation, so a callback
//! that was already in flight when the session changed finds a mismatch and
//! does nothing.
//!
//! ## Usage
//!
//! ```ignore
//! let clock = Arc::new(ManualClock::new());
//! let config = Settings::load(&store).session_config();
//! let engine = SessionEngine::with_config(clock.clone(), FeedbackPorts::default(), config);
//! engine.start(engine.config())?;
//! clock.advance(4_000); // now in Hold
//! engine.stop();
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::SessionConfig;
use super::phase::{
    Phase, CYCLE_MS, EXHALE_MS, EXHALE_PULSES, EXHALE_PULSE_SPACING_MS, INHALE_MS, SETTLE_MS,
};
use crate::clock::{Scheduler, TaskHandle};
use crate::error::{EngineError, FeedbackError};
use crate::events::Event;
use crate::feedback::{Cue, FeedbackPorts, PulseIntensity, EXPANDED_SCALE, RESTING_SCALE};

const EVENT_CAPACITY: usize = 64;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionOutcome {
    /// All configured cycles ran.
    Finished,
    /// Ended early by `stop()`.
    Stopped,
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionOutcome::Finished => "finished",
            SessionOutcome::Stopped => "stopped",
        }
    }
}

/// Observable engine state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub phase: Phase,
    /// Index of the running cycle; equals `cycle_count` once all cycles ran.
    pub cycle_index: u32,
    pub cycle_count: u32,
    pub running: bool,
    /// Text prompt for the front-end. `None` while text guidance is off.
    pub prompt: Option<String>,
}

/// Timing read-out derived from the scheduler clock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub phase_elapsed_ms: u64,
    pub phase_total_ms: u64,
    pub session_elapsed_ms: u64,
    pub session_total_ms: u64,
    /// 0.0 .. 100.0 across the whole session.
    pub session_pct: f64,
}

impl Progress {
    /// 0.0 .. 1.0 within the current phase.
    pub fn phase_fraction(&self) -> f64 {
        if self.phase_total_ms == 0 {
            return 0.0;
        }
        self.phase_elapsed_ms as f64 / self.phase_total_ms as f64
    }
}

struct Core {
    state: SessionState,
    /// Preferences applied to the idle state and offered to the next session.
    config: SessionConfig,
    /// Snapshot of the running (or settling) session.
    active: SessionConfig,
    generation: u64,
    session_id: Uuid,
    started_at: DateTime<Utc>,
    phase_entered_ms: u64,
    advance_task: Option<TaskHandle>,
    /// Pending exhale pulses, tagged with their index in the burst.
    pulse_tasks: Vec<(u64, TaskHandle)>,
    settle_task: Option<TaskHandle>,
}

impl Core {
    /// Config that describes the current state.
    fn current_config(&self) -> &SessionConfig {
        if self.state.phase == Phase::Idle {
            &self.config
        } else {
            &self.active
        }
    }

    fn tracked_tasks(&self) -> usize {
        self.advance_task.iter().count() + self.pulse_tasks.len() + self.settle_task.iter().count()
    }
}

struct Shared {
    core: Mutex<Core>,
    scheduler: Arc<dyn Scheduler>,
    ports: FeedbackPorts,
    events: broadcast::Sender<Event>,
}

/// Guided-breathing session engine.
///
/// Safe to share across threads; `start`/`stop` and scheduled callbacks
/// serialize on one internal lock. Feedback ports are called with that lock
/// held and must not call back into the engine.
pub struct SessionEngine {
    shared: Arc<Shared>,
}

impl SessionEngine {
    /// Create an idle engine with default preferences.
    pub fn new(scheduler: Arc<dyn Scheduler>, ports: FeedbackPorts) -> Self {
        Self::with_config(scheduler, ports, SessionConfig::default())
    }

    /// Create an idle engine with preferences loaded from the settings store.
    pub fn with_config(
        scheduler: Arc<dyn Scheduler>,
        ports: FeedbackPorts,
        config: SessionConfig,
    ) -> Self {
        let now = scheduler.now_ms();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let core = Core {
            state: idle_state(&config),
            config,
            active: config,
            generation: 0,
            session_id: Uuid::nil(),
            started_at: Utc::now(),
            phase_entered_ms: now,
            advance_task: None,
            pulse_tasks: Vec::new(),
            settle_task: None,
        };
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(core),
                scheduler,
                ports,
                events,
            }),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.shared.lock().state.clone()
    }

    /// Configured preferences, used for the idle state.
    pub fn config(&self) -> SessionConfig {
        self.shared.lock().config
    }

    /// Snapshot the current or most recent session runs with.
    pub fn session_config(&self) -> SessionConfig {
        self.shared.lock().active
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().state.running
    }

    pub fn progress(&self) -> Progress {
        let core = self.shared.lock();
        self.shared.progress(&core)
    }

    /// Number of scheduled tasks the engine currently owns.
    pub fn pending_tasks(&self) -> usize {
        self.shared.lock().tracked_tasks()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.shared.events.subscribe()
    }

    /// Build a full state snapshot event.
    pub fn snapshot(&self) -> Event {
        let core = self.shared.lock();
        let progress = self.shared.progress(&core);
        Event::StateSnapshot {
            phase: core.state.phase,
            cycle_index: core.state.cycle_index,
            cycle_count: core.state.cycle_count,
            running: core.state.running,
            prompt: core.state.prompt.clone(),
            phase_elapsed_ms: progress.phase_elapsed_ms,
            phase_total_ms: progress.phase_total_ms,
            session_pct: progress.session_pct,
            at: Utc::now(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Begin a session. Inhale entry actions run before this returns.
    ///
    /// # Errors
    /// [`EngineError::AlreadyRunning`] if a session is active or settling;
    /// nothing changes.
    pub fn start(&self, config: SessionConfig) -> Result<(), EngineError> {
        let shared = &self.shared;
        let mut core = shared.lock();
        if core.state.running {
            debug!(phase = %core.state.phase, "start ignored: session already running");
            return Err(EngineError::AlreadyRunning);
        }

        shared.cancel_all(&mut core);
        core.generation += 1;
        core.active = config;
        core.session_id = Uuid::new_v4();
        core.started_at = Utc::now();
        core.state = SessionState {
            phase: Phase::Idle,
            cycle_index: 0,
            cycle_count: config.cycle_count.get(),
            running: true,
            prompt: None,
        };

        info!(
            session_id = %core.session_id,
            cycles = config.cycle_count.get(),
            sound = config.sound_enabled,
            haptics = config.haptic_enabled,
            text = config.text_enabled,
            "breathing session started"
        );
        shared.emit(Event::SessionStarted {
            session_id: core.session_id,
            cycle_count: config.cycle_count.get(),
            total_ms: config.session_ms(),
            at: core.started_at,
        });
        shared.enter_phase(&mut core, Phase::Inhale);
        Ok(())
    }

    /// End the running session early. No-op when nothing is running,
    /// including during the settle delay.
    pub fn stop(&self) {
        let mut core = self.shared.lock();
        if !core.state.running || core.state.phase == Phase::Completed {
            debug!(phase = %core.state.phase, "stop ignored: no active phase");
            return;
        }
        self.shared.complete(&mut core, SessionOutcome::Stopped);
    }

    /// Replace the preferences after a settings change. The idle state picks
    /// up the new cycle count immediately.
    ///
    /// # Errors
    /// [`EngineError::AlreadyRunning`] while a session is active or settling.
    pub fn set_config(&self, config: SessionConfig) -> Result<(), EngineError> {
        let mut core = self.shared.lock();
        if core.state.running {
            debug!(phase = %core.state.phase, "config change deferred: session running");
            return Err(EngineError::AlreadyRunning);
        }
        core.config = config;
        core.state = idle_state(&config);
        debug!(?config, "engine preferences updated");
        Ok(())
    }
}

impl Drop for SessionEngine {
    fn drop(&mut self) {
        let mut core = self.shared.lock();
        core.generation += 1;
        self.shared.cancel_all(&mut core);
    }
}

impl std::fmt::Debug for SessionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.shared.lock();
        f.debug_struct("SessionEngine")
            .field("state", &core.state)
            .field("generation", &core.generation)
            .field("pending_tasks", &core.tracked_tasks())
            .finish()
    }
}

fn idle_state(config: &SessionConfig) -> SessionState {
    SessionState {
        phase: Phase::Idle,
        cycle_index: 0,
        cycle_count: config.cycle_count.get(),
        running: false,
        prompt: Some(Phase::Idle.prompt().to_string()),
    }
}

// ── Internal ─────────────────────────────────────────────────────────

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn report(&self, channel: &'static str, result: Result<(), FeedbackError>) {
        if let Err(e) = result {
            warn!(channel, error = %e, "feedback port failed; session continues");
        }
    }

    /// Schedule `action` to run against these internals after `delay_ms`.
    /// The callback holds only a weak reference, so it dies with the engine.
    fn schedule_with<F>(self: &Arc<Self>, delay_ms: u64, action: F) -> TaskHandle
    where
        F: FnOnce(&Arc<Shared>) + Send + 'static,
    {
        let weak = Arc::downgrade(self);
        self.scheduler.schedule(
            delay_ms,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    action(&shared);
                }
            }),
        )
    }

    fn cancel_pulses(&self, core: &mut Core) {
        for (_, handle) in core.pulse_tasks.drain(..) {
            self.scheduler.cancel(handle);
        }
    }

    fn cancel_all(&self, core: &mut Core) {
        if let Some(handle) = core.advance_task.take() {
            self.scheduler.cancel(handle);
        }
        if let Some(handle) = core.settle_task.take() {
            self.scheduler.cancel(handle);
        }
        self.cancel_pulses(core);
    }

    fn enter_phase(self: &Arc<Self>, core: &mut Core, phase: Phase) {
        let Some(duration_ms) = phase.duration_ms() else {
            return;
        };
        let config = core.active;
        core.state.phase = phase;
        core.phase_entered_ms = self.scheduler.now_ms();
        core.state.prompt = config.text_enabled.then(|| phase.prompt().to_string());
        debug!(
            phase = %phase,
            cycle = core.state.cycle_index,
            at_ms = core.phase_entered_ms,
            "entering phase"
        );

        match phase {
            Phase::Inhale => {
                let ports = &self.ports;
                self.report("animation", ports.animation.animate_to(EXPANDED_SCALE, INHALE_MS));
                if config.sound_enabled {
                    self.report("sound", ports.sound.play(Cue::Inhale));
                }
                if config.haptic_enabled {
                    self.report("haptics", ports.haptics.pulse(PulseIntensity::Heavy));
                }
            }
            Phase::Exhale => {
                let ports = &self.ports;
                self.report("animation", ports.animation.animate_to(RESTING_SCALE, EXHALE_MS));
                if config.sound_enabled {
                    self.report("sound", ports.sound.play(Cue::Exhale));
                }
                if config.haptic_enabled {
                    let generation = core.generation;
                    for index in 0..EXHALE_PULSES {
                        let handle = self.schedule_with(
                            index * EXHALE_PULSE_SPACING_MS,
                            move |shared| shared.on_pulse(generation, index),
                        );
                        core.pulse_tasks.push((index, handle));
                    }
                }
            }
            Phase::Hold | Phase::Idle | Phase::Completed => {}
        }

        let generation = core.generation;
        core.advance_task =
            Some(self.schedule_with(duration_ms, move |shared| shared.on_advance(generation)));

        self.emit(Event::PhaseEntered {
            session_id: core.session_id,
            phase,
            cycle_index: core.state.cycle_index,
            cycle_count: core.state.cycle_count,
            duration_ms,
            prompt: core.state.prompt.clone(),
            at: Utc::now(),
        });
    }

    fn on_advance(self: &Arc<Self>, generation: u64) {
        let mut core = self.lock();
        if core.generation != generation
            || !core.state.running
            || core.state.phase == Phase::Completed
        {
            debug!(generation, "stale phase advance ignored");
            return;
        }
        core.advance_task = None;

        let phase = core.state.phase;
        match phase {
            Phase::Inhale | Phase::Hold => {
                if let Some(next) = phase.next() {
                    self.enter_phase(&mut core, next);
                }
            }
            Phase::Exhale => {
                self.cancel_pulses(&mut core);
                core.state.cycle_index += 1;
                if core.state.cycle_index >= core.state.cycle_count {
                    self.complete(&mut core, SessionOutcome::Finished);
                } else {
                    self.enter_phase(&mut core, Phase::Inhale);
                }
            }
            Phase::Idle | Phase::Completed => {}
        }
    }

    fn on_pulse(&self, generation: u64, index: u64) {
        let mut core = self.lock();
        if core.generation != generation || !core.state.running || core.state.phase != Phase::Exhale
        {
            debug!(generation, index, "stale exhale pulse ignored");
            return;
        }
        core.pulse_tasks.retain(|(i, _)| *i != index);
        self.report("haptics", self.ports.haptics.pulse(PulseIntensity::Light));
    }

    /// Enter `Completed`: tear down every task, silence the ports and arm the
    /// settle timer. `running` stays set until the settle fires.
    fn complete(self: &Arc<Self>, core: &mut Core, outcome: SessionOutcome) {
        self.cancel_all(core);
        core.generation += 1;

        self.report("sound", self.ports.sound.stop_all());
        self.report("animation", self.ports.animation.set_immediate(RESTING_SCALE));

        let cycles_completed = core.state.cycle_index;
        core.state.phase = Phase::Completed;
        core.state.prompt = Some(Phase::Completed.prompt().to_string());
        core.phase_entered_ms = self.scheduler.now_ms();

        info!(
            session_id = %core.session_id,
            outcome = outcome.as_str(),
            cycles_completed,
            cycle_count = core.state.cycle_count,
            "breathing session ended"
        );
        self.emit(Event::SessionCompleted {
            session_id: core.session_id,
            outcome,
            cycle_count: core.state.cycle_count,
            cycles_completed,
            started_at: core.started_at,
            at: Utc::now(),
        });

        let generation = core.generation;
        core.settle_task =
            Some(self.schedule_with(SETTLE_MS, move |shared| shared.on_settle(generation)));
    }

    fn on_settle(&self, generation: u64) {
        let mut core = self.lock();
        if core.generation != generation || core.state.phase != Phase::Completed {
            debug!(generation, "stale settle ignored");
            return;
        }
        core.settle_task = None;
        core.state = idle_state(&core.config);
        core.phase_entered_ms = self.scheduler.now_ms();
        debug!("session settled; engine idle");
        self.emit(Event::SessionIdle { at: Utc::now() });
    }

    fn progress(&self, core: &Core) -> Progress {
        let now = self.scheduler.now_ms();
        let phase = core.state.phase;
        let phase_total_ms = phase.duration_ms().unwrap_or(0);
        let phase_elapsed_ms = now.saturating_sub(core.phase_entered_ms).min(phase_total_ms);
        let session_total_ms = core.current_config().session_ms();

        let session_elapsed_ms = match phase {
            Phase::Inhale | Phase::Hold | Phase::Exhale => {
                core.state.cycle_index as u64 * CYCLE_MS
                    + phase.offset_in_cycle_ms()
                    + phase_elapsed_ms
            }
            Phase::Completed => core.state.cycle_index as u64 * CYCLE_MS,
            Phase::Idle => 0,
        }
        .min(session_total_ms);

        let session_pct = if session_total_ms == 0 {
            0.0
        } else {
            (session_elapsed_ms as f64 / session_total_ms as f64 * 100.0).min(100.0)
        };

        Progress {
            phase_elapsed_ms,
            phase_total_ms,
            session_elapsed_ms,
            session_total_ms,
            session_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::feedback::{AnimationDriver, HapticPulser, SoundPlayer};
    use crate::timer::CycleCount;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Animate(f32),
        Reset(f32),
        Play(Cue),
        StopAll,
        Pulse(PulseIntensity, u64),
    }

    struct Recorder {
        clock: Arc<ManualClock>,
        calls: Mutex<Vec<Call>>,
        fail_sound: bool,
    }

    impl Recorder {
        fn new(clock: Arc<ManualClock>) -> Arc<Self> {
            Arc::new(Self { clock, calls: Mutex::new(Vec::new()), fail_sound: false })
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn push(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl AnimationDriver for Recorder {
        fn animate_to(&self, target: f32, _duration_ms: u64) -> Result<(), FeedbackError> {
            self.push(Call::Animate(target));
            Ok(())
        }
        fn set_immediate(&self, value: f32) -> Result<(), FeedbackError> {
            self.push(Call::Reset(value));
            Ok(())
        }
        fn current_value(&self) -> f32 {
            RESTING_SCALE
        }
    }

    impl SoundPlayer for Recorder {
        fn play(&self, cue: Cue) -> Result<(), FeedbackError> {
            self.push(Call::Play(cue));
            if self.fail_sound {
                return Err(FeedbackError::AssetMissing { name: cue.as_str().into() });
            }
            Ok(())
        }
        fn stop_all(&self) -> Result<(), FeedbackError> {
            self.push(Call::StopAll);
            Ok(())
        }
    }

    impl HapticPulser for Recorder {
        fn pulse(&self, intensity: PulseIntensity) -> Result<(), FeedbackError> {
            self.push(Call::Pulse(intensity, self.clock.now_ms()));
            Ok(())
        }
    }

    fn setup() -> (Arc<ManualClock>, Arc<Recorder>, SessionEngine) {
        let clock = Arc::new(ManualClock::new());
        let recorder = Recorder::new(clock.clone());
        let ports = FeedbackPorts::default()
            .with_animation(recorder.clone())
            .with_sound(recorder.clone())
            .with_haptics(recorder.clone());
        let engine = SessionEngine::new(clock.clone(), ports);
        (clock, recorder, engine)
    }

    #[test]
    fn starts_idle() {
        let (_clock, _rec, engine) = setup();
        let state = engine.state();
        assert_eq!(state.phase, Phase::Idle);
        assert!(!state.running);
        assert_eq!(state.prompt.as_deref(), Some("Tap to begin"));
        assert_eq!(engine.pending_tasks(), 0);
    }

    #[test]
    fn start_enters_inhale_synchronously() {
        let (_clock, rec, engine) = setup();
        engine.start(SessionConfig::default()).unwrap();
        let state = engine.state();
        assert_eq!(state.phase, Phase::Inhale);
        assert_eq!(state.cycle_index, 0);
        assert!(state.running);
        assert_eq!(state.prompt.as_deref(), Some("Inhale"));
        assert_eq!(
            rec.calls(),
            vec![Call::Animate(EXPANDED_SCALE), Call::Pulse(PulseIntensity::Heavy, 0)]
        );
        assert_eq!(engine.pending_tasks(), 1);
    }

    #[test]
    fn start_while_running_is_rejected() {
        let (clock, _rec, engine) = setup();
        engine.start(SessionConfig::default()).unwrap();
        clock.advance(5_000);
        let before = engine.state();
        assert_eq!(engine.start(SessionConfig::default()), Err(EngineError::AlreadyRunning));
        assert_eq!(engine.state(), before);
        assert_eq!(engine.pending_tasks(), 1);
    }

    #[test]
    fn phases_follow_fixed_durations() {
        let (clock, _rec, engine) = setup();
        engine.start(SessionConfig::default()).unwrap();
        clock.advance(3_999);
        assert_eq!(engine.state().phase, Phase::Inhale);
        clock.advance(1);
        assert_eq!(engine.state().phase, Phase::Hold);
        clock.advance(7_000);
        assert_eq!(engine.state().phase, Phase::Exhale);
        clock.advance(8_000);
        let state = engine.state();
        assert_eq!(state.phase, Phase::Inhale);
        assert_eq!(state.cycle_index, 1);
    }

    #[test]
    fn sound_cues_follow_toggle() {
        let (clock, rec, engine) = setup();
        let config = SessionConfig {
            sound_enabled: true,
            haptic_enabled: false,
            ..SessionConfig::default()
        };
        engine.start(config).unwrap();
        clock.advance(11_000);
        assert_eq!(
            rec.calls(),
            vec![
                Call::Animate(EXPANDED_SCALE),
                Call::Play(Cue::Inhale),
                Call::Animate(RESTING_SCALE),
                Call::Play(Cue::Exhale),
            ]
        );
    }

    #[test]
    fn text_toggle_hides_prompts() {
        let (clock, _rec, engine) = setup();
        let config = SessionConfig { text_enabled: false, ..SessionConfig::default() };
        engine.start(config).unwrap();
        assert_eq!(engine.state().prompt, None);
        clock.advance(4_000);
        assert_eq!(engine.state().prompt, None);
        engine.stop();
        assert_eq!(engine.state().prompt.as_deref(), Some("Session complete."));
    }

    #[test]
    fn exhale_pulses_once_per_second() {
        let (clock, rec, engine) = setup();
        engine.start(SessionConfig::default()).unwrap();
        clock.advance(19_000);
        let light: Vec<u64> = rec
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Pulse(PulseIntensity::Light, at) => Some(at),
                _ => None,
            })
            .collect();
        assert_eq!(light, (0..8).map(|i| 11_000 + i * 1_000).collect::<Vec<_>>());
    }

    #[test]
    fn stop_mid_exhale_drops_remaining_pulses() {
        let (clock, rec, engine) = setup();
        engine.start(SessionConfig::default()).unwrap();
        clock.advance(11_000 + 3_500);
        engine.stop();
        clock.advance(60_000);

        let light = rec
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::Pulse(PulseIntensity::Light, _)))
            .count();
        assert_eq!(light, 4);
        assert_eq!(engine.state().phase, Phase::Idle);
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn stop_silences_and_settles() {
        let (clock, rec, engine) = setup();
        engine.start(SessionConfig::default()).unwrap();
        clock.advance(2_000);
        engine.stop();

        let state = engine.state();
        assert_eq!(state.phase, Phase::Completed);
        assert!(state.running);
        assert_eq!(&rec.calls()[2..], &[Call::StopAll, Call::Reset(RESTING_SCALE)]);
        assert_eq!(engine.pending_tasks(), 1);

        clock.advance(2_999);
        assert_eq!(engine.state().phase, Phase::Completed);
        clock.advance(1);
        let state = engine.state();
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.cycle_index, 0);
        assert!(!state.running);
        assert_eq!(engine.pending_tasks(), 0);
    }

    #[test]
    fn stop_when_idle_is_noop() {
        let (clock, rec, engine) = setup();
        engine.stop();
        assert_eq!(engine.state().phase, Phase::Idle);
        assert!(rec.calls().is_empty());
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn start_during_settle_window_is_rejected() {
        let (clock, rec, engine) = setup();
        engine.start(SessionConfig::default()).unwrap();
        clock.advance(76_000);
        let settling = engine.state();
        assert_eq!(settling.phase, Phase::Completed);
        assert!(settling.running);

        let calls_before = rec.calls().len();
        assert_eq!(engine.start(SessionConfig::default()), Err(EngineError::AlreadyRunning));
        assert_eq!(engine.state(), settling);
        assert_eq!(rec.calls().len(), calls_before);

        clock.advance(3_000);
        assert_eq!(engine.state().phase, Phase::Idle);
        assert!(engine.start(SessionConfig::default()).is_ok());
    }

    #[test]
    fn stop_during_settle_window_keeps_settle_timer() {
        let (clock, rec, engine) = setup();
        let mut rx = engine.subscribe();
        engine.start(SessionConfig::default()).unwrap();
        engine.stop();
        clock.advance(1_500);
        let calls_before = rec.calls().len();
        engine.stop();
        assert_eq!(rec.calls().len(), calls_before);
        clock.advance(1_500);
        assert_eq!(engine.state().phase, Phase::Idle);

        let completed = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| e.kind() == "SessionCompleted")
            .count();
        assert_eq!(completed, 1);
    }

    #[test]
    fn idle_state_reflects_configured_preferences() {
        let clock = Arc::new(ManualClock::new());
        let config = SessionConfig { cycle_count: CycleCount::Twelve, ..SessionConfig::default() };
        let engine = SessionEngine::with_config(clock.clone(), FeedbackPorts::default(), config);
        assert_eq!(engine.state().cycle_count, 12);
        assert_eq!(engine.config(), config);
        assert_eq!(engine.progress().session_total_ms, 12 * 19_000);

        // A one-off session config does not outlive the session.
        let one_off = SessionConfig { cycle_count: CycleCount::Four, ..config };
        engine.start(one_off).unwrap();
        assert_eq!(engine.state().cycle_count, 4);
        assert_eq!(engine.session_config(), one_off);
        engine.stop();
        clock.advance(3_000);
        assert_eq!(engine.state().cycle_count, 12);
    }

    #[test]
    fn set_config_applies_only_while_idle() {
        let (clock, _rec, engine) = setup();
        let eight = SessionConfig { cycle_count: CycleCount::Eight, ..SessionConfig::default() };
        engine.set_config(eight).unwrap();
        assert_eq!(engine.state().cycle_count, 8);

        engine.start(engine.config()).unwrap();
        let twelve = SessionConfig { cycle_count: CycleCount::Twelve, ..SessionConfig::default() };
        assert_eq!(engine.set_config(twelve), Err(EngineError::AlreadyRunning));
        engine.stop();
        assert_eq!(engine.set_config(twelve), Err(EngineError::AlreadyRunning));
        assert_eq!(engine.state().cycle_count, 8);

        clock.advance(3_000);
        engine.set_config(twelve).unwrap();
        assert_eq!(engine.state().cycle_count, 12);
        assert_eq!(engine.state().phase, Phase::Idle);
    }

    #[test]
    fn sound_failure_does_not_disturb_timing() {
        let clock = Arc::new(ManualClock::new());
        let recorder = Arc::new(Recorder {
            clock: clock.clone(),
            calls: Mutex::new(Vec::new()),
            fail_sound: true,
        });
        let ports = FeedbackPorts::default().with_sound(recorder.clone());
        let engine = SessionEngine::new(clock.clone(), ports);
        let config = SessionConfig { sound_enabled: true, ..SessionConfig::default() };
        engine.start(config).unwrap();
        clock.advance(11_000);
        assert_eq!(engine.state().phase, Phase::Exhale);
        assert_eq!(
            recorder.calls(),
            vec![Call::Play(Cue::Inhale), Call::Play(Cue::Exhale)]
        );
    }

    #[test]
    fn progress_tracks_session() {
        let (clock, _rec, engine) = setup();
        engine
            .start(SessionConfig { cycle_count: CycleCount::Four, ..SessionConfig::default() })
            .unwrap();
        clock.advance(19_000 + 2_000);
        let progress = engine.progress();
        assert_eq!(progress.phase_total_ms, 4_000);
        assert_eq!(progress.phase_elapsed_ms, 2_000);
        assert_eq!(progress.session_elapsed_ms, 21_000);
        assert_eq!(progress.session_total_ms, 76_000);
        assert!((progress.phase_fraction() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn drop_cancels_outstanding_tasks() {
        let (clock, rec, engine) = setup();
        engine.start(SessionConfig::default()).unwrap();
        clock.advance(11_000);
        assert!(clock.pending() > 0);
        let calls_before = rec.calls().len();
        drop(engine);
        assert_eq!(clock.pending(), 0);
        clock.advance(100_000);
        assert_eq!(rec.calls().len(), calls_before);
    }

    #[test]
    fn events_are_broadcast() {
        let (clock, _rec, engine) = setup();
        let mut rx = engine.subscribe();
        engine.start(SessionConfig::default()).unwrap();
        clock.advance(4_000);
        engine.stop();
        clock.advance(3_000);

        let kinds: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind())
            .collect();
        assert_eq!(
            kinds,
            vec!["SessionStarted", "PhaseEntered", "PhaseEntered", "SessionCompleted", "SessionIdle"]
        );
    }

    #[test]
    fn snapshot_returns_valid_event() {
        let (_clock, _rec, engine) = setup();
        match engine.snapshot() {
            Event::StateSnapshot { phase, running, cycle_count, .. } => {
                assert_eq!(phase, Phase::Idle);
                assert!(!running);
                assert_eq!(cycle_count, 4);
            }
            other => panic!("Expected StateSnapshot, got {other:?}"),
        }
    }
}

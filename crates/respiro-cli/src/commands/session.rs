use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use respiro_core::{
    AnimationDriver, CycleCount, Database, Event, FeedbackPorts, Phase, Result, ScaleAnimation,
    SessionConfig, SessionEngine, SettingKey, Settings, SettingsError, TokioScheduler,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use super::onboarding::INTRO;
use crate::terminal::{scale_bar, PulseIndicator, TerminalBell};

const REDRAW_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Args)]
pub struct SessionArgs {
    /// Cycles for this session only (4, 8 or 12); defaults to the saved setting
    #[arg(long)]
    pub cycles: Option<u32>,
    /// Print engine events as JSON lines instead of drawing
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: SessionArgs) -> Result<()> {
    let db = Database::open()?;
    let mut settings = Settings::load(&db);

    if !settings.onboarding_seen {
        println!("{INTRO}\n");
        if let Err(e) = settings.mark_onboarding_seen(&db) {
            warn!(error = %e, "could not save onboarding state");
        }
    }

    let preferences = settings.session_config();
    let mut config = preferences;
    if let Some(cycles) = args.cycles {
        config.cycle_count =
            CycleCount::try_from(cycles).map_err(|message| SettingsError::InvalidValue {
                key: SettingKey::SessionCycleCount.to_string(),
                value: cycles.to_string(),
                message,
            })?;
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let completed = runtime.block_on(drive(preferences, config, args.json))?;

    if let Some(Event::SessionCompleted {
        session_id,
        outcome,
        cycle_count,
        cycles_completed,
        started_at,
        at,
    }) = completed
    {
        if let Err(e) =
            db.record_session(session_id, outcome, cycle_count, cycles_completed, started_at, at)
        {
            warn!(error = %e, "could not record session history");
        }
    }
    Ok(())
}

/// Run one session with `config` in real time until the engine settles back
/// to idle. Returns the completion event, if the session got that far.
async fn drive(
    preferences: SessionConfig,
    config: SessionConfig,
    json: bool,
) -> Result<Option<Event>> {
    let scheduler = Arc::new(TokioScheduler::current());
    let animation = Arc::new(ScaleAnimation::new(scheduler.clone()));
    let pulses = Arc::new(PulseIndicator::default());
    let ports = FeedbackPorts::default()
        .with_animation(animation.clone())
        .with_sound(Arc::new(TerminalBell))
        .with_haptics(pulses.clone());

    let engine = SessionEngine::with_config(scheduler, ports, preferences);
    let mut events = engine.subscribe();
    engine.start(config)?;

    let mut redraw = tokio::time::interval(REDRAW_INTERVAL);
    let mut completed = None;
    let mut interrupted = false;

    loop {
        tokio::select! {
            biased;

            received = events.recv() => match received {
                Ok(event) => {
                    render_event(&event, json)?;
                    match event {
                        Event::SessionCompleted { .. } => completed = Some(event),
                        Event::SessionIdle { .. } => break,
                        _ => {}
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "renderer fell behind engine events"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                if interrupted {
                    // Second Ctrl-C skips the settle delay.
                    break;
                }
                interrupted = true;
                engine.stop();
            }
            _ = redraw.tick(), if !json && engine.state().phase.is_active() => {
                let progress = engine.progress();
                let remaining_s = progress
                    .phase_total_ms
                    .saturating_sub(progress.phase_elapsed_ms)
                    .div_ceil(1_000);
                let mut out = std::io::stdout();
                write!(
                    out,
                    "\r  {} {} {:>2}s  {:>3.0}%",
                    scale_bar(animation.current_value()),
                    pulses.glyph(),
                    remaining_s,
                    progress.session_pct,
                )?;
                out.flush()?;
            }
        }
    }

    if completed.is_none() {
        completed = take_completion(&mut events);
    }
    if !json {
        println!();
    }
    Ok(completed)
}

/// Pull a `SessionCompleted` still buffered in `events`, so a session ended
/// by a quick second Ctrl-C is still recorded.
fn take_completion(events: &mut broadcast::Receiver<Event>) -> Option<Event> {
    loop {
        match events.try_recv() {
            Ok(event @ Event::SessionCompleted { .. }) => return Some(event),
            Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => return None,
        }
    }
}

fn render_event(event: &Event, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }

    match event {
        Event::PhaseEntered {
            phase,
            cycle_index,
            cycle_count,
            prompt,
            ..
        } => {
            if *phase == Phase::Inhale {
                println!("\nCycle {} of {}", cycle_index + 1, cycle_count);
            }
            match prompt {
                Some(text) => println!("\r{text}...{:40}", ""),
                None => println!("\r{:50}", ""),
            }
        }
        Event::SessionCompleted { cycles_completed, cycle_count, .. } => {
            println!("\n{}  ({cycles_completed}/{cycle_count} cycles)", Phase::Completed.prompt());
        }
        Event::SessionStarted { .. } | Event::SessionIdle { .. } | Event::StateSnapshot { .. } => {}
    }
    Ok(())
}

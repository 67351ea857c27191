use clap::Subcommand;
use respiro_core::timer::CYCLE_MS;
use respiro_core::{CycleCount, Database, Result, SettingKey, Settings};

pub const INTRO: &str = "Respiro\nQuick relief for anxiety with the 4-7-8 technique.";

const ABOUT: &str = "\
The 4-7-8 technique

  1. Inhale quietly through your nose for 4 seconds.
  2. Hold your breath for 7 seconds.
  3. Exhale completely through your mouth for 8 seconds.

One cycle takes 19 seconds. Longer sessions are available once the
pattern feels comfortable. Stop at any time if you feel light-headed.";

#[derive(Subcommand)]
pub enum OnboardingAction {
    /// Print whether the introduction has been acknowledged
    Status,
    /// Mark the introduction as seen
    Complete,
    /// Show the introduction again on the next session
    Reset,
}

pub fn run(action: OnboardingAction) -> Result<()> {
    let db = Database::open()?;
    let mut settings = Settings::load(&db);

    match action {
        OnboardingAction::Status => {
            let status = serde_json::json!({ "onboardingSeen": settings.onboarding_seen });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        OnboardingAction::Complete => {
            settings.mark_onboarding_seen(&db)?;
            println!("ok");
        }
        OnboardingAction::Reset => {
            settings.set(&db, SettingKey::OnboardingSeen.as_str(), "false")?;
            println!("ok");
        }
    }
    Ok(())
}

pub fn about() -> Result<()> {
    println!("{ABOUT}\n\nSession lengths:");
    for count in CycleCount::ALL {
        let marker = if count.is_recommended() { "  (recommended)" } else { "" };
        println!("  {:>2} cycles  {:>3}s{marker}", count.get(), u64::from(count.get()) * CYCLE_MS / 1_000);
    }
    Ok(())
}

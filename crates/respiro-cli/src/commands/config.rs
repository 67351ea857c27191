use clap::Subcommand;
use respiro_core::{Database, Result, Settings};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a setting value
    Get {
        /// Setting key (e.g. "sessionCycleCount", "soundGuideEnabled")
        key: String,
    },
    /// Set a setting value
    Set {
        /// Setting key
        key: String,
        /// New value
        value: String,
    },
    /// List all settings
    List,
    /// Reset session preferences to defaults
    Reset,
}

pub fn run(action: ConfigAction) -> Result<()> {
    let db = Database::open()?;
    let mut settings = Settings::load(&db);

    match action {
        ConfigAction::Get { key } => match settings.get(&key)? {
            Some(value) => println!("{value}"),
            None => println!("(absent)"),
        },
        ConfigAction::Set { key, value } => {
            settings.set(&db, &key, &value)?;
            println!("ok");
        }
        ConfigAction::List => {
            let map: serde_json::Map<String, serde_json::Value> = settings
                .entries()
                .into_iter()
                .map(|(key, value)| {
                    let value = value.map(serde_json::Value::String).unwrap_or_default();
                    (key.to_string(), value)
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&map)?);
        }
        ConfigAction::Reset => {
            settings.reset(&db)?;
            println!("settings reset to defaults");
        }
    }
    Ok(())
}

mod database;
mod settings;

pub use database::{Database, SessionRecord, Stats};
pub use settings::{MemorySettingsStore, SettingKey, Settings, SettingsStore};

use std::path::PathBuf;

/// Returns the data directory, creating it if needed.
///
/// `RESPIRO_DATA_DIR` overrides the location outright. Otherwise this is
/// `~/.config/respiro[-dev]/`, with `RESPIRO_ENV=dev` selecting the
/// development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let dir = match std::env::var_os("RESPIRO_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("RESPIRO_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("respiro-dev")
            } else {
                base_dir.join("respiro")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

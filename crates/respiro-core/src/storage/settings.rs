//! Persisted user preferences.
//!
//! Settings live in a string key/value store so they survive restarts:
//!
//! | key                  | values              | default |
//! |----------------------|---------------------|---------|
//! | `onboardingSeen`     | `"true"` / absent   | absent  |
//! | `sessionCycleCount`  | `"4"` `"8"` `"12"`  | `"4"`   |
//! | `soundGuideEnabled`  | `"true"` / `"false"`| `"false"` |
//! | `hapticGuideEnabled` | `"true"` / `"false"`| `"true"`  |
//! | `textGuideEnabled`   | `"true"` / `"false"`| `"true"`  |
//!
//! Reads never fail: anything unreadable or unparseable falls back with a
//! warning. Writes are validated first and only change the in-memory view
//! once the store accepted them.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::Database;
use crate::error::SettingsError;
use crate::timer::{CycleCount, SessionConfig};

/// String key/value persistence.
pub trait SettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError>;

    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError>;

    /// Delete `key`. Missing keys are not an error.
    fn remove(&self, key: &str) -> Result<(), SettingsError>;
}

impl SettingsStore for Database {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        self.kv_get(key).map_err(|e| SettingsError::ReadFailed {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.kv_set(key, value).map_err(|e| SettingsError::WriteFailed {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    fn remove(&self, key: &str) -> Result<(), SettingsError> {
        self.kv_remove(key).map_err(|e| SettingsError::WriteFailed {
            key: key.to_string(),
            message: e.to_string(),
        })
    }
}

/// In-memory store, for tests and ephemeral front-ends.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        Ok(self
            .values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SettingsError> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }
}

/// Keys of the settings contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettingKey {
    #[serde(rename = "onboardingSeen")]
    OnboardingSeen,
    #[serde(rename = "sessionCycleCount")]
    SessionCycleCount,
    #[serde(rename = "soundGuideEnabled")]
    SoundGuideEnabled,
    #[serde(rename = "hapticGuideEnabled")]
    HapticGuideEnabled,
    #[serde(rename = "textGuideEnabled")]
    TextGuideEnabled,
}

impl SettingKey {
    pub const ALL: [SettingKey; 5] = [
        SettingKey::OnboardingSeen,
        SettingKey::SessionCycleCount,
        SettingKey::SoundGuideEnabled,
        SettingKey::HapticGuideEnabled,
        SettingKey::TextGuideEnabled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::OnboardingSeen => "onboardingSeen",
            SettingKey::SessionCycleCount => "sessionCycleCount",
            SettingKey::SoundGuideEnabled => "soundGuideEnabled",
            SettingKey::HapticGuideEnabled => "hapticGuideEnabled",
            SettingKey::TextGuideEnabled => "textGuideEnabled",
        }
    }
}

impl FromStr for SettingKey {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SettingKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| SettingsError::UnknownKey(s.to_string()))
    }
}

impl std::fmt::Display for SettingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed view over the settings store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Settings {
    pub onboarding_seen: bool,
    pub session: SessionConfig,
}

fn parse_bool(key: SettingKey, value: &str) -> Result<bool, SettingsError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(SettingsError::InvalidValue {
            key: key.to_string(),
            value: other.to_string(),
            message: "expected \"true\" or \"false\"".into(),
        }),
    }
}

impl Settings {
    /// Load from `store`, using contract defaults for anything missing or
    /// unreadable.
    pub fn load(store: &dyn SettingsStore) -> Self {
        Self::load_or(store, Self::default())
    }

    /// Load from `store`. Keys that cannot be read keep their value from
    /// `last_known`; absent keys take the contract default.
    pub fn load_or(store: &dyn SettingsStore, last_known: Settings) -> Self {
        let mut settings = last_known;
        for key in SettingKey::ALL {
            match store.get(key.as_str()) {
                Ok(Some(raw)) => {
                    if let Err(e) = settings.apply(key, &raw) {
                        warn!(key = key.as_str(), error = %e, "ignoring invalid stored setting");
                        settings.restore_default(key);
                    }
                }
                Ok(None) => settings.restore_default(key),
                Err(e) => {
                    warn!(key = key.as_str(), error = %e, "settings read failed; keeping last known value");
                }
            }
        }
        debug!(?settings, "settings loaded");
        settings
    }

    pub fn session_config(&self) -> SessionConfig {
        self.session
    }

    /// Current value of `key` in its stored encoding. `None` means the key is
    /// absent from the store (only `onboardingSeen` can be).
    ///
    /// # Errors
    /// [`SettingsError::UnknownKey`] for keys outside the contract.
    pub fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        let key: SettingKey = key.parse()?;
        Ok(self.encode(key))
    }

    /// Validate, persist, then apply one setting.
    ///
    /// # Errors
    /// Unknown keys and invalid values are rejected before touching the
    /// store. A failed write leaves both the store and `self` unchanged.
    pub fn set(
        &mut self,
        store: &dyn SettingsStore,
        key: &str,
        value: &str,
    ) -> Result<(), SettingsError> {
        let key: SettingKey = key.parse()?;
        let mut next = *self;
        next.apply(key, value)?;
        next.persist(store, key)?;
        *self = next;
        Ok(())
    }

    pub fn mark_onboarding_seen(&mut self, store: &dyn SettingsStore) -> Result<(), SettingsError> {
        self.set(store, SettingKey::OnboardingSeen.as_str(), "true")
    }

    /// Restore the session preferences to their defaults. The onboarding
    /// flag is left alone.
    ///
    /// # Errors
    /// Stops at the first failed write; keys written before it keep their
    /// new value in both the store and `self`.
    pub fn reset(&mut self, store: &dyn SettingsStore) -> Result<(), SettingsError> {
        let defaults = Settings {
            onboarding_seen: self.onboarding_seen,
            ..Settings::default()
        };
        for key in SettingKey::ALL {
            if key == SettingKey::OnboardingSeen {
                continue;
            }
            defaults.persist(store, key)?;
            self.restore_default(key);
        }
        Ok(())
    }

    /// Every key with its current encoded value.
    pub fn entries(&self) -> Vec<(SettingKey, Option<String>)> {
        SettingKey::ALL
            .into_iter()
            .map(|key| (key, self.encode(key)))
            .collect()
    }

    fn apply(&mut self, key: SettingKey, raw: &str) -> Result<(), SettingsError> {
        match key {
            SettingKey::OnboardingSeen => self.onboarding_seen = parse_bool(key, raw)?,
            SettingKey::SessionCycleCount => {
                self.session.cycle_count =
                    CycleCount::from_str(raw).map_err(|message| SettingsError::InvalidValue {
                        key: key.to_string(),
                        value: raw.to_string(),
                        message,
                    })?;
            }
            SettingKey::SoundGuideEnabled => self.session.sound_enabled = parse_bool(key, raw)?,
            SettingKey::HapticGuideEnabled => self.session.haptic_enabled = parse_bool(key, raw)?,
            SettingKey::TextGuideEnabled => self.session.text_enabled = parse_bool(key, raw)?,
        }
        Ok(())
    }

    fn restore_default(&mut self, key: SettingKey) {
        let defaults = Settings::default();
        match key {
            SettingKey::OnboardingSeen => self.onboarding_seen = defaults.onboarding_seen,
            SettingKey::SessionCycleCount => self.session.cycle_count = defaults.session.cycle_count,
            SettingKey::SoundGuideEnabled => {
                self.session.sound_enabled = defaults.session.sound_enabled
            }
            SettingKey::HapticGuideEnabled => {
                self.session.haptic_enabled = defaults.session.haptic_enabled
            }
            SettingKey::TextGuideEnabled => self.session.text_enabled = defaults.session.text_enabled,
        }
    }

    fn encode(&self, key: SettingKey) -> Option<String> {
        match key {
            SettingKey::OnboardingSeen => self.onboarding_seen.then(|| "true".to_string()),
            SettingKey::SessionCycleCount => Some(self.session.cycle_count.to_string()),
            SettingKey::SoundGuideEnabled => Some(self.session.sound_enabled.to_string()),
            SettingKey::HapticGuideEnabled => Some(self.session.haptic_enabled.to_string()),
            SettingKey::TextGuideEnabled => Some(self.session.text_enabled.to_string()),
        }
    }

    fn persist(&self, store: &dyn SettingsStore, key: SettingKey) -> Result<(), SettingsError> {
        match self.encode(key) {
            Some(value) => store.set(key.as_str(), &value),
            None => store.remove(key.as_str()),
        }
    }
}

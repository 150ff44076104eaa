use std::fs;
use std::io;
use std::path::PathBuf;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::encoder::{EncodingMode, DEFAULT_TAG};
use super::location::DEFAULT_TIMEOUT_MS;
use super::permissions::PermissionRationales;

/// Environment variable holding the emergency contact number
pub const EMERGENCY_NUMBER_ENV: &str = "EMERGENCY_PHONE_NUMBER";

lazy_static! {
    // Optional '+', then 6-15 digits once spaces and dashes are removed
    static ref PHONE_NUMBER: Regex = Regex::new(r"^\+?[0-9]{6,15}$").expect("Invalid phone regex");
}

/// Application settings, persisted as settings.json.
/// NOTE: the webview settings form mirrors these field names.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub emergency_number: Option<String>,
    #[serde(default = "default_location_timeout")]
    pub location_timeout_ms: u64,
    #[serde(default)]
    pub encoding: EncodingMode,
    #[serde(default = "default_tag")]
    pub message_tag: String,
    #[serde(default)]
    pub permission_rationales: PermissionRationales,
}

fn default_location_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_tag() -> String {
    DEFAULT_TAG.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            emergency_number: None,
            location_timeout_ms: DEFAULT_TIMEOUT_MS,
            encoding: EncodingMode::default(),
            message_tag: default_tag(),
            permission_rationales: PermissionRationales::default(),
        }
    }
}

impl Settings {
    /// Overlay values from the environment. `lookup` is `std::env::var` in
    /// production.
    pub fn apply_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(number) = lookup(EMERGENCY_NUMBER_ENV).filter(|n| !n.trim().is_empty()) {
            self.emergency_number = Some(number);
        }
        self
    }

    /// Normalized destination number, or None if blank or malformed
    pub fn destination(&self) -> Option<String> {
        let raw = self.emergency_number.as_deref()?;
        let normalized: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
            .collect();

        if PHONE_NUMBER.is_match(&normalized) {
            Some(normalized)
        } else {
            if !normalized.is_empty() {
                log::error!("Emergency number in settings is not a valid phone number");
            }
            None
        }
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(app_config_dir: PathBuf) -> Self {
        Self {
            config_path: app_config_dir.join("settings.json"),
        }
    }

    /// Settings from disk with environment overrides applied.
    /// Missing or unreadable files fall back to defaults.
    pub fn load(&self) -> Settings {
        let settings = self.load_file().unwrap_or_default();
        settings.apply_env_overrides(|key| std::env::var(key).ok())
    }

    fn load_file(&self) -> Option<Settings> {
        let content = fs::read_to_string(&self.config_path).ok()?;
        match serde_json::from_str(&content) {
            Ok(settings) => Some(settings),
            Err(e) => {
                log::warn!("Ignoring corrupt {:?}: {}", self.config_path, e);
                None
            }
        }
    }

    pub fn save(&self, settings: &Settings) -> io::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.config_path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::new(dir.path().to_path_buf());

        let default = manager.load_file().unwrap_or_default();
        assert_eq!(default.location_timeout_ms, 30_000);
        assert_eq!(default.message_tag, "Rakshak");
        assert_eq!(default.encoding, EncodingMode::MapLink);

        let new_settings = Settings {
            emergency_number: Some("+911234567890".to_string()),
            location_timeout_ms: 15_000,
            encoding: EncodingMode::PackedJson,
            ..Settings::default()
        };

        manager.save(&new_settings).unwrap();
        let loaded = manager.load_file().unwrap();
        assert_eq!(loaded, new_settings);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("settings.json"), r#"{"emergency_number":"+15550100"}"#).unwrap();
        let manager = ConfigManager::new(dir.path().to_path_buf());

        let loaded = manager.load_file().unwrap();
        assert_eq!(loaded.emergency_number.as_deref(), Some("+15550100"));
        assert_eq!(loaded.location_timeout_ms, 30_000);
        assert_eq!(loaded.permission_rationales.sms.title, "SMS Permission");
    }

    #[test]
    fn test_corrupt_file_falls_back() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("settings.json"), "{not json").unwrap();
        let manager = ConfigManager::new(dir.path().to_path_buf());
        assert!(manager.load_file().is_none());
    }

    #[test]
    fn test_env_override() {
        let settings = Settings {
            emergency_number: Some("+15550100".to_string()),
            ..Settings::default()
        };

        let overridden = settings
            .clone()
            .apply_env_overrides(|key| (key == EMERGENCY_NUMBER_ENV).then(|| "+911234567890".to_string()));
        assert_eq!(overridden.emergency_number.as_deref(), Some("+911234567890"));

        let blank = settings.clone().apply_env_overrides(|_| Some("  ".to_string()));
        assert_eq!(blank.emergency_number.as_deref(), Some("+15550100"));

        assert_eq!(settings.clone().apply_env_overrides(no_env), settings);
    }

    #[test]
    fn test_destination_validation() {
        let with = |n: &str| Settings {
            emergency_number: Some(n.to_string()),
            ..Settings::default()
        };

        assert_eq!(with("+911234567890").destination().as_deref(), Some("+911234567890"));
        assert_eq!(with(" +1 555-010-0999 ").destination().as_deref(), Some("+15550100999"));
        assert_eq!(with("").destination(), None);
        assert_eq!(with("call me").destination(), None);
        assert_eq!(with("123").destination(), None);
        assert_eq!(Settings::default().destination(), None);
    }
}

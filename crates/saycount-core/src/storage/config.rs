//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Default countdown length and stop timeout
//! - Announcement queue capacity
//! - Speech program, voice, rate and volume
//! - The phrase spoken when a countdown completes
//!
//! Configuration is stored at `~/.config/saycount/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;

/// Countdown timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountdownConfig {
    /// Used when no (or an invalid) duration is given on the command line.
    #[serde(default = "default_seconds")]
    pub default_seconds: u32,
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// Speech configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnouncerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Speech program; probed on PATH when unset.
    #[serde(default)]
    pub program: Option<String>,
    /// Voice name in the speech program's own vocabulary.
    #[serde(default)]
    pub voice: Option<String>,
    /// Words per minute.
    #[serde(default = "default_rate")]
    pub rate: u32,
    /// 0..=100
    #[serde(default = "default_volume")]
    pub volume: u32,
    #[serde(default = "default_completion_phrase")]
    pub completion_phrase: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/saycount/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub countdown: CountdownConfig,
    #[serde(default)]
    pub announcer: AnnouncerConfig,
}

// Default functions
fn default_seconds() -> u32 {
    10
}
fn default_stop_timeout_ms() -> u64 {
    1000
}
fn default_queue_capacity() -> usize {
    16
}
fn default_true() -> bool {
    true
}
fn default_rate() -> u32 {
    150
}
fn default_volume() -> u32 {
    100
}
fn default_completion_phrase() -> String {
    "Countdown complete!".into()
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            default_seconds: default_seconds(),
            stop_timeout_ms: default_stop_timeout_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for AnnouncerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: None,
            voice: None,
            rate: default_rate(),
            volume: default_volume(),
            completion_phrase: default_completion_phrase(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(invalid("config key is empty".into()));
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| invalid("unknown config key".into()))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| invalid("unknown config key".into()))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => value
                        .parse::<u64>()
                        .map(|n| serde_json::Value::Number(n.into()))
                        .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?,
                    // Optional strings are null until first set.
                    serde_json::Value::Null if value.is_empty() => serde_json::Value::Null,
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| invalid("unknown config key".into()))?;
        }

        Err(invalid("unknown config key".into()))
    }

    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from an explicit path, writing defaults there if it is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated, or
    /// if the defaults cannot be written.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content)?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    /// Persist to an explicit path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without saving. Returns error if key is
    /// unknown or the value does not fit the field.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Set a config value by key and save.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply(key, value)?;
        self.save()
    }

    /// Reject values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| ConfigError::InvalidValue {
            key: key.into(),
            message: message.into(),
        };
        if self.countdown.default_seconds == 0 {
            return Err(invalid("countdown.default_seconds", "must be positive"));
        }
        if self.countdown.queue_capacity == 0 {
            return Err(invalid("countdown.queue_capacity", "must be positive"));
        }
        if self.announcer.volume > 100 {
            return Err(invalid("announcer.volume", "must be between 0 and 100"));
        }
        Ok(())
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(error = %err, "using default configuration");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.countdown.default_seconds, 10);
        assert_eq!(parsed.announcer.rate, 150);
        assert_eq!(parsed.announcer.completion_phrase, "Countdown complete!");
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let parsed: Config = toml::from_str("[announcer]\nvoice = \"en+f3\"\n").unwrap();
        assert_eq!(parsed.announcer.voice.as_deref(), Some("en+f3"));
        assert_eq!(parsed.announcer.volume, 100);
        assert_eq!(parsed.countdown.stop_timeout_ms, 1000);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("announcer.enabled").as_deref(), Some("true"));
        assert_eq!(cfg.get("countdown.default_seconds").as_deref(), Some("10"));
        assert_eq!(cfg.get("announcer.program").as_deref(), Some("null"));
        assert!(cfg.get("countdown.missing_key").is_none());
    }

    #[test]
    fn apply_updates_nested_values() {
        let mut cfg = Config::default();
        cfg.apply("announcer.enabled", "false").unwrap();
        cfg.apply("countdown.default_seconds", "30").unwrap();
        cfg.apply("announcer.program", "espeak-ng").unwrap();
        assert!(!cfg.announcer.enabled);
        assert_eq!(cfg.countdown.default_seconds, 30);
        assert_eq!(cfg.announcer.program.as_deref(), Some("espeak-ng"));
    }

    #[test]
    fn apply_rejects_unknown_key() {
        let mut cfg = Config::default();
        let err = cfg.apply("announcer.nonexistent_key", "value").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn apply_rejects_invalid_type() {
        let mut cfg = Config::default();
        assert!(cfg.apply("announcer.enabled", "not_a_bool").is_err());
        assert!(cfg.apply("countdown.default_seconds", "-3").is_err());
        assert!(cfg.announcer.enabled);
    }

    #[test]
    fn apply_rejects_out_of_range_values() {
        let mut cfg = Config::default();
        assert!(cfg.apply("countdown.default_seconds", "0").is_err());
        assert!(cfg.apply("announcer.volume", "150").is_err());
        assert_eq!(cfg.countdown.default_seconds, 10);
        assert_eq!(cfg.announcer.volume, 100);
    }

    #[test]
    fn load_from_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.countdown.default_seconds, 10);
        assert!(path.exists());
    }

    #[test]
    fn save_to_then_load_from_preserves_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut cfg = Config::default();
        cfg.apply("announcer.voice", "Samantha").unwrap();
        cfg.apply("countdown.stop_timeout_ms", "250").unwrap();
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.announcer.voice.as_deref(), Some("Samantha"));
        assert_eq!(loaded.countdown.stop_timeout_ms, 250);
    }

    #[test]
    fn load_from_rejects_zero_default_seconds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[countdown]\ndefault_seconds = 0\n").unwrap();
        match Config::load_from(&path) {
            Err(ConfigError::InvalidValue { key, .. }) => {
                assert_eq!(key, "countdown.default_seconds");
            }
            other => panic!("Expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn load_from_garbage_reports_parse_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "countdown = [not toml").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::ParseFailed(_))
        ));
    }
}

//! TOML-based application configuration.
//!
//! Stores:
//! - Session durations (minutes) and the long break interval
//! - Enabled plugins and extra plugin directories
//!
//! Values are addressed by dot-separated keys such as
//! `timer.pomodoro_duration`. Configuration lives at
//! `<data dir>/config.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Durations in minutes, plus the number of pomodoros between long breaks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerConfig {
    #[serde(default = "default_pomodoro_duration")]
    pub pomodoro_duration: u32,
    #[serde(default = "default_shortbreak_duration")]
    pub shortbreak_duration: u32,
    #[serde(default = "default_longbreak_duration")]
    pub longbreak_duration: u32,
    #[serde(default = "default_long_break_interval")]
    pub long_break_interval: u32,
}

/// Plugin configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Names of plugins to activate on discovery.
    #[serde(default)]
    pub enabled: Vec<String>,
    /// Extra directories scanned for plugin manifests.
    #[serde(default)]
    pub paths: Vec<PathBuf>,
}

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
}

fn default_pomodoro_duration() -> u32 {
    25
}
fn default_shortbreak_duration() -> u32 {
    5
}
fn default_longbreak_duration() -> u32 {
    15
}
fn default_long_break_interval() -> u32 {
    4
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            pomodoro_duration: default_pomodoro_duration(),
            shortbreak_duration: default_shortbreak_duration(),
            longbreak_duration: default_longbreak_duration(),
            long_break_interval: default_long_break_interval(),
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
                    .ok_or_else(|| ConfigError::MissingKey(key.to_string()))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| ConfigError::MissingKey(key.to_string()))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value.parse::<u64>().map_err(|_| {
                            invalid(format!("cannot parse '{value}' as a whole number"))
                        })?;
                        serde_json::Value::Number(n.into())
                    }
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
                .ok_or_else(|| ConfigError::MissingKey(key.to_string()))?;
        }

        Err(ConfigError::MissingKey(key.to_string()))
    }

    /// Dot-separated keys of every leaf value, sorted.
    pub fn keys() -> Vec<String> {
        fn collect(value: &serde_json::Value, prefix: &str, out: &mut Vec<String>) {
            match value.as_object() {
                Some(obj) => {
                    for (name, child) in obj {
                        let key = if prefix.is_empty() {
                            name.clone()
                        } else {
                            format!("{prefix}.{name}")
                        };
                        collect(child, &key, out);
                    }
                }
                None => out.push(prefix.to_string()),
            }
        }

        let mut keys = Vec::new();
        if let Ok(json) = serde_json::to_value(Config::default()) {
            collect(&json, "", &mut keys);
        }
        keys
    }

    /// Load from `path`, or return the default if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
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

    /// Get an integer config value by dot-separated key.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        let json = serde_json::to_value(self).ok()?;
        Self::get_json_value_by_path(&json, key)?.as_i64()
    }

    /// Set a config value by key, keeping the existing value's type.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        Ok(())
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
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let parsed: Config = toml::from_str("[timer]\npomodoro_duration = 50\n").unwrap();
        assert_eq!(parsed.timer.pomodoro_duration, 50);
        assert_eq!(parsed.timer.shortbreak_duration, 5);
        assert!(parsed.plugins.enabled.is_empty());
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("timer.pomodoro_duration").as_deref(), Some("25"));
        assert_eq!(cfg.get("plugins.enabled").as_deref(), Some("[]"));
        assert_eq!(cfg.get_int("timer.long_break_interval"), Some(4));
        assert!(cfg.get("timer.missing_key").is_none());
        assert!(cfg.get_int("plugins.enabled").is_none());
    }

    #[test]
    fn set_updates_nested_number() {
        let mut cfg = Config::default();
        cfg.set("timer.longbreak_duration", "20").unwrap();
        assert_eq!(cfg.timer.longbreak_duration, 20);
    }

    #[test]
    fn set_updates_array_from_json() {
        let mut cfg = Config::default();
        cfg.set("plugins.enabled", r#"["journal"]"#).unwrap();
        assert_eq!(cfg.plugins.enabled, vec!["journal".to_string()]);
    }

    #[test]
    fn set_rejects_unknown_key() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("timer.nonexistent_key", "1"),
            Err(ConfigError::MissingKey(_))
        ));
        assert!(cfg.set("", "1").is_err());
    }

    #[test]
    fn set_rejects_invalid_type() {
        let mut cfg = Config::default();
        let result = cfg.set("timer.pomodoro_duration", "twenty");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
        assert_eq!(cfg.timer.pomodoro_duration, 25);
    }

    #[test]
    fn keys_lists_every_leaf() {
        let keys = Config::keys();
        assert!(keys.contains(&"timer.pomodoro_duration".to_string()));
        assert!(keys.contains(&"timer.long_break_interval".to_string()));
        assert!(keys.contains(&"plugins.paths".to_string()));
        assert_eq!(keys.len(), 6);
    }

    #[test]
    fn load_missing_file_gives_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut cfg = Config::default();
        cfg.timer.pomodoro_duration = 40;
        cfg.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap().timer.pomodoro_duration, 40);
    }

    #[test]
    fn load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[timer\n").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::LoadFailed { .. })
        ));
    }
}

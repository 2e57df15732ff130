//! Live settings: a [`Config`] plus change notifications.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::ConfigError;
use crate::events::{EventBus, SettingsEvent, SettingsPayload};
use crate::settings::Settings;

use super::config::Config;

const PLUGINS_SECTION: &str = "plugins";
const ENABLED_OPTION: &str = "enabled";

/// Owns the configuration for a running process.
///
/// Every successful write is saved (when file-backed) and then published on
/// the settings channel as `section` / `option`, so a session can pick up a
/// new duration without being told about the store.
pub struct SettingsStore {
    config: RefCell<Config>,
    path: Option<PathBuf>,
    bus: Rc<EventBus>,
}

impl SettingsStore {
    /// Store that never touches the disk.
    pub fn in_memory(config: Config, bus: Rc<EventBus>) -> Self {
        Self {
            config: RefCell::new(config),
            path: None,
            bus,
        }
    }

    /// Open `<data dir>/config.toml`.
    ///
    /// # Errors
    /// Returns an error if the data directory is unusable or the file is malformed.
    pub fn open(bus: Rc<EventBus>) -> Result<Self, ConfigError> {
        Self::open_at(super::data_dir()?.join("config.toml"), bus)
    }

    /// Open the config file at `path`; a missing file yields defaults.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open_at(path: impl Into<PathBuf>, bus: Rc<EventBus>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = Config::load_from(&path)?;
        tracing::debug!(path = %path.display(), "settings loaded");
        Ok(Self {
            config: RefCell::new(config),
            path: Some(path),
            bus,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> Config {
        self.config.borrow().clone()
    }

    pub fn get(&self, section: &str, option: &str) -> Option<String> {
        self.config.borrow().get(&join(section, option))
    }

    /// Set `section.option` from its string form, save, then publish `Set`.
    ///
    /// # Errors
    /// Returns an error if the key is unknown, the value does not parse, or
    /// saving fails. Nothing is published on error.
    pub fn set(&self, section: &str, option: &str, value: &str) -> Result<(), ConfigError> {
        let key = join(section, option);
        let mut next = self.config();
        next.set(&key, value)?;
        let stored = next.get(&key);
        self.commit(next)?;

        tracing::info!(key = %key, value = ?stored, "setting changed");
        self.notify(SettingsEvent::Set, section, option, stored);
        Ok(())
    }

    /// Restore `section.option` to its default, save, then publish `Remove`.
    ///
    /// # Errors
    /// Returns an error if the key is unknown or saving fails.
    pub fn remove(&self, section: &str, option: &str) -> Result<(), ConfigError> {
        let key = join(section, option);
        let default = Config::default()
            .get(&key)
            .ok_or_else(|| ConfigError::MissingKey(key.clone()))?;
        let mut next = self.config();
        next.set(&key, &default)?;
        self.commit(next)?;

        tracing::info!(key = %key, "setting reset to default");
        self.notify(SettingsEvent::Remove, section, option, Some(default));
        Ok(())
    }

    /// Restore every key that differs from its default.
    ///
    /// # Errors
    /// Stops at the first key that fails to save.
    pub fn reset(&self) -> Result<(), ConfigError> {
        let defaults = Config::default();
        for key in Config::keys() {
            if self.config.borrow().get(&key) == defaults.get(&key) {
                continue;
            }
            if let Some((section, option)) = key.split_once('.') {
                self.remove(section, option)?;
            }
        }
        Ok(())
    }

    pub fn enabled_plugins(&self) -> Vec<String> {
        self.config.borrow().plugins.enabled.clone()
    }

    pub fn plugin_paths(&self) -> Vec<PathBuf> {
        self.config.borrow().plugins.paths.clone()
    }

    /// Add or remove `name` from `plugins.enabled`. No-op if already so.
    ///
    /// # Errors
    /// Returns an error if saving fails.
    pub fn set_plugin_enabled(&self, name: &str, enabled: bool) -> Result<(), ConfigError> {
        let mut next = self.config();
        let list = &mut next.plugins.enabled;
        let present = list.iter().any(|n| n == name);
        match (enabled, present) {
            (true, false) => list.push(name.to_string()),
            (false, true) => list.retain(|n| n != name),
            _ => return Ok(()),
        }
        let stored = next.get(&join(PLUGINS_SECTION, ENABLED_OPTION));
        self.commit(next)?;

        self.notify(SettingsEvent::Set, PLUGINS_SECTION, ENABLED_OPTION, stored);
        Ok(())
    }

    fn commit(&self, next: Config) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            next.save_to(path)?;
        }
        *self.config.borrow_mut() = next;
        Ok(())
    }

    /// Publishes with no borrow held, so handlers may read the store.
    fn notify(&self, action: SettingsEvent, section: &str, option: &str, value: Option<String>) {
        self.bus.settings.publish(
            action,
            &SettingsPayload {
                action,
                section: section.to_string(),
                option: option.to_string(),
                value,
            },
        );
    }
}

impl Settings for SettingsStore {
    fn get_int(&self, section: &str, key: &str) -> Result<i64, ConfigError> {
        let key = join(section, key);
        self.config
            .borrow()
            .get_int(&key)
            .ok_or(ConfigError::MissingKey(key))
    }
}

fn join(section: &str, option: &str) -> String {
    format!("{section}.{option}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(bus: &EventBus) -> Rc<RefCell<Vec<SettingsPayload>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        bus.settings
            .subscribe(&[SettingsEvent::Set, SettingsEvent::Remove], move |_, p| {
                s.borrow_mut().push(p.clone());
                true
            });
        seen
    }

    #[test]
    fn set_publishes_after_update() {
        let bus = Rc::new(EventBus::new());
        let store = Rc::new(SettingsStore::in_memory(Config::default(), Rc::clone(&bus)));

        let observed = Rc::new(RefCell::new(None));
        let (st, o) = (Rc::clone(&store), Rc::clone(&observed));
        bus.settings.subscribe(&[SettingsEvent::Set], move |_, _| {
            *o.borrow_mut() = st.get_int("timer", "pomodoro_duration").ok();
            true
        });

        store.set("timer", "pomodoro_duration", "50").unwrap();
        assert_eq!(*observed.borrow(), Some(50));
    }

    #[test]
    fn set_reports_section_option_and_value() {
        let bus = Rc::new(EventBus::new());
        let seen = recorder(&bus);
        let store = SettingsStore::in_memory(Config::default(), Rc::clone(&bus));

        store.set("timer", "shortbreak_duration", "7").unwrap();
        assert_eq!(
            seen.borrow()[0],
            SettingsPayload {
                action: SettingsEvent::Set,
                section: "timer".into(),
                option: "shortbreak_duration".into(),
                value: Some("7".into()),
            }
        );
    }

    #[test]
    fn invalid_set_changes_nothing() {
        let bus = Rc::new(EventBus::new());
        let seen = recorder(&bus);
        let store = SettingsStore::in_memory(Config::default(), Rc::clone(&bus));

        assert!(store.set("timer", "pomodoro_duration", "soon").is_err());
        assert!(store.set("timer", "nope", "1").is_err());
        assert_eq!(store.config(), Config::default());
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn remove_restores_default() {
        let bus = Rc::new(EventBus::new());
        let seen = recorder(&bus);
        let store = SettingsStore::in_memory(Config::default(), Rc::clone(&bus));

        store.set("timer", "longbreak_duration", "30").unwrap();
        store.remove("timer", "longbreak_duration").unwrap();

        assert_eq!(store.get_int("timer", "longbreak_duration").unwrap(), 15);
        let last = seen.borrow().last().cloned().unwrap();
        assert_eq!(last.action, SettingsEvent::Remove);
        assert_eq!(last.value.as_deref(), Some("15"));
    }

    #[test]
    fn reset_only_touches_changed_keys() {
        let bus = Rc::new(EventBus::new());
        let seen = recorder(&bus);
        let store = SettingsStore::in_memory(Config::default(), Rc::clone(&bus));
        store.set("timer", "pomodoro_duration", "45").unwrap();
        store.set("timer", "long_break_interval", "2").unwrap();
        seen.borrow_mut().clear();

        store.reset().unwrap();
        assert_eq!(store.config(), Config::default());
        let options: Vec<_> = seen.borrow().iter().map(|p| p.option.clone()).collect();
        assert_eq!(options, vec!["long_break_interval", "pomodoro_duration"]);
    }

    #[test]
    fn missing_key_is_an_error() {
        let store = SettingsStore::in_memory(Config::default(), Rc::new(EventBus::new()));
        assert!(matches!(
            store.get_int("timer", "lunch_duration"),
            Err(ConfigError::MissingKey(k)) if k == "timer.lunch_duration"
        ));
    }

    #[test]
    fn file_backed_store_persists_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let bus = Rc::new(EventBus::new());

        let store = SettingsStore::open_at(&path, Rc::clone(&bus)).unwrap();
        store.set("timer", "pomodoro_duration", "30").unwrap();
        store.set_plugin_enabled("journal", true).unwrap();

        let reopened = SettingsStore::open_at(&path, bus).unwrap();
        assert_eq!(reopened.get_int("timer", "pomodoro_duration").unwrap(), 30);
        assert_eq!(reopened.enabled_plugins(), vec!["journal".to_string()]);
    }

    #[test]
    fn plugin_enabled_toggle_is_idempotent() {
        let bus = Rc::new(EventBus::new());
        let seen = recorder(&bus);
        let store = SettingsStore::in_memory(Config::default(), Rc::clone(&bus));

        store.set_plugin_enabled("journal", true).unwrap();
        store.set_plugin_enabled("journal", true).unwrap();
        assert_eq!(store.enabled_plugins().len(), 1);
        assert_eq!(seen.borrow().len(), 1);

        store.set_plugin_enabled("journal", false).unwrap();
        assert!(store.enabled_plugins().is_empty());
    }
}

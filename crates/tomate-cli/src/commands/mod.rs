pub mod config;
pub mod plugin;
pub mod run;

use std::path::PathBuf;
use std::rc::Rc;

use tomate_core::plugins::{journal, ManifestLoader, PluginRegistry};
use tomate_core::storage::data_dir;
use tomate_core::{EventBus, PluginEngine, SettingsStore};

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Split `section.option`.
pub fn split_key(key: &str) -> Result<(&str, &str), String> {
    key.split_once('.')
        .filter(|(section, option)| !section.is_empty() && !option.is_empty())
        .ok_or_else(|| format!("invalid key '{key}' (expected section.option)"))
}

/// Settings store backed by `<data dir>/config.toml`.
pub fn open_store(bus: &Rc<EventBus>) -> Result<Rc<SettingsStore>, Box<dyn std::error::Error>> {
    Ok(Rc::new(SettingsStore::open(Rc::clone(bus))?))
}

fn journal_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
    Ok(data_dir()?.join("journal.jsonl"))
}

/// Plugin engine over the configured directories and built-ins, already
/// collected. Enabled plugins are active when this returns.
pub fn plugin_engine(
    bus: &Rc<EventBus>,
    store: &Rc<SettingsStore>,
) -> Result<PluginEngine, Box<dyn std::error::Error>> {
    let mut registry = PluginRegistry::new();
    journal::register(&mut registry, journal_path()?);

    let loader = ManifestLoader::configured(&data_dir()?, store, registry);
    let mut engine =
        PluginEngine::from_env(Rc::clone(bus), Box::new(loader)).with_store(Rc::clone(store));
    engine.collect();
    Ok(engine)
}

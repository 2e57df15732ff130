//! Plugin discovery.
//!
//! A [`PluginLoader`] hands the engine typed descriptors; the engine never
//! touches the filesystem itself. [`ManifestLoader`] is the stock loader:
//!
//! ```toml
//! # ~/.config/tomate/plugins/journal.plugin
//! name = "journal"
//! version = "1.0.0"
//! description = "Append finished sessions to a JSON lines file"
//! entry = "journal"
//! ```
//!
//! `entry` names a constructor registered in a [`PluginRegistry`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::Deserialize;

use crate::error::PluginError;
use crate::storage::SettingsStore;

use super::plugin::Plugin;

/// Builds a plugin instance once.
pub type PluginFactory = Box<dyn FnOnce() -> Result<Box<dyn Plugin>, PluginError>>;

/// Reusable constructor behind a registry entry.
pub type Constructor = Rc<dyn Fn() -> Result<Box<dyn Plugin>, PluginError>>;

/// A discovered plugin, not yet constructed.
pub struct PluginDescriptor {
    pub name: String,
    pub version: String,
    pub description: String,
    /// Activate as soon as the engine registers it.
    pub enabled: bool,
    pub factory: PluginFactory,
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

pub trait PluginLoader {
    /// Every plugin currently available. Called on each `collect()`.
    fn discover(&self) -> Vec<PluginDescriptor>;
}

struct Registered {
    constructor: Constructor,
    /// Built-ins are discovered without a manifest.
    builtin: Option<String>,
}

/// Constructors for plugins compiled into the binary, keyed by entry name.
#[derive(Default)]
pub struct PluginRegistry {
    entries: HashMap<String, Registered>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entry that only loads when a manifest names it.
    pub fn register<F>(&mut self, entry: &str, constructor: F)
    where
        F: Fn() -> Result<Box<dyn Plugin>, PluginError> + 'static,
    {
        self.entries.insert(
            entry.to_string(),
            Registered {
                constructor: Rc::new(constructor),
                builtin: None,
            },
        );
    }

    /// Register an entry that is discovered even without a manifest.
    pub fn builtin<F>(&mut self, name: &str, description: &str, constructor: F)
    where
        F: Fn() -> Result<Box<dyn Plugin>, PluginError> + 'static,
    {
        self.entries.insert(
            name.to_string(),
            Registered {
                constructor: Rc::new(constructor),
                builtin: Some(description.to_string()),
            },
        );
    }

    pub fn get(&self, entry: &str) -> Option<Constructor> {
        self.entries.get(entry).map(|r| Rc::clone(&r.constructor))
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries.contains_key(entry)
    }

    fn builtins(&self) -> impl Iterator<Item = (&str, &str, &Constructor)> {
        self.entries.iter().filter_map(|(name, r)| {
            r.builtin
                .as_deref()
                .map(|description| (name.as_str(), description, &r.constructor))
        })
    }
}

#[derive(Debug, Deserialize)]
struct Manifest {
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    description: String,
    entry: String,
}

impl Manifest {
    fn read(path: &Path) -> Result<Self, PluginError> {
        let invalid = |message: String| PluginError::InvalidManifest {
            path: path.to_path_buf(),
            message,
        };
        let content = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let manifest: Manifest = toml::from_str(&content).map_err(|e| invalid(e.to_string()))?;
        if manifest.name.trim().is_empty() {
            return Err(invalid("name is empty".into()));
        }
        Ok(manifest)
    }
}

/// Scans directories for `*.plugin` manifests.
pub struct ManifestLoader {
    dirs: Vec<PathBuf>,
    registry: PluginRegistry,
    enabled: HashSet<String>,
}

impl ManifestLoader {
    pub fn new(dirs: Vec<PathBuf>, registry: PluginRegistry) -> Self {
        Self {
            dirs,
            registry,
            enabled: HashSet::new(),
        }
    }

    /// Loader for `<data_dir>/plugins` plus `plugins.paths`, honouring
    /// `plugins.enabled`.
    pub fn configured(data_dir: &Path, store: &SettingsStore, registry: PluginRegistry) -> Self {
        let mut dirs = vec![data_dir.join("plugins")];
        dirs.extend(store.plugin_paths());
        Self::new(dirs, registry).with_enabled(store.enabled_plugins())
    }

    pub fn with_enabled(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.enabled = names.into_iter().collect();
        self
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    fn manifests_in(dir: &Path) -> Vec<PathBuf> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(dir = %dir.display(), "plugin directory missing, skipped");
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "cannot read plugin directory");
                return Vec::new();
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "plugin"))
            .collect();
        paths.sort();
        paths
    }

    fn descriptor(
        &self,
        name: String,
        version: String,
        description: String,
        ctor: Constructor,
    ) -> PluginDescriptor {
        PluginDescriptor {
            enabled: self.enabled.contains(&name),
            name,
            version,
            description,
            factory: Box::new(move || ctor()),
        }
    }
}

impl PluginLoader for ManifestLoader {
    fn discover(&self) -> Vec<PluginDescriptor> {
        let mut found = Vec::new();
        let mut seen = HashSet::new();

        for dir in &self.dirs {
            for path in Self::manifests_in(dir) {
                let manifest = match Manifest::read(&path) {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping plugin manifest");
                        continue;
                    }
                };
                if seen.contains(&manifest.name) {
                    tracing::debug!(
                        plugin = %manifest.name,
                        path = %path.display(),
                        "duplicate plugin name, keeping the first"
                    );
                    continue;
                }
                let Some(ctor) = self.registry.get(&manifest.entry) else {
                    let e = PluginError::UnknownEntry(manifest.entry);
                    tracing::warn!(plugin = %manifest.name, error = %e, "skipping plugin manifest");
                    continue;
                };
                seen.insert(manifest.name.clone());
                found.push(self.descriptor(
                    manifest.name,
                    manifest.version,
                    manifest.description,
                    ctor,
                ));
            }
        }

        let mut builtins: Vec<_> = self.registry.builtins().collect();
        builtins.sort_by_key(|(name, _, _)| *name);
        for (name, description, ctor) in builtins {
            if seen.insert(name.to_string()) {
                found.push(self.descriptor(
                    name.to_string(),
                    env!("CARGO_PKG_VERSION").to_string(),
                    description.to_string(),
                    Rc::clone(ctor),
                ));
            }
        }

        tracing::debug!(count = found.len(), "plugins discovered");
        found
    }
}

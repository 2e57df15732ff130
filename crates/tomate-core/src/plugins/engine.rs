use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::error::PluginError;
use crate::events::{EventBus, SubscriptionId};
use crate::storage::SettingsStore;

use super::boundary::{self, guarded};
use super::loader::{PluginDescriptor, PluginLoader};
use super::plugin::{Plugin, PluginInfo, Subscriptions};

type Slot = Rc<RefCell<Box<dyn Plugin>>>;

/// A bus registration owned by an active plugin.
#[derive(Debug, Clone, Copy)]
enum Attached {
    Timer(SubscriptionId),
    Session(SubscriptionId),
    Settings(SubscriptionId),
    View(SubscriptionId),
}

struct Entry {
    version: String,
    description: String,
    enabled: bool,
    plugin: Slot,
    attached: Vec<Attached>,
}

impl Entry {
    fn info(&self, name: &str) -> PluginInfo {
        PluginInfo {
            name: name.to_string(),
            version: self.version.clone(),
            description: self.description.clone(),
            enabled: self.enabled,
        }
    }
}

/// Registry of plugins and their bus wiring.
///
/// ```ignore
/// let mut engine = PluginEngine::new(bus, Box::new(loader), debug_from_env());
/// engine.collect();
/// engine.activate("journal");
/// ```
pub struct PluginEngine {
    bus: Rc<EventBus>,
    loader: Box<dyn PluginLoader>,
    store: Option<Rc<SettingsStore>>,
    debug: bool,
    plugins: BTreeMap<String, Entry>,
}

impl PluginEngine {
    /// With `debug` set, plugin faults propagate as panics instead of being
    /// logged and swallowed.
    pub fn new(bus: Rc<EventBus>, loader: Box<dyn PluginLoader>, debug: bool) -> Self {
        Self {
            bus,
            loader,
            store: None,
            debug,
            plugins: BTreeMap::new(),
        }
    }

    /// Same as [`new`](Self::new) with the debug flag read from `TOMATE_DEBUG`.
    pub fn from_env(bus: Rc<EventBus>, loader: Box<dyn PluginLoader>) -> Self {
        Self::new(bus, loader, boundary::debug_from_env())
    }

    /// Persist enable/disable changes to `plugins.enabled` in `store`.
    pub fn with_store(mut self, store: Rc<SettingsStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Scan the loader and register plugins not seen before.
    ///
    /// Known plugins keep their enabled flag. A new plugin whose descriptor
    /// says `enabled` is activated right away. Returns how many were added.
    pub fn collect(&mut self) -> usize {
        let mut added = 0;
        for descriptor in self.loader.discover() {
            if self.plugins.contains_key(&descriptor.name) {
                continue;
            }
            let PluginDescriptor {
                name,
                version,
                description,
                enabled,
                factory,
            } = descriptor;

            let Some(plugin) = guarded(&name, "construct", self.debug, factory) else {
                continue;
            };
            self.plugins.insert(
                name.clone(),
                Entry {
                    version,
                    description,
                    enabled: false,
                    plugin: Rc::new(RefCell::new(plugin)),
                    attached: Vec::new(),
                },
            );
            added += 1;

            if enabled {
                self.enable(&name);
            }
        }
        tracing::info!(added, total = self.plugins.len(), "plugins collected");
        added
    }

    /// Activate `name` and attach its subscriptions.
    ///
    /// Returns `false` for an unknown or already enabled plugin, or when the
    /// plugin's activation hook faults.
    pub fn activate(&mut self, name: &str) -> bool {
        let activated = self.enable(name);
        if activated {
            self.persist(name, true);
        }
        activated
    }

    /// Detach `name`'s subscriptions, then run its deactivation hook.
    ///
    /// Returns `false` for an unknown or already disabled plugin. A faulting
    /// hook also returns `false`, but the plugin is disabled regardless.
    pub fn deactivate(&mut self, name: &str) -> bool {
        let Some(entry) = self.plugins.get_mut(name) else {
            tracing::debug!(plugin = name, "deactivate: unknown plugin");
            return false;
        };
        if !entry.enabled {
            return false;
        }

        detach(&self.bus, &mut entry.attached);
        entry.enabled = false;
        let slot = Rc::clone(&entry.plugin);
        let clean =
            guarded(name, "deactivate", self.debug, || borrow(&slot)?.deactivate()).is_some();

        tracing::info!(plugin = name, "plugin deactivated");
        self.persist(name, false);
        clean
    }

    /// All plugins, ordered by name.
    pub fn list(&self) -> Vec<PluginInfo> {
        self.plugins
            .iter()
            .map(|(name, entry)| entry.info(name))
            .collect()
    }

    pub fn lookup(&self, name: &str) -> Option<PluginInfo> {
        self.plugins.get(name).map(|entry| entry.info(name))
    }

    fn enable(&mut self, name: &str) -> bool {
        let debug = self.debug;
        let Some(entry) = self.plugins.get_mut(name) else {
            tracing::debug!(plugin = name, "activate: unknown plugin");
            return false;
        };
        if entry.enabled {
            return false;
        }

        let slot = Rc::clone(&entry.plugin);
        if guarded(name, "activate", debug, || borrow(&slot)?.activate()).is_none() {
            return false;
        }
        let subscriptions = guarded(name, "subscriptions", debug, || {
            Ok(slot.try_borrow().map_err(|_| PluginError::Busy)?.subscriptions())
        })
        .unwrap_or_default();

        entry.attached = attach(&self.bus, name, &slot, subscriptions, debug);
        entry.enabled = true;
        tracing::info!(plugin = name, handlers = entry.attached.len(), "plugin activated");
        true
    }

    fn persist(&self, name: &str, enabled: bool) {
        if let Some(store) = &self.store {
            if let Err(e) = store.set_plugin_enabled(name, enabled) {
                tracing::warn!(plugin = name, error = %e, "failed to persist plugin state");
            }
        }
    }
}

impl Drop for PluginEngine {
    fn drop(&mut self) {
        for entry in self.plugins.values_mut() {
            detach(&self.bus, &mut entry.attached);
        }
    }
}

/// Mutable access to a plugin, or `Busy` if a call into it is in progress.
fn borrow(slot: &Slot) -> Result<std::cell::RefMut<'_, Box<dyn Plugin>>, PluginError> {
    slot.try_borrow_mut().map_err(|_| PluginError::Busy)
}

fn attach(
    bus: &EventBus,
    name: &str,
    slot: &Slot,
    subscriptions: Subscriptions,
    debug: bool,
) -> Vec<Attached> {
    let mut attached = Vec::new();

    if !subscriptions.timer.is_empty() {
        let (slot, name) = (Rc::clone(slot), name.to_string());
        let id = bus.timer.subscribe(&subscriptions.timer, move |event, payload| {
            guarded(&name, "on_timer", debug, || borrow(&slot)?.on_timer(event, payload)).is_some()
        });
        attached.push(Attached::Timer(id));
    }
    if !subscriptions.session.is_empty() {
        let (slot, name) = (Rc::clone(slot), name.to_string());
        let id = bus.session.subscribe(&subscriptions.session, move |event, payload| {
            guarded(&name, "on_session", debug, || borrow(&slot)?.on_session(event, payload))
                .is_some()
        });
        attached.push(Attached::Session(id));
    }
    if !subscriptions.settings.is_empty() {
        let (slot, name) = (Rc::clone(slot), name.to_string());
        let id = bus.settings.subscribe(&subscriptions.settings, move |event, payload| {
            guarded(&name, "on_settings", debug, || borrow(&slot)?.on_settings(event, payload))
                .is_some()
        });
        attached.push(Attached::Settings(id));
    }
    if !subscriptions.view.is_empty() {
        let (slot, name) = (Rc::clone(slot), name.to_string());
        let id = bus.view.subscribe(&subscriptions.view, move |event, _| {
            guarded(&name, "on_view", debug, || borrow(&slot)?.on_view(event)).is_some()
        });
        attached.push(Attached::View(id));
    }

    attached
}

fn detach(bus: &EventBus, attached: &mut Vec<Attached>) {
    for handle in attached.drain(..) {
        match handle {
            Attached::Timer(id) => bus.timer.unsubscribe(id),
            Attached::Session(id) => bus.session.unsubscribe(id),
            Attached::Settings(id) => bus.settings.unsubscribe(id),
            Attached::View(id) => bus.view.unsubscribe(id),
        };
    }
}

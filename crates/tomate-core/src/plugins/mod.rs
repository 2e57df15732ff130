//! Plugin lifecycle: discovery, enable/disable, and fault isolation.
//!
//! Plugins are observers on the [`EventBus`](crate::events::EventBus). The
//! [`PluginEngine`] attaches and detaches their subscriptions and runs every
//! call into plugin code inside a fault boundary, so a misbehaving plugin is
//! logged and skipped instead of taking the timer down with it.

mod boundary;
mod engine;
pub mod journal;
mod loader;
mod plugin;

pub use boundary::debug_from_env;
pub use engine::PluginEngine;
pub use journal::JournalPlugin;
pub use loader::{
    Constructor, ManifestLoader, PluginDescriptor, PluginFactory, PluginLoader, PluginRegistry,
};
pub use plugin::{Plugin, PluginInfo, Subscriptions};

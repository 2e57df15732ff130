//! # Tomate Core Library
//!
//! This library provides the state-machine engine behind the tomate pomodoro
//! timer. Frontends (the `tomate` CLI, or any other host) own the event loop
//! and drive the engine through a [`Scheduler`]; everything else happens by
//! publishing on a shared [`EventBus`].
//!
//! ## Architecture
//!
//! - **Transitions**: guarded state changes that commit only from an allowed
//!   source state and publish after they commit
//! - **Timer**: a one-second countdown driven by scheduler ticks
//! - **Session**: the pomodoro / short break / long break cycle on top of the timer
//! - **Storage**: TOML-based configuration and a live settings store
//! - **Plugins**: observers attached to the bus behind a fault boundary
//!
//! ## Key Components
//!
//! - [`Timer`]: countdown state machine
//! - [`Session`]: cycle state machine
//! - [`EventBus`]: synchronous publish/subscribe
//! - [`SettingsStore`]: configuration with change notifications
//! - [`PluginEngine`]: plugin discovery and lifecycle

pub mod clock;
pub mod error;
pub mod events;
pub mod plugins;
pub mod session;
pub mod settings;
pub mod storage;
pub mod timer;
pub mod transition;

pub use clock::{ManualScheduler, Scheduler, TokioScheduler};
pub use error::{ConfigError, CoreError, PluginError};
pub use events::{
    EventBus, SessionEvent, SessionPayload, SettingsEvent, SettingsPayload, SubscriptionId,
    TimerEvent, TimerPayload, ViewEvent,
};
pub use plugins::{Plugin, PluginEngine, PluginInfo, PluginLoader, Subscriptions};
pub use session::{Session, SessionState, SessionType};
pub use settings::Settings;
pub use storage::{Config, SettingsStore};
pub use timer::{Timer, TimerState};

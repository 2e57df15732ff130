use serde::Serialize;

use crate::error::PluginError;
use crate::events::{
    SessionEvent, SessionPayload, SettingsEvent, SettingsPayload, TimerEvent, TimerPayload,
    ViewEvent,
};

/// Every plugin implements this trait.
///
/// All hooks default to no-ops. A hook may fail by returning an error or by
/// panicking; either way the engine logs the fault and carries on.
pub trait Plugin {
    /// Bus events this plugin wants, read once per activation.
    fn subscriptions(&self) -> Subscriptions {
        Subscriptions::default()
    }

    /// Called before the plugin's subscriptions are attached.
    fn activate(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    /// Called after the plugin's subscriptions are detached.
    fn deactivate(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    fn on_timer(&mut self, _event: TimerEvent, _payload: &TimerPayload) -> Result<(), PluginError> {
        Ok(())
    }

    fn on_session(
        &mut self,
        _event: SessionEvent,
        _payload: &SessionPayload,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    fn on_settings(
        &mut self,
        _event: SettingsEvent,
        _payload: &SettingsPayload,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    fn on_view(&mut self, _event: ViewEvent) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Event tags a plugin listens to, per channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscriptions {
    pub timer: Vec<TimerEvent>,
    pub session: Vec<SessionEvent>,
    pub settings: Vec<SettingsEvent>,
    pub view: Vec<ViewEvent>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timer(mut self, events: &[TimerEvent]) -> Self {
        self.timer.extend_from_slice(events);
        self
    }

    pub fn session(mut self, events: &[SessionEvent]) -> Self {
        self.session.extend_from_slice(events);
        self
    }

    pub fn settings(mut self, events: &[SettingsEvent]) -> Self {
        self.settings.extend_from_slice(events);
        self
    }

    pub fn view(mut self, events: &[ViewEvent]) -> Self {
        self.view.extend_from_slice(events);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.timer.is_empty()
            && self.session.is_empty()
            && self.settings.is_empty()
            && self.view.is_empty()
    }
}

/// What the engine knows about a registered plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub enabled: bool,
}

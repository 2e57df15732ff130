//! Event tags and payloads published on the [`EventBus`].
//!
//! Every state change in the timer and session produces an event on its
//! domain channel. Payloads are immutable snapshots taken after the
//! transition committed.

mod bus;

pub use bus::{Channel, EventBus, Handler, SubscriptionId};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::SessionType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerEvent {
    Start,
    Stop,
    Update,
    End,
}

impl TimerEvent {
    pub const ALL: [TimerEvent; 4] = [
        TimerEvent::Start,
        TimerEvent::Stop,
        TimerEvent::Update,
        TimerEvent::End,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    Start,
    Interrupt,
    Reset,
    End,
    Change,
}

impl SessionEvent {
    pub const ALL: [SessionEvent; 5] = [
        SessionEvent::Start,
        SessionEvent::Interrupt,
        SessionEvent::Reset,
        SessionEvent::End,
        SessionEvent::Change,
    ];
}

/// Settings change notifications. The tag is the kind of change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingsEvent {
    Set,
    Remove,
}

/// Window visibility, published by hosts that have one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewEvent {
    Show,
    Hide,
}

/// Countdown snapshot published with every timer event. Values are seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimerPayload {
    pub time_left: u64,
    pub duration: u64,
}

impl TimerPayload {
    pub fn new(time_left: u64, duration: u64) -> Self {
        Self { time_left, duration }
    }

    /// Share of the countdown still to run, 0.0 when `duration` is zero.
    pub fn remaining_ratio(&self) -> f64 {
        if self.duration == 0 {
            return 0.0;
        }
        self.time_left as f64 / self.duration as f64
    }

    /// Share of the countdown already elapsed, rounded to one decimal.
    pub fn elapsed_ratio(&self) -> f64 {
        ((1.0 - self.remaining_ratio()) * 10.0).round() / 10.0
    }

    /// Elapsed percentage floored to a multiple of 5.
    ///
    /// Computed in integers so that 95 of 100 seconds left reads as 5%.
    /// A zero duration counts as fully elapsed, like [`Self::elapsed_ratio`].
    pub fn elapsed_percent(&self) -> u64 {
        if self.duration == 0 {
            return 100;
        }
        let elapsed = self.duration.saturating_sub(self.time_left);
        let percent = elapsed * 100 / self.duration;
        percent - percent % 5
    }
}

/// Session snapshot published with every session event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPayload {
    /// Identity of the last completed pomodoro (nil until one completes).
    pub id: Uuid,
    #[serde(rename = "type")]
    pub session_type: SessionType,
    pub pomodoros: u32,
    /// Seconds.
    pub duration: u64,
}

/// A settings change as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsPayload {
    pub action: SettingsEvent,
    pub section: String,
    pub option: String,
    /// New value, rendered as a string. For `Remove` this is the default the
    /// key fell back to, if any.
    pub value: Option<String>,
}

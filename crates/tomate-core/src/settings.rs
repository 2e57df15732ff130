//! Settings consumed by the session.
//!
//! The session only needs integer lookups; change notifications arrive on the
//! settings channel of the [`EventBus`](crate::events::EventBus).

use crate::error::ConfigError;

/// Section holding timer durations and the long break interval.
pub const TIMER_SECTION: &str = "timer";

/// Option holding the number of pomodoros between long breaks.
pub const LONG_BREAK_INTERVAL: &str = "long_break_interval";

pub trait Settings {
    /// Integer value of `section.key`.
    fn get_int(&self, section: &str, key: &str) -> Result<i64, ConfigError>;
}

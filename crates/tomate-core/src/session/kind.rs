use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of session in the pomodoro cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Pomodoro,
    ShortBreak,
    LongBreak,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown session type '{0}' (expected pomodoro, shortbreak or longbreak)")]
pub struct UnknownSessionType(pub String);

impl SessionType {
    pub const ALL: [SessionType; 3] = [
        SessionType::Pomodoro,
        SessionType::ShortBreak,
        SessionType::LongBreak,
    ];

    pub fn index(self) -> usize {
        match self {
            SessionType::Pomodoro => 0,
            SessionType::ShortBreak => 1,
            SessionType::LongBreak => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Name used in setting keys.
    pub fn key(self) -> &'static str {
        match self {
            SessionType::Pomodoro => "pomodoro",
            SessionType::ShortBreak => "shortbreak",
            SessionType::LongBreak => "longbreak",
        }
    }

    /// Setting option holding this type's duration in minutes, in section `timer`.
    pub fn duration_option(self) -> &'static str {
        match self {
            SessionType::Pomodoro => "pomodoro_duration",
            SessionType::ShortBreak => "shortbreak_duration",
            SessionType::LongBreak => "longbreak_duration",
        }
    }

    pub fn from_duration_option(option: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.duration_option() == option)
    }

    pub fn is_break(self) -> bool {
        self != SessionType::Pomodoro
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionType::Pomodoro => "Pomodoro",
            SessionType::ShortBreak => "Short Break",
            SessionType::LongBreak => "Long Break",
        };
        f.write_str(label)
    }
}

impl FromStr for SessionType {
    type Err = UnknownSessionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['_', '-', ' '], "").as_str() {
            "pomodoro" => Ok(SessionType::Pomodoro),
            "shortbreak" => Ok(SessionType::ShortBreak),
            "longbreak" => Ok(SessionType::LongBreak),
            _ => Err(UnknownSessionType(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_order_is_stable() {
        for (i, t) in SessionType::ALL.into_iter().enumerate() {
            assert_eq!(t.index(), i);
            assert_eq!(SessionType::from_index(i), Some(t));
        }
        assert_eq!(SessionType::from_index(3), None);
    }

    #[test]
    fn duration_options_map_both_ways() {
        assert_eq!(SessionType::ShortBreak.duration_option(), "shortbreak_duration");
        assert_eq!(
            SessionType::from_duration_option("longbreak_duration"),
            Some(SessionType::LongBreak)
        );
        assert_eq!(SessionType::from_duration_option("long_break_interval"), None);
    }

    #[test]
    fn parses_loose_spellings() {
        assert_eq!("pomodoro".parse(), Ok(SessionType::Pomodoro));
        assert_eq!("short_break".parse(), Ok(SessionType::ShortBreak));
        assert_eq!("LongBreak".parse(), Ok(SessionType::LongBreak));
        assert!("lunch".parse::<SessionType>().is_err());
    }
}

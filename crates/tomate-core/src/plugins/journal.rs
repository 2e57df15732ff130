//! Built-in plugin that records finished sessions.
//!
//! Each `SessionEvent::End` appends one JSON object per line:
//!
//! ```json
//! {"id":"…","type":"pomodoro","pomodoros":4,"duration":1500,"finished_at":"2024-05-01T09:25:00Z"}
//! ```

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::PluginError;
use crate::events::{SessionEvent, SessionPayload};

use super::loader::PluginRegistry;
use super::plugin::{Plugin, Subscriptions};

/// Entry and plugin name.
pub const NAME: &str = "journal";

#[derive(Serialize)]
struct Line<'a> {
    #[serde(flatten)]
    session: &'a SessionPayload,
    finished_at: DateTime<Utc>,
}

pub struct JournalPlugin {
    path: PathBuf,
}

impl JournalPlugin {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, session: &SessionPayload) -> Result<(), PluginError> {
        let line = serde_json::to_string(&Line {
            session,
            finished_at: Utc::now(),
        })
        .map_err(|e| PluginError::failed(e.to_string()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| PluginError::failed(format!("{}: {e}", self.path.display())))?;
        writeln!(file, "{line}").map_err(|e| PluginError::failed(e.to_string()))
    }
}

impl Plugin for JournalPlugin {
    fn subscriptions(&self) -> Subscriptions {
        Subscriptions::new().session(&[SessionEvent::End])
    }

    fn activate(&mut self) -> Result<(), PluginError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PluginError::failed(e.to_string()))?;
        }
        tracing::debug!(path = %self.path.display(), "journal ready");
        Ok(())
    }

    fn on_session(
        &mut self,
        event: SessionEvent,
        payload: &SessionPayload,
    ) -> Result<(), PluginError> {
        if event == SessionEvent::End {
            self.append(payload)?;
        }
        Ok(())
    }
}

/// Register the journal as a built-in writing to `path`.
pub fn register(registry: &mut PluginRegistry, path: PathBuf) {
    registry.builtin(NAME, "Append finished sessions to a JSON lines file", move || {
        Ok(Box::new(JournalPlugin::new(path.clone())))
    });
}

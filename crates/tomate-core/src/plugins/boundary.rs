//! Fault boundary around calls into plugin code.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::error::PluginError;

/// True when `TOMATE_DEBUG` is set to anything but empty or `0`.
pub fn debug_from_env() -> bool {
    std::env::var_os("TOMATE_DEBUG").is_some_and(|v| !v.is_empty() && v != "0")
}

/// Run `call` for plugin `plugin` at `stage`.
///
/// An `Err` or a panic is logged and turned into `None`. With `debug` set the
/// fault reaches the caller instead: panics resume unwinding and errors
/// become a panic.
pub(crate) fn guarded<R>(
    plugin: &str,
    stage: &'static str,
    debug: bool,
    call: impl FnOnce() -> Result<R, PluginError>,
) -> Option<R> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(err)) => {
            tracing::error!(plugin, stage, error = %err, "plugin fault");
            if debug {
                panic!("plugin '{plugin}' failed in {stage}: {err}");
            }
            None
        }
        Err(payload) => {
            let err = PluginError::Panicked(panic_message(payload.as_ref()));
            tracing::error!(plugin, stage, error = %err, "plugin fault");
            if debug {
                panic::resume_unwind(payload);
            }
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

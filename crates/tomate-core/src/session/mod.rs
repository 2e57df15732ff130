mod engine;
mod kind;

pub use engine::{Session, SessionState};
pub use kind::{SessionType, UnknownSessionType};

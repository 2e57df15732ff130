mod engine;

pub use engine::{Timer, TimerState};

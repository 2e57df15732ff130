//! Countdown timer.
//!
//! The timer counts down whole seconds. It does not use internal threads:
//! every run hands a tick callback to the injected [`Scheduler`], which calls
//! it once per second for as long as it asks to be rescheduled.
//!
//! ## State Transitions
//!
//! ```text
//! Stopped -> Started -> Ended -> Started -> ...
//!            Started -> Stopped
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let timer = Timer::new(bus, scheduler);
//! timer.start(25 * 60);
//! // The scheduler drives `tick()` once per second until the countdown ends.
//! ```

use std::cell::Cell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::Scheduler;
use crate::events::{EventBus, TimerEvent, TimerPayload};
use crate::transition::{Machine, Source, StateCell, Target, Transition};

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerState {
    Stopped,
    Started,
    Ended,
}

const START: Transition<Timer> = Transition {
    name: "timer.start",
    source: Source::States(&[TimerState::Stopped, TimerState::Ended]),
    target: Target::To(TimerState::Started),
    precondition: None,
    exit: Some(Timer::publish_start),
};

const STOP: Transition<Timer> = Transition {
    name: "timer.stop",
    source: Source::States(&[TimerState::Started]),
    target: Target::To(TimerState::Stopped),
    precondition: None,
    exit: Some(Timer::publish_stop),
};

const UPDATE: Transition<Timer> = Transition {
    name: "timer.update",
    source: Source::States(&[TimerState::Started]),
    target: Target::Unchanged,
    precondition: Some(Timer::has_time_left),
    exit: Some(Timer::publish_update),
};

const END: Transition<Timer> = Transition {
    name: "timer.end",
    source: Source::States(&[TimerState::Started]),
    target: Target::To(TimerState::Ended),
    precondition: Some(Timer::is_exhausted),
    exit: Some(Timer::publish_end),
};

/// One-second resolution countdown.
///
/// Created once by the entry point and shared as `Rc<Timer>`.
pub struct Timer {
    state: StateCell<TimerState>,
    time_left: Cell<u64>,
    duration: Cell<u64>,
    /// Bumped on every start; a tick callback from an earlier run retires
    /// itself when it sees a newer value.
    generation: Cell<u64>,
    bus: Rc<EventBus>,
    scheduler: Rc<dyn Scheduler>,
    me: Weak<Timer>,
}

impl Machine for Timer {
    type State = TimerState;

    fn state_cell(&self) -> &StateCell<TimerState> {
        &self.state
    }
}

impl Timer {
    pub fn new(bus: Rc<EventBus>, scheduler: Rc<dyn Scheduler>) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            state: StateCell::new(TimerState::Stopped),
            time_left: Cell::new(0),
            duration: Cell::new(0),
            generation: Cell::new(0),
            bus,
            scheduler,
            me: me.clone(),
        })
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> TimerState {
        Machine::state(self)
    }

    pub fn is_running(&self) -> bool {
        self.state() == TimerState::Started
    }

    pub fn time_left(&self) -> u64 {
        self.time_left.get()
    }

    pub fn duration(&self) -> u64 {
        self.duration.get()
    }

    pub fn payload(&self) -> TimerPayload {
        TimerPayload::new(self.time_left.get(), self.duration.get())
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start counting down `seconds`. Returns `false` if already running.
    pub fn start(&self, seconds: u64) -> bool {
        START.fire(self, |t| t.arm(seconds)).unwrap_or(false)
    }

    /// Stop the countdown. Returns `false` if it was not running.
    pub fn stop(&self) -> bool {
        STOP.fire(self, |t| {
            t.time_left.set(0);
            t.duration.set(0);
            true
        })
        .unwrap_or(false)
    }

    /// Advance the countdown by one second.
    ///
    /// Called by the scheduler; the return value asks to be rescheduled. Safe
    /// to call in any state: outside `Started` it does nothing.
    pub fn tick(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        match UPDATE.fire(self, |t| {
            t.time_left.set(t.time_left.get() - 1);
            true
        }) {
            Ok(_) => true,
            Err(_) => {
                self.end();
                false
            }
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn end(&self) -> bool {
        END.fire(self, |_| true).unwrap_or(false)
    }

    fn arm(&self, seconds: u64) -> bool {
        self.duration.set(seconds);
        self.time_left.set(seconds);

        let generation = self.generation.get() + 1;
        self.generation.set(generation);

        let me = self.me.clone();
        self.scheduler.schedule(
            TICK,
            Box::new(move || match me.upgrade() {
                Some(timer) if timer.generation.get() == generation => timer.tick(),
                _ => false,
            }),
        );
        tracing::debug!(seconds, generation, "timer armed");
        true
    }

    fn has_time_left(&self) -> bool {
        self.time_left.get() > 0
    }

    fn is_exhausted(&self) -> bool {
        self.time_left.get() == 0
    }

    fn publish(&self, event: TimerEvent) {
        self.bus.timer.publish(event, &self.payload());
    }

    fn publish_start(&self, _: &bool) {
        self.publish(TimerEvent::Start);
    }

    fn publish_stop(&self, _: &bool) {
        self.publish(TimerEvent::Stop);
    }

    fn publish_update(&self, _: &bool) {
        self.publish(TimerEvent::Update);
    }

    fn publish_end(&self, _: &bool) {
        self.publish(TimerEvent::End);
    }
}

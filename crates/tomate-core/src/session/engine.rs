//! Pomodoro session cycle.
//!
//! The session drives the [`Timer`] through work and break periods:
//!
//! ```text
//! Pomodoro -> ShortBreak -> Pomodoro -> ... -> LongBreak -> Pomodoro
//! ```
//!
//! A long break follows every `long_break_interval`-th completed pomodoro.
//! Its own state machine mirrors the timer's one level up:
//! `Stopped -> Started -> Ended -> Started/Stopped`.

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SessionType;
use crate::error::{ConfigError, CoreError, Result};
use crate::events::{
    EventBus, SessionEvent, SessionPayload, SettingsEvent, SettingsPayload, SubscriptionId,
    TimerEvent, TimerPayload,
};
use crate::settings::{Settings, LONG_BREAK_INTERVAL, TIMER_SECTION};
use crate::timer::Timer;
use crate::transition::{Machine, Source, StateCell, Target, Transition, TransitionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Stopped,
    Started,
    Ended,
}

const IDLE: &[SessionState] = &[SessionState::Stopped, SessionState::Ended];

const START: Transition<Session> = Transition {
    name: "session.start",
    source: Source::States(IDLE),
    target: Target::To(SessionState::Started),
    precondition: None,
    exit: Some(Session::publish_start),
};

const STOP: Transition<Session> = Transition {
    name: "session.stop",
    source: Source::States(&[SessionState::Started]),
    target: Target::To(SessionState::Stopped),
    precondition: Some(Session::timer_running),
    exit: Some(Session::publish_interrupt),
};

const RESET: Transition<Session> = Transition {
    name: "session.reset",
    source: Source::States(IDLE),
    target: Target::Unchanged,
    precondition: None,
    exit: Some(Session::publish_reset),
};

/// Outcome of ending a session: what finished and what comes next.
struct Advance {
    finished: SessionPayload,
    next: SessionType,
    next_duration: u64,
}

const END: Transition<Session, Advance> = Transition {
    name: "session.end",
    source: Source::States(&[SessionState::Started]),
    target: Target::To(SessionState::Ended),
    precondition: Some(Session::timer_finished),
    exit: Some(Session::publish_end),
};

/// Drops a started session whose end could not be worked out, so the
/// session is idle again instead of waiting on a timer that already ended.
const ABORT: Transition<Session> = Transition {
    name: "session.abort",
    source: Source::States(&[SessionState::Started]),
    target: Target::To(SessionState::Stopped),
    precondition: Some(Session::timer_finished),
    exit: Some(Session::publish_interrupt),
};

const CHANGE: Transition<Session> = Transition {
    name: "session.change",
    source: Source::States(IDLE),
    target: Target::Unchanged,
    precondition: None,
    exit: Some(Session::publish_change),
};

const REFRESH: Transition<Session> = Transition {
    name: "session.refresh",
    source: Source::States(IDLE),
    target: Target::Unchanged,
    precondition: None,
    exit: Some(Session::publish_change),
};

/// The pomodoro cycle over one [`Timer`].
///
/// Created once by the entry point and shared as `Rc<Session>`. It listens
/// for `TimerEvent::End` to close the running session and for settings
/// changes to keep the idle duration current.
pub struct Session {
    state: StateCell<SessionState>,
    current: Cell<SessionType>,
    pomodoros: Cell<u32>,
    /// Seconds for `current`, as of the last lookup.
    duration: Cell<u64>,
    id: Cell<Uuid>,
    timer: Rc<Timer>,
    bus: Rc<EventBus>,
    settings: Rc<dyn Settings>,
    timer_subscription: SubscriptionId,
    settings_subscription: SubscriptionId,
}

impl Machine for Session {
    type State = SessionState;

    fn state_cell(&self) -> &StateCell<SessionState> {
        &self.state
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("current", &self.current.get())
            .field("pomodoros", &self.pomodoros.get())
            .field("duration", &self.duration.get())
            .finish()
    }
}

impl Session {
    /// Build the session and wire it to the timer and settings channels.
    ///
    /// # Errors
    ///
    /// Returns an error if the pomodoro duration cannot be read from settings.
    pub fn new(
        timer: Rc<Timer>,
        bus: Rc<EventBus>,
        settings: Rc<dyn Settings>,
    ) -> Result<Rc<Self>> {
        let duration = lookup_duration(settings.as_ref(), SessionType::Pomodoro)?;

        Ok(Rc::new_cyclic(|me: &Weak<Self>| {
            let weak = me.clone();
            let timer_subscription = bus.timer.subscribe(&[TimerEvent::End], move |_, payload| {
                weak.upgrade().is_some_and(|session| session.end(payload))
            });

            let weak = me.clone();
            let settings_subscription = bus.settings.subscribe(
                &[SettingsEvent::Set, SettingsEvent::Remove],
                move |_, change| {
                    weak.upgrade()
                        .is_some_and(|session| session.on_settings_change(change))
                },
            );

            Self {
                state: StateCell::new(SessionState::Stopped),
                current: Cell::new(SessionType::Pomodoro),
                pomodoros: Cell::new(0),
                duration: Cell::new(duration),
                id: Cell::new(Uuid::nil()),
                timer,
                bus,
                settings,
                timer_subscription,
                settings_subscription,
            }
        }))
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        Machine::state(self)
    }

    pub fn current(&self) -> SessionType {
        self.current.get()
    }

    pub fn pomodoros(&self) -> u32 {
        self.pomodoros.get()
    }

    /// Seconds the current session type runs for.
    pub fn duration(&self) -> u64 {
        self.duration.get()
    }

    pub fn timer(&self) -> &Rc<Timer> {
        &self.timer
    }

    pub fn payload(&self) -> SessionPayload {
        SessionPayload {
            id: self.id.get(),
            session_type: self.current.get(),
            pomodoros: self.pomodoros.get(),
            duration: self.duration.get(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start the current session type. Returns `Ok(false)` if a session is
    /// already running.
    ///
    /// # Errors
    ///
    /// Returns an error if the duration cannot be read from settings; the
    /// session is left untouched.
    pub fn start(&self) -> Result<bool> {
        flag(START.try_fire(self, |s| {
            let duration = lookup_duration(s.settings.as_ref(), s.current.get())?;
            s.duration.set(duration);
            Ok(s.timer.start(duration))
        }))
    }

    /// Interrupt the running session. Returns `false` if nothing is running.
    pub fn stop(&self) -> bool {
        STOP.fire(self, |s| s.timer.stop()).unwrap_or(false)
    }

    /// Zero the pomodoro count. Only allowed while idle.
    pub fn reset(&self) -> bool {
        RESET
            .fire(self, |s| {
                s.pomodoros.set(0);
                true
            })
            .unwrap_or(false)
    }

    /// Switch to another session type. Only allowed while idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the new type's duration cannot be read from
    /// settings; the session is left untouched.
    pub fn change(&self, session_type: SessionType) -> Result<bool> {
        flag(CHANGE.try_fire(self, |s| {
            let duration = lookup_duration(s.settings.as_ref(), session_type)?;
            s.current.set(session_type);
            s.duration.set(duration);
            Ok(true)
        }))
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Close the running session once the timer reached zero and pick the
    /// next session type.
    fn end(&self, timer: &TimerPayload) -> bool {
        let completed = timer.duration;
        match END.try_fire(self, |s| s.advance(completed)) {
            Ok(_) => true,
            Err(TransitionError::Rejected(_)) => false,
            Err(TransitionError::Failed(e)) => {
                tracing::error!(error = %e, "failed to end session; interrupting it");
                ABORT.fire(self, |_| true).unwrap_or(false);
                false
            }
        }
    }

    /// Count the finished session and work out what comes next. `current`
    /// moves on in the exit action, after `SessionEvent::End` went out.
    fn advance(&self, completed: u64) -> Result<Advance> {
        let previous = self.current.get();
        let (pomodoros, id, next) = if previous == SessionType::Pomodoro {
            let pomodoros = self.pomodoros.get() + 1;
            let interval = self.long_break_interval()?;
            let next = if pomodoros % interval == 0 {
                SessionType::LongBreak
            } else {
                SessionType::ShortBreak
            };
            (pomodoros, Uuid::new_v4(), next)
        } else {
            (self.pomodoros.get(), self.id.get(), SessionType::Pomodoro)
        };
        let next_duration = lookup_duration(self.settings.as_ref(), next)?;

        self.pomodoros.set(pomodoros);
        self.id.set(id);

        Ok(Advance {
            finished: SessionPayload {
                id,
                session_type: previous,
                pomodoros,
                duration: completed,
            },
            next,
            next_duration,
        })
    }

    fn on_settings_change(&self, change: &SettingsPayload) -> bool {
        if change.section != TIMER_SECTION
            || SessionType::from_duration_option(&change.option) != Some(self.current.get())
        {
            return false;
        }
        if self.state() == SessionState::Started {
            tracing::debug!(
                option = %change.option,
                "duration changed while running; applies to the next start"
            );
            return false;
        }

        match lookup_duration(self.settings.as_ref(), self.current.get()) {
            Ok(duration) => REFRESH
                .fire(self, |s| {
                    s.duration.set(duration);
                    true
                })
                .unwrap_or(false),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    option = %change.option,
                    "failed to refresh session duration"
                );
                false
            }
        }
    }

    fn long_break_interval(&self) -> Result<u32> {
        let interval = self.settings.get_int(TIMER_SECTION, LONG_BREAK_INTERVAL)?;
        Ok(u32::try_from(interval).unwrap_or(0).max(1))
    }

    fn timer_running(&self) -> bool {
        self.timer.is_running()
    }

    fn timer_finished(&self) -> bool {
        !self.timer.is_running()
    }

    fn publish(&self, event: SessionEvent, payload: &SessionPayload) {
        self.bus.session.publish(event, payload);
    }

    fn publish_start(&self, _: &bool) {
        self.publish(SessionEvent::Start, &self.payload());
    }

    fn publish_interrupt(&self, _: &bool) {
        self.publish(SessionEvent::Interrupt, &self.payload());
    }

    fn publish_reset(&self, _: &bool) {
        self.publish(SessionEvent::Reset, &self.payload());
    }

    fn publish_change(&self, _: &bool) {
        self.publish(SessionEvent::Change, &self.payload());
    }

    fn publish_end(&self, advance: &Advance) {
        tracing::info!(
            session = %advance.finished.session_type,
            pomodoros = advance.finished.pomodoros,
            next = %advance.next,
            "session ended"
        );
        self.publish(SessionEvent::End, &advance.finished);
        self.current.set(advance.next);
        self.duration.set(advance.next_duration);
        self.publish(SessionEvent::Change, &self.payload());
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.bus.timer.unsubscribe(self.timer_subscription);
        self.bus.settings.unsubscribe(self.settings_subscription);
    }
}

/// Seconds configured for `session_type` (settings hold minutes).
fn lookup_duration(settings: &dyn Settings, session_type: SessionType) -> Result<u64> {
    let option = session_type.duration_option();
    let minutes = settings.get_int(TIMER_SECTION, option)?;
    let minutes = u64::try_from(minutes).map_err(|_| ConfigError::InvalidValue {
        key: format!("{TIMER_SECTION}.{option}"),
        message: format!("duration must not be negative, got {minutes}"),
    })?;
    Ok(minutes * 60)
}

fn flag<S: fmt::Debug>(outcome: Result<bool, TransitionError<S, CoreError>>) -> Result<bool> {
    match outcome {
        Ok(accepted) => Ok(accepted),
        Err(TransitionError::Rejected(_)) => Ok(false),
        Err(TransitionError::Failed(e)) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualScheduler;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Settings backed by a map, publishing like the real store does.
    struct MapSettings {
        values: RefCell<HashMap<String, i64>>,
        bus: Rc<EventBus>,
    }

    impl MapSettings {
        fn new(bus: Rc<EventBus>, pomodoro: i64, short: i64, long: i64, interval: i64) -> Self {
            let values = [
                ("pomodoro_duration", pomodoro),
                ("shortbreak_duration", short),
                ("longbreak_duration", long),
                ("long_break_interval", interval),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
            Self {
                values: RefCell::new(values),
                bus,
            }
        }

        fn forget(&self, option: &str) {
            self.values.borrow_mut().remove(option);
        }

        fn set(&self, option: &str, value: i64) {
            self.values.borrow_mut().insert(option.to_string(), value);
            self.bus.settings.publish(
                SettingsEvent::Set,
                &SettingsPayload {
                    action: SettingsEvent::Set,
                    section: TIMER_SECTION.to_string(),
                    option: option.to_string(),
                    value: Some(value.to_string()),
                },
            );
        }
    }

    impl Settings for MapSettings {
        fn get_int(&self, section: &str, key: &str) -> std::result::Result<i64, ConfigError> {
            if section != TIMER_SECTION {
                return Err(ConfigError::MissingKey(format!("{section}.{key}")));
            }
            self.values
                .borrow()
                .get(key)
                .copied()
                .ok_or_else(|| ConfigError::MissingKey(format!("{section}.{key}")))
        }
    }

    struct Fixture {
        session: Rc<Session>,
        timer: Rc<Timer>,
        scheduler: Rc<ManualScheduler>,
        settings: Rc<MapSettings>,
        events: Rc<RefCell<Vec<(SessionEvent, SessionPayload)>>>,
    }

    fn fixture(pomodoro: i64, short: i64, long: i64, interval: i64) -> Fixture {
        let bus = Rc::new(EventBus::new());
        let scheduler = Rc::new(ManualScheduler::new());
        let settings = Rc::new(MapSettings::new(Rc::clone(&bus), pomodoro, short, long, interval));
        let timer = Timer::new(Rc::clone(&bus), scheduler.clone());
        let session = Session::new(Rc::clone(&timer), Rc::clone(&bus), settings.clone()).unwrap();

        let events = Rc::new(RefCell::new(Vec::new()));
        let e = Rc::clone(&events);
        bus.session.subscribe(&SessionEvent::ALL, move |event, payload| {
            e.borrow_mut().push((event, *payload));
            true
        });

        Fixture {
            session,
            timer,
            scheduler,
            settings,
            events,
        }
    }

    impl Fixture {
        /// Run the current session to completion.
        fn finish(&self) {
            let secs = self.timer.duration() + 1;
            self.scheduler.advance_secs(secs);
        }

        fn tags(&self) -> Vec<SessionEvent> {
            self.events.borrow().iter().map(|(e, _)| *e).collect()
        }
    }

    #[test]
    fn new_session_is_idle_pomodoro() {
        let f = fixture(25, 5, 15, 4);
        assert_eq!(f.session.state(), SessionState::Stopped);
        assert_eq!(f.session.current(), SessionType::Pomodoro);
        assert_eq!(f.session.duration(), 1500);
        assert!(f.session.payload().id.is_nil());
    }

    #[test]
    fn start_runs_timer_with_current_duration() {
        let f = fixture(25, 5, 15, 4);
        assert!(f.session.start().unwrap());
        assert_eq!(f.session.state(), SessionState::Started);
        assert_eq!(f.timer.payload(), TimerPayload::new(1500, 1500));
        assert_eq!(f.tags(), vec![SessionEvent::Start]);

        assert!(!f.session.start().unwrap());
        assert_eq!(f.tags(), vec![SessionEvent::Start]);
    }

    #[test]
    fn stop_interrupts_running_session() {
        let f = fixture(25, 5, 15, 4);
        assert!(!f.session.stop());

        f.session.start().unwrap();
        f.scheduler.advance_secs(10);
        assert!(f.session.stop());
        assert_eq!(f.session.state(), SessionState::Stopped);
        assert!(!f.timer.is_running());
        assert_eq!(f.tags(), vec![SessionEvent::Start, SessionEvent::Interrupt]);
    }

    #[test]
    fn finishing_pomodoro_moves_to_short_break() {
        let f = fixture(1, 1, 2, 4);
        f.session.start().unwrap();
        f.finish();

        assert_eq!(f.session.state(), SessionState::Ended);
        assert_eq!(f.session.current(), SessionType::ShortBreak);
        assert_eq!(f.session.pomodoros(), 1);
        assert_eq!(f.tags(), vec![SessionEvent::Start, SessionEvent::End, SessionEvent::Change]);

        let events = f.events.borrow();
        let (_, ended) = events[1];
        let (_, changed) = events[2];
        assert_eq!(ended.session_type, SessionType::Pomodoro);
        assert_eq!(ended.duration, 60);
        assert!(!ended.id.is_nil());
        assert_eq!(changed.session_type, SessionType::ShortBreak);
        assert_eq!(changed.duration, 60);
        assert_eq!(changed.id, ended.id);
    }

    #[test]
    fn break_is_always_followed_by_pomodoro() {
        let f = fixture(1, 1, 1, 4);
        f.session.change(SessionType::LongBreak).unwrap();
        f.session.start().unwrap();
        f.finish();

        assert_eq!(f.session.current(), SessionType::Pomodoro);
        assert_eq!(f.session.pomodoros(), 0);
        assert!(f.session.payload().id.is_nil());
    }

    #[test]
    fn every_interval_th_pomodoro_earns_long_break() {
        let f = fixture(1, 1, 1, 2);
        let mut after_pomodoro = Vec::new();
        for _ in 0..4 {
            f.session.start().unwrap();
            f.finish();
            after_pomodoro.push(f.session.current());
            f.session.start().unwrap();
            f.finish();
        }
        assert_eq!(
            after_pomodoro,
            vec![
                SessionType::ShortBreak,
                SessionType::LongBreak,
                SessionType::ShortBreak,
                SessionType::LongBreak
            ]
        );
        assert_eq!(f.session.pomodoros(), 4);
    }

    #[test]
    fn zero_interval_means_every_break_is_long() {
        let f = fixture(1, 1, 1, 0);
        f.session.start().unwrap();
        f.finish();
        assert_eq!(f.session.current(), SessionType::LongBreak);
    }

    #[test]
    fn end_observers_see_previous_type() {
        let f = fixture(1, 1, 1, 4);
        let seen = Rc::new(Cell::new(None));

        let s = Rc::downgrade(&f.session);
        let slot = Rc::clone(&seen);
        f.session.bus.session.subscribe(&[SessionEvent::End], move |_, _| {
            slot.set(s.upgrade().map(|s| s.current()));
            true
        });

        f.session.start().unwrap();
        f.finish();
        assert_eq!(seen.get(), Some(SessionType::Pomodoro));
        assert_eq!(f.session.current(), SessionType::ShortBreak);
        assert_eq!(f.events.borrow()[1].1.session_type, SessionType::Pomodoro);
    }

    #[test]
    fn reset_only_while_idle() {
        let f = fixture(1, 1, 1, 4);
        f.session.start().unwrap();
        f.finish();
        assert_eq!(f.session.pomodoros(), 1);

        f.session.start().unwrap();
        assert!(!f.session.reset());
        assert_eq!(f.session.pomodoros(), 1);

        f.session.stop();
        assert!(f.session.reset());
        assert!(f.session.reset());
        assert_eq!(f.session.pomodoros(), 0);
    }

    #[test]
    fn change_rejected_while_running() {
        let f = fixture(25, 5, 15, 4);
        f.session.start().unwrap();
        assert!(!f.session.change(SessionType::LongBreak).unwrap());
        assert_eq!(f.session.current(), SessionType::Pomodoro);
    }

    #[test]
    fn change_publishes_new_type_and_duration() {
        let f = fixture(25, 5, 15, 4);
        assert!(f.session.change(SessionType::LongBreak).unwrap());
        let events = f.events.borrow();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, SessionEvent::Change);
        assert_eq!(events[0].1.session_type, SessionType::LongBreak);
        assert_eq!(events[0].1.duration, 900);
    }

    #[test]
    fn missing_setting_is_an_error_and_leaves_session_untouched() {
        let f = fixture(25, 5, 15, 4);
        f.settings.values.borrow_mut().remove("shortbreak_duration");

        assert!(f.session.change(SessionType::ShortBreak).is_err());
        assert_eq!(f.session.current(), SessionType::Pomodoro);
        assert!(f.events.borrow().is_empty());
    }

    #[test]
    fn negative_duration_is_rejected() {
        let f = fixture(25, 5, 15, 4);
        f.settings.values.borrow_mut().insert("pomodoro_duration".into(), -3);
        let err = f.session.start().unwrap_err();
        assert!(matches!(err, CoreError::Config(ConfigError::InvalidValue { .. })));
        assert_eq!(f.session.state(), SessionState::Stopped);
    }

    #[test]
    fn idle_duration_follows_settings() {
        let f = fixture(25, 5, 15, 4);
        f.settings.set("pomodoro_duration", 50);

        assert_eq!(f.session.duration(), 3000);
        assert_eq!(f.tags(), vec![SessionEvent::Change]);

        f.settings.set("longbreak_duration", 30);
        assert_eq!(f.tags(), vec![SessionEvent::Change]);
    }

    #[test]
    fn unreadable_next_duration_interrupts_instead_of_ending() {
        let f = fixture(1, 5, 15, 4);
        f.session.start().unwrap();
        f.settings.forget("shortbreak_duration");
        f.finish();

        assert_eq!(f.session.state(), SessionState::Stopped);
        assert_eq!(f.session.pomodoros(), 0);
        assert_eq!(f.session.current(), SessionType::Pomodoro);
        assert_eq!(f.tags(), vec![SessionEvent::Start, SessionEvent::Interrupt]);

        assert!(f.session.start().unwrap());
        assert!(f.timer.is_running());
    }

    #[test]
    fn running_countdown_is_never_resized() {
        let f = fixture(25, 5, 15, 4);
        f.session.start().unwrap();
        f.settings.set("pomodoro_duration", 50);

        assert_eq!(f.session.duration(), 1500);
        assert_eq!(f.timer.duration(), 1500);
        assert_eq!(f.tags(), vec![SessionEvent::Start]);

        f.session.stop();
        f.session.start().unwrap();
        assert_eq!(f.timer.duration(), 3000);
    }
}

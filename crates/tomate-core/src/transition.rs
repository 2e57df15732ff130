//! Guarded state transitions.
//!
//! A [`Transition`] declares where an operation may run from, what must hold
//! before it runs, which state it commits and what happens after the commit:
//!
//! ```text
//! check source -> check precondition -> body -> commit target -> exit action
//! ```
//!
//! If either guard fails the body never runs and the state is left untouched.
//! Components keep their transitions as constants next to the operations that
//! fire them:
//!
//! ```ignore
//! const STOP: Transition<Timer> = Transition {
//!     name: "timer.stop",
//!     source: Source::States(&[TimerState::Started]),
//!     target: Target::To(TimerState::Stopped),
//!     precondition: None,
//!     exit: Some(Timer::publish_stop),
//! };
//!
//! STOP.fire(timer, |t| t.clear()).unwrap_or(false)
//! ```

use std::cell::Cell;
use std::fmt;

use thiserror::Error;

/// Holds the current state of a [`Machine`].
///
/// Readable by anyone; only a [`Transition`] can write it.
#[derive(Debug)]
pub struct StateCell<S: Copy>(Cell<S>);

impl<S: Copy> StateCell<S> {
    pub fn new(initial: S) -> Self {
        Self(Cell::new(initial))
    }

    pub fn get(&self) -> S {
        self.0.get()
    }

    fn set(&self, state: S) {
        self.0.set(state);
    }
}

/// Anything whose state is driven by transitions.
pub trait Machine {
    type State: Copy + PartialEq + fmt::Debug + 'static;

    fn state_cell(&self) -> &StateCell<Self::State>;

    fn state(&self) -> Self::State {
        self.state_cell().get()
    }
}

/// States an operation is legal from.
#[derive(Debug, Clone, Copy)]
pub enum Source<S: 'static> {
    Any,
    States(&'static [S]),
}

impl<S: PartialEq> Source<S> {
    pub fn allows(&self, state: &S) -> bool {
        match self {
            Source::Any => true,
            Source::States(states) => states.contains(state),
        }
    }
}

/// State committed after the body ran.
#[derive(Debug, Clone, Copy)]
pub enum Target<S> {
    To(S),
    Unchanged,
}

/// Why a transition refused to run.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection<S: fmt::Debug> {
    #[error("{transition} is not allowed from {state:?}")]
    Source { transition: &'static str, state: S },

    #[error("{transition}: precondition does not hold in {state:?}")]
    Precondition { transition: &'static str, state: S },
}

/// Outcome of a transition whose body can fail.
#[derive(Error, Debug)]
pub enum TransitionError<S: fmt::Debug, E> {
    #[error(transparent)]
    Rejected(Rejection<S>),

    #[error("transition body failed")]
    Failed(E),
}

/// A guarded transition over machine `T` whose body returns `R`.
pub struct Transition<T: Machine, R = bool> {
    pub name: &'static str,
    pub source: Source<T::State>,
    pub target: Target<T::State>,
    /// Must hold for the body to run. `None` always holds.
    pub precondition: Option<fn(&T) -> bool>,
    /// Runs after the target state is committed, with the body's result.
    pub exit: Option<fn(&T, &R)>,
}

impl<T: Machine, R> Transition<T, R> {
    /// Evaluate both guards without running anything.
    pub fn check(&self, instance: &T) -> Result<(), Rejection<T::State>> {
        let state = instance.state();
        if !self.source.allows(&state) {
            tracing::debug!(transition = self.name, ?state, "transition rejected: source state");
            return Err(Rejection::Source {
                transition: self.name,
                state,
            });
        }
        if let Some(precondition) = self.precondition {
            if !precondition(instance) {
                tracing::debug!(
                    transition = self.name,
                    ?state,
                    "transition rejected: precondition"
                );
                return Err(Rejection::Precondition {
                    transition: self.name,
                    state,
                });
            }
        }
        Ok(())
    }

    /// Run `body` if the guards allow it, then commit and run the exit action.
    pub fn fire<F>(&self, instance: &T, body: F) -> Result<R, Rejection<T::State>>
    where
        F: FnOnce(&T) -> R,
    {
        self.check(instance)?;
        let result = body(instance);
        self.commit(instance, &result);
        Ok(result)
    }

    /// Like [`Self::fire`], but a body error aborts before the commit: the
    /// state is not changed and the exit action does not run.
    pub fn try_fire<F, E>(&self, instance: &T, body: F) -> Result<R, TransitionError<T::State, E>>
    where
        F: FnOnce(&T) -> Result<R, E>,
    {
        self.check(instance).map_err(TransitionError::Rejected)?;
        let result = body(instance).map_err(TransitionError::Failed)?;
        self.commit(instance, &result);
        Ok(result)
    }

    fn commit(&self, instance: &T, result: &R) {
        if let Target::To(target) = self.target {
            let from = instance.state();
            instance.state_cell().set(target);
            tracing::debug!(transition = self.name, ?from, to = ?target, "transition committed");
        }
        if let Some(exit) = self.exit {
            exit(instance, result);
        }
    }
}

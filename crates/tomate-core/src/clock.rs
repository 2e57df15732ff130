//! Host scheduling primitive.
//!
//! The timer never sleeps or spawns threads. It hands a callback to a
//! [`Scheduler`], which invokes it after a delay and keeps invoking it at the
//! same interval for as long as the callback returns `true`.
//!
//! - [`ManualScheduler`] is driven explicitly with [`ManualScheduler::advance`]
//!   and is what tests and simulations use.
//! - [`TokioScheduler`] runs callbacks on the current tokio `LocalSet`.

use std::cell::{Cell, RefCell};
use std::time::Duration;

/// A scheduled callback. Returning `true` asks to be called again.
pub type TickFn = Box<dyn FnMut() -> bool>;

pub trait Scheduler {
    fn schedule(&self, delay: Duration, callback: TickFn);
}

struct Pending {
    due: Duration,
    every: Duration,
    seq: u64,
    callback: TickFn,
}

/// Deterministic scheduler with a virtual clock.
#[derive(Default)]
pub struct ManualScheduler {
    now: Cell<Duration>,
    seq: Cell<u64>,
    pending: RefCell<Vec<Pending>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation.
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    /// Number of callbacks waiting to run.
    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Move the clock forward by `by`, running every callback that falls due
    /// on the way in due order. Returns how many callbacks ran.
    pub fn advance(&self, by: Duration) -> usize {
        let until = self.now.get() + by;
        let mut fired = 0;

        while let Some(mut next) = self.take_due(until) {
            self.now.set(next.due);
            fired += 1;
            // No borrow is held here: the callback may schedule more work.
            if (next.callback)() {
                next.due += next.every;
                self.pending.borrow_mut().push(next);
            }
        }

        self.now.set(until);
        fired
    }

    /// Convenience for advancing whole seconds.
    pub fn advance_secs(&self, secs: u64) -> usize {
        self.advance(Duration::from_secs(secs))
    }

    fn take_due(&self, until: Duration) -> Option<Pending> {
        let mut pending = self.pending.borrow_mut();
        let index = pending
            .iter()
            .enumerate()
            .filter(|(_, p)| p.due <= until)
            .min_by_key(|(_, p)| (p.due, p.seq))
            .map(|(i, _)| i)?;
        Some(pending.swap_remove(index))
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, callback: TickFn) {
        let seq = self.seq.get();
        self.seq.set(seq + 1);
        self.pending.borrow_mut().push(Pending {
            due: self.now.get() + delay,
            every: delay,
            seq,
            callback,
        });
    }
}

/// Runs callbacks as local tasks on the current tokio `LocalSet`.
///
/// [`Scheduler::schedule`] must be called from inside `LocalSet::run_until`
/// (or a task spawned on one); `spawn_local` panics anywhere else.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, mut callback: TickFn) {
        tokio::task::spawn_local(async move {
            let start = tokio::time::Instant::now() + delay;
            let mut interval = tokio::time::interval_at(start, delay);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if !callback() {
                    break;
                }
            }
        });
    }
}

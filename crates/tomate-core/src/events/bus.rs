//! Synchronous publish/subscribe channels.
//!
//! A [`Channel`] is a table of `(tag filter, handler)` rows kept in
//! registration order. Publishing runs every matching handler to completion
//! before returning. The table is snapshotted before dispatch, so a handler may
//! publish, subscribe or unsubscribe on the same channel while it runs; nested
//! publishes complete depth-first. A handler added during a publish first hears
//! the next one, and a handler removed during a publish is skipped if it has
//! not run yet.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use uuid::Uuid;

use super::{
    SessionEvent, SessionPayload, SettingsEvent, SettingsPayload, TimerEvent, TimerPayload,
    ViewEvent,
};

/// Subscription handle for unsubscribing from a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sub({})", &self.0.to_string()[..8])
    }
}

/// A registered callback. The return value is collected by [`Channel::publish`].
pub type Handler<E, P> = Rc<dyn Fn(E, &P) -> bool>;

struct Subscriber<E, P> {
    id: SubscriptionId,
    tags: Vec<E>,
    handler: Handler<E, P>,
}

/// One domain channel of the bus, carrying tags of type `E` with payload `P`.
pub struct Channel<E, P> {
    name: &'static str,
    subscribers: RefCell<Vec<Subscriber<E, P>>>,
}

impl<E, P> Channel<E, P>
where
    E: Copy + PartialEq + fmt::Debug,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            subscribers: RefCell::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register `handler` for every tag in `tags`.
    pub fn subscribe<F>(&self, tags: &[E], handler: F) -> SubscriptionId
    where
        F: Fn(E, &P) -> bool + 'static,
    {
        self.subscribe_rc(tags, Rc::new(handler))
    }

    /// Register an already shared handler.
    pub fn subscribe_rc(&self, tags: &[E], handler: Handler<E, P>) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.subscribers.borrow_mut().push(Subscriber {
            id,
            tags: tags.to_vec(),
            handler,
        });
        tracing::trace!(channel = self.name, %id, ?tags, "subscribed");
        id
    }

    /// Remove a subscription. Returns `false` if `id` is not registered here.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        let removed = subscribers.len() != before;
        if removed {
            tracing::trace!(channel = self.name, %id, "unsubscribed");
        }
        removed
    }

    /// Dispatch `tag` to every handler registered for it, in registration
    /// order, and return their results.
    pub fn publish(&self, tag: E, payload: &P) -> Vec<bool> {
        let handlers: Vec<(SubscriptionId, Handler<E, P>)> = self
            .subscribers
            .borrow()
            .iter()
            .filter(|s| s.tags.contains(&tag))
            .map(|s| (s.id, Rc::clone(&s.handler)))
            .collect();

        tracing::trace!(channel = self.name, event = ?tag, receivers = handlers.len(), "publish");

        handlers
            .iter()
            .filter(|(id, _)| self.is_subscribed(*id))
            .map(|(_, handler)| handler(tag, payload))
            .collect()
    }

    fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.subscribers.borrow().iter().any(|s| s.id == id)
    }

    /// Number of handlers that would receive `tag`.
    pub fn receivers(&self, tag: E) -> usize {
        self.subscribers
            .borrow()
            .iter()
            .filter(|s| s.tags.contains(&tag))
            .count()
    }

    pub fn len(&self) -> usize {
        self.subscribers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.borrow().is_empty()
    }
}

/// The process event bus: one channel per domain.
///
/// Constructed once by the entry point and shared by `Rc`.
pub struct EventBus {
    pub timer: Channel<TimerEvent, TimerPayload>,
    pub session: Channel<SessionEvent, SessionPayload>,
    pub settings: Channel<SettingsEvent, SettingsPayload>,
    pub view: Channel<ViewEvent, ()>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            timer: Channel::new("timer"),
            session: Channel::new("session"),
            settings: Channel::new("settings"),
            view: Channel::new("view"),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Tag {
        A,
        B,
    }

    #[test]
    fn publish_runs_matching_handlers_in_order() {
        let channel: Channel<Tag, u32> = Channel::new("test");
        let log = Rc::new(RefCell::new(Vec::new()));

        let l = Rc::clone(&log);
        channel.subscribe(&[Tag::A], move |_, p| {
            l.borrow_mut().push(("first", *p));
            true
        });
        let l = Rc::clone(&log);
        channel.subscribe(&[Tag::B], move |_, p| {
            l.borrow_mut().push(("other", *p));
            true
        });
        let l = Rc::clone(&log);
        channel.subscribe(&[Tag::A, Tag::B], move |_, p| {
            l.borrow_mut().push(("second", *p));
            false
        });

        assert_eq!(channel.publish(Tag::A, &7), vec![true, false]);
        assert_eq!(*log.borrow(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn publish_without_subscribers_returns_empty() {
        let channel: Channel<Tag, ()> = Channel::new("test");
        assert!(channel.publish(Tag::A, &()).is_empty());
        assert!(channel.is_empty());
    }

    #[test]
    fn unsubscribe_removes_only_that_handler() {
        let channel: Channel<Tag, ()> = Channel::new("test");
        let id = channel.subscribe(&[Tag::A], |_, _| true);
        channel.subscribe(&[Tag::A], |_, _| true);
        assert_eq!(channel.receivers(Tag::A), 2);

        assert!(channel.unsubscribe(id));
        assert!(!channel.unsubscribe(id));
        assert_eq!(channel.receivers(Tag::A), 1);
    }

    #[test]
    fn nested_publish_completes_depth_first() {
        let channel: Rc<Channel<Tag, u32>> = Rc::new(Channel::new("test"));
        let log = Rc::new(RefCell::new(Vec::new()));

        let inner = Rc::clone(&channel);
        let l = Rc::clone(&log);
        channel.subscribe(&[Tag::A], move |_, p| {
            l.borrow_mut().push(format!("a{p}"));
            inner.publish(Tag::B, &(p + 1));
            l.borrow_mut().push(format!("a{p} done"));
            true
        });
        let l = Rc::clone(&log);
        channel.subscribe(&[Tag::B], move |_, p| {
            l.borrow_mut().push(format!("b{p}"));
            true
        });

        channel.publish(Tag::A, &1);
        assert_eq!(*log.borrow(), vec!["a1", "b2", "a1 done"]);
    }

    #[test]
    fn handler_may_unsubscribe_itself_during_dispatch() {
        let channel: Rc<Channel<Tag, ()>> = Rc::new(Channel::new("test"));
        let own_id = Rc::new(Cell::new(None));
        let calls = Rc::new(Cell::new(0));

        let ch = Rc::clone(&channel);
        let id_slot = Rc::clone(&own_id);
        let c = Rc::clone(&calls);
        let id = channel.subscribe(&[Tag::A], move |_, _| {
            c.set(c.get() + 1);
            if let Some(id) = id_slot.get() {
                ch.unsubscribe(id);
            }
            true
        });
        own_id.set(Some(id));

        channel.publish(Tag::A, &());
        channel.publish(Tag::A, &());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn handler_removed_mid_dispatch_is_skipped() {
        let channel: Rc<Channel<Tag, ()>> = Rc::new(Channel::new("test"));
        let victim = Rc::new(Cell::new(None));
        let victim_calls = Rc::new(Cell::new(0));

        let ch = Rc::clone(&channel);
        let v = Rc::clone(&victim);
        channel.subscribe(&[Tag::A], move |_, _| {
            if let Some(id) = v.get() {
                ch.unsubscribe(id);
            }
            true
        });
        let c = Rc::clone(&victim_calls);
        let id = channel.subscribe(&[Tag::A], move |_, _| {
            c.set(c.get() + 1);
            true
        });
        victim.set(Some(id));

        assert_eq!(channel.publish(Tag::A, &()), vec![true]);
        assert_eq!(victim_calls.get(), 0);
        assert_eq!(channel.receivers(Tag::A), 1);
    }

    #[test]
    fn handler_added_mid_dispatch_waits_for_next_publish() {
        let channel: Rc<Channel<Tag, ()>> = Rc::new(Channel::new("test"));
        let late_calls = Rc::new(Cell::new(0));

        let ch = Rc::clone(&channel);
        let c = Rc::clone(&late_calls);
        let added = Cell::new(false);
        channel.subscribe(&[Tag::A], move |_, _| {
            if !added.replace(true) {
                let c = Rc::clone(&c);
                ch.subscribe(&[Tag::A], move |_, _| {
                    c.set(c.get() + 1);
                    true
                });
            }
            true
        });

        assert_eq!(channel.publish(Tag::A, &()).len(), 1);
        assert_eq!(late_calls.get(), 0);
        assert_eq!(channel.publish(Tag::A, &()).len(), 2);
        assert_eq!(late_calls.get(), 1);
    }
}

//! Event notification hub with simple, one-off and late-bound subscriptions
//!
//! The hub dispatches named events to registered callbacks. Four
//! subscription flavors exist:
//! - [`EventHub::on`] - persistent, fires on every matching event
//! - [`EventHub::one`] - fires at most once; replays immediately if the
//!   event already fired
//! - [`EventHub::late`] - replays the most recent firing immediately, then
//!   keeps listening like `on`
//! - [`EventHub::all`] - receives every event, with the name prepended
//!
//! Registration methods accept one or more space-separated event names.
//! Callbacks are identified by `Rc` pointer identity: registering the same
//! `Rc` twice for one name is a no-op, and `off` removes by the same
//! identity. Dispatch is synchronous; listener lists are snapshotted before
//! invocation, so callbacks may register or unregister listeners without
//! corrupting the iteration in progress.

use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;

/// A callback receiving an event payload
pub type Callback<P> = Rc<dyn Fn(&P)>;

/// A catch-all callback receiving the event name and payload
pub type AllCallback<P> = Rc<dyn Fn(&str, &P)>;

struct HubState<P> {
    /// Persistent listeners per event name, in registration order
    listeners: IndexMap<String, Vec<Callback<P>>>,
    /// One-shot callbacks waiting for their first (and only) firing
    one_pending: IndexMap<String, Vec<Callback<P>>>,
    /// Late callbacks waiting for the next firing, after which they become
    /// persistent listeners
    late_pending: IndexMap<String, Vec<Callback<P>>>,
    /// Catch-all listeners
    all: Vec<AllCallback<P>>,
    /// Most recent payload per fired event name, kept for the lifetime of
    /// the hub
    fired: IndexMap<String, P>,
}

impl<P> Default for HubState<P> {
    fn default() -> Self {
        Self {
            listeners: IndexMap::new(),
            one_pending: IndexMap::new(),
            late_pending: IndexMap::new(),
            all: Vec::new(),
            fired: IndexMap::new(),
        }
    }
}

/// An event notification center, generic over the payload type
pub struct EventHub<P: Clone> {
    state: RefCell<HubState<P>>,
}

impl<P: Clone> Default for EventHub<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Clone> EventHub<P> {
    /// Create a new hub with no listeners
    pub fn new() -> Self {
        Self {
            state: RefCell::new(HubState::default()),
        }
    }

    /// Bind a callback to one or more space-separated events.
    ///
    /// Registration is idempotent per (name, callback) pair.
    pub fn on(&self, names: &str, callback: Callback<P>) -> &Self {
        for name in names.split_whitespace() {
            self.on_single(name, callback.clone());
        }
        self
    }

    fn on_single(&self, name: &str, callback: Callback<P>) {
        let mut state = self.state.borrow_mut();
        let listeners = state.listeners.entry(name.to_string()).or_default();
        if !listeners.iter().any(|cb| Rc::ptr_eq(cb, &callback)) {
            listeners.push(callback);
        }
    }

    /// Unbind a callback bound with `on` (or migrated there by `late`)
    pub fn off(&self, names: &str, callback: &Callback<P>) -> &Self {
        let mut state = self.state.borrow_mut();
        for name in names.split_whitespace() {
            if let Some(listeners) = state.listeners.get_mut(name) {
                listeners.retain(|cb| !Rc::ptr_eq(cb, callback));
            }
        }
        drop(state);
        self
    }

    /// Bind a callback to fire at most once per event name.
    ///
    /// If the event already fired during this hub's lifetime the callback
    /// runs immediately with the cached payload and is never stored.
    pub fn one(&self, names: &str, callback: Callback<P>) -> &Self {
        for name in names.split_whitespace() {
            self.one_single(name, callback.clone());
        }
        self
    }

    fn one_single(&self, name: &str, callback: Callback<P>) {
        let cached = self.state.borrow().fired.get(name).cloned();
        if let Some(payload) = cached {
            callback(&payload);
            return;
        }
        let mut state = self.state.borrow_mut();
        let pending = state.one_pending.entry(name.to_string()).or_default();
        if !pending.iter().any(|cb| Rc::ptr_eq(cb, &callback)) {
            pending.push(callback);
        }
    }

    /// A combination of `one` and `on`: replay the most recent firing
    /// immediately if there was one, and keep listening either way.
    pub fn late(&self, names: &str, callback: Callback<P>) -> &Self {
        for name in names.split_whitespace() {
            self.late_single(name, callback.clone());
        }
        self
    }

    fn late_single(&self, name: &str, callback: Callback<P>) {
        let cached = self.state.borrow().fired.get(name).cloned();
        if let Some(payload) = cached {
            callback(&payload);
            self.on_single(name, callback);
            return;
        }
        let mut state = self.state.borrow_mut();
        let pending = state.late_pending.entry(name.to_string()).or_default();
        if !pending.iter().any(|cb| Rc::ptr_eq(cb, &callback)) {
            pending.push(callback);
        }
    }

    /// Bind a callback to every event fired on this hub
    pub fn all(&self, callback: AllCallback<P>) -> &Self {
        self.state.borrow_mut().all.push(callback);
        self
    }

    /// Fire an event, dispatching synchronously in this order: pending
    /// one-shot callbacks, persistent listeners in registration order,
    /// pending late callbacks (which then become persistent listeners),
    /// catch-all listeners, and finally the payload is recorded as the
    /// event's most recent firing.
    pub fn fire(&self, name: &str, payload: P) -> &Self {
        let (one_shots, listeners, late_arrivals, catch_alls) = {
            let mut state = self.state.borrow_mut();
            let one_shots = state.one_pending.shift_remove(name).unwrap_or_default();
            let listeners = state.listeners.get(name).cloned().unwrap_or_default();
            let late_arrivals = state.late_pending.shift_remove(name).unwrap_or_default();
            let catch_alls = state.all.clone();
            (one_shots, listeners, late_arrivals, catch_alls)
        };

        for callback in &one_shots {
            callback(&payload);
        }
        for callback in &listeners {
            callback(&payload);
        }
        for callback in late_arrivals {
            callback(&payload);
            self.on_single(name, callback);
        }
        for callback in &catch_alls {
            callback(name, &payload);
        }

        self.state
            .borrow_mut()
            .fired
            .insert(name.to_string(), payload);
        self
    }

    /// Whether the named event has ever fired on this hub
    pub fn has_fired(&self, name: &str) -> bool {
        self.state.borrow().fired.contains_key(name)
    }

    /// The most recent payload fired for the named event, if any
    pub fn last_payload(&self, name: &str) -> Option<P> {
        self.state.borrow().fired.get(name).cloned()
    }

    /// Number of persistent listeners currently bound to the named event
    pub fn listener_count(&self, name: &str) -> usize {
        self.state
            .borrow()
            .listeners
            .get(name)
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Shared counter for asserting callback invocations
    #[derive(Clone, Default)]
    struct Counter(Rc<RefCell<u32>>);

    impl Counter {
        fn callback(&self) -> Callback<i64> {
            let count = self.0.clone();
            Rc::new(move |_| *count.borrow_mut() += 1)
        }

        fn get(&self) -> u32 {
            *self.0.borrow()
        }
    }

    #[test]
    fn test_simple_events() {
        let hub = EventHub::new();
        let counter = Counter::default();
        let inc = counter.callback();

        hub.on("foo", inc.clone());
        hub.fire("foo", 0);
        assert_eq!(counter.get(), 1);

        hub.fire("foo", 0);
        hub.fire("foo", 0);
        assert_eq!(counter.get(), 3);

        hub.off("foo", &inc);
        hub.fire("foo", 0);
        assert_eq!(counter.get(), 3);
    }

    #[test]
    fn test_two_listeners_called_once_each() {
        let hub = EventHub::new();
        let a = Counter::default();
        let b = Counter::default();

        hub.on("bar", a.callback());
        hub.on("bar", b.callback());
        hub.fire("bar", 0);
        assert_eq!(a.get(), 1);
        assert_eq!(b.get(), 1);
    }

    #[test]
    fn test_payload_reaches_callback() {
        let hub = EventHub::new();
        let result = Rc::new(RefCell::new(0));
        let seen = result.clone();
        hub.on("do-addition", Rc::new(move |sum: &i64| *seen.borrow_mut() = *sum));
        hub.fire("do-addition", 28);
        assert_eq!(*result.borrow(), 28);
    }

    #[test]
    fn test_duplicate_registration_is_idempotent() {
        let hub = EventHub::new();
        let counter = Counter::default();
        let inc = counter.callback();

        hub.on("foo", inc.clone());
        hub.on("foo", inc.clone());
        hub.fire("foo", 0);
        assert_eq!(counter.get(), 1);
    }

    #[test]
    fn test_multiple_event_registration() {
        let hub = EventHub::new();
        let counter = Counter::default();
        let inc = counter.callback();

        hub.on("foo bar baz", inc.clone());
        hub.fire("foo", 0);
        hub.fire("bar", 0);
        hub.fire("baz", 0);
        assert_eq!(counter.get(), 3);

        hub.off("foo baz", &inc);
        hub.fire("foo", 0);
        hub.fire("baz", 0);
        assert_eq!(counter.get(), 3);

        hub.fire("bar", 0);
        assert_eq!(counter.get(), 4);
    }

    #[test]
    fn test_one_time_events() {
        let hub = EventHub::new();
        let persistent = Counter::default();
        let once = Counter::default();

        hub.on("you-only-live", persistent.callback());
        hub.one("you-only-live", once.callback());

        hub.fire("you-only-live", 0);
        hub.fire("you-only-live", 0);
        hub.fire("you-only-live", 0);

        assert_eq!(persistent.get(), 3);
        assert_eq!(once.get(), 1);
    }

    #[test]
    fn test_one_after_fire_replays_cached_payload() {
        let hub = EventHub::new();
        let seen = Rc::new(RefCell::new(None));

        hub.fire("ready", 7);
        let sink = seen.clone();
        hub.one("ready", Rc::new(move |p: &i64| *sink.borrow_mut() = Some(*p)));
        assert_eq!(*seen.borrow(), Some(7));

        // Already consumed: a later fire must not reach it again
        *seen.borrow_mut() = None;
        hub.fire("ready", 8);
        assert_eq!(*seen.borrow(), None);
    }

    #[test]
    fn test_late_events() {
        let hub = EventHub::new();
        let counter = Counter::default();

        hub.fire("white-rabbit", 0);
        assert_eq!(counter.get(), 0);

        hub.late("white-rabbit", counter.callback());
        assert_eq!(counter.get(), 1);

        hub.fire("white-rabbit", 0);
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn test_late_before_any_fire_queues_then_persists() {
        let hub = EventHub::new();
        let counter = Counter::default();

        hub.late("signal", counter.callback());
        assert_eq!(counter.get(), 0);

        hub.fire("signal", 0);
        assert_eq!(counter.get(), 1);
        assert_eq!(hub.listener_count("signal"), 1);

        hub.fire("signal", 0);
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn test_late_replays_most_recent_payload() {
        let hub = EventHub::new();
        hub.fire("tick", 1);
        hub.fire("tick", 2);

        let seen = Rc::new(RefCell::new(0));
        let sink = seen.clone();
        hub.late("tick", Rc::new(move |p: &i64| *sink.borrow_mut() = *p));
        assert_eq!(*seen.borrow(), 2);
    }

    #[test]
    fn test_catch_all_listener() {
        let hub: EventHub<i64> = EventHub::new();
        let names = Rc::new(RefCell::new(Vec::new()));
        let sink = names.clone();
        hub.all(Rc::new(move |name: &str, _: &i64| {
            sink.borrow_mut().push(name.to_string())
        }));

        hub.fire("there", 0);
        hub.fire("that", 0);
        hub.fire("is", 0);
        hub.fire("better", 0);
        assert_eq!(*names.borrow(), vec!["there", "that", "is", "better"]);
    }

    #[test]
    fn test_dispatch_order_within_a_fire() {
        let hub = EventHub::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let log = |tag: &'static str| -> Callback<i64> {
            let order = order.clone();
            Rc::new(move |_| order.borrow_mut().push(tag))
        };

        hub.on("e", log("on"));
        hub.one("e", log("one"));
        hub.late("e", log("late"));
        let all_order = order.clone();
        hub.all(Rc::new(move |_: &str, _: &i64| {
            all_order.borrow_mut().push("all")
        }));

        hub.fire("e", 0);
        assert_eq!(*order.borrow(), vec!["one", "on", "late", "all"]);
    }

    #[test]
    fn test_registering_from_inside_a_callback() {
        let hub: Rc<EventHub<i64>> = Rc::new(EventHub::new());
        let counter = Counter::default();

        let inner = counter.callback();
        let hub_ref = hub.clone();
        hub.on(
            "outer",
            Rc::new(move |_| {
                hub_ref.on("outer", inner.clone());
            }),
        );

        // First fire registers the inner listener; only the second invokes it
        hub.fire("outer", 0);
        assert_eq!(counter.get(), 0);
        hub.fire("outer", 0);
        assert_eq!(counter.get(), 1);
    }

    #[test]
    fn test_fire_with_no_listeners_caches_payload() {
        let hub = EventHub::new();
        assert!(!hub.has_fired("quiet"));
        hub.fire("quiet", 5);
        assert!(hub.has_fired("quiet"));
        assert_eq!(hub.last_payload("quiet"), Some(5));
    }

    #[test]
    fn test_off_unknown_is_noop() {
        let hub: EventHub<i64> = EventHub::new();
        let counter = Counter::default();
        let never_bound = counter.callback();
        hub.off("ghost", &never_bound);
        hub.fire("ghost", 0);
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn test_chaining() {
        let hub = EventHub::new();
        let counter = Counter::default();
        hub.on("a", counter.callback())
            .on("b", counter.callback())
            .fire("a", 0)
            .fire("b", 0);
        assert_eq!(counter.get(), 2);
    }
}

//! Event routing with id-scoped and bare-name matching.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

/// Callback invoked with the event's component id (if any) and value.
pub type EventCallback = Arc<dyn Fn(Option<&str>, &Value) + Send + Sync>;

struct EventSubscription {
    event_name: String,
    id: Option<String>,
    callback: EventCallback,
}

/// Registry of event handlers.
///
/// A subscription keyed `event/id` matches only that exact pair; a
/// subscription keyed by the bare event name matches any id (wildcard).
/// Matching handlers run in registration order. Events with no matching
/// subscription are dropped silently — events are broadcast.
pub struct EventRouter {
    subs: Mutex<Vec<EventSubscription>>,
}

impl EventRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self {
            subs: Mutex::new(Vec::new()),
        }
    }

    /// Register a handler, optionally scoped to a component id.
    pub fn subscribe(&self, event_name: &str, id: Option<&str>, callback: EventCallback) {
        self.subs.lock().push(EventSubscription {
            event_name: event_name.to_owned(),
            id: id.map(ToOwned::to_owned),
            callback,
        });
    }

    /// Invoke every matching handler in registration order. Returns how
    /// many handlers matched.
    pub fn dispatch(&self, event_name: &str, id: Option<&str>, value: &Value) -> usize {
        // collect first so a handler can re-register without deadlocking
        let matching: Vec<EventCallback> = {
            let subs = self.subs.lock();
            subs.iter()
                .filter(|sub| match (&sub.id, id) {
                    (Some(sub_id), Some(event_id)) => {
                        sub.event_name == event_name && sub_id == event_id
                    }
                    (None, _) => sub.event_name == event_name,
                    (Some(_), None) => false,
                })
                .map(|sub| sub.callback.clone())
                .collect()
        };
        for callback in &matching {
            callback(id, value);
        }
        matching.len()
    }

    /// Remove every subscription. Invoked on reconnect, since the
    /// backend requires re-registration.
    pub fn unsubscribe_all(&self) {
        self.subs.lock().clear();
    }

    /// Number of registered subscriptions.
    pub fn len(&self) -> usize {
        self.subs.lock().len()
    }

    /// Whether no subscriptions are registered.
    pub fn is_empty(&self) -> bool {
        self.subs.lock().is_empty()
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter_callback(counter: &Arc<AtomicUsize>) -> EventCallback {
        let counter = counter.clone();
        Arc::new(move |_id, _value| {
            let _ = counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn scoped_event_matches_both_keys() {
        let router = EventRouter::new();
        let bare = Arc::new(AtomicUsize::new(0));
        let scoped = Arc::new(AtomicUsize::new(0));
        router.subscribe("temp", None, counter_callback(&bare));
        router.subscribe("temp", Some("sensor1"), counter_callback(&scoped));

        let matched = router.dispatch("temp", Some("sensor1"), &json!(21.5));
        assert_eq!(matched, 2);
        assert_eq!(bare.load(Ordering::SeqCst), 1);
        assert_eq!(scoped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn different_id_matches_only_bare() {
        let router = EventRouter::new();
        let bare = Arc::new(AtomicUsize::new(0));
        let scoped = Arc::new(AtomicUsize::new(0));
        router.subscribe("temp", None, counter_callback(&bare));
        router.subscribe("temp", Some("sensor1"), counter_callback(&scoped));

        let matched = router.dispatch("temp", Some("sensor2"), &json!(19.0));
        assert_eq!(matched, 1);
        assert_eq!(bare.load(Ordering::SeqCst), 1);
        assert_eq!(scoped.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn event_without_id_skips_scoped_subscriptions() {
        let router = EventRouter::new();
        let scoped = Arc::new(AtomicUsize::new(0));
        router.subscribe("temp", Some("sensor1"), counter_callback(&scoped));

        assert_eq!(router.dispatch("temp", None, &json!(0)), 0);
        assert_eq!(scoped.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unmatched_event_is_noop() {
        let router = EventRouter::new();
        assert_eq!(router.dispatch("unknown", None, &json!(null)), 0);
    }

    #[test]
    fn dispatch_runs_in_registration_order() {
        let router = EventRouter::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = order.clone();
            router.subscribe(
                "tick",
                None,
                Arc::new(move |_, _| {
                    order.lock().push(tag);
                }),
            );
        }
        let _ = router.dispatch("tick", None, &json!(null));
        assert_eq!(&*order.lock(), &["first", "second", "third"]);
    }

    #[test]
    fn callback_receives_id_and_value() {
        let router = EventRouter::new();
        let seen = Arc::new(Mutex::new((None::<String>, json!(null))));
        let seen2 = seen.clone();
        router.subscribe(
            "temp",
            None,
            Arc::new(move |id, value| {
                *seen2.lock() = (id.map(ToOwned::to_owned), value.clone());
            }),
        );
        let _ = router.dispatch("temp", Some("sensor1"), &json!(22));
        let (id, value) = seen.lock().clone();
        assert_eq!(id.as_deref(), Some("sensor1"));
        assert_eq!(value, 22);
    }

    #[test]
    fn duplicate_subscriptions_all_fire() {
        let router = EventRouter::new();
        let counter = Arc::new(AtomicUsize::new(0));
        router.subscribe("temp", None, counter_callback(&counter));
        router.subscribe("temp", None, counter_callback(&counter));
        let _ = router.dispatch("temp", None, &json!(null));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_all_clears() {
        let router = EventRouter::new();
        let counter = Arc::new(AtomicUsize::new(0));
        router.subscribe("temp", None, counter_callback(&counter));
        assert_eq!(router.len(), 1);

        router.unsubscribe_all();
        assert!(router.is_empty());
        assert_eq!(router.dispatch("temp", None, &json!(null)), 0);
    }

    #[test]
    fn handler_may_subscribe_during_dispatch() {
        let router = Arc::new(EventRouter::new());
        let router2 = router.clone();
        router.subscribe(
            "boot",
            None,
            Arc::new(move |_, _| {
                router2.subscribe("late", None, Arc::new(|_, _| {}));
            }),
        );
        let _ = router.dispatch("boot", None, &json!(null));
        assert_eq!(router.len(), 2);
    }
}

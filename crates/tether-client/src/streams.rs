//! Binary stream routing keyed by stream id and sub-event.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

/// Callback invoked with the stream id, sub-event name, and blob.
pub type StreamCallback = Arc<dyn Fn(&str, &str, &Bytes) + Send + Sync>;

struct StreamSubscription {
    stream_id: String,
    /// `None` matches any event on the stream.
    stream_event: Option<String>,
    callback: StreamCallback,
}

/// Registry of stream handlers.
///
/// Same matching discipline as the event router: a subscription with
/// both stream id and event matches only that pair; a subscription with
/// only the stream id matches every event on the stream.
pub struct StreamRouter {
    subs: Mutex<Vec<StreamSubscription>>,
}

impl StreamRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self {
            subs: Mutex::new(Vec::new()),
        }
    }

    /// Register a handler for the given events on a stream. An empty
    /// event list registers a wildcard over the whole stream.
    pub fn subscribe(&self, stream_id: &str, events: &[&str], callback: StreamCallback) {
        let mut subs = self.subs.lock();
        if events.is_empty() {
            subs.push(StreamSubscription {
                stream_id: stream_id.to_owned(),
                stream_event: None,
                callback,
            });
            return;
        }
        for event in events {
            subs.push(StreamSubscription {
                stream_id: stream_id.to_owned(),
                stream_event: Some((*event).to_owned()),
                callback: callback.clone(),
            });
        }
    }

    /// Remove the subscriptions registered by a matching `subscribe`
    /// call, identified by stream id, event list, and callback identity.
    pub fn unsubscribe(&self, stream_id: &str, events: &[&str], callback: &StreamCallback) {
        let mut subs = self.subs.lock();
        subs.retain(|sub| {
            if sub.stream_id != stream_id || !Arc::ptr_eq(&sub.callback, callback) {
                return true;
            }
            match &sub.stream_event {
                None => !events.is_empty(),
                Some(event) => !events.contains(&event.as_str()),
            }
        });
    }

    /// Invoke every matching handler in registration order. Returns how
    /// many handlers matched.
    pub fn dispatch(&self, stream_id: &str, stream_event: &str, blob: &Bytes) -> usize {
        let matching: Vec<StreamCallback> = {
            let subs = self.subs.lock();
            subs.iter()
                .filter(|sub| {
                    sub.stream_id == stream_id
                        && sub
                            .stream_event
                            .as_ref()
                            .is_none_or(|event| event == stream_event)
                })
                .map(|sub| sub.callback.clone())
                .collect()
        };
        for callback in &matching {
            callback(stream_id, stream_event, blob);
        }
        matching.len()
    }

    /// Remove every subscription. Invoked on reconnect.
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

impl Default for StreamRouter {
    fn default() -> Self {
        Self::new()
    }
}

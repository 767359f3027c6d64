//! Lifecycle hooks surfaced to the embedding GUI layer.

use std::sync::Arc;

/// Callback for parameterless lifecycle transitions.
pub type LifecycleHook = Arc<dyn Fn() + Send + Sync>;
/// Callback receiving a human-readable reason or message.
pub type ReasonHook = Arc<dyn Fn(&str) + Send + Sync>;
/// Callback receiving the inbound messages-per-second rate.
pub type MpsHook = Arc<dyn Fn(u64) + Send + Sync>;

/// Optional callbacks fired on connection lifecycle transitions.
///
/// All hooks run on the client's own tasks; keep them short and
/// non-blocking. State transitions are also published through
/// [`crate::Client::watch_state`] for collaborators that prefer a
/// stream over callbacks.
#[derive(Clone, Default)]
pub struct ClientHooks {
    /// Transport established (fires on every reconnect too).
    pub on_open: Option<LifecycleHook>,
    /// Transport closed, with the closing reason.
    pub on_close: Option<ReasonHook>,
    /// Authentication accepted.
    pub on_authenticate: Option<LifecycleHook>,
    /// Authentication rejected, with the backend's message.
    pub on_authenticate_failed: Option<ReasonHook>,
    /// Authentication exchange started.
    pub on_authenticate_start: Option<LifecycleHook>,
    /// Session ended via logoff.
    pub on_log_off: Option<LifecycleHook>,
    /// Inbound message rate, reported once per second.
    pub on_mps: Option<MpsHook>,
}

impl ClientHooks {
    /// Hooks with nothing registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the open hook.
    #[must_use]
    pub fn with_on_open(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_open = Some(Arc::new(f));
        self
    }

    /// Set the close hook.
    #[must_use]
    pub fn with_on_close(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(f));
        self
    }

    /// Set the authenticated hook.
    #[must_use]
    pub fn with_on_authenticate(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_authenticate = Some(Arc::new(f));
        self
    }

    /// Set the authentication-failed hook.
    #[must_use]
    pub fn with_on_authenticate_failed(
        mut self,
        f: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.on_authenticate_failed = Some(Arc::new(f));
        self
    }

    /// Set the authentication-started hook.
    #[must_use]
    pub fn with_on_authenticate_start(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_authenticate_start = Some(Arc::new(f));
        self
    }

    /// Set the logoff hook.
    #[must_use]
    pub fn with_on_log_off(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_log_off = Some(Arc::new(f));
        self
    }

    /// Set the message-rate hook.
    #[must_use]
    pub fn with_on_mps(mut self, f: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.on_mps = Some(Arc::new(f));
        self
    }
}

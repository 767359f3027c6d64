//! Client facade owning the connection, correlator, and routers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use tether_core::{Frame, FrameError, codec};
use tether_settings::ClientSettings;

use crate::commands::{CommandCallback, CommandRouter};
use crate::connection::{self, Outbound};
use crate::correlator::RpcCorrelator;
use crate::errors::ClientError;
use crate::events::{EventCallback, EventRouter};
use crate::hooks::ClientHooks;
use crate::state::ConnectionState;
use crate::streams::{StreamCallback, StreamRouter};

/// How long the authenticate exchange may take before it times out.
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared state behind the [`Client`] facade. The supervisor, writer,
/// and sweep tasks all hold an `Arc` of this.
pub(crate) struct ClientInner {
    pub(crate) settings: ClientSettings,
    pub(crate) hooks: ClientHooks,
    pub(crate) correlator: RpcCorrelator,
    pub(crate) events: EventRouter,
    pub(crate) streams: StreamRouter,
    pub(crate) commands: CommandRouter,
    pub(crate) supervisor_active: AtomicBool,
    state_tx: watch::Sender<ConnectionState>,
    session_id: Mutex<Option<String>>,
    writer: Mutex<Option<mpsc::Sender<Outbound>>>,
    inbound_count: AtomicU64,
}

impl ClientInner {
    pub(crate) fn ws_url(&self) -> Result<String, ClientError> {
        let address = self.settings.connection.address.trim();
        if address.is_empty() {
            return Err(ClientError::InvalidAddress("empty address".into()));
        }
        Ok(format!("{}://{address}", self.settings.connection.protocol))
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        if self.state() != state {
            debug!(%state, "connection state");
            let _ = self.state_tx.send_replace(state);
        }
    }

    /// Transport established: reset every subscription table (the
    /// backend requires re-registration after reconnect), clear the
    /// session, publish Open, and fire the open hook.
    pub(crate) fn on_transport_open(&self) {
        self.events.unsubscribe_all();
        self.streams.unsubscribe_all();
        self.commands.unsubscribe_all();
        *self.session_id.lock() = None;
        self.set_state(ConnectionState::Open);
        if let Some(hook) = &self.hooks.on_open {
            hook();
        }
    }

    /// Transport gone: publish the follow-up state and fire the close
    /// hook with the reason.
    pub(crate) fn on_transport_closed(&self, reason: &str, next: ConnectionState) {
        self.set_state(next);
        if let Some(hook) = &self.hooks.on_close {
            hook(reason);
        }
    }

    pub(crate) fn install_writer(&self, tx: mpsc::Sender<Outbound>) {
        *self.writer.lock() = Some(tx);
    }

    pub(crate) fn remove_writer(&self) {
        let _ = self.writer.lock().take();
    }

    pub(crate) fn note_inbound(&self) {
        let _ = self.inbound_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn session_id(&self) -> Option<String> {
        self.session_id.lock().clone()
    }

    fn set_session(&self, session_id: Option<String>) {
        *self.session_id.lock() = session_id;
    }

    fn send_frame(&self, frame: &Frame) -> Result<(), ClientError> {
        if !self.state().is_writable() {
            return Err(ClientError::NotConnected);
        }
        let text = serde_json::to_string(frame).map_err(FrameError::from)?;
        self.send_outbound(Outbound::Text(text))
    }

    fn send_outbound(&self, outbound: Outbound) -> Result<(), ClientError> {
        let writer = self.writer.lock();
        let Some(tx) = writer.as_ref() else {
            return Err(ClientError::NotConnected);
        };
        tx.try_send(outbound).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => ClientError::Transport("send queue full".into()),
            mpsc::error::TrySendError::Closed(_) => ClientError::NotConnected,
        })
    }
}

/// The transport client: one persistent connection to the device
/// backend, multiplexing commands, queries, events, and binary streams.
///
/// Construction requires a tokio runtime — the timeout sweep runs as a
/// background task from the start. Dropping the client cancels every
/// task it spawned.
pub struct Client {
    inner: Arc<ClientInner>,
    root_cancel: CancellationToken,
    supervisor: Mutex<Option<CancellationToken>>,
}

impl Client {
    /// Create a client with no hooks. Connects immediately when
    /// `connection.auto_connect` is set.
    pub fn new(settings: ClientSettings) -> Self {
        Self::with_hooks(settings, ClientHooks::default())
    }

    /// Create a client with lifecycle hooks.
    pub fn with_hooks(settings: ClientSettings, hooks: ClientHooks) -> Self {
        let (state_tx, _state_rx) = watch::channel(ConnectionState::Disconnected);
        let inner = Arc::new(ClientInner {
            settings,
            hooks,
            correlator: RpcCorrelator::new(),
            events: EventRouter::new(),
            streams: StreamRouter::new(),
            commands: CommandRouter::new(),
            supervisor_active: AtomicBool::new(false),
            state_tx,
            session_id: Mutex::new(None),
            writer: Mutex::new(None),
            inbound_count: AtomicU64::new(0),
        });
        let root_cancel = CancellationToken::new();
        spawn_background(inner.clone(), root_cancel.child_token());

        let client = Self {
            inner,
            root_cancel,
            supervisor: Mutex::new(None),
        };
        if client.inner.settings.connection.auto_connect {
            client.connect();
        }
        client
    }

    /// Start (or restart) the connection supervisor. No-op while a
    /// supervisor is already running.
    pub fn connect(&self) {
        let mut supervisor = self.supervisor.lock();
        if self.inner.supervisor_active.load(Ordering::SeqCst) {
            debug!("connect ignored, supervisor already running");
            return;
        }
        let token = self.root_cancel.child_token();
        *supervisor = Some(token.clone());
        self.inner.supervisor_active.store(true, Ordering::SeqCst);
        let _ = tokio::spawn(connection::run(self.inner.clone(), token));
    }

    /// Close the connection and stop reconnecting. Idempotent, and safe
    /// to call from inside a handler — it only signals cancellation.
    pub fn disconnect(&self) {
        if let Some(token) = self.supervisor.lock().take() {
            token.cancel();
        }
        if !self.inner.supervisor_active.load(Ordering::SeqCst) {
            self.inner.set_state(ConnectionState::Closed);
        }
    }

    /// Authenticate against the backend. On success the state moves to
    /// `Authenticated` and the session id is recorded; on rejection the
    /// connection stays open anonymous.
    pub async fn authenticate(
        &self,
        user_name: &str,
        password: &str,
    ) -> Result<(), ClientError> {
        if !self.inner.state().is_writable() {
            return Err(ClientError::NotConnected);
        }
        if let Some(hook) = &self.inner.hooks.on_authenticate_start {
            hook();
        }
        let mut args = vec![json!(user_name), json!(password)];
        if let Some(token) = &self.inner.settings.auth.api_token {
            args.push(json!(token));
        }

        let (id, rx) = self.inner.correlator.register(Some(AUTH_TIMEOUT));
        if let Err(err) = self
            .inner
            .send_frame(&Frame::query(id.clone(), "authenticate", args))
        {
            self.inner.correlator.abandon(&id);
            return Err(err);
        }
        self.inner.set_state(ConnectionState::Authenticating);

        let payload = match rx.await {
            Ok(Ok(payload)) => payload,
            Ok(Err(err)) => return Err(self.auth_failed(&err.to_string(), err)),
            Err(_) => {
                let err = ClientError::ConnectionLost;
                return Err(self.auth_failed(&err.to_string(), err));
            }
        };

        if payload
            .get("authenticated")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            self.inner.set_session(
                payload
                    .get("sessionId")
                    .and_then(Value::as_str)
                    .map(ToOwned::to_owned),
            );
            self.inner.set_state(ConnectionState::Authenticated);
            if let Some(hook) = &self.inner.hooks.on_authenticate {
                hook();
            }
            Ok(())
        } else {
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("credentials rejected")
                .to_owned();
            Err(self.auth_failed(
                &message,
                ClientError::AuthenticationFailed { message: message.clone() },
            ))
        }
    }

    /// Drop back to Open (if still connected) and fire the failure hook.
    fn auth_failed(&self, message: &str, err: ClientError) -> ClientError {
        if self.inner.state() == ConnectionState::Authenticating {
            self.inner.set_state(ConnectionState::Open);
        }
        if let Some(hook) = &self.inner.hooks.on_authenticate_failed {
            hook(message);
        }
        err
    }

    /// End the authenticated session, staying connected anonymously.
    pub fn logoff(&self) -> Result<(), ClientError> {
        self.send_command("logoff", vec![])?;
        self.inner.set_session(None);
        if self.inner.state() == ConnectionState::Authenticated {
            self.inner.set_state(ConnectionState::Open);
        }
        if let Some(hook) = &self.inner.hooks.on_log_off {
            hook();
        }
        Ok(())
    }

    /// Send a fire-and-forget command to the backend.
    pub fn send_command(&self, name: &str, args: Vec<Value>) -> Result<(), ClientError> {
        self.inner.send_frame(&Frame::command(name, args))
    }

    /// Issue a query and await its response.
    ///
    /// With a timeout the call resolves `Err(CallTimeout)` once the
    /// sweep notices the deadline passed; without one it waits until a
    /// response arrives or the connection is lost. When not connected,
    /// fails immediately without minting an id.
    pub async fn send_query(
        &self,
        name: &str,
        args: Vec<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, ClientError> {
        if !self.inner.state().is_writable() {
            return Err(ClientError::NotConnected);
        }
        let timeout = timeout.or_else(|| {
            self.inner
                .settings
                .rpc
                .default_timeout_ms
                .map(Duration::from_millis)
        });
        let (id, rx) = self.inner.correlator.register(timeout);
        if let Err(err) = self.inner.send_frame(&Frame::query(id.clone(), name, args)) {
            self.inner.correlator.abandon(&id);
            return Err(err);
        }
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(ClientError::ConnectionLost),
        }
    }

    /// Register a handler for backend-initiated commands.
    pub fn add_command_handler(&self, name: &str, callback: CommandCallback) {
        self.inner.commands.subscribe(name, callback);
    }

    /// Register an event handler, optionally scoped to a component id.
    pub fn add_event_handler(
        &self,
        event_name: &str,
        id: Option<&str>,
        callback: EventCallback,
    ) {
        self.inner.events.subscribe(event_name, id, callback);
    }

    /// Register a stream handler for the given events (empty = all
    /// events on the stream).
    pub fn add_stream_handler(&self, stream_id: &str, events: &[&str], callback: StreamCallback) {
        self.inner.streams.subscribe(stream_id, events, callback);
    }

    /// Remove a previously registered stream handler.
    pub fn remove_stream_handler(
        &self,
        stream_id: &str,
        events: &[&str],
        callback: &StreamCallback,
    ) {
        self.inner.streams.unsubscribe(stream_id, events, callback);
    }

    /// Emit an event to the backend.
    pub fn trigger_event(
        &self,
        event_name: &str,
        id: Option<&str>,
        args: Vec<Value>,
    ) -> Result<(), ClientError> {
        self.inner.send_frame(&Frame::event(event_name, id, args))
    }

    /// Send a blob on a stream as a binary message.
    pub fn stream_data(
        &self,
        stream_id: &str,
        stream_event: &str,
        blob: &[u8],
    ) -> Result<(), ClientError> {
        if !self.inner.state().is_writable() {
            return Err(ClientError::NotConnected);
        }
        let data = codec::encode(&Frame::stream(stream_id, stream_event), blob)?;
        self.inner.send_outbound(Outbound::Binary(data))
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Watch connection-state transitions without polling.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Session id assigned by the backend after authentication.
    pub fn session_id(&self) -> Option<String> {
        self.inner.session_id()
    }

    /// Number of calls currently awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.inner.correlator.outstanding()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.root_cancel.cancel();
    }
}

/// Background task: pending-call timeout sweep plus the once-per-second
/// message-rate report.
fn spawn_background(inner: Arc<ClientInner>, cancel: CancellationToken) {
    let sweep_every = Duration::from_millis(inner.settings.rpc.sweep_interval_ms.max(1));
    let _ = tokio::spawn(async move {
        let mut sweep = tokio::time::interval(sweep_every);
        let mut rate = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = sweep.tick() => {
                    let expired = inner.correlator.sweep();
                    if expired > 0 {
                        debug!(expired, "expired pending calls");
                    }
                }
                _ = rate.tick() => {
                    let count = inner.inbound_count.swap(0, Ordering::Relaxed);
                    if let Some(hook) = &inner.hooks.on_mps {
                        hook(count);
                    }
                }
                () = cancel.cancelled() => break,
            }
        }
    });
}

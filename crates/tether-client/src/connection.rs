//! Connection supervision: dialing, the read loop, the writer task, and
//! fixed-delay reconnection.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tether_core::{Frame, InboundMessage, codec};

use crate::client::ClientInner;
use crate::state::ConnectionState;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Messages accepted by the writer task.
#[derive(Debug)]
pub(crate) enum Outbound {
    Text(String),
    Binary(Bytes),
    Pong(Bytes),
}

const OUTBOUND_QUEUE: usize = 64;

/// Why the read loop ended.
enum CloseReason {
    Cancelled,
    Remote,
    Transport(String),
}

impl CloseReason {
    fn as_str(&self) -> &str {
        match self {
            Self::Cancelled => "disconnected by client",
            Self::Remote => "closed by backend",
            Self::Transport(message) => message,
        }
    }
}

/// Supervise the connection until cancelled: dial, serve, and — unless
/// reconnect is disabled — retry after the fixed delay, forever.
pub(crate) async fn run(inner: Arc<ClientInner>, cancel: CancellationToken) {
    supervise(&inner, &cancel).await;
    inner.supervisor_active.store(false, Ordering::SeqCst);
}

async fn supervise(inner: &Arc<ClientInner>, cancel: &CancellationToken) {
    let url = match inner.ws_url() {
        Ok(url) => url,
        Err(err) => {
            warn!(error = %err, "cannot build backend URL");
            inner.set_state(ConnectionState::Closed);
            return;
        }
    };
    let delay = Duration::from_millis(inner.settings.connection.reconnect_delay_ms);

    loop {
        inner.set_state(ConnectionState::Connecting);
        debug!(url, "dialing backend");
        let attempt = tokio::select! {
            result = connect_async(url.as_str()) => result,
            () = cancel.cancelled() => {
                inner.set_state(ConnectionState::Closed);
                return;
            }
        };

        match attempt {
            Ok((socket, _response)) => {
                info!(url, "connected");
                let (sink, stream) = socket.split();
                let (out_tx, out_rx) = mpsc::channel(OUTBOUND_QUEUE);
                inner.install_writer(out_tx.clone());
                let writer = tokio::spawn(write_loop(sink, out_rx));
                inner.on_transport_open();

                let reason = read_loop(inner, stream, &out_tx, cancel).await;

                inner.remove_writer();
                drop(out_tx);
                let _ = writer.await;

                let flushed = inner.correlator.flush();
                if flushed > 0 {
                    debug!(flushed, "flushed pending calls on connection loss");
                }
                if matches!(reason, CloseReason::Cancelled) {
                    inner.on_transport_closed(reason.as_str(), ConnectionState::Closed);
                    return;
                }
                inner.on_transport_closed(reason.as_str(), ConnectionState::Disconnected);
            }
            Err(err) => {
                warn!(error = %err, "connect failed");
                inner.on_transport_closed(&err.to_string(), ConnectionState::Disconnected);
            }
        }

        if cancel.is_cancelled() {
            inner.set_state(ConnectionState::Closed);
            return;
        }
        if !inner.settings.connection.reconnect_enabled {
            debug!("reconnect disabled, supervisor exiting");
            return;
        }
        debug!(?delay, "reconnecting after delay");
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = cancel.cancelled() => {
                inner.set_state(ConnectionState::Closed);
                return;
            }
        }
    }
}

/// Read frames until the transport ends. Every frame is fully dispatched
/// before the next is read, so no two handlers ever run concurrently.
async fn read_loop(
    inner: &Arc<ClientInner>,
    mut stream: SplitStream<WsStream>,
    out_tx: &mpsc::Sender<Outbound>,
    cancel: &CancellationToken,
) -> CloseReason {
    loop {
        let message = tokio::select! {
            message = stream.next() => message,
            () = cancel.cancelled() => return CloseReason::Cancelled,
        };
        match message {
            Some(Ok(Message::Text(text))) => {
                inner.note_inbound();
                dispatch_text(inner, text.as_str());
            }
            Some(Ok(Message::Binary(data))) => {
                inner.note_inbound();
                dispatch_binary(inner, &data);
            }
            Some(Ok(Message::Ping(payload))) => {
                let _ = out_tx.try_send(Outbound::Pong(payload));
            }
            Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
            Some(Ok(Message::Close(_))) | None => return CloseReason::Remote,
            Some(Err(err)) => return CloseReason::Transport(err.to_string()),
        }
    }
}

fn dispatch_text(inner: &ClientInner, raw: &str) {
    let frame: Frame = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(error = %err, "dropping malformed frame");
            return;
        }
    };
    route(inner, frame, None);
}

fn dispatch_binary(inner: &ClientInner, data: &[u8]) {
    match codec::decode(data) {
        Ok((frame, blob)) => route(inner, frame, Some(blob)),
        Err(err) => warn!(error = %err, "dropping malformed binary frame"),
    }
}

fn route(inner: &ClientInner, frame: Frame, blob: Option<Bytes>) {
    let Some(message) = InboundMessage::classify(frame, blob) else {
        debug!("dropping unclassifiable frame");
        return;
    };
    match message {
        InboundMessage::Response { id, payload } => {
            if !inner.correlator.resolve(&id, payload) {
                debug!(id, "dropping response with unknown id");
            }
        }
        InboundMessage::Event {
            event_name,
            id,
            args,
        } => {
            let value = args.into_iter().next().unwrap_or(serde_json::Value::Null);
            let _ = inner.events.dispatch(&event_name, id.as_deref(), &value);
        }
        InboundMessage::Stream {
            stream_id,
            stream_event,
            blob,
        } => {
            let _ = inner.streams.dispatch(&stream_id, &stream_event, &blob);
        }
        InboundMessage::Command { name, args } => {
            let _ = inner.commands.dispatch(&name, &args);
        }
    }
}

/// Forward outbound messages from the channel to the socket. Exits when
/// every sender is dropped or the socket rejects a write.
async fn write_loop(mut sink: SplitSink<WsStream, Message>, mut rx: mpsc::Receiver<Outbound>) {
    while let Some(outbound) = rx.recv().await {
        let message = match outbound {
            Outbound::Text(text) => Message::Text(text.into()),
            Outbound::Binary(data) => Message::Binary(data),
            Outbound::Pong(payload) => Message::Pong(payload),
        };
        if sink.send(message).await.is_err() {
            break;
        }
    }
    let _ = sink.close().await;
}

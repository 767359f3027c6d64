//! Classification of inbound frames into message kinds.

use bytes::Bytes;
use serde_json::Value;

use crate::frame::{Frame, FrameKind};

/// An inbound frame after classification. Exactly one variant per wire
/// frame; frames that fit no variant are dropped by the caller.
#[derive(Clone, Debug)]
pub enum InboundMessage {
    /// Response to an outstanding query or command.
    Response {
        /// Correlation id echoed from the request.
        id: String,
        /// Response payload (`null` when the backend sent none).
        payload: Value,
    },
    /// Unsolicited backend event.
    Event {
        /// Event name.
        event_name: String,
        /// Component id scoping the event, when present.
        id: Option<String>,
        /// Positional arguments.
        args: Vec<Value>,
    },
    /// Frame on a binary/telemetry stream.
    Stream {
        /// Stream channel id.
        stream_id: String,
        /// Sub-event name within the stream.
        stream_event: String,
        /// Opaque payload bytes (empty for header-only frames).
        blob: Bytes,
    },
    /// Backend-initiated command.
    Command {
        /// Command name.
        name: String,
        /// Positional arguments.
        args: Vec<Value>,
    },
}

impl InboundMessage {
    /// Classify a decoded frame, in priority order:
    ///
    /// 1. a `response` payload (or `kind: response`) with an id ⇒ [`Self::Response`]
    /// 2. a `streamId` ⇒ [`Self::Stream`]
    /// 3. `kind: command` with a name ⇒ [`Self::Command`]
    /// 4. a name ⇒ [`Self::Event`]
    ///
    /// Returns `None` for frames that fit no variant, including inbound
    /// query frames — the client never answers backend-initiated queries.
    pub fn classify(frame: Frame, blob: Option<Bytes>) -> Option<Self> {
        if frame.response.is_some() || frame.kind == Some(FrameKind::Response) {
            return Some(Self::Response {
                id: frame.id?,
                payload: frame.response.unwrap_or(Value::Null),
            });
        }
        if let Some(stream_id) = frame.stream_id {
            return Some(Self::Stream {
                stream_id,
                stream_event: frame.stream_event?,
                blob: blob.unwrap_or_default(),
            });
        }
        match frame.kind {
            Some(FrameKind::Command) => Some(Self::Command {
                name: frame.name?,
                args: frame.args.unwrap_or_default(),
            }),
            Some(FrameKind::Query) => None,
            _ => Some(Self::Event {
                event_name: frame.name?,
                id: frame.id,
                args: frame.args.unwrap_or_default(),
            }),
        }
    }
}

//! Wire frame schema shared with the device backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message kind marker carried on wire frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    /// Fire-and-forget directive, valid in either direction.
    Command,
    /// Request expecting a correlated response.
    Query,
    /// Unsolicited backend notification, optionally scoped to a component id.
    Event,
    /// Binary/telemetry channel frame.
    Stream,
    /// Response to an earlier query or command.
    Response,
}

/// A decoded wire frame.
///
/// Every field is optional on the wire; inbound frames are classified by
/// which fields are present (see [`crate::message::InboundMessage`]).
/// Outbound frames are built through the constructors below, which always
/// set the `kind` marker.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Frame {
    /// Correlation id on queries/responses; component id on events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Kind marker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FrameKind>,
    /// Command/query name, or event name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Positional arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<Value>>,
    /// Response payload; present only on responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    /// Stream channel id; present only on stream frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
    /// Sub-event name within the stream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_event: Option<String>,
}

impl Frame {
    /// Build an outbound command frame.
    pub fn command(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            kind: Some(FrameKind::Command),
            name: Some(name.into()),
            args: Some(args),
            ..Self::default()
        }
    }

    /// Build an outbound query frame with a correlation id.
    pub fn query(id: impl Into<String>, name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            id: Some(id.into()),
            kind: Some(FrameKind::Query),
            name: Some(name.into()),
            args: Some(args),
            ..Self::default()
        }
    }

    /// Build an event frame, optionally scoped to a component id.
    pub fn event(name: impl Into<String>, id: Option<&str>, args: Vec<Value>) -> Self {
        Self {
            id: id.map(ToOwned::to_owned),
            kind: Some(FrameKind::Event),
            name: Some(name.into()),
            args: Some(args),
            ..Self::default()
        }
    }

    /// Build a response frame echoing a correlation id.
    pub fn response(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Some(id.into()),
            kind: Some(FrameKind::Response),
            response: Some(payload),
            ..Self::default()
        }
    }

    /// Build the header frame of a binary stream message.
    pub fn stream(stream_id: impl Into<String>, stream_event: impl Into<String>) -> Self {
        Self {
            kind: Some(FrameKind::Stream),
            stream_id: Some(stream_id.into()),
            stream_event: Some(stream_event.into()),
            ..Self::default()
        }
    }
}

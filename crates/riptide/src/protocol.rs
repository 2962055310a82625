//! Wire vocabulary for the realtime protocol.
//!
//! Every frame on the wire is a JSON object with an `event` name, an
//! optional `channel`, and a `data` payload. Some server frames (notably
//! `pusher:connection_established`) carry `data` as a JSON-*encoded string*
//! rather than an object; [`Frame::data_object`] unwraps that transparently.
//!
//! Egress frames:
//!
//! | Event | Data shape |
//! |---|---|
//! | `pusher:subscribe` | `{channel, auth?, channel_data?}` |
//! | `pusher:unsubscribe` | `{channel}` |
//! | `pusher:ping` | `{}` |

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server handshake completion; carries the socket id.
pub const CONNECTION_ESTABLISHED: &str = "pusher:connection_established";
/// Server-reported protocol or application error.
pub const ERROR: &str = "pusher:error";
/// Client heartbeat probe.
pub const PING: &str = "pusher:ping";
/// Server heartbeat reply.
pub const PONG: &str = "pusher:pong";
/// Client subscription request.
pub const SUBSCRIBE: &str = "pusher:subscribe";
/// Client unsubscription request.
pub const UNSUBSCRIBE: &str = "pusher:unsubscribe";
/// Per-channel subscription acknowledgement.
pub const SUBSCRIPTION_SUCCEEDED: &str = "pusher_internal:subscription_succeeded";
/// Presence roster delta: a member joined.
pub const MEMBER_ADDED: &str = "pusher_internal:member_added";
/// Presence roster delta: a member left.
pub const MEMBER_REMOVED: &str = "pusher_internal:member_removed";

/// Event-name prefixes reserved for the protocol itself.
pub const RESERVED_EVENT_PREFIXES: [&str; 2] = ["pusher:", "pusher_internal:"];

/// Returns true when user code may not bind to the given event name.
pub fn is_reserved_event(event: &str) -> bool {
    RESERVED_EVENT_PREFIXES
        .iter()
        .any(|prefix| event.starts_with(prefix))
}

// =============================================================================
// Ingress
// =============================================================================

/// A parsed inbound frame.
#[derive(Debug, Clone, Deserialize)]
pub struct Frame {
    /// The event name.
    pub event: String,
    /// The channel the frame is addressed to, if any.
    #[serde(default)]
    pub channel: Option<String>,
    /// The payload, verbatim.
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    /// Parse a frame from raw frame text.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// The payload as a JSON value, unwrapping a string-encoded payload.
    ///
    /// Returns `Value::Null` when the payload is a string that does not
    /// itself parse as JSON.
    pub fn data_object(&self) -> Value {
        match &self.data {
            Value::String(inner) => serde_json::from_str(inner).unwrap_or(Value::Null),
            other => other.clone(),
        }
    }

    /// The payload as the JSON string handed to user event listeners.
    pub fn data_string(&self) -> String {
        match &self.data {
            Value::String(inner) => inner.clone(),
            other => other.to_string(),
        }
    }
}

/// Payload of `pusher:connection_established`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionEstablished {
    /// The opaque per-connection identifier issued by the server.
    pub socket_id: String,
    /// Server override for the activity timeout, in seconds.
    #[serde(default)]
    pub activity_timeout: Option<u64>,
}

/// Payload of `pusher:error`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorPayload {
    /// Human-readable error message.
    #[serde(default)]
    pub message: String,
    /// Numeric error code; the wire carries it as a number or a string.
    #[serde(default)]
    pub code: Option<Value>,
}

impl ErrorPayload {
    /// The error code rendered as a string, if one was supplied.
    pub fn code_string(&self) -> Option<String> {
        match &self.code {
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        }
    }
}

// =============================================================================
// Egress
// =============================================================================

#[derive(Debug, Serialize)]
struct Outbound<'a, T: Serialize> {
    event: &'a str,
    data: T,
}

#[derive(Debug, Serialize)]
struct SubscribeData<'a> {
    channel: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    auth: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel_data: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct UnsubscribeData<'a> {
    channel: &'a str,
}

fn encode<T: Serialize>(event: &str, data: T) -> String {
    serde_json::to_string(&Outbound { event, data }).expect("outbound frames always serialize")
}

/// Build a `pusher:subscribe` frame.
pub fn subscribe_frame(channel: &str, auth: Option<&str>, channel_data: Option<&str>) -> String {
    encode(
        SUBSCRIBE,
        SubscribeData {
            channel,
            auth,
            channel_data,
        },
    )
}

/// Build a `pusher:unsubscribe` frame.
pub fn unsubscribe_frame(channel: &str) -> String {
    encode(UNSUBSCRIBE, UnsubscribeData { channel })
}

/// Build a `pusher:ping` frame.
pub fn ping_frame() -> String {
    encode(PING, serde_json::Map::new())
}

//! Channel authorization.
//!
//! Private and presence channels require proof that this connection may
//! subscribe. The proof comes from an application-supplied [`Authorizer`]
//! that maps `(channel_name, socket_id)` to a token JSON of the shape
//! `{"auth": "<key>:<signature>", "channel_data": "<json-string>"}`.
//!
//! The registry invokes the authorizer on the executor immediately before
//! emitting the subscribe frame, so implementations that perform network
//! I/O block event delivery for that long. [`HttpAuthorizer`] is the stock
//! implementation posting to the application's own endpoint.

mod http;

pub use http::HttpAuthorizer;

use crate::error::AuthError;
use serde::Deserialize;
use serde_json::Value;

/// Authorizes subscriptions to private and presence channels.
pub trait Authorizer: Send + Sync {
    /// Produce the authorization token JSON for `channel_name` on the
    /// connection identified by `socket_id`.
    fn authorize(&self, channel_name: &str, socket_id: &str) -> Result<String, AuthError>;
}

impl<F> Authorizer for F
where
    F: Fn(&str, &str) -> Result<String, AuthError> + Send + Sync,
{
    fn authorize(&self, channel_name: &str, socket_id: &str) -> Result<String, AuthError> {
        self(channel_name, socket_id)
    }
}

/// A parsed authorization token.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthToken {
    /// The `<key>:<signature>` credential sent in the subscribe frame.
    pub auth: String,
    /// Presence channel user data, itself a JSON-encoded string.
    #[serde(default)]
    pub channel_data: Option<String>,
}

impl AuthToken {
    /// Parse an authorizer response body.
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        serde_json::from_str(raw).map_err(|e| AuthError::Malformed(e.to_string()))
    }

    /// The local member's `user_id` carried in `channel_data`.
    pub fn user_id(&self) -> Option<String> {
        let data = self.channel_data.as_deref()?;
        let value: Value = serde_json::from_str(data).ok()?;
        match value.get("user_id") {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        }
    }
}

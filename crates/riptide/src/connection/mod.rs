//! The connection: state machine, heartbeat policy, and listener bindings.
//!
//! A connection moves through four states:
//!
//! ```text
//! DISCONNECTED --connect()-->                      CONNECTING
//! CONNECTING   --connection_established-->         CONNECTED
//! CONNECTING   --socket close / socket error-->    DISCONNECTED
//! CONNECTED    --disconnect()-->                   DISCONNECTING
//! CONNECTED    --socket close-->                   DISCONNECTED
//! DISCONNECTING --socket close-->                  DISCONNECTED
//! ```
//!
//! Re-entering `connect()` outside `DISCONNECTED`, or `disconnect()` outside
//! `CONNECTED`, is a silent no-op. Every real transition is reported to
//! listeners bound to the new state or to [`StateFilter::All`]; error events
//! go to `All` listeners only.

pub mod heartbeat;

mod core;

pub(crate) use self::core::FrameRouter;
pub use self::core::Connection;

use std::fmt;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No transport; the only state `connect()` acts in.
    Disconnected,
    /// Transport opening; waiting for the server handshake.
    Connecting,
    /// Handshake complete; frames flow and heartbeats are policed.
    Connected,
    /// `disconnect()` was called; waiting for the transport to close.
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Disconnecting => "DISCONNECTING",
        };
        f.write_str(name)
    }
}

/// Selects which transitions a bound listener receives.
///
/// `All` is a binding filter only; it is never held as an actual state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateFilter {
    /// Match every transition (and receive error events).
    All,
    /// Match transitions whose new state equals the given state.
    State(ConnectionState),
}

impl From<ConnectionState> for StateFilter {
    fn from(state: ConnectionState) -> Self {
        StateFilter::State(state)
    }
}

/// An observed transition: the prior state and the state just entered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStateChange {
    /// The state the connection left.
    pub previous: ConnectionState,
    /// The state the connection entered.
    pub current: ConnectionState,
}

impl ConnectionStateChange {
    /// Create a transition pair.
    pub fn new(previous: ConnectionState, current: ConnectionState) -> Self {
        Self { previous, current }
    }
}

type StateChangeFn = dyn Fn(&ConnectionStateChange) + Send + Sync;
type ErrorFn =
    dyn Fn(&str, Option<&str>, Option<&(dyn std::error::Error + Send + Sync)>) + Send + Sync;

/// Callbacks for connection events.
///
/// A capability record: each slot is optional and only invoked when set.
/// Bind the same `Arc` under several filters to share one listener;
/// `unbind` removes by `Arc` identity.
///
/// ```
/// use riptide::ConnectionEvents;
/// use std::sync::Arc;
///
/// let listener = Arc::new(
///     ConnectionEvents::new()
///         .on_state_change(|change| println!("{} -> {}", change.previous, change.current))
///         .on_error(|message, code, _cause| eprintln!("{code:?}: {message}")),
/// );
/// # drop(listener);
/// ```
#[derive(Default)]
pub struct ConnectionEvents {
    state_change: Option<Box<StateChangeFn>>,
    error: Option<Box<ErrorFn>>,
}

impl ConnectionEvents {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the transition callback.
    pub fn on_state_change(
        mut self,
        callback: impl Fn(&ConnectionStateChange) + Send + Sync + 'static,
    ) -> Self {
        self.state_change = Some(Box::new(callback));
        self
    }

    /// Set the error callback: `(message, code, cause)`.
    pub fn on_error(
        mut self,
        callback: impl Fn(&str, Option<&str>, Option<&(dyn std::error::Error + Send + Sync)>)
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.error = Some(Box::new(callback));
        self
    }

    pub(crate) fn emit_state_change(&self, change: &ConnectionStateChange) {
        if let Some(callback) = &self.state_change {
            callback(change);
        }
    }

    pub(crate) fn emit_error(
        &self,
        message: &str,
        code: Option<&str>,
        cause: Option<&(dyn std::error::Error + Send + Sync)>,
    ) {
        if let Some(callback) = &self.error {
            callback(message, code, cause);
        }
    }
}

impl fmt::Debug for ConnectionEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionEvents")
            .field("state_change", &self.state_change.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display_is_uppercase() {
        assert_eq!(ConnectionState::Disconnected.to_string(), "DISCONNECTED");
        assert_eq!(ConnectionState::Connecting.to_string(), "CONNECTING");
        assert_eq!(ConnectionState::Connected.to_string(), "CONNECTED");
        assert_eq!(ConnectionState::Disconnecting.to_string(), "DISCONNECTING");
    }

    #[test]
    fn test_state_change_equality() {
        let a = ConnectionStateChange::new(ConnectionState::Disconnected, ConnectionState::Connecting);
        let b = ConnectionStateChange::new(ConnectionState::Disconnected, ConnectionState::Connecting);
        let c = ConnectionStateChange::new(ConnectionState::Connecting, ConnectionState::Connected);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_empty_record_emits_nothing() {
        let events = ConnectionEvents::new();
        events.emit_state_change(&ConnectionStateChange::new(
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
        ));
        events.emit_error("boom", None, None);
    }
}

//! The socket seam between the connection core and a transport.
//!
//! The core consumes a full-duplex text-frame channel through
//! [`SocketAdapter`] and receives its callbacks through [`SocketObserver`].
//! A [`SocketFactory`] produces one adapter per connection attempt, so a
//! reconnecting client always starts from a fresh transport.
//!
//! Adapters are free to invoke the observer from any thread; the connection
//! core marshals every callback onto the executor before touching state.
//! The only contract an adapter must keep is that [`SocketAdapter::open`]
//! does not invoke the observer synchronously from the calling thread.

use crate::error::SocketError;
use std::sync::Arc;

/// A bidirectional text-frame channel to the server.
pub trait SocketAdapter: Send + Sync {
    /// Start the transport handshake. Completion is reported through
    /// [`SocketObserver::on_open`].
    fn open(&self);

    /// Send one text frame. An error here is reported by the caller; the
    /// adapter itself must not invoke the observer for a failed send.
    fn send(&self, text: &str) -> Result<(), SocketError>;

    /// Close the transport. The terminal [`SocketObserver::on_close`]
    /// callback arrives asynchronously.
    fn close(&self);
}

/// Inbound callbacks from a transport.
pub trait SocketObserver: Send + Sync {
    /// The transport handshake completed.
    fn on_open(&self);

    /// A text frame arrived.
    fn on_message(&self, text: &str);

    /// The transport closed. `remote` is true when the peer initiated it.
    fn on_close(&self, code: u16, reason: &str, remote: bool);

    /// The transport failed.
    fn on_error(&self, cause: SocketError);
}

/// Produces a [`SocketAdapter`] for the given endpoint URL, wired to the
/// given observer. Called once per connection attempt.
pub type SocketFactory = Arc<
    dyn Fn(&str, Arc<dyn SocketObserver>) -> Result<Box<dyn SocketAdapter>, SocketError>
        + Send
        + Sync,
>;

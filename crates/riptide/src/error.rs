//! Error types for client operations.

use thiserror::Error;

/// Boxed error carried across the socket adapter seam.
///
/// Transports wrap their library-specific failures in this type; the
/// connection core never inspects it beyond reporting it to listeners.
pub type SocketError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned synchronously from facade and channel methods.
///
/// Everything else — transport failures, server error frames, send
/// failures, authorization failures — is delivered through listener
/// callbacks on the executor and never returned from a method.
#[derive(Debug, Error)]
pub enum Error {
    /// An argument failed validation at the call site.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// The operation is not valid in the current connection state.
    #[error("invalid state: {0}")]
    State(String),
}

/// Errors produced while authorizing a private or presence subscription.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The authorization request itself failed (network, I/O, endpoint).
    #[error("authorization request failed: {0}")]
    Request(#[source] SocketError),

    /// The endpoint refused to authorize the subscription.
    #[error("authorization rejected: {0}")]
    Rejected(String),

    /// The endpoint answered with a response the client cannot use.
    #[error("malformed authorization response: {0}")]
    Malformed(String),
}

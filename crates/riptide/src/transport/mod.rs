//! Production transports implementing the socket seam.

mod websocket;

pub use websocket::{WebSocketAdapter, websocket_factory};

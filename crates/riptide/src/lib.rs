//! # Riptide - realtime pub/sub client
//!
//! Riptide is a client for hosted publish/subscribe realtime messaging
//! services speaking the Pusher wire protocol: JSON events delivered over a
//! persistent full-duplex websocket, multiplexed into named channels.
//!
//! # Overview
//!
//! - **[`Client`]** — the facade: connect, disconnect, subscribe,
//!   unsubscribe. Contains no protocol logic of its own.
//! - **Connection** — a heartbeat-policed state machine
//!   (`DISCONNECTED → CONNECTING → CONNECTED → DISCONNECTING`) over an
//!   abstract socket, reporting transitions and errors to bound listeners.
//! - **Channels** — public, private (authorized), and presence (authorized
//!   plus a member roster), each holding per-event listener bindings.
//! - **Executor** — all state changes and callbacks run serially on a
//!   single logical event queue; the host can supply its own.
//!
//! # Quick start
//!
//! ```no_run
//! use riptide::{ChannelEvents, Client, ClientOptions, ConnectionEvents};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), riptide::Error> {
//! let client = Client::new("your-app-key", ClientOptions::new().cluster("eu"))?;
//!
//! client.connect_with(
//!     Some(Arc::new(ConnectionEvents::new().on_state_change(|change| {
//!         println!("{} -> {}", change.previous, change.current);
//!     }))),
//!     &[],
//! )?;
//!
//! let listener = Arc::new(ChannelEvents::new().on_event(|event, data| {
//!     println!("{event}: {data}");
//! }));
//! client.subscribe_with("my-channel", Some(listener), &["my-event"])?;
//! # Ok(())
//! # }
//! ```
//!
//! # Private and presence channels
//!
//! Subscriptions to `private-` and `presence-` channels need an
//! [`Authorizer`] proving to the server that this connection may join.
//! [`HttpAuthorizer`] posts `(socket_id, channel_name)` to your
//! application's auth endpoint; any `Fn(&str, &str) -> Result<String,
//! AuthError>` works too.
//!
//! # Testing
//!
//! Construction is seam-injected: [`Client::with_parts`] accepts the
//! executor, clock, and socket factory, and [`testing`] ships in-memory
//! doubles that make the whole client synchronous and deterministic.

#![warn(missing_docs)]

pub mod auth;
pub mod channel;
pub mod connection;
pub mod error;
pub mod executor;
pub mod options;
pub mod protocol;
pub mod socket;
pub mod testing;
pub mod transport;

mod client;

pub use auth::{AuthToken, Authorizer, HttpAuthorizer};
pub use channel::{Channel, ChannelEvents, ChannelState, ChannelVariant, Member};
pub use client::Client;
pub use connection::heartbeat::{Clock, SystemClock};
pub use connection::{ConnectionEvents, ConnectionState, ConnectionStateChange, StateFilter};
pub use error::{AuthError, Error, SocketError};
pub use executor::{EventQueue, Executor, InlineExecutor};
pub use options::ClientOptions;

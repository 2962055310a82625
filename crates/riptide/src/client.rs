//! The client facade.

use crate::channel::registry::ChannelRegistry;
use crate::channel::{Channel, ChannelEvents, ChannelVariant};
use crate::connection::heartbeat::{
    Clock, DEFAULT_ACTIVITY_TIMEOUT, DEFAULT_PONG_TIMEOUT, SystemClock,
};
use crate::connection::{Connection, ConnectionEvents, ConnectionState, StateFilter};
use crate::error::Error;
use crate::executor::{EventQueue, Executor};
use crate::options::ClientOptions;
use crate::socket::SocketFactory;
use crate::transport;
use std::sync::Arc;

/// The entry point for the realtime client.
///
/// A `Client` wires a connection to a channel registry and validates
/// arguments; all protocol logic lives below it. Its methods may be called
/// from any thread: operations are submitted to the executor, and every
/// listener callback runs there too.
///
/// ```no_run
/// use riptide::{Client, ClientOptions, ChannelEvents, ConnectionEvents};
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), riptide::Error> {
/// let client = Client::new("a1b2c3", ClientOptions::new().cluster("eu"))?;
/// client.connect_with(
///     Some(Arc::new(ConnectionEvents::new().on_state_change(|change| {
///         println!("connection: {} -> {}", change.previous, change.current);
///     }))),
///     &[],
/// )?;
///
/// let listener = Arc::new(ChannelEvents::new().on_event(|event, data| {
///     println!("{event}: {data}");
/// }));
/// client.subscribe_with("my-channel", Some(listener), &["my-event"])?;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    connection: Arc<Connection>,
    registry: Arc<ChannelRegistry>,
}

impl Client {
    /// Create a client with the production executor and websocket
    /// transport.
    ///
    /// Fails when `api_key` is empty.
    pub fn new(api_key: &str, options: ClientOptions) -> Result<Self, Error> {
        Self::with_parts(
            api_key,
            options,
            Arc::new(EventQueue::new()),
            Arc::new(SystemClock),
            transport::websocket_factory(),
        )
    }

    /// Create a client from explicit parts.
    ///
    /// This is the seam tests use to substitute an inline executor, a
    /// manual clock, and an in-memory socket; see [`crate::testing`].
    pub fn with_parts(
        api_key: &str,
        options: ClientOptions,
        executor: Arc<dyn Executor>,
        clock: Arc<dyn Clock>,
        socket_factory: SocketFactory,
    ) -> Result<Self, Error> {
        if api_key.is_empty() {
            return Err(Error::Argument("api key cannot be empty".into()));
        }

        let connection = Connection::new(
            options.endpoint(api_key),
            DEFAULT_ACTIVITY_TIMEOUT,
            DEFAULT_PONG_TIMEOUT,
            executor.clone(),
            clock,
            socket_factory,
        );
        let registry = ChannelRegistry::new(executor, options.authorizer.clone());
        registry.set_connection(Arc::downgrade(&connection));
        connection.set_router(registry.clone());

        Ok(Self {
            connection,
            registry,
        })
    }

    // -------------------------------------------------------------------------
    // Connection
    // -------------------------------------------------------------------------

    /// Open the connection. Ignored unless currently `DISCONNECTED`.
    pub fn connect(&self) {
        self.connection.connect();
    }

    /// Bind a listener, then connect.
    ///
    /// With no states given the listener is bound to every transition (and
    /// error events). Passing states without a listener is an error.
    pub fn connect_with(
        &self,
        listener: Option<Arc<ConnectionEvents>>,
        states: &[ConnectionState],
    ) -> Result<(), Error> {
        match listener {
            Some(listener) => {
                if states.is_empty() {
                    self.connection.bind(StateFilter::All, listener);
                } else {
                    for state in states {
                        self.connection.bind(*state, listener.clone());
                    }
                }
            }
            None => {
                if !states.is_empty() {
                    return Err(Error::Argument(
                        "cannot bind connection states without a listener".into(),
                    ));
                }
            }
        }
        self.connection.connect();
        Ok(())
    }

    /// Close the connection. Ignored unless currently `CONNECTED`.
    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    /// Bind a connection listener under the given filter.
    pub fn bind(&self, filter: impl Into<StateFilter>, listener: Arc<ConnectionEvents>) {
        self.connection.bind(filter, listener);
    }

    /// Remove a connection listener. Returns whether anything was removed.
    pub fn unbind(&self, filter: impl Into<StateFilter>, listener: &Arc<ConnectionEvents>) -> bool {
        self.connection.unbind(filter, listener)
    }

    /// The current connection state.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// The socket id issued by the server, while connected.
    pub fn socket_id(&self) -> Option<String> {
        self.connection.socket_id()
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    /// Subscribe to a public channel.
    pub fn subscribe(&self, channel_name: &str) -> Result<Channel, Error> {
        self.subscribe_with(channel_name, None, &[])
    }

    /// Subscribe to a public channel, binding `listener` to the given event
    /// names (or to the whole channel when none are given).
    pub fn subscribe_with(
        &self,
        channel_name: &str,
        listener: Option<Arc<ChannelEvents>>,
        event_names: &[&str],
    ) -> Result<Channel, Error> {
        self.registry
            .subscribe(ChannelVariant::Public, channel_name, listener, event_names)
    }

    /// Subscribe to a private channel. Requires an authorizer.
    pub fn subscribe_private(&self, channel_name: &str) -> Result<Channel, Error> {
        self.subscribe_private_with(channel_name, None, &[])
    }

    /// Subscribe to a private channel with a listener. Requires an
    /// authorizer.
    pub fn subscribe_private_with(
        &self,
        channel_name: &str,
        listener: Option<Arc<ChannelEvents>>,
        event_names: &[&str],
    ) -> Result<Channel, Error> {
        self.require_authorizer()?;
        self.registry
            .subscribe(ChannelVariant::Private, channel_name, listener, event_names)
    }

    /// Subscribe to a presence channel. Requires an authorizer.
    pub fn subscribe_presence(&self, channel_name: &str) -> Result<Channel, Error> {
        self.subscribe_presence_with(channel_name, None, &[])
    }

    /// Subscribe to a presence channel with a listener. Requires an
    /// authorizer.
    pub fn subscribe_presence_with(
        &self,
        channel_name: &str,
        listener: Option<Arc<ChannelEvents>>,
        event_names: &[&str],
    ) -> Result<Channel, Error> {
        self.require_authorizer()?;
        self.registry
            .subscribe(ChannelVariant::Presence, channel_name, listener, event_names)
    }

    /// Subscribe to a presence channel that is kept across reconnects.
    ///
    /// Every subscription is restored on reconnect, so this currently
    /// behaves exactly like [`subscribe_presence`](Self::subscribe_presence).
    pub fn subscribe_permanent(&self, channel_name: &str) -> Result<Channel, Error> {
        self.subscribe_permanent_with(channel_name, None, &[])
    }

    /// Subscribe to a presence channel that is kept across reconnects, with
    /// a listener.
    pub fn subscribe_permanent_with(
        &self,
        channel_name: &str,
        listener: Option<Arc<ChannelEvents>>,
        event_names: &[&str],
    ) -> Result<Channel, Error> {
        self.subscribe_presence_with(channel_name, listener, event_names)
    }

    /// Unsubscribe from a channel by name. Requires the connection to be
    /// `CONNECTED`.
    pub fn unsubscribe(&self, channel_name: &str) -> Result<(), Error> {
        self.registry.unsubscribe(channel_name)
    }

    /// Look up an active subscription by name.
    pub fn channel(&self, channel_name: &str) -> Option<Channel> {
        self.registry.channel(channel_name)
    }

    fn require_authorizer(&self) -> Result<(), Error> {
        if !self.registry.has_authorizer() {
            return Err(Error::State(
                "cannot subscribe to a private or presence channel because no authorizer \
                 has been set; configure one on ClientOptions"
                    .into(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state())
            .field("socket_id", &self.socket_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use crate::executor::InlineExecutor;
    use crate::testing::TestSocket;

    fn test_client(options: ClientOptions) -> (Client, TestSocket) {
        let socket = TestSocket::new();
        let client = Client::with_parts(
            "a1b2c3",
            options,
            Arc::new(InlineExecutor),
            Arc::new(SystemClock),
            socket.factory(),
        )
        .unwrap();
        (client, socket)
    }

    #[test]
    fn test_empty_api_key_is_rejected() {
        assert!(matches!(
            Client::with_parts(
                "",
                ClientOptions::new(),
                Arc::new(InlineExecutor),
                Arc::new(SystemClock),
                TestSocket::new().factory(),
            ),
            Err(Error::Argument(_))
        ));
    }

    #[test]
    fn test_connect_with_states_requires_listener() {
        let (client, _socket) = test_client(ClientOptions::new());
        assert!(matches!(
            client.connect_with(None, &[ConnectionState::Connected]),
            Err(Error::Argument(_))
        ));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_private_subscription_requires_authorizer() {
        let (client, _socket) = test_client(ClientOptions::new());
        assert!(matches!(
            client.subscribe_private("private-room"),
            Err(Error::State(_))
        ));
        assert!(matches!(
            client.subscribe_presence("presence-room"),
            Err(Error::State(_))
        ));
        assert!(matches!(
            client.subscribe_permanent("presence-room"),
            Err(Error::State(_))
        ));
    }

    #[test]
    fn test_subscribe_permanent_delegates_to_presence() {
        let authorizer: Arc<dyn crate::auth::Authorizer> = Arc::new(
            |_channel: &str, _socket_id: &str| -> Result<String, AuthError> {
                Ok("{\"auth\":\"key:sig\",\"channel_data\":\"{\\\"user_id\\\":\\\"u1\\\"}\"}"
                    .to_string())
            },
        );
        let (client, _socket) = test_client(ClientOptions::new().authorizer(authorizer));

        let channel = client.subscribe_permanent("presence-room").unwrap();
        assert_eq!(channel.variant(), crate::channel::ChannelVariant::Presence);
        assert!(client.channel("presence-room").is_some());
    }

    #[test]
    fn test_facade_wires_connection_and_registry() {
        let (client, socket) = test_client(ClientOptions::new());
        client.connect();
        socket.deliver(
            "{\"event\":\"pusher:connection_established\",\"data\":\"{\\\"socket_id\\\":\\\"1.1\\\"}\"}",
        );

        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(client.socket_id().as_deref(), Some("1.1"));

        client.subscribe("my-channel").unwrap();
        assert_eq!(socket.sent().len(), 1);
        client.unsubscribe("my-channel").unwrap();
        assert!(client.channel("my-channel").is_none());
    }
}

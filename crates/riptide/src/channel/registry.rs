//! The channel registry: owns every subscription and keeps it consistent
//! with the connection's state.
//!
//! The registry is the sole emitter of subscribe/unsubscribe frames. A
//! subscribe requested while the connection is not `CONNECTED` is queued
//! and replayed, in insertion order, when the connection next reaches
//! `CONNECTED`. When the connection drops, surviving subscriptions fall
//! back to `UNSUBSCRIBED` and rejoin the queue so a reconnect restores
//! them.
//!
//! Channel-name rules are centralized here: `private-` names only subscribe
//! through the private path, `presence-` names only through the presence
//! path, and everything else only through the public path.

use super::{Channel, ChannelEvents, ChannelState, ChannelVariant};
use crate::auth::{AuthToken, Authorizer};
use crate::connection::{Connection, ConnectionState, FrameRouter};
use crate::error::{AuthError, Error};
use crate::executor::Executor;
use crate::protocol::{self, Frame};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

const PRIVATE_PREFIX: &str = "private-";
const PRESENCE_PREFIX: &str = "presence-";

#[derive(Default)]
struct RegistryState {
    channels: HashMap<String, Channel>,
    /// Channel names in subscription order; replay preserves this order.
    order: Vec<String>,
    /// Names whose subscribe frame is owed on the next `CONNECTED`.
    pending: HashSet<String>,
}

/// Owns all channels, routes inbound frames to them, and drives their
/// subscription state in response to connection transitions.
pub(crate) struct ChannelRegistry {
    executor: Arc<dyn Executor>,
    authorizer: Option<Arc<dyn Authorizer>>,
    connection: Mutex<Option<Weak<Connection>>>,
    state: Mutex<RegistryState>,
    weak_self: Weak<ChannelRegistry>,
}

impl ChannelRegistry {
    pub fn new(executor: Arc<dyn Executor>, authorizer: Option<Arc<dyn Authorizer>>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            executor,
            authorizer,
            connection: Mutex::new(None),
            state: Mutex::new(RegistryState::default()),
            weak_self: weak.clone(),
        })
    }

    pub fn set_connection(&self, connection: Weak<Connection>) {
        *self.connection.lock() = Some(connection);
    }

    pub fn has_authorizer(&self) -> bool {
        self.authorizer.is_some()
    }

    fn connection(&self) -> Option<Arc<Connection>> {
        self.connection.lock().as_ref().and_then(Weak::upgrade)
    }

    fn strong(&self) -> Arc<Self> {
        self.weak_self.upgrade().expect("registry is alive")
    }

    /// Enforce the name rules for each subscription path.
    fn validate_name(variant: ChannelVariant, name: &str) -> Result<(), Error> {
        if name.is_empty() {
            return Err(Error::Argument("channel name cannot be empty".into()));
        }
        match variant {
            ChannelVariant::Public => {
                if name.starts_with(PRIVATE_PREFIX) {
                    return Err(Error::Argument(format!(
                        "cannot subscribe to {name} as a public channel, use the private subscription path"
                    )));
                }
                if name.starts_with(PRESENCE_PREFIX) {
                    return Err(Error::Argument(format!(
                        "cannot subscribe to {name} as a public channel, use the presence subscription path"
                    )));
                }
            }
            ChannelVariant::Private => {
                if !name.starts_with(PRIVATE_PREFIX) {
                    return Err(Error::Argument(format!(
                        "private channel names must begin with {PRIVATE_PREFIX:?}, got {name}"
                    )));
                }
            }
            ChannelVariant::Presence => {
                if !name.starts_with(PRESENCE_PREFIX) {
                    return Err(Error::Argument(format!(
                        "presence channel names must begin with {PRESENCE_PREFIX:?}, got {name}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Create a channel, bind its listener, and either emit the subscribe
    /// frame (when connected) or queue it for the next connect.
    pub fn subscribe(
        &self,
        variant: ChannelVariant,
        name: &str,
        listener: Option<Arc<ChannelEvents>>,
        event_names: &[&str],
    ) -> Result<Channel, Error> {
        Self::validate_name(variant, name)?;
        if !event_names.is_empty() && listener.is_none() {
            return Err(Error::Argument(
                "cannot bind event names without a listener".into(),
            ));
        }

        let channel = Channel::new(variant, name);
        if let Some(listener) = listener {
            channel.set_listener(listener.clone(), event_names.is_empty());
            for event in event_names {
                channel.bind(event, listener.clone())?;
            }
        }

        let connected = self
            .connection()
            .map(|conn| conn.state() == ConnectionState::Connected)
            .unwrap_or(false);
        {
            let mut state = self.state.lock();
            if state.channels.contains_key(name) {
                return Err(Error::Argument(format!(
                    "already subscribed to a channel named {name}"
                )));
            }
            state.channels.insert(name.to_string(), channel.clone());
            state.order.push(name.to_string());
            if !connected {
                state.pending.insert(name.to_string());
            }
        }

        if connected {
            let registry = self.strong();
            let pending = channel.clone();
            self.executor
                .submit(Box::new(move || registry.send_subscribe(&pending)));
        }
        Ok(channel)
    }

    /// Remove a channel and emit the unsubscribe frame. Requires the
    /// connection to be `CONNECTED`.
    pub fn unsubscribe(&self, name: &str) -> Result<(), Error> {
        let connection = self
            .connection()
            .filter(|conn| conn.state() == ConnectionState::Connected)
            .ok_or_else(|| {
                Error::State(format!(
                    "cannot unsubscribe from channel {name} while not connected"
                ))
            })?;

        let channel = {
            let mut state = self.state.lock();
            let channel = state.channels.remove(name).ok_or_else(|| {
                Error::Argument(format!("not subscribed to a channel named {name}"))
            })?;
            state.order.retain(|candidate| candidate != name);
            state.pending.remove(name);
            channel
        };

        channel.set_state(ChannelState::Unsubscribed);
        connection.send(protocol::unsubscribe_frame(name));
        Ok(())
    }

    /// Look up a channel by name.
    pub fn channel(&self, name: &str) -> Option<Channel> {
        self.state.lock().channels.get(name).cloned()
    }

    /// Authorize (when needed) and emit one subscribe frame. Runs on the
    /// executor.
    fn send_subscribe(&self, channel: &Channel) {
        let Some(connection) = self.connection() else {
            return;
        };
        if connection.state() != ConnectionState::Connected {
            // The connection dropped before the frame went out; wait for
            // the next connect.
            let mut state = self.state.lock();
            if state.channels.contains_key(channel.name()) {
                state.pending.insert(channel.name().to_string());
            }
            return;
        }

        match self.build_subscribe_frame(channel, &connection) {
            Ok(frame) => {
                channel.set_state(ChannelState::SubscribeSent);
                connection.send(frame);
            }
            Err(cause) => {
                warn!(channel = %channel.name(), error = %cause, "channel authorization failed");
                channel.set_state(ChannelState::Failed);
                channel.notify_auth_failure(&cause);
            }
        }
    }

    fn build_subscribe_frame(
        &self,
        channel: &Channel,
        connection: &Arc<Connection>,
    ) -> Result<String, AuthError> {
        match channel.variant() {
            ChannelVariant::Public => Ok(protocol::subscribe_frame(channel.name(), None, None)),
            ChannelVariant::Private | ChannelVariant::Presence => {
                let authorizer = self
                    .authorizer
                    .as_ref()
                    .ok_or_else(|| AuthError::Rejected("no authorizer configured".into()))?;
                let socket_id = connection
                    .socket_id()
                    .ok_or_else(|| AuthError::Rejected("connection has no socket id".into()))?;

                let raw = authorizer.authorize(channel.name(), &socket_id)?;
                let token = AuthToken::parse(&raw)?;

                if channel.variant() == ChannelVariant::Presence {
                    let channel_data = token.channel_data.as_deref().ok_or_else(|| {
                        AuthError::Malformed(
                            "presence authorization is missing channel_data".into(),
                        )
                    })?;
                    if let Some(id) = token.user_id() {
                        channel.set_my_id(id);
                    }
                    Ok(protocol::subscribe_frame(
                        channel.name(),
                        Some(&token.auth),
                        Some(channel_data),
                    ))
                } else {
                    Ok(protocol::subscribe_frame(
                        channel.name(),
                        Some(&token.auth),
                        token.channel_data.as_deref(),
                    ))
                }
            }
        }
    }
}

impl FrameRouter for ChannelRegistry {
    fn on_message(&self, event: &str, frame: &Frame) {
        let Some(name) = frame.channel.as_deref() else {
            return;
        };
        let channel = self.state.lock().channels.get(name).cloned();
        match channel {
            Some(channel) => channel.handle_frame(event, frame),
            None => debug!(channel = %name, event = %event, "dropping frame for unknown channel"),
        }
    }

    fn on_connection_state_change(&self, _previous: ConnectionState, current: ConnectionState) {
        match current {
            ConnectionState::Connected => {
                let due: Vec<Channel> = {
                    let mut state = self.state.lock();
                    let names: Vec<String> = state
                        .order
                        .iter()
                        .filter(|name| state.pending.contains(*name))
                        .cloned()
                        .collect();
                    state.pending.clear();
                    names
                        .iter()
                        .filter_map(|name| state.channels.get(name).cloned())
                        .collect()
                };
                for channel in due {
                    self.send_subscribe(&channel);
                }
            }
            ConnectionState::Disconnected => {
                let mut state = self.state.lock();
                let RegistryState {
                    channels,
                    order,
                    pending,
                } = &mut *state;
                for name in order.iter() {
                    let Some(channel) = channels.get(name) else {
                        continue;
                    };
                    match channel.state() {
                        ChannelState::SubscribeSent | ChannelState::Subscribed => {
                            channel.set_state(ChannelState::Unsubscribed);
                            pending.insert(name.clone());
                        }
                        ChannelState::Initial | ChannelState::Unsubscribed => {
                            pending.insert(name.clone());
                        }
                        ChannelState::Failed => {}
                    }
                }
            }
            _ => {}
        }
    }
}

//! Channels: named subscription contexts multiplexed over one connection.
//!
//! A channel is created by one of the facade's `subscribe_*` operations and
//! lives in the registry until unsubscribed. Three variants share one
//! record: public channels subscribe directly, private channels attach an
//! authorization token to the subscribe frame, and presence channels
//! additionally maintain a roster of joined members from server events.
//!
//! Listeners are capability records ([`ChannelEvents`]): each callback slot
//! is optional and the dispatcher invokes only the slots that are set. The
//! same record type serves all three variants; presence-only slots simply
//! never fire on other channels.

pub(crate) mod registry;

mod presence;

pub use presence::Member;

use crate::error::{AuthError, Error};
use crate::protocol::{self, Frame};
use parking_lot::Mutex;
use self::presence::{MemberAddedPayload, MemberRemovedPayload, MemberRoster, PresencePayload};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Subscription lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Created; no subscribe frame dispatched yet.
    Initial,
    /// The subscribe frame is on the wire; awaiting the server's ack.
    SubscribeSent,
    /// The server acknowledged the subscription.
    Subscribed,
    /// Unsubscribed by the user, or the connection dropped.
    Unsubscribed,
    /// Authorization failed; the channel will not be retried.
    Failed,
}

/// The three channel variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelVariant {
    /// Open to any connection.
    Public,
    /// Requires an authorization token (`private-` prefix).
    Private,
    /// Authorized and carrying a member roster (`presence-` prefix).
    Presence,
}

type EventFn = dyn Fn(&str, &str) + Send + Sync;
type SubscribedFn = dyn Fn(&str) + Send + Sync;
type AuthFailureFn = dyn Fn(&str, &AuthError) + Send + Sync;
type MembersFn = dyn Fn(&str, &[Member]) + Send + Sync;
type MemberFn = dyn Fn(&str, &Member) + Send + Sync;

/// Callbacks for channel events.
///
/// A capability record: set only the slots you care about. Bind the same
/// `Arc` to several event names to share one listener; `unbind` removes by
/// `Arc` identity.
#[derive(Default)]
pub struct ChannelEvents {
    event: Option<Box<EventFn>>,
    subscription_succeeded: Option<Box<SubscribedFn>>,
    authentication_failure: Option<Box<AuthFailureFn>>,
    members_received: Option<Box<MembersFn>>,
    member_added: Option<Box<MemberFn>>,
    member_removed: Option<Box<MemberFn>>,
}

impl ChannelEvents {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the user event callback: `(event_name, data_json)`.
    pub fn on_event(mut self, callback: impl Fn(&str, &str) + Send + Sync + 'static) -> Self {
        self.event = Some(Box::new(callback));
        self
    }

    /// Set the subscription acknowledgement callback: `(channel_name)`.
    pub fn on_subscription_succeeded(
        mut self,
        callback: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.subscription_succeeded = Some(Box::new(callback));
        self
    }

    /// Set the authorization failure callback: `(message, cause)`.
    pub fn on_authentication_failure(
        mut self,
        callback: impl Fn(&str, &AuthError) + Send + Sync + 'static,
    ) -> Self {
        self.authentication_failure = Some(Box::new(callback));
        self
    }

    /// Set the full roster callback fired on subscription acknowledgement
    /// of a presence channel: `(channel_name, members)`.
    pub fn on_members_received(
        mut self,
        callback: impl Fn(&str, &[Member]) + Send + Sync + 'static,
    ) -> Self {
        self.members_received = Some(Box::new(callback));
        self
    }

    /// Set the member join callback: `(channel_name, member)`.
    pub fn on_member_added(
        mut self,
        callback: impl Fn(&str, &Member) + Send + Sync + 'static,
    ) -> Self {
        self.member_added = Some(Box::new(callback));
        self
    }

    /// Set the member leave callback: `(channel_name, member)`.
    pub fn on_member_removed(
        mut self,
        callback: impl Fn(&str, &Member) + Send + Sync + 'static,
    ) -> Self {
        self.member_removed = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for ChannelEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelEvents")
            .field("event", &self.event.is_some())
            .field("subscription_succeeded", &self.subscription_succeeded.is_some())
            .field("authentication_failure", &self.authentication_failure.is_some())
            .field("members_received", &self.members_received.is_some())
            .field("member_added", &self.member_added.is_some())
            .field("member_removed", &self.member_removed.is_some())
            .finish()
    }
}

enum ChannelKind {
    Public,
    Private,
    Presence(Mutex<MemberRoster>),
}

struct MainListener {
    events: Arc<ChannelEvents>,
    /// True when no event names were given at subscribe time, in which case
    /// the listener receives every user event on the channel.
    whole: bool,
}

struct ChannelInner {
    name: String,
    kind: ChannelKind,
    state: Mutex<ChannelState>,
    bindings: Mutex<HashMap<String, Vec<Arc<ChannelEvents>>>>,
    listener: Mutex<Option<MainListener>>,
}

/// A handle to one subscription.
///
/// Handles are cheap to clone and share; all of them observe the same
/// state, bindings, and (for presence) roster.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    pub(crate) fn new(variant: ChannelVariant, name: &str) -> Self {
        let kind = match variant {
            ChannelVariant::Public => ChannelKind::Public,
            ChannelVariant::Private => ChannelKind::Private,
            ChannelVariant::Presence => ChannelKind::Presence(Mutex::new(MemberRoster::default())),
        };
        Self {
            inner: Arc::new(ChannelInner {
                name: name.to_string(),
                kind,
                state: Mutex::new(ChannelState::Initial),
                bindings: Mutex::new(HashMap::new()),
                listener: Mutex::new(None),
            }),
        }
    }

    /// The channel name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The channel variant.
    pub fn variant(&self) -> ChannelVariant {
        match &self.inner.kind {
            ChannelKind::Public => ChannelVariant::Public,
            ChannelKind::Private => ChannelVariant::Private,
            ChannelKind::Presence(_) => ChannelVariant::Presence,
        }
    }

    /// The current subscription state.
    pub fn state(&self) -> ChannelState {
        *self.inner.state.lock()
    }

    /// Bind a listener to one event name.
    ///
    /// Names under the protocol's reserved prefixes cannot be bound.
    pub fn bind(&self, event: &str, listener: Arc<ChannelEvents>) -> Result<(), Error> {
        if event.is_empty() {
            return Err(Error::Argument("event name cannot be empty".into()));
        }
        if protocol::is_reserved_event(event) {
            return Err(Error::Argument(format!(
                "cannot bind to reserved event {event}"
            )));
        }
        self.inner
            .bindings
            .lock()
            .entry(event.to_string())
            .or_default()
            .push(listener);
        Ok(())
    }

    /// Remove a listener bound to one event name. Returns whether anything
    /// was removed.
    pub fn unbind(&self, event: &str, listener: &Arc<ChannelEvents>) -> bool {
        let mut bindings = self.inner.bindings.lock();
        match bindings.get_mut(event) {
            Some(bound) => {
                let before = bound.len();
                bound.retain(|candidate| !Arc::ptr_eq(candidate, listener));
                bound.len() != before
            }
            None => false,
        }
    }

    /// The current presence roster. `None` for non-presence channels.
    pub fn members(&self) -> Option<Vec<Member>> {
        match &self.inner.kind {
            ChannelKind::Presence(roster) => Some(roster.lock().members()),
            _ => None,
        }
    }

    /// The local member's id, once authorization has supplied it.
    /// `None` for non-presence channels.
    pub fn my_id(&self) -> Option<String> {
        match &self.inner.kind {
            ChannelKind::Presence(roster) => roster.lock().my_id().map(String::from),
            _ => None,
        }
    }

    pub(crate) fn set_state(&self, state: ChannelState) {
        *self.inner.state.lock() = state;
    }

    pub(crate) fn set_listener(&self, events: Arc<ChannelEvents>, whole: bool) {
        *self.inner.listener.lock() = Some(MainListener { events, whole });
    }

    pub(crate) fn set_my_id(&self, id: String) {
        if let ChannelKind::Presence(roster) = &self.inner.kind {
            roster.lock().set_my_id(id);
        }
    }

    fn main_listener(&self) -> Option<Arc<ChannelEvents>> {
        self.inner
            .listener
            .lock()
            .as_ref()
            .map(|main| main.events.clone())
    }

    pub(crate) fn notify_auth_failure(&self, cause: &AuthError) {
        if let Some(listener) = self.main_listener() {
            if let Some(callback) = &listener.authentication_failure {
                callback(&cause.to_string(), cause);
            }
        }
    }

    /// Route one inbound frame addressed to this channel.
    pub(crate) fn handle_frame(&self, event: &str, frame: &Frame) {
        match event {
            protocol::SUBSCRIPTION_SUCCEEDED => self.handle_subscription_succeeded(frame),
            protocol::MEMBER_ADDED => self.handle_member_added(frame),
            protocol::MEMBER_REMOVED => self.handle_member_removed(frame),
            _ => self.dispatch_user_event(event, frame),
        }
    }

    fn handle_subscription_succeeded(&self, frame: &Frame) {
        self.set_state(ChannelState::Subscribed);
        debug!(channel = %self.inner.name, "subscription succeeded");

        let roster_snapshot = match &self.inner.kind {
            ChannelKind::Presence(roster) => {
                match serde_json::from_value::<PresencePayload>(frame.data_object()) {
                    Ok(payload) => Some(roster.lock().replace(payload.presence)),
                    Err(error) => {
                        warn!(channel = %self.inner.name, %error, "malformed presence payload");
                        None
                    }
                }
            }
            _ => None,
        };

        if let Some(listener) = self.main_listener() {
            if let Some(callback) = &listener.subscription_succeeded {
                callback(&self.inner.name);
            }
            if let Some(members) = roster_snapshot {
                if let Some(callback) = &listener.members_received {
                    callback(&self.inner.name, &members);
                }
            }
        }
    }

    fn handle_member_added(&self, frame: &Frame) {
        let ChannelKind::Presence(roster) = &self.inner.kind else {
            debug!(channel = %self.inner.name, "member_added on non-presence channel ignored");
            return;
        };
        let payload: MemberAddedPayload = match serde_json::from_value(frame.data_object()) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(channel = %self.inner.name, %error, "malformed member_added payload");
                return;
            }
        };

        let member = payload.into_member();
        roster.lock().insert(member.clone());
        if let Some(listener) = self.main_listener() {
            if let Some(callback) = &listener.member_added {
                callback(&self.inner.name, &member);
            }
        }
    }

    fn handle_member_removed(&self, frame: &Frame) {
        let ChannelKind::Presence(roster) = &self.inner.kind else {
            debug!(channel = %self.inner.name, "member_removed on non-presence channel ignored");
            return;
        };
        let payload: MemberRemovedPayload = match serde_json::from_value(frame.data_object()) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(channel = %self.inner.name, %error, "malformed member_removed payload");
                return;
            }
        };

        // Removing an id that was never present is not an event.
        let removed = roster.lock().remove(&payload.user_id);
        if let Some(member) = removed {
            if let Some(listener) = self.main_listener() {
                if let Some(callback) = &listener.member_removed {
                    callback(&self.inner.name, &member);
                }
            }
        }
    }

    fn dispatch_user_event(&self, event: &str, frame: &Frame) {
        let data = frame.data_string();

        let mut targets: Vec<Arc<ChannelEvents>> = self
            .inner
            .bindings
            .lock()
            .get(event)
            .cloned()
            .unwrap_or_default();
        if let Some(main) = self.inner.listener.lock().as_ref() {
            if main.whole && !targets.iter().any(|seen| Arc::ptr_eq(seen, &main.events)) {
                targets.push(main.events.clone());
            }
        }

        for target in targets {
            if let Some(callback) = &target.event {
                callback(event, &data);
            }
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.inner.name)
            .field("variant", &self.variant())
            .field("state", &self.state())
            .finish()
    }
}

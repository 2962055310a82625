//! The connection core: state machine, inbound classification, heartbeats.

use super::heartbeat::{Clock, Heartbeat};
use super::{ConnectionEvents, ConnectionState, ConnectionStateChange, StateFilter};
use crate::error::SocketError;
use crate::executor::Executor;
use crate::protocol::{self, ConnectionEstablished, ErrorPayload, Frame};
use crate::socket::{SocketAdapter, SocketFactory, SocketObserver};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, warn};

const WEBSOCKET_ERROR_MESSAGE: &str = "An exception was thrown by the websocket";

/// Receives frames addressed to channels, and connection transitions, from
/// the connection core. Implemented by the channel registry.
pub(crate) trait FrameRouter: Send + Sync {
    /// A frame carrying a `channel` field arrived.
    fn on_message(&self, event: &str, frame: &Frame);

    /// The connection performed a real transition.
    fn on_connection_state_change(&self, previous: ConnectionState, current: ConnectionState);
}

/// The connection to the realtime endpoint.
///
/// Owns the state machine, the socket produced by the factory, the socket
/// id issued by the server, the heartbeat deadlines, and the bound
/// listeners. `connect`, `disconnect`, and `send` submit their work to the
/// executor and return; `bind`, `unbind`, and the getters act immediately.
pub struct Connection {
    url: String,
    executor: Arc<dyn Executor>,
    clock: Arc<dyn Clock>,
    socket_factory: SocketFactory,
    state: Mutex<ConnectionState>,
    socket_id: Mutex<Option<String>>,
    listeners: Mutex<HashMap<StateFilter, Vec<Arc<ConnectionEvents>>>>,
    socket: Mutex<Option<Box<dyn SocketAdapter>>>,
    heartbeat: Mutex<Heartbeat>,
    /// Bumped on every transition to `DISCONNECTED`; heartbeat checks from
    /// an earlier session see a stale value and die off.
    session: AtomicU64,
    router: Mutex<Option<Arc<dyn FrameRouter>>>,
    weak_self: Weak<Connection>,
}

impl Connection {
    pub(crate) fn new(
        url: String,
        activity_timeout: Duration,
        pong_timeout: Duration,
        executor: Arc<dyn Executor>,
        clock: Arc<dyn Clock>,
        socket_factory: SocketFactory,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            url,
            executor,
            clock,
            socket_factory,
            state: Mutex::new(ConnectionState::Disconnected),
            socket_id: Mutex::new(None),
            listeners: Mutex::new(HashMap::new()),
            socket: Mutex::new(None),
            heartbeat: Mutex::new(Heartbeat::new(activity_timeout, pong_timeout)),
            session: AtomicU64::new(0),
            router: Mutex::new(None),
            weak_self: weak.clone(),
        })
    }

    fn strong(&self) -> Arc<Self> {
        self.weak_self.upgrade().expect("connection is alive")
    }

    pub(crate) fn set_router(&self, router: Arc<dyn FrameRouter>) {
        *self.router.lock() = Some(router);
    }

    // -------------------------------------------------------------------------
    // Public operations
    // -------------------------------------------------------------------------

    /// Open the connection. A no-op unless currently `DISCONNECTED`.
    pub fn connect(&self) {
        let conn = self.strong();
        self.executor.submit(Box::new(move || conn.do_connect()));
    }

    /// Close the connection. A no-op unless currently `CONNECTED`.
    pub fn disconnect(&self) {
        let conn = self.strong();
        self.executor.submit(Box::new(move || conn.do_disconnect()));
    }

    /// Send a raw text frame. Outside `CONNECTED` this reports an error to
    /// `All`-bound listeners instead of touching the socket.
    pub fn send(&self, message: impl Into<String>) {
        let conn = self.strong();
        let message = message.into();
        self.executor.submit(Box::new(move || conn.do_send(message)));
    }

    /// Bind a listener under the given filter.
    pub fn bind(&self, filter: impl Into<StateFilter>, listener: Arc<ConnectionEvents>) {
        self.listeners
            .lock()
            .entry(filter.into())
            .or_default()
            .push(listener);
    }

    /// Remove a listener bound under the given filter. Returns whether
    /// anything was removed.
    pub fn unbind(&self, filter: impl Into<StateFilter>, listener: &Arc<ConnectionEvents>) -> bool {
        let mut listeners = self.listeners.lock();
        match listeners.get_mut(&filter.into()) {
            Some(bound) => {
                let before = bound.len();
                bound.retain(|candidate| !Arc::ptr_eq(candidate, listener));
                bound.len() != before
            }
            None => false,
        }
    }

    /// The current state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// The socket id issued by the server, while one is held.
    pub fn socket_id(&self) -> Option<String> {
        self.socket_id.lock().clone()
    }

    // -------------------------------------------------------------------------
    // Executor-side operations
    // -------------------------------------------------------------------------

    fn do_connect(&self) {
        if self.state() != ConnectionState::Disconnected {
            debug!(state = %self.state(), "connect ignored");
            return;
        }
        self.update_state(ConnectionState::Connecting);

        let observer: Arc<dyn SocketObserver> = self.strong();
        match (self.socket_factory)(&self.url, observer) {
            Ok(socket) => {
                socket.open();
                *self.socket.lock() = Some(socket);
            }
            Err(cause) => {
                self.emit_error(WEBSOCKET_ERROR_MESSAGE, None, Some(cause.as_ref()));
                self.update_state(ConnectionState::Disconnected);
            }
        }
    }

    fn do_disconnect(&self) {
        if self.state() != ConnectionState::Connected {
            debug!(state = %self.state(), "disconnect ignored");
            return;
        }
        self.update_state(ConnectionState::Disconnecting);
        if let Some(socket) = self.socket.lock().as_ref() {
            socket.close();
        }
    }

    fn do_send(&self, message: String) {
        let state = self.state();
        if state != ConnectionState::Connected {
            self.emit_error(
                &format!("Cannot send a message while in {state} state"),
                None,
                None,
            );
            return;
        }

        let result = self.socket.lock().as_ref().map(|socket| socket.send(&message));
        if let Some(Err(cause)) = result {
            self.emit_error(
                &format!("An exception occurred while sending message [{message}]"),
                None,
                Some(cause.as_ref()),
            );
        }
    }

    // -------------------------------------------------------------------------
    // Transitions and listener dispatch
    // -------------------------------------------------------------------------

    fn update_state(&self, next: ConnectionState) {
        let change = {
            let mut state = self.state.lock();
            if *state == next {
                return;
            }
            let change = ConnectionStateChange::new(*state, next);
            *state = next;
            change
        };
        debug!(previous = %change.previous, current = %change.current, "connection state change");

        match next {
            ConnectionState::Connected => self.start_heartbeat(),
            ConnectionState::Disconnected => {
                self.session.fetch_add(1, Ordering::SeqCst);
                self.heartbeat.lock().disarm();
                *self.socket_id.lock() = None;
                *self.socket.lock() = None;
            }
            _ => {}
        }

        for listener in self.listeners_for(next) {
            listener.emit_state_change(&change);
        }
        let router = self.router.lock().clone();
        if let Some(router) = router {
            router.on_connection_state_change(change.previous, change.current);
        }
    }

    /// Listeners bound to the given state or to `All`, each at most once.
    fn listeners_for(&self, state: ConnectionState) -> Vec<Arc<ConnectionEvents>> {
        let listeners = self.listeners.lock();
        let mut out: Vec<Arc<ConnectionEvents>> = Vec::new();
        for filter in [StateFilter::All, StateFilter::State(state)] {
            for listener in listeners.get(&filter).into_iter().flatten() {
                if !out.iter().any(|seen| Arc::ptr_eq(seen, listener)) {
                    out.push(listener.clone());
                }
            }
        }
        out
    }

    fn emit_error(
        &self,
        message: &str,
        code: Option<&str>,
        cause: Option<&(dyn std::error::Error + Send + Sync)>,
    ) {
        warn!(message = %message, code = ?code, "connection error");
        let bound = self
            .listeners
            .lock()
            .get(&StateFilter::All)
            .cloned()
            .unwrap_or_default();
        for listener in bound {
            listener.emit_error(message, code, cause);
        }
    }

    // -------------------------------------------------------------------------
    // Inbound classification
    // -------------------------------------------------------------------------

    fn handle_message(&self, text: String) {
        // Every inbound frame counts as activity and settles any
        // outstanding ping.
        self.heartbeat.lock().touch(self.clock.now());

        let frame = match Frame::parse(&text) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(%error, "discarding malformed frame");
                return;
            }
        };

        match frame.event.as_str() {
            protocol::CONNECTION_ESTABLISHED => self.handle_connection_established(&frame),
            protocol::ERROR => self.handle_server_error(&frame),
            protocol::PONG => {}
            _ => {
                if frame.channel.is_some() {
                    let router = self.router.lock().clone();
                    if let Some(router) = router {
                        router.on_message(&frame.event, &frame);
                    }
                }
            }
        }
    }

    fn handle_connection_established(&self, frame: &Frame) {
        let payload: ConnectionEstablished = match serde_json::from_value(frame.data_object()) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(%error, "discarding malformed connection_established payload");
                return;
            }
        };

        match self.state() {
            ConnectionState::Connected => {
                self.emit_error(
                    "Received a connection_established frame while already connected",
                    None,
                    None,
                );
            }
            ConnectionState::Connecting => {
                if let Some(seconds) = payload.activity_timeout {
                    self.heartbeat
                        .lock()
                        .set_activity_timeout(Duration::from_secs(seconds));
                }
                *self.socket_id.lock() = Some(payload.socket_id);
                self.update_state(ConnectionState::Connected);
            }
            state => debug!(%state, "connection_established ignored"),
        }
    }

    fn handle_server_error(&self, frame: &Frame) {
        let payload: ErrorPayload =
            serde_json::from_value(frame.data_object()).unwrap_or_default();
        self.emit_error(&payload.message, payload.code_string().as_deref(), None);
    }

    fn handle_close(&self, code: u16, reason: &str, remote: bool) {
        debug!(code = code, reason = %reason, remote = remote, "socket closed");
        if self.state() == ConnectionState::Disconnected {
            return;
        }
        self.update_state(ConnectionState::Disconnected);
    }

    fn handle_socket_error(&self, cause: SocketError) {
        self.emit_error(WEBSOCKET_ERROR_MESSAGE, None, Some(cause.as_ref()));
        match self.state() {
            ConnectionState::Connecting => {
                if let Some(socket) = self.socket.lock().as_ref() {
                    socket.close();
                }
                self.update_state(ConnectionState::Disconnected);
            }
            ConnectionState::Connected => {
                if let Some(socket) = self.socket.lock().as_ref() {
                    socket.close();
                }
            }
            _ => {}
        }
    }

    // -------------------------------------------------------------------------
    // Heartbeats
    // -------------------------------------------------------------------------

    pub(crate) fn session(&self) -> u64 {
        self.session.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn activity_timeout(&self) -> Duration {
        self.heartbeat.lock().activity_timeout()
    }

    fn start_heartbeat(&self) {
        let session = self.session();
        self.heartbeat.lock().touch(self.clock.now());
        self.schedule_activity_check(session);
    }

    fn schedule_activity_check(&self, session: u64) {
        let delay = self
            .heartbeat
            .lock()
            .activity_remaining(self.clock.now())
            .unwrap_or_default();
        let conn = self.strong();
        self.executor
            .schedule(delay, Box::new(move || conn.check_activity(session)));
    }

    fn schedule_pong_check(&self, session: u64) {
        let delay = self
            .heartbeat
            .lock()
            .pong_remaining(self.clock.now())
            .unwrap_or_default();
        let conn = self.strong();
        self.executor
            .schedule(delay, Box::new(move || conn.check_pong(session)));
    }

    /// Re-read the activity deadline: if inbound traffic pushed it forward,
    /// go back to sleep; if it expired, probe the server with a ping.
    pub(crate) fn check_activity(&self, session: u64) {
        if session != self.session() || self.state() != ConnectionState::Connected {
            return;
        }
        let now = self.clock.now();
        let remaining = match self.heartbeat.lock().activity_remaining(now) {
            Some(remaining) => remaining,
            None => return,
        };
        if !remaining.is_zero() {
            self.schedule_activity_check(session);
            return;
        }

        debug!("activity timeout expired, sending ping");
        {
            let mut heartbeat = self.heartbeat.lock();
            heartbeat.arm_pong(now);
            heartbeat.rearm_activity(now);
        }
        self.do_send(protocol::ping_frame());
        self.schedule_pong_check(session);
        self.schedule_activity_check(session);
    }

    /// Re-read the pong deadline: expiry means the transport is dead.
    pub(crate) fn check_pong(&self, session: u64) {
        if session != self.session() || self.state() != ConnectionState::Connected {
            return;
        }
        let now = self.clock.now();
        let remaining = self.heartbeat.lock().pong_remaining(now);
        match remaining {
            None => {}
            Some(remaining) if !remaining.is_zero() => self.schedule_pong_check(session),
            Some(_) => {
                warn!("pong timeout expired, closing the transport");
                if let Some(socket) = self.socket.lock().as_ref() {
                    socket.close();
                }
                self.update_state(ConnectionState::Disconnected);
            }
        }
    }
}

impl SocketObserver for Connection {
    fn on_open(&self) {
        debug!("socket open");
    }

    fn on_message(&self, text: &str) {
        let conn = self.strong();
        let text = text.to_string();
        self.executor
            .submit(Box::new(move || conn.handle_message(text)));
    }

    fn on_close(&self, code: u16, reason: &str, remote: bool) {
        let conn = self.strong();
        let reason = reason.to_string();
        self.executor
            .submit(Box::new(move || conn.handle_close(code, &reason, remote)));
    }

    fn on_error(&self, cause: SocketError) {
        let conn = self.strong();
        self.executor
            .submit(Box::new(move || conn.handle_socket_error(cause)));
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.url)
            .field("state", &self.state())
            .field("socket_id", &self.socket_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::heartbeat::{
        DEFAULT_ACTIVITY_TIMEOUT, DEFAULT_PONG_TIMEOUT, SystemClock,
    };
    use crate::executor::InlineExecutor;
    use crate::testing::{ManualClock, TestSocket};
    use crate::connection::ConnectionState::{Connected, Connecting, Disconnected, Disconnecting};

    const URL: &str = "ws://ws.example.com/app/key";
    const ESTABLISHED: &str =
        "{\"event\":\"pusher:connection_established\",\"data\":\"{\\\"socket_id\\\":\\\"21112.816204\\\"}\"}";
    const INCOMING: &str =
        "{\"event\":\"my-event\",\"channel\":\"my-channel\",\"data\":{\"fish\":\"chips\"}}";

    #[derive(Default)]
    struct Recorded {
        changes: Mutex<Vec<ConnectionStateChange>>,
        errors: Mutex<Vec<(String, Option<String>, bool)>>,
    }

    fn recording_listener() -> (Arc<ConnectionEvents>, Arc<Recorded>) {
        let recorded = Arc::new(Recorded::default());
        let changes = recorded.clone();
        let errors = recorded.clone();
        let events = Arc::new(
            ConnectionEvents::new()
                .on_state_change(move |change| changes.changes.lock().push(change.clone()))
                .on_error(move |message, code, cause| {
                    errors
                        .errors
                        .lock()
                        .push((message.to_string(), code.map(String::from), cause.is_some()))
                }),
        );
        (events, recorded)
    }

    #[derive(Default)]
    struct RecordingRouter {
        messages: Mutex<Vec<(String, Option<String>)>>,
    }

    impl FrameRouter for RecordingRouter {
        fn on_message(&self, event: &str, frame: &Frame) {
            self.messages
                .lock()
                .push((event.to_string(), frame.channel.clone()));
        }

        fn on_connection_state_change(&self, _previous: ConnectionState, _current: ConnectionState) {}
    }

    fn new_connection(clock: Arc<dyn Clock>) -> (Arc<Connection>, TestSocket) {
        let socket = TestSocket::new();
        let conn = Connection::new(
            URL.to_string(),
            DEFAULT_ACTIVITY_TIMEOUT,
            DEFAULT_PONG_TIMEOUT,
            Arc::new(InlineExecutor),
            clock,
            socket.factory(),
        );
        (conn, socket)
    }

    fn connected() -> (Arc<Connection>, TestSocket, Arc<Recorded>) {
        let (conn, socket) = new_connection(Arc::new(SystemClock));
        let (listener, recorded) = recording_listener();
        conn.bind(StateFilter::All, listener);
        conn.connect();
        socket.deliver(ESTABLISHED);
        assert_eq!(conn.state(), Connected);
        (conn, socket, recorded)
    }

    #[test]
    fn test_starts_in_disconnected_state() {
        let (conn, _socket) = new_connection(Arc::new(SystemClock));
        assert_eq!(conn.state(), Disconnected);
        assert_eq!(conn.socket_id(), None);
    }

    #[test]
    fn test_connect_opens_socket_and_notifies_listener() {
        let (conn, socket) = new_connection(Arc::new(SystemClock));
        let (listener, recorded) = recording_listener();
        conn.bind(StateFilter::All, listener);

        conn.connect();

        assert_eq!(socket.open_count(), 1);
        assert_eq!(conn.state(), Connecting);
        assert_eq!(
            *recorded.changes.lock(),
            vec![ConnectionStateChange::new(Disconnected, Connecting)]
        );
    }

    #[test]
    fn test_connect_twice_opens_socket_once() {
        let (conn, socket) = new_connection(Arc::new(SystemClock));
        let (listener, recorded) = recording_listener();
        conn.bind(StateFilter::All, listener);

        conn.connect();
        conn.connect();

        assert_eq!(socket.open_count(), 1);
        assert_eq!(recorded.changes.lock().len(), 1);
    }

    #[test]
    fn test_listener_bound_to_connected_misses_connecting() {
        let (conn, _socket) = new_connection(Arc::new(SystemClock));
        let (listener, recorded) = recording_listener();
        conn.bind(Connected, listener);

        conn.connect();

        assert!(recorded.changes.lock().is_empty());
    }

    #[test]
    fn test_connection_established_sets_connected_and_socket_id() {
        let (conn, socket) = new_connection(Arc::new(SystemClock));
        let (listener, recorded) = recording_listener();
        conn.bind(StateFilter::All, listener);

        conn.connect();
        socket.deliver(ESTABLISHED);

        assert_eq!(conn.state(), Connected);
        assert_eq!(conn.socket_id().as_deref(), Some("21112.816204"));
        assert_eq!(
            *recorded.changes.lock(),
            vec![
                ConnectionStateChange::new(Disconnected, Connecting),
                ConnectionStateChange::new(Connecting, Connected),
            ]
        );
    }

    #[test]
    fn test_connection_established_adopts_activity_timeout() {
        let (conn, socket) = new_connection(Arc::new(SystemClock));
        conn.connect();
        socket.deliver(
            "{\"event\":\"pusher:connection_established\",\"data\":\"{\\\"socket_id\\\":\\\"1.1\\\",\\\"activity_timeout\\\":42}\"}",
        );

        assert_eq!(conn.state(), Connected);
        assert_eq!(conn.activity_timeout(), Duration::from_secs(42));
    }

    #[test]
    fn test_repeated_connection_established_reports_error_without_transition() {
        let (conn, socket, recorded) = connected();

        socket.deliver(ESTABLISHED);

        assert_eq!(conn.state(), Connected);
        assert_eq!(recorded.changes.lock().len(), 2);
        let errors = recorded.errors.lock();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].0.contains("already connected"));
    }

    #[test]
    fn test_server_error_frame_reports_error_event() {
        let (conn, socket) = new_connection(Arc::new(SystemClock));
        let (listener, recorded) = recording_listener();
        conn.bind(StateFilter::All, listener);
        conn.connect();

        socket.deliver(
            "{\"event\":\"pusher:error\",\"data\":{\"code\":4001,\"message\":\"Could not find app by key 12345\"}}",
        );

        assert_eq!(conn.state(), Connecting);
        assert_eq!(
            *recorded.errors.lock(),
            vec![(
                "Could not find app by key 12345".to_string(),
                Some("4001".to_string()),
                false,
            )]
        );
    }

    #[test]
    fn test_send_forwards_to_socket_when_connected() {
        let (conn, socket, _recorded) = connected();

        conn.send("message");

        assert_eq!(socket.sent(), vec!["message".to_string()]);
    }

    #[test]
    fn test_send_while_disconnected_reports_error() {
        let (conn, socket) = new_connection(Arc::new(SystemClock));
        let (listener, recorded) = recording_listener();
        conn.bind(StateFilter::All, listener);

        conn.send("message");

        assert!(socket.sent().is_empty());
        assert_eq!(
            *recorded.errors.lock(),
            vec![(
                "Cannot send a message while in DISCONNECTED state".to_string(),
                None,
                false,
            )]
        );
    }

    #[test]
    fn test_send_failure_reports_error_with_cause() {
        let (conn, socket, recorded) = connected();
        socket.fail_sends(true);

        conn.send("message");

        assert_eq!(conn.state(), Connected);
        assert_eq!(
            *recorded.errors.lock(),
            vec![(
                "An exception occurred while sending message [message]".to_string(),
                None,
                true,
            )]
        );
    }

    #[test]
    fn test_channel_frame_is_routed_to_router() {
        let (conn, socket, _recorded) = connected();
        let router = Arc::new(RecordingRouter::default());
        conn.set_router(router.clone());

        socket.deliver(INCOMING);

        assert_eq!(
            *router.messages.lock(),
            vec![("my-event".to_string(), Some("my-channel".to_string()))]
        );
    }

    #[test]
    fn test_frame_without_channel_is_ignored() {
        let (conn, socket, recorded) = connected();
        let router = Arc::new(RecordingRouter::default());
        conn.set_router(router.clone());

        socket.deliver("{\"event\":\"something-custom\",\"data\":{}}");
        socket.deliver("not json at all");

        assert!(router.messages.lock().is_empty());
        assert!(recorded.errors.lock().is_empty());
        assert_eq!(conn.state(), Connected);
    }

    #[test]
    fn test_close_while_connecting_transitions_to_disconnected() {
        let (conn, socket) = new_connection(Arc::new(SystemClock));
        let (listener, recorded) = recording_listener();
        conn.bind(StateFilter::All, listener);
        conn.connect();

        socket.remote_close(1, "reason");

        assert_eq!(conn.state(), Disconnected);
        assert_eq!(
            recorded.changes.lock().last(),
            Some(&ConnectionStateChange::new(Connecting, Disconnected))
        );
    }

    #[test]
    fn test_close_not_reported_to_unbound_listener() {
        let (conn, socket) = new_connection(Arc::new(SystemClock));
        let (listener, recorded) = recording_listener();
        conn.bind(Connected, listener);
        conn.connect();

        socket.remote_close(1, "reason");

        assert!(recorded.changes.lock().is_empty());
    }

    #[test]
    fn test_socket_error_while_connecting_reports_and_disconnects() {
        let (conn, socket) = new_connection(Arc::new(SystemClock));
        let (listener, recorded) = recording_listener();
        conn.bind(StateFilter::All, listener);
        conn.connect();

        socket.fail_with("handshake failed");

        assert_eq!(
            *recorded.errors.lock(),
            vec![(
                "An exception was thrown by the websocket".to_string(),
                None,
                true,
            )]
        );
        assert_eq!(conn.state(), Disconnected);
    }

    #[test]
    fn test_disconnect_from_connected_closes_socket() {
        let (conn, socket, recorded) = connected();

        conn.disconnect();

        assert_eq!(conn.state(), Disconnecting);
        assert_eq!(socket.close_count(), 1);
        assert_eq!(
            recorded.changes.lock().last(),
            Some(&ConnectionStateChange::new(Connected, Disconnecting))
        );
    }

    #[test]
    fn test_disconnect_in_disconnected_is_noop() {
        let (conn, socket) = new_connection(Arc::new(SystemClock));
        let (listener, recorded) = recording_listener();
        conn.bind(StateFilter::All, listener);

        conn.disconnect();

        assert_eq!(socket.close_count(), 0);
        assert!(recorded.changes.lock().is_empty());
    }

    #[test]
    fn test_disconnect_in_connecting_is_noop() {
        let (conn, socket) = new_connection(Arc::new(SystemClock));
        let (listener, recorded) = recording_listener();
        conn.bind(StateFilter::All, listener);
        conn.connect();

        conn.disconnect();

        assert_eq!(socket.close_count(), 0);
        assert_eq!(recorded.changes.lock().len(), 1);
    }

    #[test]
    fn test_disconnect_in_disconnecting_is_noop() {
        let (conn, socket, recorded) = connected();

        conn.disconnect();
        conn.disconnect();

        assert_eq!(socket.close_count(), 1);
        assert_eq!(recorded.changes.lock().len(), 3);
    }

    #[test]
    fn test_socket_id_cleared_on_disconnect() {
        let (conn, socket, _recorded) = connected();
        assert!(conn.socket_id().is_some());

        conn.disconnect();
        socket.remote_close(1000, "bye");

        assert_eq!(conn.state(), Disconnected);
        assert_eq!(conn.socket_id(), None);
    }

    #[test]
    fn test_unbind_reports_whether_listener_was_bound() {
        let (conn, _socket) = new_connection(Arc::new(SystemClock));
        let (listener, _recorded) = recording_listener();

        assert!(!conn.unbind(StateFilter::All, &listener));
        conn.bind(StateFilter::All, listener.clone());
        assert!(conn.unbind(StateFilter::All, &listener));
        assert!(!conn.unbind(StateFilter::All, &listener));
    }

    #[test]
    fn test_listener_bound_to_all_and_state_notified_once() {
        let (conn, _socket) = new_connection(Arc::new(SystemClock));
        let (listener, recorded) = recording_listener();
        conn.bind(StateFilter::All, listener.clone());
        conn.bind(Connecting, listener);

        conn.connect();

        assert_eq!(recorded.changes.lock().len(), 1);
    }

    #[test]
    fn test_activity_expiry_sends_ping() {
        let clock = Arc::new(ManualClock::new());
        let (conn, socket) = new_connection(clock.clone());
        conn.connect();
        socket.deliver(ESTABLISHED);

        clock.advance(DEFAULT_ACTIVITY_TIMEOUT + Duration::from_secs(1));
        conn.check_activity(conn.session());

        let sent = socket.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("pusher:ping"));
        assert_eq!(conn.state(), Connected);
    }

    #[test]
    fn test_pong_expiry_forces_disconnect() {
        let clock = Arc::new(ManualClock::new());
        let (conn, socket) = new_connection(clock.clone());
        conn.connect();
        socket.deliver(ESTABLISHED);

        clock.advance(DEFAULT_ACTIVITY_TIMEOUT + Duration::from_secs(1));
        conn.check_activity(conn.session());
        clock.advance(DEFAULT_PONG_TIMEOUT + Duration::from_secs(1));
        conn.check_pong(conn.session());

        assert_eq!(conn.state(), Disconnected);
        assert_eq!(socket.close_count(), 1);
    }

    #[test]
    fn test_pong_reply_settles_outstanding_ping() {
        let clock = Arc::new(ManualClock::new());
        let (conn, socket) = new_connection(clock.clone());
        conn.connect();
        socket.deliver(ESTABLISHED);

        clock.advance(DEFAULT_ACTIVITY_TIMEOUT + Duration::from_secs(1));
        conn.check_activity(conn.session());
        socket.deliver("{\"event\":\"pusher:pong\",\"data\":{}}");

        clock.advance(DEFAULT_PONG_TIMEOUT + Duration::from_secs(1));
        conn.check_pong(conn.session());

        assert_eq!(conn.state(), Connected);
        assert_eq!(socket.close_count(), 0);
    }

    #[test]
    fn test_stale_session_heartbeat_check_is_noop() {
        let clock = Arc::new(ManualClock::new());
        let (conn, socket) = new_connection(clock.clone());
        conn.connect();
        socket.deliver(ESTABLISHED);
        let session = conn.session();

        conn.disconnect();
        socket.remote_close(1000, "bye");
        conn.connect();

        clock.advance(DEFAULT_ACTIVITY_TIMEOUT + Duration::from_secs(1));
        conn.check_activity(session);

        assert!(socket.sent().is_empty());
    }
}

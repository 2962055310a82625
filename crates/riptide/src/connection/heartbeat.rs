//! Heartbeat deadlines for detecting a dead transport.
//!
//! Two monotonic deadlines police liveness while connected:
//!
//! - the *activity* deadline, pushed forward by every inbound frame; when it
//!   expires the connection sends a `pusher:ping`, and
//! - the *pong* deadline, armed only while a ping is outstanding and cleared
//!   by the next inbound frame; when it expires the transport is closed.
//!
//! Deadlines are plain instants re-read from an injected [`Clock`], so an
//! expiry check that runs early or late is always safe.

use std::time::{Duration, Instant};

/// Default interval of inbound silence before a ping is sent. The server
/// may shorten or lengthen this through its handshake payload.
pub const DEFAULT_ACTIVITY_TIMEOUT: Duration = Duration::from_secs(120);

/// Default wait for the server's reply to a ping.
pub const DEFAULT_PONG_TIMEOUT: Duration = Duration::from_secs(30);

/// A monotonic time source.
pub trait Clock: Send + Sync + 'static {
    /// The current instant.
    fn now(&self) -> Instant;
}

/// The wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Deadline bookkeeping. Not synchronized; the connection keeps it behind
/// its own lock.
#[derive(Debug)]
pub(crate) struct Heartbeat {
    activity_timeout: Duration,
    pong_timeout: Duration,
    activity_deadline: Option<Instant>,
    pong_deadline: Option<Instant>,
}

impl Heartbeat {
    pub fn new(activity_timeout: Duration, pong_timeout: Duration) -> Self {
        Self {
            activity_timeout,
            pong_timeout,
            activity_deadline: None,
            pong_deadline: None,
        }
    }

    pub fn activity_timeout(&self) -> Duration {
        self.activity_timeout
    }

    /// Adopt the server's activity timeout from the handshake payload.
    pub fn set_activity_timeout(&mut self, timeout: Duration) {
        self.activity_timeout = timeout;
    }

    /// Record inbound traffic: push the activity deadline out a full
    /// interval and clear any outstanding pong deadline.
    pub fn touch(&mut self, now: Instant) {
        self.activity_deadline = Some(now + self.activity_timeout);
        self.pong_deadline = None;
    }

    /// Arm the pong deadline after sending a ping.
    pub fn arm_pong(&mut self, now: Instant) {
        self.pong_deadline = Some(now + self.pong_timeout);
    }

    /// Push the activity deadline out without touching the pong deadline.
    pub fn rearm_activity(&mut self, now: Instant) {
        self.activity_deadline = Some(now + self.activity_timeout);
    }

    /// Stop policing entirely (the connection left `CONNECTED`).
    pub fn disarm(&mut self) {
        self.activity_deadline = None;
        self.pong_deadline = None;
    }

    /// Time until the activity deadline: `None` when disarmed, zero when due.
    pub fn activity_remaining(&self, now: Instant) -> Option<Duration> {
        self.activity_deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Time until the pong deadline: `None` when no ping is outstanding.
    pub fn pong_remaining(&self, now: Instant) -> Option<Duration> {
        self.pong_deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }
}

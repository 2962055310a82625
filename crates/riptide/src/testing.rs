//! In-memory test doubles for the socket and clock seams.
//!
//! Paired with [`InlineExecutor`](crate::executor::InlineExecutor), these
//! make every client operation synchronous and deterministic: the crate's
//! own scenario tests are built on them, and embedders can use them the
//! same way through [`Client::with_parts`](crate::Client::with_parts).

use crate::connection::heartbeat::Clock;
use crate::error::SocketError;
use crate::socket::{SocketAdapter, SocketFactory, SocketObserver};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// A clock advanced by hand.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    /// Create a clock pinned at the current instant.
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

#[derive(Default)]
struct TestSocketState {
    opens: AtomicUsize,
    closes: AtomicUsize,
    sent: Mutex<Vec<String>>,
    fail_sends: AtomicBool,
    observer: Mutex<Option<Arc<dyn SocketObserver>>>,
}

/// An in-memory socket.
///
/// The handle records every `open`/`send`/`close` the client performs and
/// captures the observer handed to the factory, so a test can play the
/// server's side of the conversation with [`deliver`](Self::deliver),
/// [`remote_close`](Self::remote_close), and [`fail_with`](Self::fail_with).
#[derive(Clone, Default)]
pub struct TestSocket {
    inner: Arc<TestSocketState>,
}

impl TestSocket {
    /// Create a socket double.
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory producing adapters backed by this handle. Every produced
    /// adapter shares the handle's counters and observer slot.
    pub fn factory(&self) -> SocketFactory {
        let inner = self.inner.clone();
        Arc::new(move |_url, observer| {
            *inner.observer.lock() = Some(observer);
            Ok(Box::new(TestAdapter {
                inner: inner.clone(),
            }) as Box<dyn SocketAdapter>)
        })
    }

    /// How many times the client opened a socket.
    pub fn open_count(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    /// How many times the client closed a socket.
    pub fn close_count(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    /// Every frame the client sent, in order.
    pub fn sent(&self) -> Vec<String> {
        self.inner.sent.lock().clone()
    }

    /// Make subsequent sends fail (or succeed again).
    pub fn fail_sends(&self, fail: bool) {
        self.inner.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// The observer captured at the last factory call.
    ///
    /// # Panics
    ///
    /// Panics when the client has not opened a socket yet.
    pub fn observer(&self) -> Arc<dyn SocketObserver> {
        self.inner
            .observer
            .lock()
            .clone()
            .expect("no socket has been opened")
    }

    /// Deliver an inbound text frame, as the transport would.
    pub fn deliver(&self, text: &str) {
        self.observer().on_message(text);
    }

    /// Report the transport handshake as complete.
    pub fn finish_open(&self) {
        self.observer().on_open();
    }

    /// Close the transport from the remote side.
    pub fn remote_close(&self, code: u16, reason: &str) {
        self.observer().on_close(code, reason, true);
    }

    /// Raise a transport error.
    pub fn fail_with(&self, message: &str) {
        self.observer().on_error(message.to_string().into());
    }
}

struct TestAdapter {
    inner: Arc<TestSocketState>,
}

impl SocketAdapter for TestAdapter {
    fn open(&self) {
        self.inner.opens.fetch_add(1, Ordering::SeqCst);
    }

    fn send(&self, text: &str) -> Result<(), SocketError> {
        if self.inner.fail_sends.load(Ordering::SeqCst) {
            return Err("send refused by test socket".into());
        }
        self.inner.sent.lock().push(text.to_string());
        Ok(())
    }

    fn close(&self) {
        self.inner.closes.fetch_add(1, Ordering::SeqCst);
    }
}

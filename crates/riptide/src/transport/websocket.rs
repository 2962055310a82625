//! WebSocket adapter over tokio-tungstenite.
//!
//! Each adapter owns a dedicated thread running a single-threaded tokio
//! runtime: one task reads the socket and feeds the observer, outbound
//! frames and the close request arrive over an in-process channel. The
//! observer is invoked from that thread; the connection core marshals every
//! callback onto the executor before touching state.

use crate::error::SocketError;
use crate::socket::{SocketAdapter, SocketFactory, SocketObserver};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use url::Url;

/// Close code reported when the transport ends without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;
/// Close code reported when a close frame carried no code.
const NO_STATUS_RECEIVED: u16 = 1005;

enum Command {
    Send(String),
    Close,
}

/// A [`SocketAdapter`] backed by tokio-tungstenite.
pub struct WebSocketAdapter {
    url: Url,
    observer: Arc<dyn SocketObserver>,
    commands: Mutex<Option<UnboundedSender<Command>>>,
}

impl WebSocketAdapter {
    /// Create an adapter for the given endpoint URL. The transport is not
    /// touched until [`SocketAdapter::open`].
    pub fn new(url: &str, observer: Arc<dyn SocketObserver>) -> Result<Self, SocketError> {
        let url = Url::parse(url).map_err(|e| Box::new(e) as SocketError)?;
        Ok(Self {
            url,
            observer,
            commands: Mutex::new(None),
        })
    }
}

impl SocketAdapter for WebSocketAdapter {
    fn open(&self) {
        let (tx, rx) = unbounded_channel();
        *self.commands.lock() = Some(tx);

        let url = self.url.clone();
        let observer = self.observer.clone();
        std::thread::Builder::new()
            .name("riptide-websocket".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        observer.on_error(Box::new(e));
                        observer.on_close(ABNORMAL_CLOSURE, "failed to start websocket runtime", false);
                        return;
                    }
                };
                runtime.block_on(run(url, observer, rx));
            })
            .expect("failed to spawn websocket thread");
    }

    fn send(&self, text: &str) -> Result<(), SocketError> {
        let commands = self.commands.lock();
        let tx = commands
            .as_ref()
            .ok_or_else(|| SocketError::from("socket is not open"))?;
        tx.send(Command::Send(text.to_string()))
            .map_err(|_| SocketError::from("socket is closed"))
    }

    fn close(&self) {
        if let Some(tx) = self.commands.lock().as_ref() {
            let _ = tx.send(Command::Close);
        }
    }
}

async fn run(url: Url, observer: Arc<dyn SocketObserver>, mut commands: UnboundedReceiver<Command>) {
    let (mut stream, _response) = match connect_async(url.as_str()).await {
        Ok(connected) => connected,
        Err(e) => {
            observer.on_error(Box::new(e));
            observer.on_close(ABNORMAL_CLOSURE, "failed to establish the websocket", false);
            return;
        }
    };
    observer.on_open();

    // Set once we initiate the close, so the terminal callback can say
    // which side ended the conversation.
    let mut closing = false;
    loop {
        tokio::select! {
            command = commands.recv(), if !closing => match command {
                Some(Command::Send(text)) => {
                    if let Err(e) = stream.send(Message::Text(text)).await {
                        observer.on_error(Box::new(e));
                    }
                }
                Some(Command::Close) | None => {
                    closing = true;
                    if let Err(e) = stream.close(None).await {
                        debug!(error = %e, "websocket close failed");
                    }
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => observer.on_message(&text),
                Some(Ok(Message::Ping(payload))) => {
                    let _ = stream.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((NO_STATUS_RECEIVED, String::new()));
                    observer.on_close(code, &reason, !closing);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    observer.on_error(Box::new(e));
                    observer.on_close(ABNORMAL_CLOSURE, "abnormal websocket closure", !closing);
                    break;
                }
                None => {
                    observer.on_close(ABNORMAL_CLOSURE, "websocket stream ended", !closing);
                    break;
                }
            },
        }
    }
}

/// The production [`SocketFactory`].
pub fn websocket_factory() -> SocketFactory {
    Arc::new(|url, observer| {
        Ok(Box::new(WebSocketAdapter::new(url, observer)?) as Box<dyn SocketAdapter>)
    })
}

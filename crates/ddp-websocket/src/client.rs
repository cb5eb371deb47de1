//! WebSocket DDP transport.

use crate::{TransportError, TransportResult};
use ddp_protocol::{ClientMessage, ServerMessage, Transport, TransportEvent};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// WebSocket transport configuration.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Server URL, e.g. `ws://localhost:3000/websocket`.
    pub url: String,
    /// Interval between client `ping` frames. Zero disables them.
    pub heartbeat_interval_secs: u64,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:3000/websocket".to_string(),
            heartbeat_interval_secs: 25,
        }
    }
}

/// Socket state as seen by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Handshake frame sent, waiting for the server's `connected`.
    Handshaking,
    Connected,
}

type OutboundRx = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<ClientMessage>>>;

/// [`Transport`] speaking DDP JSON frames over a WebSocket.
pub struct WebSocketTransport {
    config: WebSocketConfig,
    runtime: Handle,
    state: Arc<Mutex<ConnectionState>>,
    outbound_tx: mpsc::UnboundedSender<ClientMessage>,
    outbound_rx: OutboundRx,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    next_id: AtomicU64,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketTransport {
    /// Create a transport bound to the current tokio runtime, together with
    /// the receiver its events are delivered on.
    pub fn new(
        config: WebSocketConfig,
    ) -> TransportResult<(Self, mpsc::UnboundedReceiver<TransportEvent>)> {
        let runtime =
            Handle::try_current().map_err(|e| TransportError::NoRuntime(e.to_string()))?;
        Ok(Self::with_runtime(config, runtime))
    }

    /// Create a transport whose socket tasks run on `runtime`.
    pub fn with_runtime(
        config: WebSocketConfig,
        runtime: Handle,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let transport = Self {
            config,
            runtime,
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            outbound_tx,
            outbound_rx: Arc::new(tokio::sync::Mutex::new(outbound_rx)),
            event_tx,
            next_id: AtomicU64::new(1),
            task: Mutex::new(None),
        };
        (transport, event_rx)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn next_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    fn enqueue(&self, message: ClientMessage) {
        // The receiver lives as long as `self`, so this cannot fail.
        let _ = self.outbound_tx.send(message);
    }
}

impl Transport for WebSocketTransport {
    fn connect(&self) {
        {
            let mut state = self.state.lock();
            if *state != ConnectionState::Disconnected {
                debug!(state = ?*state, "Already connecting or connected");
                return;
            }
            *state = ConnectionState::Connecting;
        }

        let session = Session {
            config: self.config.clone(),
            state: self.state.clone(),
            outbound_tx: self.outbound_tx.clone(),
            outbound_rx: self.outbound_rx.clone(),
            event_tx: self.event_tx.clone(),
        };
        let handle = self.runtime.spawn(session.run());
        if let Some(previous) = self.task.lock().replace(handle) {
            previous.abort();
        }
    }

    fn disconnect(&self) {
        let task = self.task.lock().take();
        let was = std::mem::replace(&mut *self.state.lock(), ConnectionState::Disconnected);

        if let Some(task) = task {
            task.abort();
        }
        if was != ConnectionState::Disconnected {
            info!(url = %self.config.url, "Disconnected by client");
            let _ = self.event_tx.send(TransportEvent::Disconnected);
        }
    }

    fn method(&self, name: &str, params: Vec<Value>) -> String {
        let id = self.next_id();
        self.enqueue(ClientMessage::Method {
            id: id.clone(),
            method: name.to_string(),
            params,
        });
        id
    }

    fn sub(&self, name: &str, params: &[Value]) -> String {
        let id = self.next_id();
        self.enqueue(ClientMessage::Sub {
            id: id.clone(),
            name: name.to_string(),
            params: params.to_vec(),
        });
        id
    }

    fn unsub(&self, id: &str) {
        self.enqueue(ClientMessage::Unsub { id: id.to_string() });
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

/// One connection attempt and, if it succeeds, its lifetime.
struct Session {
    config: WebSocketConfig,
    state: Arc<Mutex<ConnectionState>>,
    outbound_tx: mpsc::UnboundedSender<ClientMessage>,
    outbound_rx: OutboundRx,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
}

impl Session {
    async fn run(self) {
        if let Err(e) = self.connect_and_pump().await {
            warn!(url = %self.config.url, error = %e, "WebSocket session ended with error");
        }

        *self.state.lock() = ConnectionState::Disconnected;
        let _ = self.event_tx.send(TransportEvent::Disconnected);
    }

    async fn connect_and_pump(&self) -> TransportResult<()> {
        info!(url = %self.config.url, "Connecting");
        let (ws_stream, _) = connect_async(self.config.url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        write
            .send(Message::Text(ClientMessage::connect().to_json()?.into()))
            .await?;
        *self.state.lock() = ConnectionState::Handshaking;
        debug!("Sent connect frame");

        // Writer: drains everything queued so far, then follows the queue.
        let outbound_rx = self.outbound_rx.clone();
        let writer = tokio::spawn(async move {
            let mut rx = outbound_rx.lock().await;
            while let Some(message) = rx.recv().await {
                let json = match message.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        error!(error = %e, "Failed to encode frame");
                        continue;
                    }
                };
                if write.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        });

        let heartbeat = (self.config.heartbeat_interval_secs > 0).then(|| {
            let tx = self.outbound_tx.clone();
            let period = Duration::from_secs(self.config.heartbeat_interval_secs);
            tokio::spawn(async move {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if tx.send(ClientMessage::Ping { id: None }).is_err() {
                        break;
                    }
                }
            })
        });

        let result = self.read_loop(&mut read).await;

        writer.abort();
        if let Some(heartbeat) = heartbeat {
            heartbeat.abort();
        }
        result
    }

    async fn read_loop<S>(&self, read: &mut S) -> TransportResult<()>
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        while let Some(frame) = read.next().await {
            match frame? {
                Message::Text(text) => self.handle_text(text.as_str())?,
                Message::Close(_) => {
                    info!(url = %self.config.url, "Server closed the connection");
                    return Ok(());
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn handle_text(&self, text: &str) -> TransportResult<()> {
        let message = match ServerMessage::from_json(text) {
            Ok(message) => message,
            Err(ddp_protocol::ProtocolError::UnknownMessage(kind)) => {
                debug!(kind = %kind, "Ignoring frame");
                return Ok(());
            }
            Err(e) => {
                warn!(error = %e, "Failed to parse frame");
                return Ok(());
            }
        };

        match &message {
            ServerMessage::Ping { id } => {
                let _ = self.outbound_tx.send(ClientMessage::Pong { id: id.clone() });
                return Ok(());
            }
            ServerMessage::Failed { version } => {
                return Err(TransportError::Connection(format!(
                    "server requires DDP version {version}"
                )));
            }
            ServerMessage::Error {
                reason,
                offending_message,
            } => {
                warn!(reason = %reason, offending = ?offending_message, "Server reported a protocol error");
                return Ok(());
            }
            ServerMessage::Connected { session } => {
                *self.state.lock() = ConnectionState::Connected;
                info!(session = %session, "Connected");
            }
            _ => {}
        }

        if let Some(event) = TransportEvent::from_server_message(message) {
            let _ = self.event_tx.send(event);
        }
        Ok(())
    }
}

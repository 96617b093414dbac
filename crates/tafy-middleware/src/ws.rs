//! [`WsTransport`] – rosbridge-style JSON frames over a WebSocket.
//!
//! Frames follow the `rosbridge_server` protocol:
//!
//! ```json
//! {"op": "subscribe",   "topic": "hal/v1/motor/cmd"}
//! {"op": "unsubscribe", "topic": "hal/v1/motor/cmd"}
//! {"op": "publish",     "topic": "hal/v1/motor/telemetry/robot-1", "msg": {...}}
//! ```
//!
//! The socket is driven by a single-threaded Tokio runtime on a background
//! thread. The control loop never awaits: [`connect`][Transport::connect]
//! returns once the worker is spawned, outbound frames are queued on an
//! unbounded channel (and flushed when the handshake completes) and inbound
//! publishes are buffered until the next [`poll`][Transport::poll].

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::transport::{BrokerEndpoint, RawMessage, Transport};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Build a rosbridge frame. `msg` is only included for publishes.
pub fn encode_frame(op: &str, topic: &str, msg: Option<Value>) -> String {
    match msg {
        Some(msg) => json!({"op": op, "topic": topic, "msg": msg}).to_string(),
        None => json!({"op": op, "topic": topic}).to_string(),
    }
}

/// Extract a publish frame's topic and serialized `msg`. Other ops and
/// malformed frames yield `None`.
pub fn decode_publish(text: &str) -> Option<RawMessage> {
    let frame: Value = serde_json::from_str(text).ok()?;
    if frame.get("op").and_then(Value::as_str) != Some("publish") {
        return None;
    }
    let topic = frame.get("topic").and_then(Value::as_str)?;
    let msg = frame.get("msg")?;
    Some(RawMessage::new(topic, msg.to_string().into_bytes()))
}

/// Socket lifecycle shared with the worker thread.
#[derive(Debug, Default)]
struct LinkState(AtomicU8);

impl LinkState {
    const CONNECTING: u8 = 0;
    const OPEN: u8 = 1;
    const CLOSED: u8 = 2;

    fn get(&self) -> u8 {
        self.0.load(Ordering::SeqCst)
    }

    fn set(&self, state: u8) {
        self.0.store(state, Ordering::SeqCst);
    }
}

struct WsLink {
    outbound: mpsc::UnboundedSender<String>,
    inbound: std_mpsc::Receiver<RawMessage>,
    state: Arc<LinkState>,
}

pub struct WsTransport {
    connect_timeout: Duration,
    link: Option<WsLink>,
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl WsTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            link: None,
        }
    }

    fn send_frame(&self, frame: String) -> Result<(), TransportError> {
        let link = self.link.as_ref().ok_or(TransportError::NotConnected)?;
        if link.state.get() == LinkState::CLOSED {
            return Err(TransportError::NotConnected);
        }
        link.outbound
            .send(frame)
            .map_err(|_| TransportError::NotConnected)
    }
}

impl Transport for WsTransport {
    fn kind(&self) -> &str {
        "ws"
    }

    fn connect(
        &mut self,
        endpoint: &BrokerEndpoint,
        client_id: &str,
    ) -> Result<(), TransportError> {
        if !endpoint.scheme.is_websocket() {
            return Err(TransportError::InvalidEndpoint(format!(
                "{endpoint} is not a WebSocket address"
            )));
        }
        self.disconnect();

        let url = endpoint.url();
        let timeout = self.connect_timeout;
        let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = std_mpsc::channel::<RawMessage>();
        let state = Arc::new(LinkState::default());
        let worker_state = state.clone();
        let name = format!("ws-{client_id}");

        thread::Builder::new()
            .name(name)
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        warn!(error = %e, "failed to build websocket runtime");
                        worker_state.set(LinkState::CLOSED);
                        return;
                    }
                };
                runtime.block_on(run_socket(url, timeout, out_rx, in_tx, worker_state));
            })
            .map_err(|e| TransportError::Io(e.to_string()))?;

        self.link = Some(WsLink {
            outbound: out_tx,
            inbound: in_rx,
            state,
        });
        Ok(())
    }

    fn disconnect(&mut self) {
        // Dropping the outbound sender closes the socket task.
        self.link = None;
    }

    fn is_connected(&self) -> bool {
        self.link
            .as_ref()
            .is_some_and(|l| l.state.get() == LinkState::OPEN)
    }

    fn is_connecting(&self) -> bool {
        self.link
            .as_ref()
            .is_some_and(|l| l.state.get() == LinkState::CONNECTING)
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        let msg = serde_json::from_slice::<Value>(payload)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(payload).into_owned()));
        self.send_frame(encode_frame("publish", topic, Some(msg)))
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.send_frame(encode_frame("subscribe", topic, None))
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.send_frame(encode_frame("unsubscribe", topic, None))
    }

    fn poll(&mut self) -> Vec<RawMessage> {
        match &self.link {
            Some(link) => link.inbound.try_iter().collect(),
            None => Vec::new(),
        }
    }
}

async fn run_socket(
    url: String,
    timeout: Duration,
    mut outbound: mpsc::UnboundedReceiver<String>,
    inbound: std_mpsc::Sender<RawMessage>,
    state: Arc<LinkState>,
) {
    let stream = match tokio::time::timeout(timeout, connect_async(url.as_str())).await {
        Ok(Ok((stream, _))) => stream,
        Ok(Err(e)) => {
            warn!(url = %url, error = %e, "websocket handshake failed");
            state.set(LinkState::CLOSED);
            return;
        }
        Err(_) => {
            warn!(url = %url, timeout_ms = timeout.as_millis() as u64, "websocket handshake timed out");
            state.set(LinkState::CLOSED);
            return;
        }
    };
    state.set(LinkState::OPEN);
    debug!(url = %url, "websocket open");

    let (mut ws_tx, mut ws_rx) = stream.split();
    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                };
                if let Err(e) = ws_tx.send(Message::Text(frame.into())).await {
                    warn!(url = %url, error = %e, "websocket send failed");
                    break;
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(raw) = decode_publish(text.as_str())
                            && inbound.send(raw).is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(url = %url, error = %e, "websocket receive failed");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    state.set(LinkState::CLOSED);
    debug!(url = %url, "websocket closed");
}

//! [`TransportBridge`] – logical subjects over a flat-topic [`Transport`].
//!
//! The node speaks in dot-delimited subjects (`hal.v1.motor.cmd`); brokers
//! such as the rosbridge WebSocket speak in `/`-delimited topics
//! (`hal/v1/motor/cmd`). The bridge translates between the two, owns the
//! connection lifecycle and routes inbound documents by exact topic.
//!
//! Failure semantics:
//!
//! - connection attempts never block: a transport still handshaking counts
//!   as not connected, is not retried and is not reported lost;
//! - reconnection is throttled to one attempt per fixed backoff interval and
//!   retried indefinitely;
//! - publish and subscribe fail fast while disconnected, nothing is queued;
//! - inbound bytes that are not JSON are logged and dropped, as are
//!   documents on topics without a handler.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::error::TransportError;
use crate::transport::{BrokerEndpoint, Transport};

pub const SUBJECT_DELIMITER: char = '.';
pub const TOPIC_DELIMITER: char = '/';

/// Default fixed interval between reconnection attempts.
pub const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 5000;

/// `hal.v1.motor.cmd` → `hal/v1/motor/cmd`.
pub fn subject_to_topic(subject: &str) -> Result<String, TransportError> {
    check_segments(subject, SUBJECT_DELIMITER, TOPIC_DELIMITER)?;
    Ok(subject.replace(SUBJECT_DELIMITER, "/"))
}

/// `hal/v1/motor/cmd` → `hal.v1.motor.cmd`.
pub fn topic_to_subject(topic: &str) -> Result<String, TransportError> {
    check_segments(topic, TOPIC_DELIMITER, SUBJECT_DELIMITER)?;
    Ok(topic.replace(TOPIC_DELIMITER, "."))
}

/// Segments must be non-empty and must not contain the other side's delimiter,
/// otherwise the mapping would not be reversible.
fn check_segments(name: &str, delimiter: char, foreign: char) -> Result<(), TransportError> {
    if name.split(delimiter).any(|seg| seg.is_empty() || seg.contains(foreign)) {
        return Err(TransportError::InvalidSubject(name.to_string()));
    }
    Ok(())
}

pub type TopicHandler<C> = Box<dyn FnMut(&mut C, Value) + Send>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub published: u64,
    pub received: u64,
    pub parse_errors: u64,
    pub unmatched: u64,
    pub connect_attempts: u64,
}

pub struct TransportBridge<C> {
    transport: Box<dyn Transport>,
    client_id: String,
    endpoint: Option<BrokerEndpoint>,
    handlers: HashMap<String, TopicHandler<C>>,
    connected: bool,
    last_attempt_ms: Option<u64>,
    backoff_ms: u64,
    stats: BridgeStats,
}

impl<C> TransportBridge<C> {
    pub fn new(transport: Box<dyn Transport>, client_id: impl Into<String>) -> Self {
        Self {
            transport,
            client_id: client_id.into(),
            endpoint: None,
            handlers: HashMap::new(),
            connected: false,
            last_attempt_ms: None,
            backoff_ms: DEFAULT_RECONNECT_BACKOFF_MS,
            stats: BridgeStats::default(),
        }
    }

    pub fn with_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.backoff_ms = backoff_ms;
        self
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    pub fn endpoint(&self) -> Option<&BrokerEndpoint> {
        self.endpoint.as_ref()
    }

    /// Set the broker address. An existing connection is closed.
    pub fn configure(&mut self, address: &str) -> Result<(), TransportError> {
        let endpoint = BrokerEndpoint::parse(address)?;
        if self.connected {
            self.transport.disconnect();
            self.connected = false;
        }
        info!(broker = %endpoint, transport = self.transport.kind(), "broker configured");
        self.endpoint = Some(endpoint);
        Ok(())
    }

    /// Start one connection attempt. Once started, every topic with a
    /// registered handler is subscribed again; transports that handshake in
    /// the background send those frames when the link opens.
    pub fn connect(&mut self, now_ms: u64) -> bool {
        self.last_attempt_ms = Some(now_ms);
        let Some(endpoint) = self.endpoint.clone() else {
            warn!(error = %TransportError::NotConfigured, "cannot connect");
            return false;
        };
        if !self.transport.link_up() {
            debug!(broker = %endpoint, "network link down, connection deferred");
            return false;
        }

        self.stats.connect_attempts += 1;
        if let Err(e) = self.transport.connect(&endpoint, &self.client_id) {
            warn!(broker = %endpoint, error = %e, "broker connection failed");
            self.connected = false;
            return false;
        }
        self.connected = true;
        info!(broker = %endpoint, client_id = %self.client_id, "connected to broker");

        let topics: Vec<String> = self.handlers.keys().cloned().collect();
        for topic in topics {
            if let Err(e) = self.transport.subscribe(&topic) {
                warn!(topic = %topic, error = %e, "resubscribe failed");
            }
        }
        true
    }

    /// Connect unless already connected, at most once per backoff interval.
    pub fn reconnect(&mut self, now_ms: u64) -> bool {
        if self.connected() {
            return true;
        }
        if self.connected && self.transport.is_connecting() {
            return false;
        }
        if let Some(last) = self.last_attempt_ms
            && now_ms.saturating_sub(last) < self.backoff_ms
        {
            trace!(retry_in_ms = self.backoff_ms - now_ms.saturating_sub(last), "reconnect throttled");
            return false;
        }
        debug!("attempting broker reconnection");
        self.connect(now_ms)
    }

    pub fn connected(&self) -> bool {
        self.connected && self.transport.is_connected()
    }

    /// Drain and dispatch buffered inbound messages. Returns the number
    /// handed to a handler.
    pub fn pump(&mut self, ctx: &mut C) -> usize {
        if self.connected && self.transport.is_connecting() {
            return 0;
        }
        if self.connected && !self.transport.is_connected() {
            warn!("broker connection lost");
            self.connected = false;
        }
        if !self.connected {
            return 0;
        }

        let mut handled = 0;
        for msg in self.transport.poll() {
            self.stats.received += 1;
            let doc: Value = match serde_json::from_slice(&msg.payload) {
                Ok(doc) => doc,
                Err(e) => {
                    self.stats.parse_errors += 1;
                    warn!(topic = %msg.topic, error = %e, "dropping unparseable message");
                    continue;
                }
            };
            match self.handlers.get_mut(&msg.topic) {
                Some(handler) => {
                    handler(ctx, doc);
                    handled += 1;
                }
                None => {
                    self.stats.unmatched += 1;
                    debug!(topic = %msg.topic, "no handler for topic, message dropped");
                }
            }
        }
        handled
    }

    pub fn publish(&mut self, subject: &str, doc: &Value) -> bool {
        if !self.connected() {
            trace!(subject, "publish skipped: not connected");
            return false;
        }
        let topic = match subject_to_topic(subject) {
            Ok(topic) => topic,
            Err(e) => {
                warn!(error = %e, "publish rejected");
                return false;
            }
        };
        let bytes = match serde_json::to_vec(doc) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(subject, error = %e, "failed to serialize document");
                return false;
            }
        };
        match self.transport.publish(&topic, &bytes) {
            Ok(()) => {
                self.stats.published += 1;
                true
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "publish failed");
                false
            }
        }
    }

    /// Register `handler` for `subject` (replacing any previous one) and
    /// subscribe if connected. The handler is kept while disconnected and
    /// subscribed on the next successful connect, but this returns `false`.
    pub fn subscribe<F>(&mut self, subject: &str, handler: F) -> bool
    where
        F: FnMut(&mut C, Value) + Send + 'static,
    {
        let topic = match subject_to_topic(subject) {
            Ok(topic) => topic,
            Err(e) => {
                warn!(error = %e, "subscribe rejected");
                return false;
            }
        };
        self.handlers.insert(topic.clone(), Box::new(handler));
        if !self.connected {
            debug!(subject, "subscription deferred until connected");
            return false;
        }
        match self.transport.subscribe(&topic) {
            Ok(()) => {
                debug!(topic = %topic, "subscribed");
                true
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "subscribe failed");
                false
            }
        }
    }

    pub fn unsubscribe(&mut self, subject: &str) -> bool {
        let Ok(topic) = subject_to_topic(subject) else {
            return false;
        };
        let had_handler = self.handlers.remove(&topic).is_some();
        if self.connected()
            && let Err(e) = self.transport.unsubscribe(&topic)
        {
            warn!(topic = %topic, error = %e, "unsubscribe failed");
            return false;
        }
        had_handler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackBroker;
    use serde_json::json;

    type Inbox = Vec<Value>;

    fn bridge(broker: &LoopbackBroker) -> TransportBridge<Inbox> {
        let mut b = TransportBridge::new(Box::new(broker.transport()), "robot-1");
        b.configure("nats://loopback:4222").unwrap();
        b
    }

    #[test]
    fn subject_topic_translation() {
        assert_eq!(subject_to_topic("hal.v1.motor.cmd").unwrap(), "hal/v1/motor/cmd");
        assert_eq!(
            topic_to_subject("hal/v1/motor/telemetry/robot-1").unwrap(),
            "hal.v1.motor.telemetry.robot-1"
        );
        let s = "hal.v1.sensor.telemetry.r1";
        assert_eq!(topic_to_subject(&subject_to_topic(s).unwrap()).unwrap(), s);
    }

    #[test]
    fn literal_delimiters_are_rejected() {
        assert!(subject_to_topic("hal.v1.motor/left.cmd").is_err());
        assert!(subject_to_topic("hal..cmd").is_err());
        assert!(subject_to_topic("").is_err());
        assert!(topic_to_subject("hal/v1.0/cmd").is_err());
    }

    #[test]
    fn connect_requires_configuration() {
        let broker = LoopbackBroker::default();
        let mut b: TransportBridge<Inbox> = TransportBridge::new(Box::new(broker.transport()), "r");
        assert!(!b.connect(0));
        assert!(!b.connected());
        assert!(b.configure("http://nope").is_err());
    }

    #[test]
    fn publish_fails_fast_while_disconnected() {
        let broker = LoopbackBroker::default();
        let mut tap = broker.tap();
        let mut b = bridge(&broker);
        assert!(!b.publish("hal.v1.motor.telemetry.r1", &json!({})));
        assert!(tap.drain().is_empty());
        assert!(b.connect(0));
        assert!(b.publish("hal.v1.motor.telemetry.r1", &json!({"a": 1})));
        let sent = tap.drain_topic("hal/v1/motor/telemetry/r1");
        assert_eq!(sent.len(), 1);
        assert_eq!(serde_json::from_slice::<Value>(&sent[0].payload).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn inbound_routes_by_exact_topic() {
        let broker = LoopbackBroker::default();
        let mut b = bridge(&broker);
        b.connect(0);
        assert!(b.subscribe("hal.v1.motor.cmd", |inbox: &mut Inbox, doc| inbox.push(doc)));
        broker.inject("hal/v1/motor/cmd", br#"{"n":1}"#.to_vec());
        broker.inject("hal/v1/motor/cmd/extra", br#"{"n":2}"#.to_vec());

        let mut inbox = Inbox::new();
        assert_eq!(b.pump(&mut inbox), 1);
        assert_eq!(inbox, vec![json!({"n": 1})]);
    }

    #[test]
    fn unparseable_payload_is_dropped() {
        let broker = LoopbackBroker::default();
        let mut b = bridge(&broker);
        b.connect(0);
        b.subscribe("hal.v1.motor.cmd", |inbox: &mut Inbox, doc| inbox.push(doc));
        broker.inject("hal/v1/motor/cmd", b"{not json".to_vec());
        broker.inject("hal/v1/motor/cmd", br#"{"ok":true}"#.to_vec());
        let mut inbox = Inbox::new();
        assert_eq!(b.pump(&mut inbox), 1);
        assert_eq!(b.stats().parse_errors, 1);
        assert_eq!(inbox.len(), 1);
    }

    #[test]
    fn handlers_survive_reconnect() {
        let broker = LoopbackBroker::default();
        let mut b = bridge(&broker);
        assert!(!b.subscribe("hal.v1.sensor.cmd", |inbox: &mut Inbox, doc| inbox.push(doc)));
        assert!(b.connect(0));
        broker.inject("hal/v1/sensor/cmd", br#"{"mode":"long_range"}"#.to_vec());
        let mut inbox = Inbox::new();
        assert_eq!(b.pump(&mut inbox), 1);

        broker.set_online(false);
        assert_eq!(b.pump(&mut inbox), 0);
        assert!(!b.connected());
        broker.set_online(true);
        assert!(b.reconnect(10_000));
        broker.inject("hal/v1/sensor/cmd", br#"{"mode":"default"}"#.to_vec());
        assert_eq!(b.pump(&mut inbox), 1);
    }

    #[test]
    fn reconnect_is_throttled() {
        let broker = LoopbackBroker::default();
        broker.set_online(false);
        let mut b = bridge(&broker);
        assert!(!b.reconnect(0));
        assert!(!b.reconnect(1_000));
        assert!(!b.reconnect(4_999));
        assert_eq!(b.stats().connect_attempts, 1);
        assert!(!b.reconnect(5_000));
        assert_eq!(b.stats().connect_attempts, 2);
        broker.set_online(true);
        assert!(!b.reconnect(6_000));
        assert!(b.reconnect(10_000));
        assert!(b.connected());
    }

    #[test]
    fn link_down_defers_connection() {
        let broker = LoopbackBroker::default();
        broker.set_link(false);
        let mut b = bridge(&broker);
        assert!(!b.connect(0));
        assert_eq!(b.stats().connect_attempts, 0);
    }

    #[test]
    fn pending_handshake_is_neither_retried_nor_lost() {
        use crate::ws::WsTransport;
        use std::time::{Duration, Instant};

        // Accepts TCP through the backlog but never answers the handshake.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut b: TransportBridge<Inbox> =
            TransportBridge::new(Box::new(WsTransport::new(Duration::from_secs(3))), "r");
        b.configure(&format!("ws://127.0.0.1:{port}")).unwrap();

        let started = Instant::now();
        assert!(b.connect(0));
        assert!(started.elapsed() < Duration::from_millis(100));
        assert!(!b.connected());
        assert!(!b.publish("hal.v1.motor.telemetry.r", &json!({})));

        let mut inbox = Inbox::new();
        assert_eq!(b.pump(&mut inbox), 0);
        assert!(!b.reconnect(6_000));
        assert_eq!(b.stats().connect_attempts, 1);
        drop(listener);
    }

    #[test]
    fn unsubscribe_removes_handler() {
        let broker = LoopbackBroker::default();
        let mut b = bridge(&broker);
        b.connect(0);
        b.subscribe("hal.v1.motor.cmd", |inbox: &mut Inbox, doc| inbox.push(doc));
        assert!(b.unsubscribe("hal.v1.motor.cmd"));
        broker.inject("hal/v1/motor/cmd", br#"{}"#.to_vec());
        let mut inbox = Inbox::new();
        assert_eq!(b.pump(&mut inbox), 0);
        assert!(!b.unsubscribe("hal.v1.motor.cmd"));
    }
}

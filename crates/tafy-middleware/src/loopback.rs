//! In-memory broker for tests and offline simulation.
//!
//! [`LoopbackBroker`] fans every published message out to all connected
//! clients over a [`tokio::sync::broadcast`] channel, so each client sees the
//! full traffic without blocking the others. A [`LoopbackTransport`] filters
//! what it receives down to its own subscriptions.
//!
//! The broker handle is cheap to clone: tests keep one to inject inbound
//! messages, tap outbound ones, or take the broker offline.
//!
//! # Example
//!
//! ```rust
//! use tafy_middleware::loopback::LoopbackBroker;
//! use tafy_middleware::transport::{BrokerEndpoint, Transport};
//!
//! let broker = LoopbackBroker::default();
//! let mut client = broker.transport();
//! let endpoint = BrokerEndpoint::parse("nats://loopback").unwrap();
//! client.connect(&endpoint, "robot-1").unwrap();
//! client.subscribe("hal/v1/motor/cmd").unwrap();
//!
//! broker.inject("hal/v1/motor/cmd", br#"{"ts":1}"#.to_vec());
//! assert_eq!(client.poll().len(), 1);
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::warn;

use crate::error::TransportError;
use crate::transport::{BrokerEndpoint, RawMessage, Transport};

/// Messages buffered per client before the oldest are dropped.
const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone, Debug)]
pub struct LoopbackBroker {
    sender: broadcast::Sender<RawMessage>,
    online: Arc<AtomicBool>,
    link: Arc<AtomicBool>,
}

impl Default for LoopbackBroker {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LoopbackBroker {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            online: Arc::new(AtomicBool::new(true)),
            link: Arc::new(AtomicBool::new(true)),
        }
    }

    /// A new, unconnected client of this broker.
    pub fn transport(&self) -> LoopbackTransport {
        LoopbackTransport {
            broker: self.clone(),
            rx: None,
            subscriptions: HashSet::new(),
        }
    }

    /// Publish from outside any client. Returns the number of clients that
    /// will see the message.
    pub fn inject(&self, topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> usize {
        self.sender
            .send(RawMessage::new(topic, payload))
            .unwrap_or(0)
    }

    /// Observe every message published from now on.
    pub fn tap(&self) -> LoopbackTap {
        LoopbackTap {
            rx: self.sender.subscribe(),
        }
    }

    /// Taking the broker offline drops every client's connection and
    /// refuses new ones.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Simulated network link state seen by clients' `link_up`.
    pub fn set_link(&self, up: bool) {
        self.link.store(up, Ordering::SeqCst);
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Passive receiver of all broker traffic.
pub struct LoopbackTap {
    rx: broadcast::Receiver<RawMessage>,
}

impl LoopbackTap {
    pub fn drain(&mut self) -> Vec<RawMessage> {
        let mut out = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(msg) => out.push(msg),
                Err(TryRecvError::Lagged(n)) => warn!(lagged_by = n, "loopback tap lagged"),
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        out
    }

    /// Drained messages published on `topic`.
    pub fn drain_topic(&mut self, topic: &str) -> Vec<RawMessage> {
        self.drain().into_iter().filter(|m| m.topic == topic).collect()
    }
}

pub struct LoopbackTransport {
    broker: LoopbackBroker,
    rx: Option<broadcast::Receiver<RawMessage>>,
    subscriptions: HashSet<String>,
}

impl LoopbackTransport {
    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }
}

impl Transport for LoopbackTransport {
    fn kind(&self) -> &str {
        "loopback"
    }

    fn connect(
        &mut self,
        _endpoint: &BrokerEndpoint,
        _client_id: &str,
    ) -> Result<(), TransportError> {
        if !self.broker.is_online() {
            return Err(TransportError::ConnectFailed("broker offline".into()));
        }
        self.rx = Some(self.broker.sender.subscribe());
        self.subscriptions.clear();
        Ok(())
    }

    fn disconnect(&mut self) {
        self.rx = None;
        self.subscriptions.clear();
    }

    fn is_connected(&self) -> bool {
        self.rx.is_some() && self.broker.is_online()
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        self.ensure_connected()?;
        // No receivers is not an error for a broker.
        let _ = self.broker.sender.send(RawMessage::new(topic, payload));
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.ensure_connected()?;
        self.subscriptions.insert(topic.to_string());
        Ok(())
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.ensure_connected()?;
        self.subscriptions.remove(topic);
        Ok(())
    }

    fn poll(&mut self) -> Vec<RawMessage> {
        if !self.broker.is_online() {
            return Vec::new();
        }
        let Some(rx) = self.rx.as_mut() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(msg) if self.subscriptions.contains(&msg.topic) => out.push(msg),
                Ok(_) => {}
                Err(TryRecvError::Lagged(n)) => {
                    warn!(lagged_by = n, "loopback client lagged, messages dropped");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        out
    }

    fn link_up(&self) -> bool {
        self.broker.link.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> BrokerEndpoint {
        BrokerEndpoint::parse("nats://loopback").unwrap()
    }

    #[test]
    fn unconnected_client_fails_fast() {
        let broker = LoopbackBroker::default();
        let mut client = broker.transport();
        assert!(!client.is_connected());
        assert_eq!(client.publish("a", b"{}"), Err(TransportError::NotConnected));
        assert_eq!(client.subscribe("a"), Err(TransportError::NotConnected));
        assert!(client.poll().is_empty());
    }

    #[test]
    fn delivers_only_subscribed_topics() {
        let broker = LoopbackBroker::default();
        let mut client = broker.transport();
        client.connect(&endpoint(), "c").unwrap();
        client.subscribe("x/cmd").unwrap();
        broker.inject("x/cmd", b"1".to_vec());
        broker.inject("y/cmd", b"2".to_vec());
        let got = client.poll();
        assert_eq!(got, vec![RawMessage::new("x/cmd", b"1".to_vec())]);

        client.unsubscribe("x/cmd").unwrap();
        broker.inject("x/cmd", b"3".to_vec());
        assert!(client.poll().is_empty());
    }

    #[test]
    fn clients_see_each_other() {
        let broker = LoopbackBroker::default();
        let mut a = broker.transport();
        let mut b = broker.transport();
        a.connect(&endpoint(), "a").unwrap();
        b.connect(&endpoint(), "b").unwrap();
        b.subscribe("t").unwrap();
        a.publish("t", b"hello").unwrap();
        assert_eq!(b.poll()[0].payload, b"hello".to_vec());
    }

    #[test]
    fn tap_sees_published_traffic() {
        let broker = LoopbackBroker::default();
        let mut tap = broker.tap();
        let mut a = broker.transport();
        a.connect(&endpoint(), "a").unwrap();
        a.publish("t/1", b"x").unwrap();
        a.publish("t/2", b"y").unwrap();
        assert_eq!(tap.drain_topic("t/2").len(), 1);
    }

    #[test]
    fn offline_broker_drops_and_refuses() {
        let broker = LoopbackBroker::default();
        let mut a = broker.transport();
        a.connect(&endpoint(), "a").unwrap();
        broker.set_online(false);
        assert!(!a.is_connected());
        assert!(matches!(
            a.connect(&endpoint(), "a"),
            Err(TransportError::ConnectFailed(_))
        ));
        broker.set_online(true);
        a.connect(&endpoint(), "a").unwrap();
        assert!(a.is_connected());
    }

    #[test]
    fn link_state_is_shared() {
        let broker = LoopbackBroker::default();
        let a = broker.transport();
        assert!(a.link_up());
        broker.set_link(false);
        assert!(!a.link_up());
    }
}

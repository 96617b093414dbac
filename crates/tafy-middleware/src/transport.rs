//! The raw byte channel a [`TransportBridge`][crate::bridge::TransportBridge]
//! drives, and the broker address it connects to.
//!
//! Transports speak in flat, `/`-delimited topics and opaque byte payloads.
//! Every call is non-blocking or bounded: [`Transport::connect`] is a single
//! attempt, [`Transport::poll`] only drains what is already buffered.

use std::fmt;

use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl RawMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

pub trait Transport: Send {
    /// Stable identifier, e.g. `"loopback"` or `"ws"`.
    fn kind(&self) -> &str;

    /// Start one connection attempt. Transports that handshake in the
    /// background return as soon as the attempt is under way and report
    /// progress through [`is_connecting`][Self::is_connecting].
    fn connect(&mut self, endpoint: &BrokerEndpoint, client_id: &str)
    -> Result<(), TransportError>;

    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// `true` while a started connection attempt has not yet opened or failed.
    fn is_connecting(&self) -> bool {
        false
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError>;

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Drain messages already received on subscribed topics.
    fn poll(&mut self) -> Vec<RawMessage>;

    /// Network-connectivity predicate. Connection attempts are skipped while
    /// it returns `false`.
    fn link_up(&self) -> bool {
        true
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Broker address
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Nats,
    Mqtt,
    Ws,
    Wss,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Nats => "nats",
            Scheme::Mqtt => "mqtt",
            Scheme::Ws => "ws",
            Scheme::Wss => "wss",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Nats => 4222,
            Scheme::Mqtt => 1883,
            Scheme::Ws => 9090,
            Scheme::Wss => 443,
        }
    }

    pub fn is_websocket(self) -> bool {
        matches!(self, Scheme::Ws | Scheme::Wss)
    }
}

/// `scheme://host[:port][/path]`. A missing scheme means `nats`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl BrokerEndpoint {
    pub fn parse(address: &str) -> Result<Self, TransportError> {
        let invalid = |why: &str| TransportError::InvalidEndpoint(format!("{address}: {why}"));

        let address = address.trim();
        let (scheme, rest) = match address.split_once("://") {
            Some((s, rest)) => {
                let scheme = match s.to_ascii_lowercase().as_str() {
                    "nats" => Scheme::Nats,
                    "mqtt" => Scheme::Mqtt,
                    "ws" => Scheme::Ws,
                    "wss" => Scheme::Wss,
                    _ => return Err(invalid("unsupported scheme")),
                };
                (scheme, rest)
            }
            None => (Scheme::Nats, address),
        };

        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, ""),
        };
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| invalid("bad port"))?;
                (host, port)
            }
            None => (authority, scheme.default_port()),
        };
        if host.is_empty() || host.chars().any(char::is_whitespace) {
            return Err(invalid("missing host"));
        }

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }

    pub fn url(&self) -> String {
        format!(
            "{}://{}:{}{}",
            self.scheme.as_str(),
            self.host,
            self.port,
            self.path
        )
    }
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_with_explicit_port() {
        let ep = BrokerEndpoint::parse("nats://broker.local:4333").unwrap();
        assert_eq!(ep.scheme, Scheme::Nats);
        assert_eq!(ep.host, "broker.local");
        assert_eq!(ep.port, 4333);
        assert_eq!(ep.url(), "nats://broker.local:4333");
    }

    #[test]
    fn default_ports_per_scheme() {
        assert_eq!(BrokerEndpoint::parse("nats://h").unwrap().port, 4222);
        assert_eq!(BrokerEndpoint::parse("mqtt://h").unwrap().port, 1883);
        assert_eq!(BrokerEndpoint::parse("ws://h").unwrap().port, 9090);
        assert_eq!(BrokerEndpoint::parse("wss://h").unwrap().port, 443);
    }

    #[test]
    fn bare_host_defaults_to_nats() {
        let ep = BrokerEndpoint::parse("192.168.1.10").unwrap();
        assert_eq!(ep.scheme, Scheme::Nats);
        assert_eq!(ep.port, 4222);
    }

    #[test]
    fn websocket_path_is_kept() {
        let ep = BrokerEndpoint::parse("ws://localhost:9090/bridge").unwrap();
        assert!(ep.scheme.is_websocket());
        assert_eq!(ep.path, "/bridge");
        assert_eq!(ep.to_string(), "ws://localhost:9090/bridge");
    }

    #[test]
    fn rejects_bad_addresses() {
        for bad in ["http://h", "nats://", "nats://h:notaport", "nats://:4222", ""] {
            assert!(
                matches!(
                    BrokerEndpoint::parse(bad),
                    Err(TransportError::InvalidEndpoint(_))
                ),
                "{bad:?} should be rejected"
            );
        }
    }
}

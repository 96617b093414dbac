//! `tafy-middleware` – The Nervous System
//!
//! Moves HAL envelopes between the node and its controller without caring
//! what the payloads mean.
//!
//! # Modules
//!
//! - [`router`] – [`ProtocolRouter`]: envelope validation, device targeting,
//!   schema → capability resolution and handler dispatch.
//! - [`bridge`] – [`TransportBridge`]: subject ↔ topic translation,
//!   connection lifecycle, throttled reconnection, inbound dispatch.
//! - [`transport`] – the [`Transport`] byte-channel trait and
//!   [`BrokerEndpoint`] addresses.
//! - [`loopback`] – in-memory broker for tests and offline runs.
//! - [`ws`] – rosbridge-style WebSocket transport.
//! - [`error`] – [`RouteError`] and [`TransportError`].

pub mod bridge;
pub mod error;
pub mod loopback;
pub mod router;
pub mod transport;
pub mod ws;

pub use bridge::{TransportBridge, subject_to_topic, topic_to_subject};
pub use error::{RouteError, TransportError};
pub use loopback::{LoopbackBroker, LoopbackTransport};
pub use router::{ProtocolRouter, RouterStats};
pub use transport::{BrokerEndpoint, RawMessage, Transport};
pub use ws::WsTransport;

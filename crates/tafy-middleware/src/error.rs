//! Error types of the routing and transport layers.
//!
//! None of these are fatal. The router and bridge log each one at the
//! severity its kind calls for and drop the offending message.

use tafy_types::{Capability, NodeError};
use thiserror::Error;

/// Why an inbound envelope was not dispatched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouteError {
    #[error("Malformed envelope: {0}")]
    Structural(String),

    #[error("Unsupported protocol major version {found} (expected {expected})")]
    VersionMismatch { expected: u32, found: i64 },

    #[error("Envelope addressed to {target}")]
    TargetMismatch { target: String },

    #[error("No capability handles schema {schema}")]
    UnknownCapability { schema: String },

    #[error("No handler registered for {0}")]
    NoHandler(Capability),

    #[error("Handler failed: {0}")]
    Handler(#[from] NodeError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Transport has no broker address configured")]
    NotConfigured,

    #[error("Invalid broker address: {0}")]
    InvalidEndpoint(String),

    #[error("Invalid subject or topic: {0}")]
    InvalidSubject(String),

    #[error("Not connected to broker")]
    NotConnected,

    #[error("Network link is down")]
    LinkDown,

    #[error("Connection attempt failed: {0}")]
    ConnectFailed(String),

    #[error("I/O Error: {0}")]
    Io(String),
}

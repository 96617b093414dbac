//! [`ProtocolRouter`] – envelope validation, device targeting and capability
//! dispatch.
//!
//! The router is the only place that understands envelope plumbing. Handlers
//! receive the bare payload document and a mutable context `C` (the devices
//! they act on), so they stay ignorant of versions and addressing.
//!
//! Checks run in a fixed order; the first failure decides the outcome:
//!
//! | Check | Outcome | Log level |
//! |---|---|---|
//! | all seven fields present, well typed | [`RouteError::Structural`] | `warn` |
//! | `protocol_major` supported | [`RouteError::VersionMismatch`] | `warn` |
//! | `device_id` is this node or `"*"` | [`RouteError::TargetMismatch`] | `trace` |
//! | schema maps to a capability | [`RouteError::UnknownCapability`] | `info` |
//! | a handler is registered | [`RouteError::NoHandler`] | `info` |
//! | handler succeeds | [`RouteError::Handler`] | `warn` |
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use tafy_middleware::ProtocolRouter;
//! use tafy_types::Capability;
//!
//! let mut router: ProtocolRouter<Vec<f64>> =
//!     ProtocolRouter::new("robot-1", vec![Capability::MotorDifferential]);
//! router.register(Capability::MotorDifferential, |seen, payload| {
//!     seen.push(payload["linear_meters_per_sec"].as_f64().unwrap_or(0.0));
//!     Ok(())
//! });
//!
//! let doc = json!({
//!     "protocol_major": 1, "protocol_minor": 0,
//!     "schema": "tafylabs/hal/motor/differential/1.0",
//!     "device_id": "*", "capabilities": [], "ts": 1000,
//!     "payload": {"linear_meters_per_sec": 0.5}
//! });
//! let mut seen = Vec::new();
//! assert_eq!(router.dispatch(&doc, &mut seen), Ok(Capability::MotorDifferential));
//! assert_eq!(seen, vec![0.5]);
//! ```

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, info, trace, warn};

use tafy_types::{Capability, Envelope, NodeError, PROTOCOL_MAJOR};

use crate::error::RouteError;

/// Schema substring → capability. Matched in order.
pub const SCHEMA_TABLE: [(&str, Capability); 3] = [
    ("motor/differential", Capability::MotorDifferential),
    ("system/heartbeat", Capability::SystemHeartbeat),
    ("range-tof", Capability::SensorRangeTof),
];

pub fn resolve_capability(schema: &str) -> Option<Capability> {
    SCHEMA_TABLE
        .iter()
        .find(|(fragment, _)| schema.contains(fragment))
        .map(|(_, cap)| *cap)
}

pub type CapabilityHandler<C> = Box<dyn FnMut(&mut C, &Value) -> Result<(), NodeError> + Send>;

/// Per-outcome message counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub dispatched: u64,
    /// Structural and version failures.
    pub rejected: u64,
    /// Addressed to another device.
    pub ignored: u64,
    /// Unknown schema or no handler.
    pub unhandled: u64,
    pub handler_errors: u64,
}

pub struct ProtocolRouter<C> {
    device_id: String,
    capabilities: Vec<Capability>,
    handlers: HashMap<Capability, CapabilityHandler<C>>,
    stats: RouterStats,
}

impl<C> ProtocolRouter<C> {
    pub fn new(device_id: impl Into<String>, capabilities: Vec<Capability>) -> Self {
        Self {
            device_id: device_id.into(),
            capabilities,
            handlers: HashMap::new(),
            stats: RouterStats::default(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    /// Versioned capability strings this node advertises.
    pub fn advertised_capabilities(&self) -> Vec<String> {
        self.capabilities.iter().map(|c| c.advertised()).collect()
    }

    /// Register the handler for `capability`. A later registration replaces
    /// the earlier one.
    pub fn register<F>(&mut self, capability: Capability, handler: F)
    where
        F: FnMut(&mut C, &Value) -> Result<(), NodeError> + Send + 'static,
    {
        if self.handlers.insert(capability, Box::new(handler)).is_some() {
            debug!(%capability, "capability handler replaced");
        }
    }

    /// Outbound envelope from this node with an empty payload.
    pub fn build_envelope(&self, schema: &str, ts: u64) -> Envelope {
        Envelope::new(schema, &self.device_id, self.advertised_capabilities(), ts)
    }

    /// Structural and version check only; targeting is not considered.
    pub fn validate(&self, doc: &Value) -> bool {
        self.parse(doc).is_ok()
    }

    pub fn parse(&self, doc: &Value) -> Result<Envelope, RouteError> {
        let missing = Envelope::missing_fields(doc);
        if !missing.is_empty() {
            return Err(RouteError::Structural(format!(
                "missing fields: {}",
                missing.join(", ")
            )));
        }
        match Envelope::declared_major(doc) {
            Some(found) if found == i64::from(PROTOCOL_MAJOR) => {}
            Some(found) => {
                return Err(RouteError::VersionMismatch {
                    expected: PROTOCOL_MAJOR,
                    found,
                });
            }
            None => return Err(RouteError::Structural("protocol_major is not an integer".into())),
        }
        serde_json::from_value(doc.clone()).map_err(|e| RouteError::Structural(e.to_string()))
    }

    /// Validate, target, resolve and hand the payload to its handler.
    /// Every failure is logged and counted here; callers may ignore the result.
    pub fn dispatch(&mut self, doc: &Value, ctx: &mut C) -> Result<Capability, RouteError> {
        let result = self.route(doc, ctx);
        match &result {
            Ok(capability) => {
                self.stats.dispatched += 1;
                trace!(%capability, "envelope dispatched");
            }
            Err(e @ (RouteError::Structural(_) | RouteError::VersionMismatch { .. })) => {
                self.stats.rejected += 1;
                warn!(error = %e, "envelope rejected");
            }
            Err(RouteError::TargetMismatch { target }) => {
                self.stats.ignored += 1;
                trace!(target = %target, "envelope for another device ignored");
            }
            Err(e @ (RouteError::UnknownCapability { .. } | RouteError::NoHandler(_))) => {
                self.stats.unhandled += 1;
                info!(error = %e, "envelope unhandled");
            }
            Err(e @ RouteError::Handler(_)) => {
                self.stats.handler_errors += 1;
                warn!(error = %e, "capability handler failed");
            }
        }
        result
    }

    fn route(&mut self, doc: &Value, ctx: &mut C) -> Result<Capability, RouteError> {
        let envelope = self.parse(doc)?;
        if !envelope.is_addressed_to(&self.device_id) {
            return Err(RouteError::TargetMismatch {
                target: envelope.device_id,
            });
        }
        let capability =
            resolve_capability(&envelope.schema).ok_or_else(|| RouteError::UnknownCapability {
                schema: envelope.schema.clone(),
            })?;
        let handler = self
            .handlers
            .get_mut(&capability)
            .ok_or(RouteError::NoHandler(capability))?;
        handler(ctx, &envelope.payload)?;
        Ok(capability)
    }
}

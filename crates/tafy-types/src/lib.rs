//! `tafy-types` – shared vocabulary of a Tafy robot node.
//!
//! Every other crate in the workspace speaks in terms of the types defined
//! here: the versioned HAL [`Envelope`], the closed set of [`Capability`]
//! families a node can serve, the command and telemetry payload documents,
//! the subject naming scheme, and the node-wide [`NodeError`].
//!
//! # Modules
//!
//! - [`envelope`] – [`Envelope`] and its required-field table.
//! - [`motor`] – differential-drive command and telemetry payloads.
//! - [`sensor`] – time-of-flight range command and telemetry payloads.
//! - [`system`] – heartbeat payload.
//! - [`subjects`] – `hal.v1.<domain>.<kind>.<device_id>` subject builders.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod envelope;
pub mod motor;
pub mod sensor;
pub mod subjects;
pub mod system;

pub use envelope::{BROADCAST_DEVICE_ID, Envelope, PROTOCOL_MAJOR, PROTOCOL_MINOR};
pub use motor::{
    DriveStatus, MotorCommand, MotorTelemetry, OdometryReport, RobotParams, WheelPercents,
    WheelVelocities,
};
pub use sensor::{
    CalibrateRequest, CalibrationParams, MeasurementMode, RangeStatistics, RangeStatus,
    SensorCommand, SensorTelemetry,
};
pub use system::{HealthReport, Heartbeat, LinkStatus, NodeStatus};

/// A named command/telemetry schema family a device supports.
///
/// The set is closed: a node either serves one of these families or ignores
/// the message as unhandled.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    schemars::JsonSchema,
)]
pub enum Capability {
    /// Differential-drive velocity / wheel-percent commands.
    MotorDifferential,
    /// Time-of-flight range sensor configuration commands.
    SensorRangeTof,
    /// Liveness probes answered with a heartbeat.
    SystemHeartbeat,
}

impl Capability {
    /// Every capability, in advertisement order.
    pub const ALL: [Capability; 3] = [
        Capability::MotorDifferential,
        Capability::SensorRangeTof,
        Capability::SystemHeartbeat,
    ];

    /// Dotted registry key, e.g. `"motor.differential"`.
    pub fn key(self) -> &'static str {
        match self {
            Capability::MotorDifferential => "motor.differential",
            Capability::SensorRangeTof => "sensor.range-tof",
            Capability::SystemHeartbeat => "system.heartbeat",
        }
    }

    /// Versioned capability string placed in outbound envelopes, e.g.
    /// `"motor.differential:v1.0"`.
    pub fn advertised(self) -> String {
        format!("{}:v{}.{}", self.key(), PROTOCOL_MAJOR, PROTOCOL_MINOR)
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Node-wide error type spanning hardware faults, sensor acquisition
/// failures, malformed payloads and configuration mistakes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Sensor {sensor} timed out")]
    SensorTimeout { sensor: String },

    #[error("Sensor {sensor} is not available")]
    SensorUnavailable { sensor: String },

    #[error("No reading available yet")]
    NoReading,

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<serde_json::Error> for NodeError {
    fn from(e: serde_json::Error) -> Self {
        NodeError::Serialization(e.to_string())
    }
}

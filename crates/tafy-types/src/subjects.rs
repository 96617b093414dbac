//! Subject naming: `hal.v1.<domain>.<kind>[.<device_id>]`.
//!
//! Subjects are dot-delimited. Segments never contain the delimiter, which
//! is why device ids are validated with [`validate_device_id`] before use.

use crate::NodeError;

pub const SUBJECT_ROOT: &str = "hal.v1";
pub const SUBJECT_DELIMITER: char = '.';

pub const MOTOR_CMD: &str = "hal.v1.motor.cmd";
pub const SENSOR_CMD: &str = "hal.v1.sensor.cmd";
pub const SYSTEM_CMD: &str = "hal.v1.system.cmd";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Motor,
    Sensor,
    System,
}

impl Domain {
    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Motor => "motor",
            Domain::Sensor => "sensor",
            Domain::System => "system",
        }
    }
}

/// Shared command subject of a domain, e.g. `hal.v1.motor.cmd`.
pub fn command(domain: Domain) -> String {
    format!("{SUBJECT_ROOT}.{}.cmd", domain.as_str())
}

/// Device-addressed command subject, e.g. `hal.v1.motor.cmd.robot-7`.
pub fn device_command(domain: Domain, device_id: &str) -> String {
    format!("{}.{device_id}", command(domain))
}

pub fn motor_telemetry(device_id: &str) -> String {
    format!("{SUBJECT_ROOT}.motor.telemetry.{device_id}")
}

pub fn sensor_telemetry(device_id: &str) -> String {
    format!("{SUBJECT_ROOT}.sensor.telemetry.{device_id}")
}

pub fn heartbeat(device_id: &str) -> String {
    format!("{SUBJECT_ROOT}.system.heartbeat.{device_id}")
}

/// Reject ids that would break subject or topic segmentation or collide
/// with the broadcast wildcard.
pub fn validate_device_id(device_id: &str) -> Result<(), NodeError> {
    if device_id.is_empty() {
        return Err(NodeError::InvalidConfig("device id must not be empty".into()));
    }
    if let Some(bad) = device_id
        .chars()
        .find(|c| matches!(c, '.' | '/' | '*') || c.is_whitespace())
    {
        return Err(NodeError::InvalidConfig(format!(
            "device id '{device_id}' contains forbidden character {bad:?}"
        )));
    }
    Ok(())
}

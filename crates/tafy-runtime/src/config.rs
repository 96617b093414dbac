//! [`NodeConfig`] – everything needed to assemble a [`RobotNode`][crate::RobotNode].
//!
//! Every field has a default, so a partial TOML/JSON document (or none at
//! all) yields a runnable node.

use serde::{Deserialize, Serialize};

use tafy_hal::{DriveConfig, RangeConfig};
use tafy_kernel::interlock::DEFAULT_STOP_DISTANCE_MM;
use tafy_middleware::bridge::DEFAULT_RECONNECT_BACKOFF_MS;
use tafy_types::NodeError;
use tafy_types::subjects::validate_device_id;

fn default_device_id() -> String {
    "tafy-node".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_device_id")]
    pub device_id: String,
    /// `nats://`, `mqtt://`, `ws://` or `wss://` address. `None` keeps the
    /// node offline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker_url: Option<String>,
    #[serde(default)]
    pub drive: DriveConfig,
    #[serde(default)]
    pub range: RangeConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
            broker_url: None,
            drive: DriveConfig::default(),
            range: RangeConfig::default(),
            safety: SafetyConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Reject values that would break subjects or stall the loop.
    pub fn validate(&self) -> Result<(), NodeError> {
        validate_device_id(&self.device_id)?;
        let periods = [
            ("sensor_interval_ms", self.timing.sensor_interval_ms),
            ("motor_telemetry_interval_ms", self.timing.motor_telemetry_interval_ms),
            ("sensor_telemetry_interval_ms", self.timing.sensor_telemetry_interval_ms),
            ("heartbeat_interval_ms", self.timing.heartbeat_interval_ms),
        ];
        if let Some((name, _)) = periods.iter().find(|(_, ms)| *ms == 0) {
            return Err(NodeError::InvalidConfig(format!("timing.{name} must be positive")));
        }
        let drive = &self.drive;
        if [drive.wheel_base, drive.wheel_radius, drive.max_linear_vel, drive.max_angular_vel, drive.ramp_rate]
            .iter()
            .any(|v| !v.is_finite() || *v <= 0.0)
        {
            return Err(NodeError::InvalidConfig(
                "drive geometry, limits and ramp rate must be positive".into(),
            ));
        }
        if self.range.min_range_mm >= self.range.max_range_mm {
            return Err(NodeError::InvalidConfig(format!(
                "range.min_range_mm ({}) must be below range.max_range_mm ({})",
                self.range.min_range_mm, self.range.max_range_mm
            )));
        }
        if !self.safety.emergency_stop_distance_mm.is_finite()
            || self.safety.emergency_stop_distance_mm < 0.0
        {
            return Err(NodeError::InvalidConfig(
                "safety.emergency_stop_distance_mm must be a non-negative number".into(),
            ));
        }
        Ok(())
    }
}

fn default_stop_distance() -> f32 {
    DEFAULT_STOP_DISTANCE_MM
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Filtered obstacle distance below which the drive is latched off.
    #[serde(default = "default_stop_distance")]
    pub emergency_stop_distance_mm: f32,
    #[serde(default = "default_true")]
    pub proximity_interlock: bool,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            emergency_stop_distance_mm: default_stop_distance(),
            proximity_interlock: true,
        }
    }
}

fn default_sensor_interval() -> u64 {
    100
}
fn default_motor_telemetry_interval() -> u64 {
    200
}
fn default_sensor_telemetry_interval() -> u64 {
    1000
}
fn default_heartbeat_interval() -> u64 {
    10_000
}
fn default_reconnect_backoff() -> u64 {
    DEFAULT_RECONNECT_BACKOFF_MS
}

/// Periods of the scheduled tasks, milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_sensor_interval")]
    pub sensor_interval_ms: u64,
    #[serde(default = "default_motor_telemetry_interval")]
    pub motor_telemetry_interval_ms: u64,
    #[serde(default = "default_sensor_telemetry_interval")]
    pub sensor_telemetry_interval_ms: u64,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_reconnect_backoff")]
    pub reconnect_backoff_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            sensor_interval_ms: default_sensor_interval(),
            motor_telemetry_interval_ms: default_motor_telemetry_interval(),
            sensor_telemetry_interval_ms: default_sensor_telemetry_interval(),
            heartbeat_interval_ms: default_heartbeat_interval(),
            reconnect_backoff_ms: default_reconnect_backoff(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let cfg: NodeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, NodeConfig::default());
        assert_eq!(cfg.timing.heartbeat_interval_ms, 10_000);
        assert_eq!(cfg.safety.emergency_stop_distance_mm, 100.0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg: NodeConfig = serde_json::from_str(
            r#"{"device_id":"r7","timing":{"sensor_interval_ms":20},"drive":{"wheel_base":0.3}}"#,
        )
        .unwrap();
        assert_eq!(cfg.device_id, "r7");
        assert_eq!(cfg.timing.sensor_interval_ms, 20);
        assert_eq!(cfg.timing.motor_telemetry_interval_ms, 200);
        assert_eq!(cfg.drive.wheel_base, 0.3);
        assert_eq!(cfg.drive.max_linear_vel, 1.0);
    }

    #[test]
    fn rejects_bad_device_id() {
        let cfg = NodeConfig {
            device_id: "robot.1".into(),
            ..NodeConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(NodeError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_zero_period() {
        let mut cfg = NodeConfig::default();
        cfg.timing.heartbeat_interval_ms = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("heartbeat_interval_ms"));
    }

    #[test]
    fn rejects_inverted_range() {
        let mut cfg = NodeConfig::default();
        cfg.range.min_range_mm = 3000.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_non_positive_geometry() {
        let mut cfg = NodeConfig::default();
        cfg.drive.wheel_base = 0.0;
        assert!(cfg.validate().is_err());
    }
}

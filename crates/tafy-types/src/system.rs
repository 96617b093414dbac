//! Heartbeat payload published by every node.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{DriveStatus, RangeStatus};

pub const HEARTBEAT_SCHEMA: &str = "tafylabs/hal/system/heartbeat/1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Ok,
    Degraded,
    EmergencyStop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HealthReport {
    pub drive: DriveStatus,
    pub sensor: RangeStatus,
    pub transport: LinkStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Heartbeat {
    pub uptime_seconds: u64,
    pub status: NodeStatus,
    pub health: HealthReport,
    pub active_capabilities: Vec<String>,
    /// Rejected messages, sensor timeouts and read failures, and hardware
    /// faults since boot.
    pub error_count: u64,
    /// Times the emergency stop latched since boot.
    #[serde(default)]
    pub emergency_stops: u64,
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn heartbeat_document_shape() {
        let hb = Heartbeat {
            uptime_seconds: 12,
            status: NodeStatus::Ok,
            health: HealthReport {
                drive: DriveStatus::Idle,
                sensor: RangeStatus::Ok,
                transport: LinkStatus::Connected,
            },
            active_capabilities: vec!["motor.differential:v1.0".into()],
            error_count: 0,
            emergency_stops: 2,
            warnings: vec![],
        };
        let doc = serde_json::to_value(&hb).unwrap();
        assert_eq!(doc["status"], json!("ok"));
        assert_eq!(doc["health"]["transport"], json!("connected"));
        assert_eq!(doc["active_capabilities"][0], json!("motor.differential:v1.0"));
        assert_eq!(doc["emergency_stops"], json!(2));
    }
}

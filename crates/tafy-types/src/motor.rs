//! Differential-drive payloads: [`MotorCommand`] and [`MotorTelemetry`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Schema id of the motor command family.
pub const MOTOR_COMMAND_SCHEMA: &str = "tafylabs/hal/motor/differential/1.0";
/// Schema id stamped on outbound motor telemetry.
pub const MOTOR_TELEMETRY_SCHEMA: &str = "tafylabs/hal/motor/differential-telemetry/1.0";

/// Inbound drive command. Every field is optional and unknown fields are
/// ignored, so one document may carry a velocity request together with a
/// parameter update or an odometry reset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MotorCommand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linear_meters_per_sec: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angular_rad_per_sec: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_percent: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_percent: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub robot_params: Option<RobotParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_odometry: Option<bool>,
    /// `true` latches the emergency stop, `false` releases it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_stop: Option<bool>,
}

impl MotorCommand {
    /// `(linear, angular)` when both are present.
    pub fn velocity(&self) -> Option<(f32, f32)> {
        Some((self.linear_meters_per_sec?, self.angular_rad_per_sec?))
    }

    /// `(left, right)` when both are present.
    pub fn wheel_percents(&self) -> Option<(f32, f32)> {
        Some((self.left_percent?, self.right_percent?))
    }
}

/// Partial update of the robot's kinematic parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RobotParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wheel_base: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wheel_radius: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_linear_vel: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_angular_vel: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DriveStatus {
    EmergencyStop,
    Moving,
    Idle,
}

impl DriveStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DriveStatus::EmergencyStop => "emergency_stop",
            DriveStatus::Moving => "moving",
            DriveStatus::Idle => "idle",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OdometryReport {
    pub x_meters: f32,
    pub y_meters: f32,
    pub theta_rad: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WheelVelocities {
    pub left_meters_per_sec: f32,
    pub right_meters_per_sec: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WheelPercents {
    pub left: f32,
    pub right: f32,
}

/// Periodic drive report: actual (ramped) vs. commanded motion, pose and
/// per-wheel state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MotorTelemetry {
    pub actual_linear_meters_per_sec: f32,
    pub actual_angular_rad_per_sec: f32,
    pub commanded_linear_meters_per_sec: f32,
    pub commanded_angular_rad_per_sec: f32,
    pub odometry: OdometryReport,
    pub wheel_velocities: WheelVelocities,
    pub applied_percent: WheelPercents,
    pub status: DriveStatus,
}

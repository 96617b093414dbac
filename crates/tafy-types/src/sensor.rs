//! Time-of-flight range payloads: [`SensorCommand`] and [`SensorTelemetry`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Schema id of the range sensor family, used for both commands and telemetry.
pub const RANGE_SCHEMA: &str = "tafylabs/hal/sensor/range-tof/1.0";

/// Timing-budget / accuracy trade-off of the ranging element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementMode {
    #[default]
    Default,
    HighSpeed,
    HighAccuracy,
    LongRange,
}

impl MeasurementMode {
    /// Parse a command's `mode` string. Anything unrecognised selects
    /// [`MeasurementMode::Default`].
    pub fn from_command(mode: &str) -> Self {
        match mode {
            "high_speed" => MeasurementMode::HighSpeed,
            "high_accuracy" => MeasurementMode::HighAccuracy,
            "long_range" => MeasurementMode::LongRange,
            _ => MeasurementMode::Default,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MeasurementMode::Default => "default",
            MeasurementMode::HighSpeed => "high_speed",
            MeasurementMode::HighAccuracy => "high_accuracy",
            MeasurementMode::LongRange => "long_range",
        }
    }
}

/// `corrected = raw * scale + offset`, clamped non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CalibrationParams {
    pub offset: f32,
    pub scale: f32,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            offset: 0.0,
            scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CalibrateRequest {
    pub actual_distance_mm: f32,
}

/// Inbound sensor command. Fields are applied in the order mode,
/// calibration parameters, one-point calibration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SensorCommand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calibrate: Option<CalibrateRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calibration: Option<CalibrationParams>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RangeStatistics {
    pub total_readings: u64,
    pub valid_readings: u64,
    pub timeouts: u64,
    /// `valid / total * 100`, or 0 before the first reading.
    pub success_rate: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RangeStatus {
    Ok,
    OutOfRange,
    Timeout,
    Recovering,
    Unavailable,
    NoData,
}

impl RangeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RangeStatus::Ok => "ok",
            RangeStatus::OutOfRange => "out_of_range",
            RangeStatus::Timeout => "timeout",
            RangeStatus::Recovering => "recovering",
            RangeStatus::Unavailable => "unavailable",
            RangeStatus::NoData => "no_data",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SensorTelemetry {
    pub sensor_id: String,
    /// Filtered distance in meters, absent until a valid sample exists.
    pub range_meters: Option<f32>,
    pub raw_mm: Option<u16>,
    pub filtered_mm: Option<f32>,
    pub quality: u8,
    pub status: RangeStatus,
    pub mode: MeasurementMode,
    pub min_range_meters: f32,
    pub max_range_meters: f32,
    pub statistics: RangeStatistics,
    pub calibration: CalibrationParams,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mode_strings() {
        assert_eq!(MeasurementMode::from_command("high_speed"), MeasurementMode::HighSpeed);
        assert_eq!(
            MeasurementMode::from_command("high_accuracy"),
            MeasurementMode::HighAccuracy
        );
        assert_eq!(MeasurementMode::from_command("long_range"), MeasurementMode::LongRange);
        assert_eq!(MeasurementMode::from_command("turbo"), MeasurementMode::Default);
        assert_eq!(MeasurementMode::LongRange.as_str(), "long_range");
    }

    #[test]
    fn sensor_command_parses_all_sections() {
        let cmd: SensorCommand = serde_json::from_value(json!({
            "mode": "long_range",
            "calibrate": {"actual_distance_mm": 500},
            "calibration": {"offset": 2.5, "scale": 1.1}
        }))
        .unwrap();
        assert_eq!(cmd.mode.as_deref(), Some("long_range"));
        assert_eq!(cmd.calibrate.unwrap().actual_distance_mm, 500.0);
        assert_eq!(cmd.calibration.unwrap().scale, 1.1);
    }

    #[test]
    fn default_calibration_is_identity() {
        let c = CalibrationParams::default();
        assert_eq!((c.offset, c.scale), (0.0, 1.0));
    }

    #[test]
    fn status_strings_match_serde() {
        for status in [
            RangeStatus::Ok,
            RangeStatus::OutOfRange,
            RangeStatus::Timeout,
            RangeStatus::Recovering,
            RangeStatus::Unavailable,
            RangeStatus::NoData,
        ] {
            assert_eq!(serde_json::to_value(status).unwrap(), json!(status.as_str()));
        }
    }
}

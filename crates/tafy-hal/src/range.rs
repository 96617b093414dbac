//! [`RangeSensingPipeline`] – from raw time-of-flight results to a filtered,
//! quality-scored distance.
//!
//! Each [`tick`][RangeSensingPipeline::tick] is one acquisition attempt:
//!
//! 1. read the element's latest completed result;
//! 2. correct it with `raw * scale + offset`, clamped non-negative;
//! 3. reject it (quality 0, a zero in the window) when outside the
//!    configured range, otherwise push it into the [`MedianWindow`] and score
//!    quality from the return signal rate;
//! 4. recompute the filtered median.
//!
//! A timeout never leaves a stale value behind: quality drops to 0 and
//! acquisition is stopped. The first tick after the settle interval restarts
//! it, so transient faults heal without re-initializing the element.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use tafy_types::{
    CalibrationParams, MeasurementMode, NodeError, RangeStatistics, RangeStatus, SensorCommand,
    SensorTelemetry,
};

use crate::filter::MedianWindow;
use crate::ranging::{ModeProfile, RangingElement, RawMeasurement};

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Signal-rate thresholds (MCPS) separating the weak / moderate / good /
/// excellent quality buckets. Tuned per ranging element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityLadder {
    pub moderate_mcps: f32,
    pub good_mcps: f32,
    pub excellent_mcps: f32,
}

impl Default for QualityLadder {
    fn default() -> Self {
        Self {
            moderate_mcps: 0.5,
            good_mcps: 1.5,
            excellent_mcps: 5.0,
        }
    }
}

impl QualityLadder {
    pub fn score(&self, signal_rate_mcps: f32) -> u8 {
        if signal_rate_mcps >= self.excellent_mcps {
            100
        } else if signal_rate_mcps >= self.good_mcps {
            75
        } else if signal_rate_mcps >= self.moderate_mcps {
            50
        } else {
            25
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeConfig {
    pub sensor_id: String,
    pub min_range_mm: f32,
    pub max_range_mm: f32,
    /// Filtered change, in mm, that counts as significant.
    pub change_threshold_mm: f32,
    /// Pause between stopping and restarting acquisition after a timeout.
    pub recovery_settle_ms: u64,
    pub mode: MeasurementMode,
    pub quality: QualityLadder,
    pub calibration: CalibrationParams,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            sensor_id: "tof-front".to_string(),
            min_range_mm: 30.0,
            max_range_mm: 2000.0,
            change_threshold_mm: 50.0,
            recovery_settle_ms: 10,
            mode: MeasurementMode::Default,
            quality: QualityLadder::default(),
            calibration: CalibrationParams::default(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pipeline
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Acquisition {
    Idle,
    Unavailable,
    Running,
    Recovering { restart_at_ms: u64 },
}

pub struct RangeSensingPipeline {
    element: Box<dyn RangingElement>,
    config: RangeConfig,
    acquisition: Acquisition,
    window: MedianWindow,
    raw: Option<u16>,
    filtered: Option<f32>,
    previous_filtered: Option<f32>,
    quality: u8,
    last_status: RangeStatus,
    total: u64,
    valid: u64,
    timeouts: u64,
    read_faults: u64,
}

impl RangeSensingPipeline {
    pub fn new(element: Box<dyn RangingElement>, config: RangeConfig) -> Self {
        Self {
            element,
            config,
            acquisition: Acquisition::Idle,
            window: MedianWindow::new(),
            raw: None,
            filtered: None,
            previous_filtered: None,
            quality: 0,
            last_status: RangeStatus::NoData,
            total: 0,
            valid: 0,
            timeouts: 0,
            read_faults: 0,
        }
    }

    /// Initialize the element, apply the configured mode and start
    /// continuous acquisition. On failure the pipeline stays unavailable.
    pub fn begin(&mut self) -> Result<(), NodeError> {
        let result = self
            .element
            .init()
            .and_then(|()| self.start_acquisition());
        match result {
            Ok(()) => {
                info!(
                    sensor = %self.config.sensor_id,
                    element = self.element.id(),
                    mode = self.config.mode.as_str(),
                    "range sensor started"
                );
                Ok(())
            }
            Err(e) => {
                warn!(sensor = %self.config.sensor_id, error = %e, "range sensor unavailable");
                self.acquisition = Acquisition::Unavailable;
                Err(e)
            }
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self.acquisition, Acquisition::Idle | Acquisition::Unavailable)
    }

    /// One acquisition attempt.
    ///
    /// # Errors
    ///
    /// [`NodeError::SensorTimeout`] when the element produced no result,
    /// the element's own error when the read failed (both start the recovery
    /// sequence), [`NodeError::SensorUnavailable`] before a successful
    /// [`begin`][Self::begin].
    pub fn tick(&mut self, now_ms: u64) -> Result<(), NodeError> {
        match self.acquisition {
            Acquisition::Idle | Acquisition::Unavailable => {
                return Err(NodeError::SensorUnavailable {
                    sensor: self.config.sensor_id.clone(),
                });
            }
            Acquisition::Recovering { restart_at_ms } => {
                if now_ms < restart_at_ms {
                    return Ok(());
                }
                self.start_acquisition()?;
                debug!(sensor = %self.config.sensor_id, "acquisition restarted");
                return Ok(());
            }
            Acquisition::Running => {}
        }

        self.total += 1;
        match self.element.read_latest() {
            Ok(m) => {
                self.accept(m);
                Ok(())
            }
            Err(NodeError::SensorTimeout { .. }) => {
                self.timeouts += 1;
                self.last_status = RangeStatus::Timeout;
                warn!(
                    sensor = %self.config.sensor_id,
                    timeouts = self.timeouts,
                    total = self.total,
                    "range acquisition timed out, restarting"
                );
                self.recover(now_ms);
                Err(NodeError::SensorTimeout {
                    sensor: self.config.sensor_id.clone(),
                })
            }
            Err(e) => {
                self.read_faults += 1;
                warn!(
                    sensor = %self.config.sensor_id,
                    error = %e,
                    read_faults = self.read_faults,
                    "range read failed, restarting"
                );
                self.recover(now_ms);
                Err(e)
            }
        }
    }

    pub fn raw_distance(&self) -> Option<u16> {
        self.raw
    }

    /// Median of the valid window entries, in mm.
    pub fn filtered_distance(&self) -> Option<f32> {
        self.filtered
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn mode(&self) -> MeasurementMode {
        self.config.mode
    }

    pub fn calibration(&self) -> CalibrationParams {
        self.config.calibration
    }

    pub fn config(&self) -> &RangeConfig {
        &self.config
    }

    /// `true` when the filtered value moved by more than the change threshold
    /// since the previous acquisition, or a first value appeared.
    pub fn has_significant_change(&self) -> bool {
        match (self.previous_filtered, self.filtered) {
            (None, Some(_)) => true,
            (Some(prev), Some(cur)) => (cur - prev).abs() > self.config.change_threshold_mm,
            _ => false,
        }
    }

    /// Switch mode. Acquisition is stopped, reconfigured and restarted so the
    /// new timing applies at once.
    pub fn set_mode(&mut self, mode: MeasurementMode) -> Result<(), NodeError> {
        self.config.mode = mode;
        if matches!(self.acquisition, Acquisition::Idle | Acquisition::Unavailable) {
            return Ok(());
        }
        self.element.stop_continuous()?;
        self.start_acquisition()?;
        info!(sensor = %self.config.sensor_id, mode = mode.as_str(), "measurement mode changed");
        Ok(())
    }

    /// One-point calibration against a known distance: sets the offset so the
    /// current raw reading corrects to `actual_mm`. Scale is untouched.
    pub fn calibrate(&mut self, actual_mm: f32) -> Result<(), NodeError> {
        let raw = self.raw.ok_or(NodeError::NoReading)?;
        if !actual_mm.is_finite() {
            return Err(NodeError::InvalidPayload(format!(
                "calibration distance {actual_mm} is not finite"
            )));
        }
        self.config.calibration.offset = actual_mm - f32::from(raw);
        info!(
            sensor = %self.config.sensor_id,
            raw_mm = raw,
            actual_mm,
            offset = self.config.calibration.offset,
            "one-point calibration applied"
        );
        Ok(())
    }

    pub fn set_calibration_params(&mut self, offset: f32, scale: f32) -> Result<(), NodeError> {
        if !offset.is_finite() || !scale.is_finite() || scale <= 0.0 {
            return Err(NodeError::InvalidPayload(format!(
                "invalid calibration offset={offset} scale={scale}"
            )));
        }
        self.config.calibration = CalibrationParams { offset, scale };
        info!(sensor = %self.config.sensor_id, offset, scale, "calibration parameters set");
        Ok(())
    }

    /// Decode and apply a sensor command payload: mode, then explicit
    /// calibration parameters, then one-point calibration.
    pub fn handle_command(&mut self, payload: &Value) -> Result<(), NodeError> {
        let cmd: SensorCommand = serde_json::from_value(payload.clone())
            .map_err(|e| NodeError::InvalidPayload(format!("sensor command: {e}")))?;
        if let Some(mode) = &cmd.mode {
            self.set_mode(MeasurementMode::from_command(mode))?;
        }
        if let Some(cal) = cmd.calibration {
            self.set_calibration_params(cal.offset, cal.scale)?;
        }
        if let Some(req) = cmd.calibrate {
            self.calibrate(req.actual_distance_mm)?;
        }
        Ok(())
    }

    /// Reads that failed with an element error rather than a timeout.
    pub fn read_faults(&self) -> u64 {
        self.read_faults
    }

    pub fn statistics(&self) -> RangeStatistics {
        let success_rate = if self.total == 0 {
            0.0
        } else {
            self.valid as f32 / self.total as f32 * 100.0
        };
        RangeStatistics {
            total_readings: self.total,
            valid_readings: self.valid,
            timeouts: self.timeouts,
            success_rate,
        }
    }

    pub fn status(&self) -> RangeStatus {
        match self.acquisition {
            Acquisition::Unavailable => RangeStatus::Unavailable,
            Acquisition::Recovering { .. } => RangeStatus::Recovering,
            Acquisition::Idle => RangeStatus::NoData,
            Acquisition::Running => self.last_status,
        }
    }

    pub fn produce_telemetry(&self) -> SensorTelemetry {
        SensorTelemetry {
            sensor_id: self.config.sensor_id.clone(),
            range_meters: self.filtered.map(|mm| mm / 1000.0),
            raw_mm: self.raw,
            filtered_mm: self.filtered,
            quality: self.quality,
            status: self.status(),
            mode: self.config.mode,
            min_range_meters: self.config.min_range_mm / 1000.0,
            max_range_meters: self.config.max_range_mm / 1000.0,
            statistics: self.statistics(),
            calibration: self.config.calibration,
        }
    }

    // ── internals ──────────────────────────────────────────────────────────

    fn start_acquisition(&mut self) -> Result<(), NodeError> {
        let profile = ModeProfile::for_mode(self.config.mode);
        self.element.configure(&profile)?;
        self.element.start_continuous(profile.period_ms())?;
        self.acquisition = Acquisition::Running;
        Ok(())
    }

    fn corrected(&self, raw_mm: u16) -> f32 {
        let cal = self.config.calibration;
        (f32::from(raw_mm) * cal.scale + cal.offset).max(0.0)
    }

    fn accept(&mut self, m: RawMeasurement) {
        self.raw = Some(m.distance_mm);
        let corrected = self.corrected(m.distance_mm);
        if corrected < self.config.min_range_mm || corrected > self.config.max_range_mm {
            self.quality = 0;
            self.window.push(0.0);
            self.last_status = RangeStatus::OutOfRange;
        } else {
            self.valid += 1;
            self.quality = self.config.quality.score(m.signal_rate_mcps);
            self.window.push(corrected);
            self.last_status = RangeStatus::Ok;
        }
        self.previous_filtered = self.filtered;
        self.filtered = self.window.median();
    }

    /// Drop the current value and schedule a stop, settle, restart cycle.
    fn recover(&mut self, now_ms: u64) {
        self.quality = 0;
        self.raw = None;
        self.previous_filtered = self.filtered;
        self.filtered = None;
        if let Err(e) = self.element.stop_continuous() {
            warn!(sensor = %self.config.sensor_id, error = %e, "failed to stop acquisition");
        }
        self.acquisition = Acquisition::Recovering {
            restart_at_ms: now_ms + self.config.recovery_settle_ms,
        };
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{RangeScript, SimRangingElement};
    use serde_json::json;

    fn pipeline() -> (RangeSensingPipeline, RangeScript) {
        let (tof, script) = SimRangingElement::new("sim_tof");
        let mut p = RangeSensingPipeline::new(tof, RangeConfig::default());
        p.begin().unwrap();
        (p, script)
    }

    #[test]
    fn begin_applies_default_profile() {
        let (p, script) = pipeline();
        assert!(p.is_available());
        assert!(script.is_running());
        assert_eq!(script.profile().unwrap().mode, MeasurementMode::Default);
        assert_eq!(p.status(), RangeStatus::NoData);
    }

    #[test]
    fn begin_failure_marks_unavailable() {
        let (tof, script) = SimRangingElement::new("sim_tof");
        script.set_fail_init(true);
        let mut p = RangeSensingPipeline::new(tof, RangeConfig::default());
        assert!(p.begin().is_err());
        assert_eq!(p.status(), RangeStatus::Unavailable);
        assert!(matches!(
            p.tick(0),
            Err(NodeError::SensorUnavailable { .. })
        ));
    }

    #[test]
    fn median_rejects_outlier_through_pipeline() {
        let (mut p, script) = pipeline();
        for mm in [100, 102, 99, 1000, 101] {
            script.push_reading(mm, 6.0);
        }
        for t in 0..5 {
            p.tick(t * 100).unwrap();
        }
        assert_eq!(p.filtered_distance(), Some(101.0));
        assert_eq!(p.raw_distance(), Some(101));
        assert_eq!(p.quality(), 100);
    }

    #[test]
    fn quality_ladder_buckets() {
        let (mut p, script) = pipeline();
        for (rate, expected) in [(0.2, 25), (0.9, 50), (2.0, 75), (7.5, 100)] {
            script.push_reading(500, rate);
            p.tick(0).unwrap();
            assert_eq!(p.quality(), expected, "signal rate {rate}");
        }
    }

    #[test]
    fn out_of_range_forces_zero_quality() {
        let (mut p, script) = pipeline();
        script.push_reading(500, 6.0);
        script.push_reading(2500, 6.0);
        script.push_reading(10, 6.0);
        p.tick(0).unwrap();
        assert_eq!(p.quality(), 100);
        p.tick(100).unwrap();
        assert_eq!(p.quality(), 0);
        assert_eq!(p.status(), RangeStatus::OutOfRange);
        p.tick(200).unwrap();
        assert_eq!(p.quality(), 0);
        // Only the valid sample remains in the median.
        assert_eq!(p.filtered_distance(), Some(500.0));
        let stats = p.statistics();
        assert_eq!((stats.total_readings, stats.valid_readings), (3, 1));
    }

    #[test]
    fn one_point_calibration() {
        let (mut p, script) = pipeline();
        script.push_reading(480, 6.0);
        script.push_reading(480, 6.0);
        p.tick(0).unwrap();
        p.calibrate(500.0).unwrap();
        assert_eq!(p.calibration().offset, 20.0);
        assert_eq!(p.calibration().scale, 1.0);
        p.tick(100).unwrap();
        // Window holds 480 (pre-calibration) and 500.
        assert_eq!(p.filtered_distance(), Some(490.0));
        assert_eq!(p.corrected(480), 500.0);
    }

    #[test]
    fn calibrate_without_reading_fails() {
        let (mut p, _) = pipeline();
        assert_eq!(p.calibrate(500.0), Err(NodeError::NoReading));
    }

    #[test]
    fn calibration_params_validate_scale() {
        let (mut p, _) = pipeline();
        assert!(p.set_calibration_params(5.0, 0.0).is_err());
        assert!(p.set_calibration_params(5.0, f32::NAN).is_err());
        p.set_calibration_params(-100.0, 2.0).unwrap();
        assert_eq!(p.corrected(100), 100.0);
    }

    #[test]
    fn corrected_value_is_never_negative() {
        let (mut p, _) = pipeline();
        p.set_calibration_params(-200.0, 1.0).unwrap();
        assert_eq!(p.corrected(50), 0.0);
    }

    #[test]
    fn timeout_runs_recovery_sequence() {
        let (mut p, script) = pipeline();
        script.push_reading(400, 6.0);
        script.push_timeout();
        script.push_reading(410, 6.0);
        p.tick(0).unwrap();
        assert_eq!(p.quality(), 100);

        assert!(matches!(p.tick(100), Err(NodeError::SensorTimeout { .. })));
        assert_eq!(p.quality(), 0);
        assert_eq!(p.statistics().timeouts, 1);
        assert_eq!(p.status(), RangeStatus::Recovering);
        assert!(!script.is_running());
        assert_eq!(p.filtered_distance(), None);
        assert_eq!(p.raw_distance(), None);
        let tel = p.produce_telemetry();
        assert_eq!(tel.range_meters, None);
        assert_eq!(tel.filtered_mm, None);
        assert_eq!(tel.status, RangeStatus::Recovering);

        // Settle interval not yet over.
        p.tick(105).unwrap();
        assert!(!script.is_running());
        // Restart.
        p.tick(110).unwrap();
        assert!(script.is_running());
        assert_eq!(script.start_count(), 2);
        p.tick(200).unwrap();
        assert_eq!(p.raw_distance(), Some(410));
        assert_eq!(p.quality(), 100);
        assert_eq!(p.status(), RangeStatus::Ok);
    }

    #[test]
    fn read_fault_drops_value_and_recovers() {
        let (mut p, script) = pipeline();
        script.push_reading(400, 6.0);
        p.tick(0).unwrap();
        assert_eq!(p.status(), RangeStatus::Ok);

        script.set_fault(Some("i2c nack"));
        let err = p.tick(100).unwrap_err();
        assert!(matches!(err, NodeError::HardwareFault { .. }));
        assert_eq!(p.quality(), 0);
        assert_eq!(p.filtered_distance(), None);
        assert_eq!(p.raw_distance(), None);
        assert_eq!(p.status(), RangeStatus::Recovering);
        assert_eq!(p.read_faults(), 1);
        assert_eq!(p.statistics().timeouts, 0);
        assert_eq!(p.produce_telemetry().range_meters, None);
        assert!(!script.is_running());

        script.set_fault(None);
        script.push_reading(420, 6.0);
        p.tick(110).unwrap();
        assert!(script.is_running());
        p.tick(200).unwrap();
        assert_eq!(p.raw_distance(), Some(420));
        assert_eq!(p.status(), RangeStatus::Ok);
    }

    #[test]
    fn significant_change_detection() {
        let (mut p, script) = pipeline();
        assert!(!p.has_significant_change());
        script.push_reading(1000, 6.0);
        p.tick(0).unwrap();
        assert!(p.has_significant_change());

        script.push_reading(1010, 6.0);
        p.tick(100).unwrap();
        assert!(!p.has_significant_change());

        // Two near readings then the window fills with 300s.
        for _ in 0..3 {
            script.push_reading(300, 6.0);
        }
        p.tick(200).unwrap();
        p.tick(300).unwrap();
        assert!(p.has_significant_change());
    }

    #[test]
    fn mode_switch_restarts_acquisition() {
        let (mut p, script) = pipeline();
        p.set_mode(MeasurementMode::HighAccuracy).unwrap();
        assert_eq!(script.stop_count(), 1);
        assert_eq!(script.start_count(), 2);
        assert_eq!(
            script.profile().unwrap().timing_budget_us,
            ModeProfile::for_mode(MeasurementMode::HighAccuracy).timing_budget_us
        );
        assert_eq!(p.mode(), MeasurementMode::HighAccuracy);
    }

    #[test]
    fn handle_command_applies_all_sections() {
        let (mut p, script) = pipeline();
        script.push_reading(480, 6.0);
        p.tick(0).unwrap();
        p.handle_command(&json!({
            "mode": "long_range",
            "calibration": {"offset": 0.0, "scale": 1.0},
            "calibrate": {"actual_distance_mm": 500}
        }))
        .unwrap();
        assert_eq!(p.mode(), MeasurementMode::LongRange);
        assert_eq!(p.calibration().offset, 20.0);

        p.handle_command(&json!({"mode": "warp"})).unwrap();
        assert_eq!(p.mode(), MeasurementMode::Default);
    }

    #[test]
    fn statistics_success_rate() {
        let (mut p, script) = pipeline();
        assert_eq!(p.statistics().success_rate, 0.0);
        script.push_reading(500, 6.0);
        script.push_reading(5000, 6.0);
        p.tick(0).unwrap();
        p.tick(100).unwrap();
        assert_eq!(p.statistics().success_rate, 50.0);
    }

    #[test]
    fn telemetry_document() {
        let (mut p, script) = pipeline();
        script.push_reading(750, 6.0);
        p.tick(0).unwrap();
        let t = p.produce_telemetry();
        assert_eq!(t.sensor_id, "tof-front");
        assert_eq!(t.range_meters, Some(0.75));
        assert_eq!(t.raw_mm, Some(750));
        assert_eq!(t.status, RangeStatus::Ok);
        assert_eq!(t.min_range_meters, 0.03);
        assert_eq!(t.max_range_meters, 2.0);
    }
}

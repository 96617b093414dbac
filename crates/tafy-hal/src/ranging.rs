//! Generic `RangingElement` trait for single-beam time-of-flight sensors.
//!
//! The element free-runs in continuous mode. The pipeline only ever picks up
//! the latest completed result, so a read never waits for a new measurement
//! longer than the driver's bounded timeout.

use tafy_types::{MeasurementMode, NodeError};

/// One completed measurement as reported by the element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawMeasurement {
    pub distance_mm: u16,
    /// Return signal rate in mega counts per second.
    pub signal_rate_mcps: f32,
}

/// Timing and optical settings applied for a [`MeasurementMode`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeProfile {
    pub mode: MeasurementMode,
    pub timing_budget_us: u32,
    pub signal_rate_limit_mcps: f32,
    pub pre_range_vcsel_pclks: u8,
    pub final_range_vcsel_pclks: u8,
}

impl ModeProfile {
    pub fn for_mode(mode: MeasurementMode) -> Self {
        let (timing_budget_us, signal_rate_limit_mcps, pre, fin) = match mode {
            MeasurementMode::Default => (33_000, 0.25, 14, 10),
            MeasurementMode::HighSpeed => (20_000, 0.25, 14, 10),
            MeasurementMode::HighAccuracy => (200_000, 0.25, 14, 10),
            MeasurementMode::LongRange => (33_000, 0.1, 18, 14),
        };
        Self {
            mode,
            timing_budget_us,
            signal_rate_limit_mcps,
            pre_range_vcsel_pclks: pre,
            final_range_vcsel_pclks: fin,
        }
    }

    /// Continuous-mode inter-measurement period, one timing budget.
    pub fn period_ms(&self) -> u32 {
        self.timing_budget_us.div_ceil(1000)
    }
}

/// A time-of-flight ranging element.
pub trait RangingElement: Send {
    fn id(&self) -> &str;

    /// Bring the element up. Called once before the first configuration.
    fn init(&mut self) -> Result<(), NodeError>;

    /// Apply timing budget, signal-rate limit and VCSEL periods.
    fn configure(&mut self, profile: &ModeProfile) -> Result<(), NodeError>;

    fn start_continuous(&mut self, period_ms: u32) -> Result<(), NodeError>;

    fn stop_continuous(&mut self) -> Result<(), NodeError>;

    /// Latest completed measurement.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::SensorTimeout`] when no result completed within
    /// the driver's bounded wait.
    fn read_latest(&mut self) -> Result<RawMeasurement, NodeError>;
}

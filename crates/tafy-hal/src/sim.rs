//! In-process simulated drivers for CI/CD testing without physical hardware.
//!
//! [`SimWheelDriver`] records the outputs it is asked to apply and
//! [`SimRangingElement`] replays a script of measurements and timeouts. Each
//! hands out a cloneable probe so a test can inspect or steer the driver
//! after it has been boxed and moved into a controller.
//!
//! # Example
//!
//! ```rust
//! use tafy_hal::sim::SimHardware;
//! use tafy_hal::{DriveConfig, DriveController};
//!
//! let rig = SimHardware::new().with_obstacle_at(800).build();
//! let mut drive = DriveController::new(rig.wheels, DriveConfig::default());
//! drive.set_velocity(0.5, 0.0, 0);
//! drive.tick(0).expect("sim wheels never fault");
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tafy_types::NodeError;

use crate::ranging::{ModeProfile, RangingElement, RawMeasurement};
use crate::wheel::WheelDriver;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated wheels
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct WheelState {
    output: (f32, f32),
    energized: bool,
    applies: u64,
    releases: u64,
    fault: Option<String>,
}

/// Read-side handle onto a [`SimWheelDriver`].
#[derive(Debug, Clone, Default)]
pub struct WheelProbe(Arc<Mutex<WheelState>>);

impl WheelProbe {
    pub fn output(&self) -> (f32, f32) {
        lock(&self.0).output
    }

    pub fn is_energized(&self) -> bool {
        lock(&self.0).energized
    }

    pub fn apply_count(&self) -> u64 {
        lock(&self.0).applies
    }

    pub fn release_count(&self) -> u64 {
        lock(&self.0).releases
    }

    /// Make every subsequent `apply` fail with `details` until cleared with `None`.
    pub fn set_fault(&self, details: Option<&str>) {
        lock(&self.0).fault = details.map(str::to_string);
    }
}

pub struct SimWheelDriver {
    id: String,
    state: WheelProbe,
}

impl SimWheelDriver {
    /// Create a simulated wheel pair and the probe observing it.
    pub fn new(id: impl Into<String>) -> (Box<Self>, WheelProbe) {
        let probe = WheelProbe::default();
        let driver = Box::new(Self {
            id: id.into(),
            state: probe.clone(),
        });
        (driver, probe)
    }
}

impl WheelDriver for SimWheelDriver {
    fn id(&self) -> &str {
        &self.id
    }

    fn apply(&mut self, left_percent: f32, right_percent: f32) -> Result<(), NodeError> {
        let mut state = lock(&self.state.0);
        if let Some(details) = &state.fault {
            return Err(NodeError::HardwareFault {
                component: self.id.clone(),
                details: details.clone(),
            });
        }
        state.output = (left_percent, right_percent);
        state.energized = true;
        state.applies += 1;
        Ok(())
    }

    fn release(&mut self) -> Result<(), NodeError> {
        let mut state = lock(&self.state.0);
        state.output = (0.0, 0.0);
        state.energized = false;
        state.releases += 1;
        Ok(())
    }

    fn output(&self) -> (f32, f32) {
        lock(&self.state.0).output
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated ranging element
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct RangeState {
    script: VecDeque<Option<RawMeasurement>>,
    steady: Option<RawMeasurement>,
    running: bool,
    starts: u64,
    stops: u64,
    profile: Option<ModeProfile>,
    fail_init: bool,
    fault: Option<String>,
}

/// Steering handle onto a [`SimRangingElement`].
#[derive(Debug, Clone, Default)]
pub struct RangeScript(Arc<Mutex<RangeState>>);

impl RangeScript {
    /// Queue one completed measurement.
    pub fn push_reading(&self, distance_mm: u16, signal_rate_mcps: f32) {
        lock(&self.0).script.push_back(Some(RawMeasurement {
            distance_mm,
            signal_rate_mcps,
        }));
    }

    /// Queue one acquisition timeout.
    pub fn push_timeout(&self) {
        lock(&self.0).script.push_back(None);
    }

    /// Measurement returned once the script is exhausted; `None` times out.
    pub fn set_steady(&self, reading: Option<RawMeasurement>) {
        lock(&self.0).steady = reading;
    }

    pub fn set_fail_init(&self, fail: bool) {
        lock(&self.0).fail_init = fail;
    }

    /// Make every subsequent read fail with `details` until cleared with `None`.
    pub fn set_fault(&self, details: Option<&str>) {
        lock(&self.0).fault = details.map(str::to_string);
    }

    pub fn is_running(&self) -> bool {
        lock(&self.0).running
    }

    pub fn start_count(&self) -> u64 {
        lock(&self.0).starts
    }

    pub fn stop_count(&self) -> u64 {
        lock(&self.0).stops
    }

    pub fn profile(&self) -> Option<ModeProfile> {
        lock(&self.0).profile
    }
}

pub struct SimRangingElement {
    id: String,
    state: RangeScript,
}

impl SimRangingElement {
    pub fn new(id: impl Into<String>) -> (Box<Self>, RangeScript) {
        let script = RangeScript::default();
        let element = Box::new(Self {
            id: id.into(),
            state: script.clone(),
        });
        (element, script)
    }
}

impl RangingElement for SimRangingElement {
    fn id(&self) -> &str {
        &self.id
    }

    fn init(&mut self) -> Result<(), NodeError> {
        if lock(&self.state.0).fail_init {
            return Err(NodeError::SensorUnavailable {
                sensor: self.id.clone(),
            });
        }
        Ok(())
    }

    fn configure(&mut self, profile: &ModeProfile) -> Result<(), NodeError> {
        lock(&self.state.0).profile = Some(*profile);
        Ok(())
    }

    fn start_continuous(&mut self, _period_ms: u32) -> Result<(), NodeError> {
        let mut state = lock(&self.state.0);
        state.running = true;
        state.starts += 1;
        Ok(())
    }

    fn stop_continuous(&mut self) -> Result<(), NodeError> {
        let mut state = lock(&self.state.0);
        state.running = false;
        state.stops += 1;
        Ok(())
    }

    fn read_latest(&mut self) -> Result<RawMeasurement, NodeError> {
        let mut state = lock(&self.state.0);
        if let Some(details) = &state.fault {
            return Err(NodeError::HardwareFault {
                component: self.id.clone(),
                details: details.clone(),
            });
        }
        let next = if !state.running {
            None
        } else {
            match state.script.pop_front() {
                Some(scripted) => scripted,
                None => state.steady,
            }
        };
        next.ok_or_else(|| NodeError::SensorTimeout {
            sensor: self.id.clone(),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimHardware builder
// ────────────────────────────────────────────────────────────────────────────

/// A complete simulated drive base and forward range sensor.
pub struct SimRig {
    pub wheels: Box<dyn WheelDriver>,
    pub wheel_probe: WheelProbe,
    pub ranging: Box<dyn RangingElement>,
    pub range_script: RangeScript,
}

/// Builder for a [`SimRig`].
pub struct SimHardware {
    wheels_id: String,
    ranging_id: String,
    steady: Option<RawMeasurement>,
}

impl Default for SimHardware {
    fn default() -> Self {
        Self {
            wheels_id: "sim_wheels".to_string(),
            ranging_id: "sim_tof".to_string(),
            steady: None,
        }
    }
}

impl SimHardware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Steady reading of a strong-signal obstacle at `distance_mm`.
    pub fn with_obstacle_at(mut self, distance_mm: u16) -> Self {
        self.steady = Some(RawMeasurement {
            distance_mm,
            signal_rate_mcps: 8.0,
        });
        self
    }

    pub fn with_ids(mut self, wheels: impl Into<String>, ranging: impl Into<String>) -> Self {
        self.wheels_id = wheels.into();
        self.ranging_id = ranging.into();
        self
    }

    pub fn build(self) -> SimRig {
        let (wheels, wheel_probe) = SimWheelDriver::new(self.wheels_id);
        let (ranging, range_script) = SimRangingElement::new(self.ranging_id);
        range_script.set_steady(self.steady);
        SimRig {
            wheels,
            wheel_probe,
            ranging,
            range_script,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

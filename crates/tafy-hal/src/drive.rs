//! [`DriveController`] – differential-drive control loop.
//!
//! Turns velocity or wheel-percent requests into ramped wheel outputs under
//! two safety constructs from `tafy-kernel`:
//!
//! - the [`CommandWatchdog`]: requests must repeat within the command window,
//!   otherwise the wheels are stopped and de-energized;
//! - the [`EmergencyStop`] latch: while engaged every request is ignored and
//!   outputs are held at zero.
//!
//! Ramping and odometry advance in elapsed-time-gated steps. Calling
//! [`DriveController::tick`] more often than the step interval does not
//! change the motion, only the watchdog's reaction latency.
//!
//! # Example
//!
//! ```rust
//! use tafy_hal::sim::SimWheelDriver;
//! use tafy_hal::{DriveConfig, DriveController};
//!
//! let (wheels, probe) = SimWheelDriver::new("wheels");
//! let mut drive = DriveController::new(wheels, DriveConfig::default());
//!
//! drive.set_velocity(0.5, 0.0, 0);
//! assert_eq!(drive.targets(), (50.0, 50.0));
//!
//! drive.tick(0).unwrap();
//! drive.tick(100).unwrap();
//! assert_eq!(probe.output(), (20.0, 20.0));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use tafy_kernel::{CommandWatchdog, EmergencyStop, StopReason};
use tafy_types::{
    DriveStatus, MotorCommand, MotorTelemetry, NodeError, RobotParams, WheelPercents,
    WheelVelocities,
};

use crate::kinematics::{self, DriveGeometry};
use crate::odometry::Odometry;
use crate::wheel::WheelDriver;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

fn default_wheel_base() -> f32 {
    0.2
}
fn default_wheel_radius() -> f32 {
    0.035
}
fn default_max_linear() -> f32 {
    1.0
}
fn default_max_angular() -> f32 {
    4.0
}
fn default_ramp_rate() -> f32 {
    200.0
}
fn default_deadzone() -> f32 {
    10.0
}
fn default_step_interval_ms() -> u64 {
    10
}
fn default_command_timeout_ms() -> u64 {
    tafy_kernel::watchdog::DEFAULT_COMMAND_TIMEOUT_MS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveConfig {
    /// Distance between the wheel contact points, meters.
    #[serde(default = "default_wheel_base")]
    pub wheel_base: f32,
    #[serde(default = "default_wheel_radius")]
    pub wheel_radius: f32,
    /// Wheel speed reached at 100 %, m/s.
    #[serde(default = "default_max_linear")]
    pub max_linear_vel: f32,
    #[serde(default = "default_max_angular")]
    pub max_angular_vel: f32,
    /// Maximum change of a wheel output, percent per second.
    #[serde(default = "default_ramp_rate")]
    pub ramp_rate: f32,
    /// Requests with a smaller magnitude, in percent, snap to 0.
    #[serde(default = "default_deadzone")]
    pub deadzone: f32,
    #[serde(default = "default_step_interval_ms")]
    pub step_interval_ms: u64,
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            wheel_base: default_wheel_base(),
            wheel_radius: default_wheel_radius(),
            max_linear_vel: default_max_linear(),
            max_angular_vel: default_max_angular(),
            ramp_rate: default_ramp_rate(),
            deadzone: default_deadzone(),
            step_interval_ms: default_step_interval_ms(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

impl DriveConfig {
    fn geometry(&self) -> DriveGeometry {
        DriveGeometry {
            wheel_base: self.wheel_base,
            max_linear: self.max_linear_vel,
            max_angular: self.max_angular_vel,
        }
    }

    /// Apply the valid fields of a partial update. Non-positive or
    /// non-finite values are skipped and named in the returned list.
    pub fn apply_params(&mut self, params: &RobotParams) -> Vec<&'static str> {
        let mut rejected = Vec::new();
        let fields: [(&'static str, Option<f32>, &mut f32); 4] = [
            ("wheel_base", params.wheel_base, &mut self.wheel_base),
            ("wheel_radius", params.wheel_radius, &mut self.wheel_radius),
            ("max_linear_vel", params.max_linear_vel, &mut self.max_linear_vel),
            ("max_angular_vel", params.max_angular_vel, &mut self.max_angular_vel),
        ];
        for (name, value, slot) in fields {
            match value {
                Some(v) if v.is_finite() && v > 0.0 => *slot = v,
                Some(_) => rejected.push(name),
                None => {}
            }
        }
        rejected
    }
}

// ────────────────────────────────────────────────────────────────────────────
// DriveController
// ────────────────────────────────────────────────────────────────────────────

pub struct DriveController {
    driver: Box<dyn WheelDriver>,
    config: DriveConfig,
    target: (f32, f32),
    current: (f32, f32),
    watchdog: CommandWatchdog,
    estop: EmergencyStop,
    odometry: Odometry,
    last_step_ms: Option<u64>,
    /// Output last written to the driver; `None` forces the next write.
    applied: Option<(f32, f32)>,
}

impl DriveController {
    pub fn new(driver: Box<dyn WheelDriver>, config: DriveConfig) -> Self {
        let watchdog = CommandWatchdog::new(config.command_timeout_ms);
        Self {
            driver,
            config,
            target: (0.0, 0.0),
            current: (0.0, 0.0),
            watchdog,
            estop: EmergencyStop::default(),
            odometry: Odometry::default(),
            last_step_ms: None,
            applied: None,
        }
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    pub fn driver_id(&self) -> &str {
        self.driver.id()
    }

    /// Commanded `(left, right)` percentages.
    pub fn targets(&self) -> (f32, f32) {
        self.target
    }

    /// Ramped `(left, right)` percentages currently driven.
    pub fn currents(&self) -> (f32, f32) {
        self.current
    }

    pub fn odometry(&self) -> &Odometry {
        &self.odometry
    }

    pub fn is_emergency_stopped(&self) -> bool {
        self.estop.is_engaged()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.estop.reason()
    }

    pub fn emergency_trip_count(&self) -> u64 {
        self.estop.trip_count()
    }

    /// Request body velocity. Returns `false` when ignored because the
    /// emergency stop is engaged.
    pub fn set_velocity(&mut self, linear: f32, angular: f32, now_ms: u64) -> bool {
        if self.estop.is_engaged() {
            warn!(linear, angular, "velocity command ignored: emergency stop engaged");
            return false;
        }
        let geo = self.config.geometry();
        let (left, right) = kinematics::wheel_velocities(linear, angular, &geo);
        self.target = (
            kinematics::shape_percent(
                kinematics::velocity_to_percent(left, geo.max_linear),
                self.config.deadzone,
            ),
            kinematics::shape_percent(
                kinematics::velocity_to_percent(right, geo.max_linear),
                self.config.deadzone,
            ),
        );
        self.watchdog.feed(now_ms);
        debug!(linear, angular, left = self.target.0, right = self.target.1, "velocity target set");
        true
    }

    /// Request raw wheel percentages. Same deadzone, rounding and clamping as
    /// velocity requests.
    pub fn set_wheel_percents(&mut self, left: f32, right: f32, now_ms: u64) -> bool {
        if self.estop.is_engaged() {
            warn!(left, right, "wheel command ignored: emergency stop engaged");
            return false;
        }
        self.target = (
            kinematics::shape_percent(left, self.config.deadzone),
            kinematics::shape_percent(right, self.config.deadzone),
        );
        self.watchdog.feed(now_ms);
        debug!(left = self.target.0, right = self.target.1, "wheel target set");
        true
    }

    /// Engage the latch and zero the outputs immediately, bypassing the ramp.
    pub fn emergency_stop_trigger(&mut self, reason: StopReason) -> Result<(), NodeError> {
        self.estop.trigger(reason);
        self.zero();
        self.watchdog.clear();
        self.write_outputs()
    }

    pub fn emergency_stop_clear(&mut self) {
        self.estop.clear();
    }

    /// One control-loop pass: watchdog check, then a ramp/odometry step if
    /// the step interval has elapsed, then output.
    pub fn tick(&mut self, now_ms: u64) -> Result<(), NodeError> {
        if self.watchdog.expired(now_ms) {
            warn!(
                timeout_ms = self.watchdog.timeout_ms(),
                "command watchdog expired, stopping wheels"
            );
            self.watchdog.clear();
            self.zero();
            self.driver.release()?;
            self.applied = Some((0.0, 0.0));
        }

        match self.last_step_ms {
            None => self.last_step_ms = Some(now_ms),
            Some(last) => {
                let elapsed = now_ms.saturating_sub(last);
                if elapsed >= self.config.step_interval_ms {
                    self.step(elapsed as f32 / 1000.0);
                    self.last_step_ms = Some(now_ms);
                }
            }
        }

        self.write_outputs()
    }

    /// Decode and apply a motor command payload.
    ///
    /// Order: parameter update, emergency stop, odometry reset, motion. A
    /// velocity pair takes precedence over a wheel-percent pair.
    pub fn handle_command(&mut self, payload: &Value, now_ms: u64) -> Result<(), NodeError> {
        let cmd: MotorCommand = serde_json::from_value(payload.clone())
            .map_err(|e| NodeError::InvalidPayload(format!("motor command: {e}")))?;

        if let Some(params) = &cmd.robot_params {
            let rejected = self.config.apply_params(params);
            if !rejected.is_empty() {
                warn!(?rejected, "ignoring non-positive robot parameters");
            }
            info!(
                wheel_base = self.config.wheel_base,
                max_linear_vel = self.config.max_linear_vel,
                "robot parameters updated"
            );
        }

        match cmd.emergency_stop {
            Some(true) => self.emergency_stop_trigger(StopReason::Command)?,
            Some(false) => self.emergency_stop_clear(),
            None => {}
        }

        if cmd.reset_odometry == Some(true) {
            self.odometry.reset();
            info!("odometry reset");
        }

        if let Some((linear, angular)) = cmd.velocity() {
            self.set_velocity(linear, angular, now_ms);
        } else if let Some((left, right)) = cmd.wheel_percents() {
            self.set_wheel_percents(left, right, now_ms);
        }
        Ok(())
    }

    pub fn status(&self) -> DriveStatus {
        if self.estop.is_engaged() {
            DriveStatus::EmergencyStop
        } else if self.current.0 != 0.0 || self.current.1 != 0.0 {
            DriveStatus::Moving
        } else {
            DriveStatus::Idle
        }
    }

    pub fn produce_telemetry(&self) -> MotorTelemetry {
        let geo = self.config.geometry();
        let (actual_linear, actual_angular) =
            kinematics::body_velocity(self.current.0, self.current.1, &geo);
        let (commanded_linear, commanded_angular) =
            kinematics::body_velocity(self.target.0, self.target.1, &geo);
        MotorTelemetry {
            actual_linear_meters_per_sec: actual_linear,
            actual_angular_rad_per_sec: actual_angular,
            commanded_linear_meters_per_sec: commanded_linear,
            commanded_angular_rad_per_sec: commanded_angular,
            odometry: self.odometry.report(),
            wheel_velocities: WheelVelocities {
                left_meters_per_sec: kinematics::percent_to_velocity(self.current.0, geo.max_linear),
                right_meters_per_sec: kinematics::percent_to_velocity(self.current.1, geo.max_linear),
            },
            applied_percent: WheelPercents {
                left: self.current.0,
                right: self.current.1,
            },
            status: self.status(),
        }
    }

    // ── internals ──────────────────────────────────────────────────────────

    fn zero(&mut self) {
        self.target = (0.0, 0.0);
        self.current = (0.0, 0.0);
    }

    fn step(&mut self, dt: f32) {
        let max_step = self.config.ramp_rate * dt;
        self.current.0 = ramp_toward(self.current.0, self.target.0, max_step);
        self.current.1 = ramp_toward(self.current.1, self.target.1, max_step);

        let (linear, angular) =
            kinematics::body_velocity(self.current.0, self.current.1, &self.config.geometry());
        self.odometry.integrate(linear, angular, dt);
    }

    fn write_outputs(&mut self) -> Result<(), NodeError> {
        if self.applied == Some(self.current) {
            return Ok(());
        }
        self.driver.apply(self.current.0, self.current.1)?;
        self.applied = Some(self.current);
        Ok(())
    }
}

/// Move `current` toward `target` by at most `max_step`, snapping when within reach.
fn ramp_toward(current: f32, target: f32, max_step: f32) -> f32 {
    let diff = target - current;
    if diff.abs() <= max_step {
        target
    } else {
        current + max_step.copysign(diff)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

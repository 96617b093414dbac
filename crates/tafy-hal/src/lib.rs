//! `tafy-hal` – Hardware Abstraction Layer
//!
//! Turns commands into wheel actuation and raw ranging results into a
//! trustworthy distance estimate. Physical devices sit behind two small
//! traits so the same control code runs against real drivers and the
//! in-process simulators in [`sim`].
//!
//! # Modules
//!
//! - [`wheel`] – [`WheelDriver`][wheel::WheelDriver] trait for a pair of
//!   differential-drive motor channels.
//! - [`ranging`] – [`RangingElement`][ranging::RangingElement] trait and
//!   per-mode [`ModeProfile`][ranging::ModeProfile]s.
//! - [`kinematics`] – inverse/forward differential-drive kinematics.
//! - [`odometry`] – dead-reckoning pose integration.
//! - [`drive`] – [`DriveController`][drive::DriveController]: ramping,
//!   watchdog, emergency stop, telemetry.
//! - [`filter`] – [`MedianWindow`][filter::MedianWindow] outlier rejection.
//! - [`range`] – [`RangeSensingPipeline`][range::RangeSensingPipeline]:
//!   calibration, filtering, quality scoring, fault recovery.
//! - [`sim`] – simulated wheel and ranging drivers for CI.

pub mod drive;
pub mod filter;
pub mod kinematics;
pub mod odometry;
pub mod range;
pub mod ranging;
pub mod sim;
pub mod wheel;

pub use drive::{DriveConfig, DriveController};
pub use filter::MedianWindow;
pub use odometry::Odometry;
pub use range::{QualityLadder, RangeConfig, RangeSensingPipeline};
pub use ranging::{ModeProfile, RangingElement, RawMeasurement};
pub use wheel::WheelDriver;

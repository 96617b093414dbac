//! `tafy-kernel` – Safety primitives
//!
//! The reflexes of a Tafy node. Nothing in here thinks about motion; these
//! types only decide when motion must stop.
//!
//! # Modules
//!
//! - [`watchdog`] – [`CommandWatchdog`][watchdog::CommandWatchdog]:
//!   forces a stop when velocity commands are not refreshed in time.
//! - [`estop`] – [`EmergencyStop`][estop::EmergencyStop]:
//!   one-bit latch that, once set, holds until explicitly cleared.
//! - [`interlock`] – [`ProximityInterlock`][interlock::ProximityInterlock]:
//!   the synchronous range → emergency-stop rule.

pub mod estop;
pub mod interlock;
pub mod watchdog;

pub use estop::{EmergencyStop, StopReason};
pub use interlock::ProximityInterlock;
pub use watchdog::CommandWatchdog;

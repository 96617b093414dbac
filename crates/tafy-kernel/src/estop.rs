//! [`EmergencyStop`] – the one-bit safety latch.
//!
//! The latch may be set by the proximity interlock, by an inbound command or
//! by the operator (Ctrl-C). It stays set until [`EmergencyStop::clear`] is
//! called; setting it again while engaged keeps the original reason.

use std::fmt;

use tracing::{error, info};

/// Why the latch was engaged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopReason {
    /// An obstacle closer than the configured stop distance.
    Proximity { distance_mm: f32 },
    /// An `emergency_stop: true` command.
    Command,
    /// Local operator request.
    Operator,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Proximity { distance_mm } => {
                write!(f, "obstacle at {distance_mm:.0} mm")
            }
            StopReason::Command => f.write_str("remote command"),
            StopReason::Operator => f.write_str("operator request"),
        }
    }
}

/// # Example
///
/// ```
/// use tafy_kernel::estop::{EmergencyStop, StopReason};
///
/// let mut estop = EmergencyStop::default();
/// assert!(estop.trigger(StopReason::Command));
/// assert!(!estop.trigger(StopReason::Operator));
/// assert_eq!(estop.reason(), Some(StopReason::Command));
/// assert!(estop.clear());
/// assert!(!estop.is_engaged());
/// ```
#[derive(Debug, Clone, Default)]
pub struct EmergencyStop {
    reason: Option<StopReason>,
    trips: u64,
}

impl EmergencyStop {
    /// Engage the latch. Returns `true` only on the transition from released
    /// to engaged.
    pub fn trigger(&mut self, reason: StopReason) -> bool {
        if self.reason.is_some() {
            return false;
        }
        error!(%reason, "emergency stop engaged");
        self.reason = Some(reason);
        self.trips += 1;
        true
    }

    /// Release the latch. Returns `true` if it was engaged.
    pub fn clear(&mut self) -> bool {
        match self.reason.take() {
            Some(reason) => {
                info!(%reason, "emergency stop cleared");
                true
            }
            None => false,
        }
    }

    pub fn is_engaged(&self) -> bool {
        self.reason.is_some()
    }

    pub fn reason(&self) -> Option<StopReason> {
        self.reason
    }

    /// Number of released → engaged transitions since start-up.
    pub fn trip_count(&self) -> u64 {
        self.trips
    }
}

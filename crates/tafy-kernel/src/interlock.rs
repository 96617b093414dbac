//! [`ProximityInterlock`] – range → emergency-stop rule.
//!
//! Evaluated synchronously right after each sensor acquisition, inside the
//! same control-loop tick. A reading only counts when its quality is above
//! zero, so timeouts and out-of-range samples never stop the robot.

use crate::estop::StopReason;

/// Default stop distance in millimetres.
pub const DEFAULT_STOP_DISTANCE_MM: f32 = 100.0;

#[derive(Debug, Clone)]
pub struct ProximityInterlock {
    stop_distance_mm: f32,
    enabled: bool,
}

impl Default for ProximityInterlock {
    fn default() -> Self {
        Self::new(DEFAULT_STOP_DISTANCE_MM)
    }
}

impl ProximityInterlock {
    pub fn new(stop_distance_mm: f32) -> Self {
        Self {
            stop_distance_mm,
            enabled: true,
        }
    }

    pub fn stop_distance_mm(&self) -> f32 {
        self.stop_distance_mm
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Returns the stop reason when `filtered_mm` is a trusted reading closer
    /// than the stop distance.
    pub fn evaluate(&self, quality: u8, filtered_mm: Option<f32>) -> Option<StopReason> {
        if !self.enabled || quality == 0 {
            return None;
        }
        let distance_mm = filtered_mm?;
        (distance_mm < self.stop_distance_mm).then_some(StopReason::Proximity { distance_mm })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_below_stop_distance() {
        let il = ProximityInterlock::default();
        assert_eq!(
            il.evaluate(75, Some(60.0)),
            Some(StopReason::Proximity { distance_mm: 60.0 })
        );
    }

    #[test]
    fn ignores_zero_quality() {
        let il = ProximityInterlock::default();
        assert_eq!(il.evaluate(0, Some(60.0)), None);
    }

    #[test]
    fn ignores_far_or_missing() {
        let il = ProximityInterlock::new(100.0);
        assert_eq!(il.evaluate(100, Some(100.0)), None);
        assert_eq!(il.evaluate(100, None), None);
    }

    #[test]
    fn disabled_never_trips() {
        let mut il = ProximityInterlock::default();
        il.set_enabled(false);
        assert_eq!(il.evaluate(100, Some(1.0)), None);
    }
}

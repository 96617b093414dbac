//! Generic `WheelDriver` trait for the two motor channels of a
//! differential-drive base.
//!
//! The [`DriveController`][crate::drive::DriveController] owns exactly one
//! driver and only ever talks to the trait, so an H-bridge driver, a serial
//! motor board and the simulator are interchangeable.

use tafy_types::NodeError;

/// A pair of speed-controlled wheel channels.
pub trait WheelDriver: Send {
    /// Stable identifier, e.g. `"tb6612"` or `"sim_wheels"`.
    fn id(&self) -> &str;

    /// Drive both wheels at signed duty percentages in `[-100, 100]`.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::HardwareFault`] if the output stage rejects the
    /// command.
    fn apply(&mut self, left_percent: f32, right_percent: f32) -> Result<(), NodeError>;

    /// De-energize both channels (coast), as opposed to driving them at zero.
    fn release(&mut self) -> Result<(), NodeError>;

    /// Most recently applied `(left, right)` percentages.
    fn output(&self) -> (f32, f32);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal in-process driver used only for tests.
    struct MockWheels {
        out: (f32, f32),
        released: bool,
    }

    impl WheelDriver for MockWheels {
        fn id(&self) -> &str {
            "mock_wheels"
        }

        fn apply(&mut self, left_percent: f32, right_percent: f32) -> Result<(), NodeError> {
            self.out = (left_percent, right_percent);
            self.released = false;
            Ok(())
        }

        fn release(&mut self) -> Result<(), NodeError> {
            self.out = (0.0, 0.0);
            self.released = true;
            Ok(())
        }

        fn output(&self) -> (f32, f32) {
            self.out
        }
    }

    #[test]
    fn mock_wheels_apply_and_release() {
        let mut w = MockWheels {
            out: (0.0, 0.0),
            released: false,
        };
        assert_eq!(w.id(), "mock_wheels");
        w.apply(40.0, -40.0).unwrap();
        assert_eq!(w.output(), (40.0, -40.0));
        w.release().unwrap();
        assert!(w.released);
        assert_eq!(w.output(), (0.0, 0.0));
    }
}

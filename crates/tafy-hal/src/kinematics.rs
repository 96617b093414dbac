//! Differential-drive kinematics between body velocity `(v, ω)` and signed
//! wheel duty percentages.
//!
//! Percent is velocity relative to the maximum linear speed: a wheel at
//! `max_linear` runs at 100 %.

/// Geometry and limits used by the conversions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveGeometry {
    pub wheel_base: f32,
    pub max_linear: f32,
    pub max_angular: f32,
}

/// Inverse kinematics: `(v, ω)` to `(v_left, v_right)` in m/s.
///
/// `v` and `ω` are clamped to their limits first. If either wheel would
/// still exceed `max_linear`, both are scaled by the same factor so the
/// commanded curvature is preserved.
pub fn wheel_velocities(linear: f32, angular: f32, geo: &DriveGeometry) -> (f32, f32) {
    let v = linear.clamp(-geo.max_linear, geo.max_linear);
    let w = angular.clamp(-geo.max_angular, geo.max_angular);
    let half_track = w * geo.wheel_base / 2.0;
    let (left, right) = (v - half_track, v + half_track);

    let peak = left.abs().max(right.abs());
    if peak > geo.max_linear {
        let k = geo.max_linear / peak;
        (left * k, right * k)
    } else {
        (left, right)
    }
}

pub fn velocity_to_percent(velocity: f32, max_linear: f32) -> f32 {
    velocity / max_linear * 100.0
}

pub fn percent_to_velocity(percent: f32, max_linear: f32) -> f32 {
    percent / 100.0 * max_linear
}

/// Deadzone, rounding and clamping of a requested percentage.
///
/// Magnitudes below `deadzone` snap to 0; everything else is rounded half
/// away from zero to a whole percent and clamped to `[-100, 100]`.
pub fn shape_percent(percent: f32, deadzone: f32) -> f32 {
    if !percent.is_finite() || percent.abs() < deadzone {
        return 0.0;
    }
    percent.round().clamp(-100.0, 100.0)
}

/// Forward kinematics: wheel percentages back to body `(v, ω)`.
pub fn body_velocity(left_percent: f32, right_percent: f32, geo: &DriveGeometry) -> (f32, f32) {
    let left = percent_to_velocity(left_percent, geo.max_linear);
    let right = percent_to_velocity(right_percent, geo.max_linear);
    ((left + right) / 2.0, (right - left) / geo.wheel_base)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GEO: DriveGeometry = DriveGeometry {
        wheel_base: 0.2,
        max_linear: 1.0,
        max_angular: 4.0,
    };

    fn percents(v: f32, w: f32) -> (f32, f32) {
        let (l, r) = wheel_velocities(v, w, &GEO);
        (
            shape_percent(velocity_to_percent(l, GEO.max_linear), 10.0),
            shape_percent(velocity_to_percent(r, GEO.max_linear), 10.0),
        )
    }

    #[test]
    fn straight_half_speed_is_fifty_percent() {
        assert_eq!(percents(0.5, 0.0), (50.0, 50.0));
    }

    #[test]
    fn turning_splits_wheels() {
        // vL = 0.2 - 0.5*0.1 = 0.15, vR = 0.25
        assert_eq!(percents(0.2, 0.5), (15.0, 25.0));
    }

    #[test]
    fn doubling_command_doubles_percents() {
        let (l1, r1) = percents(0.2, 0.5);
        let (l2, r2) = percents(0.4, 1.0);
        assert!((l2 - 2.0 * l1).abs() <= 1.0);
        assert!((r2 - 2.0 * r1).abs() <= 1.0);
    }

    #[test]
    fn saturation_preserves_curvature() {
        let (l, r) = wheel_velocities(1.0, 4.0, &GEO);
        // Unscaled: 0.6 / 1.4
        assert!((r - 1.0).abs() < 1e-6);
        assert!((l / r - 0.6 / 1.4).abs() < 1e-5);
    }

    #[test]
    fn inputs_are_clamped_to_limits() {
        let (l, r) = wheel_velocities(5.0, 0.0, &GEO);
        assert_eq!((l, r), (1.0, 1.0));
        let (l, r) = wheel_velocities(0.0, -100.0, &GEO);
        assert!((l - 0.4).abs() < 1e-6 && (r + 0.4).abs() < 1e-6);
    }

    #[test]
    fn deadzone_snaps_small_requests() {
        for p in [0.0, 3.0, -9.9, 9.99] {
            assert_eq!(shape_percent(p, 10.0), 0.0);
        }
        assert_eq!(shape_percent(10.0, 10.0), 10.0);
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(shape_percent(42.5, 10.0), 43.0);
        assert_eq!(shape_percent(-42.5, 10.0), -43.0);
        assert_eq!(shape_percent(42.4, 10.0), 42.0);
    }

    #[test]
    fn shaped_percent_is_clamped() {
        assert_eq!(shape_percent(250.0, 10.0), 100.0);
        assert_eq!(shape_percent(-101.0, 10.0), -100.0);
        assert_eq!(shape_percent(f32::NAN, 10.0), 0.0);
    }

    #[test]
    fn forward_kinematics_inverts() {
        let (v, w) = body_velocity(15.0, 25.0, &GEO);
        assert!((v - 0.2).abs() < 1e-6);
        assert!((w - 0.5).abs() < 1e-5);
    }
}

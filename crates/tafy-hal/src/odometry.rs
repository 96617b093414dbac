//! Dead-reckoning odometry for a differential-drive base.
//!
//! Integrates the body velocity implied by the ramped wheel outputs. There is
//! no encoder feedback, so the estimate is only as good as the open-loop
//! actuation.
//!
//! # Coordinate Frame
//!
//! X forward, Y left, theta counter-clockwise positive, kept in `(-π, π]`.

use std::f32::consts::{PI, TAU};

use tafy_types::OdometryReport;

/// Below this angular rate the motion is treated as a straight line.
pub const STRAIGHT_LINE_EPSILON: f32 = 0.001;

/// Wrap an angle into `(-π, π]`.
pub fn normalize_angle(angle: f32) -> f32 {
    let mut a = angle % TAU;
    if a > PI {
        a -= TAU;
    } else if a <= -PI {
        a += TAU;
    }
    a
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Odometry {
    pub x: f32,
    pub y: f32,
    pub theta: f32,
}

impl Odometry {
    /// Advance the pose by `dt` seconds of motion at `linear` m/s and
    /// `angular` rad/s, using the exact arc displacement when turning.
    pub fn integrate(&mut self, linear: f32, angular: f32, dt: f32) {
        if angular.abs() < STRAIGHT_LINE_EPSILON {
            let (sin_t, cos_t) = self.theta.sin_cos();
            self.x += linear * cos_t * dt;
            self.y += linear * sin_t * dt;
        } else {
            let radius = linear / angular;
            let next = self.theta + angular * dt;
            self.x += radius * (next.sin() - self.theta.sin());
            self.y -= radius * (next.cos() - self.theta.cos());
        }
        self.theta = normalize_angle(self.theta + angular * dt);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn report(&self) -> OdometryReport {
        OdometryReport {
            x_meters: self.x,
            y_meters: self.y,
            theta_rad: self.theta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn straight_line_advances_x() {
        let mut odom = Odometry::default();
        odom.integrate(1.0, 0.0, 0.5);
        assert!((odom.x - 0.5).abs() < EPS);
        assert!(odom.y.abs() < EPS);
        assert!(odom.theta.abs() < EPS);
    }

    #[test]
    fn rotation_in_place_only_changes_theta() {
        let mut odom = Odometry::default();
        odom.integrate(0.0, 0.8, 0.5);
        assert!(odom.x.abs() < EPS);
        assert!(odom.y.abs() < EPS);
        assert!((odom.theta - 0.4).abs() < EPS);
    }

    #[test]
    fn quarter_circle_arc() {
        // R = 1 m, quarter turn: ends at (1, 1) facing +Y.
        let mut odom = Odometry::default();
        odom.integrate(1.0, 1.0, std::f32::consts::FRAC_PI_2);
        assert!((odom.x - 1.0).abs() < 1e-4);
        assert!((odom.y - 1.0).abs() < 1e-4);
        assert!((odom.theta - std::f32::consts::FRAC_PI_2).abs() < 1e-4);
    }

    #[test]
    fn theta_stays_normalized() {
        let mut odom = Odometry::default();
        for _ in 0..100 {
            odom.integrate(0.0, 3.0, 0.1);
            assert!(odom.theta > -PI && odom.theta <= PI);
        }
    }

    #[test]
    fn normalize_angle_boundaries() {
        assert!((normalize_angle(PI) - PI).abs() < EPS);
        assert!((normalize_angle(-PI) - PI).abs() < EPS);
        assert!((normalize_angle(3.0 * PI / 2.0) + PI / 2.0).abs() < EPS);
        assert!((normalize_angle(-TAU - 0.1) + 0.1).abs() < EPS);
    }

    #[test]
    fn reset_returns_to_origin() {
        let mut odom = Odometry::default();
        odom.integrate(1.0, 0.3, 1.0);
        odom.reset();
        assert_eq!(odom, Odometry::default());
        assert_eq!(odom.report().x_meters, 0.0);
    }
}

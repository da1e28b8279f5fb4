//! Two-state Kalman filter over [lean angle, gyro bias].
//!
//! The gyroscope drives the predict step, the gravity direction seen by the
//! accelerometer drives the correction step. Angles are in degrees throughout.

use crate::config::FilterConfig;
use crate::types::linalg::{covariance_from_rows, LeanCovariance};

/// Estimator belief, owned by a single [`LeanAngleEstimator`]
#[derive(Clone, Debug, PartialEq)]
pub struct FilterState {
    pub angle_estimate: f64,
    pub bias_estimate: f64,
    pub error_covariance: LeanCovariance,
}

pub struct LeanAngleEstimator {
    state: FilterState,
    calibration_offset: f64,
    q_angle: f64,
    q_bias: f64,
    r_measure: f64,
}

impl LeanAngleEstimator {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            state: FilterState {
                angle_estimate: 0.0,
                bias_estimate: 0.0,
                error_covariance: covariance_from_rows(config.initial_covariance),
            },
            calibration_offset: 0.0,
            q_angle: config.q_angle,
            q_bias: config.q_bias,
            r_measure: config.r_measure,
        }
    }

    /// Predict: integrate the bias-corrected roll rate over `dt` seconds
    pub fn on_gyro_sample(&mut self, axis_rate_deg_s: f64, dt: f64) {
        let s = &mut self.state;
        s.angle_estimate += dt * (axis_rate_deg_s - s.bias_estimate);

        let p = &mut s.error_covariance;
        let (p00, p01, p10, p11) = (p[(0, 0)], p[(0, 1)], p[(1, 0)], p[(1, 1)]);
        p[(0, 0)] = p00 + dt * (dt * p11 - p01 - p10 + self.q_angle);
        p[(0, 1)] = p01 - dt * p11;
        p[(1, 0)] = p10 - dt * p11;
        p[(1, 1)] = p11 + self.q_bias * dt;
    }

    /// Correct: treat the accelerometer tilt as a noisy angle measurement
    pub fn on_accel_sample(&mut self, axis_accel_g: f64) {
        let accel_angle = accel_angle_deg(axis_accel_g);
        let s = &mut self.state;
        let p = &mut s.error_covariance;

        let y = accel_angle - s.angle_estimate;
        let innovation_cov = p[(0, 0)] + self.r_measure;
        let k0 = p[(0, 0)] / innovation_cov;
        let k1 = p[(1, 0)] / innovation_cov;

        s.angle_estimate += k0 * y;
        s.bias_estimate += k1 * y;

        // Row 1 must see the pre-update row 0
        let p00 = p[(0, 0)];
        let p01 = p[(0, 1)];
        p[(0, 0)] -= k0 * p00;
        p[(0, 1)] -= k0 * p01;
        p[(1, 0)] -= k1 * p00;
        p[(1, 1)] -= k1 * p01;
    }

    /// Calibrated lean angle, rounded to whole degrees (halves toward +inf)
    pub fn current_angle_deg(&self) -> f64 {
        round_half_up(self.state.angle_estimate - self.calibration_offset)
    }

    /// Take the current raw estimate as the upright reference
    pub fn calibrate(&mut self) {
        self.calibration_offset = self.state.angle_estimate;
        log::info!(
            "Lean angle calibrated, offset {:.2} deg",
            self.calibration_offset
        );
    }

    pub fn reset_calibration(&mut self) {
        self.calibration_offset = 0.0;
    }

    pub fn calibration_offset(&self) -> f64 {
        self.calibration_offset
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }
}

fn round_half_up(deg: f64) -> f64 {
    (deg + 0.5).floor()
}

/// Tilt implied by the X-axis gravity component, assuming 1 g on the vertical
pub fn accel_angle_deg(axis_accel_g: f64) -> f64 {
    (-axis_accel_g).atan2(1.0).to_degrees()
}

/// Measures `dt` between successive gyroscope callbacks from their timestamps.
///
/// Seed it when the subscription starts so the first delta covers one sample
/// period rather than the whole startup delay.
#[derive(Clone, Copy, Debug)]
pub struct DeltaClock {
    previous_ms: i64,
}

impl DeltaClock {
    pub fn seeded(now_ms: i64) -> Self {
        Self {
            previous_ms: now_ms,
        }
    }

    /// Seconds since the previous call; out-of-order timestamps yield 0
    pub fn delta_secs(&mut self, now_ms: i64) -> f64 {
        let delta_ms = (now_ms - self.previous_ms).max(0);
        self.previous_ms = self.previous_ms.max(now_ms);
        delta_ms as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn estimator() -> LeanAngleEstimator {
        LeanAngleEstimator::new(&FilterConfig::default())
    }

    #[test]
    fn test_gyro_only_integrates_rate() {
        let mut est = estimator();
        for _ in 0..40 {
            est.on_gyro_sample(12.5, 0.05);
        }
        assert_abs_diff_eq!(est.state().angle_estimate, 12.5 * 0.05 * 40.0, epsilon = 1e-9);
        assert_eq!(est.state().bias_estimate, 0.0);
    }

    #[test]
    fn test_predict_inflates_covariance() {
        let mut est = estimator();
        est.on_gyro_sample(0.0, 0.05);
        let p = est.state().error_covariance;
        assert_abs_diff_eq!(p[(0, 0)], 0.05 * 0.001, epsilon = 1e-12);
        assert_abs_diff_eq!(p[(1, 1)], 0.003 * 0.05, epsilon = 1e-12);
        assert_eq!(p[(0, 1)], 0.0);
    }

    #[test]
    fn test_accel_only_converges_monotonically() {
        let config = FilterConfig {
            initial_covariance: [[1.0, 0.0], [0.0, 0.0]],
            ..FilterConfig::default()
        };
        let mut est = LeanAngleEstimator::new(&config);
        let target = accel_angle_deg(-0.5);

        let mut last_err = (target - est.state().angle_estimate).abs();
        for _ in 0..50 {
            est.on_accel_sample(-0.5);
            let err = (target - est.state().angle_estimate).abs();
            assert!(err < last_err, "error grew: {} -> {}", last_err, err);
            last_err = err;
        }
        assert!(last_err < 0.05);
    }

    #[test]
    fn test_accel_without_prior_uncertainty_is_ignored() {
        let mut est = estimator();
        est.on_accel_sample(-0.5);
        assert_eq!(est.state().angle_estimate, 0.0);
    }

    #[test]
    fn test_warm_filter_tracks_accel_angle() {
        let mut est = estimator();
        for _ in 0..400 {
            est.on_gyro_sample(0.0, 0.05);
            est.on_accel_sample(-0.5);
        }
        assert_abs_diff_eq!(est.state().angle_estimate, accel_angle_deg(-0.5), epsilon = 0.01);

        let p = est.state().error_covariance;
        assert!(p[(0, 0)] >= 0.0);
        assert!(p[(1, 1)] >= 0.0);
    }

    #[test]
    fn test_calibrate_zeroes_reading() {
        let mut est = estimator();
        for _ in 0..20 {
            est.on_gyro_sample(30.0, 0.05);
        }
        assert_eq!(est.current_angle_deg(), 30.0);

        est.calibrate();
        assert_eq!(est.current_angle_deg(), 0.0);
        assert_abs_diff_eq!(est.calibration_offset(), 30.0, epsilon = 1e-9);

        est.reset_calibration();
        assert_eq!(est.current_angle_deg(), 30.0);
    }

    #[test]
    fn test_half_degrees_round_up() {
        let mut left = estimator();
        left.on_gyro_sample(-50.0, 0.05);
        assert_eq!(left.state().angle_estimate, -2.5);
        assert_eq!(left.current_angle_deg(), -2.0);

        let mut right = estimator();
        right.on_gyro_sample(50.0, 0.05);
        assert_eq!(right.current_angle_deg(), 3.0);

        assert_eq!(round_half_up(-2.6), -3.0);
        assert_eq!(round_half_up(-0.4), 0.0);
    }

    #[test]
    fn test_accel_angle_sign() {
        // Positive X gravity component means leaning left
        assert!(accel_angle_deg(0.3) < 0.0);
        assert_abs_diff_eq!(accel_angle_deg(-1.0), 45.0, epsilon = 1e-12);
    }

    #[test]
    fn test_delta_clock() {
        let mut clock = DeltaClock::seeded(1_000);
        assert_abs_diff_eq!(clock.delta_secs(1_050), 0.05, epsilon = 1e-12);
        assert_abs_diff_eq!(clock.delta_secs(1_120), 0.07, epsilon = 1e-12);
        assert_eq!(clock.delta_secs(1_100), 0.0);
        assert_abs_diff_eq!(clock.delta_secs(1_170), 0.05, epsilon = 1e-12);
    }
}

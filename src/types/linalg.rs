//! Fixed-size matrix aliases for the lean-angle filter.

use nalgebra::SMatrix;

/// Lean filter state: [angle, gyro bias]
pub const LEAN_STATE_DIM: usize = 2;

pub type LeanCovariance = SMatrix<f64, LEAN_STATE_DIM, LEAN_STATE_DIM>;

/// Build a covariance from a row-major array (config form)
pub fn covariance_from_rows(rows: [[f64; 2]; 2]) -> LeanCovariance {
    LeanCovariance::new(rows[0][0], rows[0][1], rows[1][0], rows[1][1])
}

pub mod lean_angle;

pub use lean_angle::{accel_angle_deg, DeltaClock, FilterState, LeanAngleEstimator};

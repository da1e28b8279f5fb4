//! Runtime configuration for the ride telemetry engine.
//!
//! Every section carries `#[serde(default)]`, so a partial JSON file only
//! overrides the keys it names.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RideError, RideResult};

/// Fallback start location when reverse geocoding fails
pub const UNKNOWN_LOCATION: &str = "Unknown location";

/// Lean-angle Kalman filter tuning
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Angle process noise
    pub q_angle: f64,
    /// Gyro bias process noise
    pub q_bias: f64,
    /// Accelerometer measurement noise
    pub r_measure: f64,
    /// Error covariance at construction, row-major over [angle, bias]
    pub initial_covariance: [[f64; 2]; 2],
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            q_angle: 0.001,
            q_bias: 0.003,
            r_measure: 0.03,
            initial_covariance: [[0.0, 0.0], [0.0, 0.0]],
        }
    }
}

/// Sensor subscription cadence
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Gyroscope and accelerometer update interval
    pub motion_interval_ms: u64,
    /// Location update interval
    pub location_interval_ms: u64,
    /// Minimum movement between location updates (meters)
    pub location_distance_filter_m: f64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            motion_interval_ms: 50,
            location_interval_ms: 1000,
            location_distance_filter_m: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpsConfig {
    /// Fixes at or below this accuracy (meters) count as a strong signal
    pub strong_accuracy_m: f64,
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            strong_accuracy_m: 5.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub filter: FilterConfig,
    pub sensors: SensorConfig,
    pub gps: GpsConfig,
    /// Start location recorded when the geocoder cannot name the place
    pub unknown_location: String,
    /// Directory backing the file key-value store
    pub store_dir: String,
    /// Reverse geocoding endpoint (Nominatim compatible)
    pub geocoder_url: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: FilterConfig::default(),
            sensors: SensorConfig::default(),
            gps: GpsConfig::default(),
            unknown_location: UNKNOWN_LOCATION.to_string(),
            store_dir: "ride_store".to_string(),
            geocoder_url: "https://nominatim.openstreetmap.org/reverse".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> RideResult<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: TelemetryConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> RideResult<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> RideResult<()> {
        let f = &self.filter;
        if f.q_angle < 0.0 || f.q_bias < 0.0 {
            return Err(RideError::Config(
                "process noise must be non-negative".to_string(),
            ));
        }
        if f.r_measure <= 0.0 {
            return Err(RideError::Config(
                "measurement noise must be positive".to_string(),
            ));
        }
        if f.initial_covariance[0][0] < 0.0 || f.initial_covariance[1][1] < 0.0 {
            return Err(RideError::Config(
                "initial covariance diagonal must be non-negative".to_string(),
            ));
        }
        if self.sensors.motion_interval_ms == 0 || self.sensors.location_interval_ms == 0 {
            return Err(RideError::Config(
                "sensor intervals must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

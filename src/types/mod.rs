pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

/// Gyroscope rad/s to deg/s, as the platform sensor layer applies it
pub const RAD_TO_DEG: f64 = 57.2958;

/// Gyroscope sample, X axis only (roll rate in rad/s)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GyroSample {
    pub timestamp_ms: i64,
    pub x: f64,
}

impl GyroSample {
    pub fn new(x: f64, timestamp_ms: i64) -> Self {
        Self { timestamp_ms, x }
    }

    pub fn axis_rate_deg_s(&self) -> f64 {
        self.x * RAD_TO_DEG
    }
}

/// Accelerometer sample, X axis only (in g)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccelSample {
    pub timestamp_ms: i64,
    pub x: f64,
}

impl AccelSample {
    pub fn new(x: f64, timestamp_ms: i64) -> Self {
        Self { timestamp_ms, x }
    }
}

/// Location fix from the platform location service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Ground speed in m/s; some providers omit it
    #[serde(default)]
    pub speed_mps: Option<f64>,
    pub accuracy_m: f64,
    pub timestamp_ms: i64,
}

impl GpsFix {
    pub fn new(
        latitude: f64,
        longitude: f64,
        speed_mps: Option<f64>,
        accuracy_m: f64,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            latitude,
            longitude,
            speed_mps,
            accuracy_m,
            timestamp_ms,
        }
    }

    pub fn point(&self) -> RoutePoint {
        RoutePoint {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    /// Speed in km/h, missing speed reads as standing still
    pub fn speed_kmh(&self) -> f64 {
        self.speed_mps.map(|s| s * 3.6).unwrap_or(0.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl RoutePoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// As a geo point (x = longitude, y = latitude)
    pub fn to_geo(self) -> geo::Point<f64> {
        geo::Point::new(self.longitude, self.latitude)
    }
}

/// Advisory signal indicator shown next to the speed readout
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GpsQuality {
    #[default]
    Unknown,
    Strong,
    Weak,
}

impl GpsQuality {
    pub fn from_accuracy(accuracy_m: f64, strong_threshold_m: f64) -> Self {
        if accuracy_m <= strong_threshold_m {
            GpsQuality::Strong
        } else {
            GpsQuality::Weak
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gyro_rate_conversion() {
        let gyro = GyroSample::new(1.0, 0);
        assert_eq!(gyro.axis_rate_deg_s(), 57.2958);
    }

    #[test]
    fn test_missing_speed_is_zero() {
        let fix = GpsFix::new(52.0, 21.0, None, 3.0, 0);
        assert_eq!(fix.speed_kmh(), 0.0);

        let fix = GpsFix::new(52.0, 21.0, Some(10.0), 3.0, 0);
        assert!((fix.speed_kmh() - 36.0).abs() < 1e-9);
    }

    #[test]
    fn test_gps_quality_threshold() {
        assert_eq!(GpsQuality::from_accuracy(5.0, 5.0), GpsQuality::Strong);
        assert_eq!(GpsQuality::from_accuracy(5.1, 5.0), GpsQuality::Weak);
    }

    #[test]
    fn test_fix_deserializes_without_speed() {
        let json = r#"{ "latitude": 1.0, "longitude": 2.0, "accuracy_m": 4.0, "timestamp_ms": 10 }"#;
        let fix: GpsFix = serde_json::from_str(json).unwrap();
        assert_eq!(fix.speed_mps, None);
        assert_eq!(fix.point(), RoutePoint::new(1.0, 2.0));
    }
}

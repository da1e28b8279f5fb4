use geo::HaversineDistance;

use crate::types::{GpsFix, GpsQuality, RoutePoint};

/// Turns location fixes into speed, running distance and the route polyline.
///
/// Distance is the great-circle sum between consecutive recorded points.
/// Fixes are never filtered on accuracy; the quality flag is display-only.
#[derive(Clone, Debug)]
pub struct SpeedDistanceAccumulator {
    route_points: Vec<RoutePoint>,
    distance_km: f64,
    current_speed_kmh: f64,
    max_speed_kmh: f64,
    gps_quality: GpsQuality,
    strong_accuracy_m: f64,
}

impl SpeedDistanceAccumulator {
    pub fn new(strong_accuracy_m: f64) -> Self {
        Self {
            route_points: Vec::new(),
            distance_km: 0.0,
            current_speed_kmh: 0.0,
            max_speed_kmh: 0.0,
            gps_quality: GpsQuality::Unknown,
            strong_accuracy_m,
        }
    }

    /// Record a fix into the route
    pub fn on_fix(&mut self, fix: &GpsFix) {
        let point = fix.point();
        if let Some(prev) = self.route_points.last() {
            self.distance_km += great_circle_km(*prev, point);
        }
        self.route_points.push(point);

        self.observe(fix);
        self.max_speed_kmh = self.max_speed_kmh.max(self.current_speed_kmh);
    }

    /// Update the live speed and signal readout without touching the route
    pub fn observe(&mut self, fix: &GpsFix) {
        self.current_speed_kmh = fix.speed_kmh();
        self.gps_quality = GpsQuality::from_accuracy(fix.accuracy_m, self.strong_accuracy_m);
    }

    /// Clear route data; the signal indicator survives since the receiver keeps running
    pub fn reset(&mut self) {
        self.route_points.clear();
        self.distance_km = 0.0;
        self.current_speed_kmh = 0.0;
        self.max_speed_kmh = 0.0;
    }

    pub fn route_points(&self) -> &[RoutePoint] {
        &self.route_points
    }

    pub fn take_route_points(&mut self) -> Vec<RoutePoint> {
        std::mem::take(&mut self.route_points)
    }

    pub fn distance_km(&self) -> f64 {
        self.distance_km
    }

    pub fn current_speed_kmh(&self) -> f64 {
        self.current_speed_kmh
    }

    pub fn max_speed_kmh(&self) -> f64 {
        self.max_speed_kmh
    }

    pub fn gps_quality(&self) -> GpsQuality {
        self.gps_quality
    }
}

pub fn great_circle_km(a: RoutePoint, b: RoutePoint) -> f64 {
    a.to_geo().haversine_distance(&b.to_geo()) / 1000.0
}

/// Average speed over the session; zero duration reports 0
pub fn average_speed_kmh(distance_km: f64, duration_sec: u64) -> f64 {
    if duration_sec == 0 {
        return 0.0;
    }
    distance_km / (duration_sec as f64 / 3600.0)
}

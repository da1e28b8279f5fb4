use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::accumulator::{average_speed_kmh, SpeedDistanceAccumulator};
use crate::config::TelemetryConfig;
use crate::error::{RideError, RideResult};
use crate::filters::{DeltaClock, LeanAngleEstimator};
use crate::geocode::{resolve_start_location, ReverseGeocoder};
use crate::live_status::{current_timestamp, LiveReadout};
use crate::sensors::SensorEvent;
use crate::types::{AccelSample, GpsFix, GyroSample, RoutePoint};

/// Session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Recording,
}

/// Finalized ride, as handed to persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRecord {
    pub id: i64,
    pub start_date: DateTime<Utc>,
    pub start_location: String,
    pub distance_km: f64,
    pub duration_sec: u64,
    pub avg_speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub max_lean_left_deg: f64,
    pub max_lean_right_deg: f64,
    #[serde(rename = "coordinates")]
    pub route_points: Vec<RoutePoint>,
}

/// Mutable ride aggregate
#[derive(Debug, Clone)]
pub struct RideSession {
    pub state: SessionState,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_sec: u64,
    /// Most negative calibrated lean seen, never above 0
    pub max_lean_left_deg: f64,
    /// Most positive calibrated lean seen, never below 0
    pub max_lean_right_deg: f64,
    pub track: SpeedDistanceAccumulator,
}

impl RideSession {
    fn new(strong_accuracy_m: f64) -> Self {
        Self {
            state: SessionState::Idle,
            started_at: None,
            duration_sec: 0,
            max_lean_left_deg: 0.0,
            max_lean_right_deg: 0.0,
            track: SpeedDistanceAccumulator::new(strong_accuracy_m),
        }
    }

    fn reset(&mut self) {
        self.started_at = None;
        self.duration_sec = 0;
        self.max_lean_left_deg = 0.0;
        self.max_lean_right_deg = 0.0;
        self.track.reset();
    }

    pub fn is_recording(&self) -> bool {
        self.state == SessionState::Recording
    }
}

/// Owns the lean filter and the ride aggregate.
///
/// Sensor and location events are accepted in any state so the filter stays
/// warm; only `Recording` lets them into route data.
pub struct RideSessionController {
    session: RideSession,
    estimator: LeanAngleEstimator,
    motion_clock: DeltaClock,
    lean_angle_deg: f64,
    last_known_location: Option<RoutePoint>,
    unknown_location: String,
}

impl RideSessionController {
    /// `now_ms` is the motion subscription start, seeding the first gyro `dt`
    pub fn new(config: &TelemetryConfig, now_ms: i64) -> Self {
        Self {
            session: RideSession::new(config.gps.strong_accuracy_m),
            estimator: LeanAngleEstimator::new(&config.filter),
            motion_clock: DeltaClock::seeded(now_ms),
            lean_angle_deg: 0.0,
            last_known_location: None,
            unknown_location: config.unknown_location.clone(),
        }
    }

    /// Transition Idle → Recording with a fresh aggregate
    pub fn start(&mut self) -> RideResult<()> {
        if self.session.is_recording() {
            return Err(RideError::AlreadyRecording);
        }
        self.session.reset();
        self.estimator.reset_calibration();
        self.session.started_at = Some(Utc::now());
        self.session.state = SessionState::Recording;
        log::info!("Ride recording started");
        Ok(())
    }

    /// Transition Recording → Idle and materialize the route.
    ///
    /// Geocoding failures are absorbed. The session stays `Recording` until the
    /// lookup completes, so a cancelled `stop` leaves the ride intact.
    pub async fn stop<G: ReverseGeocoder>(&mut self, geocoder: &G) -> RideResult<RouteRecord> {
        if !self.session.is_recording() {
            return Err(RideError::NotRecording);
        }

        let start_point = self
            .session
            .track
            .route_points()
            .first()
            .copied()
            .or(self.last_known_location);
        let start_location =
            resolve_start_location(geocoder, start_point, &self.unknown_location).await;

        self.session.state = SessionState::Idle;
        let track = &mut self.session.track;
        let distance_km = track.distance_km();
        let duration_sec = self.session.duration_sec;
        let record = RouteRecord {
            // Not unique on its own; RouteStore::append bumps collisions
            id: Utc::now().timestamp_millis(),
            start_date: self.session.started_at.unwrap_or_else(Utc::now),
            start_location,
            distance_km,
            duration_sec,
            avg_speed_kmh: average_speed_kmh(distance_km, duration_sec),
            max_speed_kmh: track.max_speed_kmh(),
            max_lean_left_deg: self.session.max_lean_left_deg,
            max_lean_right_deg: self.session.max_lean_right_deg,
            route_points: track.take_route_points(),
        };

        self.session.reset();
        log::info!(
            "Ride recording stopped: {:.2} km in {} s from {} ({} points)",
            record.distance_km,
            record.duration_sec,
            record.start_location,
            record.route_points.len()
        );
        Ok(record)
    }

    pub fn on_sensor_event(&mut self, event: &SensorEvent) {
        match event {
            SensorEvent::Gyro(sample) => self.on_gyro_sample(sample),
            SensorEvent::Accel(sample) => self.on_accel_sample(sample),
            SensorEvent::Location(fix) => self.on_fix(fix),
        }
    }

    pub fn on_gyro_sample(&mut self, sample: &GyroSample) {
        let dt = self.motion_clock.delta_secs(sample.timestamp_ms);
        self.estimator.on_gyro_sample(sample.axis_rate_deg_s(), dt);
    }

    pub fn on_accel_sample(&mut self, sample: &AccelSample) {
        self.estimator.on_accel_sample(sample.x);
        self.lean_angle_deg = self.estimator.current_angle_deg();
        self.on_lean_update(self.lean_angle_deg);
    }

    /// Fold a calibrated lean angle into the extremes; ignored while idle
    pub fn on_lean_update(&mut self, angle_deg: f64) {
        if !self.session.is_recording() {
            return;
        }
        self.session.max_lean_left_deg = self.session.max_lean_left_deg.min(angle_deg);
        self.session.max_lean_right_deg = self.session.max_lean_right_deg.max(angle_deg);
    }

    pub fn on_fix(&mut self, fix: &GpsFix) {
        self.last_known_location = Some(fix.point());
        if self.session.is_recording() {
            self.session.track.on_fix(fix);
        } else {
            self.session.track.observe(fix);
        }
    }

    /// One-second duration tick
    pub fn tick(&mut self) {
        if self.session.is_recording() {
            self.session.duration_sec += 1;
        }
    }

    pub fn calibrate(&mut self) {
        self.estimator.calibrate();
        self.lean_angle_deg = self.estimator.current_angle_deg();
        self.session.max_lean_left_deg = 0.0;
        self.session.max_lean_right_deg = 0.0;
    }

    pub fn readout(&self) -> LiveReadout {
        let track = &self.session.track;
        LiveReadout {
            timestamp: current_timestamp(),
            is_recording: self.session.is_recording(),
            current_speed_kmh: track.current_speed_kmh(),
            max_speed_kmh: track.max_speed_kmh(),
            distance_km: track.distance_km(),
            duration_sec: self.session.duration_sec,
            lean_angle_deg: self.lean_angle_deg,
            max_lean_left_deg: self.session.max_lean_left_deg,
            max_lean_right_deg: self.session.max_lean_right_deg,
            gps_quality: track.gps_quality(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_recording()
    }

    pub fn session(&self) -> &RideSession {
        &self.session
    }

    pub fn estimator(&self) -> &LeanAngleEstimator {
        &self.estimator
    }

    pub fn last_known_location(&self) -> Option<RoutePoint> {
        self.last_known_location
    }
}

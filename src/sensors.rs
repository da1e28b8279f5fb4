//! Sensor subscriptions.
//!
//! Each subscription is a periodic task pushing [`SensorEvent`]s into one
//! channel. Dropping the returned [`Subscription`] (or releasing the whole
//! [`SubscriptionSet`]) stops the task.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::accumulator::great_circle_km;
use crate::types::{AccelSample, GpsFix, GyroSample, RoutePoint, RAD_TO_DEG};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorEvent {
    Gyro(GyroSample),
    Accel(AccelSample),
    Location(GpsFix),
}

impl SensorEvent {
    pub fn timestamp_ms(&self) -> i64 {
        match self {
            SensorEvent::Gyro(g) => g.timestamp_ms,
            SensorEvent::Accel(a) => a.timestamp_ms,
            SensorEvent::Location(f) => f.timestamp_ms,
        }
    }
}

/// Handle to a running sensor listener
pub struct Subscription {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(name: &'static str, handle: JoinHandle<()>) -> Self {
        Self {
            name,
            handle: Some(handle),
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// Stop the listener; calling twice is harmless
    pub fn remove(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            log::debug!("[{}] listener removed", self.name);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

/// All listeners of one ride screen, released together
#[derive(Default)]
pub struct SubscriptionSet {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn release_all(&mut self) {
        if self.subscriptions.is_empty() {
            return;
        }
        let count = self.subscriptions.len();
        for mut sub in self.subscriptions.drain(..) {
            sub.remove();
        }
        log::info!("Released {} sensor subscription(s)", count);
    }
}

impl Drop for SubscriptionSet {
    fn drop(&mut self) {
        self.release_all();
    }
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Poll `read` every `period` and forward each reading.
///
/// Full channel drops the sample; closed channel ends the task.
fn spawn_feed<T, F>(
    name: &'static str,
    period: Duration,
    tx: Sender<SensorEvent>,
    mut read: F,
    wrap: fn(T) -> SensorEvent,
) -> Subscription
where
    T: Send + 'static,
    F: FnMut(i64) -> Option<T> + Send + 'static,
{
    let handle = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sample_count = 0u64;

        loop {
            ticker.tick().await;
            let Some(reading) = read(now_ms()) else {
                continue;
            };

            match tx.try_send(wrap(reading)) {
                Ok(_) => {
                    sample_count += 1;
                    if sample_count % 1000 == 0 {
                        log::debug!("[{}] {} samples", name, sample_count);
                    }
                }
                Err(TrySendError::Closed(_)) => {
                    log::info!("[{}] Channel closed after {} samples", name, sample_count);
                    break;
                }
                Err(TrySendError::Full(_)) => {}
            }
        }
    });
    Subscription::new(name, handle)
}

pub fn subscribe_gyroscope<F>(period: Duration, tx: Sender<SensorEvent>, read: F) -> Subscription
where
    F: FnMut(i64) -> Option<GyroSample> + Send + 'static,
{
    spawn_feed("gyro", period, tx, read, SensorEvent::Gyro)
}

pub fn subscribe_accelerometer<F>(
    period: Duration,
    tx: Sender<SensorEvent>,
    read: F,
) -> Subscription
where
    F: FnMut(i64) -> Option<AccelSample> + Send + 'static,
{
    spawn_feed("accel", period, tx, read, SensorEvent::Accel)
}

/// Location feed; fixes closer than `distance_filter_m` to the last
/// delivered one are suppressed
pub fn subscribe_location<F>(
    period: Duration,
    distance_filter_m: f64,
    tx: Sender<SensorEvent>,
    mut read: F,
) -> Subscription
where
    F: FnMut(i64) -> Option<GpsFix> + Send + 'static,
{
    let mut filter = DistanceFilter::new(distance_filter_m);
    spawn_feed(
        "gps",
        period,
        tx,
        move |now| read(now).filter(|fix| filter.accept(fix.point())),
        SensorEvent::Location,
    )
}

#[derive(Clone, Debug)]
pub struct DistanceFilter {
    min_distance_m: f64,
    last: Option<RoutePoint>,
}

impl DistanceFilter {
    pub fn new(min_distance_m: f64) -> Self {
        Self {
            min_distance_m,
            last: None,
        }
    }

    pub fn accept(&mut self, point: RoutePoint) -> bool {
        if let Some(last) = self.last {
            if great_circle_km(last, point) * 1000.0 < self.min_distance_m {
                return false;
            }
        }
        self.last = Some(point);
        true
    }
}

/// Synthetic ride: a rider weaving left and right while heading north.
///
/// All three streams are derived from the same timeline so the lean seen by
/// the gyroscope agrees with the tilt seen by the accelerometer.
#[derive(Clone, Copy, Debug)]
pub struct SimulatedRide {
    origin_ms: i64,
    origin: RoutePoint,
    /// Peak lean (degrees)
    pub lean_amplitude_deg: f64,
    /// Seconds per left-right weave
    pub weave_period_s: f64,
    /// Mean ground speed (m/s)
    pub cruise_speed_mps: f64,
}

const SPEED_SWING_MPS: f64 = 5.0;
const SPEED_PERIOD_S: f64 = 30.0;
const METERS_PER_DEG_LAT: f64 = 111_320.0;

impl SimulatedRide {
    pub fn new(origin_ms: i64, origin: RoutePoint) -> Self {
        Self {
            origin_ms,
            origin,
            lean_amplitude_deg: 35.0,
            weave_period_s: 8.0,
            cruise_speed_mps: 15.0,
        }
    }

    fn elapsed_s(&self, now_ms: i64) -> f64 {
        (now_ms - self.origin_ms).max(0) as f64 / 1000.0
    }

    pub fn lean_deg(&self, now_ms: i64) -> f64 {
        let w = 2.0 * PI / self.weave_period_s;
        self.lean_amplitude_deg * (w * self.elapsed_s(now_ms)).sin()
    }

    pub fn gyro(&self, now_ms: i64) -> GyroSample {
        let w = 2.0 * PI / self.weave_period_s;
        let rate_deg_s = self.lean_amplitude_deg * w * (w * self.elapsed_s(now_ms)).cos();
        GyroSample::new(rate_deg_s / RAD_TO_DEG, now_ms)
    }

    pub fn accel(&self, now_ms: i64) -> AccelSample {
        // Inverse of atan2(-x, 1)
        AccelSample::new(-self.lean_deg(now_ms).to_radians().tan(), now_ms)
    }

    pub fn fix(&self, now_ms: i64) -> GpsFix {
        let t = self.elapsed_s(now_ms);
        let w = 2.0 * PI / SPEED_PERIOD_S;
        let speed = self.cruise_speed_mps + SPEED_SWING_MPS * (w * t).sin();
        let travelled_m = self.cruise_speed_mps * t + SPEED_SWING_MPS / w * (1.0 - (w * t).cos());

        GpsFix::new(
            self.origin.latitude + travelled_m / METERS_PER_DEG_LAT,
            self.origin.longitude,
            Some(speed),
            4.0 + 3.0 * (t * 0.1).sin(),
            now_ms,
        )
    }

    /// Subscribe all three simulated streams into `tx`
    pub fn subscribe_all(
        &self,
        motion_period: Duration,
        location_period: Duration,
        distance_filter_m: f64,
        tx: Sender<SensorEvent>,
    ) -> SubscriptionSet {
        let ride = *self;
        let mut set = SubscriptionSet::new();
        set.push(subscribe_gyroscope(motion_period, tx.clone(), move |now| {
            Some(ride.gyro(now))
        }));
        set.push(subscribe_accelerometer(motion_period, tx.clone(), move |now| {
            Some(ride.accel(now))
        }));
        set.push(subscribe_location(
            location_period,
            distance_filter_m,
            tx,
            move |now| Some(ride.fix(now)),
        ));
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::accel_angle_deg;
    use approx::assert_abs_diff_eq;
    use tokio::sync::mpsc;

    #[test]
    fn test_simulated_streams_agree() {
        let ride = SimulatedRide::new(0, RoutePoint::new(50.0, 20.0));
        for now in [500, 1_300, 2_000, 5_750] {
            let from_accel = accel_angle_deg(ride.accel(now).x);
            assert_abs_diff_eq!(from_accel, ride.lean_deg(now), epsilon = 1e-9);
        }
        // Peak lean at a quarter weave, zero rate there
        assert_abs_diff_eq!(ride.lean_deg(2_000), 35.0, epsilon = 1e-9);
        assert_abs_diff_eq!(ride.gyro(2_000).x, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_simulated_fix_moves_north() {
        let ride = SimulatedRide::new(0, RoutePoint::new(50.0, 20.0));
        let a = ride.fix(0);
        let b = ride.fix(10_000);
        assert!(b.latitude > a.latitude);
        assert_eq!(b.longitude, 20.0);
        assert!(b.speed_mps.unwrap() > 10.0);
    }

    #[test]
    fn test_distance_filter() {
        let mut filter = DistanceFilter::new(1.0);
        assert!(filter.accept(RoutePoint::new(0.0, 0.0)));
        // ~0.11 m
        assert!(!filter.accept(RoutePoint::new(0.0, 0.000001)));
        // ~11 m
        assert!(filter.accept(RoutePoint::new(0.0, 0.0001)));
    }

    #[test]
    fn test_event_tagging() {
        let event = SensorEvent::Accel(AccelSample::new(0.1, 42));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"accel\""));
        let back: SensorEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.timestamp_ms(), 42);
    }

    #[tokio::test]
    async fn test_removed_subscription_is_inactive() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut sub = subscribe_gyroscope(Duration::from_millis(5), tx, |now| {
            Some(GyroSample::new(0.0, now))
        });
        assert!(rx.recv().await.is_some());
        assert!(sub.is_active());

        sub.remove();
        assert!(!sub.is_active());
        sub.remove();
    }

    #[tokio::test]
    async fn test_feed_delivers_and_release_stops() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut set = SubscriptionSet::new();
        set.push(subscribe_accelerometer(
            Duration::from_millis(5),
            tx,
            |now| Some(AccelSample::new(0.0, now)),
        ));
        assert_eq!(set.len(), 1);

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, SensorEvent::Accel(_)));

        set.release_all();
        assert!(set.is_empty());
        // Aborted task drops its sender, draining ends with None
        while rx.recv().await.is_some() {}
    }
}

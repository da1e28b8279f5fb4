//! Ride telemetry engine for motorcycle route recording.
//!
//! Fuses gyroscope and accelerometer roll data into a drift-corrected lean
//! angle, accumulates GPS speed / distance / route geometry, and turns a
//! recording session into a persisted route record.

pub mod accumulator;
pub mod config;
pub mod error;
pub mod filters;
pub mod geocode;
pub mod live_status;
pub mod sensors;
pub mod session;
pub mod storage;
pub mod tracker;
pub mod types;

pub use config::TelemetryConfig;
pub use error::{RideError, RideResult};
pub use filters::LeanAngleEstimator;
pub use live_status::LiveReadout;
pub use session::{RideSessionController, RouteRecord, SessionState};
pub use tracker::{spawn_tracker, TrackerHandle};

use serde::{Deserialize, Serialize};
use std::fs;

use crate::types::GpsQuality;

/// Values shown on the ride screen, refreshed on every sensor event
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct LiveReadout {
    pub timestamp: f64,
    pub is_recording: bool,
    pub current_speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub distance_km: f64,
    pub duration_sec: u64,
    pub lean_angle_deg: f64,
    pub max_lean_left_deg: f64,
    pub max_lean_right_deg: f64,
    pub gps_quality: GpsQuality,
}

impl LiveReadout {
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// One-line summary for periodic logging
    pub fn summary(&self) -> String {
        format!(
            "{} | {:.1} km/h (max {:.1}) | {:.2} km | {} | lean {}° (L {}° / R {}°) | GPS {:?}",
            if self.is_recording { "REC" } else { "idle" },
            self.current_speed_kmh,
            self.max_speed_kmh,
            self.distance_km,
            format_duration(self.duration_sec),
            self.lean_angle_deg,
            self.max_lean_left_deg.abs(),
            self.max_lean_right_deg,
            self.gps_quality
        )
    }
}

/// Render a ride duration as `"{h} h {m} m {s} s"`
pub fn format_duration(duration_sec: u64) -> String {
    format!(
        "{} h {} m {} s",
        duration_sec / 3600,
        (duration_sec % 3600) / 60,
        duration_sec % 60
    )
}

pub fn current_timestamp() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0 h 0 m 0 s");
        assert_eq!(format_duration(3725), "1 h 2 m 5 s");
    }

    #[test]
    fn test_summary_shows_left_lean_as_magnitude() {
        let readout = LiveReadout {
            max_lean_left_deg: -32.0,
            max_lean_right_deg: 28.0,
            ..LiveReadout::default()
        };
        let line = readout.summary();
        assert!(line.contains("L 32°"));
        assert!(line.contains("R 28°"));
    }
}

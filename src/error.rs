use thiserror::Error;

/// Ride telemetry error types
#[derive(Error, Debug)]
pub enum RideError {
    #[error("Ride already recording")]
    AlreadyRecording,

    #[error("Ride not recording")]
    NotRecording,

    #[error("Reverse geocoding failed: {0}")]
    Geocode(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Tracker task is no longer running")]
    TrackerClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type for ride telemetry operations
pub type RideResult<T> = Result<T, RideError>;

impl RideError {
    /// True for errors caused by calling an operation in the wrong session state
    pub fn is_state_error(&self) -> bool {
        matches!(self, RideError::AlreadyRecording | RideError::NotRecording)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_errors() {
        assert!(RideError::AlreadyRecording.is_state_error());
        assert!(RideError::NotRecording.is_state_error());
        assert!(!RideError::Storage("disk full".to_string()).is_state_error());
    }

    #[test]
    fn test_json_error_converts() {
        let err: RideError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, RideError::Json(_)));
        assert!(!err.to_string().is_empty());
    }
}

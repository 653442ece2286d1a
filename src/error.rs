use thiserror::Error;

/// Gaze tracker error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GazeTrackerError {
    #[error("No eye tracker found")]
    DeviceNotFound,

    #[error("Invalid display geometry: {0}")]
    InvalidGeometry(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Calibration incomplete: {0}")]
    CalibrationIncomplete(String),

    #[error("Recording already running")]
    AlreadyRecording,

    #[error("Not recording")]
    NotRecording,

    #[error("Sample stream closed")]
    StreamClosed,

    #[error("Timed out waiting for samples")]
    Timeout,
}

/// Result type for tracker operations
pub type Result<T> = std::result::Result<T, GazeTrackerError>;

//! Binocular gaze stream processing: display calibration metrics, validation
//! scoring, and online fixation detection.
//!
//! The tracker hardware, target rendering and input handling are external
//! collaborators; this crate owns the sample-stream core: combining noisy
//! per-eye samples into one gaze point, scoring calibration quality, and
//! running the dwell-time/hysteresis fixation state machine.

pub mod aggregator;
pub mod calibration;
pub mod error;
pub mod fixation;
pub mod geometry;
pub mod session;
pub mod source;
pub mod types;

pub use aggregator::SampleAggregator;
pub use calibration::{
    AccuracyPx, CalibrationEngine, CalibrationParams, CalibrationReport, SampleCadence,
    ValidationTarget,
};
pub use error::{GazeTrackerError, Result};
pub use fixation::{FixationDetector, FixationStream, FixationThresholds};
pub use session::{RecordingSession, SessionState};
pub use source::{find_all_trackers, GazeCallback, GazeSource, SyntheticGazeSource};
pub use types::{
    CalibrationTarget, DisplayGeometry, EyeSample, FixationEvent, GazeSample, RawGazeSample,
    INVALID, INVALID_PAIR,
};

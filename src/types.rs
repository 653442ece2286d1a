use serde::{Deserialize, Serialize};

/// Sentinel for missing scalar data (pupil diameter, coordinates).
pub const INVALID: f64 = -1.0;

/// Sentinel gaze position meaning "no eye produced a valid point".
/// Screen pixel (-1, -1) is outside the display and cannot occur validly.
pub const INVALID_PAIR: (f64, f64) = (INVALID, INVALID);

/// Per-eye record inside a raw tracker sample.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EyeSample {
    pub gaze_origin_valid: bool,
    pub gaze_point_valid: bool,
    pub pupil_valid: bool,
    /// Gaze point on the display area, normalized to [0,1] x [0,1].
    pub gaze_point: (f64, f64),
    /// Pupil diameter in millimeters.
    pub pupil_diameter: f64,
    /// Eye origin depth in the user coordinate system, millimeters from the
    /// tracker. Used for eye-distance reporting.
    pub origin_z_mm: f64,
}

impl EyeSample {
    pub fn invalid() -> Self {
        Self {
            gaze_origin_valid: false,
            gaze_point_valid: false,
            pupil_valid: false,
            gaze_point: INVALID_PAIR,
            pupil_diameter: INVALID,
            origin_z_mm: INVALID,
        }
    }

    pub fn at(x: f64, y: f64) -> Self {
        Self {
            gaze_origin_valid: true,
            gaze_point_valid: true,
            pupil_valid: false,
            gaze_point: (x, y),
            pupil_diameter: INVALID,
            origin_z_mm: 600.0,
        }
    }

    pub fn with_pupil(mut self, diameter_mm: f64) -> Self {
        self.pupil_valid = true;
        self.pupil_diameter = diameter_mm;
        self
    }
}

/// One binocular sample as delivered by the tracker callback.
/// Immutable once received.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawGazeSample {
    /// Device clock, microseconds. Monotonic but not wall time.
    pub device_timestamp_us: u64,
    pub left: EyeSample,
    pub right: EyeSample,
}

impl RawGazeSample {
    pub fn new(device_timestamp_us: u64, left: EyeSample, right: EyeSample) -> Self {
        Self {
            device_timestamp_us,
            left,
            right,
        }
    }

    /// Mean distance from the tracker to the valid eye origins, centimeters.
    /// Returns None when neither origin is valid.
    pub fn eye_distance_cm(&self) -> Option<f64> {
        let mut distances = Vec::with_capacity(2);
        if self.left.gaze_origin_valid {
            distances.push(self.left.origin_z_mm / 10.0);
        }
        if self.right.gaze_origin_valid {
            distances.push(self.right.origin_z_mm / 10.0);
        }
        if distances.is_empty() {
            None
        } else {
            Some(distances.iter().sum::<f64>() / distances.len() as f64)
        }
    }
}

/// Combined gaze sample in screen coordinates, produced by the aggregator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GazeSample {
    /// Milliseconds since recording start.
    pub t_ms: f64,
    /// Screen position in pixels, or INVALID_PAIR.
    pub x: f64,
    pub y: f64,
    /// Pupil diameter in millimeters, or INVALID.
    pub pupil: f64,
}

impl GazeSample {
    pub fn is_valid(&self) -> bool {
        (self.x, self.y) != INVALID_PAIR
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

/// Physical and pixel dimensions of the display, set once per session.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct DisplayGeometry {
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub physical_width_cm: f64,
    pub physical_height_cm: f64,
    pub viewing_distance_cm: f64,
}

/// Normalized on-screen position shown during calibration/validation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTarget {
    pub x: f64,
    pub y: f64,
}

impl CalibrationTarget {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// The canonical five-point layout: four corners inset 10% plus center.
    /// All points stay within [0.1, 0.9] of each axis to avoid tracker edge
    /// artifacts.
    pub fn standard_five() -> [CalibrationTarget; 5] {
        [
            CalibrationTarget::new(0.1, 0.1),
            CalibrationTarget::new(0.9, 0.1),
            CalibrationTarget::new(0.5, 0.5),
            CalibrationTarget::new(0.1, 0.9),
            CalibrationTarget::new(0.9, 0.9),
        ]
    }
}

/// A completed fixation. The anchor is the position at fixation start, not a
/// centroid of the samples that followed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FixationEvent {
    pub start_ms: f64,
    pub end_ms: f64,
    pub anchor_x: f64,
    pub anchor_y: f64,
}

impl FixationEvent {
    pub fn duration_ms(&self) -> f64 {
        self.end_ms - self.start_ms
    }
}

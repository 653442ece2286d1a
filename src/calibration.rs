//! Calibration quality metrics and derived operational thresholds.
//!
//! The hardware gaze-to-display calibration itself is done by the tracker's
//! calibration API; this engine scores the validation pass recorded after it
//! (per-eye accuracy, device sample cadence, RMS spatial noise) and converts
//! the configured visual-angle tolerances into pixel units.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GazeTrackerError, Result};
use crate::geometry::{degrees_to_pixels, norm_to_pixel};
use crate::types::{CalibrationTarget, DisplayGeometry, GazeSample, RawGazeSample};

/// Tolerances in visual-angle units, fixed per deployment.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CalibrationParams {
    /// Maximal distance from fixation start before the fixation has stopped.
    pub fixation_threshold_deg: f64,
    /// Time gaze has to linger within the radius to count as a fixation.
    pub dwell_time_ms: f64,
    /// Saccade velocity threshold.
    pub speed_threshold_deg_per_s: f64,
    /// Saccade acceleration threshold.
    pub accel_threshold_deg_per_s2: f64,
    /// Blink detection threshold, persisted for downstream consumers.
    pub blink_threshold_ms: f64,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            fixation_threshold_deg: 1.5,
            dwell_time_ms: 100.0,
            speed_threshold_deg_per_s: 35.0,
            accel_threshold_deg_per_s2: 9500.0,
            blink_threshold_ms: 50.0,
        }
    }
}

/// Mean absolute deviation from the targets, pixels per axis, per eye.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccuracyPx {
    pub left: (f64, f64),
    pub right: (f64, f64),
}

/// Device sample cadence measured over the raw stream.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleCadence {
    pub mean_intersample_ms: f64,
    pub rate_hz: u32,
}

/// One validation target and the raw samples recorded while it was shown.
#[derive(Clone, Debug)]
pub struct ValidationTarget {
    pub target: CalibrationTarget,
    pub samples: Vec<RawGazeSample>,
}

/// Everything a calibration session produces. Immutable once built;
/// persistence is the caller's concern.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub sample_rate_hz: u32,
    pub mean_intersample_ms: f64,
    pub accuracy_px: AccuracyPx,
    pub precision_rms_px: (f64, f64),
    pub fixation_threshold_px: f64,
    pub dwell_time_ms: f64,
    pub speed_threshold_px_per_ms: f64,
    pub accel_threshold_px_per_ms2: f64,
    pub blink_threshold_ms: f64,
}

impl CalibrationReport {
    /// Flat named-threshold mapping for the persistence collaborator.
    /// Key names follow the established calibration file format.
    pub fn to_config(&self) -> BTreeMap<String, f64> {
        let mut config = BTreeMap::new();
        config.insert("samplerate".to_string(), self.sample_rate_hz as f64);
        config.insert("sampletime".to_string(), self.mean_intersample_ms);
        config.insert("pxfixtresh".to_string(), self.fixation_threshold_px);
        config.insert("fixtimetresh".to_string(), self.dwell_time_ms);
        config.insert("pxdsttresh_x".to_string(), self.precision_rms_px.0);
        config.insert("pxdsttresh_y".to_string(), self.precision_rms_px.1);
        config.insert("pxspdtresh".to_string(), self.speed_threshold_px_per_ms);
        config.insert("pxacctresh".to_string(), self.accel_threshold_px_per_ms2);
        config.insert("blinkthresh".to_string(), self.blink_threshold_ms);
        config
    }

    /// Human-readable report block shown to the operator after calibration.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str("calibration report start\n");
        out.push_str(&format!("samplerate: {} Hz\n", self.sample_rate_hz));
        out.push_str(&format!("sampletime: {:.3} ms\n", self.mean_intersample_ms));
        out.push_str(&format!(
            "accuracy (in pixels): LX={:.2}, LY={:.2}, RX={:.2}, RY={:.2}\n",
            self.accuracy_px.left.0,
            self.accuracy_px.left.1,
            self.accuracy_px.right.0,
            self.accuracy_px.right.1
        ));
        out.push_str(&format!(
            "precision (RMS noise in pixels): X={:.2}, Y={:.2}\n",
            self.precision_rms_px.0, self.precision_rms_px.1
        ));
        out.push_str(&format!(
            "fixation threshold: {:.2} pixels\n",
            self.fixation_threshold_px
        ));
        out.push_str(&format!(
            "speed threshold: {:.4} pixels/ms\n",
            self.speed_threshold_px_per_ms
        ));
        out.push_str(&format!(
            "acceleration threshold: {:.4} pixels/ms**2\n",
            self.accel_threshold_px_per_ms2
        ));
        out.push_str("calibration report end\n");
        out
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Scores a validation pass against known target positions.
pub struct CalibrationEngine {
    geometry: DisplayGeometry,
    params: CalibrationParams,
}

impl CalibrationEngine {
    pub fn new(geometry: DisplayGeometry, params: CalibrationParams) -> Result<Self> {
        geometry.validate()?;
        Ok(Self { geometry, params })
    }

    pub fn params(&self) -> &CalibrationParams {
        &self.params
    }

    /// Per-eye accuracy over the validation targets.
    ///
    /// Two-level mean: per-target mean deviation first, then the mean of the
    /// per-target means. Each target therefore weighs equally no matter how
    /// many samples it collected, so a slow or noisy point cannot dominate.
    pub fn accuracy(&self, validation: &[ValidationTarget]) -> Result<AccuracyPx> {
        if validation.is_empty() {
            return Err(GazeTrackerError::InsufficientData(
                "no validation targets".to_string(),
            ));
        }

        // Per-target means, one entry per target where the eye had data
        let mut left_means: Vec<(f64, f64)> = Vec::new();
        let mut right_means: Vec<(f64, f64)> = Vec::new();

        for (index, entry) in validation.iter().enumerate() {
            let target_px = norm_to_pixel((entry.target.x, entry.target.y), &self.geometry);

            let left = eye_target_deviation(&entry.samples, target_px, &self.geometry, Eye::Left);
            let right = eye_target_deviation(&entry.samples, target_px, &self.geometry, Eye::Right);

            if left.is_none() && right.is_none() {
                // A silent mean-of-empty here would report perfect accuracy
                // for a target the tracker never saw
                return Err(GazeTrackerError::CalibrationIncomplete(format!(
                    "target {} at ({:.2}, {:.2}) collected no valid samples from either eye",
                    index, entry.target.x, entry.target.y
                )));
            }
            if let Some(dev) = left {
                left_means.push(dev);
            }
            if let Some(dev) = right {
                right_means.push(dev);
            }
        }

        let left = mean_of_pairs(&left_means).ok_or_else(|| {
            GazeTrackerError::CalibrationIncomplete(
                "left eye produced no valid samples at any target".to_string(),
            )
        })?;
        let right = mean_of_pairs(&right_means).ok_or_else(|| {
            GazeTrackerError::CalibrationIncomplete(
                "right eye produced no valid samples at any target".to_string(),
            )
        })?;

        Ok(AccuracyPx { left, right })
    }

    /// Mean inter-sample interval and rounded sample rate over the raw
    /// device stream. Measured raw rather than aggregated so invalid samples
    /// still count toward the true device cadence.
    pub fn sample_cadence(&self, raw: &[RawGazeSample]) -> Result<SampleCadence> {
        if raw.len() < 2 {
            return Err(GazeTrackerError::InsufficientData(format!(
                "need at least 2 raw samples to measure cadence, got {}",
                raw.len()
            )));
        }
        let mut total_ms = 0.0;
        for pair in raw.windows(2) {
            total_ms += (pair[1].device_timestamp_us - pair[0].device_timestamp_us) as f64 / 1000.0;
        }
        let mean_intersample_ms = total_ms / (raw.len() - 1) as f64;
        Ok(SampleCadence {
            mean_intersample_ms,
            rate_hz: (1000.0 / mean_intersample_ms).round() as u32,
        })
    }

    /// Successive-difference RMS of the combined gaze point while the subject
    /// fixates a static dot. Measures sample-to-sample jitter, not absolute
    /// displacement, so it is independent of accuracy.
    ///
    /// The first collected sample is discarded (transient lock-on noise), as
    /// are invalid samples and consecutive duplicate positions.
    pub fn rms_noise(&self, samples: &[GazeSample]) -> Result<(f64, f64)> {
        let mut filtered: Vec<(f64, f64)> = Vec::new();
        for sample in samples.iter().skip(1) {
            if !sample.is_valid() {
                continue;
            }
            if filtered.last() == Some(&sample.position()) {
                continue;
            }
            filtered.push(sample.position());
        }

        if filtered.len() < 2 {
            return Err(GazeTrackerError::InsufficientData(format!(
                "noise phase kept {} distinct valid samples, need at least 2",
                filtered.len()
            )));
        }

        let mut x_sq = Vec::with_capacity(filtered.len() - 1);
        let mut y_sq = Vec::with_capacity(filtered.len() - 1);
        for pair in filtered.windows(2) {
            x_sq.push((pair[1].0 - pair[0].0).powi(2));
            y_sq.push((pair[1].1 - pair[0].1).powi(2));
        }
        let x_rms = (x_sq.iter().sum::<f64>() / x_sq.len() as f64).sqrt();
        let y_rms = (y_sq.iter().sum::<f64>() / y_sq.len() as f64).sqrt();
        Ok((x_rms, y_rms))
    }

    /// Fixation radius in pixels from the configured degree tolerance.
    pub fn fixation_threshold_px(&self) -> f64 {
        self.deg_to_px(self.params.fixation_threshold_deg)
    }

    /// Saccade speed threshold in pixels per millisecond.
    pub fn speed_threshold_px_per_ms(&self) -> f64 {
        self.deg_to_px(self.params.speed_threshold_deg_per_s / 1000.0)
    }

    /// Saccade acceleration threshold in pixels per millisecond squared.
    pub fn accel_threshold_px_per_ms2(&self) -> f64 {
        self.deg_to_px(self.params.accel_threshold_deg_per_s2 / 1000.0)
    }

    fn deg_to_px(&self, angle_deg: f64) -> f64 {
        degrees_to_pixels(
            self.geometry.viewing_distance_cm,
            angle_deg,
            self.geometry.pixels_per_cm(),
        )
    }

    /// Assemble the full report from a completed calibration session.
    /// Recording must be stopped before this runs; the buffers passed in are
    /// treated as closed, consistent sets.
    pub fn build_report(
        &self,
        validation: &[ValidationTarget],
        session_raw: &[RawGazeSample],
        noise_samples: &[GazeSample],
    ) -> Result<CalibrationReport> {
        let accuracy_px = self.accuracy(validation)?;
        let cadence = self.sample_cadence(session_raw)?;
        let precision_rms_px = self.rms_noise(noise_samples)?;

        Ok(CalibrationReport {
            sample_rate_hz: cadence.rate_hz,
            mean_intersample_ms: cadence.mean_intersample_ms,
            accuracy_px,
            precision_rms_px,
            fixation_threshold_px: self.fixation_threshold_px(),
            dwell_time_ms: self.params.dwell_time_ms,
            speed_threshold_px_per_ms: self.speed_threshold_px_per_ms(),
            accel_threshold_px_per_ms2: self.accel_threshold_px_per_ms2(),
            blink_threshold_ms: self.params.blink_threshold_ms,
        })
    }
}

#[derive(Clone, Copy)]
enum Eye {
    Left,
    Right,
}

/// Mean absolute deviation of one eye's valid samples from the target, pixels
/// per axis. None when the eye had no valid sample at this target; invalid
/// samples are excluded, never counted as zero deviation.
fn eye_target_deviation(
    samples: &[RawGazeSample],
    target_px: (f64, f64),
    geometry: &DisplayGeometry,
    eye: Eye,
) -> Option<(f64, f64)> {
    let mut dx_sum = 0.0;
    let mut dy_sum = 0.0;
    let mut count = 0usize;
    for raw in samples {
        let eye_sample = match eye {
            Eye::Left => &raw.left,
            Eye::Right => &raw.right,
        };
        if !eye_sample.gaze_point_valid {
            continue;
        }
        let gaze_px = norm_to_pixel(eye_sample.gaze_point, geometry);
        dx_sum += (gaze_px.0 - target_px.0).abs();
        dy_sum += (gaze_px.1 - target_px.1).abs();
        count += 1;
    }
    if count == 0 {
        None
    } else {
        Some((dx_sum / count as f64, dy_sum / count as f64))
    }
}

fn mean_of_pairs(pairs: &[(f64, f64)]) -> Option<(f64, f64)> {
    if pairs.is_empty() {
        return None;
    }
    let n = pairs.len() as f64;
    Some((
        pairs.iter().map(|p| p.0).sum::<f64>() / n,
        pairs.iter().map(|p| p.1).sum::<f64>() / n,
    ))
}

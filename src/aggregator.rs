//! Combines per-eye raw samples into a single screen-space gaze sample.
//!
//! Two valid eyes average, one valid eye passes through, none yields the
//! invalid sentinel. Timestamps are rebased from the device clock to
//! milliseconds since recording start.

use crate::geometry::norm_to_pixel;
use crate::types::{DisplayGeometry, GazeSample, RawGazeSample, INVALID, INVALID_PAIR};

/// Per-sample transform from raw tracker output to `GazeSample`.
///
/// The only state carried across calls is `t0`, the device timestamp of the
/// first sample seen after `start()`. The tracker subscription and the first
/// callback can be up to a second apart, so rebasing against construction
/// time would skew every dwell-time comparison downstream.
pub struct SampleAggregator {
    geometry: DisplayGeometry,
    t0_us: Option<u64>,
}

impl SampleAggregator {
    pub fn new(geometry: DisplayGeometry) -> Self {
        Self {
            geometry,
            t0_us: None,
        }
    }

    /// Mark the start of a recording. The next sample aggregated defines
    /// elapsed time zero.
    pub fn start(&mut self) {
        self.t0_us = None;
    }

    pub fn geometry(&self) -> &DisplayGeometry {
        &self.geometry
    }

    /// Combine one raw sample. Position policy, in precedence order:
    /// both eyes valid -> per-axis mean of the two pixel positions;
    /// one eye valid -> that eye's position; neither -> sentinel pair.
    pub fn aggregate(&mut self, raw: &RawGazeSample) -> GazeSample {
        let t0 = *self.t0_us.get_or_insert(raw.device_timestamp_us);
        let t_ms = (raw.device_timestamp_us.saturating_sub(t0)) as f64 / 1000.0;

        let (x, y) = self.gaze_point(raw);
        let pupil = Self::pupil_size(raw);

        GazeSample { t_ms, x, y, pupil }
    }

    fn gaze_point(&self, raw: &RawGazeSample) -> (f64, f64) {
        match (raw.left.gaze_point_valid, raw.right.gaze_point_valid) {
            (true, true) => {
                let left = norm_to_pixel(raw.left.gaze_point, &self.geometry);
                let right = norm_to_pixel(raw.right.gaze_point, &self.geometry);
                ((left.0 + right.0) / 2.0, (left.1 + right.1) / 2.0)
            }
            (true, false) => norm_to_pixel(raw.left.gaze_point, &self.geometry),
            (false, true) => norm_to_pixel(raw.right.gaze_point, &self.geometry),
            (false, false) => INVALID_PAIR,
        }
    }

    fn pupil_size(raw: &RawGazeSample) -> f64 {
        match (raw.left.pupil_valid, raw.right.pupil_valid) {
            (true, true) => (raw.left.pupil_diameter + raw.right.pupil_diameter) / 2.0,
            (true, false) => raw.left.pupil_diameter,
            (false, true) => raw.right.pupil_diameter,
            (false, false) => INVALID,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EyeSample;
    use approx::assert_relative_eq;

    fn geom() -> DisplayGeometry {
        // 1000x1000 display keeps norm->pixel math trivial in tests
        DisplayGeometry::new(1000.0, 1000.0, 50.0, 50.0, 60.0).unwrap()
    }

    #[test]
    fn test_both_eyes_average() {
        let mut agg = SampleAggregator::new(geom());
        agg.start();
        let raw = RawGazeSample::new(0, EyeSample::at(0.1, 0.1), EyeSample::at(0.12, 0.14));
        let s = agg.aggregate(&raw);
        // (100,100) and (120,140) average to (110,120)
        assert_relative_eq!(s.x, 110.0);
        assert_relative_eq!(s.y, 120.0);
    }

    #[test]
    fn test_single_eye_passthrough() {
        let mut agg = SampleAggregator::new(geom());
        agg.start();
        let raw = RawGazeSample::new(0, EyeSample::invalid(), EyeSample::at(0.05, 0.06));
        let s = agg.aggregate(&raw);
        assert_relative_eq!(s.x, 50.0);
        assert_relative_eq!(s.y, 60.0);
    }

    #[test]
    fn test_no_eyes_sentinel() {
        let mut agg = SampleAggregator::new(geom());
        agg.start();
        let raw = RawGazeSample::new(0, EyeSample::invalid(), EyeSample::invalid());
        let s = agg.aggregate(&raw);
        assert!(!s.is_valid());
        assert_eq!((s.x, s.y), INVALID_PAIR);
        assert_eq!(s.pupil, INVALID);
    }

    #[test]
    fn test_pupil_policy() {
        let mut agg = SampleAggregator::new(geom());
        agg.start();

        let both = RawGazeSample::new(
            0,
            EyeSample::at(0.5, 0.5).with_pupil(3.0),
            EyeSample::at(0.5, 0.5).with_pupil(4.0),
        );
        assert_relative_eq!(agg.aggregate(&both).pupil, 3.5);

        let left_only = RawGazeSample::new(
            1000,
            EyeSample::at(0.5, 0.5).with_pupil(3.0),
            EyeSample::at(0.5, 0.5),
        );
        assert_relative_eq!(agg.aggregate(&left_only).pupil, 3.0);

        let neither = RawGazeSample::new(2000, EyeSample::at(0.5, 0.5), EyeSample::at(0.5, 0.5));
        assert_eq!(agg.aggregate(&neither).pupil, INVALID);
    }

    #[test]
    fn test_timestamps_rebased_to_first_sample() {
        let mut agg = SampleAggregator::new(geom());
        agg.start();
        let t_base = 5_000_000u64; // device clock does not start at zero
        let first = agg.aggregate(&RawGazeSample::new(
            t_base,
            EyeSample::at(0.5, 0.5),
            EyeSample::at(0.5, 0.5),
        ));
        let second = agg.aggregate(&RawGazeSample::new(
            t_base + 16_667,
            EyeSample::at(0.5, 0.5),
            EyeSample::at(0.5, 0.5),
        ));
        assert_eq!(first.t_ms, 0.0);
        assert_relative_eq!(second.t_ms, 16.667);
    }

    #[test]
    fn test_restart_resets_time_base() {
        let mut agg = SampleAggregator::new(geom());
        agg.start();
        agg.aggregate(&RawGazeSample::new(
            1_000_000,
            EyeSample::at(0.5, 0.5),
            EyeSample::at(0.5, 0.5),
        ));
        agg.start();
        let s = agg.aggregate(&RawGazeSample::new(
            9_000_000,
            EyeSample::at(0.5, 0.5),
            EyeSample::at(0.5, 0.5),
        ));
        assert_eq!(s.t_ms, 0.0);
    }
}

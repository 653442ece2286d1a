//! Online fixation detection with spatial hysteresis and a dwell-time gate.
//!
//! Raw gaze is sub-pixel noisy (typically 1-3 px RMS), so position equality
//! can never trigger; instead a candidate anchor is held as long as gaze
//! stays within a pixel radius, and becomes a fixation once it has dwelt
//! there long enough. Squared distances keep the per-sample path free of
//! square roots.

use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError};
use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationReport;
use crate::error::{GazeTrackerError, Result};
use crate::types::{FixationEvent, GazeSample};

/// Detection thresholds, normally derived from a calibration report.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FixationThresholds {
    /// Maximal drift from the anchor before the fixation is over, pixels.
    pub radius_px: f64,
    /// Dwell time required before a candidate becomes a fixation, ms.
    pub dwell_time_ms: f64,
    /// End a confirmed fixation after this long without a valid sample.
    /// None skips invalid samples without ending the fixation.
    pub invalid_grace_ms: Option<f64>,
}

impl From<&CalibrationReport> for FixationThresholds {
    fn from(report: &CalibrationReport) -> Self {
        Self {
            radius_px: report.fixation_threshold_px,
            dwell_time_ms: report.dwell_time_ms,
            invalid_grace_ms: None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum State {
    /// No anchor yet; waiting for a valid sample.
    Searching,
    /// Anchored, accumulating dwell time.
    Candidate { anchor: (f64, f64), start_ms: f64 },
    /// Dwell time met; anchor and start are fixed until drift ends it.
    Fixating {
        anchor: (f64, f64),
        start_ms: f64,
        last_valid_ms: f64,
    },
}

/// Hysteresis state machine over the aggregated sample stream.
/// One logical consumer owns the detector; the anchor and dwell clock are
/// not shareable.
pub struct FixationDetector {
    thresholds: FixationThresholds,
    state: State,
}

impl FixationDetector {
    pub fn new(thresholds: FixationThresholds) -> Self {
        Self {
            thresholds,
            state: State::Searching,
        }
    }

    pub fn thresholds(&self) -> &FixationThresholds {
        &self.thresholds
    }

    /// Start time of the confirmed fixation in progress, if any.
    pub fn current_fixation_start(&self) -> Option<f64> {
        match self.state {
            State::Fixating { start_ms, .. } => Some(start_ms),
            _ => None,
        }
    }

    /// Drop the current anchor and start over.
    pub fn reset(&mut self) {
        self.state = State::Searching;
    }

    /// Feed one sample; returns a completed fixation when drift (or the
    /// optional invalid-grace policy) ends one.
    pub fn process(&mut self, sample: &GazeSample) -> Option<FixationEvent> {
        if !sample.is_valid() {
            return self.process_invalid(sample.t_ms);
        }

        let position = sample.position();
        match self.state {
            State::Searching => {
                self.state = State::Candidate {
                    anchor: position,
                    start_ms: sample.t_ms,
                };
                None
            }
            State::Candidate { anchor, start_ms } => {
                if self.drifted(anchor, position) {
                    // Not yet a fixation, so drift just re-anchors
                    self.state = State::Candidate {
                        anchor: position,
                        start_ms: sample.t_ms,
                    };
                } else if sample.t_ms - start_ms >= self.thresholds.dwell_time_ms {
                    self.state = State::Fixating {
                        anchor,
                        start_ms,
                        last_valid_ms: sample.t_ms,
                    };
                }
                None
            }
            State::Fixating {
                anchor, start_ms, ..
            } => {
                if self.drifted(anchor, position) {
                    self.state = State::Searching;
                    Some(FixationEvent {
                        start_ms,
                        end_ms: sample.t_ms,
                        anchor_x: anchor.0,
                        anchor_y: anchor.1,
                    })
                } else {
                    self.state = State::Fixating {
                        anchor,
                        start_ms,
                        last_valid_ms: sample.t_ms,
                    };
                    None
                }
            }
        }
    }

    /// Invalid samples are transparent: they neither re-anchor nor extend a
    /// fixation. With a grace period configured, a confirmed fixation ends
    /// once no valid sample has arrived for that long, timed at the last
    /// valid sample.
    fn process_invalid(&mut self, t_ms: f64) -> Option<FixationEvent> {
        if let (
            State::Fixating {
                anchor,
                start_ms,
                last_valid_ms,
            },
            Some(grace_ms),
        ) = (self.state, self.thresholds.invalid_grace_ms)
        {
            if t_ms - last_valid_ms >= grace_ms {
                self.state = State::Searching;
                return Some(FixationEvent {
                    start_ms,
                    end_ms: last_valid_ms,
                    anchor_x: anchor.0,
                    anchor_y: anchor.1,
                });
            }
        }
        None
    }

    fn drifted(&self, anchor: (f64, f64), position: (f64, f64)) -> bool {
        let dx = position.0 - anchor.0;
        let dy = position.1 - anchor.1;
        dx * dx + dy * dy > self.thresholds.radius_px * self.thresholds.radius_px
    }
}

/// Blocking pull-side of fixation detection: drains aggregated samples from
/// a channel and returns completed fixations. Replaces the busy-wait loops
/// of callback-buffer designs with a suspending channel read.
pub struct FixationStream {
    receiver: Receiver<GazeSample>,
    detector: FixationDetector,
}

impl FixationStream {
    pub fn new(receiver: Receiver<GazeSample>, thresholds: FixationThresholds) -> Self {
        Self {
            receiver,
            detector: FixationDetector::new(thresholds),
        }
    }

    pub fn detector(&self) -> &FixationDetector {
        &self.detector
    }

    /// Block until the next fixation completes. Returns `StreamClosed` when
    /// the producer side has been dropped (recording stopped).
    pub fn next(&mut self) -> Result<FixationEvent> {
        loop {
            let sample = self
                .receiver
                .recv()
                .map_err(|_| GazeTrackerError::StreamClosed)?;
            if let Some(event) = self.detector.process(&sample) {
                return Ok(event);
            }
        }
    }

    /// Like `next`, but gives up after `timeout` without a sample. The
    /// deadline applies between samples, not across the whole fixation.
    pub fn next_timeout(&mut self, timeout: Duration) -> Result<FixationEvent> {
        loop {
            let sample = match self.receiver.recv_timeout(timeout) {
                Ok(sample) => sample,
                Err(RecvTimeoutError::Timeout) => return Err(GazeTrackerError::Timeout),
                Err(RecvTimeoutError::Disconnected) => return Err(GazeTrackerError::StreamClosed),
            };
            if let Some(event) = self.detector.process(&sample) {
                return Ok(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::INVALID;

    fn thresholds() -> FixationThresholds {
        FixationThresholds {
            radius_px: 50.0,
            dwell_time_ms: 100.0,
            invalid_grace_ms: None,
        }
    }

    fn valid(t: f64, x: f64, y: f64) -> GazeSample {
        GazeSample {
            t_ms: t,
            x,
            y,
            pupil: INVALID,
        }
    }

    fn invalid(t: f64) -> GazeSample {
        GazeSample {
            t_ms: t,
            x: INVALID,
            y: INVALID,
            pupil: INVALID,
        }
    }

    #[test]
    fn test_steady_gaze_emits_one_fixation_anchored_at_start() {
        let mut det = FixationDetector::new(thresholds());
        let mut events = Vec::new();

        // 200 ms of samples jittering a few px around (500, 500)
        for i in 0..13 {
            let t = i as f64 * 16.0;
            let s = valid(t, 500.0 + (i % 3) as f64, 500.0 - (i % 2) as f64);
            events.extend(det.process(&s));
        }
        assert!(events.is_empty());
        assert_eq!(det.current_fixation_start(), Some(0.0));

        // A saccade away ends it
        events.extend(det.process(&valid(208.0, 700.0, 500.0)));
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.start_ms, 0.0);
        assert_eq!(event.end_ms, 208.0);
        // Anchor is the first sample's position, not a centroid
        assert_eq!((event.anchor_x, event.anchor_y), (500.0, 500.0));
    }

    #[test]
    fn test_outlier_before_dwell_reanchors_without_event() {
        let mut det = FixationDetector::new(thresholds());
        assert!(det.process(&valid(0.0, 100.0, 100.0)).is_none());
        assert!(det.process(&valid(16.0, 102.0, 100.0)).is_none());
        assert!(det.process(&valid(32.0, 99.0, 101.0)).is_none());
        // Outlier beyond the radius before dwell time is met
        assert!(det.process(&valid(48.0, 300.0, 300.0)).is_none());
        assert!(det.current_fixation_start().is_none());

        // Dwell now counts from the outlier
        assert!(det.process(&valid(60.0, 301.0, 300.0)).is_none());
        assert!(det.process(&valid(150.0, 299.0, 301.0)).is_none());
        assert_eq!(det.current_fixation_start(), Some(48.0));
    }

    #[test]
    fn test_invalid_samples_are_transparent() {
        let mut det = FixationDetector::new(thresholds());
        det.process(&valid(0.0, 100.0, 100.0));
        det.process(&invalid(16.0));
        det.process(&invalid(32.0));
        // Anchor survived the gap; dwell still measured from t=0
        det.process(&valid(120.0, 101.0, 100.0));
        assert_eq!(det.current_fixation_start(), Some(0.0));

        // Invalid samples inside a confirmed fixation do not end it
        det.process(&invalid(140.0));
        let event = det.process(&valid(200.0, 400.0, 100.0)).unwrap();
        assert_eq!(event.start_ms, 0.0);
        assert_eq!(event.end_ms, 200.0);
    }

    #[test]
    fn test_invalid_grace_ends_confirmed_fixation() {
        let mut det = FixationDetector::new(FixationThresholds {
            invalid_grace_ms: Some(100.0),
            ..thresholds()
        });
        det.process(&valid(0.0, 100.0, 100.0));
        det.process(&valid(120.0, 101.0, 100.0));
        assert_eq!(det.current_fixation_start(), Some(0.0));

        assert!(det.process(&invalid(150.0)).is_none());
        let event = det.process(&invalid(230.0)).unwrap();
        // Ends at the last valid sample, not at the invalid one
        assert_eq!(event.end_ms, 120.0);
        assert!(det.current_fixation_start().is_none());
    }

    #[test]
    fn test_exactly_on_radius_is_within() {
        let mut det = FixationDetector::new(thresholds());
        det.process(&valid(0.0, 100.0, 100.0));
        // Distance exactly 50 px: comparison is strict greater-than
        det.process(&valid(120.0, 150.0, 100.0));
        assert_eq!(det.current_fixation_start(), Some(0.0));
    }

    #[test]
    fn test_stream_pulls_until_fixation() {
        let (tx, rx) = crossbeam::channel::unbounded();
        let mut stream = FixationStream::new(rx, thresholds());

        for i in 0..10 {
            tx.send(valid(i as f64 * 20.0, 500.0, 500.0)).unwrap();
        }
        tx.send(valid(220.0, 800.0, 500.0)).unwrap();

        let event = stream.next().unwrap();
        assert_eq!(event.start_ms, 0.0);
        assert_eq!(event.end_ms, 220.0);
    }

    #[test]
    fn test_stream_reports_closed_and_timeout() {
        let (tx, rx) = crossbeam::channel::unbounded::<GazeSample>();
        let mut stream = FixationStream::new(rx, thresholds());

        assert_eq!(
            stream.next_timeout(Duration::from_millis(10)),
            Err(GazeTrackerError::Timeout)
        );

        drop(tx);
        assert_eq!(stream.next(), Err(GazeTrackerError::StreamClosed));
    }
}

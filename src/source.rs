//! Gaze sample sources. The hardware driver is an external collaborator; the
//! core only needs a subscribable callback interface. A deterministic
//! synthetic source stands in for the device in the demo binary and tests.

use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::{GazeTrackerError, Result};
use crate::types::{EyeSample, RawGazeSample};

/// Receives every raw sample at device cadence. Must be cheap: enqueue only.
pub type GazeCallback = Box<dyn FnMut(RawGazeSample) + Send>;

/// Subscription interface of an eye tracker.
///
/// After `unsubscribe` returns, no further callback invocations may occur;
/// samples already in flight are delivered before it returns.
pub trait GazeSource {
    fn subscribe(&mut self, callback: GazeCallback) -> Result<()>;
    fn unsubscribe(&mut self) -> Result<()>;
}

/// Deterministic fake tracker: a worker thread pushes counter-driven samples
/// at a fixed rate. The gaze script dwells on a cycle of screen points with
/// small sinusoidal jitter, separated by short invalid stretches, which is
/// enough to exercise calibration metrics and fixation detection end to end.
pub struct SyntheticGazeSource {
    rate_hz: u32,
    stop: Arc<AtomicBool>,
    /// When set, the script dwells on this normalized point instead of
    /// free-viewing; stands in for a subject following an on-screen dot.
    look_target: Arc<Mutex<Option<(f64, f64)>>>,
    worker: Option<JoinHandle<()>>,
}

/// Stand-in for driver enumeration; the demo binary takes the first entry
/// the way a real deployment takes the first tracker on the bus.
pub fn find_all_trackers(rate_hz: u32) -> Vec<SyntheticGazeSource> {
    vec![SyntheticGazeSource::new(rate_hz)]
}

impl SyntheticGazeSource {
    pub fn new(rate_hz: u32) -> Self {
        Self {
            rate_hz: rate_hz.max(1),
            stop: Arc::new(AtomicBool::new(false)),
            look_target: Arc::new(Mutex::new(None)),
            worker: None,
        }
    }

    /// Pin the scripted gaze to one screen point, as a subject would while a
    /// calibration dot is shown.
    pub fn look_at(&self, x: f64, y: f64) {
        *self.look_target.lock().expect("look target poisoned") = Some((x, y));
    }

    /// Return to the free-viewing dwell cycle.
    pub fn free_view(&self) {
        *self.look_target.lock().expect("look target poisoned") = None;
    }

    /// The scripted sample for tick `n` at the given rate. Public so tests
    /// and offline passes can generate the same stream without threads.
    pub fn sample_at(n: u64, rate_hz: u32) -> RawGazeSample {
        let period_us = 1_000_000u64 / rate_hz as u64;
        let timestamp_us = n * period_us;
        let t_ms = timestamp_us as f64 / 1000.0;

        // Dwell ~700 ms per point, with a 60 ms invalid gap between dwells
        // standing in for saccades and blinks.
        const DWELL_MS: f64 = 700.0;
        const GAP_MS: f64 = 60.0;
        let cycle = DWELL_MS + GAP_MS;
        let phase = t_ms % cycle;
        let dwell_index = (t_ms / cycle) as usize;

        if phase >= DWELL_MS {
            return RawGazeSample::new(timestamp_us, EyeSample::invalid(), EyeSample::invalid());
        }

        let points = [(0.2, 0.3), (0.7, 0.25), (0.5, 0.6), (0.3, 0.75), (0.8, 0.7)];
        let (cx, cy) = points[dwell_index % points.len()];
        Self::jittered_sample(n, timestamp_us, t_ms, (cx, cy))
    }

    /// Scripted sample for tick `n` while fixating a pinned point.
    pub fn sample_looking_at(n: u64, rate_hz: u32, point: (f64, f64)) -> RawGazeSample {
        let period_us = 1_000_000u64 / rate_hz as u64;
        let timestamp_us = n * period_us;
        let t_ms = timestamp_us as f64 / 1000.0;
        // Short blink-like dropout once a second even while pinned
        if t_ms % 1000.0 >= 950.0 {
            return RawGazeSample::new(timestamp_us, EyeSample::invalid(), EyeSample::invalid());
        }
        Self::jittered_sample(n, timestamp_us, t_ms, point)
    }

    fn jittered_sample(n: u64, timestamp_us: u64, t_ms: f64, center: (f64, f64)) -> RawGazeSample {
        // A few pixels of jitter on a normalized scale, decorrelated per eye
        let wobble = n as f64 * 2.0 * PI / 13.0;
        let jitter_x = wobble.sin() * 0.0015;
        let jitter_y = (wobble * 0.7).cos() * 0.0015;
        let pupil = 3.2 + (t_ms / 900.0 * PI).sin() * 0.2;

        let left = EyeSample::at(center.0 + jitter_x, center.1 + jitter_y).with_pupil(pupil);
        let right = EyeSample::at(center.0 - jitter_x, center.1 + jitter_y).with_pupil(pupil + 0.1);
        RawGazeSample::new(timestamp_us, left, right)
    }
}

impl GazeSource for SyntheticGazeSource {
    fn subscribe(&mut self, mut callback: GazeCallback) -> Result<()> {
        if self.worker.is_some() {
            return Err(GazeTrackerError::AlreadyRecording);
        }
        self.stop.store(false, Ordering::SeqCst);

        let stop = self.stop.clone();
        let look_target = self.look_target.clone();
        let rate_hz = self.rate_hz;
        let period = Duration::from_micros(1_000_000 / rate_hz as u64);
        self.worker = Some(std::thread::spawn(move || {
            let mut n = 0u64;
            while !stop.load(Ordering::SeqCst) {
                let pinned = *look_target.lock().expect("look target poisoned");
                let raw = match pinned {
                    Some(point) => Self::sample_looking_at(n, rate_hz, point),
                    None => Self::sample_at(n, rate_hz),
                };
                callback(raw);
                n += 1;
                std::thread::sleep(period);
            }
            log::debug!("synthetic source stopped after {} samples", n);
        }));
        Ok(())
    }

    fn unsubscribe(&mut self) -> Result<()> {
        let worker = self.worker.take().ok_or(GazeTrackerError::NotRecording)?;
        self.stop.store(true, Ordering::SeqCst);
        // Joining drains the in-flight sample before the callback is dropped
        if worker.join().is_err() {
            log::warn!("synthetic source worker panicked during shutdown");
        }
        Ok(())
    }
}

impl Drop for SyntheticGazeSource {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.unsubscribe();
        }
    }
}

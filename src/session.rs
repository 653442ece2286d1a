//! Recording session: owns the subscription lifecycle and the buffers of one
//! tracking run. Sessions are explicit values, not globals, so independent
//! runs (and tests) never share gaze state.
//!
//! The tracker pushes at its own cadence; downstream consumers pull. The
//! subscription callback does nothing but record the raw sample and enqueue
//! the aggregated one on an unbounded SPSC channel, where the single consumer
//! blocks (or times out) as it pleases.

use std::sync::{Arc, Mutex};

use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::aggregator::SampleAggregator;
use crate::error::{GazeTrackerError, Result};
use crate::source::GazeSource;
use crate::types::{DisplayGeometry, GazeSample, RawGazeSample};

/// Session recording states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created or stopped; buffers are closed and readable.
    Idle,
    /// Subscribed; samples are flowing.
    Recording,
}

pub struct RecordingSession {
    geometry: DisplayGeometry,
    state: SessionState,
    raw_buffer: Arc<Mutex<Vec<RawGazeSample>>>,
}

impl RecordingSession {
    pub fn new(geometry: DisplayGeometry) -> Result<Self> {
        geometry.validate()?;
        Ok(Self {
            geometry,
            state: SessionState::Idle,
            raw_buffer: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == SessionState::Recording
    }

    /// Subscribe to the source and begin a fresh recording. Returns the
    /// consumer end of the aggregated sample stream; the channel closes when
    /// the recording stops. Elapsed-time zero is the first sample delivered
    /// after this call.
    pub fn start(&mut self, source: &mut dyn GazeSource) -> Result<Receiver<GazeSample>> {
        if self.state == SessionState::Recording {
            return Err(GazeTrackerError::AlreadyRecording);
        }

        self.raw_buffer.lock().expect("raw buffer poisoned").clear();

        let (tx, rx): (Sender<GazeSample>, Receiver<GazeSample>) = unbounded();
        let mut aggregator = SampleAggregator::new(self.geometry);
        aggregator.start();
        let raw_buffer = self.raw_buffer.clone();

        source.subscribe(Box::new(move |raw| {
            let aggregated = aggregator.aggregate(&raw);
            raw_buffer.lock().expect("raw buffer poisoned").push(raw);
            // Consumer gone is not the producer's problem; drop the sample
            let _ = tx.send(aggregated);
        }))?;

        self.state = SessionState::Recording;
        Ok(rx)
    }

    /// Unsubscribe and close the stream. In-flight callbacks drain before the
    /// source returns, after which the channel disconnects and the raw buffer
    /// is a closed, consistent set.
    pub fn stop(&mut self, source: &mut dyn GazeSource) -> Result<()> {
        if self.state != SessionState::Recording {
            return Err(GazeTrackerError::NotRecording);
        }
        source.unsubscribe()?;
        self.state = SessionState::Idle;
        log::info!(
            "recording stopped with {} raw samples",
            self.raw_buffer.lock().expect("raw buffer poisoned").len()
        );
        Ok(())
    }

    /// The raw device stream of the last recording, for cadence metrics.
    /// Only available once recording has stopped.
    pub fn raw_samples(&self) -> Result<Vec<RawGazeSample>> {
        if self.state == SessionState::Recording {
            return Err(GazeTrackerError::AlreadyRecording);
        }
        Ok(self.raw_buffer.lock().expect("raw buffer poisoned").clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::GazeCallback;
    use crate::types::EyeSample;

    /// Delivers a fixed script synchronously on subscribe. Good enough for
    /// deterministic session tests without threads.
    struct ScriptedSource {
        script: Vec<RawGazeSample>,
        subscribed: bool,
    }

    impl ScriptedSource {
        fn new(script: Vec<RawGazeSample>) -> Self {
            Self {
                script,
                subscribed: false,
            }
        }
    }

    impl GazeSource for ScriptedSource {
        fn subscribe(&mut self, mut callback: GazeCallback) -> crate::error::Result<()> {
            self.subscribed = true;
            for raw in self.script.clone() {
                callback(raw);
            }
            Ok(())
        }

        fn unsubscribe(&mut self) -> crate::error::Result<()> {
            if !self.subscribed {
                return Err(GazeTrackerError::NotRecording);
            }
            self.subscribed = false;
            Ok(())
        }
    }

    fn geom() -> DisplayGeometry {
        DisplayGeometry::new(1000.0, 1000.0, 50.0, 50.0, 60.0).unwrap()
    }

    fn script() -> Vec<RawGazeSample> {
        (0..5)
            .map(|i| {
                RawGazeSample::new(
                    1_000_000 + i * 10_000,
                    EyeSample::at(0.5, 0.5),
                    EyeSample::at(0.5, 0.5),
                )
            })
            .collect()
    }

    #[test]
    fn test_session_streams_aggregated_samples() {
        let mut source = ScriptedSource::new(script());
        let mut session = RecordingSession::new(geom()).unwrap();

        let rx = session.start(&mut source).unwrap();
        session.stop(&mut source).unwrap();

        let samples: Vec<_> = rx.try_iter().collect();
        assert_eq!(samples.len(), 5);
        assert_eq!(samples[0].t_ms, 0.0);
        assert_eq!(samples[4].t_ms, 40.0);
        assert_eq!(samples[0].position(), (500.0, 500.0));

        // Channel is disconnected once the session stopped
        assert!(rx.recv().is_err());
    }

    #[test]
    fn test_raw_buffer_closed_after_stop() {
        let mut source = ScriptedSource::new(script());
        let mut session = RecordingSession::new(geom()).unwrap();

        let _rx = session.start(&mut source).unwrap();
        assert!(session.raw_samples().is_err());

        session.stop(&mut source).unwrap();
        let raw = session.raw_samples().unwrap();
        assert_eq!(raw.len(), 5);
        assert_eq!(raw[0].device_timestamp_us, 1_000_000);
    }

    #[test]
    fn test_state_transitions() {
        let mut source = ScriptedSource::new(Vec::new());
        let mut session = RecordingSession::new(geom()).unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.stop(&mut source).is_err());

        let _rx = session.start(&mut source).unwrap();
        assert!(session.is_recording());
        assert!(session.start(&mut source).is_err());

        session.stop(&mut source).unwrap();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_restart_resets_buffers_and_time_base() {
        let mut source = ScriptedSource::new(script());
        let mut session = RecordingSession::new(geom()).unwrap();
        let _rx = session.start(&mut source).unwrap();
        session.stop(&mut source).unwrap();

        // Second run starts later on the device clock; t rebases to zero
        let later: Vec<_> = (0..3)
            .map(|i| {
                RawGazeSample::new(
                    9_000_000 + i * 10_000,
                    EyeSample::at(0.2, 0.2),
                    EyeSample::at(0.2, 0.2),
                )
            })
            .collect();
        let mut source = ScriptedSource::new(later);
        let rx = session.start(&mut source).unwrap();
        session.stop(&mut source).unwrap();

        let samples: Vec<_> = rx.try_iter().collect();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].t_ms, 0.0);
        assert_eq!(session.raw_samples().unwrap().len(), 3);
    }
}

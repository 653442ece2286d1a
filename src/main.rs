use anyhow::{anyhow, Result};
use chrono::Utc;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use gaze_tracker_rs::{
    find_all_trackers, CalibrationEngine, CalibrationParams, CalibrationReport, CalibrationTarget,
    DisplayGeometry, FixationEvent, FixationStream, FixationThresholds, GazeSample,
    GazeTrackerError, RawGazeSample, RecordingSession, SyntheticGazeSource, ValidationTarget,
};

#[derive(Parser, Debug)]
#[command(name = "gaze_tracker")]
#[command(about = "Gaze tracker demo - calibration validation and online fixation detection", long_about = None)]
struct Args {
    /// Fixation-detection duration in seconds
    #[arg(value_name = "SECONDS", default_value = "10")]
    duration: u64,

    /// Tracker sample rate in Hz
    #[arg(long, default_value = "120")]
    rate: u32,

    /// Display width in pixels
    #[arg(long, default_value = "1920")]
    pixel_width: f64,

    /// Display height in pixels
    #[arg(long, default_value = "1080")]
    pixel_height: f64,

    /// Physical display width in cm
    #[arg(long, default_value = "53.0")]
    screen_width_cm: f64,

    /// Physical display height in cm
    #[arg(long, default_value = "30.0")]
    screen_height_cm: f64,

    /// Viewing distance in cm
    #[arg(long, default_value = "65.0")]
    distance_cm: f64,

    /// End a confirmed fixation after this many ms without a valid sample
    #[arg(long)]
    invalid_grace_ms: Option<f64>,

    /// Output directory
    #[arg(long, default_value = "gaze_tracker_sessions")]
    output_dir: String,
}

#[derive(Serialize, Deserialize)]
struct SessionOutput {
    report: CalibrationReport,
    fixations: Vec<FixationEvent>,
    stats: Stats,
}

#[derive(Serialize, Deserialize)]
struct Stats {
    raw_samples: usize,
    fixations: usize,
    mean_fixation_ms: f64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    println!("[{}] Gaze Tracker RS Starting", ts_now());
    println!("  Duration: {} seconds", args.duration);
    println!("  Sample Rate: {} Hz", args.rate);
    println!(
        "  Display: {}x{} px, {}x{} cm at {} cm",
        args.pixel_width,
        args.pixel_height,
        args.screen_width_cm,
        args.screen_height_cm,
        args.distance_cm
    );
    println!("  Output Dir: {}", args.output_dir);

    std::fs::create_dir_all(&args.output_dir)?;

    let geometry = DisplayGeometry::new(
        args.pixel_width,
        args.pixel_height,
        args.screen_width_cm,
        args.screen_height_cm,
        args.distance_cm,
    )?;

    let mut source = find_all_trackers(args.rate)
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!(GazeTrackerError::DeviceNotFound))?;

    let engine = CalibrationEngine::new(geometry, CalibrationParams::default())?;
    let mut session = RecordingSession::new(geometry)?;

    // Validation pass: one short recording per target while the scripted
    // gaze follows the dot
    println!("[{}] Running validation pass...", ts_now());
    let mut validation: Vec<ValidationTarget> = Vec::new();
    for target in CalibrationTarget::standard_five() {
        source.look_at(target.x, target.y);
        let raw = record_for(&mut session, &mut source, Duration::from_millis(700))?;
        println!(
            "[{}]   target ({:.1}, {:.1}): {} samples",
            ts_now(),
            target.x,
            target.y,
            raw.len()
        );
        validation.push(ValidationTarget {
            target,
            samples: raw,
        });
    }

    // Noise phase: one second on a static center dot
    println!("[{}] Running noise calibration...", ts_now());
    source.look_at(0.5, 0.5);
    let rx = session.start(&mut source)?;
    std::thread::sleep(Duration::from_secs(1));
    session.stop(&mut source)?;
    let noise_samples: Vec<GazeSample> = rx.try_iter().collect();
    let noise_raw = session.raw_samples()?;

    let report = engine.build_report(&validation, &noise_raw, &noise_samples)?;
    print!("{}", report.render_text());

    let report_path = format!("{}/calibration_{}.json", args.output_dir, ts_now_clean());
    report.save(&report_path)?;
    let config_path = format!("{}/calibration_config_{}.json", args.output_dir, ts_now_clean());
    std::fs::write(&config_path, serde_json::to_string_pretty(&report.to_config())?)?;
    println!("[{}] Saved calibration to {}", ts_now(), report_path);

    // Online fixation detection over free-viewing gaze
    println!(
        "[{}] Detecting fixations for {} seconds...",
        ts_now(),
        args.duration
    );
    source.free_view();
    let thresholds = FixationThresholds {
        invalid_grace_ms: args.invalid_grace_ms,
        ..FixationThresholds::from(&report)
    };
    let rx = session.start(&mut source)?;
    let mut stream = FixationStream::new(rx, thresholds);

    let started = Instant::now();
    let mut fixations: Vec<FixationEvent> = Vec::new();
    while started.elapsed() < Duration::from_secs(args.duration) {
        match stream.next_timeout(Duration::from_millis(250)) {
            Ok(event) => {
                println!(
                    "[{}] fixation at ({:.0}, {:.0}) for {:.0} ms",
                    ts_now(),
                    event.anchor_x,
                    event.anchor_y,
                    event.duration_ms()
                );
                fixations.push(event);
            }
            Err(GazeTrackerError::Timeout) => continue,
            Err(GazeTrackerError::StreamClosed) => break,
            Err(err) => return Err(err.into()),
        }
    }
    session.stop(&mut source)?;

    // Drain fixations completed by the samples still in the channel
    while let Ok(event) = stream.next() {
        fixations.push(event);
    }

    let raw_count = session.raw_samples()?.len();
    let mean_fixation_ms = if fixations.is_empty() {
        0.0
    } else {
        fixations.iter().map(FixationEvent::duration_ms).sum::<f64>() / fixations.len() as f64
    };

    let output = SessionOutput {
        report,
        stats: Stats {
            raw_samples: raw_count,
            fixations: fixations.len(),
            mean_fixation_ms,
        },
        fixations,
    };
    let filename = format!("{}/session_{}.json", args.output_dir, ts_now_clean());
    std::fs::write(&filename, serde_json::to_string_pretty(&output)?)?;

    println!("\n=== Final Stats ===");
    println!("Raw samples (last run): {}", output.stats.raw_samples);
    println!("Fixations: {}", output.stats.fixations);
    println!("Mean fixation: {:.0} ms", output.stats.mean_fixation_ms);
    println!("[{}] Session saved to {}", ts_now(), filename);

    Ok(())
}

fn record_for(
    session: &mut RecordingSession,
    source: &mut SyntheticGazeSource,
    duration: Duration,
) -> Result<Vec<RawGazeSample>> {
    let rx = session.start(source)?;
    std::thread::sleep(duration);
    session.stop(source)?;
    drop(rx);
    Ok(session.raw_samples()?)
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

fn ts_now_clean() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

//! Headless console driver for the camera pipeline.

use anyhow::{Context, Result};
use camera_pipeline::cli::Args;
use camera_pipeline::config::Config;
use camera_pipeline::opencv_backend::{CvImage, OpencvCapture, OpencvVision};
use camera_pipeline::pipeline::{Pipeline, PipelineEvent};
use clap::Parser;
use log::{debug, info, warn};
use std::io::BufRead;
use std::sync::Arc;
use std::thread;

const HELP: &str = "commands: start | stop | find | intrinsic | extrinsic | save <path> | open <path> | status | quit";

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::init_from_env(env_logger::Env::new().default_filter_or(args.log_filter()));

    info!("Camera pipeline");

    let mut config = if let Some(config_path) = &args.config {
        info!("Loading configuration from: {config_path}");
        match Config::from_file(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("Failed to load config file: {e}. Using defaults.");
                Config::default()
            }
        }
    } else {
        Config::default()
    };
    args.apply_to(&mut config);
    config.validate()?;

    let vision = Arc::new(
        OpencvVision::new(&config.detector, config.tracking.processing_scale)
            .context("Failed to initialise vision backend")?,
    );
    let mut pipeline = Pipeline::new(vision, Arc::new(OpencvCapture), config)?;

    let events = pipeline.events();
    thread::Builder::new()
        .name("event-log".to_string())
        .spawn(move || {
            for event in events {
                log_event(&event);
            }
        })?;

    println!("{HELP}");
    for line in std::io::stdin().lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            continue;
        };
        let argument = parts.next();

        let outcome = match (command, argument) {
            ("start", _) => pipeline.start(),
            ("stop", _) => {
                pipeline.stop();
                Ok(())
            }
            ("find", _) => pipeline.find_patterns(),
            ("intrinsic", _) => pipeline.calibrate_intrinsic(),
            ("extrinsic", _) => pipeline.calibrate_extrinsic(),
            ("save", Some(path)) => pipeline.save_calibration(path),
            ("open", Some(path)) => pipeline.open_calibration(path),
            ("status", _) => {
                println!("{:#?}", pipeline.status());
                Ok(())
            }
            ("quit" | "exit", _) => break,
            _ => {
                println!("{HELP}");
                Ok(())
            }
        };

        if let Err(e) = outcome {
            warn!("{command} failed: {e}");
        }
    }

    pipeline.stop();
    Ok(())
}

fn log_event(event: &PipelineEvent<CvImage>) {
    match event {
        PipelineEvent::Started => info!("Pipeline running"),
        PipelineEvent::Stopped => info!("Pipeline stopped"),
        PipelineEvent::Tracks(report) => {
            if let Some(primary) = report.primary() {
                debug!(
                    "Frame {}: {} tracks, primary {} at {:?}",
                    report.sequence,
                    report.tracks.len(),
                    primary.id,
                    primary.bbox
                );
            }
            for id in &report.retired {
                info!("Track {id} retired");
            }
        }
        PipelineEvent::PatternSampled {
            sequence,
            outcome,
            quality,
            count,
            target,
            elapsed,
        } => info!(
            "Frame {sequence}: pattern quality {quality}%, {outcome:?}, {count}/{target} samples ({:.0} ms)",
            elapsed.as_secs_f64() * 1000.0
        ),
        PipelineEvent::PatternsComplete { count } => info!("Collected {count} samples"),
        PipelineEvent::CalibrationUpdated(calibration) => info!(
            "Calibration updated: error {:.4}, extrinsics {}",
            calibration.reprojection_error(),
            calibration.has_extrinsics()
        ),
        PipelineEvent::Undistorted(frame) => debug!("Undistorted frame {}", frame.sequence),
        PipelineEvent::Notice(message) => println!("{message}"),
    }
}

use std::path::PathBuf;

use anyhow::{Context, Result};
use cli::parse_args;
use conf::{APP_NAME, load_config};
use log::logger::AdvancedLogger;
use log::{LogLevel, critical, info};

use crate::app::MotionApp;
use crate::capture::{CaptureCycle, FrameSource};
use crate::controls::{CommandSource, NoInput, WindowKeys};
use crate::cv::{CaptureSource, Window};
use crate::error::VisionError;
use crate::export::HeadingLog;
use crate::recorder::{Codec, VideoFileSinks};
use crate::tracking::{Capabilities, MotionTracker};

mod app;
mod capture;
mod cli;
mod conf;
mod controls;
mod cv;
mod error;
mod export;
mod recorder;
#[cfg(test)]
mod testing;
mod tracking;

fn main() -> Result<()> {
    let args = parse_args();
    let mut cfg = load_config(args.config.as_deref())?;
    args.apply(&mut cfg);
    cfg.validate()?;

    let level = if args.debug {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    AdvancedLogger::init(level, APP_NAME).context("Failed to initialize logger")?;

    let source: Box<dyn FrameSource> = match &args.video {
        Some(file) => Box::new(CaptureSource::file(file)?),
        None => Box::new(CaptureSource::camera(args.camera)?),
    };

    let codec = Codec::parse(&cfg.recording.codec)?;
    let mut capture = CaptureCycle::new(source, Box::new(VideoFileSinks), codec, cfg.recording.fps);
    let mut input: Box<dyn CommandSource> = if args.headless {
        Box::new(NoInput)
    } else {
        let window = Window::create(&cfg.display.window_name);
        capture = capture.with_display(Box::new(window), cfg.display.mirror);
        Box::new(WindowKeys)
    };

    let mut tracker = MotionTracker::new(&cfg, Capabilities::opencv(&cfg)?);
    if args.track {
        tracker.start();
    }

    let recording_path = args
        .record
        .clone()
        .unwrap_or_else(|| PathBuf::from("recording.avi"));
    let mut app = MotionApp::new(capture, tracker, recording_path);
    if let Some(path) = &args.export {
        app = app.with_export(HeadingLog::create(path)?);
    }
    if args.record.is_some() {
        app.dispatch(controls::Command::StartRecording)?;
    }

    match app.run(input.as_mut()) {
        Ok(()) => info!("Done"),
        Err(VisionError::DeviceUnavailable(reason)) => {
            critical!("Capture ended: {}", reason);
            eprintln!("Capture ended: {reason}");
        }
        Err(e) if e.is_caller_discipline() => {
            critical!("Frame cycle misuse: {}", e);
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

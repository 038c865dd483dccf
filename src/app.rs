use std::fs::File;
use std::ops::ControlFlow;
use std::path::PathBuf;

use log::{debug, error, info, warning};

use crate::capture::{CaptureCycle, FrameSource};
use crate::controls::{Command, CommandSource};
use crate::error::Result;
use crate::export::HeadingLog;
use crate::tracking::{MotionTracker, Outcome, TrackingState};

/// The capture loop: one frame per iteration, then the latest command.
pub struct MotionApp<S: FrameSource> {
    capture: CaptureCycle<S>,
    tracker: MotionTracker,
    recording_path: PathBuf,
    export: Option<HeadingLog<File>>,
}

impl<S: FrameSource> MotionApp<S> {
    pub fn new(capture: CaptureCycle<S>, tracker: MotionTracker, recording_path: PathBuf) -> Self {
        Self {
            capture,
            tracker,
            recording_path,
            export: None,
        }
    }

    pub fn with_export(mut self, export: HeadingLog<File>) -> Self {
        self.export = Some(export);
        self
    }

    pub fn capture(&self) -> &CaptureCycle<S> {
        &self.capture
    }

    pub fn tracker(&self) -> &MotionTracker {
        &self.tracker
    }

    pub fn dispatch(&mut self, command: Command) -> Result<ControlFlow<()>> {
        debug!("Dispatching {:?}", command);
        match command {
            Command::StartTracking => self.tracker.start(),
            Command::StopTracking => self.tracker.stop(),
            Command::StartRecording => {
                let path = self.recording_path.clone();
                match self.capture.start_recording(&path) {
                    Ok(()) => {}
                    Err(e) if e.is_caller_discipline() => return Err(e),
                    Err(e) => error!("Could not start recording {}: {}", path.display(), e),
                }
            }
            Command::StopRecording => self.capture.stop_recording(),
            Command::Quit => return Ok(ControlFlow::Break(())),
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Acquires, processes, renders and releases one frame.
    pub fn cycle(&mut self) -> Result<Outcome> {
        debug_assert!(!self.capture.is_entered());
        let frame = self.capture.enter_frame()?;
        let seq = frame.seq();
        let outcome = self.tracker.process(frame);

        if let Ok(Outcome::Tracked {
            heading: Some(estimate),
            ..
        }) = &outcome
        {
            if let Some(export) = self.export.as_mut() {
                if let Err(e) = export.append(seq, estimate) {
                    warning!("Failed to export heading for frame #{}: {}", seq, e);
                }
            }
        }

        if let Some(frame) = self.capture.frame_mut() {
            if let Err(e) = self.tracker.render(frame.image_mut()) {
                warning!("Failed to render overlay on frame #{}: {}", seq, e);
            }
        }

        self.capture.exit_frame()?;
        outcome
    }

    /// Runs until a quit command, or until the source fails.
    ///
    /// A source that stops producing frames surfaces as `DeviceUnavailable`.
    pub fn run(&mut self, input: &mut dyn CommandSource) -> Result<()> {
        info!("Starting capture loop");
        let result = self.run_loop(input);
        self.capture.stop_recording();
        if let Some(export) = self.export.take() {
            let rows = export.rows();
            if let Err(e) = export.into_inner() {
                warning!("{}", e);
            }
            info!("Exported {} headings", rows);
        }
        let metrics = self.capture.metrics();
        info!(
            "Capture loop finished after {} frames ({:.1} fps, min {:.1}, max {:.1})",
            metrics.frames_elapsed(),
            metrics.fps_estimate().unwrap_or(0.0),
            metrics.min_fps().unwrap_or(0.0),
            metrics.max_fps().unwrap_or(0.0)
        );
        result
    }

    fn run_loop(&mut self, input: &mut dyn CommandSource) -> Result<()> {
        loop {
            self.cycle()?;

            let tracking = self.tracker.state() != TrackingState::Idle;
            let recording = self.capture.is_recording();
            if let Some(command) = input.poll(tracking, recording) {
                if self.dispatch(command)?.is_break() {
                    return Ok(());
                }
            }
        }
    }
}

//! The acquire → process → release cycle around a frame source.
//!
//! `CaptureCycle` holds at most one frame at a time. `exit_frame` is where the
//! side effects of a cycle happen: frame-rate bookkeeping, appending to an open
//! recording and forwarding to the display sink.

use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, info, warning};
use opencv::core::{Mat, Size};
use opencv::prelude::*;

use crate::cv::frame_metrics::FrameMetrics;
use crate::cv::mirror;
use crate::error::{Result, VisionError};
use crate::recorder::{Codec, RecordingSession, VideoSinkFactory};

/// Produces raw frames on demand and owns the capture device.
pub trait FrameSource {
    /// `None` when no frame could be produced.
    fn read(&mut self) -> Result<Option<Mat>>;
    /// Reported frame size; zero when the device cannot tell.
    fn native_width(&self) -> i32;
    fn native_height(&self) -> i32;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read(&mut self) -> Result<Option<Mat>> {
        (**self).read()
    }

    fn native_width(&self) -> i32 {
        (**self).native_width()
    }

    fn native_height(&self) -> i32 {
        (**self).native_height()
    }
}

pub trait DisplaySink {
    fn show(&mut self, frame: &Mat) -> Result<()>;
}

/// A frame tagged with its acquisition sequence number.
#[derive(Debug)]
pub struct Frame {
    seq: u64,
    image: Mat,
}

impl Frame {
    pub fn new(seq: u64, image: Mat) -> Self {
        Self { seq, image }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn image(&self) -> &Mat {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut Mat {
        &mut self.image
    }
}

pub struct CaptureCycle<S: FrameSource> {
    source: S,
    display: Option<Box<dyn DisplaySink>>,
    mirror_preview: bool,
    sinks: Box<dyn VideoSinkFactory>,
    codec: Codec,
    recording_fps: f64,
    recording: Option<RecordingSession>,
    frame: Option<Frame>,
    last_size: Option<Size>,
    next_seq: u64,
    metrics: FrameMetrics,
}

impl<S: FrameSource> CaptureCycle<S> {
    pub fn new(source: S, sinks: Box<dyn VideoSinkFactory>, codec: Codec, recording_fps: f64) -> Self {
        Self {
            source,
            display: None,
            mirror_preview: false,
            sinks,
            codec,
            recording_fps,
            recording: None,
            frame: None,
            last_size: None,
            next_seq: 0,
            metrics: FrameMetrics::new(),
        }
    }

    pub fn with_display(mut self, display: Box<dyn DisplaySink>, mirror_preview: bool) -> Self {
        self.display = Some(display);
        self.mirror_preview = mirror_preview;
        self
    }

    /// Acquires the next frame.
    ///
    /// Fails with `AlreadyEntered` while a frame is still held, and with
    /// `DeviceUnavailable` when the source has nothing to give.
    pub fn enter_frame(&mut self) -> Result<&mut Frame> {
        if self.frame.is_some() {
            return Err(VisionError::AlreadyEntered);
        }
        let image = self
            .source
            .read()?
            .ok_or_else(|| VisionError::DeviceUnavailable("no frame from source".into()))?;
        self.last_size = image.size().ok();
        let seq = self.next_seq;
        self.next_seq += 1;
        debug!("Entered frame #{}", seq);
        Ok(self.frame.insert(Frame::new(seq, image)))
    }

    pub fn frame_mut(&mut self) -> Option<&mut Frame> {
        self.frame.as_mut()
    }

    pub fn is_entered(&self) -> bool {
        self.frame.is_some()
    }

    pub fn exit_frame(&mut self) -> Result<()> {
        self.exit_frame_at(Instant::now())
    }

    /// Finishes the cycle as of `now` and releases the held frame.
    ///
    /// The frame is released even when recording or display fail; those
    /// failures are logged, not returned.
    pub fn exit_frame_at(&mut self, now: Instant) -> Result<()> {
        let frame = self.frame.take().ok_or(VisionError::NotEntered)?;

        self.metrics.update_at(now);

        if let Some(session) = self.recording.as_mut() {
            if let Err(e) = session.write(frame.image()) {
                warning!("Failed to write frame #{} to recording: {}", frame.seq(), e);
            }
        }

        if let Some(display) = self.display.as_mut() {
            let shown = if self.mirror_preview {
                mirror(frame.image()).and_then(|m| display.show(&m))
            } else {
                display.show(frame.image())
            };
            if let Err(e) = shown {
                warning!("Failed to show frame #{}: {}", frame.seq(), e);
            }
        }

        Ok(())
    }

    /// Opens a recording at the source's native size, or at the size of the
    /// last acquired frame when the source reports none.
    ///
    /// The container rate is the configured recording rate, not the measured
    /// capture rate.
    pub fn start_recording(&mut self, filename: impl AsRef<Path>) -> Result<()> {
        if self.recording.is_some() {
            return Err(VisionError::AlreadyRecording);
        }
        let size = self.recording_size()?;
        let filename: PathBuf = filename.as_ref().to_path_buf();
        let session = RecordingSession::open(
            self.sinks.as_mut(),
            filename,
            self.codec,
            self.recording_fps,
            size,
        )?;
        info!(
            "Recording to {} ({}x{} @ {} fps, {})",
            session.filename().display(),
            session.size().width,
            session.size().height,
            session.fps(),
            session.codec().chars().iter().collect::<String>()
        );
        self.recording = Some(session);
        Ok(())
    }

    fn recording_size(&self) -> Result<Size> {
        let native = Size::new(self.source.native_width(), self.source.native_height());
        if native.width > 0 && native.height > 0 {
            return Ok(native);
        }
        match self.last_size {
            Some(size) if size.width > 0 && size.height > 0 => {
                debug!(
                    "Source reports no frame size; recording at {}x{}",
                    size.width, size.height
                );
                Ok(size)
            }
            _ => Err(VisionError::Recording(
                "frame size unknown until a frame has been read".into(),
            )),
        }
    }

    /// Closes the open recording, if any.
    pub fn stop_recording(&mut self) {
        if let Some(session) = self.recording.take() {
            let filename = session.filename().to_path_buf();
            let frames = session.frames_written();
            if let Err(e) = session.close() {
                warning!("Failed to close recording {}: {}", filename.display(), e);
            }
            info!("Stopped recording {} after {} frames", filename.display(), frames);
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    pub fn recording(&self) -> Option<&RecordingSession> {
        self.recording.as_ref()
    }

    pub fn fps_estimate(&self) -> Option<f64> {
        self.metrics.fps_estimate()
    }

    pub fn metrics(&self) -> &FrameMetrics {
        &self.metrics
    }

    pub fn frames_elapsed(&self) -> u64 {
        self.metrics.frames_elapsed()
    }
}

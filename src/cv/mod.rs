pub mod frame_metrics;
pub mod mat_view;
pub mod overlay;

use log::{debug, info, warning};
use opencv::core::{AlgorithmHint, Mat};
use opencv::highgui;
use opencv::imgproc;
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture};

use crate::capture::{DisplaySink, FrameSource};
use crate::error::{Result, VisionError};

/// Frames pulled from a camera or a video file.
pub struct CaptureSource {
    capture: VideoCapture,
}

impl CaptureSource {
    pub fn camera(index: i32) -> Result<Self> {
        info!("Opening camera stream {}", index);
        let capture = VideoCapture::new_def(index).map_err(VisionError::device)?;
        Self::checked(capture)
    }

    pub fn file(file: &str) -> Result<Self> {
        info!("Opening input video file stream {}", file);
        let capture = VideoCapture::from_file_def(file).map_err(VisionError::device)?;
        Self::checked(capture)
    }

    fn checked(capture: VideoCapture) -> Result<Self> {
        if !capture.is_opened().map_err(VisionError::device)? {
            return Err(VisionError::DeviceUnavailable("capture not opened".into()));
        }
        debug!("Capture opened successfully with default settings");
        Ok(Self { capture })
    }

    fn prop(&self, prop: i32) -> i32 {
        match self.capture.get(prop) {
            Ok(value) => value as i32,
            Err(e) => {
                warning!("Could not read capture property {}: {}", prop, e);
                0
            }
        }
    }
}

impl FrameSource for CaptureSource {
    fn read(&mut self) -> Result<Option<Mat>> {
        let mut frame = Mat::default();
        let ok = self.capture.read(&mut frame).map_err(VisionError::device)?;
        if !ok || frame.empty() {
            return Ok(None);
        }
        Ok(Some(frame))
    }

    fn native_width(&self) -> i32 {
        self.prop(videoio::CAP_PROP_FRAME_WIDTH)
    }

    fn native_height(&self) -> i32 {
        self.prop(videoio::CAP_PROP_FRAME_HEIGHT)
    }
}

/// A highgui window; closed when dropped.
pub struct Window {
    name: String,
}

impl Window {
    pub fn create(name: &str) -> Self {
        debug!("Initializing display window '{}'", name);
        let result = highgui::named_window(
            name,
            highgui::WINDOW_KEEPRATIO | highgui::WINDOW_GUI_NORMAL,
        );
        if let Err(e) = result {
            warning!("Could not create named window: {}", e);
        } else {
            debug!("Window '{}' created successfully", name);
        }
        Self { name: name.into() }
    }
}

impl DisplaySink for Window {
    fn show(&mut self, frame: &Mat) -> Result<()> {
        highgui::imshow(&self.name, frame).map_err(VisionError::capability)
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        if let Err(e) = highgui::destroy_window(&self.name) {
            debug!("Failed to destroy window '{}': {}", self.name, e);
        }
    }
}

/// Single-channel intensity copy of a color or grayscale frame.
pub fn to_intensity(frame: &Mat) -> Result<Mat> {
    if frame.empty() {
        return Err(VisionError::CapabilityInput("empty frame".into()));
    }
    let code = match frame.channels() {
        1 => return Ok(frame.clone()),
        3 => imgproc::COLOR_BGR2GRAY,
        4 => imgproc::COLOR_BGRA2GRAY,
        n => {
            return Err(VisionError::CapabilityInput(format!(
                "unsupported channel count {n}"
            )));
        }
    };
    let mut gray = Mat::default();
    imgproc::cvt_color(frame, &mut gray, code, 0, AlgorithmHint::ALGO_HINT_DEFAULT)
        .map_err(VisionError::capability)?;
    Ok(gray)
}

/// Three-channel BGR copy, for drawing colored overlays on any frame.
pub fn to_color(frame: &Mat) -> Result<Mat> {
    let code = match frame.channels() {
        3 => return Ok(frame.clone()),
        1 => imgproc::COLOR_GRAY2BGR,
        4 => imgproc::COLOR_BGRA2BGR,
        n => {
            return Err(VisionError::CapabilityInput(format!(
                "unsupported channel count {n}"
            )));
        }
    };
    let mut color = Mat::default();
    imgproc::cvt_color(frame, &mut color, code, 0, AlgorithmHint::ALGO_HINT_DEFAULT)
        .map_err(VisionError::capability)?;
    Ok(color)
}

/// Horizontally mirrored copy.
pub fn mirror(frame: &Mat) -> Result<Mat> {
    let mut flipped = Mat::default();
    opencv::core::flip(frame, &mut flipped, 1).map_err(VisionError::capability)?;
    Ok(flipped)
}

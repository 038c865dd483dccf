//! Deterministic stand-ins for the camera, window, video writer and vision
//! primitives.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use opencv::core::{CV_8UC3, CV_32FC2, Mat, Point2f, Scalar, Size};
use opencv::prelude::*;

use crate::capture::{DisplaySink, FrameSource};
use crate::error::{Result, VisionError};
use crate::recorder::{Codec, VideoSink, VideoSinkFactory};
use crate::tracking::capability::{CornerDetector, DenseFlow, FlowResult, KeypointSet, SparseFlow};

pub fn solid_frame(rows: i32, cols: i32, value: f64) -> Mat {
    Mat::new_rows_cols_with_default(rows, cols, CV_8UC3, Scalar::all(value)).unwrap()
}

pub struct ScriptedSource {
    frames: VecDeque<Mat>,
    width: i32,
    height: i32,
}

impl ScriptedSource {
    pub fn solid(count: usize, rows: i32, cols: i32) -> Self {
        Self {
            frames: (0..count).map(|_| solid_frame(rows, cols, 0.)).collect(),
            width: cols,
            height: rows,
        }
    }

    pub fn with_native_size(mut self, width: i32, height: i32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn push_front(&mut self, frame: Mat) {
        self.frames.push_front(frame);
    }
}

impl FrameSource for ScriptedSource {
    fn read(&mut self) -> Result<Option<Mat>> {
        Ok(self.frames.pop_front())
    }

    fn native_width(&self) -> i32 {
        self.width
    }

    fn native_height(&self) -> i32 {
        self.height
    }
}

#[derive(Debug, Clone)]
pub struct OpenedSink {
    pub filename: PathBuf,
    pub fourcc: [char; 4],
    pub fps: f64,
    pub size: Size,
}

#[derive(Default)]
struct SinkState {
    opened: Vec<OpenedSink>,
    written: usize,
    closed: bool,
}

#[derive(Clone, Default)]
pub struct SinkSpy {
    state: Rc<RefCell<SinkState>>,
}

impl SinkSpy {
    pub fn opened(&self) -> Vec<OpenedSink> {
        self.state.borrow().opened.clone()
    }

    pub fn written(&self) -> usize {
        self.state.borrow().written
    }

    pub fn closed(&self) -> bool {
        self.state.borrow().closed
    }
}

impl VideoSinkFactory for SinkSpy {
    fn open(
        &mut self,
        filename: &Path,
        codec: Codec,
        fps: f64,
        size: Size,
    ) -> Result<Box<dyn VideoSink>> {
        self.state.borrow_mut().opened.push(OpenedSink {
            filename: filename.to_path_buf(),
            fourcc: codec.chars(),
            fps,
            size,
        });
        Ok(Box::new(self.clone()))
    }
}

impl VideoSink for SinkSpy {
    fn write(&mut self, _frame: &Mat) -> Result<()> {
        self.state.borrow_mut().written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.state.borrow_mut().closed = true;
        Ok(())
    }
}

/// A video writer that can never be opened.
pub struct FailingSinks;

impl VideoSinkFactory for FailingSinks {
    fn open(
        &mut self,
        filename: &Path,
        _codec: Codec,
        _fps: f64,
        _size: Size,
    ) -> Result<Box<dyn VideoSink>> {
        Err(VisionError::Recording(format!(
            "could not open video writer for {}",
            filename.display()
        )))
    }
}

#[derive(Clone, Default)]
pub struct DisplaySpy {
    frames: Rc<RefCell<Vec<Mat>>>,
}

impl DisplaySpy {
    pub fn frames(&self) -> Vec<Mat> {
        self.frames.borrow().clone()
    }
}

impl DisplaySink for DisplaySpy {
    fn show(&mut self, frame: &Mat) -> Result<()> {
        self.frames.borrow_mut().push(frame.clone());
        Ok(())
    }
}

/// Returns the same keypoints on every detection and counts the calls.
#[derive(Clone)]
pub struct FixedCorners {
    points: KeypointSet,
    calls: Rc<RefCell<usize>>,
}

impl FixedCorners {
    pub fn new(points: KeypointSet) -> Self {
        Self {
            points,
            calls: Rc::new(RefCell::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.borrow()
    }
}

impl CornerDetector for FixedCorners {
    fn detect(&mut self, _intensity: &Mat) -> Result<KeypointSet> {
        *self.calls.borrow_mut() += 1;
        Ok(self.points.clone())
    }
}

/// What a scripted flow step does with the points it is given.
#[derive(Debug, Clone, Copy)]
pub enum FlowStep {
    /// Every point moves by `(dx, dy)` and stays valid.
    Shift(f32, f32),
    /// Every point is reported invalid.
    LoseAll,
    /// The primitive rejects its input.
    Reject,
}

/// Plays back flow steps in order, repeating the last one.
#[derive(Clone)]
pub struct ScriptedFlow {
    steps: Vec<FlowStep>,
    calls: Rc<RefCell<usize>>,
    inputs: Rc<RefCell<Vec<KeypointSet>>>,
}

impl ScriptedFlow {
    pub fn new(steps: Vec<FlowStep>) -> Self {
        Self {
            steps,
            calls: Rc::new(RefCell::new(0)),
            inputs: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.borrow()
    }

    /// Keypoints passed to each call.
    pub fn inputs(&self) -> Vec<KeypointSet> {
        self.inputs.borrow().clone()
    }
}

impl SparseFlow for ScriptedFlow {
    fn track(&mut self, _previous: &Mat, _current: &Mat, points: &[Point2f]) -> Result<FlowResult> {
        let call = {
            let mut calls = self.calls.borrow_mut();
            *calls += 1;
            *calls - 1
        };
        self.inputs.borrow_mut().push(points.to_vec());
        let step = self.steps[call.min(self.steps.len() - 1)];
        match step {
            FlowStep::Shift(dx, dy) => Ok(FlowResult {
                points: points.iter().map(|p| Point2f::new(p.x + dx, p.y + dy)).collect(),
                valid: vec![true; points.len()],
            }),
            FlowStep::LoseAll => Ok(FlowResult {
                points: points.to_vec(),
                valid: vec![false; points.len()],
            }),
            FlowStep::Reject => Err(VisionError::CapabilityInput("scripted rejection".into())),
        }
    }
}

/// A uniform displacement field the size of the frame.
pub struct UniformFlow {
    pub dx: f32,
    pub dy: f32,
}

impl DenseFlow for UniformFlow {
    fn dense_flow(&mut self, previous: &Mat, _current: &Mat) -> Result<Mat> {
        Ok(Mat::new_rows_cols_with_default(
            previous.rows(),
            previous.cols(),
            CV_32FC2,
            Scalar::new(f64::from(self.dx), f64::from(self.dy), 0., 0.),
        )
        .unwrap())
    }
}

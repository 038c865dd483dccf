//! Vision primitives the tracker drives, and their OpenCV implementations.

use log::debug;
use opencv::core::{Mat, Point2f, Size, TermCriteria, TermCriteria_Type, Vector, no_array};
use opencv::prelude::*;
use opencv::{imgproc, video};

use crate::conf::{DenseParams, DetectorParams, FlowParams};
use crate::error::{Result, VisionError};

pub type KeypointSet = Vec<Point2f>;

/// Tracked coordinates for each input keypoint, with validity flags.
#[derive(Debug, Clone, Default)]
pub struct FlowResult {
    pub points: Vec<Point2f>,
    pub valid: Vec<bool>,
}

impl FlowResult {
    /// `(previous, current)` pairs whose validity flag is set.
    pub fn good_pairs(&self, previous: &[Point2f]) -> Vec<(Point2f, Point2f)> {
        previous
            .iter()
            .zip(&self.points)
            .zip(&self.valid)
            .filter(|(_, ok)| **ok)
            .map(|((p, n), _)| (*p, *n))
            .collect()
    }
}

pub trait CornerDetector {
    fn detect(&mut self, intensity: &Mat) -> Result<KeypointSet>;
}

pub trait SparseFlow {
    fn track(&mut self, previous: &Mat, current: &Mat, points: &[Point2f]) -> Result<FlowResult>;
}

/// Produces a `CV_32FC2` displacement field sized to the frame.
pub trait DenseFlow {
    fn dense_flow(&mut self, previous: &Mat, current: &Mat) -> Result<Mat>;
}

fn check_pair(previous: &Mat, current: &Mat) -> Result<()> {
    if previous.empty() || current.empty() {
        return Err(VisionError::CapabilityInput("empty intensity frame".into()));
    }
    let (a, b) = (
        previous.size().map_err(VisionError::capability)?,
        current.size().map_err(VisionError::capability)?,
    );
    if a != b {
        return Err(VisionError::CapabilityInput(format!(
            "frame size changed from {}x{} to {}x{}",
            a.width, a.height, b.width, b.height
        )));
    }
    Ok(())
}

/// Shi-Tomasi "good features to track".
pub struct ShiTomasi {
    params: DetectorParams,
}

impl ShiTomasi {
    pub fn new(params: DetectorParams) -> Self {
        Self { params }
    }
}

impl CornerDetector for ShiTomasi {
    fn detect(&mut self, intensity: &Mat) -> Result<KeypointSet> {
        if intensity.empty() {
            return Err(VisionError::CapabilityInput("empty intensity frame".into()));
        }
        let mut corners = Vector::<Point2f>::new();
        imgproc::good_features_to_track(
            intensity,
            &mut corners,
            self.params.max_corners,
            self.params.quality_level,
            self.params.min_distance,
            &no_array(),
            self.params.block_size,
            false,
            0.04,
        )
        .map_err(VisionError::capability)?;
        debug!("Detected {} corners", corners.len());
        Ok(corners.to_vec())
    }
}

/// Pyramidal Lucas-Kanade.
pub struct PyrLucasKanade {
    win_size: Size,
    max_level: i32,
    criteria: TermCriteria,
}

impl PyrLucasKanade {
    pub fn new(params: &FlowParams) -> Result<Self> {
        let criteria = TermCriteria::new(
            TermCriteria_Type::COUNT as i32 | TermCriteria_Type::EPS as i32,
            params.max_iterations,
            params.epsilon,
        )
        .map_err(VisionError::capability)?;
        Ok(Self {
            win_size: Size::new(params.win_size, params.win_size),
            max_level: params.max_level,
            criteria,
        })
    }
}

impl SparseFlow for PyrLucasKanade {
    fn track(&mut self, previous: &Mat, current: &Mat, points: &[Point2f]) -> Result<FlowResult> {
        check_pair(previous, current)?;
        if points.is_empty() {
            return Ok(FlowResult::default());
        }

        let prev_pts = Vector::<Point2f>::from_slice(points);
        let mut next_pts = Vector::<Point2f>::new();
        let mut status = Vector::<u8>::new();
        let mut err = Vector::<f32>::new();
        video::calc_optical_flow_pyr_lk(
            previous,
            current,
            &prev_pts,
            &mut next_pts,
            &mut status,
            &mut err,
            self.win_size,
            self.max_level,
            self.criteria,
            0,
            1e-4,
        )
        .map_err(VisionError::capability)?;

        Ok(FlowResult {
            points: next_pts.to_vec(),
            valid: status.iter().map(|s| s == 1).collect(),
        })
    }
}

/// Farneback dense flow.
pub struct Farneback {
    params: DenseParams,
}

impl Farneback {
    pub fn new(params: DenseParams) -> Self {
        Self { params }
    }
}

impl DenseFlow for Farneback {
    fn dense_flow(&mut self, previous: &Mat, current: &Mat) -> Result<Mat> {
        check_pair(previous, current)?;
        let p = &self.params;
        let mut flow = Mat::default();
        video::calc_optical_flow_farneback(
            previous,
            current,
            &mut flow,
            p.pyr_scale,
            p.levels,
            p.win_size,
            p.iterations,
            p.poly_n,
            p.poly_sigma,
            0,
        )
        .map_err(VisionError::capability)?;
        Ok(flow)
    }
}

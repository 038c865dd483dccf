use opencv::core::{CV_32FC2, Mat, Vec2f};
use opencv::prelude::*;
use rayon::prelude::*;

use crate::error::{Result, VisionError};
use crate::tracking::heading::Segment;

/// Read-only view over a dense `CV_32FC2` displacement field.
pub struct FlowFieldView<'a> {
    rows: i32,
    cols: i32,
    data: &'a [Vec2f],
}

impl<'a> FlowFieldView<'a> {
    pub fn new(mat: &'a Mat) -> Result<Self> {
        if mat.typ() != CV_32FC2 {
            return Err(VisionError::CapabilityInput(format!(
                "flow field must be CV_32FC2, got type {}",
                mat.typ()
            )));
        }
        if !mat.is_continuous() {
            return Err(VisionError::CapabilityInput(
                "flow field is not continuous".into(),
            ));
        }
        Ok(Self {
            rows: mat.rows(),
            cols: mat.cols(),
            data: mat.data_typed::<Vec2f>().map_err(VisionError::capability)?,
        })
    }

    pub fn rows(&self) -> i32 {
        self.rows
    }

    pub fn cols(&self) -> i32 {
        self.cols
    }

    /// Displacement at `(x, y)` with bounds checking.
    pub fn get(&self, x: i32, y: i32) -> Option<(f32, f32)> {
        if x < 0 || y < 0 || x >= self.cols || y >= self.rows {
            return None;
        }
        let v = self.data.get((y * self.cols + x) as usize)?;
        Some((v[0], v[1]))
    }

    /// Samples the field every `step` pixels starting at `step / 2`.
    ///
    /// Rows are sampled in parallel; the result is in row-major order.
    pub fn sample_grid(&self, step: i32) -> Vec<Segment> {
        let step = step.max(1);
        let ys: Vec<i32> = (step / 2..self.rows()).step_by(step as usize).collect();
        ys.par_iter()
            .map(|&y| {
                (step / 2..self.cols())
                    .step_by(step as usize)
                    .filter_map(|x| {
                        self.get(x, y)
                            .map(|(fx, fy)| Segment::from_displacement(x, y, fx, fy))
                    })
                    .collect::<Vec<_>>()
            })
            .flatten()
            .collect()
    }
}

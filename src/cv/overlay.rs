use opencv::core::{CV_8UC3, Mat, Point, Point2f, Scalar, no_array};
use opencv::imgproc;
use opencv::prelude::*;

use crate::error::{Result, VisionError};
use crate::tracking::heading::{Segment, arrow_end};

const ARROW_COLOR: (f64, f64, f64) = (0., 255., 0.);
const ARROW_THICKNESS: i32 = 6;
const SEGMENT_COLOR: (f64, f64, f64) = (255., 0., 0.);
const PALETTE_SIZE: usize = 100;

fn bgr((b, g, r): (f64, f64, f64)) -> Scalar {
    Scalar::new(b, g, r, 0.)
}

fn to_point(p: Point2f) -> Point {
    Point::new(p.x.round() as i32, p.y.round() as i32)
}

/// Deterministic, well spread track colors.
pub fn palette_color(index: usize) -> Scalar {
    let hue = ((index % PALETTE_SIZE) as f64 * 0.618_033_988_75).fract() * 6.;
    let x = 1. - (hue % 2. - 1.).abs();
    let (r, g, b) = match hue as u32 {
        0 => (1., x, 0.),
        1 => (x, 1., 0.),
        2 => (0., 1., x),
        3 => (0., x, 1.),
        4 => (x, 0., 1.),
        _ => (1., 0., x),
    };
    bgr((b * 255., g * 255., r * 255.))
}

/// Cumulative track drawing, composited onto each rendered frame.
pub struct TrackMask {
    mask: Mat,
}

impl TrackMask {
    /// A zeroed BGR buffer sized to `frame`, whatever its channel count.
    pub fn for_frame(frame: &Mat) -> Result<Self> {
        let mask = Mat::new_rows_cols_with_default(
            frame.rows(),
            frame.cols(),
            CV_8UC3,
            Scalar::all(0.),
        )
        .map_err(VisionError::capability)?;
        Ok(Self { mask })
    }

    pub fn mat(&self) -> &Mat {
        &self.mask
    }

    /// Extends each track on the mask and marks its current position on `frame`.
    pub fn draw_tracks(&mut self, frame: &mut Mat, pairs: &[(Point2f, Point2f)]) -> Result<()> {
        for (i, (previous, current)) in pairs.iter().enumerate() {
            let color = palette_color(i);
            imgproc::line(
                &mut self.mask,
                to_point(*current),
                to_point(*previous),
                color,
                2,
                imgproc::LINE_8,
                0,
            )
            .map_err(VisionError::capability)?;
            imgproc::circle(
                frame,
                to_point(*current),
                5,
                color,
                -1,
                imgproc::LINE_8,
                0,
            )
            .map_err(VisionError::capability)?;
        }
        Ok(())
    }

    /// Adds the mask onto a color frame of the same size.
    pub fn composite(&self, frame: &mut Mat) -> Result<()> {
        if frame.size().map_err(VisionError::capability)?
            != self.mask.size().map_err(VisionError::capability)?
            || frame.typ() != self.mask.typ()
        {
            return Err(VisionError::CapabilityInput(
                "track mask does not match frame".into(),
            ));
        }
        let mut out = Mat::default();
        opencv::core::add(&*frame, &self.mask, &mut out, &no_array(), -1)
            .map_err(VisionError::capability)?;
        *frame = out;
        Ok(())
    }
}

/// Sampled dense-flow segments with their origins.
pub fn draw_segments(frame: &mut Mat, segments: &[Segment]) -> Result<()> {
    let color = bgr(SEGMENT_COLOR);
    for s in segments {
        let from = Point::new(s.from.0, s.from.1);
        let to = Point::new(s.to.0, s.to.1);
        imgproc::line(frame, from, to, color, 1, imgproc::LINE_8, 0)
            .map_err(VisionError::capability)?;
        imgproc::circle(frame, from, 1, color, -1, imgproc::LINE_8, 0)
            .map_err(VisionError::capability)?;
    }
    Ok(())
}

/// Arrow from the frame center along `angle_deg`.
///
/// Returns `false` without drawing when the angle is not finite.
pub fn draw_heading(frame: &mut Mat, angle_deg: f64, length: i32) -> Result<bool> {
    let center = (frame.cols() / 2, frame.rows() / 2);
    let Some(end) = arrow_end(center, angle_deg, length) else {
        return Ok(false);
    };
    imgproc::arrowed_line(
        frame,
        Point::new(center.0, center.1),
        Point::new(end.0, end.1),
        bgr(ARROW_COLOR),
        ARROW_THICKNESS,
        imgproc::LINE_8,
        0,
        0.1,
    )
    .map_err(VisionError::capability)?;
    Ok(true)
}

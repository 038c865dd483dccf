//! Heading aggregation and angle quantization.
//!
//! Angles are in degrees. 0° is motion towards the right edge of the frame and
//! +90° is motion towards the top edge, so the image y axis is negated before
//! any arctangent is taken.

use crate::conf::{HeadingParams, TrackingMode};

/// Relative slack on `|angle| / step` so exact multiples stay fixed points.
const RATIO_TOLERANCE: f64 = 1e-9;

/// The dominant direction of motion over one aggregation window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadingEstimate {
    pub mode: TrackingMode,
    /// Angle before quantization.
    pub raw_deg: f64,
    /// Angle after snapping to the configured step.
    pub heading_deg: f64,
    pub sum_dx: f64,
    pub sum_dy: f64,
    /// Point pairs (sparse) or grid segments (dense) that contributed.
    pub samples: usize,
}

/// Snaps `angle` away from zero to the next multiple of `step`.
///
/// Angles already on a nonzero multiple are returned as is; any other nonzero
/// angle, however small, moves out to the next multiple. A zero or non-finite
/// step disables quantization.
pub fn quantize(angle: f64, step: f64) -> f64 {
    if step == 0. || !step.is_finite() || !angle.is_finite() {
        return angle;
    }
    let step = step.abs();
    let ratio = angle.abs() / step;
    let nearest = ratio.round();
    let multiples = if nearest >= 1. && (ratio - nearest).abs() <= RATIO_TOLERANCE * nearest {
        nearest
    } else {
        ratio.ceil()
    };
    angle.signum() * multiples * step
}

/// Angle of a displacement in image coordinates.
///
/// With `full_quadrant` unset this is the single-argument arctangent, which
/// folds opposite directions onto the same line (left reads as right). `None`
/// when the displacement carries no direction.
pub fn displacement_angle(dx: f64, dy: f64, full_quadrant: bool) -> Option<f64> {
    if full_quadrant {
        if dx == 0. && dy == 0. {
            return None;
        }
        // +0 keeps flat leftward motion at 180° instead of -180°.
        let rise = -dy + 0.;
        Some(rise.atan2(dx).to_degrees())
    } else {
        if dx == 0. {
            return None;
        }
        Some((-dy / dx).atan().to_degrees())
    }
}

/// Running `Σdx, Σdy` over the good point pairs of one window.
#[derive(Debug, Clone)]
pub struct HeadingAccumulator {
    update_interval: u32,
    angle_step: f64,
    full_quadrant: bool,
    sum_dx: f64,
    sum_dy: f64,
    samples: usize,
    frames: u32,
}

impl HeadingAccumulator {
    pub fn new(params: &HeadingParams) -> Self {
        Self {
            update_interval: params.update_interval.max(1),
            angle_step: params.angle_step,
            full_quadrant: params.full_quadrant,
            sum_dx: 0.,
            sum_dy: 0.,
            samples: 0,
            frames: 0,
        }
    }

    /// Adds one processed frame's point pairs.
    ///
    /// Returns an estimate when this frame closes the window. The sums are zero
    /// again afterwards whether or not an angle could be computed.
    pub fn push_frame<I>(&mut self, pairs: I) -> Option<HeadingEstimate>
    where
        I: IntoIterator<Item = ((f32, f32), (f32, f32))>,
    {
        for ((xp, yp), (xn, yn)) in pairs {
            self.sum_dx += f64::from(xn - xp);
            self.sum_dy += f64::from(yn - yp);
            self.samples += 1;
        }
        self.frames += 1;

        if self.frames < self.update_interval {
            return None;
        }
        let estimate = displacement_angle(self.sum_dx, self.sum_dy, self.full_quadrant).map(
            |raw_deg| HeadingEstimate {
                mode: TrackingMode::Sparse,
                raw_deg,
                heading_deg: quantize(raw_deg, self.angle_step),
                sum_dx: self.sum_dx,
                sum_dy: self.sum_dy,
                samples: self.samples,
            },
        );
        self.reset();
        estimate
    }

    pub fn reset(&mut self) {
        self.sum_dx = 0.;
        self.sum_dy = 0.;
        self.samples = 0;
        self.frames = 0;
    }

    pub fn sums(&self) -> (f64, f64) {
        (self.sum_dx, self.sum_dy)
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }
}

/// A sampled displacement drawn as a line segment, in integer pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub from: (i32, i32),
    pub to: (i32, i32),
}

impl Segment {
    /// Endpoints are offset by half a pixel and truncated toward zero.
    pub fn from_displacement(x: i32, y: i32, fx: f32, fy: f32) -> Self {
        let round = |v: f32| (v + 0.5) as i32;
        Self {
            from: (x, y),
            to: (round(x as f32 + fx), round(y as f32 + fy)),
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.from == self.to
    }

    /// Whole-degree angle of the segment, `None` when it has no length.
    pub fn angle(&self) -> Option<i32> {
        if self.is_degenerate() {
            return None;
        }
        let dx = f64::from(self.to.0 - self.from.0);
        let dy = f64::from(self.to.1 - self.from.1);
        displacement_angle(dx, dy, true).map(|a| a.round() as i32)
    }
}

/// Most frequent whole-degree angle among the segments; ties go to the
/// smallest angle.
pub fn mode_angle(segments: &[Segment]) -> Option<i32> {
    let mut counts = std::collections::BTreeMap::new();
    for angle in segments.iter().filter_map(Segment::angle) {
        *counts.entry(angle).or_insert(0usize) += 1;
    }
    counts
        .into_iter()
        .fold(None, |best: Option<(i32, usize)>, (angle, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((angle, count)),
        })
        .map(|(angle, _)| angle)
}

/// Dense-mode estimate: mode of the segment angles, then quantized.
pub fn dense_estimate(segments: &[Segment], angle_step: f64) -> Option<HeadingEstimate> {
    let raw = mode_angle(segments)?;
    let (sum_dx, sum_dy) = segments.iter().fold((0., 0.), |(sx, sy), s| {
        (
            sx + f64::from(s.to.0 - s.from.0),
            sy + f64::from(s.to.1 - s.from.1),
        )
    });
    let raw_deg = f64::from(raw);
    Some(HeadingEstimate {
        mode: TrackingMode::Dense,
        raw_deg,
        heading_deg: quantize(raw_deg, angle_step),
        sum_dx,
        sum_dy,
        samples: segments.iter().filter(|s| !s.is_degenerate()).count(),
    })
}

/// End point of an arrow of `length` pixels from `center` along `angle_deg`.
///
/// `None` for a non-finite angle: there is no heading to draw.
pub fn arrow_end(center: (i32, i32), angle_deg: f64, length: i32) -> Option<(i32, i32)> {
    if !angle_deg.is_finite() {
        return None;
    }
    let theta = angle_deg.to_radians();
    let length = f64::from(length);
    Some((
        center.0 + (length * theta.cos()).round() as i32,
        center.1 - (length * theta.sin()).round() as i32,
    ))
}

//! Keypoint continuity across frames and the heading derived from it.
//!
//! The tracker runs a small state machine:
//!
//! - `Idle`: frames pass through untouched.
//! - `Bootstrapping`: the next frame is converted to intensity and corners are
//!   detected on it. Always followed by `Tracking`.
//! - `Tracking`: each frame is flowed against the previous intensity frame.
//!   Losing every point sends the tracker back to `Bootstrapping` for the next
//!   frame; losing too often in a row sends it to `Idle`.
//!
//! The previous frame lives in a single `previous` slot. Each tracking step
//! builds a `current` snapshot from the new frame and moves it into that slot
//! once the step is done; nothing else reads or writes it.

pub mod capability;
pub mod heading;

use log::{debug, error, info, warning};
use opencv::core::{Mat, Point2f};
use opencv::prelude::*;

use crate::capture::Frame;
use crate::conf::{Conf, TrackingMode};
use crate::cv::mat_view::FlowFieldView;
use crate::cv::overlay::{TrackMask, draw_heading, draw_segments};
use crate::cv::{to_color, to_intensity};
use crate::error::{Result, VisionError};
use capability::{
    CornerDetector, DenseFlow, Farneback, KeypointSet, PyrLucasKanade, ShiTomasi, SparseFlow,
};
use heading::{HeadingAccumulator, HeadingEstimate, Segment, dense_estimate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingState {
    #[default]
    Idle,
    Bootstrapping,
    Tracking,
}

/// What happened to one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Not tracking; the frame was ignored.
    Idle,
    /// Fresh detection on this frame.
    Bootstrapped { keypoints: usize },
    /// Incremental step; `heading` is set when an aggregation window closed.
    Tracked {
        good: usize,
        heading: Option<HeadingEstimate>,
    },
    /// Every point was lost; the next frame is detected afresh.
    Lost,
    /// Too many consecutive losses; the tracker went idle.
    GaveUp,
    /// A primitive rejected its input; the frame was skipped.
    Skipped,
}

/// The vision primitives the tracker drives.
pub struct Capabilities {
    pub detector: Box<dyn CornerDetector>,
    pub sparse: Box<dyn SparseFlow>,
    pub dense: Box<dyn DenseFlow>,
}

impl Capabilities {
    pub fn opencv(conf: &Conf) -> Result<Self> {
        Ok(Self {
            detector: Box::new(ShiTomasi::new(conf.detector.clone())),
            sparse: Box::new(PyrLucasKanade::new(&conf.flow)?),
            dense: Box::new(Farneback::new(conf.dense.clone())),
        })
    }
}

struct Snapshot {
    intensity: Mat,
    points: KeypointSet,
}

pub struct MotionTracker {
    mode: TrackingMode,
    state: TrackingState,
    caps: Capabilities,
    previous: Option<Snapshot>,
    accumulator: HeadingAccumulator,
    heading: Option<HeadingEstimate>,
    mask: Option<TrackMask>,
    last_pairs: Vec<(Point2f, Point2f)>,
    last_segments: Vec<Segment>,
    steps_since_detection: u32,
    consecutive_losses: u32,
    redetect_interval: u32,
    max_consecutive_losses: u32,
    angle_step: f64,
    grid_step: i32,
    arrow_length: i32,
    draw_tracks: bool,
}

impl MotionTracker {
    pub fn new(conf: &Conf, caps: Capabilities) -> Self {
        Self {
            mode: conf.tracker.mode,
            state: TrackingState::Idle,
            caps,
            previous: None,
            accumulator: HeadingAccumulator::new(&conf.heading),
            heading: None,
            mask: None,
            last_pairs: Vec::new(),
            last_segments: Vec::new(),
            steps_since_detection: 0,
            consecutive_losses: 0,
            redetect_interval: conf.tracker.redetect_interval.max(1),
            max_consecutive_losses: conf.tracker.max_consecutive_losses.max(1),
            angle_step: conf.heading.angle_step,
            grid_step: conf.dense.grid_step,
            arrow_length: conf.heading.arrow_length,
            draw_tracks: conf.tracker.draw_tracks,
        }
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    /// Most recent heading; kept until a later window produces another.
    pub fn heading(&self) -> Option<&HeadingEstimate> {
        self.heading.as_ref()
    }

    /// `(Σdx, Σdy)` of the open aggregation window.
    pub fn pending_sums(&self) -> (f64, f64) {
        self.accumulator.sums()
    }

    pub fn keypoints(&self) -> &[Point2f] {
        match &self.previous {
            Some(snapshot) => &snapshot.points,
            None => &[],
        }
    }

    pub fn start(&mut self) {
        if self.state == TrackingState::Idle {
            info!("Tracking started ({:?} mode)", self.mode);
            self.state = TrackingState::Bootstrapping;
            self.consecutive_losses = 0;
        }
    }

    pub fn stop(&mut self) {
        if self.state != TrackingState::Idle {
            info!("Tracking stopped");
        }
        self.state = TrackingState::Idle;
        self.previous = None;
        self.mask = None;
        self.heading = None;
        self.last_pairs.clear();
        self.last_segments.clear();
        self.accumulator.reset();
    }

    /// Advances the state machine by one frame.
    ///
    /// Loss of tracking and rejected primitive input are absorbed here and
    /// reported through the outcome.
    pub fn process(&mut self, frame: &Frame) -> Result<Outcome> {
        self.last_pairs.clear();
        self.last_segments.clear();

        let result = match self.state {
            TrackingState::Idle => return Ok(Outcome::Idle),
            TrackingState::Bootstrapping => self.bootstrap(frame),
            TrackingState::Tracking => match self.mode {
                TrackingMode::Sparse => self.track_sparse(frame),
                TrackingMode::Dense => self.track_dense(frame),
            },
        };

        match result {
            Err(VisionError::TrackingLost) => Ok(self.lost(frame.seq())),
            Err(VisionError::CapabilityInput(reason)) => {
                error!("Skipping frame #{}: {}", frame.seq(), reason);
                self.rearm();
                Ok(Outcome::Skipped)
            }
            other => other,
        }
    }

    fn bootstrap(&mut self, frame: &Frame) -> Result<Outcome> {
        let intensity = to_intensity(frame.image())?;
        let points = match self.mode {
            TrackingMode::Sparse => self.caps.detector.detect(&intensity)?,
            TrackingMode::Dense => KeypointSet::new(),
        };
        self.mask = Some(TrackMask::for_frame(frame.image())?);
        let keypoints = points.len();
        debug!("Bootstrapped on frame #{} with {} keypoints", frame.seq(), keypoints);

        self.previous = Some(Snapshot { intensity, points });
        self.steps_since_detection = 0;
        self.state = TrackingState::Tracking;
        Ok(Outcome::Bootstrapped { keypoints })
    }

    fn track_sparse(&mut self, frame: &Frame) -> Result<Outcome> {
        let previous = self.previous.take().ok_or(VisionError::TrackingLost)?;
        let intensity = to_intensity(frame.image())?;
        let flow = self
            .caps
            .sparse
            .track(&previous.intensity, &intensity, &previous.points)?;

        let pairs = flow.good_pairs(&previous.points);
        if pairs.is_empty() {
            return Err(VisionError::TrackingLost);
        }
        self.consecutive_losses = 0;

        let good = pairs.len();
        let emitted = self
            .accumulator
            .push_frame(pairs.iter().map(|(p, n)| ((p.x, p.y), (n.x, n.y))));
        if let Some(estimate) = emitted {
            debug!(
                "Heading {:.1}° (raw {:.2}°, Σdx {:.1}, Σdy {:.1})",
                estimate.heading_deg, estimate.raw_deg, estimate.sum_dx, estimate.sum_dy
            );
            self.heading = Some(estimate);
        }

        let mut points: KeypointSet = pairs.iter().map(|(_, n)| *n).collect();
        self.steps_since_detection += 1;
        if self.steps_since_detection >= self.redetect_interval {
            points = self.caps.detector.detect(&intensity)?;
            self.steps_since_detection = 0;
            debug!("Re-detected {} keypoints on frame #{}", points.len(), frame.seq());
        }

        self.last_pairs = pairs;
        self.previous = Some(Snapshot { intensity, points });
        Ok(Outcome::Tracked {
            good,
            heading: emitted,
        })
    }

    fn track_dense(&mut self, frame: &Frame) -> Result<Outcome> {
        let previous = self.previous.take().ok_or(VisionError::TrackingLost)?;
        let intensity = to_intensity(frame.image())?;
        let field = self.caps.dense.dense_flow(&previous.intensity, &intensity)?;
        let segments = FlowFieldView::new(&field)?.sample_grid(self.grid_step);

        let emitted = dense_estimate(&segments, self.angle_step);
        if let Some(estimate) = emitted {
            self.heading = Some(estimate);
        }
        let good = segments.iter().filter(|s| !s.is_degenerate()).count();

        self.last_segments = segments;
        self.previous = Some(Snapshot {
            intensity,
            points: KeypointSet::new(),
        });
        Ok(Outcome::Tracked {
            good,
            heading: emitted,
        })
    }

    fn lost(&mut self, seq: u64) -> Outcome {
        self.consecutive_losses += 1;
        if self.consecutive_losses >= self.max_consecutive_losses {
            warning!(
                "Tracking lost {} times in a row at frame #{}; going idle",
                self.consecutive_losses,
                seq
            );
            self.stop();
            return Outcome::GaveUp;
        }
        let (dx, dy) = self.pending_sums();
        warning!(
            "Tracking lost at frame #{}; re-detecting (pending Σdx={:.1}, Σdy={:.1})",
            seq,
            dx,
            dy
        );
        self.rearm();
        Outcome::Lost
    }

    fn rearm(&mut self) {
        self.previous = None;
        self.state = TrackingState::Bootstrapping;
    }

    /// Draws tracks and the current heading onto `image`.
    ///
    /// Grayscale images are promoted to BGR first. The heading arrow is drawn
    /// even when the track overlay fails; that failure is returned afterwards.
    pub fn render(&mut self, image: &mut Mat) -> Result<()> {
        if self.state == TrackingState::Idle {
            return Ok(());
        }
        if image.channels() != 3 {
            *image = to_color(image)?;
        }
        let tracks = if self.draw_tracks {
            self.render_tracks(image)
        } else {
            Ok(())
        };
        if let Some(estimate) = self.heading {
            if !draw_heading(image, estimate.heading_deg, self.arrow_length)? {
                debug!("No heading available this frame");
            }
        }
        tracks
    }

    fn render_tracks(&mut self, image: &mut Mat) -> Result<()> {
        match self.mode {
            TrackingMode::Sparse => match self.mask.as_mut() {
                Some(mask) => {
                    mask.draw_tracks(image, &self.last_pairs)?;
                    mask.composite(image)
                }
                None => Ok(()),
            },
            TrackingMode::Dense => draw_segments(image, &self.last_segments),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixedCorners, FlowStep, ScriptedFlow, UniformFlow, solid_frame};
    use opencv::core::{CV_8UC1, CV_8UC3, Scalar, Vec3b};

    struct Harness {
        tracker: MotionTracker,
        corners: FixedCorners,
        flow: ScriptedFlow,
        seq: u64,
    }

    impl Harness {
        fn new(conf: Conf, points: KeypointSet, steps: Vec<FlowStep>) -> Self {
            Self::with_dense(conf, points, steps, UniformFlow { dx: 0., dy: 0. })
        }

        fn with_dense(
            conf: Conf,
            points: KeypointSet,
            steps: Vec<FlowStep>,
            dense: UniformFlow,
        ) -> Self {
            let corners = FixedCorners::new(points);
            let flow = ScriptedFlow::new(steps);
            let caps = Capabilities {
                detector: Box::new(corners.clone()),
                sparse: Box::new(flow.clone()),
                dense: Box::new(dense),
            };
            let mut tracker = MotionTracker::new(&conf, caps);
            tracker.start();
            Self {
                tracker,
                corners,
                flow,
                seq: 0,
            }
        }

        fn step(&mut self) -> Outcome {
            self.step_with(solid_frame(120, 160, 40.))
        }

        fn step_with(&mut self, image: Mat) -> Outcome {
            let frame = Frame::new(self.seq, image);
            self.seq += 1;
            self.tracker.process(&frame).unwrap()
        }
    }

    fn one_point() -> KeypointSet {
        vec![Point2f::new(80., 60.)]
    }

    #[test]
    fn test_idle_ignores_frames() {
        let mut h = Harness::new(Conf::default(), one_point(), vec![FlowStep::Shift(1., 0.)]);
        h.tracker.stop();
        assert_eq!(h.step(), Outcome::Idle);
        assert_eq!(h.corners.calls(), 0);
        assert_eq!(h.tracker.state(), TrackingState::Idle);
    }

    #[test]
    fn test_bootstrap_then_tracking() {
        let mut h = Harness::new(Conf::default(), one_point(), vec![FlowStep::Shift(2., 1.)]);
        assert_eq!(h.tracker.state(), TrackingState::Bootstrapping);
        assert_eq!(h.step(), Outcome::Bootstrapped { keypoints: 1 });
        assert_eq!(h.tracker.state(), TrackingState::Tracking);

        assert_eq!(
            h.step(),
            Outcome::Tracked {
                good: 1,
                heading: None
            }
        );
        assert_eq!(h.tracker.keypoints(), &[Point2f::new(82., 61.)]);
        assert_eq!(h.tracker.pending_sums(), (2., 1.));
    }

    #[test]
    fn test_horizontal_pan_yields_zero_heading() {
        let mut h = Harness::new(Conf::default(), one_point(), vec![FlowStep::Shift(5., 0.)]);
        h.step();
        for _ in 0..9 {
            assert!(matches!(h.step(), Outcome::Tracked { heading: None, .. }));
        }
        let Outcome::Tracked {
            heading: Some(estimate),
            ..
        } = h.step()
        else {
            panic!("window should close on the tenth tracked frame");
        };
        assert!((estimate.sum_dx - 50.).abs() < 1e-6);
        assert!(estimate.sum_dy.abs() < 1e-6);
        assert!(estimate.raw_deg.abs() < 1e-6);
        assert_eq!(estimate.heading_deg, 0.);
        assert_eq!(h.tracker.pending_sums(), (0., 0.));
        assert_eq!(h.tracker.heading(), Some(&estimate));
    }

    #[test]
    fn test_sums_cover_every_good_point() {
        let mut conf = Conf::default();
        conf.heading.update_interval = 2;
        let points = vec![
            Point2f::new(10., 10.),
            Point2f::new(40., 20.),
            Point2f::new(90., 70.),
        ];
        let mut h = Harness::new(conf, points, vec![FlowStep::Shift(3., -3.)]);
        h.step();
        h.step();
        let Outcome::Tracked {
            heading: Some(estimate),
            ..
        } = h.step()
        else {
            panic!("expected a heading");
        };
        assert_eq!(estimate.sum_dx, 18.);
        assert_eq!(estimate.sum_dy, -18.);
        assert_eq!(estimate.samples, 6);
        assert!((estimate.raw_deg - 45.).abs() < 1e-9);
        assert_eq!(estimate.heading_deg, 60.);
    }

    #[test]
    fn test_loss_triggers_fresh_detection() {
        let mut h = Harness::new(
            Conf::default(),
            one_point(),
            vec![FlowStep::LoseAll, FlowStep::Shift(1., 0.)],
        );
        assert_eq!(h.step(), Outcome::Bootstrapped { keypoints: 1 });
        assert_eq!(h.step(), Outcome::Lost);
        assert_eq!(h.tracker.state(), TrackingState::Bootstrapping);
        assert!(h.tracker.keypoints().is_empty());

        assert_eq!(h.step(), Outcome::Bootstrapped { keypoints: 1 });
        assert_eq!(h.corners.calls(), 2);
        assert_eq!(h.flow.calls(), 1);

        // Flow resumes from the fresh detection, not the lost points.
        h.step();
        assert_eq!(h.flow.inputs()[1], one_point());
    }

    #[test]
    fn test_repeated_loss_goes_idle() {
        let mut conf = Conf::default();
        conf.tracker.max_consecutive_losses = 2;
        let mut h = Harness::new(conf, KeypointSet::new(), vec![FlowStep::Shift(1., 0.)]);

        assert_eq!(h.step(), Outcome::Bootstrapped { keypoints: 0 });
        assert_eq!(h.step(), Outcome::Lost);
        assert_eq!(h.step(), Outcome::Bootstrapped { keypoints: 0 });
        assert_eq!(h.step(), Outcome::GaveUp);
        assert_eq!(h.tracker.state(), TrackingState::Idle);
        assert_eq!(h.step(), Outcome::Idle);
    }

    #[test]
    fn test_rejected_input_skips_frame() {
        let mut h = Harness::new(
            Conf::default(),
            one_point(),
            vec![FlowStep::Reject, FlowStep::Shift(1., 0.)],
        );
        h.step();
        assert_eq!(h.step(), Outcome::Skipped);
        assert_eq!(h.tracker.state(), TrackingState::Bootstrapping);
        assert_eq!(h.step(), Outcome::Bootstrapped { keypoints: 1 });
    }

    #[test]
    fn test_frame_size_change_is_skipped() {
        let conf = Conf::default();
        let caps = Capabilities::opencv(&conf).unwrap();
        let mut tracker = MotionTracker::new(&conf, caps);
        tracker.start();
        tracker
            .process(&Frame::new(0, solid_frame(64, 64, 0.)))
            .unwrap();
        let outcome = tracker
            .process(&Frame::new(1, solid_frame(32, 48, 0.)))
            .unwrap();
        assert_eq!(outcome, Outcome::Skipped);
        assert_eq!(tracker.state(), TrackingState::Bootstrapping);
    }

    #[test]
    fn test_periodic_redetection() {
        let mut conf = Conf::default();
        conf.tracker.redetect_interval = 3;
        let mut h = Harness::new(conf, one_point(), vec![FlowStep::Shift(1., 0.)]);
        h.step();
        for _ in 0..3 {
            h.step();
        }
        assert_eq!(h.corners.calls(), 2);
        assert_eq!(h.tracker.keypoints(), one_point().as_slice());
        assert_eq!(h.tracker.state(), TrackingState::Tracking);
    }

    #[test]
    fn test_stop_clears_state() {
        let mut h = Harness::new(Conf::default(), one_point(), vec![FlowStep::Shift(4., 0.)]);
        h.step();
        h.step();
        h.tracker.stop();
        assert_eq!(h.tracker.state(), TrackingState::Idle);
        assert_eq!(h.tracker.pending_sums(), (0., 0.));
        assert!(h.tracker.heading().is_none());
        assert!(h.tracker.keypoints().is_empty());

        h.tracker.start();
        assert_eq!(h.step(), Outcome::Bootstrapped { keypoints: 1 });
    }

    #[test]
    fn test_dense_mode_heading() {
        let mut conf = Conf::default();
        conf.tracker.mode = TrackingMode::Dense;
        let mut h = Harness::with_dense(conf, one_point(), vec![], UniformFlow { dx: -3., dy: -3. });

        assert_eq!(h.step(), Outcome::Bootstrapped { keypoints: 0 });
        assert_eq!(h.corners.calls(), 0);
        let Outcome::Tracked {
            good,
            heading: Some(estimate),
        } = h.step()
        else {
            panic!("dense mode emits a heading every frame");
        };
        // 160x120 sampled every 32 px: 5 columns x 4 rows.
        assert_eq!(good, 20);
        assert_eq!(estimate.raw_deg, 135.);
        assert_eq!(estimate.heading_deg, 150.);
        assert_eq!(h.flow.calls(), 0);
    }

    #[test]
    fn test_dense_mode_still_scene() {
        let mut conf = Conf::default();
        conf.tracker.mode = TrackingMode::Dense;
        let mut h = Harness::with_dense(conf, one_point(), vec![], UniformFlow { dx: 0.2, dy: 0. });
        h.step();
        assert_eq!(
            h.step(),
            Outcome::Tracked {
                good: 0,
                heading: None
            }
        );
    }

    #[test]
    fn test_render_draws_heading_arrow() {
        let mut conf = Conf::default();
        conf.heading.update_interval = 1;
        conf.tracker.draw_tracks = false;
        let mut h = Harness::new(conf, one_point(), vec![FlowStep::Shift(5., 0.)]);
        h.step();
        h.step();

        let mut image = solid_frame(120, 160, 0.);
        h.tracker.render(&mut image).unwrap();
        // Center is (80, 60); a 0° arrow runs to (180, 60), clipped at the edge.
        assert_eq!(*image.at_2d::<Vec3b>(60, 120).unwrap(), Vec3b::from([0, 255, 0]));
        assert_eq!(*image.at_2d::<Vec3b>(60, 40).unwrap(), Vec3b::from([0, 0, 0]));
    }

    #[test]
    fn test_render_grayscale_frame_with_tracks() {
        let mut conf = Conf::default();
        conf.heading.update_interval = 1;
        conf.tracker.draw_tracks = true;
        let mut h = Harness::new(conf, one_point(), vec![FlowStep::Shift(5., 0.)]);
        let gray = || Mat::new_rows_cols_with_default(120, 160, CV_8UC1, Scalar::all(0.)).unwrap();
        assert_eq!(h.step_with(gray()), Outcome::Bootstrapped { keypoints: 1 });
        assert!(matches!(h.step_with(gray()), Outcome::Tracked { heading: Some(_), .. }));

        let mut image = gray();
        h.tracker.render(&mut image).unwrap();
        assert_eq!(image.typ(), CV_8UC3);
        assert_eq!(*image.at_2d::<Vec3b>(60, 150).unwrap(), Vec3b::from([0, 255, 0]));
        assert_eq!(*image.at_2d::<Vec3b>(60, 20).unwrap(), Vec3b::from([0, 0, 0]));
    }

    #[test]
    fn test_arrow_survives_track_overlay_failure() {
        let mut conf = Conf::default();
        conf.heading.update_interval = 1;
        let mut h = Harness::new(conf, one_point(), vec![FlowStep::Shift(5., 0.)]);
        h.step();
        h.step();

        // Mask is sized to 120x160, so compositing onto this frame fails.
        let mut image = solid_frame(240, 320, 0.);
        assert!(h.tracker.render(&mut image).is_err());
        assert_eq!(*image.at_2d::<Vec3b>(120, 220).unwrap(), Vec3b::from([0, 255, 0]));
    }
}

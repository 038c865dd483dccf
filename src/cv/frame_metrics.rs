use log::{debug, info};
use std::time::Instant;

/// Frame-rate telemetry anchored at the first observed frame.
pub struct FrameMetrics {
    start_time: Option<Instant>,
    last_frame_time: Option<Instant>,
    frames_elapsed: u64,
    fps_estimate: Option<f64>,
    current_fps: Option<f64>,
    min_fps: f64,
    max_fps: f64,
}

impl Default for FrameMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameMetrics {
    pub fn new() -> Self {
        debug!("Initializing frame metrics tracker");
        FrameMetrics {
            start_time: None,
            last_frame_time: None,
            frames_elapsed: 0,
            fps_estimate: None,
            current_fps: None,
            min_fps: f64::MAX,
            max_fps: 0.0,
        }
    }

    /// Records a frame finished at `now`.
    ///
    /// The first frame only sets the anchor; the estimate afterwards is
    /// `frames / seconds since the first frame`.
    pub fn update_at(&mut self, now: Instant) {
        let Some(start) = self.start_time else {
            self.start_time = Some(now);
            self.last_frame_time = Some(now);
            self.frames_elapsed = 1;
            return;
        };

        let since_start = now.duration_since(start).as_secs_f64();
        if since_start > 0.0 {
            self.fps_estimate = Some(self.frames_elapsed as f64 / since_start);
        }
        if let Some(last) = self.last_frame_time {
            let frame_time = now.duration_since(last).as_secs_f64();
            if frame_time > 0.0 {
                let fps = 1.0 / frame_time;
                self.current_fps = Some(fps);
                self.min_fps = self.min_fps.min(fps);
                self.max_fps = self.max_fps.max(fps);
            }
        }
        self.frames_elapsed += 1;
        self.last_frame_time = Some(now);

        if self.frames_elapsed % 100 == 0 {
            info!(
                "Performance stats after {} frames: Avg: {:.1} FPS, Min: {:.1} FPS, Max: {:.1} FPS",
                self.frames_elapsed,
                self.fps_estimate.unwrap_or(0.0),
                self.min_fps,
                self.max_fps
            );
        } else {
            debug!(
                "Frame #{}: {:.1} FPS",
                self.frames_elapsed,
                self.current_fps.unwrap_or(0.0)
            );
        }
    }

    /// Start-anchored estimate; `None` until a second frame is seen.
    pub fn fps_estimate(&self) -> Option<f64> {
        self.fps_estimate
    }

    pub fn min_fps(&self) -> Option<f64> {
        self.current_fps.map(|_| self.min_fps)
    }

    pub fn max_fps(&self) -> Option<f64> {
        self.current_fps.map(|_| self.max_fps)
    }

    pub fn frames_elapsed(&self) -> u64 {
        self.frames_elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_first_frame_has_no_estimate() {
        let mut metrics = FrameMetrics::new();
        assert_eq!(metrics.fps_estimate(), None);
        metrics.update_at(Instant::now());
        assert_eq!(metrics.fps_estimate(), None);
        assert_eq!(metrics.frames_elapsed(), 1);
    }

    #[test]
    fn test_fixed_interval_converges() {
        let mut metrics = FrameMetrics::new();
        let t0 = Instant::now();
        let interval = Duration::from_millis(40);
        for i in 0..50u32 {
            metrics.update_at(t0 + interval * i);
        }
        let fps = metrics.fps_estimate().unwrap();
        assert!((fps - 25.0).abs() < 1e-6, "fps {fps}");
        assert!((metrics.min_fps().unwrap() - 25.0).abs() < 1e-6);
        assert!((metrics.max_fps().unwrap() - 25.0).abs() < 1e-6);
    }

    #[test]
    fn test_min_max_track_jitter() {
        let mut metrics = FrameMetrics::new();
        let t0 = Instant::now();
        metrics.update_at(t0);
        metrics.update_at(t0 + Duration::from_millis(50));
        metrics.update_at(t0 + Duration::from_millis(60));
        assert!((metrics.min_fps().unwrap() - 20.0).abs() < 1e-6);
        assert!((metrics.max_fps().unwrap() - 100.0).abs() < 1e-6);
        // Two intervals over 60 ms.
        assert!((metrics.fps_estimate().unwrap() - 2.0 / 0.06).abs() < 1e-6);
    }
}

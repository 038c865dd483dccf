use std::path::Path;

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::VisionError;

pub const APP_NAME: &str = "flowdir";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Conf {
    pub version: u8,
    pub detector: DetectorParams,
    pub flow: FlowParams,
    pub dense: DenseParams,
    pub heading: HeadingParams,
    pub tracker: TrackerParams,
    pub recording: RecordingParams,
    pub display: DisplayParams,
}

/// Shi-Tomasi corner detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    pub max_corners: i32,
    pub quality_level: f64,
    pub min_distance: f64,
    pub block_size: i32,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            max_corners: 100,
            quality_level: 0.3,
            min_distance: 7.,
            block_size: 7,
        }
    }
}

/// Pyramidal Lucas-Kanade flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowParams {
    pub win_size: i32,
    pub max_level: i32,
    pub max_iterations: i32,
    pub epsilon: f64,
}

impl Default for FlowParams {
    fn default() -> Self {
        Self {
            win_size: 15,
            max_level: 2,
            max_iterations: 10,
            epsilon: 0.03,
        }
    }
}

/// Farneback dense flow and the grid it is sampled on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DenseParams {
    pub pyr_scale: f64,
    pub levels: i32,
    pub win_size: i32,
    pub iterations: i32,
    pub poly_n: i32,
    pub poly_sigma: f64,
    pub grid_step: i32,
}

impl Default for DenseParams {
    fn default() -> Self {
        Self {
            pyr_scale: 0.5,
            levels: 2,
            win_size: 40,
            iterations: 2,
            poly_n: 5,
            poly_sigma: 1.5,
            grid_step: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadingParams {
    /// Processed frames per aggregation window.
    pub update_interval: u32,
    /// Degrees; 0 disables quantization.
    pub angle_step: f64,
    /// Use atan2 instead of the single-quadrant atan.
    pub full_quadrant: bool,
    pub arrow_length: i32,
}

impl Default for HeadingParams {
    fn default() -> Self {
        Self {
            update_interval: 10,
            angle_step: 30.,
            full_quadrant: false,
            arrow_length: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    #[default]
    Sparse,
    Dense,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerParams {
    pub mode: TrackingMode,
    /// Tracking frames before keypoints are detected afresh.
    pub redetect_interval: u32,
    /// Consecutive lost frames before the tracker gives up and goes idle.
    pub max_consecutive_losses: u32,
    pub draw_tracks: bool,
}

impl Default for TrackerParams {
    fn default() -> Self {
        Self {
            mode: TrackingMode::Sparse,
            redetect_interval: 100,
            max_consecutive_losses: 30,
            draw_tracks: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingParams {
    pub codec: String,
    /// Container rate, independent of the measured capture rate.
    pub fps: f64,
}

impl Default for RecordingParams {
    fn default() -> Self {
        Self {
            codec: "MJPG".into(),
            fps: 30.,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayParams {
    pub window_name: String,
    pub mirror: bool,
}

impl Default for DisplayParams {
    fn default() -> Self {
        Self {
            window_name: APP_NAME.into(),
            mirror: false,
        }
    }
}

fn invalid(msg: impl Into<String>) -> VisionError {
    VisionError::InvalidConfig(msg.into())
}

impl Conf {
    pub fn validate(&self) -> Result<(), VisionError> {
        let d = &self.detector;
        if d.max_corners <= 0 {
            return Err(invalid("detector.max_corners must be positive"));
        }
        if !(d.quality_level > 0. && d.quality_level <= 1.) {
            return Err(invalid("detector.quality_level must be in (0, 1]"));
        }
        if d.min_distance < 0. || d.block_size <= 0 {
            return Err(invalid("detector.min_distance and block_size must be positive"));
        }

        let f = &self.flow;
        if f.win_size <= 0 || f.max_level < 0 {
            return Err(invalid("flow.win_size must be positive and max_level non-negative"));
        }
        if f.max_iterations <= 0 || f.epsilon <= 0. {
            return Err(invalid("flow termination criteria must be positive"));
        }

        let dn = &self.dense;
        if !(dn.pyr_scale > 0. && dn.pyr_scale < 1.) {
            return Err(invalid("dense.pyr_scale must be in (0, 1)"));
        }
        if dn.levels <= 0 || dn.win_size <= 0 || dn.iterations <= 0 || dn.grid_step <= 0 {
            return Err(invalid("dense sizes must be positive"));
        }

        let h = &self.heading;
        if h.update_interval == 0 {
            return Err(invalid("heading.update_interval must be at least 1"));
        }
        if !h.angle_step.is_finite() || h.angle_step < 0. {
            return Err(invalid("heading.angle_step must be a non-negative number"));
        }
        if h.arrow_length <= 0 {
            return Err(invalid("heading.arrow_length must be positive"));
        }

        if self.tracker.redetect_interval == 0 || self.tracker.max_consecutive_losses == 0 {
            return Err(invalid("tracker intervals must be at least 1"));
        }

        let codec = &self.recording.codec;
        if codec.len() != 4 || !codec.chars().all(|c| c.is_ascii_graphic() || c == ' ') {
            return Err(invalid(format!("recording.codec '{codec}' is not a FourCC")));
        }
        if !(self.recording.fps > 0.) {
            return Err(invalid("recording.fps must be positive"));
        }

        Ok(())
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Conf> {
    let cfg: Conf = match path {
        Some(path) => confy::load_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => confy::load(APP_NAME, None).context("Failed to load default config")?,
    };
    debug!("Loaded config: {:?}", cfg);
    cfg.validate()?;
    Ok(cfg)
}

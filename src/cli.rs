use std::path::PathBuf;

use clap::Parser;

use crate::conf::{Conf, TrackingMode};

#[derive(Parser, Debug)]
#[command(version, about = "Estimates and displays the dominant direction of motion in a video stream", long_about = None)]
pub struct Args {
    /// Read a file instead of using the camera
    #[arg(short, long)]
    pub video: Option<String>,

    /// Camera index to open when no video file is given
    #[arg(short, long, default_value_t = 0)]
    pub camera: i32,

    /// Load configuration from this file instead of the default location
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output debug information
    #[arg(short, long)]
    pub debug: bool,

    /// Sparse keypoint tracking or dense optical flow
    #[arg(short, long, value_enum)]
    pub mode: Option<TrackingMode>,

    /// Frames aggregated per heading update
    #[arg(short, long)]
    pub rate: Option<u32>,

    /// Snap headings to multiples of this many degrees (0 disables)
    #[arg(short, long)]
    pub step: Option<f64>,

    /// Video file to record to; recording starts immediately when given
    #[arg(long)]
    pub record: Option<PathBuf>,

    /// Append every heading to this CSV file
    #[arg(short, long)]
    pub export: Option<PathBuf>,

    /// Mirror the preview horizontally
    #[arg(long)]
    pub mirror: bool,

    /// Run without a window until the source is exhausted
    #[arg(long)]
    pub headless: bool,

    /// Start tracking on the first frame
    #[arg(short, long)]
    pub track: bool,
}

impl Args {
    /// Applies command-line overrides on top of the loaded config.
    pub fn apply(&self, conf: &mut Conf) {
        if let Some(mode) = self.mode {
            conf.tracker.mode = mode;
        }
        if let Some(rate) = self.rate {
            conf.heading.update_interval = rate;
        }
        if let Some(step) = self.step {
            conf.heading.angle_step = step;
        }
        if self.mirror {
            conf.display.mirror = true;
        }
    }
}

pub fn parse_args() -> Args {
    Args::parse()
}

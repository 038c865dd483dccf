use std::path::{Path, PathBuf};

use log::{debug, info};
use opencv::core::{Mat, Size};
use opencv::prelude::*;
use opencv::videoio::VideoWriter;

use crate::error::{Result, VisionError};

/// Four-character video codec code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codec([char; 4]);

impl Default for Codec {
    fn default() -> Self {
        Self(['M', 'J', 'P', 'G'])
    }
}

impl Codec {
    pub fn parse(code: &str) -> Result<Self> {
        let chars: Vec<char> = code.chars().collect();
        let chars: [char; 4] = chars
            .try_into()
            .map_err(|_| VisionError::InvalidConfig(format!("codec '{code}' is not a FourCC")))?;
        Ok(Self(chars))
    }

    pub fn chars(&self) -> [char; 4] {
        self.0
    }

    pub fn fourcc(&self) -> Result<i32> {
        let [a, b, c, d] = self.0;
        VideoWriter::fourcc(a, b, c, d).map_err(VisionError::capability)
    }
}

/// An open video container accepting frames.
pub trait VideoSink {
    fn write(&mut self, frame: &Mat) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

/// Opens video containers.
pub trait VideoSinkFactory {
    fn open(&mut self, filename: &Path, codec: Codec, fps: f64, size: Size)
    -> Result<Box<dyn VideoSink>>;
}

/// A recording between start and stop requests.
pub struct RecordingSession {
    filename: PathBuf,
    codec: Codec,
    size: Size,
    fps: f64,
    frames_written: u64,
    sink: Box<dyn VideoSink>,
}

impl RecordingSession {
    pub fn open(
        factory: &mut dyn VideoSinkFactory,
        filename: PathBuf,
        codec: Codec,
        fps: f64,
        size: Size,
    ) -> Result<Self> {
        let sink = factory.open(&filename, codec, fps, size)?;
        Ok(Self {
            filename,
            codec,
            size,
            fps,
            frames_written: 0,
            sink,
        })
    }

    pub fn write(&mut self, frame: &Mat) -> Result<()> {
        self.sink.write(frame)?;
        self.frames_written += 1;
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.sink.close()
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

/// Writes video files through OpenCV.
#[derive(Debug, Default)]
pub struct VideoFileSinks;

struct VideoFile {
    writer: VideoWriter,
}

impl VideoSinkFactory for VideoFileSinks {
    fn open(
        &mut self,
        filename: &Path,
        codec: Codec,
        fps: f64,
        size: Size,
    ) -> Result<Box<dyn VideoSink>> {
        let path = filename
            .to_str()
            .ok_or_else(|| VisionError::Recording("recording path is not UTF-8".into()))?;
        info!("Creating video writer for: {}", path);
        let writer = VideoWriter::new(path, codec.fourcc()?, fps, size, true)
            .map_err(VisionError::recording)?;
        if !writer.is_opened().map_err(VisionError::recording)? {
            return Err(VisionError::Recording(format!(
                "could not open video writer for {path}"
            )));
        }
        Ok(Box::new(VideoFile { writer }))
    }
}

impl VideoSink for VideoFile {
    fn write(&mut self, frame: &Mat) -> Result<()> {
        self.writer.write(frame).map_err(VisionError::capability)
    }

    fn close(&mut self) -> Result<()> {
        debug!("Releasing video writer");
        self.writer.release().map_err(VisionError::capability)
    }
}

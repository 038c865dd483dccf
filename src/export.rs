use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use csv::Writer;
use log::info;

use crate::conf::TrackingMode;
use crate::tracking::heading::HeadingEstimate;

const FLUSH_EVERY: u64 = 100;

/// Appends every emitted heading to a CSV file.
pub struct HeadingLog<W: Write> {
    writer: Writer<W>,
    rows: u64,
}

impl HeadingLog<File> {
    pub fn create(path: &Path) -> Result<Self> {
        info!("Creating heading CSV: {}", path.display());
        let writer = Writer::from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        Self::new(writer)
    }
}

impl<W: Write> HeadingLog<W> {
    pub fn new(mut writer: Writer<W>) -> Result<Self> {
        writer.write_record([
            "frame",
            "timestamp_ns",
            "mode",
            "raw_deg",
            "heading_deg",
            "sum_dx",
            "sum_dy",
            "samples",
        ])?;
        Ok(Self { writer, rows: 0 })
    }

    pub fn append(&mut self, frame: u64, estimate: &HeadingEstimate) -> Result<()> {
        let timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos();
        let mode = match estimate.mode {
            TrackingMode::Sparse => "sparse",
            TrackingMode::Dense => "dense",
        };
        self.writer.write_record(&[
            frame.to_string(),
            timestamp.to_string(),
            mode.to_string(),
            format!("{:.3}", estimate.raw_deg),
            format!("{:.3}", estimate.heading_deg),
            format!("{:.3}", estimate.sum_dx),
            format!("{:.3}", estimate.sum_dy),
            estimate.samples.to_string(),
        ])?;
        self.rows += 1;
        if self.rows % FLUSH_EVERY == 0 {
            self.writer.flush()?;
        }
        Ok(())
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush heading log: {}", e.error()))
    }
}

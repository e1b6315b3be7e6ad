/// Append-only detection log: `<timestamp> - Detected: <label>` per face.
///
/// The file is opened, appended and closed on every write.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};

pub const DEFAULT_LOG_FILE: &str = "detections.log";

#[derive(Debug, Clone)]
pub struct DetectionLog {
    path: PathBuf,
}

impl DetectionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, label: &str) -> io::Result<()> {
        self.record_at(label, Local::now())
    }

    pub fn record_at<Tz: TimeZone>(&self, label: &str, at: DateTime<Tz>) -> io::Result<()>
    where
        Tz::Offset: std::fmt::Display,
    {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", format_line(label, &at))
    }
}

impl Default for DetectionLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_FILE)
    }
}

fn format_line<Tz: TimeZone>(label: &str, at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{} - Detected: {}", at.format("%Y-%m-%d %H:%M:%S%.6f"), label)
}

//! Persisting face crops.
//!
//! Layout:
//! - unknown: `{unknown_dir}/{assigned_name}.{count} - {timestamp}.jpg`
//! - recognized: `{recognized_root}/{name}/{name}.{count} - {timestamp}.jpg`

use crate::types::Frame;
use chrono::NaiveDateTime;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Timestamp format embedded in capture file names.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("cannot create capture directory {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot write capture {path}: {source}")]
    Write {
        path: String,
        source: image::ImageError,
    },
}

/// Destination for face crops.
pub trait CaptureSink: Send {
    fn save_unknown(
        &mut self,
        name: &str,
        count: u32,
        at: NaiveDateTime,
        crop: &Frame,
    ) -> Result<PathBuf, CaptureError>;

    fn save_recognized(
        &mut self,
        name: &str,
        count: u32,
        at: NaiveDateTime,
        crop: &Frame,
    ) -> Result<PathBuf, CaptureError>;
}

pub fn capture_file_name(name: &str, count: u32, at: NaiveDateTime) -> String {
    format!(
        "{}.{count} - {}.jpg",
        path_safe(name),
        at.format(TIMESTAMP_FORMAT)
    )
}

/// Keep names from escaping their directory.
fn path_safe(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect()
}

/// Writes JPEG crops under two root directories.
pub struct DiskCaptureSink {
    unknown_dir: PathBuf,
    recognized_root: PathBuf,
}

impl DiskCaptureSink {
    pub fn new(unknown_dir: impl Into<PathBuf>, recognized_root: impl Into<PathBuf>) -> Self {
        Self {
            unknown_dir: unknown_dir.into(),
            recognized_root: recognized_root.into(),
        }
    }

    fn write(dir: &Path, file_name: String, crop: &Frame) -> Result<PathBuf, CaptureError> {
        std::fs::create_dir_all(dir).map_err(|source| CaptureError::CreateDir {
            path: dir.display().to_string(),
            source,
        })?;

        let path = dir.join(file_name);
        crop.to_rgb()
            .save_with_format(&path, ImageFormat::Jpeg)
            .map_err(|source| CaptureError::Write {
                path: path.display().to_string(),
                source,
            })?;

        tracing::info!(path = %path.display(), "face crop saved");
        Ok(path)
    }
}

impl CaptureSink for DiskCaptureSink {
    fn save_unknown(
        &mut self,
        name: &str,
        count: u32,
        at: NaiveDateTime,
        crop: &Frame,
    ) -> Result<PathBuf, CaptureError> {
        Self::write(&self.unknown_dir, capture_file_name(name, count, at), crop)
    }

    fn save_recognized(
        &mut self,
        name: &str,
        count: u32,
        at: NaiveDateTime,
        crop: &Frame,
    ) -> Result<PathBuf, CaptureError> {
        let dir = self.recognized_root.join(path_safe(name));
        Self::write(&dir, capture_file_name(name, count, at), crop)
    }
}

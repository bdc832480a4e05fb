//! Offline replay of recorded sessions.
//!
//! A recording is a JSON document with precomputed detections, so the
//! engine can run end to end without a camera or an inference runtime:
//!
//! ```json
//! {
//!   "gallery": { "a1b2.jpg": [0.01, 0.2, ...] },
//!   "frames": [
//!     {
//!       "image": "frames/000001.jpg",
//!       "timestamp": "2024-03-01T08:00:00",
//!       "faces": [
//!         { "bbox": { "x": 120, "y": 80, "width": 260, "height": 300 },
//!           "descriptor": [0.02, 0.19, ...] }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! Gallery descriptors are keyed by reference-image file name. Relative
//! frame image paths resolve against the recording's directory. The replay
//! clock jumps to each frame's timestamp as the frame is grabbed.

use crate::clock::{Clock, ManualClock, SystemClock};
use crate::engine::{Engine, FrameReport};
use crate::provider::{EmbeddingProvider, FrameSource, Grab, ProviderError};
use crate::types::{Descriptor, Detection, Frame};
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("cannot read recording {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed recording {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct RecordedFrame {
    image: PathBuf,
    timestamp: NaiveDateTime,
    #[serde(default)]
    faces: Vec<Detection>,
}

#[derive(Debug, Deserialize)]
struct Recording {
    #[serde(default)]
    gallery: HashMap<String, Vec<f32>>,
    #[serde(default)]
    frames: Vec<RecordedFrame>,
}

/// Everything needed to drive an engine from a recording.
pub struct Replay {
    pub provider: RecordedProvider,
    pub source: ReplaySource,
    /// Shared with `source`; hand a clone to the engine.
    pub clock: ManualClock,
}

impl Replay {
    pub fn open(path: &Path) -> Result<Self, ReplayError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ReplayError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let recording: Recording =
            serde_json::from_str(&raw).map_err(|source| ReplayError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();

        tracing::info!(
            path = %path.display(),
            gallery = recording.gallery.len(),
            frames = recording.frames.len(),
            "recording opened"
        );
        Ok(Self::from_recording(recording, base))
    }

    fn from_recording(recording: Recording, base: PathBuf) -> Self {
        let start = recording
            .frames
            .first()
            .map(|f| f.timestamp)
            .unwrap_or_else(|| SystemClock.now());
        let clock = ManualClock::new(start);

        let detections = recording
            .frames
            .iter()
            .enumerate()
            .map(|(seq, f)| (seq as u64, f.faces.clone()))
            .collect();
        let gallery = recording
            .gallery
            .into_iter()
            .map(|(file, values)| (file, Descriptor::new(values)))
            .collect();

        let frames = recording
            .frames
            .into_iter()
            .map(|f| (base.join(f.image), f.timestamp))
            .collect();

        Self {
            provider: RecordedProvider {
                gallery,
                detections,
            },
            source: ReplaySource {
                frames,
                next: 0,
                clock: clock.clone(),
            },
            clock,
        }
    }
}

/// Serves detections recorded ahead of time.
pub struct RecordedProvider {
    gallery: HashMap<String, Descriptor>,
    detections: HashMap<u64, Vec<Detection>>,
}

impl EmbeddingProvider for RecordedProvider {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, ProviderError> {
        Ok(self
            .detections
            .get(&frame.sequence())
            .cloned()
            .unwrap_or_default())
    }

    fn describe(
        &mut self,
        source: &Path,
        _image: &Frame,
    ) -> Result<Option<Descriptor>, ProviderError> {
        let file = source
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or_default();
        self.gallery
            .get(file)
            .cloned()
            .map(Some)
            .ok_or_else(|| ProviderError::NotRecorded(file.to_string()))
    }
}

/// Frames of a recording, in order. The sequence number is the frame's
/// index in the recording.
pub struct ReplaySource {
    frames: Vec<(PathBuf, NaiveDateTime)>,
    next: usize,
    clock: ManualClock,
}

impl ReplaySource {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for ReplaySource {
    fn grab(&mut self) -> Grab {
        let Some((path, timestamp)) = self.frames.get(self.next) else {
            return Grab::Ended;
        };
        let sequence = self.next as u64;
        self.next += 1;
        self.clock.set(*timestamp);

        match image::open(path) {
            Ok(img) => Grab::Frame(Frame::from_rgb(&img.to_rgb8(), sequence)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot decode recorded frame");
                Grab::Missed
            }
        }
    }
}

/// Pump `source` through `engine` until it ends, handing every report to
/// `on_report`. Returns the number of frames processed.
pub fn run<F>(engine: &mut Engine, source: &mut dyn FrameSource, mut on_report: F) -> usize
where
    F: FnMut(&Frame, &FrameReport),
{
    let mut processed = 0;
    loop {
        match source.grab() {
            Grab::Frame(frame) => {
                let report = engine.process_frame(&frame);
                on_report(&frame, &report);
                processed += 1;
            }
            Grab::Missed => continue,
            Grab::Ended => break,
        }
    }
    tracing::info!(frames = processed, "replay finished");
    processed
}

//! Seams to the outside world: where frames come from and who turns faces
//! into descriptors.

use crate::types::{Descriptor, Detection, Frame};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("no detections recorded for {0}")]
    NotRecorded(String),
}

/// Face detection + embedding capability.
pub trait EmbeddingProvider: Send {
    /// All faces in `frame`, each with its descriptor.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, ProviderError>;

    /// Descriptor of the first face in a gallery image, `None` if no face.
    ///
    /// `source` is the image file the frame was decoded from.
    fn describe(
        &mut self,
        source: &Path,
        image: &Frame,
    ) -> Result<Option<Descriptor>, ProviderError> {
        let _ = source;
        Ok(self.detect(image)?.into_iter().next().map(|d| d.descriptor))
    }
}

/// Outcome of asking a [`FrameSource`] for a frame.
pub enum Grab {
    Frame(Frame),
    /// No frame this cycle; try again later.
    Missed,
    /// The source will not produce any more frames.
    Ended,
}

pub trait FrameSource: Send {
    fn grab(&mut self) -> Grab;
}

use crate::notes::PitchFrame;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum PitchError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Lazy, time-ordered frame sequence. Finite.
pub type PitchFrames = Box<dyn Iterator<Item = PitchFrame> + Send>;

pub trait PitchTrackerPort: Send + Sync {
    /// Validates and opens the input up front; frames are produced on demand.
    fn track(&self, path: &Path) -> Result<PitchFrames, PitchError>;
}

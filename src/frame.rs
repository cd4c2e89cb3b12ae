use serde::Serialize;
use std::path::PathBuf;

/// A keyframe persisted to disk by the extractor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    /// Zero-based, contiguous position in the extracted sequence.
    pub number: usize,
    pub path: PathBuf,
    /// Seconds from the start of the source video.
    pub timestamp: f64,
    /// Dissimilarity score that caused the frame to be retained.
    /// The first sampled frame scores infinity, written as `null` in JSON.
    pub score: f64,
}

impl Frame {
    pub fn new(number: usize, path: PathBuf, timestamp: f64, score: f64) -> Self {
        Frame { number, path, timestamp, score }
    }
}

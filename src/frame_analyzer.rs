//! Frame Analysis Module
//!
//! Scores sampled frames against the last retained sample and reduces the
//! retained candidates to the requested number of keyframes.

use image::{imageops, GrayImage, RgbImage};
use log::{debug, info};
use std::time::Instant;

/// Default mean intensity difference (0-255 scale) a sample must exceed to be kept.
pub const FRAME_DIFFERENCE_THRESHOLD: f64 = 10.0;

/// Mean absolute intensity difference between two frames.
///
/// A missing previous frame makes the current one maximally novel, so the
/// result exceeds any threshold.
pub fn frame_difference(current: &GrayImage, previous: Option<&GrayImage>) -> f64 {
    let Some(previous) = previous else {
        return f64::INFINITY;
    };
    if current.dimensions() != previous.dimensions() {
        debug!(
            "Frame dimensions changed from {:?} to {:?}",
            previous.dimensions(),
            current.dimensions()
        );
        return f64::INFINITY;
    }

    let pixels = current.as_raw().len();
    if pixels == 0 {
        return 0.0;
    }
    let total: u64 = current
        .as_raw()
        .iter()
        .zip(previous.as_raw())
        .map(|(a, b)| u64::from(a.abs_diff(*b)))
        .sum();
    total as f64 / pixels as f64
}

/// A sampled frame that passed the difference threshold.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Index of the frame in the decoded stream.
    pub frame_index: u64,
    pub image: RgbImage,
    pub score: f64,
}

/// Holds the final results of the frame analysis.
pub struct AnalysisResult {
    /// Candidates in stream order.
    pub candidates: Vec<Candidate>,
    pub sampled: usize,
    pub differences: Vec<f64>,
}

/// A stateful analyzer that scores sampled frames one at a time.
pub struct FrameAnalyzer {
    threshold: f64,
    start_time: Instant,
    sampled: usize,
    last_kept: Option<GrayImage>,
    candidates: Vec<Candidate>,
    differences: Vec<f64>,
}

impl FrameAnalyzer {
    /// Creates a new analyzer with the given dissimilarity threshold.
    pub fn new(threshold: f64) -> Self {
        FrameAnalyzer {
            threshold,
            start_time: Instant::now(),
            sampled: 0,
            last_kept: None,
            candidates: Vec::new(),
            differences: Vec::new(),
        }
    }

    /// Scores a sampled frame against the last retained one and keeps it if
    /// it differs enough. Returns whether the frame was kept.
    pub fn process_frame(&mut self, frame_index: u64, frame: RgbImage) -> bool {
        self.sampled += 1;
        let gray = imageops::grayscale(&frame);
        let score = frame_difference(&gray, self.last_kept.as_ref());
        if score.is_finite() {
            self.differences.push(score);
        }

        if score <= self.threshold {
            return false; // Drop frame
        }

        debug!("Keeping frame {} with difference {:.2}", frame_index, score);
        self.candidates.push(Candidate {
            frame_index,
            image: frame,
            score,
        });
        self.last_kept = Some(gray);
        true
    }

    /// Finalizes the analysis and returns the collected candidates.
    pub fn finish(self) -> AnalysisResult {
        info!(
            "Frame analysis complete in {:.2?}. Sampled {}, kept {} candidates.",
            self.start_time.elapsed(),
            self.sampled,
            self.candidates.len()
        );

        AnalysisResult {
            candidates: self.candidates,
            sampled: self.sampled,
            differences: self.differences,
        }
    }
}

/// Reduces candidates to at most `target` keyframes.
///
/// The highest scores win first. If `max_frames` is tighter than that
/// selection, it is thinned evenly by position instead of by score. The
/// result is returned in stream order.
pub fn select_candidates(
    mut candidates: Vec<Candidate>,
    target: usize,
    max_frames: Option<usize>,
) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates.truncate(target);

    // A zero cap still yields one frame, like the target
    let mut selected = match max_frames.map(|max| max.max(1)) {
        Some(max) if max < candidates.len() => even_resample(candidates, max),
        _ => candidates,
    };
    selected.sort_by_key(|c| c.frame_index);
    selected
}

/// Picks `count` items spread evenly by position, keeping their relative order.
pub fn even_resample<T>(items: Vec<T>, count: usize) -> Vec<T> {
    if count >= items.len() {
        return items;
    }
    if count == 0 {
        return Vec::new();
    }
    let step = items.len() as f64 / count as f64;
    let picks: Vec<usize> = (0..count).map(|i| (i as f64 * step) as usize).collect();

    let mut picks = picks.into_iter().peekable();
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| {
            if picks.peek() == Some(&index) {
                picks.next();
                Some(item)
            } else {
                None
            }
        })
        .collect()
}

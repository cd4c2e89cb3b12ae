//! Frame Selection Module
//!
//! Chooses which screened frames get deep analysis. Priority favours frames
//! the cheap model flagged, then high importance scores, while every third of
//! the video is guaranteed some representation.

use crate::frame::Frame;
use crate::screening::ScreeningResult;
use log::debug;
use std::collections::BTreeSet;

/// The timeline is always split into this many equal-duration buckets.
pub const TEMPORAL_BUCKETS: usize = 3;

/// Added to the priority of frames flagged for deep analysis. Scores are
/// nominally 0-10, so a flagged frame outranks any unflagged one.
pub const DEEP_ANALYSIS_BONUS: i64 = 10;

#[derive(Debug, Clone)]
pub struct SelectionCandidate<'a> {
    pub index: usize,
    pub frame: &'a Frame,
    pub screening: &'a ScreeningResult,
    pub priority: i64,
}

/// Scores come straight from the model unclamped, so priority is widened to
/// hold any of them plus the bonus.
pub fn priority(screening: &ScreeningResult) -> i64 {
    let bonus = if screening.needs_deep_analysis { DEEP_ANALYSIS_BONUS } else { 0 };
    i64::from(screening.importance_score) + bonus
}

/// Bucket of a timestamp for a timeline of `total_duration` seconds.
pub fn bucket_of(timestamp: f64, total_duration: f64) -> usize {
    if total_duration <= 0.0 {
        return 0;
    }
    let width = total_duration / TEMPORAL_BUCKETS as f64;
    let bucket = (timestamp / width).floor();
    if bucket <= 0.0 {
        0
    } else {
        // The last frame lands exactly on the upper edge
        (bucket as usize).min(TEMPORAL_BUCKETS - 1)
    }
}

/// Picks at most `max_frames` indices for deep analysis, in frame order.
///
/// Each bucket first contributes its `max(1, max_frames / 3)` best frames,
/// then leftover budget goes to the best remaining frames overall. Ties keep
/// the earlier frame. `importance_threshold` is only reported, never used to
/// filter.
pub fn select_frames(
    frames: &[Frame],
    screening: &[ScreeningResult],
    importance_threshold: i32,
    max_frames: usize,
) -> Vec<usize> {
    if max_frames == 0 || frames.is_empty() {
        return Vec::new();
    }

    let mut candidates: Vec<SelectionCandidate<'_>> = frames
        .iter()
        .zip(screening)
        .enumerate()
        .map(|(index, (frame, screening))| SelectionCandidate {
            index,
            frame,
            screening,
            priority: priority(screening),
        })
        .collect();
    // Stable, so equal priorities stay in frame order
    candidates.sort_by(|a, b| b.priority.cmp(&a.priority));

    let total_duration = frames
        .iter()
        .map(|f| f.timestamp)
        .fold(0.0_f64, f64::max);
    let per_bucket = (max_frames / TEMPORAL_BUCKETS).max(1);

    let mut bucket_picks: Vec<&SelectionCandidate<'_>> = Vec::new();
    for bucket in 0..TEMPORAL_BUCKETS {
        bucket_picks.extend(
            candidates
                .iter()
                .filter(|c| bucket_of(c.frame.timestamp, total_duration) == bucket)
                .take(per_bucket),
        );
    }
    if bucket_picks.len() > max_frames {
        bucket_picks.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.index.cmp(&b.index)));
        bucket_picks.truncate(max_frames);
    }

    let mut selected: BTreeSet<usize> = bucket_picks.iter().map(|c| c.index).collect();
    for candidate in &candidates {
        if selected.len() >= max_frames {
            break;
        }
        selected.insert(candidate.index);
    }

    let above_threshold = candidates
        .iter()
        .filter(|c| c.screening.importance_score >= importance_threshold)
        .count();
    debug!(
        "Selected {} of {} frames ({} at or above importance {}, {} per bucket)",
        selected.len(),
        frames.len(),
        above_threshold,
        importance_threshold,
        per_bucket
    );

    selected.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture(scores: &[i32], flags: &[bool], timestamps: &[f64]) -> (Vec<Frame>, Vec<ScreeningResult>) {
        let frames = timestamps
            .iter()
            .enumerate()
            .map(|(i, &t)| Frame::new(i, PathBuf::from(format!("frame_{}.jpg", i)), t, 20.0))
            .collect();
        let screening = scores
            .iter()
            .zip(flags)
            .zip(timestamps)
            .enumerate()
            .map(|(i, ((&score, &flag), &t))| ScreeningResult {
                frame_number: i,
                timestamp: t,
                description: format!("frame {}", i),
                importance_score: score,
                needs_deep_analysis: flag,
                raw_response: String::new(),
                error: None,
            })
            .collect();
        (frames, screening)
    }

    fn evenly_spaced(scores: &[i32]) -> (Vec<Frame>, Vec<ScreeningResult>) {
        let timestamps: Vec<f64> = (0..scores.len()).map(|i| i as f64).collect();
        fixture(scores, &vec![false; scores.len()], &timestamps)
    }

    #[test]
    fn buckets_cover_each_third_then_fill_by_score() {
        let (frames, screening) = evenly_spaced(&[1, 9, 2, 8, 3, 7, 4, 6, 5, 0]);
        let selected = select_frames(&frames, &screening, 5, 4);
        // 9, 8 and 6 are the best of each third, 7 is the best left over
        assert_eq!(selected, vec![1, 3, 5, 7]);
    }

    #[test]
    fn last_frame_is_clamped_into_final_bucket() {
        assert_eq!(bucket_of(9.0, 9.0), 2);
        assert_eq!(bucket_of(0.0, 9.0), 0);
        assert_eq!(bucket_of(3.0, 9.0), 1);
        assert_eq!(bucket_of(5.0, 0.0), 0);
    }

    #[test]
    fn flagged_frame_outranks_any_unflagged_score() {
        let mut flags = vec![false; 10];
        flags[4] = true;
        let (frames, screening) = fixture(&[9; 10], &flags, &[0.0; 10]);
        // Zero duration puts everything in one bucket
        let mut screening = screening;
        screening[4].importance_score = 0;
        let selected = select_frames(&frames, &screening, 5, 1);
        assert_eq!(selected, vec![4]);
    }

    #[test]
    fn extreme_scores_do_not_overflow_priority() {
        let (frames, mut screening) = fixture(&[i32::MAX, 9, i32::MIN], &[true, false, true], &[0.0; 3]);
        assert_eq!(priority(&screening[0]), i64::from(i32::MAX) + DEEP_ANALYSIS_BONUS);
        assert_eq!(priority(&screening[2]), i64::from(i32::MIN) + DEEP_ANALYSIS_BONUS);
        assert_eq!(select_frames(&frames, &screening, 5, 1), vec![0]);

        screening[0].needs_deep_analysis = false;
        screening[1].needs_deep_analysis = true;
        assert_eq!(select_frames(&frames, &screening, 5, 2), vec![0, 1]);
    }

    #[test]
    fn every_populated_bucket_is_represented() {
        // The three best frames all sit in the last third
        let (frames, screening) = evenly_spaced(&[0, 1, 0, 1, 0, 1, 10, 10, 10, 10]);
        let selected = select_frames(&frames, &screening, 5, 3);
        assert_eq!(selected.len(), 3);
        let buckets: BTreeSet<usize> = selected
            .iter()
            .map(|&i| bucket_of(frames[i].timestamp, 9.0))
            .collect();
        assert_eq!(buckets.len(), 3);
    }

    #[test]
    fn budget_is_never_exceeded() {
        let scores = [3, 8, 1, 9, 4, 7, 2];
        let (frames, screening) = evenly_spaced(&scores);
        for max_frames in 0..10 {
            let selected = select_frames(&frames, &screening, 5, max_frames);
            assert!(selected.len() <= max_frames);
            assert!(selected.len() <= frames.len());
            assert!(selected.windows(2).all(|w| w[0] < w[1]));
        }
        assert_eq!(select_frames(&frames, &screening, 5, 100).len(), frames.len());
    }

    #[test]
    fn small_budget_keeps_best_bucket_picks() {
        let (frames, screening) = evenly_spaced(&[2, 0, 0, 5, 0, 0, 8, 0, 0]);
        assert_eq!(select_frames(&frames, &screening, 5, 1), vec![6]);
        assert_eq!(select_frames(&frames, &screening, 5, 2), vec![3, 6]);
    }

    #[test]
    fn threshold_does_not_filter() {
        let (frames, screening) = evenly_spaced(&[1, 1, 1]);
        assert_eq!(select_frames(&frames, &screening, 10, 3), vec![0, 1, 2]);
    }

    #[test]
    fn empty_input_selects_nothing() {
        assert!(select_frames(&[], &[], 5, 4).is_empty());
    }
}

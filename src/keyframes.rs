//! Keyframe Extraction Module
//!
//! Plans how densely to sample a video, runs the frame analyzer over the
//! decoded stream and persists the chosen keyframes to disk.

use crate::frame::Frame;
use crate::frame_analyzer::{self, Candidate, FrameAnalyzer};
use crate::video_processor::{self, VideoInfo};
use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use rayon::prelude::*;
use std::fs;
use std::ops::ControlFlow;
use std::path::Path;

/// Knobs controlling how many keyframes are extracted.
#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    pub frames_per_minute: u32,
    /// Only the first `duration` seconds of the video are considered. Zero or
    /// negative values mean no cap.
    pub duration: Option<f64>,
    /// Hard cap on the number of returned frames.
    pub max_frames: Option<usize>,
    pub difference_threshold: f64,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        ExtractionOptions {
            frames_per_minute: 60,
            duration: None,
            max_frames: None,
            difference_threshold: frame_analyzer::FRAME_DIFFERENCE_THRESHOLD,
        }
    }
}

/// How the decoded stream will be sampled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingPlan {
    pub fps: f64,
    /// Frames of the source that are considered, after the duration cap.
    pub total_frames: u64,
    pub target_frames: usize,
    pub sample_interval: u64,
}

impl SamplingPlan {
    /// Derives the target frame count and sampling interval for a video.
    ///
    /// Sampling is twice as dense as the target so the scoring step has
    /// enough candidates to choose from.
    pub fn new(info: &VideoInfo, options: &ExtractionOptions) -> Self {
        let mut duration = info.duration;
        let mut total_frames = info.frame_count;
        if let Some(cap) = options.duration.filter(|&cap| cap > 0.0) {
            duration = duration.min(cap);
            total_frames = total_frames.min((cap * info.fps).max(0.0) as u64);
        }

        let density_frames = (duration / 60.0 * f64::from(options.frames_per_minute)).max(0.0) as u64;
        let mut target = density_frames.min(total_frames);
        if let Some(max) = options.max_frames {
            target = target.min(max as u64);
        }
        let target_frames = target.max(1) as usize;
        let sample_interval = (total_frames / (target_frames as u64 * 2)).max(1);

        SamplingPlan {
            fps: info.fps,
            total_frames,
            target_frames,
            sample_interval,
        }
    }
}

/// Extracts keyframes from `video_path` and writes them to `output_dir`.
///
/// Frames are returned in time order, numbered from zero. Any failure to
/// open, decode or persist aborts the whole extraction.
pub fn extract_keyframes(
    video_path: &Path,
    output_dir: &Path,
    options: &ExtractionOptions,
) -> Result<Vec<Frame>> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create frames directory {:?}", output_dir))?;

    let info = video_processor::probe(video_path)?;
    let plan = SamplingPlan::new(&info, options);
    info!(
        "Sampling every {} frame(s) of {} targeting {} keyframes at {:.2} fps",
        plan.sample_interval, plan.total_frames, plan.target_frames, plan.fps
    );

    let pb = ProgressBar::new(plan.total_frames);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Sampling frames [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) [{elapsed_precise}<{eta}]")
            .unwrap()
            .progress_chars("##-"),
    );

    let mut analyzer = FrameAnalyzer::new(options.difference_threshold);
    let frame_handler = |index: u64, frame: RgbImage| -> Result<ControlFlow<()>> {
        if index >= plan.total_frames {
            return Ok(ControlFlow::Break(()));
        }
        analyzer.process_frame(index, frame);
        pb.set_position(index + 1);
        Ok(ControlFlow::Continue(()))
    };
    video_processor::process_frames_stream(video_path, plan.sample_interval, frame_handler)?;
    pb.finish_and_clear();

    let analysis = analyzer.finish();
    if !analysis.differences.is_empty() {
        let mean = analysis.differences.iter().sum::<f64>() / analysis.differences.len() as f64;
        debug!(
            "Mean difference across {} sampled frames: {:.2}",
            analysis.sampled, mean
        );
    }
    let selected = frame_analyzer::select_candidates(
        analysis.candidates,
        plan.target_frames,
        options.max_frames,
    );
    if selected.is_empty() {
        return Err(anyhow!("No decodable frames found in {:?}", video_path));
    }

    let frames = persist_keyframes(&selected, output_dir, plan.fps)?;

    info!(
        "Extracted {} frames from video (target was {})",
        frames.len(),
        plan.target_frames
    );
    Ok(frames)
}

/// Writes selected candidates as `frame_{n}.jpg`, numbered from zero in the
/// given order, with timestamps derived from their stream index.
///
/// Fails as a whole if any image cannot be written.
pub fn persist_keyframes(
    selected: &[Candidate],
    output_dir: &Path,
    fps: f64,
) -> Result<Vec<Frame>> {
    selected
        .par_iter()
        .enumerate()
        .map(|(number, candidate)| -> Result<Frame> {
            let frame_path = output_dir.join(format!("frame_{}.jpg", number));
            candidate
                .image
                .save(&frame_path)
                .with_context(|| format!("Failed to save frame {} to {:?}", number, frame_path))?;
            if !frame_path.exists() {
                return Err(anyhow!("Frame file {:?} was not created", frame_path));
            }
            let timestamp = candidate.frame_index as f64 / fps;
            Ok(Frame::new(number, frame_path, timestamp, candidate.score))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn info(fps: f64, frame_count: u64) -> VideoInfo {
        VideoInfo {
            fps,
            frame_count,
            duration: frame_count as f64 / fps,
        }
    }

    #[test]
    fn plan_targets_density_and_samples_twice_as_dense() {
        // Two minutes at 30 fps, 10 frames per minute
        let options = ExtractionOptions {
            frames_per_minute: 10,
            ..Default::default()
        };
        let plan = SamplingPlan::new(&info(30.0, 3600), &options);
        assert_eq!(plan.target_frames, 20);
        assert_eq!(plan.sample_interval, 90);
        assert_eq!(plan.total_frames, 3600);
    }

    #[test]
    fn plan_respects_duration_cap() {
        let options = ExtractionOptions {
            frames_per_minute: 60,
            duration: Some(30.0),
            ..Default::default()
        };
        let plan = SamplingPlan::new(&info(25.0, 25 * 600), &options);
        assert_eq!(plan.total_frames, 750);
        assert_eq!(plan.target_frames, 30);
        assert_eq!(plan.sample_interval, 12);
    }

    #[test]
    fn plan_respects_hard_cap() {
        let options = ExtractionOptions {
            frames_per_minute: 60,
            max_frames: Some(5),
            ..Default::default()
        };
        let plan = SamplingPlan::new(&info(30.0, 1800), &options);
        assert_eq!(plan.target_frames, 5);
        assert_eq!(plan.sample_interval, 180);
    }

    #[test]
    fn plan_never_targets_zero_frames() {
        // Shorter than one density step, and a zero cap
        let options = ExtractionOptions {
            frames_per_minute: 1,
            max_frames: Some(0),
            ..Default::default()
        };
        let plan = SamplingPlan::new(&info(30.0, 3), &options);
        assert_eq!(plan.target_frames, 1);
        assert_eq!(plan.sample_interval, 1);
    }

    #[test]
    fn plan_target_is_bounded_by_frame_count() {
        let options = ExtractionOptions {
            frames_per_minute: 6000,
            ..Default::default()
        };
        let plan = SamplingPlan::new(&info(1.0, 10), &options);
        assert_eq!(plan.target_frames, 10);
        assert_eq!(plan.sample_interval, 1);
    }

    #[test]
    fn non_positive_duration_means_no_cap() {
        for duration in [0.0, -5.0] {
            let options = ExtractionOptions {
                frames_per_minute: 10,
                duration: Some(duration),
                ..Default::default()
            };
            let plan = SamplingPlan::new(&info(30.0, 3600), &options);
            assert_eq!(plan.total_frames, 3600);
            assert_eq!(plan.target_frames, 20);
        }
    }

    fn candidate(frame_index: u64, shade: u8) -> Candidate {
        Candidate {
            frame_index,
            image: RgbImage::from_pixel(8, 8, Rgb([shade, shade, shade])),
            score: 30.0,
        }
    }

    #[test]
    fn persisted_frames_are_numbered_from_zero_in_time_order() {
        let dir = tempfile::tempdir().unwrap();
        let selected = vec![candidate(0, 0), candidate(45, 80), candidate(300, 200)];

        let frames = persist_keyframes(&selected, dir.path(), 30.0).unwrap();

        let numbers: Vec<usize> = frames.iter().map(|f| f.number).collect();
        assert_eq!(numbers, vec![0, 1, 2]);
        let timestamps: Vec<f64> = frames.iter().map(|f| f.timestamp).collect();
        assert_eq!(timestamps, vec![0.0, 1.5, 10.0]);
        assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
        for frame in &frames {
            assert_eq!(frame.path, dir.path().join(format!("frame_{}.jpg", frame.number)));
            assert!(frame.path.is_file());
            image::open(&frame.path).unwrap();
        }
    }

    #[test]
    fn persist_failure_aborts_every_frame() {
        let dir = tempfile::tempdir().unwrap();
        let blocked = dir.path().join("frames");
        std::fs::write(&blocked, b"not a directory").unwrap();

        let result = persist_keyframes(&[candidate(0, 0), candidate(10, 90)], &blocked, 25.0);
        assert!(result.is_err());
    }

    #[test]
    fn missing_video_is_a_fatal_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = extract_keyframes(
            &dir.path().join("missing.mp4"),
            &dir.path().join("frames"),
            &ExtractionOptions::default(),
        );
        assert!(result.is_err());
    }
}

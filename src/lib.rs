//! VideoNarrator - Core Library
//!
//! This file contains the primary logic for the application, orchestrating
//! keyframe extraction, frame analysis with vision models and the final
//! narrative reconstruction.

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

// Define modules for different functionalities
pub mod analyzer;
pub mod client;
pub mod config;
pub mod document_builder;
pub mod frame;
pub mod frame_analyzer;
pub mod keyframes;
pub mod ollama;
pub mod openai_api;
pub mod pipeline;
pub mod prompt;
pub mod screening;
pub mod selection;
pub mod transcript;
pub mod video_processor;

use config::Settings;
use keyframes::ExtractionOptions;
use pipeline::Pipeline;
use prompt::PromptLoader;
use transcript::Transcript;

/// Application configuration structure.
#[derive(Debug)]
pub struct Config {
    pub input_file: PathBuf,
    pub transcript_file: Option<PathBuf>,
    pub settings: Settings,
}

impl Config {
    pub fn frames_dir(&self) -> PathBuf {
        self.settings.output_dir.join("frames")
    }

    pub fn extraction_options(&self) -> ExtractionOptions {
        ExtractionOptions {
            frames_per_minute: self.settings.frames.per_minute,
            duration: self.settings.duration,
            max_frames: self.settings.max_frames,
            difference_threshold: self.settings.frames.difference_threshold,
        }
    }
}

/// The main function that orchestrates the video analysis process.
///
/// Extracted frames are removed afterwards unless `keep_frames` is set,
/// whether or not the run succeeded.
pub fn run(config: Config) -> Result<PathBuf> {
    info!("Initializing processing for {:?}", config.input_file);

    // 1. Setup Output Directory
    let output_dir = &config.settings.output_dir;
    fs::create_dir_all(output_dir).context("Failed to create output directory")?;
    let frames_dir = config.frames_dir();
    if frames_dir.exists() {
        fs::remove_dir_all(&frames_dir)
            .context("Failed to clear existing frames directory")?;
    }

    let result = analyze_video(&config, &frames_dir);

    if !config.settings.keep_frames {
        cleanup_frames(&frames_dir);
    }
    result
}

fn analyze_video(config: &Config, frames_dir: &Path) -> Result<PathBuf> {
    let settings = &config.settings;

    // 2. Initialize clients and prompts before any frame work
    let prompts = PromptLoader::new(settings.prompt_dir.as_deref());
    let client = settings.create_client(settings.clients.default)?;
    let screening_client = if settings.two_stage_analysis.enabled {
        Some(settings.create_client(settings.two_stage_analysis.small_model.client)?)
    } else {
        None
    };
    let pipeline = Pipeline::new(
        settings,
        &prompts,
        client.as_ref(),
        screening_client.as_deref(),
    )?;

    // 3. Load Transcript
    let transcript = match &config.transcript_file {
        Some(path) => match Transcript::load(path) {
            Ok(Some(transcript)) => Some(transcript),
            Ok(None) => {
                warn!("Transcript {:?} is empty. Proceeding with video analysis only.", path);
                None
            }
            Err(e) => {
                warn!("Could not load transcript: {:#}. Proceeding with video analysis only.", e);
                None
            }
        },
        None => None,
    };

    // 4. Extract Keyframes
    info!("Extracting frames from video using model {}...", settings.model());
    let frames = keyframes::extract_keyframes(
        &config.input_file,
        frames_dir,
        &config.extraction_options(),
    )
    .context("Keyframe extraction failed")?;

    // 5. Analyze Frames and Reconstruct
    if pipeline.is_two_stage() {
        info!("Running two-stage analysis on {} frames", frames.len());
    } else {
        info!("Analyzing {} frames...", frames.len());
    }
    let narration = pipeline.narrate(&frames, transcript.as_ref());

    // 6. Write the Analysis Document
    let document = document_builder::build_document(settings, frames, narration, transcript);
    let analysis_path = settings.output_dir.join("analysis.json");
    document_builder::write_document(&document, &analysis_path)?;

    match &document.transcript {
        Some(transcript) => info!("Transcript:\n{}", transcript.text),
        None => info!("No reliable transcript available"),
    }
    info!("Video Description:\n{}", document.video_description.response);

    Ok(analysis_path)
}

fn cleanup_frames(frames_dir: &Path) {
    if !frames_dir.exists() {
        return;
    }
    match fs::remove_dir_all(frames_dir) {
        Ok(()) => debug!("Cleaned up frames directory: {:?}", frames_dir),
        Err(e) => error!("Error during cleanup of {:?}: {}", frames_dir, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path, keep_frames: bool) -> Config {
        let mut settings = Settings::default();
        settings.output_dir = dir.join("out");
        settings.keep_frames = keep_frames;
        Config {
            input_file: dir.join("missing.mp4"),
            transcript_file: None,
            settings,
        }
    }

    #[test]
    fn failed_run_still_removes_frames() {
        // Extraction creates the frames directory before failing to open the video
        let kept = tempfile::tempdir().unwrap();
        let config = config_in(kept.path(), true);
        let frames_dir = config.frames_dir();
        assert!(run(config).is_err());
        assert!(frames_dir.is_dir());

        let cleaned = tempfile::tempdir().unwrap();
        let config = config_in(cleaned.path(), false);
        let frames_dir = config.frames_dir();
        assert!(run(config).is_err());
        assert!(!frames_dir.exists());
    }

    #[test]
    fn stale_frames_are_cleared_before_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), true);
        let frames_dir = config.frames_dir();
        fs::create_dir_all(&frames_dir).unwrap();
        fs::write(frames_dir.join("frame_0.jpg"), b"stale").unwrap();

        assert!(run(config).is_err());
        assert!(!frames_dir.join("frame_0.jpg").exists());
    }

    #[test]
    fn two_stage_without_screening_model_fails_before_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.output_dir = dir.path().join("out");
        settings.keep_frames = true;
        settings.two_stage_analysis.enabled = true;
        let config = Config {
            input_file: dir.path().join("missing.mp4"),
            transcript_file: None,
            settings,
        };
        let frames_dir = config.frames_dir();

        let err = run(config).unwrap_err();
        assert!(format!("{:#}", err).contains("screening model"));
        // Extraction would have created the frames directory
        assert!(!frames_dir.exists());
    }

    #[test]
    fn extraction_options_follow_settings() {
        let mut settings = Settings::default();
        settings.frames.per_minute = 12;
        settings.max_frames = Some(7);
        settings.duration = Some(90.0);
        let config = Config {
            input_file: PathBuf::from("in.mp4"),
            transcript_file: None,
            settings,
        };
        let options = config.extraction_options();
        assert_eq!(options.frames_per_minute, 12);
        assert_eq!(options.max_frames, Some(7));
        assert_eq!(options.duration, Some(90.0));
        assert_eq!(options.difference_threshold, 10.0);
        assert_eq!(config.frames_dir(), PathBuf::from("output").join("frames"));
    }
}

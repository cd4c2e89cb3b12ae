//! Document Builder Module
//!
//! Assembles the analysis document (`analysis.json`) from the extracted
//! frames and everything the models said about them.

use crate::analyzer::FrameAnalysis;
use crate::client::ModelResponse;
use crate::config::Settings;
use crate::frame::Frame;
use crate::pipeline::Narration;
use crate::screening::ScreeningResult;
use crate::transcript::Transcript;
use anyhow::{Context, Result};
use log::info;
use serde::Serialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct Metadata {
    pub client: String,
    pub model: String,
    pub frames_per_minute: u32,
    pub duration_processed: Option<f64>,
    pub frames_extracted: usize,
    pub frames_processed: usize,
    pub audio_language: Option<String>,
    pub transcription_successful: bool,
    pub two_stage_analysis_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub small_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub importance_threshold: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_frames_for_deep_analysis: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames_deep_analyzed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames_screened_only: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisDocument {
    pub metadata: Metadata,
    pub transcript: Option<Transcript>,
    pub frames: Vec<Frame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screening_results: Option<Vec<ScreeningResult>>,
    pub frame_analyses: Vec<FrameAnalysis>,
    pub video_description: ModelResponse,
}

/// Combines settings, frames and model output into the final document.
pub fn build_document(
    settings: &Settings,
    frames: Vec<Frame>,
    narration: Narration,
    transcript: Option<Transcript>,
) -> AnalysisDocument {
    let two_stage = narration.screening_results.is_some();
    let small_model = &settings.two_stage_analysis.small_model;
    let frames_processed = match settings.max_frames {
        Some(max) => frames.len().min(max),
        None => frames.len(),
    };

    let metadata = Metadata {
        client: settings.clients.default.as_str().to_string(),
        model: settings.model().to_string(),
        frames_per_minute: settings.frames.per_minute,
        duration_processed: settings.duration,
        frames_extracted: frames.len(),
        frames_processed,
        audio_language: transcript.as_ref().and_then(|t| t.language.clone()),
        transcription_successful: transcript.is_some(),
        two_stage_analysis_enabled: two_stage,
        small_model: two_stage.then(|| small_model.model.clone()),
        importance_threshold: two_stage.then_some(small_model.importance_threshold),
        max_frames_for_deep_analysis: two_stage.then_some(small_model.max_frames_for_deep_analysis),
        frames_deep_analyzed: two_stage.then_some(narration.frames_deep_analyzed),
        frames_screened_only: two_stage.then(|| narration.frames_screened_only()),
    };

    AnalysisDocument {
        metadata,
        transcript,
        frames,
        screening_results: narration.screening_results,
        frame_analyses: narration.frame_analyses,
        video_description: narration.video_description,
    }
}

/// Writes the document as pretty-printed JSON, creating parent directories.
pub fn write_document(document: &AnalysisDocument, output_path: &Path) -> Result<()> {
    if let Some(parent_dir) = output_path.parent() {
        fs::create_dir_all(parent_dir).context("Failed to create output directory")?;
    }
    let json = serde_json::to_string_pretty(document)
        .context("Failed to serialize analysis document")?;
    fs::write(output_path, json)
        .with_context(|| format!("Failed to write {:?}", output_path))?;
    info!("Wrote analysis to {:?}", output_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::fallback_analysis;
    use serde_json::Value;
    use std::path::PathBuf;

    fn frames(count: usize) -> Vec<Frame> {
        (0..count)
            .map(|i| Frame::new(i, PathBuf::from(format!("frames/frame_{}.jpg", i)), i as f64, 15.0))
            .collect()
    }

    #[test]
    fn single_stage_document_omits_two_stage_fields() {
        let settings = Settings::default();
        let narration = Narration {
            frame_analyses: vec![FrameAnalysis { response: "a".into(), ..Default::default() }],
            screening_results: None,
            frames_deep_analyzed: 1,
            video_description: ModelResponse::text("story"),
        };
        let document = build_document(&settings, frames(1), narration, None);
        let json = serde_json::to_value(&document).unwrap();

        assert_eq!(json["metadata"]["client"], "ollama");
        assert_eq!(json["metadata"]["two_stage_analysis_enabled"], false);
        assert!(json["metadata"].get("frames_deep_analyzed").is_none());
        assert!(json.get("screening_results").is_none());
        assert_eq!(json["transcript"], Value::Null);
        assert_eq!(json["video_description"]["response"], "story");
        assert_eq!(json["frames"][0]["path"], "frames/frame_0.jpg");
    }

    #[test]
    fn two_stage_document_counts_deep_and_screened_frames() {
        let mut settings = Settings::default();
        settings.two_stage_analysis.small_model.model = "moondream".into();
        settings.max_frames = Some(2);

        let screening: Vec<ScreeningResult> = frames(3)
            .iter()
            .map(|f| ScreeningResult {
                frame_number: f.number,
                timestamp: f.timestamp,
                description: "d".into(),
                importance_score: 1,
                needs_deep_analysis: false,
                raw_response: "raw".into(),
                error: None,
            })
            .collect();
        let narration = Narration {
            frame_analyses: screening.iter().map(fallback_analysis).collect(),
            screening_results: Some(screening),
            frames_deep_analyzed: 1,
            video_description: ModelResponse::text("story"),
        };
        let transcript = Transcript {
            text: "hi".into(),
            language: Some("en".into()),
            ..Default::default()
        };
        let document = build_document(&settings, frames(3), narration, Some(transcript));
        let json = serde_json::to_value(&document).unwrap();

        let metadata = &json["metadata"];
        assert_eq!(metadata["two_stage_analysis_enabled"], true);
        assert_eq!(metadata["small_model"], "moondream");
        assert_eq!(metadata["frames_deep_analyzed"], 1);
        assert_eq!(metadata["frames_screened_only"], 2);
        assert_eq!(metadata["frames_processed"], 2);
        assert_eq!(metadata["audio_language"], "en");
        assert_eq!(metadata["transcription_successful"], true);
        assert_eq!(json["screening_results"].as_array().unwrap().len(), 3);
        assert!(json["screening_results"][0].get("error").is_none());
        assert_eq!(json["frame_analyses"][2]["analyzed_by"], "screening_only");
    }

    #[test]
    fn write_document_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("analysis.json");
        let narration = Narration {
            frame_analyses: Vec::new(),
            screening_results: None,
            frames_deep_analyzed: 0,
            video_description: ModelResponse::text(""),
        };
        let document = build_document(&Settings::default(), Vec::new(), narration, None);
        write_document(&document, &path).unwrap();

        let written: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["metadata"]["frames_extracted"], 0);
    }
}

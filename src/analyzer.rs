//! Video Analysis Module
//!
//! Describes frames with the expensive vision model and folds the per-frame
//! notes into a single narrative of the whole video.

use crate::client::{GenerateRequest, LlmClient, ModelResponse};
use crate::frame::Frame;
use crate::prompt::{self, PromptKind, PromptLoader};
use crate::screening::{ScreeningResult, Screener};
use crate::selection;
use crate::transcript::Transcript;
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{Map, Value};

pub const FRAME_NUM_PREDICT: u32 = 300;
pub const VIDEO_NUM_PREDICT: u32 = 1000;

/// Which stage produced a frame analysis in a two-stage run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSource {
    DeepAnalysis,
    ScreeningOnly,
}

/// Notes about one frame, either from the vision model or synthesized from
/// its screening result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameAnalysis {
    pub response: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screening_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub importance_score: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyzed_by: Option<AnalysisSource>,
}

impl FrameAnalysis {
    fn error(frame: &Frame, message: &str) -> Self {
        FrameAnalysis {
            response: format!("Error analyzing frame {}: {}", frame.number, message),
            ..Default::default()
        }
    }

    fn deep(mut self, screening: &ScreeningResult) -> Self {
        self.screening_description = Some(screening.description.clone());
        self.importance_score = Some(screening.importance_score);
        self.analyzed_by = Some(AnalysisSource::DeepAnalysis);
        self
    }
}

impl From<ModelResponse> for FrameAnalysis {
    fn from(response: ModelResponse) -> Self {
        FrameAnalysis {
            response: response.response,
            extra: response.extra,
            ..Default::default()
        }
    }
}

/// Placeholder for a frame that was screened but not deep analyzed.
pub fn fallback_analysis(screening: &ScreeningResult) -> FrameAnalysis {
    let response = match &screening.error {
        Some(error) => format!("[Screening only] {}", error),
        None if screening.description.is_empty() => {
            "[Screening only] No description available".to_string()
        }
        None => format!("[Screening only] {}", screening.description),
    };
    FrameAnalysis {
        response,
        extra: Map::new(),
        screening_description: Some(screening.description.clone()),
        importance_score: Some(screening.importance_score),
        analyzed_by: Some(AnalysisSource::ScreeningOnly),
    }
}

/// Results of a two-stage pass, each list index-aligned with the frames.
#[derive(Debug, Clone)]
pub struct TwoStageOutcome {
    pub screening_results: Vec<ScreeningResult>,
    pub frame_analyses: Vec<FrameAnalysis>,
    /// Indices that were sent to the expensive model, in frame order.
    pub selected: Vec<usize>,
}

impl TwoStageOutcome {
    pub fn deep_analyzed(&self) -> usize {
        self.selected.len()
    }

    pub fn screened_only(&self) -> usize {
        self.frame_analyses.len() - self.selected.len()
    }
}

/// Budget for the two-stage pass.
#[derive(Debug, Clone, Copy)]
pub struct SelectionBudget {
    /// Reported alongside the results; never used to filter.
    pub importance_threshold: i32,
    pub max_frames_for_deep_analysis: usize,
}

pub struct VideoAnalyzer<C> {
    client: C,
    model: String,
    temperature: f32,
    user_prompt: String,
    frame_prompt: String,
    video_prompt: String,
}

impl<C: LlmClient> VideoAnalyzer<C> {
    pub fn new(
        client: C,
        model: &str,
        prompts: &PromptLoader,
        temperature: f32,
        user_prompt: &str,
    ) -> Result<Self> {
        Ok(VideoAnalyzer {
            client,
            model: model.to_string(),
            temperature,
            user_prompt: user_prompt.to_string(),
            frame_prompt: prompts.get(PromptKind::FrameAnalysis)?,
            video_prompt: prompts.get(PromptKind::VideoReconstruction)?,
        })
    }

    /// Analyzes one frame given the analyses made earlier in the same pass.
    ///
    /// Failures come back as an error-text analysis.
    pub fn analyze_frame(&self, frame: &Frame, previous: &[FrameAnalysis]) -> FrameAnalysis {
        if !frame.path.exists() {
            let message = format!(
                "Frame file does not exist: {:?} (frame {})",
                frame.path, frame.number
            );
            warn!("{}", message);
            return FrameAnalysis::error(frame, &message);
        }

        let prompt = self
            .frame_prompt
            .replace("{PREVIOUS_FRAMES}", &format_previous_analyses(previous))
            .replace("{prompt}", &prompt::format_user_prompt(&self.user_prompt));
        let prompt = format!(
            "{}\nThis is frame {} captured at {:.2} seconds.",
            prompt, frame.number, frame.timestamp
        );

        let request = GenerateRequest {
            prompt: &prompt,
            image: Some(&frame.path),
            model: &self.model,
            temperature: self.temperature,
            num_predict: FRAME_NUM_PREDICT,
        };
        match self.client.generate(&request) {
            Ok(response) => {
                debug!("Successfully analyzed frame {}", frame.number);
                FrameAnalysis::from(response)
            }
            Err(e) => {
                warn!("Error analyzing frame {}: {:#}", frame.number, e);
                FrameAnalysis::error(frame, &format!("{:#}", e))
            }
        }
    }

    /// Analyzes every frame in order with the expensive model.
    pub fn analyze_frames(&self, frames: &[Frame]) -> Vec<FrameAnalysis> {
        info!("Analyzing {} frames with {}...", frames.len(), self.model);
        let pb = analysis_progress(frames.len());

        let mut context: Vec<FrameAnalysis> = Vec::with_capacity(frames.len());
        for frame in frames {
            let analysis = self.analyze_frame(frame, &context);
            context.push(analysis);
            pb.inc(1);
        }

        pb.finish_and_clear();
        info!("Completed analyzing {} frames", context.len());
        context
    }

    /// Screens every frame, selects the most informative within budget and
    /// deep analyzes only those. Unselected frames get screening placeholders.
    pub fn analyze_two_stage<S: LlmClient>(
        &self,
        screener: &Screener<S>,
        frames: &[Frame],
        budget: SelectionBudget,
    ) -> TwoStageOutcome {
        let screening_results = screener.screen_all(frames);
        let selected = selection::select_frames(
            frames,
            &screening_results,
            budget.importance_threshold,
            budget.max_frames_for_deep_analysis,
        );
        info!(
            "Deep analyzing {} of {} frames with {}...",
            selected.len(),
            frames.len(),
            self.model
        );

        let pb = analysis_progress(selected.len());
        // Context only holds this pass's deep analyses
        let mut context: Vec<FrameAnalysis> = Vec::with_capacity(selected.len());
        let mut frame_analyses: Vec<FrameAnalysis> =
            screening_results.iter().map(fallback_analysis).collect();
        for &index in &selected {
            let analysis = self.analyze_frame(&frames[index], &context);
            context.push(analysis.clone());
            frame_analyses[index] = analysis.deep(&screening_results[index]);
            pb.inc(1);
        }
        pb.finish_and_clear();

        TwoStageOutcome {
            screening_results,
            frame_analyses,
            selected,
        }
    }

    /// Asks the model for one description of the whole video.
    pub fn reconstruct_video(
        &self,
        frame_analyses: &[FrameAnalysis],
        frames: &[Frame],
        transcript: Option<&Transcript>,
    ) -> ModelResponse {
        let frame_notes = frames
            .iter()
            .zip(frame_analyses)
            .enumerate()
            .map(|(i, (frame, analysis))| {
                format!("Frame {} ({:.2}s):\n{}", i, frame.timestamp, analysis.response)
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        let first_frame = frame_analyses
            .first()
            .map(|a| a.response.as_str())
            .unwrap_or_default();
        let transcript_text = transcript
            .map(|t| t.text.as_str())
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_default();

        let prompt = self
            .video_prompt
            .replace("{prompt}", &prompt::format_user_prompt(&self.user_prompt))
            .replace("{FRAME_NOTES}", &frame_notes)
            .replace("{FIRST_FRAME}", first_frame)
            .replace("{TRANSCRIPT}", transcript_text);

        let request = GenerateRequest {
            prompt: &prompt,
            image: None,
            model: &self.model,
            temperature: self.temperature,
            num_predict: VIDEO_NUM_PREDICT,
        };
        match self.client.generate(&request) {
            Ok(response) => {
                info!("Successfully reconstructed video description");
                response
            }
            Err(e) => {
                warn!("Error reconstructing video: {:#}", e);
                ModelResponse::text(format!("Error reconstructing video: {:#}", e))
            }
        }
    }
}

/// Renders earlier analyses for the `{PREVIOUS_FRAMES}` token.
fn format_previous_analyses(previous: &[FrameAnalysis]) -> String {
    previous
        .iter()
        .enumerate()
        .map(|(i, analysis)| format!("Frame {}\n{}\n", i, analysis.response))
        .collect::<Vec<_>>()
        .join("\n")
}

fn analysis_progress(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Analyzing frames [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap()
            .progress_chars("##-"),
    );
    pb
}

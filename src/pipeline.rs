//! Analysis Pipeline Module
//!
//! Wires the analyzer, and the screener when two-stage analysis is enabled,
//! into one pass over the extracted frames.

use crate::analyzer::{FrameAnalysis, SelectionBudget, VideoAnalyzer};
use crate::client::{LlmClient, ModelResponse};
use crate::config::Settings;
use crate::frame::Frame;
use crate::prompt::{PromptKind, PromptLoader};
use crate::screening::{ScreeningResult, Screener};
use crate::transcript::Transcript;
use anyhow::{anyhow, Result};
use log::info;

/// Everything the models produced for one video.
#[derive(Debug, Clone)]
pub struct Narration {
    pub frame_analyses: Vec<FrameAnalysis>,
    /// Present only for two-stage runs.
    pub screening_results: Option<Vec<ScreeningResult>>,
    pub frames_deep_analyzed: usize,
    pub video_description: ModelResponse,
}

impl Narration {
    pub fn frames_screened_only(&self) -> usize {
        self.frame_analyses.len() - self.frames_deep_analyzed
    }
}

pub struct Pipeline<'a> {
    analyzer: VideoAnalyzer<&'a dyn LlmClient>,
    screening: Option<(Screener<&'a dyn LlmClient>, SelectionBudget)>,
}

impl<'a> Pipeline<'a> {
    /// Builds the pipeline, checking two-stage preconditions up front.
    pub fn new(
        settings: &Settings,
        prompts: &PromptLoader,
        client: &'a dyn LlmClient,
        screening_client: Option<&'a dyn LlmClient>,
    ) -> Result<Self> {
        let analyzer = VideoAnalyzer::new(
            client,
            settings.model(),
            prompts,
            settings.clients.temperature,
            &settings.prompt,
        )?;

        let two_stage = &settings.two_stage_analysis;
        let screening = if two_stage.enabled {
            let screening_client = screening_client
                .ok_or_else(|| anyhow!("Two-stage analysis requires a screening client"))?;
            let template = prompts.get(PromptKind::FrameScreening)?;
            let screener = Screener::new(screening_client, &two_stage.small_model.model, &template)?;
            let budget = SelectionBudget {
                importance_threshold: two_stage.small_model.importance_threshold,
                max_frames_for_deep_analysis: two_stage.small_model.max_frames_for_deep_analysis,
            };
            Some((screener, budget))
        } else {
            None
        };

        Ok(Pipeline { analyzer, screening })
    }

    pub fn is_two_stage(&self) -> bool {
        self.screening.is_some()
    }

    /// Analyzes the frames and reconstructs the video description.
    pub fn narrate(&self, frames: &[Frame], transcript: Option<&Transcript>) -> Narration {
        let (frame_analyses, screening_results, frames_deep_analyzed) = match &self.screening {
            Some((screener, budget)) => {
                let outcome = self.analyzer.analyze_two_stage(screener, frames, *budget);
                info!(
                    "Two-stage analysis: {} deep analyzed, {} screened only",
                    outcome.deep_analyzed(),
                    outcome.screened_only()
                );
                let deep = outcome.deep_analyzed();
                (outcome.frame_analyses, Some(outcome.screening_results), deep)
            }
            None => {
                let analyses = self.analyzer.analyze_frames(frames);
                let deep = analyses.len();
                (analyses, None, deep)
            }
        };

        info!("Reconstructing video description...");
        let video_description = self
            .analyzer
            .reconstruct_video(&frame_analyses, frames, transcript);

        Narration {
            frame_analyses,
            screening_results,
            frames_deep_analyzed,
            video_description,
        }
    }
}

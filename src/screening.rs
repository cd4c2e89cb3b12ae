//! Screening Module
//!
//! First stage of two-stage analysis: a cheap model looks at every frame and
//! answers in three bracketed sections (a short description, an importance
//! score and whether the frame deserves deep analysis).

use crate::client::{GenerateRequest, LlmClient};
use crate::frame::Frame;
use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

/// Screening trades creativity for consistent, parseable answers.
pub const SCREENING_TEMPERATURE: f32 = 0.1;
pub const SCREENING_NUM_PREDICT: u32 = 150;

const DESCRIPTION_MARKER: &str = "【简要描述】";
const SCORE_MARKER: &str = "【重要性评分】";
const DEEP_ANALYSIS_MARKER: &str = "【是否需要深度分析】";
const FALLBACK_DESCRIPTION_CHARS: usize = 200;

static DESCRIPTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)【简要描述】[\s:：]*(.*?)\s*(?:【|$)").unwrap());
static SCORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"【重要性评分】[\s:：]*(-?\d+)").unwrap());
static DEEP_ANALYSIS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)【是否需要深度分析】[\s:：]*(是|否|yes|no|true|false)").unwrap());

/// The structured part of a screening reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScreeningVerdict {
    pub description: String,
    pub importance_score: i32,
    pub needs_deep_analysis: bool,
}

impl fmt::Display for ScreeningVerdict {
    /// Renders the verdict in the same sectioned form the model is asked for.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}\n{}{}\n{}{}",
            DESCRIPTION_MARKER,
            self.description,
            SCORE_MARKER,
            self.importance_score,
            DEEP_ANALYSIS_MARKER,
            if self.needs_deep_analysis { "是" } else { "否" }
        )
    }
}

/// Parses a screening reply, tolerating any missing or malformed section.
///
/// Each section is searched for independently. A missing description is
/// empty, a missing score is 0 and a missing flag is false. When no section
/// is found at all, the start of the raw text stands in as the description.
pub fn parse_screening_result(response: &str) -> ScreeningVerdict {
    let description = DESCRIPTION_RE
        .captures(response)
        .map(|caps| caps[1].trim().to_string());
    let score = SCORE_RE.captures(response).map(|caps| caps[1].parse::<i32>().unwrap_or(0));
    let flag = DEEP_ANALYSIS_RE.captures(response).map(|caps| {
        let answer = caps[1].to_lowercase();
        answer == "是" || answer == "yes" || answer == "true"
    });

    if description.is_none() && score.is_none() && flag.is_none() {
        return ScreeningVerdict {
            description: response.chars().take(FALLBACK_DESCRIPTION_CHARS).collect(),
            ..Default::default()
        };
    }

    ScreeningVerdict {
        description: description.unwrap_or_default(),
        importance_score: score.unwrap_or(0),
        needs_deep_analysis: flag.unwrap_or(false),
    }
}

/// Outcome of screening one frame. Failed screenings keep their slot with
/// zero importance and the error recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreeningResult {
    pub frame_number: usize,
    pub timestamp: f64,
    pub description: String,
    pub importance_score: i32,
    pub needs_deep_analysis: bool,
    pub raw_response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScreeningResult {
    fn from_verdict(frame: &Frame, verdict: ScreeningVerdict, raw_response: String) -> Self {
        ScreeningResult {
            frame_number: frame.number,
            timestamp: frame.timestamp,
            description: verdict.description,
            importance_score: verdict.importance_score,
            needs_deep_analysis: verdict.needs_deep_analysis,
            raw_response,
            error: None,
        }
    }

    fn failed(frame: &Frame, error: String) -> Self {
        ScreeningResult {
            frame_number: frame.number,
            timestamp: frame.timestamp,
            description: String::new(),
            importance_score: 0,
            needs_deep_analysis: false,
            raw_response: String::new(),
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Runs the cheap model over frames, one at a time.
pub struct Screener<C> {
    client: C,
    model: String,
    template: String,
}

impl<C: LlmClient> Screener<C> {
    /// Fails when the model or the screening template is missing, so the
    /// problem surfaces before any frame is sent.
    pub fn new(client: C, model: &str, template: &str) -> Result<Self> {
        if model.trim().is_empty() {
            bail!("Two-stage analysis requires a screening model");
        }
        if template.trim().is_empty() {
            bail!("Two-stage analysis requires a screening prompt template");
        }
        Ok(Screener {
            client,
            model: model.to_string(),
            template: template.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Screens a single frame. Never fails; errors are recorded in the result.
    pub fn screen(&self, frame: &Frame) -> ScreeningResult {
        if !frame.path.exists() {
            let error = format!(
                "Frame file does not exist: {:?} (frame {})",
                frame.path, frame.number
            );
            warn!("{}", error);
            return ScreeningResult::failed(frame, error);
        }

        let prompt = format!(
            "{}\nThis is frame {} captured at {:.2} seconds.",
            self.template, frame.number, frame.timestamp
        );
        let request = GenerateRequest {
            prompt: &prompt,
            image: Some(&frame.path),
            model: &self.model,
            temperature: SCREENING_TEMPERATURE,
            num_predict: SCREENING_NUM_PREDICT,
        };

        match self.client.generate(&request) {
            Ok(response) => {
                let verdict = parse_screening_result(&response.response);
                debug!(
                    "Screened frame {}: score {}, deep analysis {}",
                    frame.number, verdict.importance_score, verdict.needs_deep_analysis
                );
                ScreeningResult::from_verdict(frame, verdict, response.response)
            }
            Err(e) => {
                warn!("Error screening frame {}: {:#}", frame.number, e);
                ScreeningResult::failed(frame, format!("Error screening frame {}: {:#}", frame.number, e))
            }
        }
    }

    /// Screens every frame in order; the result is index-aligned with `frames`.
    pub fn screen_all(&self, frames: &[Frame]) -> Vec<ScreeningResult> {
        info!("Screening {} frames with {}...", frames.len(), self.model);
        let pb = ProgressBar::new(frames.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} Screening [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
                .unwrap()
                .progress_chars("##-"),
        );

        let results: Vec<ScreeningResult> = frames
            .iter()
            .map(|frame| {
                let result = self.screen(frame);
                pb.inc(1);
                result
            })
            .collect();

        pb.finish_and_clear();
        let failed = results.iter().filter(|r| r.is_error()).count();
        info!("Screened {} frames ({} failed).", results.len(), failed);
        results
    }
}

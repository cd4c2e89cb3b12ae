//! Prompt Template Module
//!
//! Templates ship inside the binary and can be overridden file by file from
//! a user prompt directory.

use anyhow::{Context, Result};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

/// The templates the pipeline uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Per-frame deep analysis. Tokens: `{PREVIOUS_FRAMES}`, `{prompt}`.
    FrameAnalysis,
    /// Whole-video narrative. Tokens: `{prompt}`, `{FRAME_NOTES}`,
    /// `{FIRST_FRAME}`, `{TRANSCRIPT}`.
    VideoReconstruction,
    /// Cheap-model triage with the three bracketed answer sections.
    FrameScreening,
}

impl PromptKind {
    pub fn file_name(self) -> &'static str {
        match self {
            PromptKind::FrameAnalysis => "frame_analysis.txt",
            PromptKind::VideoReconstruction => "describe.txt",
            PromptKind::FrameScreening => "frame_screening.txt",
        }
    }

    fn builtin(self) -> &'static str {
        match self {
            PromptKind::FrameAnalysis => include_str!("../prompts/frame_analysis.txt"),
            PromptKind::VideoReconstruction => include_str!("../prompts/describe.txt"),
            PromptKind::FrameScreening => include_str!("../prompts/frame_screening.txt"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PromptLoader {
    prompt_dir: Option<PathBuf>,
}

impl PromptLoader {
    pub fn new(prompt_dir: Option<&Path>) -> Self {
        PromptLoader {
            prompt_dir: prompt_dir.map(Path::to_path_buf),
        }
    }

    /// Loads a template, preferring the prompt directory over the built-in copy.
    pub fn get(&self, kind: PromptKind) -> Result<String> {
        if let Some(dir) = &self.prompt_dir {
            let path = dir.join(kind.file_name());
            if path.exists() {
                debug!("Loading {:?} prompt from {:?}", kind, path);
                let text = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read prompt file {:?}", path))?;
                return Ok(text.trim().to_string());
            }
        }
        Ok(kind.builtin().trim().to_string())
    }
}

/// Text substituted for `{prompt}`: the user's question, or nothing.
pub fn format_user_prompt(question: &str) -> String {
    if question.is_empty() {
        String::new()
    } else {
        format!("I want to know {}", question)
    }
}

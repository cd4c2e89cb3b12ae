//! Transcript Module
//!
//! Loads an audio transcript produced by an external speech-to-text tool.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub language: Option<String>,
}

impl Transcript {
    /// Reads a transcript from JSON, or from plain text for `.txt` files.
    ///
    /// Returns `None` when the transcript has no text.
    pub fn load(path: &Path) -> Result<Option<Transcript>> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read transcript {:?}", path))?;

        let is_text = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
        let transcript = if is_text {
            Transcript {
                text: raw,
                ..Default::default()
            }
        } else {
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse transcript {:?}", path))?
        };

        if transcript.text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(transcript))
    }
}

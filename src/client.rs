//! Model Client Module
//!
//! The single capability the pipeline needs from a language-model backend:
//! turn a prompt, and optionally an image, into text.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Request timeout applied to every backend call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Parameters of a single generation call.
#[derive(Debug, Clone, Copy)]
pub struct GenerateRequest<'a> {
    pub prompt: &'a str,
    pub image: Option<&'a Path>,
    pub model: &'a str,
    pub temperature: f32,
    /// Upper bound on generated tokens.
    pub num_predict: u32,
}

/// Text returned by a backend plus whatever extra fields it reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub response: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModelResponse {
    pub fn text(response: impl Into<String>) -> Self {
        ModelResponse {
            response: response.into(),
            extra: Map::new(),
        }
    }
}

/// A language-model backend able to answer prompts about images.
pub trait LlmClient {
    fn generate(&self, request: &GenerateRequest<'_>) -> Result<ModelResponse>;
}

impl<C: LlmClient + ?Sized> LlmClient for Box<C> {
    fn generate(&self, request: &GenerateRequest<'_>) -> Result<ModelResponse> {
        (**self).generate(request)
    }
}

impl<C: LlmClient + ?Sized> LlmClient for &C {
    fn generate(&self, request: &GenerateRequest<'_>) -> Result<ModelResponse> {
        (**self).generate(request)
    }
}

/// Reads an image file and returns it base64 encoded.
pub fn encode_image(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read image {:?}", path))?;
    Ok(BASE64.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_keeps_unknown_fields() {
        let parsed: ModelResponse = serde_json::from_value(serde_json::json!({
            "response": "A red car.",
            "model": "llava",
            "eval_count": 42
        }))
        .unwrap();
        assert_eq!(parsed.response, "A red car.");
        assert_eq!(parsed.extra.get("eval_count"), Some(&Value::from(42)));

        let round = serde_json::to_value(&parsed).unwrap();
        assert_eq!(round["model"], "llava");
    }

    #[test]
    fn encode_image_reads_file_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.jpg");
        fs::write(&path, b"abc").unwrap();
        assert_eq!(encode_image(&path).unwrap(), "YWJj");
        assert!(encode_image(&dir.path().join("missing.jpg")).is_err());
    }
}

//! Ollama backend for the `LlmClient` capability.

use crate::client::{self, GenerateRequest, LlmClient, ModelResponse};
use anyhow::{anyhow, Context, Result};
use log::debug;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_URL: &str = "http://localhost:11434";

pub struct OllamaClient {
    base_url: String,
    http: HttpClient,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, client::DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(OllamaClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn payload(&self, request: &GenerateRequest<'_>) -> Result<Value> {
        let mut payload = json!({
            "model": request.model,
            "prompt": request.prompt,
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.num_predict,
            },
        });
        if let Some(image) = request.image {
            payload["images"] = json!([client::encode_image(image)?]);
        }
        Ok(payload)
    }
}

impl LlmClient for OllamaClient {
    fn generate(&self, request: &GenerateRequest<'_>) -> Result<ModelResponse> {
        let endpoint = format!("{}/api/generate", self.base_url);
        let payload = self.payload(request)?;
        debug!("POST {} (model {})", endpoint, request.model);

        let response = self
            .http
            .post(&endpoint)
            .json(&payload)
            .send()
            .with_context(|| format!("Request to {} failed", endpoint))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(anyhow!("Ollama returned {}: {}", status, body));
        }

        let mut parsed: ModelResponse = response
            .json()
            .context("Failed to decode Ollama response")?;
        // The token context is large and useless outside the session.
        parsed.extra.remove("context");
        Ok(parsed)
    }
}

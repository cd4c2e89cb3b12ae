//! OpenAI-compatible chat completions backend for the `LlmClient` capability.

use crate::client::{self, GenerateRequest, LlmClient, ModelResponse};
use anyhow::{anyhow, Context, Result};
use log::debug;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Map, Value};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://openrouter.ai/api/v1";

pub struct OpenAiApiClient {
    api_key: String,
    api_url: String,
    http: HttpClient,
}

impl OpenAiApiClient {
    pub fn new(api_key: &str, api_url: &str) -> Result<Self> {
        Self::with_timeout(api_key, api_url, client::DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(api_key: &str, api_url: &str, timeout: Duration) -> Result<Self> {
        if api_key.is_empty() {
            return Err(anyhow!("An API key is required for the OpenAI-compatible client"));
        }
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(OpenAiApiClient {
            api_key: api_key.to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn payload(&self, request: &GenerateRequest<'_>) -> Result<Value> {
        let mut content = vec![json!({ "type": "text", "text": request.prompt })];
        if let Some(image) = request.image {
            let encoded = client::encode_image(image)?;
            content.push(json!({
                "type": "image_url",
                "image_url": { "url": format!("data:image/jpeg;base64,{encoded}") },
            }));
        }
        Ok(json!({
            "model": request.model,
            "messages": [{ "role": "user", "content": content }],
            "max_tokens": request.num_predict,
            "temperature": request.temperature,
        }))
    }
}

/// Pulls the first choice's message text out of a chat completion.
fn extract_response(parsed: Value) -> Result<ModelResponse> {
    let text = parsed
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Chat completion has no message content"))?
        .to_string();

    let mut extra = Map::new();
    for key in ["model", "usage"] {
        if let Some(value) = parsed.get(key) {
            extra.insert(key.to_string(), value.clone());
        }
    }
    Ok(ModelResponse { response: text, extra })
}

impl LlmClient for OpenAiApiClient {
    fn generate(&self, request: &GenerateRequest<'_>) -> Result<ModelResponse> {
        let endpoint = format!("{}/chat/completions", self.api_url);
        let payload = self.payload(request)?;
        debug!("POST {} (model {})", endpoint, request.model);

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .json(&payload)
            .send()
            .with_context(|| format!("Request to {} failed", endpoint))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(anyhow!("API returned {}: {}", status, body));
        }

        let parsed: Value = response
            .json()
            .context("Failed to decode chat completion")?;
        extract_response(parsed)
    }
}

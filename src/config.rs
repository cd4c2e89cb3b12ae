//! Configuration Module
//!
//! Settings come from an optional JSON file; every field has a default so a
//! partial file (or none at all) is valid. Command-line flags are applied on
//! top by the binary.

use crate::client::LlmClient;
use crate::frame_analyzer::FRAME_DIFFERENCE_THRESHOLD;
use crate::ollama::{self, OllamaClient};
use crate::openai_api::{self, OpenAiApiClient};
use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ClientKind {
    #[default]
    Ollama,
    OpenaiApi,
}

impl ClientKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ClientKind::Ollama => "ollama",
            ClientKind::OpenaiApi => "openai_api",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaSettings {
    pub url: String,
    pub model: String,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        OllamaSettings {
            url: ollama::DEFAULT_URL.to_string(),
            model: "llama3.2-vision".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        OpenAiSettings {
            api_key: String::new(),
            api_url: openai_api::DEFAULT_API_URL.to_string(),
            model: "meta-llama/llama-3.2-11b-vision-instruct".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientsSettings {
    pub default: ClientKind,
    pub temperature: f32,
    pub ollama: OllamaSettings,
    pub openai_api: OpenAiSettings,
}

impl Default for ClientsSettings {
    fn default() -> Self {
        ClientsSettings {
            default: ClientKind::Ollama,
            temperature: 0.2,
            ollama: OllamaSettings::default(),
            openai_api: OpenAiSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramesSettings {
    pub per_minute: u32,
    pub difference_threshold: f64,
}

impl Default for FramesSettings {
    fn default() -> Self {
        FramesSettings {
            per_minute: 60,
            difference_threshold: FRAME_DIFFERENCE_THRESHOLD,
        }
    }
}

/// The cheap model used for screening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmallModelSettings {
    pub client: ClientKind,
    /// Empty means not configured.
    pub model: String,
    pub importance_threshold: i32,
    pub max_frames_for_deep_analysis: usize,
}

impl Default for SmallModelSettings {
    fn default() -> Self {
        SmallModelSettings {
            client: ClientKind::Ollama,
            model: String::new(),
            importance_threshold: 5,
            max_frames_for_deep_analysis: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwoStageSettings {
    pub enabled: bool,
    pub small_model: SmallModelSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub clients: ClientsSettings,
    pub frames: FramesSettings,
    /// Seconds of video to process.
    pub duration: Option<f64>,
    pub max_frames: Option<usize>,
    pub keep_frames: bool,
    pub output_dir: PathBuf,
    pub prompt_dir: Option<PathBuf>,
    /// Question about the video injected into the prompts.
    pub prompt: String,
    pub two_stage_analysis: TwoStageSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            clients: ClientsSettings::default(),
            frames: FramesSettings::default(),
            duration: None,
            max_frames: None,
            keep_frames: false,
            output_dir: PathBuf::from("output"),
            prompt_dir: None,
            prompt: String::new(),
            two_stage_analysis: TwoStageSettings::default(),
        }
    }
}

impl Settings {
    /// Loads settings from a JSON file, or defaults when no file exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Settings::default());
        };
        if !path.exists() {
            info!("No configuration file at {:?}, using defaults", path);
            return Ok(Settings::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration {:?}", path))?;
        let settings: Settings = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid configuration in {:?}", path))?;
        debug!("Loaded configuration from {:?}", path);
        Ok(settings)
    }

    /// Model name of the given backend.
    pub fn model_for(&self, kind: ClientKind) -> &str {
        match kind {
            ClientKind::Ollama => &self.clients.ollama.model,
            ClientKind::OpenaiApi => &self.clients.openai_api.model,
        }
    }

    /// Model name of the default backend.
    pub fn model(&self) -> &str {
        self.model_for(self.clients.default)
    }

    pub fn create_client(&self, kind: ClientKind) -> Result<Box<dyn LlmClient>> {
        let client: Box<dyn LlmClient> = match kind {
            ClientKind::Ollama => Box::new(OllamaClient::new(&self.clients.ollama.url)?),
            ClientKind::OpenaiApi => Box::new(OpenAiApiClient::new(
                &self.clients.openai_api.api_key,
                &self.clients.openai_api.api_url,
            )?),
        };
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(Some(&dir.path().join("none.json"))).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.frames.per_minute, 60);
        assert_eq!(settings.frames.difference_threshold, 10.0);
        assert_eq!(settings.two_stage_analysis.small_model.max_frames_for_deep_analysis, 10);
        assert_eq!(settings.model(), "llama3.2-vision");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "clients": {"default": "openai_api", "openai_api": {"api_key": "k"}},
                "frames": {"per_minute": 10},
                "duration": 45.5,
                "two_stage_analysis": {"enabled": true, "small_model": {"model": "moondream"}}
            }"#,
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.clients.default, ClientKind::OpenaiApi);
        assert_eq!(settings.clients.openai_api.api_key, "k");
        assert_eq!(settings.clients.openai_api.api_url, openai_api::DEFAULT_API_URL);
        assert_eq!(settings.clients.temperature, 0.2);
        assert_eq!(settings.frames.per_minute, 10);
        assert_eq!(settings.frames.difference_threshold, 10.0);
        assert_eq!(settings.duration, Some(45.5));
        assert!(settings.two_stage_analysis.enabled);
        assert_eq!(settings.two_stage_analysis.small_model.model, "moondream");
        assert_eq!(settings.two_stage_analysis.small_model.importance_threshold, 5);
        assert_eq!(settings.model(), "meta-llama/llama-3.2-11b-vision-instruct");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"frames": {"per_minute": "many"}}"#).unwrap();
        assert!(Settings::load(Some(&path)).is_err());
    }

    #[test]
    fn openai_client_needs_a_key() {
        let settings = Settings::default();
        assert!(settings.create_client(ClientKind::OpenaiApi).is_err());
        assert!(settings.create_client(ClientKind::Ollama).is_ok());
    }
}

//! VideoNarrator - Main Application Entrypoint
//!
//! This file is responsible for parsing command-line arguments, initializing
//! the application environment (like logging), and dispatching the core
//! processing logic.

use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use videonarrator::config::{ClientKind, Settings};
use videonarrator::run;

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

/// Extracts keyframes from a video and describes it with vision language models.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input video file (e.g., talk.mp4)
    video_path: PathBuf,

    /// Path to a JSON configuration file
    #[arg(long, default_value = "config/config.json")]
    config: PathBuf,

    /// Directory to save the analysis and extracted frames
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Model backend to use
    #[arg(long, value_enum)]
    client: Option<ClientKind>,

    /// URL of the Ollama service
    #[arg(long)]
    ollama_url: Option<String>,

    /// API key for an OpenAI-compatible service
    #[arg(long)]
    api_key: Option<String>,

    /// Base URL of an OpenAI-compatible API
    #[arg(long)]
    api_url: Option<String>,

    /// Name of the vision model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Only process the first N seconds of the video
    #[arg(short, long)]
    duration: Option<f64>,

    /// Maximum number of frames to extract
    #[arg(long)]
    max_frames: Option<usize>,

    /// Target number of keyframes per minute of video
    #[arg(long)]
    frames_per_minute: Option<u32>,

    /// Keep extracted frames after analysis
    #[arg(long)]
    keep_frames: bool,

    /// Question to ask about the video
    #[arg(short, long)]
    prompt: Option<String>,

    /// Directory with prompt templates overriding the built-in ones
    #[arg(long)]
    prompt_dir: Option<PathBuf>,

    /// Transcript of the video's audio (JSON or plain text)
    #[arg(long)]
    transcript: Option<PathBuf>,

    /// Sampling temperature for the vision model
    #[arg(short, long)]
    temperature: Option<f32>,

    /// Screen frames with a small model and deep analyze only the most informative
    #[arg(long)]
    two_stage: bool,

    /// Model used for screening in two-stage analysis
    #[arg(long)]
    small_model: Option<String>,

    /// Maximum number of frames sent to the vision model in two-stage analysis
    #[arg(long)]
    max_deep_frames: Option<usize>,

    /// Logging verbosity level
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl Args {
    /// Overrides file settings with whatever was given on the command line.
    fn apply(self, settings: &mut Settings) {
        if let Some(output) = self.output {
            settings.output_dir = output;
        }
        if let Some(client) = self.client {
            settings.clients.default = client;
        }
        if let Some(url) = self.ollama_url {
            settings.clients.ollama.url = url;
        }
        if let Some(api_key) = self.api_key {
            settings.clients.openai_api.api_key = api_key;
        }
        if let Some(api_url) = self.api_url {
            settings.clients.openai_api.api_url = api_url;
        }
        if let Some(model) = self.model {
            match settings.clients.default {
                ClientKind::Ollama => settings.clients.ollama.model = model,
                ClientKind::OpenaiApi => settings.clients.openai_api.model = model,
            }
        }
        if let Some(temperature) = self.temperature {
            settings.clients.temperature = temperature;
        }
        if self.duration.is_some() {
            settings.duration = self.duration;
        }
        if self.max_frames.is_some() {
            settings.max_frames = self.max_frames;
        }
        if let Some(per_minute) = self.frames_per_minute {
            settings.frames.per_minute = per_minute;
        }
        if self.keep_frames {
            settings.keep_frames = true;
        }
        if let Some(prompt) = self.prompt {
            settings.prompt = prompt;
        }
        if self.prompt_dir.is_some() {
            settings.prompt_dir = self.prompt_dir;
        }
        if self.two_stage {
            settings.two_stage_analysis.enabled = true;
        }
        if let Some(small_model) = self.small_model {
            settings.two_stage_analysis.small_model.model = small_model;
        }
        if let Some(max) = self.max_deep_frames {
            settings.two_stage_analysis.small_model.max_frames_for_deep_analysis = max;
        }
    }
}

fn main() {
    let args = Args::parse();

    // 1. Initialize Logger
    let log_level = match args.log_level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    info!("Starting VideoNarrator...");

    let code = execute(args);
    std::process::exit(code);
}

fn execute(args: Args) -> i32 {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    // 2. Validate input path
    if !args.video_path.exists() {
        error!("Input file does not exist: {:?}", args.video_path);
        return 1;
    }

    // 3. Create a configuration object from the file and arguments
    let mut settings = match Settings::load(Some(&args.config)) {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            return 2;
        }
    };
    let input_file = args.video_path.clone();
    let transcript_file = args.transcript.clone();
    args.apply(&mut settings);

    let config = videonarrator::Config {
        input_file,
        transcript_file,
        settings,
    };

    // 4. Run the main application logic
    match run(config) {
        Ok(analysis_path) => {
            info!("Analysis complete. Results saved to {:?}", analysis_path);
            0
        }
        Err(e) => {
            error!("Application failed: {:#}", e);
            2
        }
    }
}

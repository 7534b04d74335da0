use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::outline::OutlineConfig;
use crate::pipeline::Stage;
use crate::translate::language;

/// Deepest outline level that still maps onto a Markdown heading below the root
pub const MAX_SUPPORTED_DEPTH: usize = 5;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Retry, timeout and translation policy for every job
    pub pipeline: PipelineConfig,

    /// Outline segmentation settings
    pub outline: OutlineConfig,

    /// Speech-to-text backend
    pub transcriber: TranscriberConfig,

    /// Translation service
    pub translator: TranslatorConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Language every mind map is produced in
    pub target_language: String,

    /// Total attempts per stage for transient failures
    pub max_retries: u32,

    /// Upper bound for a single collaborator call
    pub stage_timeout_seconds: u64,

    /// First backoff delay; doubled on every further attempt
    pub backoff_base_ms: u64,

    /// Backoff ceiling
    pub backoff_max_ms: u64,

    /// Stages that must never be attempted twice
    pub non_retryable_stages: Vec<Stage>,

    /// Characters sent to the translator per request
    pub translation_batch_chars: usize,

    /// How long finished jobs stay visible to `poll_status`
    pub job_retention_seconds: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_language: language::TARGET_LANGUAGE.to_string(),
            max_retries: 3,
            stage_timeout_seconds: 600,
            backoff_base_ms: 500,
            backoff_max_ms: 8000,
            non_retryable_stages: Vec::new(),
            translation_batch_chars: 2000,
            job_retention_seconds: 3600,
        }
    }
}

impl PipelineConfig {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_seconds)
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_seconds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriberBackend {
    /// Local openai-whisper command line tool
    #[default]
    Whisper,

    /// AWS Transcribe through an S3 bucket
    Aws,
}

impl std::fmt::Display for TranscriberBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscriberBackend::Whisper => write!(f, "whisper"),
            TranscriberBackend::Aws => write!(f, "aws"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriberConfig {
    pub backend: TranscriberBackend,
    pub whisper: WhisperConfig,
    pub aws: AwsTranscribeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhisperConfig {
    /// Executable name or path
    pub binary: String,

    /// Model passed through `--model`
    pub model: String,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            binary: "whisper".to_string(),
            model: "base".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsTranscribeConfig {
    /// AWS region
    pub region: String,

    /// S3 bucket for temporary audio storage
    pub s3_bucket: String,

    /// Optional S3 key prefix
    pub s3_key_prefix: Option<String>,

    /// Longest segment, in seconds, built from word-level results
    pub max_segment_length: f64,
}

impl Default for AwsTranscribeConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            s3_bucket: String::new(),
            s3_key_prefix: Some("video-mindmap/".to_string()),
            max_segment_length: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    /// OpenAI-compatible chat completions endpoint
    pub api_url: String,

    /// Model name sent with every request
    pub model: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Per-request HTTP timeout
    pub request_timeout_seconds: u64,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.siliconflow.cn/v1/chat/completions".to_string(),
            model: "Qwen/Qwen2.5-7B-Instruct".to_string(),
            api_key_env: "SILICON_API_KEY".to_string(),
            request_timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Parent directory for per-job working directories
    pub temp_dir: Option<PathBuf>,

    /// Where finished mind maps are written
    pub output_dir: PathBuf,

    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,

    /// Also write the untranslated transcript next to each mind map
    pub save_transcript: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            output_dir: PathBuf::from("./output"),
            max_concurrent_jobs: 3,
            save_transcript: false,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!("No config file at {}, using defaults", config_path.display());
            Ok(Self::default())
        }
    }

    /// Load and validate a specific configuration file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path).context("Failed to read config file")?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<PathBuf> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::write(&config_path, content).context("Failed to write config file")?;

        Ok(config_path)
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("video-mindmap").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let pipeline = &self.pipeline;
        if language::normalize(&pipeline.target_language) != language::TARGET_LANGUAGE {
            anyhow::bail!(
                "pipeline.target_language must be '{}', got '{}'",
                language::TARGET_LANGUAGE,
                pipeline.target_language
            );
        }
        if pipeline.max_retries == 0 {
            anyhow::bail!("pipeline.max_retries must be at least 1");
        }
        if pipeline.stage_timeout_seconds == 0 {
            anyhow::bail!("pipeline.stage_timeout_seconds must be at least 1");
        }
        if pipeline.backoff_max_ms < pipeline.backoff_base_ms {
            anyhow::bail!("pipeline.backoff_max_ms must not be below pipeline.backoff_base_ms");
        }
        if pipeline.translation_batch_chars == 0 {
            anyhow::bail!("pipeline.translation_batch_chars must be at least 1");
        }

        let outline = &self.outline;
        if !(1..=MAX_SUPPORTED_DEPTH).contains(&outline.max_depth) {
            anyhow::bail!(
                "outline.max_outline_depth must be between 1 and {}, got {}",
                MAX_SUPPORTED_DEPTH,
                outline.max_depth
            );
        }
        if outline.min_span_segments == 0 || outline.block_tokens == 0 {
            anyhow::bail!("outline.min_span_segments and outline.block_tokens must be at least 1");
        }
        if outline.max_span_segments < outline.min_span_segments {
            anyhow::bail!("outline.max_span_segments must not be below outline.min_span_segments");
        }
        if !outline.depth_cutoff.is_finite() {
            anyhow::bail!("outline.depth_cutoff must be a finite number");
        }
        if outline.max_title_chars == 0 {
            anyhow::bail!("outline.max_title_chars must be at least 1");
        }

        if self.transcriber.backend == TranscriberBackend::Aws {
            if self.transcriber.aws.s3_bucket.is_empty() {
                anyhow::bail!("AWS S3 bucket must be configured for the aws transcriber backend");
            }
            if self.transcriber.aws.region.trim().is_empty() {
                anyhow::bail!("AWS region must be configured for the aws transcriber backend");
            }
        }

        if self.app.max_concurrent_jobs == 0 {
            anyhow::bail!("app.max_concurrent_jobs must be at least 1");
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Target Language: {}", self.pipeline.target_language);
        println!("  Max Retries: {}", self.pipeline.max_retries);
        println!("  Stage Timeout: {}s", self.pipeline.stage_timeout_seconds);
        if !self.pipeline.non_retryable_stages.is_empty() {
            let stages: Vec<_> = self.pipeline.non_retryable_stages.iter().map(|s| s.to_string()).collect();
            println!("  Single-attempt Stages: {}", stages.join(", "));
        }
        println!("  Max Outline Depth: {}", self.outline.max_depth);
        println!("  Transcriber: {}", self.transcriber.backend);
        match self.transcriber.backend {
            TranscriberBackend::Whisper => {
                println!("  Whisper Model: {}", self.transcriber.whisper.model);
            }
            TranscriberBackend::Aws => {
                println!("  AWS Region: {}", self.transcriber.aws.region);
                println!("  S3 Bucket: {}", self.transcriber.aws.s3_bucket);
                if let Some(prefix) = &self.transcriber.aws.s3_key_prefix {
                    println!("  S3 Prefix: {}", prefix);
                }
            }
        }
        println!("  Translator: {} ({})", self.translator.model, self.translator.api_url);
        println!("  Output Directory: {}", self.app.output_dir.display());
        println!("  Save Transcript: {}", self.app.save_transcript);
    }
}

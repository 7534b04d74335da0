use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{Config, TranscriberBackend};
use crate::extractors::AudioHandle;
use crate::{Classify, ErrorKind};

pub mod aws;
pub mod processor;
pub mod whisper;

pub use aws::AwsTranscriber;
pub use whisper::WhisperTranscriber;

/// Language code used when a backend cannot tell what was spoken
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// Individual transcript segment with timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Start time in seconds
    pub start_time: f64,

    /// End time in seconds
    pub end_time: f64,

    /// Segment text
    pub text: String,

    /// Language the text is written in
    pub language: String,
}

impl TranscriptSegment {
    pub fn new(start_time: f64, end_time: f64, text: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            start_time,
            end_time,
            text: text.into(),
            language: language.into(),
        }
    }

    /// Same timing, different text (used once a segment has been translated)
    pub fn with_text(&self, text: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            start_time: self.start_time,
            end_time: self.end_time,
            text: text.into(),
            language: language.into(),
        }
    }
}

/// Ordered segments plus the language the backend detected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub segments: Vec<TranscriptSegment>,
    pub language: String,
}

impl Transcript {
    pub fn full_text(&self) -> String {
        self.segments
            .iter()
            .map(|segment| segment.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Audio duration covered by the transcript
    pub fn duration(&self) -> Option<f64> {
        self.segments.last().map(|segment| segment.end_time)
    }
}

/// Failures reported by a speech-to-text backend
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TranscribeError {
    #[error("Speech could not be recognized: {0}")]
    Unintelligible(String),

    #[error("Transcription quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Transcription network failure: {0}")]
    NetworkFailure(String),

    #[error("Transcription backend error: {0}")]
    Backend(String),
}

impl Classify for TranscribeError {
    fn kind(&self) -> ErrorKind {
        match self {
            TranscribeError::QuotaExceeded(_) | TranscribeError::NetworkFailure(_) => ErrorKind::Transient,
            TranscribeError::Unintelligible(_) | TranscribeError::Backend(_) => ErrorKind::PermanentInput,
        }
    }
}

/// Trait for speech-to-text backends
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe the audio file, optionally steering recognition with a language hint
    async fn transcribe(
        &self,
        audio: &AudioHandle,
        language_hint: Option<&str>,
    ) -> Result<Transcript, TranscribeError>;

    /// Get the name of this backend
    fn backend_name(&self) -> &'static str;
}

/// Build the transcriber selected in the configuration
pub async fn from_config(config: &Config) -> crate::Result<Arc<dyn Transcriber>> {
    let transcriber: Arc<dyn Transcriber> = match config.transcriber.backend {
        TranscriberBackend::Whisper => Arc::new(WhisperTranscriber::new(config.transcriber.whisper.clone())),
        TranscriberBackend::Aws => Arc::new(AwsTranscriber::new(config.transcriber.aws.clone()).await?),
    };

    tracing::debug!("Using {} transcription backend", transcriber.backend_name());
    Ok(transcriber)
}

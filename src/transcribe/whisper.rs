use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use super::processor::{normalize_segments, RawSegment};
use super::{TranscribeError, Transcriber, Transcript, UNKNOWN_LANGUAGE};
use crate::config::WhisperConfig;
use crate::extractors::AudioHandle;
use crate::translate::language;

/// JSON document written by `whisper --output_format json`
#[derive(Debug, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    segments: Vec<RawSegment>,
    language: Option<String>,
}

/// Local speech-to-text using the openai-whisper command line tool
pub struct WhisperTranscriber {
    config: WhisperConfig,
}

impl WhisperTranscriber {
    pub fn new(config: WhisperConfig) -> Self {
        Self { config }
    }

    fn classify_failure(stderr: &str) -> TranscribeError {
        let lowered = stderr.to_lowercase();
        let network = ["urlopen error", "connection", "timed out", "temporary failure"];

        if network.iter().any(|needle| lowered.contains(needle)) {
            TranscribeError::NetworkFailure(stderr.trim().to_string())
        } else {
            TranscribeError::Backend(stderr.trim().to_string())
        }
    }

    async fn read_output(path: &Path) -> Result<WhisperOutput, TranscribeError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            TranscribeError::Backend(format!("whisper output {} unreadable: {}", path.display(), e))
        })?;

        serde_json::from_str(&content)
            .map_err(|e| TranscribeError::Unintelligible(format!("malformed whisper output: {}", e)))
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(
        &self,
        audio: &AudioHandle,
        language_hint: Option<&str>,
    ) -> Result<Transcript, TranscribeError> {
        let output_dir = audio
            .path
            .parent()
            .map(|parent| parent.join("whisper"))
            .ok_or_else(|| TranscribeError::Backend("audio file has no parent directory".to_string()))?;

        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|e| TranscribeError::Backend(format!("cannot create {}: {}", output_dir.display(), e)))?;

        let mut command = Command::new(&self.config.binary);
        command
            .arg(&audio.path)
            .arg("--model")
            .arg(&self.config.model)
            .args(["--output_format", "json"])
            .arg("--output_dir")
            .arg(&output_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(hint) = language_hint {
            command.arg("--language").arg(language::normalize(hint));
        }

        tracing::debug!("Running {} on {}", self.config.binary, audio.path.display());

        let output = command.output().await.map_err(|e| {
            TranscribeError::Backend(format!("failed to run {}: {}", self.config.binary, e))
        })?;

        if !output.status.success() {
            return Err(Self::classify_failure(&String::from_utf8_lossy(&output.stderr)));
        }

        // whisper names its output after the input file stem
        let stem = audio
            .path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());
        let parsed = Self::read_output(&output_dir.join(format!("{}.json", stem))).await?;

        let detected = parsed
            .language
            .as_deref()
            .or(language_hint)
            .map(language::normalize)
            .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string());

        Ok(Transcript {
            segments: normalize_segments(parsed.segments, &detected),
            language: detected,
        })
    }

    fn backend_name(&self) -> &'static str {
        "whisper"
    }
}

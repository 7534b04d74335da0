//! Video Mindmap - turn online video and podcast media into Chinese mind maps
//!
//! The library downloads the audio of a YouTube, Bilibili or Xiaoyuzhou URL, transcribes it,
//! translates it to Chinese when needed, groups the transcript into a hierarchical outline and
//! writes that outline as a mind-map document (Markdown, XMind-style JSON or a markmap page).

pub mod cli;
pub mod config;
pub mod extractors;
pub mod outline;
pub mod output;
pub mod pipeline;
pub mod transcribe;
pub mod translate;
pub mod utils;

pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use extractors::{AcquirerRegistry, AudioHandle, MediaAcquirer};
pub use outline::{OutlineBuilder, OutlineConfig, OutlineNode};
pub use pipeline::{Job, JobRegistry, JobState, PipelineOrchestrator, PipelineResult, Stage};
pub use transcribe::{Transcriber, Transcript, TranscriptSegment};
pub use translate::Translator;

/// Result type used by the application layer
pub type Result<T> = anyhow::Result<T>;

/// How a stage failure should be treated by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// Network hiccups, rate limits and timeouts; worth another attempt
    Transient,

    /// Bad input or content that will fail the same way every time
    PermanentInput,

    /// The outline could not be encoded or written
    Output,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::PermanentInput => write!(f, "permanent"),
            ErrorKind::Output => write!(f, "output"),
        }
    }
}

/// Implemented by every collaborator error so the orchestrator can decide on retries
pub trait Classify {
    fn kind(&self) -> ErrorKind;

    fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

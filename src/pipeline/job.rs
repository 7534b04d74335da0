use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use super::error::FailureCause;
use crate::extractors::AudioHandle;
use crate::outline::OutlineNode;
use crate::transcribe::{Transcript, TranscriptSegment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Work steps of a job, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Acquiring,
    Transcribing,
    Translating,
    Outlining,
    Serializing,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Acquiring,
        Stage::Transcribing,
        Stage::Translating,
        Stage::Outlining,
        Stage::Serializing,
    ];

    /// Process exit code reported when a job fails in this stage
    pub fn exit_code(&self) -> i32 {
        match self {
            Stage::Acquiring => 2,
            Stage::Transcribing => 3,
            Stage::Translating => 4,
            Stage::Outlining => 5,
            Stage::Serializing => 6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Acquiring => "acquiring",
            Stage::Transcribing => "transcribing",
            Stage::Translating => "translating",
            Stage::Outlining => "outlining",
            Stage::Serializing => "serializing",
        }
    }

    /// State a job is in while this stage runs
    pub fn state(self) -> JobState {
        match self {
            Stage::Acquiring => JobState::Acquiring,
            Stage::Transcribing => JobState::Transcribing,
            Stage::Translating => JobState::Translating,
            Stage::Outlining => JobState::Outlining,
            Stage::Serializing => JobState::Serializing,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a job; `Succeeded` and `Failed` are terminal
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Created,
    Acquiring,
    Transcribing,
    Translating,
    Outlining,
    Serializing,
    Succeeded,
    Failed { stage: Stage, cause: FailureCause },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed { .. })
    }

    /// Stage currently running, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            JobState::Acquiring => Some(Stage::Acquiring),
            JobState::Transcribing => Some(Stage::Transcribing),
            JobState::Translating => Some(Stage::Translating),
            JobState::Outlining => Some(Stage::Outlining),
            JobState::Serializing => Some(Stage::Serializing),
            _ => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            JobState::Created => "created".to_string(),
            JobState::Succeeded => "succeeded".to_string(),
            JobState::Failed { stage, .. } => format!("failed while {}", stage),
            running => running.stage().map(|s| s.to_string()).unwrap_or_default(),
        }
    }

    fn allows(&self, next: &JobState) -> bool {
        use JobState::*;

        match (self, next) {
            (from, Failed { .. }) => !from.is_terminal(),
            (Created, Acquiring)
            | (Acquiring, Transcribing)
            | (Transcribing, Translating)
            | (Translating, Outlining)
            | (Outlining, Serializing)
            | (Serializing, Succeeded) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("Invalid job transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: String,
    pub to: String,
}

/// Results accumulated as the job moves through its stages
#[derive(Debug, Clone, Default)]
pub struct StageOutputs {
    pub audio: Option<AudioHandle>,
    pub transcript: Option<Transcript>,
    pub translated: Option<Vec<TranscriptSegment>>,
    pub translation_applied: bool,
    pub outline: Option<OutlineNode>,
    pub output_path: Option<PathBuf>,
}

/// One end-to-end conversion request
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub url: String,
    pub target_language: String,
    /// Passed to the transcriber; detection is automatic without it
    pub language_hint: Option<String>,
    pub state: JobState,
    pub outputs: StageOutputs,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(url: impl Into<String>, target_language: impl Into<String>, language_hint: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            url: url.into(),
            target_language: target_language.into(),
            language_hint,
            state: JobState::Created,
            outputs: StageOutputs::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, rejecting anything the state machine does not allow
    pub fn advance(&mut self, next: JobState) -> Result<(), InvalidTransition> {
        if !self.state.allows(&next) {
            return Err(InvalidTransition {
                from: self.state.label(),
                to: next.label(),
            });
        }

        tracing::debug!("Job {}: {} -> {}", self.id, self.state, next);
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(stage: Stage) -> JobState {
        JobState::Failed {
            stage,
            cause: FailureCause::Cancelled,
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut job = Job::new("https://youtu.be/x", "zh", None);
        for stage in Stage::ALL {
            job.advance(stage.state()).unwrap();
        }
        job.advance(JobState::Succeeded).unwrap();
        assert!(job.state.is_terminal());
        assert!(job.updated_at >= job.created_at);
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let mut job = Job::new("https://youtu.be/x", "zh", None);

        assert!(job.advance(JobState::Transcribing).is_err());
        assert!(job.advance(JobState::Succeeded).is_err());
        assert_eq!(job.state, JobState::Created);

        job.advance(JobState::Acquiring).unwrap();
        let err = job.advance(JobState::Outlining).unwrap_err();
        assert_eq!(err.from, "acquiring");
        assert_eq!(err.to, "outlining");
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut job = Job::new("https://youtu.be/x", "zh", None);
        job.advance(failed(Stage::Acquiring)).unwrap();

        assert!(job.advance(JobState::Acquiring).is_err());
        assert!(job.advance(failed(Stage::Transcribing)).is_err());
        assert!(job.advance(JobState::Succeeded).is_err());
    }

    #[test]
    fn test_failure_reachable_from_any_running_state() {
        for stage in Stage::ALL {
            let mut job = Job::new("https://youtu.be/x", "zh", None);
            for earlier in Stage::ALL.iter().take_while(|s| **s != stage) {
                job.advance(earlier.state()).unwrap();
            }
            job.advance(stage.state()).unwrap();
            assert!(job.advance(failed(stage)).is_ok());
        }
    }

    #[test]
    fn test_stage_serde_and_exit_codes() {
        let stages: Vec<Stage> = serde_yaml::from_str("[acquiring, translating]").unwrap();
        assert_eq!(stages, vec![Stage::Acquiring, Stage::Translating]);

        let codes: Vec<_> = Stage::ALL.iter().map(Stage::exit_code).collect();
        assert_eq!(codes, vec![2, 3, 4, 5, 6]);
    }
}

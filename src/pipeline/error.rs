use std::time::Duration;

use super::job::Stage;
use crate::extractors::AcquireError;
use crate::outline::EmptyTranscriptError;
use crate::output::SerializeError;
use crate::transcribe::TranscribeError;
use crate::translate::TranslateError;
use crate::{Classify, ErrorKind};

/// Typed reason a stage gave up
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FailureCause {
    #[error(transparent)]
    Acquire(#[from] AcquireError),

    #[error(transparent)]
    Transcribe(#[from] TranscribeError),

    #[error(transparent)]
    Translate(#[from] TranslateError),

    #[error(transparent)]
    Outline(#[from] EmptyTranscriptError),

    #[error(transparent)]
    Serialize(#[from] SerializeError),

    #[error("Stage timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("Job was cancelled")]
    Cancelled,
}

impl Classify for FailureCause {
    fn kind(&self) -> ErrorKind {
        match self {
            FailureCause::Acquire(err) => err.kind(),
            FailureCause::Transcribe(err) => err.kind(),
            FailureCause::Translate(err) => err.kind(),
            FailureCause::Outline(err) => err.kind(),
            FailureCause::Serialize(err) => err.kind(),
            FailureCause::Timeout(_) => ErrorKind::Transient,
            FailureCause::Cancelled => ErrorKind::PermanentInput,
        }
    }
}

/// Terminal failure of a job
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("{stage} failed after {attempts} attempt(s): {cause}")]
pub struct StageFailure {
    pub stage: Stage,
    pub cause: FailureCause,
    /// Kind after retry handling; exhausted transient failures report as permanent
    pub kind: ErrorKind,
    pub attempts: u32,
}

impl StageFailure {
    pub fn new(stage: Stage, cause: impl Into<FailureCause>, attempts: u32) -> Self {
        let cause = cause.into();
        Self {
            stage,
            kind: cause.kind(),
            cause,
            attempts,
        }
    }

    pub fn cancelled(stage: Stage, attempts: u32) -> Self {
        Self::new(stage, FailureCause::Cancelled, attempts)
    }

    /// Retries ran out; the last error is kept but no longer counts as transient
    pub fn exhausted(stage: Stage, cause: FailureCause, attempts: u32) -> Self {
        Self {
            stage,
            cause,
            kind: ErrorKind::PermanentInput,
            attempts,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cause == FailureCause::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cause_kinds() {
        assert_eq!(FailureCause::Timeout(Duration::from_secs(1)).kind(), ErrorKind::Transient);
        assert_eq!(FailureCause::Cancelled.kind(), ErrorKind::PermanentInput);
        assert_eq!(
            FailureCause::from(TranscribeError::QuotaExceeded("slow down".into())).kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            FailureCause::from(SerializeError::Io("disk full".into())).kind(),
            ErrorKind::Output
        );
    }

    #[test]
    fn test_exhausted_is_permanent() {
        let cause = FailureCause::from(AcquireError::NetworkFailure("reset".into()));
        let failure = StageFailure::exhausted(Stage::Acquiring, cause.clone(), 3);

        assert_eq!(failure.kind, ErrorKind::PermanentInput);
        assert_eq!(failure.cause, cause);
        assert!(failure.to_string().contains("acquiring failed after 3 attempt(s)"));
    }
}

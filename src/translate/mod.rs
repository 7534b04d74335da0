use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::{Classify, ErrorKind};

pub mod language;
pub mod llm;

pub use language::TARGET_LANGUAGE;
pub use llm::LlmTranslator;

/// Failures reported by a translation backend
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TranslateError {
    #[error("Translation quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Translation network failure: {0}")]
    NetworkFailure(String),

    #[error("Translation service rejected the request: {0}")]
    Unauthorized(String),

    #[error("Translation service returned an invalid response: {0}")]
    InvalidResponse(String),
}

impl Classify for TranslateError {
    fn kind(&self) -> ErrorKind {
        match self {
            TranslateError::QuotaExceeded(_) | TranslateError::NetworkFailure(_) => {
                ErrorKind::Transient
            }
            TranslateError::Unauthorized(_) | TranslateError::InvalidResponse(_) => {
                ErrorKind::PermanentInput
            }
        }
    }
}

/// Translates transcript text into the target language
///
/// Implementations must return the input unchanged when `source_language` and
/// `target_language` name the same language.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String, TranslateError>;
}

/// Build the translator described by the configuration
pub fn from_config(config: &Config) -> crate::Result<Arc<dyn Translator>> {
    Ok(Arc::new(LlmTranslator::new(config.translator.clone())?))
}

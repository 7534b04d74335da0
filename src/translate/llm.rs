use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{language, TranslateError, Translator};
use crate::config::TranslatorConfig;

/// Error code the SiliconFlow API uses for an exhausted account balance
const INSUFFICIENT_BALANCE_CODE: i64 = 30011;

const SYSTEM_PROMPT: &str = "You are a professional translator. Translate accurately and fluently, \
keep technical terms precise and keep the context coherent.";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    temperature: f32,
    top_p: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Error payload; only the vendor code is of interest
#[derive(Deserialize)]
struct ApiErrorBody {
    code: Option<i64>,
}

/// Translator backed by an OpenAI-compatible chat completions endpoint
pub struct LlmTranslator {
    client: reqwest::Client,
    config: TranslatorConfig,
}

impl LlmTranslator {
    pub fn new(config: TranslatorConfig) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .context("Failed to build HTTP client for translation")?;

        Ok(Self { client, config })
    }

    fn api_key(&self) -> Result<String, TranslateError> {
        std::env::var(&self.config.api_key_env)
            .map(|key| key.trim().to_string())
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                TranslateError::Unauthorized(format!(
                    "{} environment variable is not set",
                    self.config.api_key_env
                ))
            })
    }

    fn build_prompt(text: &str, source_language: &str, target_language: &str) -> String {
        format!(
            "Translate the following {} text into {}. Keep exactly one output line for every \
             input line, in the same order. Output only the translation.\n\n{}",
            language::display_name(source_language),
            language::display_name(target_language),
            text
        )
    }

    fn classify_status(status: StatusCode, body: &str) -> TranslateError {
        let code = serde_json::from_str::<ApiErrorBody>(body)
            .ok()
            .and_then(|error| error.code);

        match status {
            StatusCode::UNAUTHORIZED => {
                TranslateError::Unauthorized("API authentication failed, check the API key".to_string())
            }
            StatusCode::FORBIDDEN if code == Some(INSUFFICIENT_BALANCE_CODE) => {
                TranslateError::Unauthorized("account balance is insufficient".to_string())
            }
            StatusCode::FORBIDDEN => {
                TranslateError::Unauthorized("API access denied, check the key permissions".to_string())
            }
            StatusCode::TOO_MANY_REQUESTS => {
                TranslateError::QuotaExceeded("rate limit reached".to_string())
            }
            status if status.is_server_error() => {
                TranslateError::NetworkFailure(format!("server error: HTTP {}", status))
            }
            status => TranslateError::InvalidResponse(format!("unexpected HTTP {}", status)),
        }
    }

    /// Translated text from a successful completion body
    fn parse_completion(body: &str) -> Result<String, TranslateError> {
        let response: ChatResponse = serde_json::from_str(body)
            .map_err(|e| TranslateError::InvalidResponse(format!("malformed JSON: {}", e)))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| TranslateError::InvalidResponse("missing choices[0].message.content".to_string()))
    }
}

fn classify_request_error(err: reqwest::Error) -> TranslateError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        TranslateError::NetworkFailure(err.to_string())
    } else {
        TranslateError::InvalidResponse(err.to_string())
    }
}

#[async_trait]
impl Translator for LlmTranslator {
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String, TranslateError> {
        if language::same_language(source_language, target_language) || text.trim().is_empty() {
            return Ok(text.to_string());
        }

        let api_key = self.api_key()?;

        tracing::debug!(
            "Sending {} characters to {} using model {}",
            text.chars().count(),
            self.config.api_url,
            self.config.model
        );

        let prompt = Self::build_prompt(text, source_language, target_language);
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            stream: false,
            temperature: 0.3,
            top_p: 0.7,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(api_key)
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        let body = response.text().await.map_err(classify_request_error)?;

        if !status.is_success() {
            return Err(Self::classify_status(status, &body));
        }

        Self::parse_completion(&body)
    }
}

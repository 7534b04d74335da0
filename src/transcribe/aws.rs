use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_transcribe::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_transcribe::types::{
    LanguageCode, Media, MediaFormat, TranscriptionJob, TranscriptionJobStatus,
};
use aws_sdk_transcribe::Client as TranscribeClient;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

use super::processor::{SegmentGrouper, TimedWord};
use super::{TranscribeError, Transcriber, Transcript, UNKNOWN_LANGUAGE};
use crate::config::AwsTranscribeConfig;
use crate::extractors::{AudioFormat, AudioHandle};
use crate::translate::language;
use crate::utils::normalize_language_code;

/// AWS Transcribe transcript format
#[derive(Debug, Deserialize)]
struct AwsTranscript {
    results: TranscriptResults,
}

#[derive(Debug, Deserialize)]
struct TranscriptResults {
    items: Vec<TranscriptItem>,
}

#[derive(Debug, Deserialize)]
struct TranscriptItem {
    start_time: Option<String>,
    end_time: Option<String>,
    #[serde(rename = "type")]
    item_type: String,
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    content: String,
}

impl TranscriptItem {
    fn into_word(self) -> Option<TimedWord> {
        let content = self.alternatives.into_iter().next()?.content;
        Some(TimedWord {
            content,
            start_time: self.start_time.and_then(|s| s.parse::<f64>().ok()),
            end_time: self.end_time.and_then(|s| s.parse::<f64>().ok()),
            punctuation: self.item_type == "punctuation",
        })
    }
}

/// Map an SDK failure onto the transcription error taxonomy
fn classify_sdk_error<E, R>(context: &str, err: &SdkError<E, R>) -> TranscribeError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = format!("{}: {}", context, DisplayErrorContext(err));

    match err.as_service_error() {
        Some(service) => match service.code() {
            Some("LimitExceededException" | "ThrottlingException" | "SlowDown") => {
                TranscribeError::QuotaExceeded(message)
            }
            _ => TranscribeError::Backend(message),
        },
        None => TranscribeError::NetworkFailure(message),
    }
}

/// Deletes what a transcription attempt left in AWS; failures are only logged
#[async_trait]
trait RemoteCleanup: Send + Sync {
    async fn delete_object(&self, key: &str);
    async fn delete_transcription_job(&self, job_name: &str);
}

struct SdkCleanup {
    bucket: String,
    s3_client: S3Client,
    transcribe_client: TranscribeClient,
}

#[async_trait]
impl RemoteCleanup for SdkCleanup {
    async fn delete_object(&self, key: &str) {
        tracing::debug!("Cleaning up S3 object: {}", key);

        let result = self
            .s3_client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        if let Err(err) = result {
            tracing::warn!("Failed to clean up S3 object {}: {}", key, DisplayErrorContext(&err));
        }
    }

    async fn delete_transcription_job(&self, job_name: &str) {
        tracing::debug!("Deleting transcription job: {}", job_name);

        let result = self
            .transcribe_client
            .delete_transcription_job()
            .transcription_job_name(job_name)
            .send()
            .await;

        if let Err(err) = result {
            tracing::warn!(
                "Failed to delete transcription job {}: {}",
                job_name,
                DisplayErrorContext(&err)
            );
        }
    }
}

/// The S3 object and Transcribe job of one attempt
///
/// [`release`](Self::release) deletes both once the attempt is over. When the attempt is dropped
/// before that, by a stage timeout or a cancellation, the deletes run on a background task.
struct RemoteResources {
    cleanup: Arc<dyn RemoteCleanup>,
    s3_key: String,
    job_name: Option<String>,
    released: bool,
}

impl RemoteResources {
    fn new(cleanup: Arc<dyn RemoteCleanup>, s3_key: String) -> Self {
        Self {
            cleanup,
            s3_key,
            job_name: None,
            released: false,
        }
    }

    fn track_job(&mut self, job_name: &str) {
        self.job_name = Some(job_name.to_string());
    }

    async fn release(mut self) {
        if let Some(removal) = self.take_removal() {
            removal.await;
        }
    }

    fn take_removal(&mut self) -> Option<impl Future<Output = ()> + Send + 'static> {
        if self.released {
            return None;
        }
        self.released = true;

        let cleanup = Arc::clone(&self.cleanup);
        let s3_key = std::mem::take(&mut self.s3_key);
        let job_name = self.job_name.take();

        Some(async move {
            if let Some(job_name) = job_name {
                cleanup.delete_transcription_job(&job_name).await;
            }
            cleanup.delete_object(&s3_key).await;
        })
    }
}

impl Drop for RemoteResources {
    fn drop(&mut self) {
        let Some(removal) = self.take_removal() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!("Transcription abandoned, removing its S3 object and job");
                handle.spawn(removal);
            }
            Err(_) => tracing::warn!("Transcription abandoned outside a runtime; AWS resources were left behind"),
        }
    }
}

/// Cloud speech-to-text: upload to S3, run an AWS Transcribe job, poll until it finishes
pub struct AwsTranscriber {
    config: AwsTranscribeConfig,
    s3_client: S3Client,
    transcribe_client: TranscribeClient,
    cleanup: Arc<dyn RemoteCleanup>,
}

impl AwsTranscriber {
    pub async fn new(config: AwsTranscribeConfig) -> crate::Result<Self> {
        if config.s3_bucket.is_empty() {
            anyhow::bail!("transcriber.aws.s3_bucket must be configured for the aws backend");
        }

        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let s3_client = S3Client::new(&aws_config);
        let transcribe_client = TranscribeClient::new(&aws_config);
        let cleanup = Arc::new(SdkCleanup {
            bucket: config.s3_bucket.clone(),
            s3_client: s3_client.clone(),
            transcribe_client: transcribe_client.clone(),
        });

        Ok(Self {
            s3_client,
            transcribe_client,
            cleanup,
            config,
        })
    }

    fn object_key(&self, audio: &AudioHandle) -> String {
        format!(
            "{}audio_{}_{}.{}",
            self.config.s3_key_prefix.as_deref().unwrap_or(""),
            Uuid::new_v4(),
            chrono::Utc::now().format("%Y%m%d_%H%M%S"),
            audio.format.as_str()
        )
    }

    /// Upload audio file to S3
    async fn upload_to_s3(&self, audio: &AudioHandle, key: &str) -> Result<(), TranscribeError> {
        tracing::info!("Uploading audio to S3: s3://{}/{}", self.config.s3_bucket, key);

        let content = tokio::fs::read(&audio.path)
            .await
            .map_err(|e| TranscribeError::Backend(format!("cannot read {}: {}", audio.path.display(), e)))?;

        self.s3_client
            .put_object()
            .bucket(&self.config.s3_bucket)
            .key(key)
            .body(content.into())
            .content_type(audio.format.mime_type())
            .send()
            .await
            .map_err(|e| classify_sdk_error("Failed to upload audio to S3", &e))?;

        Ok(())
    }

    /// Start AWS Transcribe job, with automatic language identification unless a hint is given
    async fn start_transcription_job(
        &self,
        s3_key: &str,
        audio: &AudioHandle,
        language_hint: Option<&str>,
    ) -> Result<String, TranscribeError> {
        let job_name = format!("video_mindmap_{}", Uuid::new_v4());
        let media_uri = format!("s3://{}/{}", self.config.s3_bucket, s3_key);

        tracing::info!("Starting transcription job: {}", job_name);

        let media_format = match audio.format {
            AudioFormat::Mp3 => MediaFormat::Mp3,
            AudioFormat::M4a => MediaFormat::Mp4,
            AudioFormat::Wav => MediaFormat::Wav,
            AudioFormat::Flac => MediaFormat::Flac,
            AudioFormat::Ogg => MediaFormat::Ogg,
            AudioFormat::Webm => MediaFormat::Webm,
        };

        let media = Media::builder().media_file_uri(media_uri).build();

        let mut job_builder = self
            .transcribe_client
            .start_transcription_job()
            .transcription_job_name(&job_name)
            .media_format(media_format)
            .media(media);

        if let Some(hint) = language_hint {
            let code = normalize_language_code(hint);
            tracing::info!("Using specified language: {}", code);
            job_builder = job_builder.language_code(LanguageCode::from(code.as_str()));
        } else {
            tracing::info!("Using automatic language detection");
            job_builder = job_builder.identify_language(true);
        }

        job_builder
            .send()
            .await
            .map_err(|e| classify_sdk_error("Failed to start transcription job", &e))?;

        Ok(job_name)
    }

    /// Get transcription job details
    async fn get_transcription_job(&self, job_name: &str) -> Result<TranscriptionJob, TranscribeError> {
        let response = self
            .transcribe_client
            .get_transcription_job()
            .transcription_job_name(job_name)
            .send()
            .await
            .map_err(|e| classify_sdk_error("Failed to get transcription job status", &e))?;

        response
            .transcription_job()
            .cloned()
            .ok_or_else(|| TranscribeError::Backend(format!("transcription job {} not found", job_name)))
    }

    /// Poll until the job leaves the in-progress state, backing off up to 30 seconds
    async fn wait_for_completion(&self, job_name: &str) -> Result<TranscriptionJob, TranscribeError> {
        let started = std::time::Instant::now();
        let mut check_count: u64 = 0;

        loop {
            check_count += 1;
            let job = self.get_transcription_job(job_name).await?;

            match job.transcription_job_status() {
                Some(TranscriptionJobStatus::Completed) => return Ok(job),
                Some(TranscriptionJobStatus::Failed) => {
                    let reason = job.failure_reason().unwrap_or("Unknown error").to_string();
                    return Err(TranscribeError::Unintelligible(reason));
                }
                Some(TranscriptionJobStatus::InProgress) | Some(TranscriptionJobStatus::Queued) => {
                    tracing::debug!(
                        "Transcribing... ({}s elapsed, check #{})",
                        started.elapsed().as_secs(),
                        check_count
                    );
                    let wait_time = std::cmp::min(5 + (check_count - 1) * 2, 30);
                    sleep(Duration::from_secs(wait_time)).await;
                }
                other => {
                    return Err(TranscribeError::Backend(format!(
                        "unexpected transcription job status: {:?}",
                        other
                    )));
                }
            }
        }
    }

    /// Download the transcript JSON the finished job points to
    async fn download_transcript(&self, job: &TranscriptionJob) -> Result<AwsTranscript, TranscribeError> {
        let uri = job
            .transcript()
            .and_then(|t| t.transcript_file_uri())
            .ok_or_else(|| TranscribeError::Backend("no transcript URI found".to_string()))?;

        let response = reqwest::get(uri)
            .await
            .map_err(|e| TranscribeError::NetworkFailure(format!("Failed to download transcript: {}", e)))?;

        if !response.status().is_success() {
            return Err(TranscribeError::NetworkFailure(format!(
                "Failed to download transcript: HTTP {}",
                response.status()
            )));
        }

        let content = response
            .text()
            .await
            .map_err(|e| TranscribeError::NetworkFailure(format!("Failed to read transcript: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| TranscribeError::Unintelligible(format!("Failed to parse transcript JSON: {}", e)))
    }

    async fn run_job(
        &self,
        resources: &mut RemoteResources,
        audio: &AudioHandle,
        language_hint: Option<&str>,
    ) -> Result<Transcript, TranscribeError> {
        self.upload_to_s3(audio, &resources.s3_key).await?;
        let job_name = self
            .start_transcription_job(&resources.s3_key, audio, language_hint)
            .await?;
        resources.track_job(&job_name);

        let job = self.wait_for_completion(&job_name).await?;
        let transcript = self.download_transcript(&job).await?;

        let detected = job
            .language_code()
            .map(|code| language::normalize(code.as_str()))
            .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string());

        let words: Vec<TimedWord> = transcript
            .results
            .items
            .into_iter()
            .filter_map(TranscriptItem::into_word)
            .collect();

        let segments = SegmentGrouper::new(self.config.max_segment_length).group(&words, &detected);

        Ok(Transcript {
            segments,
            language: detected,
        })
    }
}

#[async_trait]
impl Transcriber for AwsTranscriber {
    async fn transcribe(
        &self,
        audio: &AudioHandle,
        language_hint: Option<&str>,
    ) -> Result<Transcript, TranscribeError> {
        let mut resources = RemoteResources::new(Arc::clone(&self.cleanup), self.object_key(audio));
        let result = self.run_job(&mut resources, audio, language_hint).await;
        resources.release().await;
        result
    }

    fn backend_name(&self) -> &'static str {
        "aws"
    }
}

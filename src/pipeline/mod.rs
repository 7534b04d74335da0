//! Job orchestration.
//!
//! A job moves through Acquire → Transcribe → Translate → Outline → Serialize. Collaborator
//! calls run under [`run_stage`], which applies the stage timeout, the retry budget and
//! cancellation. The job's working directory is a [`TempDir`] owned by [`PipelineOrchestrator::run`]
//! and therefore removed on every exit path.

use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::watch;
use tracing::Instrument;

use crate::cli::OutputFormat;
use crate::config::{Config, PipelineConfig, TranscriberBackend};
use crate::extractors::{AcquireError, AcquirerRegistry, MediaAcquirer};
use crate::outline::{OutlineBuilder, OutlineNode};
use crate::output::{self, MindMapSerializer};
use crate::transcribe::processor::collapse_whitespace;
use crate::transcribe::{self, Transcriber, Transcript, TranscriptSegment, UNKNOWN_LANGUAGE};
use crate::translate::{self, language, Translator};
use crate::utils::format_duration;

pub mod cancel;
pub mod error;
pub mod job;
pub mod registry;
pub mod retry;

#[cfg(test)]
pub(crate) mod fakes;

pub use cancel::CancelToken;
pub use error::{FailureCause, StageFailure};
pub use job::{InvalidTransition, Job, JobId, JobState, Stage, StageOutputs};
pub use registry::{JobRegistry, JobStatus};
pub use retry::{run_stage, RetryPolicy};

/// Exit code for a job the user cancelled
pub const CANCELLED_EXIT_CODE: i32 = 130;

/// Sender side of a job's status channel
pub type StatusSender = watch::Sender<JobStatus>;

/// External services a job depends on
pub struct Collaborators {
    pub acquirer: Arc<dyn MediaAcquirer>,
    pub transcriber: Arc<dyn Transcriber>,
    pub translator: Arc<dyn Translator>,
    pub serializer: Arc<dyn MindMapSerializer>,
}

impl Collaborators {
    /// Production collaborators as described by the configuration
    pub async fn from_config(config: &Config, format: OutputFormat) -> crate::Result<Self> {
        Ok(Self {
            acquirer: Arc::new(AcquirerRegistry::new()),
            transcriber: transcribe::from_config(config).await?,
            translator: translate::from_config(config)?,
            serializer: output::serializer_for(format),
        })
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub pipeline: PipelineConfig,

    /// Where finished mind maps are written
    pub output_dir: PathBuf,

    /// Parent of per-job working directories; the system temp dir when unset
    pub temp_dir: Option<PathBuf>,

    /// Write the untranslated transcript as `<title>.txt` beside the mind map
    pub save_transcript: bool,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        let mut pipeline = config.pipeline.clone();

        // A retried AWS attempt uploads again and starts another billed job
        if config.transcriber.backend == TranscriberBackend::Aws
            && !pipeline.non_retryable_stages.contains(&Stage::Transcribing)
        {
            tracing::debug!("AWS transcription runs as a single attempt");
            pipeline.non_retryable_stages.push(Stage::Transcribing);
        }

        Self {
            pipeline,
            output_dir: config.app.output_dir.clone(),
            temp_dir: config.app.temp_dir.clone(),
            save_transcript: config.app.save_transcript,
        }
    }
}

/// Everything a successful job produced
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub outline: OutlineNode,
    /// Language the transcript was recognized in
    pub language: String,
    pub translation_applied: bool,
    pub output_path: PathBuf,
    pub transcript_path: Option<PathBuf>,
}

/// Terminal result of a job; exactly one per run
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineResult {
    Succeeded(PipelineOutput),
    Failed(StageFailure),
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineResult::Succeeded(_))
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineResult::Succeeded(_) => 0,
            PipelineResult::Failed(failure) if failure.is_cancelled() => CANCELLED_EXIT_CODE,
            PipelineResult::Failed(failure) => failure.stage.exit_code(),
        }
    }
}

/// Consecutive segment ranges whose joined text stays within `max_chars`
///
/// A single segment longer than the limit still gets a batch of its own.
pub fn translation_batches(segments: &[TranscriptSegment], max_chars: usize) -> Vec<Range<usize>> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut chars = 0;

    for (i, segment) in segments.iter().enumerate() {
        // +1 for the joining newline
        let len = segment.text.chars().count() + 1;
        if i > start && chars + len > max_chars {
            batches.push(start..i);
            start = i;
            chars = 0;
        }
        chars += len;
    }

    if start < segments.len() {
        batches.push(start..segments.len());
    }

    batches
}

/// Reported language, or a guess from the text when the backend could not tell
fn resolve_language(transcript: &Transcript) -> String {
    let reported = language::normalize(&transcript.language);
    if reported != UNKNOWN_LANGUAGE {
        return reported;
    }

    language::infer_language(&transcript.full_text())
        .map(str::to_string)
        .unwrap_or(reported)
}

pub struct PipelineOrchestrator {
    collaborators: Collaborators,
    settings: PipelineSettings,
    outline: OutlineBuilder,
}

impl PipelineOrchestrator {
    pub fn new(collaborators: Collaborators, settings: PipelineSettings, outline: OutlineBuilder) -> Self {
        Self {
            collaborators,
            settings,
            outline,
        }
    }

    pub fn target_language(&self) -> &str {
        &self.settings.pipeline.target_language
    }

    /// Drive `job` to a terminal state and report how it ended
    pub async fn run(&self, job: &mut Job, cancel: &CancelToken, status: Option<&StatusSender>) -> PipelineResult {
        let span = tracing::info_span!("job", id = %job.id);

        async {
            tracing::info!("Starting job for {}", job.url);

            match self.execute(job, cancel, status).await {
                Ok(output) => {
                    self.transition(job, JobState::Succeeded, status);
                    tracing::info!("Mind map written to {}", output.output_path.display());
                    PipelineResult::Succeeded(output)
                }
                Err(failure) => {
                    let failed = JobState::Failed {
                        stage: failure.stage,
                        cause: failure.cause.clone(),
                    };
                    self.transition(job, failed, status);
                    tracing::warn!("Job failed: {}", failure);
                    PipelineResult::Failed(failure)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        job: &mut Job,
        cancel: &CancelToken,
        status: Option<&StatusSender>,
    ) -> Result<PipelineOutput, StageFailure> {
        self.enter(job, Stage::Acquiring, cancel, status)?;
        let workdir = self
            .create_workdir()
            .map_err(|e| StageFailure::new(Stage::Acquiring, AcquireError::from(e), 0))?;

        let acquirer = &self.collaborators.acquirer;
        let url = job.url.clone();
        let audio = run_stage(Stage::Acquiring, &self.policy(Stage::Acquiring), cancel, || {
            acquirer.acquire(&url, workdir.path())
        })
        .await?;
        match audio.duration {
            Some(seconds) => tracing::info!("Acquired audio at {} ({})", audio.path.display(), format_duration(seconds)),
            None => tracing::info!("Acquired audio at {}", audio.path.display()),
        }
        job.outputs.audio = Some(audio.clone());

        self.enter(job, Stage::Transcribing, cancel, status)?;
        let transcriber = &self.collaborators.transcriber;
        let hint = job.language_hint.clone();
        let transcript = run_stage(Stage::Transcribing, &self.policy(Stage::Transcribing), cancel, || {
            transcriber.transcribe(&audio, hint.as_deref())
        })
        .await?;
        tracing::info!(
            "Transcribed {} segments covering {} (language: {})",
            transcript.segments.len(),
            format_duration(transcript.duration().unwrap_or_default()),
            transcript.language
        );
        job.outputs.transcript = Some(transcript.clone());

        self.enter(job, Stage::Translating, cancel, status)?;
        let detected = resolve_language(&transcript);
        let target = job.target_language.clone();
        let mut topic = audio.title.clone();

        let skip = language::same_language(&detected, &target) || transcript.segments.is_empty();
        let segments = if skip {
            tracing::info!("Transcript is already in {}, skipping translation", target);
            transcript.segments.clone()
        } else {
            let translated = self
                .translate_segments(&transcript.segments, &detected, &target, cancel)
                .await?;
            topic = self.translate_topic(topic, &detected, &target, cancel).await?;
            translated
        };
        job.outputs.translation_applied = !skip;
        job.outputs.translated = Some(segments.clone());

        self.enter(job, Stage::Outlining, cancel, status)?;
        let outline = self
            .outline
            .build(&segments, topic.as_deref())
            .map_err(|e| StageFailure::new(Stage::Outlining, e, 1))?;
        tracing::info!("Built outline with {} nodes", outline.node_count());
        job.outputs.outline = Some(outline.clone());

        self.enter(job, Stage::Serializing, cancel, status)?;
        let serializer = &self.collaborators.serializer;
        let bytes = serializer
            .serialize(&outline)
            .map_err(|e| StageFailure::new(Stage::Serializing, e, 1))?;
        let path = output::output_path(&self.settings.output_dir, &outline.title, serializer.extension());
        output::write_atomic(&path, &bytes).map_err(|e| StageFailure::new(Stage::Serializing, e, 1))?;
        job.outputs.output_path = Some(path.clone());

        let transcript_path = if self.settings.save_transcript {
            let text_path = output::output_path(&self.settings.output_dir, &outline.title, "txt");
            output::write_atomic(&text_path, transcript.full_text().as_bytes())
                .map_err(|e| StageFailure::new(Stage::Serializing, e, 1))?;
            tracing::info!("Transcript written to {}", text_path.display());
            Some(text_path)
        } else {
            None
        };

        Ok(PipelineOutput {
            outline,
            language: detected,
            translation_applied: !skip,
            output_path: path,
            transcript_path,
        })
    }

    /// Stage boundary: observe cancellation, then move the job into `stage`
    fn enter(
        &self,
        job: &mut Job,
        stage: Stage,
        cancel: &CancelToken,
        status: Option<&StatusSender>,
    ) -> Result<(), StageFailure> {
        if cancel.is_cancelled() {
            return Err(StageFailure::cancelled(stage, 0));
        }

        self.transition(job, stage.state(), status);
        Ok(())
    }

    fn transition(&self, job: &mut Job, next: JobState, status: Option<&StatusSender>) {
        if let Err(err) = job.advance(next) {
            tracing::error!("{}", err);
            return;
        }

        if let Some(status) = status {
            status.send_modify(|current| current.state = job.state.clone());
        }
    }

    fn policy(&self, stage: Stage) -> RetryPolicy {
        RetryPolicy::for_stage(&self.settings.pipeline, stage)
    }

    fn create_workdir(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("video-mindmap-");

        match &self.settings.temp_dir {
            Some(dir) => {
                fs_err::create_dir_all(dir)?;
                builder.tempdir_in(dir)
            }
            None => builder.tempdir(),
        }
    }

    /// Translate in batches, falling back to one call per segment when line counts drift
    async fn translate_segments(
        &self,
        segments: &[TranscriptSegment],
        source: &str,
        target: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<TranscriptSegment>, StageFailure> {
        let translator = &self.collaborators.translator;
        let policy = self.policy(Stage::Translating);
        let mut translated = Vec::with_capacity(segments.len());

        for range in translation_batches(segments, self.settings.pipeline.translation_batch_chars) {
            let batch = &segments[range];
            let text = batch
                .iter()
                .map(|segment| collapse_whitespace(&segment.text))
                .collect::<Vec<_>>()
                .join("\n");

            let output = run_stage(Stage::Translating, &policy, cancel, || {
                translator.translate(&text, source, target)
            })
            .await?;

            let lines: Vec<&str> = output.lines().map(str::trim).filter(|line| !line.is_empty()).collect();
            if lines.len() == batch.len() {
                translated.extend(batch.iter().zip(lines).map(|(segment, line)| segment.with_text(line, target)));
                continue;
            }

            tracing::debug!(
                "Translator returned {} lines for {} segments, translating one by one",
                lines.len(),
                batch.len()
            );
            for segment in batch {
                let text = run_stage(Stage::Translating, &policy, cancel, || {
                    translator.translate(&segment.text, source, target)
                })
                .await?;
                translated.push(segment.with_text(collapse_whitespace(&text), target));
            }
        }

        Ok(translated)
    }

    async fn translate_topic(
        &self,
        topic: Option<String>,
        source: &str,
        target: &str,
        cancel: &CancelToken,
    ) -> Result<Option<String>, StageFailure> {
        let Some(title) = topic else {
            return Ok(None);
        };
        if language::infer_language(&title).is_some_and(|inferred| language::same_language(inferred, target)) {
            return Ok(Some(title));
        }

        let translator = &self.collaborators.translator;
        let translated = run_stage(Stage::Translating, &self.policy(Stage::Translating), cancel, || {
            translator.translate(&title, source, target)
        })
        .await?;

        Ok(Some(collapse_whitespace(&translated)))
    }
}

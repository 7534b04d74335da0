//! Scripted collaborators for orchestrator and registry tests.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use super::{Collaborators, PipelineOrchestrator, PipelineSettings};
use crate::config::PipelineConfig;
use crate::extractors::{AcquireError, AudioFormat, AudioHandle, MediaAcquirer};
use crate::outline::{OutlineBuilder, OutlineConfig, OutlineNode};
use crate::output::{MarkdownSerializer, MindMapSerializer, SerializeError};
use crate::transcribe::{TranscribeError, Transcriber, Transcript, TranscriptSegment};
use crate::translate::{MockTranslator, Translator};

/// Writes a dummy audio file and remembers the working directory it was given
#[derive(Default)]
pub struct FakeAcquirer {
    pub title: Option<String>,
    pub calls: AtomicU32,
    pub workdirs: Mutex<Vec<PathBuf>>,
}

impl FakeAcquirer {
    pub fn titled(title: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl MediaAcquirer for FakeAcquirer {
    async fn acquire(&self, url: &str, workdir: &Path) -> Result<AudioHandle, AcquireError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.workdirs.lock().unwrap().push(workdir.to_path_buf());

        let path = workdir.join("audio.mp3");
        fs_err::write(&path, b"ID3")?;

        Ok(AudioHandle {
            path,
            format: AudioFormat::Mp3,
            title: self.title.clone(),
            duration: None,
            source_url: url.to_string(),
        })
    }
}

/// Replays scripted responses in order; the last one repeats forever
pub struct ScriptedTranscriber {
    responses: Mutex<Vec<Result<Transcript, TranscribeError>>>,
    pub calls: AtomicU32,
    pub delay: Duration,
}

impl ScriptedTranscriber {
    pub fn new(responses: Vec<Result<Transcript, TranscribeError>>) -> Self {
        assert!(!responses.is_empty());
        Self {
            responses: Mutex::new(responses),
            calls: AtomicU32::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn ok(transcript: Transcript) -> Self {
        Self::new(vec![Ok(transcript)])
    }

    pub fn slow(transcript: Transcript, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::ok(transcript)
        }
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, _: &AudioHandle, _: Option<&str>) -> Result<Transcript, TranscribeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut responses = self.responses.lock().unwrap();
        if responses.len() > 1 {
            responses.remove(0)
        } else {
            responses[0].clone()
        }
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}

pub struct FailingSerializer;

impl MindMapSerializer for FailingSerializer {
    fn serialize(&self, _: &OutlineNode) -> Result<Vec<u8>, SerializeError> {
        Err(SerializeError::EncodingFailure("refused".to_string()))
    }

    fn extension(&self) -> &'static str {
        "txt"
    }
}

pub fn transcript(language: &str, texts: &[&str]) -> Transcript {
    Transcript {
        segments: texts
            .iter()
            .enumerate()
            .map(|(i, text)| TranscriptSegment::new(i as f64 * 5.0, i as f64 * 5.0 + 4.5, *text, language))
            .collect(),
        language: language.to_string(),
    }
}

pub fn chinese_transcript() -> Transcript {
    transcript("zh", &["今天我们聊一聊所有权", "所有权决定了谁释放内存", "接下来讲异步运行时"])
}

pub fn english_transcript() -> Transcript {
    transcript("en", &["Intro to ownership", "Detail on ownership", "Unrelated topic async"])
}

/// Translator that prefixes every line, keeping line counts intact
pub fn echo_translator() -> MockTranslator {
    let mut translator = MockTranslator::new();
    translator.expect_translate().returning(|text, _, _| {
        Ok(text.lines().map(|line| format!("译:{}", line)).collect::<Vec<_>>().join("\n"))
    });
    translator
}

pub fn silent_translator() -> MockTranslator {
    let mut translator = MockTranslator::new();
    translator.expect_translate().times(0);
    translator
}

/// Scratch directories for job workdirs and output files
pub struct TestDirs {
    pub work: TempDir,
    pub out: TempDir,
}

impl TestDirs {
    pub fn new() -> Self {
        Self {
            work: tempfile::tempdir().unwrap(),
            out: tempfile::tempdir().unwrap(),
        }
    }

    pub fn settings(&self) -> PipelineSettings {
        PipelineSettings {
            pipeline: PipelineConfig {
                backoff_base_ms: 1,
                backoff_max_ms: 2,
                stage_timeout_seconds: 5,
                ..PipelineConfig::default()
            },
            output_dir: self.out.path().to_path_buf(),
            temp_dir: Some(self.work.path().to_path_buf()),
            save_transcript: false,
        }
    }

    pub fn leftover_workdirs(&self) -> usize {
        fs_err::read_dir(self.work.path()).unwrap().count()
    }

    pub fn outputs(&self) -> Vec<PathBuf> {
        fs_err::read_dir(self.out.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }
}

pub fn orchestrator(
    dirs: &TestDirs,
    acquirer: Arc<FakeAcquirer>,
    transcriber: Arc<ScriptedTranscriber>,
    translator: impl Translator + 'static,
    serializer: Arc<dyn MindMapSerializer>,
) -> PipelineOrchestrator {
    PipelineOrchestrator::new(
        Collaborators {
            acquirer,
            transcriber,
            translator: Arc::new(translator),
            serializer,
        },
        dirs.settings(),
        OutlineBuilder::new(OutlineConfig::default()),
    )
}

pub fn markdown() -> Arc<dyn MindMapSerializer> {
    Arc::new(MarkdownSerializer::default())
}

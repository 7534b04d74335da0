use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use url::Url;

pub mod bilibili;
pub mod xiaoyuzhou;
pub mod youtube;

pub use bilibili::BilibiliAcquirer;
pub use xiaoyuzhou::XiaoyuzhouAcquirer;
pub use youtube::YoutubeAcquirer;

use crate::utils::extract_domain;
use crate::{Classify, ErrorKind};

/// Local audio file produced by an acquirer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioHandle {
    /// Where the audio lives inside the job's working directory
    pub path: PathBuf,

    /// Audio format (mp3, m4a, wav, etc.)
    pub format: AudioFormat,

    /// Title of the media, used as the mind map topic
    pub title: Option<String>,

    /// Duration in seconds if the platform reported it
    pub duration: Option<f64>,

    /// Original URL that was processed
    pub source_url: String,
}

/// Supported audio formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioFormat {
    Mp3,
    M4a,
    Wav,
    Flac,
    Ogg,
    Webm,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Wav => "wav",
            AudioFormat::Flac => "flac",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Webm => "webm",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "mp3" => Some(AudioFormat::Mp3),
            "m4a" | "aac" => Some(AudioFormat::M4a),
            "wav" => Some(AudioFormat::Wav),
            "flac" => Some(AudioFormat::Flac),
            "ogg" => Some(AudioFormat::Ogg),
            "webm" => Some(AudioFormat::Webm),
            _ => None,
        }
    }

    /// Get MIME type for the format
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::M4a => "audio/mp4",
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Ogg => "audio/ogg",
            AudioFormat::Webm => "audio/webm",
        }
    }
}

/// Failures while turning a URL into a local audio file
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AcquireError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Network failure while fetching media: {0}")]
    NetworkFailure(String),

    #[error("Media is not available: {0}")]
    MediaUnavailable(String),

    #[error("{0} is not installed or not on PATH")]
    ToolUnavailable(String),

    #[error("Local file error: {0}")]
    LocalIo(String),
}

impl Classify for AcquireError {
    fn kind(&self) -> ErrorKind {
        match self {
            AcquireError::NetworkFailure(_) => ErrorKind::Transient,
            _ => ErrorKind::PermanentInput,
        }
    }
}

impl From<std::io::Error> for AcquireError {
    fn from(err: std::io::Error) -> Self {
        AcquireError::LocalIo(err.to_string())
    }
}

/// Turns a media URL into a local audio file inside `workdir`
#[async_trait]
pub trait MediaAcquirer: Send + Sync {
    async fn acquire(&self, url: &str, workdir: &Path) -> Result<AudioHandle, AcquireError>;
}

/// An acquirer bound to one hosting platform
pub trait PlatformExtractor: MediaAcquirer {
    /// Check if this extractor supports the given URL
    fn supports_url(&self, url: &Url) -> bool;

    /// Get the name of this platform
    fn platform_name(&self) -> &'static str;

    /// Sample URL shown by `platforms`
    fn example_url(&self) -> &'static str;
}

/// Registry for managing multiple extractors
pub struct AcquirerRegistry {
    extractors: Vec<Box<dyn PlatformExtractor>>,
}

impl AcquirerRegistry {
    /// Create a new registry with default extractors
    pub fn new() -> Self {
        let mut registry = Self {
            extractors: Vec::new(),
        };

        registry.register(Box::new(YoutubeAcquirer::new()));
        registry.register(Box::new(BilibiliAcquirer::new()));
        registry.register(Box::new(XiaoyuzhouAcquirer::new()));

        registry
    }

    /// Register a new extractor
    pub fn register(&mut self, extractor: Box<dyn PlatformExtractor>) {
        self.extractors.push(extractor);
    }

    /// Find an extractor that supports the given URL
    pub fn find_extractor(&self, url: &Url) -> Option<&dyn PlatformExtractor> {
        self.extractors
            .iter()
            .find(|extractor| extractor.supports_url(url))
            .map(|boxed| boxed.as_ref())
    }

    /// List all supported platforms with a sample URL each
    pub fn list_platforms(&self) -> Vec<(&'static str, &'static str)> {
        self.extractors
            .iter()
            .map(|extractor| (extractor.platform_name(), extractor.example_url()))
            .collect()
    }
}

impl Default for AcquirerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaAcquirer for AcquirerRegistry {
    async fn acquire(&self, url: &str, workdir: &Path) -> Result<AudioHandle, AcquireError> {
        let parsed = validate_url(url)?;

        let extractor = self
            .find_extractor(&parsed)
            .ok_or_else(|| AcquireError::UnsupportedPlatform(extract_domain(url).unwrap_or_else(|| url.to_string())))?;

        tracing::debug!("Acquiring {} via {}", url, extractor.platform_name());
        extractor.acquire(url, workdir).await
    }
}

/// Validate and normalize URLs
pub fn validate_url(url: &str) -> Result<Url, AcquireError> {
    let parsed = Url::parse(url.trim()).map_err(|_| AcquireError::InvalidUrl(url.to_string()))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AcquireError::InvalidUrl(format!(
            "{} (URL must use HTTP or HTTPS protocol)",
            url
        )));
    }

    if parsed.host_str().is_none() {
        return Err(AcquireError::InvalidUrl(url.to_string()));
    }

    Ok(parsed)
}

/// Whether `url`'s host is `domain` or one of its subdomains
pub(crate) fn host_matches(url: &Url, domain: &str) -> bool {
    url.host_str()
        .map(|host| {
            let host = host.to_lowercase();
            host == domain || host.ends_with(&format!(".{}", domain))
        })
        .unwrap_or(false)
}

/// Map a failed download tool's stderr onto an error kind
pub(crate) fn classify_tool_failure(tool: &str, stderr: &str) -> AcquireError {
    let lowered = stderr.to_lowercase();
    let message = format!("{} failed: {}", tool, stderr.trim());

    let network = [
        "timed out",
        "timeout",
        "connection reset",
        "connection refused",
        "temporary failure in name resolution",
        "network is unreachable",
        "http error 5",
    ];

    if network.iter().any(|needle| lowered.contains(needle)) {
        AcquireError::NetworkFailure(message)
    } else {
        AcquireError::MediaUnavailable(message)
    }
}

/// Run an external tool to completion, mapping spawn and exit failures
pub(crate) async fn run_tool(program: &str, args: &[&str]) -> Result<Output, AcquireError> {
    tracing::debug!("Running {} {}", program, args.join(" "));

    let output = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AcquireError::ToolUnavailable(program.to_string()),
            _ => AcquireError::LocalIo(format!("failed to run {}: {}", program, e)),
        })?;

    if !output.status.success() {
        return Err(classify_tool_failure(program, &String::from_utf8_lossy(&output.stderr)));
    }

    Ok(output)
}

/// Most recently modified file in `dir` with one of `extensions`
pub(crate) fn newest_file_with_extension(dir: &Path, extensions: &[&str]) -> Result<Option<PathBuf>, AcquireError> {
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;

    for entry in fs_err::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| extensions.iter().any(|wanted| ext.eq_ignore_ascii_case(wanted)))
            .unwrap_or(false);

        if !matches || !path.is_file() {
            continue;
        }

        let modified = fs_err::metadata(&path)?.modified()?;
        if newest.as_ref().map(|(time, _)| modified > *time).unwrap_or(true) {
            newest = Some((modified, path));
        }
    }

    Ok(newest.map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://www.youtube.com/watch?v=abc").is_ok());
        assert!(matches!(validate_url("not-a-url"), Err(AcquireError::InvalidUrl(_))));
        assert!(matches!(validate_url("ftp://example.com/a"), Err(AcquireError::InvalidUrl(_))));
    }

    #[test]
    fn test_host_matches() {
        let url = Url::parse("https://m.bilibili.com/video/BV1xx").unwrap();
        assert!(host_matches(&url, "bilibili.com"));
        assert!(!host_matches(&url, "libili.com"));
    }

    #[test]
    fn test_classify_tool_failure() {
        assert!(matches!(
            classify_tool_failure("yt-dlp", "ERROR: Unable to download webpage: timed out"),
            AcquireError::NetworkFailure(_)
        ));
        assert!(matches!(
            classify_tool_failure("yt-dlp", "ERROR: Video unavailable. This video is private"),
            AcquireError::MediaUnavailable(_)
        ));
        assert!(AcquireError::NetworkFailure(String::new()).is_transient());
        assert!(!AcquireError::InvalidUrl(String::new()).is_transient());
    }

    #[tokio::test]
    async fn test_registry_rejects_bad_input() {
        let registry = AcquirerRegistry::new();
        let dir = tempfile::tempdir().unwrap();

        let result = registry.acquire("definitely not a url", dir.path()).await;
        assert!(matches!(result, Err(AcquireError::InvalidUrl(_))));

        let result = registry.acquire("https://www.example.com/video.mp4", dir.path()).await;
        assert_eq!(result.unwrap_err(), AcquireError::UnsupportedPlatform("example.com".to_string()));
    }

    #[test]
    fn test_registry_dispatch() {
        let registry = AcquirerRegistry::new();
        let name = |url: &str| {
            registry
                .find_extractor(&Url::parse(url).unwrap())
                .map(|e| e.platform_name())
        };

        assert_eq!(name("https://youtu.be/dQw4w9WgXcQ"), Some("YouTube"));
        assert_eq!(name("https://www.bilibili.com/video/BV1GJ411x7h7"), Some("Bilibili"));
        assert_eq!(name("https://www.xiaoyuzhoufm.com/episode/abc123"), Some("Xiaoyuzhou"));
        assert_eq!(name("https://vimeo.com/123"), None);
        assert_eq!(registry.list_platforms().len(), 3);
    }

    #[tokio::test]
    async fn test_run_tool_missing_binary() {
        let result = run_tool("video-mindmap-no-such-tool", &["--version"]).await;
        assert_eq!(
            result.unwrap_err(),
            AcquireError::ToolUnavailable("video-mindmap-no-such-tool".to_string())
        );
    }

    #[test]
    fn test_newest_file_with_extension() {
        let dir = tempfile::tempdir().unwrap();
        fs_err::write(dir.path().join("notes.txt"), "x").unwrap();
        fs_err::write(dir.path().join("clip.flv"), "x").unwrap();

        let found = newest_file_with_extension(dir.path(), &["flv", "mp4"]).unwrap();
        assert_eq!(found, Some(dir.path().join("clip.flv")));
        assert_eq!(newest_file_with_extension(dir.path(), &["webm"]).unwrap(), None);
    }
}

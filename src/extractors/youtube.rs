use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use url::Url;

use super::{host_matches, run_tool, AcquireError, AudioFormat, AudioHandle, MediaAcquirer, PlatformExtractor};

/// YouTube audio acquirer using yt-dlp
pub struct YoutubeAcquirer {
    yt_dlp_path: String,
}

impl YoutubeAcquirer {
    pub fn new() -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
        }
    }

    /// Get video information using yt-dlp
    async fn get_video_info(&self, url: &str) -> Result<Value, AcquireError> {
        tracing::debug!("Extracting video info for: {}", url);

        let output = run_tool(&self.yt_dlp_path, &["--dump-json", "--no-playlist", url]).await?;

        serde_json::from_slice(&output.stdout)
            .map_err(|e| AcquireError::MediaUnavailable(format!("yt-dlp returned unreadable metadata: {}", e)))
    }

    /// Download and convert the audio track to mp3 in one yt-dlp run
    async fn download_audio(&self, url: &str, workdir: &Path) -> Result<std::path::PathBuf, AcquireError> {
        let template = workdir.join("audio.%(ext)s");
        let template = template.to_string_lossy();

        run_tool(
            &self.yt_dlp_path,
            &[
                "--output",
                &template,
                "--extract-audio",
                "--audio-format",
                "mp3",
                // Lowest quality is still plenty for speech recognition
                "--audio-quality",
                "9",
                "--format",
                "worstaudio[acodec^=mp4a]/worstaudio[ext=m4a]/worstaudio[ext=mp3]/worstaudio",
                "--no-playlist",
                "--concurrent-fragments",
                "4",
                "--newline",
                url,
            ],
        )
        .await?;

        let path = workdir.join("audio.mp3");
        if !path.exists() {
            return Err(AcquireError::LocalIo(format!(
                "yt-dlp finished but {} is missing",
                path.display()
            )));
        }

        Ok(path)
    }
}

#[async_trait]
impl MediaAcquirer for YoutubeAcquirer {
    async fn acquire(&self, url: &str, workdir: &Path) -> Result<AudioHandle, AcquireError> {
        let info = self.get_video_info(url).await?;

        let title = info["title"].as_str().map(|s| s.to_string());
        let duration = info["duration"].as_f64();

        let path = self.download_audio(url, workdir).await?;

        Ok(AudioHandle {
            path,
            format: AudioFormat::Mp3,
            title,
            duration,
            source_url: url.to_string(),
        })
    }
}

impl PlatformExtractor for YoutubeAcquirer {
    fn supports_url(&self, url: &Url) -> bool {
        if host_matches(url, "youtu.be") {
            return url.path().len() > 1;
        }

        host_matches(url, "youtube.com")
            && (url.path() == "/watch"
                || url.path().starts_with("/embed/")
                || url.path().starts_with("/v/")
                || url.path().starts_with("/shorts/")
                || url.path().starts_with("/live/"))
    }

    fn platform_name(&self) -> &'static str {
        "YouTube"
    }

    fn example_url(&self) -> &'static str {
        "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
    }
}

impl Default for YoutubeAcquirer {
    fn default() -> Self {
        Self::new()
    }
}

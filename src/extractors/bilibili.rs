use async_trait::async_trait;
use std::path::{Path, PathBuf};
use url::Url;

use super::{
    host_matches, newest_file_with_extension, run_tool, AcquireError, AudioFormat, AudioHandle,
    MediaAcquirer, PlatformExtractor,
};

const VIDEO_EXTENSIONS: &[&str] = &["flv", "mp4", "webm", "mkv"];

/// Bilibili acquirer: you-get downloads the video, ffmpeg extracts 16 kHz mono speech audio
pub struct BilibiliAcquirer {
    you_get_path: String,
    ffmpeg_path: String,
}

impl BilibiliAcquirer {
    pub fn new() -> Self {
        Self {
            you_get_path: "you-get".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }

    async fn download_video(&self, url: &str, workdir: &Path) -> Result<PathBuf, AcquireError> {
        let video_dir = workdir.join("video");
        fs_err::create_dir_all(&video_dir)?;

        tracing::debug!("Downloading Bilibili video with you-get: {}", url);
        run_tool(&self.you_get_path, &["-o", &video_dir.to_string_lossy(), url]).await?;

        newest_file_with_extension(&video_dir, VIDEO_EXTENSIONS)?.ok_or_else(|| {
            AcquireError::MediaUnavailable(format!("you-get produced no video file for {}", url))
        })
    }

    async fn extract_audio(&self, video: &Path, workdir: &Path) -> Result<PathBuf, AcquireError> {
        let audio = workdir.join("audio.mp3");

        run_tool(
            &self.ffmpeg_path,
            &[
                "-y",
                "-i",
                &video.to_string_lossy(),
                "-vn",
                "-ac",
                "1",
                "-ar",
                "16000",
                "-b:a",
                "48k",
                &audio.to_string_lossy(),
            ],
        )
        .await
        .map_err(|err| match err {
            // ffmpeg failing on a downloaded file is a decoding problem, not a network one
            AcquireError::NetworkFailure(msg) => AcquireError::MediaUnavailable(msg),
            other => other,
        })?;

        Ok(audio)
    }
}

#[async_trait]
impl MediaAcquirer for BilibiliAcquirer {
    async fn acquire(&self, url: &str, workdir: &Path) -> Result<AudioHandle, AcquireError> {
        let video = self.download_video(url, workdir).await?;

        // you-get names the file after the video title
        let title = video
            .file_stem()
            .map(|stem| stem.to_string_lossy().trim().to_string())
            .filter(|stem| !stem.is_empty());

        let path = self.extract_audio(&video, workdir).await?;

        if let Err(err) = fs_err::remove_file(&video) {
            tracing::debug!("Could not remove intermediate video: {}", err);
        }

        Ok(AudioHandle {
            path,
            format: AudioFormat::Mp3,
            title,
            duration: None,
            source_url: url.to_string(),
        })
    }
}

impl PlatformExtractor for BilibiliAcquirer {
    fn supports_url(&self, url: &Url) -> bool {
        if host_matches(url, "b23.tv") {
            return url.path().len() > 1;
        }

        host_matches(url, "bilibili.com") && url.path().starts_with("/video/")
    }

    fn platform_name(&self) -> &'static str {
        "Bilibili"
    }

    fn example_url(&self) -> &'static str {
        "https://www.bilibili.com/video/BV1GJ411x7h7"
    }
}

impl Default for BilibiliAcquirer {
    fn default() -> Self {
        Self::new()
    }
}

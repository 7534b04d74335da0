use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use url::Url;

use super::{host_matches, AcquireError, AudioFormat, AudioHandle, MediaAcquirer, PlatformExtractor};

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/120.0 Safari/537.36";

const LD_JSON_TAG: &str = "<script type=\"application/ld+json\"";

/// Episode metadata embedded in the page as schema.org JSON-LD
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EpisodeLd {
    name: Option<String>,
    associated_media: Option<MediaObject>,
    part_of_series: Option<Series>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaObject {
    content_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Series {
    name: Option<String>,
}

#[derive(Debug, PartialEq)]
struct EpisodeInfo {
    title: String,
    audio_url: String,
    podcast_title: Option<String>,
}

/// Xiaoyuzhou podcast acquirer: reads the episode page, then streams the audio file
pub struct XiaoyuzhouAcquirer {
    client: reqwest::Client,
}

impl XiaoyuzhouAcquirer {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self { client }
    }

    /// Pull episode title and audio URL out of the page's JSON-LD block
    fn parse_episode_page(html: &str) -> Result<EpisodeInfo, AcquireError> {
        let unavailable = || AcquireError::MediaUnavailable("no episode information found on page".to_string());

        let tag_start = html.find(LD_JSON_TAG).ok_or_else(unavailable)?;
        let body_start = tag_start + html[tag_start..].find('>').ok_or_else(unavailable)? + 1;
        let body_end = body_start + html[body_start..].find("</script>").ok_or_else(unavailable)?;

        let ld: EpisodeLd = serde_json::from_str(html[body_start..body_end].trim())
            .map_err(|e| AcquireError::MediaUnavailable(format!("malformed episode metadata: {}", e)))?;

        let audio_url = ld
            .associated_media
            .and_then(|media| media.content_url)
            .filter(|url| !url.is_empty())
            .ok_or_else(unavailable)?;

        Ok(EpisodeInfo {
            title: ld.name.unwrap_or_default(),
            audio_url,
            podcast_title: ld.part_of_series.and_then(|series| series.name),
        })
    }

    fn classify_http_error(err: reqwest::Error) -> AcquireError {
        match err.status() {
            Some(status) if status.is_server_error() => AcquireError::NetworkFailure(err.to_string()),
            Some(_) => AcquireError::MediaUnavailable(err.to_string()),
            None => AcquireError::NetworkFailure(err.to_string()),
        }
    }

    async fn fetch_episode_info(&self, url: &str) -> Result<EpisodeInfo, AcquireError> {
        let html = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(Self::classify_http_error)?
            .text()
            .await
            .map_err(Self::classify_http_error)?;

        Self::parse_episode_page(&html)
    }

    /// Stream the audio to a partial file, renaming it once complete
    async fn download_file(&self, audio_url: &str, target: &Path) -> Result<u64, AcquireError> {
        let response = self
            .client
            .get(audio_url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(Self::classify_http_error)?;

        let partial = target.with_extension("part");
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(Self::classify_http_error)?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        drop(file);
        tokio::fs::rename(&partial, target).await?;

        Ok(written)
    }

    fn audio_format(audio_url: &str) -> AudioFormat {
        Url::parse(audio_url)
            .ok()
            .and_then(|url| {
                Path::new(url.path())
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .and_then(AudioFormat::from_extension)
            })
            .unwrap_or(AudioFormat::Mp3)
    }
}

#[async_trait]
impl MediaAcquirer for XiaoyuzhouAcquirer {
    async fn acquire(&self, url: &str, workdir: &Path) -> Result<AudioHandle, AcquireError> {
        let episode = self.fetch_episode_info(url).await?;
        tracing::debug!(
            "Found episode '{}' of {}",
            episode.title,
            episode.podcast_title.as_deref().unwrap_or("unknown podcast")
        );

        let format = Self::audio_format(&episode.audio_url);
        let path: PathBuf = workdir.join(format!("audio.{}", format.as_str()));
        let bytes = self.download_file(&episode.audio_url, &path).await?;

        tracing::debug!("Downloaded {}", crate::utils::format_file_size(bytes));

        Ok(AudioHandle {
            path,
            format,
            title: Some(episode.title).filter(|title| !title.trim().is_empty()),
            duration: None,
            source_url: url.to_string(),
        })
    }
}

impl PlatformExtractor for XiaoyuzhouAcquirer {
    fn supports_url(&self, url: &Url) -> bool {
        host_matches(url, "xiaoyuzhoufm.com") && url.path().starts_with("/episode/")
    }

    fn platform_name(&self) -> &'static str {
        "Xiaoyuzhou"
    }

    fn example_url(&self) -> &'static str {
        "https://www.xiaoyuzhoufm.com/episode/<episode-id>"
    }
}

impl Default for XiaoyuzhouAcquirer {
    fn default() -> Self {
        Self::new()
    }
}

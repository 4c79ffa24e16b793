use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::config::TranscriptConfig;
use super::{MetadataSource, SourceError, SourceKind, VideoMetadata};

/// Subset of the extraction tool's `--dump-json` output we care about.
#[derive(Debug, Deserialize)]
struct DumpedInfo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    uploader: Option<String>,
}

impl From<DumpedInfo> for VideoMetadata {
    fn from(info: DumpedInfo) -> Self {
        Self {
            title: info.title.unwrap_or_default(),
            description: info.description.unwrap_or_default(),
            tags: info.tags.unwrap_or_default(),
            channel: info.channel.or(info.uploader).unwrap_or_default(),
        }
    }
}

/// Classify a failed extraction from its stderr.
///
/// The tool exposes no structured error codes, so this is a best-effort reading
/// of its messages. Anything unrecognized is reported as a transport failure.
fn classify_failure(stderr: &str) -> SourceError {
    let lowered = stderr.to_lowercase();
    if lowered.contains("sign in to confirm") || lowered.contains("age-restricted") || lowered.contains("members-only") {
        SourceError::AccessRestricted
    } else if lowered.contains("video unavailable") || lowered.contains("private video") || lowered.contains("has been removed") {
        SourceError::Unavailable
    } else {
        SourceError::Transport(stderr.lines().last().unwrap_or("extraction failed").trim().to_string())
    }
}

/// Metadata from the yt-dlp command-line tool.
pub struct YtDlpMetadata {
    config: TranscriptConfig,
}

impl YtDlpMetadata {
    pub fn new(config: TranscriptConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MetadataSource for YtDlpMetadata {
    fn kind(&self) -> SourceKind {
        SourceKind::MetadataFallback
    }

    async fn metadata(&self, video_id: &str) -> std::result::Result<VideoMetadata, SourceError> {
        let url = format!("{}?v={}", self.config.watch_url, video_id);
        debug!("Running {} for {}", self.config.ytdlp_path, url);

        let output = Command::new(&self.config.ytdlp_path)
            .arg("--dump-json")
            .arg("--skip-download")
            .arg("--no-warnings")
            .arg("--no-playlist")
            .arg(&url)
            .output()
            .await
            .map_err(|e| SourceError::Transport(format!("failed to run {}: {}", self.config.ytdlp_path, e)))?;

        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr)));
        }

        let info: DumpedInfo = serde_json::from_slice(&output.stdout)
            .map_err(|e| SourceError::Transport(format!("unreadable extraction output: {}", e)))?;
        Ok(info.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dumped_info_prefers_channel_over_uploader() {
        let info: DumpedInfo = serde_json::from_str(
            r#"{"title":"T","description":"D","tags":["a","b"],"uploader":"U","channel":"C","duration":12}"#,
        )
        .unwrap();
        let meta: VideoMetadata = info.into();
        assert_eq!(meta.channel, "C");
        assert_eq!(meta.tags, vec!["a", "b"]);

        let info: DumpedInfo = serde_json::from_str(r#"{"title":"T","uploader":"U","tags":null}"#).unwrap();
        let meta: VideoMetadata = info.into();
        assert_eq!(meta.channel, "U");
        assert!(meta.tags.is_empty());
    }

    #[test]
    fn test_failure_classification() {
        assert_eq!(
            classify_failure("ERROR: [youtube] abc: Sign in to confirm your age. This video may be inappropriate"),
            SourceError::AccessRestricted
        );
        assert_eq!(classify_failure("ERROR: [youtube] abc: Video unavailable"), SourceError::Unavailable);
        assert!(matches!(classify_failure("ERROR: HTTP Error 429"), SourceError::Transport(_)));
    }

    #[tokio::test]
    async fn test_missing_binary_is_transport_error() {
        let mut config = crate::config::Config::default().transcript;
        config.ytdlp_path = "/nonexistent/yt-dlp-binary".to_string();
        let source = YtDlpMetadata::new(config);
        let err = source.metadata("dQw4w9WgXcQ").await.unwrap_err();
        assert!(matches!(err, SourceError::Transport(_)));
    }
}

// Watch-page backed sources: caption tracks and the scrape fallback.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

use crate::config::TranscriptConfig;
use crate::error::{Result, ModyfireError};
use super::{CaptionSegment, CaptionSource, MetadataSource, SourceError, SourceKind, TrackInfo, VideoMetadata};

pub fn build_client(config: &TranscriptConfig) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| ModyfireError::Config(format!("Failed to build HTTP client: {}", e)))
}

async fn fetch_watch_page(client: &Client, config: &TranscriptConfig, video_id: &str) -> std::result::Result<String, SourceError> {
    let response = client
        .get(&config.watch_url)
        .query(&[("v", video_id), ("hl", "en")])
        .header("Accept-Language", "en-US,en;q=0.9")
        .send()
        .await
        .map_err(|e| SourceError::Transport(format!("watch page request failed: {}", e)))?;

    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(SourceError::Unavailable);
    }
    if !status.is_success() {
        return Err(SourceError::Transport(format!("watch page returned {}", status)));
    }

    response
        .text()
        .await
        .map_err(|e| SourceError::Transport(format!("failed to read watch page: {}", e)))
}

/// Classify the player's playability status embedded in the watch page.
pub fn playability_error(html: &str) -> Option<SourceError> {
    static STATUS_RE: OnceLock<Regex> = OnceLock::new();
    let re = STATUS_RE.get_or_init(|| {
        Regex::new(r#""playabilityStatus"\s*:\s*\{\s*"status"\s*:\s*"([A-Z_]+)""#)
            .expect("playability regex should compile")
    });

    let status = re.captures(html)?.get(1)?.as_str();
    match status {
        "OK" | "LIVE_STREAM_OFFLINE" => None,
        "LOGIN_REQUIRED" | "AGE_CHECK_REQUIRED" | "AGE_VERIFICATION_REQUIRED" | "CONTENT_CHECK_REQUIRED" => {
            Some(SourceError::AccessRestricted)
        }
        _ => Some(SourceError::Unavailable),
    }
}

/// Slice out the JSON array that follows `"key":` in a page, honoring nested
/// brackets and string escapes.
pub fn extract_json_array<'a>(html: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!("\"{}\":", key);
    let start = html.find(&needle)? + needle.len();
    let rest = &html[start..];
    let open = rest.find('[')?;
    if !rest[..open].trim().is_empty() {
        return None;
    }

    let body = &rest[open..];
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&body[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Debug, Deserialize)]
struct TimedText {
    #[serde(default)]
    events: Vec<TimedEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimedEvent {
    #[serde(default)]
    t_start_ms: u64,
    #[serde(default)]
    d_duration_ms: u64,
    #[serde(default)]
    segs: Vec<TimedSeg>,
}

#[derive(Debug, Deserialize)]
struct TimedSeg {
    #[serde(default)]
    utf8: String,
}

fn timed_text_to_segments(timed: TimedText) -> Vec<CaptionSegment> {
    timed
        .events
        .into_iter()
        .filter_map(|event| {
            let text: String = event.segs.iter().map(|s| s.utf8.as_str()).collect();
            let text = text.replace('\n', " ").trim().to_string();
            if text.is_empty() {
                return None;
            }
            Some(CaptionSegment {
                text,
                start: event.t_start_ms as f64 / 1000.0,
                duration: event.d_duration_ms as f64 / 1000.0,
            })
        })
        .collect()
}

/// Caption tracks listed on the public watch page.
pub struct YoutubeCaptions {
    client: Client,
    config: TranscriptConfig,
}

impl YoutubeCaptions {
    pub fn new(client: Client, config: TranscriptConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl CaptionSource for YoutubeCaptions {
    async fn tracks(&self, video_id: &str) -> std::result::Result<Vec<TrackInfo>, SourceError> {
        let html = fetch_watch_page(&self.client, &self.config, video_id).await?;
        if let Some(err) = playability_error(&html) {
            return Err(err);
        }
        caption_tracks(&html)
    }

    async fn download(&self, track: &TrackInfo) -> std::result::Result<Vec<CaptionSegment>, SourceError> {
        debug!("Fetching caption track {} ({:?})", track.language_code, track.kind);

        let url = format!("{}&fmt=json3", track.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SourceError::Transport(format!("caption request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(SourceError::Transport(format!("caption request returned {}", response.status())));
        }

        let timed: TimedText = response
            .json()
            .await
            .map_err(|e| SourceError::Transport(format!("unreadable caption payload: {}", e)))?;

        let segments = timed_text_to_segments(timed);
        if segments.is_empty() {
            return Err(SourceError::NotFound);
        }
        Ok(segments)
    }
}

/// Caption track list embedded in a watch page. No list means captions are off.
pub fn caption_tracks(html: &str) -> std::result::Result<Vec<TrackInfo>, SourceError> {
    let tracks: Vec<TrackInfo> = match extract_json_array(html, "captionTracks") {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| SourceError::Transport(format!("unreadable caption track list: {}", e)))?,
        None => return Err(SourceError::Disabled),
    };
    if tracks.is_empty() {
        return Err(SourceError::Disabled);
    }
    Ok(tracks)
}

fn unescape_html(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Read title, description, keywords and channel out of raw watch-page markup.
pub fn scrape_metadata(html: &str) -> VideoMetadata {
    static OG_TITLE: OnceLock<Regex> = OnceLock::new();
    static TITLE_TAG: OnceLock<Regex> = OnceLock::new();
    static DESCRIPTION: OnceLock<Regex> = OnceLock::new();
    static KEYWORDS: OnceLock<Regex> = OnceLock::new();
    static AUTHOR: OnceLock<Regex> = OnceLock::new();

    let og_title = OG_TITLE.get_or_init(|| {
        Regex::new(r#"<meta\s+property="og:title"\s+content="([^"]*)""#).expect("og:title regex should compile")
    });
    let title_tag = TITLE_TAG.get_or_init(|| {
        Regex::new(r"(?s)<title>(.*?)</title>").expect("title regex should compile")
    });
    let description = DESCRIPTION.get_or_init(|| {
        Regex::new(r#"<meta\s+(?:name="description"|property="og:description")\s+content="([^"]*)""#)
            .expect("description regex should compile")
    });
    let keywords = KEYWORDS.get_or_init(|| {
        Regex::new(r#"<meta\s+name="keywords"\s+content="([^"]*)""#).expect("keywords regex should compile")
    });
    let author = AUTHOR.get_or_init(|| {
        Regex::new(r#""author"\s*:\s*"([^"]*)""#).expect("author regex should compile")
    });

    let capture = |re: &Regex| re.captures(html).and_then(|c| c.get(1)).map(|m| unescape_html(m.as_str().trim()));

    let title = capture(og_title)
        .or_else(|| capture(title_tag).map(|t| t.trim_end_matches(" - YouTube").trim().to_string()))
        .unwrap_or_default();

    VideoMetadata {
        title,
        description: capture(description).unwrap_or_default(),
        tags: capture(keywords)
            .map(|k| k.split(',').map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect())
            .unwrap_or_default(),
        channel: capture(author).unwrap_or_default(),
    }
}

/// Last-resort fallback: unauthenticated page fetch plus pattern matching.
pub struct PageScrapeMetadata {
    client: Client,
    config: TranscriptConfig,
}

impl PageScrapeMetadata {
    pub fn new(client: Client, config: TranscriptConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl MetadataSource for PageScrapeMetadata {
    fn kind(&self) -> SourceKind {
        SourceKind::ScrapeFallback
    }

    async fn metadata(&self, video_id: &str) -> std::result::Result<VideoMetadata, SourceError> {
        let html = fetch_watch_page(&self.client, &self.config, video_id).await?;
        if let Some(err) = playability_error(&html) {
            return Err(err);
        }
        let meta = scrape_metadata(&html);
        if meta.is_empty() {
            return Err(SourceError::NotFound);
        }
        Ok(meta)
    }
}

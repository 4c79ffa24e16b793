// Transcript resolution
//
// A video reference becomes text through a fixed chain of sources:
// - Captions: authored, then machine-generated, then any track (youtube.rs)
// - Metadata: the yt-dlp extraction tool (metadata.rs)
// - Scrape: an unauthenticated watch-page fetch (youtube.rs)
//
// The caption track list is fetched once per resolve. Caption tiers only
// advance on `SourceError::NotFound`; anything else either jumps to the
// metadata tiers or ends resolution with a typed error.

pub mod metadata;
pub mod video_id;
pub mod youtube;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use video_id::extract_video_id;
use crate::config::TranscriptConfig;
use crate::error::{Result, ModyfireError, UnresolvableReason};

/// Which caption track a tier asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionTrack {
    /// Authored captions in the requested language family
    Manual,
    /// Machine-generated captions in the requested language family
    Generated,
    /// Whatever track exists, any language
    Any,
}

/// Closed set of outcomes a transcript source can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// This tier has nothing; the next tier may
    NotFound,
    /// The uploader turned captions off
    Disabled,
    /// Private, removed, or nonexistent video
    Unavailable,
    /// Sign-in or age check required
    AccessRestricted,
    /// The service could not be reached or answered garbage
    Transport(String),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => f.write_str("not found"),
            Self::Disabled => f.write_str("captions disabled"),
            Self::Unavailable => f.write_str("video unavailable"),
            Self::AccessRestricted => f.write_str("access restricted"),
            Self::Transport(msg) => write!(f, "transport error: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionSegment {
    pub text: String,
    pub start: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub channel: String,
}

impl VideoMetadata {
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty() && self.description.trim().is_empty()
    }

    /// Flatten into the text block handed to the prompt engine.
    pub fn to_text(&self) -> String {
        let mut lines = Vec::new();
        if !self.title.trim().is_empty() {
            lines.push(format!("Title: {}", self.title.trim()));
        }
        if !self.channel.trim().is_empty() {
            lines.push(format!("Channel: {}", self.channel.trim()));
        }
        if !self.tags.is_empty() {
            lines.push(format!("Tags: {}", self.tags.join(", ")));
        }
        if !self.description.trim().is_empty() {
            lines.push(format!("Description: {}", self.description.trim()));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    ManualCaptions,
    AutoCaptions,
    AnyCaptions,
    MetadataFallback,
    ScrapeFallback,
}

impl SourceKind {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::MetadataFallback | Self::ScrapeFallback)
    }
}

/// Text describing a video. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedTranscript {
    text: String,
    source_kind: SourceKind,
    is_degraded: bool,
}

impl ResolvedTranscript {
    pub fn new(text: String, source_kind: SourceKind) -> Result<Self> {
        if text.trim().is_empty() {
            return Err(ModyfireError::Unresolvable { reason: UnresolvableReason::NoContent });
        }
        Ok(Self {
            text,
            source_kind,
            is_degraded: source_kind.is_degraded(),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn source_kind(&self) -> SourceKind {
        self.source_kind
    }

    pub fn is_degraded(&self) -> bool {
        self.is_degraded
    }
}

/// One caption track listed for a video.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub base_url: String,
    pub language_code: String,
    /// "asr" for machine-generated tracks
    #[serde(default)]
    pub kind: Option<String>,
}

impl TrackInfo {
    pub fn is_generated(&self) -> bool {
        self.kind.as_deref() == Some("asr")
    }

    pub fn in_family(&self, languages: &[String]) -> bool {
        languages.iter().any(|code| {
            self.language_code == *code || self.language_code.starts_with(&format!("{}-", code))
        })
    }
}

/// Pick the track a tier asks for out of the listed ones.
pub fn choose_track<'a>(tracks: &'a [TrackInfo], track: CaptionTrack, languages: &[String]) -> Option<&'a TrackInfo> {
    match track {
        CaptionTrack::Manual => tracks.iter().find(|t| !t.is_generated() && t.in_family(languages)),
        CaptionTrack::Generated => tracks.iter().find(|t| t.is_generated() && t.in_family(languages)),
        CaptionTrack::Any => tracks.iter().find(|t| !t.is_generated()).or_else(|| tracks.first()),
    }
}

/// Caption listing and download. The resolver lists once per call and
/// downloads per tier.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CaptionSource: Send + Sync {
    /// Every track the video offers. `Disabled` when captions are off.
    async fn tracks(&self, video_id: &str) -> std::result::Result<Vec<TrackInfo>, SourceError>;

    async fn download(&self, track: &TrackInfo) -> std::result::Result<Vec<CaptionSegment>, SourceError>;
}

/// Video metadata retrieval used when captions are missing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Which fallback tier this source represents
    fn kind(&self) -> SourceKind;

    async fn metadata(&self, video_id: &str) -> std::result::Result<VideoMetadata, SourceError>;
}

/// Map a language name or code onto the caption language family codes.
pub fn language_codes(language: &str) -> Vec<String> {
    let normalized = language.trim().to_lowercase();
    let code = match normalized.as_str() {
        "english" => "en",
        "spanish" | "español" | "espanol" => "es",
        "french" | "français" | "francais" => "fr",
        "german" | "deutsch" => "de",
        "italian" => "it",
        "portuguese" => "pt",
        "dutch" => "nl",
        "russian" => "ru",
        "polish" => "pl",
        "turkish" => "tr",
        "arabic" => "ar",
        "hindi" => "hi",
        "japanese" => "ja",
        "korean" => "ko",
        "chinese" | "mandarin" => "zh",
        "vietnamese" => "vi",
        "indonesian" => "id",
        other if (2..=3).contains(&other.len()) && other.chars().all(|c| c.is_ascii_lowercase()) => other,
        other => {
            // Region-qualified codes such as "pt-BR" keep their base family
            match other.split_once('-') {
                Some((base, _)) if base.len() == 2 && base.chars().all(|c| c.is_ascii_lowercase()) => base,
                _ => "en",
            }
        }
    };
    vec![code.to_string()]
}

/// Resolves video references into text through the caption and metadata tiers.
pub struct TranscriptResolver {
    captions: Box<dyn CaptionSource>,
    metadata: Vec<Box<dyn MetadataSource>>,
}

impl TranscriptResolver {
    /// Build the production chain: watch-page captions, yt-dlp metadata, page scrape.
    pub fn new(config: TranscriptConfig) -> Result<Self> {
        let client = youtube::build_client(&config)?;
        Ok(Self {
            captions: Box::new(youtube::YoutubeCaptions::new(client.clone(), config.clone())),
            metadata: vec![
                Box::new(metadata::YtDlpMetadata::new(config.clone())),
                Box::new(youtube::PageScrapeMetadata::new(client, config)),
            ],
        })
    }

    pub fn with_sources(captions: Box<dyn CaptionSource>, metadata: Vec<Box<dyn MetadataSource>>) -> Self {
        Self { captions, metadata }
    }

    /// Resolve a reference into text, preferring captions in `language`.
    pub async fn resolve(&self, reference: &str, language: &str) -> Result<ResolvedTranscript> {
        let video_id = extract_video_id(reference)?;
        let languages = language_codes(language);
        info!("Resolving transcript for video {} (languages: {:?})", video_id, languages);

        let mut reason = UnresolvableReason::NoContent;

        let tracks = match self.captions.tracks(&video_id).await {
            Ok(tracks) if !tracks.is_empty() => tracks,
            Ok(_) | Err(SourceError::Disabled) => {
                info!("Captions disabled for {}, falling back to metadata", video_id);
                reason = UnresolvableReason::CaptionsDisabled;
                Vec::new()
            }
            Err(SourceError::NotFound) => Vec::new(),
            Err(SourceError::AccessRestricted) => {
                warn!("Captions for {} require sign-in, falling back to metadata", video_id);
                reason = UnresolvableReason::AccessRestricted;
                Vec::new()
            }
            Err(SourceError::Unavailable) => {
                return Err(ModyfireError::Unresolvable { reason: UnresolvableReason::VideoUnavailable });
            }
            Err(SourceError::Transport(msg)) => return Err(ModyfireError::TranscriptService(msg)),
        };

        let tiers = [
            (CaptionTrack::Manual, SourceKind::ManualCaptions),
            (CaptionTrack::Generated, SourceKind::AutoCaptions),
            (CaptionTrack::Any, SourceKind::AnyCaptions),
        ];
        let mut tried: Vec<&str> = Vec::new();
        for (track, kind) in tiers {
            if tracks.is_empty() {
                break;
            }
            let Some(chosen) = choose_track(&tracks, track, &languages) else {
                debug!("No {:?} captions for {}", track, video_id);
                continue;
            };
            if tried.contains(&chosen.base_url.as_str()) {
                continue;
            }
            tried.push(&chosen.base_url);

            match self.captions.download(chosen).await {
                Ok(segments) => {
                    let text = join_segments(&segments);
                    if text.is_empty() {
                        debug!("{:?} captions for {} were empty, trying next tier", track, video_id);
                        continue;
                    }
                    info!("Resolved {} via {:?} ({} segments)", video_id, kind, segments.len());
                    return ResolvedTranscript::new(text, kind);
                }
                Err(SourceError::NotFound) => {
                    debug!("{:?} track for {} had no captions", track, video_id);
                }
                Err(SourceError::Disabled) => {
                    reason = UnresolvableReason::CaptionsDisabled;
                    break;
                }
                Err(SourceError::AccessRestricted) => {
                    warn!("Captions for {} require sign-in, falling back to metadata", video_id);
                    reason = UnresolvableReason::AccessRestricted;
                    break;
                }
                Err(SourceError::Unavailable) => {
                    return Err(ModyfireError::Unresolvable { reason: UnresolvableReason::VideoUnavailable });
                }
                Err(SourceError::Transport(msg)) => {
                    return Err(ModyfireError::TranscriptService(msg));
                }
            }
        }

        for source in &self.metadata {
            let kind = source.kind();
            match source.metadata(&video_id).await {
                Ok(meta) if !meta.is_empty() => {
                    info!("Resolved {} via {:?}", video_id, kind);
                    return ResolvedTranscript::new(meta.to_text(), kind);
                }
                Ok(_) => debug!("{:?} returned no usable metadata for {}", kind, video_id),
                Err(e) => {
                    warn!("{:?} failed for {}: {}", kind, video_id, e);
                    match e {
                        SourceError::AccessRestricted => reason = UnresolvableReason::AccessRestricted,
                        SourceError::Unavailable if reason != UnresolvableReason::AccessRestricted => {
                            reason = UnresolvableReason::VideoUnavailable
                        }
                        _ => {}
                    }
                }
            }
        }

        Err(ModyfireError::Unresolvable { reason })
    }
}

fn join_segments(segments: &[CaptionSegment]) -> String {
    segments
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

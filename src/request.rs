use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModyfireError;

/// What the caller wants generated from the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    Summary,
    StudyGuide,
    SlideDeck,
    Quiz,
    Flashcards,
    ClipAnalysis,
    PodcastScript,
    Blog,
    Carousel,
}

impl ContentType {
    pub const ALL: [ContentType; 9] = [
        Self::Summary,
        Self::StudyGuide,
        Self::SlideDeck,
        Self::Quiz,
        Self::Flashcards,
        Self::ClipAnalysis,
        Self::PodcastScript,
        Self::Blog,
        Self::Carousel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::StudyGuide => "study-guide",
            Self::SlideDeck => "slide-deck",
            Self::Quiz => "quiz",
            Self::Flashcards => "flashcards",
            Self::ClipAnalysis => "clip-analysis",
            Self::PodcastScript => "podcast-script",
            Self::Blog => "blog",
            Self::Carousel => "carousel",
        }
    }

    /// Structured types return a JSON array the parser validates.
    pub fn is_structured(&self) -> bool {
        matches!(
            self,
            Self::SlideDeck | Self::Quiz | Self::Flashcards | Self::ClipAnalysis | Self::PodcastScript
        )
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = ModyfireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .iter()
            .copied()
            .find(|ct| ct.as_str() == normalized)
            .or(match normalized.as_str() {
                "slides" => Some(Self::SlideDeck),
                "clips" => Some(Self::ClipAnalysis),
                "script" | "podcast" => Some(Self::PodcastScript),
                _ => None,
            })
            .ok_or_else(|| ModyfireError::Unsupported(format!(
                "Unknown content type '{}'. Valid types: {}",
                s,
                Self::ALL.iter().map(|ct| ct.as_str()).collect::<Vec<_>>().join(", ")
            )))
    }
}

/// Account class of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Student,
    Professor,
    Podcaster,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Professor => "professor",
            Self::Podcaster => "podcaster",
        }
    }

    /// Unknown tier names get the student framing.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = ModyfireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "student" => Ok(Self::Student),
            "professor" | "educator" => Ok(Self::Professor),
            "podcaster" => Ok(Self::Podcaster),
            _ => Err(ModyfireError::Unsupported(format!(
                "Unknown tier '{}'. Valid tiers: student, professor, podcaster",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Professional,
    Fun,
    Academic,
    Neutral,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Professional => "professional",
            Self::Fun => "fun",
            Self::Academic => "academic",
            Self::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tone {
    type Err = ModyfireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "professional" => Ok(Self::Professional),
            "fun" | "casual" => Ok(Self::Fun),
            "academic" => Ok(Self::Academic),
            "neutral" => Ok(Self::Neutral),
            _ => Err(ModyfireError::Unsupported(format!(
                "Unknown tone '{}'. Valid tones: professional, fun, academic, neutral",
                s
            ))),
        }
    }
}

/// How many items the model is asked for. Only requested, never enforced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetCount {
    Range(u32, u32),
    Exact(u32),
    Free(String),
}

impl Default for TargetCount {
    fn default() -> Self {
        Self::Range(6, 10)
    }
}

impl fmt::Display for TargetCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Range(lo, hi) => write!(f, "{}-{}", lo, hi),
            Self::Exact(n) => write!(f, "{}", n),
            Self::Free(s) => f.write_str(s),
        }
    }
}

impl From<&str> for TargetCount {
    fn from(s: &str) -> Self {
        let trimmed = s.trim();
        if let Ok(n) = trimmed.parse::<u32>() {
            return Self::Exact(n);
        }
        if let Some((lo, hi)) = trimmed.split_once('-') {
            if let (Ok(lo), Ok(hi)) = (lo.trim().parse::<u32>(), hi.trim().parse::<u32>()) {
                if lo <= hi {
                    return Self::Range(lo, hi);
                }
            }
        }
        Self::Free(trimmed.to_string())
    }
}

/// Where the text to work from comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Video(String),
    Text(String),
}

/// Per-call parameter bag. Never persisted.
#[derive(Debug, Clone)]
pub struct ContentRequest {
    pub source: Source,
    pub content_type: ContentType,
    pub tier: Tier,
    pub language: String,
    pub tone: Tone,
    pub target_count: TargetCount,
}

impl ContentRequest {
    pub fn new(content_type: ContentType, source: Source) -> Self {
        Self {
            source,
            content_type,
            tier: Tier::default(),
            language: "English".to_string(),
            tone: Tone::default(),
            target_count: TargetCount::default(),
        }
    }

    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_language<S: Into<String>>(mut self, language: S) -> Self {
        let language = language.into();
        if !language.trim().is_empty() {
            self.language = language;
        }
        self
    }

    pub fn with_tone(mut self, tone: Tone) -> Self {
        self.tone = tone;
        self
    }

    pub fn with_target_count(mut self, target_count: TargetCount) -> Self {
        self.target_count = target_count;
        self
    }
}

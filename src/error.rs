use std::fmt;

use thiserror::Error;

/// Why a video reference could not be turned into any text at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnresolvableReason {
    /// Captions are turned off and no metadata could be read either
    CaptionsDisabled,
    /// Sign-in or age verification is required to view the video
    AccessRestricted,
    /// The video is private, removed, or never existed
    VideoUnavailable,
    /// Every source answered but none carried usable text
    NoContent,
}

impl fmt::Display for UnresolvableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::CaptionsDisabled => "captions are disabled for this video and no metadata was available",
            Self::AccessRestricted => "the video is age-restricted or requires sign-in",
            Self::VideoUnavailable => "the video is unavailable",
            Self::NoContent => "no captions or metadata could be retrieved",
        };
        f.write_str(text)
    }
}

#[derive(Error, Debug)]
pub enum ModyfireError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ZIP archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("PDF assembly error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Invalid video reference: {0}")]
    InvalidReference(String),

    #[error("Could not retrieve video content: {reason}")]
    Unresolvable { reason: UnresolvableReason },

    #[error("Transcript service error: {0}")]
    TranscriptService(String),

    #[error("Generation service error: {0}")]
    Generation(String),

    #[error("Rendering error: {0}")]
    Rendering(String),

    #[error("Usage accounting failed: {0}")]
    Accounting(String),

    #[error("Audio synthesis error: {0}")]
    Audio(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported input: {0}")]
    Unsupported(String),
}

impl ModyfireError {
    /// True when the failure was caused by what the caller sent rather than by a
    /// collaborator or by this process.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidReference(_) | Self::Unresolvable { .. } | Self::Unsupported(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ModyfireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(ModyfireError::InvalidReference("x".into()).is_client_error());
        assert!(ModyfireError::Unresolvable { reason: UnresolvableReason::AccessRestricted }.is_client_error());
        assert!(!ModyfireError::Generation("empty".into()).is_client_error());
        assert!(!ModyfireError::Accounting("down".into()).is_client_error());
    }

    #[test]
    fn test_unresolvable_message_carries_reason() {
        let err = ModyfireError::Unresolvable { reason: UnresolvableReason::CaptionsDisabled };
        assert!(err.to_string().contains("captions are disabled"));
    }
}

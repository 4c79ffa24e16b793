use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Result, ModyfireError};

fn url_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?:[?&]v=|/v/|youtu\.be/)([A-Za-z0-9_-]{11})(?:[^A-Za-z0-9_-]|$)",
            r"(?:/embed/)([A-Za-z0-9_-]{11})(?:[^A-Za-z0-9_-]|$)",
            r"(?:/shorts/)([A-Za-z0-9_-]{11})(?:[^A-Za-z0-9_-]|$)",
            r"^([A-Za-z0-9_-]{11})$",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("video id pattern should compile"))
        .collect()
    })
}

/// Pull the canonical 11-character id out of any recognized URL shape or a bare id.
pub fn extract_video_id(reference: &str) -> Result<String> {
    let reference = reference.trim();
    url_patterns()
        .iter()
        .find_map(|pattern| pattern.captures(reference))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| ModyfireError::InvalidReference(format!(
            "Could not extract video ID from '{}'",
            reference
        )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_url_shape_yields_same_id() {
        let references = [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ&t=42",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ?feature=shared",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/v/dQw4w9WgXcQ",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "https://youtube.com/shorts/dQw4w9WgXcQ?feature=share",
            "http://www.youtube.com/shorts/dQw4w9WgXcQ",
            "dQw4w9WgXcQ",
            "  dQw4w9WgXcQ\n",
        ];
        for reference in references {
            assert_eq!(extract_video_id(reference).unwrap(), "dQw4w9WgXcQ", "{}", reference);
        }
    }

    #[test]
    fn test_ids_with_dash_and_underscore() {
        assert_eq!(extract_video_id("https://youtu.be/5_EJwYeQusM").unwrap(), "5_EJwYeQusM");
        assert_eq!(extract_video_id("a-b_c-d_e-f").unwrap(), "a-b_c-d_e-f");
    }

    #[test]
    fn test_unrecognized_references_are_rejected() {
        for reference in ["", "https://vimeo.com/123456", "https://youtube.com/watch?v=123", "tooshort", "dQw4w9WgXcQX"] {
            let err = extract_video_id(reference).unwrap_err();
            assert!(matches!(err, ModyfireError::InvalidReference(_)), "{}", reference);
        }
    }
}

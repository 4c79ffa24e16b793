use serde::{Deserialize, Serialize};
use std::path::Path;
use crate::error::{Result, ModyfireError};

fn default_max_retries() -> u32 {
    0
}

fn default_cleanup_delay_secs() -> u64 {
    86_400
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub generation: GenerationConfig,
    pub transcript: TranscriptConfig,
    pub export: ExportConfig,
    pub policy: PolicyConfig,
    pub usage: UsageConfig,
    pub audio: AudioConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Base URL of the text-generation API
    pub endpoint: String,
    /// API key; falls back to the GEMINI_API_KEY environment variable when empty
    pub api_key: String,
    /// Model used for structured content and student-tier narratives
    pub default_model: String,
    /// Model used for professor and podcaster narratives
    pub pro_model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Extra attempts on transport failures only
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptConfig {
    /// Base URL for watch pages
    pub watch_url: String,
    /// Path to the metadata extraction tool
    pub ytdlp_path: String,
    /// User agent sent with page fetches
    pub user_agent: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Theme used when the request names none
    pub default_theme: String,
    /// Overlay text stamped on watermarked exports
    pub watermark_text: String,
    /// Directory image references are resolved against
    pub asset_root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Tier whose low-credit callers get watermarked output
    pub watermark_tier: String,
    /// Callers at or below this many credits are watermarked
    pub credit_threshold: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageConfig {
    /// Webhook receiving usage records; empty logs locally
    pub endpoint: String,
    /// Shared secret included in every record; falls back to USAGE_WEBHOOK_SECRET
    pub secret: String,
    /// USD per million prompt tokens
    pub input_cost_per_million: f64,
    /// USD per million response tokens
    pub output_cost_per_million: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Speech endpoint path appended to the regional host
    pub endpoint_path: String,
    /// Spoken language code
    pub language: String,
    /// Regional host suffix of the primary voice
    pub primary_tld: String,
    /// Regional host suffix of the secondary voice
    pub secondary_tld: String,
    /// Speaker names that always use the secondary voice
    pub secondary_names: Vec<String>,
    /// Substrings of a speaker label that select the secondary voice
    pub secondary_keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for stored artifacts
    pub root: String,
    /// Seconds before generated uploads are removed
    #[serde(default = "default_cleanup_delay_secs")]
    pub cleanup_delay_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            generation: GenerationConfig {
                endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                api_key: String::new(),
                default_model: "gemini-2.5-flash".to_string(),
                pro_model: "gemini-2.5-pro".to_string(),
                timeout_secs: 120,
                max_retries: 0,
            },
            transcript: TranscriptConfig {
                watch_url: "https://www.youtube.com/watch".to_string(),
                ytdlp_path: "yt-dlp".to_string(),
                user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string(),
                timeout_secs: 30,
            },
            export: ExportConfig {
                default_theme: "default".to_string(),
                watermark_text: "Generated by MODYFIRE".to_string(),
                asset_root: "static".to_string(),
            },
            policy: PolicyConfig {
                watermark_tier: "student".to_string(),
                credit_threshold: 1,
            },
            usage: UsageConfig {
                endpoint: String::new(),
                secret: String::new(),
                input_cost_per_million: 0.075,
                output_cost_per_million: 0.30,
            },
            audio: AudioConfig {
                endpoint_path: "translate_tts".to_string(),
                language: "en".to_string(),
                primary_tld: "com".to_string(),
                secondary_tld: "co.uk".to_string(),
                secondary_names: vec!["Sam".to_string()],
                secondary_keywords: vec!["Expert".to_string()],
            },
            storage: StorageConfig {
                root: "user_uploads".to_string(),
                cleanup_delay_secs: 86_400,
            },
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ModyfireError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| ModyfireError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ModyfireError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ModyfireError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Fill secrets left empty in the file from the process environment.
    pub fn apply_env_overrides(&mut self) {
        if self.generation.api_key.is_empty() {
            if let Ok(key) = std::env::var("GEMINI_API_KEY") {
                self.generation.api_key = key;
            }
        }
        if self.usage.secret.is_empty() {
            if let Ok(secret) = std::env::var("USAGE_WEBHOOK_SECRET") {
                self.usage.secret = secret;
            }
        }
    }
}

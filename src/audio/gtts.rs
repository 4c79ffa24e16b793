use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::config::AudioConfig;
use crate::error::{ModyfireError, Result};
use super::{SpeechEngine, Voice};

/// Longest text the translate TTS endpoint accepts per request.
const MAX_CHUNK_CHARS: usize = 100;

/// Speech from the Google Translate TTS endpoint. The two voices are the same
/// synthesizer served from different regional hosts.
pub struct GoogleTts {
    client: Client,
    config: AudioConfig,
}

impl GoogleTts {
    pub fn new(config: AudioConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko)")
            .build()
            .map_err(|e| ModyfireError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn url(&self, voice: Voice) -> String {
        let tld = match voice {
            Voice::Primary => &self.config.primary_tld,
            Voice::Secondary => &self.config.secondary_tld,
        };
        format!("https://translate.google.{}/{}", tld, self.config.endpoint_path.trim_start_matches('/'))
    }
}

/// Split text into request-sized pieces, preferring sentence and word boundaries.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    let flush = |current: &mut String, chunks: &mut Vec<String>| {
        let trimmed = current.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        current.clear();
    };

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if word_len > max_chars {
            flush(&mut current, &mut chunks);
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }
        let needed = if current.is_empty() { word_len } else { current.chars().count() + 1 + word_len };
        if needed > max_chars {
            flush(&mut current, &mut chunks);
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
        if word.ends_with(['.', '!', '?', ';']) && current.chars().count() > max_chars / 2 {
            flush(&mut current, &mut chunks);
        }
    }
    flush(&mut current, &mut chunks);
    chunks
}

#[async_trait]
impl SpeechEngine for GoogleTts {
    async fn speak(&self, text: &str, voice: Voice) -> Result<Vec<u8>> {
        let url = self.url(voice);
        let chunks = chunk_text(text, MAX_CHUNK_CHARS);
        let total = chunks.len().to_string();
        let mut audio = Vec::new();

        for (idx, chunk) in chunks.iter().enumerate() {
            debug!("TTS request {}/{} to {}", idx + 1, total, url);
            let idx = idx.to_string();
            let textlen = chunk.chars().count().to_string();
            let response = self
                .client
                .get(&url)
                .query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", self.config.language.as_str()),
                    ("q", chunk.as_str()),
                    ("idx", idx.as_str()),
                    ("total", total.as_str()),
                    ("textlen", textlen.as_str()),
                ])
                .send()
                .await
                .map_err(|e| ModyfireError::Audio(format!("speech request failed: {}", e)))?;

            if !response.status().is_success() {
                return Err(ModyfireError::Audio(format!("speech service answered {}", response.status())));
            }
            audio.extend_from_slice(&response.bytes().await?);
        }
        Ok(audio)
    }
}

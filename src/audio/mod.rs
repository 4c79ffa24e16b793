// Podcast audio
//
// Each dialogue line is spoken by a `SpeechEngine` in the voice its speaker maps to.
// Clips are staged as files in a private temporary directory and concatenated in
// script order; the directory is removed whether synthesis succeeds or not.

pub mod gtts;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::AudioConfig;
use crate::error::{ModyfireError, Result};
use crate::parse::DialogueLine;

pub use gtts::GoogleTts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Voice {
    Primary,
    Secondary,
}

/// Speaker label to voice assignment.
#[derive(Debug, Clone, Default)]
pub struct VoiceMap {
    secondary_names: Vec<String>,
    secondary_keywords: Vec<String>,
}

impl VoiceMap {
    pub fn new(secondary_names: Vec<String>, secondary_keywords: Vec<String>) -> Self {
        Self { secondary_names, secondary_keywords }
    }

    pub fn from_config(config: &AudioConfig) -> Self {
        Self::new(config.secondary_names.clone(), config.secondary_keywords.clone())
    }

    /// Exact name match or keyword substring selects the secondary voice.
    pub fn voice_for(&self, speaker: &str) -> Voice {
        let speaker = speaker.trim();
        if self.secondary_names.iter().any(|n| n == speaker)
            || self.secondary_keywords.iter().any(|k| !k.is_empty() && speaker.contains(k.as_str()))
        {
            Voice::Secondary
        } else {
            Voice::Primary
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Encoded audio (MP3) for `text` spoken in `voice`.
    async fn speak(&self, text: &str, voice: Voice) -> Result<Vec<u8>>;
}

pub struct PodcastSynthesizer {
    engine: Box<dyn SpeechEngine>,
    voices: VoiceMap,
    temp_root: Option<PathBuf>,
}

impl PodcastSynthesizer {
    pub fn new(engine: Box<dyn SpeechEngine>, voices: VoiceMap) -> Self {
        Self { engine, voices, temp_root: None }
    }

    pub fn from_config(config: &AudioConfig) -> Result<Self> {
        let engine = GoogleTts::new(config.clone())?;
        Ok(Self::new(Box::new(engine), VoiceMap::from_config(config)))
    }

    /// Stage clips under `root` instead of the system temp directory.
    pub fn with_temp_root<P: AsRef<Path>>(mut self, root: P) -> Self {
        self.temp_root = Some(root.as_ref().to_path_buf());
        self
    }

    fn staging_dir(&self) -> Result<TempDir> {
        let dir = match &self.temp_root {
            Some(root) => tempfile::tempdir_in(root),
            None => tempfile::tempdir(),
        };
        dir.map_err(|e| ModyfireError::Audio(format!("Failed to create temp directory: {}", e)))
    }

    /// One audio stream for the whole script.
    pub async fn synthesize(&self, script: &[DialogueLine]) -> Result<Vec<u8>> {
        let lines: Vec<&DialogueLine> = script.iter().filter(|l| !l.text.trim().is_empty()).collect();
        if lines.is_empty() {
            return Err(ModyfireError::Audio("script has no spoken lines".to_string()));
        }

        // Dropping the TempDir removes every staged clip, on error paths too.
        let staging = self.staging_dir()?;
        let mut clips = Vec::with_capacity(lines.len());

        for (i, line) in lines.iter().enumerate() {
            let voice = self.voices.voice_for(&line.speaker);
            debug!("Speaking line {} ({} as {:?})", i + 1, line.speaker, voice);
            let audio = self.engine.speak(line.text.trim(), voice).await?;

            let clip = staging.path().join(format!("{}.mp3", Uuid::new_v4()));
            tokio::fs::write(&clip, &audio).await?;
            clips.push(clip);
        }

        let mut combined = Vec::new();
        for clip in &clips {
            combined.extend_from_slice(&tokio::fs::read(clip).await?);
        }

        staging
            .close()
            .map_err(|e| ModyfireError::Audio(format!("Failed to clean up staged clips: {}", e)))?;
        info!("Synthesized {} lines into {} bytes of audio", clips.len(), combined.len());
        Ok(combined)
    }

    /// Synthesize and write the single output file.
    pub async fn synthesize_to(&self, script: &[DialogueLine], output: &Path) -> Result<PathBuf> {
        let audio = self.synthesize(script).await?;
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output, audio).await?;
        Ok(output.to_path_buf())
    }
}

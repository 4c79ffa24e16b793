// Text generation
//
// `TextGenerator` is the boundary to the external service: one call takes a model
// identifier and prompt text and returns text plus token counts. `GenerationClient`
// adds model selection and the bounded transport retry on top.

pub mod gemini;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::GenerationConfig;
use crate::error::{Result, ModyfireError};
use crate::prompt::PromptSpec;
use crate::request::{ContentType, Tier};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationResult {
    pub raw_text: String,
    pub model_identifier: String,
    pub prompt_token_count: u64,
    pub response_token_count: u64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, model: &str, prompt: &str) -> Result<GenerationResult>;
}

/// Static content-type/tier to model lookup.
#[derive(Debug, Clone)]
pub struct ModelTable {
    default_model: String,
    pro_model: String,
}

impl ModelTable {
    pub fn new(config: &GenerationConfig) -> Self {
        Self {
            default_model: config.default_model.clone(),
            pro_model: config.pro_model.clone(),
        }
    }

    pub fn select(&self, content_type: ContentType, tier: Tier) -> &str {
        match (content_type, tier) {
            (ContentType::Summary | ContentType::StudyGuide, Tier::Professor | Tier::Podcaster) => &self.pro_model,
            (ContentType::SlideDeck, Tier::Podcaster) => &self.pro_model,
            _ => &self.default_model,
        }
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }
}

/// Model selection plus the single outbound request per call.
pub struct GenerationClient {
    generator: Box<dyn TextGenerator>,
    models: ModelTable,
    max_retries: u32,
}

impl GenerationClient {
    pub fn new(config: GenerationConfig) -> Result<Self> {
        let generator = gemini::GeminiClient::new(config.clone())?;
        Ok(Self::with_generator(Box::new(generator), &config))
    }

    pub fn with_generator(generator: Box<dyn TextGenerator>, config: &GenerationConfig) -> Self {
        Self {
            generator,
            models: ModelTable::new(config),
            max_retries: config.max_retries,
        }
    }

    pub fn models(&self) -> &ModelTable {
        &self.models
    }

    /// Generate for a content request, choosing the model from the lookup table.
    pub async fn generate(&self, spec: &PromptSpec, content_type: ContentType, tier: Tier) -> Result<GenerationResult> {
        let model = self.models.select(content_type, tier).to_string();
        self.generate_with_model(spec, &model).await
    }

    /// Send the prompt to an explicit model. Only transport errors are retried,
    /// and the retried request is identical.
    pub async fn generate_with_model(&self, spec: &PromptSpec, model: &str) -> Result<GenerationResult> {
        let mut attempt = 0;
        loop {
            info!("Requesting generation from {} (attempt {})", model, attempt + 1);
            match self.generator.complete(model, &spec.instruction_text).await {
                Ok(result) => {
                    if result.raw_text.trim().is_empty() {
                        return Err(ModyfireError::Generation(format!("{} returned an empty response", model)));
                    }
                    info!(
                        "Generation complete: {} prompt tokens, {} response tokens",
                        result.prompt_token_count, result.response_token_count
                    );
                    return Ok(result);
                }
                Err(ModyfireError::Http(e)) if attempt < self.max_retries => {
                    warn!("Transport error from {}, retrying: {}", model, e);
                    attempt += 1;
                }
                Err(ModyfireError::Http(e)) => {
                    return Err(ModyfireError::Generation(format!("request to {} failed: {}", model, e)));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

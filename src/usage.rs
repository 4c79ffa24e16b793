use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::UsageConfig;
use crate::error::{ModyfireError, Result};
use crate::generate::GenerationResult;
use crate::request::Tier;

/// Token consumption of one generation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageRecord {
    pub user_id: String,
    pub tier: Tier,
    pub prompt_tokens: u64,
    pub response_tokens: u64,
    pub estimated_cost_usd: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Per-million-token prices used to estimate cost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenRates {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl TokenRates {
    pub fn from_config(config: &UsageConfig) -> Self {
        Self {
            input_per_million: config.input_cost_per_million,
            output_per_million: config.output_cost_per_million,
        }
    }

    pub fn estimate(&self, prompt_tokens: u64, response_tokens: u64) -> f64 {
        (prompt_tokens as f64 * self.input_per_million + response_tokens as f64 * self.output_per_million) / 1_000_000.0
    }
}

impl UsageRecord {
    pub fn new(user_id: &str, tier: Tier, generation: &GenerationResult, rates: TokenRates) -> Self {
        Self {
            user_id: user_id.to_string(),
            tier,
            prompt_tokens: generation.prompt_token_count,
            response_tokens: generation.response_token_count,
            estimated_cost_usd: rates.estimate(generation.prompt_token_count, generation.response_token_count),
            recorded_at: Utc::now(),
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.response_tokens
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn record(&self, record: &UsageRecord) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    user_id: &'a str,
    plan: Tier,
    tokens_in: u64,
    tokens_out: u64,
    cost_usd: f64,
    recorded_at: DateTime<Utc>,
    secret: &'a str,
}

/// Posts usage records to an accounting webhook.
pub struct WebhookUsageSink {
    client: Client,
    config: UsageConfig,
}

impl WebhookUsageSink {
    pub fn new(config: UsageConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ModyfireError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// An unset endpoint, or one still holding a template placeholder, means
    /// records are only logged.
    pub fn is_configured(&self) -> bool {
        let endpoint = self.config.endpoint.trim();
        !endpoint.is_empty() && !endpoint.contains("your-") && !endpoint.contains("example.com")
    }
}

#[async_trait]
impl UsageSink for WebhookUsageSink {
    async fn record(&self, record: &UsageRecord) -> Result<()> {
        if !self.is_configured() {
            info!(
                "Usage (local only): user {} used {} tokens (~${:.6})",
                record.user_id,
                record.total_tokens(),
                record.estimated_cost_usd
            );
            return Ok(());
        }

        let payload = WebhookPayload {
            user_id: &record.user_id,
            plan: record.tier,
            tokens_in: record.prompt_tokens,
            tokens_out: record.response_tokens,
            cost_usd: record.estimated_cost_usd,
            recorded_at: record.recorded_at,
            secret: &self.config.secret,
        };

        debug!("Posting usage record for {} to accounting webhook", record.user_id);
        let response = self
            .client
            .post(self.config.endpoint.trim())
            .json(&payload)
            .send()
            .await
            .map_err(|e| ModyfireError::Accounting(format!("webhook unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(ModyfireError::Accounting(format!("webhook answered {}", response.status())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn generation(prompt: u64, response: u64) -> GenerationResult {
        GenerationResult {
            raw_text: "ok".into(),
            model_identifier: "gemini-2.5-flash".into(),
            prompt_token_count: prompt,
            response_token_count: response,
        }
    }

    #[test]
    fn test_cost_estimate() {
        let rates = TokenRates::from_config(&Config::default().usage);
        let record = UsageRecord::new("u1", Tier::Professor, &generation(1_000_000, 1_000_000), rates);
        assert!((record.estimated_cost_usd - 0.375).abs() < 1e-9);
        assert_eq!(record.total_tokens(), 2_000_000);

        let small = rates.estimate(1000, 500);
        assert!((small - 0.000225).abs() < 1e-12);
    }

    #[test]
    fn test_payload_shape() {
        let rates = TokenRates::from_config(&Config::default().usage);
        let record = UsageRecord::new("u1", Tier::Student, &generation(10, 20), rates);
        let payload = WebhookPayload {
            user_id: &record.user_id,
            plan: record.tier,
            tokens_in: record.prompt_tokens,
            tokens_out: record.response_tokens,
            cost_usd: record.estimated_cost_usd,
            recorded_at: record.recorded_at,
            secret: "s3cret",
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["plan"], "student");
        assert_eq!(json["tokens_in"], 10);
        assert_eq!(json["tokens_out"], 20);
        assert_eq!(json["secret"], "s3cret");
    }

    #[tokio::test]
    async fn test_unconfigured_endpoint_logs_locally() {
        let mut config = Config::default().usage;
        let rates = TokenRates::from_config(&config);
        let record = UsageRecord::new("u1", Tier::Student, &generation(1, 2), rates);

        let sink = WebhookUsageSink::new(config.clone()).unwrap();
        assert!(!sink.is_configured());
        sink.record(&record).await.unwrap();

        config.endpoint = "https://your-n8n-instance/webhook/usage".into();
        let sink = WebhookUsageSink::new(config).unwrap();
        assert!(!sink.is_configured());
        sink.record(&record).await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_accounting_error() {
        let mut config = Config::default().usage;
        config.endpoint = "http://127.0.0.1:9/usage".into();
        let rates = TokenRates::from_config(&config);
        let record = UsageRecord::new("u1", Tier::Student, &generation(1, 2), rates);

        let err = WebhookUsageSink::new(config).unwrap().record(&record).await.unwrap_err();
        assert!(matches!(err, ModyfireError::Accounting(_)));
    }
}

use serde::{Deserialize, Serialize};

use crate::config::PolicyConfig;
use crate::request::Tier;

/// Who is asking. Authentication itself happens outside this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: Option<String>,
    pub tier: Tier,
    pub remaining_credits: i64,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self { user_id: None, tier: Tier::Student, remaining_credits: 0 }
    }

    pub fn authenticated(user_id: impl Into<String>, tier: Tier, remaining_credits: i64) -> Self {
        Self { user_id: Some(user_id.into()), tier, remaining_credits }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.as_deref().is_some_and(|id| !id.trim().is_empty())
    }

    /// Identifier used for usage records and storage ownership.
    pub fn owner_id(&self) -> &str {
        self.user_id.as_deref().filter(|id| !id.trim().is_empty()).unwrap_or("anonymous")
    }
}

/// Decides whether exported documents carry the watermark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatermarkPolicy {
    pub lowest_tier: Tier,
    pub credit_threshold: i64,
}

impl Default for WatermarkPolicy {
    fn default() -> Self {
        Self { lowest_tier: Tier::Student, credit_threshold: 1 }
    }
}

impl WatermarkPolicy {
    pub fn from_config(config: &PolicyConfig) -> Self {
        Self {
            lowest_tier: Tier::parse_lenient(&config.watermark_tier),
            credit_threshold: config.credit_threshold,
        }
    }

    /// Anonymous callers always get the watermark; otherwise only the lowest tier
    /// at or below the credit threshold does.
    pub fn applies(&self, caller: &Caller) -> bool {
        if !caller.is_authenticated() {
            return true;
        }
        caller.tier == self.lowest_tier && caller.remaining_credits <= self.credit_threshold
    }
}

//! Community sentiment capability.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use conviction_core::{
    Capability, CapabilityConfig, CapabilityId, CapabilityPayload, SourceClass, SourceError,
    ToolArgs,
};

use crate::providers::SentimentProvider;

const DEFAULT_WINDOW_HOURS: i64 = 48;
const MAX_WINDOW_HOURS: i64 = 24 * 14;

/// Aggregate community discussion over a trailing window.
pub struct SentimentCapability {
    provider: Arc<dyn SentimentProvider>,
}

impl SentimentCapability {
    pub fn new(provider: Arc<dyn SentimentProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Capability for SentimentCapability {
    fn id(&self) -> CapabilityId {
        CapabilityId::CommunitySentiment
    }

    fn source_class(&self) -> SourceClass {
        SourceClass::Community
    }

    fn description(&self) -> &str {
        "Community discussion volume and bullish ratio over a trailing window"
    }

    fn params_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "symbol": { "type": "string", "description": "Ticker symbol, e.g. AAPL" },
                "window_hours": {
                    "type": "integer",
                    "description": "Trailing window to aggregate, in hours",
                    "default": DEFAULT_WINDOW_HOURS
                }
            },
            "required": ["symbol"]
        })
    }

    async fn invoke(
        &self,
        args: &ToolArgs,
        config: &CapabilityConfig,
    ) -> Result<CapabilityPayload, SourceError> {
        let symbol = args.require_str("symbol")?;
        let window_hours = args
            .i64_arg("window_hours")
            .or_else(|| config.tunable_i64("window_hours"))
            .unwrap_or(DEFAULT_WINDOW_HOURS)
            .clamp(1, MAX_WINDOW_HOURS) as u32;

        debug!(symbol, window_hours, "aggregating community sentiment");
        let digest = self.provider.community_digest(symbol, window_hours).await?;
        Ok(CapabilityPayload::Sentiment(digest))
    }
}

//! News digest capability.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use conviction_core::{
    Capability, CapabilityConfig, CapabilityId, CapabilityPayload, SourceClass, SourceError,
    ToolArgs,
};

use crate::providers::NewsProvider;

const DEFAULT_LIMIT: i64 = 12;
const MAX_LIMIT: i64 = 50;

/// Recent headlines for one entity, newest first.
pub struct NewsCapability {
    provider: Arc<dyn NewsProvider>,
}

impl NewsCapability {
    pub fn new(provider: Arc<dyn NewsProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Capability for NewsCapability {
    fn id(&self) -> CapabilityId {
        CapabilityId::NewsDigest
    }

    fn source_class(&self) -> SourceClass {
        SourceClass::News
    }

    fn description(&self) -> &str {
        "Recent headlines and coverage for one entity"
    }

    fn params_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "symbol": { "type": "string", "description": "Ticker symbol, e.g. AAPL" },
                "limit": {
                    "type": "integer",
                    "description": "Maximum headlines to return",
                    "default": DEFAULT_LIMIT
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
        let limit = args
            .i64_arg("limit")
            .or_else(|| config.tunable_i64("limit"))
            .unwrap_or(DEFAULT_LIMIT)
            .clamp(1, MAX_LIMIT) as usize;

        debug!(symbol, limit, "fetching headlines");
        let digest = self.provider.headlines(symbol, limit).await?;
        Ok(CapabilityPayload::News(digest))
    }
}

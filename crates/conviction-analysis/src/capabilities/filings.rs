//! Regulatory filings capability.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use conviction_core::{
    Capability, CapabilityConfig, CapabilityId, CapabilityPayload, SourceClass, SourceError,
    ToolArgs,
};

use crate::providers::FilingsProvider;

const DEFAULT_LIMIT: i64 = 8;
const MAX_LIMIT: i64 = 40;

/// Recent regulatory filings for one entity, newest first.
pub struct FilingsCapability {
    provider: Arc<dyn FilingsProvider>,
}

impl FilingsCapability {
    pub fn new(provider: Arc<dyn FilingsProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Capability for FilingsCapability {
    fn id(&self) -> CapabilityId {
        CapabilityId::RecentFilings
    }

    fn source_class(&self) -> SourceClass {
        SourceClass::Filings
    }

    fn description(&self) -> &str {
        "Recent regulatory filings with form types and dates"
    }

    fn params_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "symbol": { "type": "string", "description": "Ticker symbol, e.g. AAPL" },
                "limit": {
                    "type": "integer",
                    "description": "Maximum filings to return",
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

        debug!(symbol, limit, "fetching recent filings");
        let digest = self.provider.recent_filings(symbol, limit).await?;
        Ok(CapabilityPayload::Filings(digest))
    }
}

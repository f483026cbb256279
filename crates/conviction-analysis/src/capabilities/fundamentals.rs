//! Fundamentals capability.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use conviction_core::{
    Capability, CapabilityConfig, CapabilityId, CapabilityPayload, SourceClass, SourceError,
    ToolArgs,
};

use crate::providers::FundamentalsProvider;

/// Financial statement summary with valuation ratios for one entity.
pub struct FundamentalsCapability {
    provider: Arc<dyn FundamentalsProvider>,
}

impl FundamentalsCapability {
    pub fn new(provider: Arc<dyn FundamentalsProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Capability for FundamentalsCapability {
    fn id(&self) -> CapabilityId {
        CapabilityId::Fundamentals
    }

    fn source_class(&self) -> SourceClass {
        SourceClass::Fundamentals
    }

    fn description(&self) -> &str {
        "Financial statement summary with valuation and leverage ratios"
    }

    fn params_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "symbol": { "type": "string", "description": "Ticker symbol, e.g. AAPL" }
            },
            "required": ["symbol"]
        })
    }

    async fn invoke(
        &self,
        args: &ToolArgs,
        _config: &CapabilityConfig,
    ) -> Result<CapabilityPayload, SourceError> {
        let symbol = args.require_str("symbol")?;
        debug!(symbol, "fetching fundamentals");
        let report = self.provider.fundamentals(symbol).await?;
        Ok(CapabilityPayload::Fundamentals(report))
    }
}

//! Prior-verdict history capability.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use conviction_core::{
    Capability, CapabilityConfig, CapabilityId, CapabilityPayload, SourceClass, SourceError,
    ToolArgs,
};

use crate::verdict::VerdictStore;

/// Serves the rolling verdict history from local persistence.
///
/// Local source class: never rate limited, never cached, so synthesis
/// always sees the latest recorded trajectory.
pub struct VerdictHistoryCapability {
    verdicts: Arc<VerdictStore>,
}

impl VerdictHistoryCapability {
    pub fn new(verdicts: Arc<VerdictStore>) -> Self {
        Self { verdicts }
    }
}

#[async_trait]
impl Capability for VerdictHistoryCapability {
    fn id(&self) -> CapabilityId {
        CapabilityId::VerdictHistory
    }

    fn source_class(&self) -> SourceClass {
        SourceClass::Local
    }

    fn description(&self) -> &str {
        "Prior verdict scores and signals for one entity"
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
        let symbol = args.require_str("symbol")?.to_uppercase();
        let history = self
            .verdicts
            .history(&symbol)
            .await
            .map_err(|e| SourceError::Other(e.to_string()))?;
        Ok(CapabilityPayload::History(history))
    }
}

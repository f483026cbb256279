//! Synthesizer capability adapter.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use conviction_core::{
    Capability, CapabilityConfig, CapabilityId, CapabilityPayload, SourceClass, SourceError,
    SynthesisOutput, ToolArgs,
};

use crate::synthesis::{SynthesisContext, Synthesizer};

/// Bridges the opaque [`Synthesizer`] boundary into the capability surface,
/// so synthesis flows through the same executor as every fetch.
pub struct SynthesizerCapability {
    synthesizer: Arc<dyn Synthesizer>,
}

impl SynthesizerCapability {
    pub fn new(synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self { synthesizer }
    }
}

#[async_trait]
impl Capability for SynthesizerCapability {
    fn id(&self) -> CapabilityId {
        CapabilityId::Synthesizer
    }

    fn source_class(&self) -> SourceClass {
        SourceClass::Synthesis
    }

    fn description(&self) -> &str {
        "Conviction score, thesis and timing signal from gathered inputs"
    }

    fn params_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "symbol": { "type": "string", "description": "Ticker symbol, e.g. AAPL" },
                "context": {
                    "type": "string",
                    "description": "Gathered inputs encoded as canonical JSON"
                }
            },
            "required": ["symbol", "context"]
        })
    }

    async fn invoke(
        &self,
        args: &ToolArgs,
        _config: &CapabilityConfig,
    ) -> Result<CapabilityPayload, SourceError> {
        let symbol = args.require_str("symbol")?;
        let raw_context = args.require_str("context")?;
        let context = SynthesisContext::from_json(raw_context)
            .map_err(|e| SourceError::Malformed(format!("invalid synthesis context: {e}")))?;

        debug!(symbol, partial = context.partial_inputs, "synthesizing");
        let output = self.synthesizer.synthesize(&context).await?;
        Ok(CapabilityPayload::Synthesis(clamp_score(output)))
    }
}

/// Scores live on a 0 to 100 scale; anything outside is pinned, with the
/// original preserved in `raw`.
fn clamp_score(mut output: SynthesisOutput) -> SynthesisOutput {
    if output.score > 100 {
        warn!(score = output.score, "clamping out-of-range synthesis score");
        output.score = 100;
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesis::MockSynthesizer;
    use chrono::Utc;
    use conviction_core::{ErrorCode, TimingSignal};

    fn context_for(symbol: &str) -> SynthesisContext {
        SynthesisContext {
            symbol: symbol.to_string(),
            as_of: Utc::now(),
            partial_inputs: false,
            fundamentals: None,
            technical: None,
            sentiment: None,
            news: None,
            filings: None,
            prior_verdicts: None,
        }
    }

    fn output_with_score(score: u8) -> SynthesisOutput {
        SynthesisOutput {
            score,
            thesis_summary: "thesis".to_string(),
            risk_summary: "risks".to_string(),
            timing_signal: TimingSignal::Wait,
            alert: false,
            alert_reason: None,
            raw: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn decodes_context_and_returns_synthesis() {
        let mut synthesizer = MockSynthesizer::new();
        synthesizer
            .expect_synthesize()
            .withf(|context| context.symbol == "AAPL")
            .returning(|_| Ok(output_with_score(64)));

        let capability = SynthesizerCapability::new(Arc::new(synthesizer));
        let context = context_for("AAPL");
        let args = ToolArgs::new()
            .with("symbol", "AAPL")
            .with("context", context.to_json().unwrap());
        let payload = capability
            .invoke(&args, &CapabilityConfig::default())
            .await
            .unwrap();

        match payload {
            CapabilityPayload::Synthesis(output) => assert_eq!(output.score, 64),
            other => panic!("unexpected payload: {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn garbage_context_is_malformed() {
        let synthesizer = MockSynthesizer::new();
        let capability = SynthesizerCapability::new(Arc::new(synthesizer));
        let args = ToolArgs::new()
            .with("symbol", "AAPL")
            .with("context", "not json");
        let err = capability
            .invoke(&args, &CapabilityConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ParseError);
    }

    #[tokio::test]
    async fn runaway_scores_are_pinned() {
        let mut synthesizer = MockSynthesizer::new();
        synthesizer
            .expect_synthesize()
            .returning(|_| Ok(output_with_score(250)));

        let capability = SynthesizerCapability::new(Arc::new(synthesizer));
        let context = context_for("AAPL");
        let args = ToolArgs::new()
            .with("symbol", "AAPL")
            .with("context", context.to_json().unwrap());
        let payload = capability
            .invoke(&args, &CapabilityConfig::default())
            .await
            .unwrap();

        match payload {
            CapabilityPayload::Synthesis(output) => assert_eq!(output.score, 100),
            other => panic!("unexpected payload: {}", other.kind()),
        }
    }
}

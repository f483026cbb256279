//! Test fixtures shared by the analyzer and batch tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::json;

use conviction_core::{
    Capability, CapabilityConfig, CapabilityId, CapabilityPayload, FilingSummary, FilingsDigest,
    FundamentalsReport, Headline, KeyValueStore, NewsDigest, SentimentDigest, SourceClass,
    SourceError, SynthesisOutput, TechnicalSnapshot, TimingSignal, ToolArgs, TrendDirection,
    VerdictHistory,
};
use conviction_engine::{CacheStore, CapabilityRegistry, EngineConfig, MemoryStore, ToolExecutor};

use crate::analyzer::EntityAnalyzer;
use crate::capabilities::{SynthesizerCapability, VerdictHistoryCapability};
use crate::config::AnalysisConfig;
use crate::synthesis::WeightedSynthesizer;
use crate::verdict::VerdictStore;

/// Behavior of one scripted capability.
#[derive(Clone)]
pub(crate) enum Script {
    /// Succeed with a canned payload.
    Ok,
    /// Fail every call with this error.
    Fail(SourceError),
    /// Fail only for the named symbol, succeed for everything else.
    FailFor { symbol: String },
}

struct ScriptedCapability {
    id: CapabilityId,
    script: Script,
    invocations: Arc<AtomicUsize>,
}

fn class_for(id: CapabilityId) -> SourceClass {
    match id {
        CapabilityId::Fundamentals => SourceClass::Fundamentals,
        CapabilityId::TechnicalSnapshot => SourceClass::MarketData,
        CapabilityId::CommunitySentiment => SourceClass::Community,
        CapabilityId::NewsDigest => SourceClass::News,
        CapabilityId::RecentFilings => SourceClass::Filings,
        CapabilityId::VerdictHistory => SourceClass::Local,
        CapabilityId::Synthesizer => SourceClass::Synthesis,
    }
}

pub(crate) fn snapshot_fixture(symbol: &str, as_of: DateTime<Utc>) -> TechnicalSnapshot {
    TechnicalSnapshot {
        symbol: symbol.to_uppercase(),
        last_price: 120.0,
        change_pct_1d: Some(0.8),
        rsi_14: Some(58.0),
        sma_20: Some(115.0),
        sma_50: Some(105.0),
        ema_12: Some(118.0),
        ema_26: Some(112.0),
        macd: Some(6.0),
        macd_signal: Some(4.0),
        trend: TrendDirection::Up,
        lookback_days: 120,
        as_of,
    }
}

fn canned_payload(id: CapabilityId, symbol: &str) -> CapabilityPayload {
    let now = Utc::now();
    let upper = symbol.to_uppercase();
    match id {
        CapabilityId::Fundamentals => CapabilityPayload::Fundamentals(FundamentalsReport {
            symbol: upper,
            company_name: Some("Scripted Corp".to_string()),
            market_cap: Some(1.0e10),
            pe_ratio: Some(14.0),
            eps_diluted: Some(3.0),
            revenue: Some(5.0e9),
            revenue_growth_pct: Some(12.0),
            net_income: Some(9.0e8),
            profit_margin_pct: Some(18.0),
            debt_to_equity: Some(0.6),
            fiscal_period: Some("FY2025".to_string()),
            as_of: now,
        }),
        CapabilityId::TechnicalSnapshot => {
            CapabilityPayload::Technical(snapshot_fixture(&upper, now))
        }
        CapabilityId::CommunitySentiment => CapabilityPayload::Sentiment(SentimentDigest {
            symbol: upper,
            window_hours: 48,
            mention_count: 600,
            bullish_ratio: 0.68,
            sample_quotes: vec!["looks strong".to_string()],
            as_of: now,
        }),
        CapabilityId::NewsDigest => CapabilityPayload::News(NewsDigest {
            symbol: upper.clone(),
            headlines: vec![Headline {
                title: format!("{upper} coverage"),
                source: "Reuters".to_string(),
                url: None,
                published_at: now,
            }],
            as_of: now,
        }),
        CapabilityId::RecentFilings => CapabilityPayload::Filings(FilingsDigest {
            symbol: upper,
            filings: vec![FilingSummary {
                form: "10-Q".to_string(),
                filed_at: now - TimeDelta::days(45),
                accession: "0000000000-25-000001".to_string(),
                description: None,
            }],
            as_of: now,
        }),
        CapabilityId::VerdictHistory => CapabilityPayload::History(VerdictHistory::empty(&upper)),
        CapabilityId::Synthesizer => CapabilityPayload::Synthesis(SynthesisOutput {
            score: 72,
            thesis_summary: "scripted thesis".to_string(),
            risk_summary: "scripted risks".to_string(),
            timing_signal: TimingSignal::Accumulate,
            alert: false,
            alert_reason: None,
            raw: serde_json::Value::Null,
        }),
    }
}

#[async_trait]
impl Capability for ScriptedCapability {
    fn id(&self) -> CapabilityId {
        self.id
    }

    fn source_class(&self) -> SourceClass {
        class_for(self.id)
    }

    fn description(&self) -> &str {
        "scripted"
    }

    fn params_schema(&self) -> serde_json::Value {
        json!({ "type": "object" })
    }

    async fn invoke(
        &self,
        args: &ToolArgs,
        _config: &CapabilityConfig,
    ) -> Result<CapabilityPayload, SourceError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let symbol = args.require_str("symbol")?;
        match &self.script {
            Script::Ok => Ok(canned_payload(self.id, symbol)),
            Script::Fail(err) => Err(err.clone()),
            Script::FailFor { symbol: bad } if symbol.eq_ignore_ascii_case(bad) => {
                Err(SourceError::Auth)
            }
            Script::FailFor { .. } => Ok(canned_payload(self.id, symbol)),
        }
    }
}

pub(crate) struct AnalyzerRig {
    pub analyzer: Arc<EntityAnalyzer>,
    pub verdicts: Arc<VerdictStore>,
    pub store: Arc<MemoryStore>,
    pub counters: HashMap<CapabilityId, Arc<AtomicUsize>>,
}

pub(crate) fn rig() -> AnalyzerRig {
    rig_with(HashMap::new())
}

pub(crate) fn rig_with(scripts: HashMap<CapabilityId, Script>) -> AnalyzerRig {
    rig_with_config(scripts, AnalysisConfig::default())
}

pub(crate) fn rig_with_config(
    mut scripts: HashMap<CapabilityId, Script>,
    config: AnalysisConfig,
) -> AnalyzerRig {
    let store = Arc::new(MemoryStore::new());
    let dyn_store: Arc<dyn KeyValueStore> = store.clone();
    let verdicts = Arc::new(VerdictStore::new(dyn_store.clone()));

    let input_ids = [
        CapabilityId::Fundamentals,
        CapabilityId::TechnicalSnapshot,
        CapabilityId::CommunitySentiment,
        CapabilityId::NewsDigest,
        CapabilityId::RecentFilings,
    ];

    let mut counters = HashMap::new();
    let mut builder = CapabilityRegistry::builder();
    for id in input_ids {
        let counter = Arc::new(AtomicUsize::new(0));
        let script = scripts.remove(&id).unwrap_or(Script::Ok);
        builder = builder.register(Arc::new(ScriptedCapability {
            id,
            script,
            invocations: Arc::clone(&counter),
        }));
        counters.insert(id, counter);
    }

    // History reads the real store so prior verdicts flow back in.
    builder = builder.register(Arc::new(VerdictHistoryCapability::new(Arc::clone(
        &verdicts,
    ))));

    // Synthesizer: scripted when a test asks for it, otherwise the real
    // weighted one.
    builder = match scripts.remove(&CapabilityId::Synthesizer) {
        Some(script) => {
            let counter = Arc::new(AtomicUsize::new(0));
            counters.insert(CapabilityId::Synthesizer, Arc::clone(&counter));
            builder.register(Arc::new(ScriptedCapability {
                id: CapabilityId::Synthesizer,
                script,
                invocations: counter,
            }))
        }
        None => builder.register(Arc::new(SynthesizerCapability::new(Arc::new(
            WeightedSynthesizer::new(),
        )))),
    };
    let registry = Arc::new(builder.build());

    let mut engine = EngineConfig::default();
    engine.rate_policies.clear();
    engine.cache_ttls.clear();
    engine.retry_backoff_base = Duration::from_millis(1);
    let cache = Arc::new(CacheStore::new(dyn_store.clone(), engine.cache_ttls.clone()));
    let executor = Arc::new(ToolExecutor::from_config(registry, cache, engine));

    let analyzer = Arc::new(EntityAnalyzer::new(
        executor,
        Arc::clone(&verdicts),
        dyn_store,
        config,
    ));

    AnalyzerRig {
        analyzer,
        verdicts,
        store,
        counters,
    }
}

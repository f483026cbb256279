//! Per-entity analysis pipeline.
//!
//! One pass gathers every input capability in parallel through the shared
//! executor, gates on completeness, hands the result to the synthesizer and
//! persists the verdict.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use conviction_core::{
    CapabilityId, CapabilityPayload, KeyValueStore, OutcomeMeta, SourceClass, SynthesisOutput,
    TechnicalSnapshot, ToolArgs, ToolOutcome,
};
use conviction_engine::ToolExecutor;

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::synthesis::SynthesisContext;
use crate::verdict::{Verdict, VerdictStore};

pub(crate) const TECHNICAL_KEY_PREFIX: &str = "technical:";

/// Outcome of one analysis pass over one entity.
#[derive(Debug, Clone)]
pub enum AnalysisOutcome {
    /// Verdict computed and persisted.
    Scored(Verdict),
    /// Mandatory inputs missing and partial verdicts not allowed. Nothing
    /// was synthesized or persisted.
    Skipped { missing: Vec<CapabilityId> },
}

/// Per-call options layered over [`AnalysisConfig`].
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    /// Override the configured tolerance for missing mandatory inputs.
    pub allow_missing_inputs: Option<bool>,
}

struct GatheredInputs {
    fundamentals: Option<ToolOutcome>,
    technical: Option<ToolOutcome>,
    sentiment: Option<ToolOutcome>,
    news: Option<ToolOutcome>,
    filings: Option<ToolOutcome>,
    history: Option<ToolOutcome>,
}

impl GatheredInputs {
    /// Mandatory inputs that failed to arrive. Only fundamentals and the
    /// technical snapshot gate a verdict; sentiment, news, filings and prior
    /// history enrich the picture but never block on their own.
    fn missing_mandatory(&self) -> Vec<CapabilityId> {
        let mut missing = Vec::new();
        if self.fundamentals.is_none() {
            missing.push(CapabilityId::Fundamentals);
        }
        if self.technical.is_none() {
            missing.push(CapabilityId::TechnicalSnapshot);
        }
        missing
    }

    fn any_absent(&self) -> bool {
        self.fundamentals.is_none()
            || self.technical.is_none()
            || self.sentiment.is_none()
            || self.news.is_none()
            || self.filings.is_none()
            || self.history.is_none()
    }

    fn fetched_at_map(&self) -> BTreeMap<String, DateTime<Utc>> {
        let pairs = [
            (CapabilityId::Fundamentals, &self.fundamentals),
            (CapabilityId::TechnicalSnapshot, &self.technical),
            (CapabilityId::CommunitySentiment, &self.sentiment),
            (CapabilityId::NewsDigest, &self.news),
            (CapabilityId::RecentFilings, &self.filings),
            (CapabilityId::VerdictHistory, &self.history),
        ];
        let mut map = BTreeMap::new();
        for (id, outcome) in pairs {
            if let Some(outcome) = outcome {
                map.insert(id.name().to_string(), outcome.meta.fetched_at);
            }
        }
        map
    }

    fn into_context(self, symbol: &str) -> SynthesisContext {
        let partial = self.any_absent();
        SynthesisContext {
            symbol: symbol.to_string(),
            as_of: Utc::now(),
            partial_inputs: partial,
            fundamentals: extract(self.fundamentals, |p| match p {
                CapabilityPayload::Fundamentals(report) => Some(report),
                _ => None,
            }),
            technical: extract(self.technical, |p| match p {
                CapabilityPayload::Technical(snapshot) => Some(snapshot),
                _ => None,
            }),
            sentiment: extract(self.sentiment, |p| match p {
                CapabilityPayload::Sentiment(digest) => Some(digest),
                _ => None,
            }),
            news: extract(self.news, |p| match p {
                CapabilityPayload::News(digest) => Some(digest),
                _ => None,
            }),
            filings: extract(self.filings, |p| match p {
                CapabilityPayload::Filings(digest) => Some(digest),
                _ => None,
            }),
            prior_verdicts: extract(self.history, |p| match p {
                CapabilityPayload::History(history) => Some(history),
                _ => None,
            }),
        }
    }
}

fn extract<T>(
    outcome: Option<ToolOutcome>,
    pick: impl FnOnce(CapabilityPayload) -> Option<T>,
) -> Option<T> {
    let outcome = outcome?;
    let capability = outcome.meta.capability.clone();
    let picked = pick(outcome.payload);
    if picked.is_none() {
        warn!(capability, "unexpected payload kind for input");
    }
    picked
}

/// Orchestrates the full per-entity pipeline.
pub struct EntityAnalyzer {
    executor: Arc<ToolExecutor>,
    verdicts: Arc<VerdictStore>,
    store: Arc<dyn KeyValueStore>,
    config: AnalysisConfig,
}

impl EntityAnalyzer {
    pub fn new(
        executor: Arc<ToolExecutor>,
        verdicts: Arc<VerdictStore>,
        store: Arc<dyn KeyValueStore>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            executor,
            verdicts,
            store,
            config,
        }
    }

    pub fn verdicts(&self) -> &Arc<VerdictStore> {
        &self.verdicts
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub async fn analyze(&self, symbol: &str) -> Result<AnalysisOutcome> {
        self.analyze_with_options(symbol, &AnalyzeOptions::default())
            .await
    }

    pub async fn analyze_with_options(
        &self,
        symbol: &str,
        options: &AnalyzeOptions,
    ) -> Result<AnalysisOutcome> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(AnalysisError::InvalidSymbol);
        }

        info!(symbol, "starting analysis pass");
        self.executor.begin_pass().await;

        let inputs = self.gather(&symbol).await;
        let missing = inputs.missing_mandatory();
        let allow_missing = options
            .allow_missing_inputs
            .unwrap_or(self.config.allow_missing_inputs);
        if !missing.is_empty() && !allow_missing {
            let names: Vec<&str> = missing.iter().map(|id| id.name()).collect();
            info!(symbol, missing = ?names, "skipping entity, mandatory inputs missing");
            return Ok(AnalysisOutcome::Skipped { missing });
        }

        let partial = inputs.any_absent();
        let input_fetched_at = inputs.fetched_at_map();
        let context = inputs.into_context(&symbol);
        let output = self.synthesize(&symbol, &context).await?;
        let verdict = Verdict::from_synthesis(
            &symbol,
            output,
            partial,
            input_fetched_at,
            self.config.verdict_ttl,
        );
        self.verdicts.upsert(&verdict).await?;
        info!(
            symbol,
            score = verdict.score,
            signal = %verdict.timing_signal,
            alert = verdict.alert,
            "verdict persisted"
        );
        Ok(AnalysisOutcome::Scored(verdict))
    }

    async fn gather(&self, symbol: &str) -> GatheredInputs {
        let (fundamentals, technical, sentiment, news, filings, history) = tokio::join!(
            self.fetch_input(CapabilityId::Fundamentals, symbol),
            self.fetch_technical(symbol),
            self.fetch_input(CapabilityId::CommunitySentiment, symbol),
            self.fetch_input(CapabilityId::NewsDigest, symbol),
            self.fetch_input(CapabilityId::RecentFilings, symbol),
            self.fetch_input(CapabilityId::VerdictHistory, symbol),
        );
        GatheredInputs {
            fundamentals,
            technical,
            sentiment,
            news,
            filings,
            history,
        }
    }

    async fn fetch_input(&self, id: CapabilityId, symbol: &str) -> Option<ToolOutcome> {
        let args = ToolArgs::new().with("symbol", symbol);
        match self
            .executor
            .execute_with_retry(id.name(), &args, self.config.fetch_retries)
            .await
        {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(symbol, capability = id.name(), error = %e, "input unavailable");
                None
            }
        }
    }

    /// Technical snapshots drift slowly, so one persisted within the refresh
    /// interval is reused outright without touching the market data source.
    async fn fetch_technical(&self, symbol: &str) -> Option<ToolOutcome> {
        if let Some(outcome) = self.recent_snapshot(symbol).await {
            return Some(outcome);
        }
        let outcome = self
            .fetch_input(CapabilityId::TechnicalSnapshot, symbol)
            .await?;
        if let CapabilityPayload::Technical(snapshot) = &outcome.payload {
            self.save_snapshot(snapshot).await;
        }
        Some(outcome)
    }

    async fn recent_snapshot(&self, symbol: &str) -> Option<ToolOutcome> {
        let key = format!("{TECHNICAL_KEY_PREFIX}{symbol}");
        let raw = match self.store.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(symbol, error = %e, "snapshot read failed");
                return None;
            }
        };
        let snapshot: TechnicalSnapshot = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(symbol, error = %e, "discarding corrupt technical snapshot");
                return None;
            }
        };

        let now = Utc::now();
        let age = now - snapshot.as_of;
        let refresh = TimeDelta::from_std(self.config.technical_refresh_interval).ok()?;
        if age > refresh || age < TimeDelta::zero() {
            return None;
        }

        let age_hours = age.num_milliseconds() as f64 / 3_600_000.0;
        debug!(symbol, age_hours, "reusing recent technical snapshot");
        Some(ToolOutcome {
            meta: OutcomeMeta {
                capability: CapabilityId::TechnicalSnapshot.name().to_string(),
                source_class: SourceClass::MarketData,
                from_cache: true,
                cache_age_hours: Some(age_hours),
                fetched_at: snapshot.as_of,
                elapsed_ms: 0,
                attempts: 0,
            },
            payload: CapabilityPayload::Technical(snapshot),
        })
    }

    async fn save_snapshot(&self, snapshot: &TechnicalSnapshot) {
        let key = format!("{TECHNICAL_KEY_PREFIX}{}", snapshot.symbol);
        let raw = match serde_json::to_string(snapshot) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(symbol = %snapshot.symbol, error = %e, "failed to encode technical snapshot");
                return;
            }
        };
        if let Err(e) = self.store.set(&key, raw).await {
            warn!(symbol = %snapshot.symbol, error = %e, "failed to persist technical snapshot");
        }
    }

    async fn synthesize(&self, symbol: &str, context: &SynthesisContext) -> Result<SynthesisOutput> {
        let encoded = context.to_json().map_err(|e| AnalysisError::Synthesis {
            symbol: symbol.to_string(),
            message: format!("context encoding failed: {e}"),
        })?;
        let args = ToolArgs::new()
            .with("symbol", symbol)
            .with("context", encoded);
        let outcome = self
            .executor
            .execute_with_retry(
                CapabilityId::Synthesizer.name(),
                &args,
                self.config.synthesis_retries,
            )
            .await
            .map_err(|e| AnalysisError::Synthesis {
                symbol: symbol.to_string(),
                message: e.to_string(),
            })?;

        match outcome.payload {
            CapabilityPayload::Synthesis(output) => Ok(output),
            other => Err(AnalysisError::Synthesis {
                symbol: symbol.to_string(),
                message: format!("synthesizer returned a {} payload", other.kind()),
            }),
        }
    }
}

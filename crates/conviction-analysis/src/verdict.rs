//! Verdict records and their persistence.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use conviction_core::{
    KeyValueStore, PriorVerdict, StoreError, SynthesisOutput, TimingSignal, VerdictHistory,
};

pub(crate) const VERDICT_KEY_PREFIX: &str = "verdict:";
pub(crate) const HISTORY_KEY_PREFIX: &str = "verdict_history:";

/// Entries kept per entity in the rolling history.
pub const HISTORY_CAPACITY: usize = 20;

/// Persisted conviction verdict for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub symbol: String,
    /// Conviction score, 0 to 100.
    pub score: u8,
    pub thesis_summary: String,
    pub risk_summary: String,
    pub timing_signal: TimingSignal,
    pub alert: bool,
    pub alert_reason: Option<String>,
    /// True when one or more inputs was missing at synthesis time.
    pub partial_inputs: bool,
    /// Fetch time of each contributing input, keyed by capability name.
    pub input_fetched_at: BTreeMap<String, DateTime<Utc>>,
    pub computed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Untouched synthesizer output.
    pub raw: serde_json::Value,
}

impl Verdict {
    pub fn from_synthesis(
        symbol: &str,
        output: SynthesisOutput,
        partial_inputs: bool,
        input_fetched_at: BTreeMap<String, DateTime<Utc>>,
        ttl: Duration,
    ) -> Self {
        let computed_at = Utc::now();
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        let expires_at = computed_at
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            symbol: symbol.to_uppercase(),
            score: output.score,
            thesis_summary: output.thesis_summary,
            risk_summary: output.risk_summary,
            timing_signal: output.timing_signal,
            alert: output.alert,
            alert_reason: output.alert_reason,
            partial_inputs,
            input_fetched_at,
            computed_at,
            expires_at,
            raw: output.raw,
        }
    }

    /// Expiry never deletes a verdict; it is a read-side judgment only.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn age_hours_at(&self, now: DateTime<Utc>) -> f64 {
        (now - self.computed_at).num_milliseconds() as f64 / 3_600_000.0
    }

    /// Condensed form appended to the rolling history.
    pub fn prior(&self) -> PriorVerdict {
        PriorVerdict {
            computed_at: self.computed_at,
            score: self.score,
            timing_signal: self.timing_signal,
        }
    }
}

/// Verdicts and their rolling history over a [`KeyValueStore`].
pub struct VerdictStore {
    store: Arc<dyn KeyValueStore>,
}

impl VerdictStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn verdict_key(symbol: &str) -> String {
        format!("{VERDICT_KEY_PREFIX}{symbol}")
    }

    fn history_key(symbol: &str) -> String {
        format!("{HISTORY_KEY_PREFIX}{symbol}")
    }

    pub async fn latest(&self, symbol: &str) -> Result<Option<Verdict>, StoreError> {
        match self.store.get(&Self::verdict_key(symbol)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Replace the entity's verdict and append it to the rolling history,
    /// dropping the oldest entries past capacity.
    pub async fn upsert(&self, verdict: &Verdict) -> Result<(), StoreError> {
        let raw = serde_json::to_string(verdict)?;
        self.store.set(&Self::verdict_key(&verdict.symbol), raw).await?;

        let mut history = self.history(&verdict.symbol).await?;
        history.entries.push(verdict.prior());
        if history.entries.len() > HISTORY_CAPACITY {
            let excess = history.entries.len() - HISTORY_CAPACITY;
            history.entries.drain(..excess);
        }
        let raw = serde_json::to_string(&history)?;
        self.store.set(&Self::history_key(&verdict.symbol), raw).await?;
        debug!(symbol = %verdict.symbol, score = verdict.score, "verdict upserted");
        Ok(())
    }

    /// Rolling history for one entity, oldest first. Empty when none has
    /// been recorded.
    pub async fn history(&self, symbol: &str) -> Result<VerdictHistory, StoreError> {
        match self.store.get(&Self::history_key(symbol)).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(VerdictHistory::empty(symbol)),
        }
    }

    /// Every stored verdict, ordered by symbol. Unreadable records are
    /// skipped rather than failing the listing.
    pub async fn all(&self) -> Result<Vec<Verdict>, StoreError> {
        let mut verdicts: Vec<Verdict> = Vec::new();
        for key in self.store.keys(VERDICT_KEY_PREFIX).await? {
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };
            match serde_json::from_str(&raw) {
                Ok(verdict) => verdicts.push(verdict),
                Err(e) => warn!(key, error = %e, "skipping unreadable verdict"),
            }
        }
        verdicts.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(verdicts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conviction_engine::MemoryStore;
    use serde_json::json;

    fn sample_output(score: u8) -> SynthesisOutput {
        SynthesisOutput {
            score,
            thesis_summary: "thesis".to_string(),
            risk_summary: "risks".to_string(),
            timing_signal: TimingSignal::Wait,
            alert: false,
            alert_reason: None,
            raw: json!({"model": "test"}),
        }
    }

    fn store() -> VerdictStore {
        VerdictStore::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn upsert_then_latest_round_trips() {
        let verdicts = store();
        let verdict = Verdict::from_synthesis(
            "aapl",
            sample_output(61),
            false,
            BTreeMap::new(),
            Duration::from_secs(3600),
        );
        verdicts.upsert(&verdict).await.unwrap();

        let loaded = verdicts.latest("AAPL").await.unwrap().unwrap();
        assert_eq!(loaded, verdict);
        assert!(!loaded.is_expired_at(Utc::now()));
    }

    #[tokio::test]
    async fn missing_symbol_yields_none_and_empty_history() {
        let verdicts = store();
        assert!(verdicts.latest("GHOST").await.unwrap().is_none());
        let history = verdicts.history("GHOST").await.unwrap();
        assert_eq!(history.symbol, "GHOST");
        assert!(history.entries.is_empty());
    }

    #[tokio::test]
    async fn history_caps_at_capacity_dropping_oldest() {
        let verdicts = store();
        for i in 0..25u8 {
            let verdict = Verdict::from_synthesis(
                "MSFT",
                sample_output(i),
                false,
                BTreeMap::new(),
                Duration::from_secs(3600),
            );
            verdicts.upsert(&verdict).await.unwrap();
        }

        let history = verdicts.history("MSFT").await.unwrap();
        assert_eq!(history.entries.len(), HISTORY_CAPACITY);
        // Scores 0..=4 fell off the front.
        assert_eq!(history.entries[0].score, 5);
        assert_eq!(history.latest().unwrap().score, 24);
    }

    #[tokio::test]
    async fn all_lists_by_symbol() {
        let verdicts = store();
        for symbol in ["NVDA", "AAPL", "MSFT"] {
            let verdict = Verdict::from_synthesis(
                symbol,
                sample_output(50),
                false,
                BTreeMap::new(),
                Duration::from_secs(3600),
            );
            verdicts.upsert(&verdict).await.unwrap();
        }

        let all = verdicts.all().await.unwrap();
        let symbols: Vec<&str> = all.iter().map(|v| v.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["AAPL", "MSFT", "NVDA"]);
    }

    #[tokio::test]
    async fn history_keys_do_not_collide_with_verdict_listing() {
        let verdicts = store();
        let verdict = Verdict::from_synthesis(
            "TSLA",
            sample_output(70),
            false,
            BTreeMap::new(),
            Duration::from_secs(3600),
        );
        verdicts.upsert(&verdict).await.unwrap();

        // One verdict plus one history record in the backing store, but the
        // listing must only surface the verdict.
        let all = verdicts.all().await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn zero_ttl_expires_immediately() {
        let verdict = Verdict::from_synthesis(
            "X",
            sample_output(10),
            false,
            BTreeMap::new(),
            Duration::ZERO,
        );
        assert!(verdict.is_expired_at(verdict.computed_at));
    }
}

//! Typed payloads produced by capabilities.
//!
//! Every capability returns exactly one variant of [`CapabilityPayload`].
//! Consumers match on the variant instead of probing loose JSON, so a
//! misconfigured registry shows up as a type mismatch rather than a silent
//! missing field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Point-in-time valuation and statement summary for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundamentalsReport {
    pub symbol: String,
    pub company_name: Option<String>,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub eps_diluted: Option<f64>,
    pub revenue: Option<f64>,
    pub revenue_growth_pct: Option<f64>,
    pub net_income: Option<f64>,
    pub profit_margin_pct: Option<f64>,
    pub debt_to_equity: Option<f64>,
    /// Fiscal period the statement figures cover, e.g. "FY2024".
    pub fiscal_period: Option<String>,
    pub as_of: DateTime<Utc>,
}

/// Direction of the prevailing price trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    Sideways,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Sideways => "sideways",
        }
    }
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Indicator snapshot computed from recent price history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSnapshot {
    pub symbol: String,
    pub last_price: f64,
    pub change_pct_1d: Option<f64>,
    pub rsi_14: Option<f64>,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub ema_12: Option<f64>,
    pub ema_26: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub trend: TrendDirection,
    /// Trading days of history the indicators were computed over.
    pub lookback_days: u32,
    pub as_of: DateTime<Utc>,
}

/// One raw price bar, the input technical indicators are computed from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub ts: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Aggregate view of community discussion for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentDigest {
    pub symbol: String,
    /// Trailing window the aggregate covers, in hours.
    pub window_hours: u32,
    pub mention_count: u64,
    /// Share of mentions classified bullish, in `0.0..=1.0`.
    pub bullish_ratio: f64,
    pub sample_quotes: Vec<String>,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Headline {
    pub title: String,
    pub source: String,
    pub url: Option<String>,
    pub published_at: DateTime<Utc>,
}

/// Recent headlines for one entity, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsDigest {
    pub symbol: String,
    pub headlines: Vec<Headline>,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilingSummary {
    /// Form type, e.g. "10-K" or "8-K".
    pub form: String,
    pub filed_at: DateTime<Utc>,
    pub accession: String,
    pub description: Option<String>,
}

/// Recent regulatory filings for one entity, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilingsDigest {
    pub symbol: String,
    pub filings: Vec<FilingSummary>,
    pub as_of: DateTime<Utc>,
}

/// Action suggestion attached to a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingSignal {
    Accumulate,
    Wait,
    Avoid,
}

impl TimingSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accumulate => "accumulate",
            Self::Wait => "wait",
            Self::Avoid => "avoid",
        }
    }
}

impl fmt::Display for TimingSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compressed record of one earlier verdict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorVerdict {
    pub computed_at: DateTime<Utc>,
    pub score: u8,
    pub timing_signal: TimingSignal,
}

/// Rolling window of prior verdicts for one entity, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictHistory {
    pub symbol: String,
    pub entries: Vec<PriorVerdict>,
}

impl VerdictHistory {
    pub fn empty(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            entries: Vec::new(),
        }
    }

    pub fn latest(&self) -> Option<&PriorVerdict> {
        self.entries.last()
    }
}

/// Output of one synthesis pass over the gathered inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisOutput {
    /// Conviction score in `0..=100`.
    pub score: u8,
    pub thesis_summary: String,
    pub risk_summary: String,
    pub timing_signal: TimingSignal,
    pub alert: bool,
    pub alert_reason: Option<String>,
    /// Untouched synthesizer output, kept for audit.
    pub raw: serde_json::Value,
}

/// Typed union of everything a capability can return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum CapabilityPayload {
    Fundamentals(FundamentalsReport),
    Technical(TechnicalSnapshot),
    Sentiment(SentimentDigest),
    News(NewsDigest),
    Filings(FilingsDigest),
    History(VerdictHistory),
    Synthesis(SynthesisOutput),
}

impl CapabilityPayload {
    /// Variant name, for logs and mismatch diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fundamentals(_) => "fundamentals",
            Self::Technical(_) => "technical",
            Self::Sentiment(_) => "sentiment",
            Self::News(_) => "news",
            Self::Filings(_) => "filings",
            Self::History(_) => "history",
            Self::Synthesis(_) => "synthesis",
        }
    }
}

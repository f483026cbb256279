//! Source classes group capabilities by the upstream they draw from.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Upstream family behind a capability.
///
/// Rate limiting and cache TTL policy are keyed by source class rather than
/// by individual capability, so two capabilities backed by the same upstream
/// share one request budget and one freshness rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceClass {
    /// Exchange quotes and price history.
    MarketData,
    /// Financial statement and valuation data.
    Fundamentals,
    /// Community discussion aggregates.
    Community,
    /// Headline feeds.
    News,
    /// Regulatory filing indexes.
    Filings,
    /// Model-backed synthesis calls.
    Synthesis,
    /// Reads from our own persistence. Never rate limited or cached.
    Local,
}

impl SourceClass {
    /// Stable wire name used in cache keys and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MarketData => "market_data",
            Self::Fundamentals => "fundamentals",
            Self::Community => "community",
            Self::News => "news",
            Self::Filings => "filings",
            Self::Synthesis => "synthesis",
            Self::Local => "local",
        }
    }

    /// Every class, in declaration order. Useful when building policy tables.
    pub fn all() -> [SourceClass; 7] {
        [
            Self::MarketData,
            Self::Fundamentals,
            Self::Community,
            Self::News,
            Self::Filings,
            Self::Synthesis,
            Self::Local,
        ]
    }
}

impl fmt::Display for SourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

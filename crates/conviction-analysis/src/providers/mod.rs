//! Upstream data providers.
//!
//! Capabilities depend on these traits rather than concrete clients, so the
//! same pipeline runs against live services, the deterministic synthetic
//! generator, or mocks in tests.

mod edgar;
mod synthetic;
mod yahoo;

pub use edgar::EdgarClient;
pub use synthetic::SyntheticProvider;
pub use yahoo::YahooMarketData;

use async_trait::async_trait;

use conviction_core::{
    FilingsDigest, FundamentalsReport, NewsDigest, PricePoint, SentimentDigest, SourceError,
};

/// Daily price history supplier.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// The most recent `days` daily bars, oldest first.
    async fn price_history(&self, symbol: &str, days: u32)
    -> Result<Vec<PricePoint>, SourceError>;
}

/// Financial statement and valuation supplier.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FundamentalsProvider: Send + Sync {
    async fn fundamentals(&self, symbol: &str) -> Result<FundamentalsReport, SourceError>;
}

/// Community discussion aggregator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SentimentProvider: Send + Sync {
    /// Aggregate discussion over the trailing `window_hours`.
    async fn community_digest(
        &self,
        symbol: &str,
        window_hours: u32,
    ) -> Result<SentimentDigest, SourceError>;
}

/// Headline supplier.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NewsProvider: Send + Sync {
    /// Up to `limit` recent headlines, newest first.
    async fn headlines(&self, symbol: &str, limit: usize) -> Result<NewsDigest, SourceError>;
}

/// Regulatory filing supplier.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FilingsProvider: Send + Sync {
    /// Up to `limit` recent filings, newest first.
    async fn recent_filings(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<FilingsDigest, SourceError>;
}

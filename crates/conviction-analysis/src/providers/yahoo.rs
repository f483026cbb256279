//! Market data adapter backed by Yahoo Finance.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use time::OffsetDateTime;
use tracing::debug;
use yahoo_finance_api as yahoo;

use conviction_core::{PricePoint, SourceError};

use super::MarketDataProvider;

/// Daily price history via the public Yahoo Finance chart API.
pub struct YahooMarketData;

impl YahooMarketData {
    pub fn new() -> Self {
        Self
    }
}

impl Default for YahooMarketData {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataProvider for YahooMarketData {
    async fn price_history(
        &self,
        symbol: &str,
        days: u32,
    ) -> Result<Vec<PricePoint>, SourceError> {
        let provider =
            yahoo::YahooConnector::new().map_err(|e| SourceError::Transport(e.to_string()))?;

        // Request extra calendar days so weekends and holidays still leave
        // `days` trading bars to return.
        let span_days = i64::from(days) * 3 / 2 + 7;
        let end = Utc::now();
        let start = end - chrono::Duration::days(span_days);

        let start_odt = OffsetDateTime::from_unix_timestamp(start.timestamp())
            .map_err(|e| SourceError::Malformed(format!("invalid start timestamp: {e}")))?;
        let end_odt = OffsetDateTime::from_unix_timestamp(end.timestamp())
            .map_err(|e| SourceError::Malformed(format!("invalid end timestamp: {e}")))?;

        debug!(symbol, days, "fetching yahoo price history");
        let response = provider
            .get_quote_history(symbol, start_odt, end_odt)
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        let quotes = response
            .quotes()
            .map_err(|e| SourceError::Malformed(e.to_string()))?;
        if quotes.is_empty() {
            return Err(SourceError::NotFound);
        }

        let mut points: Vec<PricePoint> = quotes
            .iter()
            .map(|q| PricePoint {
                ts: DateTime::from_timestamp(q.timestamp as i64, 0).unwrap_or_else(Utc::now),
                open: q.open,
                high: q.high,
                low: q.low,
                close: q.close,
                volume: q.volume,
            })
            .collect();
        points.sort_by_key(|p| p.ts);
        if points.len() > days as usize {
            let excess = points.len() - days as usize;
            points.drain(..excess);
        }
        Ok(points)
    }
}

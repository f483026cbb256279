//! Technical snapshot capability.
//!
//! Pulls daily bars from the market data provider and reduces them to a
//! compact indicator snapshot: RSI, moving averages, MACD and a coarse
//! trend call.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use ta::Next;
use ta::indicators::{ExponentialMovingAverage, RelativeStrengthIndex, SimpleMovingAverage};
use tracing::debug;

use conviction_core::{
    Capability, CapabilityConfig, CapabilityId, CapabilityPayload, PricePoint, SourceClass,
    SourceError, TechnicalSnapshot, ToolArgs, TrendDirection,
};

use crate::providers::MarketDataProvider;

const DEFAULT_LOOKBACK_DAYS: i64 = 120;
const MIN_LOOKBACK_DAYS: i64 = 30;
const MAX_LOOKBACK_DAYS: i64 = 400;

/// Indicator snapshot computed from recent daily bars.
pub struct TechnicalCapability {
    provider: Arc<dyn MarketDataProvider>,
}

impl TechnicalCapability {
    pub fn new(provider: Arc<dyn MarketDataProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Capability for TechnicalCapability {
    fn id(&self) -> CapabilityId {
        CapabilityId::TechnicalSnapshot
    }

    fn source_class(&self) -> SourceClass {
        SourceClass::MarketData
    }

    fn description(&self) -> &str {
        "RSI, moving averages and MACD computed from recent price history"
    }

    fn params_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "symbol": { "type": "string", "description": "Ticker symbol, e.g. AAPL" },
                "lookback_days": {
                    "type": "integer",
                    "description": "Trading days of history to analyze",
                    "default": DEFAULT_LOOKBACK_DAYS
                }
            },
            "required": ["symbol"]
        })
    }

    async fn invoke(
        &self,
        args: &ToolArgs,
        config: &CapabilityConfig,
    ) -> Result<CapabilityPayload, SourceError> {
        let symbol = args.require_str("symbol")?;
        let lookback = args
            .i64_arg("lookback_days")
            .or_else(|| config.tunable_i64("lookback_days"))
            .unwrap_or(DEFAULT_LOOKBACK_DAYS)
            .clamp(MIN_LOOKBACK_DAYS, MAX_LOOKBACK_DAYS) as u32;

        debug!(symbol, lookback, "computing technical snapshot");
        let points = self.provider.price_history(symbol, lookback).await?;
        compute_snapshot(symbol, &points, lookback).map(CapabilityPayload::Technical)
    }
}

/// Pure indicator computation over ordered daily bars.
fn compute_snapshot(
    symbol: &str,
    points: &[PricePoint],
    lookback: u32,
) -> Result<TechnicalSnapshot, SourceError> {
    if points.len() < 2 {
        return Err(SourceError::Malformed(format!(
            "insufficient history: {} bars",
            points.len()
        )));
    }

    let closes: Vec<f64> = points.iter().map(|p| p.close).collect();
    let last_price = closes[closes.len() - 1];
    let prev_close = closes[closes.len() - 2];
    let change_pct_1d =
        (prev_close.abs() > f64::EPSILON).then(|| (last_price - prev_close) / prev_close * 100.0);

    let rsi_14 = RelativeStrengthIndex::new(14)
        .ok()
        .and_then(|i| indicator_tail(&closes, 15, i));
    let sma_20 = SimpleMovingAverage::new(20)
        .ok()
        .and_then(|i| indicator_tail(&closes, 20, i));
    let sma_50 = SimpleMovingAverage::new(50)
        .ok()
        .and_then(|i| indicator_tail(&closes, 50, i));
    let ema_12 = ExponentialMovingAverage::new(12)
        .ok()
        .and_then(|i| indicator_tail(&closes, 12, i));
    let ema_26 = ExponentialMovingAverage::new(26)
        .ok()
        .and_then(|i| indicator_tail(&closes, 26, i));
    let macd = match (ema_12, ema_26) {
        (Some(fast), Some(slow)) => Some(fast - slow),
        _ => None,
    };
    let macd_signal = macd_signal_line(&closes);
    let trend = classify_trend(last_price, sma_20, sma_50);

    Ok(TechnicalSnapshot {
        symbol: symbol.to_uppercase(),
        last_price,
        change_pct_1d,
        rsi_14,
        sma_20,
        sma_50,
        ema_12,
        ema_26,
        macd,
        macd_signal,
        trend,
        lookback_days: lookback,
        as_of: Utc::now(),
    })
}

/// Run an indicator over the whole series and keep the final value. `None`
/// when the series is shorter than the warm-up length.
fn indicator_tail<I>(closes: &[f64], warmup: usize, mut indicator: I) -> Option<f64>
where
    I: Next<f64, Output = f64>,
{
    if closes.len() < warmup {
        return None;
    }
    let mut last = None;
    for close in closes {
        last = Some(indicator.next(*close));
    }
    last
}

/// Signal line: 9-period EMA of the MACD series.
fn macd_signal_line(closes: &[f64]) -> Option<f64> {
    if closes.len() < 26 + 9 {
        return None;
    }
    let mut fast = ExponentialMovingAverage::new(12).ok()?;
    let mut slow = ExponentialMovingAverage::new(26).ok()?;
    let mut signal = ExponentialMovingAverage::new(9).ok()?;
    let mut last = None;
    for close in closes {
        let macd = fast.next(*close) - slow.next(*close);
        last = Some(signal.next(macd));
    }
    last
}

fn classify_trend(last_price: f64, sma_20: Option<f64>, sma_50: Option<f64>) -> TrendDirection {
    match (sma_20, sma_50) {
        (Some(s20), Some(s50)) => {
            if last_price > s20 && s20 > s50 {
                TrendDirection::Up
            } else if last_price < s20 && s20 < s50 {
                TrendDirection::Down
            } else {
                TrendDirection::Sideways
            }
        }
        (Some(s20), None) => {
            if last_price > s20 * 1.01 {
                TrendDirection::Up
            } else if last_price < s20 * 0.99 {
                TrendDirection::Down
            } else {
                TrendDirection::Sideways
            }
        }
        _ => TrendDirection::Sideways,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockMarketDataProvider;
    use chrono::TimeDelta;
    use conviction_core::ErrorCode;

    fn bars_from_closes(closes: &[f64]) -> Vec<PricePoint> {
        let now = Utc::now();
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| PricePoint {
                ts: now - TimeDelta::days((closes.len() - i) as i64),
                open: *close,
                high: close * 1.01,
                low: close * 0.99,
                close: *close,
                volume: 1_000_000,
            })
            .collect()
    }

    fn rising_closes(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64).collect()
    }

    fn falling_closes(n: usize) -> Vec<f64> {
        (0..n).map(|i| 300.0 - i as f64).collect()
    }

    #[test]
    fn rising_series_reads_as_uptrend() {
        let closes = rising_closes(120);
        let snapshot = compute_snapshot("UP", &bars_from_closes(&closes), 120).unwrap();
        assert_eq!(snapshot.trend, TrendDirection::Up);
        assert!(snapshot.rsi_14.unwrap() > 70.0);
        assert!(snapshot.sma_20.unwrap() > snapshot.sma_50.unwrap());
        assert!(snapshot.macd.unwrap() > 0.0);
        assert_eq!(snapshot.lookback_days, 120);
        let change = snapshot.change_pct_1d.unwrap();
        assert!(change > 0.0);
    }

    #[test]
    fn falling_series_reads_as_downtrend() {
        let closes = falling_closes(120);
        let snapshot = compute_snapshot("DOWN", &bars_from_closes(&closes), 120).unwrap();
        assert_eq!(snapshot.trend, TrendDirection::Down);
        assert!(snapshot.rsi_14.unwrap() < 30.0);
        assert!(snapshot.macd.unwrap() < 0.0);
    }

    #[test]
    fn short_series_leaves_slow_indicators_unset() {
        let closes = rising_closes(30);
        let snapshot = compute_snapshot("SHRT", &bars_from_closes(&closes), 30).unwrap();
        assert!(snapshot.rsi_14.is_some());
        assert!(snapshot.sma_20.is_some());
        assert!(snapshot.sma_50.is_none());
        assert!(snapshot.macd_signal.is_none());
    }

    #[test]
    fn too_little_history_is_malformed() {
        let closes = [42.0];
        let err = compute_snapshot("ONE", &bars_from_closes(&closes), 30).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ParseError);
    }

    #[tokio::test]
    async fn lookback_tunable_reaches_the_provider() {
        let mut provider = MockMarketDataProvider::new();
        provider
            .expect_price_history()
            .withf(|symbol, days| symbol == "AAPL" && *days == 200)
            .returning(|_, days| Ok(bars_from_closes(&rising_closes(days as usize))));

        let capability = TechnicalCapability::new(Arc::new(provider));
        let config = CapabilityConfig::default().with_tunable("lookback_days", 200i64);
        let args = ToolArgs::new().with("symbol", "AAPL");
        let payload = capability.invoke(&args, &config).await.unwrap();

        match payload {
            CapabilityPayload::Technical(snapshot) => {
                assert_eq!(snapshot.lookback_days, 200);
                assert_eq!(snapshot.symbol, "AAPL");
            }
            other => panic!("unexpected payload: {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn lookback_is_clamped_to_sane_bounds() {
        let mut provider = MockMarketDataProvider::new();
        provider
            .expect_price_history()
            .withf(|_, days| *days == MIN_LOOKBACK_DAYS as u32)
            .returning(|_, days| Ok(bars_from_closes(&rising_closes(days as usize))));

        let capability = TechnicalCapability::new(Arc::new(provider));
        let args = ToolArgs::new()
            .with("symbol", "AAPL")
            .with("lookback_days", 1i64);
        let payload = capability
            .invoke(&args, &CapabilityConfig::default())
            .await
            .unwrap();
        assert!(matches!(payload, CapabilityPayload::Technical(_)));
    }
}

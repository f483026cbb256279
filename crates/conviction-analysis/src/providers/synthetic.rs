//! Deterministic offline data source.
//!
//! Generates plausible fixtures from a hash of the symbol, so demo runs and
//! tests exercise the full pipeline without network access and the same
//! symbol always yields the same figures.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};

use conviction_core::{
    FilingSummary, FilingsDigest, FundamentalsReport, Headline, NewsDigest, PricePoint,
    SentimentDigest, SourceError,
};

use super::{
    FilingsProvider, FundamentalsProvider, MarketDataProvider, NewsProvider, SentimentProvider,
};

const NEWS_SOURCES: [&str; 5] = ["Reuters", "Bloomberg", "MarketWatch", "Barron's", "The Journal"];

const NEWS_TEMPLATES: [&str; 6] = [
    "{} beats quarterly estimates on stronger demand",
    "Analysts split on {} after guidance update",
    "{} expands capacity with new facility",
    "Institutional buyers add to {} positions",
    "{} faces margin pressure from input costs",
    "What the latest filings reveal about {}",
];

const FILING_FORMS: [&str; 8] = ["10-Q", "8-K", "4", "10-K", "8-K", "SC 13G", "4", "DEF 14A"];

/// Offline provider covering every input source.
#[derive(Debug, Default)]
pub struct SyntheticProvider;

impl SyntheticProvider {
    pub fn new() -> Self {
        Self
    }
}

fn seed_for(symbol: &str, salt: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    symbol.to_uppercase().hash(&mut hasher);
    salt.hash(&mut hasher);
    hasher.finish()
}

/// Small linear congruential generator. Not statistically serious, just
/// stable across runs and platforms.
struct Lcg(u64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407))
    }

    fn next_u64(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn in_range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }
}

#[async_trait]
impl MarketDataProvider for SyntheticProvider {
    async fn price_history(
        &self,
        symbol: &str,
        days: u32,
    ) -> Result<Vec<PricePoint>, SourceError> {
        let mut rng = Lcg::new(seed_for(symbol, "prices"));
        let mut close = rng.in_range(20.0, 400.0);
        let drift = rng.in_range(-0.002, 0.003);
        let now = Utc::now();

        let mut points = Vec::with_capacity(days as usize);
        for i in 0..days {
            let daily = drift + rng.in_range(-0.025, 0.025);
            let open = close;
            close = (close * (1.0 + daily)).max(0.5);
            let high = open.max(close) * (1.0 + rng.in_range(0.0, 0.015));
            let low = open.min(close) * (1.0 - rng.in_range(0.0, 0.015));
            let volume = rng.in_range(1.0e6, 5.0e7) as u64;
            let age = TimeDelta::days(i64::from(days - i));
            let ts = now.checked_sub_signed(age).unwrap_or(now);
            points.push(PricePoint {
                ts,
                open,
                high,
                low,
                close,
                volume,
            });
        }
        Ok(points)
    }
}

#[async_trait]
impl FundamentalsProvider for SyntheticProvider {
    async fn fundamentals(&self, symbol: &str) -> Result<FundamentalsReport, SourceError> {
        let mut rng = Lcg::new(seed_for(symbol, "fundamentals"));
        let revenue = rng.in_range(5.0e8, 4.0e11);
        let margin = rng.in_range(-5.0, 30.0);
        let net_income = revenue * margin / 100.0;
        Ok(FundamentalsReport {
            symbol: symbol.to_uppercase(),
            company_name: Some(format!("{} Inc.", symbol.to_uppercase())),
            market_cap: Some(rng.in_range(2.0e9, 2.5e12)),
            pe_ratio: Some(rng.in_range(8.0, 80.0)),
            eps_diluted: Some(rng.in_range(0.2, 15.0)),
            revenue: Some(revenue),
            revenue_growth_pct: Some(rng.in_range(-10.0, 45.0)),
            net_income: Some(net_income),
            profit_margin_pct: Some(margin),
            debt_to_equity: Some(rng.in_range(0.05, 2.5)),
            fiscal_period: Some("FY2025".to_string()),
            as_of: Utc::now(),
        })
    }
}

#[async_trait]
impl SentimentProvider for SyntheticProvider {
    async fn community_digest(
        &self,
        symbol: &str,
        window_hours: u32,
    ) -> Result<SentimentDigest, SourceError> {
        let mut rng = Lcg::new(seed_for(symbol, "sentiment"));
        let upper = symbol.to_uppercase();
        let bullish_ratio = rng.in_range(0.2, 0.85);
        let mention_count = 40 + rng.next_u64() % 2000;
        let sample_quotes = vec![
            format!("{upper} setup looks constructive into earnings"),
            format!("Trimmed my {upper} position, valuation is stretched here"),
            format!("{upper} thesis unchanged, adding on weakness"),
        ];
        Ok(SentimentDigest {
            symbol: upper,
            window_hours,
            mention_count,
            bullish_ratio,
            sample_quotes,
            as_of: Utc::now(),
        })
    }
}

#[async_trait]
impl NewsProvider for SyntheticProvider {
    async fn headlines(&self, symbol: &str, limit: usize) -> Result<NewsDigest, SourceError> {
        let mut rng = Lcg::new(seed_for(symbol, "news"));
        let upper = symbol.to_uppercase();
        let now = Utc::now();
        let count = limit.min(NEWS_TEMPLATES.len());

        let mut headlines = Vec::with_capacity(count);
        for i in 0..count {
            let template = NEWS_TEMPLATES[rng.next_u64() as usize % NEWS_TEMPLATES.len()];
            let source = NEWS_SOURCES[rng.next_u64() as usize % NEWS_SOURCES.len()];
            let age = TimeDelta::hours(3 + 5 * i as i64);
            headlines.push(Headline {
                title: template.replace("{}", &upper),
                source: source.to_string(),
                url: Some(format!(
                    "https://news.example.com/{}/{i}",
                    upper.to_lowercase()
                )),
                published_at: now.checked_sub_signed(age).unwrap_or(now),
            });
        }
        Ok(NewsDigest {
            symbol: upper,
            headlines,
            as_of: now,
        })
    }
}

#[async_trait]
impl FilingsProvider for SyntheticProvider {
    async fn recent_filings(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<FilingsDigest, SourceError> {
        let mut rng = Lcg::new(seed_for(symbol, "filings"));
        let upper = symbol.to_uppercase();
        let now = Utc::now();
        let count = limit.min(FILING_FORMS.len());

        let mut filings = Vec::with_capacity(count);
        for i in 0..count {
            let form = FILING_FORMS[i];
            let age = TimeDelta::days(4 + 9 * i as i64);
            let description = match form {
                "8-K" => Some("Report of material corporate event".to_string()),
                "4" => Some("Statement of changes in beneficial ownership".to_string()),
                _ => None,
            };
            filings.push(FilingSummary {
                form: form.to_string(),
                filed_at: now.checked_sub_signed(age).unwrap_or(now),
                accession: format!("0000000000-25-{:06}", rng.next_u64() % 1_000_000),
                description,
            });
        }
        Ok(FilingsDigest {
            symbol: upper,
            filings,
            as_of: now,
        })
    }
}

//! Synthesis boundary and the deterministic weighted synthesizer.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use conviction_core::{
    FilingsDigest, FundamentalsReport, SentimentDigest, SourceError, SynthesisOutput,
    TechnicalSnapshot, TimingSignal, TrendDirection,
};
use conviction_core::{NewsDigest, VerdictHistory};

/// Everything gathered for one entity, handed to the synthesizer as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisContext {
    pub symbol: String,
    pub as_of: DateTime<Utc>,
    /// True when one or more inputs could not be gathered.
    pub partial_inputs: bool,
    pub fundamentals: Option<FundamentalsReport>,
    pub technical: Option<TechnicalSnapshot>,
    pub sentiment: Option<SentimentDigest>,
    pub news: Option<NewsDigest>,
    pub filings: Option<FilingsDigest>,
    pub prior_verdicts: Option<VerdictHistory>,
}

impl SynthesisContext {
    /// Canonical JSON form used as the synthesizer capability argument.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Opaque judgment boundary.
///
/// The pipeline treats the synthesizer as a black box: context in, scored
/// output out. Swapping in a model-backed implementation changes nothing
/// upstream.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, context: &SynthesisContext) -> Result<SynthesisOutput, SourceError>;
}

/// Rule-based synthesizer with fixed weights.
///
/// Scores from a neutral base of 50 using bounded contributions from each
/// present input, so the same context always produces the same verdict.
#[derive(Debug, Default)]
pub struct WeightedSynthesizer;

const BASE_SCORE: f64 = 50.0;

impl WeightedSynthesizer {
    pub fn new() -> Self {
        Self
    }

    fn valuation_score(f: &FundamentalsReport) -> f64 {
        let mut score: f64 = 0.0;
        match f.pe_ratio {
            Some(pe) if pe <= 0.0 => score -= 4.0,
            Some(pe) if pe < 15.0 => score += 8.0,
            Some(pe) if pe < 30.0 => score += 3.0,
            Some(pe) if pe < 60.0 => score -= 3.0,
            Some(_) => score -= 8.0,
            None => {}
        }
        match f.revenue_growth_pct {
            Some(g) if g >= 20.0 => score += 7.0,
            Some(g) if g >= 5.0 => score += 3.0,
            Some(g) if g < 0.0 => score -= 6.0,
            _ => {}
        }
        match f.profit_margin_pct {
            Some(m) if m >= 15.0 => score += 4.0,
            Some(m) if m < 0.0 => score -= 5.0,
            _ => {}
        }
        if matches!(f.debt_to_equity, Some(d) if d > 2.0) {
            score -= 3.0;
        }
        score.clamp(-15.0, 15.0)
    }

    fn momentum_score(t: &TechnicalSnapshot) -> f64 {
        let mut score: f64 = match t.trend {
            TrendDirection::Up => 7.0,
            TrendDirection::Down => -7.0,
            TrendDirection::Sideways => 0.0,
        };
        match t.rsi_14 {
            Some(r) if r < 30.0 => score += 4.0,
            Some(r) if r > 70.0 => score -= 4.0,
            _ => {}
        }
        if let Some(sma_50) = t.sma_50 {
            score += if t.last_price > sma_50 { 4.0 } else { -4.0 };
        }
        score.clamp(-15.0, 15.0)
    }

    fn sentiment_score(s: &SentimentDigest) -> f64 {
        let mut score: f64 = if s.bullish_ratio >= 0.65 {
            6.0
        } else if s.bullish_ratio <= 0.35 {
            -6.0
        } else {
            0.0
        };
        // High discussion volume amplifies whichever way the crowd leans.
        if s.mention_count >= 500 && score != 0.0 {
            score += 2.0 * score.signum();
        }
        score.clamp(-8.0, 8.0)
    }

    fn filings_caution(f: &FilingsDigest, as_of: DateTime<Utc>) -> f64 {
        let window = TimeDelta::days(30);
        let recent_events = f
            .filings
            .iter()
            .filter(|filing| filing.form == "8-K" && as_of - filing.filed_at <= window)
            .count();
        -(2.0 * recent_events as f64).min(6.0)
    }
}

fn describe_valuation(f: &FundamentalsReport, contribution: f64) -> String {
    let pe = f
        .pe_ratio
        .map_or_else(|| "n/a".to_string(), |p| format!("{p:.1}"));
    let growth = f
        .revenue_growth_pct
        .map_or_else(|| "n/a".to_string(), |g| format!("{g:+.1}%"));
    if contribution > 2.0 {
        format!("fundamentals supportive (pe {pe}, revenue growth {growth})")
    } else if contribution < -2.0 {
        format!("fundamentals stretched (pe {pe}, revenue growth {growth})")
    } else {
        format!("fundamentals mixed (pe {pe}, revenue growth {growth})")
    }
}

fn describe_momentum(t: &TechnicalSnapshot) -> String {
    let rsi = t
        .rsi_14
        .map_or_else(|| "n/a".to_string(), |r| format!("{r:.0}"));
    format!("trend {} with rsi {rsi}", t.trend)
}

fn describe_sentiment(s: &SentimentDigest) -> String {
    let leaning = if s.bullish_ratio >= 0.65 {
        "bullish"
    } else if s.bullish_ratio <= 0.35 {
        "bearish"
    } else {
        "divided"
    };
    format!(
        "community {} ({:.0}% positive across {} mentions)",
        leaning,
        s.bullish_ratio * 100.0,
        s.mention_count
    )
}

#[async_trait]
impl Synthesizer for WeightedSynthesizer {
    async fn synthesize(&self, context: &SynthesisContext) -> Result<SynthesisOutput, SourceError> {
        let mut theses: Vec<String> = Vec::new();
        let mut risks: Vec<String> = Vec::new();

        let valuation = context.fundamentals.as_ref().map_or(0.0, |f| {
            let score = Self::valuation_score(f);
            theses.push(describe_valuation(f, score));
            if matches!(f.revenue_growth_pct, Some(g) if g < 0.0) {
                risks.push("revenue contracting year over year".to_string());
            }
            if matches!(f.profit_margin_pct, Some(m) if m < 0.0) {
                risks.push("operating at a loss".to_string());
            }
            if matches!(f.debt_to_equity, Some(d) if d > 2.0) {
                risks.push("balance sheet leveraged".to_string());
            }
            score
        });
        if context.fundamentals.is_none() {
            risks.push("fundamentals unavailable".to_string());
        }

        let momentum = context.technical.as_ref().map_or(0.0, |t| {
            let score = Self::momentum_score(t);
            theses.push(describe_momentum(t));
            if t.trend == TrendDirection::Down {
                risks.push("price in a downtrend".to_string());
            }
            if matches!(t.rsi_14, Some(r) if r > 70.0) {
                risks.push("overbought short term".to_string());
            }
            score
        });
        if context.technical.is_none() {
            risks.push("technical picture unavailable".to_string());
        }

        let sentiment = context.sentiment.as_ref().map_or(0.0, |s| {
            let score = Self::sentiment_score(s);
            theses.push(describe_sentiment(s));
            if s.bullish_ratio <= 0.35 {
                risks.push("community sentiment negative".to_string());
            }
            score
        });

        let filings = context.filings.as_ref().map_or(0.0, |f| {
            let score = Self::filings_caution(f, context.as_of);
            if score < 0.0 {
                risks.push("multiple material event filings in the last month".to_string());
            }
            score
        });

        if let Some(news) = &context.news {
            if let Some(latest) = news.headlines.first() {
                theses.push(format!("latest coverage: {}", latest.title));
            }
        }
        if context.partial_inputs {
            risks.push("verdict computed from partial inputs".to_string());
        }

        let score_raw = BASE_SCORE + valuation + momentum + sentiment + filings;
        let score = score_raw.round().clamp(0.0, 100.0) as u8;

        let trend_confirmed = context
            .technical
            .as_ref()
            .is_some_and(|t| t.trend != TrendDirection::Down);
        let timing_signal = if score >= 70 && trend_confirmed {
            TimingSignal::Accumulate
        } else if score < 45 {
            TimingSignal::Avoid
        } else {
            TimingSignal::Wait
        };

        let mut alert_reason = None;
        if let Some(prior) = context.prior_verdicts.as_ref().and_then(|h| h.latest()) {
            if i16::from(prior.score) - i16::from(score) >= 15 {
                alert_reason = Some(format!(
                    "conviction dropped from {} to {score}",
                    prior.score
                ));
            }
        }
        if alert_reason.is_none() {
            if let Some(rsi) = context.technical.as_ref().and_then(|t| t.rsi_14) {
                if rsi >= 80.0 {
                    alert_reason = Some(format!("overbought, rsi {rsi:.0}"));
                } else if rsi <= 20.0 {
                    alert_reason = Some(format!("washed out, rsi {rsi:.0}"));
                }
            }
        }
        if alert_reason.is_none() && score <= 20 {
            alert_reason = Some("conviction critically low".to_string());
        }

        let raw = json!({
            "model": "weighted-v1",
            "base": BASE_SCORE,
            "score_raw": score_raw,
            "contributions": {
                "valuation": valuation,
                "momentum": momentum,
                "sentiment": sentiment,
                "filings": filings,
            },
            "inputs_present": {
                "fundamentals": context.fundamentals.is_some(),
                "technical": context.technical.is_some(),
                "sentiment": context.sentiment.is_some(),
                "news": context.news.is_some(),
                "filings": context.filings.is_some(),
                "prior_verdicts": context.prior_verdicts.is_some(),
            },
        });

        Ok(SynthesisOutput {
            score,
            thesis_summary: if theses.is_empty() {
                format!("no inputs available for {}", context.symbol)
            } else {
                theses.join("; ")
            },
            risk_summary: if risks.is_empty() {
                "no outstanding risk flags".to_string()
            } else {
                risks.join("; ")
            },
            timing_signal,
            alert: alert_reason.is_some(),
            alert_reason,
            raw,
        })
    }
}

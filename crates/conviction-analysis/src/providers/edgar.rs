//! SEC EDGAR adapter for fundamentals and filings.
//!
//! EDGAR is the SEC's public filing system. It requires a descriptive
//! User-Agent containing contact details; set `SEC_USER_AGENT` to identify
//! your deployment. Request pacing is handled upstream by the per-source
//! rate limiter, not here.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use conviction_core::{FilingSummary, FilingsDigest, FundamentalsReport, SourceError};

use super::{FilingsProvider, FundamentalsProvider};

const SEC_BASE_URL: &str = "https://data.sec.gov";
const SEC_COMPANY_TICKERS_URL: &str = "https://www.sec.gov/files/company_tickers.json";

/// Company facts response from SEC XBRL.
#[derive(Debug, Clone, Deserialize)]
struct CompanyFacts {
    #[serde(rename = "entityName")]
    entity_name: String,
    facts: Facts,
}

#[derive(Debug, Clone, Deserialize)]
struct Facts {
    #[serde(rename = "us-gaap")]
    us_gaap: Option<serde_json::Value>,
}

/// Submissions response, trimmed to the fields the digest needs.
#[derive(Debug, Clone, Deserialize)]
struct CompanySubmissions {
    filings: FilingsData,
}

#[derive(Debug, Clone, Deserialize)]
struct FilingsData {
    recent: RecentFilings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecentFilings {
    accession_number: Vec<String>,
    filing_date: Vec<String>,
    form: Vec<String>,
    #[serde(default)]
    primary_doc_description: Vec<Option<String>>,
}

/// One annual XBRL fact, deduplicated per fiscal year.
struct AnnualFact {
    fiscal_year: i64,
    filed: String,
    value: f64,
}

/// SEC EDGAR API client.
pub struct EdgarClient {
    client: Client,
    user_agent: String,
}

impl EdgarClient {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            user_agent: user_agent.into(),
        }
    }

    /// Build from `SEC_USER_AGENT`, falling back to a placeholder identity.
    pub fn from_env() -> Self {
        let user_agent = std::env::var("SEC_USER_AGENT")
            .unwrap_or_else(|_| "conviction-research (research@example.com)".to_string());
        Self::new(user_agent)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(classify_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::from_status(status.as_u16()));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SourceError::Malformed(format!("unexpected SEC response shape: {e}")))
    }

    /// Resolve a ticker to its zero-padded ten-digit CIK.
    pub async fn lookup_cik(&self, ticker: &str) -> Result<String, SourceError> {
        let data: serde_json::Value = self.get_json(SEC_COMPANY_TICKERS_URL).await?;
        let ticker_upper = ticker.to_uppercase();

        if let Some(companies) = data.as_object() {
            for company in companies.values() {
                let matches = company
                    .get("ticker")
                    .and_then(|t| t.as_str())
                    .is_some_and(|t| t.eq_ignore_ascii_case(&ticker_upper));
                if !matches {
                    continue;
                }
                // EDGAR serves cik_str as a number, older mirrors as a string.
                let cik = company.get("cik_str").and_then(|c| {
                    c.as_u64()
                        .or_else(|| c.as_str().and_then(|s| s.parse().ok()))
                });
                if let Some(cik) = cik {
                    return Ok(format!("{cik:010}"));
                }
            }
        }
        Err(SourceError::NotFound)
    }

    async fn company_facts(&self, cik: &str) -> Result<CompanyFacts, SourceError> {
        let url = format!("{SEC_BASE_URL}/api/xbrl/companyfacts/CIK{cik}.json");
        self.get_json(&url).await
    }

    async fn submissions(&self, cik: &str) -> Result<CompanySubmissions, SourceError> {
        let url = format!("{SEC_BASE_URL}/submissions/CIK{cik}.json");
        self.get_json(&url).await
    }
}

#[async_trait]
impl FundamentalsProvider for EdgarClient {
    async fn fundamentals(&self, symbol: &str) -> Result<FundamentalsReport, SourceError> {
        let cik = self.lookup_cik(symbol).await?;
        debug!(symbol, cik, "fetching company facts");
        let facts = self.company_facts(&cik).await?;
        Ok(report_from_facts(symbol, &facts))
    }
}

#[async_trait]
impl FilingsProvider for EdgarClient {
    async fn recent_filings(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<FilingsDigest, SourceError> {
        let cik = self.lookup_cik(symbol).await?;
        debug!(symbol, cik, limit, "fetching submissions");
        let submissions = self.submissions(&cik).await?;
        Ok(digest_from_recent(symbol, &submissions.filings.recent, limit))
    }
}

fn classify_reqwest(e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::Timeout
    } else {
        SourceError::Transport(e.to_string())
    }
}

/// Annual values for the first concept that has any, oldest fiscal year
/// first. Restated years keep the most recently filed figure.
fn annual_facts(us_gaap: &serde_json::Value, concepts: &[&str]) -> Vec<AnnualFact> {
    for concept in concepts {
        let entries = us_gaap
            .get(concept)
            .and_then(|c| c.get("units"))
            .and_then(|units| units.get("USD").or_else(|| units.get("USD/shares")))
            .and_then(|u| u.as_array());
        let Some(entries) = entries else {
            continue;
        };

        let mut by_year: BTreeMap<i64, AnnualFact> = BTreeMap::new();
        for entry in entries {
            if entry.get("fp").and_then(|f| f.as_str()) != Some("FY") {
                continue;
            }
            if let (Some(value), Some(fiscal_year), Some(filed)) = (
                entry.get("val").and_then(|v| v.as_f64()),
                entry.get("fy").and_then(|y| y.as_i64()),
                entry.get("filed").and_then(|f| f.as_str()),
            ) {
                let fact = AnnualFact {
                    fiscal_year,
                    filed: filed.to_string(),
                    value,
                };
                match by_year.get(&fiscal_year) {
                    Some(existing) if existing.filed >= fact.filed => {}
                    _ => {
                        by_year.insert(fiscal_year, fact);
                    }
                }
            }
        }
        if !by_year.is_empty() {
            return by_year.into_values().collect();
        }
    }
    Vec::new()
}

fn report_from_facts(symbol: &str, facts: &CompanyFacts) -> FundamentalsReport {
    let empty = serde_json::Value::Null;
    let us_gaap = facts.facts.us_gaap.as_ref().unwrap_or(&empty);

    let revenues = annual_facts(
        us_gaap,
        &[
            "Revenues",
            "RevenueFromContractWithCustomerExcludingAssessedTax",
        ],
    );
    let net_incomes = annual_facts(us_gaap, &["NetIncomeLoss"]);
    let eps = annual_facts(us_gaap, &["EarningsPerShareDiluted", "EarningsPerShareBasic"]);
    let liabilities = annual_facts(us_gaap, &["Liabilities"]);
    let equity = annual_facts(us_gaap, &["StockholdersEquity"]);

    let revenue = revenues.last().map(|f| f.value);
    let revenue_growth_pct = if revenues.len() >= 2 {
        let prev = revenues[revenues.len() - 2].value;
        let last = revenues[revenues.len() - 1].value;
        (prev.abs() > f64::EPSILON).then(|| (last - prev) / prev.abs() * 100.0)
    } else {
        None
    };
    let net_income = net_incomes.last().map(|f| f.value);
    let profit_margin_pct = match (net_income, revenue) {
        (Some(n), Some(r)) if r.abs() > f64::EPSILON => Some(n / r * 100.0),
        _ => None,
    };
    let debt_to_equity = match (liabilities.last(), equity.last()) {
        (Some(l), Some(e)) if e.value > f64::EPSILON => Some(l.value / e.value),
        _ => None,
    };

    FundamentalsReport {
        symbol: symbol.to_uppercase(),
        company_name: Some(facts.entity_name.clone()),
        // Market cap and P/E need a live share price, which EDGAR does not
        // carry.
        market_cap: None,
        pe_ratio: None,
        eps_diluted: eps.last().map(|f| f.value),
        revenue,
        revenue_growth_pct,
        net_income,
        profit_margin_pct,
        debt_to_equity,
        fiscal_period: revenues.last().map(|f| format!("FY{}", f.fiscal_year)),
        as_of: Utc::now(),
    }
}

fn digest_from_recent(symbol: &str, recent: &RecentFilings, limit: usize) -> FilingsDigest {
    let count = recent
        .accession_number
        .len()
        .min(recent.filing_date.len())
        .min(recent.form.len())
        .min(limit);

    let mut filings = Vec::with_capacity(count);
    for i in 0..count {
        filings.push(FilingSummary {
            form: recent.form[i].clone(),
            filed_at: parse_filing_date(&recent.filing_date[i]),
            accession: recent.accession_number[i].clone(),
            description: recent
                .primary_doc_description
                .get(i)
                .and_then(|d| d.clone()),
        });
    }
    FilingsDigest {
        symbol: symbol.to_uppercase(),
        filings,
        as_of: Utc::now(),
    }
}

fn parse_filing_date(raw: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or_else(Utc::now)
}

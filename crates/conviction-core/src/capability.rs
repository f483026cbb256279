//! Capability identity, contract and per-capability configuration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::args::{ArgValue, ToolArgs};
use crate::error::SourceError;
use crate::payload::CapabilityPayload;
use crate::source::SourceClass;

/// Closed set of capability identities.
///
/// The registry is keyed by this enum rather than by free-form strings, so
/// adding a capability is a compile-visible change and a typo in a name can
/// only fail at the string boundary (CLI input, wire requests), never inside
/// the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityId {
    Fundamentals,
    TechnicalSnapshot,
    CommunitySentiment,
    NewsDigest,
    RecentFilings,
    VerdictHistory,
    Synthesizer,
}

impl CapabilityId {
    /// Stable wire name accepted by the executor and shown in the CLI.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fundamentals => "fundamentals",
            Self::TechnicalSnapshot => "technical_snapshot",
            Self::CommunitySentiment => "community_sentiment",
            Self::NewsDigest => "news_digest",
            Self::RecentFilings => "recent_filings",
            Self::VerdictHistory => "verdict_history",
            Self::Synthesizer => "synthesizer",
        }
    }

    /// Resolve a wire name back to an identity.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "fundamentals" => Some(Self::Fundamentals),
            "technical_snapshot" => Some(Self::TechnicalSnapshot),
            "community_sentiment" => Some(Self::CommunitySentiment),
            "news_digest" => Some(Self::NewsDigest),
            "recent_filings" => Some(Self::RecentFilings),
            "verdict_history" => Some(Self::VerdictHistory),
            "synthesizer" => Some(Self::Synthesizer),
            _ => None,
        }
    }

    /// Every identity, in declaration order.
    pub fn all() -> [CapabilityId; 7] {
        [
            Self::Fundamentals,
            Self::TechnicalSnapshot,
            Self::CommunitySentiment,
            Self::NewsDigest,
            Self::RecentFilings,
            Self::VerdictHistory,
            Self::Synthesizer,
        ]
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Effective configuration a capability is invoked with.
///
/// Defaults are declared at registration; callers may override per request.
/// Tunables are free-form scalars the capability interprets itself, e.g. a
/// headline limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityConfig {
    pub enabled: bool,
    pub tunables: BTreeMap<String, ArgValue>,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tunables: BTreeMap::new(),
        }
    }
}

impl CapabilityConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            tunables: BTreeMap::new(),
        }
    }

    pub fn with_tunable(mut self, key: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.tunables.insert(key.into(), value.into());
        self
    }

    pub fn tunable_i64(&self, key: &str) -> Option<i64> {
        self.tunables.get(key).and_then(ArgValue::as_i64)
    }

    pub fn tunable_f64(&self, key: &str) -> Option<f64> {
        self.tunables.get(key).and_then(ArgValue::as_f64)
    }

    pub fn tunable_str(&self, key: &str) -> Option<&str> {
        self.tunables.get(key).and_then(ArgValue::as_str)
    }

    pub fn tunable_bool(&self, key: &str) -> Option<bool> {
        self.tunables.get(key).and_then(ArgValue::as_bool)
    }
}

/// A single data-acquisition operation exposed through the executor.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Identity used for registry lookup and logging.
    fn id(&self) -> CapabilityId;

    /// Upstream family. Drives rate limiting and cache TTL selection.
    fn source_class(&self) -> SourceClass;

    /// One-line summary for listings.
    fn description(&self) -> &str;

    /// JSON schema describing the accepted arguments.
    fn params_schema(&self) -> serde_json::Value;

    /// Execute against the upstream with the effective configuration applied.
    async fn invoke(
        &self,
        args: &ToolArgs,
        config: &CapabilityConfig,
    ) -> Result<CapabilityPayload, SourceError>;
}

//! Engine configuration with validated builder.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use thiserror::Error;

use conviction_core::{CapabilityId, SourceClass};

use crate::limiter::RatePolicy;
use crate::registry::CapabilityOverride;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid engine configuration: {0}")]
    Invalid(String),
}

/// Tuning for the executor and its service layers.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Admission policy per source class. Classes absent from the map are
    /// admitted without limit.
    pub rate_policies: HashMap<SourceClass, RatePolicy>,
    /// Durable cache TTL per source class. Classes absent from the map
    /// bypass the durable cache.
    pub cache_ttls: HashMap<SourceClass, Duration>,
    /// Lifespan of dedup slots between pass resets.
    pub dedup_ttl: Duration,
    /// Deadline applied to each upstream invocation.
    pub call_timeout: Duration,
    /// Backoff before the first retry. Doubles per subsequent retry.
    pub retry_backoff_base: Duration,
    /// Caller overrides applied on top of registration defaults.
    pub capability_overrides: BTreeMap<CapabilityId, CapabilityOverride>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rate_policies: default_rate_policies(),
            cache_ttls: default_cache_ttls(),
            dedup_ttl: Duration::from_secs(30),
            call_timeout: Duration::from_secs(30),
            retry_backoff_base: Duration::from_millis(500),
            capability_overrides: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.call_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "call_timeout must be positive".to_string(),
            ));
        }
        if self.dedup_ttl.is_zero() {
            return Err(ConfigError::Invalid(
                "dedup_ttl must be positive".to_string(),
            ));
        }
        for (class, policy) in &self.rate_policies {
            if policy.max_requests == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{class}: max_requests must be positive"
                )));
            }
            if policy.window.is_zero() {
                return Err(ConfigError::Invalid(format!(
                    "{class}: window must be positive"
                )));
            }
        }
        Ok(())
    }
}

/// Conservative per-class admission defaults.
pub fn default_rate_policies() -> HashMap<SourceClass, RatePolicy> {
    let mut policies = HashMap::new();
    policies.insert(
        SourceClass::MarketData,
        RatePolicy::new(30, Duration::from_secs(60), Duration::from_secs(1)),
    );
    policies.insert(
        SourceClass::Fundamentals,
        RatePolicy::new(10, Duration::from_secs(60), Duration::from_secs(2)),
    );
    policies.insert(
        SourceClass::Community,
        RatePolicy::new(6, Duration::from_secs(60), Duration::from_secs(5)),
    );
    policies.insert(
        SourceClass::News,
        RatePolicy::new(10, Duration::from_secs(60), Duration::from_secs(3)),
    );
    policies.insert(
        SourceClass::Filings,
        RatePolicy::new(8, Duration::from_secs(60), Duration::from_secs(2)),
    );
    policies.insert(
        SourceClass::Synthesis,
        RatePolicy::new(6, Duration::from_secs(60), Duration::from_secs(2)),
    );
    // Local reads are unlimited.
    policies
}

/// Default freshness windows per source class.
pub fn default_cache_ttls() -> HashMap<SourceClass, Duration> {
    let mut ttls = HashMap::new();
    ttls.insert(SourceClass::MarketData, Duration::from_secs(5 * 60));
    ttls.insert(SourceClass::Fundamentals, Duration::from_secs(12 * 60 * 60));
    ttls.insert(SourceClass::Community, Duration::from_secs(8 * 60 * 60));
    ttls.insert(SourceClass::News, Duration::from_secs(30 * 60));
    ttls.insert(SourceClass::Filings, Duration::from_secs(24 * 60 * 60));
    // Local reads and synthesis results never enter the durable cache.
    ttls
}

pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    pub fn rate_policy(mut self, class: SourceClass, policy: RatePolicy) -> Self {
        self.config.rate_policies.insert(class, policy);
        self
    }

    /// Remove the admission policy for a class entirely.
    pub fn no_rate_limit(mut self, class: SourceClass) -> Self {
        self.config.rate_policies.remove(&class);
        self
    }

    pub fn cache_ttl(mut self, class: SourceClass, ttl: Duration) -> Self {
        self.config.cache_ttls.insert(class, ttl);
        self
    }

    /// Make a class bypass the durable cache.
    pub fn no_cache(mut self, class: SourceClass) -> Self {
        self.config.cache_ttls.remove(&class);
        self
    }

    pub fn dedup_ttl(mut self, ttl: Duration) -> Self {
        self.config.dedup_ttl = ttl;
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    pub fn retry_backoff_base(mut self, base: Duration) -> Self {
        self.config.retry_backoff_base = base;
        self
    }

    pub fn capability_override(mut self, id: CapabilityId, o: CapabilityOverride) -> Self {
        self.config.capability_overrides.insert(id, o);
        self
    }

    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

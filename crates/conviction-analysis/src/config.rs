//! Analyzer and batch tuning.

use std::time::Duration;

use crate::error::AnalysisError;

/// Tuning knobs for the per-entity analyzer and the batch runner.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Synthesize a partial verdict when mandatory inputs are missing
    /// instead of skipping the entity.
    pub allow_missing_inputs: bool,
    /// Reuse a persisted technical snapshot younger than this instead of
    /// recomputing it.
    pub technical_refresh_interval: Duration,
    /// How long a verdict counts as current.
    pub verdict_ttl: Duration,
    /// Batch `skip_fresh` threshold: entities whose verdict is younger than
    /// this are not re-analyzed.
    pub verdict_fresh_within: Duration,
    /// Retries per input fetch on retryable failures.
    pub fetch_retries: u32,
    /// Retries for the synthesis call.
    pub synthesis_retries: u32,
    /// Pause between entities in a batch run.
    pub batch_pacing: Duration,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            allow_missing_inputs: false,
            technical_refresh_interval: Duration::from_secs(15 * 60),
            verdict_ttl: Duration::from_secs(24 * 60 * 60),
            verdict_fresh_within: Duration::from_secs(6 * 60 * 60),
            fetch_retries: 2,
            synthesis_retries: 2,
            batch_pacing: Duration::from_secs(2),
        }
    }
}

impl AnalysisConfig {
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.verdict_ttl.is_zero() {
            return Err(AnalysisError::Config(
                "verdict_ttl must be positive".to_string(),
            ));
        }
        if self.verdict_fresh_within > self.verdict_ttl {
            return Err(AnalysisError::Config(
                "verdict_fresh_within cannot exceed verdict_ttl".to_string(),
            ));
        }
        if self.fetch_retries > 10 || self.synthesis_retries > 10 {
            return Err(AnalysisError::Config(
                "retry counts above 10 are not supported".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder mirroring [`AnalysisConfig`] field by field.
#[derive(Debug, Default)]
pub struct AnalysisConfigBuilder {
    config: Option<AnalysisConfig>,
}

impl AnalysisConfigBuilder {
    fn config(&mut self) -> &mut AnalysisConfig {
        self.config.get_or_insert_with(AnalysisConfig::default)
    }

    #[must_use]
    pub fn allow_missing_inputs(mut self, allow: bool) -> Self {
        self.config().allow_missing_inputs = allow;
        self
    }

    #[must_use]
    pub fn technical_refresh_interval(mut self, interval: Duration) -> Self {
        self.config().technical_refresh_interval = interval;
        self
    }

    #[must_use]
    pub fn verdict_ttl(mut self, ttl: Duration) -> Self {
        self.config().verdict_ttl = ttl;
        self
    }

    #[must_use]
    pub fn verdict_fresh_within(mut self, window: Duration) -> Self {
        self.config().verdict_fresh_within = window;
        self
    }

    #[must_use]
    pub fn fetch_retries(mut self, retries: u32) -> Self {
        self.config().fetch_retries = retries;
        self
    }

    #[must_use]
    pub fn synthesis_retries(mut self, retries: u32) -> Self {
        self.config().synthesis_retries = retries;
        self
    }

    #[must_use]
    pub fn batch_pacing(mut self, pacing: Duration) -> Self {
        self.config().batch_pacing = pacing;
        self
    }

    pub fn build(mut self) -> Result<AnalysisConfig, AnalysisError> {
        let config = self.config().clone();
        config.validate()?;
        Ok(config)
    }
}

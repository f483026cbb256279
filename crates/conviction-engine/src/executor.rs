//! Capability executor.
//!
//! Runs every call through the same layer order: dedup slot, durable cache,
//! rate limiter, timed invocation, classification, detached write-through.
//! Retries for retryable codes happen inside the dedup slot, so concurrent
//! identical callers share one retry sequence and one upstream invocation.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use conviction_core::{
    CapabilityId, CapabilityPayload, ErrorCode, OutcomeMeta, SourceClass, ToolArgs, ToolError,
    ToolOutcome,
};

use crate::cache::CacheStore;
use crate::config::EngineConfig;
use crate::dedup::DedupCache;
use crate::limiter::SourceRateLimiter;
use crate::registry::CapabilityRegistry;

/// Result of one executed call, as shared through dedup slots.
pub type CallResult = Result<ToolOutcome, ToolError>;

/// Orchestrates capability calls through the service layers.
pub struct ToolExecutor {
    registry: Arc<CapabilityRegistry>,
    limiter: Arc<SourceRateLimiter>,
    cache: Arc<CacheStore>,
    dedup: DedupCache,
    config: EngineConfig,
}

impl ToolExecutor {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        limiter: Arc<SourceRateLimiter>,
        cache: Arc<CacheStore>,
        config: EngineConfig,
    ) -> Self {
        let dedup = DedupCache::new(config.dedup_ttl);
        Self {
            registry,
            limiter,
            cache,
            dedup,
            config,
        }
    }

    /// Wire the limiter from the config's own rate policies.
    pub fn from_config(
        registry: Arc<CapabilityRegistry>,
        cache: Arc<CacheStore>,
        config: EngineConfig,
    ) -> Self {
        let limiter = Arc::new(SourceRateLimiter::new(config.rate_policies.clone()));
        Self::new(registry, limiter, cache, config)
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn limiter(&self) -> &Arc<SourceRateLimiter> {
        &self.limiter
    }

    /// Reset pass-scoped state. Call once at the start of each analysis pass.
    pub async fn begin_pass(&self) {
        self.dedup.clear().await;
    }

    /// Execute one capability call with no retries.
    pub async fn execute(&self, name: &str, args: &ToolArgs) -> CallResult {
        self.execute_with_retry(name, args, 0).await
    }

    /// Execute one capability call, retrying retryable failures up to
    /// `max_retries` additional times with exponential backoff.
    pub async fn execute_with_retry(
        &self,
        name: &str,
        args: &ToolArgs,
        max_retries: u32,
    ) -> CallResult {
        let Some(id) = CapabilityId::parse(name) else {
            warn!(capability = name, "unknown capability requested");
            return Err(ToolError::unknown_capability(name));
        };

        let key = format!("{}:{}", id.name(), args.digest());
        let slot = self.dedup.slot(&key).await;
        let initiated = AtomicBool::new(false);
        let stored = slot
            .get_or_init(|| {
                initiated.store(true, Ordering::SeqCst);
                self.run_call(id, args, max_retries)
            })
            .await;

        let mut result = stored.clone();
        if !initiated.load(Ordering::SeqCst) {
            debug!(capability = %id, "served from dedup slot");
            if let Ok(outcome) = &mut result {
                outcome.meta.from_cache = true;
            }
        }
        result
    }

    /// Full call sequence, run once per dedup slot.
    async fn run_call(&self, id: CapabilityId, args: &ToolArgs, max_retries: u32) -> CallResult {
        let started = Instant::now();

        let Some(config) = self
            .registry
            .effective_config(id, self.config.capability_overrides.get(&id))
        else {
            warn!(capability = %id, "capability not registered");
            return Err(ToolError::unknown_capability(id.name()));
        };
        if !config.enabled {
            info!(capability = %id, "capability disabled by configuration");
            return Err(ToolError::disabled(id.name()));
        }
        let Some(capability) = self.registry.get(id).map(Arc::clone) else {
            return Err(ToolError::unknown_capability(id.name()));
        };

        let class = capability.source_class();
        let digest = args.digest();

        if let Some(hit) = self.cache.lookup(class, &digest).await {
            debug!(capability = %id, age_hours = hit.age_hours, "durable cache hit");
            return Ok(ToolOutcome {
                payload: hit.payload,
                meta: OutcomeMeta {
                    capability: id.name().to_string(),
                    source_class: class,
                    from_cache: true,
                    cache_age_hours: Some(hit.age_hours),
                    fetched_at: hit.created_at,
                    elapsed_ms: elapsed_ms(started),
                    attempts: 0,
                },
            });
        }

        let mut attempts = 0_u32;
        loop {
            attempts += 1;
            let waited = self.limiter.acquire(class).await;
            let invoked = timeout(self.config.call_timeout, capability.invoke(args, &config)).await;

            let (code, message) = match invoked {
                Ok(Ok(payload)) => {
                    let outcome = ToolOutcome {
                        payload,
                        meta: OutcomeMeta {
                            capability: id.name().to_string(),
                            source_class: class,
                            from_cache: false,
                            cache_age_hours: None,
                            fetched_at: Utc::now(),
                            elapsed_ms: elapsed_ms(started),
                            attempts,
                        },
                    };
                    self.spawn_write_through(
                        class,
                        id,
                        digest,
                        outcome.payload.clone(),
                        outcome.meta.fetched_at,
                    );
                    debug!(
                        capability = %id,
                        attempts,
                        waited_ms = waited.as_millis() as u64,
                        elapsed_ms = outcome.meta.elapsed_ms,
                        "capability call succeeded"
                    );
                    return Ok(outcome);
                }
                Ok(Err(err)) => (err.code(), err.to_string()),
                Err(_) => (
                    ErrorCode::Timeout,
                    format!("no response within {:?}", self.config.call_timeout),
                ),
            };

            if code.is_retryable() && attempts <= max_retries {
                let backoff = self.retry_backoff(attempts - 1);
                info!(
                    capability = %id,
                    %code,
                    attempt = attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    "retrying capability call"
                );
                sleep(backoff).await;
                continue;
            }

            warn!(capability = %id, %code, attempts, message, "capability call failed");
            return Err(ToolError::new(id.name(), code, message).with_attempts(attempts));
        }
    }

    /// Exponential backoff for the nth retry, zero-based.
    fn retry_backoff(&self, retry: u32) -> Duration {
        let multiplier = 2_u32.saturating_pow(retry.min(16));
        self.config.retry_backoff_base.saturating_mul(multiplier)
    }

    /// Persist a fresh payload without delaying the response path.
    fn spawn_write_through(
        &self,
        class: SourceClass,
        id: CapabilityId,
        digest: String,
        payload: CapabilityPayload,
        fetched_at: DateTime<Utc>,
    ) {
        if self.cache.ttl_for(class).is_none() {
            return;
        }
        let cache = Arc::clone(&self.cache);
        tokio::spawn(async move {
            if let Err(e) = cache
                .record(class, id.name(), &digest, &payload, fetched_at)
                .await
            {
                warn!(capability = %id, error = %e, "cache write-through failed");
            }
        });
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::RatePolicy;
    use crate::registry::CapabilityOverride;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use conviction_core::{
        Capability, CapabilityConfig, KeyValueStore, SourceError, VerdictHistory,
    };
    use std::sync::atomic::AtomicUsize;

    enum StubMode {
        Succeed,
        Slow(Duration),
        FailThen { failures: u32 },
        AlwaysThrottled,
        AlwaysNotFound,
    }

    struct StubCapability {
        mode: StubMode,
        invocations: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Capability for StubCapability {
        fn id(&self) -> CapabilityId {
            CapabilityId::NewsDigest
        }

        fn source_class(&self) -> SourceClass {
            SourceClass::News
        }

        fn description(&self) -> &str {
            "test stub"
        }

        fn params_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object" })
        }

        async fn invoke(
            &self,
            args: &ToolArgs,
            _config: &CapabilityConfig,
        ) -> Result<CapabilityPayload, SourceError> {
            let n = self.invocations.fetch_add(1, Ordering::SeqCst) as u32;
            let symbol = args.str_arg("symbol").unwrap_or("TEST").to_string();
            match &self.mode {
                StubMode::Succeed => Ok(CapabilityPayload::History(VerdictHistory::empty(symbol))),
                StubMode::Slow(delay) => {
                    sleep(*delay).await;
                    Ok(CapabilityPayload::History(VerdictHistory::empty(symbol)))
                }
                StubMode::FailThen { failures } => {
                    if n < *failures {
                        Err(SourceError::Throttled)
                    } else {
                        Ok(CapabilityPayload::History(VerdictHistory::empty(symbol)))
                    }
                }
                StubMode::AlwaysThrottled => Err(SourceError::Throttled),
                StubMode::AlwaysNotFound => Err(SourceError::NotFound),
            }
        }
    }

    struct TestRig {
        executor: ToolExecutor,
        invocations: Arc<AtomicUsize>,
    }

    fn rig(mode: StubMode) -> TestRig {
        rig_with(mode, None, None)
    }

    fn rig_with(
        mode: StubMode,
        cache_ttl: Option<Duration>,
        news_override: Option<CapabilityOverride>,
    ) -> TestRig {
        let invocations = Arc::new(AtomicUsize::new(0));
        let capability = Arc::new(StubCapability {
            mode,
            invocations: Arc::clone(&invocations),
        });
        let registry = Arc::new(CapabilityRegistry::builder().register(capability).build());

        let mut config = EngineConfig::default();
        config.rate_policies.clear();
        config.cache_ttls.clear();
        if let Some(ttl) = cache_ttl {
            config.cache_ttls.insert(SourceClass::News, ttl);
        }
        config.retry_backoff_base = Duration::from_millis(100);
        config.call_timeout = Duration::from_secs(5);
        if let Some(o) = news_override {
            config.capability_overrides.insert(CapabilityId::NewsDigest, o);
        }

        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let cache = Arc::new(CacheStore::new(store, config.cache_ttls.clone()));
        let executor = ToolExecutor::from_config(registry, cache, config);
        TestRig {
            executor,
            invocations,
        }
    }

    fn args(symbol: &str) -> ToolArgs {
        ToolArgs::new().with("symbol", symbol)
    }

    #[tokio::test]
    async fn unknown_name_classifies_unknown_without_invoking() {
        let rig = rig(StubMode::Succeed);
        let err = rig
            .executor
            .execute("no_such_capability", &args("AAPL"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Unknown);
        assert!(!err.is_retryable());
        assert_eq!(rig.invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn parsed_but_unregistered_identity_classifies_unknown() {
        // verdict_history parses but nothing registered it in this rig.
        let rig = rig(StubMode::Succeed);
        let err = rig
            .executor
            .execute("verdict_history", &args("AAPL"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Unknown);
    }

    #[tokio::test]
    async fn disabled_capability_fails_blocked_without_invoking() {
        let rig = rig_with(StubMode::Succeed, None, Some(CapabilityOverride::disable()));
        let err = rig
            .executor
            .execute("news_digest", &args("AAPL"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Blocked);
        assert!(!err.is_retryable());
        assert_eq!(rig.invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn success_carries_live_provenance() {
        let rig = rig(StubMode::Succeed);
        let outcome = rig
            .executor
            .execute("news_digest", &args("AAPL"))
            .await
            .expect("success");
        assert!(!outcome.meta.from_cache);
        assert_eq!(outcome.meta.cache_age_hours, None);
        assert_eq!(outcome.meta.attempts, 1);
        assert_eq!(outcome.meta.capability, "news_digest");
        assert_eq!(outcome.meta.source_class, SourceClass::News);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_identical_calls_share_one_invocation() {
        let rig = rig(StubMode::Slow(Duration::from_millis(100)));
        let args_a = args("AAPL");
        let args_b = args("AAPL");
        let args_c = args("AAPL");
        let a = rig.executor.execute("news_digest", &args_a);
        let b = rig.executor.execute("news_digest", &args_b);
        let c = rig.executor.execute("news_digest", &args_c);
        let (a, b, c) = tokio::join!(a, b, c);

        assert_eq!(rig.invocations.load(Ordering::SeqCst), 1);
        let a = a.expect("a");
        let b = b.expect("b");
        let c = c.expect("c");
        assert!(!a.meta.from_cache);
        assert!(b.meta.from_cache);
        assert!(c.meta.from_cache);
        assert_eq!(a.payload, b.payload);
        assert_eq!(a.payload, c.payload);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_distinct_args_do_not_dedup() {
        let rig = rig(StubMode::Slow(Duration::from_millis(50)));
        let args_a = args("AAPL");
        let args_b = args("MSFT");
        let a = rig.executor.execute("news_digest", &args_a);
        let b = rig.executor.execute("news_digest", &args_b);
        let (a, b) = tokio::join!(a, b);
        a.expect("a");
        b.expect("b");
        assert_eq!(rig.invocations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn begin_pass_reopens_dedup_slots() {
        let rig = rig(StubMode::Succeed);
        rig.executor
            .execute("news_digest", &args("AAPL"))
            .await
            .expect("first");
        let joined = rig
            .executor
            .execute("news_digest", &args("AAPL"))
            .await
            .expect("second");
        // Same pass: served from the completed slot.
        assert!(joined.meta.from_cache);
        assert_eq!(rig.invocations.load(Ordering::SeqCst), 1);

        rig.executor.begin_pass().await;
        let fresh = rig
            .executor
            .execute("news_digest", &args("AAPL"))
            .await
            .expect("third");
        assert!(!fresh.meta.from_cache);
        assert_eq!(rig.invocations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_shared_through_the_slot() {
        let rig = rig(StubMode::AlwaysNotFound);
        let args_a = args("AAPL");
        let args_b = args("AAPL");
        let a = rig.executor.execute("news_digest", &args_a);
        let b = rig.executor.execute("news_digest", &args_b);
        let (a, b) = tokio::join!(a, b);
        assert_eq!(a.unwrap_err().code, ErrorCode::NotFound);
        assert_eq!(b.unwrap_err().code, ErrorCode::NotFound);
        assert_eq!(rig.invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn durable_cache_serves_second_pass_without_invoking() {
        let rig = rig_with(StubMode::Succeed, Some(Duration::from_secs(3600)), None);
        let live = rig
            .executor
            .execute("news_digest", &args("AAPL"))
            .await
            .expect("live");
        assert!(!live.meta.from_cache);

        // Let the detached write-through land, then start a new pass.
        tokio::time::sleep(Duration::from_millis(20)).await;
        rig.executor.begin_pass().await;

        let hit = rig
            .executor
            .execute("news_digest", &args("AAPL"))
            .await
            .expect("cached");
        assert!(hit.meta.from_cache);
        assert!(hit.meta.cache_age_hours.is_some());
        assert_eq!(hit.meta.fetched_at, live.meta.fetched_at);
        assert_eq!(hit.meta.attempts, 0);
        assert_eq!(rig.invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_is_refetched_and_overwritten() {
        let rig = rig_with(StubMode::Succeed, Some(Duration::ZERO), None);
        rig.executor
            .execute("news_digest", &args("AAPL"))
            .await
            .expect("first");
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Entry exists physically but is logically expired.
        let digest = args("AAPL").digest();
        assert!(
            rig.executor
                .cache()
                .contains_raw(SourceClass::News, &digest)
                .await
                .unwrap()
        );

        rig.executor.begin_pass().await;
        let second = rig
            .executor
            .execute("news_digest", &args("AAPL"))
            .await
            .expect("second");
        assert!(!second.meta.from_cache);
        assert_eq!(rig.invocations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_failures_consume_retries_then_succeed() {
        let rig = rig(StubMode::FailThen { failures: 2 });
        let outcome = rig
            .executor
            .execute_with_retry("news_digest", &args("AAPL"), 2)
            .await
            .expect("eventual success");
        assert_eq!(outcome.meta.attempts, 3);
        assert_eq!(rig.invocations.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_exhausted_reports_total_attempts() {
        let rig = rig(StubMode::AlwaysThrottled);
        let started = Instant::now();
        let err = rig
            .executor
            .execute_with_retry("news_digest", &args("AAPL"), 2)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::RateLimited);
        assert_eq!(err.attempts, 3);
        assert_eq!(rig.invocations.load(Ordering::SeqCst), 3);
        // Backoffs of 100ms then 200ms must have elapsed.
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn non_retryable_failure_never_retries() {
        let rig = rig(StubMode::AlwaysNotFound);
        let err = rig
            .executor
            .execute_with_retry("news_digest", &args("AAPL"), 5)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(err.attempts, 1);
        assert_eq!(rig.invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_overrun_classifies_as_timeout() {
        let rig = rig(StubMode::Slow(Duration::from_secs(30)));
        let err = rig
            .executor
            .execute("news_digest", &args("AAPL"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Timeout);
        assert!(err.is_retryable());
        assert_eq!(err.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_class_waits_before_invoking() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let capability = Arc::new(StubCapability {
            mode: StubMode::Succeed,
            invocations: Arc::clone(&invocations),
        });
        let registry = Arc::new(CapabilityRegistry::builder().register(capability).build());
        let mut config = EngineConfig::default();
        config.cache_ttls.clear();
        config.rate_policies.clear();
        config.rate_policies.insert(
            SourceClass::News,
            RatePolicy::new(100, Duration::from_secs(60), Duration::from_secs(2)),
        );
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let cache = Arc::new(CacheStore::new(store, config.cache_ttls.clone()));
        let executor = ToolExecutor::from_config(registry, cache, config);

        let started = Instant::now();
        executor
            .execute("news_digest", &args("AAPL"))
            .await
            .expect("first");
        executor
            .execute("news_digest", &args("MSFT"))
            .await
            .expect("second");
        // Second call for the same class spaced by min_delay.
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(invocations.load(Ordering::SeqCst), 2);
    }
}

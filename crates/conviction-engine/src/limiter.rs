//! Sliding-window rate limiter keyed by source class.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::debug;

use conviction_core::SourceClass;

/// Admission policy for one source class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatePolicy {
    /// Maximum grants inside any rolling window.
    pub max_requests: u32,
    /// Length of the rolling window.
    pub window: Duration,
    /// Minimum spacing between consecutive grants.
    pub min_delay: Duration,
}

impl RatePolicy {
    pub fn new(max_requests: u32, window: Duration, min_delay: Duration) -> Self {
        Self {
            max_requests,
            window,
            min_delay,
        }
    }
}

#[derive(Debug, Default)]
struct ClassState {
    /// Grant times still inside the rolling window, oldest first.
    grants: VecDeque<Instant>,
    last_grant: Option<Instant>,
}

impl ClassState {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.grants.front() {
            if now.duration_since(*oldest) >= window {
                self.grants.pop_front();
            } else {
                break;
            }
        }
    }

    /// Wait required before the next grant is admissible, zero if admissible
    /// now. Assumes `prune` has already run for `now`.
    fn required_wait(&self, now: Instant, policy: &RatePolicy) -> Duration {
        let spacing = match self.last_grant {
            Some(last) => policy.min_delay.saturating_sub(now.duration_since(last)),
            None => Duration::ZERO,
        };
        let window = if self.grants.len() >= policy.max_requests as usize {
            match self.grants.front() {
                Some(oldest) => (*oldest + policy.window).duration_since(now),
                None => Duration::ZERO,
            }
        } else {
            Duration::ZERO
        };
        spacing.max(window)
    }

    fn record(&mut self, now: Instant) {
        self.grants.push_back(now);
        self.last_grant = Some(now);
    }
}

/// Shared limiter holding one admission state per source class.
///
/// Each grant must satisfy two constraints at once: at most `max_requests`
/// grants inside any rolling `window`, and at least `min_delay` since the
/// previous grant for the same class. Classes without a policy are admitted
/// immediately.
pub struct SourceRateLimiter {
    policies: HashMap<SourceClass, RatePolicy>,
    states: Mutex<HashMap<SourceClass, ClassState>>,
    /// Classes already reported as running without a policy.
    unlimited_noted: Mutex<HashSet<SourceClass>>,
}

impl SourceRateLimiter {
    pub fn new(policies: HashMap<SourceClass, RatePolicy>) -> Self {
        Self {
            policies,
            states: Mutex::new(HashMap::new()),
            unlimited_noted: Mutex::new(HashSet::new()),
        }
    }

    pub fn policy(&self, class: SourceClass) -> Option<&RatePolicy> {
        self.policies.get(&class)
    }

    /// Block until a grant is admissible, record it, and report how long the
    /// caller waited in total.
    pub async fn acquire(&self, class: SourceClass) -> Duration {
        let Some(policy) = self.policies.get(&class) else {
            if self.unlimited_noted.lock().await.insert(class) {
                debug!(%class, "no rate policy configured, admitting without limit");
            }
            return Duration::ZERO;
        };
        let mut waited = Duration::ZERO;
        loop {
            let wait = {
                let mut states = self.states.lock().await;
                let state = states.entry(class).or_default();
                let now = Instant::now();
                state.prune(now, policy.window);
                let wait = state.required_wait(now, policy);
                if wait.is_zero() {
                    state.record(now);
                    if !waited.is_zero() {
                        debug!(
                            %class,
                            waited_ms = waited.as_millis() as u64,
                            "rate limiter released call"
                        );
                    }
                    return waited;
                }
                wait
            };
            // Sleep outside the lock, then re-check. Another waiter may have
            // taken the slot in the meantime.
            sleep(wait).await;
            waited += wait;
        }
    }

    /// Whether an immediate `acquire` would return without sleeping.
    pub async fn can_proceed(&self, class: SourceClass) -> bool {
        self.time_until_next_slot(class).await.is_zero()
    }

    /// Wait an immediate `acquire` would incur. Zero when admissible now.
    /// Does not consume a slot.
    pub async fn time_until_next_slot(&self, class: SourceClass) -> Duration {
        let Some(policy) = self.policies.get(&class) else {
            return Duration::ZERO;
        };
        let mut states = self.states.lock().await;
        let state = states.entry(class).or_default();
        let now = Instant::now();
        state.prune(now, policy.window);
        state.required_wait(now, policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter_with(policy: RatePolicy) -> SourceRateLimiter {
        let mut policies = HashMap::new();
        policies.insert(SourceClass::Community, policy);
        SourceRateLimiter::new(policies)
    }

    #[tokio::test(start_paused = true)]
    async fn first_acquire_is_immediate() {
        let limiter = limiter_with(RatePolicy::new(
            5,
            Duration::from_secs(60),
            Duration::from_secs(2),
        ));
        let waited = limiter.acquire(SourceClass::Community).await;
        assert_eq!(waited, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn min_delay_spaces_consecutive_grants() {
        let limiter = limiter_with(RatePolicy::new(
            100,
            Duration::from_secs(60),
            Duration::from_secs(2),
        ));
        limiter.acquire(SourceClass::Community).await;
        let waited = limiter.acquire(SourceClass::Community).await;
        assert_eq!(waited, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn window_exhaustion_defers_to_oldest_expiry() {
        // No spacing floor, so three grants land immediately and the fourth
        // must wait for the first to leave the 60s window.
        let limiter = limiter_with(RatePolicy::new(3, Duration::from_secs(60), Duration::ZERO));
        for _ in 0..3 {
            assert_eq!(
                limiter.acquire(SourceClass::Community).await,
                Duration::ZERO
            );
        }
        let waited = limiter.acquire(SourceClass::Community).await;
        assert_eq!(waited, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_beyond_window_waits_at_least_the_remainder() {
        // Spacing paces twelve grants five seconds apart. The thirteenth
        // finds the window full and waits out the remainder.
        let limiter = limiter_with(RatePolicy::new(
            12,
            Duration::from_secs(60),
            Duration::from_secs(5),
        ));
        for _ in 0..12 {
            limiter.acquire(SourceClass::Community).await;
        }
        let before = Instant::now();
        let waited = limiter.acquire(SourceClass::Community).await;
        assert!(waited >= Duration::from_secs(5), "waited {waited:?}");
        assert_eq!(before.elapsed(), waited);
    }

    #[tokio::test(start_paused = true)]
    async fn classes_do_not_share_budgets() {
        let mut policies = HashMap::new();
        policies.insert(
            SourceClass::Community,
            RatePolicy::new(1, Duration::from_secs(60), Duration::ZERO),
        );
        policies.insert(
            SourceClass::News,
            RatePolicy::new(1, Duration::from_secs(60), Duration::ZERO),
        );
        let limiter = SourceRateLimiter::new(policies);
        assert_eq!(
            limiter.acquire(SourceClass::Community).await,
            Duration::ZERO
        );
        assert!(!limiter.can_proceed(SourceClass::Community).await);
        assert_eq!(limiter.acquire(SourceClass::News).await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn unconfigured_class_is_admitted_without_limit() {
        let limiter = SourceRateLimiter::new(HashMap::new());
        for _ in 0..50 {
            assert_eq!(limiter.acquire(SourceClass::Local).await, Duration::ZERO);
        }
        assert!(limiter.can_proceed(SourceClass::Local).await);
        assert_eq!(
            limiter.time_until_next_slot(SourceClass::Local).await,
            Duration::ZERO
        );
    }

    #[tokio::test]
    async fn missing_policy_is_noted_once_per_class() {
        let limiter = SourceRateLimiter::new(HashMap::new());
        limiter.acquire(SourceClass::Local).await;
        limiter.acquire(SourceClass::Local).await;
        assert_eq!(limiter.unlimited_noted.lock().await.len(), 1);
        limiter.acquire(SourceClass::News).await;
        assert_eq!(limiter.unlimited_noted.lock().await.len(), 2);
        limiter.acquire(SourceClass::News).await;
        assert_eq!(limiter.unlimited_noted.lock().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn probes_do_not_consume_slots() {
        let limiter = limiter_with(RatePolicy::new(2, Duration::from_secs(60), Duration::ZERO));
        for _ in 0..10 {
            assert!(limiter.can_proceed(SourceClass::Community).await);
        }
        assert_eq!(
            limiter.acquire(SourceClass::Community).await,
            Duration::ZERO
        );
        assert_eq!(
            limiter.acquire(SourceClass::Community).await,
            Duration::ZERO
        );
        assert!(!limiter.can_proceed(SourceClass::Community).await);
        assert!(limiter.time_until_next_slot(SourceClass::Community).await > Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn slots_reopen_after_the_window_passes() {
        let limiter = limiter_with(RatePolicy::new(2, Duration::from_secs(10), Duration::ZERO));
        limiter.acquire(SourceClass::Community).await;
        limiter.acquire(SourceClass::Community).await;
        assert!(!limiter.can_proceed(SourceClass::Community).await);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(limiter.can_proceed(SourceClass::Community).await);
        assert_eq!(
            limiter.acquire(SourceClass::Community).await,
            Duration::ZERO
        );
    }
}

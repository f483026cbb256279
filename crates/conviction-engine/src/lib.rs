//! Execution engine for capability calls.
//!
//! Provides the service layers every call passes through: the per-class
//! sliding-window rate limiter, the durable TTL cache, the pass-scoped
//! dedup cache, the closed capability registry and the executor that
//! sequences them. Store implementations back the durable layers.

pub mod cache;
pub mod config;
pub mod dedup;
pub mod executor;
pub mod limiter;
pub mod registry;
pub mod store;

pub use cache::{CacheEntry, CacheHit, CacheStore};
pub use config::{
    ConfigError, EngineConfig, EngineConfigBuilder, default_cache_ttls, default_rate_policies,
};
pub use dedup::{DedupCache, DedupSlot, SharedCall};
pub use executor::{CallResult, ToolExecutor};
pub use limiter::{RatePolicy, SourceRateLimiter};
pub use registry::{
    CapabilityDeclaration, CapabilityOverride, CapabilityRegistry, CapabilityRegistryBuilder,
};
pub use store::{JsonFileStore, MemoryStore};

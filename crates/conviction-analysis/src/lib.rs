//! Per-entity research analysis on top of the execution engine.
//!
//! This crate owns everything between raw sources and a persisted verdict:
//! provider clients, the capability implementations registered with the
//! engine, deterministic synthesis, verdict storage with rolling history,
//! the per-entity analyzer, and the sequential batch runner.

pub mod analyzer;
pub mod batch;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod providers;
pub mod synthesis;
pub mod verdict;

#[cfg(test)]
pub(crate) mod testing;

pub use analyzer::{AnalysisOutcome, AnalyzeOptions, EntityAnalyzer};
pub use batch::{
    BatchError, BatchEventHandler, BatchHandle, BatchOptions, BatchRunner, EntityOutcome,
    JobProgress, JobStatus, NoOpBatchHandler,
};
pub use capabilities::{ProviderSet, standard_registry};
pub use config::{AnalysisConfig, AnalysisConfigBuilder};
pub use error::{AnalysisError, Result};
pub use synthesis::{SynthesisContext, Synthesizer, WeightedSynthesizer};
pub use verdict::{Verdict, VerdictStore};

//! Analysis-layer errors.

use thiserror::Error;

use conviction_core::StoreError;

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors surfaced by the analyzer and batch runner.
///
/// Individual input failures are not errors at this level; the analyzer
/// degrades to a partial context or skips the entity instead. Only synthesis
/// and persistence failures abort an analysis pass.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("symbol must be a non-empty ticker")]
    InvalidSymbol,

    #[error("synthesis failed for {symbol}: {message}")]
    Synthesis { symbol: String, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid analysis configuration: {0}")]
    Config(String),
}

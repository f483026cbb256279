//! Core types shared across the conviction workspace.
//!
//! This crate defines the vocabulary the engine and analysis layers speak:
//! capability identities and the [`Capability`] contract, argument maps with
//! a canonical digest, the closed error taxonomy, typed payloads, the call
//! outcome envelope and the persistence trait. It holds no policy and no IO
//! beyond hashing.

pub mod args;
pub mod capability;
pub mod envelope;
pub mod error;
pub mod payload;
pub mod source;
pub mod store;

pub use args::{ArgValue, ToolArgs};
pub use capability::{Capability, CapabilityConfig, CapabilityId};
pub use envelope::{OutcomeMeta, ResponseError, ToolOutcome, ToolResponse};
pub use error::{ErrorCode, SourceError, StoreError, ToolError};
pub use payload::{
    CapabilityPayload, FilingSummary, FilingsDigest, FundamentalsReport, Headline, NewsDigest,
    PricePoint, PriorVerdict, SentimentDigest, SynthesisOutput, TechnicalSnapshot, TimingSignal,
    TrendDirection, VerdictHistory,
};
pub use source::SourceClass;
pub use store::KeyValueStore;

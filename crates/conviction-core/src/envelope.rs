//! Call outcome envelope with provenance metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, ToolError};
use crate::payload::CapabilityPayload;
use crate::source::SourceClass;

/// Provenance attached to every successful capability call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeMeta {
    /// Wire name of the capability that produced the payload.
    pub capability: String,
    pub source_class: SourceClass,
    /// True when the payload was served from a cache layer rather than a
    /// fresh upstream call.
    pub from_cache: bool,
    /// Hours since the payload was originally fetched. `None` for live calls.
    pub cache_age_hours: Option<f64>,
    /// When the payload was originally fetched from its upstream. For cache
    /// hits this is the original fetch time, not the hit time.
    pub fetched_at: DateTime<Utc>,
    /// Wall time spent inside this call, limiter waits included.
    pub elapsed_ms: u64,
    /// Upstream attempts consumed, including the first. Zero when the
    /// payload came from the durable cache.
    pub attempts: u32,
}

/// Successful capability call: typed payload plus provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub payload: CapabilityPayload,
    pub meta: OutcomeMeta,
}

/// Error half of the wire envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: ErrorCode,
    pub message: String,
    pub attempts: u32,
}

/// Uniform wire envelope for a finished call, success or failure.
///
/// Exactly one of `payload` and `error` is present, and `ok` tells which.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<CapabilityPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<OutcomeMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl ToolResponse {
    pub fn success(outcome: ToolOutcome) -> Self {
        Self {
            ok: true,
            payload: Some(outcome.payload),
            meta: Some(outcome.meta),
            error: None,
        }
    }

    pub fn failure(error: &ToolError) -> Self {
        Self {
            ok: false,
            payload: None,
            meta: None,
            error: Some(ResponseError {
                code: error.code,
                message: error.message.clone(),
                attempts: error.attempts,
            }),
        }
    }

    pub fn from_call(result: &Result<ToolOutcome, ToolError>) -> Self {
        match result {
            Ok(outcome) => Self::success(outcome.clone()),
            Err(error) => Self::failure(error),
        }
    }
}

//! Sequential batch analysis with pollable progress and cooperative stop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use conviction_core::TimingSignal;

use crate::analyzer::{AnalysisOutcome, AnalyzeOptions, EntityAnalyzer};

/// Lifecycle of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Result of one entity within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum EntityOutcome {
    Scored {
        symbol: String,
        score: u8,
        timing_signal: TimingSignal,
        alert: bool,
    },
    Skipped {
        symbol: String,
        missing: Vec<String>,
    },
    SkippedFresh {
        symbol: String,
        age_hours: f64,
    },
    Failed {
        symbol: String,
        message: String,
    },
}

impl EntityOutcome {
    pub fn symbol(&self) -> &str {
        match self {
            Self::Scored { symbol, .. }
            | Self::Skipped { symbol, .. }
            | Self::SkippedFresh { symbol, .. }
            | Self::Failed { symbol, .. } => symbol,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchError {
    pub symbol: String,
    pub message: String,
}

/// Pollable snapshot of a batch job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub total: usize,
    pub completed: usize,
    /// Percent complete, 0 to 100.
    pub progress: u8,
    /// Entity currently in flight.
    pub current: Option<String>,
    pub outcomes: Vec<EntityOutcome>,
    pub errors: Vec<BatchError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobProgress {
    fn idle() -> Self {
        Self {
            job_id: Uuid::nil(),
            status: JobStatus::Pending,
            total: 0,
            completed: 0,
            progress: 0,
            current: None,
            outcomes: Vec::new(),
            errors: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    fn start(total: usize) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            status: JobStatus::Running,
            total,
            completed: 0,
            progress: if total == 0 { 100 } else { 0 },
            current: None,
            outcomes: Vec::new(),
            errors: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

fn percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        100
    } else {
        ((completed * 100) / total) as u8
    }
}

/// Cloneable handle for observing and stopping a running batch.
#[derive(Clone)]
pub struct BatchHandle {
    progress: Arc<RwLock<JobProgress>>,
    stop: Arc<AtomicBool>,
}

impl BatchHandle {
    pub async fn snapshot(&self) -> JobProgress {
        self.progress.read().await.clone()
    }

    /// Request a stop once the entity in flight finishes.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Observer hooks for batch progress. Every method defaults to a no-op.
#[async_trait]
pub trait BatchEventHandler: Send + Sync {
    async fn on_entity_start(&self, _symbol: &str, _index: usize, _total: usize) {}
    async fn on_entity_done(&self, _outcome: &EntityOutcome) {}
    async fn on_complete(&self, _progress: &JobProgress) {}
}

/// Handler that ignores every event.
pub struct NoOpBatchHandler;

#[async_trait]
impl BatchEventHandler for NoOpBatchHandler {}

/// Per-run options.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Pause between entities. Defaults to the configured batch pacing.
    pub pacing: Option<Duration>,
    /// Skip entities whose persisted verdict is still recent.
    pub skip_fresh: bool,
    /// Forwarded to each per-entity analysis.
    pub analyze: AnalyzeOptions,
}

/// Runs entities strictly one at a time with pacing between them.
///
/// Sequential on purpose: each entity already fans out its inputs in
/// parallel, and batch-level parallelism would stack bursts onto the same
/// per-source budgets.
pub struct BatchRunner {
    analyzer: Arc<EntityAnalyzer>,
    handler: Arc<dyn BatchEventHandler>,
    progress: Arc<RwLock<JobProgress>>,
    stop: Arc<AtomicBool>,
}

impl BatchRunner {
    pub fn new(analyzer: Arc<EntityAnalyzer>) -> Self {
        Self {
            analyzer,
            handler: Arc::new(NoOpBatchHandler),
            progress: Arc::new(RwLock::new(JobProgress::idle())),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn with_event_handler(mut self, handler: Arc<dyn BatchEventHandler>) -> Self {
        self.handler = handler;
        self
    }

    pub fn handle(&self) -> BatchHandle {
        BatchHandle {
            progress: Arc::clone(&self.progress),
            stop: Arc::clone(&self.stop),
        }
    }

    /// Run the batch to completion or stop request, returning the final
    /// progress snapshot.
    pub async fn run(&self, symbols: &[String], options: &BatchOptions) -> JobProgress {
        self.stop.store(false, Ordering::SeqCst);
        let total = symbols.len();
        let job_id = {
            let mut progress = self.progress.write().await;
            *progress = JobProgress::start(total);
            progress.job_id
        };
        info!(%job_id, total, "batch started");

        let pacing = options.pacing.unwrap_or(self.analyzer.config().batch_pacing);

        for (index, symbol) in symbols.iter().enumerate() {
            if self.stop.load(Ordering::SeqCst) {
                info!(%job_id, completed = index, total, "batch stopped on request");
                break;
            }

            {
                let mut progress = self.progress.write().await;
                progress.current = Some(symbol.clone());
            }
            self.handler.on_entity_start(symbol, index, total).await;

            let outcome = self.run_entity(symbol, options).await;
            {
                let mut progress = self.progress.write().await;
                if let EntityOutcome::Failed { symbol, message } = &outcome {
                    progress.errors.push(BatchError {
                        symbol: symbol.clone(),
                        message: message.clone(),
                    });
                }
                progress.outcomes.push(outcome.clone());
                progress.completed += 1;
                progress.current = None;
                progress.progress = percent(progress.completed, progress.total);
            }
            self.handler.on_entity_done(&outcome).await;

            let is_last = index + 1 == total;
            if !is_last && !pacing.is_zero() && !self.stop.load(Ordering::SeqCst) {
                debug!(%job_id, pacing_ms = pacing.as_millis() as u64, "pacing before next entity");
                tokio::time::sleep(pacing).await;
            }
        }

        let final_snapshot = {
            let mut progress = self.progress.write().await;
            progress.status = if progress.total > 0 && progress.errors.len() == progress.total {
                JobStatus::Failed
            } else {
                JobStatus::Completed
            };
            progress.finished_at = Some(Utc::now());
            progress.clone()
        };
        info!(
            %job_id,
            status = ?final_snapshot.status,
            completed = final_snapshot.completed,
            errors = final_snapshot.errors.len(),
            "batch finished"
        );
        self.handler.on_complete(&final_snapshot).await;
        final_snapshot
    }

    async fn run_entity(&self, symbol: &str, options: &BatchOptions) -> EntityOutcome {
        let normalized = symbol.trim().to_uppercase();

        if options.skip_fresh {
            match self.analyzer.verdicts().latest(&normalized).await {
                Ok(Some(verdict)) => {
                    let now = Utc::now();
                    let age = now - verdict.computed_at;
                    let threshold =
                        TimeDelta::from_std(self.analyzer.config().verdict_fresh_within)
                            .unwrap_or(TimeDelta::MAX);
                    if age >= TimeDelta::zero() && age < threshold {
                        debug!(symbol = %normalized, "verdict still fresh, skipping");
                        return EntityOutcome::SkippedFresh {
                            symbol: normalized,
                            age_hours: verdict.age_hours_at(now),
                        };
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(symbol = %normalized, error = %e, "fresh check failed, analyzing anyway");
                }
            }
        }

        match self
            .analyzer
            .analyze_with_options(symbol, &options.analyze)
            .await
        {
            Ok(AnalysisOutcome::Scored(verdict)) => EntityOutcome::Scored {
                symbol: verdict.symbol,
                score: verdict.score,
                timing_signal: verdict.timing_signal,
                alert: verdict.alert,
            },
            Ok(AnalysisOutcome::Skipped { missing }) => EntityOutcome::Skipped {
                symbol: normalized,
                missing: missing.iter().map(|id| id.name().to_string()).collect(),
            },
            Err(e) => {
                warn!(symbol = %normalized, error = %e, "entity analysis failed");
                EntityOutcome::Failed {
                    symbol: normalized,
                    message: e.to_string(),
                }
            }
        }
    }
}

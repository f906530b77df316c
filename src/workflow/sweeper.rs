//! Stuck-Workflow Sweeps
//!
//! Periodic sweeps over aggregates that have not advanced within their
//! state-specific time budget. The fail sweep abandons aggregates stuck in
//! non-retryable states; the retry sweep re-invokes the normal transition
//! path (empty input) for retryable states and optionally drains the outbox
//! synchronously so retried side effects apply immediately. A failure on
//! one aggregate never aborts the sweep for others.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::engine::WorkflowEngine;
use super::error::EngineError;
use super::outbox::OutboxProcessor;
use super::types::{HurdleResponses, StateId, WorkflowAggregate, now_ms};

/// Fixed failure reason applied by the fail sweep
pub const ABANDONED_REASON: &str = "abandoned: exceeded state time budget";

/// Configuration for one transaction type's sweeps
#[derive(Debug, Clone)]
pub struct SweeperConfig<S> {
    /// How often to scan
    pub scan_interval: Duration,
    /// How long an aggregate must sit in a stuck state before it is acted on
    pub stuck_after: Duration,
    /// Non-retryable stuck states - candidates for forced failure
    pub fail_states: Vec<S>,
    /// Retryable stuck states - candidates for re-triggering
    pub retry_states: Vec<S>,
    /// Report fail candidates without mutating
    pub log_only: bool,
    /// Maximum aggregates acted on per scan, per sweep
    pub batch_size: usize,
}

impl<S> SweeperConfig<S> {
    pub fn new(stuck_after: Duration, fail_states: Vec<S>, retry_states: Vec<S>) -> Self {
        Self {
            scan_interval: Duration::from_secs(60),
            stuck_after,
            fail_states,
            retry_states,
            log_only: false,
            batch_size: 100,
        }
    }

    pub fn log_only(mut self) -> Self {
        self.log_only = true;
        self
    }
}

/// Outcome counters for one sweep cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub candidates: usize,
    pub acted: usize,
    pub errors: usize,
}

pub struct StuckSweeper<A: WorkflowAggregate> {
    engine: Arc<WorkflowEngine<A>>,
    /// When present, the retry sweep drains this processor synchronously
    /// after re-triggering, so retried side effects apply immediately.
    outbox: Option<Arc<OutboxProcessor<A>>>,
    config: SweeperConfig<A::State>,
}

impl<A: WorkflowAggregate> StuckSweeper<A> {
    pub fn new(
        engine: Arc<WorkflowEngine<A>>,
        outbox: Option<Arc<OutboxProcessor<A>>>,
        config: SweeperConfig<A::State>,
    ) -> Self {
        Self { engine, outbox, config }
    }

    /// Run both sweeps on the configured schedule forever.
    pub async fn run(&self) -> ! {
        info!(
            scan_interval_secs = self.config.scan_interval.as_secs(),
            stuck_after_secs = self.config.stuck_after.as_secs(),
            log_only = self.config.log_only,
            "Starting stuck-workflow sweeper"
        );

        loop {
            if let Err(e) = self.fail_sweep().await {
                error!(error = %e, "Fail sweep failed");
            }
            if let Err(e) = self.retry_sweep().await {
                error!(error = %e, "Retry sweep failed");
            }

            tokio::time::sleep(self.config.scan_interval).await;
        }
    }

    /// Abandon aggregates stuck in non-retryable states past the threshold.
    pub async fn fail_sweep(&self) -> Result<SweepReport, EngineError> {
        if self.config.fail_states.is_empty() {
            return Ok(SweepReport::default());
        }

        let cutoff = now_ms() - self.config.stuck_after.as_millis() as i64;
        let stuck = self
            .engine
            .store()
            .find_stuck(&self.config.fail_states, cutoff, self.config.batch_size)
            .await?;

        let mut report = SweepReport { candidates: stuck.len(), ..Default::default() };

        for aggregate in stuck {
            let token = aggregate.token();

            if self.config.log_only {
                warn!(
                    token = %token,
                    state = %aggregate.state(),
                    updated_at = aggregate.updated_at(),
                    "Stuck aggregate (log-only, not mutating)"
                );
                continue;
            }

            match self.engine.force_fail(&token, ABANDONED_REASON).await {
                Ok(_) => {
                    info!(token = %token, "Stuck aggregate abandoned");
                    report.acted += 1;
                }
                Err(e) => {
                    error!(token = %token, error = %e, "Failed to abandon stuck aggregate");
                    report.errors += 1;
                }
            }
        }

        Ok(report)
    }

    /// Re-trigger aggregates stuck in retryable states past the threshold.
    pub async fn retry_sweep(&self) -> Result<SweepReport, EngineError> {
        if self.config.retry_states.is_empty() {
            return Ok(SweepReport::default());
        }

        let cutoff = now_ms() - self.config.stuck_after.as_millis() as i64;
        let stuck = self
            .engine
            .store()
            .find_stuck(&self.config.retry_states, cutoff, self.config.batch_size)
            .await?;

        let mut report = SweepReport { candidates: stuck.len(), ..Default::default() };
        let empty = HurdleResponses::new();

        for aggregate in stuck {
            let token = aggregate.token();
            debug!(token = %token, state = %aggregate.state(), "Re-triggering stuck aggregate");

            match self.engine.execute_uncached(&token, &empty).await {
                Ok(outcome) => {
                    if outcome.state_id != aggregate.state().id() {
                        info!(
                            token = %token,
                            from = %aggregate.state(),
                            to = %outcome.state,
                            "Stuck aggregate advanced"
                        );
                    }
                    report.acted += 1;
                }
                Err(e) => {
                    error!(token = %token, error = %e, "Failed to re-trigger stuck aggregate");
                    report.errors += 1;
                }
            }
        }

        // Immediate side effects matter when re-triggering: retried chains
        // should not wait for the next scheduled outbox pass.
        if let Some(outbox) = &self.outbox {
            if report.candidates > 0 {
                if let Err(e) = outbox.drain().await {
                    error!(error = %e, "Synchronous outbox drain after retry sweep failed");
                }
            }
        }

        Ok(report)
    }
}

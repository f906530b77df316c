//! Outbox Processor
//!
//! Drains unprocessed transition events in sequence order and dispatches
//! the side effect associated with each `(prior, new)` transition. An event
//! is marked processed only after its side effect succeeds; a failure
//! leaves the event unprocessed and halts that aggregate's chain for the
//! rest of the pass, so effects apply at-least-once and strictly in order.
//! Failures never propagate to the batch caller.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::error::EngineError;
use super::store::{TransitionEvent, WorkflowStore};
use super::types::{StateId, WorkflowAggregate};

/// Per-transaction-type side-effect dispatch.
///
/// Implementations must be idempotent per aggregate token: the outbox
/// delivers at-least-once, so a retried dispatch after a partial failure
/// must converge to the same result.
#[async_trait]
pub trait EffectDispatcher<A: WorkflowAggregate>: Send + Sync {
    async fn dispatch(
        &self,
        prior: Option<A::State>,
        new: A::State,
        snapshot: &A,
    ) -> Result<(), EngineError>;
}

/// Configuration for the outbox processor
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// How often the scheduled loop polls for work
    pub poll_interval: Duration,
    /// Maximum events fetched per batch
    pub batch_size: usize,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self { poll_interval: Duration::from_secs(5), batch_size: 100 }
    }
}

/// Counters for one batch pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub fetched: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct OutboxProcessor<A: WorkflowAggregate> {
    store: Arc<dyn WorkflowStore<A>>,
    dispatcher: Arc<dyn EffectDispatcher<A>>,
    config: OutboxConfig,
}

impl<A: WorkflowAggregate> OutboxProcessor<A> {
    pub fn new(
        store: Arc<dyn WorkflowStore<A>>,
        dispatcher: Arc<dyn EffectDispatcher<A>>,
        config: OutboxConfig,
    ) -> Self {
        Self { store, dispatcher, config }
    }

    pub fn with_defaults(
        store: Arc<dyn WorkflowStore<A>>,
        dispatcher: Arc<dyn EffectDispatcher<A>>,
    ) -> Self {
        Self::new(store, dispatcher, OutboxConfig::default())
    }

    /// Run the scheduled processing loop forever.
    pub async fn run(&self) -> ! {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            batch_size = self.config.batch_size,
            "Starting outbox processor"
        );

        loop {
            if let Err(e) = self.drain().await {
                error!(error = %e, "Outbox drain failed");
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Process batches until a fetch returns fewer than `batch_size` rows
    /// or a pass makes no progress. Gives backpressure-free catch-up after
    /// an outage without unbounded single-pass work.
    pub async fn drain(&self) -> Result<usize, EngineError> {
        let mut total = 0;

        loop {
            let stats = self.process_batch().await?;
            total += stats.processed;

            if stats.fetched < self.config.batch_size || stats.processed == 0 {
                break;
            }
        }

        Ok(total)
    }

    /// Process one batch of unprocessed events in sequence order.
    pub async fn process_batch(&self) -> Result<BatchStats, EngineError> {
        let events = self.store.fetch_unprocessed(self.config.batch_size).await?;
        let mut stats = BatchStats { fetched: events.len(), ..Default::default() };

        // Aggregates whose chain already failed in this pass; later events
        // for them must wait for a future pass.
        let mut halted: HashSet<String> = HashSet::new();

        for event in events {
            let token_key = event.token.to_string();

            if halted.contains(&token_key) {
                stats.skipped += 1;
                continue;
            }

            // Never advance past a gap: an unprocessed predecessor means an
            // earlier side effect has not been applied yet.
            if self
                .store
                .has_unprocessed_predecessor(&event.token, event.seq)
                .await?
            {
                debug!(token = %event.token, seq = event.seq, "Predecessor pending, skipping");
                stats.skipped += 1;
                halted.insert(token_key);
                continue;
            }

            match self.apply(&event).await {
                Ok(()) => {
                    self.store.mark_processed(event.seq).await?;
                    stats.processed += 1;
                }
                Err(e) => {
                    warn!(
                        token = %event.token,
                        seq = event.seq,
                        error = %e,
                        "Side effect failed, halting aggregate chain for this pass"
                    );
                    stats.failed += 1;
                    halted.insert(token_key);
                }
            }
        }

        Ok(stats)
    }

    async fn apply(&self, event: &TransitionEvent) -> Result<(), EngineError> {
        let snapshot: A = serde_json::from_value(event.snapshot.clone())?;

        let prior = match event.prior_state {
            None => None,
            Some(id) => Some(<A::State as StateId>::from_id(id).ok_or_else(|| {
                EngineError::Serialization(format!("unknown prior state id {}", id))
            })?),
        };
        let new = <A::State as StateId>::from_id(event.new_state).ok_or_else(|| {
            EngineError::Serialization(format!("unknown state id {}", event.new_state))
        })?;

        self.dispatcher.dispatch(prior, new, &snapshot).await
    }
}

//! Workflow Engine
//!
//! Orchestrates a single "advance the workflow" request: consult the
//! idempotency cache, run the transaction type's transition logic, gate the
//! result through the state graph, persist under optimistic concurrency
//! (aggregate mutation + transition event in one atomic unit), and publish
//! the realized change. Side effects are applied later by the outbox
//! processor; nothing here calls an external service.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::clients::{ChangeKind, EventPublisher};

use super::error::EngineError;
use super::graph::StateGraph;
use super::idempotency::{Handled, IdempotencyEngine};
use super::store::WorkflowStore;
use super::types::{
    AggregateToken, Hurdle, HurdleResponses, Outcome, ResumeResult, SearchFilter,
    StateId, WorkflowAggregate, now_ms,
};

/// What the transition logic decided for one step.
#[derive(Debug)]
pub enum StepPlan<S> {
    /// Move to `target` (self-loops allowed where the graph declares them)
    Transition { target: S, hurdles: Vec<Hurdle> },
    /// Nothing to do - no write, no event; the outcome reports the current
    /// state with any outstanding hurdles
    Hold { hurdles: Vec<Hurdle> },
}

/// Per-transaction-type transition logic.
///
/// Implementations pick the next state from the aggregate and the supplied
/// input, recording hurdle responses and collaborator decisions on the
/// aggregate as they go. They never touch storage and never invoke side
/// effects; the engine persists, the outbox dispatches.
#[async_trait]
pub trait TransitionLogic<A: WorkflowAggregate>: Send + Sync {
    /// Advance from the aggregate's current state given hurdle responses.
    async fn advance(
        &self,
        aggregate: &mut A,
        responses: &HurdleResponses,
    ) -> Result<StepPlan<A::State>, EngineError>;

    /// Apply an external completion (chain watcher, side-effect dispatch).
    async fn resume(
        &self,
        aggregate: &mut A,
        result: &ResumeResult,
    ) -> Result<StepPlan<A::State>, EngineError>;

    /// The terminal failed state used by forced abandonment.
    fn failed_state(&self) -> A::State;
}

pub struct WorkflowEngine<A: WorkflowAggregate> {
    store: Arc<dyn WorkflowStore<A>>,
    graph: &'static StateGraph<A>,
    logic: Arc<dyn TransitionLogic<A>>,
    idempotency: IdempotencyEngine<A>,
    publisher: Arc<dyn EventPublisher<A>>,
}

impl<A: WorkflowAggregate> WorkflowEngine<A> {
    pub fn new(
        store: Arc<dyn WorkflowStore<A>>,
        graph: &'static StateGraph<A>,
        logic: Arc<dyn TransitionLogic<A>>,
        publisher: Arc<dyn EventPublisher<A>>,
    ) -> Self {
        let idempotency = IdempotencyEngine::new(store.clone());
        Self { store, graph, logic, idempotency, publisher }
    }

    /// Access to the store for the outbox processor and sweeps
    pub fn store(&self) -> &Arc<dyn WorkflowStore<A>> {
        &self.store
    }

    pub fn graph(&self) -> &'static StateGraph<A> {
        self.graph
    }

    /// Persist a freshly built aggregate in its initial state.
    ///
    /// The initial state's invariants are checked before the write; the
    /// creation event (prior state None) commits atomically with it.
    pub async fn create(&self, aggregate: A, hurdles: Vec<Hurdle>) -> Result<Outcome, EngineError> {
        self.graph.check_invariants(aggregate.state(), &aggregate)?;

        let event = self.store.insert(&aggregate).await?;
        info!(
            token = %aggregate.token(),
            state = %aggregate.state(),
            seq = event.seq,
            "Aggregate created"
        );

        self.publisher.publish(None, &aggregate, ChangeKind::Create).await;

        Ok(self.outcome(&aggregate, hurdles))
    }

    /// Advance the workflow with a client-initiated request.
    ///
    /// Duplicates (same token, back-counter and responses) are served from
    /// the idempotency cache without re-executing; both success and error
    /// outcomes are cached and replayed verbatim.
    pub async fn execute(
        &self,
        token: &AggregateToken,
        back_counter: u32,
        responses: &HurdleResponses,
    ) -> Result<Outcome, EngineError> {
        let fingerprint = match self.idempotency.handle(token, back_counter, responses).await? {
            Handled::Replayed(outcome) => return outcome,
            Handled::Execute(fingerprint) => fingerprint,
        };

        let result = self.run_advance(token, responses).await;

        // Resolve the placeholder regardless of outcome; a failure to cache
        // must not mask the transition result.
        if let Err(e) = self
            .idempotency
            .update_cached_response(&fingerprint, token, &result)
            .await
        {
            warn!(
                token = %token,
                fingerprint = %fingerprint,
                error = %e,
                "Failed to resolve idempotency record"
            );
        }

        result
    }

    /// Advance the workflow without consulting the idempotency cache.
    ///
    /// This is the path the retry sweep uses: the state graph and the
    /// version check make the retry idempotent at the state level.
    pub async fn execute_uncached(
        &self,
        token: &AggregateToken,
        responses: &HurdleResponses,
    ) -> Result<Outcome, EngineError> {
        self.run_advance(token, responses).await
    }

    /// Apply an external completion to the workflow.
    pub async fn resume(
        &self,
        token: &AggregateToken,
        result: &ResumeResult,
    ) -> Result<(), EngineError> {
        let old = self.load(token).await?;
        let mut aggregate = old.clone();
        let plan = self.logic.resume(&mut aggregate, result).await?;
        self.commit(old, aggregate, plan).await?;
        Ok(())
    }

    /// Force the aggregate into the terminal failed state with the given
    /// reason. Used by the stuck-workflow fail sweep.
    pub async fn force_fail(
        &self,
        token: &AggregateToken,
        reason: &str,
    ) -> Result<Outcome, EngineError> {
        let old = self.load(token).await?;
        let mut aggregate = old.clone();
        aggregate.set_failure_reason(Some(reason.to_string()));

        let target = self.logic.failed_state();
        let plan = StepPlan::Transition { target, hurdles: Vec::new() };
        self.commit(old, aggregate, plan).await
    }

    pub async fn get(&self, token: &AggregateToken) -> Result<A, EngineError> {
        self.load(token).await
    }

    pub async fn get_many(&self, tokens: &[AggregateToken]) -> Result<Vec<A>, EngineError> {
        self.store.get_by_tokens(tokens).await
    }

    pub async fn search(&self, filter: &SearchFilter<A::State>) -> Result<Vec<A>, EngineError> {
        self.store.search(filter).await
    }

    async fn run_advance(
        &self,
        token: &AggregateToken,
        responses: &HurdleResponses,
    ) -> Result<Outcome, EngineError> {
        let old = self.load(token).await?;
        let mut aggregate = old.clone();
        let plan = self.logic.advance(&mut aggregate, responses).await?;
        self.commit(old, aggregate, plan).await
    }

    async fn commit(
        &self,
        old: A,
        mut aggregate: A,
        plan: StepPlan<A::State>,
    ) -> Result<Outcome, EngineError> {
        let prior = old.state();
        let (target, hurdles) = match plan {
            StepPlan::Hold { hurdles } => {
                debug!(token = %aggregate.token(), state = %prior, "No transition to apply");
                return Ok(self.outcome(&aggregate, hurdles));
            }
            StepPlan::Transition { target, hurdles } => (target, hurdles),
        };

        if !self.graph.can_transition(prior, target) {
            return Err(EngineError::InvalidTransition {
                from: prior.as_str().to_string(),
                to: target.as_str().to_string(),
            });
        }

        self.graph.check_invariants(target, &aggregate)?;

        let expected_version = old.version();
        aggregate.set_state(target);
        aggregate.set_version(expected_version + 1);
        aggregate.touch(now_ms());

        let event = self.store.update(&aggregate, prior, expected_version).await?;
        info!(
            token = %aggregate.token(),
            from = %prior,
            to = %target,
            version = aggregate.version(),
            seq = event.seq,
            "Transition committed"
        );

        self.publisher.publish(Some(&old), &aggregate, ChangeKind::Update).await;

        Ok(self.outcome(&aggregate, hurdles))
    }

    async fn load(&self, token: &AggregateToken) -> Result<A, EngineError> {
        self.store
            .get_by_token(token)
            .await?
            .ok_or_else(|| EngineError::NotFound(token.to_string()))
    }

    fn outcome(&self, aggregate: &A, hurdles: Vec<Hurdle>) -> Outcome {
        Outcome {
            token: aggregate.token(),
            state: aggregate.state().as_str().to_string(),
            state_id: aggregate.state().id(),
            version: aggregate.version(),
            hurdles,
        }
    }
}

//! Versioned Store Contract
//!
//! Storage trait for workflow aggregates, the append-only transition event
//! ledger and idempotency records. All serialization between concurrent
//! writers is pushed to the store: unique insert for the idempotency
//! placeholder, version CAS for the aggregate. Implementations must write
//! the aggregate mutation and its transition event in one atomic unit.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::EngineError;
use super::fingerprint::Fingerprint;
use super::types::{AggregateToken, SearchFilter, WorkflowAggregate};

/// Upper bound for batch token lookups, protecting against unbounded fan-out
pub const MAX_BATCH_LOOKUP: usize = 100;

/// Append-only record of one realized state change.
///
/// Events for an aggregate are totally ordered by `seq`; the unprocessed
/// events in sequence order are the exact side-effect work queue for that
/// aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub seq: i64,
    pub token: AggregateToken,
    /// None for the creation event
    pub prior_state: Option<i16>,
    pub new_state: i16,
    /// Full snapshot of the aggregate at the moment of transition
    pub snapshot: serde_json::Value,
    pub processed: bool,
    pub created_at: i64,
}

/// Idempotency record: maps (fingerprint, token) to exactly one outcome.
///
/// Created as a placeholder on first sight of a fingerprint; resolved
/// exactly once, to either a success payload or a serialized error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub fingerprint: Fingerprint,
    pub token: AggregateToken,
    pub version: i64,
    pub response: Option<serde_json::Value>,
    pub error: Option<serde_json::Value>,
}

impl IdempotencyRecord {
    pub fn placeholder(fingerprint: Fingerprint, token: AggregateToken) -> Self {
        Self { fingerprint, token, version: 1, response: None, error: None }
    }

    /// A record is resolved once it carries a success payload or an error
    pub fn is_resolved(&self) -> bool {
        self.response.is_some() || self.error.is_some()
    }
}

/// Persistence contract for one transaction type.
#[async_trait]
pub trait WorkflowStore<A: WorkflowAggregate>: Send + Sync {
    // === Aggregates + transition ledger ===

    /// Persist a new aggregate and its creation event atomically.
    /// Fails with `Validation` if the token already exists.
    async fn insert(&self, aggregate: &A) -> Result<TransitionEvent, EngineError>;

    /// Persist a mutated aggregate and its transition event atomically,
    /// guarded by the version the caller last observed. Zero matching rows
    /// means a concurrent writer won; the caller must re-read and retry.
    async fn update(
        &self,
        aggregate: &A,
        prior_state: A::State,
        expected_version: i64,
    ) -> Result<TransitionEvent, EngineError>;

    async fn get_by_token(&self, token: &AggregateToken) -> Result<Option<A>, EngineError>;

    /// Batch lookup. Rejects empty lists and lists larger than
    /// [`MAX_BATCH_LOOKUP`]. Missing tokens are simply absent from the result.
    async fn get_by_tokens(&self, tokens: &[AggregateToken]) -> Result<Vec<A>, EngineError>;

    async fn search(&self, filter: &SearchFilter<A::State>) -> Result<Vec<A>, EngineError>;

    /// Aggregates in one of `states` whose last update precedes `cutoff_ms`,
    /// oldest first.
    async fn find_stuck(
        &self,
        states: &[A::State],
        cutoff_ms: i64,
        limit: usize,
    ) -> Result<Vec<A>, EngineError>;

    // === Outbox ===

    /// Unprocessed events in global sequence order, up to `limit`.
    async fn fetch_unprocessed(&self, limit: usize) -> Result<Vec<TransitionEvent>, EngineError>;

    /// True if any earlier event for the same aggregate is still unprocessed.
    /// Events are marked processed strictly in order, so this is equivalent
    /// to checking the immediate predecessor.
    async fn has_unprocessed_predecessor(
        &self,
        token: &AggregateToken,
        seq: i64,
    ) -> Result<bool, EngineError>;

    async fn mark_processed(&self, seq: i64) -> Result<(), EngineError>;

    // === Idempotency records ===

    async fn get_idempotency(
        &self,
        fingerprint: &Fingerprint,
        token: &AggregateToken,
    ) -> Result<Option<IdempotencyRecord>, EngineError>;

    /// Attempt to insert a placeholder record. Returns false when the insert
    /// loses the uniqueness race against a concurrent call.
    async fn insert_idempotency_placeholder(
        &self,
        fingerprint: &Fingerprint,
        token: &AggregateToken,
    ) -> Result<bool, EngineError>;

    /// Resolve a placeholder to its terminal outcome, bumping the record
    /// version. Fails with `NotFound` if no record exists.
    async fn resolve_idempotency(
        &self,
        fingerprint: &Fingerprint,
        token: &AggregateToken,
        response: Option<serde_json::Value>,
        error: Option<serde_json::Value>,
    ) -> Result<IdempotencyRecord, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_is_unresolved() {
        let token = AggregateToken::new();
        let fp = Fingerprint::compute(&token, 0, &Default::default()).unwrap();
        let rec = IdempotencyRecord::placeholder(fp, token);
        assert!(!rec.is_resolved());
        assert_eq!(rec.version, 1);
    }
}

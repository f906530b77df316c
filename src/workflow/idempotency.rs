//! Idempotency Engine
//!
//! Fingerprints an incoming transition request, detects duplicates and
//! serves the cached outcome for duplicates instead of re-executing. The
//! store's insert-uniqueness constraint serializes racing duplicates:
//! exactly one caller wins the right to execute, the others observe
//! "already processing" and are expected to retry.

use std::sync::Arc;

use super::error::EngineError;
use super::fingerprint::Fingerprint;
use super::store::{IdempotencyRecord, WorkflowStore};
use super::types::{AggregateToken, HurdleResponses, Outcome, WorkflowAggregate};

/// Result of consulting the idempotency layer for a request.
#[derive(Debug)]
pub enum Handled {
    /// Fresh fingerprint - the caller owns execution and must resolve the
    /// placeholder via [`IdempotencyEngine::update_cached_response`].
    Execute(Fingerprint),
    /// A resolved record exists - the original outcome, replayed verbatim.
    Replayed(Result<Outcome, EngineError>),
}

pub struct IdempotencyEngine<A: WorkflowAggregate> {
    store: Arc<dyn WorkflowStore<A>>,
}

impl<A: WorkflowAggregate> IdempotencyEngine<A> {
    pub fn new(store: Arc<dyn WorkflowStore<A>>) -> Self {
        Self { store }
    }

    /// Deduplicate a transition request.
    ///
    /// Computes the fingerprint, then either claims it by inserting a
    /// placeholder (returning [`Handled::Execute`]) or serves the cached
    /// outcome. A placeholder that is still unresolved - ours lost the
    /// insert race, or an earlier call is still executing - surfaces as
    /// `AlreadyProcessing`.
    pub async fn handle(
        &self,
        token: &AggregateToken,
        back_counter: u32,
        responses: &HurdleResponses,
    ) -> Result<Handled, EngineError> {
        let fingerprint = Fingerprint::compute(token, back_counter, responses)?;

        match self.store.get_idempotency(&fingerprint, token).await? {
            None => {
                if self
                    .store
                    .insert_idempotency_placeholder(&fingerprint, token)
                    .await?
                {
                    Ok(Handled::Execute(fingerprint))
                } else {
                    tracing::debug!(
                        token = %token,
                        fingerprint = %fingerprint,
                        "Lost placeholder insert race"
                    );
                    Err(EngineError::AlreadyProcessing {
                        fingerprint: fingerprint.to_string(),
                    })
                }
            }
            Some(record) => self.replay(fingerprint, record),
        }
    }

    fn replay(
        &self,
        fingerprint: Fingerprint,
        record: IdempotencyRecord,
    ) -> Result<Handled, EngineError> {
        if let Some(response) = record.response {
            let outcome: Outcome = serde_json::from_value(response)?;
            tracing::debug!(
                token = %record.token,
                fingerprint = %fingerprint,
                "Serving cached success outcome"
            );
            return Ok(Handled::Replayed(Ok(outcome)));
        }

        if let Some(error) = record.error {
            let original: EngineError = serde_json::from_value(error)?;
            tracing::debug!(
                token = %record.token,
                fingerprint = %fingerprint,
                code = original.code(),
                "Serving cached error outcome"
            );
            return Ok(Handled::Replayed(Err(original)));
        }

        // Placeholder still unresolved - the first call is in flight
        Err(EngineError::AlreadyProcessing { fingerprint: fingerprint.to_string() })
    }

    /// Resolve a placeholder to its terminal outcome. The single allowed
    /// write that makes a fingerprint's outcome visible to duplicates.
    pub async fn update_cached_response(
        &self,
        fingerprint: &Fingerprint,
        token: &AggregateToken,
        outcome: &Result<Outcome, EngineError>,
    ) -> Result<IdempotencyRecord, EngineError> {
        let (response, error) = match outcome {
            Ok(success) => (Some(serde_json::to_value(success)?), None),
            Err(e) => (None, Some(serde_json::to_value(e)?)),
        };

        self.store
            .resolve_idempotency(fingerprint, token, response, error)
            .await
    }
}

//! In-Memory Store
//!
//! Implements [`WorkflowStore`] over dashmap plus a mutex-guarded event log.
//! Used by tests and embedded deployments; semantics mirror the PostgreSQL
//! store, including unique-insert races and version CAS.
//!
//! Lock order: the event log mutex is always taken before any aggregate map
//! access, so aggregate writes and their events commit as one unit.

use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::error::EngineError;
use super::fingerprint::Fingerprint;
use super::store::{IdempotencyRecord, MAX_BATCH_LOOKUP, TransitionEvent, WorkflowStore};
use super::types::{AggregateToken, SearchFilter, StateId, WorkflowAggregate, now_ms};

struct EventLog {
    next_seq: i64,
    events: Vec<TransitionEvent>,
}

impl EventLog {
    fn append<A: WorkflowAggregate>(
        &mut self,
        prior_state: Option<i16>,
        aggregate: &A,
    ) -> Result<TransitionEvent, EngineError> {
        let event = TransitionEvent {
            seq: self.next_seq,
            token: aggregate.token(),
            prior_state,
            new_state: aggregate.state().id(),
            snapshot: serde_json::to_value(aggregate)?,
            processed: false,
            created_at: now_ms(),
        };
        self.next_seq += 1;
        self.events.push(event.clone());
        Ok(event)
    }
}

pub struct MemoryStore<A: WorkflowAggregate> {
    aggregates: DashMap<String, A>,
    events: Mutex<EventLog>,
    idempotency: DashMap<(String, String), IdempotencyRecord>,
}

impl<A: WorkflowAggregate> MemoryStore<A> {
    pub fn new() -> Self {
        Self {
            aggregates: DashMap::new(),
            events: Mutex::new(EventLog { next_seq: 1, events: Vec::new() }),
            idempotency: DashMap::new(),
        }
    }

    /// All events for one aggregate in sequence order. Test/debug helper.
    pub fn events_for(&self, token: &AggregateToken) -> Vec<TransitionEvent> {
        let log = self.events.lock().unwrap();
        let key = token.to_string();
        log.events.iter().filter(|e| e.token.to_string() == key).cloned().collect()
    }
}

impl<A: WorkflowAggregate> Default for MemoryStore<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<A: WorkflowAggregate> WorkflowStore<A> for MemoryStore<A> {
    async fn insert(&self, aggregate: &A) -> Result<TransitionEvent, EngineError> {
        let mut log = self.events.lock().unwrap();
        match self.aggregates.entry(aggregate.token().to_string()) {
            Entry::Occupied(_) => Err(EngineError::Validation(format!(
                "aggregate already exists: {}",
                aggregate.token()
            ))),
            Entry::Vacant(slot) => {
                slot.insert(aggregate.clone());
                log.append(None, aggregate)
            }
        }
    }

    async fn update(
        &self,
        aggregate: &A,
        prior_state: A::State,
        expected_version: i64,
    ) -> Result<TransitionEvent, EngineError> {
        let mut log = self.events.lock().unwrap();
        let key = aggregate.token().to_string();
        let mut stored = self
            .aggregates
            .get_mut(&key)
            .ok_or_else(|| EngineError::NotFound(key.clone()))?;

        if stored.version() != expected_version {
            return Err(EngineError::VersionConflict { token: key });
        }

        *stored = aggregate.clone();
        log.append(Some(prior_state.id()), aggregate)
    }

    async fn get_by_token(&self, token: &AggregateToken) -> Result<Option<A>, EngineError> {
        Ok(self.aggregates.get(&token.to_string()).map(|a| a.clone()))
    }

    async fn get_by_tokens(&self, tokens: &[AggregateToken]) -> Result<Vec<A>, EngineError> {
        if tokens.is_empty() {
            return Err(EngineError::Validation("empty token batch".to_string()));
        }
        if tokens.len() > MAX_BATCH_LOOKUP {
            return Err(EngineError::Validation(format!(
                "token batch exceeds maximum of {}",
                MAX_BATCH_LOOKUP
            )));
        }

        let mut found = Vec::with_capacity(tokens.len());
        for token in tokens {
            if let Some(agg) = self.aggregates.get(&token.to_string()) {
                found.push(agg.clone());
            }
        }
        Ok(found)
    }

    async fn search(&self, filter: &SearchFilter<A::State>) -> Result<Vec<A>, EngineError> {
        let mut matches: Vec<A> = self
            .aggregates
            .iter()
            .filter(|entry| {
                let agg = entry.value();
                let state_ok =
                    filter.states.is_empty() || filter.states.contains(&agg.state());
                let age_ok = filter
                    .updated_before
                    .map(|cutoff| agg.updated_at() < cutoff)
                    .unwrap_or(true);
                state_ok && age_ok
            })
            .map(|entry| entry.value().clone())
            .collect();

        matches.sort_by_key(|a| (a.updated_at(), a.token()));
        matches.truncate(filter.limit);
        Ok(matches)
    }

    async fn find_stuck(
        &self,
        states: &[A::State],
        cutoff_ms: i64,
        limit: usize,
    ) -> Result<Vec<A>, EngineError> {
        let filter = SearchFilter::states(states.to_vec())
            .updated_before(cutoff_ms)
            .limit(limit);
        self.search(&filter).await
    }

    async fn fetch_unprocessed(&self, limit: usize) -> Result<Vec<TransitionEvent>, EngineError> {
        let log = self.events.lock().unwrap();
        Ok(log.events.iter().filter(|e| !e.processed).take(limit).cloned().collect())
    }

    async fn has_unprocessed_predecessor(
        &self,
        token: &AggregateToken,
        seq: i64,
    ) -> Result<bool, EngineError> {
        let log = self.events.lock().unwrap();
        let key = token.to_string();
        Ok(log
            .events
            .iter()
            .any(|e| e.token.to_string() == key && e.seq < seq && !e.processed))
    }

    async fn mark_processed(&self, seq: i64) -> Result<(), EngineError> {
        let mut log = self.events.lock().unwrap();
        match log.events.iter_mut().find(|e| e.seq == seq) {
            Some(event) => {
                event.processed = true;
                Ok(())
            }
            None => Err(EngineError::NotFound(format!("event seq {}", seq))),
        }
    }

    async fn get_idempotency(
        &self,
        fingerprint: &Fingerprint,
        token: &AggregateToken,
    ) -> Result<Option<IdempotencyRecord>, EngineError> {
        let key = (fingerprint.as_str().to_string(), token.to_string());
        Ok(self.idempotency.get(&key).map(|r| r.clone()))
    }

    async fn insert_idempotency_placeholder(
        &self,
        fingerprint: &Fingerprint,
        token: &AggregateToken,
    ) -> Result<bool, EngineError> {
        let key = (fingerprint.as_str().to_string(), token.to_string());
        match self.idempotency.entry(key) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(IdempotencyRecord::placeholder(fingerprint.clone(), *token));
                Ok(true)
            }
        }
    }

    async fn resolve_idempotency(
        &self,
        fingerprint: &Fingerprint,
        token: &AggregateToken,
        response: Option<serde_json::Value>,
        error: Option<serde_json::Value>,
    ) -> Result<IdempotencyRecord, EngineError> {
        let key = (fingerprint.as_str().to_string(), token.to_string());
        let mut record = self.idempotency.get_mut(&key).ok_or_else(|| {
            EngineError::NotFound(format!("idempotency record {}/{}", fingerprint, token))
        })?;

        record.version += 1;
        record.response = response;
        record.error = error;
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::withdrawal::{Withdrawal, WithdrawalRequest};
    use rust_decimal::Decimal;

    fn withdrawal() -> Withdrawal {
        Withdrawal::new(
            AggregateToken::new(),
            WithdrawalRequest {
                account_id: 1,
                asset: "BTC".to_string(),
                amount: Decimal::new(100, 2),
                fee: Decimal::new(1, 2),
                required_confirmations: 3,
            },
            Decimal::new(65_000, 0),
        )
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_token() {
        let store = MemoryStore::<Withdrawal>::new();
        let w = withdrawal();
        store.insert(&w).await.unwrap();
        assert!(matches!(
            store.insert(&w).await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_mark_processed_unknown_seq() {
        let store = MemoryStore::<Withdrawal>::new();
        assert!(matches!(
            store.mark_processed(42).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_placeholder_insert_race() {
        let store = MemoryStore::<Withdrawal>::new();
        let token = AggregateToken::new();
        let fp = Fingerprint::compute(&token, 0, &Default::default()).unwrap();

        assert!(store.insert_idempotency_placeholder(&fp, &token).await.unwrap());
        // Second insert loses the uniqueness race
        assert!(!store.insert_idempotency_placeholder(&fp, &token).await.unwrap());
    }
}

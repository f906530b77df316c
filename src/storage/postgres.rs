//! PostgreSQL Store
//!
//! [`WorkflowStore`] over sqlx. Aggregate JSON is the source of truth (the
//! `data` column); state, version and timestamps are duplicated into plain
//! columns for querying. Aggregate mutations and their transition events
//! commit in one database transaction; version CAS and the idempotency
//! uniqueness constraint do all cross-worker serialization.
//!
//! The engine is shared across transaction types but the schemas are not:
//! each type gets its own table set (`withdrawal_*_tb`, `deposit_*_tb`).

use std::marker::PhantomData;
use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use crate::workflow::{
    AggregateToken, EngineError, Fingerprint, IdempotencyRecord, MAX_BATCH_LOOKUP, SearchFilter,
    StateId, TransitionEvent, WorkflowAggregate, WorkflowStore, now_ms,
};

/// Table names for one transaction type.
#[derive(Debug, Clone)]
pub struct TableSet {
    pub aggregates: String,
    pub events: String,
    pub idempotency: String,
}

impl TableSet {
    pub fn prefixed(prefix: &str) -> Self {
        Self {
            aggregates: format!("{}_aggregates_tb", prefix),
            events: format!("{}_events_tb", prefix),
            idempotency: format!("{}_idempotency_tb", prefix),
        }
    }

    pub fn withdrawal() -> Self {
        Self::prefixed("withdrawal")
    }

    pub fn deposit() -> Self {
        Self::prefixed("deposit")
    }
}

pub struct PgWorkflowStore<A: WorkflowAggregate> {
    pool: PgPool,
    tables: TableSet,
    _marker: PhantomData<fn() -> A>,
}

fn ts(ms: i64) -> Result<DateTime<Utc>, EngineError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| EngineError::Storage(format!("timestamp out of range: {}", ms)))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation))
        .unwrap_or(false)
}

impl<A: WorkflowAggregate> PgWorkflowStore<A> {
    pub fn new(pool: PgPool, tables: TableSet) -> Self {
        Self { pool, tables, _marker: PhantomData }
    }

    /// Connect and build a store in one step.
    pub async fn connect(url: &str, tables: TableSet) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .with_context(|| format!("connecting to {}", url))?;
        Ok(Self::new(pool, tables))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the table set if it does not exist.
    pub async fn ensure_schema(&self) -> Result<(), EngineError> {
        let statements = [
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    token TEXT PRIMARY KEY,
                    state SMALLINT NOT NULL,
                    version BIGINT NOT NULL,
                    data JSONB NOT NULL,
                    failure_reason TEXT,
                    created_at TIMESTAMPTZ NOT NULL,
                    updated_at TIMESTAMPTZ NOT NULL
                )
                "#,
                self.tables.aggregates
            ),
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    seq BIGSERIAL PRIMARY KEY,
                    token TEXT NOT NULL REFERENCES {} (token),
                    prior_state SMALLINT,
                    new_state SMALLINT NOT NULL,
                    snapshot JSONB NOT NULL,
                    processed BOOLEAN NOT NULL DEFAULT FALSE,
                    created_at TIMESTAMPTZ NOT NULL
                )
                "#,
                self.tables.events, self.tables.aggregates
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {0}_pending_idx ON {0} (token, seq) WHERE NOT processed",
                self.tables.events
            ),
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    fingerprint TEXT NOT NULL,
                    token TEXT NOT NULL,
                    version BIGINT NOT NULL DEFAULT 1,
                    response JSONB,
                    error JSONB,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    PRIMARY KEY (fingerprint, token)
                )
                "#,
                self.tables.idempotency
            ),
        ];

        for statement in &statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }

    fn row_to_aggregate(&self, row: &PgRow) -> Result<A, EngineError> {
        let data: serde_json::Value = row.get("data");
        Ok(serde_json::from_value(data)?)
    }

    fn row_to_event(&self, row: &PgRow) -> Result<TransitionEvent, EngineError> {
        let token_str: String = row.get("token");
        let token = AggregateToken::from_str(&token_str)
            .map_err(|_| EngineError::Storage(format!("invalid token format: {}", token_str)))?;
        let created_at: DateTime<Utc> = row.get("created_at");

        Ok(TransitionEvent {
            seq: row.get("seq"),
            token,
            prior_state: row.get("prior_state"),
            new_state: row.get("new_state"),
            snapshot: row.get("snapshot"),
            processed: row.get("processed"),
            created_at: created_at.timestamp_millis(),
        })
    }

    async fn append_event<'e, E>(
        &self,
        executor: E,
        aggregate: &A,
        prior_state: Option<i16>,
    ) -> Result<TransitionEvent, EngineError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let created_at = now_ms();
        let snapshot = serde_json::to_value(aggregate)?;

        let seq = sqlx::query_scalar::<_, i64>(&format!(
            r#"
            INSERT INTO {} (token, prior_state, new_state, snapshot, processed, created_at)
            VALUES ($1, $2, $3, $4, FALSE, $5)
            RETURNING seq
            "#,
            self.tables.events
        ))
        .bind(aggregate.token().to_string())
        .bind(prior_state)
        .bind(aggregate.state().id())
        .bind(&snapshot)
        .bind(ts(created_at)?)
        .fetch_one(executor)
        .await?;

        Ok(TransitionEvent {
            seq,
            token: aggregate.token(),
            prior_state,
            new_state: aggregate.state().id(),
            snapshot,
            processed: false,
            created_at,
        })
    }
}

#[async_trait]
impl<A: WorkflowAggregate> WorkflowStore<A> for PgWorkflowStore<A> {
    async fn insert(&self, aggregate: &A) -> Result<TransitionEvent, EngineError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(&format!(
            r#"
            INSERT INTO {} (token, state, version, data, failure_reason, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
            self.tables.aggregates
        ))
        .bind(aggregate.token().to_string())
        .bind(aggregate.state().id())
        .bind(aggregate.version())
        .bind(serde_json::to_value(aggregate)?)
        .bind(aggregate.failure_reason())
        .bind(ts(aggregate.created_at())?)
        .bind(ts(aggregate.updated_at())?)
        .execute(&mut *tx)
        .await;

        if let Err(e) = result {
            if is_unique_violation(&e) {
                return Err(EngineError::Validation(format!(
                    "aggregate already exists: {}",
                    aggregate.token()
                )));
            }
            return Err(e.into());
        }

        let event = self.append_event(&mut *tx, aggregate, None).await?;
        tx.commit().await?;
        Ok(event)
    }

    async fn update(
        &self,
        aggregate: &A,
        prior_state: A::State,
        expected_version: i64,
    ) -> Result<TransitionEvent, EngineError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(&format!(
            r#"
            UPDATE {} SET state = $1, version = $2, data = $3, failure_reason = $4, updated_at = $5
            WHERE token = $6 AND version = $7
            "#,
            self.tables.aggregates
        ))
        .bind(aggregate.state().id())
        .bind(aggregate.version())
        .bind(serde_json::to_value(aggregate)?)
        .bind(aggregate.failure_reason())
        .bind(ts(aggregate.updated_at())?)
        .bind(aggregate.token().to_string())
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish a missing row from a concurrent writer winning
            let exists = sqlx::query_scalar::<_, bool>(&format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE token = $1)",
                self.tables.aggregates
            ))
            .bind(aggregate.token().to_string())
            .fetch_one(&mut *tx)
            .await?;

            return if exists {
                Err(EngineError::VersionConflict { token: aggregate.token().to_string() })
            } else {
                Err(EngineError::NotFound(aggregate.token().to_string()))
            };
        }

        let event = self
            .append_event(&mut *tx, aggregate, Some(prior_state.id()))
            .await?;
        tx.commit().await?;
        Ok(event)
    }

    async fn get_by_token(&self, token: &AggregateToken) -> Result<Option<A>, EngineError> {
        let row = sqlx::query(&format!(
            "SELECT data FROM {} WHERE token = $1",
            self.tables.aggregates
        ))
        .bind(token.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.row_to_aggregate(&row)?)),
            None => Ok(None),
        }
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

        let keys: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
        let rows = sqlx::query(&format!(
            "SELECT data FROM {} WHERE token = ANY($1) ORDER BY token",
            self.tables.aggregates
        ))
        .bind(&keys)
        .fetch_all(&self.pool)
        .await?;

        let mut aggregates = Vec::with_capacity(rows.len());
        for row in rows {
            aggregates.push(self.row_to_aggregate(&row)?);
        }
        Ok(aggregates)
    }

    async fn search(&self, filter: &SearchFilter<A::State>) -> Result<Vec<A>, EngineError> {
        let state_ids: Vec<i16> = filter.states.iter().map(|s| s.id()).collect();
        let cutoff = match filter.updated_before {
            Some(ms) => Some(ts(ms)?),
            None => None,
        };

        let rows = sqlx::query(&format!(
            r#"
            SELECT data FROM {}
            WHERE ($1 OR state = ANY($2))
              AND ($3::timestamptz IS NULL OR updated_at < $3)
            ORDER BY updated_at ASC, token ASC
            LIMIT $4
            "#,
            self.tables.aggregates
        ))
        .bind(state_ids.is_empty())
        .bind(&state_ids)
        .bind(cutoff)
        .bind(filter.limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut aggregates = Vec::with_capacity(rows.len());
        for row in rows {
            aggregates.push(self.row_to_aggregate(&row)?);
        }
        Ok(aggregates)
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
        let rows = sqlx::query(&format!(
            r#"
            SELECT seq, token, prior_state, new_state, snapshot, processed, created_at
            FROM {}
            WHERE processed = FALSE
            ORDER BY seq ASC
            LIMIT $1
            "#,
            self.tables.events
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            events.push(self.row_to_event(&row)?);
        }
        Ok(events)
    }

    async fn has_unprocessed_predecessor(
        &self,
        token: &AggregateToken,
        seq: i64,
    ) -> Result<bool, EngineError> {
        let pending = sqlx::query_scalar::<_, bool>(&format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE token = $1 AND seq < $2 AND processed = FALSE)",
            self.tables.events
        ))
        .bind(token.to_string())
        .bind(seq)
        .fetch_one(&self.pool)
        .await?;

        Ok(pending)
    }

    async fn mark_processed(&self, seq: i64) -> Result<(), EngineError> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET processed = TRUE WHERE seq = $1",
            self.tables.events
        ))
        .bind(seq)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound(format!("event seq {}", seq)));
        }
        Ok(())
    }

    async fn get_idempotency(
        &self,
        fingerprint: &Fingerprint,
        token: &AggregateToken,
    ) -> Result<Option<IdempotencyRecord>, EngineError> {
        let row = sqlx::query(&format!(
            r#"
            SELECT version, response, error FROM {}
            WHERE fingerprint = $1 AND token = $2
            "#,
            self.tables.idempotency
        ))
        .bind(fingerprint.as_str())
        .bind(token.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| IdempotencyRecord {
            fingerprint: fingerprint.clone(),
            token: *token,
            version: row.get("version"),
            response: row.get("response"),
            error: row.get("error"),
        }))
    }

    async fn insert_idempotency_placeholder(
        &self,
        fingerprint: &Fingerprint,
        token: &AggregateToken,
    ) -> Result<bool, EngineError> {
        let result = sqlx::query(&format!(
            r#"
            INSERT INTO {} (fingerprint, token, version)
            VALUES ($1, $2, 1)
            ON CONFLICT (fingerprint, token) DO NOTHING
            "#,
            self.tables.idempotency
        ))
        .bind(fingerprint.as_str())
        .bind(token.to_string())
        .execute(&self.pool)
        .await?;

        // rows_affected 0 means another concurrent call already claimed it
        Ok(result.rows_affected() > 0)
    }

    async fn resolve_idempotency(
        &self,
        fingerprint: &Fingerprint,
        token: &AggregateToken,
        response: Option<serde_json::Value>,
        error: Option<serde_json::Value>,
    ) -> Result<IdempotencyRecord, EngineError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE {} SET response = $3, error = $4, version = version + 1, updated_at = NOW()
            WHERE fingerprint = $1 AND token = $2
            RETURNING version, response, error
            "#,
            self.tables.idempotency
        ))
        .bind(fingerprint.as_str())
        .bind(token.to_string())
        .bind(response)
        .bind(error)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            EngineError::NotFound(format!("idempotency record {}/{}", fingerprint, token))
        })?;

        Ok(IdempotencyRecord {
            fingerprint: fingerprint.clone(),
            token: *token,
            version: row.get("version"),
            response: row.get("response"),
            error: row.get("error"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::withdrawal::{Withdrawal, WithdrawalRequest, WithdrawalState};
    use crate::workflow::StateId;
    use rust_decimal::Decimal;

    async fn create_test_store() -> Option<PgWorkflowStore<Withdrawal>> {
        // Skip when no test database is available
        let database_url = std::env::var("DATABASE_URL").ok()?;
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(&database_url)
            .await
            .ok()?;
        let store = PgWorkflowStore::new(pool, TableSet::prefixed("test_withdrawal"));
        store.ensure_schema().await.ok()?;
        Some(store)
    }

    fn withdrawal() -> Withdrawal {
        Withdrawal::new(
            AggregateToken::new(),
            WithdrawalRequest {
                account_id: 1001,
                asset: "BTC".to_string(),
                amount: Decimal::new(100, 2),
                fee: Decimal::new(1, 2),
                required_confirmations: 3,
            },
            Decimal::new(65_000, 0),
        )
    }

    #[test]
    fn test_table_set_names() {
        let tables = TableSet::withdrawal();
        assert_eq!(tables.aggregates, "withdrawal_aggregates_tb");
        assert_eq!(tables.events, "withdrawal_events_tb");
        assert_eq!(tables.idempotency, "withdrawal_idempotency_tb");
    }

    #[tokio::test]
    async fn test_insert_and_version_conflict() {
        let store = match create_test_store().await {
            Some(s) => s,
            None => {
                eprintln!("Skipping test - database not available");
                return;
            }
        };

        let w = withdrawal();
        let event = store.insert(&w).await.unwrap();
        assert_eq!(event.prior_state, None);
        assert_eq!(event.new_state, WithdrawalState::AwaitingConfirmation.id());

        // Same token again loses the uniqueness race
        assert!(matches!(
            store.insert(&w).await,
            Err(EngineError::Validation(_))
        ));

        // Stale version update fails
        let mut moved = w.clone();
        moved.version = 2;
        let err = store
            .update(&moved, WithdrawalState::AwaitingConfirmation, 99)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::VersionConflict { .. }));
    }
}

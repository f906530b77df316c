//! Deposit Service
//!
//! The exposed surface for deposit workflows. Deposits have no backward
//! replay, so the idempotency back-counter is always zero.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::info;

use crate::clients::ExchangeRateClient;
use crate::workflow::{
    AggregateToken, EngineError, HurdleResponses, Outcome, ResumeResult, SearchFilter,
    SweeperConfig, WorkflowEngine,
};

use super::aggregate::{Deposit, DepositNotice};
use super::state::DepositState;

pub struct DepositService {
    engine: Arc<WorkflowEngine<Deposit>>,
    rates: Arc<dyn ExchangeRateClient>,
}

impl DepositService {
    pub fn new(engine: Arc<WorkflowEngine<Deposit>>, rates: Arc<dyn ExchangeRateClient>) -> Self {
        Self { engine, rates }
    }

    /// Record a detected incoming transaction. Fails with a validation
    /// error if the token is already taken.
    pub async fn create(
        &self,
        token: AggregateToken,
        notice: DepositNotice,
    ) -> Result<Outcome, EngineError> {
        if notice.asset.is_empty() {
            return Err(EngineError::Validation("asset must not be empty".to_string()));
        }
        if notice.amount <= Decimal::ZERO {
            return Err(EngineError::Validation(
                "amount must be greater than zero".to_string(),
            ));
        }
        if notice.tx_hash.is_empty() || notice.sender_address.is_empty() {
            return Err(EngineError::Validation(
                "tx hash and sender address are required".to_string(),
            ));
        }
        if notice.required_confirmations == 0 {
            return Err(EngineError::Validation(
                "required confirmations must be at least 1".to_string(),
            ));
        }

        let quote_usd = self.rates.quote(&notice.asset).await?;
        let deposit = Deposit::new(token, notice, quote_usd);

        info!(token = %deposit.token, tx_hash = %deposit.tx_hash, "Deposit detected");
        self.engine.create(deposit, Vec::new()).await
    }

    /// Advance the system-driven steps (intake, screening).
    pub async fn execute(
        &self,
        token: &AggregateToken,
        responses: &HurdleResponses,
    ) -> Result<Outcome, EngineError> {
        self.engine.execute(token, 0, responses).await
    }

    /// Apply a chain-watcher or side-effect completion.
    pub async fn resume(
        &self,
        token: &AggregateToken,
        result: &ResumeResult,
    ) -> Result<(), EngineError> {
        self.engine.resume(token, result).await
    }

    pub async fn get(&self, token: &AggregateToken) -> Result<Deposit, EngineError> {
        self.engine.get(token).await
    }

    pub async fn get_many(&self, tokens: &[AggregateToken]) -> Result<Vec<Deposit>, EngineError> {
        self.engine.get_many(tokens).await
    }

    pub async fn search(
        &self,
        filter: &SearchFilter<DepositState>,
    ) -> Result<Vec<Deposit>, EngineError> {
        self.engine.search(filter).await
    }

    pub fn engine(&self) -> &Arc<WorkflowEngine<Deposit>> {
        &self.engine
    }
}

/// Default sweep classes for deposits: a deposit that never reaches its
/// confirmation target is abandoned; system-driven steps are re-triggered.
pub fn sweeper_config(stuck_after: Duration) -> SweeperConfig<DepositState> {
    SweeperConfig::new(
        stuck_after,
        vec![DepositState::Confirming],
        vec![DepositState::Detected, DepositState::Crediting],
    )
}

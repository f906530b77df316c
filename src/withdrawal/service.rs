//! Withdrawal Service
//!
//! The exposed surface for withdrawal workflows. Validates creation input,
//! fixes the exchange-rate quote, and delegates to the engine.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::info;

use crate::clients::ExchangeRateClient;
use crate::workflow::{
    AggregateToken, EngineError, HurdleResponses, Outcome, ResumeResult, SearchFilter,
    SweeperConfig, WorkflowEngine,
};

use super::aggregate::{Withdrawal, WithdrawalRequest};
use super::state::WithdrawalState;
use super::transitions::WithdrawalLogic;

pub struct WithdrawalService {
    engine: Arc<WorkflowEngine<Withdrawal>>,
    rates: Arc<dyn ExchangeRateClient>,
}

impl WithdrawalService {
    pub fn new(engine: Arc<WorkflowEngine<Withdrawal>>, rates: Arc<dyn ExchangeRateClient>) -> Self {
        Self { engine, rates }
    }

    /// Create a withdrawal in AWAITING_CONFIRMATION with a fixed quote.
    /// Returns the confirm hurdle the caller must answer. Fails with a
    /// validation error if the token is already taken.
    pub async fn create(
        &self,
        token: AggregateToken,
        request: WithdrawalRequest,
    ) -> Result<Outcome, EngineError> {
        if request.asset.is_empty() {
            return Err(EngineError::Validation("asset must not be empty".to_string()));
        }
        if request.amount <= Decimal::ZERO {
            return Err(EngineError::Validation(
                "amount must be greater than zero".to_string(),
            ));
        }
        if request.fee < Decimal::ZERO || request.fee >= request.amount {
            return Err(EngineError::Validation(
                "fee must be non-negative and below the amount".to_string(),
            ));
        }
        if request.required_confirmations == 0 {
            return Err(EngineError::Validation(
                "required confirmations must be at least 1".to_string(),
            ));
        }

        let quote_usd = self.rates.quote(&request.asset).await?;
        let withdrawal = Withdrawal::new(token, request, quote_usd);
        let hurdle = WithdrawalLogic::confirm_hurdle(&withdrawal);

        info!(token = %withdrawal.token, asset = %withdrawal.asset, "Withdrawal requested");
        self.engine.create(withdrawal, vec![hurdle]).await
    }

    /// Advance with hurdle responses. Duplicate calls (same back-counter and
    /// responses) are served from the idempotency cache.
    pub async fn execute(
        &self,
        token: &AggregateToken,
        back_counter: u32,
        responses: &HurdleResponses,
    ) -> Result<Outcome, EngineError> {
        self.engine.execute(token, back_counter, responses).await
    }

    /// Apply an external completion (broadcast done, confirmations update).
    pub async fn resume(
        &self,
        token: &AggregateToken,
        result: &ResumeResult,
    ) -> Result<(), EngineError> {
        self.engine.resume(token, result).await
    }

    pub async fn get(&self, token: &AggregateToken) -> Result<Withdrawal, EngineError> {
        self.engine.get(token).await
    }

    pub async fn get_many(
        &self,
        tokens: &[AggregateToken],
    ) -> Result<Vec<Withdrawal>, EngineError> {
        self.engine.get_many(tokens).await
    }

    pub async fn search(
        &self,
        filter: &SearchFilter<WithdrawalState>,
    ) -> Result<Vec<Withdrawal>, EngineError> {
        self.engine.search(filter).await
    }

    pub fn engine(&self) -> &Arc<WorkflowEngine<Withdrawal>> {
        &self.engine
    }
}

/// Default sweep classes for withdrawals: user-gated states are abandoned,
/// system-driven states are re-triggered.
pub fn sweeper_config(stuck_after: Duration) -> SweeperConfig<WithdrawalState> {
    SweeperConfig::new(
        stuck_after,
        vec![WithdrawalState::AwaitingConfirmation, WithdrawalState::AwaitingApproval],
        vec![
            WithdrawalState::Screening,
            WithdrawalState::Submitting,
            WithdrawalState::Confirming,
        ],
    )
}

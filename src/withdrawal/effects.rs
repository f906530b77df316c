//! Withdrawal Side Effects
//!
//! Outbox dispatch for realized withdrawal transitions: freeze funds and
//! broadcast on entering SUBMITTING, finalize the ledger debit on
//! COMPLETED, void the hold on FAILED. Delivery is at-least-once, so every
//! branch re-checks the live aggregate before acting.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::clients::{ChainClient, LedgerClient};
use crate::workflow::{EffectDispatcher, EngineError, WorkflowEngine};

use super::aggregate::Withdrawal;
use super::state::WithdrawalState;
use super::transitions::submitted;

pub struct WithdrawalEffects {
    engine: Arc<WorkflowEngine<Withdrawal>>,
    ledger: Arc<dyn LedgerClient>,
    chain: Arc<dyn ChainClient>,
}

impl WithdrawalEffects {
    pub fn new(
        engine: Arc<WorkflowEngine<Withdrawal>>,
        ledger: Arc<dyn LedgerClient>,
        chain: Arc<dyn ChainClient>,
    ) -> Self {
        Self { engine, ledger, chain }
    }

    /// Freeze funds, record the pending debit, broadcast, then resume the
    /// workflow into CONFIRMING with the tx hash.
    async fn submit(&self, snapshot: &Withdrawal) -> Result<(), EngineError> {
        let live = self.engine.get(&snapshot.token).await?;
        if live.state != WithdrawalState::Submitting {
            debug!(token = %snapshot.token, state = %live.state, "Submission already handled");
            return Ok(());
        }

        let destination = snapshot.destination.as_deref().ok_or_else(|| {
            EngineError::Effect("submitting snapshot without destination".to_string())
        })?;

        self.ledger
            .freeze_funds(&snapshot.token, snapshot.account_id, &snapshot.asset, snapshot.amount)
            .await?;
        self.ledger
            .create_transaction(
                &snapshot.token,
                snapshot.account_id,
                &snapshot.asset,
                snapshot.amount,
            )
            .await?;

        let tx_hash = self
            .chain
            .broadcast_withdrawal(
                &snapshot.token.to_string(),
                destination,
                &snapshot.net_amount().to_string(),
            )
            .await?;

        info!(token = %snapshot.token, tx_hash = %tx_hash, "Withdrawal broadcast");

        self.engine.resume(&snapshot.token, &submitted(tx_hash)).await
    }
}

#[async_trait]
impl EffectDispatcher<Withdrawal> for WithdrawalEffects {
    async fn dispatch(
        &self,
        prior: Option<WithdrawalState>,
        new: WithdrawalState,
        snapshot: &Withdrawal,
    ) -> Result<(), EngineError> {
        match new {
            WithdrawalState::Submitting => self.submit(snapshot).await,

            WithdrawalState::Completed => {
                self.ledger.confirm_transaction(&snapshot.token).await?;
                info!(token = %snapshot.token, "Withdrawal debit finalized");
                Ok(())
            }

            WithdrawalState::Failed => {
                // A hold exists only once submission started
                if matches!(
                    prior,
                    Some(WithdrawalState::Submitting) | Some(WithdrawalState::Confirming)
                ) {
                    self.ledger.void_transaction(&snapshot.token).await?;
                    info!(token = %snapshot.token, "Withdrawal hold voided");
                }
                Ok(())
            }

            WithdrawalState::AwaitingConfirmation
            | WithdrawalState::Screening
            | WithdrawalState::AwaitingApproval
            | WithdrawalState::Confirming => {
                debug!(token = %snapshot.token, state = %new, "No side effect for transition");
                Ok(())
            }
        }
    }
}

//! Deposit Side Effects
//!
//! Outbox dispatch for realized deposit transitions: credit the ledger on
//! CREDITING, quarantine funds on BLOCKED. At-least-once delivery, so the
//! crediting branch re-checks the live aggregate before acting.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::clients::LedgerClient;
use crate::workflow::{EffectDispatcher, EngineError, WorkflowEngine};

use super::aggregate::Deposit;
use super::state::DepositState;
use super::transitions::credited;

pub struct DepositEffects {
    engine: Arc<WorkflowEngine<Deposit>>,
    ledger: Arc<dyn LedgerClient>,
}

impl DepositEffects {
    pub fn new(engine: Arc<WorkflowEngine<Deposit>>, ledger: Arc<dyn LedgerClient>) -> Self {
        Self { engine, ledger }
    }

    async fn credit(&self, snapshot: &Deposit) -> Result<(), EngineError> {
        let live = self.engine.get(&snapshot.token).await?;
        if live.state != DepositState::Crediting {
            debug!(token = %snapshot.token, state = %live.state, "Credit already handled");
            return Ok(());
        }

        self.ledger
            .create_transaction(
                &snapshot.token,
                snapshot.account_id,
                &snapshot.asset,
                snapshot.amount,
            )
            .await?;
        self.ledger.confirm_transaction(&snapshot.token).await?;

        info!(token = %snapshot.token, amount = %snapshot.amount, "Deposit credited");

        self.engine.resume(&snapshot.token, &credited()).await
    }
}

#[async_trait]
impl EffectDispatcher<Deposit> for DepositEffects {
    async fn dispatch(
        &self,
        _prior: Option<DepositState>,
        new: DepositState,
        snapshot: &Deposit,
    ) -> Result<(), EngineError> {
        match new {
            DepositState::Crediting => self.credit(snapshot).await,

            DepositState::Blocked => {
                // Quarantine the incoming funds instead of crediting
                self.ledger
                    .freeze_funds(
                        &snapshot.token,
                        snapshot.account_id,
                        &snapshot.asset,
                        snapshot.amount,
                    )
                    .await?;
                info!(token = %snapshot.token, "Blocked deposit quarantined");
                Ok(())
            }

            DepositState::Detected
            | DepositState::Confirming
            | DepositState::Completed
            | DepositState::Failed => {
                debug!(token = %snapshot.token, state = %new, "No side effect for transition");
                Ok(())
            }
        }
    }
}

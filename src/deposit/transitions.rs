//! Deposit Transition Logic

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::clients::{SanctionsClient, SanctionsDecision};
use crate::workflow::{
    EngineError, HurdleResponses, ResumeResult, StepPlan, TransitionLogic, now_ms,
};

use super::aggregate::Deposit;
use super::state::DepositState;

pub const RESUME_CONFIRMATIONS: &str = "confirmations";
pub const RESUME_CREDITED: &str = "credited";

#[derive(Debug, Deserialize)]
struct ConfirmationsResult {
    count: u32,
}

pub struct DepositLogic {
    sanctions: Arc<dyn SanctionsClient>,
}

impl DepositLogic {
    pub fn new(sanctions: Arc<dyn SanctionsClient>) -> Self {
        Self { sanctions }
    }
}

#[async_trait]
impl TransitionLogic<Deposit> for DepositLogic {
    async fn advance(
        &self,
        deposit: &mut Deposit,
        _responses: &HurdleResponses,
    ) -> Result<StepPlan<DepositState>, EngineError> {
        match deposit.state {
            // Deposits carry no hurdles; the single client-driven step
            // screens the sender and hands over to the chain watcher
            DepositState::Detected => {
                let decision = self.sanctions.screen(&deposit.sender_address).await?;
                deposit.sanctions_decision = Some(decision);

                info!(
                    token = %deposit.token,
                    sender = %deposit.sender_address,
                    sanctions = ?decision,
                    "Deposit sender screened"
                );

                let target = if decision == SanctionsDecision::Blocked {
                    deposit.failure_reason =
                        Some("sender blocked by sanctions screening".to_string());
                    DepositState::Blocked
                } else {
                    DepositState::Confirming
                };
                Ok(StepPlan::Transition { target, hurdles: Vec::new() })
            }

            // Confirmation counting and crediting are driven by the chain
            // watcher and the outbox
            DepositState::Confirming | DepositState::Crediting => {
                Ok(StepPlan::Hold { hurdles: Vec::new() })
            }

            DepositState::Completed | DepositState::Failed | DepositState::Blocked => {
                Err(EngineError::Validation(format!(
                    "deposit already in terminal state {}",
                    deposit.state
                )))
            }
        }
    }

    async fn resume(
        &self,
        deposit: &mut Deposit,
        result: &ResumeResult,
    ) -> Result<StepPlan<DepositState>, EngineError> {
        match (result.kind.as_str(), deposit.state) {
            (RESUME_CONFIRMATIONS, DepositState::Confirming) => {
                let update: ConfirmationsResult = serde_json::from_value(result.data.clone())
                    .map_err(|e| {
                        EngineError::Validation(format!("malformed confirmations result: {}", e))
                    })?;
                deposit.confirmations = update.count;

                let target = if update.count >= deposit.required_confirmations {
                    DepositState::Crediting
                } else {
                    DepositState::Confirming
                };
                Ok(StepPlan::Transition { target, hurdles: Vec::new() })
            }

            (RESUME_CREDITED, DepositState::Crediting) => {
                deposit.credited_at = Some(now_ms());
                Ok(StepPlan::Transition {
                    target: DepositState::Completed,
                    hurdles: Vec::new(),
                })
            }

            (kind, state) => Err(EngineError::Validation(format!(
                "resume result '{}' not applicable in state {}",
                kind, state
            ))),
        }
    }

    fn failed_state(&self) -> DepositState {
        DepositState::Failed
    }
}

/// Typed resume results for callers (chain watcher, effect dispatch)
pub fn confirmations(count: u32) -> ResumeResult {
    ResumeResult::new(RESUME_CONFIRMATIONS, json!({ "count": count }))
}

pub fn credited() -> ResumeResult {
    ResumeResult::new(RESUME_CREDITED, json!({}))
}

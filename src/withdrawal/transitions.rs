//! Withdrawal Transition Logic
//!
//! Picks the next withdrawal state from the current state, the supplied
//! hurdle responses and collaborator decisions. Pure state selection:
//! persistence is the engine's job, side effects are the outbox's.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::clients::{
    ChainClient, EligibilityClient, EligibilityDecision, RiskClient, RiskContext, RiskDecision,
    SanctionsClient, SanctionsDecision,
};
use crate::workflow::{
    EngineError, Hurdle, HurdleResponses, ResumeResult, StepPlan, TransitionLogic, now_ms,
};

use super::aggregate::Withdrawal;
use super::state::WithdrawalState;

pub const HURDLE_CONFIRM: &str = "confirm";
pub const HURDLE_APPROVE: &str = "approve";

pub const RESUME_SUBMITTED: &str = "submitted";
pub const RESUME_CONFIRMATIONS: &str = "confirmations";

#[derive(Debug, Deserialize)]
struct ConfirmResponse {
    address: String,
}

#[derive(Debug, Deserialize)]
struct ApproveResponse {
    approved: bool,
    reviewer: String,
}

#[derive(Debug, Deserialize)]
struct SubmittedResult {
    tx_hash: String,
}

#[derive(Debug, Deserialize)]
struct ConfirmationsResult {
    count: u32,
}

pub struct WithdrawalLogic {
    risk: Arc<dyn RiskClient>,
    sanctions: Arc<dyn SanctionsClient>,
    eligibility: Arc<dyn EligibilityClient>,
    chain: Arc<dyn ChainClient>,
}

impl WithdrawalLogic {
    pub fn new(
        risk: Arc<dyn RiskClient>,
        sanctions: Arc<dyn SanctionsClient>,
        eligibility: Arc<dyn EligibilityClient>,
        chain: Arc<dyn ChainClient>,
    ) -> Self {
        Self { risk, sanctions, eligibility, chain }
    }

    /// The hurdle issued at creation time
    pub fn confirm_hurdle(withdrawal: &Withdrawal) -> Hurdle {
        Hurdle::new(
            HURDLE_CONFIRM,
            json!({
                "asset": withdrawal.asset,
                "amount": withdrawal.amount,
                "fee": withdrawal.fee,
                "quote_usd": withdrawal.quote_usd,
            }),
        )
    }

    fn approve_hurdle(withdrawal: &Withdrawal) -> Hurdle {
        Hurdle::new(
            HURDLE_APPROVE,
            json!({
                "asset": withdrawal.asset,
                "amount": withdrawal.amount,
                "destination": withdrawal.destination,
            }),
        )
    }

    fn response<T: serde::de::DeserializeOwned>(
        responses: &HurdleResponses,
        name: &str,
    ) -> Result<T, EngineError> {
        let value = responses
            .get(name)
            .ok_or_else(|| EngineError::Validation(format!("missing hurdle response: {}", name)))?;
        serde_json::from_value(value.clone())
            .map_err(|e| EngineError::Validation(format!("malformed {} response: {}", name, e)))
    }

    async fn screen(
        &self,
        withdrawal: &mut Withdrawal,
    ) -> Result<StepPlan<WithdrawalState>, EngineError> {
        let eligibility = self
            .eligibility
            .check(withdrawal.account_id, &withdrawal.asset)
            .await?;
        if eligibility == EligibilityDecision::Ineligible {
            withdrawal.failure_reason = Some("account not eligible for withdrawals".to_string());
            return Ok(StepPlan::Transition {
                target: WithdrawalState::Failed,
                hurdles: Vec::new(),
            });
        }

        let destination = withdrawal.destination.clone().ok_or_else(|| {
            EngineError::Validation("destination missing before screening".to_string())
        })?;

        let risk = self
            .risk
            .evaluate(&RiskContext {
                account_id: withdrawal.account_id,
                asset: &withdrawal.asset,
                amount: withdrawal.amount,
                destination: Some(&destination),
            })
            .await?;
        let sanctions = self.sanctions.screen(&destination).await?;

        withdrawal.risk_decision = Some(risk);
        withdrawal.sanctions_decision = Some(sanctions);

        info!(
            token = %withdrawal.token,
            risk = ?risk,
            sanctions = ?sanctions,
            "Withdrawal screened"
        );

        let plan = match (risk, sanctions) {
            (RiskDecision::Block, _) => {
                withdrawal.failure_reason = Some("blocked by risk engine".to_string());
                StepPlan::Transition { target: WithdrawalState::Failed, hurdles: Vec::new() }
            }
            (_, SanctionsDecision::Blocked) => {
                withdrawal.failure_reason = Some("blocked by sanctions screening".to_string());
                StepPlan::Transition { target: WithdrawalState::Failed, hurdles: Vec::new() }
            }
            (RiskDecision::Hold, _) => StepPlan::Transition {
                target: WithdrawalState::AwaitingApproval,
                hurdles: vec![Self::approve_hurdle(withdrawal)],
            },
            (RiskDecision::Approve, _) => StepPlan::Transition {
                target: WithdrawalState::Submitting,
                hurdles: Vec::new(),
            },
        };

        Ok(plan)
    }
}

#[async_trait]
impl TransitionLogic<Withdrawal> for WithdrawalLogic {
    async fn advance(
        &self,
        withdrawal: &mut Withdrawal,
        responses: &HurdleResponses,
    ) -> Result<StepPlan<WithdrawalState>, EngineError> {
        match withdrawal.state {
            WithdrawalState::AwaitingConfirmation => {
                let confirm: ConfirmResponse = Self::response(responses, HURDLE_CONFIRM)?;
                if !self.chain.validate_address(&confirm.address) {
                    return Err(EngineError::Validation(format!(
                        "invalid destination address: {}",
                        confirm.address
                    )));
                }

                withdrawal.destination = Some(confirm.address);
                withdrawal.confirmed_at = Some(now_ms());
                Ok(StepPlan::Transition {
                    target: WithdrawalState::Screening,
                    hurdles: Vec::new(),
                })
            }

            WithdrawalState::Screening => self.screen(withdrawal).await,

            WithdrawalState::AwaitingApproval => {
                let approval: ApproveResponse = Self::response(responses, HURDLE_APPROVE)?;
                if approval.approved {
                    withdrawal.approved_by = Some(approval.reviewer);
                    Ok(StepPlan::Transition {
                        target: WithdrawalState::Submitting,
                        hurdles: Vec::new(),
                    })
                } else {
                    withdrawal.failure_reason =
                        Some(format!("rejected by reviewer {}", approval.reviewer));
                    Ok(StepPlan::Transition {
                        target: WithdrawalState::Failed,
                        hurdles: Vec::new(),
                    })
                }
            }

            // Broadcast and confirmation are driven by the outbox and the
            // chain watcher; a client call here has nothing to apply.
            WithdrawalState::Submitting | WithdrawalState::Confirming => {
                Ok(StepPlan::Hold { hurdles: Vec::new() })
            }

            WithdrawalState::Completed | WithdrawalState::Failed => {
                Err(EngineError::Validation(format!(
                    "withdrawal already in terminal state {}",
                    withdrawal.state
                )))
            }
        }
    }

    async fn resume(
        &self,
        withdrawal: &mut Withdrawal,
        result: &ResumeResult,
    ) -> Result<StepPlan<WithdrawalState>, EngineError> {
        match (result.kind.as_str(), withdrawal.state) {
            (RESUME_SUBMITTED, WithdrawalState::Submitting) => {
                let submitted: SubmittedResult = serde_json::from_value(result.data.clone())
                    .map_err(|e| {
                        EngineError::Validation(format!("malformed submitted result: {}", e))
                    })?;
                withdrawal.tx_hash = Some(submitted.tx_hash);
                Ok(StepPlan::Transition {
                    target: WithdrawalState::Confirming,
                    hurdles: Vec::new(),
                })
            }

            (RESUME_CONFIRMATIONS, WithdrawalState::Confirming) => {
                let update: ConfirmationsResult = serde_json::from_value(result.data.clone())
                    .map_err(|e| {
                        EngineError::Validation(format!("malformed confirmations result: {}", e))
                    })?;
                withdrawal.confirmations = update.count;

                let target = if update.count >= withdrawal.required_confirmations {
                    WithdrawalState::Completed
                } else {
                    WithdrawalState::Confirming
                };
                Ok(StepPlan::Transition { target, hurdles: Vec::new() })
            }

            (kind, state) => Err(EngineError::Validation(format!(
                "resume result '{}' not applicable in state {}",
                kind, state
            ))),
        }
    }

    fn failed_state(&self) -> WithdrawalState {
        WithdrawalState::Failed
    }
}

/// Typed resume results for callers (chain watcher, effect dispatch)
pub fn submitted(tx_hash: impl Into<String>) -> ResumeResult {
    ResumeResult::new(RESUME_SUBMITTED, json!({ "tx_hash": tx_hash.into() }))
}

pub fn confirmations(count: u32) -> ResumeResult {
    ResumeResult::new(RESUME_CONFIRMATIONS, json!({ "count": count }))
}

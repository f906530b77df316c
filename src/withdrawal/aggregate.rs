//! Withdrawal Aggregate
//!
//! The withdrawal transaction instance. Domain fields grow as hurdle
//! responses and collaborator decisions come in; the aggregate is only
//! mutated through validated transitions and is never deleted.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::clients::{RiskDecision, SanctionsDecision};
use crate::workflow::{AggregateToken, WorkflowAggregate, now_ms};

use super::state::WithdrawalState;

/// Withdrawal creation request
#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawalRequest {
    pub account_id: u64,
    pub asset: String,
    pub amount: Decimal,
    pub fee: Decimal,
    /// Required chain confirmations before the withdrawal completes
    pub required_confirmations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Withdrawal {
    pub token: AggregateToken,
    pub state: WithdrawalState,
    pub version: i64,

    pub account_id: u64,
    pub asset: String,
    pub amount: Decimal,
    pub fee: Decimal,
    /// USD quote fixed at creation, never re-queried
    pub quote_usd: Decimal,

    /// Destination address, recorded from the confirm hurdle response
    pub destination: Option<String>,
    /// When the user confirmed (millis)
    pub confirmed_at: Option<i64>,

    pub risk_decision: Option<RiskDecision>,
    pub sanctions_decision: Option<SanctionsDecision>,
    /// Reviewer who resolved the approval hurdle, if risk returned Hold
    pub approved_by: Option<String>,

    pub tx_hash: Option<String>,
    pub confirmations: u32,
    pub required_confirmations: u32,

    pub failure_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Withdrawal {
    /// Build a new withdrawal in the initial state with a fixed quote.
    pub fn new(token: AggregateToken, request: WithdrawalRequest, quote_usd: Decimal) -> Self {
        let now = now_ms();
        Self {
            token,
            state: WithdrawalState::AwaitingConfirmation,
            version: 1,
            account_id: request.account_id,
            asset: request.asset,
            amount: request.amount,
            fee: request.fee,
            quote_usd,
            destination: None,
            confirmed_at: None,
            risk_decision: None,
            sanctions_decision: None,
            approved_by: None,
            tx_hash: None,
            confirmations: 0,
            required_confirmations: request.required_confirmations,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Amount that actually leaves for the chain
    pub fn net_amount(&self) -> Decimal {
        self.amount - self.fee
    }

    /// True once risk and sanctions both allow submission
    pub fn screening_passed(&self) -> bool {
        let risk_ok = match self.risk_decision {
            Some(RiskDecision::Approve) => true,
            Some(RiskDecision::Hold) => self.approved_by.is_some(),
            _ => false,
        };
        let sanctions_ok = matches!(
            self.sanctions_decision,
            Some(SanctionsDecision::Checked) | Some(SanctionsDecision::Warned)
        );
        risk_ok && sanctions_ok
    }
}

impl WorkflowAggregate for Withdrawal {
    type State = WithdrawalState;

    fn token(&self) -> AggregateToken {
        self.token
    }

    fn state(&self) -> WithdrawalState {
        self.state
    }

    fn set_state(&mut self, state: WithdrawalState) {
        self.state = state;
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn touch(&mut self, now_ms: i64) {
        self.updated_at = now_ms;
    }

    fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    fn set_failure_reason(&mut self, reason: Option<String>) {
        self.failure_reason = reason;
    }
}

impl fmt::Display for Withdrawal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Withdrawal[{}] account={} {} {} state={} v{}",
            self.token, self.account_id, self.amount, self.asset, self.state, self.version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> WithdrawalRequest {
        WithdrawalRequest {
            account_id: 1001,
            asset: "BTC".to_string(),
            amount: Decimal::new(150, 2),
            fee: Decimal::new(5, 2),
            required_confirmations: 3,
        }
    }

    #[test]
    fn test_new_withdrawal() {
        let w = Withdrawal::new(AggregateToken::new(), request(), Decimal::new(65_000, 0));
        assert_eq!(w.state, WithdrawalState::AwaitingConfirmation);
        assert_eq!(w.version, 1);
        assert!(w.destination.is_none());
        assert_eq!(w.net_amount(), Decimal::new(145, 2));
    }

    #[test]
    fn test_screening_passed() {
        let mut w = Withdrawal::new(AggregateToken::new(), request(), Decimal::new(65_000, 0));
        assert!(!w.screening_passed());

        w.risk_decision = Some(RiskDecision::Approve);
        w.sanctions_decision = Some(SanctionsDecision::Checked);
        assert!(w.screening_passed());

        // Hold needs a reviewer before it counts
        w.risk_decision = Some(RiskDecision::Hold);
        assert!(!w.screening_passed());
        w.approved_by = Some("ops-7".to_string());
        assert!(w.screening_passed());

        w.sanctions_decision = Some(SanctionsDecision::Blocked);
        assert!(!w.screening_passed());
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let w = Withdrawal::new(AggregateToken::new(), request(), Decimal::new(65_000, 0));
        let json = serde_json::to_value(&w).unwrap();
        let back: Withdrawal = serde_json::from_value(json).unwrap();
        assert_eq!(back.token, w.token);
        assert_eq!(back.state, w.state);
        assert_eq!(back.amount, w.amount);
    }
}

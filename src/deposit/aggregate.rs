//! Deposit Aggregate

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::clients::SanctionsDecision;
use crate::workflow::{AggregateToken, WorkflowAggregate, now_ms};

use super::state::DepositState;

/// Incoming transaction notice from the chain watcher
#[derive(Debug, Clone, Deserialize)]
pub struct DepositNotice {
    pub account_id: u64,
    pub asset: String,
    pub amount: Decimal,
    pub tx_hash: String,
    pub sender_address: String,
    pub block_height: i64,
    pub block_hash: String,
    pub required_confirmations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deposit {
    pub token: AggregateToken,
    pub state: DepositState,
    pub version: i64,

    pub account_id: u64,
    pub asset: String,
    pub amount: Decimal,
    /// USD quote fixed at detection, never re-queried
    pub quote_usd: Decimal,

    pub tx_hash: String,
    pub sender_address: String,
    pub block_height: i64,
    pub block_hash: String,

    pub confirmations: u32,
    pub required_confirmations: u32,

    pub sanctions_decision: Option<SanctionsDecision>,
    /// When the ledger credit landed (millis)
    pub credited_at: Option<i64>,

    pub failure_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Deposit {
    pub fn new(token: AggregateToken, notice: DepositNotice, quote_usd: Decimal) -> Self {
        let now = now_ms();
        Self {
            token,
            state: DepositState::Detected,
            version: 1,
            account_id: notice.account_id,
            asset: notice.asset,
            amount: notice.amount,
            quote_usd,
            tx_hash: notice.tx_hash,
            sender_address: notice.sender_address,
            block_height: notice.block_height,
            block_hash: notice.block_hash,
            confirmations: 0,
            required_confirmations: notice.required_confirmations,
            sanctions_decision: None,
            credited_at: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn sanctions_cleared(&self) -> bool {
        matches!(
            self.sanctions_decision,
            Some(SanctionsDecision::Checked) | Some(SanctionsDecision::Warned)
        )
    }
}

impl WorkflowAggregate for Deposit {
    type State = DepositState;

    fn token(&self) -> AggregateToken {
        self.token
    }

    fn state(&self) -> DepositState {
        self.state
    }

    fn set_state(&mut self, state: DepositState) {
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

impl fmt::Display for Deposit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Deposit[{}] account={} {} {} tx={} state={} v{}",
            self.token, self.account_id, self.amount, self.asset, self.tx_hash, self.state,
            self.version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice() -> DepositNotice {
        DepositNotice {
            account_id: 2002,
            asset: "ETH".to_string(),
            amount: Decimal::new(25, 1),
            tx_hash: "0xdeadbeef".to_string(),
            sender_address: "0xsender01".to_string(),
            block_height: 19_000_000,
            block_hash: "0xblock".to_string(),
            required_confirmations: 12,
        }
    }

    #[test]
    fn test_new_deposit() {
        let d = Deposit::new(AggregateToken::new(), notice(), Decimal::new(3_000, 0));
        assert_eq!(d.state, DepositState::Detected);
        assert_eq!(d.version, 1);
        assert_eq!(d.confirmations, 0);
        assert!(d.credited_at.is_none());
    }

    #[test]
    fn test_sanctions_cleared() {
        let mut d = Deposit::new(AggregateToken::new(), notice(), Decimal::new(3_000, 0));
        assert!(!d.sanctions_cleared());
        d.sanctions_decision = Some(SanctionsDecision::Warned);
        assert!(d.sanctions_cleared());
        d.sanctions_decision = Some(SanctionsDecision::Blocked);
        assert!(!d.sanctions_cleared());
    }
}

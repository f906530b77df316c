//! Withdrawal State Definitions
//!
//! State IDs are designed for PostgreSQL storage as SMALLINT.
//! Terminal states: COMPLETED (40), FAILED (-10)

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::workflow::StateId;

/// Withdrawal workflow states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum WithdrawalState {
    /// Initial state - request recorded with a fixed quote, user
    /// confirmation hurdle outstanding
    AwaitingConfirmation = 0,

    /// Confirmation received - risk/sanctions screening pending
    Screening = 10,

    /// Risk engine returned Hold - manual approval hurdle outstanding
    AwaitingApproval = 20,

    /// Screening passed - funds are being frozen and the chain transaction
    /// broadcast (outbox side effect)
    Submitting = 30,

    /// Broadcast done - waiting for chain confirmations
    Confirming = 35,

    /// Terminal: debit finalized, withdrawal complete
    Completed = 40,

    /// Terminal: withdrawal failed or abandoned
    Failed = -10,
}

impl StateId for WithdrawalState {
    #[inline]
    fn id(&self) -> i16 {
        *self as i16
    }

    fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(WithdrawalState::AwaitingConfirmation),
            10 => Some(WithdrawalState::Screening),
            20 => Some(WithdrawalState::AwaitingApproval),
            30 => Some(WithdrawalState::Submitting),
            35 => Some(WithdrawalState::Confirming),
            40 => Some(WithdrawalState::Completed),
            -10 => Some(WithdrawalState::Failed),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            WithdrawalState::AwaitingConfirmation => "AWAITING_CONFIRMATION",
            WithdrawalState::Screening => "SCREENING",
            WithdrawalState::AwaitingApproval => "AWAITING_APPROVAL",
            WithdrawalState::Submitting => "SUBMITTING",
            WithdrawalState::Confirming => "CONFIRMING",
            WithdrawalState::Completed => "COMPLETED",
            WithdrawalState::Failed => "FAILED",
        }
    }

    #[inline]
    fn is_terminal(&self) -> bool {
        matches!(self, WithdrawalState::Completed | WithdrawalState::Failed)
    }
}

impl fmt::Display for WithdrawalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for WithdrawalState {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        WithdrawalState::from_id(value).ok_or(())
    }
}

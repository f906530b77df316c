//! Deposit State Definitions
//!
//! State IDs are designed for PostgreSQL storage as SMALLINT.
//! Terminal states: COMPLETED (40), FAILED (-10), BLOCKED (-20)

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::workflow::StateId;

/// Deposit workflow states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum DepositState {
    /// Initial state - incoming transaction detected on chain, sender
    /// screening pending
    Detected = 0,

    /// Sender cleared - waiting for chain confirmations
    Confirming = 20,

    /// Confirmations met - ledger credit in flight (outbox side effect)
    Crediting = 30,

    /// Terminal: funds credited
    Completed = 40,

    /// Terminal: deposit failed or abandoned
    Failed = -10,

    /// Terminal: sender blocked by sanctions, funds quarantined
    Blocked = -20,
}

impl StateId for DepositState {
    #[inline]
    fn id(&self) -> i16 {
        *self as i16
    }

    fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(DepositState::Detected),
            20 => Some(DepositState::Confirming),
            30 => Some(DepositState::Crediting),
            40 => Some(DepositState::Completed),
            -10 => Some(DepositState::Failed),
            -20 => Some(DepositState::Blocked),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            DepositState::Detected => "DETECTED",
            DepositState::Confirming => "CONFIRMING",
            DepositState::Crediting => "CREDITING",
            DepositState::Completed => "COMPLETED",
            DepositState::Failed => "FAILED",
            DepositState::Blocked => "BLOCKED",
        }
    }

    #[inline]
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            DepositState::Completed | DepositState::Failed | DepositState::Blocked
        )
    }
}

impl fmt::Display for DepositState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for DepositState {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        DepositState::from_id(value).ok_or(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(DepositState::Completed.is_terminal());
        assert!(DepositState::Failed.is_terminal());
        assert!(DepositState::Blocked.is_terminal());

        assert!(!DepositState::Detected.is_terminal());
        assert!(!DepositState::Confirming.is_terminal());
        assert!(!DepositState::Crediting.is_terminal());
    }

    #[test]
    fn test_state_id_roundtrip() {
        let states = [
            DepositState::Detected,
            DepositState::Confirming,
            DepositState::Crediting,
            DepositState::Completed,
            DepositState::Failed,
            DepositState::Blocked,
        ];

        for state in states {
            assert_eq!(DepositState::from_id(state.id()), Some(state));
        }
    }

    #[test]
    fn test_invalid_state_id() {
        assert!(DepositState::from_id(7).is_none());
        assert!(DepositState::from_id(-7).is_none());
    }
}

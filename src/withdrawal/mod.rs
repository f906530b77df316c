//! Withdrawal Workflow
//!
//! On-chain withdrawal of funds: user confirmation, risk/sanctions
//! screening, optional manual approval, broadcast and chain confirmation.
//!
//! # State Machine
//!
//! ```text
//! AWAITING_CONFIRMATION → SCREENING → SUBMITTING → CONFIRMING ⟲ → COMPLETED
//!                              ↓            ↑
//!                       AWAITING_APPROVAL ──┘
//!          (every non-terminal state may fail → FAILED)
//! ```

pub mod aggregate;
pub mod effects;
pub mod graph;
pub mod service;
pub mod state;
pub mod transitions;

// Re-exports for convenience
pub use aggregate::{Withdrawal, WithdrawalRequest};
pub use effects::WithdrawalEffects;
pub use graph::WITHDRAWAL_GRAPH;
pub use service::{WithdrawalService, sweeper_config};
pub use state::WithdrawalState;
pub use transitions::{WithdrawalLogic, confirmations, submitted};

//! Deposit Workflow
//!
//! Incoming on-chain funds: detection, sender sanctions screening, chain
//! confirmation counting and ledger credit.
//!
//! # State Machine
//!
//! ```text
//! DETECTED → CONFIRMING ⟲ → CREDITING → COMPLETED
//!     ↓
//!  BLOCKED
//! (non-terminal states may also fail → FAILED)
//! ```

pub mod aggregate;
pub mod effects;
pub mod graph;
pub mod service;
pub mod state;
pub mod transitions;


// Re-exports for convenience
pub use aggregate::{Deposit, DepositNotice};
pub use effects::DepositEffects;
pub use graph::DEPOSIT_GRAPH;
pub use service::{DepositService, sweeper_config};
pub use state::DepositState;
pub use transitions::{DepositLogic, confirmations, credited};

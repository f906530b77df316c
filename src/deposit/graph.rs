//! Deposit State Graph
//!
//! ```text
//! DETECTED → CONFIRMING ⟲ → CREDITING → COMPLETED
//!     ↓
//!  BLOCKED
//! (non-terminal states may also fail → FAILED)
//! ```
//!
//! Sender screening happens in the DETECTED step; CONFIRMING carries an
//! explicit self-loop for confirmation-count updates.

use once_cell::sync::Lazy;

use crate::clients::SanctionsDecision;
use crate::workflow::{Invariant, StateGraph};

use super::aggregate::Deposit;
use super::state::DepositState::*;

pub static DEPOSIT_GRAPH: Lazy<StateGraph<Deposit>> = Lazy::new(|| {
    StateGraph::new()
        .state(
            Detected,
            &[Confirming, Blocked, Failed],
            vec![
                Invariant::new("positive_amount", |d: &Deposit| {
                    d.amount > rust_decimal::Decimal::ZERO
                }),
                Invariant::new("tx_hash_recorded", |d: &Deposit| !d.tx_hash.is_empty()),
                Invariant::new("sender_recorded", |d: &Deposit| !d.sender_address.is_empty()),
            ],
        )
        .state(
            Confirming,
            &[Confirming, Crediting, Failed],
            vec![Invariant::new("sanctions_cleared", |d: &Deposit| d.sanctions_cleared())],
        )
        .state(
            Crediting,
            &[Completed, Failed],
            vec![Invariant::new("confirmations_met", |d: &Deposit| {
                d.confirmations >= d.required_confirmations
            })],
        )
        .state(
            Completed,
            &[],
            vec![Invariant::new("credit_recorded", |d: &Deposit| d.credited_at.is_some())],
        )
        .state(
            Failed,
            &[],
            vec![Invariant::new("failure_reason_recorded", |d: &Deposit| {
                d.failure_reason.is_some()
            })],
        )
        .state(
            Blocked,
            &[],
            vec![Invariant::new("sanctions_blocked", |d: &Deposit| {
                d.sanctions_decision == Some(SanctionsDecision::Blocked)
            })],
        )
        // Deprecated historical names still resolve
        .alias("SCREENING", Detected)
        .alias("FINALIZED", Crediting)
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        let g = &*DEPOSIT_GRAPH;
        assert!(g.can_transition(Detected, Confirming));
        assert!(g.can_transition(Detected, Blocked));
        assert!(g.can_transition(Confirming, Confirming));
        assert!(g.can_transition(Confirming, Crediting));
        assert!(g.can_transition(Crediting, Completed));

        assert!(!g.can_transition(Detected, Crediting));
        assert!(!g.can_transition(Blocked, Confirming));
        assert!(!g.can_transition(Completed, Failed));
        assert!(!g.can_transition(Confirming, Blocked));
    }

    #[test]
    fn test_reachability() {
        let g = &*DEPOSIT_GRAPH;
        assert!(g.reachable(Detected, Completed));
        assert!(g.reachable(Detected, Blocked));
        assert!(!g.reachable(Confirming, Blocked));
        assert!(!g.reachable(Completed, Detected));
        assert!(g.reachable(Blocked, Blocked));
    }

    #[test]
    fn test_states_between() {
        let g = &*DEPOSIT_GRAPH;
        let between = g.states_between(Detected, Completed);
        assert!(between.contains(&Detected));
        assert!(between.contains(&Confirming));
        assert!(between.contains(&Crediting));
        assert!(between.contains(&Completed));
        assert!(!between.contains(&Blocked));
        assert!(!between.contains(&Failed));
    }

    #[test]
    fn test_alias_lookup() {
        assert_eq!(DEPOSIT_GRAPH.lookup("SCREENING"), Some(Detected));
        assert_eq!(DEPOSIT_GRAPH.lookup("FINALIZED"), Some(Crediting));
        assert_eq!(DEPOSIT_GRAPH.lookup("CREDITING"), Some(Crediting));
    }
}

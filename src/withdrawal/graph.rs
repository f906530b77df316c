//! Withdrawal State Graph
//!
//! ```text
//! AWAITING_CONFIRMATION → SCREENING → SUBMITTING → CONFIRMING ⟲ → COMPLETED
//!                              ↓            ↑
//!                       AWAITING_APPROVAL ──┘
//!
//! (every non-terminal state may also fail → FAILED)
//! ```
//!
//! CONFIRMING carries an explicit self-loop: confirmation-count updates are
//! versioned writes with an unchanged state.

use once_cell::sync::Lazy;

use crate::workflow::{Invariant, StateGraph};

use super::aggregate::Withdrawal;
use super::state::WithdrawalState::*;

pub static WITHDRAWAL_GRAPH: Lazy<StateGraph<Withdrawal>> = Lazy::new(|| {
    StateGraph::new()
        .state(
            AwaitingConfirmation,
            &[Screening, Failed],
            vec![
                Invariant::new("positive_amount", |w: &Withdrawal| {
                    w.amount > rust_decimal::Decimal::ZERO
                }),
                Invariant::new("fee_not_negative", |w: &Withdrawal| {
                    w.fee >= rust_decimal::Decimal::ZERO && w.fee < w.amount
                }),
                Invariant::new("quote_recorded", |w: &Withdrawal| {
                    w.quote_usd > rust_decimal::Decimal::ZERO
                }),
            ],
        )
        .state(
            Screening,
            &[Submitting, AwaitingApproval, Failed],
            vec![
                Invariant::new("destination_recorded", |w: &Withdrawal| {
                    w.destination.is_some()
                }),
                Invariant::new("confirmation_recorded", |w: &Withdrawal| {
                    w.confirmed_at.is_some()
                }),
            ],
        )
        .state(
            AwaitingApproval,
            &[Submitting, Failed],
            vec![Invariant::new("risk_hold_recorded", |w: &Withdrawal| {
                w.risk_decision == Some(crate::clients::RiskDecision::Hold)
            })],
        )
        .state(
            Submitting,
            &[Confirming, Failed],
            vec![Invariant::new("screening_passed", |w: &Withdrawal| {
                w.screening_passed()
            })],
        )
        .state(
            Confirming,
            &[Confirming, Completed, Failed],
            vec![Invariant::new("tx_hash_recorded", |w: &Withdrawal| {
                w.tx_hash.is_some()
            })],
        )
        .state(
            Completed,
            &[],
            vec![Invariant::new("confirmations_met", |w: &Withdrawal| {
                w.confirmations >= w.required_confirmations
            })],
        )
        .state(
            Failed,
            &[],
            vec![Invariant::new("failure_reason_recorded", |w: &Withdrawal| {
                w.failure_reason.is_some()
            })],
        )
        // Deprecated historical names still resolve
        .alias("AWAITING_USER_CONFIRMATION", AwaitingConfirmation)
        .alias("RISK_REVIEW", Screening)
        .alias("BROADCASTING", Submitting)
});

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::StateId;

    #[test]
    fn test_legal_transitions() {
        let g = &*WITHDRAWAL_GRAPH;
        assert!(g.can_transition(AwaitingConfirmation, Screening));
        assert!(g.can_transition(Screening, Submitting));
        assert!(g.can_transition(Screening, AwaitingApproval));
        assert!(g.can_transition(AwaitingApproval, Submitting));
        assert!(g.can_transition(Submitting, Confirming));
        assert!(g.can_transition(Confirming, Confirming));
        assert!(g.can_transition(Confirming, Completed));

        assert!(!g.can_transition(AwaitingConfirmation, Submitting));
        assert!(!g.can_transition(Screening, Completed));
        assert!(!g.can_transition(Completed, Failed));
        assert!(!g.can_transition(Submitting, Submitting));
    }

    #[test]
    fn test_reachability() {
        let g = &*WITHDRAWAL_GRAPH;
        assert!(g.reachable(AwaitingConfirmation, Completed));
        assert!(g.reachable(AwaitingApproval, Completed));
        assert!(!g.reachable(Completed, AwaitingConfirmation));

        // reachable(s, s) is true for every state
        for state in g.states() {
            assert!(g.reachable(state, state), "{}", state);
        }

        // Terminal states reach nothing else
        for state in g.states() {
            if state.is_terminal() {
                for other in g.states() {
                    if other != state {
                        assert!(!g.reachable(state, other), "{} -> {}", state, other);
                    }
                }
            }
        }
    }

    #[test]
    fn test_states_between() {
        let g = &*WITHDRAWAL_GRAPH;
        let between = g.states_between(Screening, Completed);
        assert!(between.contains(&Screening));
        assert!(between.contains(&AwaitingApproval));
        assert!(between.contains(&Submitting));
        assert!(between.contains(&Confirming));
        assert!(between.contains(&Completed));
        // Failed cannot reach Completed, so it is never accumulated
        assert!(!between.contains(&Failed));
        assert!(!between.contains(&AwaitingConfirmation));

        assert!(g.states_between(Completed, Screening).is_empty());
    }

    #[test]
    fn test_name_lookup_with_aliases() {
        let g = &*WITHDRAWAL_GRAPH;
        assert_eq!(g.lookup("SCREENING"), Some(Screening));
        assert_eq!(g.lookup("RISK_REVIEW"), Some(Screening));
        assert_eq!(g.lookup("AWAITING_USER_CONFIRMATION"), Some(AwaitingConfirmation));
        assert_eq!(g.lookup("BROADCASTING"), Some(Submitting));
        assert_eq!(g.lookup("NOPE"), None);
    }
}

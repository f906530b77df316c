//! External Collaborator Interfaces
//!
//! Traits the workflow core calls: ledger, risk/sanctions/eligibility,
//! exchange rates, chain access and transition event publishing. Concrete
//! backends live outside this crate; side-effect implementations must be
//! idempotent per aggregate token because the outbox delivers
//! at-least-once.

pub mod chain;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::workflow::{AggregateToken, StateId, WorkflowAggregate};

pub use chain::ChainClient;

/// Collaborator error
#[derive(Debug, Error, Clone)]
pub enum ClientError {
    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Chain error: {0}")]
    Chain(String),

    #[error("Upstream unavailable: {0}")]
    Unavailable(String),
}

impl From<ClientError> for crate::workflow::EngineError {
    fn from(e: ClientError) -> Self {
        crate::workflow::EngineError::Effect(e.to_string())
    }
}

/// Risk engine evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskDecision {
    Approve,
    Hold,
    Block,
}

/// Sanctions screening result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SanctionsDecision {
    Checked,
    Warned,
    Blocked,
}

/// Eligibility check result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EligibilityDecision {
    Eligible,
    Ineligible,
}

/// Classification of a realized aggregate change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

/// Ledger operations invoked from side-effect dispatch, never from the
/// state-validation path.
///
/// All methods MUST be idempotent per token - calling twice with the same
/// token must have the same effect as calling once.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Create a pending ledger transaction (debit hold or credit)
    async fn create_transaction(
        &self,
        token: &AggregateToken,
        account_id: u64,
        asset: &str,
        amount: Decimal,
    ) -> Result<(), ClientError>;

    /// Finalize a previously created transaction
    async fn confirm_transaction(&self, token: &AggregateToken) -> Result<(), ClientError>;

    /// Void a previously created transaction, releasing any hold
    async fn void_transaction(&self, token: &AggregateToken) -> Result<(), ClientError>;

    /// Freeze funds on an account (withdrawal hold, deposit quarantine)
    async fn freeze_funds(
        &self,
        token: &AggregateToken,
        account_id: u64,
        asset: &str,
        amount: Decimal,
    ) -> Result<(), ClientError>;

    async fn get_balance(&self, account_id: u64, asset: &str) -> Result<Decimal, ClientError>;
}

/// Context handed to the risk engine
#[derive(Debug, Clone)]
pub struct RiskContext<'a> {
    pub account_id: u64,
    pub asset: &'a str,
    pub amount: Decimal,
    pub destination: Option<&'a str>,
}

#[async_trait]
pub trait RiskClient: Send + Sync {
    async fn evaluate(&self, ctx: &RiskContext<'_>) -> Result<RiskDecision, ClientError>;
}

#[async_trait]
pub trait SanctionsClient: Send + Sync {
    /// Screen a counterparty address
    async fn screen(&self, address: &str) -> Result<SanctionsDecision, ClientError>;
}

#[async_trait]
pub trait EligibilityClient: Send + Sync {
    async fn check(&self, account_id: u64, asset: &str)
    -> Result<EligibilityDecision, ClientError>;
}

/// Supplies a fixed quote at aggregate creation. The quote is stored on the
/// aggregate and never re-queried for the same aggregate.
#[async_trait]
pub trait ExchangeRateClient: Send + Sync {
    /// USD quote for one unit of `asset`
    async fn quote(&self, asset: &str) -> Result<Decimal, ClientError>;
}

/// Notified on every realized transition.
#[async_trait]
pub trait EventPublisher<A: WorkflowAggregate>: Send + Sync {
    async fn publish(&self, old: Option<&A>, new: &A, kind: ChangeKind);
}

/// Default publisher: structured log lines only.
pub struct TracingPublisher;

#[async_trait]
impl<A: WorkflowAggregate> EventPublisher<A> for TracingPublisher {
    async fn publish(&self, old: Option<&A>, new: &A, kind: ChangeKind) {
        tracing::info!(
            token = %new.token(),
            from = old.map(|a| a.state().as_str()).unwrap_or("-"),
            to = new.state().as_str(),
            kind = ?kind,
            version = new.version(),
            "Aggregate change published"
        );
    }
}

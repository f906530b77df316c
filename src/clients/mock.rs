//! Mock collaborators for tests
//!
//! Operation counters and configurable failure switches, mirroring the
//! behavior contracts of the real clients (idempotency per token included,
//! where tests need it).

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::workflow::{AggregateToken, WorkflowAggregate};

use super::{
    ChainClient, ChangeKind, ClientError, EligibilityClient, EligibilityDecision,
    EventPublisher, ExchangeRateClient, LedgerClient, RiskClient, RiskContext, RiskDecision,
    SanctionsClient, SanctionsDecision,
};

#[derive(Default)]
pub struct MockLedger {
    create_count: AtomicUsize,
    confirm_count: AtomicUsize,
    void_count: AtomicUsize,
    freeze_count: AtomicUsize,
    fail_freeze: Mutex<bool>,
    fail_create: Mutex<bool>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_freeze(&self, fail: bool) {
        *self.fail_freeze.lock().unwrap() = fail;
    }

    pub fn set_fail_create(&self, fail: bool) {
        *self.fail_create.lock().unwrap() = fail;
    }

    pub fn create_count(&self) -> usize {
        self.create_count.load(Ordering::SeqCst)
    }

    pub fn confirm_count(&self) -> usize {
        self.confirm_count.load(Ordering::SeqCst)
    }

    pub fn void_count(&self) -> usize {
        self.void_count.load(Ordering::SeqCst)
    }

    pub fn freeze_count(&self) -> usize {
        self.freeze_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn create_transaction(
        &self,
        _token: &AggregateToken,
        _account_id: u64,
        _asset: &str,
        _amount: Decimal,
    ) -> Result<(), ClientError> {
        if *self.fail_create.lock().unwrap() {
            return Err(ClientError::Ledger("mock create failure".to_string()));
        }
        self.create_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn confirm_transaction(&self, _token: &AggregateToken) -> Result<(), ClientError> {
        self.confirm_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn void_transaction(&self, _token: &AggregateToken) -> Result<(), ClientError> {
        self.void_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn freeze_funds(
        &self,
        _token: &AggregateToken,
        _account_id: u64,
        _asset: &str,
        _amount: Decimal,
    ) -> Result<(), ClientError> {
        if *self.fail_freeze.lock().unwrap() {
            return Err(ClientError::Ledger("mock freeze failure".to_string()));
        }
        self.freeze_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_balance(&self, _account_id: u64, _asset: &str) -> Result<Decimal, ClientError> {
        Ok(Decimal::new(1_000_000, 2))
    }
}

pub struct MockRisk {
    decision: Mutex<RiskDecision>,
    evaluate_count: AtomicUsize,
}

impl MockRisk {
    pub fn new(decision: RiskDecision) -> Self {
        Self { decision: Mutex::new(decision), evaluate_count: AtomicUsize::new(0) }
    }

    pub fn set_decision(&self, decision: RiskDecision) {
        *self.decision.lock().unwrap() = decision;
    }

    pub fn evaluate_count(&self) -> usize {
        self.evaluate_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RiskClient for MockRisk {
    async fn evaluate(&self, _ctx: &RiskContext<'_>) -> Result<RiskDecision, ClientError> {
        self.evaluate_count.fetch_add(1, Ordering::SeqCst);
        Ok(*self.decision.lock().unwrap())
    }
}

pub struct MockSanctions {
    decision: Mutex<SanctionsDecision>,
}

impl MockSanctions {
    pub fn new(decision: SanctionsDecision) -> Self {
        Self { decision: Mutex::new(decision) }
    }

    pub fn set_decision(&self, decision: SanctionsDecision) {
        *self.decision.lock().unwrap() = decision;
    }
}

#[async_trait]
impl SanctionsClient for MockSanctions {
    async fn screen(&self, _address: &str) -> Result<SanctionsDecision, ClientError> {
        Ok(*self.decision.lock().unwrap())
    }
}

pub struct MockEligibility;

#[async_trait]
impl EligibilityClient for MockEligibility {
    async fn check(
        &self,
        _account_id: u64,
        _asset: &str,
    ) -> Result<EligibilityDecision, ClientError> {
        Ok(EligibilityDecision::Eligible)
    }
}

pub struct MockRates {
    quote: Decimal,
}

impl MockRates {
    pub fn new(quote: Decimal) -> Self {
        Self { quote }
    }
}

#[async_trait]
impl ExchangeRateClient for MockRates {
    async fn quote(&self, _asset: &str) -> Result<Decimal, ClientError> {
        Ok(self.quote)
    }
}

#[derive(Default)]
pub struct MockChain {
    broadcast_count: AtomicUsize,
    fail_broadcast: Mutex<bool>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_broadcast(&self, fail: bool) {
        *self.fail_broadcast.lock().unwrap() = fail;
    }

    pub fn broadcast_count(&self) -> usize {
        self.broadcast_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for MockChain {
    fn validate_address(&self, address: &str) -> bool {
        address.starts_with("0x") && address.len() >= 10
    }

    async fn broadcast_withdrawal(
        &self,
        token: &str,
        _to: &str,
        _amount: &str,
    ) -> Result<String, ClientError> {
        if *self.fail_broadcast.lock().unwrap() {
            return Err(ClientError::Chain("mock broadcast failure".to_string()));
        }
        self.broadcast_count.fetch_add(1, Ordering::SeqCst);
        // Deterministic per token so re-broadcasts converge
        Ok(format!("0xtx{}", token.to_lowercase()))
    }
}

/// Publisher that records every notification for assertions
#[derive(Default)]
pub struct RecordingPublisher {
    changes: Mutex<Vec<(Option<String>, String, ChangeKind)>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changes(&self) -> Vec<(Option<String>, String, ChangeKind)> {
        self.changes.lock().unwrap().clone()
    }
}

#[async_trait]
impl<A: WorkflowAggregate> EventPublisher<A> for RecordingPublisher {
    async fn publish(&self, old: Option<&A>, new: &A, kind: ChangeKind) {
        use crate::workflow::StateId;
        self.changes.lock().unwrap().push((
            old.map(|a| a.state().as_str().to_string()),
            new.state().as_str().to_string(),
            kind,
        ));
    }
}

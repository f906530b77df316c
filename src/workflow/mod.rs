//! Transactional Workflow Engine
//!
//! Drives long-running financial transactions through a fixed state graph
//! with exactly-once side effects despite client retries, concurrent
//! requests and crash/restart.
//!
//! # Architecture
//!
//! ```text
//! execute(token, back_counter, responses)
//!     │
//!     ▼
//! Idempotency Engine ── duplicate? ──► cached outcome (replayed verbatim)
//!     │ fresh fingerprint
//!     ▼
//! Transition Logic ──► State Graph (successor set + invariants)
//!     │
//!     ▼
//! Versioned Store (aggregate CAS + transition event, one atomic unit)
//!     │
//!     ▼ (asynchronously)
//! Outbox Processor ──► side effects, in order, per-aggregate containment
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Invariants gate every write**: an aggregate is never stored in a
//!    state whose invariants are false on its data
//! 2. **Event-with-write atomicity**: the transition ledger and the
//!    aggregate state are never observed out of sync
//! 3. **Store-level serialization**: unique insert for the idempotency
//!    placeholder, version CAS for the aggregate; no in-process locks
//! 4. **In-order effects**: the outbox never advances past a gap in an
//!    aggregate's event chain

pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod graph;
pub mod idempotency;
pub mod memory;
pub mod outbox;
pub mod store;
pub mod sweeper;
pub mod types;


// Re-exports for convenience
pub use engine::{StepPlan, TransitionLogic, WorkflowEngine};
pub use error::EngineError;
pub use fingerprint::Fingerprint;
pub use graph::{Invariant, StateGraph};
pub use idempotency::{Handled, IdempotencyEngine};
pub use memory::MemoryStore;
pub use outbox::{BatchStats, EffectDispatcher, OutboxConfig, OutboxProcessor};
pub use store::{IdempotencyRecord, MAX_BATCH_LOOKUP, TransitionEvent, WorkflowStore};
pub use sweeper::{ABANDONED_REASON, StuckSweeper, SweepReport, SweeperConfig};
pub use types::{
    AggregateToken, Hurdle, HurdleResponses, Outcome, ResumeResult, SearchFilter, StateId,
    WorkflowAggregate, now_ms,
};

//! Workflow Core Types
//!
//! Shared type definitions for the workflow engine: aggregate tokens,
//! state descriptors, hurdles and transition outcomes.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Aggregate token - ULID-based unique identifier
///
/// Using ULID provides:
/// - Monotonic, sortable IDs
/// - No coordination needed (no machine_id)
/// - 128-bit with good entropy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AggregateToken(ulid::Ulid);

impl AggregateToken {
    /// Generate a new unique AggregateToken
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Get the inner ULID value
    pub fn inner(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for AggregateToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AggregateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AggregateToken {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// A workflow state descriptor.
///
/// Implemented by the per-transaction-type `#[repr(i16)]` state enums.
/// State IDs are designed for PostgreSQL storage as SMALLINT.
pub trait StateId:
    Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Get the numeric state ID for storage
    fn id(&self) -> i16;

    /// Convert from a stored state ID
    fn from_id(id: i16) -> Option<Self>;

    /// Get human-readable state name
    fn as_str(&self) -> &'static str;

    /// Check if this is a terminal state (no more transitions possible)
    fn is_terminal(&self) -> bool;
}

/// The transaction instance driven through the state graph.
///
/// Aggregates are mutated only through validated transitions and are never
/// deleted; terminal aggregates are retained for audit.
pub trait WorkflowAggregate:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type State: StateId;

    fn token(&self) -> AggregateToken;
    fn state(&self) -> Self::State;
    fn set_state(&mut self, state: Self::State);

    /// Monotonically increasing version used for optimistic concurrency
    fn version(&self) -> i64;
    fn set_version(&mut self, version: i64);

    fn created_at(&self) -> i64;
    fn updated_at(&self) -> i64;
    fn touch(&mut self, now_ms: i64);

    fn failure_reason(&self) -> Option<&str>;
    fn set_failure_reason(&mut self, reason: Option<String>);
}

/// A unit of required user/system input that must be supplied before a
/// transition can proceed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hurdle {
    /// Hurdle name, matched against the response key on the next call
    pub name: String,
    /// Parameters shown to the caller (amounts, prompts, quotes)
    pub params: serde_json::Value,
}

impl Hurdle {
    pub fn new(name: impl Into<String>, params: serde_json::Value) -> Self {
        Self { name: name.into(), params }
    }
}

/// Hurdle responses supplied by the caller, keyed by hurdle name.
///
/// A BTreeMap keeps key order stable so the idempotency fingerprint is
/// deterministic regardless of caller-side ordering.
pub type HurdleResponses = BTreeMap<String, serde_json::Value>;

/// Successful result of a workflow operation, returned to the caller and
/// cached by the idempotency layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub token: AggregateToken,
    /// State name after the operation
    pub state: String,
    /// Numeric state ID after the operation
    pub state_id: i16,
    /// Aggregate version after the operation
    pub version: i64,
    /// Follow-up hurdles requiring further input, if any
    pub hurdles: Vec<Hurdle>,
}

/// Result handed to `resume` by an external completion (chain watcher,
/// side-effect dispatch). The `kind` selects the transition logic branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeResult {
    pub kind: String,
    pub data: serde_json::Value,
}

impl ResumeResult {
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self { kind: kind.into(), data }
    }
}

/// Filter for aggregate searches.
#[derive(Debug, Clone)]
pub struct SearchFilter<S> {
    /// Match aggregates in any of these states; empty means all states
    pub states: Vec<S>,
    /// Only aggregates last updated strictly before this instant (millis)
    pub updated_before: Option<i64>,
    /// Maximum rows returned
    pub limit: usize,
}

impl<S> SearchFilter<S> {
    pub fn states(states: Vec<S>) -> Self {
        Self { states, updated_before: None, limit: 100 }
    }

    pub fn updated_before(mut self, cutoff_ms: i64) -> Self {
        self.updated_before = Some(cutoff_ms);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

impl<S> Default for SearchFilter<S> {
    fn default() -> Self {
        Self { states: Vec::new(), updated_before: None, limit: 100 }
    }
}

/// Get current timestamp in milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

//! State Graph
//!
//! Declares the finite state set for a transaction type as data: each state
//! carries its permitted successor set and an ordered invariant list. The
//! graph is a process-wide singleton built once at startup; transition
//! validation and reachability queries are plain data-graph algorithms, no
//! virtual dispatch.

use std::collections::{HashSet, VecDeque};

use rustc_hash::FxHashMap;

use super::error::EngineError;
use super::types::{StateId, WorkflowAggregate};

/// A named predicate over the aggregate that must hold before the aggregate
/// may occupy the owning state.
pub struct Invariant<A> {
    pub name: &'static str,
    pub check: fn(&A) -> bool,
}

impl<A> Invariant<A> {
    pub fn new(name: &'static str, check: fn(&A) -> bool) -> Self {
        Self { name, check }
    }
}

struct StateNode<A: WorkflowAggregate> {
    successors: Vec<A::State>,
    invariants: Vec<Invariant<A>>,
}

/// Directed state graph for one transaction type.
///
/// Terminal states have an empty successor set. Self-loops must be declared
/// explicitly; a state is never implicitly its own successor.
pub struct StateGraph<A: WorkflowAggregate> {
    nodes: FxHashMap<A::State, StateNode<A>>,
    /// Static name registration table, including alias entries for
    /// deprecated historical names.
    names: FxHashMap<&'static str, A::State>,
}

impl<A: WorkflowAggregate> StateGraph<A> {
    pub fn new() -> Self {
        Self { nodes: FxHashMap::default(), names: FxHashMap::default() }
    }

    /// Register a state with its successor set and invariants.
    pub fn state(
        mut self,
        state: A::State,
        successors: &[A::State],
        invariants: Vec<Invariant<A>>,
    ) -> Self {
        self.names.insert(state.as_str(), state);
        self.nodes.insert(state, StateNode { successors: successors.to_vec(), invariants });
        self
    }

    /// Register an alias entry for a deprecated historical name.
    pub fn alias(mut self, name: &'static str, state: A::State) -> Self {
        self.names.insert(name, state);
        self
    }

    /// Look up a state by registered name or alias.
    pub fn lookup(&self, name: &str) -> Option<A::State> {
        self.names.get(name).copied()
    }

    /// True iff `to` is in `from`'s declared successor set.
    pub fn can_transition(&self, from: A::State, to: A::State) -> bool {
        self.nodes
            .get(&from)
            .map(|node| node.successors.contains(&to))
            .unwrap_or(false)
    }

    /// Evaluate every invariant of `state` against the aggregate, failing
    /// with the first unmet invariant.
    pub fn check_invariants(&self, state: A::State, aggregate: &A) -> Result<(), EngineError> {
        let node = self.nodes.get(&state).ok_or_else(|| {
            EngineError::Validation(format!("unknown state: {}", state))
        })?;

        for invariant in &node.invariants {
            if !(invariant.check)(aggregate) {
                return Err(EngineError::PreconditionFailed {
                    state: state.as_str().to_string(),
                    invariant: invariant.name.to_string(),
                });
            }
        }

        Ok(())
    }

    /// True iff `to` can be reached from `from` over successor edges.
    ///
    /// Forward BFS; revisited states are not re-expanded, so the traversal
    /// terminates on graphs with converging paths. `reachable(s, s)` is
    /// always true.
    pub fn reachable(&self, from: A::State, to: A::State) -> bool {
        if from == to {
            return true;
        }

        let mut visited: HashSet<A::State> = HashSet::new();
        let mut queue: VecDeque<A::State> = VecDeque::new();
        queue.push_back(from);
        visited.insert(from);

        while let Some(state) = queue.pop_front() {
            let Some(node) = self.nodes.get(&state) else { continue };
            for &next in &node.successors {
                if next == to {
                    return true;
                }
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        false
    }

    /// Enumerate every state on some path from `from` to `to`, endpoints
    /// included. Branches that cannot reach the target are not extended.
    /// Empty for disjoint or backward queries.
    pub fn states_between(&self, from: A::State, to: A::State) -> Vec<A::State> {
        if !self.reachable(from, to) {
            return Vec::new();
        }

        let mut result = Vec::new();
        let mut visited: HashSet<A::State> = HashSet::new();
        let mut queue: VecDeque<A::State> = VecDeque::new();
        queue.push_back(from);
        visited.insert(from);

        while let Some(state) = queue.pop_front() {
            if !self.reachable(state, to) {
                continue;
            }
            result.push(state);
            if state == to {
                continue;
            }
            let Some(node) = self.nodes.get(&state) else { continue };
            for &next in &node.successors {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        result
    }

    /// All registered states.
    pub fn states(&self) -> Vec<A::State> {
        self.nodes.keys().copied().collect()
    }
}

impl<A: WorkflowAggregate> Default for StateGraph<A> {
    fn default() -> Self {
        Self::new()
    }
}

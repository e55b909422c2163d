//! Aggregate traits: the decide/evolve split used by the ledger.

use crate::error::{DomainError, DomainResult};

/// Aggregate root marker + minimal interface.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Monotonically increasing version of the aggregate's state.
    ///
    /// The ledger bumps this once per applied event.
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation checked when a change set is committed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (item creation).
    Any,
    /// Require the stored aggregate to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}

/// Aggregate execution semantics (pure, deterministic).
///
/// - **Decision logic**: `handle(&self, cmd)` returns events and never mutates.
/// - **State mutation**: `apply(&mut self, event)` evolves state.
///
/// Because decisions are computed against an immutable snapshot, a caller can
/// apply the decided events to a clone, inspect the resulting state, and only
/// then persist anything.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    /// Evolve in-memory state from a single event.
    fn apply(&mut self, event: &Self::Event);

    /// Decide which events to emit given the current state and a command.
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}

//! # Update Sequences
//!
//! Monotonic counters used to decide whether cached results are still valid
//! without re-deriving them.
//!
//! Each graph type has its own counter, held in an `UpdateRegistry` owned by
//! the `SceneGraph`. Every topology or transition mutation in that graph type
//! bumps the counter; caches record the value they were computed and verified
//! at, and compare against it later.

use crate::GraphType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A point in the mutation history of one graph type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct UpdateSeq(pub u64);

impl UpdateSeq {
    /// The value before any mutation happened.
    pub const INITIAL: Self = Self(0);

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

/// Per-graph-type sequence counters.
#[derive(Debug, Clone, Default)]
pub struct UpdateRegistry {
    counters: BTreeMap<GraphType, UpdateSeq>,
}

impl UpdateRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The latest sequence issued for `graph_type`.
    #[must_use]
    pub fn current(&self, graph_type: GraphType) -> UpdateSeq {
        self.counters
            .get(&graph_type)
            .copied()
            .unwrap_or(UpdateSeq::INITIAL)
    }

    /// Advance the counter for `graph_type` and return the new value.
    pub fn bump(&mut self, graph_type: GraphType) -> UpdateSeq {
        let slot = self.counters.entry(graph_type).or_default();
        *slot = slot.next();
        *slot
    }
}

// =============================================================================
// TESTS
// =============================================================================

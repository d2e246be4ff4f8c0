//! # Arc Chains
//!
//! The path of arcs taken from a traversal start down to the current node.
//! Chains share their prefix: `push` returns a new chain whose tail points
//! at the old one, so siblings extending the same parent chain never copy
//! it.
//!
//! A chain also addresses one specific instance of an instanced node, which
//! is how the wrt resolver is told which parent to take.

use crate::ArcId;
use std::rc::Rc;

#[derive(Debug, PartialEq, Eq)]
struct Link {
    arc: ArcId,
    prev: Option<Rc<Link>>,
}

/// Persistent singly linked list of arcs, newest last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArcChain {
    head: Option<Rc<Link>>,
    len: usize,
}

impl ArcChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A chain listing `arcs` from the top down.
    pub fn from_arcs<I: IntoIterator<Item = ArcId>>(arcs: I) -> Self {
        arcs.into_iter().fold(Self::new(), |chain, arc| chain.push(arc))
    }

    /// Extend by one arc. `self` is left untouched.
    #[must_use]
    pub fn push(&self, arc: ArcId) -> Self {
        Self {
            head: Some(Rc::new(Link {
                arc,
                prev: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    /// The chain without its last arc.
    #[must_use]
    pub fn parent_chain(&self) -> Self {
        match &self.head {
            Some(link) => Self {
                head: link.prev.clone(),
                len: self.len - 1,
            },
            None => Self::new(),
        }
    }

    /// The most recently pushed arc.
    #[must_use]
    pub fn last(&self) -> Option<ArcId> {
        self.head.as_ref().map(|link| link.arc)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Arcs from the newest back toward the start.
    pub fn iter(&self) -> impl Iterator<Item = ArcId> + '_ {
        std::iter::successors(self.head.as_deref(), |link| link.prev.as_deref()).map(|link| link.arc)
    }

    #[must_use]
    pub fn contains(&self, arc: ArcId) -> bool {
        self.iter().any(|a| a == arc)
    }

    /// Arcs from the start down to the newest.
    #[must_use]
    pub fn to_vec(&self) -> Vec<ArcId> {
        let mut arcs: Vec<ArcId> = self.iter().collect();
        arcs.reverse();
        arcs
    }

    /// Whether both chains hold the very same links (not just equal arcs).
    #[must_use]
    pub fn shares_storage(&self, other: &Self) -> bool {
        match (&self.head, &other.head) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

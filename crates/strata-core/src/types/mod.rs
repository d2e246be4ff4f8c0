//! # Core Type Definitions
//!
//! This module contains the identifiers and the error type shared by every
//! part of the engine:
//! - Arena handles (`NodeId`, `ArcId`)
//! - Graph membership (`GraphType`)
//! - Transition slot keys (`TransitionKind`, `TransitionFamily`)
//! - Error types (`StrataError`)
//!
//! All identifiers implement `Ord` so they can key `BTreeMap`/`BTreeSet`
//! containers and iterate in a deterministic order.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

// =============================================================================
// ARENA HANDLES
// =============================================================================

/// Handle of a node in a `SceneGraph` arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Handle of an arc (directed parent -> child edge) in a `SceneGraph` arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArcId(pub u64);

// =============================================================================
// GRAPH TYPE
// =============================================================================

/// Identifies one of the independent graphs a node can take part in.
///
/// A node keeps a separate set of parent and child arcs for every graph type
/// it belongs to, up to `primitives::MAX_NODE_GRAPHS` at a time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct GraphType(pub u16);

impl GraphType {
    /// The render graph: the one traversed to draw a frame.
    pub const RENDER: Self = Self(0);
    /// The data graph: data-flow wiring between nodes (input devices, drivers).
    pub const DATA: Self = Self(1);

    #[must_use]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }
}

impl fmt::Display for GraphType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::RENDER => f.write_str("render"),
            Self::DATA => f.write_str("data"),
            Self(other) => write!(f, "graph-{}", other),
        }
    }
}

// =============================================================================
// TRANSITION KINDS
// =============================================================================

/// The payload family of a transition or attribute.
///
/// Two transitions can only be composed when they belong to the same family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TransitionFamily {
    /// Binary capability: on with a value, off, or no change.
    OnOff,
    /// Always in some state; only the value changes.
    On,
    /// Set-valued: per-property on/off plus a default direction.
    Multi,
    /// 4x4 transform matrix.
    Matrix,
    /// Bit mask folded in with and/or masks.
    BitMask,
    /// Non-accumulating, side-effecting during traversal.
    Immediate,
}

impl fmt::Display for TransitionFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::OnOff => "on-off",
            Self::On => "on",
            Self::Multi => "multi",
            Self::Matrix => "matrix",
            Self::BitMask => "bit-mask",
            Self::Immediate => "immediate",
        };
        f.write_str(name)
    }
}

/// Stable key of a transition slot in a `TransitionSet` or `AttributeSet`.
///
/// Built-in kinds below `FIRST_CUSTOM` have a fixed expected family. Custom
/// kinds accept any family; mixing families under one custom kind is caught
/// when the transitions are composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransitionKind(pub u16);

impl TransitionKind {
    pub const TRANSFORM: Self = Self(1);
    pub const TEXTURE: Self = Self(2);
    pub const COLOR: Self = Self(3);
    pub const FOG: Self = Self(4);
    pub const RENDER_MODE: Self = Self(5);
    pub const LIGHT: Self = Self(6);
    pub const CLIP_PLANE: Self = Self(7);
    pub const DRAW_MASK: Self = Self(8);
    pub const BILLBOARD: Self = Self(9);

    /// First identifier available to `custom` kinds.
    pub const FIRST_CUSTOM: u16 = 256;

    /// A user-defined kind. Ids are offset past the built-in range.
    #[must_use]
    pub const fn custom(id: u16) -> Self {
        Self(Self::FIRST_CUSTOM.saturating_add(id))
    }

    #[must_use]
    pub const fn is_custom(self) -> bool {
        self.0 >= Self::FIRST_CUSTOM
    }

    /// The family a built-in kind must carry, `None` for custom kinds.
    #[must_use]
    pub const fn expected_family(self) -> Option<TransitionFamily> {
        match self {
            Self::TRANSFORM => Some(TransitionFamily::Matrix),
            Self::TEXTURE | Self::COLOR | Self::FOG => Some(TransitionFamily::OnOff),
            Self::RENDER_MODE => Some(TransitionFamily::On),
            Self::LIGHT | Self::CLIP_PLANE => Some(TransitionFamily::Multi),
            Self::DRAW_MASK => Some(TransitionFamily::BitMask),
            Self::BILLBOARD => Some(TransitionFamily::Immediate),
            _ => None,
        }
    }

    #[must_use]
    pub fn name(self) -> Cow<'static, str> {
        match self {
            Self::TRANSFORM => Cow::Borrowed("transform"),
            Self::TEXTURE => Cow::Borrowed("texture"),
            Self::COLOR => Cow::Borrowed("color"),
            Self::FOG => Cow::Borrowed("fog"),
            Self::RENDER_MODE => Cow::Borrowed("render-mode"),
            Self::LIGHT => Cow::Borrowed("light"),
            Self::CLIP_PLANE => Cow::Borrowed("clip-plane"),
            Self::DRAW_MASK => Cow::Borrowed("draw-mask"),
            Self::BILLBOARD => Cow::Borrowed("billboard"),
            Self(id) if id >= Self::FIRST_CUSTOM => {
                Cow::Owned(format!("custom-{}", id - Self::FIRST_CUSTOM))
            }
            Self(id) => Cow::Owned(format!("kind-{}", id)),
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Strata engine.
///
/// - No silent failures
/// - Use `Result<T, StrataError>` for fallible operations
/// - The engine never panics; precondition violations are reported here
#[derive(Debug, Error)]
pub enum StrataError {
    /// The requested node does not exist in the arena.
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeId),

    /// The requested arc does not exist in the arena.
    #[error("Arc not found: {0:?}")]
    ArcNotFound(ArcId),

    /// A child or parent index was past the end of the list.
    #[error("Index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// Attach was called on an arc that is already attached.
    #[error("Arc already attached: {0:?}")]
    ArcAlreadyAttached(ArcId),

    /// An operation needed an attached arc.
    #[error("Arc not attached: {0:?}")]
    ArcNotAttached(ArcId),

    /// An attached arc must be detached before it can be deleted.
    #[error("Arc still attached: {0:?}")]
    ArcStillAttached(ArcId),

    /// A node with parent arcs cannot be destroyed.
    #[error("Node still attached to a parent: {0:?}")]
    NodeStillAttached(NodeId),

    /// The node already belongs to the maximum number of graph types.
    #[error(
        "Attempt to attach {node:?} simultaneously to more than {max} different graph types (requested {graph_type})"
    )]
    GraphCapacityExceeded {
        node: NodeId,
        graph_type: GraphType,
        max: usize,
    },

    /// The arc would make a node its own ancestor.
    #[error("Attaching {child:?} below {parent:?} would create a cycle")]
    CycleDetected { parent: NodeId, child: NodeId },

    /// Two transitions (or a transition and an attribute) of different
    /// families were combined.
    #[error("Transition mismatch on {kind}: expected {expected}, found {found}")]
    TransitionMismatch {
        kind: TransitionKind,
        expected: TransitionFamily,
        found: TransitionFamily,
    },

    /// The transition has no inverse (off state, singular matrix, immediate).
    #[error("Transition {0} is not invertible")]
    NotInvertible(TransitionKind),

    /// wrt reached a multi-parented node with no matching disambiguator
    /// while `ambiguous-wrt-abort` is set.
    #[error("Ambiguous wrt at instanced node {node:?} in {graph_type} graph")]
    AmbiguousWrt { node: NodeId, graph_type: GraphType },

    /// The two wrt endpoints live under different roots.
    #[error("No common ancestor between {from:?} and {to:?}")]
    NoCommonAncestor { from: NodeId, to: NodeId },

    /// Cached and uncached wrt disagreed under `paranoid-wrt`.
    #[error("Cached wrt disagrees with uncached wrt from {from:?} to {to:?}")]
    CacheInconsistency { from: NodeId, to: NodeId },

    /// A child arc list lost its sort order (reported under `paranoid-graph`).
    #[error("Child arc list of {0:?} is not sorted")]
    UnsortedArcList(NodeId),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// A configuration value could not be parsed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

// =============================================================================
// TESTS
// =============================================================================

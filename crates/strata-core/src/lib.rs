//! # strata-core
//!
//! The scene-graph state engine for Strata.
//!
//! A scene is a directed acyclic graph of nodes joined by sorted arcs. Each
//! arc carries a set of transitions (transform, texture, lighting and so
//! on) that modify the state accumulated on the way down from a root. The
//! engine provides:
//! - The transition algebra: compose, invert, apply
//! - The arena graph with instancing and per-graph-type connections
//! - `wrt`: the relative state between any two nodes, cached per subtree
//! - Depth-first traversal through a `Visitor`
//! - `GraphReducer`: offline flattening of redundant structure
//! - A binary snapshot format
//!
//! ## Architectural Constraints
//!
//! - No async, no I/O, no network dependencies (pure Rust)
//! - Every `SceneGraph` owns its configuration and update counters; there is
//!   no process-wide state
//! - Precondition violations are reported as `StrataError`, never as panics

// =============================================================================
// MODULES
// =============================================================================

pub mod arc_chain;
pub mod attribute;
pub mod billboard;
pub mod bounds;
pub mod cache;
pub mod collect;
pub mod config;
pub mod formats;
pub mod graph;
pub mod primitives;
pub mod reducer;
pub mod transition;
pub mod transition_set;
pub mod traverse;
pub mod types;
pub mod update_seq;
pub mod wrapper;
pub mod wrt;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{ArcId, GraphType, NodeId, StrataError, TransitionFamily, TransitionKind};

// =============================================================================
// RE-EXPORTS: Transition Algebra
// =============================================================================

pub use attribute::{Attribute, AttributeSet, AttributeValue, StateGuardian};
pub use cache::{CacheEntry, TransitionCache};
pub use transition::{
    BillboardParams, BitMask, Direction, FogParams, ImmediateEffect, MultiAttribute,
    MultiTransition, OnOff, StateValue, Transition, TransitionValue,
};
pub use transition_set::TransitionSet;
pub use update_seq::{UpdateRegistry, UpdateSeq};

// =============================================================================
// RE-EXPORTS: Scene Graph
// =============================================================================

pub use arc_chain::ArcChain;
pub use bounds::BoundingVolume;
pub use collect::{CollectedState, StateCollector};
pub use config::GraphConfig;
pub use graph::{ArcData, Connection, NodeData, NodeKind, SceneGraph};
pub use reducer::GraphReducer;
pub use traverse::{SubRender, TraversalContext, TraversalStart, Visitor, df_traverse};
pub use wrapper::{
    AllTransitionsWrapper, NullTransitionWrapper, TransformAttribute, TransformWrapper,
    TransitionWrapper,
};

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{SnapshotHeader, scene_from_bytes, scene_to_bytes};

//! # State Collection
//!
//! `StateCollector` is the ready-made visitor a renderer would drive: it
//! records the fully resolved `AttributeSet` of every node it reaches, once
//! per path, so an instanced node shows up once for each of its instances.

use crate::arc_chain::ArcChain;
use crate::attribute::AttributeSet;
use crate::graph::SceneGraph;
use crate::traverse::{TraversalContext, TraversalStart, Visitor, df_traverse};
use crate::wrapper::AllTransitionsWrapper;
use crate::{GraphType, NodeId, StrataError};

/// Resolved state at one instance of a node.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedState {
    pub node: NodeId,
    /// Arcs leading from the traversal start to this instance.
    pub chain: ArcChain,
    pub attrs: AttributeSet,
}

#[derive(Debug, Clone, Default)]
pub struct StateCollector {
    camera: Option<NodeId>,
    states: Vec<CollectedState>,
}

impl StateCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Collector that turns billboards toward `camera`.
    #[must_use]
    pub fn with_camera(camera: NodeId) -> Self {
        Self {
            camera: Some(camera),
            states: Vec::new(),
        }
    }

    /// Traverse from `root` and return every reached instance, in
    /// traversal order. States from an earlier call are replaced; the
    /// collector stays queryable through `states` and `states_of`.
    pub fn collect(
        &mut self,
        graph: &SceneGraph,
        root: NodeId,
        graph_type: GraphType,
    ) -> Result<&[CollectedState], StrataError> {
        self.states.clear();
        df_traverse::<AllTransitionsWrapper, (), _>(
            graph,
            TraversalStart::Node(root),
            self,
            AttributeSet::new(),
            (),
            graph_type,
        )?;
        Ok(&self.states)
    }

    /// Hand over the recorded states, leaving the collector empty.
    #[must_use]
    pub fn into_states(self) -> Vec<CollectedState> {
        self.states
    }

    #[must_use]
    pub fn states(&self) -> &[CollectedState] {
        &self.states
    }

    /// Every recorded instance of `node`.
    pub fn states_of(&self, node: NodeId) -> impl Iterator<Item = &CollectedState> {
        self.states.iter().filter(move |s| s.node == node)
    }
}

impl Visitor<AllTransitionsWrapper, ()> for StateCollector {
    fn reached_node(
        &mut self,
        ctx: &TraversalContext<'_>,
        node: NodeId,
        attrs: &AttributeSet,
        _level: &mut (),
    ) -> Result<bool, StrataError> {
        self.states.push(CollectedState {
            node,
            chain: ctx.chain.clone(),
            attrs: attrs.clone(),
        });
        Ok(true)
    }

    fn camera(&self) -> Option<NodeId> {
        self.camera
    }
}

// =============================================================================
// TESTS
// =============================================================================

//! # Depth-First Traversal
//!
//! Walks one graph type depth-first from a node or an arc, threading two
//! kinds of state down the recursion:
//!
//! - the accumulated transition state, as a `TransitionWrapper` and its
//!   resolved attributes;
//! - a caller-defined level state `L`, cloned for every child so siblings
//!   never see each other's changes.
//!
//! For every arc, in the parent's sort order:
//!
//! 1. each immediate effect on the arc goes to `Visitor::sub_render`, which
//!    may adjust the outgoing transition or intercept the subtree;
//! 2. the arc's transition is applied to the incoming attributes;
//! 3. `forward_arc` may veto the descent;
//! 4. the child is reached (`reached_node`, then `node_sub_render` for
//!    intercepting node kinds), and its arcs are walked;
//! 5. `backward_arc` runs on the way back up.
//!
//! Traversal is synchronous; a visitor that wants to stop everything keeps
//! a flag in its level state or in itself and returns `false` everywhere.

use crate::arc_chain::ArcChain;
use crate::billboard::billboard_rotation;
use crate::graph::SceneGraph;
use crate::transition::ImmediateEffect;
use crate::wrapper::TransitionWrapper;
use crate::{ArcId, GraphType, NodeId, StrataError};
use tracing::trace;

/// Where a traversal begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalStart {
    Node(NodeId),
    /// Start by crossing this arc, then continue below its child.
    Arc(ArcId),
}

/// Outcome of an interception hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubRender {
    /// Carry on with the normal traversal.
    Continue,
    /// The visitor handled the subtree itself; skip it.
    Intercepted,
}

/// Read-only view handed to every visitor hook.
#[derive(Debug, Clone, Copy)]
pub struct TraversalContext<'a> {
    pub graph: &'a SceneGraph,
    pub graph_type: GraphType,
    /// Arcs crossed from the start down to the current position.
    pub chain: &'a ArcChain,
}

/// Hooks called by `df_traverse`. Every hook has a permissive default.
#[allow(unused_variables)]
pub trait Visitor<W: TransitionWrapper, L: Clone> {
    /// A node was reached with `attrs` in effect; `false` skips its arcs.
    fn reached_node(
        &mut self,
        ctx: &TraversalContext<'_>,
        node: NodeId,
        attrs: &W::Attributes,
        level: &mut L,
    ) -> Result<bool, StrataError> {
        Ok(true)
    }

    /// About to descend through `arc`; `false` skips the subtree.
    fn forward_arc(
        &mut self,
        ctx: &TraversalContext<'_>,
        arc: ArcId,
        trans: &W,
        pre: &W::Attributes,
        post: &W::Attributes,
        level: &mut L,
    ) -> Result<bool, StrataError> {
        Ok(true)
    }

    /// Back from the subtree below `arc`.
    fn backward_arc(
        &mut self,
        ctx: &TraversalContext<'_>,
        arc: ArcId,
        trans: &W,
        pre: &W::Attributes,
        post: &W::Attributes,
        level: &mut L,
    ) -> Result<(), StrataError> {
        Ok(())
    }

    /// An immediate effect on `arc`. `trans` is the outgoing transition and
    /// may be modified.
    ///
    /// The default turns billboards toward `camera()` and ignores custom
    /// effects.
    fn sub_render(
        &mut self,
        ctx: &TraversalContext<'_>,
        arc: ArcId,
        effect: &ImmediateEffect,
        attrs: &W::Attributes,
        trans: &mut W,
    ) -> Result<SubRender, StrataError> {
        if let (ImmediateEffect::Billboard(params), Some(camera)) = (effect, self.camera()) {
            let rotate = billboard_rotation(ctx.graph, camera, arc, ctx.chain, params)?;
            *trans = trans.compose_transform(rotate)?;
        }
        Ok(SubRender::Continue)
    }

    /// A node whose kind intercepts traversal was reached.
    fn node_sub_render(
        &mut self,
        ctx: &TraversalContext<'_>,
        node: NodeId,
        attrs: &W::Attributes,
        level: &mut L,
    ) -> Result<SubRender, StrataError> {
        Ok(SubRender::Continue)
    }

    /// Viewpoint for camera-dependent effects.
    fn camera(&self) -> Option<NodeId> {
        None
    }
}

struct Traverser<'g, 'v, V> {
    graph: &'g SceneGraph,
    graph_type: GraphType,
    visitor: &'v mut V,
}

impl<V> Traverser<'_, '_, V> {
    fn visit_node<W, L>(
        &mut self,
        node: NodeId,
        attrs: &W::Attributes,
        mut level: L,
        chain: &ArcChain,
    ) -> Result<(), StrataError>
    where
        W: TransitionWrapper,
        L: Clone,
        V: Visitor<W, L>,
    {
        let graph = self.graph;
        let ctx = TraversalContext {
            graph,
            graph_type: self.graph_type,
            chain,
        };
        trace!(node = node.0, depth = chain.len(), "reached node");
        if !self.visitor.reached_node(&ctx, node, attrs, &mut level)? {
            return Ok(());
        }
        if graph.node(node)?.kind().has_sub_render()
            && self.visitor.node_sub_render(&ctx, node, attrs, &mut level)? == SubRender::Intercepted
        {
            trace!(node = node.0, "node intercepted");
            return Ok(());
        }
        for arc in graph.children(node, self.graph_type)? {
            self.visit_arc::<W, L>(*arc, attrs, &level, chain)?;
        }
        Ok(())
    }

    fn visit_arc<W, L>(
        &mut self,
        arc: ArcId,
        attrs: &W::Attributes,
        level: &L,
        chain: &ArcChain,
    ) -> Result<(), StrataError>
    where
        W: TransitionWrapper,
        L: Clone,
        V: Visitor<W, L>,
    {
        let graph = self.graph;
        let data = graph.arc(arc)?;
        if data.graph_type() != self.graph_type {
            return Ok(());
        }
        let chain = chain.push(arc);
        let ctx = TraversalContext {
            graph,
            graph_type: self.graph_type,
            chain: &chain,
        };

        let mut trans = W::from_set(data.transitions());
        for (_, effect) in data.transitions().sub_render_effects() {
            if self.visitor.sub_render(&ctx, arc, effect, attrs, &mut trans)? == SubRender::Intercepted {
                trace!(arc = arc.0, "arc intercepted");
                return Ok(());
            }
        }
        let post = trans.apply(attrs)?;

        let mut child_level = level.clone();
        if !self
            .visitor
            .forward_arc(&ctx, arc, &trans, attrs, &post, &mut child_level)?
        {
            return Ok(());
        }
        self.visit_node::<W, L>(data.child(), &post, child_level.clone(), &chain)?;
        self.visitor
            .backward_arc(&ctx, arc, &trans, attrs, &post, &mut child_level)
    }
}

/// Walk `graph_type` depth-first from `start`.
///
/// `attrs` is the state in effect above the start; `level` is the initial
/// level state.
pub fn df_traverse<W, L, V>(
    graph: &SceneGraph,
    start: TraversalStart,
    visitor: &mut V,
    attrs: W::Attributes,
    level: L,
    graph_type: GraphType,
) -> Result<(), StrataError>
where
    W: TransitionWrapper,
    L: Clone,
    V: Visitor<W, L>,
{
    let mut traverser = Traverser {
        graph,
        graph_type,
        visitor,
    };
    let chain = ArcChain::new();
    match start {
        TraversalStart::Node(node) => traverser.visit_node::<W, L>(node, &attrs, level, &chain),
        TraversalStart::Arc(arc) => traverser.visit_arc::<W, L>(arc, &attrs, &level, &chain),
    }
}

// =============================================================================
// TESTS
// =============================================================================

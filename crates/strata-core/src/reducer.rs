//! # Graph Reducer
//!
//! Offline simplification of one graph type below a root.
//!
//! - **Chain merge**: for `gp -A-> P -B-> C` where `P` has a single child,
//!   one of `P` and `C` is dropped and the arcs are folded so every node
//!   below keeps its net state.
//! - **Sibling merge**: children reached through arcs with identical
//!   transitions are combined into one node.
//!
//! Passes repeat until nothing changes, since a merge can line up new
//! candidates among former cousins. Nodes whose identity matters (cameras,
//! lights, LOD switches, effects, pinned nodes) are never dropped; such
//! merges are skipped and logged at debug level.

use crate::graph::{NodeKind, SceneGraph};
use crate::{ArcId, GraphType, NodeId, StrataError};
use std::cmp::Ordering;
use tracing::debug;

/// The name a merged node should carry.
#[must_use]
pub fn choose_name(survivor: &str, other: &str) -> String {
    if survivor.is_empty() {
        other.to_string()
    } else {
        survivor.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphReducer {
    graph_type: GraphType,
}

impl GraphReducer {
    #[must_use]
    pub fn new(graph_type: GraphType) -> Self {
        Self { graph_type }
    }

    #[must_use]
    pub fn graph_type(&self) -> GraphType {
        self.graph_type
    }

    /// Flatten everything below `root`; returns the number of arcs removed.
    ///
    /// `root` itself always survives.
    pub fn flatten(
        &self,
        graph: &mut SceneGraph,
        root: NodeId,
        combine_siblings: bool,
    ) -> Result<usize, StrataError> {
        graph.node(root)?;
        let mut total = 0;
        loop {
            let removed = self.r_flatten(graph, root, combine_siblings)?;
            if removed == 0 {
                break;
            }
            total += removed;
        }
        debug!(root = root.0, removed = total, "flatten finished");
        Ok(total)
    }

    /// Merge `node` and `other` if their kinds allow it; returns the survivor.
    pub fn collapse_nodes(
        &self,
        graph: &mut SceneGraph,
        node: NodeId,
        other: NodeId,
    ) -> Result<Option<NodeId>, StrataError> {
        let names = (graph.node(node)?.name().to_string(), graph.node(other)?.name().to_string());
        let Some(survivor) = graph.combine_with(node, other)? else {
            debug!(node = node.0, other = other.0, "nodes cannot be merged");
            return Ok(None);
        };
        let name = if survivor == node {
            choose_name(&names.0, &names.1)
        } else {
            choose_name(&names.1, &names.0)
        };
        graph.set_node_name(survivor, name)?;
        Ok(Some(survivor))
    }

    fn r_flatten(
        &self,
        graph: &mut SceneGraph,
        node: NodeId,
        combine_siblings: bool,
    ) -> Result<usize, StrataError> {
        let mut count = 0;
        let children = graph.children(node, self.graph_type)?.to_vec();
        for arc in children {
            if !graph.contains_arc(arc) {
                continue;
            }
            let child = graph.arc(arc)?.child();
            count += self.r_flatten(graph, child, combine_siblings)?;
            if graph.contains_arc(arc) && self.flatten_chain(graph, arc)? {
                count += 1;
            }
        }
        if combine_siblings && graph.contains_node(node) && graph.num_children(node, self.graph_type)? >= 2 {
            count += self.flatten_siblings(graph, node)?;
        }
        Ok(count)
    }

    /// Whether `node` only lives in the graph type being reduced.
    fn only_in_graph(&self, graph: &SceneGraph, node: NodeId) -> Result<bool, StrataError> {
        Ok(graph.node(node)?.graph_types().all(|g| g == self.graph_type))
    }

    fn singly_parented(&self, graph: &SceneGraph, node: NodeId) -> Result<bool, StrataError> {
        Ok(graph.num_parents(node, self.graph_type)? == 1)
    }

    /// Try to remove one of `P` and `C` in `gp -upper-> P -lower-> C`.
    fn flatten_chain(&self, graph: &mut SceneGraph, upper: ArcId) -> Result<bool, StrataError> {
        let middle = graph.arc(upper)?.child();
        let [lower] = graph.children(middle, self.graph_type)? else {
            return Ok(false);
        };
        let lower = *lower;
        let child = graph.arc(lower)?.child();

        if !self.singly_parented(graph, middle)? || !self.singly_parented(graph, child)? {
            debug!(arc = upper.0, "chain not merged: instanced node");
            return Ok(false);
        }
        if graph.has_sub_render_trans(upper)? || graph.has_sub_render_trans(lower)? {
            debug!(arc = upper.0, "chain not merged: immediate transition");
            return Ok(false);
        }
        if !self.only_in_graph(graph, middle)? || !self.only_in_graph(graph, child)? {
            debug!(arc = upper.0, "chain not merged: node shared with another graph type");
            return Ok(false);
        }
        // Content would end up in the other node's frame; only contentless
        // plain nodes may be dropped across an arc.
        let droppable = |n: NodeId| -> Result<bool, StrataError> {
            let data = graph.node(n)?;
            Ok(*data.kind() == NodeKind::Plain && data.own_bound().is_empty())
        };
        let drop_middle = droppable(middle)?;
        let drop_child = droppable(child)?;
        if !drop_middle && !drop_child {
            debug!(arc = upper.0, "chain not merged: both nodes carry content");
            return Ok(false);
        }
        if !drop_middle {
            for arc in graph.children(child, self.graph_type)? {
                if graph.has_sub_render_trans(*arc)? {
                    debug!(arc = upper.0, "chain not merged: immediate transition below");
                    return Ok(false);
                }
            }
        }

        let Some(survivor) = self.collapse_nodes(graph, middle, child)? else {
            return Ok(false);
        };
        if survivor == child {
            graph.compose_transitions_from(upper, lower)?;
            graph.change_child(upper, child)?;
        } else {
            let grandchildren = graph.children(child, self.graph_type)?.to_vec();
            for arc in grandchildren {
                let composed = graph.transitions(lower)?.compose(graph.transitions(arc)?)?;
                let sort = graph.arc(arc)?.sort();
                graph.change_parent(arc, middle, sort)?;
                graph.set_transitions(arc, composed)?;
            }
            graph.remove_arc(lower)?;
        }
        debug!(arc = upper.0, kept = survivor.0, "merged chain");
        Ok(true)
    }

    /// Merge children reached through identical transitions; returns the
    /// number of arcs removed.
    fn flatten_siblings(&self, graph: &mut SceneGraph, node: NodeId) -> Result<usize, StrataError> {
        if *graph.node(node)?.kind() == NodeKind::Lod {
            return Ok(0);
        }
        let mut count = 0;
        while self.merge_one_sibling_pair(graph, node)? {
            count += 1;
        }
        Ok(count)
    }

    fn is_sibling_candidate(&self, graph: &SceneGraph, arc: ArcId) -> Result<bool, StrataError> {
        let child = graph.arc(arc)?.child();
        Ok(!graph.has_sub_render_trans(arc)?
            && self.singly_parented(graph, child)?
            && self.only_in_graph(graph, child)?
            && graph.node(child)?.kind().safe_to_combine())
    }

    fn merge_one_sibling_pair(&self, graph: &mut SceneGraph, node: NodeId) -> Result<bool, StrataError> {
        let mut candidates = Vec::new();
        for arc in graph.children(node, self.graph_type)? {
            if self.is_sibling_candidate(graph, *arc)? {
                candidates.push(*arc);
            }
        }
        candidates.sort_by(|a, b| match (graph.transitions(*a), graph.transitions(*b)) {
            (Ok(x), Ok(y)) => x.total_cmp(y),
            _ => Ordering::Equal,
        });

        for (i, first) in candidates.iter().enumerate() {
            for second in candidates.iter().skip(i + 1) {
                if graph.transitions(*first)?.total_cmp(graph.transitions(*second)?) != Ordering::Equal {
                    break;
                }
                if self.merge_siblings(graph, *first, *second)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn merge_siblings(&self, graph: &mut SceneGraph, arc1: ArcId, arc2: ArcId) -> Result<bool, StrataError> {
        let node1 = graph.arc(arc1)?.child();
        let node2 = graph.arc(arc2)?.child();
        let Some(survivor) = self.collapse_nodes(graph, node1, node2)? else {
            return Ok(false);
        };
        let (loser, loser_arc) = if survivor == node1 { (node2, arc2) } else { (node1, arc1) };

        let moved = graph.children(loser, self.graph_type)?.to_vec();
        for arc in moved {
            let sort = graph.arc(arc)?.sort();
            graph.change_parent(arc, survivor, sort)?;
        }
        graph.remove_arc(loser_arc)?;
        debug!(kept = survivor.0, dropped = loser.0, "merged siblings");
        Ok(true)
    }
}

// =============================================================================
// TESTS
// =============================================================================

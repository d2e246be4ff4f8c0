//! # Scene Graph
//!
//! The arena holding every node and arc of a scene.
//!
//! - Nodes and arcs are addressed by `NodeId`/`ArcId` handles and stored in
//!   `BTreeMap`s; handles are never reused.
//! - A node keeps one `Connection` per graph type it belongs to (at most
//!   `MAX_NODE_GRAPHS`), holding its parent arcs in insertion order and its
//!   child arcs sorted by the arcs' `sort` key, ties in insertion order.
//! - An arc owns its child: a node is released once no arc refers to it as
//!   child and nothing pinned it. Parent references never keep a node alive.
//! - Every topology or transition mutation bumps the graph type's
//!   `UpdateSeq` and stamps the affected arc, which is how the wrt cache
//!   notices staleness.

use crate::bounds::BoundingVolume;
use crate::cache::SubtreeCache;
use crate::config::GraphConfig;
use crate::primitives::MAX_NODE_GRAPHS;
use crate::transition::Transition;
use crate::transition_set::TransitionSet;
use crate::update_seq::{UpdateRegistry, UpdateSeq};
use crate::{ArcId, GraphType, NodeId, StrataError, TransitionKind};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error};

// =============================================================================
// NODE KINDS
// =============================================================================

/// What a node is, as far as the engine cares.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NodeKind {
    /// Pure grouping node.
    #[default]
    Plain,
    /// Holds renderable geometry, identified by name.
    Geom { geoms: Vec<String> },
    /// A viewpoint; its identity matters to whoever renders through it.
    Camera,
    /// A light source, referenced by lighting transitions.
    Light,
    /// Level-of-detail switch; its children are alternatives, not siblings.
    Lod,
    /// A node that intercepts traversal of its subtree.
    Effect { name: String },
}

impl NodeKind {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Geom { .. } => "geom",
            Self::Camera => "camera",
            Self::Light => "light",
            Self::Lod => "lod",
            Self::Effect { .. } => "effect",
        }
    }

    /// Whether the reducer may merge this node with another one.
    #[must_use]
    pub fn safe_to_combine(&self) -> bool {
        matches!(self, Self::Plain | Self::Geom { .. })
    }

    /// Whether traversal must consult the visitor before descending.
    #[must_use]
    pub fn has_sub_render(&self) -> bool {
        matches!(self, Self::Effect { .. })
    }
}

// =============================================================================
// NODE & ARC RECORDS
// =============================================================================

/// A node's arcs within one graph type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    graph_type: GraphType,
    parents: Vec<ArcId>,
    children: Vec<ArcId>,
}

impl Connection {
    fn new(graph_type: GraphType) -> Self {
        Self {
            graph_type,
            parents: Vec::new(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn graph_type(&self) -> GraphType {
        self.graph_type
    }

    #[must_use]
    pub fn parents(&self) -> &[ArcId] {
        &self.parents
    }

    #[must_use]
    pub fn children(&self) -> &[ArcId] {
        &self.children
    }

    /// An empty connection's slot can be reused for another graph type.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty() && self.children.is_empty()
    }
}

/// A graph vertex.
#[derive(Debug, Clone)]
pub struct NodeData {
    name: String,
    kind: NodeKind,
    bound: BoundingVolume,
    connections: Vec<Connection>,
    /// Arcs (attached or not) naming this node as their child.
    arc_refs: usize,
    pinned: bool,
}

impl NodeData {
    fn new(name: String, kind: NodeKind) -> Self {
        Self {
            name,
            kind,
            bound: BoundingVolume::Empty,
            connections: Vec::new(),
            arc_refs: 0,
            pinned: false,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// The node's own bound, excluding its children.
    #[must_use]
    pub fn own_bound(&self) -> BoundingVolume {
        self.bound
    }

    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    #[must_use]
    pub fn connection(&self, graph_type: GraphType) -> Option<&Connection> {
        self.connections
            .iter()
            .find(|c| c.graph_type == graph_type)
    }

    fn connection_mut(&mut self, graph_type: GraphType) -> Option<&mut Connection> {
        self.connections
            .iter_mut()
            .find(|c| c.graph_type == graph_type)
    }

    /// Graph types with at least one arc.
    pub fn graph_types(&self) -> impl Iterator<Item = GraphType> + '_ {
        self.connections
            .iter()
            .filter(|c| !c.is_empty())
            .map(|c| c.graph_type)
    }

    fn has_parents(&self) -> bool {
        self.connections.iter().any(|c| !c.parents.is_empty())
    }

    fn can_join(&self, graph_type: GraphType) -> bool {
        self.connections.len() < MAX_NODE_GRAPHS
            || self
                .connections
                .iter()
                .any(|c| c.graph_type == graph_type || c.is_empty())
    }

    /// The connection for `graph_type`, claiming a free slot if needed.
    fn join(&mut self, graph_type: GraphType) -> Option<&mut Connection> {
        if let Some(i) = self
            .connections
            .iter()
            .position(|c| c.graph_type == graph_type)
        {
            return self.connections.get_mut(i);
        }
        if let Some(i) = self.connections.iter().position(Connection::is_empty) {
            let slot = self.connections.get_mut(i)?;
            slot.graph_type = graph_type;
            return Some(slot);
        }
        if self.connections.len() < MAX_NODE_GRAPHS {
            self.connections.push(Connection::new(graph_type));
            return self.connections.last_mut();
        }
        None
    }
}

/// A directed, sortable edge carrying transitions.
#[derive(Debug, Clone)]
pub struct ArcData {
    parent: NodeId,
    child: NodeId,
    sort: i32,
    graph_type: GraphType,
    transitions: TransitionSet,
    attached: bool,
    last_update: UpdateSeq,
}

impl ArcData {
    #[must_use]
    pub fn parent(&self) -> NodeId {
        self.parent
    }

    #[must_use]
    pub fn child(&self) -> NodeId {
        self.child
    }

    #[must_use]
    pub fn sort(&self) -> i32 {
        self.sort
    }

    #[must_use]
    pub fn graph_type(&self) -> GraphType {
        self.graph_type
    }

    #[must_use]
    pub fn transitions(&self) -> &TransitionSet {
        &self.transitions
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Sequence value of the last mutation touching this arc.
    #[must_use]
    pub fn last_update(&self) -> UpdateSeq {
        self.last_update
    }
}

fn sort_key(arcs: &BTreeMap<ArcId, ArcData>, arc: &ArcId) -> i32 {
    arcs.get(arc).map(|a| a.sort).unwrap_or(i32::MIN)
}

/// Binary search for the run of equal sort keys, then scan it for `arc`.
fn find_arc_position(
    list: &[ArcId],
    arcs: &BTreeMap<ArcId, ArcData>,
    arc: ArcId,
    sort: i32,
) -> Option<usize> {
    let start = list.partition_point(|a| sort_key(arcs, a) < sort);
    list.get(start..)?
        .iter()
        .take_while(|a| sort_key(arcs, a) == sort)
        .position(|a| *a == arc)
        .map(|offset| start + offset)
}

// =============================================================================
// SCENE GRAPH
// =============================================================================

/// Arena of nodes and arcs plus the per-graph-type bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    pub(crate) nodes: BTreeMap<NodeId, NodeData>,
    pub(crate) arcs: BTreeMap<ArcId, ArcData>,
    next_node_id: u64,
    next_arc_id: u64,
    pub(crate) updates: UpdateRegistry,
    pub(crate) config: GraphConfig,
    pub(crate) wrt_cache: RefCell<BTreeMap<ArcId, SubtreeCache>>,
    bound_cache: RefCell<BTreeMap<ArcId, BoundingVolume>>,
}

impl SceneGraph {
    /// Create an empty graph with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Replace the configuration. Dropping `cache-wrt` also drops the cache.
    pub fn set_config(&mut self, config: GraphConfig) {
        if !config.cache_wrt {
            self.wrt_cache.get_mut().clear();
        }
        self.config = config;
    }

    /// The latest sequence issued for `graph_type`.
    #[must_use]
    pub fn current_seq(&self, graph_type: GraphType) -> UpdateSeq {
        self.updates.current(graph_type)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn arc_count(&self) -> usize {
        self.arcs.len()
    }

    #[must_use]
    pub fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    #[must_use]
    pub fn contains_arc(&self, arc: ArcId) -> bool {
        self.arcs.contains_key(&arc)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn arc_ids(&self) -> impl Iterator<Item = ArcId> + '_ {
        self.arcs.keys().copied()
    }

    pub fn node(&self, node: NodeId) -> Result<&NodeData, StrataError> {
        self.nodes.get(&node).ok_or(StrataError::NodeNotFound(node))
    }

    pub fn arc(&self, arc: ArcId) -> Result<&ArcData, StrataError> {
        self.arcs.get(&arc).ok_or(StrataError::ArcNotFound(arc))
    }

    fn node_mut(&mut self, node: NodeId) -> Result<&mut NodeData, StrataError> {
        self.nodes
            .get_mut(&node)
            .ok_or(StrataError::NodeNotFound(node))
    }

    fn arc_mut(&mut self, arc: ArcId) -> Result<&mut ArcData, StrataError> {
        self.arcs.get_mut(&arc).ok_or(StrataError::ArcNotFound(arc))
    }

    // =========================================================================
    // NODES
    // =========================================================================

    /// Create a node with no arcs.
    pub fn create_node(&mut self, name: impl Into<String>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        self.nodes.insert(id, NodeData::new(name.into(), kind));
        id
    }

    pub fn set_node_name(&mut self, node: NodeId, name: impl Into<String>) -> Result<(), StrataError> {
        self.node_mut(node)?.name = name.into();
        Ok(())
    }

    /// Keep `node` alive even when no arc refers to it.
    pub fn pin_node(&mut self, node: NodeId) -> Result<(), StrataError> {
        self.node_mut(node)?.pinned = true;
        Ok(())
    }

    /// Drop the external hold; the node is released at once if nothing
    /// else refers to it.
    pub fn unpin_node(&mut self, node: NodeId) -> Result<(), StrataError> {
        self.node_mut(node)?.pinned = false;
        self.release_if_unreferenced(node);
        Ok(())
    }

    /// Set the node's own bound and mark every bound above it stale.
    pub fn set_node_bound(&mut self, node: NodeId, bound: BoundingVolume) -> Result<(), StrataError> {
        let data = self.node_mut(node)?;
        data.bound = bound;
        let parents: Vec<ArcId> = data
            .connections
            .iter()
            .flat_map(|c| c.parents.iter().copied())
            .collect();
        for arc in parents {
            self.mark_bounds_stale(arc);
        }
        Ok(())
    }

    /// Shallow copy: same name, kind and bound, no arcs.
    pub fn make_copy(&mut self, node: NodeId) -> Result<NodeId, StrataError> {
        let source = self.node(node)?;
        let (name, kind, bound) = (source.name.clone(), source.kind.clone(), source.bound);
        let copy = self.create_node(name, kind);
        self.node_mut(copy)?.bound = bound;
        Ok(copy)
    }

    /// Deep copy of the subgraph below `node` in `graph_type`.
    ///
    /// A node reachable along several paths is copied once and instanced
    /// under every copied parent.
    pub fn copy_subgraph(&mut self, node: NodeId, graph_type: GraphType) -> Result<NodeId, StrataError> {
        let mut inst_map = BTreeMap::new();
        self.copy_subgraph_inner(node, graph_type, &mut inst_map)
    }

    fn copy_subgraph_inner(
        &mut self,
        node: NodeId,
        graph_type: GraphType,
        inst_map: &mut BTreeMap<NodeId, NodeId>,
    ) -> Result<NodeId, StrataError> {
        let copy = self.make_copy(node)?;
        inst_map.insert(node, copy);

        let children = self.children(node, graph_type)?.to_vec();
        for arc_id in children {
            let (child, sort) = {
                let arc = self.arc(arc_id)?;
                (arc.child, arc.sort)
            };
            let child_copy = match inst_map.get(&child) {
                Some(existing) => *existing,
                None => self.copy_subgraph_inner(child, graph_type, inst_map)?,
            };
            let new_arc = self.attach_arc(copy, child_copy, sort, graph_type)?;
            self.copy_transitions_from(new_arc, arc_id)?;
        }
        Ok(copy)
    }

    /// Decide which of two nodes survives merging them, or `None` when
    /// they must both stay.
    ///
    /// A plain node yields to the other one; two geometry nodes merge into
    /// `node`. A pinned node is never the one dropped. The survivor's own
    /// bound grows to enclose the other's.
    pub fn combine_with(&mut self, node: NodeId, other: NodeId) -> Result<Option<NodeId>, StrataError> {
        if node == other {
            return Ok(None);
        }
        let a = self.node(node)?;
        let b = self.node(other)?;
        let (survivor, loser) = match (&a.kind, &b.kind) {
            (NodeKind::Plain, NodeKind::Plain | NodeKind::Geom { .. }) if !a.pinned => (other, node),
            (NodeKind::Geom { .. } | NodeKind::Plain, NodeKind::Plain) if !b.pinned => (node, other),
            (NodeKind::Geom { .. }, NodeKind::Geom { .. }) if !b.pinned => (node, other),
            _ => return Ok(None),
        };

        let dropped = self.node(loser)?;
        let (loser_kind, loser_bound) = (dropped.kind.clone(), dropped.bound);
        let kept = self.node_mut(survivor)?;
        if let (NodeKind::Geom { geoms }, NodeKind::Geom { geoms: extra }) = (&mut kept.kind, loser_kind) {
            geoms.extend(extra);
        }
        kept.bound = kept.bound.extend_by(loser_bound);
        Ok(Some(survivor))
    }

    /// Destroy a node that has no parents, deleting every arc it owns.
    ///
    /// Children left without any referring arc are released too, unless
    /// pinned.
    pub fn destroy_node(&mut self, node: NodeId) -> Result<(), StrataError> {
        if self.node(node)?.has_parents() {
            return Err(StrataError::NodeStillAttached(node));
        }
        self.destroy_cascade(node);
        Ok(())
    }

    fn release_if_unreferenced(&mut self, node: NodeId) {
        let unreferenced = self
            .nodes
            .get(&node)
            .is_some_and(|n| !n.pinned && n.arc_refs == 0 && !n.has_parents());
        if unreferenced {
            debug!(node = node.0, "releasing unreferenced node");
            self.destroy_cascade(node);
        }
    }

    fn destroy_cascade(&mut self, root: NodeId) {
        let mut pending = vec![root];
        while let Some(node_id) = pending.pop() {
            let Some(node) = self.nodes.remove(&node_id) else {
                continue;
            };
            for conn in node.connections {
                for arc_id in conn.children {
                    if let Some(child) = self.detach_below(arc_id, conn.graph_type) {
                        pending.push(child);
                    }
                }
            }
        }
    }

    /// Delete an arc whose parent is being destroyed. The parent's child
    /// list is going away with it, so only the child side is unlinked.
    ///
    /// Returns the child when it is left unreferenced.
    fn detach_below(&mut self, arc_id: ArcId, graph_type: GraphType) -> Option<NodeId> {
        let arc = self.arcs.remove(&arc_id)?;
        self.wrt_cache.get_mut().remove(&arc_id);
        self.bound_cache.get_mut().remove(&arc_id);
        let now = self.updates.bump(graph_type);

        let child = self.nodes.get_mut(&arc.child)?;
        child.arc_refs = child.arc_refs.saturating_sub(1);
        let mut remaining = None;
        if let Some(conn) = child.connection_mut(graph_type) {
            conn.parents.retain(|a| *a != arc_id);
            if conn.parents.len() == 1 {
                remaining = conn.parents.first().copied();
            }
        }
        let orphan = !child.pinned && child.arc_refs == 0 && !child.has_parents();
        if let Some(other) = remaining.and_then(|r| self.arcs.get_mut(&r)) {
            other.last_update = now;
        }
        orphan.then_some(arc.child)
    }

    // =========================================================================
    // NODE QUERIES
    // =========================================================================

    /// Child arcs of `node` in sort order; empty outside `graph_type`.
    pub fn children(&self, node: NodeId, graph_type: GraphType) -> Result<&[ArcId], StrataError> {
        Ok(self
            .node(node)?
            .connection(graph_type)
            .map(Connection::children)
            .unwrap_or(&[]))
    }

    /// Parent arcs of `node` in insertion order; empty outside `graph_type`.
    pub fn parents(&self, node: NodeId, graph_type: GraphType) -> Result<&[ArcId], StrataError> {
        Ok(self
            .node(node)?
            .connection(graph_type)
            .map(Connection::parents)
            .unwrap_or(&[]))
    }

    pub fn num_children(&self, node: NodeId, graph_type: GraphType) -> Result<usize, StrataError> {
        Ok(self.children(node, graph_type)?.len())
    }

    pub fn child(&self, node: NodeId, graph_type: GraphType, index: usize) -> Result<ArcId, StrataError> {
        let list = self.children(node, graph_type)?;
        list.get(index).copied().ok_or(StrataError::IndexOutOfRange {
            index,
            len: list.len(),
        })
    }

    pub fn num_parents(&self, node: NodeId, graph_type: GraphType) -> Result<usize, StrataError> {
        Ok(self.parents(node, graph_type)?.len())
    }

    pub fn parent(&self, node: NodeId, graph_type: GraphType, index: usize) -> Result<ArcId, StrataError> {
        let list = self.parents(node, graph_type)?;
        list.get(index).copied().ok_or(StrataError::IndexOutOfRange {
            index,
            len: list.len(),
        })
    }

    /// Whether `node` has more than one parent arc in `graph_type`.
    pub fn is_instanced(&self, node: NodeId, graph_type: GraphType) -> Result<bool, StrataError> {
        Ok(self.num_parents(node, graph_type)? > 1)
    }

    /// The attached arc from `parent` to `child`, if any.
    pub fn find_arc(
        &self,
        parent: NodeId,
        child: NodeId,
        graph_type: GraphType,
    ) -> Result<Option<ArcId>, StrataError> {
        self.node(parent)?;
        for arc_id in self.parents(child, graph_type)? {
            if self.arc(*arc_id)?.parent == parent {
                return Ok(Some(*arc_id));
            }
        }
        Ok(None)
    }

    /// Whether `ancestor` is reachable upward from `node` in `graph_type`.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId, graph_type: GraphType) -> Result<bool, StrataError> {
        let mut pending = vec![node];
        let mut seen = BTreeSet::new();
        while let Some(current) = pending.pop() {
            if current == ancestor {
                return Ok(true);
            }
            if !seen.insert(current) {
                continue;
            }
            for arc_id in self.parents(current, graph_type)? {
                pending.push(self.arc(*arc_id)?.parent);
            }
        }
        Ok(false)
    }

    /// Check the sort order of a node's child list.
    pub fn verify_arc_list(&self, node: NodeId, graph_type: GraphType) -> Result<bool, StrataError> {
        let list = self.children(node, graph_type)?;
        Ok(list
            .windows(2)
            .all(|w| sort_key(&self.arcs, &w[0]) <= sort_key(&self.arcs, &w[1])))
    }

    fn check_child_order(&self, node: NodeId, graph_type: GraphType) -> Result<(), StrataError> {
        if self.config.check_graph()
            && self.nodes.contains_key(&node)
            && !self.verify_arc_list(node, graph_type)?
        {
            error!(node = node.0, graph_type = %graph_type, "child arc list out of order");
            return Err(StrataError::UnsortedArcList(node));
        }
        Ok(())
    }

    // =========================================================================
    // ARC LIFECYCLE
    // =========================================================================

    /// Create an arc and attach it.
    ///
    /// On failure (capacity, cycle) nothing is created.
    pub fn attach_arc(
        &mut self,
        parent: NodeId,
        child: NodeId,
        sort: i32,
        graph_type: GraphType,
    ) -> Result<ArcId, StrataError> {
        self.check_attachable(parent, child, graph_type)?;
        let arc = self.create_detached_arc(parent, child, sort, graph_type)?;
        if let Err(e) = self.attach(arc) {
            self.delete_arc(arc)?;
            return Err(e);
        }
        Ok(arc)
    }

    /// Create an arc without attaching it; the loader attaches afterward.
    pub fn create_detached_arc(
        &mut self,
        parent: NodeId,
        child: NodeId,
        sort: i32,
        graph_type: GraphType,
    ) -> Result<ArcId, StrataError> {
        self.node(parent)?;
        self.node_mut(child)?.arc_refs += 1;
        let id = ArcId(self.next_arc_id);
        self.next_arc_id += 1;
        self.arcs.insert(
            id,
            ArcData {
                parent,
                child,
                sort,
                graph_type,
                transitions: TransitionSet::new(),
                attached: false,
                last_update: UpdateSeq::INITIAL,
            },
        );
        Ok(id)
    }

    fn check_attachable(&self, parent: NodeId, child: NodeId, graph_type: GraphType) -> Result<(), StrataError> {
        for id in [parent, child] {
            if !self.node(id)?.can_join(graph_type) {
                error!(
                    node = id.0,
                    graph_type = %graph_type,
                    "Attempt to attach node simultaneously to more than {} different graph types",
                    MAX_NODE_GRAPHS
                );
                return Err(StrataError::GraphCapacityExceeded {
                    node: id,
                    graph_type,
                    max: MAX_NODE_GRAPHS,
                });
            }
        }
        if parent == child || self.is_ancestor(child, parent, graph_type)? {
            return Err(StrataError::CycleDetected { parent, child });
        }
        Ok(())
    }

    /// Insert a detached arc into its parent's sorted child list and its
    /// child's parent list.
    pub fn attach(&mut self, arc_id: ArcId) -> Result<(), StrataError> {
        let arc = self.arc(arc_id)?;
        if arc.attached {
            return Err(StrataError::ArcAlreadyAttached(arc_id));
        }
        let (parent, child, sort, graph_type) = (arc.parent, arc.child, arc.sort, arc.graph_type);
        self.check_attachable(parent, child, graph_type)?;

        let arcs = &self.arcs;
        let capacity_error = |node| StrataError::GraphCapacityExceeded {
            node,
            graph_type,
            max: MAX_NODE_GRAPHS,
        };
        let parent_conn = self
            .nodes
            .get_mut(&parent)
            .and_then(|n| n.join(graph_type))
            .ok_or_else(|| capacity_error(parent))?;
        let pos = parent_conn
            .children
            .partition_point(|a| sort_key(arcs, a) <= sort);
        parent_conn.children.insert(pos, arc_id);

        let child_conn = self
            .nodes
            .get_mut(&child)
            .and_then(|n| n.join(graph_type))
            .ok_or_else(|| capacity_error(child))?;
        child_conn.parents.push(arc_id);
        let became_instanced = if child_conn.parents.len() == 2 {
            child_conn.parents.clone()
        } else {
            Vec::new()
        };

        let now = self.updates.bump(graph_type);
        let arc = self.arc_mut(arc_id)?;
        arc.attached = true;
        arc.last_update = now;
        for sibling in became_instanced {
            if let Some(a) = self.arcs.get_mut(&sibling) {
                a.last_update = now;
            }
        }
        self.wrt_cache.get_mut().remove(&arc_id);
        self.mark_bounds_stale(arc_id);
        self.check_child_order(parent, graph_type)
    }

    /// Remove an arc from both lists. The arc stays in the arena, detached.
    pub fn detach(&mut self, arc_id: ArcId) -> Result<(), StrataError> {
        let arc = self.arc(arc_id)?;
        if !arc.attached {
            return Err(StrataError::ArcNotAttached(arc_id));
        }
        let (parent, child, sort, graph_type) = (arc.parent, arc.child, arc.sort, arc.graph_type);
        // Stale marks walk upward from the parent, so do it while linked.
        self.mark_bounds_stale(arc_id);

        let arcs = &self.arcs;
        if let Some(conn) = self
            .nodes
            .get_mut(&parent)
            .and_then(|n| n.connection_mut(graph_type))
        {
            let pos = find_arc_position(&conn.children, arcs, arc_id, sort)
                .ok_or(StrataError::UnsortedArcList(parent))?;
            conn.children.remove(pos);
        }
        let mut remaining = None;
        if let Some(conn) = self
            .nodes
            .get_mut(&child)
            .and_then(|n| n.connection_mut(graph_type))
        {
            conn.parents.retain(|a| *a != arc_id);
            if conn.parents.len() == 1 {
                remaining = conn.parents.first().copied();
            }
        }

        let now = self.updates.bump(graph_type);
        let arc = self.arc_mut(arc_id)?;
        arc.attached = false;
        arc.last_update = now;
        if let Some(other) = remaining.and_then(|r| self.arcs.get_mut(&r)) {
            other.last_update = now;
        }
        self.wrt_cache.get_mut().remove(&arc_id);
        self.check_child_order(parent, graph_type)
    }

    /// Delete a detached arc, releasing its child if nothing else refers
    /// to it.
    pub fn delete_arc(&mut self, arc_id: ArcId) -> Result<(), StrataError> {
        if self.arc(arc_id)?.attached {
            return Err(StrataError::ArcStillAttached(arc_id));
        }
        let Some(arc) = self.arcs.remove(&arc_id) else {
            return Err(StrataError::ArcNotFound(arc_id));
        };
        self.wrt_cache.get_mut().remove(&arc_id);
        self.bound_cache.get_mut().remove(&arc_id);
        if let Some(child) = self.nodes.get_mut(&arc.child) {
            child.arc_refs = child.arc_refs.saturating_sub(1);
        }
        self.release_if_unreferenced(arc.child);
        Ok(())
    }

    /// Detach then delete.
    pub fn remove_arc(&mut self, arc_id: ArcId) -> Result<(), StrataError> {
        self.detach(arc_id)?;
        self.delete_arc(arc_id)
    }

    /// Move an arc to a new position among its siblings.
    pub fn set_sort(&mut self, arc_id: ArcId, sort: i32) -> Result<(), StrataError> {
        let attached = self.arc(arc_id)?.attached;
        if attached {
            self.detach(arc_id)?;
        }
        self.arc_mut(arc_id)?.sort = sort;
        if attached {
            self.attach(arc_id)?;
        }
        Ok(())
    }

    /// Re-parent an arc at `sort`. On failure the arc is restored where it
    /// was.
    pub fn change_parent(&mut self, arc_id: ArcId, new_parent: NodeId, sort: i32) -> Result<(), StrataError> {
        self.node(new_parent)?;
        let arc = self.arc(arc_id)?;
        let (old_parent, old_sort, attached) = (arc.parent, arc.sort, arc.attached);
        if attached {
            self.detach(arc_id)?;
        }
        let arc = self.arc_mut(arc_id)?;
        arc.parent = new_parent;
        arc.sort = sort;
        if attached {
            if let Err(e) = self.attach(arc_id) {
                let arc = self.arc_mut(arc_id)?;
                arc.parent = old_parent;
                arc.sort = old_sort;
                self.attach(arc_id)?;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Point an arc at a different child. The old child is released if
    /// nothing else refers to it. On failure the arc is restored.
    pub fn change_child(&mut self, arc_id: ArcId, new_child: NodeId) -> Result<(), StrataError> {
        self.node(new_child)?;
        let arc = self.arc(arc_id)?;
        let (old_child, attached) = (arc.child, arc.attached);
        if old_child == new_child {
            return Ok(());
        }
        if attached {
            self.detach(arc_id)?;
        }
        self.arc_mut(arc_id)?.child = new_child;
        if attached {
            if let Err(e) = self.attach(arc_id) {
                self.arc_mut(arc_id)?.child = old_child;
                self.attach(arc_id)?;
                return Err(e);
            }
        }
        self.node_mut(new_child)?.arc_refs += 1;
        if let Some(old) = self.nodes.get_mut(&old_child) {
            old.arc_refs = old.arc_refs.saturating_sub(1);
        }
        self.release_if_unreferenced(old_child);
        Ok(())
    }

    // =========================================================================
    // ARC TRANSITIONS
    // =========================================================================

    pub fn transitions(&self, arc_id: ArcId) -> Result<&TransitionSet, StrataError> {
        Ok(&self.arc(arc_id)?.transitions)
    }

    pub fn transition(&self, arc_id: ArcId, kind: TransitionKind) -> Result<Option<&Transition>, StrataError> {
        Ok(self.arc(arc_id)?.transitions.get(kind))
    }

    pub fn has_transition(&self, arc_id: ArcId, kind: TransitionKind) -> Result<bool, StrataError> {
        Ok(self.arc(arc_id)?.transitions.contains(kind))
    }

    /// Store a transition on an arc, returning the one it replaced.
    pub fn set_transition(
        &mut self,
        arc_id: ArcId,
        kind: TransitionKind,
        trans: Transition,
    ) -> Result<Option<Transition>, StrataError> {
        let previous = self.arc_mut(arc_id)?.transitions.set(kind, trans)?;
        self.changed_transition(arc_id, kind)?;
        Ok(previous)
    }

    /// Remove a transition from an arc, returning it.
    pub fn clear_transition(
        &mut self,
        arc_id: ArcId,
        kind: TransitionKind,
    ) -> Result<Option<Transition>, StrataError> {
        let previous = self.arc_mut(arc_id)?.transitions.clear(kind);
        if previous.is_some() {
            self.changed_transition(arc_id, kind)?;
        }
        Ok(previous)
    }

    /// Replace all of `dst`'s transitions with copies of `src`'s.
    pub fn copy_transitions_from(&mut self, dst: ArcId, src: ArcId) -> Result<(), StrataError> {
        let transitions = self.arc(src)?.transitions.clone();
        self.set_transitions(dst, transitions)
    }

    /// `dst := dst ∘ src`, kind by kind.
    pub fn compose_transitions_from(&mut self, dst: ArcId, src: ArcId) -> Result<(), StrataError> {
        let composed = self
            .arc(dst)?
            .transitions
            .compose(&self.arc(src)?.transitions)?;
        self.set_transitions(dst, composed)
    }

    /// Shift the priority of every transition on the arc.
    pub fn adjust_all_priorities(&mut self, arc_id: ArcId, delta: i32) -> Result<(), StrataError> {
        let mut transitions = self.arc(arc_id)?.transitions.clone();
        transitions.adjust_all_priorities(delta);
        self.set_transitions(arc_id, transitions)
    }

    pub fn has_sub_render_trans(&self, arc_id: ArcId) -> Result<bool, StrataError> {
        Ok(self.arc(arc_id)?.transitions.has_sub_render())
    }

    pub fn num_sub_render_trans(&self, arc_id: ArcId) -> Result<usize, StrataError> {
        Ok(self.arc(arc_id)?.transitions.num_sub_render())
    }

    pub fn arc_last_update(&self, arc_id: ArcId) -> Result<UpdateSeq, StrataError> {
        Ok(self.arc(arc_id)?.last_update)
    }

    /// Replace every transition on the arc at once.
    pub fn set_transitions(&mut self, arc_id: ArcId, transitions: TransitionSet) -> Result<(), StrataError> {
        let graph_type = self.arc(arc_id)?.graph_type;
        let now = self.updates.bump(graph_type);
        let arc = self.arc_mut(arc_id)?;
        arc.transitions = transitions;
        arc.last_update = now;
        self.wrt_cache.get_mut().remove(&arc_id);
        self.mark_bounds_stale(arc_id);
        Ok(())
    }

    fn changed_transition(&mut self, arc_id: ArcId, kind: TransitionKind) -> Result<(), StrataError> {
        let graph_type = self.arc(arc_id)?.graph_type;
        let now = self.updates.bump(graph_type);
        self.arc_mut(arc_id)?.last_update = now;
        if let Some(cache) = self.wrt_cache.get_mut().get_mut(&arc_id) {
            cache.net.invalidate(kind);
        }
        if kind == TransitionKind::TRANSFORM {
            self.mark_bounds_stale(arc_id);
        }
        Ok(())
    }

    // =========================================================================
    // BOUNDING VOLUMES
    // =========================================================================

    fn mark_bounds_stale(&mut self, arc_id: ArcId) {
        let cache = self.bound_cache.get_mut();
        let mut pending = vec![arc_id];
        let mut seen = BTreeSet::new();
        while let Some(current) = pending.pop() {
            if !seen.insert(current) {
                continue;
            }
            cache.remove(&current);
            if let Some(arc) = self.arcs.get(&current) {
                if let Some(conn) = self
                    .nodes
                    .get(&arc.parent)
                    .and_then(|n| n.connection(arc.graph_type))
                {
                    pending.extend(conn.parents.iter().copied());
                }
            }
        }
    }

    /// Bound of everything below `node`, in the node's own frame.
    pub fn node_bound(&self, node: NodeId, graph_type: GraphType) -> Result<BoundingVolume, StrataError> {
        let mut bound = self.node(node)?.bound;
        for arc_id in self.children(node, graph_type)? {
            bound = bound.extend_by(self.arc_bound(*arc_id)?);
        }
        Ok(bound)
    }

    /// Bound of the arc's child subtree, in the arc's parent frame.
    pub fn arc_bound(&self, arc_id: ArcId) -> Result<BoundingVolume, StrataError> {
        if let Some(bound) = self.bound_cache.borrow().get(&arc_id) {
            return Ok(*bound);
        }
        let arc = self.arc(arc_id)?;
        let mut bound = self.node_bound(arc.child, arc.graph_type)?;
        if let Some(m) = arc
            .transitions
            .get(TransitionKind::TRANSFORM)
            .and_then(Transition::as_matrix)
        {
            bound = bound.transform(&m);
        }
        self.bound_cache.borrow_mut().insert(arc_id, bound);
        Ok(bound)
    }

    // =========================================================================
    // DESCRIPTION
    // =========================================================================

    /// Indented dump of the tree below `root`; instanced nodes repeat.
    pub fn describe(&self, root: NodeId, graph_type: GraphType) -> Result<String, StrataError> {
        let mut out = String::new();
        self.describe_node(root, None, graph_type, 0, &mut out)?;
        Ok(out)
    }

    fn describe_node(
        &self,
        node: NodeId,
        via: Option<&ArcData>,
        graph_type: GraphType,
        depth: usize,
        out: &mut String,
    ) -> Result<(), StrataError> {
        let data = self.node(node)?;
        let name = if data.name.is_empty() { "-" } else { &data.name };
        out.push_str(&format!(
            "{}{} [{}] #{}",
            "  ".repeat(depth),
            name,
            data.kind.label(),
            node.0
        ));
        if let Some(arc) = via {
            if arc.sort != 0 {
                out.push_str(&format!(" sort={}", arc.sort));
            }
            let kinds: Vec<String> = arc.transitions.kinds().map(|k| k.to_string()).collect();
            if !kinds.is_empty() {
                out.push_str(&format!(" ({})", kinds.join(", ")));
            }
        }
        out.push('\n');
        for arc_id in self.children(node, graph_type)? {
            let arc = self.arc(*arc_id)?;
            self.describe_node(arc.child, Some(arc), graph_type, depth + 1, out)?;
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

//! # With-Respect-To Resolution
//!
//! `wrt(from, to)` is the transition that carries `from`'s frame into
//! `to`'s frame: with `path(x)` the composition of every arc from the
//! lowest common ancestor down to `x`,
//!
//! ```text
//! wrt(from, to) = invert(path(to)) ∘ path(from)
//! ```
//!
//! so `wrt(node, root)` is the node's net transition from the root.
//!
//! Both endpoints are walked up to their root. At an instanced node the
//! parent arc is taken from the caller's disambiguator list; without a match
//! the first parent arc is used (with a warning), or the call fails under
//! `ambiguous-wrt-abort`. Paths are matched by arc identity, never by node.
//!
//! ## Caching
//!
//! The graph is cut into segments at roots and instanced nodes: inside a
//! segment every node has one parent, so the composition from the segment
//! top down to any arc is unique. That composition is memoized per arc in a
//! `TransitionCache` and refreshed with `cached_compose`, keyed on the graph
//! type's `UpdateSeq`. A segment that starts above the common ancestor is
//! folded directly.

use crate::cache::{SubtreeCache, TransitionCache};
use crate::graph::SceneGraph;
use crate::primitives::{MATRIX_TOLERANCE, MAX_GRAPH_DEPTH};
use crate::wrapper::{TransformWrapper, TransitionWrapper};
use crate::{ArcId, GraphType, NodeId, StrataError};
use glam::Mat4;
use tracing::{debug, error, warn};

impl SceneGraph {
    /// Relative transition from `from` to `to`, using the cache when
    /// `cache-wrt` is on.
    ///
    /// `from_arcs`/`to_arcs` disambiguate instanced nodes on either side.
    pub fn wrt<W: TransitionWrapper>(
        &self,
        from: NodeId,
        from_arcs: &[ArcId],
        to: NodeId,
        to_arcs: &[ArcId],
        graph_type: GraphType,
    ) -> Result<W, StrataError> {
        if !self.config.cache_wrt {
            return self.uncached_wrt(from, from_arcs, to, to_arcs, graph_type);
        }
        let Some((from_down, to_down)) = self.split_at_ancestor(from, from_arcs, to, to_arcs, graph_type)? else {
            return Ok(W::identity());
        };
        let from_net: W = self.accumulate_cached(&from_down, graph_type)?;
        let to_net: W = self.accumulate_cached(&to_down, graph_type)?;
        let result = to_net.invert()?.compose(&from_net)?;

        if self.config.check_wrt() {
            let check: W = self.uncached_wrt(from, from_arcs, to, to_arcs, graph_type)?;
            if !result.approx_eq(&check, MATRIX_TOLERANCE) {
                error!(
                    from = from.0,
                    to = to.0,
                    cached = ?result,
                    uncached = ?check,
                    "cached wrt disagrees with uncached wrt"
                );
                return Err(StrataError::CacheInconsistency { from, to });
            }
        }
        Ok(result)
    }

    /// `wrt` recomputed from the arcs alone, never touching the cache.
    pub fn uncached_wrt<W: TransitionWrapper>(
        &self,
        from: NodeId,
        from_arcs: &[ArcId],
        to: NodeId,
        to_arcs: &[ArcId],
        graph_type: GraphType,
    ) -> Result<W, StrataError> {
        let Some((from_down, to_down)) = self.split_at_ancestor(from, from_arcs, to, to_arcs, graph_type)? else {
            return Ok(W::identity());
        };
        let from_net: W = self.fold_arcs(&from_down)?;
        let to_net: W = self.fold_arcs(&to_down)?;
        to_net.invert()?.compose(&from_net)
    }

    /// Net transform from `from` to `to` with no disambiguation.
    pub fn wrt_matrix(&self, from: NodeId, to: NodeId, graph_type: GraphType) -> Result<Mat4, StrataError> {
        self.wrt::<TransformWrapper>(from, &[], to, &[], graph_type)
            .map(|w| w.matrix())
    }

    /// Nearest instanced node above the arc's segment, `None` when the
    /// segment starts at a root.
    pub fn top_subtree(&self, arc: ArcId) -> Result<Option<NodeId>, StrataError> {
        let graph_type = self.arc(arc)?.graph_type();
        if let Some(cache) = self.wrt_cache.borrow().get(&arc) {
            if cache.verified >= self.current_seq(graph_type) {
                return Ok(cache.top);
            }
        }
        let segment = self.segment_above(arc, graph_type)?;
        self.segment_top(&segment, graph_type)
    }

    // =========================================================================
    // WALKING
    // =========================================================================

    /// Parent arcs from `node` up to its root, nearest first.
    fn walk_up(&self, node: NodeId, disambiguator: &[ArcId], graph_type: GraphType) -> Result<Vec<ArcId>, StrataError> {
        let mut path = Vec::new();
        let mut current = node;
        loop {
            let arc = match self.parents(current, graph_type)? {
                [] => break,
                [only] => *only,
                many => self.choose_parent(current, many, disambiguator, graph_type)?,
            };
            if path.len() >= MAX_GRAPH_DEPTH {
                error!(node = node.0, "walk toward root exceeded maximum depth");
                return Err(StrataError::CycleDetected {
                    parent: current,
                    child: node,
                });
            }
            path.push(arc);
            current = self.arc(arc)?.parent();
        }
        Ok(path)
    }

    fn choose_parent(
        &self,
        node: NodeId,
        parents: &[ArcId],
        disambiguator: &[ArcId],
        graph_type: GraphType,
    ) -> Result<ArcId, StrataError> {
        if let Some(arc) = parents.iter().find(|a| disambiguator.contains(a)) {
            return Ok(*arc);
        }
        if self.config.ambiguous_wrt_abort {
            error!(node = node.0, graph_type = %graph_type, "ambiguous wrt at instanced node");
            return Err(StrataError::AmbiguousWrt { node, graph_type });
        }
        warn!(
            node = node.0,
            graph_type = %graph_type,
            parents = parents.len(),
            "ambiguous wrt: taking the first parent arc"
        );
        parents
            .first()
            .copied()
            .ok_or(StrataError::AmbiguousWrt { node, graph_type })
    }

    fn root_of(&self, node: NodeId, path: &[ArcId]) -> Result<NodeId, StrataError> {
        match path.last() {
            Some(arc) => Ok(self.arc(*arc)?.parent()),
            None => Ok(node),
        }
    }

    /// Both endpoints' arcs below their lowest common ancestor, top-down.
    ///
    /// `None` when `from == to`.
    fn split_at_ancestor(
        &self,
        from: NodeId,
        from_arcs: &[ArcId],
        to: NodeId,
        to_arcs: &[ArcId],
        graph_type: GraphType,
    ) -> Result<Option<(Vec<ArcId>, Vec<ArcId>)>, StrataError> {
        self.node(from)?;
        self.node(to)?;
        if from == to {
            return Ok(None);
        }
        let mut from_path = self.walk_up(from, from_arcs, graph_type)?;
        let mut to_path = self.walk_up(to, to_arcs, graph_type)?;
        if self.root_of(from, &from_path)? != self.root_of(to, &to_path)? {
            return Err(StrataError::NoCommonAncestor { from, to });
        }
        from_path.reverse();
        to_path.reverse();
        let common = from_path
            .iter()
            .zip(&to_path)
            .take_while(|(a, b)| a == b)
            .count();
        Ok(Some((from_path.split_off(common), to_path.split_off(common))))
    }

    // =========================================================================
    // ACCUMULATION
    // =========================================================================

    fn fold_arcs<W: TransitionWrapper>(&self, arcs: &[ArcId]) -> Result<W, StrataError> {
        let mut net = W::identity();
        for arc in arcs {
            net = net.compose(&W::from_set(self.arc(*arc)?.transitions()))?;
        }
        Ok(net)
    }

    fn starts_segment(&self, arc: ArcId, graph_type: GraphType) -> Result<bool, StrataError> {
        Ok(self.num_parents(self.arc(arc)?.parent(), graph_type)? != 1)
    }

    /// Compose top-down `arcs`, taking whole segments from the cache.
    fn accumulate_cached<W: TransitionWrapper>(&self, arcs: &[ArcId], graph_type: GraphType) -> Result<W, StrataError> {
        let mut starts = Vec::with_capacity(arcs.len());
        for arc in arcs {
            starts.push(self.starts_segment(*arc, graph_type)?);
        }

        let mut net = W::identity();
        let mut begin = 0;
        while begin < arcs.len() {
            let end = (begin + 1..arcs.len())
                .find(|i| starts.get(*i).copied().unwrap_or(true))
                .unwrap_or(arcs.len());
            let part = match (starts.get(begin).copied(), arcs.get(begin..end)) {
                (Some(true), Some([.., last])) => W::from_set(&self.refresh_net(*last, graph_type)?.to_set()),
                (_, Some(run)) => self.fold_arcs(run)?,
                (_, None) => W::identity(),
            };
            net = net.compose(&part)?;
            begin = end;
        }
        Ok(net)
    }

    /// The arc's segment, bottom-up, starting with the arc itself.
    fn segment_above(&self, arc: ArcId, graph_type: GraphType) -> Result<Vec<ArcId>, StrataError> {
        let mut segment = vec![arc];
        let mut current = arc;
        while let [only] = self.parents(self.arc(current)?.parent(), graph_type)? {
            if segment.len() >= MAX_GRAPH_DEPTH {
                return Err(StrataError::CycleDetected {
                    parent: self.arc(current)?.parent(),
                    child: self.arc(arc)?.child(),
                });
            }
            segment.push(*only);
            current = *only;
        }
        Ok(segment)
    }

    fn segment_top(&self, segment: &[ArcId], graph_type: GraphType) -> Result<Option<NodeId>, StrataError> {
        let Some(top_arc) = segment.last() else {
            return Ok(None);
        };
        let top = self.arc(*top_arc)?.parent();
        Ok(self.is_instanced(top, graph_type)?.then_some(top))
    }

    /// Bring the cached composition for `arc` up to date and return it.
    fn refresh_net(&self, arc: ArcId, graph_type: GraphType) -> Result<TransitionCache, StrataError> {
        let now = self.current_seq(graph_type);
        if let Some(cache) = self.wrt_cache.borrow().get(&arc) {
            if cache.verified >= now {
                return Ok(cache.net.clone());
            }
        }

        let segment = self.segment_above(arc, graph_type)?;
        let top = self.segment_top(&segment, graph_type)?;
        let mut net_above = TransitionCache::default();
        let mut above: Option<ArcId> = None;
        for current in segment.iter().rev().copied() {
            let transitions = self.arc(current)?.transitions();
            let mut caches = self.wrt_cache.borrow_mut();
            let net = match caches.get(&current).filter(|c| c.above == above) {
                Some(c) if c.verified >= now => c.net.clone(),
                Some(c) => TransitionCache::cached_compose(&net_above, &c.net, transitions, now)?,
                None => {
                    debug!(arc = current.0, graph_type = %graph_type, "rebuilding wrt cache");
                    TransitionCache::cached_compose(&net_above, &TransitionCache::new(now), transitions, now)?
                }
            };
            caches.insert(
                current,
                SubtreeCache {
                    net: net.clone(),
                    above,
                    top,
                    verified: now,
                },
            );
            net_above = net;
            above = Some(current);
        }
        Ok(net_above)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphConfig;
    use crate::graph::NodeKind;
    use crate::transition::{StateValue, Transition};
    use crate::wrapper::AllTransitionsWrapper;
    use crate::TransitionKind;
    use glam::Vec3;

    const R: GraphType = GraphType::RENDER;

    fn translate(graph: &mut SceneGraph, arc: ArcId, offset: Vec3) {
        graph
            .set_transition(arc, TransitionKind::TRANSFORM, Transition::translate(offset))
            .expect("set");
    }

    fn node(graph: &mut SceneGraph, name: &str) -> NodeId {
        graph.create_node(name, NodeKind::Plain)
    }

    #[test]
    fn same_node_is_identity() {
        let mut graph = SceneGraph::new();
        let a = node(&mut graph, "a");
        assert_eq!(graph.wrt_matrix(a, a, R).expect("wrt"), Mat4::IDENTITY);
    }

    #[test]
    fn sibling_wrt_goes_through_ancestor() {
        let mut graph = SceneGraph::new();
        let root = node(&mut graph, "root");
        let a = node(&mut graph, "a");
        let b = node(&mut graph, "b");
        let ra = graph.attach_arc(root, a, 0, R).expect("attach");
        let rb = graph.attach_arc(root, b, 0, R).expect("attach");
        translate(&mut graph, ra, Vec3::X);
        translate(&mut graph, rb, Vec3::Y);

        let m = graph.wrt_matrix(a, b, R).expect("wrt");
        assert!(m.abs_diff_eq(Mat4::from_translation(Vec3::new(1.0, -1.0, 0.0)), 1.0e-6));
    }

    #[test]
    fn disconnected_nodes_have_no_common_ancestor() {
        let mut graph = SceneGraph::new();
        let a = node(&mut graph, "a");
        let b = node(&mut graph, "b");
        assert!(matches!(
            graph.wrt_matrix(a, b, R),
            Err(StrataError::NoCommonAncestor { .. })
        ));
    }

    #[test]
    fn disambiguator_selects_instance() {
        let mut graph = SceneGraph::new();
        let root = node(&mut graph, "root");
        let left = node(&mut graph, "left");
        let right = node(&mut graph, "right");
        let shared = node(&mut graph, "shared");
        let rl = graph.attach_arc(root, left, 0, R).expect("attach");
        let rr = graph.attach_arc(root, right, 0, R).expect("attach");
        let ls = graph.attach_arc(left, shared, 0, R).expect("attach");
        let rs = graph.attach_arc(right, shared, 0, R).expect("attach");
        translate(&mut graph, rl, Vec3::X);
        translate(&mut graph, rr, Vec3::Y);

        let via_right: TransformWrapper = graph.wrt(shared, &[rr, rs], root, &[], R).expect("wrt");
        assert_eq!(via_right.matrix(), Mat4::from_translation(Vec3::Y));

        // No match: first inserted parent arc wins.
        let fallback: TransformWrapper = graph.wrt(shared, &[], root, &[], R).expect("wrt");
        assert_eq!(fallback.matrix(), Mat4::from_translation(Vec3::X));
        let via_left: TransformWrapper = graph.wrt(shared, &[ls], root, &[], R).expect("wrt");
        assert_eq!(via_left, fallback);
    }

    #[test]
    fn ambiguous_wrt_abort_fails() {
        let mut graph = SceneGraph::with_config(GraphConfig {
            ambiguous_wrt_abort: true,
            ..GraphConfig::default()
        });
        let root = node(&mut graph, "root");
        let left = node(&mut graph, "left");
        let right = node(&mut graph, "right");
        let shared = node(&mut graph, "shared");
        graph.attach_arc(root, left, 0, R).expect("attach");
        graph.attach_arc(root, right, 0, R).expect("attach");
        graph.attach_arc(left, shared, 0, R).expect("attach");
        graph.attach_arc(right, shared, 0, R).expect("attach");

        assert!(matches!(
            graph.wrt_matrix(shared, root, R),
            Err(StrataError::AmbiguousWrt { node, .. }) if node == shared
        ));
    }

    #[test]
    fn cache_follows_mutation_above_segment() {
        let mut graph = SceneGraph::new();
        let root = node(&mut graph, "root");
        let a = node(&mut graph, "a");
        let b = node(&mut graph, "b");
        let c = node(&mut graph, "c");
        let ra = graph.attach_arc(root, a, 0, R).expect("attach");
        let ab = graph.attach_arc(a, b, 0, R).expect("attach");
        graph.attach_arc(b, c, 0, R).expect("attach");
        translate(&mut graph, ra, Vec3::X);
        translate(&mut graph, ab, Vec3::Y);

        let first = graph.wrt_matrix(c, root, R).expect("wrt");
        assert_eq!(first, Mat4::from_translation(Vec3::new(1.0, 1.0, 0.0)));

        translate(&mut graph, ra, Vec3::Z);
        let second = graph.wrt_matrix(c, root, R).expect("wrt");
        assert_eq!(second, Mat4::from_translation(Vec3::new(0.0, 1.0, 1.0)));

        graph
            .clear_transition(ab, TransitionKind::TRANSFORM)
            .expect("clear");
        assert_eq!(
            graph.wrt_matrix(c, root, R).expect("wrt"),
            Mat4::from_translation(Vec3::Z)
        );
    }

    #[test]
    fn cache_follows_instancing_change() {
        let mut graph = SceneGraph::new();
        let root = node(&mut graph, "root");
        let a = node(&mut graph, "a");
        let other = node(&mut graph, "other");
        let leaf = node(&mut graph, "leaf");
        let ra = graph.attach_arc(root, a, 0, R).expect("attach");
        let ro = graph.attach_arc(root, other, 1, R).expect("attach");
        let al = graph.attach_arc(a, leaf, 0, R).expect("attach");
        translate(&mut graph, ra, Vec3::X);
        translate(&mut graph, ro, Vec3::Y);

        assert_eq!(graph.top_subtree(al).expect("top"), None);
        let before: TransformWrapper = graph.wrt(leaf, &[], root, &[], R).expect("wrt");

        let ol = graph.attach_arc(other, leaf, 0, R).expect("attach");
        assert_eq!(graph.top_subtree(al).expect("top"), None);
        let via_other: TransformWrapper = graph.wrt(leaf, &[ol], root, &[], R).expect("wrt");
        let uncached: TransformWrapper = graph.uncached_wrt(leaf, &[ol], root, &[], R).expect("wrt");
        assert_ne!(before, via_other);
        assert_eq!(via_other, uncached);
    }

    #[test]
    fn top_subtree_reports_instanced_ancestor() {
        let mut graph = SceneGraph::new();
        let p1 = node(&mut graph, "p1");
        let p2 = node(&mut graph, "p2");
        let shared = node(&mut graph, "shared");
        let mid = node(&mut graph, "mid");
        let leaf = node(&mut graph, "leaf");
        graph.attach_arc(p1, shared, 0, R).expect("attach");
        graph.attach_arc(p2, shared, 0, R).expect("attach");
        graph.attach_arc(shared, mid, 0, R).expect("attach");
        let low = graph.attach_arc(mid, leaf, 0, R).expect("attach");

        assert_eq!(graph.top_subtree(low).expect("top"), Some(shared));
    }

    #[test]
    fn all_transitions_wrt_inverts_texture() {
        let mut graph = SceneGraph::new();
        let root = node(&mut graph, "root");
        let a = node(&mut graph, "a");
        let ra = graph.attach_arc(root, a, 0, R).expect("attach");
        graph
            .set_transition(
                ra,
                TransitionKind::TEXTURE,
                Transition::on(StateValue::Texture("stone".into())),
            )
            .expect("set");

        let down: AllTransitionsWrapper = graph.wrt(a, &[], root, &[], R).expect("wrt");
        assert!(down.transitions().contains(TransitionKind::TEXTURE));
        let up: AllTransitionsWrapper = graph.wrt(root, &[], a, &[], R).expect("wrt");
        assert_eq!(
            up.transitions().get(TransitionKind::TEXTURE),
            Some(&Transition::off())
        );
    }

    #[test]
    fn paranoid_and_uncached_modes_agree() {
        let mut graph = SceneGraph::with_config(GraphConfig {
            paranoid_wrt: true,
            ..GraphConfig::default()
        });
        let root = node(&mut graph, "root");
        let a = node(&mut graph, "a");
        let b = node(&mut graph, "b");
        let ra = graph.attach_arc(root, a, 0, R).expect("attach");
        let ab = graph.attach_arc(a, b, 0, R).expect("attach");
        translate(&mut graph, ra, Vec3::X);
        graph
            .set_transition(ab, TransitionKind::TRANSFORM, Transition::matrix(Mat4::from_rotation_z(0.5)))
            .expect("set");

        let cached = graph.wrt_matrix(b, root, R).expect("wrt");
        graph.set_config(GraphConfig {
            cache_wrt: false,
            ..GraphConfig::default()
        });
        let plain = graph.wrt_matrix(b, root, R).expect("wrt");
        assert!(cached.abs_diff_eq(plain, 1.0e-6));
    }
}

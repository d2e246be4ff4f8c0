//! # Property-Based Tests
//!
//! Algebraic laws of the transition families and structural invariants of
//! the scene graph, checked with proptest.

use glam::{Mat4, Quat, Vec3};
use proptest::collection::vec;
use proptest::prelude::*;
use strata_core::{
    Attribute, AttributeValue, BitMask, Direction, GraphType, MultiAttribute, MultiTransition,
    NodeId, NodeKind, SceneGraph, StateValue, Transition, TransitionFamily, TransitionKind,
    TransformWrapper,
};

const R: GraphType = GraphType::RENDER;

// =============================================================================
// STRATEGIES
// =============================================================================

fn offset() -> impl Strategy<Value = Vec3> {
    (-10.0f32..10.0, -10.0f32..10.0, -10.0f32..10.0).prop_map(|(x, y, z)| Vec3::new(x, y, z))
}

/// Well-conditioned affine matrices: translation, rotation, moderate scale.
fn affine() -> impl Strategy<Value = Mat4> {
    (offset(), -3.0f32..3.0, 0.5f32..2.0)
        .prop_map(|(t, angle, s)| Mat4::from_scale_rotation_translation(Vec3::splat(s), Quat::from_rotation_y(angle), t))
}

fn on_off() -> impl Strategy<Value = Transition> {
    (0u8..3, 0u32..3, "[a-c]").prop_map(|(tag, priority, name)| {
        let t = match tag {
            0 => Transition::identity(TransitionFamily::OnOff),
            1 => Transition::on(StateValue::Texture(name)),
            _ => Transition::off(),
        };
        t.with_priority(priority)
    })
}

fn on_off_attr() -> impl Strategy<Value = Attribute> {
    (proptest::option::of("[a-c]"), 0u32..3).prop_map(|(name, priority)| {
        Attribute::new(AttributeValue::OnOff(name.map(StateValue::Texture))).with_priority(priority)
    })
}

fn direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Identity), Just(Direction::On), Just(Direction::Off)]
}

/// One multi transition body: mostly member-wise, sometimes forcing.
fn multi_body() -> impl Strategy<Value = MultiTransition> {
    (
        prop_oneof![4 => Just(Direction::Identity), 1 => Just(Direction::On), 1 => Just(Direction::Off)],
        vec(("[a-d]", direction()), 0..4),
    )
        .prop_map(|(default_dir, members)| {
            members
                .into_iter()
                .fold(MultiTransition::new(default_dir), |m, (name, dir)| m.with(name, dir))
        })
}

/// Multi transitions at mixed priorities, including ones already composed
/// from several parts.
fn multi_chain() -> impl Strategy<Value = Transition> {
    vec((multi_body(), 0u32..4), 1..4).prop_map(|parts| {
        parts
            .into_iter()
            .map(|(m, priority)| Transition::multi(m).with_priority(priority))
            .reduce(|acc, t| acc.compose(&t, TransitionKind::LIGHT).expect("compose"))
            .unwrap_or_else(|| Transition::identity(TransitionFamily::Multi))
    })
}

fn multi_attr() -> impl Strategy<Value = Attribute> {
    (multi_body(), 0u32..4).prop_map(|(m, priority)| {
        Attribute::new(AttributeValue::Multi(MultiAttribute::all_off().applied(&m))).with_priority(priority)
    })
}

/// Matrix equality scaled to the magnitude of the entries.
fn close(a: Mat4, b: Mat4) -> bool {
    let scale = a.to_cols_array().iter().fold(1.0f32, |m, x| m.max(x.abs()));
    a.abs_diff_eq(b, 1.0e-4 * scale)
}

// =============================================================================
// TRANSITION ALGEBRA
// =============================================================================

proptest! {
    /// Matrix: identity is neutral and apply distributes over compose.
    #[test]
    fn matrix_compose_laws(a in affine(), b in affine(), attr in affine()) {
        let kind = TransitionKind::TRANSFORM;
        let (ta, tb) = (Transition::matrix(a), Transition::matrix(b));
        let identity = Transition::identity(TransitionFamily::Matrix);
        prop_assert_eq!(identity.compose(&ta, kind).expect("compose"), ta.clone());
        prop_assert_eq!(ta.compose(&identity, kind).expect("compose"), ta.clone());

        let start = Attribute::new(AttributeValue::Matrix(attr));
        let direct = ta.compose(&tb, kind).expect("compose").apply(kind, Some(&start)).expect("apply").expect("attr");
        let first = ta.apply(kind, Some(&start)).expect("apply").expect("attr");
        let stepwise = tb.apply(kind, Some(&first)).expect("apply").expect("attr");
        prop_assert!(close(direct.as_matrix().expect("m"), stepwise.as_matrix().expect("m")));
    }

    /// Matrix: composing with the inverse leaves the attribute unchanged.
    #[test]
    fn matrix_invert_round_trip(a in affine(), attr in affine()) {
        let kind = TransitionKind::TRANSFORM;
        let ta = Transition::matrix(a);
        let round = ta.compose(&ta.invert(kind).expect("invert"), kind).expect("compose");
        let start = Attribute::new(AttributeValue::Matrix(attr));
        let applied = round.apply(kind, Some(&start)).expect("apply").expect("attr");
        prop_assert!(close(applied.as_matrix().expect("m"), attr));
    }

    /// On/off: apply distributes over compose for every priority mix.
    #[test]
    fn on_off_compose_laws(a in on_off(), b in on_off(), attr in on_off_attr()) {
        let kind = TransitionKind::TEXTURE;
        let identity = Transition::identity(TransitionFamily::OnOff);
        prop_assert_eq!(a.compose(&identity, kind).expect("compose"), a.clone());

        let direct = a.compose(&b, kind).expect("compose").apply(kind, Some(&attr)).expect("apply");
        let first = a.apply(kind, Some(&attr)).expect("apply").expect("attr");
        let stepwise = b.apply(kind, Some(&first)).expect("apply");
        prop_assert_eq!(direct, stepwise);
    }

    /// Multi: apply distributes over compose for every priority mix.
    #[test]
    fn multi_compose_laws(a in multi_chain(), b in multi_chain(), attr in multi_attr()) {
        let kind = TransitionKind::LIGHT;
        let identity = Transition::identity(TransitionFamily::Multi);
        prop_assert_eq!(a.compose(&identity, kind).expect("compose"), a.clone());

        let direct = a.compose(&b, kind).expect("compose").apply(kind, Some(&attr)).expect("apply");
        let first = a.apply(kind, Some(&attr)).expect("apply").expect("attr");
        let stepwise = b.apply(kind, Some(&first)).expect("apply");
        prop_assert_eq!(direct, stepwise);
    }

    /// Bit masks: composition is exact.
    #[test]
    fn bit_mask_compose_laws(a_and in any::<u32>(), a_or in any::<u32>(), b_and in any::<u32>(), b_or in any::<u32>(), bits in any::<u32>()) {
        let kind = TransitionKind::DRAW_MASK;
        let ta = Transition::bit_mask(BitMask { and_mask: a_and, or_mask: a_or });
        let tb = Transition::bit_mask(BitMask { and_mask: b_and, or_mask: b_or });
        let start = Attribute::new(AttributeValue::BitMask(bits));
        let direct = ta.compose(&tb, kind).expect("compose").apply(kind, Some(&start)).expect("apply");
        let first = ta.apply(kind, Some(&start)).expect("apply").expect("attr");
        let stepwise = tb.apply(kind, Some(&first)).expect("apply");
        prop_assert_eq!(direct, stepwise);
    }
}

// =============================================================================
// GRAPH INVARIANTS
// =============================================================================

#[derive(Debug, Clone)]
enum Op {
    Attach { parent: usize, child: usize, sort: i32 },
    Detach(usize),
    Resort(usize, i32),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..8, 0usize..8, -5i32..5).prop_map(|(parent, child, sort)| Op::Attach { parent, child, sort }),
        (0usize..32).prop_map(Op::Detach),
        (0usize..32, -5i32..5).prop_map(|(arc, sort)| Op::Resort(arc, sort)),
    ]
}

proptest! {
    /// Child lists stay sorted through any mix of attach, detach and re-sort.
    #[test]
    fn child_lists_stay_sorted(ops in vec(op(), 1..60)) {
        let mut graph = SceneGraph::new();
        let nodes: Vec<NodeId> = (0..8)
            .map(|i| {
                let n = graph.create_node(format!("n{}", i), NodeKind::Plain);
                graph.pin_node(n).expect("pin");
                n
            })
            .collect();
        let mut arcs = Vec::new();

        for op in ops {
            match op {
                Op::Attach { parent, child, sort } => {
                    // Cycles are rejected and leave the graph untouched.
                    if let Ok(arc) = graph.attach_arc(nodes[parent], nodes[child], sort, R) {
                        arcs.push(arc);
                    }
                }
                Op::Detach(i) => {
                    if let Some(arc) = arcs.get(i % arcs.len().max(1)).copied() {
                        if graph.arc(arc).expect("arc").is_attached() {
                            graph.detach(arc).expect("detach");
                        } else {
                            graph.attach(arc).ok();
                        }
                    }
                }
                Op::Resort(i, sort) => {
                    if let Some(arc) = arcs.get(i % arcs.len().max(1)).copied() {
                        graph.set_sort(arc, sort).expect("sort");
                    }
                }
            }
        }

        for node in &nodes {
            prop_assert!(graph.verify_arc_list(*node, R).expect("verify"));
            let n = graph.num_children(*node, R).expect("count");
            let sorts: Vec<i32> = (0..n)
                .map(|i| graph.arc(graph.child(*node, R, i).expect("child")).expect("arc").sort())
                .collect();
            prop_assert!(sorts.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    /// Cached wrt matches uncached wrt on random DAGs under random edits.
    #[test]
    fn cache_is_transparent(
        parents in vec(0usize..64, 1..12),
        extra in vec((0usize..64, 0usize..64), 0..4),
        transforms in vec(affine(), 16),
        edits in vec((0usize..64, affine()), 1..8),
    ) {
        let mut graph = SceneGraph::new();
        let mut nodes = vec![graph.create_node("root", NodeKind::Plain)];
        let mut arcs = Vec::new();
        for (i, p) in parents.iter().enumerate() {
            let node = graph.create_node(format!("n{}", i + 1), NodeKind::Plain);
            let parent = nodes[p % nodes.len()];
            arcs.push(graph.attach_arc(parent, node, 0, R).expect("attach"));
            nodes.push(node);
        }
        // Extra arcs always point from an older node to a newer one: no cycles.
        for (a, b) in extra {
            let (lo, hi) = (a % nodes.len(), b % nodes.len());
            if lo < hi && graph.find_arc(nodes[lo], nodes[hi], R).expect("find").is_none() {
                arcs.push(graph.attach_arc(nodes[lo], nodes[hi], 1, R).expect("attach"));
            }
        }
        for (arc, m) in arcs.iter().zip(transforms.iter().cycle()) {
            graph.set_transition(*arc, TransitionKind::TRANSFORM, Transition::matrix(*m)).expect("set");
        }

        for (target, m) in edits {
            for node in &nodes {
                let cached: TransformWrapper = graph.wrt(*node, &[], nodes[0], &[], R).expect("wrt");
                let uncached: TransformWrapper = graph.uncached_wrt(*node, &[], nodes[0], &[], R).expect("wrt");
                prop_assert!(close(cached.matrix(), uncached.matrix()));
            }
            let arc = arcs[target % arcs.len()];
            graph.set_transition(arc, TransitionKind::TRANSFORM, Transition::matrix(m)).expect("set");
        }
        for node in &nodes {
            let cached: TransformWrapper = graph.wrt(*node, &[], nodes[0], &[], R).expect("wrt");
            let uncached: TransformWrapper = graph.uncached_wrt(*node, &[], nodes[0], &[], R).expect("wrt");
            prop_assert!(close(cached.matrix(), uncached.matrix()));
        }
    }
}

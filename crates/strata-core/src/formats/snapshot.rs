//! # Scene Snapshot
//!
//! Binary serialization of a whole `SceneGraph`.
//!
//! Format: Header (5 bytes) + postcard-serialized records.
//! - 4 bytes: Magic ("STRA")
//! - 1 byte: Version
//!
//! Records reference nodes by their index in the node list, never by id, so
//! a loaded graph gets fresh ids. Attached arcs are listed parent by parent
//! in child-list order; detached arcs follow.
//!
//! Loading runs in two phases. The raw records are decoded first, then every
//! node is created, every arc is created detached, and finally the arcs are
//! attached in recorded order so each child list comes back in the same
//! order.

use crate::bounds::BoundingVolume;
use crate::graph::{NodeKind, SceneGraph};
use crate::primitives::{FORMAT_VERSION, HEADER_SIZE, MAGIC_BYTES, MAX_SNAPSHOT_SIZE};
use crate::transition_set::TransitionSet;
use crate::{ArcId, GraphType, NodeId, StrataError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

// =============================================================================
// FILE HEADER
// =============================================================================

/// The snapshot header precedes all records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl SnapshotHeader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *MAGIC_BYTES,
            version: FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), StrataError> {
        if &self.magic != MAGIC_BYTES {
            return Err(StrataError::DeserializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != FORMAT_VERSION {
            return Err(StrataError::DeserializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version, FORMAT_VERSION
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StrataError> {
        let Some(header) = bytes.get(..HEADER_SIZE) else {
            return Err(StrataError::DeserializationError(
                "Header too short".to_string(),
            ));
        };
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&header[0..4]);
        Ok(Self {
            magic,
            version: header[4],
        })
    }
}

impl Default for SnapshotHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// RAW RECORDS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct NodeRecord {
    name: String,
    kind: NodeKind,
    bound: BoundingVolume,
    pinned: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ArcRecord {
    parent: u32,
    child: u32,
    sort: i32,
    graph_type: GraphType,
    transitions: TransitionSet,
    attached: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
struct SceneRecords {
    nodes: Vec<NodeRecord>,
    arcs: Vec<ArcRecord>,
}

impl SceneRecords {
    fn from_graph(graph: &SceneGraph) -> Result<Self, StrataError> {
        let mut index = BTreeMap::new();
        let mut records = Self::default();
        for (i, (id, data)) in graph.nodes.iter().enumerate() {
            let i = u32::try_from(i)
                .map_err(|_| StrataError::SerializationError("too many nodes".to_string()))?;
            index.insert(*id, i);
            records.nodes.push(NodeRecord {
                name: data.name().to_string(),
                kind: data.kind().clone(),
                bound: data.own_bound(),
                pinned: data.is_pinned(),
            });
        }
        let lookup = |node: NodeId| {
            index
                .get(&node)
                .copied()
                .ok_or(StrataError::NodeNotFound(node))
        };

        let mut listed = BTreeSet::new();
        for (id, data) in &graph.nodes {
            let graph_types: BTreeSet<GraphType> = data.graph_types().collect();
            for graph_type in graph_types {
                for arc_id in graph.children(*id, graph_type)? {
                    records.arcs.push(Self::arc_record(graph, *arc_id, &lookup)?);
                    listed.insert(*arc_id);
                }
            }
        }
        for arc_id in graph.arcs.keys().filter(|a| !listed.contains(a)) {
            records.arcs.push(Self::arc_record(graph, *arc_id, &lookup)?);
        }
        Ok(records)
    }

    fn arc_record(
        graph: &SceneGraph,
        arc_id: ArcId,
        lookup: &impl Fn(NodeId) -> Result<u32, StrataError>,
    ) -> Result<ArcRecord, StrataError> {
        let arc = graph.arc(arc_id)?;
        Ok(ArcRecord {
            parent: lookup(arc.parent())?,
            child: lookup(arc.child())?,
            sort: arc.sort(),
            graph_type: arc.graph_type(),
            transitions: arc.transitions().clone(),
            attached: arc.is_attached(),
        })
    }

    /// Reject any arc carrying a transition its kind does not accept.
    fn validate(&self) -> Result<(), StrataError> {
        for (i, record) in self.arcs.iter().enumerate() {
            for (kind, t) in record.transitions.iter() {
                t.validate_for(kind).map_err(|e| {
                    StrataError::DeserializationError(format!("Arc record {}: {}", i, e))
                })?;
            }
        }
        Ok(())
    }

    /// Rebuild a graph; returns it with the new id of every node record.
    fn into_graph(self) -> Result<(SceneGraph, Vec<NodeId>), StrataError> {
        let mut graph = SceneGraph::new();
        let mut ids = Vec::with_capacity(self.nodes.len());
        for record in self.nodes {
            let id = graph.create_node(record.name, record.kind);
            graph.set_node_bound(id, record.bound)?;
            if record.pinned {
                graph.pin_node(id)?;
            }
            ids.push(id);
        }
        let resolve = |index: u32| {
            usize::try_from(index)
                .ok()
                .and_then(|i| ids.get(i).copied())
                .ok_or_else(|| {
                    StrataError::DeserializationError(format!("Arc names unknown node record {}", index))
                })
        };

        let mut to_attach = Vec::new();
        for record in self.arcs {
            let parent = resolve(record.parent)?;
            let child = resolve(record.child)?;
            let arc = graph.create_detached_arc(parent, child, record.sort, record.graph_type)?;
            graph.set_transitions(arc, record.transitions)?;
            if record.attached {
                to_attach.push(arc);
            }
        }
        for arc in to_attach {
            graph.attach(arc)?;
        }
        Ok((graph, ids))
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize a graph to bytes (header + payload).
pub fn scene_to_bytes(graph: &SceneGraph) -> Result<Vec<u8>, StrataError> {
    let records = SceneRecords::from_graph(graph)?;
    let payload = postcard::to_stdvec(&records)
        .map_err(|e| StrataError::SerializationError(e.to_string()))?;

    let mut result = Vec::with_capacity(HEADER_SIZE + payload.len());
    result.extend_from_slice(&SnapshotHeader::new().to_bytes());
    result.extend_from_slice(&payload);
    debug!(
        nodes = records.nodes.len(),
        arcs = records.arcs.len(),
        bytes = result.len(),
        "scene serialized"
    );
    Ok(result)
}

/// Deserialize a graph from bytes.
///
/// Size and header are validated before the payload is decoded. The returned
/// vector maps each node record, in saved order, to its new `NodeId`.
pub fn scene_from_bytes(bytes: &[u8]) -> Result<(SceneGraph, Vec<NodeId>), StrataError> {
    if bytes.len() < HEADER_SIZE {
        return Err(StrataError::DeserializationError(format!(
            "Data too short: minimum {} bytes required",
            HEADER_SIZE
        )));
    }
    if bytes.len() > MAX_SNAPSHOT_SIZE {
        return Err(StrataError::DeserializationError(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_SNAPSHOT_SIZE
        )));
    }

    let header = SnapshotHeader::from_bytes(bytes)?;
    header.validate()?;

    let records: SceneRecords = postcard::from_bytes(&bytes[HEADER_SIZE..]).map_err(|e| {
        StrataError::DeserializationError(format!("Failed to decode scene records: {}", e))
    })?;
    records.validate()?;
    records.into_graph()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransitionKind;
    use crate::transition::{StateValue, Transition};
    use glam::{Mat4, Vec3};

    const R: GraphType = GraphType::RENDER;

    fn sample() -> (SceneGraph, NodeId, NodeId) {
        let mut graph = SceneGraph::new();
        let root = graph.create_node("root", NodeKind::Plain);
        let a = graph.create_node("a", NodeKind::Geom { geoms: vec!["box".into()] });
        let b = graph.create_node("b", NodeKind::Camera);
        let shared = graph.create_node("shared", NodeKind::Plain);
        let ra = graph.attach_arc(root, a, 5, R).expect("attach");
        graph.attach_arc(root, b, 1, R).expect("attach");
        graph.attach_arc(a, shared, 0, R).expect("attach");
        graph.attach_arc(b, shared, 0, R).expect("attach");
        graph
            .set_transition(ra, TransitionKind::TRANSFORM, Transition::translate(Vec3::X))
            .expect("set");
        graph
            .set_transition(
                ra,
                TransitionKind::TEXTURE,
                Transition::on(StateValue::Texture("brick".into())),
            )
            .expect("set");
        graph
            .set_node_bound(a, BoundingVolume::sphere(Vec3::ZERO, 1.0))
            .expect("bound");
        graph.pin_node(shared).expect("pin");
        (graph, root, shared)
    }

    #[test]
    fn header_roundtrip() {
        let header = SnapshotHeader::new();
        let restored = SnapshotHeader::from_bytes(&header.to_bytes()).expect("parse header");
        assert_eq!(restored, header);
        restored.validate().expect("valid");
    }

    #[test]
    fn bytes_roundtrip_bit_exact() {
        let (graph, _, _) = sample();
        let bytes1 = scene_to_bytes(&graph).expect("first serialize");
        let (restored, _) = scene_from_bytes(&bytes1).expect("deserialize");
        let bytes2 = scene_to_bytes(&restored).expect("second serialize");
        assert_eq!(bytes1, bytes2, "save -> load -> save must produce identical bytes");
    }

    #[test]
    fn loaded_graph_keeps_structure_and_state() {
        let (graph, root, shared) = sample();
        let (restored, ids) = scene_from_bytes(&scene_to_bytes(&graph).expect("save")).expect("load");
        let new_root = ids[0];
        let new_shared = ids[3];

        assert_eq!(restored.node_count(), 4);
        assert_eq!(restored.arc_count(), 4);
        assert_eq!(
            restored.describe(new_root, R).expect("describe"),
            graph.describe(root, R).expect("describe")
        );
        assert!(restored.node(new_shared).expect("node").is_pinned());
        assert!(restored.is_instanced(new_shared, R).expect("instanced"));
        assert_eq!(
            restored.node(ids[1]).expect("node").own_bound(),
            BoundingVolume::sphere(Vec3::ZERO, 1.0)
        );
        assert_eq!(
            restored.wrt_matrix(new_shared, new_root, R).ok(),
            graph.wrt_matrix(shared, root, R).ok()
        );
        assert_eq!(
            restored
                .wrt_matrix(ids[1], new_root, R)
                .expect("wrt"),
            Mat4::from_translation(Vec3::X)
        );
    }

    #[test]
    fn detached_arcs_survive() {
        let mut graph = SceneGraph::new();
        let root = graph.create_node("root", NodeKind::Plain);
        let leaf = graph.create_node("leaf", NodeKind::Plain);
        let arc = graph.create_detached_arc(root, leaf, 2, R).expect("create");
        graph
            .set_transition(arc, TransitionKind::TRANSFORM, Transition::translate(Vec3::Y))
            .expect("set");

        let (restored, ids) = scene_from_bytes(&scene_to_bytes(&graph).expect("save")).expect("load");
        assert_eq!(restored.arc_count(), 1);
        assert_eq!(restored.num_children(ids[0], R).expect("count"), 0);
        let restored_arc = restored.arc_ids().next().expect("arc");
        assert!(!restored.arc(restored_arc).expect("arc").is_attached());
        assert!(restored.has_transition(restored_arc, TransitionKind::TRANSFORM).expect("has"));
    }

    #[test]
    fn invalid_magic_rejected() {
        let mut bytes = vec![0u8; 10];
        bytes[0..4].copy_from_slice(b"XXXX");
        assert!(matches!(
            scene_from_bytes(&bytes),
            Err(StrataError::DeserializationError(_))
        ));
    }

    #[test]
    fn wrong_version_and_short_data_rejected() {
        let mut bytes = scene_to_bytes(&SceneGraph::new()).expect("save");
        bytes[4] = FORMAT_VERSION + 1;
        assert!(scene_from_bytes(&bytes).is_err());
        assert!(scene_from_bytes(b"STR").is_err());
    }

    #[test]
    fn truncated_payload_rejected() {
        let (graph, _, _) = sample();
        let bytes = scene_to_bytes(&graph).expect("save");
        assert!(scene_from_bytes(&bytes[..bytes.len() / 2]).is_err());
    }

    #[test]
    fn transition_invalid_for_its_kind_rejected() {
        // Same wire shape as a TransitionSet, without the per-kind check.
        let raw: BTreeMap<TransitionKind, Transition> =
            [(TransitionKind::TRANSFORM, Transition::off())].into();
        let transitions: TransitionSet =
            postcard::from_bytes(&postcard::to_stdvec(&raw).expect("encode")).expect("decode");

        let node = |name: &str| NodeRecord {
            name: name.to_string(),
            kind: NodeKind::Plain,
            bound: BoundingVolume::Empty,
            pinned: false,
        };
        let records = SceneRecords {
            nodes: vec![node("root"), node("child")],
            arcs: vec![ArcRecord {
                parent: 0,
                child: 1,
                sort: 0,
                graph_type: GraphType::RENDER,
                transitions,
                attached: true,
            }],
        };
        let mut bytes = SnapshotHeader::new().to_bytes().to_vec();
        bytes.extend(postcard::to_stdvec(&records).expect("encode"));

        let result = scene_from_bytes(&bytes).map(|_| ());
        assert!(
            matches!(&result, Err(StrataError::DeserializationError(msg)) if msg.contains("Arc record 0")),
            "{:?}",
            result
        );
    }
}

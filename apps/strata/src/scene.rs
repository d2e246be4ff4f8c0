//! # Scene Descriptions
//!
//! A scene file lists named nodes and the arcs joining them. The format is
//! picked from the file extension: `.json` is JSON, anything else is TOML.
//!
//! ```toml
//! [[nodes]]
//! name = "root"
//!
//! [[nodes]]
//! name = "crate"
//! kind = "geom"
//! geoms = ["crate.mesh"]
//!
//! [[arcs]]
//! parent = "root"
//! child = "crate"
//! sort = 0
//! transitions = [
//!     { type = "translate", offset = [0.0, 2.0, 0.0] },
//!     { type = "texture", name = "wood" },
//! ]
//! ```
//!
//! Transform steps (`translate`, `rotate`, `scale`) on one arc multiply in
//! listed order; for every other kind the last entry wins.

use crate::error::CliError;
use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use strata_core::{
    BillboardParams, BitMask, BoundingVolume, Direction, GraphConfig, GraphType, MultiTransition,
    NodeId, NodeKind, SceneGraph, StateValue, Transition, TransitionKind, TransitionSet,
};
use tracing::debug;

// =============================================================================
// DESCRIPTION MODEL
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SceneDescription {
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub arcs: Vec<ArcSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KindSpec {
    #[default]
    Plain,
    Geom,
    Camera,
    Light,
    Lod,
    Effect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSpec {
    pub name: String,
    #[serde(default)]
    pub kind: KindSpec,
    /// Geometry names of a `geom` node.
    #[serde(default)]
    pub geoms: Vec<String>,
    /// Effect name of an `effect` node.
    #[serde(default)]
    pub effect: Option<String>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub bound: Option<BoundSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoundSpec {
    pub center: [f32; 3],
    pub radius: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArcSpec {
    pub parent: String,
    pub child: String,
    #[serde(default)]
    pub sort: i32,
    #[serde(default = "default_graph")]
    pub graph: String,
    #[serde(default)]
    pub transitions: Vec<TransitionSpec>,
}

fn default_graph() -> String {
    "render".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TransitionSpec {
    Translate {
        offset: [f32; 3],
    },
    /// Rotation about `axis` by `degrees`.
    Rotate {
        axis: [f32; 3],
        degrees: f32,
    },
    Scale {
        factor: [f32; 3],
    },
    /// Without a name the texture is switched off.
    Texture {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        priority: u32,
    },
    /// Without a value the color is switched off.
    Color {
        #[serde(default)]
        rgba: Option<[f32; 4]>,
        #[serde(default)]
        priority: u32,
    },
    RenderMode {
        value: i64,
    },
    /// `all` forces every light first; `on`/`off` then name exceptions.
    Light {
        #[serde(default)]
        all: Option<bool>,
        #[serde(default)]
        on: Vec<String>,
        #[serde(default)]
        off: Vec<String>,
        #[serde(default)]
        priority: u32,
    },
    DrawMask {
        #[serde(default)]
        set: u32,
        #[serde(default)]
        clear: u32,
    },
    Billboard {
        #[serde(default)]
        axial: bool,
    },
}

// =============================================================================
// PARSING
// =============================================================================

/// Parse a graph type name: `render`, `data`, or a numeric id.
pub fn parse_graph_type(name: &str) -> Result<GraphType, CliError> {
    match name {
        "render" => Ok(GraphType::RENDER),
        "data" => Ok(GraphType::DATA),
        other => other
            .parse::<u16>()
            .map(GraphType::new)
            .map_err(|_| CliError::scene(format!("unknown graph type '{}'", other))),
    }
}

impl SceneDescription {
    pub fn from_toml(text: &str) -> Result<Self, CliError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_json(text: &str) -> Result<Self, CliError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a scene file, choosing the format by extension.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let text = std::fs::read_to_string(path).map_err(|e| CliError::io(path, e))?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let scene = if is_json {
            Self::from_json(&text)?
        } else {
            Self::from_toml(&text)?
        };
        scene.validate()?;
        Ok(scene)
    }

    /// Check names before anything is built.
    pub fn validate(&self) -> Result<(), CliError> {
        let mut names = BTreeSet::new();
        for node in &self.nodes {
            if node.name.is_empty() {
                return Err(CliError::scene("node names must not be empty"));
            }
            if !names.insert(node.name.as_str()) {
                return Err(CliError::scene(format!("duplicate node '{}'", node.name)));
            }
            if node.kind != KindSpec::Geom && !node.geoms.is_empty() {
                return Err(CliError::scene(format!("'{}' lists geoms but is not a geom node", node.name)));
            }
        }
        for arc in &self.arcs {
            for end in [&arc.parent, &arc.child] {
                if !names.contains(end.as_str()) {
                    return Err(CliError::scene(format!("arc names unknown node '{}'", end)));
                }
            }
            parse_graph_type(&arc.graph)?;
        }
        Ok(())
    }

    /// Build the graph. Arcs are attached in listed order.
    pub fn build(&self, config: GraphConfig) -> Result<BuiltScene, CliError> {
        self.validate()?;
        let mut graph = SceneGraph::with_config(config);
        let mut names = BTreeMap::new();
        for spec in &self.nodes {
            let id = graph.create_node(spec.name.clone(), spec.node_kind());
            if let Some(bound) = spec.bound {
                graph.set_node_bound(id, BoundingVolume::sphere(Vec3::from(bound.center), bound.radius))?;
            }
            if spec.pinned {
                graph.pin_node(id)?;
            }
            names.insert(spec.name.clone(), id);
        }

        for spec in &self.arcs {
            let parent = lookup(&names, &spec.parent)?;
            let child = lookup(&names, &spec.child)?;
            let graph_type = parse_graph_type(&spec.graph)?;
            let arc = graph.attach_arc(parent, child, spec.sort, graph_type)?;
            graph.set_transitions(arc, transition_set(&spec.transitions)?)?;
        }
        debug!(nodes = graph.node_count(), arcs = graph.arc_count(), "scene built");

        let order = self
            .nodes
            .iter()
            .filter_map(|n| names.get(&n.name).copied())
            .collect();
        Ok(BuiltScene { graph, names, order })
    }
}

impl NodeSpec {
    fn node_kind(&self) -> NodeKind {
        match self.kind {
            KindSpec::Plain => NodeKind::Plain,
            KindSpec::Geom => NodeKind::Geom {
                geoms: self.geoms.clone(),
            },
            KindSpec::Camera => NodeKind::Camera,
            KindSpec::Light => NodeKind::Light,
            KindSpec::Lod => NodeKind::Lod,
            KindSpec::Effect => NodeKind::Effect {
                name: self.effect.clone().unwrap_or_else(|| self.name.clone()),
            },
        }
    }
}

fn lookup(names: &BTreeMap<String, NodeId>, name: &str) -> Result<NodeId, CliError> {
    names
        .get(name)
        .copied()
        .ok_or_else(|| CliError::scene(format!("unknown node '{}'", name)))
}

/// Translate an arc's transition list into a `TransitionSet`.
pub fn transition_set(specs: &[TransitionSpec]) -> Result<TransitionSet, CliError> {
    let mut set = TransitionSet::new();
    let mut transform: Option<Mat4> = None;
    for spec in specs {
        let step = match spec {
            TransitionSpec::Translate { offset } => Some(Mat4::from_translation(Vec3::from(*offset))),
            TransitionSpec::Rotate { axis, degrees } => {
                let axis = Vec3::from(*axis)
                    .try_normalize()
                    .ok_or_else(|| CliError::scene("rotation axis must not be zero"))?;
                Some(Mat4::from_quat(Quat::from_axis_angle(axis, degrees.to_radians())))
            }
            TransitionSpec::Scale { factor } => Some(Mat4::from_scale(Vec3::from(*factor))),
            _ => None,
        };
        if let Some(step) = step {
            transform = Some(transform.unwrap_or(Mat4::IDENTITY) * step);
            continue;
        }

        let (kind, transition) = match spec {
            TransitionSpec::Texture { name, priority } => (
                TransitionKind::TEXTURE,
                on_or_off(name.clone().map(StateValue::Texture)).with_priority(*priority),
            ),
            TransitionSpec::Color { rgba, priority } => (
                TransitionKind::COLOR,
                on_or_off(rgba.map(StateValue::Color)).with_priority(*priority),
            ),
            TransitionSpec::RenderMode { value } => (
                TransitionKind::RENDER_MODE,
                Transition::set_to(StateValue::Int(*value)),
            ),
            TransitionSpec::Light { all, on, off, priority } => {
                let default_dir = match all {
                    Some(true) => Direction::On,
                    Some(false) => Direction::Off,
                    None => Direction::Identity,
                };
                let mut multi = MultiTransition::new(default_dir);
                for name in on {
                    multi.set(name.clone(), Direction::On);
                }
                for name in off {
                    multi.set(name.clone(), Direction::Off);
                }
                (TransitionKind::LIGHT, Transition::multi(multi).with_priority(*priority))
            }
            TransitionSpec::DrawMask { set: bits_on, clear } => (
                TransitionKind::DRAW_MASK,
                Transition::bit_mask(BitMask {
                    and_mask: !clear,
                    or_mask: *bits_on,
                }),
            ),
            TransitionSpec::Billboard { axial } => {
                let params = if *axial {
                    BillboardParams::axial()
                } else {
                    BillboardParams::point_eye()
                };
                (TransitionKind::BILLBOARD, Transition::billboard(params))
            }
            TransitionSpec::Translate { .. } | TransitionSpec::Rotate { .. } | TransitionSpec::Scale { .. } => {
                continue;
            }
        };
        set.set(kind, transition)?;
    }
    if let Some(m) = transform {
        set.set(TransitionKind::TRANSFORM, Transition::matrix(m))?;
    }
    Ok(set)
}

fn on_or_off(value: Option<StateValue>) -> Transition {
    value.map_or_else(Transition::off, Transition::on)
}

// =============================================================================
// BUILT SCENE
// =============================================================================

/// A graph built from a description, with its node names.
#[derive(Debug)]
pub struct BuiltScene {
    pub graph: SceneGraph,
    names: BTreeMap<String, NodeId>,
    order: Vec<NodeId>,
}

impl BuiltScene {
    /// Node id by name.
    pub fn node(&self, name: &str) -> Result<NodeId, CliError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| CliError::Usage(format!("no node named '{}'", name)))
    }

    /// Nodes without parents in `graph_type`, in description order.
    pub fn roots(&self, graph_type: GraphType) -> Vec<NodeId> {
        roots_in(&self.graph, self.order.iter().copied(), graph_type)
    }
}

/// Nodes from `candidates` that have no parent arcs in `graph_type`.
pub fn roots_in(
    graph: &SceneGraph,
    candidates: impl IntoIterator<Item = NodeId>,
    graph_type: GraphType,
) -> Vec<NodeId> {
    candidates
        .into_iter()
        .filter(|n| matches!(graph.num_parents(*n, graph_type), Ok(0)))
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================

//! CLI command implementations.
//!
//! Every command returns the text to print; `execute` does the printing.

use crate::error::CliError;
use crate::scene::{BuiltScene, SceneDescription, parse_graph_type, roots_in};
use glam::Mat4;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use strata_core::primitives::MAX_SNAPSHOT_SIZE;
use strata_core::{
    GraphConfig, GraphReducer, GraphType, MultiAttribute, NodeId, SceneGraph, StateCollector,
    StateGuardian, StateValue, TransformWrapper, TransitionKind, scene_from_bytes, scene_to_bytes,
};
use tracing::info;

/// Largest scene description accepted (16 MB).
const MAX_SCENE_SIZE: u64 = 16 * 1024 * 1024;

/// Output options shared by every command.
#[derive(Debug, Clone, Copy, Default)]
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

// =============================================================================
// FILE HELPERS
// =============================================================================

/// Reject files larger than `max_size` before reading them.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), CliError> {
    let metadata = std::fs::metadata(path).map_err(|e| CliError::io(path, e))?;
    if metadata.len() > max_size {
        return Err(CliError::Usage(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and require a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, CliError> {
    let canonical = path.canonicalize().map_err(|e| CliError::io(path, e))?;
    if !canonical.is_file() {
        return Err(CliError::Usage(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }
    Ok(canonical)
}

/// Canonicalize the parent of an output path; the file itself may not exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, CliError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let canonical_parent = parent.canonicalize().map_err(|e| CliError::io(parent, e))?;
    if !canonical_parent.is_dir() {
        return Err(CliError::Usage(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }
    let filename = path
        .file_name()
        .ok_or_else(|| CliError::Usage("Output path has no filename".to_string()))?;
    Ok(canonical_parent.join(filename))
}

/// Read, validate and build a scene description.
pub fn load_scene(path: &Path, config: GraphConfig) -> Result<BuiltScene, CliError> {
    let path = validate_file_path(path)?;
    validate_file_size(&path, MAX_SCENE_SIZE)?;
    SceneDescription::load(&path)?.build(config)
}

fn json_text(value: &serde_json::Value) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn tree_text(graph: &SceneGraph, roots: &[NodeId], graph_type: GraphType) -> Result<String, CliError> {
    let mut out = String::new();
    for root in roots {
        out.push_str(&graph.describe(*root, graph_type)?);
    }
    Ok(out.trim_end().to_string())
}

fn matrix_rows(m: &Mat4) -> [[f32; 4]; 4] {
    [0, 1, 2, 3].map(|i| m.row(i).to_array())
}

// =============================================================================
// INSPECT COMMAND
// =============================================================================

pub fn cmd_inspect(scene: &Path, graph: &str, config: GraphConfig, out: Output) -> Result<String, CliError> {
    let graph_type = parse_graph_type(graph)?;
    let built = load_scene(scene, config)?;
    let roots = built.roots(graph_type);

    if out.json {
        let tree = tree_text(&built.graph, &roots, graph_type)?;
        return json_text(&serde_json::json!({
            "graph": graph_type.to_string(),
            "nodes": built.graph.node_count(),
            "arcs": built.graph.arc_count(),
            "roots": roots.len(),
            "tree": tree.lines().collect::<Vec<_>>(),
        }));
    }

    let mut text = String::new();
    if !out.quiet {
        let _ = writeln!(
            text,
            "{} nodes, {} arcs, {} root(s) in the {} graph",
            built.graph.node_count(),
            built.graph.arc_count(),
            roots.len(),
            graph_type
        );
    }
    text.push_str(&tree_text(&built.graph, &roots, graph_type)?);
    Ok(text)
}

// =============================================================================
// WRT COMMAND
// =============================================================================

pub fn cmd_wrt(
    scene: &Path,
    from: &str,
    to: &str,
    uncached: bool,
    graph: &str,
    config: GraphConfig,
    out: Output,
) -> Result<String, CliError> {
    let graph_type = parse_graph_type(graph)?;
    let built = load_scene(scene, config)?;
    let (from_id, to_id) = (built.node(from)?, built.node(to)?);

    let net: TransformWrapper = if uncached {
        built.graph.uncached_wrt(from_id, &[], to_id, &[], graph_type)?
    } else {
        built.graph.wrt(from_id, &[], to_id, &[], graph_type)?
    };
    let rows = matrix_rows(&net.matrix());
    info!(from, to, uncached, "resolved relative transform");

    if out.json {
        return json_text(&serde_json::json!({
            "from": from,
            "to": to,
            "cached": !uncached,
            "rows": rows,
        }));
    }

    let mut text = String::new();
    if !out.quiet {
        let _ = writeln!(text, "{} relative to {}:", from, to);
    }
    for row in rows {
        let cells: Vec<String> = row.iter().map(|v| format!("{:>10.4}", v)).collect();
        let _ = writeln!(text, "{}", cells.join(" "));
    }
    Ok(text.trim_end().to_string())
}

// =============================================================================
// RESOLVE COMMAND
// =============================================================================

/// `StateGuardian` that renders each issued attribute as text.
#[derive(Debug, Default)]
struct TextGuardian {
    lines: Vec<(String, String)>,
}

fn value_text(value: &StateValue) -> String {
    match value {
        StateValue::Texture(name) | StateValue::Name(name) => name.clone(),
        StateValue::Color(c) => format!("rgba({}, {}, {}, {})", c[0], c[1], c[2], c[3]),
        StateValue::Fog(fog) => format!("fog(density {})", fog.density),
        StateValue::Int(v) => v.to_string(),
    }
}

impl StateGuardian for TextGuardian {
    fn issue_transform(&mut self, kind: TransitionKind, matrix: &Mat4) {
        let (_, _, translation) = matrix.to_scale_rotation_translation();
        self.lines.push((kind.to_string(), format!("translation {}", translation)));
    }

    fn issue_on_off(&mut self, kind: TransitionKind, value: Option<&StateValue>) {
        let text = value.map_or_else(|| "off".to_string(), value_text);
        self.lines.push((kind.to_string(), text));
    }

    fn issue_value(&mut self, kind: TransitionKind, value: Option<&StateValue>) {
        let text = value.map_or_else(|| "unset".to_string(), value_text);
        self.lines.push((kind.to_string(), text));
    }

    fn issue_multi(&mut self, kind: TransitionKind, state: &MultiAttribute) {
        let text = if state.base_on() {
            let off: Vec<&str> = state.off_properties().collect();
            if off.is_empty() { "all on".to_string() } else { format!("all on except {}", off.join(", ")) }
        } else {
            let on: Vec<&str> = state.on_properties().collect();
            if on.is_empty() { "all off".to_string() } else { format!("on: {}", on.join(", ")) }
        };
        self.lines.push((kind.to_string(), text));
    }

    fn issue_bit_mask(&mut self, kind: TransitionKind, bits: u32) {
        self.lines.push((kind.to_string(), format!("{:#010x}", bits)));
    }
}

pub fn cmd_resolve(
    scene: &Path,
    camera: Option<&str>,
    graph: &str,
    config: GraphConfig,
    out: Output,
) -> Result<String, CliError> {
    let graph_type = parse_graph_type(graph)?;
    let built = load_scene(scene, config)?;
    let camera = camera.map(|name| built.node(name)).transpose()?;

    let mut records = Vec::new();
    for root in built.roots(graph_type) {
        let mut collector = camera.map_or_else(StateCollector::new, StateCollector::with_camera);
        for state in collector.collect(&built.graph, root, graph_type)? {
            let mut guardian = TextGuardian::default();
            state.attrs.issue(&mut guardian);
            let name = built.graph.node(state.node)?.name().to_string();
            records.push((name, state.chain.len(), guardian.lines));
        }
    }

    if out.json {
        let states: Vec<serde_json::Value> = records
            .iter()
            .map(|(name, depth, lines)| {
                let attrs: serde_json::Map<String, serde_json::Value> = lines
                    .iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                    .collect();
                serde_json::json!({ "node": name, "depth": depth, "state": attrs })
            })
            .collect();
        return json_text(&serde_json::json!({ "states": states }));
    }

    let mut text = String::new();
    if !out.quiet {
        let _ = writeln!(text, "{} reached instance(s)", records.len());
    }
    for (name, depth, lines) in &records {
        let _ = writeln!(text, "{}{}", "  ".repeat(*depth), name);
        for (kind, value) in lines {
            let _ = writeln!(text, "{}  {} = {}", "  ".repeat(*depth), kind, value);
        }
    }
    Ok(text.trim_end().to_string())
}

// =============================================================================
// FLATTEN COMMAND
// =============================================================================

pub fn cmd_flatten(
    scene: &Path,
    combine_siblings: bool,
    graph: &str,
    config: GraphConfig,
    out: Output,
) -> Result<String, CliError> {
    let graph_type = parse_graph_type(graph)?;
    let mut built = load_scene(scene, config)?;
    let before = (built.graph.node_count(), built.graph.arc_count());
    let roots = built.roots(graph_type);

    let reducer = GraphReducer::new(graph_type);
    let mut removed = 0;
    for root in &roots {
        removed += reducer.flatten(&mut built.graph, *root, combine_siblings)?;
    }
    let after = (built.graph.node_count(), built.graph.arc_count());
    info!(removed, combine_siblings, "flatten complete");

    // Merged-away nodes are gone; the roots never are.
    let tree = tree_text(&built.graph, &roots, graph_type)?;
    if out.json {
        return json_text(&serde_json::json!({
            "removed_arcs": removed,
            "before": { "nodes": before.0, "arcs": before.1 },
            "after": { "nodes": after.0, "arcs": after.1 },
            "tree": tree.lines().collect::<Vec<_>>(),
        }));
    }

    let mut text = String::new();
    if !out.quiet {
        let _ = writeln!(
            text,
            "Removed {} arc(s): {} nodes / {} arcs -> {} nodes / {} arcs",
            removed, before.0, before.1, after.0, after.1
        );
    }
    text.push_str(&tree);
    Ok(text)
}

// =============================================================================
// SNAPSHOT COMMANDS
// =============================================================================

pub fn cmd_snapshot(scene: &Path, output: &Path, config: GraphConfig, out: Output) -> Result<String, CliError> {
    let built = load_scene(scene, config)?;
    let target = validate_output_path(output)?;
    let bytes = scene_to_bytes(&built.graph)?;
    std::fs::write(&target, &bytes).map_err(|e| CliError::io(&target, e))?;
    info!(path = %target.display(), bytes = bytes.len(), "snapshot written");

    if out.json {
        return json_text(&serde_json::json!({
            "path": target.display().to_string(),
            "bytes": bytes.len(),
            "nodes": built.graph.node_count(),
            "arcs": built.graph.arc_count(),
        }));
    }
    if out.quiet {
        return Ok(String::new());
    }
    Ok(format!(
        "Wrote {} bytes ({} nodes, {} arcs) to {}",
        bytes.len(),
        built.graph.node_count(),
        built.graph.arc_count(),
        target.display()
    ))
}

pub fn cmd_load(input: &Path, config: GraphConfig, out: Output) -> Result<String, CliError> {
    let path = validate_file_path(input)?;
    validate_file_size(&path, MAX_SNAPSHOT_SIZE as u64)?;
    let bytes = std::fs::read(&path).map_err(|e| CliError::io(&path, e))?;
    let (mut graph, nodes) = scene_from_bytes(&bytes)?;
    graph.set_config(config);

    let graph_types: std::collections::BTreeSet<GraphType> = nodes
        .iter()
        .filter_map(|n| graph.node(*n).ok())
        .flat_map(|data| data.graph_types().collect::<Vec<_>>())
        .collect();
    let graph_types = if graph_types.is_empty() {
        vec![GraphType::RENDER]
    } else {
        graph_types.into_iter().collect()
    };

    let mut sections = Vec::new();
    for graph_type in graph_types {
        let roots = roots_in(&graph, nodes.iter().copied(), graph_type);
        sections.push((graph_type, tree_text(&graph, &roots, graph_type)?));
    }

    if out.json {
        let trees: serde_json::Map<String, serde_json::Value> = sections
            .iter()
            .map(|(gt, tree)| (gt.to_string(), serde_json::json!(tree.lines().collect::<Vec<_>>())))
            .collect();
        return json_text(&serde_json::json!({
            "nodes": graph.node_count(),
            "arcs": graph.arc_count(),
            "trees": trees,
        }));
    }

    let mut text = String::new();
    if !out.quiet {
        let _ = writeln!(text, "{} nodes, {} arcs", graph.node_count(), graph.arc_count());
    }
    for (graph_type, tree) in &sections {
        if sections.len() > 1 {
            let _ = writeln!(text, "[{}]", graph_type);
        }
        let _ = writeln!(text, "{}", tree);
    }
    Ok(text.trim_end().to_string())
}

// =============================================================================
// TESTS
// =============================================================================

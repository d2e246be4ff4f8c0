//! # Engine Primitives
//!
//! Compiled-in constants for the Strata engine.
//!
//! These values are fixed at build time and shared by the graph, the wrt
//! resolver and the snapshot format.

/// Maximum number of graph types a single node can belong to at once.
///
/// - A node keeps one `Connection` (parent and child arc lists) per graph type.
/// - Attaching an arc of a third graph type to a node fails with
///   `StrataError::GraphCapacityExceeded` and leaves the graph unchanged.
pub const MAX_NODE_GRAPHS: usize = 2;

/// Magic bytes for the Strata snapshot header.
///
/// - File Header = Magic Bytes ("STRA") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"STRA";

/// Current snapshot format version.
///
/// Increment this when making breaking changes to the snapshot records.
pub const FORMAT_VERSION: u8 = 1;

/// Size of the snapshot header in bytes.
pub const HEADER_SIZE: usize = 5;

/// Maximum snapshot size accepted by the loader (256 MB).
///
/// Checked before any payload decoding.
pub const MAX_SNAPSHOT_SIZE: usize = 256 * 1024 * 1024;

/// Absolute determinant below which a matrix is treated as singular.
///
/// Inverting such a matrix reports `StrataError::NotInvertible` rather than
/// producing a matrix full of infinities.
pub const SINGULAR_EPSILON: f32 = 1.0e-12;

/// Tolerance used when comparing matrices produced along different
/// composition paths (cached vs uncached wrt).
pub const MATRIX_TOLERANCE: f32 = 1.0e-4;

/// Maximum depth followed when walking toward a root.
///
/// A well-formed graph never reaches this; it bounds the walk if the arena
/// was corrupted into a cycle.
pub const MAX_GRAPH_DEPTH: usize = 100_000;

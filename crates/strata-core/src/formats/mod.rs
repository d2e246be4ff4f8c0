//! # Formats
//!
//! Byte-level encodings of a `SceneGraph`. File I/O lives in the app layer.

pub mod snapshot;

pub use snapshot::{SnapshotHeader, scene_from_bytes, scene_to_bytes};

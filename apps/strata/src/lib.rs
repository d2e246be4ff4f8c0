//! # strata
//!
//! Command-line front end for the `strata-core` scene-graph engine.
//!
//! - `scene` turns TOML or JSON scene descriptions into a `SceneGraph`
//! - `config` loads the graph configuration file and environment overrides
//! - `cli` parses arguments and runs the commands
//!
//! All file I/O lives here; the engine itself never touches the filesystem.

pub mod cli;
pub mod config;
pub mod error;
pub mod scene;

pub use error::CliError;

//! # Strata CLI Module
//!
//! ## Available Commands
//!
//! - `inspect` - Print the graph tree of a scene
//! - `wrt` - Print the transform of one node relative to another
//! - `resolve` - Print the resolved state of every reached node
//! - `flatten` - Run the graph reducer and print the result
//! - `snapshot` - Write a binary snapshot of a scene
//! - `load` - Read a binary snapshot and print its tree

mod commands;

use crate::config::load_config;
use crate::error::CliError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Strata - scene-graph state inspector
///
/// Loads scene descriptions (TOML or JSON), resolves relative transforms and
/// accumulated render state, flattens redundant structure and reads or writes
/// binary snapshots.
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress summary lines
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Graph configuration file (TOML)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the graph tree
    Inspect {
        /// Scene description (TOML or JSON)
        #[arg(short, long)]
        scene: PathBuf,

        /// Graph type: render, data or a numeric id
        #[arg(short, long, default_value = "render")]
        graph: String,
    },

    /// Print the transform of one node relative to another
    Wrt {
        #[arg(short, long)]
        scene: PathBuf,

        /// Node whose transform is wanted
        #[arg(short, long)]
        from: String,

        /// Node the transform is relative to
        #[arg(short, long)]
        to: String,

        /// Walk the graph without the subtree cache
        #[arg(long)]
        uncached: bool,

        #[arg(short, long, default_value = "render")]
        graph: String,
    },

    /// Print the resolved state of every reached node
    Resolve {
        #[arg(short, long)]
        scene: PathBuf,

        /// Camera node that billboards face
        #[arg(long)]
        camera: Option<String>,

        #[arg(short, long, default_value = "render")]
        graph: String,
    },

    /// Run the graph reducer and print the resulting tree
    Flatten {
        #[arg(short, long)]
        scene: PathBuf,

        /// Also merge siblings with identical transitions
        #[arg(long)]
        combine_siblings: bool,

        #[arg(short, long, default_value = "render")]
        graph: String,
    },

    /// Write a binary snapshot of a scene
    Snapshot {
        #[arg(short, long)]
        scene: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Read a binary snapshot and print its tree
    Load {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments and print the command's output.
pub fn execute(cli: Cli) -> Result<(), CliError> {
    let config = load_config(cli.config.as_deref())?;
    let out = Output {
        json: cli.json_mode,
        quiet: cli.quiet,
    };

    let text = match cli.command {
        Commands::Inspect { scene, graph } => cmd_inspect(&scene, &graph, config, out)?,
        Commands::Wrt {
            scene,
            from,
            to,
            uncached,
            graph,
        } => cmd_wrt(&scene, &from, &to, uncached, &graph, config, out)?,
        Commands::Resolve {
            scene,
            camera,
            graph,
        } => cmd_resolve(&scene, camera.as_deref(), &graph, config, out)?,
        Commands::Flatten {
            scene,
            combine_siblings,
            graph,
        } => cmd_flatten(&scene, combine_siblings, &graph, config, out)?,
        Commands::Snapshot { scene, output } => cmd_snapshot(&scene, &output, config, out)?,
        Commands::Load { input } => cmd_load(&input, config, out)?,
    };

    if !text.is_empty() {
        println!("{}", text);
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

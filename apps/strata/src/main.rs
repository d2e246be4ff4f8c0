//! # Strata
//!
//! The main binary for the Strata scene-graph tool.
//!
//! ## Usage
//!
//! ```bash
//! # Print the tree of a scene
//! strata inspect --scene scene.toml
//!
//! # Transform of the hand relative to the world root
//! strata wrt --scene scene.toml --from hand --to root
//!
//! # Flatten and snapshot
//! strata flatten --scene scene.toml --combine-siblings
//! strata snapshot --scene scene.toml --output scene.strata
//! strata load --input scene.strata
//! ```

use clap::Parser;
use strata::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();

    // STRATA_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("STRATA_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let default_filter = if cli.verbose {
        "strata=debug,strata_core=debug"
    } else {
        "strata=info,strata_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

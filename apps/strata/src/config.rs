//! # Configuration Loading
//!
//! The graph configuration comes from an optional TOML file using the same
//! kebab-case keys as `GraphConfig`, then `STRATA_*` environment variables
//! override individual keys.
//!
//! ```toml
//! cache-wrt = true
//! ambiguous-wrt-abort = false
//! paranoid-wrt = false
//! paranoid-graph = false
//! ```

use crate::error::CliError;
use std::path::Path;
use strata_core::GraphConfig;
use tracing::debug;

/// Parse a configuration file's contents.
pub fn parse_config(text: &str) -> Result<GraphConfig, CliError> {
    Ok(toml::from_str(text)?)
}

/// Load the file (if any), then apply environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<GraphConfig, CliError> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// `load_config` with an explicit lookup in place of the environment.
pub fn load_config_with<F>(path: Option<&Path>, lookup: F) -> Result<GraphConfig, CliError>
where
    F: Fn(&str) -> Option<String>,
{
    let base = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| CliError::io(path, e))?;
            parse_config(&text)?
        }
        None => GraphConfig::default(),
    };
    let config = base.with_overrides(lookup)?;
    debug!(?config, "configuration loaded");
    Ok(config)
}

// =============================================================================
// TESTS
// =============================================================================

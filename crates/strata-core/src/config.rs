//! # Graph Configuration
//!
//! Startup switches consumed by a `SceneGraph`:
//!
//! | key                   | env var                      | default |
//! |-----------------------|------------------------------|---------|
//! | `cache-wrt`           | `STRATA_CACHE_WRT`           | `true`  |
//! | `ambiguous-wrt-abort` | `STRATA_AMBIGUOUS_WRT_ABORT` | `false` |
//! | `paranoid-wrt`        | `STRATA_PARANOID_WRT`        | `false` |
//! | `paranoid-graph`      | `STRATA_PARANOID_GRAPH`      | `false` |
//!
//! The paranoid switches only take effect in debug builds.

use crate::StrataError;
use serde::{Deserialize, Serialize};

/// Configuration owned by one `SceneGraph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct GraphConfig {
    /// Memoize accumulated transitions per arc for wrt.
    pub cache_wrt: bool,
    /// Fail wrt on an unresolved instanced node instead of picking the
    /// first parent.
    pub ambiguous_wrt_abort: bool,
    /// Run every cached wrt a second time uncached and compare.
    pub paranoid_wrt: bool,
    /// Verify child arc sort order after every topology mutation.
    pub paranoid_graph: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            cache_wrt: true,
            ambiguous_wrt_abort: false,
            paranoid_wrt: false,
            paranoid_graph: false,
        }
    }
}

impl GraphConfig {
    pub const ENV_CACHE_WRT: &'static str = "STRATA_CACHE_WRT";
    pub const ENV_AMBIGUOUS_WRT_ABORT: &'static str = "STRATA_AMBIGUOUS_WRT_ABORT";
    pub const ENV_PARANOID_WRT: &'static str = "STRATA_PARANOID_WRT";
    pub const ENV_PARANOID_GRAPH: &'static str = "STRATA_PARANOID_GRAPH";

    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, StrataError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup (environment, test fixture).
    ///
    /// Keys that are absent keep their current value.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, StrataError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let fields: [(&str, &mut bool); 4] = [
            (Self::ENV_CACHE_WRT, &mut self.cache_wrt),
            (Self::ENV_AMBIGUOUS_WRT_ABORT, &mut self.ambiguous_wrt_abort),
            (Self::ENV_PARANOID_WRT, &mut self.paranoid_wrt),
            (Self::ENV_PARANOID_GRAPH, &mut self.paranoid_graph),
        ];
        for (key, slot) in fields {
            if let Some(raw) = lookup(key) {
                *slot = parse_flag(key, &raw)?;
            }
        }
        Ok(self)
    }

    /// Whether `paranoid-wrt` is in effect for this build.
    #[must_use]
    pub fn check_wrt(&self) -> bool {
        cfg!(debug_assertions) && self.paranoid_wrt
    }

    /// Whether `paranoid-graph` is in effect for this build.
    #[must_use]
    pub fn check_graph(&self) -> bool {
        cfg!(debug_assertions) && self.paranoid_graph
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, StrataError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(StrataError::InvalidConfig(format!(
            "{} expects a boolean, got '{}'",
            key, other
        ))),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn lookup_in(map: &BTreeMap<&str, &str>) -> impl Fn(&str) -> Option<String> {
        move |key| map.get(key).map(|v| (*v).to_string())
    }

    #[test]
    fn defaults_enable_cache_only() {
        let config = GraphConfig::default();
        assert!(config.cache_wrt);
        assert!(!config.ambiguous_wrt_abort);
        assert!(!config.paranoid_wrt);
        assert!(!config.paranoid_graph);
    }

    #[test]
    fn overrides_apply_per_key() {
        let mut env = BTreeMap::new();
        env.insert(GraphConfig::ENV_CACHE_WRT, "off");
        env.insert(GraphConfig::ENV_PARANOID_GRAPH, "1");

        let config = GraphConfig::default()
            .with_overrides(lookup_in(&env))
            .expect("parse");
        assert!(!config.cache_wrt);
        assert!(config.paranoid_graph);
        assert!(!config.ambiguous_wrt_abort);
    }

    #[test]
    fn invalid_flag_rejected() {
        let mut env = BTreeMap::new();
        env.insert(GraphConfig::ENV_PARANOID_WRT, "maybe");

        let result = GraphConfig::default().with_overrides(lookup_in(&env));
        assert!(matches!(result, Err(StrataError::InvalidConfig(_))));
    }

    #[test]
    fn paranoid_modes_follow_build_profile() {
        let config = GraphConfig {
            paranoid_wrt: true,
            paranoid_graph: true,
            ..GraphConfig::default()
        };
        assert_eq!(config.check_wrt(), cfg!(debug_assertions));
        assert_eq!(config.check_graph(), cfg!(debug_assertions));
    }
}

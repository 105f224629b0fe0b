// SPDX-License-Identifier: MIT

//! Engine configuration

use std::env;
use std::time::Duration;

/// Banner placed between merged values
pub const DEFAULT_MERGE_SEPARATOR: &str = "\n\n---\n\n";

/// Default bound on model/capability round trips inside one model node
pub const DEFAULT_MAX_TOOL_TURNS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Upper bound for a single node task; `None` disables the timeout
    pub node_timeout: Option<Duration>,
    /// Model/capability round trips allowed per model node
    pub max_tool_turns: usize,
    /// Banner used when merging several values into one input
    pub merge_separator: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            node_timeout: None,
            max_tool_turns: DEFAULT_MAX_TOOL_TURNS,
            merge_separator: DEFAULT_MERGE_SEPARATOR.to_string(),
        }
    }
}

impl EngineConfig {
    /// Read `NODEFLOW_NODE_TIMEOUT_SECS` and `NODEFLOW_MAX_TOOL_TURNS`,
    /// falling back to defaults for unset or unparsable values.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup("NODEFLOW_NODE_TIMEOUT_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(0) => config.node_timeout = None,
                Ok(secs) => config.node_timeout = Some(Duration::from_secs(secs)),
                Err(_) => log::warn!("Ignoring invalid NODEFLOW_NODE_TIMEOUT_SECS '{}'", raw),
            }
        }

        if let Some(raw) = lookup("NODEFLOW_MAX_TOOL_TURNS") {
            match raw.trim().parse::<usize>() {
                Ok(turns) if turns > 0 => config.max_tool_turns = turns,
                _ => log::warn!("Ignoring invalid NODEFLOW_MAX_TOOL_TURNS '{}'", raw),
            }
        }

        config
    }

    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[]));
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.merge_separator, "\n\n---\n\n");
    }

    #[test]
    fn test_reads_timeout_and_turns() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("NODEFLOW_NODE_TIMEOUT_SECS", "30"),
            ("NODEFLOW_MAX_TOOL_TURNS", "4"),
        ]));
        assert_eq!(config.node_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.max_tool_turns, 4);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("NODEFLOW_NODE_TIMEOUT_SECS", "soon"),
            ("NODEFLOW_MAX_TOOL_TURNS", "0"),
        ]));
        assert_eq!(config.node_timeout, None);
        assert_eq!(config.max_tool_turns, DEFAULT_MAX_TOOL_TURNS);
    }
}

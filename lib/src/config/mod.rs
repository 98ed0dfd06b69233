use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Engine configuration.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum length in bytes of a pattern source.
    pub max_pattern_length: usize,
    /// Maximum number of states in a compiled NFA, and in a DFA produced by
    /// subset construction.
    pub max_states: usize,
    /// Maximum number of capture groups in a pattern.
    pub max_capture_groups: usize,
    /// Maximum nesting depth of a pattern.
    pub max_recursion_depth: usize,
    /// Run the optimization pipeline even when the pattern doesn't have the
    /// `OPTIMIZE` flag.
    pub optimize_automaton: bool,
    /// Convert patterns without capture groups or assertions into DFAs.
    pub use_dfa_when_possible: bool,
    /// Accept raw literals (`R'...'`). When false they are rejected even if
    /// the `RIFT_SYNTAX` flag is set.
    pub enable_rift_syntax: bool,
    /// Default backtracking limits for match operations.
    pub limits: LimitsConfig,
}

/// Default backtracking limits.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum depth of the backtracking stack.
    pub max_depth: usize,
    /// Maximum duration of a match operation, in milliseconds.
    pub max_duration_ms: u64,
    /// Maximum number of transitions taken by a single match attempt.
    pub max_transitions: u64,
}

impl LimitsConfig {
    /// Maximum duration of a match operation.
    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> EngineConfig {
        EngineConfig {
            max_pattern_length: 4096,
            max_states: 10_000,
            max_capture_groups: 100,
            max_recursion_depth: 1000,
            optimize_automaton: false,
            use_dfa_when_possible: false,
            enable_rift_syntax: true,
            limits: LimitsConfig::default(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> LimitsConfig {
        LimitsConfig {
            max_depth: 10_000,
            max_duration_ms: 5000,
            max_transitions: 1_000_000,
        }
    }
}

/// Load config file from a given path. Path must contain a valid TOML file or
/// this function will propagate the error. Missing keys take their default
/// values.
pub fn load_config_from_file(
    config_file: &Path,
) -> Result<EngineConfig, figment::Error> {
    let config: EngineConfig =
        Figment::from(Serialized::defaults(EngineConfig::default()))
            .merge(Toml::file_exact(config_file))
            .extract()?;
    Ok(config)
}

/// Same as [`load_config_from_file`] but reads TOML from a string.
pub fn load_config_from_str(toml: &str) -> Result<EngineConfig, figment::Error> {
    let config: EngineConfig =
        Figment::from(Serialized::defaults(EngineConfig::default()))
            .merge(Toml::string(toml))
            .extract()?;
    Ok(config)
}

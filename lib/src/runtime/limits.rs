use std::time::Duration;

use rustc_hash::FxHashMap;

use crate::config::LimitsConfig;
use crate::errors::Error;

/// Scope of a [`LimitConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitScope {
    /// Applies to every match.
    Global,
    /// Applies to matches of one pattern.
    Pattern,
    /// Applies to one match operation.
    Match,
}

/// Backtracking limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitConfig {
    /// Where the config applies.
    pub scope: LimitScope,
    /// When false, a pattern or match config doesn't replace the config of
    /// its parent scope.
    pub override_parent: bool,
    /// Maximum depth of the backtracking stack.
    pub max_depth: usize,
    /// Maximum duration of the operation in milliseconds, zero for no
    /// limit.
    pub max_duration_ms: u64,
    /// Maximum number of transitions per start position, zero for no limit.
    pub max_transitions: u64,
}

impl LimitConfig {
    /// Creates a global config.
    pub fn global(max_depth: usize, max_duration_ms: u64, max_transitions: u64) -> Self {
        Self {
            scope: LimitScope::Global,
            override_parent: false,
            max_depth,
            max_duration_ms,
            max_transitions,
        }
    }

    /// Creates a config for a pattern.
    pub fn pattern(
        override_parent: bool,
        max_depth: usize,
        max_duration_ms: u64,
        max_transitions: u64,
    ) -> Self {
        Self {
            scope: LimitScope::Pattern,
            override_parent,
            max_depth,
            max_duration_ms,
            max_transitions,
        }
    }

    /// Creates a config for a match operation.
    pub fn for_match(
        override_parent: bool,
        max_depth: usize,
        max_duration_ms: u64,
        max_transitions: u64,
    ) -> Self {
        Self {
            scope: LimitScope::Match,
            override_parent,
            max_depth,
            max_duration_ms,
            max_transitions,
        }
    }

    /// Returns a copy with a different scope.
    pub fn with_scope(mut self, scope: LimitScope) -> Self {
        self.scope = scope;
        self
    }

    /// Maximum duration of the operation.
    pub fn max_duration(&self) -> Option<Duration> {
        (self.max_duration_ms > 0).then(|| Duration::from_millis(self.max_duration_ms))
    }
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

impl From<&LimitsConfig> for LimitConfig {
    fn from(config: &LimitsConfig) -> Self {
        Self::global(config.max_depth, config.max_duration_ms, config.max_transitions)
    }
}

/// Limits for a pattern of the given complexity.
///
/// Complex patterns get lower limits, so pathological patterns fail early
/// instead of exhausting the global limits.
///
/// ```
/// # use rift::runtime::scaled_limits;
/// let limits = scaled_limits(0.0);
/// assert_eq!(limits.max_depth, 2000);
/// assert_eq!(limits.max_duration_ms, 6000);
/// assert_eq!(limits.max_transitions, 150_000);
///
/// let limits = scaled_limits(100.0);
/// assert_eq!(limits.max_depth, 400);
/// assert_eq!(limits.max_duration_ms, 1500);
/// assert_eq!(limits.max_transitions, 30_000);
/// ```
pub fn scaled_limits(complexity: f64) -> LimitConfig {
    let c = complexity.max(0.0);
    let depth = (2000.0 / (1.0 + 0.15 * c)).max(400.0);
    let time_ms = (6000.0 - 300.0 * c).max(1500.0);
    let transitions = (150_000.0 - 10_000.0 * c).max(30_000.0);
    LimitConfig::pattern(true, depth as usize, time_ms as u64, transitions as u64)
}

/// Global limits plus overrides for individual patterns and matches.
///
/// [`LimitRegistry::effective_config`] composes them: a pattern config
/// replaces the global one when its `override_parent` is set, and a match
/// config replaces the result in the same way.
#[derive(Debug, Clone, Default)]
pub struct LimitRegistry {
    global: LimitConfig,
    patterns: FxHashMap<u64, LimitConfig>,
    matches: FxHashMap<u64, LimitConfig>,
}

impl LimitRegistry {
    /// Creates a registry with the default global limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the given global limits.
    pub fn with_global(config: &LimitsConfig) -> Self {
        Self { global: LimitConfig::from(config), ..Default::default() }
    }

    /// Global limits.
    pub fn global(&self) -> &LimitConfig {
        &self.global
    }

    /// Replaces the global limits. The config must have global scope.
    pub fn set_global(&mut self, config: LimitConfig) -> Result<(), Error> {
        check_scope(&config, LimitScope::Global)?;
        self.global = config;
        Ok(())
    }

    /// Registers limits for a pattern, replacing any previous ones. The
    /// config must have pattern scope.
    pub fn register_pattern(&mut self, pattern_id: u64, config: LimitConfig) -> Result<(), Error> {
        check_scope(&config, LimitScope::Pattern)?;
        self.patterns.insert(pattern_id, config);
        Ok(())
    }

    /// Registers limits for a match, replacing any previous ones. The
    /// config must have match scope.
    pub fn register_match(&mut self, match_id: u64, config: LimitConfig) -> Result<(), Error> {
        check_scope(&config, LimitScope::Match)?;
        self.matches.insert(match_id, config);
        Ok(())
    }

    /// Limits registered for a pattern.
    pub fn pattern_config(&self, pattern_id: u64) -> Option<&LimitConfig> {
        self.patterns.get(&pattern_id)
    }

    /// Limits registered for a match.
    pub fn match_config(&self, match_id: u64) -> Option<&LimitConfig> {
        self.matches.get(&match_id)
    }

    /// Removes the limits of a pattern.
    pub fn unregister_pattern(&mut self, pattern_id: u64) -> Option<LimitConfig> {
        self.patterns.remove(&pattern_id)
    }

    /// Removes the limits of a match.
    pub fn unregister_match(&mut self, match_id: u64) -> Option<LimitConfig> {
        self.matches.remove(&match_id)
    }

    /// Limits that apply to a match of a pattern. The result has global
    /// scope.
    pub fn effective_config(&self, pattern_id: Option<u64>, match_id: Option<u64>) -> LimitConfig {
        let mut effective = self.global;
        let overrides = [
            pattern_id.and_then(|id| self.patterns.get(&id)),
            match_id.and_then(|id| self.matches.get(&id)),
        ];
        for config in overrides.into_iter().flatten() {
            if config.override_parent {
                effective.max_depth = config.max_depth;
                effective.max_duration_ms = config.max_duration_ms;
                effective.max_transitions = config.max_transitions;
            }
        }
        effective
    }
}

fn check_scope(config: &LimitConfig, scope: LimitScope) -> Result<(), Error> {
    if config.scope != scope {
        return Err(Error::invalid_parameter(format!(
            "expecting a config with {:?} scope, got {:?}",
            scope, config.scope
        )));
    }
    Ok(())
}

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::compiler::Fingerprint;
use crate::pattern::Pattern;

/// What a bailout strategy decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BailoutAction {
    /// Keep matching.
    Continue,
    /// Abandon the current path and backtrack.
    Bail,
    /// Stop the whole match operation.
    Abort,
}

/// Snapshot of a match in progress, as seen by bailout strategies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BacktrackingState {
    /// Depth of the backtracking stack.
    pub current_depth: usize,
    /// Transitions taken by the current attempt.
    pub transitions: u64,
    /// Time elapsed since the operation started.
    pub elapsed: Duration,
    /// Current position in the input.
    pub position: usize,
    /// True if the pattern was written as a raw literal.
    pub is_raw: bool,
}

/// A policy that decides when a match should give up.
///
/// Policies must be pure: the manager may evaluate them from several
/// threads, and may call `should_activate` without calling `execute`.
pub trait BailoutPolicy: Debug + Send + Sync {
    /// True if the policy wants to act on this state.
    fn should_activate(&self, state: &BacktrackingState) -> bool;
    /// The action taken when the policy is selected.
    fn execute(&self, state: &BacktrackingState) -> BailoutAction;
    /// Among the active policies, the one with the highest priority is
    /// executed.
    fn priority(&self) -> i32;
}

/// Bails out of patterns whose complexity, scaled by the depth of the
/// backtracking stack, exceeds a threshold.
///
/// The score is `state_count * branching + repetition_count²`, multiplied
/// by 1.5 for raw literal patterns and by `1 + depth / 100`.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexityStrategy {
    /// Number of states in the automaton.
    pub state_count: usize,
    /// Average number of transitions per state.
    pub branching: f64,
    /// Number of quantifiers in the pattern.
    pub repetition_count: usize,
    /// Scores above this value activate the strategy.
    pub threshold: f64,
}

impl ComplexityStrategy {
    /// Priority of the strategy.
    pub const PRIORITY: i32 = 50;

    /// Creates a strategy with the metrics of a fingerprint.
    pub fn new(fingerprint: &Fingerprint, threshold: f64) -> Self {
        Self {
            state_count: fingerprint.state_count,
            branching: fingerprint.branching,
            repetition_count: fingerprint.quantifier_count,
            threshold,
        }
    }

    /// Creates a strategy with the metrics of a pattern.
    pub fn from_pattern(pattern: &Pattern, threshold: f64) -> Self {
        Self::new(&pattern.fingerprint(), threshold)
    }

    /// Score of the pattern at the given state.
    pub fn score(&self, state: &BacktrackingState) -> f64 {
        let repetitions = self.repetition_count as f64;
        let mut score =
            self.state_count as f64 * self.branching + repetitions * repetitions;
        if state.is_raw {
            score *= 1.5;
        }
        score * (1.0 + state.current_depth as f64 / 100.0)
    }
}

/// The strategies known by the [`BailoutManager`].
#[derive(Debug, Clone)]
pub enum BailoutStrategy {
    /// See [`ComplexityStrategy`]. Aborts the match.
    PatternComplexity(ComplexityStrategy),
    /// Abandons paths that go deeper than the given depth.
    DepthOnly {
        /// Depths at or above this one activate the strategy.
        max_depth: usize,
    },
    /// Aborts matches that run longer than the given duration.
    TimeOnly {
        /// Maximum duration of the match.
        max_duration: Duration,
    },
    /// A policy provided by the host.
    Custom(Arc<dyn BailoutPolicy>),
}

impl BailoutStrategy {
    /// Human readable name of the strategy.
    pub fn name(&self) -> &'static str {
        match self {
            BailoutStrategy::PatternComplexity(_) => "pattern complexity",
            BailoutStrategy::DepthOnly { .. } => "depth only",
            BailoutStrategy::TimeOnly { .. } => "time only",
            BailoutStrategy::Custom(_) => "custom",
        }
    }
}

impl BailoutPolicy for BailoutStrategy {
    fn should_activate(&self, state: &BacktrackingState) -> bool {
        match self {
            BailoutStrategy::PatternComplexity(s) => s.score(state) > s.threshold,
            BailoutStrategy::DepthOnly { max_depth } => {
                state.current_depth >= *max_depth
            }
            BailoutStrategy::TimeOnly { max_duration } => {
                state.elapsed >= *max_duration
            }
            BailoutStrategy::Custom(policy) => policy.should_activate(state),
        }
    }

    fn execute(&self, state: &BacktrackingState) -> BailoutAction {
        match self {
            BailoutStrategy::PatternComplexity(_) => BailoutAction::Abort,
            BailoutStrategy::DepthOnly { .. } => BailoutAction::Bail,
            BailoutStrategy::TimeOnly { .. } => BailoutAction::Abort,
            BailoutStrategy::Custom(policy) => policy.execute(state),
        }
    }

    fn priority(&self) -> i32 {
        match self {
            BailoutStrategy::PatternComplexity(_) => ComplexityStrategy::PRIORITY,
            BailoutStrategy::DepthOnly { .. } => 40,
            BailoutStrategy::TimeOnly { .. } => 60,
            BailoutStrategy::Custom(policy) => policy.priority(),
        }
    }
}

/// Holds a set of strategies and picks the one that acts on each probe.
#[derive(Debug, Clone, Default)]
pub struct BailoutManager {
    strategies: Vec<BailoutStrategy>,
}

impl BailoutManager {
    /// Creates a manager without strategies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a strategy.
    pub fn add_strategy(&mut self, strategy: BailoutStrategy) -> &mut Self {
        self.strategies.push(strategy);
        self
    }

    /// Strategies in the order they were added.
    pub fn strategies(&self) -> &[BailoutStrategy] {
        self.strategies.as_slice()
    }

    /// Number of strategies.
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// True if the manager has no strategies.
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Returns the active strategy with the highest priority. When several
    /// have the same priority the first one added wins.
    pub fn evaluate(&self, state: &BacktrackingState) -> Option<&BailoutStrategy> {
        let mut selected: Option<&BailoutStrategy> = None;
        for strategy in &self.strategies {
            if !strategy.should_activate(state) {
                continue;
            }
            if selected.map_or(true, |s| strategy.priority() > s.priority()) {
                selected = Some(strategy);
            }
        }
        selected
    }

    /// Evaluates the strategies and executes the selected one.
    pub fn probe(&self, state: &BacktrackingState) -> BailoutAction {
        match self.evaluate(state) {
            None => BailoutAction::Continue,
            Some(strategy) => {
                let action = strategy.execute(state);
                if action != BailoutAction::Continue {
                    debug!(
                        "{} strategy returned {:?} at depth {}",
                        strategy.name(),
                        action,
                        state.current_depth
                    );
                }
                action
            }
        }
    }
}

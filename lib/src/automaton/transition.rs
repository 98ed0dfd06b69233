use serde::{Deserialize, Serialize};

use crate::automaton::matcher::Matcher;
use crate::errors::Error;

/// A transition between two states of an automaton.
///
/// Source and target are indexes into the state list of the automaton that
/// owns the transition. A transition without a pattern is an epsilon
/// transition, it is taken without consuming input.
///
/// Transitions leaving the same state are tried in descending priority
/// order, transitions with the same priority are tried in the order they
/// were added.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    source: usize,
    target: usize,
    pattern: Option<String>,
    priority: i32,
    #[serde(skip)]
    matcher: Option<Matcher>,
}

impl Transition {
    /// Creates a transition that consumes input matching `pattern`.
    ///
    /// Fails if the pattern is not a valid transition pattern.
    pub fn new<P: Into<String>>(
        source: usize,
        target: usize,
        pattern: P,
    ) -> Result<Self, Error> {
        let pattern = pattern.into();
        let matcher = Matcher::parse(&pattern)?;
        Ok(Self {
            source,
            target,
            pattern: Some(pattern),
            priority: 0,
            matcher: Some(matcher),
        })
    }

    /// Creates an epsilon transition.
    pub fn epsilon(source: usize, target: usize) -> Self {
        Self { source, target, pattern: None, priority: 0, matcher: None }
    }

    /// Index of the state where the transition starts.
    #[inline]
    pub fn source(&self) -> usize {
        self.source
    }

    /// Index of the state where the transition ends.
    #[inline]
    pub fn target(&self) -> usize {
        self.target
    }

    /// Pattern matched by the transition, `None` for epsilon transitions.
    #[inline]
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_deref()
    }

    /// True for epsilon transitions.
    #[inline]
    pub fn is_epsilon(&self) -> bool {
        self.pattern.is_none()
    }

    /// Priority of the transition. Higher runs first.
    #[inline]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Changes the priority of the transition.
    ///
    /// If the transition already belongs to a state, the state's
    /// transitions must be sorted again with
    /// [`crate::State::sort_transitions`].
    #[inline]
    pub fn set_priority(&mut self, priority: i32) {
        self.priority = priority;
    }

    /// Returns a copy of the transition with the given priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// True if the transition consumes `c`. Epsilon transitions and
    /// transitions that need more than one character never match a single
    /// character.
    pub fn matches_char(&self, c: char) -> bool {
        self.matcher.as_ref().is_some_and(|m| m.matches_char(c))
    }

    /// True if the pattern matches a prefix of `input`. Epsilon transitions
    /// always match.
    pub fn matches_prefix(&self, input: &str) -> bool {
        self.match_len(input).is_some()
    }

    /// Number of bytes consumed when the transition is taken at the start
    /// of `input`, or `None` if it can't be taken.
    pub fn match_len(&self, input: &str) -> Option<usize> {
        match &self.matcher {
            None => Some(0),
            Some(m) => m.match_prefix(input),
        }
    }

    pub(crate) fn matcher(&self) -> Option<&Matcher> {
        self.matcher.as_ref()
    }

    pub(crate) fn set_source(&mut self, source: usize) {
        self.source = source;
    }

    pub(crate) fn set_target(&mut self, target: usize) {
        self.target = target;
    }

    /// Rebuilds the matcher from the pattern string, after deserialization.
    pub(crate) fn rebuild(&mut self) -> Result<(), Error> {
        self.matcher = match &self.pattern {
            Some(pattern) => Some(Matcher::parse(pattern)?),
            None => None,
        };
        Ok(())
    }

    /// True if both transitions go to the same target with the same
    /// pattern, regardless of source and priority.
    pub(crate) fn same_edge(&self, other: &Transition) -> bool {
        self.target == other.target && self.pattern == other.pattern
    }
}

impl PartialEq for Transition {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
            && self.target == other.target
            && self.pattern == other.pattern
            && self.priority == other.priority
    }
}

impl Eq for Transition {}

/// Sorts transitions by priority, highest first. The sort is stable.
pub fn sort_by_priority(transitions: &mut [Transition]) {
    transitions.sort_by(|a, b| b.priority.cmp(&a.priority));
}

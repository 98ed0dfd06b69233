/*! Finite automata.

An [`Automaton`] owns a flat list of [`State`]s. Transitions live inside
their source state and refer to other states by index in that list, so the
graph has no ownership cycles and cloning it is a plain deep copy.

Automata come in two flavours, told apart by [`AutomatonKind`]. NFAs are
produced by the compiler out of a pattern's AST, they may have epsilon
transitions, several transitions matching the same character, zero-width
assertions and special actions (backreferences, lookarounds, etc). DFAs are
produced from NFAs by [`Automaton::to_dfa`] (subset construction) and can be
reduced with [`Automaton::minimize`].
*/

use std::collections::VecDeque;
use std::fmt::{Display, Formatter};

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, ErrorKind};
use crate::flags::Flags;

pub use state::reset_id_counter;
pub use state::Condition;
pub use state::LookKind;
pub use state::State;
pub use state::StateAction;
pub use state::StateFlags;
pub use state::StateId;
pub use transition::Transition;

pub(crate) mod matcher;

mod minimize;
mod optimize;
mod state;
mod subset;
mod transition;

#[cfg(test)]
mod tests;

/// Kind of automaton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AutomatonKind {
    /// Non-deterministic finite automaton.
    Nfa,
    /// Deterministic finite automaton.
    Dfa,
}

/// A finite automaton.
#[derive(Debug, Serialize, Deserialize)]
pub struct Automaton {
    kind: AutomatonKind,
    states: Vec<State>,
    initial: Option<usize>,
    current: Option<usize>,
    flags: Flags,
    #[serde(skip)]
    last_error: Option<Error>,
}

impl Automaton {
    /// Creates an empty automaton.
    pub fn new(kind: AutomatonKind) -> Self {
        Self {
            kind,
            states: Vec::new(),
            initial: None,
            current: None,
            flags: Flags::empty(),
            last_error: None,
        }
    }

    /// Kind of automaton.
    #[inline]
    pub fn kind(&self) -> AutomatonKind {
        self.kind
    }

    /// True if the automaton is deterministic: no epsilon transitions, no
    /// assertions or actions, and for every state no two transitions match
    /// the same character.
    pub fn is_deterministic(&self) -> bool {
        self.states.iter().all(|state| {
            if state.action().is_some()
                || state.flags().intersects(StateFlags::ASSERTIONS)
            {
                return false;
            }
            let mut seen = crate::re::class::CharRanges::default();
            for t in state.transitions() {
                let ranges = match t.matcher().and_then(|m| m.ranges()) {
                    Some(ranges) => ranges,
                    None => return false,
                };
                let overlap = ranges
                    .ranges()
                    .iter()
                    .any(|(lo, hi)| {
                        seen.ranges().iter().any(|(a, b)| lo <= b && a <= hi)
                    });
                if overlap {
                    return false;
                }
                seen = seen.union(&ranges);
            }
            true
        })
    }

    /// Index of the initial state.
    #[inline]
    pub fn initial(&self) -> Option<usize> {
        self.initial
    }

    /// Sets the initial state. Also resets the current state to the new
    /// initial one.
    pub fn set_initial(&mut self, index: usize) -> Result<(), Error> {
        self.check_index(index)?;
        self.initial = Some(index);
        self.current = Some(index);
        Ok(())
    }

    /// Index of the current state, used for stepwise interpretation.
    #[inline]
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Sets the current state.
    pub fn set_current(&mut self, index: usize) -> Result<(), Error> {
        self.check_index(index)?;
        self.current = Some(index);
        Ok(())
    }

    /// Moves the current state back to the initial state.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    /// Number of states.
    #[inline]
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Returns the state at `index`.
    #[inline]
    pub fn state(&self, index: usize) -> Option<&State> {
        self.states.get(index)
    }

    /// Returns a mutable reference to the state at `index`.
    #[inline]
    pub fn state_mut(&mut self, index: usize) -> Option<&mut State> {
        self.states.get_mut(index)
    }

    /// All the states.
    #[inline]
    pub fn states(&self) -> &[State] {
        self.states.as_slice()
    }

    /// Index of the state with the given identifier.
    pub fn find_state_by_id(&self, id: StateId) -> Option<usize> {
        self.states.iter().position(|s| s.id() == id)
    }

    /// Creates a new state and returns its index.
    pub fn create_state(&mut self, accepting: bool) -> usize {
        self.states.push(State::new(accepting));
        self.states.len() - 1
    }

    /// Creates a new accepting state and returns its index.
    pub fn add_accepting_state(&mut self) -> usize {
        self.create_state(true)
    }

    /// Adds an existing state to the automaton and returns its index.
    ///
    /// The state's transitions must refer to states of this automaton.
    pub fn add_state(&mut self, state: State) -> usize {
        self.states.push(state);
        self.states.len() - 1
    }

    /// Adds a transition from `source` to `target` that matches `pattern`.
    pub fn add_transition(
        &mut self,
        source: usize,
        target: usize,
        pattern: &str,
    ) -> Result<(), Error> {
        self.add_transition_with_priority(source, target, Some(pattern), 0)
    }

    /// Adds an epsilon transition from `source` to `target`.
    pub fn add_epsilon_transition(
        &mut self,
        source: usize,
        target: usize,
    ) -> Result<(), Error> {
        self.add_transition_with_priority(source, target, None, 0)
    }

    /// Adds a transition with the given priority. A `None` pattern adds an
    /// epsilon transition.
    pub fn add_transition_with_priority(
        &mut self,
        source: usize,
        target: usize,
        pattern: Option<&str>,
        priority: i32,
    ) -> Result<(), Error> {
        self.check_index(source)?;
        self.check_index(target)?;
        let transition = match pattern {
            Some(pattern) => match Transition::new(source, target, pattern) {
                Ok(t) => t,
                Err(err) => {
                    self.last_error = Some(err.clone());
                    return Err(err);
                }
            },
            None => Transition::epsilon(source, target),
        };
        self.states[source].add_transition(transition.with_priority(priority));
        Ok(())
    }

    /// True if the transition at `index` in state `state` matches `c`.
    pub fn transition_matches(&self, state: usize, index: usize, c: char) -> bool {
        self.states
            .get(state)
            .and_then(|s| s.transitions().get(index))
            .is_some_and(|t| t.matches_char(c))
    }

    /// Transitions of the current state, at most `capacity` of them.
    pub fn current_transitions(&self, capacity: usize) -> &[Transition] {
        match self.current.and_then(|i| self.states.get(i)) {
            Some(state) => {
                let ts = state.transitions();
                &ts[..ts.len().min(capacity)]
            }
            None => &[],
        }
    }

    /// Moves the current state along the first transition that matches `c`.
    /// Epsilon transitions are not followed. Returns false, leaving the
    /// current state unchanged, if no transition matches.
    pub fn step(&mut self, c: char) -> bool {
        let next = self
            .current
            .and_then(|i| self.states.get(i))
            .and_then(|s| s.transitions().iter().find(|t| t.matches_char(c)))
            .map(|t| t.target());
        match next {
            Some(next) => {
                self.current = Some(next);
                true
            }
            None => false,
        }
    }

    /// Flags of the automaton.
    #[inline]
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Sets the flags of the automaton.
    #[inline]
    pub fn set_flags(&mut self, flags: Flags) {
        self.flags = flags;
    }

    /// Last error produced by an operation on this automaton.
    #[inline]
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// Clears the last error.
    #[inline]
    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Iterator over all the transitions of the automaton, state by state.
    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.states.iter().flat_map(|s| s.transitions().iter())
    }

    /// Total number of transitions.
    pub fn transition_count(&self) -> usize {
        self.states.iter().map(|s| s.transitions().len()).sum()
    }

    /// Number of capture groups referenced by the states.
    pub fn group_count(&self) -> usize {
        self.states.iter().filter_map(|s| s.group_index()).max().unwrap_or(0)
    }

    /// True if some state has an action (backreference, lookaround,
    /// atomic group, conditional, backtracking verb).
    pub fn has_actions(&self) -> bool {
        self.states.iter().any(|s| s.action().is_some())
    }

    /// Converts the automaton into an equivalent DFA using the subset
    /// construction.
    ///
    /// Capture group markers are dropped. Fails with
    /// [`ErrorKind::UnsupportedOperation`] if the automaton has assertions
    /// or actions, and with [`ErrorKind::InvalidAutomaton`] if the DFA
    /// would have more than `max_states` states.
    pub fn to_dfa_with_limit(&self, max_states: usize) -> Result<Automaton, Error> {
        subset::subset_construction(self, max_states)
    }

    /// Same as [`Automaton::to_dfa_with_limit`] with the default limit.
    pub fn to_dfa(&self) -> Result<Automaton, Error> {
        self.to_dfa_with_limit(subset::DEFAULT_MAX_DFA_STATES)
    }

    /// Returns the minimal DFA equivalent to this one.
    ///
    /// Fails with [`ErrorKind::UnsupportedOperation`] if the automaton is
    /// not deterministic.
    pub fn minimize(&self) -> Result<Automaton, Error> {
        minimize::minimize(self)
    }

    /// Runs the optimization pipeline: removes unreachable and dead states,
    /// merges duplicate transitions, bypasses states that only forward to
    /// another state, and minimizes the automaton if it is deterministic.
    pub fn optimize(&mut self) -> Result<(), Error> {
        let result = optimize::optimize(self);
        if let Err(err) = &result {
            self.last_error = Some(err.clone());
        }
        result
    }

    /// True if the automaton accepts the whole `input`.
    ///
    /// This is a plain set-of-states simulation: assertions are evaluated
    /// but actions (backreferences, lookarounds, etc) are treated as dead
    /// ends. Use a matcher context for full matching.
    pub fn accepts(&self, input: &str) -> bool {
        let Some(initial) = self.initial else {
            return false;
        };
        let mut current = Vec::new();
        self.closure_at(&[initial], input, 0, &mut current);
        for (pos, c) in input.char_indices() {
            let next_pos = pos + c.len_utf8();
            let targets: Vec<usize> = current
                .iter()
                .flat_map(|s| self.states[*s].transitions())
                .filter(|t| t.matches_char(c))
                .map(|t| t.target())
                .collect();
            if targets.is_empty() {
                return false;
            }
            current.clear();
            self.closure_at(&targets, input, next_pos, &mut current);
        }
        current.iter().any(|s| self.states[*s].is_accepting())
    }

    /// Epsilon closure of `start`, following only through states whose
    /// assertions hold at `pos`.
    fn closure_at(
        &self,
        start: &[usize],
        input: &str,
        pos: usize,
        out: &mut Vec<usize>,
    ) {
        let mut seen = FxHashSet::default();
        let mut stack: Vec<usize> = start.iter().rev().copied().collect();
        while let Some(s) = stack.pop() {
            if !seen.insert(s) {
                continue;
            }
            let state = &self.states[s];
            if !state.flags().holds_at(input, pos) || state.action().is_some() {
                continue;
            }
            out.push(s);
            for t in state.transitions().iter().rev() {
                if t.is_epsilon() {
                    stack.push(t.target());
                }
            }
        }
    }

    /// Epsilon closure of a set of states, ignoring assertions. The result
    /// is sorted.
    pub(crate) fn epsilon_closure(&self, start: &[usize]) -> Vec<usize> {
        let mut seen = FxHashSet::default();
        let mut stack: Vec<usize> = start.to_vec();
        while let Some(s) = stack.pop() {
            if !seen.insert(s) {
                continue;
            }
            for t in self.states[s].transitions() {
                if t.is_epsilon() {
                    stack.push(t.target());
                }
            }
        }
        let mut closure: Vec<usize> = seen.into_iter().collect();
        closure.sort_unstable();
        closure
    }

    /// Indexes of the states reachable from the initial state, following
    /// transitions and action bodies, in breadth-first order.
    pub(crate) fn reachable(&self) -> Vec<usize> {
        let mut order = Vec::new();
        let Some(initial) = self.initial else {
            return order;
        };
        let mut seen = vec![false; self.states.len()];
        let mut queue = VecDeque::from([initial]);
        seen[initial] = true;
        while let Some(s) = queue.pop_front() {
            order.push(s);
            let state = &self.states[s];
            let bodies = state.action().into_iter().flat_map(|a| a.bodies());
            let targets = state.transitions().iter().map(|t| t.target());
            for next in targets.chain(bodies) {
                if !seen[next] {
                    seen[next] = true;
                    queue.push_back(next);
                }
            }
        }
        order
    }

    /// Keeps only the states for which `keep` is true, dropping transitions
    /// into removed states and renumbering everything else.
    pub(crate) fn retain_states(&mut self, keep: &[bool]) {
        let mut remap = vec![usize::MAX; self.states.len()];
        let mut next = 0;
        for (i, k) in keep.iter().enumerate() {
            if *k {
                remap[i] = next;
                next += 1;
            }
        }
        let states = std::mem::take(&mut self.states);
        for (i, mut state) in states.into_iter().enumerate() {
            if !keep[i] {
                continue;
            }
            state
                .transitions_mut()
                .retain(|t| remap[t.target()] != usize::MAX);
            for t in state.transitions_mut().iter_mut() {
                t.set_source(remap[i]);
                t.set_target(remap[t.target()]);
            }
            if let Some(action) = state.action_mut() {
                action.remap_bodies(|b| remap[b]);
            }
            self.states.push(state);
        }
        self.initial = self.initial.and_then(|i| {
            (remap[i] != usize::MAX).then_some(remap[i])
        });
        self.current = self
            .current
            .and_then(|i| (remap[i] != usize::MAX).then_some(remap[i]))
            .or(self.initial);
    }

    /// Checks the structural invariants: initial and current states belong
    /// to the automaton, every transition and body refers to an existing
    /// state, transition sources match their owners and identifiers are
    /// unique.
    pub fn check_integrity(&self) -> Result<(), Error> {
        let n = self.states.len();
        if self.initial.is_some_and(|i| i >= n) {
            return Err(Error::internal("initial state not in state list"));
        }
        if self.current.is_some_and(|i| i >= n) {
            return Err(Error::internal("current state not in state list"));
        }
        let mut ids = FxHashSet::default();
        for (i, state) in self.states.iter().enumerate() {
            if !ids.insert(state.id()) {
                return Err(Error::internal("duplicate state identifier"));
            }
            for t in state.transitions() {
                if t.source() != i || t.target() >= n {
                    return Err(Error::internal(
                        "transition endpoint not in state list",
                    ));
                }
            }
            if let Some(action) = state.action() {
                if action.bodies().any(|b| b >= n) {
                    return Err(Error::internal(
                        "action body not in state list",
                    ));
                }
            }
        }
        if self.kind == AutomatonKind::Dfa
            && self.transitions().any(|t| t.is_epsilon())
        {
            return Err(Error::new(
                ErrorKind::InvalidAutomaton,
                "DFA with epsilon transitions",
            ));
        }
        Ok(())
    }

    /// Rebuilds transition matchers after deserialization and checks the
    /// automaton's integrity.
    pub(crate) fn rebuild(&mut self) -> Result<(), Error> {
        for state in self.states.iter_mut() {
            for t in state.transitions_mut().iter_mut() {
                t.rebuild()?;
            }
        }
        self.check_integrity()
    }

    fn check_index(&mut self, index: usize) -> Result<(), Error> {
        if index < self.states.len() {
            return Ok(());
        }
        let err = Error::invalid_parameter(format!(
            "state index {} out of bounds ({} states)",
            index,
            self.states.len()
        ));
        self.last_error = Some(err.clone());
        Err(err)
    }
}

impl Clone for Automaton {
    /// Deep copy. Cloned states keep their identifiers, and transitions
    /// refer to the states of the clone.
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            states: self.states.iter().map(|s| s.duplicate()).collect(),
            initial: self.initial,
            current: self.current,
            flags: self.flags,
            last_error: self.last_error.clone(),
        }
    }
}

impl Display for Automaton {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            AutomatonKind::Nfa => "NFA",
            AutomatonKind::Dfa => "DFA",
        };
        writeln!(f, "{} with {} states", kind, self.states.len())?;
        for (i, state) in self.states.iter().enumerate() {
            write!(f, "{:>4}", i)?;
            if Some(i) == self.initial {
                write!(f, " start")?;
            }
            if state.is_accepting() {
                write!(f, " accept")?;
            }
            if let Some(group) = state.group_index() {
                if state.is_group_start() {
                    write!(f, " open({})", group)?;
                }
                if state.is_group_end() {
                    write!(f, " close({})", group)?;
                }
            }
            let assertions = state.flags() & StateFlags::ASSERTIONS;
            if !assertions.is_empty() {
                write!(f, " {:?}", assertions)?;
            }
            if let Some(action) = state.action() {
                write!(f, " {:?}", action)?;
            }
            writeln!(f)?;
            for t in state.transitions() {
                match t.pattern() {
                    Some(p) => writeln!(f, "       {} -> {}", p, t.target())?,
                    None => writeln!(f, "       ε -> {}", t.target())?,
                }
            }
        }
        Ok(())
    }
}

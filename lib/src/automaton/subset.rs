use std::collections::VecDeque;

use itertools::Itertools;
use log::debug;
use rustc_hash::FxHashMap;

use crate::automaton::{Automaton, AutomatonKind, StateFlags, Transition};
use crate::errors::{Error, ErrorKind};
use crate::re::class::CharRanges;

/// Ceiling used by [`Automaton::to_dfa`].
pub(crate) const DEFAULT_MAX_DFA_STATES: usize = 10_000;

/// Builds a DFA equivalent to `nfa`.
///
/// Each DFA state corresponds to a set of NFA states, identified by the
/// sorted list of their indexes. For each DFA state the alphabet is split
/// into disjoint intervals such that every NFA transition leaving the set
/// covers an interval either completely or not at all; intervals that lead
/// to the same set of NFA states are merged into a single DFA transition.
pub(crate) fn subset_construction(
    nfa: &Automaton,
    max_states: usize,
) -> Result<Automaton, Error> {
    let initial = nfa.initial().ok_or_else(|| {
        Error::new(ErrorKind::InvalidAutomaton, "automaton has no initial state")
    })?;

    // Ranges of every non-epsilon transition, indexed by state and
    // transition index.
    let mut ranges: Vec<Vec<Option<CharRanges>>> =
        Vec::with_capacity(nfa.state_count());

    for state in nfa.states() {
        if state.action().is_some()
            || state.flags().intersects(StateFlags::ASSERTIONS)
        {
            return Err(Error::unsupported_operation(
                "automata with assertions, lookarounds or backreferences \
                 can't be converted into a DFA",
            ));
        }
        let mut state_ranges = Vec::with_capacity(state.transitions().len());
        for t in state.transitions() {
            if t.is_epsilon() {
                state_ranges.push(None);
                continue;
            }
            match t.matcher().and_then(|m| m.ranges()) {
                Some(r) => state_ranges.push(Some(r)),
                None => {
                    return Err(Error::unsupported_operation(
                        "multi-character transitions can't be converted \
                         into a DFA",
                    ))
                }
            }
        }
        ranges.push(state_ranges);
    }

    let mut dfa = Automaton::new(AutomatonKind::Dfa);
    dfa.set_flags(nfa.flags());

    let mut index: FxHashMap<Vec<usize>, usize> = FxHashMap::default();
    let mut queue = VecDeque::new();

    let start = nfa.epsilon_closure(&[initial]);
    let start_idx = add_dfa_state(&mut dfa, nfa, &start);
    index.insert(start.clone(), start_idx);
    queue.push_back(start);
    dfa.set_initial(start_idx)?;

    while let Some(members) = queue.pop_front() {
        let source = index[&members];

        // Outgoing non-epsilon edges of the set: (ranges, target).
        let edges: Vec<(&CharRanges, usize)> = members
            .iter()
            .flat_map(|s| {
                nfa.states()[*s]
                    .transitions()
                    .iter()
                    .zip(ranges[*s].iter())
                    .filter_map(|(t, r)| r.as_ref().map(|r| (r, t.target())))
            })
            .collect();

        if edges.is_empty() {
            continue;
        }

        // Interval boundaries. Every point where some range starts or ends.
        let mut points: Vec<u32> = edges
            .iter()
            .flat_map(|(r, _)| r.ranges().iter().flat_map(|(lo, hi)| [*lo, hi + 1]))
            .collect();
        points.sort_unstable();
        points.dedup();

        // Targets for each elementary interval, merged by target set in
        // order of first appearance.
        let mut moves: Vec<(Vec<usize>, Vec<(u32, u32)>)> = Vec::new();

        for (lo, next) in points.iter().tuple_windows() {
            let hi = next - 1;
            let probe = match char::from_u32(*lo) {
                Some(c) => c,
                // Interval starting at a surrogate, can't be matched.
                None => continue,
            };
            let mut targets: Vec<usize> = edges
                .iter()
                .filter(|(r, _)| r.contains(probe))
                .map(|(_, t)| *t)
                .collect();
            if targets.is_empty() {
                continue;
            }
            targets.sort_unstable();
            targets.dedup();
            match moves.iter_mut().find(|(t, _)| *t == targets) {
                Some((_, intervals)) => intervals.push((*lo, hi)),
                None => moves.push((targets, vec![(*lo, hi)])),
            }
        }

        for (targets, intervals) in moves {
            let closure = nfa.epsilon_closure(&targets);
            let target = match index.get(&closure) {
                Some(target) => *target,
                None => {
                    if dfa.state_count() >= max_states {
                        return Err(Error::new(
                            ErrorKind::InvalidAutomaton,
                            format!(
                                "subset construction exceeded {} states",
                                max_states
                            ),
                        ));
                    }
                    let target = add_dfa_state(&mut dfa, nfa, &closure);
                    index.insert(closure.clone(), target);
                    queue.push_back(closure);
                    target
                }
            };
            let spec = CharRanges::from_pairs(intervals).to_spec();
            let transition = Transition::new(source, target, spec)?;
            if let Some(state) = dfa.state_mut(source) {
                state.add_transition(transition);
            }
        }
    }

    debug!(
        "subset construction: {} NFA states -> {} DFA states",
        nfa.state_count(),
        dfa.state_count()
    );

    Ok(dfa)
}

fn add_dfa_state(dfa: &mut Automaton, nfa: &Automaton, members: &[usize]) -> usize {
    let accepting = members.iter().any(|s| nfa.states()[*s].is_accepting());
    let idx = dfa.create_state(accepting);
    if let Some(state) = dfa.state_mut(idx) {
        state.set_pattern(Some(format!("{{{}}}", members.iter().join(","))));
    }
    idx
}

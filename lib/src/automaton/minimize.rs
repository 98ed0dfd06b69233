use std::collections::VecDeque;

use log::debug;
use rustc_hash::FxHashMap;

use crate::automaton::{Automaton, AutomatonKind, Transition};
use crate::errors::{Error, ErrorKind};
use crate::re::class::CharRanges;

/// Returns the minimal DFA that accepts the same language as `dfa`.
///
/// The alphabet is split into elementary intervals, so that every
/// transition in the DFA covers each interval either completely or not at
/// all. Then states are partitioned into blocks, starting with accepting
/// and non-accepting states, and blocks are split until all the states in
/// each block go to the same blocks for every interval. Missing transitions
/// are treated as going to an implicit dead block.
///
/// The result is canonical: states are numbered in breadth-first order from
/// the initial state, and states that can't reach an accepting state are
/// removed (except the initial one). Minimizing the result again produces
/// an identical automaton.
pub(crate) fn minimize(dfa: &Automaton) -> Result<Automaton, Error> {
    if !dfa.is_deterministic() {
        return Err(Error::unsupported_operation(
            "only deterministic automata can be minimized",
        ));
    }

    let initial = dfa.initial().ok_or_else(|| {
        Error::new(ErrorKind::InvalidAutomaton, "automaton has no initial state")
    })?;

    let reachable = dfa.reachable();
    let mut position = vec![usize::MAX; dfa.state_count()];
    for (i, s) in reachable.iter().enumerate() {
        position[*s] = i;
    }

    // Ranges of every transition of the reachable states.
    let mut edges: Vec<Vec<(CharRanges, usize)>> = Vec::with_capacity(reachable.len());
    for s in &reachable {
        let mut state_edges = Vec::new();
        for t in dfa.states()[*s].transitions() {
            let ranges = t.matcher().and_then(|m| m.ranges()).ok_or_else(|| {
                Error::unsupported_operation(
                    "only deterministic automata can be minimized",
                )
            })?;
            state_edges.push((ranges, position[t.target()]));
        }
        edges.push(state_edges);
    }

    // Elementary intervals over the whole automaton.
    let mut points: Vec<u32> = edges
        .iter()
        .flatten()
        .flat_map(|(r, _)| r.ranges().iter().flat_map(|(lo, hi)| [*lo, hi + 1]))
        .collect();
    points.sort_unstable();
    points.dedup();

    let intervals: Vec<(u32, u32)> = points
        .windows(2)
        .map(|w| (w[0], w[1] - 1))
        .filter(|(lo, _)| char::from_u32(*lo).is_some())
        .collect();

    // delta[s][i] is the target of state s for interval i.
    let delta: Vec<Vec<Option<usize>>> = edges
        .iter()
        .map(|state_edges| {
            intervals
                .iter()
                .map(|(lo, _)| {
                    let c = char::from_u32(*lo)?;
                    state_edges
                        .iter()
                        .find(|(r, _)| r.contains(c))
                        .map(|(_, t)| *t)
                })
                .collect()
        })
        .collect();

    // Initial partition: accepting and non-accepting.
    let mut block: Vec<usize> = reachable
        .iter()
        .map(|s| usize::from(dfa.states()[*s].is_accepting()))
        .collect();
    let mut block_count = {
        let mut b = block.clone();
        b.sort_unstable();
        b.dedup();
        b.len()
    };

    loop {
        let mut signatures: FxHashMap<(usize, Vec<Option<usize>>), usize> =
            FxHashMap::default();
        let mut new_block = Vec::with_capacity(block.len());
        for (s, targets) in delta.iter().enumerate() {
            let signature = (
                block[s],
                targets.iter().map(|t| t.map(|t| block[t])).collect(),
            );
            let next_id = signatures.len();
            new_block.push(*signatures.entry(signature).or_insert(next_id));
        }
        let new_count = signatures.len();
        block = new_block;
        if new_count == block_count {
            break;
        }
        block_count = new_count;
    }

    // Blocks that can reach an accepting block.
    let mut live = vec![false; block_count];
    for (s, b) in block.iter().enumerate() {
        if dfa.states()[reachable[s]].is_accepting() {
            live[*b] = true;
        }
    }
    let mut changed = true;
    while changed {
        changed = false;
        for (s, targets) in delta.iter().enumerate() {
            if live[block[s]] {
                continue;
            }
            if targets.iter().flatten().any(|t| live[block[*t]]) {
                live[block[s]] = true;
                changed = true;
            }
        }
    }

    // Representative of each block: its first member in BFS order.
    let mut representative = vec![usize::MAX; block_count];
    for (s, b) in block.iter().enumerate().rev() {
        representative[*b] = s;
    }

    // Transitions of each block, merged by target block and sorted by the
    // lowest code point they accept.
    let block_edges: Vec<Vec<(usize, CharRanges)>> = (0..block_count)
        .map(|b| {
            let rep = representative[b];
            let mut by_target: Vec<(usize, Vec<(u32, u32)>)> = Vec::new();
            for (i, target) in delta[rep].iter().enumerate() {
                let Some(target) = target else { continue };
                let tb = block[*target];
                if !live[tb] {
                    continue;
                }
                match by_target.iter_mut().find(|(t, _)| *t == tb) {
                    Some((_, pairs)) => pairs.push(intervals[i]),
                    None => by_target.push((tb, vec![intervals[i]])),
                }
            }
            let mut merged: Vec<(usize, CharRanges)> = by_target
                .into_iter()
                .map(|(t, pairs)| (t, CharRanges::from_pairs(pairs)))
                .collect();
            merged.sort_by_key(|(_, r)| r.ranges().first().map(|(lo, _)| *lo));
            merged
        })
        .collect();

    // Number blocks in BFS order over the minimized graph.
    let initial_block = block[position[initial]];
    let mut order = vec![usize::MAX; block_count];
    let mut queue = VecDeque::from([initial_block]);
    let mut next = 0;
    order[initial_block] = next;
    next += 1;
    let mut bfs = Vec::new();
    while let Some(b) = queue.pop_front() {
        bfs.push(b);
        for (t, _) in &block_edges[b] {
            if order[*t] == usize::MAX {
                order[*t] = next;
                next += 1;
                queue.push_back(*t);
            }
        }
    }

    let mut min = Automaton::new(AutomatonKind::Dfa);
    min.set_flags(dfa.flags());

    for b in &bfs {
        let rep = reachable[representative[*b]];
        min.create_state(dfa.states()[rep].is_accepting());
    }
    for b in &bfs {
        for (t, ranges) in &block_edges[*b] {
            let transition = Transition::new(order[*b], order[*t], ranges.to_spec())?;
            if let Some(state) = min.state_mut(order[*b]) {
                state.add_transition(transition);
            }
        }
    }
    min.set_initial(0)?;

    debug!(
        "minimization: {} DFA states -> {} states",
        dfa.state_count(),
        min.state_count()
    );

    Ok(min)
}

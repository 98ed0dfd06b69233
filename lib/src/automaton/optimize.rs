use log::debug;

use crate::automaton::{
    Automaton, AutomatonKind, StateAction, StateFlags, Transition,
};
use crate::errors::Error;

/// Runs the optimization passes until none of them changes the automaton,
/// then minimizes the result if it's deterministic.
pub(crate) fn optimize(automaton: &mut Automaton) -> Result<(), Error> {
    if automaton.initial().is_none() {
        return Ok(());
    }

    automaton.check_integrity()?;

    let states_before = automaton.state_count();
    let transitions_before = automaton.transition_count();

    loop {
        let mut changed = remove_unreachable(automaton);
        changed |= remove_dead(automaton);
        changed |= merge_transitions(automaton);
        changed |= bypass_forwarders(automaton);
        if !changed {
            break;
        }
    }

    if automaton.kind() == AutomatonKind::Dfa && automaton.is_deterministic() {
        let flags = automaton.flags();
        *automaton = automaton.minimize()?;
        automaton.set_flags(flags);
    }

    debug!(
        "optimization: {} states / {} transitions -> {} states / {} transitions",
        states_before,
        transitions_before,
        automaton.state_count(),
        automaton.transition_count()
    );

    Ok(())
}

/// Removes states that can't be reached from the initial state.
fn remove_unreachable(automaton: &mut Automaton) -> bool {
    let mut keep = vec![false; automaton.state_count()];
    for s in automaton.reachable() {
        keep[s] = true;
    }
    if keep.iter().all(|k| *k) {
        return false;
    }
    automaton.retain_states(&keep);
    true
}

/// Removes states from which no accepting state can be reached. States
/// inside lookaround or atomic bodies are kept, their fate is decided by
/// the state that owns the body.
fn remove_dead(automaton: &mut Automaton) -> bool {
    let n = automaton.state_count();
    let mut live = vec![false; n];

    for (i, state) in automaton.states().iter().enumerate() {
        if state.is_accepting()
            || state.flags().contains(StateFlags::SUBMATCH_END)
            || matches!(state.action(), Some(StateAction::Accept))
        {
            live[i] = true;
        }
    }

    // Body states are protected.
    let mut stack: Vec<usize> = automaton
        .states()
        .iter()
        .filter_map(|s| s.action())
        .flat_map(|a| a.bodies())
        .collect();
    let mut protected = vec![false; n];
    while let Some(s) = stack.pop() {
        if std::mem::replace(&mut protected[s], true) {
            continue;
        }
        live[s] = true;
        for t in automaton.states()[s].transitions() {
            stack.push(t.target());
        }
    }

    // Backward reachability from live states.
    let mut changed = true;
    while changed {
        changed = false;
        for (i, state) in automaton.states().iter().enumerate() {
            if live[i] {
                continue;
            }
            if state.transitions().iter().any(|t| live[t.target()]) {
                live[i] = true;
                changed = true;
            }
        }
    }

    if let Some(initial) = automaton.initial() {
        live[initial] = true;
    }

    if live.iter().all(|l| *l) {
        return false;
    }
    automaton.retain_states(&live);
    true
}

/// Removes transitions that go to the same target with the same pattern as
/// a transition tried earlier from the same state.
fn merge_transitions(automaton: &mut Automaton) -> bool {
    let mut changed = false;
    for i in 0..automaton.state_count() {
        let Some(state) = automaton.state_mut(i) else { continue };
        // The position of the transitions of a conditional is meaningful.
        if matches!(state.action(), Some(StateAction::Conditional(_))) {
            continue;
        }
        let transitions = state.transitions_mut();
        let before = transitions.len();
        let mut kept: Vec<_> = Vec::with_capacity(before);
        for t in transitions.drain(..) {
            if !kept.iter().any(|k: &Transition| k.same_edge(&t)) {
                kept.push(t);
            }
        }
        changed |= kept.len() != before;
        *transitions = kept;
    }
    changed
}

/// Redirects transitions that go into a state that has no effect and a
/// single epsilon transition, so that they go directly to that state's
/// target. The forwarding state becomes unreachable and is removed by the
/// next pass.
fn bypass_forwarders(automaton: &mut Automaton) -> bool {
    let n = automaton.state_count();
    let mut forward: Vec<Option<usize>> = vec![None; n];

    for (i, state) in automaton.states().iter().enumerate() {
        if !state.is_plain() {
            continue;
        }
        if let [t] = state.transitions() {
            if t.is_epsilon() && t.target() != i {
                forward[i] = Some(t.target());
            }
        }
    }

    if forward.iter().all(|f| f.is_none()) {
        return false;
    }

    // Resolve chains, stopping at cycles made only of forwarders.
    let resolve = |start: usize| -> usize {
        let mut current = start;
        let mut steps = 0;
        while let Some(next) = forward[current] {
            current = next;
            steps += 1;
            if steps > n {
                return start;
            }
        }
        current
    };

    let resolved: Vec<usize> = (0..n).map(resolve).collect();
    let mut changed = false;

    for i in 0..n {
        let Some(state) = automaton.state_mut(i) else { continue };
        for t in state.transitions_mut().iter_mut() {
            let target = resolved[t.target()];
            if target != t.target() {
                t.set_target(target);
                changed = true;
            }
        }
        if let Some(action) = state.action_mut() {
            let mut moved = false;
            action.remap_bodies(|b| {
                moved |= resolved[b] != b;
                resolved[b]
            });
            changed |= moved;
        }
    }

    if let Some(initial) = automaton.initial() {
        if resolved[initial] != initial {
            automaton.initial = Some(resolved[initial]);
            automaton.current = Some(resolved[initial]);
            changed = true;
        }
    }

    changed
}

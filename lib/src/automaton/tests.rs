use pretty_assertions::assert_eq;

use crate::automaton::{
    Automaton, AutomatonKind, LookKind, StateAction, StateFlags,
};
use crate::errors::ErrorKind;

/// All the strings over `alphabet` with length up to `max_len`.
fn strings(alphabet: &[char], max_len: usize) -> Vec<String> {
    let mut result = vec![String::new()];
    let mut last = vec![String::new()];
    for _ in 0..max_len {
        let mut next = Vec::new();
        for s in &last {
            for c in alphabet {
                let mut n = s.clone();
                n.push(*c);
                next.push(n);
            }
        }
        result.extend(next.iter().cloned());
        last = next;
    }
    result
}

/// NFA for `\d+` built the way the compiler would, with an epsilon loop.
fn digits_nfa() -> Automaton {
    let mut nfa = Automaton::new(AutomatonKind::Nfa);
    let s0 = nfa.create_state(false);
    let s1 = nfa.create_state(true);
    nfa.add_transition(s0, s1, "\\d").unwrap();
    nfa.add_epsilon_transition(s1, s0).unwrap();
    nfa.set_initial(s0).unwrap();
    nfa
}

/// NFA for `(a|b)*abb`.
fn abb_nfa() -> Automaton {
    let mut nfa = Automaton::new(AutomatonKind::Nfa);
    let s: Vec<usize> = (0..6).map(|_| nfa.create_state(false)).collect();
    nfa.add_epsilon_transition(s[0], s[1]).unwrap();
    nfa.add_transition(s[1], s[1], "a").unwrap();
    nfa.add_transition(s[1], s[1], "b").unwrap();
    nfa.add_transition(s[1], s[2], "a").unwrap();
    nfa.add_transition(s[2], s[3], "b").unwrap();
    nfa.add_transition(s[3], s[4], "b").unwrap();
    nfa.add_epsilon_transition(s[4], s[5]).unwrap();
    nfa.state_mut(s[5]).unwrap().set_accepting(true);
    nfa.set_initial(s[0]).unwrap();
    nfa
}

/// NFA for `(a|b)*a(a|b)(a|b)`, whose DFA has 8 states.
fn third_from_last_nfa() -> Automaton {
    let mut nfa = Automaton::new(AutomatonKind::Nfa);
    let s: Vec<usize> = (0..4).map(|i| nfa.create_state(i == 3)).collect();
    nfa.add_transition(s[0], s[0], "[ab]").unwrap();
    nfa.add_transition(s[0], s[1], "a").unwrap();
    nfa.add_transition(s[1], s[2], "[ab]").unwrap();
    nfa.add_transition(s[2], s[3], "[ab]").unwrap();
    nfa.set_initial(s[0]).unwrap();
    nfa
}

#[test]
fn digits_dfa_has_two_states() {
    let nfa = digits_nfa();
    assert!(!nfa.is_deterministic());

    let dfa = nfa.to_dfa().unwrap();
    assert_eq!(dfa.kind(), AutomatonKind::Dfa);
    assert!(dfa.is_deterministic());

    let min = dfa.minimize().unwrap();
    assert_eq!(min.state_count(), 2);
    assert!(!min.states()[0].is_accepting());
    assert!(min.states()[1].is_accepting());

    for input in ["0", "123", "99999"] {
        assert!(min.accepts(input), "{}", input);
    }
    for input in ["", "a", "12a", "a12"] {
        assert!(!min.accepts(input), "{}", input);
    }
}

#[test]
fn subset_construction_is_sound() {
    let nfa = abb_nfa();
    let dfa = nfa.to_dfa().unwrap();
    assert!(dfa.is_deterministic());
    dfa.check_integrity().unwrap();

    for w in strings(&['a', 'b'], 7) {
        assert_eq!(nfa.accepts(&w), dfa.accepts(&w), "input: {:?}", w);
    }

    // Classic result: the minimal DFA for this language has 4 states.
    let min = dfa.minimize().unwrap();
    assert_eq!(min.state_count(), 4);
    for w in strings(&['a', 'b', 'c'], 5) {
        assert_eq!(dfa.accepts(&w), min.accepts(&w), "input: {:?}", w);
    }
}

#[test]
fn subset_construction_ceiling() {
    let nfa = third_from_last_nfa();
    assert_eq!(nfa.to_dfa().unwrap().state_count(), 8);

    let err = nfa.to_dfa_with_limit(3).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAutomaton);
}

#[test]
fn subset_construction_rejects_actions() {
    let mut nfa = digits_nfa();
    nfa.state_mut(0).unwrap().set_action(Some(StateAction::Fail));
    assert_eq!(
        nfa.to_dfa().unwrap_err().kind(),
        ErrorKind::UnsupportedOperation
    );

    let mut nfa = digits_nfa();
    nfa.state_mut(0).unwrap().insert_flags(StateFlags::WORD_BOUNDARY);
    assert_eq!(
        nfa.to_dfa().unwrap_err().kind(),
        ErrorKind::UnsupportedOperation
    );
}

#[test]
fn minimize_merges_equivalent_states() {
    let mut dfa = Automaton::new(AutomatonKind::Dfa);
    let s0 = dfa.create_state(false);
    let s1 = dfa.create_state(true);
    let s2 = dfa.create_state(true);
    dfa.add_transition(s0, s1, "a").unwrap();
    dfa.add_transition(s0, s2, "b").unwrap();
    dfa.set_initial(s0).unwrap();

    let min = dfa.minimize().unwrap();
    assert_eq!(min.state_count(), 2);
    assert_eq!(min.transition_count(), 1);
    assert_eq!(min.states()[0].transitions()[0].pattern(), Some("[a-b]"));
    assert!(min.accepts("a"));
    assert!(min.accepts("b"));
    assert!(!min.accepts("c"));
    assert!(!min.accepts("ab"));
}

#[test]
fn minimize_is_idempotent() {
    for nfa in [digits_nfa(), abb_nfa(), third_from_last_nfa()] {
        let dfa = nfa.to_dfa().unwrap();
        let once = dfa.minimize().unwrap();
        let twice = once.minimize().unwrap();
        assert!(once.state_count() <= dfa.state_count());
        assert_eq!(once.to_string(), twice.to_string());
    }
}

#[test]
fn minimize_rejects_nfa() {
    let err = digits_nfa().minimize().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
}

#[test]
fn optimize_removes_useless_states() {
    let mut nfa = Automaton::new(AutomatonKind::Nfa);
    let s0 = nfa.create_state(false);
    let s1 = nfa.create_state(false);
    let s2 = nfa.create_state(true);
    let dead = nfa.create_state(false);
    let unreachable = nfa.create_state(true);
    nfa.add_epsilon_transition(s0, s1).unwrap();
    nfa.add_transition(s1, s2, "a").unwrap();
    nfa.add_transition(s1, s2, "a").unwrap();
    nfa.add_transition(s0, dead, "x").unwrap();
    nfa.add_transition(unreachable, s2, "y").unwrap();
    nfa.set_initial(s0).unwrap();

    nfa.optimize().unwrap();
    nfa.check_integrity().unwrap();

    assert_eq!(nfa.state_count(), 2);
    assert_eq!(nfa.transition_count(), 1);
    assert!(nfa.accepts("a"));
    assert!(!nfa.accepts("x"));
    assert!(!nfa.accepts("y"));
}

#[test]
fn optimize_is_idempotent() {
    let mut a = abb_nfa();
    a.optimize().unwrap();
    let once = a.to_string();
    a.optimize().unwrap();
    assert_eq!(once, a.to_string());

    let mut d = third_from_last_nfa().to_dfa().unwrap();
    d.optimize().unwrap();
    let once = d.to_string();
    d.optimize().unwrap();
    assert_eq!(once, d.to_string());
    assert_eq!(d.state_count(), 8);
}

#[test]
fn optimize_keeps_lookaround_bodies() {
    let mut nfa = Automaton::new(AutomatonKind::Nfa);
    let start = nfa.create_state(false);
    let look = nfa.create_state(false);
    let end = nfa.create_state(true);
    let body = nfa.create_state(false);
    let body_end = nfa.create_state(false);
    nfa.add_transition(start, look, "a").unwrap();
    nfa.add_epsilon_transition(look, end).unwrap();
    nfa.add_transition(body, body_end, "b").unwrap();
    nfa.state_mut(body_end)
        .unwrap()
        .insert_flags(StateFlags::SUBMATCH_END);
    nfa.state_mut(look).unwrap().set_action(Some(StateAction::Lookaround {
        kind: LookKind::Ahead,
        body,
    }));
    nfa.set_initial(start).unwrap();

    nfa.optimize().unwrap();
    nfa.check_integrity().unwrap();
    assert_eq!(nfa.state_count(), 5);
}

#[test]
fn clone_is_deep() {
    let nfa = abb_nfa();
    let mut copy = nfa.clone();

    assert_eq!(nfa.to_string(), copy.to_string());
    for (a, b) in nfa.states().iter().zip(copy.states()) {
        assert_eq!(a.id(), b.id());
        assert_eq!(a.transitions(), b.transitions());
    }

    copy.add_transition(0, 5, "z").unwrap();
    assert_ne!(nfa.transition_count(), copy.transition_count());

    let twice = copy.clone();
    assert_eq!(copy.to_string(), twice.clone().to_string());
}

#[test]
fn integrity() {
    let mut nfa = digits_nfa();
    nfa.check_integrity().unwrap();

    let err = nfa.set_initial(7).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    assert_eq!(nfa.last_error().map(|e| e.kind()), Some(ErrorKind::InvalidParameter));
    nfa.clear_error();
    assert!(nfa.last_error().is_none());

    assert!(nfa.add_transition(0, 9, "a").is_err());
    assert!(nfa.add_transition(0, 1, "[a-").is_err());
    assert!(nfa.last_error().is_some());

    let mut dfa = Automaton::new(AutomatonKind::Dfa);
    let s0 = dfa.create_state(false);
    let s1 = dfa.create_state(true);
    dfa.add_epsilon_transition(s0, s1).unwrap();
    assert_eq!(
        dfa.check_integrity().unwrap_err().kind(),
        ErrorKind::InvalidAutomaton
    );
}

#[test]
fn stepwise_interpretation() {
    let mut dfa = digits_nfa().to_dfa().unwrap();
    let initial = dfa.initial().unwrap();
    assert_eq!(dfa.current(), Some(initial));
    assert_eq!(dfa.current_transitions(8).len(), 1);
    assert_eq!(dfa.current_transitions(0).len(), 0);
    assert!(dfa.transition_matches(initial, 0, '5'));
    assert!(!dfa.transition_matches(initial, 0, 'x'));
    assert!(!dfa.transition_matches(initial, 3, '5'));

    assert!(dfa.step('4'));
    assert_ne!(dfa.current(), Some(initial));
    assert!(!dfa.step('x'));
    assert!(dfa.states()[dfa.current().unwrap()].is_accepting());

    dfa.reset();
    assert_eq!(dfa.current(), Some(initial));
}

#[test]
fn find_by_id() {
    let nfa = abb_nfa();
    let id = nfa.states()[3].id();
    assert_eq!(nfa.find_state_by_id(id), Some(3));
    let copy = nfa.clone();
    assert_eq!(copy.find_state_by_id(id), Some(3));
}

#[test]
fn assertions_in_accepts() {
    let mut nfa = Automaton::new(AutomatonKind::Nfa);
    let s0 = nfa.create_state(false);
    let s1 = nfa.create_state(false);
    let s2 = nfa.create_state(true);
    nfa.state_mut(s0).unwrap().insert_flags(StateFlags::ANCHOR_START);
    nfa.add_transition(s0, s1, "[a-z]").unwrap();
    nfa.add_epsilon_transition(s1, s2).unwrap();
    nfa.state_mut(s2).unwrap().insert_flags(StateFlags::ANCHOR_END);
    nfa.set_initial(s0).unwrap();

    assert!(nfa.accepts("q"));
    assert!(!nfa.accepts("qq"));
    assert!(!nfa.accepts(""));
}

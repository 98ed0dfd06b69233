use pretty_assertions::assert_eq;

use rift::automaton::{reset_id_counter, State, StateId};

#[test]
fn state_ids_are_sequential_after_reset() {
    // This test runs in its own process, no other thread allocates ids.
    reset_id_counter();

    let ids: Vec<u32> = (0..3).map(|_| State::new(false).id().as_u32()).collect();
    assert_eq!(ids, vec![0, 1, 2]);

    reset_id_counter();
    assert_eq!(State::new(true).id(), StateId::from(0));
}

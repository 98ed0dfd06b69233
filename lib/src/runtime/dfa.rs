use crate::automaton::Automaton;
use crate::errors::Error;
use crate::runtime::{new_slots, RawMatch, Search};

/// Walks a deterministic automaton from `start` and returns the longest
/// match, if any. DFAs don't track capture groups, the slots of the match
/// are all unset.
pub(crate) fn longest_match(
    automaton: &Automaton,
    initial: usize,
    search: &mut Search<'_>,
    start: usize,
) -> Result<Option<RawMatch>, Error> {
    let input = search.input;
    let accepts = |state: usize, pos: usize, search: &Search<'_>| {
        automaton.state(state).is_some_and(|s| s.is_accepting()) && search.end_ok(pos)
    };

    let mut state = initial;
    let mut pos = start;
    let mut last = accepts(state, pos, search).then_some(pos);

    loop {
        if !search.checkpoint(0, pos)? {
            break;
        }
        let Some(s) = automaton.state(state) else {
            break;
        };
        let rest = &input[pos..];
        let step = s
            .transitions()
            .iter()
            .find_map(|t| t.match_len(rest).filter(|len| *len > 0).map(|len| (t.target(), len)));
        let Some((target, len)) = step else {
            break;
        };
        state = target;
        pos += len;
        if accepts(state, pos, search) {
            last = Some(pos);
        }
    }

    Ok(last.map(|end| (end, new_slots(automaton.group_count()))))
}

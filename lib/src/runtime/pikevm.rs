/*! Pike VM for automata without actions.

All the paths through the automaton advance in lockstep, one character at
a time. The threads alive at each position are kept in priority order, the
same order in which the backtracking executor would try them, so the first
thread that reaches an accepting state is the match the backtracking
executor would find. When that happens the threads with lower priority are
discarded, and the threads with higher priority keep running in case they
produce a match too.
*/

use bitvec::vec::BitVec;

use crate::automaton::Automaton;
use crate::errors::Error;
use crate::runtime::bitmapset::BitmapSet;
use crate::runtime::{new_slots, RawMatch, Search, Slots, UNCLOSED};

/// True if the automaton can be executed by the Pike VM: it has no actions
/// and every transition is epsilon or consumes exactly one character.
pub(crate) fn supports(automaton: &Automaton) -> bool {
    !automaton.has_actions()
        && automaton
            .transitions()
            .all(|t| t.matcher().map_or(true, |m| m.is_single_char()))
}

#[derive(Debug, Clone)]
enum ThreadKind {
    /// Waiting to take a consuming transition of a state.
    Consume { state: usize, transition: usize },
    /// Accepts at the current position.
    Accept,
}

#[derive(Debug, Clone)]
struct Thread {
    kind: ThreadKind,
    slots: Slots,
}

enum Job {
    Explore(usize, Slots),
    Add(usize, Thread),
}

pub(crate) struct PikeVM<'a> {
    automaton: &'a Automaton,
    /// Key of the first transition of each state. Threads are keyed by
    /// the transition they are waiting on, or by `accept_base + state`
    /// for accept threads.
    transition_base: Vec<usize>,
    accept_base: usize,
}

impl<'a> PikeVM<'a> {
    pub fn new(automaton: &'a Automaton) -> Self {
        let mut transition_base = Vec::with_capacity(automaton.state_count());
        let mut next = 0;
        for state in automaton.states() {
            transition_base.push(next);
            next += state.transitions().len();
        }
        Self { automaton, transition_base, accept_base: next }
    }

    fn key_count(&self) -> usize {
        self.accept_base + self.automaton.state_count()
    }

    /// Finds the match starting at `start` with the highest priority.
    pub fn search(
        &self,
        initial: usize,
        search: &mut Search<'_>,
        start: usize,
    ) -> Result<Option<RawMatch>, Error> {
        let input = search.input;
        let mut clist: BitmapSet<Thread> = BitmapSet::with_capacity(self.key_count());
        let mut nlist: BitmapSet<Thread> = BitmapSet::with_capacity(self.key_count());
        let mut visited: BitVec<usize> = BitVec::repeat(false, self.automaton.state_count());
        let mut matched = None;

        let slots = new_slots(self.automaton.group_count());
        self.closure(initial, start, slots, &mut clist, &mut visited, search)?;

        let mut pos = start;

        while !clist.is_empty() {
            let c = input[pos..].chars().next();
            let next_pos = pos + c.map_or(0, char::len_utf8);

            visited.fill(false);
            nlist.clear();

            for (_, thread) in clist.iter() {
                match &thread.kind {
                    ThreadKind::Accept => {
                        if search.end_ok(pos) {
                            matched = Some((pos, thread.slots.clone()));
                            break;
                        }
                    }
                    ThreadKind::Consume { state, transition } => {
                        let Some(c) = c else { continue };
                        let Some(t) = self
                            .automaton
                            .state(*state)
                            .and_then(|s| s.transitions().get(*transition))
                        else {
                            continue;
                        };
                        if t.matches_char(c) {
                            self.closure(
                                t.target(),
                                next_pos,
                                thread.slots.clone(),
                                &mut nlist,
                                &mut visited,
                                search,
                            )?;
                        }
                    }
                }
            }

            if c.is_none() {
                break;
            }

            std::mem::swap(&mut clist, &mut nlist);
            pos = next_pos;
        }

        Ok(matched)
    }

    /// Adds to `list` the threads reachable from `state` at `pos` without
    /// consuming input, in priority order.
    fn closure(
        &self,
        state: usize,
        pos: usize,
        slots: Slots,
        list: &mut BitmapSet<Thread>,
        visited: &mut BitVec<usize>,
        search: &mut Search<'_>,
    ) -> Result<(), Error> {
        let input = search.input;
        let mut jobs = vec![Job::Explore(state, slots)];

        while let Some(job) = jobs.pop() {
            let (s, mut slots) = match job {
                Job::Add(key, thread) => {
                    list.insert(key, thread);
                    continue;
                }
                Job::Explore(s, slots) => (s, slots),
            };

            if visited.get(s).map_or(true, |bit| *bit) {
                continue;
            }
            visited.set(s, true);

            if !search.checkpoint(jobs.len(), pos)? {
                continue;
            }

            let Some(st) = self.automaton.state(s) else {
                continue;
            };
            if !st.flags().holds_at(input, pos) {
                continue;
            }

            if let Some(group) = st.group_index().filter(|g| *g > 0) {
                let slot = (group - 1) * 2;
                if slot + 1 < slots.len() {
                    if st.is_group_start() && slots[slot] == UNCLOSED {
                        slots[slot] = pos;
                    }
                    if st.is_group_end() {
                        slots[slot + 1] = pos;
                    }
                }
            }

            // Jobs are pushed in reverse priority order, accepting has the
            // lowest priority.
            if st.is_accepting() {
                let thread = Thread { kind: ThreadKind::Accept, slots: slots.clone() };
                jobs.push(Job::Add(self.accept_base + s, thread));
            }
            for (i, t) in st.transitions().iter().enumerate().rev() {
                if t.is_epsilon() {
                    jobs.push(Job::Explore(t.target(), slots.clone()));
                } else {
                    let thread = Thread {
                        kind: ThreadKind::Consume { state: s, transition: i },
                        slots: slots.clone(),
                    };
                    jobs.push(Job::Add(self.transition_base[s] + i, thread));
                }
            }
        }

        Ok(())
    }
}

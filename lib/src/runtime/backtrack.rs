use smallvec::SmallVec;

use crate::automaton::{Automaton, Condition, LookKind, State, StateAction, StateFlags};
use crate::errors::Error;
use crate::runtime::backtracker::{Backtracker, Frame};
use crate::runtime::{captured, match_backref, new_slots, RawMatch, Search, Slots, UNCLOSED};
use crate::stack::ensure_sufficient_stack;

/// Where a run of the backtracking executor ends successfully.
#[derive(Debug, Clone, Copy)]
enum Goal {
    /// An accepting state or `(*ACCEPT)`, subject to the constraints of the
    /// search.
    Accept,
    /// The end of a lookaround or atomic body. If `end` is set the body
    /// must end exactly there.
    Submatch { end: Option<usize> },
}

/// Alternatives that can be taken from a state, in priority order.
enum Next {
    State { state: usize, pos: usize },
    Accept { pos: usize },
}

/// Depth-first executor for NFAs.
///
/// Alternatives are kept in an explicit [`Backtracker`], so the native
/// stack only grows with the nesting of lookarounds and atomic groups, not
/// with the length of the input. States entered at the same position
/// without consuming input are remembered in the frame's trail, and
/// entering one of them again fails. This cuts empty loops like `(a*)*`.
pub(crate) struct Backtrack<'r, 's> {
    automaton: &'r Automaton,
    search: &'r mut Search<'s>,
    group_count: usize,
}

impl<'r, 's> Backtrack<'r, 's> {
    pub fn new(automaton: &'r Automaton, search: &'r mut Search<'s>) -> Self {
        Self { automaton, search, group_count: automaton.group_count() }
    }

    /// Tries to match starting exactly at `start`.
    pub fn run_at(&mut self, initial: usize, start: usize) -> Result<Option<RawMatch>, Error> {
        let slots = new_slots(self.group_count);
        self.run(initial, start, slots, Goal::Accept, 0)
    }

    fn state(&self, index: usize) -> Result<&'r State, Error> {
        self.automaton
            .state(index)
            .ok_or_else(|| Error::internal(format!("state {} not in automaton", index)))
    }

    fn goal_reached(&self, goal: Goal, pos: usize) -> bool {
        match goal {
            Goal::Accept => self.search.end_ok(pos),
            Goal::Submatch { end } => end.map_or(true, |e| e == pos),
        }
    }

    /// Runs a search on its own stack. Lookarounds and atomic groups nest
    /// searches, so this grows the native stack when needed.
    fn run(
        &mut self,
        initial: usize,
        start: usize,
        slots: Slots,
        goal: Goal,
        base_depth: usize,
    ) -> Result<Option<RawMatch>, Error> {
        ensure_sufficient_stack(|| self.run_frames(initial, start, slots, goal, base_depth))
    }

    fn run_frames(
        &mut self,
        initial: usize,
        start: usize,
        slots: Slots,
        goal: Goal,
        base_depth: usize,
    ) -> Result<Option<RawMatch>, Error> {
        let mut stack = Backtracker::nested(
            self.search.tracker.max_depth(),
            self.group_count,
            base_depth,
        );

        stack.push_frame(Frame::new(initial, start, slots))?;

        while let Some(frame) = stack.pop() {
            if !self.search.checkpoint(stack.depth(), frame.position)? {
                continue;
            }
            if frame.accept {
                if self.goal_reached(goal, frame.position) {
                    return Ok(Some((frame.position, frame.groups)));
                }
                continue;
            }
            if let Some(m) = self.explore(frame, goal, &mut stack)? {
                return Ok(Some(m));
            }
        }

        Ok(None)
    }

    /// Follows a path starting at the frame, pushing the alternatives found
    /// on the way. Returns a match if the path reaches the goal, `None` if
    /// it dies.
    fn explore(
        &mut self,
        frame: Frame,
        goal: Goal,
        stack: &mut Backtracker,
    ) -> Result<Option<RawMatch>, Error> {
        let input = self.search.input;
        let Frame { mut state, position: mut pos, mut groups, mut trail, .. } = frame;

        loop {
            if trail.contains(&state) {
                return Ok(None);
            }
            trail.push(state);

            if !self.search.checkpoint(stack.depth(), pos)? {
                return Ok(None);
            }

            let s = self.state(state)?;

            if !s.flags().holds_at(input, pos) {
                return Ok(None);
            }

            if let Some(group) = s.group_index().filter(|g| *g > 0) {
                let slot = (group - 1) * 2;
                if slot + 1 < groups.len() {
                    if s.is_group_start() && groups[slot] == UNCLOSED {
                        groups[slot] = pos;
                    }
                    if s.is_group_end() {
                        groups[slot + 1] = pos;
                    }
                }
            }

            if s.flags().contains(StateFlags::SUBMATCH_END) {
                if let Goal::Submatch { .. } = goal {
                    return Ok(self.goal_reached(goal, pos).then_some((pos, groups)));
                }
            }

            if let Some(action) = s.action() {
                match action {
                    StateAction::Fail => return Ok(None),
                    StateAction::Accept => {
                        return Ok(self.goal_reached(goal, pos).then_some((pos, groups)));
                    }
                    StateAction::Commit => {
                        stack.reset();
                        if let Goal::Accept = goal {
                            self.search.committed = true;
                        }
                    }
                    StateAction::Backref { group, case_insensitive } => {
                        let Some(text) = captured(input, &groups, *group) else {
                            return Ok(None);
                        };
                        let Some(len) = match_backref(text, &input[pos..], *case_insensitive)
                        else {
                            return Ok(None);
                        };
                        if len > 0 {
                            pos += len;
                            trail.clear();
                        }
                    }
                    StateAction::Lookaround { kind, body } => {
                        let depth = stack.depth();
                        match self.lookaround(*kind, *body, pos, &groups, depth)? {
                            Some(g) if !kind.is_negative() => groups = g,
                            None if kind.is_negative() => {}
                            _ => return Ok(None),
                        }
                    }
                    StateAction::Atomic { body } => {
                        let depth = stack.depth();
                        let goal = Goal::Submatch { end: None };
                        match self.run(*body, pos, groups.clone(), goal, depth)? {
                            Some((end, g)) => {
                                if end != pos {
                                    trail.clear();
                                }
                                pos = end;
                                groups = g;
                            }
                            None => return Ok(None),
                        }
                    }
                    StateAction::Conditional(condition) => {
                        let holds = match condition {
                            Condition::Group(n) => captured(input, &groups, *n).is_some(),
                            Condition::Look { kind, body } => {
                                let depth = stack.depth();
                                match self.lookaround(*kind, *body, pos, &groups, depth)? {
                                    Some(g) if !kind.is_negative() => {
                                        groups = g;
                                        true
                                    }
                                    Some(_) => false,
                                    None => kind.is_negative(),
                                }
                            }
                        };
                        let transitions = s.transitions();
                        let branch = if holds {
                            transitions.first()
                        } else {
                            transitions.get(1).or(transitions.first())
                        };
                        match branch {
                            Some(t) => {
                                state = t.target();
                                continue;
                            }
                            None => return Ok(None),
                        }
                    }
                }
            }

            let mut next: SmallVec<[Next; 4]> = SmallVec::new();
            let rest = &input[pos..];
            for t in s.transitions() {
                match t.match_len(rest) {
                    Some(len) => next.push(Next::State { state: t.target(), pos: pos + len }),
                    None => continue,
                }
            }
            if s.is_accepting() {
                if let Goal::Accept = goal {
                    next.push(Next::Accept { pos });
                }
            }

            let mut alternatives = next.into_iter();
            let Some(first) = alternatives.next() else {
                return Ok(None);
            };

            // Lower priority alternatives are pushed in reverse order, so
            // that the second one ends up at the top of the stack.
            let pending: SmallVec<[Next; 4]> = alternatives.collect();
            for alt in pending.into_iter().rev() {
                let frame = match alt {
                    Next::State { state: target, pos: p } => {
                        let mut frame = Frame::new(target, p, groups.clone());
                        if p == pos {
                            frame.trail = trail.clone();
                        }
                        frame
                    }
                    Next::Accept { pos: p } => {
                        let mut frame = Frame::new(state, p, groups.clone());
                        frame.accept = true;
                        frame
                    }
                };
                if self.search.check_push(stack.depth(), frame.position)? {
                    stack.push_frame(frame)?;
                }
            }

            match first {
                Next::State { state: target, pos: p } => {
                    if p != pos {
                        trail.clear();
                    }
                    state = target;
                    pos = p;
                }
                Next::Accept { pos: p } => {
                    return Ok(self.goal_reached(goal, p).then_some((p, groups)));
                }
            }
        }
    }

    /// Evaluates a lookaround at `pos`. Returns the capture slots of the
    /// body when it matches.
    ///
    /// Lookbehinds try every start position before `pos`, closest first,
    /// and require the body to end exactly at `pos`.
    fn lookaround(
        &mut self,
        kind: LookKind,
        body: usize,
        pos: usize,
        groups: &Slots,
        depth: usize,
    ) -> Result<Option<Slots>, Error> {
        if !kind.is_behind() {
            let goal = Goal::Submatch { end: None };
            return Ok(self.run(body, pos, groups.clone(), goal, depth)?.map(|(_, g)| g));
        }

        let input = self.search.input;
        let goal = Goal::Submatch { end: Some(pos) };
        let mut start = pos;
        loop {
            if let Some((_, g)) = self.run(body, start, groups.clone(), goal, depth)? {
                return Ok(Some(g));
            }
            match input[..start].char_indices().next_back() {
                Some((prev, _)) => start = prev,
                None => return Ok(None),
            }
        }
    }
}

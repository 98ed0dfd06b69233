use smallvec::SmallVec;

use crate::bytecode::{Instr, Program, UNBOUNDED};
use crate::errors::Error;
use crate::flags::Flags;
use crate::runtime::{Backtracker, Frame};
use crate::runtime::{
    captured, match_backref, new_slots, Executable, RawMatch, Search, Slots, UNCLOSED,
};
use crate::stack::ensure_sufficient_stack;

type Counters = SmallVec<[(u32, u32, usize); 2]>;

/// Where a run of the interpreter ends successfully.
#[derive(Debug, Clone, Copy)]
enum Goal {
    /// An `ACCEPT` at the top level, subject to the constraints of the
    /// search.
    Accept,
    /// The `ACCEPT` at the end of a lookaround body. If `end` is set the
    /// body must end exactly there.
    Submatch { end: Option<usize> },
}

/// Backtracking interpreter for bytecode programs.
///
/// Works like the automaton walker: pending alternatives live in a
/// [`Backtracker`], and instructions visited at the same position without
/// consuming input are remembered in the frame's trail so that empty loops
/// end. Every instruction executed is a checkpoint.
pub(super) struct Vm<'r, 's> {
    program: &'r Program,
    search: &'r mut Search<'s>,
}

impl<'r, 's> Vm<'r, 's> {
    pub fn new(program: &'r Program, search: &'r mut Search<'s>) -> Self {
        Self { program, search }
    }

    pub fn run_at(&mut self, start: usize) -> Result<Option<RawMatch>, Error> {
        let slots = new_slots(self.program.group_count());
        self.run(0, start, slots, Goal::Accept, 0)
    }

    fn goal_reached(&self, goal: Goal, pos: usize) -> bool {
        match goal {
            Goal::Accept => self.search.end_ok(pos),
            Goal::Submatch { end } => end.map_or(true, |e| e == pos),
        }
    }

    fn instr(&self, pc: u32) -> Result<Instr, Error> {
        self.program.instrs.get(pc as usize).copied().ok_or_else(|| {
            Error::invalid_bytecode(format!("instruction {:05x} out of program", pc))
        })
    }

    fn run(
        &mut self,
        pc: u32,
        start: usize,
        slots: Slots,
        goal: Goal,
        base_depth: usize,
    ) -> Result<Option<RawMatch>, Error> {
        ensure_sufficient_stack(|| self.run_frames(pc, start, slots, goal, base_depth))
    }

    fn run_frames(
        &mut self,
        pc: u32,
        start: usize,
        slots: Slots,
        goal: Goal,
        base_depth: usize,
    ) -> Result<Option<RawMatch>, Error> {
        let mut stack = Backtracker::nested(
            self.search.tracker.max_depth(),
            self.program.group_count(),
            base_depth,
        );

        stack.push_frame(Frame::new(pc as usize, start, slots))?;

        while let Some(frame) = stack.pop() {
            if !self.search.checkpoint(stack.depth(), frame.position)? {
                continue;
            }
            if let Some(m) = self.explore(frame, goal, &mut stack)? {
                return Ok(Some(m));
            }
        }

        Ok(None)
    }

    /// Pushes an alternative that resumes at `pc`, unless the bailout
    /// manager drops it.
    fn fork(
        &mut self,
        stack: &mut Backtracker,
        pc: u32,
        pos: usize,
        groups: &Slots,
        counters: Counters,
        trail: &SmallVec<[usize; 4]>,
    ) -> Result<(), Error> {
        let mut frame = Frame::new(pc as usize, pos, groups.clone());
        frame.counters = counters;
        frame.trail = trail.clone();
        if self.search.check_push(stack.depth(), pos)? {
            stack.push_frame(frame)?;
        }
        Ok(())
    }

    fn explore(
        &mut self,
        frame: Frame,
        goal: Goal,
        stack: &mut Backtracker,
    ) -> Result<Option<RawMatch>, Error> {
        let input = self.search.input;
        let Frame { state, position: mut pos, mut groups, mut trail, mut counters, .. } =
            frame;
        let mut pc = state as u32;

        loop {
            if trail.contains(&(pc as usize)) {
                return Ok(None);
            }
            trail.push(pc as usize);

            if !self.search.checkpoint(stack.depth(), pos)? {
                return Ok(None);
            }

            match self.instr(pc)? {
                Instr::Nop => pc += 1,
                Instr::MatchChar { c, case_insensitive } => {
                    let Some(next) = input[pos..].chars().next() else {
                        return Ok(None);
                    };
                    if !crate::re::class::chars_eq(c, next, case_insensitive) {
                        return Ok(None);
                    }
                    pos += next.len_utf8();
                    pc += 1;
                    trail.clear();
                }
                Instr::MatchClass { offset, len } => {
                    let matcher = self.program.classes.matcher(offset, len).ok_or_else(
                        || Error::invalid_bytecode("invalid class reference"),
                    )?;
                    let Some(n) = matcher.match_prefix(&input[pos..]) else {
                        return Ok(None);
                    };
                    pos += n;
                    pc += 1;
                    trail.clear();
                }
                Instr::MatchAny { dotall } => {
                    match input[pos..].chars().next() {
                        Some(c) if dotall || c != '\n' => pos += c.len_utf8(),
                        _ => return Ok(None),
                    }
                    pc += 1;
                    trail.clear();
                }
                Instr::Jump(target) => pc = target,
                Instr::Split(first, second) => {
                    self.fork(stack, second, pos, &groups, counters.clone(), &trail)?;
                    pc = first;
                }
                Instr::SaveStart(group) => {
                    let slot = (group as usize).saturating_sub(1) * 2;
                    if let Some(s) = groups.get_mut(slot) {
                        if *s == UNCLOSED {
                            *s = pos;
                        }
                    }
                    pc += 1;
                }
                Instr::SaveEnd(group) => {
                    let slot = (group as usize).saturating_sub(1) * 2 + 1;
                    if let Some(s) = groups.get_mut(slot) {
                        *s = pos;
                    }
                    pc += 1;
                }
                Instr::RepeatStart { .. } => {
                    counters.push((pc, 0, pos));
                    pc = self.repeat(stack, pc, pos, &groups, &mut counters, &trail)?;
                }
                Instr::RepeatEnd { start } => {
                    let Some(top) = counters.last_mut().filter(|top| top.0 == start) else {
                        return Err(Error::invalid_bytecode(format!(
                            "REPEAT_END at {:05x} outside its repetition",
                            pc
                        )));
                    };
                    top.1 += 1;
                    let count = top.1;
                    if let Instr::RepeatStart { min, .. } = self.instr(start)? {
                        // Mandatory iterations may be empty, they are
                        // bounded by the minimum.
                        if count <= min {
                            trail.clear();
                        }
                    }
                    pc = self.repeat(stack, start, pos, &groups, &mut counters, &trail)?;
                }
                Instr::Boundary(flags) => {
                    if !flags.holds_at(input, pos) {
                        return Ok(None);
                    }
                    pc += 1;
                }
                Instr::Backref { group, case_insensitive } => {
                    let Some(text) = captured(input, &groups, group as usize) else {
                        return Ok(None);
                    };
                    let Some(len) = match_backref(text, &input[pos..], case_insensitive)
                    else {
                        return Ok(None);
                    };
                    if len > 0 {
                        pos += len;
                        trail.clear();
                    }
                    pc += 1;
                }
                Instr::Lookahead { body, next, behind } => {
                    let depth = stack.depth();
                    match self.lookaround(body, behind, pos, &groups, depth)? {
                        Some(g) => groups = g,
                        None => return Ok(None),
                    }
                    pc = next;
                }
                Instr::NegLookahead { body, next, behind } => {
                    let depth = stack.depth();
                    if self.lookaround(body, behind, pos, &groups, depth)?.is_some() {
                        return Ok(None);
                    }
                    pc = next;
                }
                Instr::Accept => {
                    return Ok(self.goal_reached(goal, pos).then_some((pos, groups)));
                }
                Instr::Fail => return Ok(None),
            }
        }
    }

    /// Decides what the repetition started at `start` does next, given the
    /// number of iterations at the top of `counters`. Returns where to
    /// continue, the other choice is pushed as an alternative.
    fn repeat(
        &mut self,
        stack: &mut Backtracker,
        start: u32,
        pos: usize,
        groups: &Slots,
        counters: &mut Counters,
        trail: &SmallVec<[usize; 4]>,
    ) -> Result<u32, Error> {
        let Instr::RepeatStart { min, max, greedy, end } = self.instr(start)? else {
            return Err(Error::invalid_bytecode(format!(
                "no REPEAT_START at {:05x}",
                start
            )));
        };
        let Some(&(_, count, iteration_start)) = counters.last() else {
            return Err(Error::internal("repetition without counter"));
        };

        let body = start + 1;
        let exit = end + 1;

        if count < min {
            if let Some(top) = counters.last_mut() {
                top.2 = pos;
            }
            return Ok(body);
        }

        let exhausted = max != UNBOUNDED && count >= max;
        let empty_iteration = count > 0 && pos == iteration_start;

        if exhausted || empty_iteration {
            counters.pop();
            return Ok(exit);
        }

        let mut entering = counters.clone();
        if let Some(top) = entering.last_mut() {
            top.2 = pos;
        }
        let mut leaving = counters.clone();
        leaving.pop();

        if greedy {
            self.fork(stack, exit, pos, groups, leaving, trail)?;
            *counters = entering;
            Ok(body)
        } else {
            self.fork(stack, body, pos, groups, entering, trail)?;
            *counters = leaving;
            Ok(exit)
        }
    }

    /// Evaluates the lookaround whose body starts at `body`. Returns the
    /// capture slots of the body when it matches.
    fn lookaround(
        &mut self,
        body: u32,
        behind: bool,
        pos: usize,
        groups: &Slots,
        depth: usize,
    ) -> Result<Option<Slots>, Error> {
        if !behind {
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

impl Executable for Program {
    fn group_count(&self) -> usize {
        Program::group_count(self)
    }

    fn group_name(&self, index: usize) -> Option<&str> {
        Program::group_name(self, index)
    }

    fn flags(&self) -> Flags {
        Program::flags(self)
    }

    fn match_at(
        &self,
        search: &mut Search<'_>,
        start: usize,
    ) -> Result<Option<RawMatch>, Error> {
        if self.is_empty() {
            return Err(Error::invalid_bytecode("program has no instructions"));
        }
        Vm::new(self, search).run_at(start)
    }
}

use std::collections::VecDeque;

use bitvec::vec::BitVec;

use crate::automaton::matcher::{Matcher, CASE_INSENSITIVE_PREFIX};
use crate::automaton::{Automaton, StateAction, StateFlags};
use crate::bytecode::{Instr, Program, UNBOUNDED};
use crate::errors::Error;
use crate::flags::Flags;
use crate::re::ast::{Anchor, Ast, BackrefTarget, GroupKind, Repeat, SyntaxTree};
use crate::re::lexer::Verb;
use crate::stack::ensure_sufficient_stack;

/// Lowers a syntax tree. The program ends with `ACCEPT`.
pub(super) fn from_ast(tree: &SyntaxTree) -> Result<Program, Error> {
    let mut lowering = AstLowering {
        tree,
        flags: tree.flags(),
        program: Program::with_capacity(tree.root().dfs().count()),
    };
    lowering.program.set_group_count(tree.group_count());
    lowering.lower(tree.root())?;
    lowering.program.push(Instr::Accept)?;
    Ok(lowering.program)
}

struct AstLowering<'a> {
    tree: &'a SyntaxTree,
    flags: Flags,
    program: Program,
}

impl AstLowering<'_> {
    fn pc(&self) -> u32 {
        self.program.len() as u32
    }

    fn emit(&mut self, instr: Instr) -> Result<u32, Error> {
        self.program.push(instr)
    }

    fn patch(&mut self, at: u32, instr: Instr) {
        if let Some(slot) = self.program.instrs.get_mut(at as usize) {
            *slot = instr;
        }
    }

    fn case_insensitive(&self) -> bool {
        self.flags.contains(Flags::CASE_INSENSITIVE)
    }

    fn lower(&mut self, node: &Ast) -> Result<(), Error> {
        ensure_sufficient_stack(|| self.lower_node(node))
    }

    fn lower_node(&mut self, node: &Ast) -> Result<(), Error> {
        match node {
            Ast::Empty | Ast::Comment(_) => {}
            Ast::Literal(c) => {
                let case_insensitive = self.case_insensitive();
                self.emit(Instr::MatchChar { c: *c, case_insensitive })?;
            }
            Ast::Dot => {
                let dotall = self.flags.contains(Flags::DOTALL);
                self.emit(Instr::MatchAny { dotall })?;
            }
            Ast::Class(class) => {
                let spec = if self.case_insensitive() {
                    format!("{}{}", CASE_INSENSITIVE_PREFIX, class.spec)
                } else {
                    class.spec.clone()
                };
                let instr = self.program.add_class(&spec)?;
                self.emit(instr)?;
            }
            Ast::Group(group) => {
                let saved = self.flags;
                match &group.kind {
                    GroupKind::NonCapturing => self.lower(&group.child)?,
                    GroupKind::Scoped(options) => {
                        self.flags = options.apply(self.flags);
                        self.lower(&group.child)?;
                    }
                    GroupKind::Capturing { index, .. } => {
                        let index = group_operand(*index)?;
                        self.emit(Instr::SaveStart(index))?;
                        self.lower(&group.child)?;
                        self.emit(Instr::SaveEnd(index))?;
                    }
                }
                self.flags = saved;
            }
            Ast::Backref(target) => {
                let group = match target {
                    BackrefTarget::Number(n)
                        if *n > 0 && *n <= self.tree.group_count() =>
                    {
                        *n
                    }
                    BackrefTarget::Number(n) => {
                        return Err(Error::syntax(
                            format!("reference to undefined group {}", n),
                            0,
                        ))
                    }
                    BackrefTarget::Name(name) => {
                        self.tree.group_index(name).ok_or_else(|| {
                            Error::syntax(
                                format!("reference to undefined group `{}`", name),
                                0,
                            )
                        })?
                    }
                };
                let case_insensitive = self.case_insensitive();
                self.emit(Instr::Backref { group: group_operand(group)?, case_insensitive })?;
            }
            Ast::Repeat(repeat) => self.lower_repeat(repeat)?,
            Ast::Anchor(anchor) => {
                let multiline = self.flags.contains(Flags::MULTILINE);
                let flags = match anchor {
                    Anchor::Caret if multiline => StateFlags::LINE_START,
                    Anchor::Caret => StateFlags::ANCHOR_START,
                    Anchor::Dollar if multiline => StateFlags::LINE_END,
                    Anchor::Dollar => StateFlags::ANCHOR_END_NEWLINE,
                    Anchor::StartOfInput => StateFlags::ANCHOR_START,
                    Anchor::EndOfInput => StateFlags::ANCHOR_END,
                    Anchor::EndOfInputOrNewline => StateFlags::ANCHOR_END_NEWLINE,
                };
                self.emit(Instr::Boundary(flags))?;
            }
            Ast::WordBoundary { negated: false } => {
                self.emit(Instr::Boundary(StateFlags::WORD_BOUNDARY))?;
            }
            Ast::WordBoundary { negated: true } => {
                self.emit(Instr::Boundary(StateFlags::NOT_WORD_BOUNDARY))?;
            }
            Ast::Lookaround { kind, child } => {
                let at = self.emit(Instr::Nop)?;
                let saved = self.flags;
                self.lower(child)?;
                self.flags = saved;
                self.emit(Instr::Accept)?;
                let (body, next, behind) = (at + 1, self.pc(), kind.is_behind());
                let instr = if kind.is_negative() {
                    Instr::NegLookahead { body, next, behind }
                } else {
                    Instr::Lookahead { body, next, behind }
                };
                self.patch(at, instr);
            }
            Ast::Options(options) => {
                // Applies to the rest of the enclosing group, which restores
                // the flags when it ends.
                self.flags = options.apply(self.flags);
            }
            Ast::Atomic(_) => {
                return Err(Error::unsupported_operation(
                    "atomic groups can't be compiled to bytecode",
                ))
            }
            Ast::Conditional(_) => {
                return Err(Error::unsupported_operation(
                    "conditionals can't be compiled to bytecode",
                ))
            }
            Ast::Verb(Verb::Commit) => {
                return Err(Error::unsupported_operation(
                    "(*COMMIT) can't be compiled to bytecode",
                ))
            }
            Ast::Verb(Verb::Fail) | Ast::Invalid => {
                self.emit(Instr::Fail)?;
            }
            Ast::Verb(Verb::Accept) => {
                self.emit(Instr::Accept)?;
            }
            Ast::Alternation(branches) => {
                let saved = self.flags;
                let mut jumps = Vec::with_capacity(branches.len());
                let last = branches.len().saturating_sub(1);
                for (i, branch) in branches.iter().enumerate() {
                    if i == last {
                        self.lower(branch)?;
                        break;
                    }
                    let split = self.emit(Instr::Nop)?;
                    self.lower(branch)?;
                    jumps.push(self.emit(Instr::Nop)?);
                    let next = self.pc();
                    self.patch(split, Instr::Split(split + 1, next));
                }
                let end = self.pc();
                for jump in jumps {
                    self.patch(jump, Instr::Jump(end));
                }
                self.flags = saved;
            }
            Ast::Concat(items) => {
                for item in items {
                    self.lower(item)?;
                }
            }
        }
        Ok(())
    }

    fn lower_repeat(&mut self, repeat: &Repeat) -> Result<(), Error> {
        if repeat.possessive {
            return Err(Error::unsupported_operation(
                "possessive repetitions can't be compiled to bytecode",
            ));
        }

        let greedy = repeat.greedy != self.flags.contains(Flags::UNGREEDY);

        let split = |enter: u32, exit: u32| {
            if greedy {
                Instr::Split(enter, exit)
            } else {
                Instr::Split(exit, enter)
            }
        };

        match (repeat.min, repeat.max) {
            // x*
            (0, None) => {
                let at = self.emit(Instr::Nop)?;
                self.lower(&repeat.child)?;
                self.emit(Instr::Jump(at))?;
                let exit = self.pc();
                self.patch(at, split(at + 1, exit));
            }
            // x+
            (1, None) => {
                let start = self.pc();
                self.lower(&repeat.child)?;
                let at = self.pc();
                self.emit(split(start, at + 1))?;
            }
            // x?
            (0, Some(1)) => {
                let at = self.emit(Instr::Nop)?;
                self.lower(&repeat.child)?;
                let exit = self.pc();
                self.patch(at, split(at + 1, exit));
            }
            (1, Some(1)) => self.lower(&repeat.child)?,
            (_, Some(0)) => {}
            (min, max) => {
                let max = max.unwrap_or(UNBOUNDED);
                let start = self.emit(Instr::Nop)?;
                self.lower(&repeat.child)?;
                let end = self.emit(Instr::RepeatEnd { start })?;
                self.patch(start, Instr::RepeatStart { min, max, greedy, end });
            }
        }

        Ok(())
    }
}

fn group_operand(group: usize) -> Result<u32, Error> {
    u32::try_from(group).map_err(|_| Error::limit_exceeded("too many capture groups"))
}

/// Lowers an automaton.
///
/// Every state reachable from the initial state, through transitions or
/// through the bodies of its actions, becomes a block of instructions. A
/// block checks the state's group markers and assertions, executes its
/// action and then tries the outgoing transitions in order, each one
/// followed by a jump to the target's block. Accepting states try
/// `ACCEPT` after their transitions, states without ways out `FAIL`.
pub(super) fn from_automaton(automaton: &Automaton) -> Result<Program, Error> {
    let initial = automaton.initial().ok_or_else(|| {
        Error::new(
            crate::errors::ErrorKind::InvalidAutomaton,
            "automaton without initial state",
        )
    })?;

    let order = bfs_order(automaton, initial);

    let mut program = Program::with_capacity(order.len() * 3);
    program.set_group_count(automaton.group_count());

    // Index of the block of each state, and the jumps that must be patched
    // once every block has an index.
    let mut blocks: Vec<u32> = vec![UNBOUNDED; automaton.state_count()];
    let mut fixups: Vec<(u32, usize)> = Vec::new();

    // The initial block must come first, bfs_order starts with it.
    for &index in &order {
        let Some(state) = automaton.state(index) else {
            continue;
        };
        blocks[index] = program.len() as u32;

        if let Some(group) = state.group_index().filter(|g| *g > 0) {
            let group = group_operand(group)?;
            if state.is_group_start() {
                program.push(Instr::SaveStart(group))?;
            }
            if state.is_group_end() {
                program.push(Instr::SaveEnd(group))?;
            }
        }

        let assertions = state.flags() & StateFlags::ASSERTIONS;
        if !assertions.is_empty() {
            program.push(Instr::Boundary(assertions))?;
        }

        if state.flags().contains(StateFlags::SUBMATCH_END) {
            program.push(Instr::Accept)?;
            continue;
        }

        match state.action() {
            None => {}
            Some(StateAction::Fail) => {
                program.push(Instr::Fail)?;
                continue;
            }
            Some(StateAction::Accept) => {
                program.push(Instr::Accept)?;
                continue;
            }
            Some(StateAction::Backref { group, case_insensitive }) => {
                program.push(Instr::Backref {
                    group: group_operand(*group)?,
                    case_insensitive: *case_insensitive,
                })?;
            }
            Some(StateAction::Lookaround { kind, body }) => {
                let at = program.len() as u32;
                let (next, behind) = (at + 1, kind.is_behind());
                let instr = if kind.is_negative() {
                    Instr::NegLookahead { body: 0, next, behind }
                } else {
                    Instr::Lookahead { body: 0, next, behind }
                };
                program.push(instr)?;
                fixups.push((at, *body));
            }
            Some(StateAction::Atomic { .. }) => {
                return Err(Error::unsupported_operation(
                    "atomic groups can't be compiled to bytecode",
                ))
            }
            Some(StateAction::Conditional(_)) => {
                return Err(Error::unsupported_operation(
                    "conditionals can't be compiled to bytecode",
                ))
            }
            Some(StateAction::Commit) => {
                return Err(Error::unsupported_operation(
                    "(*COMMIT) can't be compiled to bytecode",
                ))
            }
        }

        let transitions = state.transitions();
        let alternatives = transitions.len() + usize::from(state.is_accepting());

        if alternatives == 0 {
            program.push(Instr::Fail)?;
            continue;
        }

        for (i, t) in transitions.iter().enumerate() {
            let split = (i + 1 < alternatives).then(|| program.len() as u32);
            if split.is_some() {
                program.push(Instr::Nop)?;
            }

            if let Some(matcher) = t.matcher() {
                let pattern = t.pattern().unwrap_or_default();
                emit_matcher(&mut program, matcher, pattern)?;
            }
            let jump = program.push(Instr::Jump(0))?;
            fixups.push((jump, t.target()));

            if let Some(split) = split {
                let next = program.len() as u32;
                program.instrs[split as usize] = Instr::Split(split + 1, next);
            }
        }

        if state.is_accepting() {
            program.push(Instr::Accept)?;
        }
    }

    for (at, state) in fixups {
        let target = blocks.get(state).copied().unwrap_or(UNBOUNDED);
        if target == UNBOUNDED {
            return Err(Error::internal(format!(
                "state {} not lowered to bytecode",
                state
            )));
        }
        match &mut program.instrs[at as usize] {
            Instr::Jump(t) => *t = target,
            Instr::Lookahead { body, .. } | Instr::NegLookahead { body, .. } => {
                *body = target
            }
            _ => {}
        }
    }

    Ok(program)
}

/// Emits the instructions that consume what a transition matcher matches.
fn emit_matcher(
    program: &mut Program,
    matcher: &Matcher,
    pattern: &str,
) -> Result<(), Error> {
    match matcher {
        Matcher::Literal { chars, case_insensitive } => {
            for c in chars {
                program.push(Instr::MatchChar {
                    c: *c,
                    case_insensitive: *case_insensitive,
                })?;
            }
        }
        Matcher::Any { dotall } => {
            program.push(Instr::MatchAny { dotall: *dotall })?;
        }
        Matcher::Class { .. } => {
            let instr = program.add_class(pattern)?;
            program.push(instr)?;
        }
    }
    Ok(())
}

/// States reachable from `initial`, through transitions and action bodies,
/// in breadth-first order.
fn bfs_order(automaton: &Automaton, initial: usize) -> Vec<usize> {
    let mut seen: BitVec<usize> = BitVec::repeat(false, automaton.state_count());
    let mut queue = VecDeque::from([initial]);
    let mut order = Vec::with_capacity(automaton.state_count());

    while let Some(index) = queue.pop_front() {
        if seen.get(index).map_or(true, |bit| *bit) {
            continue;
        }
        seen.set(index, true);
        order.push(index);
        let Some(state) = automaton.state(index) else {
            continue;
        };
        for t in state.transitions() {
            queue.push_back(t.target());
        }
        if let Some(action) = state.action() {
            queue.extend(action.bodies());
        }
    }

    order
}

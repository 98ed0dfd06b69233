/*! Compiles syntax trees into automata.

The [`Compiler`] lowers a [`SyntaxTree`] into an NFA using Thompson's
construction. Each node of the tree becomes a fragment with a single entry
state and a single exit state, and fragments are wired together with epsilon
transitions. The order in which the transitions of a state are added is the
order in which a backtracking matcher tries them, so alternatives are added
from left to right, and greedy repetitions try the loop before the exit.

Constructs that can't be expressed with transitions alone (backreferences,
lookarounds, atomic groups, conditionals and backtracking verbs) become
states with a [`StateAction`]. The bodies of lookarounds and atomic groups
are compiled into the same automaton, but they are reachable only through
the action, and their exit state is flagged with
[`StateFlags::SUBMATCH_END`].
*/

use log::debug;

use crate::automaton::matcher::{CASE_INSENSITIVE_PREFIX, DOTALL_PREFIX};
use crate::automaton::{
    Automaton, AutomatonKind, Condition as StateCondition, StateAction,
    StateFlags,
};
use crate::errors::{Error, ErrorKind};
use crate::flags::Flags;
use crate::re::ast::{
    Anchor, Ast, BackrefTarget, Condition, Conditional, Group, GroupKind,
    Repeat, SyntaxTree,
};
use crate::re::class::escape_char;
use crate::re::lexer::{CondRef, Verb};
use crate::stack::ensure_sufficient_stack;

pub use fingerprint::Fingerprint;
pub(crate) use fingerprint::content_hash;

mod fingerprint;


/// Default limit for the number of states in a compiled NFA.
pub const DEFAULT_MAX_STATES: usize = 10_000;

/// A piece of automaton with one entry and one exit.
#[derive(Debug, Clone, Copy)]
struct Fragment {
    start: usize,
    end: usize,
}

impl Fragment {
    fn single(state: usize) -> Self {
        Self { start: state, end: state }
    }
}

/// Compiles syntax trees into NFAs.
pub struct Compiler {
    max_states: usize,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    /// Creates a compiler with the default limits.
    pub fn new() -> Self {
        Self { max_states: DEFAULT_MAX_STATES }
    }

    /// Maximum number of states in the produced automaton. Patterns that
    /// need more states fail with [`ErrorKind::LimitExceeded`].
    pub fn max_states(mut self, max_states: usize) -> Self {
        self.max_states = max_states;
        self
    }

    /// Compiles the tree into an NFA.
    ///
    /// The tree is expected to be valid, see [`crate::re::validator`].
    /// References to groups that don't exist make the compilation fail.
    pub fn compile(&self, tree: &SyntaxTree) -> Result<Automaton, Error> {
        let mut ctx = Context {
            automaton: Automaton::new(AutomatonKind::Nfa),
            tree,
            flags: tree.flags(),
            max_states: self.max_states,
        };

        let root = ctx.compile(tree.root())?;
        let accept = ctx.new_state()?;
        ctx.epsilon(root.end, accept)?;

        let mut automaton = ctx.automaton;
        if let Some(state) = automaton.state_mut(accept) {
            state.set_accepting(true);
        }
        automaton.set_initial(root.start)?;
        automaton.set_flags(tree.flags());

        debug!(
            "compiled `{}` into NFA with {} states and {} transitions",
            tree.root(),
            automaton.state_count(),
            automaton.transition_count()
        );

        Ok(automaton)
    }
}

struct Context<'a> {
    automaton: Automaton,
    tree: &'a SyntaxTree,
    /// Flags in effect at the node being compiled.
    flags: Flags,
    max_states: usize,
}

impl<'a> Context<'a> {
    fn new_state(&mut self) -> Result<usize, Error> {
        if self.automaton.state_count() >= self.max_states {
            return Err(Error::limit_exceeded(format!(
                "pattern needs more than {} states",
                self.max_states
            )));
        }
        Ok(self.automaton.create_state(false))
    }

    fn state_with_flags(&mut self, flags: StateFlags) -> Result<usize, Error> {
        let s = self.new_state()?;
        if let Some(state) = self.automaton.state_mut(s) {
            state.insert_flags(flags);
        }
        Ok(s)
    }

    fn state_with_action(&mut self, action: StateAction) -> Result<usize, Error> {
        let s = self.new_state()?;
        if let Some(state) = self.automaton.state_mut(s) {
            state.set_action(Some(action));
        }
        Ok(s)
    }

    fn epsilon(&mut self, from: usize, to: usize) -> Result<(), Error> {
        self.automaton.add_epsilon_transition(from, to)
    }

    /// Fragment with a single transition that matches `pattern`.
    fn consuming(&mut self, pattern: &str) -> Result<Fragment, Error> {
        let start = self.new_state()?;
        let end = self.new_state()?;
        self.automaton.add_transition(start, end, pattern)?;
        Ok(Fragment { start, end })
    }

    fn case_prefix(&self) -> &'static str {
        if self.flags.contains(Flags::CASE_INSENSITIVE) {
            CASE_INSENSITIVE_PREFIX
        } else {
            ""
        }
    }

    fn compile(&mut self, node: &Ast) -> Result<Fragment, Error> {
        ensure_sufficient_stack(|| self.compile_node(node))
    }

    fn compile_node(&mut self, node: &Ast) -> Result<Fragment, Error> {
        match node {
            Ast::Empty | Ast::Comment(_) => Ok(Fragment::single(self.new_state()?)),
            Ast::Literal(c) => {
                let mut pattern = self.case_prefix().to_string();
                escape_char(*c, &mut pattern);
                self.consuming(&pattern)
            }
            Ast::Dot => {
                if self.flags.contains(Flags::DOTALL) {
                    self.consuming(&format!("{}.", DOTALL_PREFIX))
                } else {
                    self.consuming(".")
                }
            }
            Ast::Class(class) => {
                let pattern = format!("{}{}", self.case_prefix(), class.spec);
                self.consuming(&pattern)
            }
            Ast::Group(group) => self.compile_group(group),
            Ast::Backref(target) => {
                let group = self.resolve_group(target)?;
                let s = self.state_with_action(StateAction::Backref {
                    group,
                    case_insensitive: self.flags.contains(Flags::CASE_INSENSITIVE),
                })?;
                Ok(Fragment::single(s))
            }
            Ast::Repeat(repeat) => self.compile_repeat(repeat),
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
                Ok(Fragment::single(self.state_with_flags(flags)?))
            }
            Ast::WordBoundary { negated } => {
                let flags = if *negated {
                    StateFlags::NOT_WORD_BOUNDARY
                } else {
                    StateFlags::WORD_BOUNDARY
                };
                Ok(Fragment::single(self.state_with_flags(flags)?))
            }
            Ast::Lookaround { kind, child } => {
                let body = self.compile_body(child)?;
                let s = self.state_with_action(StateAction::Lookaround {
                    kind: *kind,
                    body,
                })?;
                Ok(Fragment::single(s))
            }
            Ast::Atomic(child) => {
                let body = self.compile_body(child)?;
                let s = self.state_with_action(StateAction::Atomic { body })?;
                Ok(Fragment::single(s))
            }
            Ast::Options(options) => {
                // Applies to the rest of the enclosing group, which restores
                // the flags when it ends.
                self.flags = options.apply(self.flags);
                Ok(Fragment::single(self.new_state()?))
            }
            Ast::Conditional(cond) => self.compile_conditional(cond),
            Ast::Verb(verb) => {
                let action = match verb {
                    Verb::Fail => StateAction::Fail,
                    Verb::Accept => StateAction::Accept,
                    Verb::Commit => StateAction::Commit,
                };
                Ok(Fragment::single(self.state_with_action(action)?))
            }
            Ast::Invalid => {
                Ok(Fragment::single(self.state_with_action(StateAction::Fail)?))
            }
            Ast::Alternation(branches) => {
                let saved = self.flags;
                let start = self.new_state()?;
                let end = self.new_state()?;
                for branch in branches {
                    let frag = self.compile(branch)?;
                    self.epsilon(start, frag.start)?;
                    self.epsilon(frag.end, end)?;
                }
                self.flags = saved;
                Ok(Fragment { start, end })
            }
            Ast::Concat(items) => {
                let mut result: Option<Fragment> = None;
                for item in items {
                    let frag = self.compile(item)?;
                    result = Some(match result {
                        None => frag,
                        Some(prev) => {
                            self.epsilon(prev.end, frag.start)?;
                            Fragment { start: prev.start, end: frag.end }
                        }
                    });
                }
                match result {
                    Some(frag) => Ok(frag),
                    None => Ok(Fragment::single(self.new_state()?)),
                }
            }
        }
    }

    /// Compiles the body of a lookaround, atomic group or conditional
    /// lookaround. Returns the index of its first state.
    fn compile_body(&mut self, node: &Ast) -> Result<usize, Error> {
        let saved = self.flags;
        let frag = self.compile(node)?;
        self.flags = saved;
        let end = self.state_with_flags(StateFlags::SUBMATCH_END)?;
        self.epsilon(frag.end, end)?;
        Ok(frag.start)
    }

    fn compile_group(&mut self, group: &Group) -> Result<Fragment, Error> {
        let saved = self.flags;
        let result = match &group.kind {
            GroupKind::NonCapturing => self.compile(&group.child),
            GroupKind::Scoped(options) => {
                self.flags = options.apply(self.flags);
                self.compile(&group.child)
            }
            GroupKind::Capturing { index, name } => {
                let open = self.new_state()?;
                let child = self.compile(&group.child)?;
                let close = self.new_state()?;
                if let Some(state) = self.automaton.state_mut(open) {
                    state.set_group_start(*index);
                    state.set_group_name(name.as_deref());
                }
                if let Some(state) = self.automaton.state_mut(close) {
                    state.set_group_end(*index);
                    state.set_group_name(name.as_deref());
                }
                self.epsilon(open, child.start)?;
                self.epsilon(child.end, close)?;
                Ok(Fragment { start: open, end: close })
            }
        };
        self.flags = saved;
        result
    }

    fn compile_repeat(&mut self, repeat: &Repeat) -> Result<Fragment, Error> {
        let greedy = repeat.greedy != self.flags.contains(Flags::UNGREEDY);

        if repeat.possessive {
            // A possessive repetition is an atomic group around the greedy
            // one.
            let inner = Repeat {
                min: repeat.min,
                max: repeat.max,
                greedy: !self.flags.contains(Flags::UNGREEDY),
                possessive: false,
                child: repeat.child.clone(),
            };
            let saved = self.flags;
            let frag = self.compile_repeat(&inner)?;
            self.flags = saved;
            let end = self.state_with_flags(StateFlags::SUBMATCH_END)?;
            self.epsilon(frag.end, end)?;
            let s = self.state_with_action(StateAction::Atomic { body: frag.start })?;
            return Ok(Fragment::single(s));
        }

        let start = self.new_state()?;
        let mut end = start;

        // Mandatory copies. When the repetition is unbounded the last one
        // is left for the loop, `x{2,}` is `xx+`.
        let mandatory = match repeat.max {
            None => repeat.min.saturating_sub(1),
            Some(_) => repeat.min,
        };
        for _ in 0..mandatory {
            let frag = self.compile_child(&repeat.child)?;
            self.epsilon(end, frag.start)?;
            end = frag.end;
        }

        match repeat.max {
            None if repeat.min > 0 => {
                let frag = self.compile_child(&repeat.child)?;
                let exit = self.new_state()?;
                self.epsilon(end, frag.start)?;
                self.choice(frag.end, frag.start, exit, greedy)?;
                end = exit;
            }
            None => {
                let frag = self.compile_child(&repeat.child)?;
                let exit = self.new_state()?;
                self.choice(end, frag.start, exit, greedy)?;
                self.epsilon(frag.end, end)?;
                end = exit;
            }
            Some(max) => {
                // Optional copies are nested, `x{0,3}` is `(x(x(x)?)?)?`.
                let exit = self.new_state()?;
                for _ in repeat.min..max {
                    let frag = self.compile_child(&repeat.child)?;
                    self.choice(end, frag.start, exit, greedy)?;
                    end = frag.end;
                }
                self.epsilon(end, exit)?;
                end = exit;
            }
        }

        Ok(Fragment { start, end })
    }

    fn compile_child(&mut self, child: &Ast) -> Result<Fragment, Error> {
        let saved = self.flags;
        let frag = self.compile(child)?;
        self.flags = saved;
        Ok(frag)
    }

    /// Adds epsilon transitions from `from` to `enter` and `skip`, in the
    /// order a greedy or lazy quantifier tries them.
    fn choice(
        &mut self,
        from: usize,
        enter: usize,
        skip: usize,
        greedy: bool,
    ) -> Result<(), Error> {
        if greedy {
            self.epsilon(from, enter)?;
            self.epsilon(from, skip)
        } else {
            self.epsilon(from, skip)?;
            self.epsilon(from, enter)
        }
    }

    fn compile_conditional(&mut self, cond: &Conditional) -> Result<Fragment, Error> {
        let condition = match &cond.condition {
            Condition::Group(CondRef::Number(n)) => {
                StateCondition::Group(self.check_group(*n)?)
            }
            Condition::Group(CondRef::Name(name)) => StateCondition::Group(
                self.resolve_group(&BackrefTarget::Name(name.clone()))?,
            ),
            Condition::Look { kind, child } => {
                StateCondition::Look { kind: *kind, body: self.compile_body(child)? }
            }
        };

        let s = self.state_with_action(StateAction::Conditional(condition))?;
        let end = self.new_state()?;

        let yes = self.compile_child(&cond.yes)?;
        let no = match &cond.no {
            Some(no) => self.compile_child(no)?,
            None => Fragment::single(self.new_state()?),
        };

        // The first transition is the branch taken when the condition holds.
        self.epsilon(s, yes.start)?;
        self.epsilon(s, no.start)?;
        self.epsilon(yes.end, end)?;
        self.epsilon(no.end, end)?;

        Ok(Fragment { start: s, end })
    }

    fn check_group(&self, n: usize) -> Result<usize, Error> {
        if n == 0 || n > self.tree.group_count() {
            return Err(Error::new(
                ErrorKind::Syntax,
                format!("reference to undefined group {}", n),
            ));
        }
        Ok(n)
    }

    fn resolve_group(&self, target: &BackrefTarget) -> Result<usize, Error> {
        match target {
            BackrefTarget::Number(n) => self.check_group(*n),
            BackrefTarget::Name(name) => {
                self.tree.group_index(name).ok_or_else(|| {
                    Error::new(
                        ErrorKind::Syntax,
                        format!("reference to undefined group `{}`", name),
                    )
                })
            }
        }
    }
}

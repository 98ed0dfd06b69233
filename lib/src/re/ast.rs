/*! Abstract syntax tree for patterns.

The tree is produced by the [`crate::re::parser::Parser`] and consumed by the
validator, the compiler and the bytecode emitter. It can also be built by
hand and turned into a pattern with [`crate::Pattern::from_ast`].

The tree keeps the pattern close to what was written. Flags are not applied
here: option groups like `(?i)` appear as nodes, and quantifiers remember
whether they were written with the lazy suffix, the compiler is the one that
decides what they mean under the flags in effect.
*/

use std::fmt::{Display, Formatter, Write};
use std::ops::Range;

use rustc_hash::FxHashMap;

use crate::automaton::LookKind;
use crate::errors::Error;
use crate::flags::Flags;
use crate::re::class::escape_char;
use crate::re::lexer::{CondRef, Verb};
use crate::stack::ensure_sufficient_stack;

/// Kind of character class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassKind {
    /// A bracket expression like `[a-z]`.
    Bracket,
    /// A bracket expression made of a single POSIX class, like
    /// `[[:alpha:]]`.
    Posix,
    /// `\d`, `\w`, `\s` and their negations.
    Perl,
    /// `\p{...}` and `\P{...}`.
    Property,
}

/// A character class, together with its spec as written in the pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Class {
    /// Kind of class.
    pub kind: ClassKind,
    /// Class spec, like `[a-z]` or `\d`.
    pub spec: String,
}

/// Inline options like `(?i-s)`. Letters are kept as written, the validator
/// rejects unknown ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct OptionSet {
    /// Letters enabled.
    pub on: String,
    /// Letters disabled.
    pub off: String,
}

impl OptionSet {
    /// Returns the flags enabled and disabled, or the first unknown letter.
    pub fn flags(&self) -> Result<(Flags, Flags), char> {
        Ok((Flags::from_modifiers(&self.on)?, Flags::from_modifiers(&self.off)?))
    }

    /// Applies the options to `flags`. Unknown letters are ignored.
    pub fn apply(&self, flags: Flags) -> Flags {
        let (on, off) = self.flags().unwrap_or_default();
        (flags | on) - off
    }
}

/// Kind of group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKind {
    /// Capturing group, numbered from 1 in order of opening parenthesis.
    Capturing {
        /// Group number.
        index: usize,
        /// Name, for named groups.
        name: Option<String>,
    },
    /// `(?:...)`
    NonCapturing,
    /// `(?i:...)`, options that only apply inside the group.
    Scoped(OptionSet),
}

/// A group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Group {
    /// Kind of group.
    pub kind: GroupKind,
    /// Content of the group.
    pub child: Box<Ast>,
}

/// What a backreference refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BackrefTarget {
    /// `\1`
    Number(usize),
    /// `\k<name>`, `(?P=name)`
    Name(String),
}

/// Counted or unbounded repetition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Repeat {
    /// Minimum number of repetitions.
    pub min: u32,
    /// Maximum number of repetitions, `None` for unbounded.
    pub max: Option<u32>,
    /// False if the quantifier was written with the `?` suffix.
    pub greedy: bool,
    /// True if the quantifier was written with the `+` suffix.
    pub possessive: bool,
    /// Repeated expression.
    pub child: Box<Ast>,
}

/// Anchors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Anchor {
    /// `^`, start of input or, with MULTILINE, of line.
    Caret,
    /// `$`, end of input (or before a final newline) or, with MULTILINE,
    /// of line.
    Dollar,
    /// `\A`
    StartOfInput,
    /// `\z`
    EndOfInput,
    /// `\Z`
    EndOfInputOrNewline,
}

/// Condition of a conditional group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Condition {
    /// The group matched.
    Group(CondRef),
    /// The lookaround holds.
    Look {
        /// Kind of lookaround.
        kind: LookKind,
        /// Body of the lookaround.
        child: Box<Ast>,
    },
}

/// A conditional group `(?(cond)yes|no)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Conditional {
    /// Condition.
    pub condition: Condition,
    /// Branch taken when the condition holds.
    pub yes: Box<Ast>,
    /// Branch taken otherwise, empty if missing.
    pub no: Option<Box<Ast>>,
}

/// A node in the syntax tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ast {
    /// Matches the empty string.
    Empty,
    /// A literal character.
    Literal(char),
    /// `.`
    Dot,
    /// Character class.
    Class(Class),
    /// Group.
    Group(Group),
    /// Backreference.
    Backref(BackrefTarget),
    /// Quantified expression.
    Repeat(Repeat),
    /// Anchor.
    Anchor(Anchor),
    /// `\b`, or `\B` when negated.
    WordBoundary {
        /// True for `\B`.
        negated: bool,
    },
    /// Lookaround assertion.
    Lookaround {
        /// Kind of lookaround.
        kind: LookKind,
        /// Body.
        child: Box<Ast>,
    },
    /// Atomic group `(?>...)`.
    Atomic(Box<Ast>),
    /// Inline comment `(?#...)`.
    Comment(String),
    /// Options that apply to the rest of the enclosing group, `(?i)`.
    Options(OptionSet),
    /// Conditional group.
    Conditional(Conditional),
    /// Backtracking control verb.
    Verb(Verb),
    /// Alternatives, tried from left to right.
    Alternation(Vec<Ast>),
    /// Sequence of expressions.
    Concat(Vec<Ast>),
    /// Placeholder for a piece of the pattern that couldn't be parsed. Only
    /// produced when the parser recovers from errors, it never matches.
    Invalid,
}

impl Ast {
    /// Creates a literal string as a concatenation of characters.
    pub fn literal(s: &str) -> Ast {
        let mut chars: Vec<Ast> = s.chars().map(Ast::Literal).collect();
        match chars.len() {
            0 => Ast::Empty,
            1 => chars.remove(0),
            _ => Ast::Concat(chars),
        }
    }

    /// Creates a capturing group.
    pub fn capture(index: usize, name: Option<&str>, child: Ast) -> Ast {
        Ast::Group(Group {
            kind: GroupKind::Capturing { index, name: name.map(String::from) },
            child: Box::new(child),
        })
    }

    /// Creates a non-capturing group.
    pub fn non_capturing(child: Ast) -> Ast {
        Ast::Group(Group { kind: GroupKind::NonCapturing, child: Box::new(child) })
    }

    /// Creates a repetition.
    pub fn repeat(child: Ast, min: u32, max: Option<u32>, greedy: bool) -> Ast {
        Ast::Repeat(Repeat {
            min,
            max,
            greedy,
            possessive: false,
            child: Box::new(child),
        })
    }

    /// Creates a class from its spec.
    pub fn class(spec: &str) -> Ast {
        let kind = if spec.starts_with("\\p") || spec.starts_with("\\P") {
            ClassKind::Property
        } else if spec.starts_with('\\') {
            ClassKind::Perl
        } else {
            ClassKind::Bracket
        };
        Ast::Class(Class { kind, spec: spec.to_string() })
    }

    /// True for zero-width assertions: anchors, word boundaries and
    /// lookarounds.
    pub fn is_assertion(&self) -> bool {
        matches!(
            self,
            Ast::Anchor(_) | Ast::WordBoundary { .. } | Ast::Lookaround { .. }
        )
    }

    /// Direct children of the node.
    pub fn children(&self) -> Vec<&Ast> {
        match self {
            Ast::Group(group) => vec![group.child.as_ref()],
            Ast::Repeat(repeat) => vec![repeat.child.as_ref()],
            Ast::Lookaround { child, .. } => vec![child.as_ref()],
            Ast::Atomic(child) => vec![child.as_ref()],
            Ast::Conditional(cond) => {
                let mut children = Vec::with_capacity(3);
                if let Condition::Look { child, .. } = &cond.condition {
                    children.push(child.as_ref());
                }
                children.push(cond.yes.as_ref());
                if let Some(no) = &cond.no {
                    children.push(no.as_ref());
                }
                children
            }
            Ast::Alternation(items) | Ast::Concat(items) => items.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Mutable references to the direct children of the node.
    pub fn children_mut(&mut self) -> Vec<&mut Ast> {
        match self {
            Ast::Group(group) => vec![group.child.as_mut()],
            Ast::Repeat(repeat) => vec![repeat.child.as_mut()],
            Ast::Lookaround { child, .. } => vec![child.as_mut()],
            Ast::Atomic(child) => vec![child.as_mut()],
            Ast::Conditional(cond) => {
                let mut children = Vec::with_capacity(3);
                if let Condition::Look { child, .. } = &mut cond.condition {
                    children.push(child.as_mut());
                }
                children.push(cond.yes.as_mut());
                if let Some(no) = &mut cond.no {
                    children.push(no.as_mut());
                }
                children
            }
            Ast::Alternation(items) | Ast::Concat(items) => {
                items.iter_mut().collect()
            }
            _ => Vec::new(),
        }
    }

    /// True if the node opens a new nesting level: groups, repetitions,
    /// lookarounds, atomic groups and conditionals.
    pub fn is_nesting(&self) -> bool {
        matches!(
            self,
            Ast::Group(_)
                | Ast::Repeat(_)
                | Ast::Lookaround { .. }
                | Ast::Atomic(_)
                | Ast::Conditional(_)
        )
    }

    /// Maximum number of nested groups, repetitions and lookarounds.
    pub fn nesting_depth(&self) -> usize {
        let mut depth = 0;
        let mut max = 0;
        for event in self.dfs() {
            match event {
                Event::Enter(node) if node.is_nesting() => {
                    depth += 1;
                    max = max.max(depth);
                }
                Event::Leave(node) if node.is_nesting() => depth -= 1,
                _ => {}
            }
        }
        max
    }

    /// Returns a depth first traversal of the tree rooted at this node.
    pub fn dfs(&self) -> DepthFirstSearch<'_> {
        DepthFirstSearch::new(self)
    }

    /// Numbers capturing groups from 1 in the order in which they are
    /// entered, and updates numeric backreferences and conditions so that
    /// they keep referring to the same groups. References to groups that
    /// don't exist in the tree are left untouched.
    pub fn renumber_groups(&mut self) {
        let mut remap: FxHashMap<usize, usize> = FxHashMap::default();
        let mut next = 1;
        self.visit_mut(&mut |node| {
            if let Ast::Group(Group {
                kind: GroupKind::Capturing { index, .. }, ..
            }) = node
            {
                remap.entry(*index).or_insert(next);
                *index = next;
                next += 1;
            }
        });
        self.visit_mut(&mut |node| match node {
            Ast::Backref(BackrefTarget::Number(n)) => {
                if let Some(new) = remap.get(&*n) {
                    *n = *new;
                }
            }
            Ast::Conditional(Conditional {
                condition: Condition::Group(CondRef::Number(n)),
                ..
            }) => {
                if let Some(new) = remap.get(&*n) {
                    *n = *new;
                }
            }
            _ => {}
        });
    }

    /// Calls `f` for every node, parents before children.
    pub fn visit_mut<F: FnMut(&mut Ast)>(&mut self, f: &mut F) {
        f(self);
        ensure_sufficient_stack(|| {
            for child in self.children_mut() {
                child.visit_mut(f);
            }
        })
    }

    fn needs_group_for_repeat(&self) -> bool {
        match self {
            Ast::Literal(_)
            | Ast::Dot
            | Ast::Class(_)
            | Ast::Group(_)
            | Ast::Backref(_)
            | Ast::Lookaround { .. }
            | Ast::Atomic(_)
            | Ast::Conditional(_) => false,
            _ => true,
        }
    }
}

/// Events produced by [`DepthFirstSearch`].
#[derive(Debug)]
pub enum Event<'a> {
    /// Entering a node, before its children.
    Enter(&'a Ast),
    /// Leaving a node, after its children.
    Leave(&'a Ast),
}

enum StackEvent<'a> {
    Enter(&'a Ast),
    Leave(&'a Ast),
}

/// An iterator that conducts a depth first traversal of the tree.
///
/// It yields [`Event::Enter`] when entering a node and [`Event::Leave`]
/// when leaving it, so for `a(b|c)` the events are: enter concat, enter
/// `a`, leave `a`, enter group, enter alternation, enter `b`, leave `b`,
/// enter `c`, leave `c`, leave alternation, leave group, leave concat.
pub struct DepthFirstSearch<'a> {
    stack: Vec<StackEvent<'a>>,
}

impl<'a> DepthFirstSearch<'a> {
    /// Creates a traversal that starts at `root`.
    pub fn new(root: &'a Ast) -> Self {
        Self { stack: vec![StackEvent::Enter(root)] }
    }
}

impl<'a> Iterator for DepthFirstSearch<'a> {
    type Item = Event<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.stack.pop()? {
            StackEvent::Enter(node) => {
                self.stack.push(StackEvent::Leave(node));
                for child in node.children().into_iter().rev() {
                    self.stack.push(StackEvent::Enter(child));
                }
                Some(Event::Enter(node))
            }
            StackEvent::Leave(node) => Some(Event::Leave(node)),
        }
    }
}

fn write_quantifier(f: &mut Formatter<'_>, repeat: &Repeat) -> std::fmt::Result {
    match (repeat.min, repeat.max) {
        (0, None) => f.write_char('*')?,
        (1, None) => f.write_char('+')?,
        (0, Some(1)) => f.write_char('?')?,
        (min, None) => write!(f, "{{{},}}", min)?,
        (min, Some(max)) if min == max => write!(f, "{{{}}}", min)?,
        (min, Some(max)) => write!(f, "{{{},{}}}", min, max)?,
    }
    if !repeat.greedy {
        f.write_char('?')?;
    }
    if repeat.possessive {
        f.write_char('+')?;
    }
    Ok(())
}

fn write_look_prefix(f: &mut Formatter<'_>, kind: LookKind) -> std::fmt::Result {
    f.write_str(match kind {
        LookKind::Ahead => "(?=",
        LookKind::NegativeAhead => "(?!",
        LookKind::Behind => "(?<=",
        LookKind::NegativeBehind => "(?<!",
    })
}

fn write_options(f: &mut Formatter<'_>, options: &OptionSet) -> std::fmt::Result {
    f.write_str(&options.on)?;
    if !options.off.is_empty() {
        write!(f, "-{}", options.off)?;
    }
    Ok(())
}

/// Writes the node back as pattern text. Parsing the text produces an
/// equivalent tree.
impl Display for Ast {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        ensure_sufficient_stack(|| match self {
            Ast::Empty => Ok(()),
            Ast::Literal(c) => {
                let mut s = String::new();
                escape_char(*c, &mut s);
                f.write_str(&s)
            }
            Ast::Dot => f.write_char('.'),
            Ast::Class(class) => f.write_str(&class.spec),
            Ast::Group(group) => {
                match &group.kind {
                    GroupKind::Capturing { name: None, .. } => f.write_char('(')?,
                    GroupKind::Capturing { name: Some(name), .. } => {
                        write!(f, "(?P<{}>", name)?
                    }
                    GroupKind::NonCapturing => f.write_str("(?:")?,
                    GroupKind::Scoped(options) => {
                        f.write_str("(?")?;
                        write_options(f, options)?;
                        f.write_char(':')?;
                    }
                }
                write!(f, "{})", group.child)
            }
            Ast::Backref(BackrefTarget::Number(n)) => write!(f, "\\{}", n),
            Ast::Backref(BackrefTarget::Name(name)) => write!(f, "\\k<{}>", name),
            Ast::Repeat(repeat) => {
                if repeat.child.needs_group_for_repeat() {
                    write!(f, "(?:{})", repeat.child)?;
                } else {
                    write!(f, "{}", repeat.child)?;
                }
                write_quantifier(f, repeat)
            }
            Ast::Anchor(anchor) => f.write_str(match anchor {
                Anchor::Caret => "^",
                Anchor::Dollar => "$",
                Anchor::StartOfInput => "\\A",
                Anchor::EndOfInput => "\\z",
                Anchor::EndOfInputOrNewline => "\\Z",
            }),
            Ast::WordBoundary { negated: false } => f.write_str("\\b"),
            Ast::WordBoundary { negated: true } => f.write_str("\\B"),
            Ast::Lookaround { kind, child } => {
                write_look_prefix(f, *kind)?;
                write!(f, "{})", child)
            }
            Ast::Atomic(child) => write!(f, "(?>{})", child),
            Ast::Comment(text) => write!(f, "(?#{})", text),
            Ast::Options(options) => {
                f.write_str("(?")?;
                write_options(f, options)?;
                f.write_char(')')
            }
            Ast::Conditional(cond) => {
                f.write_str("(?")?;
                match &cond.condition {
                    Condition::Group(CondRef::Number(n)) => write!(f, "({})", n)?,
                    Condition::Group(CondRef::Name(name)) => {
                        write!(f, "(<{}>)", name)?
                    }
                    Condition::Look { kind, child } => {
                        write_look_prefix(f, *kind)?;
                        write!(f, "{})", child)?;
                    }
                }
                write!(f, "{}", cond.yes)?;
                if let Some(no) = &cond.no {
                    write!(f, "|{}", no)?;
                }
                f.write_char(')')
            }
            Ast::Verb(verb) => write!(f, "(*{})", verb.name()),
            Ast::Alternation(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_char('|')?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            Ast::Concat(items) => {
                for (i, item) in items.iter().enumerate() {
                    let next_is_digit = matches!(
                        items.get(i + 1),
                        Some(Ast::Literal(c)) if c.is_ascii_digit()
                    );
                    match item {
                        Ast::Alternation(_) => write!(f, "(?:{})", item)?,
                        Ast::Backref(BackrefTarget::Number(_)) if next_is_digit => {
                            write!(f, "(?:{})", item)?
                        }
                        _ => write!(f, "{}", item)?,
                    }
                }
                Ok(())
            }
            Ast::Invalid => f.write_str("(*FAIL)"),
        })
    }
}

/// The result of parsing a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxTree {
    root: Ast,
    flags: Flags,
    raw: bool,
    groups: Vec<Option<String>>,
    alternatives: Vec<Range<usize>>,
    recovered: Vec<Error>,
}

impl SyntaxTree {
    /// Creates a tree from its root node and the flags in effect.
    ///
    /// Capturing groups are renumbered in order of appearance.
    pub fn new(mut root: Ast, flags: Flags) -> Self {
        root.renumber_groups();
        let groups = collect_groups(&root);
        Self {
            root,
            flags,
            raw: false,
            groups,
            alternatives: Vec::new(),
            recovered: Vec::new(),
        }
    }

    pub(crate) fn with_source_info(
        mut self,
        raw: bool,
        alternatives: Vec<Range<usize>>,
        recovered: Vec<Error>,
    ) -> Self {
        self.raw = raw;
        self.alternatives = alternatives;
        self.recovered = recovered;
        self
    }

    /// Root node.
    #[inline]
    pub fn root(&self) -> &Ast {
        &self.root
    }

    /// Consumes the tree and returns the root node.
    pub fn into_root(self) -> Ast {
        self.root
    }

    /// Flags in effect for the whole pattern, including the modifiers of a
    /// raw literal.
    #[inline]
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// True if the pattern was written as a raw literal.
    #[inline]
    pub fn is_raw(&self) -> bool {
        self.raw
    }

    /// Number of capturing groups.
    #[inline]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Names of the capturing groups. The name of group `n` is at index
    /// `n - 1`.
    #[inline]
    pub fn group_names(&self) -> &[Option<String>] {
        self.groups.as_slice()
    }

    /// Number of the group with the given name.
    pub fn group_index(&self, name: &str) -> Option<usize> {
        self.groups
            .iter()
            .position(|n| n.as_deref() == Some(name))
            .map(|i| i + 1)
    }

    /// Byte ranges in the source of the top-level alternatives. Empty if
    /// the pattern has no top-level alternation or wasn't parsed from text.
    #[inline]
    pub fn alternatives(&self) -> &[Range<usize>] {
        self.alternatives.as_slice()
    }

    /// Errors the parser recovered from, when ERROR_RECOVERY is set.
    #[inline]
    pub fn recovered_errors(&self) -> &[Error] {
        self.recovered.as_slice()
    }
}

fn collect_groups(root: &Ast) -> Vec<Option<String>> {
    let mut groups = Vec::new();
    for event in root.dfs() {
        if let Event::Enter(Ast::Group(Group {
            kind: GroupKind::Capturing { name, .. },
            ..
        })) = event
        {
            groups.push(name.clone());
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{Ast, BackrefTarget, Event, SyntaxTree};
    use crate::flags::Flags;

    #[test]
    fn display() {
        let ast = Ast::Concat(vec![
            Ast::Literal('a'),
            Ast::repeat(
                Ast::capture(1, None, Ast::Alternation(vec![
                    Ast::Literal('b'),
                    Ast::Literal('c'),
                ])),
                0,
                None,
                true,
            ),
            Ast::Literal('d'),
        ]);
        assert_eq!(ast.to_string(), "a(b|c)*d");

        let ast = Ast::repeat(Ast::literal("ab"), 2, Some(3), false);
        assert_eq!(ast.to_string(), "(?:ab){2,3}?");

        let ast = Ast::Concat(vec![
            Ast::capture(1, Some("x"), Ast::Dot),
            Ast::Backref(BackrefTarget::Number(1)),
            Ast::Literal('0'),
            Ast::Literal('.'),
        ]);
        assert_eq!(ast.to_string(), "(?P<x>.)(?:\\1)0\\.");
    }

    #[test]
    fn renumbering() {
        let mut ast = Ast::Concat(vec![
            Ast::capture(7, None, Ast::Literal('a')),
            Ast::capture(3, Some("n"), Ast::Literal('b')),
            Ast::Backref(BackrefTarget::Number(7)),
            Ast::Backref(BackrefTarget::Number(9)),
        ]);
        ast.renumber_groups();
        assert_eq!(ast.to_string(), "(a)(?P<n>b)\\1\\9");

        let tree = SyntaxTree::new(ast, Flags::empty());
        assert_eq!(tree.group_count(), 2);
        assert_eq!(tree.group_index("n"), Some(2));
        assert_eq!(tree.group_names(), &[None, Some("n".to_string())]);
    }

    #[test]
    fn traversal() {
        let ast = Ast::Concat(vec![
            Ast::Literal('a'),
            Ast::non_capturing(Ast::Alternation(vec![
                Ast::Literal('b'),
                Ast::Literal('c'),
            ])),
        ]);
        let entered: Vec<String> = ast
            .dfs()
            .filter_map(|e| match e {
                Event::Enter(node) => Some(node.to_string()),
                Event::Leave(_) => None,
            })
            .collect();
        assert_eq!(entered, vec!["a(?:b|c)", "a", "(?:b|c)", "b|c", "b", "c"]);
        assert_eq!(ast.nesting_depth(), 1);

        let nested = Ast::repeat(
            Ast::capture(1, None, Ast::repeat(Ast::Dot, 1, None, true)),
            0,
            None,
            true,
        );
        assert_eq!(nested.nesting_depth(), 3);
    }
}

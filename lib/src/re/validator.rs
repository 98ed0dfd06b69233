use rustc_hash::FxHashSet;

use crate::errors::{Error, ErrorKind};
use crate::flags::Flags;
use crate::re::ast::{
    Ast, BackrefTarget, Condition, Event, Group, GroupKind, SyntaxTree,
};
use crate::re::class::ClassSet;
use crate::re::lexer::CondRef;
use crate::re::parser::DEFAULT_MAX_DEPTH;

/// Checks the semantic rules that the parser doesn't enforce.
///
/// The validator rejects:
///
/// * backreferences and conditions that refer to groups that don't exist,
/// * quantified assertions, like `\b*` or `(?=a)+`,
/// * group names that are empty, start with a digit, contain characters
///   other than letters, digits and `_`, or appear twice,
/// * unknown letters in option groups,
/// * malformed character classes (including unknown POSIX class names),
/// * trees nested deeper than the configured maximum.
pub struct Validator {
    max_depth: usize,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    /// Creates a validator with the default depth limit.
    pub fn new() -> Self {
        Self { max_depth: DEFAULT_MAX_DEPTH }
    }

    /// Maximum nesting depth of groups, repetitions and lookarounds.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Validates the tree. The tree's STRICT flag makes the validation of
    /// character classes stricter.
    pub fn validate(&self, tree: &SyntaxTree) -> Result<(), Error> {
        let strict = tree.flags().contains(Flags::STRICT);
        let group_count = tree.group_count();

        let depth = tree.root().nesting_depth();
        if depth > self.max_depth {
            return Err(Error::limit_exceeded(format!(
                "pattern nested {} levels deep, the maximum is {}",
                depth, self.max_depth
            )));
        }

        let mut names = FxHashSet::default();
        let mut max_group = 0;

        for event in tree.root().dfs() {
            let node = match event {
                Event::Enter(node) => node,
                Event::Leave(_) => continue,
            };
            match node {
                Ast::Group(Group {
                    kind: GroupKind::Capturing { index, name }, ..
                }) => {
                    max_group = max_group.max(*index);
                    if let Some(name) = name {
                        check_group_name(name)?;
                        if !names.insert(name.as_str()) {
                            return Err(Error::new(
                                ErrorKind::Syntax,
                                format!("duplicate group name `{}`", name),
                            ));
                        }
                    }
                }
                Ast::Group(Group { kind: GroupKind::Scoped(options), .. })
                | Ast::Options(options) => {
                    if let Err(c) = options.flags() {
                        return Err(Error::new(
                            ErrorKind::Syntax,
                            format!("unknown option flag `{}`", c),
                        ));
                    }
                }
                Ast::Backref(BackrefTarget::Number(n)) => {
                    if *n == 0 || *n > group_count {
                        return Err(Error::new(
                            ErrorKind::Syntax,
                            format!(
                                "invalid backreference \\{}, the pattern has {} groups",
                                n, group_count
                            ),
                        ));
                    }
                }
                Ast::Backref(BackrefTarget::Name(name)) => {
                    if tree.group_index(name).is_none() {
                        return Err(Error::new(
                            ErrorKind::Syntax,
                            format!("backreference to undefined group `{}`", name),
                        ));
                    }
                }
                Ast::Conditional(cond) => match &cond.condition {
                    Condition::Group(CondRef::Number(n))
                        if *n == 0 || *n > group_count =>
                    {
                        return Err(Error::new(
                            ErrorKind::Syntax,
                            format!("condition refers to undefined group {}", n),
                        ));
                    }
                    Condition::Group(CondRef::Name(name))
                        if tree.group_index(name).is_none() =>
                    {
                        return Err(Error::new(
                            ErrorKind::Syntax,
                            format!("condition refers to undefined group `{}`", name),
                        ));
                    }
                    _ => {}
                },
                Ast::Repeat(repeat) => {
                    if quantifies_assertion(&repeat.child) {
                        return Err(Error::new(
                            ErrorKind::Syntax,
                            "quantifier applied to an assertion",
                        ));
                    }
                    if let Some(max) = repeat.max {
                        if max < repeat.min {
                            return Err(Error::new(
                                ErrorKind::Syntax,
                                "numbers out of order in repetition",
                            ));
                        }
                    }
                }
                Ast::Class(class) => {
                    let result = if strict {
                        ClassSet::parse_strict(&class.spec)
                    } else {
                        ClassSet::parse(&class.spec)
                    };
                    result?;
                }
                _ => {}
            }
        }

        debug_assert!(max_group <= group_count);

        Ok(())
    }
}

/// True if `node` is an assertion, possibly wrapped in non-capturing
/// groups.
fn quantifies_assertion(mut node: &Ast) -> bool {
    while let Ast::Group(Group { kind: GroupKind::NonCapturing, child }) = node {
        node = &**child;
    }
    node.is_assertion()
}

fn check_group_name(name: &str) -> Result<(), Error> {
    let invalid = |reason: &str| {
        Err(Error::new(
            ErrorKind::Syntax,
            format!("invalid group name `{}`: {}", name, reason),
        ))
    };
    match name.chars().next() {
        None => return invalid("empty name"),
        Some(c) if c.is_ascii_digit() => {
            return invalid("names can't start with a digit")
        }
        _ => {}
    }
    if !name.chars().all(|c| c == '_' || c.is_alphanumeric()) {
        return invalid("only letters, digits and `_` are allowed");
    }
    Ok(())
}

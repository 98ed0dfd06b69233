/*! Canonical patterns for common lexical elements.

The baseline patterns are compiled once, the first time one of them is
needed, and kept in a process-wide registry. They can be combined with
each other, or extended with user-provided suffixes, to build the patterns
of a tokenizer:

```
# use rift::baseline::{self, BaselineKind};
# use rift::{Flags, MatcherContext};
let token = baseline::combine(
    &[BaselineKind::Identifier, BaselineKind::Numeric],
    Flags::empty(),
).unwrap();

let mut ctx = MatcherContext::with_input("x1 = 42");
let tokens: Vec<&str> = ctx
    .find_all(&token, 0)
    .unwrap()
    .iter()
    .map(|m| m.as_str("x1 = 42"))
    .collect();

assert_eq!(tokens, vec!["x1", "42"]);
```
*/

use std::fmt::{Display, Formatter};
use std::sync::{Arc, RwLock};

use itertools::Itertools;
use lazy_static::lazy_static;
use log::debug;

use crate::errors::Error;
use crate::flags::Flags;
use crate::pattern::Pattern;


/// Kinds of baseline patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaselineKind {
    /// Matches the empty string.
    EmptyState,
    /// One or more whitespace characters.
    Whitespace,
    /// A word boundary.
    WordBoundary,
    /// A C-like identifier.
    Identifier,
    /// Integer, decimal and scientific notation numbers, with an optional
    /// sign.
    Numeric,
    /// A single or double quoted string with backslash escapes.
    String,
    /// `//` and `#` line comments, and `/* */` block comments.
    Comment,
    /// Arithmetic, comparison, logical and bitwise operators.
    Operator,
    /// A function call or declaration head, `name(args)`. The name is
    /// captured.
    Function,
    /// A state transition, `from -> to`. Both states are captured.
    StateTransition,
}

impl BaselineKind {
    /// All the kinds, in registry order.
    pub const ALL: [BaselineKind; 10] = [
        BaselineKind::EmptyState,
        BaselineKind::Whitespace,
        BaselineKind::WordBoundary,
        BaselineKind::Identifier,
        BaselineKind::Numeric,
        BaselineKind::String,
        BaselineKind::Comment,
        BaselineKind::Operator,
        BaselineKind::Function,
        BaselineKind::StateTransition,
    ];

    /// Source of the pattern.
    pub fn source(self) -> &'static str {
        match self {
            BaselineKind::EmptyState => "",
            BaselineKind::Whitespace => r"\s+",
            BaselineKind::WordBoundary => r"\b",
            BaselineKind::Identifier => r"[a-zA-Z_][a-zA-Z0-9_]*",
            BaselineKind::Numeric => {
                r"[-+]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][-+]?\d+)?"
            }
            BaselineKind::String => r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'"#,
            BaselineKind::Comment => r"//[^\n]*|#[^\n]*|/\*(?:[^*]|\*+[^*/])*\*+/",
            BaselineKind::Operator => {
                r"==|!=|<=|>=|&&|\|\||<<|>>|->|\+\+|--|[-+*/%=<>!&|^~]"
            }
            BaselineKind::Function => r"([a-zA-Z_][a-zA-Z0-9_]*)\s*\([^()]*\)",
            BaselineKind::StateTransition => {
                r"([a-zA-Z_][a-zA-Z0-9_]*)\s*->\s*([a-zA-Z_][a-zA-Z0-9_]*)"
            }
        }
    }

    /// Name of the kind, as used in listings.
    pub fn name(self) -> &'static str {
        match self {
            BaselineKind::EmptyState => "EMPTY_STATE",
            BaselineKind::Whitespace => "WHITESPACE",
            BaselineKind::WordBoundary => "WORD_BOUNDARY",
            BaselineKind::Identifier => "IDENTIFIER",
            BaselineKind::Numeric => "NUMERIC",
            BaselineKind::String => "STRING",
            BaselineKind::Comment => "COMMENT",
            BaselineKind::Operator => "OPERATOR",
            BaselineKind::Function => "FUNCTION",
            BaselineKind::StateTransition => "STATE_TRANSITION",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl Display for BaselineKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u32> for BaselineKind {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        BaselineKind::ALL.get(value as usize).copied().ok_or_else(|| {
            Error::invalid_parameter(format!("unknown baseline pattern {}", value))
        })
    }
}

lazy_static! {
    static ref REGISTRY: RwLock<Option<Vec<Arc<Pattern>>>> = RwLock::new(None);
}

fn poisoned<T>(_: T) -> Error {
    Error::internal("baseline pattern registry is poisoned")
}

/// Compiles the baseline patterns, if they are not compiled yet.
pub fn initialize() -> Result<(), Error> {
    let mut registry = REGISTRY.write().map_err(poisoned)?;
    if registry.is_some() {
        return Ok(());
    }
    let patterns = BaselineKind::ALL
        .iter()
        .map(|kind| Pattern::new(kind.source(), Flags::empty()).map(Arc::new))
        .collect::<Result<Vec<_>, Error>>()?;
    debug!("compiled {} baseline patterns", patterns.len());
    *registry = Some(patterns);
    Ok(())
}

/// Releases the baseline patterns. Patterns returned by [`get`] remain
/// valid, they are dropped when their last reference goes away.
pub fn cleanup() -> Result<(), Error> {
    REGISTRY.write().map_err(poisoned)?.take();
    Ok(())
}

/// True if the baseline patterns are compiled.
pub fn is_initialized() -> bool {
    REGISTRY.read().is_ok_and(|registry| registry.is_some())
}

/// Returns a baseline pattern, compiling them all if needed.
pub fn get(kind: BaselineKind) -> Result<Arc<Pattern>, Error> {
    if let Some(patterns) = REGISTRY.read().map_err(poisoned)?.as_ref() {
        if let Some(pattern) = patterns.get(kind.index()) {
            return Ok(Arc::clone(pattern));
        }
    }
    initialize()?;
    REGISTRY
        .read()
        .map_err(poisoned)?
        .as_ref()
        .and_then(|patterns| patterns.get(kind.index()))
        .cloned()
        .ok_or_else(|| Error::internal(format!("baseline pattern {} missing", kind)))
}

/// Builds a pattern that matches any of the given baseline patterns,
/// trying them in order.
pub fn combine(kinds: &[BaselineKind], flags: Flags) -> Result<Pattern, Error> {
    if kinds.is_empty() {
        return Err(Error::invalid_parameter("no baseline patterns to combine"));
    }
    let source = kinds.iter().map(|kind| format!("(?:{})", kind.source())).join("|");
    Pattern::new(&source, flags)
}

/// Builds a pattern that matches the given baseline patterns one after
/// another.
pub fn sequence(kinds: &[BaselineKind], flags: Flags) -> Result<Pattern, Error> {
    if kinds.is_empty() {
        return Err(Error::invalid_parameter("no baseline patterns to sequence"));
    }
    let source = kinds.iter().map(|kind| format!("(?:{})", kind.source())).join("");
    Pattern::new(&source, flags)
}

/// Builds a pattern that matches a baseline pattern followed by
/// `extension`.
pub fn extend(kind: BaselineKind, extension: &str, flags: Flags) -> Result<Pattern, Error> {
    let source = format!("(?:{})(?:{})", kind.source(), extension);
    Pattern::new(&source, flags)
}

/*! Compiled patterns.

A [`Pattern`] bundles everything produced while compiling a regular
expression: the source, the flags, the syntax tree and the automaton that
the matchers execute. Patterns are immutable once compiled, so they can be
shared between threads.
*/

use std::fmt::{Display, Formatter};
use std::io::{BufWriter, Read, Write};

use bincode::Options;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::automaton::Automaton;
use crate::compiler::{content_hash, Compiler, Fingerprint};
use crate::config::EngineConfig;
use crate::errors::{Error, ErrorKind};
use crate::flags::Flags;
use crate::re::ast::{Ast, SyntaxTree};
use crate::re::lexer::is_raw_literal;
use crate::re::parser::Parser;
use crate::re::validator::Validator;


/// Header of serialized patterns.
const MAGIC: &[u8; 8] = b"RIFTPAT\0";

/// A compiled pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: Option<String>,
    flags: Flags,
    tree: Option<SyntaxTree>,
    automaton: Automaton,
    group_names: Vec<Option<String>>,
    raw: bool,
    id: u64,
    last_error: Option<Error>,
}

/// Serialized form of a [`Pattern`].
#[derive(Serialize, Deserialize)]
struct SerializedPattern {
    source: Option<String>,
    flags: Flags,
    automaton: Automaton,
    group_names: Vec<Option<String>>,
    raw: bool,
}

impl Pattern {
    /// Compiles `source` with the default configuration.
    ///
    /// ```
    /// # use rift::{Flags, Pattern};
    /// let pattern = Pattern::new("a(b|c)*d", Flags::empty()).unwrap();
    /// assert_eq!(pattern.group_count(), 1);
    /// ```
    pub fn new(source: &str, flags: Flags) -> Result<Pattern, Error> {
        Self::with_config(source, flags, &EngineConfig::default())
    }

    /// Compiles `source` with the given configuration.
    pub fn with_config(
        source: &str,
        flags: Flags,
        config: &EngineConfig,
    ) -> Result<Pattern, Error> {
        if source.len() > config.max_pattern_length {
            return Err(Error::limit_exceeded(format!(
                "pattern is {} bytes long, the maximum is {}",
                source.len(),
                config.max_pattern_length
            )));
        }

        if !config.enable_rift_syntax && is_raw_literal(source) {
            return Err(Error::new(
                ErrorKind::UnsupportedFeature,
                "raw literal patterns are disabled",
            )
            .at(0));
        }

        let tree = Parser::new()
            .flags(flags)
            .max_depth(config.max_recursion_depth)
            .parse(source)?;

        let mut pattern = Self::build(tree, config)?;
        pattern.id = content_hash(Some(source), None, &pattern.automaton, flags);
        pattern.source = Some(source.to_string());
        // The flags given by the caller, modifiers of raw literals are
        // reflected in the automaton's flags.
        pattern.flags = flags;

        Ok(pattern)
    }

    /// Creates a pattern out of a syntax tree, that can be built by hand or
    /// obtained from [`Parser`].
    ///
    /// The pattern has no source, [`Pattern::to_string`] shows the tree
    /// written back as pattern text.
    pub fn from_ast(tree: SyntaxTree) -> Result<Pattern, Error> {
        Self::build(tree, &EngineConfig::default())
    }

    /// Creates a pattern that executes the given automaton.
    ///
    /// The number of capture groups and their names are taken from the
    /// group markers of the automaton's states.
    pub fn from_automaton(automaton: Automaton) -> Result<Pattern, Error> {
        automaton.check_integrity()?;
        if automaton.initial().is_none() {
            return Err(Error::new(
                ErrorKind::InvalidAutomaton,
                "automaton without initial state",
            ));
        }

        let mut group_names = vec![None; automaton.group_count()];
        for state in automaton.states() {
            if let (Some(index), Some(name)) =
                (state.group_index(), state.group_name())
            {
                group_names[index - 1] = Some(name.to_string());
            }
        }

        let flags = automaton.flags();
        let id = content_hash(None, None, &automaton, flags);

        Ok(Pattern {
            source: None,
            flags,
            tree: None,
            automaton,
            group_names,
            raw: false,
            id,
            last_error: None,
        })
    }

    /// Validates and compiles a tree.
    fn build(tree: SyntaxTree, config: &EngineConfig) -> Result<Pattern, Error> {
        Validator::new().max_depth(config.max_recursion_depth).validate(&tree)?;

        if tree.group_count() > config.max_capture_groups {
            return Err(Error::limit_exceeded(format!(
                "pattern has {} capture groups, the maximum is {}",
                tree.group_count(),
                config.max_capture_groups
            )));
        }

        let flags = tree.flags();
        let mut automaton =
            Compiler::new().max_states(config.max_states).compile(&tree)?;

        if flags.contains(Flags::USE_DFA) {
            if tree.group_count() > 0 {
                return Err(Error::unsupported_operation(
                    "patterns with capture groups can't be converted into a DFA",
                ));
            }
            automaton = automaton.to_dfa_with_limit(config.max_states)?.minimize()?;
            debug!("DFA with {} states", automaton.state_count());
        } else if config.use_dfa_when_possible && tree.group_count() == 0 {
            match automaton.to_dfa_with_limit(config.max_states) {
                Ok(dfa) => {
                    automaton = dfa.minimize()?;
                    debug!("DFA with {} states", automaton.state_count());
                }
                Err(err) => debug!("keeping the NFA: {}", err),
            }
        }

        if flags.contains(Flags::OPTIMIZE) || config.optimize_automaton {
            let before = automaton.state_count();
            automaton.optimize()?;
            debug!(
                "optimization reduced states from {} to {}",
                before,
                automaton.state_count()
            );
        }

        automaton.set_flags(flags);

        let last_error = tree.recovered_errors().first().cloned();
        let id = content_hash(None, Some(tree.root()), &automaton, flags);

        Ok(Pattern {
            source: None,
            flags,
            group_names: tree.group_names().to_vec(),
            raw: tree.is_raw(),
            automaton,
            tree: Some(tree),
            id,
            last_error,
        })
    }

    /// Source of the pattern, if it was compiled from text.
    #[inline]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Flags the pattern was compiled with.
    #[inline]
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Flags in effect, including the modifiers of a raw literal.
    #[inline]
    pub fn effective_flags(&self) -> Flags {
        self.automaton.flags()
    }

    /// Syntax tree, if the pattern was compiled from text or from a tree.
    #[inline]
    pub fn ast(&self) -> Option<&SyntaxTree> {
        self.tree.as_ref()
    }

    /// The compiled automaton.
    #[inline]
    pub fn automaton(&self) -> &Automaton {
        &self.automaton
    }

    /// Number of capture groups.
    #[inline]
    pub fn group_count(&self) -> usize {
        self.group_names.len()
    }

    /// Names of the capture groups. The name of group `n` is at index
    /// `n - 1`.
    #[inline]
    pub fn group_names(&self) -> &[Option<String>] {
        self.group_names.as_slice()
    }

    /// Number of the group with the given name.
    pub fn group_index(&self, name: &str) -> Option<usize> {
        self.group_names
            .iter()
            .position(|n| n.as_deref() == Some(name))
            .map(|i| i + 1)
    }

    /// True if the pattern was written as a raw literal.
    #[inline]
    pub fn is_raw(&self) -> bool {
        self.raw
    }

    /// False if the parser had to recover from syntax errors, see
    /// [`Flags::ERROR_RECOVERY`]. The parts of the pattern that couldn't be
    /// parsed never match.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.last_error.is_none()
    }

    /// First error the parser recovered from.
    #[inline]
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// Identifier of the pattern, derived from its source and flags. Used
    /// as key for pattern-specific limits.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Computes the pattern's fingerprint.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::compute(
            self.source.as_deref(),
            self.tree.as_ref().map(|t| t.root()),
            &self.automaton,
            self.flags,
            self.group_count(),
            self.raw,
        )
    }

    /// Splits the pattern at its top-level alternatives, returning one
    /// pattern per alternative. A pattern without top-level alternation
    /// produces a copy of itself.
    ///
    /// Each alternative is compiled on its own, so alternatives that refer
    /// to groups in other alternatives fail to compile.
    pub fn split_alternation(&self) -> Result<Vec<Pattern>, Error> {
        let Some(tree) = &self.tree else {
            return Ok(vec![self.clone()]);
        };

        let flags = tree.flags() - Flags::RIFT_SYNTAX;

        if let (Some(source), false) = (&self.source, tree.alternatives().is_empty()) {
            return tree
                .alternatives()
                .iter()
                .map(|span| Pattern::new(&source[span.clone()], flags))
                .collect();
        }

        match tree.root() {
            Ast::Alternation(branches) => branches
                .iter()
                .map(|branch| {
                    Pattern::from_ast(SyntaxTree::new(branch.clone(), flags))
                })
                .collect(),
            _ => Ok(vec![self.clone()]),
        }
    }

    /// Serializes the pattern as a sequence of bytes.
    ///
    /// The pattern can be restored by passing the bytes to
    /// [`Pattern::deserialize`].
    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        let mut bytes = Vec::new();
        self.serialize_into(&mut bytes)?;
        Ok(bytes)
    }

    /// Serializes the pattern into a `writer`.
    pub fn serialize_into<W: Write>(&self, writer: W) -> Result<(), Error> {
        let mut writer = BufWriter::new(writer);
        writer.write_all(MAGIC)?;

        let serialized = SerializedPattern {
            source: self.source.clone(),
            flags: self.flags,
            automaton: self.automaton.clone(),
            group_names: self.group_names.clone(),
            raw: self.raw,
        };

        bincode::DefaultOptions::new()
            .with_varint_encoding()
            .serialize_into(&mut writer, &serialized)?;

        writer.flush()?;
        Ok(())
    }

    /// Deserializes a pattern from bytes produced by [`Pattern::serialize`].
    pub fn deserialize<B: AsRef<[u8]>>(bytes: B) -> Result<Pattern, Error> {
        let bytes = bytes.as_ref();

        if bytes.len() < MAGIC.len() || &bytes[..MAGIC.len()] != MAGIC {
            return Err(Error::new(
                ErrorKind::ConversionFailed,
                "not a serialized pattern",
            ));
        }

        let serialized: SerializedPattern = bincode::DefaultOptions::new()
            .with_varint_encoding()
            .deserialize(&bytes[MAGIC.len()..])?;

        let mut automaton = serialized.automaton;
        automaton.rebuild()?;

        // The tree is not serialized, it's rebuilt from the source.
        let tree = match &serialized.source {
            Some(source) => Some(
                Parser::new()
                    .flags(serialized.flags | Flags::RIFT_SYNTAX)
                    .parse(source)?,
            ),
            None => None,
        };

        let id = match &serialized.source {
            Some(source) => {
                content_hash(Some(source), None, &automaton, serialized.flags)
            }
            None => content_hash(None, None, &automaton, serialized.flags),
        };

        Ok(Pattern {
            source: serialized.source,
            flags: serialized.flags,
            tree,
            automaton,
            group_names: serialized.group_names,
            raw: serialized.raw,
            id,
            last_error: None,
        })
    }

    /// Deserializes a pattern from a `reader`.
    pub fn deserialize_from<R: Read>(mut reader: R) -> Result<Pattern, Error> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::deserialize(bytes)
    }
}

/// Two patterns are equal if they were compiled from the same source with
/// the same flags. Equal patterns match the same language, but patterns
/// matching the same language are not necessarily equal.
impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.flags == other.flags
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (&self.source, &self.tree) {
            (Some(source), _) => f.write_str(source)?,
            (None, Some(tree)) => write!(f, "{}", tree.root())?,
            (None, None) => write!(
                f,
                "<automaton with {} states>",
                self.automaton.state_count()
            )?,
        }
        if !self.flags.is_empty() {
            write!(f, " [{}]", self.flags)?;
        }
        Ok(())
    }
}

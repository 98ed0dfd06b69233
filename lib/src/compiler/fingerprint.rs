use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

use crate::automaton::Automaton;
use crate::flags::Flags;
use crate::re::ast::{Ast, Event};

/// Summary of a compiled pattern, used for caching decisions and for
/// scaling the matching limits of expensive patterns.
///
/// Fingerprints are deterministic: the same pattern compiled twice, or a
/// pattern and its clone, have the same fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Overall complexity score.
    pub complexity: f64,
    /// Number of states in the automaton.
    pub state_count: usize,
    /// Number of transitions in the automaton.
    pub transition_count: usize,
    /// Average number of outgoing transitions per state.
    pub branching: f64,
    /// Maximum nesting of groups, repetitions and lookarounds.
    pub max_nesting: usize,
    /// Number of alternations.
    pub alternation_count: usize,
    /// Number of quantifiers.
    pub quantifier_count: usize,
    /// Number of quantifiers inside other quantifiers.
    pub nested_quantifiers: usize,
    /// Number of capture groups.
    pub group_count: usize,
    /// Hash of the pattern's source (or of its tree when there's no
    /// source) and flags.
    pub hash: u64,
}

impl Fingerprint {
    /// Computes the fingerprint of a pattern.
    ///
    /// `source` and `ast` may be missing for patterns built directly from
    /// an automaton, in which case the counts that depend on them are zero
    /// and the hash covers the automaton's listing.
    pub(crate) fn compute(
        source: Option<&str>,
        ast: Option<&Ast>,
        automaton: &Automaton,
        flags: Flags,
        group_count: usize,
        raw: bool,
    ) -> Self {
        let state_count = automaton.state_count();
        let transition_count = automaton.transition_count();
        let branching = if state_count == 0 {
            0.0
        } else {
            transition_count as f64 / state_count as f64
        };

        let mut max_nesting = 0;
        let mut alternation_count = 0;
        let mut quantifier_count = 0;
        let mut nested_quantifiers = 0;

        if let Some(ast) = ast {
            max_nesting = ast.nesting_depth();
            let mut open_repeats = 0_usize;
            for event in ast.dfs() {
                match event {
                    Event::Enter(Ast::Alternation(_)) => alternation_count += 1,
                    Event::Enter(Ast::Repeat(_)) => {
                        quantifier_count += 1;
                        if open_repeats > 0 {
                            nested_quantifiers += 1;
                        }
                        open_repeats += 1;
                    }
                    Event::Leave(Ast::Repeat(_)) => open_repeats -= 1,
                    _ => {}
                }
            }
        }

        let mut complexity = (state_count as f64 * branching)
            * (1.0 + 0.15 * max_nesting as f64)
            * (1.0 + 0.1 * alternation_count as f64)
            * (1.0
                + 0.05 * quantifier_count as f64
                + 0.2 * nested_quantifiers as f64);

        if raw {
            complexity *= 1.25;
        }

        Self {
            complexity,
            state_count,
            transition_count,
            branching,
            max_nesting,
            alternation_count,
            quantifier_count,
            nested_quantifiers,
            group_count,
            hash: content_hash(source, ast, automaton, flags),
        }
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "complexity:         {:.2}", self.complexity)?;
        writeln!(f, "states:             {}", self.state_count)?;
        writeln!(f, "transitions:        {}", self.transition_count)?;
        writeln!(f, "branching factor:   {:.2}", self.branching)?;
        writeln!(f, "max nesting:        {}", self.max_nesting)?;
        writeln!(f, "alternations:       {}", self.alternation_count)?;
        writeln!(
            f,
            "quantifiers:        {} ({} nested)",
            self.quantifier_count, self.nested_quantifiers
        )?;
        writeln!(f, "capture groups:     {}", self.group_count)?;
        write!(f, "hash:               {:016x}", self.hash)
    }
}

/// Hash of a pattern's source (or of its tree, or of its automaton, in that
/// order of preference) and flags.
pub(crate) fn content_hash(
    source: Option<&str>,
    ast: Option<&Ast>,
    automaton: &Automaton,
    flags: Flags,
) -> u64 {
    let mut hasher = FxHasher::default();
    match (source, ast) {
        (Some(source), _) => source.hash(&mut hasher),
        (None, Some(ast)) => ast.to_string().hash(&mut hasher),
        (None, None) => automaton.to_string().hash(&mut hasher),
    }
    flags.bits().hash(&mut hasher);
    hasher.finish()
}

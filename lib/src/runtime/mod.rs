/*! Pattern execution.

Matching is driven by a [`MatcherContext`], which owns the input, a cursor
and the capture table of the last match. The context runs anything that
implements [`Executable`]: compiled [`Pattern`]s, bare [`Automaton`]s and
bytecode [`Program`]s.

Automata are executed in one of three ways:

* Backtracking (the default). Transitions are tried in priority order and
  the first path that reaches an accepting state wins, as in Perl. This is
  the only executor that supports backreferences, lookarounds, atomic
  groups, conditionals and backtracking verbs.
* Thompson simulation ([`ExecMode::Thompson`]), a Pike VM that advances
  all the paths in lockstep. It finds the same matches as the backtracking
  executor without its exponential worst case. Automata with actions fall
  back to backtracking.
* Deterministic automata are walked directly, producing the longest match
  at each start position.

Every executor stops at checkpoints where the limits of the operation are
checked (see [`ExecutionTracker`]) and the optional [`BailoutManager`] is
consulted. Backtracking executors also stop at every frame they push or
pop.

[`Pattern`]: crate::Pattern
[`Program`]: crate::bytecode::Program
*/

use std::fmt::{Display, Formatter};
use std::ops::Range;

use smallvec::SmallVec;

use crate::automaton::{Automaton, AutomatonKind};
use crate::errors::{Error, ErrorKind};
use crate::flags::Flags;
use crate::pattern::Pattern;

pub use backtracker::{Backtracker, Frame};
pub use bailout::{
    BacktrackingState, BailoutAction, BailoutManager, BailoutPolicy,
    BailoutStrategy, ComplexityStrategy,
};
pub use context::MatcherContext;
pub use limits::{scaled_limits, LimitConfig, LimitRegistry, LimitScope};
pub use threadsafe::ThreadSafeContext;
pub use tracker::ExecutionTracker;

mod backtrack;
mod backtracker;
mod bailout;
mod bitmapset;
mod context;
mod dfa;
mod limits;
mod pikevm;
mod threadsafe;
mod tracker;

#[cfg(test)]
mod tests;

/// Position of a capture group that never opened or never closed.
pub const UNCLOSED: usize = usize::MAX;

/// Start and end of every capture group, two slots per group. Group `n`
/// uses slots `2 * (n - 1)` and `2 * (n - 1) + 1`.
pub type Slots = SmallVec<[usize; 8]>;

/// Creates the slots for `group_count` groups, all of them unset.
pub(crate) fn new_slots(group_count: usize) -> Slots {
    SmallVec::from_elem(UNCLOSED, group_count * 2)
}

/// How automata are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecMode {
    /// Depth-first search with backtracking.
    #[default]
    Backtracking,
    /// Pike VM. Falls back to backtracking for automata with actions.
    Thompson,
}

/// A capture group of a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureGroup {
    index: usize,
    name: Option<String>,
    start: usize,
    end: usize,
}

impl CaptureGroup {
    pub(crate) fn new(
        index: usize,
        name: Option<&str>,
        start: usize,
        end: usize,
    ) -> Self {
        Self { index, name: name.map(String::from), start, end }
    }

    /// Group number, starting at 1.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Name of the group, if it has one.
    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Offset where the group starts, [`UNCLOSED`] if it didn't
    /// participate in the match.
    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    /// Offset where the group ends, [`UNCLOSED`] if it didn't participate
    /// in the match or never closed.
    #[inline]
    pub fn end(&self) -> usize {
        self.end
    }

    /// True if the group captured something, possibly an empty string.
    #[inline]
    pub fn is_matched(&self) -> bool {
        self.start != UNCLOSED && self.end != UNCLOSED && self.start <= self.end
    }

    /// Range of the input captured by the group.
    pub fn range(&self) -> Option<Range<usize>> {
        self.is_matched().then_some(self.start..self.end)
    }

    /// Text captured by the group.
    pub fn as_str<'a>(&self, input: &'a str) -> Option<&'a str> {
        self.range().and_then(|r| input.get(r))
    }
}

/// A match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    start: usize,
    end: usize,
    groups: Vec<CaptureGroup>,
}

impl Match {
    pub(crate) fn new(start: usize, end: usize, groups: Vec<CaptureGroup>) -> Self {
        Self { start, end, groups }
    }

    /// Offset where the match starts.
    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    /// Offset where the match ends.
    #[inline]
    pub fn end(&self) -> usize {
        self.end
    }

    /// Range of the input covered by the match.
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// True if the match is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Matched text.
    pub fn as_str<'a>(&self, input: &'a str) -> &'a str {
        input.get(self.range()).unwrap_or_default()
    }

    /// Number of capture groups.
    #[inline]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Capture groups. The group `n` is at index `n - 1`.
    #[inline]
    pub fn groups(&self) -> &[CaptureGroup] {
        self.groups.as_slice()
    }

    /// Group with the given number, starting at 1.
    pub fn group(&self, index: usize) -> Option<&CaptureGroup> {
        index.checked_sub(1).and_then(|i| self.groups.get(i))
    }

    /// Group with the given name.
    pub fn named_group(&self, name: &str) -> Option<&CaptureGroup> {
        self.groups.iter().find(|g| g.name() == Some(name))
    }
}

impl Display for Match {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)?;
        for group in &self.groups {
            match group.range() {
                Some(r) => write!(f, " {}={}..{}", group.index, r.start, r.end)?,
                None => write!(f, " {}=-", group.index)?,
            }
        }
        Ok(())
    }
}

/// State of a match operation shared by the executors.
pub struct Search<'a> {
    pub(crate) input: &'a str,
    /// The match must end at the end of the input.
    pub(crate) full: bool,
    pub(crate) mode: ExecMode,
    pub(crate) tracker: &'a mut ExecutionTracker,
    pub(crate) bailout: Option<&'a BailoutManager>,
    pub(crate) raw: bool,
    /// Set when the executor went through `(*COMMIT)`, no other start
    /// positions are tried.
    pub(crate) committed: bool,
}

impl<'a> Search<'a> {
    /// Checkpoint. Counts a transition, checks the limits and consults the
    /// bailout manager.
    ///
    /// Returns `false` when the bailout manager asks to abandon the current
    /// path.
    pub(crate) fn checkpoint(&mut self, depth: usize, pos: usize) -> Result<bool, Error> {
        self.tracker.checkpoint(depth)?;
        let Some(manager) = self.bailout else {
            return Ok(true);
        };
        let state = BacktrackingState {
            current_depth: depth,
            transitions: self.tracker.transitions(),
            elapsed: self.tracker.elapsed(),
            position: pos,
            is_raw: self.raw,
        };
        match manager.probe(&state) {
            BailoutAction::Continue => Ok(true),
            BailoutAction::Bail => Ok(false),
            BailoutAction::Abort => {
                self.tracker.set_aborted();
                Err(Error::new(
                    ErrorKind::LimitExceeded,
                    "match aborted by bailout strategy",
                ))
            }
        }
    }

    /// Checkpoint for pushing an alternative that resumes at `pos` on a
    /// stack of the given depth. The limits and the bailout manager see the
    /// depth the stack would have after the push.
    ///
    /// Returns `false` when the bailout manager asks to drop the
    /// alternative.
    pub(crate) fn check_push(&mut self, depth: usize, pos: usize) -> Result<bool, Error> {
        self.tracker.check_push(depth)?;
        self.checkpoint(depth + 1, pos)
    }

    /// True if a match ending at `pos` is acceptable.
    #[inline]
    pub(crate) fn end_ok(&self, pos: usize) -> bool {
        !self.full || pos == self.input.len()
    }
}

/// Result of a match attempt at a given position: where the match ends and
/// the capture slots.
pub type RawMatch = (usize, Slots);

/// Something that can be executed by a [`MatcherContext`].
pub trait Executable {
    /// Number of capture groups.
    fn group_count(&self) -> usize;

    /// Name of the group with the given number, starting at 1.
    fn group_name(&self, index: usize) -> Option<&str>;

    /// Flags that affect the search, [`Flags::ANCHORED`] in particular.
    fn flags(&self) -> Flags;

    /// Tries to match starting exactly at byte offset `start`.
    fn match_at(
        &self,
        search: &mut Search<'_>,
        start: usize,
    ) -> Result<Option<RawMatch>, Error>;

    /// Identifier used for looking up pattern specific limits.
    fn pattern_id(&self) -> Option<u64> {
        None
    }

    /// Limits that should be registered for this executable when no other
    /// pattern specific limits exist.
    fn scaled_limits(&self) -> Option<LimitConfig> {
        None
    }

    /// True if the executable was written as a raw literal.
    fn is_raw(&self) -> bool {
        false
    }
}

impl Executable for Automaton {
    fn group_count(&self) -> usize {
        Automaton::group_count(self)
    }

    fn group_name(&self, index: usize) -> Option<&str> {
        self.states()
            .iter()
            .find(|s| s.is_group_start() && s.group_index() == Some(index))
            .and_then(|s| s.group_name())
    }

    fn flags(&self) -> Flags {
        Automaton::flags(self)
    }

    fn match_at(
        &self,
        search: &mut Search<'_>,
        start: usize,
    ) -> Result<Option<RawMatch>, Error> {
        let Some(initial) = self.initial() else {
            return Err(Error::new(
                ErrorKind::InvalidAutomaton,
                "automaton without initial state",
            ));
        };
        if self.kind() == AutomatonKind::Dfa {
            return dfa::longest_match(self, initial, search, start);
        }
        if search.mode == ExecMode::Thompson && pikevm::supports(self) {
            return pikevm::PikeVM::new(self).search(initial, search, start);
        }
        backtrack::Backtrack::new(self, search).run_at(initial, start)
    }
}

impl Executable for Pattern {
    fn group_count(&self) -> usize {
        Pattern::group_count(self)
    }

    fn group_name(&self, index: usize) -> Option<&str> {
        index
            .checked_sub(1)
            .and_then(|i| self.group_names().get(i))
            .and_then(|n| n.as_deref())
    }

    fn flags(&self) -> Flags {
        self.effective_flags()
    }

    fn match_at(
        &self,
        search: &mut Search<'_>,
        start: usize,
    ) -> Result<Option<RawMatch>, Error> {
        self.automaton().match_at(search, start)
    }

    fn pattern_id(&self) -> Option<u64> {
        Some(self.id())
    }

    fn scaled_limits(&self) -> Option<LimitConfig> {
        self.is_raw().then(|| scaled_limits(self.fingerprint().complexity))
    }

    fn is_raw(&self) -> bool {
        Pattern::is_raw(self)
    }
}

/// Compares the text captured by a group with the input at the current
/// position. Returns the number of bytes matched.
pub(crate) fn match_backref(
    captured: &str,
    input: &str,
    case_insensitive: bool,
) -> Option<usize> {
    if !case_insensitive {
        return input.starts_with(captured).then_some(captured.len());
    }
    let mut len = 0;
    let mut it = input.chars();
    for expected in captured.chars() {
        let c = it.next()?;
        if !crate::re::class::chars_eq(expected, c, true) {
            return None;
        }
        len += c.len_utf8();
    }
    Some(len)
}

/// Text captured by group `group` according to `slots`.
pub(crate) fn captured<'a>(input: &'a str, slots: &Slots, group: usize) -> Option<&'a str> {
    let i = group.checked_sub(1)? * 2;
    let (start, end) = (*slots.get(i)?, *slots.get(i + 1)?);
    if start == UNCLOSED || end == UNCLOSED || start > end {
        return None;
    }
    input.get(start..end)
}

/// Byte offsets of the character boundaries of `input` from `from` to the
/// end of the input, both included.
pub(crate) fn boundaries(input: &str, from: usize) -> impl Iterator<Item = usize> + '_ {
    input
        .get(from..)
        .unwrap_or_default()
        .char_indices()
        .map(move |(i, _)| from + i)
        .chain(std::iter::once(input.len()))
}

use std::any::Any;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::automaton::transition::{sort_by_priority, Transition};
use crate::errors::Error;

/// Next identifier handed out to a new state.
static NEXT_STATE_ID: AtomicU32 = AtomicU32::new(0);

/// Identifier of a state. Identifiers are allocated from a process-wide
/// counter, so they are unique across automata until the counter is reset.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct StateId(u32);

impl StateId {
    /// Allocates a new identifier.
    pub(crate) fn next() -> Self {
        Self(NEXT_STATE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value of the identifier.
    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for StateId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl Display for StateId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resets the state identifier counter. Only meant for tests, identifiers
/// allocated after calling this function may collide with existing ones.
#[doc(hidden)]
pub fn reset_id_counter() {
    NEXT_STATE_ID.store(0, Ordering::Relaxed);
}

bitflags! {
    /// Zero-width conditions and markers attached to a state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct StateFlags: u32 {
        /// Start of the input (`\A`, or `^` without MULTILINE).
        const ANCHOR_START = 0x0001;
        /// End of the input (`\z`).
        const ANCHOR_END = 0x0002;
        /// End of the input or before a final newline (`\Z`, or `$`
        /// without MULTILINE).
        const ANCHOR_END_NEWLINE = 0x0004;
        /// Start of a line (`^` with MULTILINE).
        const LINE_START = 0x0008;
        /// End of a line (`$` with MULTILINE).
        const LINE_END = 0x0010;
        /// Word boundary (`\b`).
        const WORD_BOUNDARY = 0x0020;
        /// Not a word boundary (`\B`).
        const NOT_WORD_BOUNDARY = 0x0040;
        /// Entering this state opens the state's capture group.
        const GROUP_START = 0x0100;
        /// Entering this state closes the state's capture group.
        const GROUP_END = 0x0200;
        /// End of the body of a lookaround, atomic group or conditional
        /// lookaround.
        const SUBMATCH_END = 0x0400;
    }
}

impl StateFlags {
    /// Flags that are zero-width assertions about the input.
    pub const ASSERTIONS: StateFlags = StateFlags::ANCHOR_START
        .union(StateFlags::ANCHOR_END)
        .union(StateFlags::ANCHOR_END_NEWLINE)
        .union(StateFlags::LINE_START)
        .union(StateFlags::LINE_END)
        .union(StateFlags::WORD_BOUNDARY)
        .union(StateFlags::NOT_WORD_BOUNDARY);

    /// True if every assertion in the flags holds at byte offset `pos` of
    /// `input`. Non-assertion flags are ignored.
    pub fn holds_at(self, input: &str, pos: usize) -> bool {
        if !self.intersects(StateFlags::ASSERTIONS) {
            return true;
        }

        let prev = input[..pos].chars().next_back();
        let next = input[pos..].chars().next();

        if self.contains(StateFlags::ANCHOR_START) && pos != 0 {
            return false;
        }
        if self.contains(StateFlags::ANCHOR_END) && pos != input.len() {
            return false;
        }
        if self.contains(StateFlags::ANCHOR_END_NEWLINE)
            && pos != input.len()
            && !(pos + 1 == input.len() && next == Some('\n'))
        {
            return false;
        }
        if self.contains(StateFlags::LINE_START)
            && !(prev.is_none() || prev == Some('\n'))
        {
            return false;
        }
        if self.contains(StateFlags::LINE_END)
            && !(next.is_none() || next == Some('\n'))
        {
            return false;
        }

        let is_word_char = |c: char| c == '_' || c.is_ascii_alphanumeric();
        let at_boundary = prev.is_some_and(is_word_char)
            != next.is_some_and(is_word_char);

        if self.contains(StateFlags::WORD_BOUNDARY) && !at_boundary {
            return false;
        }
        if self.contains(StateFlags::NOT_WORD_BOUNDARY) && at_boundary {
            return false;
        }

        true
    }
}

/// Kind of lookaround assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LookKind {
    /// `(?=...)`
    Ahead,
    /// `(?!...)`
    NegativeAhead,
    /// `(?<=...)`
    Behind,
    /// `(?<!...)`
    NegativeBehind,
}

impl LookKind {
    /// True for negative lookarounds.
    pub fn is_negative(self) -> bool {
        matches!(self, LookKind::NegativeAhead | LookKind::NegativeBehind)
    }

    /// True for lookbehinds.
    pub fn is_behind(self) -> bool {
        matches!(self, LookKind::Behind | LookKind::NegativeBehind)
    }
}

/// Condition of a conditional state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    /// True if the group has captured something.
    Group(usize),
    /// True if the lookaround whose body starts at the given state holds.
    Look {
        /// Kind of lookaround.
        kind: LookKind,
        /// Index of the first state of the body.
        body: usize,
    },
}

/// Special behaviour attached to a state, for constructs that can't be
/// expressed with plain transitions.
///
/// Bodies of lookarounds and atomic groups are sub-automata inside the same
/// automaton. They are not reachable through transitions, only through the
/// action, and their last state has the [`StateFlags::SUBMATCH_END`] flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateAction {
    /// Match the text captured by a group.
    Backref {
        /// Group number.
        group: usize,
        /// Compare ignoring case.
        case_insensitive: bool,
    },
    /// Zero-width lookaround assertion.
    Lookaround {
        /// Kind of lookaround.
        kind: LookKind,
        /// Index of the first state of the body.
        body: usize,
    },
    /// Atomic group. The body is matched once and never backtracked into.
    Atomic {
        /// Index of the first state of the body.
        body: usize,
    },
    /// Conditional. The first outgoing transition is taken when the
    /// condition holds, the second one otherwise.
    Conditional(Condition),
    /// `(*FAIL)`
    Fail,
    /// `(*ACCEPT)`
    Accept,
    /// `(*COMMIT)`
    Commit,
}

impl StateAction {
    /// Indexes of the states where bodies start.
    pub fn bodies(&self) -> impl Iterator<Item = usize> {
        let body = match self {
            StateAction::Lookaround { body, .. } => Some(*body),
            StateAction::Atomic { body } => Some(*body),
            StateAction::Conditional(Condition::Look { body, .. }) => {
                Some(*body)
            }
            _ => None,
        };
        body.into_iter()
    }

    pub(crate) fn remap_bodies<F: FnMut(usize) -> usize>(&mut self, mut f: F) {
        match self {
            StateAction::Lookaround { body, .. }
            | StateAction::Atomic { body }
            | StateAction::Conditional(Condition::Look { body, .. }) => {
                *body = f(*body)
            }
            _ => {}
        }
    }
}

/// A state in an automaton.
#[derive(Debug, Serialize, Deserialize)]
pub struct State {
    id: StateId,
    accepting: bool,
    pattern: Option<String>,
    transitions: Vec<Transition>,
    #[serde(skip)]
    user_data: Option<Arc<dyn Any + Send + Sync>>,
    group_name: Option<String>,
    group_index: Option<usize>,
    flags: StateFlags,
    action: Option<StateAction>,
}

impl State {
    /// Creates a new state with a fresh identifier.
    pub fn new(accepting: bool) -> Self {
        Self {
            id: StateId::next(),
            accepting,
            pattern: None,
            transitions: Vec::new(),
            user_data: None,
            group_name: None,
            group_index: None,
            flags: StateFlags::empty(),
            action: None,
        }
    }

    /// Identifier of the state.
    #[inline]
    pub fn id(&self) -> StateId {
        self.id
    }

    /// Changes the identifier. Only deserialization needs this, states
    /// keep the identifier they were created with.
    #[doc(hidden)]
    pub fn set_id(&mut self, id: StateId) {
        self.id = id;
    }

    /// True if the state is accepting.
    #[inline]
    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    /// Makes the state accepting or not.
    #[inline]
    pub fn set_accepting(&mut self, accepting: bool) {
        self.accepting = accepting;
    }

    /// Pattern associated to the state, for debugging purposes.
    #[inline]
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_deref()
    }

    /// Sets the pattern associated to the state.
    pub fn set_pattern<P: Into<String>>(&mut self, pattern: Option<P>) {
        self.pattern = pattern.map(|p| p.into());
    }

    /// User data attached to the state.
    pub fn user_data(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.user_data.as_ref()
    }

    /// Attaches user data to the state.
    pub fn set_user_data(&mut self, data: Option<Arc<dyn Any + Send + Sync>>) {
        self.user_data = data;
    }

    /// Flags of the state.
    #[inline]
    pub fn flags(&self) -> StateFlags {
        self.flags
    }

    /// Replaces the flags of the state.
    #[inline]
    pub fn set_flags(&mut self, flags: StateFlags) {
        self.flags = flags;
    }

    /// Adds flags to the state.
    #[inline]
    pub fn insert_flags(&mut self, flags: StateFlags) {
        self.flags.insert(flags);
    }

    /// Name of the capture group that the state opens or closes.
    #[inline]
    pub fn group_name(&self) -> Option<&str> {
        self.group_name.as_deref()
    }

    /// Sets the name of the capture group.
    pub fn set_group_name<N: Into<String>>(&mut self, name: Option<N>) {
        self.group_name = name.map(|n| n.into());
    }

    /// Number of the capture group that the state opens or closes.
    #[inline]
    pub fn group_index(&self) -> Option<usize> {
        self.group_index
    }

    /// Marks the state as the start of capture group `index`.
    pub fn set_group_start(&mut self, index: usize) {
        self.group_index = Some(index);
        self.flags.insert(StateFlags::GROUP_START);
    }

    /// Marks the state as the end of capture group `index`.
    pub fn set_group_end(&mut self, index: usize) {
        self.group_index = Some(index);
        self.flags.insert(StateFlags::GROUP_END);
    }

    /// True if the state opens a capture group.
    #[inline]
    pub fn is_group_start(&self) -> bool {
        self.flags.contains(StateFlags::GROUP_START)
    }

    /// True if the state closes a capture group.
    #[inline]
    pub fn is_group_end(&self) -> bool {
        self.flags.contains(StateFlags::GROUP_END)
    }

    /// Special action of the state, if any.
    #[inline]
    pub fn action(&self) -> Option<&StateAction> {
        self.action.as_ref()
    }

    /// Sets the special action of the state.
    pub fn set_action(&mut self, action: Option<StateAction>) {
        self.action = action;
    }

    pub(crate) fn action_mut(&mut self) -> Option<&mut StateAction> {
        self.action.as_mut()
    }

    /// True if the state has no flags, group markers or action, and is not
    /// accepting. Entering such a state has no effect.
    pub fn is_plain(&self) -> bool {
        !self.accepting
            && self.flags.is_empty()
            && self.action.is_none()
            && self.group_index.is_none()
    }

    /// Outgoing transitions, in the order in which they are tried.
    #[inline]
    pub fn transitions(&self) -> &[Transition] {
        self.transitions.as_slice()
    }

    pub(crate) fn transitions_mut(&mut self) -> &mut Vec<Transition> {
        &mut self.transitions
    }

    /// Adds an outgoing transition, keeping the list ordered by priority.
    pub fn add_transition(&mut self, transition: Transition) {
        self.transitions.push(transition);
        self.sort_transitions();
    }

    /// Removes the transition at `index`. Fails without modifying the
    /// state if the index is out of bounds.
    pub fn remove_transition(&mut self, index: usize) -> Result<Transition, Error> {
        if index >= self.transitions.len() {
            return Err(Error::invalid_parameter(format!(
                "transition index {} out of bounds",
                index
            )));
        }
        Ok(self.transitions.remove(index))
    }

    /// Sorts the outgoing transitions by descending priority. Transitions
    /// with the same priority keep their relative order.
    pub fn sort_transitions(&mut self) {
        sort_by_priority(&mut self.transitions);
    }

    /// Clones the state attributes into a new state with a fresh
    /// identifier. Outgoing transitions are not cloned.
    pub fn clone_state(&self) -> State {
        State {
            id: StateId::next(),
            accepting: self.accepting,
            pattern: self.pattern.clone(),
            transitions: Vec::new(),
            user_data: self.user_data.clone(),
            group_name: self.group_name.clone(),
            group_index: self.group_index,
            flags: self.flags,
            action: self.action.clone(),
        }
    }

    /// Exact copy of the state, including identifier and transitions.
    pub(crate) fn duplicate(&self) -> State {
        State {
            id: self.id,
            accepting: self.accepting,
            pattern: self.pattern.clone(),
            transitions: self.transitions.clone(),
            user_data: self.user_data.clone(),
            group_name: self.group_name.clone(),
            group_index: self.group_index,
            flags: self.flags,
            action: self.action.clone(),
        }
    }

    /// True if both states have the same attributes: accepting mark,
    /// pattern, group name, group markers and flags. Identifiers and
    /// transitions are not compared.
    pub fn is_equivalent(&self, other: &State) -> bool {
        self.accepting == other.accepting
            && self.pattern == other.pattern
            && self.group_name == other.group_name
            && self.group_index == other.group_index
            && self.flags == other.flags
            && self.action == other.action
    }
}

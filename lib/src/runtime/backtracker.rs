use smallvec::SmallVec;

use crate::errors::Error;
use crate::runtime::{new_slots, Slots};

/// A saved point of a backtracking search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// State (or instruction) where the search resumes.
    pub state: usize,
    /// Input position where the search resumes.
    pub position: usize,
    /// Capture slots at that point.
    pub groups: Slots,
    /// Depth of the stack when the frame was pushed.
    pub depth: usize,
    /// States entered at `position` since the last time input was
    /// consumed. Used for breaking empty loops.
    pub(crate) trail: SmallVec<[usize; 4]>,
    /// Counters of the repetitions being matched by the bytecode
    /// interpreter: repetition, iterations and where the current iteration
    /// started.
    pub(crate) counters: SmallVec<[(u32, u32, usize); 2]>,
    /// The frame accepts at `position` instead of entering `state`.
    pub(crate) accept: bool,
}

impl Frame {
    /// Creates a frame that resumes at `state` and `position`.
    pub fn new(state: usize, position: usize, groups: Slots) -> Self {
        Self {
            state,
            position,
            groups,
            depth: 0,
            trail: SmallVec::new(),
            counters: SmallVec::new(),
            accept: false,
        }
    }
}

/// Bounded stack of backtracking frames.
///
/// The stack refuses pushes once its depth reaches the maximum, so a search
/// using it never holds more than `max_depth` pending alternatives.
#[derive(Debug, Clone)]
pub struct Backtracker {
    frames: Vec<Frame>,
    max_depth: usize,
    num_groups: usize,
    /// Depth of the stacks of enclosing searches, for lookarounds and
    /// atomic groups.
    base_depth: usize,
}

impl Backtracker {
    /// Creates an empty stack.
    pub fn new(max_depth: usize, num_groups: usize) -> Self {
        Self { frames: Vec::new(), max_depth, num_groups, base_depth: 0 }
    }

    pub(crate) fn nested(max_depth: usize, num_groups: usize, base_depth: usize) -> Self {
        Self { frames: Vec::new(), max_depth, num_groups, base_depth }
    }

    /// Pushes a frame for `state` at `position`.
    ///
    /// Fails with [`crate::ErrorKind::LimitExceeded`] when the stack is
    /// full. `groups` must have two slots per group.
    pub fn push(
        &mut self,
        state: usize,
        position: usize,
        groups: &[usize],
    ) -> Result<(), Error> {
        if groups.len() != self.num_groups * 2 {
            return Err(Error::invalid_parameter(format!(
                "expecting {} capture slots, got {}",
                self.num_groups * 2,
                groups.len()
            )));
        }
        self.push_frame(Frame::new(state, position, Slots::from_slice(groups)))
    }

    pub(crate) fn push_frame(&mut self, mut frame: Frame) -> Result<(), Error> {
        let depth = self.depth();
        if depth >= self.max_depth {
            return Err(Error::limit_exceeded(format!(
                "backtracking depth limit ({}) reached",
                self.max_depth
            )));
        }
        frame.depth = depth;
        self.frames.push(frame);
        Ok(())
    }

    /// Removes the frame at the top of the stack.
    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    /// Frame at the top of the stack.
    pub fn peek(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// True if the stack is empty.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Removes all the frames.
    pub fn reset(&mut self) {
        self.frames.clear();
    }

    /// Number of frames, plus the depth of enclosing searches.
    pub fn depth(&self) -> usize {
        self.base_depth + self.frames.len()
    }

    /// Maximum depth.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Changes the maximum depth. Frames already pushed are kept even if
    /// there are more than the new maximum.
    pub fn set_max_depth(&mut self, max_depth: usize) {
        self.max_depth = max_depth;
    }

    /// Number of capture groups saved in each frame.
    pub fn num_groups(&self) -> usize {
        self.num_groups
    }

    /// Empty capture slots for this stack's number of groups.
    pub fn empty_groups(&self) -> Slots {
        new_slots(self.num_groups)
    }
}

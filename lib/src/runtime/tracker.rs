use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::errors::{Error, ErrorKind};
use crate::runtime::limits::LimitConfig;

/// Counters of a match operation.
///
/// A tracker is started at the beginning of every match operation with the
/// limits that apply to it. Executors call [`ExecutionTracker::checkpoint`]
/// every time they take a transition and [`ExecutionTracker::check_push`]
/// before pushing a backtracking frame. The transition counter is reset for
/// each start position, the deadline and the peak depth cover the whole
/// operation.
#[derive(Debug, Clone, Default)]
pub struct ExecutionTracker {
    max_depth: usize,
    max_transitions: u64,
    max_duration: Option<Duration>,
    started: Option<Instant>,
    deadline: Option<Instant>,
    transitions: u64,
    total_transitions: u64,
    peak_depth: usize,
    timed_out: bool,
    aborted: bool,
}

impl ExecutionTracker {
    /// Creates a tracker with the given limits.
    pub fn new(limits: &LimitConfig) -> Self {
        let mut tracker = Self::default();
        tracker.set_limits(limits);
        tracker
    }

    /// Changes the limits. Takes effect on the next call to
    /// [`ExecutionTracker::start`].
    pub fn set_limits(&mut self, limits: &LimitConfig) {
        self.max_depth = limits.max_depth;
        self.max_transitions = limits.max_transitions;
        self.max_duration = (limits.max_duration_ms > 0)
            .then(|| Duration::from_millis(limits.max_duration_ms));
    }

    /// Starts tracking a new operation, resetting all the counters.
    pub fn start(&mut self) {
        let now = Instant::now();
        self.started = Some(now);
        self.deadline = self.max_duration.and_then(|d| now.checked_add(d));
        self.transitions = 0;
        self.total_transitions = 0;
        self.peak_depth = 0;
        self.timed_out = false;
        self.aborted = false;
    }

    /// Starts a new match attempt at a different position.
    pub fn begin_attempt(&mut self) {
        self.transitions = 0;
    }

    /// Counts a transition and checks the transitions limit and the
    /// deadline.
    pub fn checkpoint(&mut self, depth: usize) -> Result<(), Error> {
        self.transitions += 1;
        self.total_transitions += 1;
        self.peak_depth = self.peak_depth.max(depth);

        if self.max_transitions > 0 && self.transitions > self.max_transitions {
            debug!(
                "transitions limit ({}) exceeded at depth {}",
                self.max_transitions, depth
            );
            self.aborted = true;
            return Err(Error::limit_exceeded(format!(
                "more than {} transitions",
                self.max_transitions
            )));
        }

        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                warn!("match timed out after {} transitions", self.total_transitions);
                self.timed_out = true;
                return Err(Error::new(ErrorKind::Timeout, "match timed out"));
            }
        }

        Ok(())
    }

    /// Checks that a frame can be pushed on a stack of the given depth.
    pub fn check_push(&mut self, depth: usize) -> Result<(), Error> {
        if depth >= self.max_depth {
            debug!("backtracking depth limit ({}) reached", self.max_depth);
            self.aborted = true;
            return Err(Error::limit_exceeded(format!(
                "backtracking depth limit ({}) reached",
                self.max_depth
            )));
        }
        self.peak_depth = self.peak_depth.max(depth + 1);
        Ok(())
    }

    /// Maximum depth of the backtracking stack.
    #[inline]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Transitions taken by the current attempt.
    #[inline]
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Transitions taken by the whole operation.
    #[inline]
    pub fn total_transitions(&self) -> u64 {
        self.total_transitions
    }

    /// Deepest backtracking stack observed.
    #[inline]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth
    }

    /// True if the last operation ran out of time.
    #[inline]
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// True if the last operation was stopped by a limit or a bailout
    /// strategy.
    #[inline]
    pub fn aborted(&self) -> bool {
        self.aborted || self.timed_out
    }

    pub(crate) fn set_aborted(&mut self) {
        self.aborted = true;
    }

    /// Time elapsed since the operation started.
    pub fn elapsed(&self) -> Duration {
        self.started.map(|s| s.elapsed()).unwrap_or_default()
    }
}

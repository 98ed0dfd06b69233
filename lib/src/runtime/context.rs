use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::debug;

use crate::config::EngineConfig;
use crate::errors::Error;
use crate::flags::Flags;
use crate::runtime::limits::{LimitConfig, LimitRegistry};
use crate::runtime::{
    boundaries, BailoutManager, CaptureGroup, ExecMode, Executable,
    ExecutionTracker, Match, Search, Slots, UNCLOSED,
};

static NEXT_MATCH_ID: AtomicU64 = AtomicU64::new(1);

/// Executes patterns against an input.
///
/// The context owns the input, a cursor, an optional region that restricts
/// the part of the input that is searched, and the capture groups of the
/// last match. Limits are looked up in a [`LimitRegistry`] at the start of
/// every operation, using the identifier of the pattern and the context's
/// match identifier. Registries are shared between contexts until one of
/// them modifies its copy.
///
/// ```
/// # use rift::{Flags, MatcherContext, Pattern};
/// let pattern = Pattern::new(r"\d+", Flags::empty()).unwrap();
/// let mut ctx = MatcherContext::with_input("abc123xyz");
/// let m = ctx.find_next(&pattern).unwrap().unwrap();
/// assert_eq!(m.range(), 3..6);
/// ```
#[derive(Debug, Clone)]
pub struct MatcherContext {
    input: Arc<str>,
    position: usize,
    region: Option<(usize, usize)>,
    groups: Vec<CaptureGroup>,
    mode: ExecMode,
    registry: Arc<LimitRegistry>,
    match_id: u64,
    bailout: Option<Arc<BailoutManager>>,
    tracker: ExecutionTracker,
    last_error: Option<Error>,
    /// Set after an empty match at the end of the input, `find_next`
    /// returns nothing until the cursor is moved.
    exhausted: bool,
}

impl Default for MatcherContext {
    fn default() -> Self {
        Self::new()
    }
}

impl MatcherContext {
    /// Creates a context with an empty input and the default limits.
    pub fn new() -> Self {
        Self::with_config(&EngineConfig::default())
    }

    /// Creates a context with the limits of the given configuration.
    pub fn with_config(config: &EngineConfig) -> Self {
        Self {
            input: Arc::from(""),
            position: 0,
            region: None,
            groups: Vec::new(),
            mode: ExecMode::default(),
            registry: Arc::new(LimitRegistry::with_global(&config.limits)),
            match_id: NEXT_MATCH_ID.fetch_add(1, Ordering::Relaxed),
            bailout: None,
            tracker: ExecutionTracker::default(),
            last_error: None,
            exhausted: false,
        }
    }

    /// Creates a context with the given input.
    pub fn with_input(input: &str) -> Self {
        let mut ctx = Self::new();
        ctx.set_input(input);
        ctx
    }

    /// Replaces the input. Resets the cursor, the region and the capture
    /// groups.
    pub fn set_input(&mut self, input: &str) {
        self.set_shared_input(Arc::from(input));
    }

    /// Same as [`MatcherContext::set_input`], without copying the input.
    pub fn set_shared_input(&mut self, input: Arc<str>) {
        self.input = input;
        self.position = 0;
        self.region = None;
        self.groups.clear();
        self.exhausted = false;
    }

    /// The input.
    #[inline]
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Length of the input in bytes.
    #[inline]
    pub fn input_len(&self) -> usize {
        self.input.len()
    }

    /// Position of the cursor, as a byte offset.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Moves the cursor. The position must be a character boundary within
    /// the input.
    pub fn set_position(&mut self, position: usize) -> Result<(), Error> {
        if position > self.input.len() || !self.input.is_char_boundary(position) {
            return self.fail(Error::invalid_parameter(format!(
                "position {} is not a character boundary of the input",
                position
            )));
        }
        self.position = position;
        self.exhausted = false;
        Ok(())
    }

    /// Character at the cursor.
    pub fn current_char(&self) -> Option<char> {
        self.input.get(self.position..).and_then(|s| s.chars().next())
    }

    /// Moves the cursor to the next character. Fails at the end of the
    /// input.
    pub fn advance(&mut self) -> Result<char, Error> {
        match self.current_char() {
            Some(c) => {
                self.position += c.len_utf8();
                Ok(c)
            }
            None => self.fail(Error::invalid_parameter("already at the end of the input")),
        }
    }

    /// True if the cursor is at the end of the input, or of the region.
    pub fn is_at_end(&self) -> bool {
        self.position >= self.bounds().1
    }

    /// Restricts searches to `start..end` and moves the cursor to `start`.
    /// Patterns can still look at the input before the region with
    /// lookbehinds, but matches never extend past `end`.
    pub fn set_region(&mut self, start: usize, end: usize) -> Result<(), Error> {
        if start > end
            || end > self.input.len()
            || !self.input.is_char_boundary(start)
            || !self.input.is_char_boundary(end)
        {
            return self.fail(Error::invalid_parameter(format!(
                "invalid region {}..{} for input of length {}",
                start,
                end,
                self.input.len()
            )));
        }
        self.region = Some((start, end));
        self.position = start;
        self.exhausted = false;
        Ok(())
    }

    /// Removes the region.
    pub fn clear_region(&mut self) {
        self.region = None;
    }

    /// The region, if any.
    pub fn region(&self) -> Option<(usize, usize)> {
        self.region
    }

    fn bounds(&self) -> (usize, usize) {
        self.region.unwrap_or((0, self.input.len()))
    }

    /// Selects how automata are executed.
    pub fn set_exec_mode(&mut self, mode: ExecMode) {
        self.mode = mode;
    }

    /// How automata are executed.
    pub fn exec_mode(&self) -> ExecMode {
        self.mode
    }

    /// Replaces the global limits of the context's registry.
    pub fn set_limits(&mut self, limits: LimitConfig) -> Result<(), Error> {
        let result = Arc::make_mut(&mut self.registry).set_global(limits);
        self.check(result)
    }

    /// Limits the depth of the backtracking stack for the operations of
    /// this context.
    pub fn set_max_depth(&mut self, max_depth: usize) -> Result<(), Error> {
        self.override_limits(|config| config.max_depth = max_depth)
    }

    /// Limits the duration of the operations of this context, zero for no
    /// limit.
    pub fn set_timeout(&mut self, max_duration_ms: u64) -> Result<(), Error> {
        self.override_limits(|config| config.max_duration_ms = max_duration_ms)
    }

    /// Limits the number of transitions per start position for the
    /// operations of this context, zero for no limit.
    pub fn set_max_transitions(&mut self, max_transitions: u64) -> Result<(), Error> {
        self.override_limits(|config| config.max_transitions = max_transitions)
    }

    fn override_limits<F: FnOnce(&mut LimitConfig)>(&mut self, f: F) -> Result<(), Error> {
        let registry = Arc::make_mut(&mut self.registry);
        let global = *registry.global();
        let mut config = registry.match_config(self.match_id).copied().unwrap_or_else(|| {
            LimitConfig::for_match(
                true,
                global.max_depth,
                global.max_duration_ms,
                global.max_transitions,
            )
        });
        f(&mut config);
        config.override_parent = true;
        let result = registry.register_match(self.match_id, config);
        self.check(result)
    }

    /// The limits registry.
    pub fn registry(&self) -> &Arc<LimitRegistry> {
        &self.registry
    }

    /// Replaces the limits registry.
    pub fn set_registry(&mut self, registry: Arc<LimitRegistry>) {
        self.registry = registry;
    }

    /// Identifier used for looking up match specific limits.
    pub fn match_id(&self) -> u64 {
        self.match_id
    }

    /// Changes the identifier used for looking up match specific limits.
    pub fn set_match_id(&mut self, match_id: u64) {
        self.match_id = match_id;
    }

    /// Sets the bailout manager probed at every checkpoint.
    pub fn set_bailout_manager(&mut self, manager: Option<Arc<BailoutManager>>) {
        self.bailout = manager;
    }

    /// The bailout manager.
    pub fn bailout_manager(&self) -> Option<&Arc<BailoutManager>> {
        self.bailout.as_ref()
    }

    /// Capture groups of the last match.
    pub fn capture_groups(&self) -> &[CaptureGroup] {
        self.groups.as_slice()
    }

    /// Deepest backtracking stack reached by the last operation.
    pub fn backtrack_depth(&self) -> usize {
        self.tracker.peak_depth()
    }

    /// True if the last operation ran out of time.
    pub fn timed_out(&self) -> bool {
        self.tracker.timed_out()
    }

    /// Transitions taken by the last operation.
    pub fn transitions(&self) -> u64 {
        self.tracker.total_transitions()
    }

    /// The tracker of the last operation.
    pub fn tracker(&self) -> &ExecutionTracker {
        &self.tracker
    }

    /// Error returned by the last failed operation.
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// Matches the whole input, or the whole region, against the pattern.
    pub fn matches<E: Executable + ?Sized>(&mut self, exec: &E) -> Result<Option<Match>, Error> {
        let result = self.begin(exec).and_then(|_| {
            let (start, _) = self.bounds();
            self.search_at(exec, start, true, true)
        });
        self.finish(result)
    }

    /// Finds the next match at or after the cursor, and moves the cursor
    /// to its end. After an empty match the cursor is moved one character
    /// further, so that the same empty match is not found again.
    pub fn find_next<E: Executable + ?Sized>(
        &mut self,
        exec: &E,
    ) -> Result<Option<Match>, Error> {
        if self.exhausted {
            return Ok(None);
        }
        let from = self.position.max(self.bounds().0);
        let result = self.begin(exec).and_then(|_| self.search_at(exec, from, false, false));
        let result = self.finish(result)?;
        if let Some(m) = &result {
            self.advance_past(m);
        }
        Ok(result)
    }

    /// Finds all the non-overlapping matches from the cursor on, up to
    /// `max` matches, or all of them when `max` is zero. The cursor is not
    /// moved.
    pub fn find_all<E: Executable + ?Sized>(
        &mut self,
        exec: &E,
        max: usize,
    ) -> Result<Vec<Match>, Error> {
        let result = self.begin(exec).and_then(|_| self.collect(exec, max));
        self.finish(result)
    }

    /// Replaces every match after the cursor with `replacement`.
    ///
    /// The replacement can refer to capture groups with `$N`, `${N}` and
    /// `${name}`. `$$` is a dollar sign, any other `$` is copied as is.
    /// Groups that didn't participate in the match are replaced with the
    /// empty string.
    pub fn replace<E: Executable + ?Sized>(
        &mut self,
        exec: &E,
        replacement: &str,
    ) -> Result<String, Error> {
        let matches = self.find_all(exec, 0)?;
        let input = &*self.input;
        let mut result = String::with_capacity(input.len());
        let mut last = 0;
        for m in &matches {
            result.push_str(&input[last..m.start()]);
            expand(replacement, m, input, &mut result);
            last = m.end();
        }
        result.push_str(&input[last..]);
        Ok(result)
    }

    /// Splits the input, or the region, at every match after the cursor.
    pub fn split<E: Executable + ?Sized>(&mut self, exec: &E) -> Result<Vec<String>, Error> {
        let matches = self.find_all(exec, 0)?;
        let (start, end) = self.bounds();
        let input = &*self.input;
        let mut pieces = Vec::with_capacity(matches.len() + 1);
        let mut last = start;
        for m in &matches {
            // Empty matches at the edges of a piece don't split it.
            if m.is_empty() && (m.start() == last || m.start() == end) {
                continue;
            }
            pieces.push(input[last..m.start()].to_string());
            last = m.end();
        }
        pieces.push(input[last..end].to_string());
        Ok(pieces)
    }

    /// Starts a new operation: resolves the limits that apply and starts
    /// the tracker.
    fn begin<E: Executable + ?Sized>(&mut self, exec: &E) -> Result<(), Error> {
        let pattern_id = exec.pattern_id();
        let unregistered =
            pattern_id.filter(|id| self.registry.pattern_config(*id).is_none());
        if let Some(id) = unregistered {
            if let Some(scaled) = exec.scaled_limits() {
                debug!(
                    "registering scaled limits for pattern {:016x}: depth {}, {} ms, \
                     {} transitions",
                    id, scaled.max_depth, scaled.max_duration_ms, scaled.max_transitions
                );
                Arc::make_mut(&mut self.registry).register_pattern(id, scaled)?;
            }
        }
        let limits = self.registry.effective_config(pattern_id, Some(self.match_id));
        self.tracker.set_limits(&limits);
        self.tracker.start();
        self.last_error = None;
        Ok(())
    }

    fn collect<E: Executable + ?Sized>(
        &mut self,
        exec: &E,
        max: usize,
    ) -> Result<Vec<Match>, Error> {
        let (_, end) = self.bounds();
        let mut from = self.position.max(self.bounds().0);
        let mut matches = Vec::new();
        while from <= end {
            let Some(m) = self.search_at(exec, from, false, false)? else {
                break;
            };
            from = if m.is_empty() {
                match self.input[m.end()..end].chars().next() {
                    Some(c) => m.end() + c.len_utf8(),
                    None => end + 1,
                }
            } else {
                m.end()
            };
            matches.push(m);
            if max > 0 && matches.len() >= max {
                break;
            }
        }
        Ok(matches)
    }

    /// Tries every start position from `from` to the end of the region
    /// and returns the first match.
    fn search_at<E: Executable + ?Sized>(
        &mut self,
        exec: &E,
        from: usize,
        full: bool,
        anchored: bool,
    ) -> Result<Option<Match>, Error> {
        let (_, end) = self.region.unwrap_or((0, self.input.len()));
        let input = self.input.get(..end).unwrap_or_default();
        let anchored = anchored || exec.flags().contains(Flags::ANCHORED);

        let mut search = Search {
            input,
            full,
            mode: self.mode,
            tracker: &mut self.tracker,
            bailout: self.bailout.as_deref(),
            raw: exec.is_raw(),
            committed: false,
        };

        let mut found = None;
        for start in boundaries(input, from) {
            search.tracker.begin_attempt();
            if let Some((end, slots)) = exec.match_at(&mut search, start)? {
                found = Some((start, end, slots));
                break;
            }
            if anchored || search.committed {
                break;
            }
        }

        let Some((start, end, slots)) = found else {
            return Ok(None);
        };

        let m = build_match(exec, start, end, &slots);
        self.groups = m.groups().to_vec();
        Ok(Some(m))
    }

    fn advance_past(&mut self, m: &Match) {
        let (_, end) = self.bounds();
        if !m.is_empty() {
            self.position = m.end();
            return;
        }
        match self.input.get(m.end()..end).and_then(|s| s.chars().next()) {
            Some(c) => self.position = m.end() + c.len_utf8(),
            None => {
                self.position = end;
                self.exhausted = true;
            }
        }
    }

    fn finish<T>(&mut self, result: Result<T, Error>) -> Result<T, Error> {
        if let Err(err) = &result {
            debug!("match operation failed: {}", err);
        }
        self.check(result)
    }

    fn check<T>(&mut self, result: Result<T, Error>) -> Result<T, Error> {
        if let Err(err) = &result {
            self.last_error = Some(err.clone());
        }
        result
    }

    fn fail<T>(&mut self, err: Error) -> Result<T, Error> {
        self.last_error = Some(err.clone());
        Err(err)
    }
}

fn build_match<E: Executable + ?Sized>(exec: &E, start: usize, end: usize, slots: &Slots) -> Match {
    let groups = (1..=exec.group_count())
        .map(|i| {
            let slot = (i - 1) * 2;
            let group_start = slots.get(slot).copied().unwrap_or(UNCLOSED);
            let group_end = slots.get(slot + 1).copied().unwrap_or(UNCLOSED);
            CaptureGroup::new(i, exec.group_name(i), group_start, group_end)
        })
        .collect();
    Match::new(start, end, groups)
}

/// Appends `replacement` to `out`, expanding group references.
fn expand(replacement: &str, m: &Match, input: &str, out: &mut String) {
    let group_text = |index: usize| {
        m.group(index).and_then(|g| g.as_str(input)).unwrap_or_default()
    };

    let mut rest = replacement;
    while let Some(i) = rest.find('$') {
        out.push_str(&rest[..i]);
        rest = &rest[i + 1..];

        if let Some(r) = rest.strip_prefix('$') {
            out.push('$');
            rest = r;
            continue;
        }

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits > 0 {
            let index = rest[..digits].parse::<usize>().unwrap_or(usize::MAX);
            out.push_str(group_text(index));
            rest = &rest[digits..];
            continue;
        }

        if let Some(r) = rest.strip_prefix('{') {
            if let Some(close) = r.find('}') {
                let name = &r[..close];
                if !name.is_empty() {
                    let text = match name.parse::<usize>() {
                        Ok(index) => group_text(index),
                        Err(_) => m
                            .named_group(name)
                            .and_then(|g| g.as_str(input))
                            .unwrap_or_default(),
                    };
                    out.push_str(text);
                    rest = &r[close + 1..];
                    continue;
                }
            }
        }

        out.push('$');
    }
    out.push_str(rest);
}

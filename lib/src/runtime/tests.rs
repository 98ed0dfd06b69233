use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use crate::automaton::{Automaton, AutomatonKind};
use crate::bytecode::Program;
use crate::errors::{Error, ErrorKind};
use crate::flags::Flags;
use crate::pattern::Pattern;
use crate::runtime::{
    scaled_limits, BacktrackingState, Backtracker, BailoutAction,
    BailoutManager, BailoutPolicy, BailoutStrategy, ComplexityStrategy,
    ExecMode, Executable, ExecutionTracker, LimitConfig, LimitRegistry,
    LimitScope, MatcherContext, RawMatch, Search, ThreadSafeContext, UNCLOSED,
};

fn pattern(source: &str) -> Pattern {
    Pattern::new(source, Flags::empty()).unwrap()
}

/// Ranges of all the matches of `source` in `input`.
fn find_all(source: &str, flags: Flags, mode: ExecMode, input: &str) -> Vec<(usize, usize)> {
    let pattern = Pattern::new(source, flags).unwrap();
    let mut ctx = MatcherContext::with_input(input);
    ctx.set_exec_mode(mode);
    ctx.find_all(&pattern, 0)
        .unwrap()
        .iter()
        .map(|m| (m.start(), m.end()))
        .collect()
}

/// First match of `source` in `input`, as text.
fn first(source: &str, input: &str) -> Option<String> {
    first_with(source, Flags::empty(), input)
}

fn first_with(source: &str, flags: Flags, input: &str) -> Option<String> {
    let pattern = Pattern::new(source, flags).unwrap();
    let mut ctx = MatcherContext::with_input(input);
    ctx.find_next(&pattern).unwrap().map(|m| m.as_str(input).to_string())
}

/// Text captured by each group of the first match.
fn captures(source: &str, input: &str) -> Vec<Option<String>> {
    let pattern = pattern(source);
    let mut ctx = MatcherContext::with_input(input);
    let m = ctx.find_next(&pattern).unwrap().unwrap();
    m.groups().iter().map(|g| g.as_str(input).map(String::from)).collect()
}

#[test]
fn repeated_group_spans_all_iterations() {
    let pattern = pattern("a(b|c)*d");
    for mode in [ExecMode::Backtracking, ExecMode::Thompson] {
        let mut ctx = MatcherContext::with_input("abcbcd");
        ctx.set_exec_mode(mode);
        let m = ctx.find_next(&pattern).unwrap().unwrap();
        assert_eq!(m.range(), 0..6);
        assert_eq!(m.group_count(), 1);
        assert_eq!(m.group(1).unwrap().range(), Some(1..5));
        assert_eq!(ctx.capture_groups().len(), 1);
        assert_eq!(ctx.position(), 6);
    }
}

#[test]
fn priorities() {
    assert_eq!(first("a|ab", "ab").as_deref(), Some("a"));
    assert_eq!(first("ab|a", "ab").as_deref(), Some("ab"));
    assert_eq!(first("a+", "aaa").as_deref(), Some("aaa"));
    assert_eq!(first("a+?", "aaa").as_deref(), Some("a"));
    assert_eq!(first("a{2,3}", "aaaa").as_deref(), Some("aaa"));
    assert_eq!(first("a{2,3}?", "aaaa").as_deref(), Some("aa"));
    assert_eq!(first_with("a+", Flags::UNGREEDY, "aaa").as_deref(), Some("a"));
    assert_eq!(first("x*", "aaa").as_deref(), Some(""));
    assert_eq!(first("(a*)*b", "aab").as_deref(), Some("aab"));
    assert_eq!(first("(a|)*b", "b").as_deref(), Some("b"));
    assert_eq!(first("z", "aaa"), None);
}

#[test]
fn thompson_agrees_with_backtracking() {
    let cases = [
        ("a|ab", "abab"),
        ("a+?b", "aaab ab"),
        ("(a|b)*c", "abacbbc"),
        (r"\d+", "a1b22c333"),
        ("a*", "baa"),
        (r"\bfoo\b", "foo food foo"),
        ("(?m)^x", "x\nx\nyx"),
        ("colou?r", "color colour"),
        ("[a-c]{2}", "abcabc"),
    ];
    for (source, input) in cases {
        assert_eq!(
            find_all(source, Flags::empty(), ExecMode::Backtracking, input),
            find_all(source, Flags::empty(), ExecMode::Thompson, input),
            "`{}` on {:?}",
            source,
            input
        );
    }
}

#[test]
fn captures_and_names() {
    assert_eq!(
        captures(r"(\w+)@(\w+)", "me@home"),
        vec![Some("me".to_string()), Some("home".to_string())]
    );
    assert_eq!(captures("(a)|(b)", "b"), vec![None, Some("b".to_string())]);

    let pattern = pattern(r"(?P<year>\d{4})-(?P<month>\d\d)");
    let mut ctx = MatcherContext::with_input("on 2024-05");
    let m = ctx.find_next(&pattern).unwrap().unwrap();
    assert_eq!(m.named_group("month").unwrap().as_str("on 2024-05"), Some("05"));
    assert_eq!(m.group(1).unwrap().name(), Some("year"));
    assert!(m.named_group("day").is_none());
    assert!(m.group(0).is_none());
    assert_eq!(m.to_string(), "3..10 1=3..7 2=8..10");

    let optional = Pattern::new("(a)?b", Flags::empty()).unwrap();
    let mut ctx = MatcherContext::with_input("b");
    let m = ctx.find_next(&optional).unwrap().unwrap();
    assert!(!m.group(1).unwrap().is_matched());
    assert_eq!(m.group(1).unwrap().start(), UNCLOSED);
    assert_eq!(m.to_string(), "0..1 1=-");
}

#[test]
fn backreferences() {
    assert_eq!(first(r"(a+)b\1", "aabaa").as_deref(), Some("aabaa"));
    assert_eq!(first(r"(a+)b\1", "aaba").as_deref(), Some("aba"));
    assert_eq!(first(r"(\w)\1", "abccd").as_deref(), Some("cc"));
    assert_eq!(
        first(r#"(?P<q>['"]).*?(?P=q)"#, r#"say "hi" now"#).as_deref(),
        Some(r#""hi""#)
    );
    assert_eq!(first(r"(ab)\1", "abAB"), None);
    assert_eq!(
        first_with(r"(ab)\1", Flags::CASE_INSENSITIVE, "abAB").as_deref(),
        Some("abAB")
    );
    // A reference to a group that didn't participate fails.
    assert_eq!(first(r"(a)?\1b", "b"), None);
}

#[test]
fn lookarounds() {
    assert_eq!(
        find_all("foo(?=bar)", Flags::empty(), ExecMode::Backtracking, "foobaz foobar"),
        vec![(7, 10)]
    );
    assert_eq!(
        find_all("foo(?!bar)", Flags::empty(), ExecMode::Backtracking, "foobar foobaz"),
        vec![(7, 10)]
    );
    assert_eq!(first(r"(?<=\$)\d+", "cost: $42").as_deref(), Some("42"));
    assert_eq!(first(r"(?<!-)\b\d+", "-5 7").as_deref(), Some("7"));
    assert_eq!(first(r"(?<=ab|b)c", "xbc").as_deref(), Some("c"));
    // Groups captured inside positive lookaheads are kept.
    assert_eq!(captures(r"(?=(\d+))\w", "123"), vec![Some("123".to_string())]);
    // Lookarounds are honored by the Thompson mode too.
    assert_eq!(
        find_all("a(?=b)", Flags::empty(), ExecMode::Thompson, "ac ab"),
        vec![(3, 4)]
    );
}

#[test]
fn atomic_groups_and_possessive_repetitions() {
    assert_eq!(first("(?>a+)b", "aaab").as_deref(), Some("aaab"));
    assert_eq!(first("(?>a+)ab", "aaab"), None);
    assert_eq!(first("a++ab", "aaab"), None);
    assert_eq!(first("a+ab", "aaab").as_deref(), Some("aaab"));
    assert_eq!(first("(?>a|ab)c", "abc"), None);
}

#[test]
fn conditionals() {
    assert_eq!(first("^(a)?(?(1)b|c)$", "ab").as_deref(), Some("ab"));
    assert_eq!(first("^(a)?(?(1)b|c)$", "c").as_deref(), Some("c"));
    assert_eq!(first("^(a)?(?(1)b|c)$", "ac"), None);
    assert_eq!(first(r"(?(?=\d)\d{2}|[a-z])", "7x").as_deref(), Some("x"));
    assert_eq!(first(r"(?(?=\d)\d{2}|[a-z])", "42").as_deref(), Some("42"));
}

#[test]
fn backtracking_verbs() {
    assert_eq!(first("a(*FAIL)|b", "ab").as_deref(), Some("b"));
    assert_eq!(first("a(*ACCEPT)b", "ac").as_deref(), Some("a"));
    assert_eq!(first("ac|ab", "ac").as_deref(), Some("ac"));
    assert_eq!(first("a(*COMMIT)b|ac", "ac"), None);
    // After a commit no other start position is tried.
    assert_eq!(first("a(*COMMIT)b", "acab"), None);
}

#[test]
fn anchors_and_boundaries() {
    assert_eq!(first("^b", "ab"), None);
    assert_eq!(first("(?m)^b", "a\nb").as_deref(), Some("b"));
    assert_eq!(first("a$", "a\n").as_deref(), Some("a"));
    assert_eq!(first(r"a\z", "a\n"), None);
    assert_eq!(
        find_all(r"\bcat\b", Flags::empty(), ExecMode::Backtracking, "concat cat"),
        vec![(7, 10)]
    );
    assert_eq!(first_with("b", Flags::ANCHORED, "ab"), None);
    assert_eq!(first_with("a", Flags::ANCHORED, "ab").as_deref(), Some("a"));
}

#[test]
fn full_matches() {
    let digits = pattern(r"\d+");
    let mut ctx = MatcherContext::with_input("123");
    assert_eq!(ctx.matches(&digits).unwrap().unwrap().range(), 0..3);
    ctx.set_input("123a");
    assert_eq!(ctx.matches(&digits).unwrap(), None);
    ctx.set_input("a123");
    assert_eq!(ctx.matches(&digits).unwrap(), None);

    // Full matching backtracks into shorter alternatives.
    let alt = pattern("a|ab");
    ctx.set_input("ab");
    assert_eq!(ctx.matches(&alt).unwrap().unwrap().range(), 0..2);
}

#[test]
fn find_next_moves_the_cursor() {
    let digits = pattern(r"\d+");
    let mut ctx = MatcherContext::with_input("a1b22c333");
    let mut found = Vec::new();
    while let Some(m) = ctx.find_next(&digits).unwrap() {
        found.push(m.range());
    }
    assert_eq!(found, vec![1..2, 3..5, 6..9]);
    assert!(ctx.is_at_end());

    // Empty matches don't get the cursor stuck.
    let empty = pattern("x*");
    let mut ctx = MatcherContext::with_input("ab");
    let mut found = Vec::new();
    while let Some(m) = ctx.find_next(&empty).unwrap() {
        found.push(m.range());
    }
    assert_eq!(found, vec![0..0, 1..1, 2..2]);

    ctx.set_position(0).unwrap();
    assert_eq!(ctx.find_next(&empty).unwrap().unwrap().range(), 0..0);
}

#[test]
fn find_all_with_limit() {
    assert_eq!(
        find_all("a*", Flags::empty(), ExecMode::Backtracking, "baa"),
        vec![(0, 0), (1, 3), (3, 3)]
    );
    let pattern = pattern(r"\d");
    let mut ctx = MatcherContext::with_input("12345");
    assert_eq!(ctx.find_all(&pattern, 2).unwrap().len(), 2);
    assert_eq!(ctx.find_all(&pattern, 0).unwrap().len(), 5);
    // The cursor is not moved.
    assert_eq!(ctx.position(), 0);
}

#[test]
fn replace() {
    let mut ctx = MatcherContext::with_input("me@home, you@work");
    let email = pattern(r"(\w+)@(\w+)");
    assert_eq!(ctx.replace(&email, "$2 at $1").unwrap(), "home at me, work at you");
    assert_eq!(ctx.replace(&email, "${2}s").unwrap(), "homes, works");
    assert_eq!(ctx.replace(&email, "$$1").unwrap(), "$1, $1");
    assert_eq!(ctx.replace(&email, "$x $9 $").unwrap(), "$x  $, $x  $");

    let date = pattern(r"(?P<y>\d{4})-(?P<m>\d\d)");
    ctx.set_input("2024-05 and 1999-12");
    assert_eq!(ctx.replace(&date, "${m}/${y}").unwrap(), "05/2024 and 12/1999");

    let optional = pattern("(a)?b");
    ctx.set_input("b ab");
    assert_eq!(ctx.replace(&optional, "[$1]").unwrap(), "[] [a]");
}

#[test]
fn split() {
    let mut ctx = MatcherContext::with_input("a, b,c");
    assert_eq!(ctx.split(&pattern(r",\s*")).unwrap(), vec!["a", "b", "c"]);
    ctx.set_input("a,,b,");
    assert_eq!(ctx.split(&pattern(",")).unwrap(), vec!["a", "", "b", ""]);
    ctx.set_input("abc");
    assert_eq!(ctx.split(&pattern(",")).unwrap(), vec!["abc"]);
}

#[test]
fn regions() {
    let mut ctx = MatcherContext::with_input("aaa bbb aaa");
    let a = pattern("a+");
    ctx.set_region(4, 11).unwrap();
    assert_eq!(ctx.position(), 4);
    let found: Vec<_> = ctx.find_all(&a, 0).unwrap().iter().map(|m| m.range()).collect();
    assert_eq!(found, vec![8..11]);

    // Matches never extend past the end of the region.
    ctx.set_region(0, 2).unwrap();
    assert_eq!(ctx.find_next(&a).unwrap().unwrap().range(), 0..2);
    assert!(ctx.is_at_end());

    // Lookbehinds can see the input before the region.
    let behind = pattern("(?<=a )b");
    ctx.set_region(4, 7).unwrap();
    assert_eq!(ctx.find_next(&behind).unwrap().unwrap().range(), 4..5);

    ctx.clear_region();
    assert_eq!(ctx.region(), None);

    let err = ctx.set_region(5, 3).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    assert_eq!(ctx.last_error().map(|e| e.kind()), Some(ErrorKind::InvalidParameter));
}

#[test]
fn cursor() {
    let mut ctx = MatcherContext::with_input("aé");
    assert_eq!(ctx.input_len(), 3);
    assert_eq!(ctx.current_char(), Some('a'));
    assert_eq!(ctx.advance().unwrap(), 'a');
    assert_eq!(ctx.advance().unwrap(), 'é');
    assert!(ctx.is_at_end());
    assert_eq!(ctx.advance().unwrap_err().kind(), ErrorKind::InvalidParameter);
    assert_eq!(ctx.set_position(2).unwrap_err().kind(), ErrorKind::InvalidParameter);
    assert_eq!(ctx.set_position(4).unwrap_err().kind(), ErrorKind::InvalidParameter);
    ctx.set_position(1).unwrap();
    assert_eq!(ctx.current_char(), Some('é'));
}

#[test]
fn backtrack_limit() {
    let pattern = pattern("(a+)+b");
    let mut ctx = MatcherContext::with_input("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaac");
    ctx.set_max_depth(100).unwrap();
    let err = ctx.find_next(&pattern).unwrap_err();
    assert!(
        matches!(err.kind(), ErrorKind::LimitExceeded | ErrorKind::Timeout),
        "unexpected error: {}",
        err
    );
    assert!(ctx.backtrack_depth() <= 100);
    assert!(ctx.tracker().aborted());
    assert_eq!(ctx.last_error().map(|e| e.kind()), Some(err.kind()));
}

#[test]
fn transitions_limit() {
    let pattern = pattern("a+$");
    let mut ctx = MatcherContext::with_input(&"a".repeat(50));
    ctx.set_max_transitions(10).unwrap();
    assert_eq!(ctx.find_next(&pattern).unwrap_err().kind(), ErrorKind::LimitExceeded);

    ctx.set_max_transitions(0).unwrap();
    assert_eq!(ctx.find_next(&pattern).unwrap().unwrap().range(), 0..50);
    assert!(ctx.transitions() > 50);
    assert!(!ctx.timed_out());
}

#[test]
fn limits_are_per_context() {
    let pattern = pattern("a+");
    let mut limited = MatcherContext::with_input("aaaa");
    let mut unlimited = limited.clone();
    unlimited.set_match_id(limited.match_id() + 1000);

    limited.set_max_transitions(2).unwrap();
    assert!(limited.find_next(&pattern).is_err());
    assert!(unlimited.find_next(&pattern).unwrap().is_some());
    assert!(unlimited.registry().match_config(limited.match_id()).is_none());
}

#[test]
fn global_limits() {
    let pattern = pattern("a+");
    let mut ctx = MatcherContext::with_input("aaaa");
    ctx.set_limits(LimitConfig::global(100, 0, 2)).unwrap();
    assert!(ctx.find_next(&pattern).is_err());
    let err = ctx.set_limits(LimitConfig::for_match(true, 1, 1, 1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameter);
}

#[test]
fn raw_patterns_get_scaled_limits() {
    let raw = Pattern::new("R'a+b'", Flags::RIFT_SYNTAX).unwrap();
    let mut ctx = MatcherContext::with_input("aab");
    assert!(ctx.registry().pattern_config(raw.id()).is_none());
    assert_eq!(ctx.find_next(&raw).unwrap().unwrap().range(), 0..3);
    let config = ctx.registry().pattern_config(raw.id()).copied().unwrap();
    assert_eq!(config, scaled_limits(raw.fingerprint().complexity));
    assert_eq!(config.scope, LimitScope::Pattern);

    // Patterns that aren't raw literals use the global limits.
    let plain = pattern("a+b");
    ctx.find_next(&plain).unwrap();
    assert!(ctx.registry().pattern_config(plain.id()).is_none());
}

#[test]
fn scaled_limits_values() {
    let limits = scaled_limits(10.0);
    assert_eq!(limits.max_depth, 800);
    assert_eq!(limits.max_duration_ms, 3000);
    assert_eq!(limits.max_transitions, 50_000);
    assert!(limits.override_parent);
    assert_eq!(scaled_limits(-5.0), scaled_limits(0.0));
    assert_eq!(scaled_limits(1000.0).max_depth, 400);
}

#[test]
fn limit_registry() {
    let mut registry = LimitRegistry::new();
    assert_eq!(*registry.global(), LimitConfig::default());
    assert_eq!(registry.global().max_depth, 10_000);

    registry.register_pattern(1, LimitConfig::pattern(true, 50, 100, 1000)).unwrap();
    registry.register_pattern(2, LimitConfig::pattern(false, 50, 100, 1000)).unwrap();
    registry.register_match(7, LimitConfig::for_match(true, 5, 0, 10)).unwrap();

    assert_eq!(registry.effective_config(Some(1), None).max_depth, 50);
    assert_eq!(registry.effective_config(Some(2), None).max_depth, 10_000);
    assert_eq!(registry.effective_config(Some(1), Some(7)).max_depth, 5);
    assert_eq!(registry.effective_config(Some(1), Some(7)).max_duration(), None);
    assert_eq!(registry.effective_config(None, Some(8)), *registry.global());
    assert_eq!(registry.effective_config(Some(1), None).scope, LimitScope::Global);

    let err = registry
        .register_pattern(3, LimitConfig::for_match(true, 1, 1, 1))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    let err = registry.register_match(3, LimitConfig::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameter);

    assert!(registry.unregister_pattern(1).is_some());
    assert!(registry.unregister_pattern(1).is_none());
    assert_eq!(registry.effective_config(Some(1), None).max_depth, 10_000);
    assert!(registry.unregister_match(7).is_some());

    let config = LimitConfig::global(1, 2, 3).with_scope(LimitScope::Match);
    assert_eq!(config.scope, LimitScope::Match);
    assert_eq!(config.max_duration(), Some(Duration::from_millis(2)));
}

#[test]
fn tracker() {
    let mut tracker = ExecutionTracker::new(&LimitConfig::global(3, 0, 4));
    tracker.start();
    for depth in 0..4 {
        tracker.checkpoint(depth).unwrap();
    }
    assert_eq!(tracker.transitions(), 4);
    assert_eq!(tracker.peak_depth(), 3);
    assert_eq!(tracker.checkpoint(0).unwrap_err().kind(), ErrorKind::LimitExceeded);
    assert!(tracker.aborted());

    tracker.start();
    assert!(!tracker.aborted());
    tracker.check_push(2).unwrap();
    assert_eq!(tracker.peak_depth(), 3);
    assert_eq!(tracker.check_push(3).unwrap_err().kind(), ErrorKind::LimitExceeded);

    tracker.begin_attempt();
    assert_eq!(tracker.transitions(), 0);
    assert_eq!(tracker.max_depth(), 3);
}

#[test]
fn backtracker() {
    let mut stack = Backtracker::new(2, 1);
    assert!(stack.is_empty());
    assert_eq!(stack.num_groups(), 1);
    stack.push(1, 0, &[UNCLOSED, UNCLOSED]).unwrap();
    stack.push(2, 3, &[0, 3]).unwrap();
    assert_eq!(stack.depth(), 2);
    assert_eq!(stack.peek().map(|f| (f.state, f.position, f.depth)), Some((2, 3, 1)));

    let err = stack.push(3, 4, &[0, 4]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LimitExceeded);

    let err = stack.push(3, 4, &[0]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameter);

    let copy = stack.clone();
    let frame = stack.pop().unwrap();
    assert_eq!(frame.groups.as_slice(), &[0, 3]);
    assert_eq!(stack.depth(), 1);
    assert_eq!(copy.depth(), 2);

    stack.set_max_depth(1);
    assert_eq!(stack.max_depth(), 1);
    assert!(stack.push(4, 0, &[UNCLOSED, UNCLOSED]).is_err());

    stack.reset();
    assert!(stack.is_empty());
    assert_eq!(stack.empty_groups().as_slice(), &[UNCLOSED, UNCLOSED]);
}

fn state(depth: usize, elapsed_ms: u64, raw: bool) -> BacktrackingState {
    BacktrackingState {
        current_depth: depth,
        transitions: 0,
        elapsed: Duration::from_millis(elapsed_ms),
        position: 0,
        is_raw: raw,
    }
}

fn complexity(threshold: f64) -> ComplexityStrategy {
    ComplexityStrategy {
        state_count: 10,
        branching: 2.0,
        repetition_count: 3,
        threshold,
    }
}

#[derive(Debug)]
struct EvenPositions;

impl BailoutPolicy for EvenPositions {
    fn should_activate(&self, state: &BacktrackingState) -> bool {
        state.position % 2 == 0
    }

    fn execute(&self, _: &BacktrackingState) -> BailoutAction {
        BailoutAction::Bail
    }

    fn priority(&self) -> i32 {
        100
    }
}

#[test]
fn complexity_score() {
    let strategy = complexity(50.0);
    assert_eq!(strategy.score(&state(0, 0, false)), 29.0);
    assert_eq!(strategy.score(&state(0, 0, true)), 43.5);
    assert_eq!(strategy.score(&state(100, 0, true)), 87.0);

    let strategy = BailoutStrategy::PatternComplexity(strategy);
    assert!(!strategy.should_activate(&state(0, 0, true)));
    assert!(strategy.should_activate(&state(100, 0, true)));
    assert_eq!(strategy.execute(&state(100, 0, true)), BailoutAction::Abort);

    let from_pattern = ComplexityStrategy::from_pattern(&pattern("(a+)+b"), 10.0);
    assert_eq!(from_pattern.repetition_count, 2);
    assert!(from_pattern.state_count > 0);
}

#[test]
fn bailout_priorities() {
    let mut manager = BailoutManager::new();
    assert!(manager.is_empty());
    assert_eq!(manager.probe(&state(1000, 1000, true)), BailoutAction::Continue);

    manager
        .add_strategy(BailoutStrategy::DepthOnly { max_depth: 10 })
        .add_strategy(BailoutStrategy::PatternComplexity(complexity(50.0)))
        .add_strategy(BailoutStrategy::TimeOnly { max_duration: Duration::from_millis(100) });
    assert_eq!(manager.len(), 3);

    assert!(manager.evaluate(&state(5, 0, false)).is_none());
    assert_eq!(manager.probe(&state(5, 0, false)), BailoutAction::Continue);

    // Only the depth strategy is active.
    let selected = manager.evaluate(&state(10, 0, false)).unwrap();
    assert_eq!(selected.priority(), 40);
    assert_eq!(manager.probe(&state(10, 0, false)), BailoutAction::Bail);

    // Complexity wins over depth.
    let selected = manager.evaluate(&state(100, 0, true)).unwrap();
    assert_eq!(selected.name(), "pattern complexity");
    assert_eq!(manager.probe(&state(100, 0, true)), BailoutAction::Abort);

    // Time wins over everything else.
    let selected = manager.evaluate(&state(100, 200, true)).unwrap();
    assert_eq!(selected.name(), "time only");

    manager.add_strategy(BailoutStrategy::Custom(Arc::new(EvenPositions)));
    let selected = manager.evaluate(&state(100, 200, true)).unwrap();
    assert_eq!(selected.priority(), 100);
    assert_eq!(manager.probe(&state(100, 200, true)), BailoutAction::Bail);
}

#[test]
fn bailout_during_matching() {
    let pattern = pattern("a+b");

    // Aborting stops the whole operation.
    let mut manager = BailoutManager::new();
    manager.add_strategy(BailoutStrategy::PatternComplexity(complexity(0.0)));
    let mut ctx = MatcherContext::with_input("aab");
    ctx.set_bailout_manager(Some(Arc::new(manager)));
    let err = ctx.find_next(&pattern).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LimitExceeded);
    assert!(ctx.tracker().aborted());

    // Bailing drops every alternative before it is pushed, `ab` can only
    // be reached by backtracking.
    let pattern = Pattern::new("(?:a|ab)c", Flags::empty()).unwrap();
    let mut manager = BailoutManager::new();
    manager.add_strategy(BailoutStrategy::DepthOnly { max_depth: 1 });
    ctx.set_input("abc");
    ctx.set_bailout_manager(Some(Arc::new(manager)));
    assert!(ctx.bailout_manager().is_some());
    assert!(ctx.find_next(&pattern).unwrap().is_none());

    ctx.set_bailout_manager(None);
    ctx.set_position(0).unwrap();
    assert_eq!(ctx.find_next(&pattern).unwrap().unwrap().range(), 0..3);
}

/// Bails whenever the backtracking stack is not empty, counting how many
/// times it did.
#[derive(Debug, Default)]
struct NoPendingAlternatives {
    bailed: AtomicUsize,
}

impl BailoutPolicy for NoPendingAlternatives {
    fn should_activate(&self, state: &BacktrackingState) -> bool {
        state.current_depth > 0
    }

    fn execute(&self, _: &BacktrackingState) -> BailoutAction {
        self.bailed.fetch_add(1, Ordering::Relaxed);
        BailoutAction::Bail
    }

    fn priority(&self) -> i32 {
        100
    }
}

#[test]
fn bailout_consulted_on_push() {
    let pattern = pattern("(?:a|ab)c");
    let program = Program::from_pattern(&pattern).unwrap();

    let policy = Arc::new(NoPendingAlternatives::default());
    let mut manager = BailoutManager::new();
    manager.add_strategy(BailoutStrategy::Custom(policy.clone()));
    let manager = Arc::new(manager);

    let mut ctx = MatcherContext::with_input("abc");
    ctx.set_exec_mode(ExecMode::Backtracking);
    ctx.set_bailout_manager(Some(manager.clone()));
    assert!(ctx.find_next(&pattern).unwrap().is_none());
    let after_automaton = policy.bailed.load(Ordering::Relaxed);
    assert!(after_automaton > 0);

    ctx.set_position(0).unwrap();
    assert!(ctx.find_next(&program).unwrap().is_none());
    assert!(policy.bailed.load(Ordering::Relaxed) > after_automaton);

    // Without the policy both backtrack into `ab`.
    ctx.set_bailout_manager(None);
    ctx.set_position(0).unwrap();
    assert_eq!(ctx.find_next(&pattern).unwrap().unwrap().range(), 0..3);
    ctx.set_position(0).unwrap();
    assert_eq!(ctx.find_next(&program).unwrap().unwrap().range(), 0..3);
}

#[test]
fn dfa_execution() {
    let pattern = Pattern::new(r"\d+", Flags::USE_DFA).unwrap();
    assert!(pattern.automaton().is_deterministic());
    let mut ctx = MatcherContext::with_input("abc123xyz");
    assert_eq!(ctx.find_next(&pattern).unwrap().unwrap().range(), 3..6);
    ctx.set_input("123");
    assert_eq!(ctx.matches(&pattern).unwrap().unwrap().range(), 0..3);

    // DFAs produce the longest match.
    let alt = Pattern::new("a|ab", Flags::USE_DFA).unwrap();
    ctx.set_input("ab");
    assert_eq!(ctx.find_next(&alt).unwrap().unwrap().range(), 0..2);
}

#[test]
fn bare_automata() {
    let mut automaton = Automaton::new(AutomatonKind::Nfa);
    let s0 = automaton.create_state(false);
    let s1 = automaton.create_state(true);
    automaton.set_initial(s0).unwrap();
    automaton.add_transition(s0, s1, "[0-9]").unwrap();
    automaton.add_transition(s1, s1, "[0-9]").unwrap();

    for mode in [ExecMode::Backtracking, ExecMode::Thompson] {
        let mut ctx = MatcherContext::with_input("ab42c7");
        ctx.set_exec_mode(mode);
        let found: Vec<_> =
            ctx.find_all(&automaton, 0).unwrap().iter().map(|m| m.range()).collect();
        assert_eq!(found, vec![2..4, 5..6]);
    }

    // Multi-character transitions are executed by the backtracking
    // executor even in Thompson mode.
    let mut automaton = Automaton::new(AutomatonKind::Nfa);
    let s0 = automaton.create_state(false);
    let s1 = automaton.create_state(true);
    automaton.set_initial(s0).unwrap();
    automaton.add_transition(s0, s1, "abc").unwrap();
    let mut ctx = MatcherContext::with_input("xabc");
    ctx.set_exec_mode(ExecMode::Thompson);
    assert_eq!(ctx.find_next(&automaton).unwrap().unwrap().range(), 1..4);

    let empty = Automaton::new(AutomatonKind::Nfa);
    assert_eq!(ctx.find_next(&empty).unwrap_err().kind(), ErrorKind::InvalidAutomaton);
}

#[test]
fn thread_safe_context() {
    let pattern = Arc::new(pattern(r"\d+"));
    let mut tsc = ThreadSafeContext::new(pattern, 2, 1000);
    let input = (0..100).map(|i| i.to_string()).collect::<Vec<_>>().join(" ");
    tsc.set_input(&input);
    assert_eq!(tsc.input(), input);

    // Split at a separator so that no number is cut in two.
    let mid = input[..input.len() / 2].rfind(' ').unwrap();
    let chunks = [(0, mid), (mid + 1, input.len())];
    let counts: Vec<usize> = std::thread::scope(|s| {
        let handles: Vec<_> = chunks
            .iter()
            .map(|&(start, end)| {
                let tsc = &tsc;
                s.spawn(move || {
                    tsc.execute(|ctx, pattern| {
                        ctx.set_region(start, end)?;
                        Ok(ctx.find_all(pattern, 0)?.len())
                    })
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect()
    });
    assert_eq!(counts.iter().sum::<usize>(), 100);
    assert!(tsc.pooled().unwrap() <= 2);

    // Errors are returned as is.
    let err = tsc
        .execute(|ctx, _| ctx.set_position(usize::MAX))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameter);

    // Contexts returned to the pool start from scratch.
    let position = tsc
        .execute(|ctx, pattern| {
            assert_eq!(ctx.region(), None);
            ctx.find_next(pattern)?;
            Ok(ctx.position())
        })
        .unwrap();
    assert_eq!(position, 1);

    tsc.reset_all().unwrap();
    assert_eq!(tsc.pooled().unwrap(), 0);
}

#[test]
fn pooled_contexts_are_reset() {
    let mut tsc = ThreadSafeContext::new(Arc::new(pattern("a+")), 1, 1000);
    tsc.set_input("aaaa");

    let first_id = tsc
        .execute(|ctx, _| {
            let id = ctx.match_id();
            ctx.set_limits(LimitConfig::global(5, 0, 1))?;
            ctx.set_max_transitions(1)?;
            ctx.set_exec_mode(ExecMode::Thompson);
            ctx.set_bailout_manager(Some(Arc::new(BailoutManager::new())));
            ctx.set_match_id(id + 1000);
            Ok(id)
        })
        .unwrap();
    assert_eq!(tsc.pooled().unwrap(), 1);

    let global = *tsc.registry().global();
    let range = tsc
        .execute(|ctx, pattern| {
            assert_eq!(ctx.match_id(), first_id);
            assert_eq!(ctx.exec_mode(), ExecMode::default());
            assert!(ctx.bailout_manager().is_none());
            assert_eq!(*ctx.registry().global(), global);
            assert_eq!(
                ctx.registry().match_config(first_id).map(|c| c.max_depth),
                Some(1000)
            );
            Ok(ctx.find_next(pattern)?.map(|m| m.range()))
        })
        .unwrap();
    assert_eq!(range, Some(0..4));
}

/// Raw literal pattern that counts how many times its scaled limits are
/// computed.
struct CountingLimits {
    pattern: Pattern,
    computed: AtomicUsize,
}

impl Executable for CountingLimits {
    fn group_count(&self) -> usize {
        self.pattern.group_count()
    }

    fn group_name(&self, index: usize) -> Option<&str> {
        Executable::group_name(&self.pattern, index)
    }

    fn flags(&self) -> Flags {
        Executable::flags(&self.pattern)
    }

    fn match_at(
        &self,
        search: &mut Search<'_>,
        start: usize,
    ) -> Result<Option<RawMatch>, Error> {
        self.pattern.match_at(search, start)
    }

    fn pattern_id(&self) -> Option<u64> {
        Some(self.pattern.id())
    }

    fn scaled_limits(&self) -> Option<LimitConfig> {
        self.computed.fetch_add(1, Ordering::Relaxed);
        Executable::scaled_limits(&self.pattern)
    }

    fn is_raw(&self) -> bool {
        self.pattern.is_raw()
    }
}

#[test]
fn scaled_limits_computed_once() {
    let counting = CountingLimits {
        pattern: Pattern::new("R'a+b'", Flags::RIFT_SYNTAX).unwrap(),
        computed: AtomicUsize::new(0),
    };
    let mut ctx = MatcherContext::with_input("aab aab aab");
    assert_eq!(ctx.find_all(&counting, 0).unwrap().len(), 3);
    ctx.set_position(0).unwrap();
    assert!(ctx.find_next(&counting).unwrap().is_some());
    assert_eq!(counting.computed.load(Ordering::Relaxed), 1);
    assert!(ctx.registry().pattern_config(counting.pattern.id()).is_some());
}

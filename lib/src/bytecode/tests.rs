use std::ops::Range;

use pretty_assertions::assert_eq;

use crate::automaton::StateFlags;
use crate::bytecode::{ByteOrder, Instr, Program, HEADER_SIZE, INSTR_SIZE, UNBOUNDED};
use crate::config::EngineConfig;
use crate::errors::ErrorKind;
use crate::flags::Flags;
use crate::pattern::Pattern;
use crate::runtime::{Executable, Match, MatcherContext};

type Found = Vec<(Range<usize>, Vec<Option<Range<usize>>>)>;

fn summarize(matches: &[Match]) -> Found {
    matches
        .iter()
        .map(|m| (m.range(), m.groups().iter().map(|g| g.range()).collect()))
        .collect()
}

fn find_all<E: Executable>(exec: &E, input: &str) -> Found {
    let mut ctx = MatcherContext::with_input(input);
    summarize(&ctx.find_all(exec, 0).unwrap())
}

fn program(source: &str) -> Program {
    let pattern = Pattern::new(source, Flags::empty()).unwrap();
    Program::from_pattern(&pattern).unwrap()
}

/// Checks that the bytecode program finds the same matches and captures as
/// the pattern it was compiled from.
macro_rules! same_matches {
    ($source:expr, $input:expr) => {{
        let pattern = Pattern::new($source, Flags::empty()).unwrap();
        let program = Program::from_pattern(&pattern).unwrap();
        assert_eq!(
            find_all(&program, $input),
            find_all(&pattern, $input),
            "pattern {:?} on {:?}",
            $source,
            $input
        );
    }};
}

#[test]
fn listing() {
    assert_eq!(
        program("([a-z]+)").to_string(),
        r#"00000: SAVE_START 1
00001: MATCH_CLASS [a-z]
00002: SPLIT 00001, 00003
00003: SAVE_END 1
00004: ACCEPT
"#
    );

    assert_eq!(
        program("a{2,3}").to_string(),
        r#"00000: REPEAT_START {2,3} 00002
00001: MATCH_CHAR 'a'
00002: REPEAT_END 00000
00003: ACCEPT
"#
    );

    assert_eq!(
        program(r"(?i)x\b").to_string(),
        r#"00000: MATCH_CHAR 'x' nocase
00001: BOUNDARY WORD_BOUNDARY
00002: ACCEPT
"#
    );

    assert_eq!(
        program("a|b|c").to_string(),
        r#"00000: SPLIT 00001, 00003
00001: MATCH_CHAR 'a'
00002: JUMP 00007
00003: SPLIT 00004, 00006
00004: MATCH_CHAR 'b'
00005: JUMP 00007
00006: MATCH_CHAR 'c'
00007: ACCEPT
"#
    );
}

#[test]
fn lowering_from_ast() {
    let p = program("x*?");
    assert_eq!(
        p.instructions(),
        &[
            Instr::Split(3, 1),
            Instr::MatchChar { c: 'x', case_insensitive: false },
            Instr::Jump(0),
            Instr::Accept,
        ]
    );

    let p = program("(?=a)b");
    assert_eq!(
        p.instructions(),
        &[
            Instr::Lookahead { body: 1, next: 3, behind: false },
            Instr::MatchChar { c: 'a', case_insensitive: false },
            Instr::Accept,
            Instr::MatchChar { c: 'b', case_insensitive: false },
            Instr::Accept,
        ]
    );

    let p = program("b{3,}?");
    assert_eq!(
        p.instructions()[0],
        Instr::RepeatStart { min: 3, max: UNBOUNDED, greedy: false, end: 2 }
    );

    // Classes used more than once are stored once.
    let p = program(r"\d-\d");
    assert_eq!(p.classes().as_str(), r"\d");
}

#[test]
fn same_matches_as_the_pattern() {
    same_matches!("a(b|c)*d", "abcbcd xacd");
    same_matches!(r"\d{2,3}", "1 12 1234 12345");
    same_matches!("(?:ab){2}", "abababab ab");
    same_matches!("a{2,}?", "aaaa");
    same_matches!("a{2,4}", "aaaaaaa");
    same_matches!("(a){0,2}b", "aaab");
    same_matches!("(a|ab)(c|bcd)(d*)", "abcd");
    same_matches!(r"(?<=\$)\d+", "cost $42 and 7");
    same_matches!("(?<!x)y", "xy zy");
    same_matches!("foo(?!bar)", "foobar foobaz");
    same_matches!(r"(\w+) \1", "hello hello world");
    same_matches!("(?<name>[a-z]+)=(?P=name)", "ab=ab cd=ce");
    same_matches!("(?i)hello", "HeLLo hello");
    same_matches!(r"(?m)^\w+$", "one\ntwo\n");
    same_matches!("x*", "axxb");
    same_matches!("(a*)*b", "aab");
    same_matches!(r"\bcat\b", "concat cat");
    same_matches!("colou?r", "color colour");
    same_matches!("(?s)a.b", "a\nb");
    same_matches!("a.b", "a\nb axb");
    same_matches!("é+", "ééé e");
}

#[test]
fn repeated_group_spans_all_iterations() {
    let program = program("a(b|c)*d");
    let mut ctx = MatcherContext::with_input("abcbcd");
    let m = ctx.find_next(&program).unwrap().unwrap();
    assert_eq!(m.range(), 0..6);
    assert_eq!(m.group(1).and_then(|g| g.range()), Some(1..5));
}

#[test]
fn lowering_from_automaton() {
    for (source, input) in [
        ("a(b|c)*d", "abcbcd"),
        (r"(?<=a)b", "ab cb"),
        ("x(?!y)", "xy xz"),
        (r"(\w)\1", "abccd"),
        ("(?:ab|a)c", "abc ac"),
    ] {
        let pattern = Pattern::new(source, Flags::empty()).unwrap();
        let program = Program::from_automaton(pattern.automaton()).unwrap();
        program.validate().unwrap();
        assert_eq!(find_all(&program, input), find_all(&pattern, input), "{}", source);
    }
}

#[test]
fn lowering_deterministic_automata() {
    let pattern = Pattern::new(r"\d+", Flags::OPTIMIZE | Flags::USE_DFA).unwrap();
    assert!(pattern.automaton().is_deterministic());

    let program = Program::from_pattern(&pattern).unwrap();
    let mut ctx = MatcherContext::with_input("abc123xyz45");
    let found: Vec<Range<usize>> =
        ctx.find_all(&program, 0).unwrap().iter().map(|m| m.range()).collect();
    assert_eq!(found, vec![3..6, 9..11]);
}

#[test]
fn unsupported_constructs() {
    for source in ["(?>a)", "a++", "(a)?(?(1)b|c)", "a(*COMMIT)b"] {
        let pattern = Pattern::new(source, Flags::empty()).unwrap();
        let err = Program::from_pattern(&pattern).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation, "{}", source);
    }
}

#[test]
fn validate() {
    let mut p = Program::new();
    assert_eq!(p.validate().unwrap_err().kind(), ErrorKind::InvalidBytecode);

    p.push(Instr::Jump(5)).unwrap();
    assert_eq!(p.validate().unwrap_err().kind(), ErrorKind::InvalidBytecode);

    let mut p = Program::new();
    p.push(Instr::SaveStart(1)).unwrap();
    p.push(Instr::Accept).unwrap();
    assert_eq!(p.validate().unwrap_err().kind(), ErrorKind::InvalidBytecode);
    p.set_group_count(1);
    p.validate().unwrap();

    let mut p = Program::new();
    p.push(Instr::MatchClass { offset: 0, len: 3 }).unwrap();
    p.push(Instr::Accept).unwrap();
    assert_eq!(p.validate().unwrap_err().kind(), ErrorKind::InvalidBytecode);

    let mut p = Program::new();
    let class = p.add_class("[0-9]").unwrap();
    p.push(class).unwrap();
    p.push(Instr::Accept).unwrap();
    p.validate().unwrap();

    let mut p = Program::new();
    p.push(Instr::RepeatStart { min: 1, max: 2, greedy: true, end: 1 }).unwrap();
    p.push(Instr::Accept).unwrap();
    assert_eq!(p.validate().unwrap_err().kind(), ErrorKind::InvalidBytecode);

    let mut p = Program::new();
    p.push(Instr::Boundary(StateFlags::GROUP_START)).unwrap();
    p.push(Instr::Accept).unwrap();
    assert_eq!(p.validate().unwrap_err().kind(), ErrorKind::InvalidBytecode);
}

#[test]
fn optimize() {
    let a = Instr::MatchChar { c: 'a', case_insensitive: false };

    let mut p = Program::new();
    for instr in [Instr::Nop, a, Instr::Nop, Instr::Split(0, 4), Instr::Nop, Instr::Accept] {
        p.push(instr).unwrap();
    }

    assert_eq!(p.optimize().unwrap(), 3);
    assert_eq!(p.instructions(), &[a, Instr::Split(0, 2), Instr::Accept]);

    // Optimizing again changes nothing.
    assert_eq!(p.optimize().unwrap(), 0);
    assert_eq!(p.instructions(), &[a, Instr::Split(0, 2), Instr::Accept]);

    let mut ctx = MatcherContext::with_input("baaa");
    assert_eq!(ctx.find_next(&p).unwrap().map(|m| m.range()), Some(1..4));

    // Targets pointing to trailing NOPs end up in a FAIL.
    let mut p = Program::new();
    for instr in [Instr::Split(2, 3), Instr::Accept, a, Instr::Nop] {
        p.push(instr).unwrap();
    }
    assert_eq!(p.optimize().unwrap(), 1);
    assert_eq!(p.instructions(), &[Instr::Split(2, 3), Instr::Accept, a, Instr::Fail]);
    p.validate().unwrap();
}

#[test]
fn serialization() {
    let p = program(r"(?P<year>\d{4})-(\d\d)");

    for order in [ByteOrder::Little, ByteOrder::Big] {
        let bytes = p.serialize_as(order).unwrap();

        assert_eq!(&bytes[..4], b"RIFT");
        match order {
            ByteOrder::Little => assert_eq!(&bytes[4..8], &[4, 3, 2, 1]),
            ByteOrder::Big => assert_eq!(&bytes[4..8], &[1, 2, 3, 4]),
        }

        let pattern_len = p.pattern().unwrap().len() + 1;
        assert_eq!(
            bytes.len(),
            HEADER_SIZE + p.len() * INSTR_SIZE + pattern_len + 4 + p.classes().len()
        );

        let q = Program::deserialize(&bytes).unwrap();
        assert_eq!(q.instructions(), p.instructions());
        assert_eq!(q.group_count(), 2);
        assert_eq!(q.pattern(), p.pattern());
        assert_eq!(q.group_name(1), Some("year"));
        assert_eq!(q.classes().as_str(), p.classes().as_str());
        assert_eq!(find_all(&q, "on 2024-05-17"), find_all(&p, "on 2024-05-17"));
    }
}

#[test]
fn deserialization_with_swapped_byte_order() {
    let pattern = Pattern::new(r"\d+", Flags::OPTIMIZE).unwrap();
    let program = Program::from_pattern(&pattern).unwrap();

    let bytes = program.serialize_as(ByteOrder::native().swapped()).unwrap();
    let program = Program::deserialize(bytes).unwrap();

    let mut ctx = MatcherContext::with_input("abc123xyz");
    let m = ctx.find_next(&program).unwrap().unwrap();
    assert_eq!(m.range(), 3..6);
}

#[test]
fn malformed_programs() {
    let bytes = program("ab+").serialize_as(ByteOrder::Little).unwrap();

    let err = Program::deserialize(&bytes[..bytes.len() - 1]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidBytecode);

    let err = Program::deserialize(&bytes[..HEADER_SIZE - 1]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidBytecode);

    let mut newer = bytes.clone();
    newer[8..12].copy_from_slice(&2_u32.to_le_bytes());
    let err = Program::deserialize(&newer).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidBytecode);

    let mut bad_magic = bytes.clone();
    bad_magic[0] = b'X';
    assert!(Program::deserialize(&bad_magic).is_err());

    let mut bad_marker = bytes.clone();
    bad_marker[4..8].copy_from_slice(&[1, 1, 1, 1]);
    assert!(Program::deserialize(&bad_marker).is_err());

    let mut bad_opcode = bytes.clone();
    bad_opcode[HEADER_SIZE] = 0x7f;
    let err = Program::deserialize(&bad_opcode).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidBytecode);

    // A jump out of the program is caught by the validation.
    let mut bad_target = bytes;
    let jump = HEADER_SIZE + 2 * INSTR_SIZE;
    assert_eq!(bad_target[jump], Instr::SPLIT);
    bad_target[jump + 4..jump + 8].copy_from_slice(&1000_u32.to_le_bytes());
    let err = Program::deserialize(&bad_target).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidBytecode);

    // The group count in the header must be bounded, and consistent with
    // the groups the program uses.
    let digits = program(r"\d+").serialize_as(ByteOrder::Little).unwrap();
    for groups in [0x4000_0000_u32, 101, 5] {
        let mut bad_groups = digits.clone();
        bad_groups[20..24].copy_from_slice(&groups.to_le_bytes());
        let err = Program::deserialize(&bad_groups).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidBytecode, "{} groups", groups);
    }
}

#[test]
fn group_count_limits() {
    // Group 1 is declared by the pattern but never saved.
    let unused = program("(a){0}b");
    assert_eq!(unused.group_count(), 1);
    let unused = Program::deserialize(unused.serialize().unwrap()).unwrap();
    assert_eq!(unused.group_count(), 1);

    let bytes = program("(a)(b)").serialize().unwrap();
    assert!(Program::deserialize(&bytes).is_ok());

    let config = EngineConfig { max_capture_groups: 1, ..Default::default() };
    let err = Program::deserialize_with_config(&bytes, &config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidBytecode);
}

#[test]
fn anchored_programs() {
    let pattern = Pattern::new("b", Flags::ANCHORED).unwrap();
    let program = Program::from_pattern(&pattern).unwrap();
    assert!(program.flags().contains(Flags::ANCHORED));

    let mut ctx = MatcherContext::with_input("ab");
    assert!(ctx.find_next(&program).unwrap().is_none());
}

#[test]
fn backtrack_limit() {
    let program = program("(a+)+b");
    let mut ctx = MatcherContext::with_input("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaac");
    ctx.set_max_depth(100).unwrap();

    let err = ctx.find_next(&program).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::LimitExceeded | ErrorKind::Timeout));
    assert!(ctx.backtrack_depth() <= 100);
}

#[test]
fn shared_class_pool() {
    let p = program("[a-c]x[d-f]");
    let q = p.clone();
    assert!(std::ptr::eq(p.classes(), q.classes()));
}

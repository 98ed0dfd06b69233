/*! End-to-end tests. */
use std::ops::Range;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use crate::bytecode::{ByteOrder, Program};
use crate::errors::ErrorKind;
use crate::flags::Flags;
use crate::pattern::Pattern;
use crate::runtime::{MatcherContext, ThreadSafeContext};

macro_rules! find {
    ($pattern:expr, $input:expr) => {{
        let mut ctx = MatcherContext::with_input($input);
        ctx.find_next(&$pattern).unwrap()
    }};
}

#[test]
fn repeated_group_captures_every_iteration() {
    let pattern = Pattern::new("a(b|c)*d", Flags::empty()).unwrap();
    let m = find!(pattern, "abcbcd").unwrap();

    assert_eq!(m.range(), 0..6);
    assert_eq!(m.group_count(), 1);
    assert_eq!(m.group(1).and_then(|g| g.range()), Some(1..5));
}

#[test]
fn raw_literal_function_declarations() {
    let pattern = Pattern::new(
        r"R'(?:co\s+)?function\s+([a-zA-Z][a-zA-Z0-9_]*)\s*\(\s*\)\s*\{\s*\}'",
        Flags::RIFT_SYNTAX,
    )
    .unwrap();

    for (input, name) in [("function test() {}", "test"), ("co function foo() {}", "foo")] {
        let m = find!(pattern, input).unwrap();
        assert_eq!(m.group(1).and_then(|g| g.as_str(input)), Some(name));
    }

    assert!(find!(pattern, "Function test() {}").is_none());
}

#[test]
fn digits_minimize_to_two_states() {
    let pattern = Pattern::new(r"\d+", Flags::OPTIMIZE).unwrap();

    let dfa = pattern.automaton().to_dfa().unwrap();
    assert!(dfa.is_deterministic());

    let min = dfa.minimize().unwrap();
    assert_eq!(min.state_count(), 2);
    assert_eq!(min.states().iter().filter(|s| s.is_accepting()).count(), 1);
}

#[test]
fn bytecode_from_a_host_with_the_opposite_byte_order() {
    let pattern = Pattern::new(r"\d+", Flags::OPTIMIZE).unwrap();
    let program = Program::from_pattern(&pattern).unwrap();

    let foreign = ByteOrder::native().swapped();
    let bytes = program.serialize_as(foreign).unwrap();
    let program = Program::deserialize(&bytes).unwrap();

    let m = find!(program, "abc123xyz").unwrap();
    assert_eq!(m.range(), 3..6);
}

#[test]
fn catastrophic_backtracking_is_bounded() {
    let pattern = Pattern::new("(a+)+b", Flags::empty()).unwrap();
    let input = format!("{}c", "a".repeat(30));

    let mut ctx = MatcherContext::with_input(&input);
    ctx.set_max_depth(100).unwrap();

    let err = ctx.find_next(&pattern).unwrap_err();
    assert!(
        matches!(err.kind(), ErrorKind::LimitExceeded | ErrorKind::Timeout),
        "unexpected error: {}",
        err
    );
    assert!(ctx.backtrack_depth() <= 100);
}

const JSON_TOKEN: &str =
    r#""(?:[^"\\]|\\.)*"|-?\d+(?:\.\d+)?(?:[eE][-+]?\d+)?|true|false|null|[{}:,]|\[|\]"#;

/// Builds a JSON document of about 4 KB.
fn json_document() -> String {
    let mut items = Vec::new();
    let mut i = 0;
    loop {
        items.push(json!({
            "id": i,
            "name": format!("item \"{}\", with a comma", i),
            "price": i as f64 * 1.25,
            "tags": ["a", "b,c"],
            "active": i % 2 == 0,
            "parent": null,
        }));
        let doc = serde_json::to_string(&items).unwrap();
        if doc.len() >= 4096 {
            return doc;
        }
        i += 1;
    }
}

/// Splits `doc` into `n` regions of roughly the same size. Regions end
/// right after a comma that is not inside a string, so no token crosses a
/// boundary.
fn split_regions(doc: &str, n: usize) -> Vec<Range<usize>> {
    let mut commas = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in doc.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            ',' if !in_string => commas.push(i + 1),
            _ => {}
        }
    }

    let mut cuts = vec![0];
    for k in 1..n {
        let target = doc.len() * k / n;
        let cut = commas.iter().copied().find(|&c| c >= target).unwrap();
        cuts.push(cut);
    }
    cuts.push(doc.len());

    cuts.windows(2).map(|w| w[0]..w[1]).collect()
}

#[test]
fn parallel_tokenization_matches_sequential() {
    let doc = json_document();
    let pattern = Arc::new(Pattern::new(JSON_TOKEN, Flags::empty()).unwrap());

    let mut ctx = MatcherContext::with_input(&doc);
    ctx.set_max_transitions(0).unwrap();
    let sequential: Vec<Range<usize>> =
        ctx.find_all(&*pattern, 0).unwrap().iter().map(|m| m.range()).collect();

    assert!(sequential.len() > 300);
    assert_eq!(&doc[sequential[0].clone()], "[");
    assert_eq!(&doc[sequential[2].clone()], "\"active\"");

    let mut tsc = ThreadSafeContext::new(Arc::clone(&pattern), 4, 10000);
    tsc.set_input(&doc);

    let regions = split_regions(&doc, 4);
    assert_eq!(regions.len(), 4);

    let mut parallel: Vec<Range<usize>> = std::thread::scope(|s| {
        let handles: Vec<_> = regions
            .iter()
            .cloned()
            .map(|region| {
                let tsc = &tsc;
                s.spawn(move || {
                    tsc.execute(|ctx, pattern| {
                        ctx.set_max_transitions(0)?;
                        ctx.set_region(region.start, region.end)?;
                        Ok(ctx
                            .find_all(pattern, 0)?
                            .iter()
                            .map(|m| m.range())
                            .collect::<Vec<_>>())
                    })
                })
            })
            .collect();

        handles.into_iter().flat_map(|h| h.join().unwrap().unwrap()).collect()
    });

    parallel.sort_by_key(|r| r.start);

    assert_eq!(parallel, sequential);
}

#[test]
fn deeply_nested_groups_on_a_spawned_thread() {
    fn nested(depth: usize) -> String {
        format!("{}a{}", "(?:".repeat(depth), ")".repeat(depth))
    }

    // Spawned threads get a much smaller stack than the main thread.
    std::thread::spawn(|| {
        let pattern = Pattern::new(&nested(999), Flags::empty()).unwrap();
        assert_eq!(find!(pattern, "xa").map(|m| m.range()), Some(1..2));
        assert!(Program::from_pattern(&pattern).is_ok());
        let printed = pattern.ast().unwrap().root().to_string();
        assert!(Pattern::new(&printed, Flags::empty()).is_ok());

        let err = Pattern::new(&nested(1001), Flags::empty()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LimitExceeded);
    })
    .join()
    .unwrap();
}

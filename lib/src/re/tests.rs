use pretty_assertions::assert_eq;

use crate::automaton::LookKind;
use crate::errors::ErrorKind;
use crate::flags::Flags;
use crate::re::ast::{Ast, Condition, GroupKind};
use crate::re::parser::Parser;
use crate::re::validator::Validator;

macro_rules! assert_parse {
    ($flags:expr, $source:expr, $expected:expr) => {{
        let tree = Parser::new().flags($flags).parse($source).unwrap();
        assert_eq!(tree.root().to_string(), $expected);
        // Parsing the printed form produces the same tree.
        let again = Parser::new().flags($flags).parse($expected).unwrap();
        assert_eq!(tree.root(), again.root());
    }};
    ($source:expr, $expected:expr) => {
        assert_parse!(Flags::empty(), $source, $expected)
    };
}

macro_rules! assert_parse_error {
    ($source:expr, $kind:expr, $pos:expr) => {{
        let err = Parser::new().parse($source).unwrap_err();
        assert_eq!(err.kind(), $kind, "{}", err);
        assert_eq!(err.position(), $pos, "{}", err);
    }};
}

macro_rules! assert_invalid {
    ($source:expr, $kind:expr) => {{
        let tree = Parser::new().parse($source).unwrap();
        let err = Validator::new().validate(&tree).unwrap_err();
        assert_eq!(err.kind(), $kind, "{}", err);
    }};
}

#[test]
fn parse_and_print() {
    assert_parse!("a(b|c)*d", "a(b|c)*d");
    assert_parse!("(?:ab)+?", "(?:ab)+?");
    assert_parse!("a{2,5}b{3}c{2,}", "a{2,5}b{3}c{2,}");
    assert_parse!("x*+y??", "x*+y??");
    assert_parse!("(?P<year>\\d{4})-\\1", "(?P<year>\\d{4})\\-\\1");
    assert_parse!("(?<=a)b(?!c)", "(?<=a)b(?!c)");
    assert_parse!("(?>a+)b", "(?>a+)b");
    assert_parse!("(?i)abc", "(?i)abc");
    assert_parse!("(?i-s:a.)", "(?i-s:a.)");
    assert_parse!("(a)?(?(1)b|c)", "(a)?(?(1)b|c)");
    assert_parse!("(?(?=a)ab|cd)", "(?(?=a)ab|cd)");
    assert_parse!("[[:alpha:]]+[a-z_]", "[[:alpha:]]+[a-z_]");
    assert_parse!("\\bfoo\\B", "\\bfoo\\B");
    assert_parse!("^a$|\\Ab\\z", "^a$|\\Ab\\z");
    assert_parse!("a(*COMMIT)b", "a(*COMMIT)b");
    assert_parse!("a(?#note)b", "a(?#note)b");
    assert_parse!("\\p{L}+", "\\p{L}+");
    assert_parse!("a|", "a|");
    assert_parse!("", "");
}

#[test]
fn node_kinds() {
    let tree = Parser::new().parse("\\d\\W\\s.").unwrap();
    assert_eq!(
        tree.root(),
        &Ast::Concat(vec![
            Ast::class("\\d"),
            Ast::class("\\W"),
            Ast::class("\\s"),
            Ast::Dot,
        ])
    );

    let tree = Parser::new().parse("(?<!x)").unwrap();
    assert!(matches!(
        tree.root(),
        Ast::Lookaround { kind: LookKind::NegativeBehind, .. }
    ));

    let tree = Parser::new().parse("(?(?<=a)b)").unwrap();
    match tree.root() {
        Ast::Conditional(cond) => {
            assert!(matches!(
                cond.condition,
                Condition::Look { kind: LookKind::Behind, .. }
            ));
            assert_eq!(cond.yes.as_ref(), &Ast::Literal('b'));
            assert!(cond.no.is_none());
        }
        other => panic!("unexpected node: {:?}", other),
    }

    let tree = Parser::new().parse("a*?").unwrap();
    match tree.root() {
        Ast::Repeat(repeat) => {
            assert_eq!((repeat.min, repeat.max), (0, None));
            assert!(!repeat.greedy);
            assert!(!repeat.possessive);
        }
        other => panic!("unexpected node: {:?}", other),
    }
}

#[test]
fn groups() {
    let tree = Parser::new().parse("(a)(?:b)(?P<n>c)(?<m>d)").unwrap();
    assert_eq!(tree.group_count(), 3);
    assert_eq!(
        tree.group_names(),
        &[None, Some("n".to_string()), Some("m".to_string())]
    );
    assert_eq!(tree.group_index("n"), Some(2));
    assert_eq!(tree.group_index("m"), Some(3));
    assert_eq!(tree.group_index("x"), None);

    let tree = Parser::new().parse("((a)(b))").unwrap();
    let indexes: Vec<usize> = tree
        .root()
        .dfs()
        .filter_map(|event| match event {
            crate::re::ast::Event::Enter(Ast::Group(group)) => match &group.kind {
                GroupKind::Capturing { index, .. } => Some(*index),
                _ => None,
            },
            _ => None,
        })
        .collect();
    assert_eq!(indexes, vec![1, 2, 3]);
}

#[test]
fn alternative_spans() {
    let tree = Parser::new().parse("ab|cd|e").unwrap();
    assert_eq!(tree.alternatives(), &[0..2, 3..5, 6..7]);

    let tree = Parser::new().parse("(ab|cd)").unwrap();
    assert!(tree.alternatives().is_empty());

    let tree = Parser::new().parse("|x").unwrap();
    assert_eq!(tree.alternatives(), &[0..0, 1..2]);
}

#[test]
fn raw_literals() {
    let tree = Parser::new()
        .flags(Flags::RIFT_SYNTAX)
        .parse("R'ab|c'i")
        .unwrap();
    assert!(tree.is_raw());
    assert!(tree.flags().contains(Flags::CASE_INSENSITIVE));
    assert!(tree.flags().contains(Flags::RIFT_SYNTAX));
    assert_eq!(tree.alternatives(), &[2..4, 5..6]);
    assert_eq!(tree.root().to_string(), "ab|c");

    let tree = Parser::new()
        .flags(Flags::RIFT_SYNTAX)
        .parse("R\"(?:co\\s+)?function\"")
        .unwrap();
    assert!(tree.is_raw());
    assert_eq!(tree.flags(), Flags::RIFT_SYNTAX);

    // Raw literals need the RIFT_SYNTAX flag.
    let err = Parser::new().parse("R'abc'").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFeature);
    assert_eq!(err.position(), Some(0));

    // A quote that is never closed.
    let err = Parser::new()
        .flags(Flags::RIFT_SYNTAX)
        .parse("R'abc")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Syntax);

    // The `x` modifier applies to the body.
    let tree = Parser::new()
        .flags(Flags::RIFT_SYNTAX)
        .parse("R'a b c'x")
        .unwrap();
    assert_eq!(tree.root().to_string(), "abc");
    assert!(tree.flags().contains(Flags::EXTENDED));

    // Without the prefix, `R` is a literal.
    let tree = Parser::new().parse("Rab").unwrap();
    assert!(!tree.is_raw());
    assert_eq!(tree.root().to_string(), "Rab");
}

#[test]
fn extended_mode() {
    assert_parse!(Flags::EXTENDED, "a b # comment\n c", "abc");

    let tree = Parser::new().parse("(?x) a b").unwrap();
    assert_eq!(tree.root().to_string(), "(?x)ab");

    // The option is scoped to the group.
    let tree = Parser::new().parse("(?x: a b ) c").unwrap();
    assert_eq!(tree.root().to_string(), "(?x:ab)\\ c");

    // Unscoped options last until the end of the enclosing group.
    let tree = Parser::new().parse("((?x) a ) b").unwrap();
    assert_eq!(tree.root().to_string(), "((?x)a)\\ b");

    // And can be turned off again.
    let tree = Parser::new().flags(Flags::EXTENDED).parse("a (?-x) b").unwrap();
    assert_eq!(tree.root().to_string(), "a(?-x)\\ b");
}

#[test]
fn syntax_errors() {
    assert_parse_error!("a)", ErrorKind::Syntax, Some(1));
    assert_parse_error!("(a", ErrorKind::Syntax, Some(0));
    assert_parse_error!("x(?:a(b)", ErrorKind::Syntax, Some(1));
    assert_parse_error!("*a", ErrorKind::Syntax, Some(0));
    assert_parse_error!("a|+", ErrorKind::Syntax, Some(2));
    assert_parse_error!("a**", ErrorKind::Syntax, Some(2));
    assert_parse_error!("a{2}{3}", ErrorKind::Syntax, Some(4));
    assert_parse_error!("(*FAIL)*", ErrorKind::Syntax, Some(7));
    assert_parse_error!("(?#x)+", ErrorKind::Syntax, Some(5));
    assert_parse_error!("(a)(?(1)b|c|d)", ErrorKind::Syntax, Some(3));
}

#[test]
fn depth_limit() {
    let err = Parser::new().max_depth(3).parse("((((a))))").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LimitExceeded);

    assert!(Parser::new().max_depth(4).parse("((((a))))").is_ok());

    let tree = Parser::new().parse("((a))*").unwrap();
    let err = Validator::new().max_depth(2).validate(&tree).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LimitExceeded);
    assert!(Validator::new().max_depth(3).validate(&tree).is_ok());
}

#[test]
fn error_recovery() {
    let parser = Parser::new().flags(Flags::ERROR_RECOVERY);

    let tree = parser.parse("a)b").unwrap();
    assert_eq!(tree.root().to_string(), "a(*FAIL)b");
    assert_eq!(tree.recovered_errors().len(), 1);
    assert_eq!(tree.recovered_errors()[0].position(), Some(1));

    let tree = parser.parse("a(b").unwrap();
    assert_eq!(tree.root().to_string(), "a(b)");
    assert_eq!(tree.recovered_errors().len(), 1);

    let tree = parser.parse("*a[b").unwrap();
    assert_eq!(tree.recovered_errors().len(), 2);
    assert!(matches!(tree.root(), Ast::Concat(items) if items[0] == Ast::Invalid));

    // Without errors there is nothing to report.
    let tree = parser.parse("abc").unwrap();
    assert!(tree.recovered_errors().is_empty());
}

#[test]
fn validation() {
    assert!(crate::re::parse("(a)\\1(?P<x>b)\\k<x>", Flags::empty()).is_ok());

    assert_invalid!("(a)\\2", ErrorKind::Syntax);
    assert_invalid!("\\k<x>(?P<y>a)", ErrorKind::Syntax);
    assert_invalid!("\\b+", ErrorKind::Syntax);
    assert_invalid!("(?:^)*", ErrorKind::Syntax);
    assert_invalid!("(?=a){2}", ErrorKind::Syntax);
    assert_invalid!("(?P<1a>x)", ErrorKind::Syntax);
    assert_invalid!("(?P<a-b>x)", ErrorKind::Syntax);
    assert_invalid!("(?P<a>x)(?P<a>y)", ErrorKind::Syntax);
    assert_invalid!("(?q)a", ErrorKind::Syntax);
    assert_invalid!("(?(2)a|b)(c)", ErrorKind::Syntax);
    assert_invalid!("(?(<n>)a)", ErrorKind::Syntax);

    // Capturing groups around assertions can be repeated.
    assert!(crate::re::parse("(\\b)+", Flags::empty()).is_ok());
}

#[test]
fn class_errors_come_from_the_lexer() {
    let err = Parser::new().parse("a[]").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Syntax);

    let err = Parser::new().parse("a[b").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Syntax);

    let err = Parser::new().parse("a[[:bogus:]]").unwrap_err();
    assert_eq!(err.position(), Some(2));
}

use pretty_assertions::assert_eq;

use crate::dsl::TestRunner;
use crate::errors::ErrorKind;

const SOURCE: &str = r#"
# Dates and words.
@pattern DATE = "(\d{4})-(\d{2})-(\d{2})"
@test_case { input = "due 2024-03-15", match_groups = ["2024", "03", "15"] }
@test_case { input = "due 15/03/2024", expect_match = false }
@test_case { input = "2024-03-15", match_groups = ["2024", "3", "15"] }

@pattern GREETING = "hello"
@flags = [CASE_INSENSITIVE]
@test_case { input = "HeLLo there" }
@test_case { input = "bye", expect_match = true }
@test_case { input = "1999-12-31", pattern = DATE }
"#;

#[test]
fn run() {
    let _ = env_logger::builder().is_test(true).try_init();

    let runner = TestRunner::from_source(SOURCE).unwrap();
    let report = runner.run();

    assert_eq!(report.total(), 6);
    assert_eq!(report.passed(), 4);
    assert_eq!(report.failed(), 2);
    assert!(!report.all_passed());

    let results = report.results();

    assert_eq!(results[0].pattern_name, "DATE");
    assert!(results[0].passed);
    assert!(results[0].actual_match);
    assert_eq!(results[0].actual_groups, vec!["2024", "03", "15"]);

    assert!(results[1].passed);
    assert!(!results[1].actual_match);

    // Groups don't match.
    assert!(!results[2].passed);
    assert!(results[2].actual_match);
    assert_eq!(results[2].expected_groups, vec!["2024", "3", "15"]);

    assert_eq!(results[3].pattern_name, "GREETING");
    assert!(results[3].passed);

    // Expected a match that doesn't happen.
    assert!(!results[4].passed);
    assert!(!results[4].actual_match);

    assert_eq!(results[5].pattern_name, "DATE");
    assert!(results[5].passed);
}

#[test]
fn report_listing() {
    let report = TestRunner::from_source(SOURCE).unwrap().run();

    assert_eq!(
        report.to_string(),
        r#"[ FAIL ] DATE: "2024-03-15"
    expected groups ["2024", "3", "15"], got ["2024", "03", "15"]
[ FAIL ] GREETING: "bye"
    expected a match, got no match
6 test(s), 4 passed, 2 failed."#
    );

    let verbose = report.display(true).to_string();
    assert_eq!(verbose.lines().count(), 9);
    assert!(verbose.starts_with(r#"[ PASS ] DATE: "due 2024-03-15""#));
    assert_eq!(format!("{:#}", report), verbose);
}

#[test]
fn compile_errors() {
    let runner = TestRunner::from_source(
        r#"
@pattern BROKEN = "(unclosed"
@test_case { input = "unclosed" }
@pattern UNKNOWN_FLAG = "a"
@flags = [NOT_A_FLAG]
@test_case { input = "a" }
@pattern OK = "a"
@test_case { input = "a" }
"#,
    )
    .unwrap();

    assert!(runner.pattern(0).unwrap().is_err());
    assert_eq!(
        runner.pattern(1).unwrap().as_ref().unwrap_err().kind(),
        ErrorKind::InvalidParameter
    );
    assert!(runner.pattern(2).unwrap().is_ok());

    let report = runner.run();
    assert_eq!(report.passed(), 1);

    let results = report.results();
    assert!(results[0].error.is_some());
    assert!(!results[0].passed);
    assert!(results[1].error.is_some());
    assert!(results[2].error.is_none());

    assert!(report.to_string().starts_with("[ ERROR ] BROKEN: \"unclosed\"\n"));
}

#[test]
fn flags_by_name() {
    let report = TestRunner::from_source(
        r#"
@pattern LINES = "^b$"
@flags = [MULTILINE]
@test_case { input = "a\nb\nc" }
@pattern DOTS = "a.c"
@flags = [DOTALL]
@test_case { input = "a\nc" }
@pattern PLAIN = "a.c"
@test_case { input = "a\nc", expect_match = false }
"#,
    )
    .unwrap()
    .run();

    assert!(report.all_passed(), "{:#}", report);
}

#[test]
fn syntax_errors() {
    let err = TestRunner::from_source("@flags = [OPTIMIZE]").err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Syntax);
    assert_eq!(err.position(), Some(0));
}

#[test]
fn from_file() {
    let path = std::env::temp_dir().join(format!("rift-dsl-{}.rift", std::process::id()));
    std::fs::write(&path, SOURCE).unwrap();

    let runner = TestRunner::from_file(&path).unwrap();
    assert_eq!(runner.file().pattern_count(), 2);
    assert_eq!(runner.run().total(), 6);

    std::fs::remove_file(&path).unwrap();

    assert!(TestRunner::from_file(&path).is_err());
}

/*! Runs the test cases of `.rift` files.

A `.rift` file declares patterns and test cases for them (see
[`rift_parser`] for the syntax). [`TestRunner`] compiles every pattern with
the flags listed in its `@flags` directives, and checks each test case
against its pattern.

```
# use rift::dsl::TestRunner;
let runner = TestRunner::from_source(r#"
@pattern NUMBER = "(\d+)\.(\d+)"
@test_case { input = "pi is 3.14", match_groups = ["3", "14"] }
@test_case { input = "no numbers", expect_match = false }
"#).unwrap();

let report = runner.run();
assert_eq!(report.total(), 2);
assert_eq!(report.failed(), 0);
```

A test case passes when the pattern matches somewhere in the input if
`expect_match` is true, and doesn't match anywhere if it is false. When
`match_groups` is given, the text captured by the groups of the first match
must be equal to it, groups that didn't participate in the match capture
the empty string.
*/

use std::fmt::{Display, Formatter};
use std::path::Path;

use log::{debug, info};
use rift_parser::{Parser, RiftFile};

use crate::config::EngineConfig;
use crate::errors::Error;
use crate::flags::Flags;
use crate::pattern::Pattern;
use crate::runtime::MatcherContext;

#[cfg(test)]
mod tests;

/// Compiles the patterns of a `.rift` file and runs its test cases.
pub struct TestRunner {
    file: RiftFile,
    patterns: Vec<Result<Pattern, Error>>,
}

impl TestRunner {
    /// Creates a runner for an already parsed file, compiling its patterns
    /// with the default configuration.
    pub fn new(file: RiftFile) -> Self {
        Self::with_config(file, &EngineConfig::default())
    }

    /// Creates a runner for an already parsed file, compiling its patterns
    /// with the given configuration.
    ///
    /// Patterns that fail to compile don't make this function fail, the
    /// test cases of those patterns fail instead.
    pub fn with_config(file: RiftFile, config: &EngineConfig) -> Self {
        let patterns = file
            .patterns()
            .map(|decl| {
                let flags = parse_flags(&decl.flags)?;
                Pattern::with_config(&decl.source, flags, config)
            })
            .collect::<Vec<_>>();

        debug!(
            "compiled {} of {} patterns",
            patterns.iter().filter(|p| p.is_ok()).count(),
            patterns.len()
        );

        Self { file, patterns }
    }

    /// Parses `.rift` source code and creates a runner for it.
    pub fn from_source(source: &str) -> Result<Self, Error> {
        Ok(Self::new(rift_parser::parse(source)?))
    }

    /// Reads and parses a `.rift` file and creates a runner for it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let file = Parser::new(&source).origin(&path.display().to_string()).parse()?;
        Ok(Self::new(file))
    }

    /// The parsed file.
    pub fn file(&self) -> &RiftFile {
        &self.file
    }

    /// Returns the compiled pattern at `index`, or the error that
    /// prevented compiling it.
    pub fn pattern(&self, index: usize) -> Option<&Result<Pattern, Error>> {
        self.patterns.get(index)
    }

    /// Runs every test case, in declaration order.
    pub fn run(&self) -> TestReport {
        let results: Vec<TestResult> = self
            .file
            .test_cases()
            .map(|test_case| self.run_one(test_case))
            .collect();

        let report = TestReport { results };

        info!(
            "ran {} test cases: {} passed, {} failed",
            report.total(),
            report.passed(),
            report.failed()
        );

        report
    }

    fn run_one(&self, test_case: &rift_parser::TestCase) -> TestResult {
        let pattern_name = self
            .file
            .pattern(test_case.pattern)
            .map(|decl| decl.name.clone())
            .unwrap_or_default();

        let mut result = TestResult {
            pattern_name,
            input: test_case.input.clone(),
            expected_match: test_case.expect_match,
            actual_match: false,
            passed: false,
            expected_groups: test_case.match_groups.clone(),
            actual_groups: Vec::new(),
            error: None,
        };

        let pattern = match self.patterns.get(test_case.pattern) {
            Some(Ok(pattern)) => pattern,
            Some(Err(err)) => {
                result.error = Some(err.clone());
                return result;
            }
            None => {
                result.error = Some(Error::internal("test case without pattern"));
                return result;
            }
        };

        let mut ctx = MatcherContext::with_input(&test_case.input);

        match ctx.find_next(pattern) {
            Ok(Some(m)) => {
                result.actual_match = true;
                result.actual_groups = m
                    .groups()
                    .iter()
                    .map(|g| g.as_str(&test_case.input).unwrap_or_default().to_string())
                    .collect();
            }
            Ok(None) => {}
            Err(err) => {
                result.error = Some(err);
                return result;
            }
        }

        result.passed = result.actual_match == result.expected_match
            && (!result.actual_match
                || result.expected_groups.is_empty()
                || result.expected_groups == result.actual_groups);

        result
    }
}

/// Converts flag names, as written in `@flags` directives, into [`Flags`].
fn parse_flags<S: AsRef<str>>(names: &[S]) -> Result<Flags, Error> {
    names.iter().try_fold(Flags::empty(), |flags, name| {
        let name = name.as_ref();
        Flags::from_dsl_name(name)
            .map(|flag| flags | flag)
            .ok_or_else(|| Error::invalid_parameter(format!("unknown flag `{}`", name)))
    })
}

/// Outcome of a single test case.
#[derive(Debug, Clone, PartialEq)]
pub struct TestResult {
    /// Name of the pattern the test case applies to.
    pub pattern_name: String,
    /// Input the pattern was matched against.
    pub input: String,
    /// Whether the pattern was expected to match.
    pub expected_match: bool,
    /// Whether the pattern matched.
    pub actual_match: bool,
    /// Whether the test case passed.
    pub passed: bool,
    /// Expected text of the capture groups. Empty if not checked.
    pub expected_groups: Vec<String>,
    /// Text captured by the groups of the first match.
    pub actual_groups: Vec<String>,
    /// Error that prevented running the test case, if any. Test cases
    /// with errors never pass.
    pub error: Option<Error>,
}

impl Display for TestResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let status = match (&self.error, self.passed) {
            (Some(_), _) => "ERROR",
            (None, true) => "PASS",
            (None, false) => "FAIL",
        };

        write!(f, "[ {} ] {}: {:?}", status, self.pattern_name, self.input)?;

        if let Some(err) = &self.error {
            return write!(f, "\n    {}", err);
        }

        if self.passed {
            return Ok(());
        }

        if self.expected_match != self.actual_match {
            write!(
                f,
                "\n    expected {}, got {}",
                if self.expected_match { "a match" } else { "no match" },
                if self.actual_match { "a match" } else { "no match" },
            )
        } else {
            write!(
                f,
                "\n    expected groups {:?}, got {:?}",
                self.expected_groups, self.actual_groups
            )
        }
    }
}

/// Results of running all the test cases of a file.
#[derive(Debug, Clone, Default)]
pub struct TestReport {
    results: Vec<TestResult>,
}

impl TestReport {
    /// Number of test cases.
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Number of test cases that passed.
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    /// Number of test cases that failed.
    pub fn failed(&self) -> usize {
        self.total() - self.passed()
    }

    /// True if every test case passed.
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    /// Results of the test cases, in declaration order.
    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    /// Returns a printable listing of the report. When `verbose` is false
    /// passing test cases are omitted.
    pub fn display(&self, verbose: bool) -> ReportDisplay<'_> {
        ReportDisplay { report: self, verbose }
    }
}

impl Display for TestReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.display(f.alternate()).fmt(f)
    }
}

/// Printable listing of a [`TestReport`], see [`TestReport::display`].
pub struct ReportDisplay<'a> {
    report: &'a TestReport,
    verbose: bool,
}

impl Display for ReportDisplay<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for result in &self.report.results {
            if self.verbose || !result.passed {
                writeln!(f, "{}", result)?;
            }
        }
        write!(
            f,
            "{} test(s), {} passed, {} failed.",
            self.report.total(),
            self.report.passed(),
            self.report.failed()
        )
    }
}

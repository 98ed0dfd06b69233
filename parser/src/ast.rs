//! Types produced by parsing a `.rift` file.

use crate::Span;

/// A pattern declared with `@pattern NAME = "source"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternDecl {
    /// Name of the pattern.
    pub name: String,
    /// Source of the pattern. Escape sequences are kept as written, except
    /// for escaped quotes that match the delimiter, which are unescaped.
    pub source: String,
    /// Names of the flags set with `@flags`, in declaration order.
    pub flags: Vec<String>,
    /// Span of the `@pattern` directive.
    pub span: Span,
}

/// A test case declared with `@test_case { ... }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    /// Input the pattern is matched against. Escape sequences are decoded.
    pub input: String,
    /// Whether the pattern is expected to match `input`. Defaults to true.
    pub expect_match: bool,
    /// Expected text of the capture groups, starting with group 1.
    pub match_groups: Vec<String>,
    /// Index of the pattern this test case applies to.
    pub pattern: usize,
    /// Span of the `@test_case` directive.
    pub span: Span,
}

/// A parsed `.rift` file.
///
/// Patterns and test cases are kept in declaration order and queried by
/// index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RiftFile {
    pub(crate) patterns: Vec<PatternDecl>,
    pub(crate) test_cases: Vec<TestCase>,
}

impl RiftFile {
    /// Number of patterns in the file.
    #[inline]
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Number of test cases in the file.
    #[inline]
    pub fn test_case_count(&self) -> usize {
        self.test_cases.len()
    }

    /// Returns the pattern at `index`.
    pub fn pattern(&self, index: usize) -> Option<&PatternDecl> {
        self.patterns.get(index)
    }

    /// Returns the test case at `index`.
    pub fn test_case(&self, index: usize) -> Option<&TestCase> {
        self.test_cases.get(index)
    }

    /// Returns the pattern with the given name, and its index.
    pub fn pattern_by_name(&self, name: &str) -> Option<(usize, &PatternDecl)> {
        self.patterns.iter().enumerate().find(|(_, p)| p.name == name)
    }

    /// All the patterns, in declaration order.
    pub fn patterns(&self) -> impl ExactSizeIterator<Item = &PatternDecl> {
        self.patterns.iter()
    }

    /// All the test cases, in declaration order.
    pub fn test_cases(&self) -> impl ExactSizeIterator<Item = &TestCase> {
        self.test_cases.iter()
    }

    /// Test cases that apply to the pattern at `index`.
    pub fn test_cases_for(&self, index: usize) -> impl Iterator<Item = &TestCase> {
        self.test_cases.iter().filter(move |t| t.pattern == index)
    }
}

use annotate_snippets::{Level, Renderer, Snippet};
use thiserror::Error;

use crate::Span;

/// Kinds of errors found while parsing a `.rift` file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    #[error("unexpected {found}, expected {expected}")]
    UnexpectedToken { found: String, expected: String },

    #[error("unexpected end of file, expected {expected}")]
    UnexpectedEof { expected: String },

    #[error("unterminated string")]
    UnterminatedString,

    #[error("invalid escape sequence `{0}`")]
    InvalidEscape(String),

    #[error("unknown directive `{0}`")]
    UnknownDirective(String),

    #[error("`@flags` before any `@pattern`")]
    FlagsWithoutPattern,

    #[error("test case before any `@pattern`")]
    TestCaseWithoutPattern,

    #[error("unknown pattern `{0}`")]
    UnknownPattern(String),

    #[error("duplicate pattern `{0}`")]
    DuplicatePattern(String),

    #[error("unknown test case field `{0}`")]
    UnknownField(String),

    #[error("duplicate test case field `{0}`")]
    DuplicateField(String),

    #[error("test case without `input`")]
    MissingInput,

    #[error("source file is too large")]
    SourceTooLarge,
}

impl ErrorKind {
    /// Text of the label attached to the offending span in reports.
    fn label(&self) -> &'static str {
        match self {
            ErrorKind::UnexpectedToken { .. } => "unexpected token",
            ErrorKind::UnexpectedEof { .. } => "file ends here",
            ErrorKind::UnterminatedString => "missing closing quote",
            ErrorKind::InvalidEscape(_) => "invalid escape",
            ErrorKind::UnknownDirective(_) => "unknown directive",
            ErrorKind::FlagsWithoutPattern => "no pattern to apply these flags to",
            ErrorKind::TestCaseWithoutPattern => "no pattern to test",
            ErrorKind::UnknownPattern(_) => "pattern not declared",
            ErrorKind::DuplicatePattern(_) => "pattern already declared",
            ErrorKind::UnknownField(_) => "unknown field",
            ErrorKind::DuplicateField(_) => "field already set",
            ErrorKind::MissingInput => "this test case",
            ErrorKind::SourceTooLarge => "",
        }
    }

    /// Optional note shown at the bottom of reports.
    fn note(&self) -> Option<&'static str> {
        match self {
            ErrorKind::InvalidEscape(_) => Some(
                r#"valid escapes are \n, \r, \t, \0, \\, \', \", \xHH and \u{H...}"#,
            ),
            ErrorKind::UnknownField(_) => {
                Some("valid fields are `input`, `expect_match`, `match_groups` and `pattern`")
            }
            ErrorKind::FlagsWithoutPattern | ErrorKind::TestCaseWithoutPattern => {
                Some("declare a pattern first with `@pattern NAME = \"...\"`")
            }
            _ => None,
        }
    }
}

/// An error found while parsing a `.rift` file.
///
/// The error knows where it happened, both as a byte [`Span`] and as a
/// line and column (both starting at 1, columns counted in characters).
/// [`Error::report`] returns a detailed, human-readable, description of
/// the error that includes the offending source code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}, column {column}: {kind}")]
pub struct Error {
    kind: ErrorKind,
    span: Span,
    line: usize,
    column: usize,
    report: String,
}

impl Error {
    pub(crate) fn new(
        kind: ErrorKind,
        span: Span,
        source: &str,
        origin: Option<&str>,
    ) -> Self {
        let (line, column) = line_and_column(source, span.start());
        let report = render_report(&kind, &span, source, origin);
        Self { kind, span, line, column, report }
    }

    /// Kind of error.
    #[inline]
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Location of the error in the source code.
    #[inline]
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Line where the error starts.
    #[inline]
    pub fn line(&self) -> usize {
        self.line
    }

    /// Column where the error starts.
    #[inline]
    pub fn column(&self) -> usize {
        self.column
    }

    /// Detailed report of the error, including a snippet of the source
    /// code.
    #[inline]
    pub fn report(&self) -> &str {
        &self.report
    }
}

/// Converts a byte offset into a line and column, both starting at 1.
pub(crate) fn line_and_column(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let before = source.get(..offset).unwrap_or(source);
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}

fn render_report(
    kind: &ErrorKind,
    span: &Span,
    source: &str,
    origin: Option<&str>,
) -> String {
    let title = kind.to_string();
    let level = Level::Error;

    let mut snippet = Snippet::source(source).fold(true);

    if let Some(origin) = origin {
        snippet = snippet.origin(origin);
    }

    let range = span.start().min(source.len())..span.end().min(source.len());
    snippet = snippet.annotation(level.span(range).label(kind.label()));

    let mut message = level.title(title.as_str()).snippet(snippet);

    if let Some(note) = kind.note() {
        message = message.footer(Level::Note.title(note));
    }

    let rendered = Renderer::plain().render(message).to_string();
    rendered
}

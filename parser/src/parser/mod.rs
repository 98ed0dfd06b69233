/*! Implements the `.rift` parser.

The parser is a small recursive descent parser that consumes the tokens
produced by the tokenizer, ignoring trivia, and builds a [`RiftFile`].
Parsing stops at the first error.
*/

use std::mem;

use crate::ast::{PatternDecl, RiftFile, TestCase};
use crate::errors::{Error, ErrorKind};
use crate::tokenizer::{Token, Tokenizer};
use crate::Span;


/// Parses `.rift` source code.
///
/// ```
/// # use rift_parser::Parser;
/// let file = Parser::new(r#"@pattern A = "a+""#)
///     .origin("a.rift")
///     .parse()
///     .unwrap();
///
/// assert_eq!(file.pattern_count(), 1);
/// ```
pub struct Parser<'src> {
    source: &'src str,
    origin: Option<String>,
}

impl<'src> Parser<'src> {
    /// Creates a new parser for the given source code.
    pub fn new(source: &'src str) -> Self {
        Self { source, origin: None }
    }

    /// Sets a string that describes the origin of the source code, usually
    /// a file path. It is shown in error reports.
    pub fn origin(mut self, origin: &str) -> Self {
        self.origin = Some(origin.to_string());
        self
    }

    /// Parses the source code.
    pub fn parse(self) -> Result<RiftFile, Error> {
        if self.source.len() >= Span::MAX {
            return Err(Error::new(
                ErrorKind::SourceTooLarge,
                Span(0..0),
                "",
                self.origin.as_deref(),
            ));
        }

        let tokens: Vec<Token> =
            Tokenizer::new(self.source).filter(|t| !t.is_trivia()).collect();

        ParserImpl {
            source: self.source,
            origin: self.origin.as_deref(),
            tokens,
            pos: 0,
            file: RiftFile::default(),
            explicit: Vec::new(),
        }
        .parse()
    }
}

/// A test case that names its pattern with `pattern = NAME`. Names are
/// resolved once the whole file is parsed, so test cases can refer to
/// patterns declared after them.
struct ExplicitPattern {
    test_case: usize,
    name: String,
    span: Span,
}

struct ParserImpl<'src, 'o> {
    source: &'src str,
    origin: Option<&'o str>,
    tokens: Vec<Token>,
    pos: usize,
    file: RiftFile,
    explicit: Vec<ExplicitPattern>,
}

impl<'src> ParserImpl<'src, '_> {
    fn parse(mut self) -> Result<RiftFile, Error> {
        while let Some(token) = self.bump() {
            match token {
                Token::PATTERN_KW(span) => self.pattern(span)?,
                Token::FLAGS_KW(span) => self.flags(span)?,
                Token::TEST_CASE_KW(span) => self.test_case(span)?,
                Token::DIRECTIVE(span) => {
                    let name = self.text(&span).to_string();
                    return Err(self.error(ErrorKind::UnknownDirective(name), span));
                }
                token => return Err(self.unexpected(token, "directive")),
            }
        }

        for explicit in mem::take(&mut self.explicit) {
            let Some((index, _)) = self.file.pattern_by_name(&explicit.name) else {
                return Err(
                    self.error(ErrorKind::UnknownPattern(explicit.name), explicit.span)
                );
            };
            if let Some(test_case) = self.file.test_cases.get_mut(explicit.test_case) {
                test_case.pattern = index;
            }
        }

        Ok(self.file)
    }

    /// `@pattern NAME = "source"`
    fn pattern(&mut self, directive: Span) -> Result<(), Error> {
        let name_span = self.expect(Token::IDENT(Span::default()))?;
        let name = self.text(&name_span).to_string();

        if self.file.pattern_by_name(&name).is_some() {
            return Err(self.error(ErrorKind::DuplicatePattern(name), name_span));
        }

        self.expect(Token::EQUAL(Span::default()))?;
        let source_span = self.expect(Token::STRING_LIT(Span::default()))?;
        let source = raw_string(self.text(&source_span));

        self.file.patterns.push(PatternDecl {
            name,
            source,
            flags: Vec::new(),
            span: directive.combine(&source_span),
        });

        Ok(())
    }

    /// `@flags = [FLAG, ...]`
    fn flags(&mut self, directive: Span) -> Result<(), Error> {
        if self.file.patterns.is_empty() {
            return Err(self.error(ErrorKind::FlagsWithoutPattern, directive));
        }

        self.expect(Token::EQUAL(Span::default()))?;
        self.expect(Token::L_BRACKET(Span::default()))?;

        let mut flags = Vec::new();

        loop {
            match self.bump() {
                Some(Token::R_BRACKET(_)) => break,
                Some(Token::IDENT(span)) => {
                    flags.push(self.text(&span).to_string());
                    if !self.list_separator()? {
                        self.expect(Token::R_BRACKET(Span::default()))?;
                        break;
                    }
                }
                Some(token) => return Err(self.unexpected(token, "flag name or `]`")),
                None => return Err(self.eof("flag name or `]`")),
            }
        }

        if let Some(pattern) = self.file.patterns.last_mut() {
            pattern.flags.extend(flags);
        }

        Ok(())
    }

    /// `@test_case { input = "...", expect_match = true, ... }`
    fn test_case(&mut self, directive: Span) -> Result<(), Error> {
        self.expect(Token::L_BRACE(Span::default()))?;

        let mut input = None;
        let mut expect_match = None;
        let mut match_groups = None;
        let mut explicit = None;

        let end = loop {
            let field_span = match self.bump() {
                Some(Token::R_BRACE(span)) => break span,
                Some(Token::IDENT(span)) => span,
                Some(token) => return Err(self.unexpected(token, "field name or `}`")),
                None => return Err(self.eof("field name or `}`")),
            };

            let field = self.text(&field_span);
            let already_set = match field {
                "input" => input.is_some(),
                "expect_match" => expect_match.is_some(),
                "match_groups" => match_groups.is_some(),
                "pattern" => explicit.is_some(),
                _ => {
                    let field = field.to_string();
                    return Err(self.error(ErrorKind::UnknownField(field), field_span));
                }
            };

            if already_set {
                let field = field.to_string();
                return Err(self.error(ErrorKind::DuplicateField(field), field_span));
            }

            self.expect(Token::EQUAL(Span::default()))?;

            match field {
                "input" => {
                    let span = self.expect(Token::STRING_LIT(Span::default()))?;
                    input = Some(self.unescape(&span)?);
                }
                "expect_match" => {
                    expect_match = Some(match self.bump() {
                        Some(Token::TRUE_KW(_)) => true,
                        Some(Token::FALSE_KW(_)) => false,
                        Some(token) => {
                            return Err(self.unexpected(token, "`true` or `false`"))
                        }
                        None => return Err(self.eof("`true` or `false`")),
                    });
                }
                "match_groups" => {
                    match_groups = Some(self.string_list()?);
                }
                _ => {
                    let span = self.expect(Token::IDENT(Span::default()))?;
                    explicit = Some((self.text(&span).to_string(), span));
                }
            }

            if !self.list_separator()? {
                break self.expect(Token::R_BRACE(Span::default()))?;
            }
        };

        let span = directive.combine(&end);

        let Some(input) = input else {
            return Err(self.error(ErrorKind::MissingInput, span));
        };

        let pattern = match explicit {
            Some((name, name_span)) => {
                self.explicit.push(ExplicitPattern {
                    test_case: self.file.test_cases.len(),
                    name,
                    span: name_span,
                });
                0
            }
            None => match self.file.patterns.len().checked_sub(1) {
                Some(last) => last,
                None => {
                    return Err(self.error(ErrorKind::TestCaseWithoutPattern, directive))
                }
            },
        };

        self.file.test_cases.push(TestCase {
            input,
            expect_match: expect_match.unwrap_or(true),
            match_groups: match_groups.unwrap_or_default(),
            pattern,
            span,
        });

        Ok(())
    }

    /// `["...", ...]`
    fn string_list(&mut self) -> Result<Vec<String>, Error> {
        self.expect(Token::L_BRACKET(Span::default()))?;

        let mut strings = Vec::new();

        loop {
            match self.bump() {
                Some(Token::R_BRACKET(_)) => break,
                Some(Token::STRING_LIT(span)) => {
                    strings.push(self.unescape(&span)?);
                    if !self.list_separator()? {
                        self.expect(Token::R_BRACKET(Span::default()))?;
                        break;
                    }
                }
                Some(token) => return Err(self.unexpected(token, "string or `]`")),
                None => return Err(self.eof("string or `]`")),
            }
        }

        Ok(strings)
    }
}

impl<'src> ParserImpl<'src, '_> {
    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    /// Consumes a token of the same kind as `expected`, and returns its
    /// span. The span inside `expected` is ignored.
    fn expect(&mut self, expected: Token) -> Result<Span, Error> {
        match self.bump() {
            Some(token) if mem::discriminant(&token) == mem::discriminant(&expected) => {
                Ok(token.span())
            }
            Some(token) => Err(self.unexpected(token, expected.description())),
            None => Err(self.eof(expected.description())),
        }
    }

    /// Consumes the comma that follows an item in a list, if any. Returns
    /// false when there's no comma, which means that the list must end.
    fn list_separator(&mut self) -> Result<bool, Error> {
        match self.peek() {
            Some(Token::COMMA(_)) => {
                self.pos += 1;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(self.eof("`,`")),
        }
    }

    fn text(&self, span: &Span) -> &'src str {
        self.source.get(span.range()).unwrap_or_default()
    }

    fn error(&self, kind: ErrorKind, span: Span) -> Error {
        Error::new(kind, span, self.source, self.origin)
    }

    fn unexpected(&self, token: Token, expected: &str) -> Error {
        let span = token.span();
        match token {
            Token::UNKNOWN(_) if self.text(&span).starts_with(['"', '\'']) => {
                self.error(ErrorKind::UnterminatedString, span)
            }
            Token::UNKNOWN(_) | Token::DIRECTIVE(_) => {
                let found = format!("`{}`", self.text(&span));
                self.error(
                    ErrorKind::UnexpectedToken { found, expected: expected.to_string() },
                    span,
                )
            }
            token => self.error(
                ErrorKind::UnexpectedToken {
                    found: token.description().to_string(),
                    expected: expected.to_string(),
                },
                span,
            ),
        }
    }

    fn eof(&self, expected: &str) -> Error {
        let end = self.source.len() as u32;
        self.error(
            ErrorKind::UnexpectedEof { expected: expected.to_string() },
            Span(end..end),
        )
    }

    /// Decodes the escape sequences in a string literal.
    fn unescape(&self, span: &Span) -> Result<String, Error> {
        let literal = self.text(span);
        let content = &literal[1..literal.len() - 1];
        let mut result = String::with_capacity(content.len());
        let mut chars = content.char_indices();

        while let Some((i, c)) = chars.next() {
            if c != '\\' {
                result.push(c);
                continue;
            }

            let decoded = match chars.next() {
                Some((_, 'n')) => Some('\n'),
                Some((_, 'r')) => Some('\r'),
                Some((_, 't')) => Some('\t'),
                Some((_, '0')) => Some('\0'),
                Some((_, '\\')) => Some('\\'),
                Some((_, '\'')) => Some('\''),
                Some((_, '"')) => Some('"'),
                Some((_, 'x')) => {
                    let hex = content.get(i + 2..i + 4);
                    let value = hex
                        .filter(|h| h.chars().all(|c| c.is_ascii_hexdigit()))
                        .and_then(|h| u32::from_str_radix(h, 16).ok());
                    if value.is_some() {
                        chars.nth(1);
                    }
                    value.and_then(char::from_u32)
                }
                Some((_, 'u')) => {
                    let rest = &content[i + 2..];
                    match rest.strip_prefix('{').and_then(|r| r.split_once('}')) {
                        Some((hex, _))
                            if (1..=6).contains(&hex.len())
                                && hex.chars().all(|c| c.is_ascii_hexdigit()) =>
                        {
                            let value = u32::from_str_radix(hex, 16)
                                .ok()
                                .and_then(char::from_u32);
                            if value.is_some() {
                                // Skip `{`, the digits and `}`.
                                chars.nth(hex.len() + 1);
                            }
                            value
                        }
                        _ => None,
                    }
                }
                _ => None,
            };

            match decoded {
                Some(c) => result.push(c),
                None => {
                    // `i` is relative to the content, which starts after
                    // the opening quote.
                    let start = span.start() + 1 + i;
                    let end = content[i + 1..]
                        .chars()
                        .next()
                        .map_or(start + 1, |c| start + 1 + c.len_utf8());
                    let escape = self.source.get(start..end).unwrap_or("\\").to_string();
                    return Err(self.error(
                        ErrorKind::InvalidEscape(escape),
                        Span(start as u32..end as u32),
                    ));
                }
            }
        }

        Ok(result)
    }
}

/// Returns the content of a string literal with escape sequences kept as
/// written, except for escaped delimiters. This is what pattern sources
/// need, as backslashes belong to the pattern syntax.
fn raw_string(literal: &str) -> String {
    let mut chars = literal.chars();
    let Some(quote) = chars.next() else {
        return String::new();
    };
    let content = &literal[quote.len_utf8()..literal.len() - quote.len_utf8()];
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some(next) if next == quote => result.push(quote),
            Some(next) => {
                result.push('\\');
                result.push(next);
            }
            None => result.push('\\'),
        }
    }

    result
}

/*! Tokenizer for regular expression patterns.

The lexer is pulled by the parser one token at a time, because some
constructs change how the rest of the pattern is tokenized: the `x` option
(either from the pattern flags or from an inline `(?x)`) makes the lexer skip
whitespace and `#` comments.

A pattern can also be written in the raw literal form `R'...'` or `R"..."`,
optionally followed by modifier letters. In that case the lexer emits
[`TokenKind::RiftPrefix`] and [`TokenKind::RiftQuoteStart`] first, then the
tokens of the body, and finally [`TokenKind::RiftQuoteEnd`] and
[`TokenKind::RiftFlags`].

Malformed input never stops the lexer. It produces a [`TokenKind::Error`]
token and resumes after the offending text, the parser decides whether that
is fatal.
*/

use std::ops::Range;

use crate::automaton::LookKind;
use crate::errors::{Error, ErrorKind};
use crate::flags::Flags;
use crate::re::class::{parse_escape, ClassSet, Escaped};

/// Modifier letters that may follow a raw literal.
pub const RAW_FLAG_CHARS: &[char] = &['i', 'm', 's', 'x', 'U', 'r'];

/// Zero-width assertions written as escapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assertion {
    /// `\A`
    StartOfInput,
    /// `\z`
    EndOfInput,
    /// `\Z`
    EndOfInputOrNewline,
    /// `\b`
    WordBoundary,
    /// `\B`
    NotWordBoundary,
}

/// Backtracking control verbs like `(*FAIL)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// `(*FAIL)` or `(*F)`
    Fail,
    /// `(*ACCEPT)`
    Accept,
    /// `(*COMMIT)`
    Commit,
}

impl Verb {
    /// Name of the verb as written in a pattern.
    pub fn name(self) -> &'static str {
        match self {
            Verb::Fail => "FAIL",
            Verb::Accept => "ACCEPT",
            Verb::Commit => "COMMIT",
        }
    }
}

/// Reference in the condition of a conditional group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CondRef {
    /// `(?(1)...)`
    Number(usize),
    /// `(?(<name>)...)` or `(?(name)...)`
    Name(String),
}

/// The different ways of opening a group with `(?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOpen {
    /// `(?:`
    NonCapturing,
    /// `(?P<name>`, `(?<name>` or `(?'name'`
    Named(String),
    /// `(?=`, `(?!`, `(?<=` or `(?<!`
    Look(LookKind),
    /// `(?>`
    Atomic,
    /// `(?im-sx)` when `scoped` is false, `(?im-sx:` when true.
    Options {
        /// Letters enabled.
        on: String,
        /// Letters disabled.
        off: String,
        /// The options only apply inside the group.
        scoped: bool,
    },
    /// `(?(1)`, `(?(<name>)`
    Condition(CondRef),
    /// `(?(?=`, `(?(?!`, `(?(?<=`, `(?(?<!`. The lookaround body follows.
    ConditionLook(LookKind),
}

/// Kinds of tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// A literal character, either written directly or escaped.
    Char(char),
    /// `\d` or, when negated, `\D`.
    DigitClass(bool),
    /// `\w` or, when negated, `\W`.
    WordClass(bool),
    /// `\s` or, when negated, `\S`.
    WhitespaceClass(bool),
    /// `\p{...}` or `\P{...}`, with the text of the escape.
    Property(String),
    /// A bracket expression, with its text including the brackets.
    Class(String),
    /// `.`
    Dot,
    /// `^`
    AnchorStart,
    /// `$`
    AnchorEnd,
    /// `\A`, `\z`, `\Z`, `\b`, `\B`
    Assertion(Assertion),
    /// `*`
    Star,
    /// `+`
    Plus,
    /// `?`
    Question,
    /// `|`
    Pipe,
    /// `(` opening a capturing group.
    LParen,
    /// `(?` followed by the group modifiers.
    GroupOpen(GroupOpen),
    /// `)`
    RParen,
    /// `{m}`, `{m,}` or `{m,n}`.
    Repeat {
        /// Minimum number of repetitions.
        min: u32,
        /// Maximum number of repetitions, `None` means unbounded.
        max: Option<u32>,
    },
    /// `\1` ... `\99`
    Backref(usize),
    /// `\k<name>` or `(?P=name)`
    NamedBackref(String),
    /// `(?#...)`
    Comment(String),
    /// `(*VERB)`
    Verb(Verb),
    /// The `R` that starts a raw literal.
    RiftPrefix,
    /// The opening quote of a raw literal.
    RiftQuoteStart(char),
    /// The closing quote of a raw literal.
    RiftQuoteEnd(char),
    /// Modifier letters after the closing quote.
    RiftFlags(String),
    /// End of the pattern.
    Eof,
    /// Malformed input.
    Error(Error),
}

/// A token and its location in the pattern, in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Kind of token.
    pub kind: TokenKind,
    /// Byte range in the source.
    pub span: Range<usize>,
}

/// Location of the parts of a raw literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLiteral {
    /// Quote character.
    pub quote: char,
    /// Range of the body, between the quotes.
    pub body: Range<usize>,
    /// Modifier letters after the closing quote.
    pub flags: String,
}

impl RawLiteral {
    /// Flags denoted by the modifier letters.
    pub fn flags(&self) -> Flags {
        // Only valid letters get past `find_raw_literal`.
        Flags::from_modifiers(&self.flags).unwrap_or_default()
    }
}

/// True if the source is written in the raw literal form.
pub fn is_raw_literal(source: &str) -> bool {
    source.starts_with("R'") || source.starts_with("R\"")
}

/// Locates the body and the trailing modifiers of a raw literal.
///
/// Returns `Ok(None)` if the source is not a raw literal. The body ends at
/// an unescaped quote of the same kind as the opening one, outside any
/// bracket expression and with all the parenthesis closed, which is only
/// followed by modifier letters. A literal opened with one kind of quote
/// and closed with the other one is rejected.
pub fn find_raw_literal(source: &str) -> Result<Option<RawLiteral>, Error> {
    if !is_raw_literal(source) {
        return Ok(None);
    }

    let quote = if source.as_bytes()[1] == b'\'' { '\'' } else { '"' };
    let mut depth = 0_i32;
    let mut in_class = false;
    let mut escaped = false;

    for (i, c) in source.char_indices().skip(2) {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '(' if !in_class => depth += 1,
            ')' if !in_class => depth -= 1,
            c if c == quote && !in_class && depth <= 0 => {
                let tail = &source[i + 1..];
                if tail.chars().all(|f| RAW_FLAG_CHARS.contains(&f)) {
                    return Ok(Some(RawLiteral {
                        quote,
                        body: 2..i,
                        flags: tail.to_string(),
                    }));
                }
            }
            _ => {}
        }
    }

    let other = if quote == '\'' { '"' } else { '\'' };
    let trimmed = source.trim_end_matches(|c| RAW_FLAG_CHARS.contains(&c));
    if trimmed.len() > 2 && trimmed.ends_with(other) {
        return Err(Error::syntax(
            format!(
                "raw literal opened with {} can't be closed with {}",
                quote, other
            ),
            trimmed.len() - 1,
        ));
    }

    Err(Error::syntax("unterminated raw literal", 1))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Prefix,
    QuoteStart,
    Body,
    QuoteEnd,
    Flags,
    Done,
}

/// Pattern tokenizer.
pub struct Lexer<'src> {
    source: &'src str,
    pos: usize,
    end: usize,
    extended: bool,
    strict: bool,
    raw: Option<RawLiteral>,
    phase: Phase,
}

impl<'src> Lexer<'src> {
    /// Creates a lexer for `source`.
    ///
    /// Only the EXTENDED and STRICT flags affect the lexer. When the source
    /// is a raw literal the modifiers after the closing quote are taken
    /// into account too.
    pub fn new(source: &'src str, flags: Flags) -> Self {
        let mut lexer = Self {
            source,
            pos: 0,
            end: source.len(),
            extended: flags.contains(Flags::EXTENDED),
            strict: flags.contains(Flags::STRICT),
            raw: None,
            phase: Phase::Body,
        };
        if is_raw_literal(source) {
            lexer.phase = Phase::Prefix;
        }
        lexer
    }

    /// Information about the raw literal, once the lexer went past the
    /// opening quote.
    pub fn raw_literal(&self) -> Option<&RawLiteral> {
        self.raw.as_ref()
    }

    /// True if whitespace and comments are being skipped.
    #[inline]
    pub fn extended(&self) -> bool {
        self.extended
    }

    /// Turns the skipping of whitespace and comments on or off. Affects
    /// the tokens that haven't been produced yet.
    #[inline]
    pub fn set_extended(&mut self, yes: bool) {
        self.extended = yes;
    }

    /// Produces the next token. After the end of the pattern it keeps
    /// returning [`TokenKind::Eof`].
    pub fn next_token(&mut self) -> Token {
        match self.phase {
            Phase::Prefix => {
                self.phase = Phase::QuoteStart;
                match find_raw_literal(self.source) {
                    Ok(raw) => {
                        if let Some(raw) = &raw {
                            self.end = raw.body.end;
                            if raw.flags.contains('x') {
                                self.extended = true;
                            }
                        }
                        self.raw = raw;
                        self.pos = 1;
                        self.token(TokenKind::RiftPrefix, 0..1)
                    }
                    Err(err) => {
                        self.phase = Phase::Done;
                        self.pos = self.source.len();
                        self.token(TokenKind::Error(err), 0..self.source.len())
                    }
                }
            }
            Phase::QuoteStart => {
                self.phase = Phase::Body;
                let quote = self.raw.as_ref().map_or('\'', |r| r.quote);
                self.pos = 2;
                self.token(TokenKind::RiftQuoteStart(quote), 1..2)
            }
            Phase::Body => {
                if let Some(token) = self.body_token() {
                    return token;
                }
                match &self.raw {
                    Some(raw) => {
                        self.phase = Phase::QuoteEnd;
                        let end = raw.body.end;
                        self.token(TokenKind::RiftQuoteEnd(raw.quote), end..end + 1)
                    }
                    None => {
                        self.phase = Phase::Done;
                        self.eof()
                    }
                }
            }
            Phase::QuoteEnd => {
                self.phase = Phase::Flags;
                match &self.raw {
                    Some(raw) if !raw.flags.is_empty() => {
                        let start = raw.body.end + 1;
                        let flags = raw.flags.clone();
                        self.token(
                            TokenKind::RiftFlags(flags),
                            start..self.source.len(),
                        )
                    }
                    _ => self.next_token(),
                }
            }
            Phase::Flags | Phase::Done => {
                self.phase = Phase::Done;
                self.eof()
            }
        }
    }

    /// Tokenizes the whole pattern. The last token is always
    /// [`TokenKind::Eof`].
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return tokens;
            }
        }
    }

    fn eof(&self) -> Token {
        let len = self.source.len();
        self.token(TokenKind::Eof, len..len)
    }

    fn token(&self, kind: TokenKind, span: Range<usize>) -> Token {
        Token { kind, span }
    }

    fn rest(&self) -> &'src str {
        &self.source[self.pos..self.end]
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => self.pos += c.len_utf8(),
                Some('#') => match self.rest().find('\n') {
                    Some(nl) => self.pos += nl + 1,
                    None => self.pos = self.end,
                },
                _ => return,
            }
        }
    }

    fn body_token(&mut self) -> Option<Token> {
        if self.extended {
            self.skip_whitespace_and_comments();
        }

        let start = self.pos;
        let c = self.peek_char()?;
        self.pos += c.len_utf8();

        let kind = match c {
            '.' => TokenKind::Dot,
            '^' => TokenKind::AnchorStart,
            '$' => TokenKind::AnchorEnd,
            '*' => TokenKind::Star,
            '+' => TokenKind::Plus,
            '?' => TokenKind::Question,
            '|' => TokenKind::Pipe,
            ')' => TokenKind::RParen,
            '(' => self.lex_group(start),
            '[' => self.lex_class(start),
            '{' => self.lex_repeat(start),
            '\\' => self.lex_escape(start),
            c => TokenKind::Char(c),
        };

        Some(self.token(kind, start..self.pos))
    }

    /// Skips to the end of the pattern body and returns an error token
    /// kind. Used when the rest of the input can't be tokenized sensibly.
    fn bail(&mut self, err: Error) -> TokenKind {
        self.pos = self.end;
        TokenKind::Error(err)
    }

    fn lex_group(&mut self, start: usize) -> TokenKind {
        let rest = self.rest();

        if let Some(after) = rest.strip_prefix('*') {
            // Backtracking verbs.
            let name_len = after
                .chars()
                .take_while(|c| c.is_ascii_uppercase())
                .count();
            if name_len > 0 && after[name_len..].starts_with(')') {
                let name = &after[..name_len];
                self.pos += 1 + name_len + 1;
                return match name {
                    "FAIL" | "F" => TokenKind::Verb(Verb::Fail),
                    "ACCEPT" => TokenKind::Verb(Verb::Accept),
                    "COMMIT" => TokenKind::Verb(Verb::Commit),
                    _ => TokenKind::Error(
                        Error::new(
                            ErrorKind::UnsupportedFeature,
                            format!("unknown backtracking verb `(*{})`", name),
                        )
                        .at(start),
                    ),
                };
            }
            return TokenKind::LParen;
        }

        let Some(after) = rest.strip_prefix('?') else {
            return TokenKind::LParen;
        };

        self.pos += 1;

        let unclosed = |what: &str| {
            Error::syntax(format!("unclosed {}", what), start)
        };

        // Names end at the given delimiter.
        let name_until = |s: &str, delim: char| -> Option<(String, usize)> {
            s.find(delim).map(|end| (s[..end].to_string(), end + 1))
        };

        let (kind, len) = match after.chars().next() {
            Some(':') => (TokenKind::GroupOpen(GroupOpen::NonCapturing), 1),
            Some('=') => {
                (TokenKind::GroupOpen(GroupOpen::Look(LookKind::Ahead)), 1)
            }
            Some('!') => (
                TokenKind::GroupOpen(GroupOpen::Look(LookKind::NegativeAhead)),
                1,
            ),
            Some('>') => (TokenKind::GroupOpen(GroupOpen::Atomic), 1),
            Some('#') => match after.find(')') {
                Some(end) => (TokenKind::Comment(after[1..end].to_string()), end + 1),
                None => return self.bail(unclosed("comment")),
            },
            Some('<') if after.starts_with("<=") => (
                TokenKind::GroupOpen(GroupOpen::Look(LookKind::Behind)),
                2,
            ),
            Some('<') if after.starts_with("<!") => (
                TokenKind::GroupOpen(GroupOpen::Look(LookKind::NegativeBehind)),
                2,
            ),
            Some('<') => match name_until(&after[1..], '>') {
                Some((name, len)) => {
                    (TokenKind::GroupOpen(GroupOpen::Named(name)), len + 1)
                }
                None => return self.bail(unclosed("group name")),
            },
            Some('\'') => match name_until(&after[1..], '\'') {
                Some((name, len)) => {
                    (TokenKind::GroupOpen(GroupOpen::Named(name)), len + 1)
                }
                None => return self.bail(unclosed("group name")),
            },
            Some('P') if after.starts_with("P<") => {
                match name_until(&after[2..], '>') {
                    Some((name, len)) => {
                        (TokenKind::GroupOpen(GroupOpen::Named(name)), len + 2)
                    }
                    None => return self.bail(unclosed("group name")),
                }
            }
            Some('P') if after.starts_with("P=") => {
                match name_until(&after[2..], ')') {
                    Some((name, len)) => (TokenKind::NamedBackref(name), len + 2),
                    None => return self.bail(unclosed("backreference")),
                }
            }
            Some('(') => return self.lex_condition(start, &after[1..]),
            Some(_) => return self.lex_options(start, after),
            None => {
                return self.bail(Error::syntax(
                    "unclosed group",
                    start,
                ))
            }
        };

        self.pos += len;
        kind
    }

    fn lex_condition(&mut self, start: usize, s: &str) -> TokenKind {
        // Skip the '('.
        self.pos += 1;

        for (prefix, kind) in [
            ("?=", LookKind::Ahead),
            ("?!", LookKind::NegativeAhead),
            ("?<=", LookKind::Behind),
            ("?<!", LookKind::NegativeBehind),
        ] {
            if s.starts_with(prefix) {
                self.pos += prefix.len();
                return TokenKind::GroupOpen(GroupOpen::ConditionLook(kind));
            }
        }

        let Some(end) = s.find(')') else {
            return self.bail(Error::syntax("unclosed condition", start));
        };
        self.pos += end + 1;

        let inner = &s[..end];
        let cond = if let Ok(n) = inner.parse::<usize>() {
            CondRef::Number(n)
        } else if let Some(name) =
            inner.strip_prefix('<').and_then(|n| n.strip_suffix('>'))
        {
            CondRef::Name(name.to_string())
        } else if let Some(name) =
            inner.strip_prefix('\'').and_then(|n| n.strip_suffix('\''))
        {
            CondRef::Name(name.to_string())
        } else if !inner.is_empty() {
            CondRef::Name(inner.to_string())
        } else {
            return TokenKind::Error(Error::syntax("empty condition", start));
        };

        TokenKind::GroupOpen(GroupOpen::Condition(cond))
    }

    fn lex_options(&mut self, start: usize, s: &str) -> TokenKind {
        let mut on = String::new();
        let mut off = String::new();
        let mut negate = false;

        for (i, c) in s.char_indices() {
            match c {
                ')' | ':' => {
                    self.pos += i + 1;
                    return TokenKind::GroupOpen(GroupOpen::Options {
                        on,
                        off,
                        scoped: c == ':',
                    });
                }
                '-' if !negate => negate = true,
                c if c.is_alphanumeric() => {
                    if negate {
                        off.push(c)
                    } else {
                        on.push(c)
                    }
                }
                c => {
                    self.pos += i + c.len_utf8();
                    return TokenKind::Error(Error::syntax(
                        format!("unexpected `{}` in group modifiers", c),
                        start,
                    ));
                }
            }
        }

        self.bail(Error::syntax("unclosed group", start))
    }

    fn lex_class(&mut self, start: usize) -> TokenKind {
        let text = &self.source[start..self.end];
        let scanned = ClassSet::scan_bracket(text).and_then(|len| {
            let spec = &text[..len];
            let result = if self.strict {
                ClassSet::parse_strict(spec)
            } else {
                ClassSet::parse(spec)
            };
            result.map(|_| len)
        });
        match scanned {
            Ok(len) => {
                self.pos = start + len;
                TokenKind::Class(text[..len].to_string())
            }
            Err(err) => {
                let pos = err.position().unwrap_or(0) + start;
                let err = Error::new(err.kind(), err.message().to_string()).at(pos);
                // Resume after the next ']', if there is one.
                match text[1..].find(']') {
                    Some(close) => self.pos = start + close + 2,
                    None => self.pos = self.end,
                }
                TokenKind::Error(err)
            }
        }
    }

    /// `{` starts a counted repetition only when followed by digits,
    /// otherwise it's a literal.
    fn lex_repeat(&mut self, start: usize) -> TokenKind {
        let rest = self.rest();
        let digits = |s: &str| s.chars().take_while(|c| c.is_ascii_digit()).count();

        let min_len = digits(rest);
        if min_len == 0 {
            return TokenKind::Char('{');
        }

        let mut len = min_len;
        let mut max_text = None;
        if rest[len..].starts_with(',') {
            len += 1;
            let max_len = digits(&rest[len..]);
            max_text = Some(&rest[len..len + max_len]);
            len += max_len;
        }

        if !rest[len..].starts_with('}') {
            return self.bail(Error::syntax("unclosed counted repetition", start));
        }

        let parse = |s: &str| {
            s.parse::<u32>().map_err(|_| {
                Error::syntax("repetition count is too large", start)
            })
        };

        let result = parse(&rest[..min_len]).and_then(|min| {
            let max = match max_text {
                None => Some(min),
                Some("") => None,
                Some(text) => Some(parse(text)?),
            };
            if max.is_some_and(|max| max < min) {
                return Err(Error::syntax(
                    "invalid range in counted repetition",
                    start,
                ));
            }
            Ok((min, max))
        });

        self.pos += len + 1;

        match result {
            Ok((min, max)) => TokenKind::Repeat { min, max },
            Err(err) => TokenKind::Error(err),
        }
    }

    fn lex_escape(&mut self, start: usize) -> TokenKind {
        let rest = self.rest();
        let Some(c) = rest.chars().next() else {
            return TokenKind::Error(Error::new(
                ErrorKind::InvalidEscape,
                "pattern ends with a backslash",
            )
            .at(start));
        };

        let simple = match c {
            'd' => Some(TokenKind::DigitClass(false)),
            'D' => Some(TokenKind::DigitClass(true)),
            'w' => Some(TokenKind::WordClass(false)),
            'W' => Some(TokenKind::WordClass(true)),
            's' => Some(TokenKind::WhitespaceClass(false)),
            'S' => Some(TokenKind::WhitespaceClass(true)),
            'A' => Some(TokenKind::Assertion(Assertion::StartOfInput)),
            'z' => Some(TokenKind::Assertion(Assertion::EndOfInput)),
            'Z' => Some(TokenKind::Assertion(Assertion::EndOfInputOrNewline)),
            'b' => Some(TokenKind::Assertion(Assertion::WordBoundary)),
            'B' => Some(TokenKind::Assertion(Assertion::NotWordBoundary)),
            _ => None,
        };
        if let Some(kind) = simple {
            self.pos += 1;
            return kind;
        }

        if matches!(c, '1'..='9') {
            let len = rest.chars().take(2).take_while(|c| c.is_ascii_digit()).count();
            self.pos += len;
            // Two digits at most, so this can't overflow.
            let n = rest[..len].parse::<usize>().unwrap_or(0);
            return TokenKind::Backref(n);
        }

        if c == 'k' {
            let close = match rest[1..].chars().next() {
                Some('<') => '>',
                Some('{') => '}',
                Some('\'') => '\'',
                _ => {
                    self.pos += 1;
                    return TokenKind::Error(Error::new(
                        ErrorKind::InvalidEscape,
                        "`\\k` must be followed by a group name",
                    )
                    .at(start));
                }
            };
            return match rest[2..].find(close) {
                Some(end) => {
                    self.pos += 2 + end + 1;
                    TokenKind::NamedBackref(rest[2..2 + end].to_string())
                }
                None => self.bail(Error::syntax("unclosed group name", start)),
            };
        }

        match parse_escape(rest, self.strict) {
            Ok((Escaped::Char(ch), len)) => {
                self.pos += len;
                TokenKind::Char(ch)
            }
            Ok((Escaped::Class(_), len)) => {
                self.pos += len;
                TokenKind::Property(self.source[start..self.pos].to_string())
            }
            Err(err) => {
                self.pos += c.len_utf8();
                let pos = err.position().unwrap_or(0) + start;
                TokenKind::Error(Error::new(err.kind(), err.message().to_string()).at(pos))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{
        find_raw_literal, Assertion, CondRef, GroupOpen, Lexer, TokenKind,
        Verb,
    };
    use crate::automaton::LookKind;
    use crate::errors::ErrorKind;
    use crate::flags::Flags;

    fn kinds(source: &str, flags: Flags) -> Vec<TokenKind> {
        Lexer::new(source, flags).tokenize().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn basic_tokens() {
        assert_eq!(
            kinds("a.b*|\\d+?", Flags::empty()),
            vec![
                TokenKind::Char('a'),
                TokenKind::Dot,
                TokenKind::Char('b'),
                TokenKind::Star,
                TokenKind::Pipe,
                TokenKind::DigitClass(false),
                TokenKind::Plus,
                TokenKind::Question,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn spans() {
        let tokens = Lexer::new("a[bc]\\w", Flags::empty()).tokenize();
        let spans: Vec<_> = tokens.iter().map(|t| t.span.clone()).collect();
        assert_eq!(spans, vec![0..1, 1..5, 5..7, 7..7]);
    }

    #[test]
    fn groups() {
        assert_eq!(
            kinds("(?:(?P<n>(?<=x)(?>y)))", Flags::empty()),
            vec![
                TokenKind::GroupOpen(GroupOpen::NonCapturing),
                TokenKind::GroupOpen(GroupOpen::Named("n".to_string())),
                TokenKind::GroupOpen(GroupOpen::Look(LookKind::Behind)),
                TokenKind::Char('x'),
                TokenKind::RParen,
                TokenKind::GroupOpen(GroupOpen::Atomic),
                TokenKind::Char('y'),
                TokenKind::RParen,
                TokenKind::RParen,
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );

        assert_eq!(
            kinds("(?i-s:a)(?(1)b)(?P=n)(?#hi)(*COMMIT)", Flags::empty()),
            vec![
                TokenKind::GroupOpen(GroupOpen::Options {
                    on: "i".to_string(),
                    off: "s".to_string(),
                    scoped: true
                }),
                TokenKind::Char('a'),
                TokenKind::RParen,
                TokenKind::GroupOpen(GroupOpen::Condition(CondRef::Number(1))),
                TokenKind::Char('b'),
                TokenKind::RParen,
                TokenKind::NamedBackref("n".to_string()),
                TokenKind::Comment("hi".to_string()),
                TokenKind::Verb(Verb::Commit),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn repetitions() {
        assert_eq!(
            kinds("a{2}b{2,}c{2,5}d{x}", Flags::empty()),
            vec![
                TokenKind::Char('a'),
                TokenKind::Repeat { min: 2, max: Some(2) },
                TokenKind::Char('b'),
                TokenKind::Repeat { min: 2, max: None },
                TokenKind::Char('c'),
                TokenKind::Repeat { min: 2, max: Some(5) },
                TokenKind::Char('d'),
                TokenKind::Char('{'),
                TokenKind::Char('x'),
                TokenKind::Char('}'),
                TokenKind::Eof,
            ]
        );

        let tokens = kinds("a{5,2}", Flags::empty());
        assert!(matches!(tokens[1], TokenKind::Error(_)));

        let tokens = kinds("a{5", Flags::empty());
        assert!(matches!(tokens[1], TokenKind::Error(_)));
    }

    #[test]
    fn escapes() {
        assert_eq!(
            kinds("\\b\\A\\1\\k<x>\\.\\n\\p{L}", Flags::empty()),
            vec![
                TokenKind::Assertion(Assertion::WordBoundary),
                TokenKind::Assertion(Assertion::StartOfInput),
                TokenKind::Backref(1),
                TokenKind::NamedBackref("x".to_string()),
                TokenKind::Char('.'),
                TokenKind::Char('\n'),
                TokenKind::Property("\\p{L}".to_string()),
                TokenKind::Eof,
            ]
        );

        // Invalid escapes produce an error and lexing continues.
        let tokens = kinds("\\qa", Flags::empty());
        match &tokens[0] {
            TokenKind::Error(err) => {
                assert_eq!(err.kind(), ErrorKind::InvalidEscape);
                assert_eq!(err.position(), Some(0));
            }
            other => panic!("unexpected token {:?}", other),
        }
        assert_eq!(tokens[1], TokenKind::Char('a'));
    }

    #[test]
    fn classes() {
        let tokens = kinds("x[[:alpha:]_]y", Flags::empty());
        assert_eq!(tokens[1], TokenKind::Class("[[:alpha:]_]".to_string()));
        assert_eq!(tokens[2], TokenKind::Char('y'));

        let tokens = kinds("[]", Flags::empty());
        assert!(matches!(tokens[0], TokenKind::Error(_)));

        let tokens = kinds("[abc", Flags::empty());
        match &tokens[0] {
            TokenKind::Error(err) => {
                assert_eq!(err.message(), "unclosed character class")
            }
            other => panic!("unexpected token {:?}", other),
        }

        let tokens = kinds("a[[:bogus:]]", Flags::empty());
        match &tokens[1] {
            TokenKind::Error(err) => assert_eq!(err.position(), Some(2)),
            other => panic!("unexpected token {:?}", other),
        }
    }

    #[test]
    fn extended_mode() {
        assert_eq!(
            kinds("a b # comment\n c", Flags::EXTENDED),
            vec![
                TokenKind::Char('a'),
                TokenKind::Char('b'),
                TokenKind::Char('c'),
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            kinds("a\\ b", Flags::EXTENDED),
            vec![
                TokenKind::Char('a'),
                TokenKind::Char(' '),
                TokenKind::Char('b'),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn raw_literals() {
        assert_eq!(
            kinds("R'a(b)'im", Flags::RIFT_SYNTAX),
            vec![
                TokenKind::RiftPrefix,
                TokenKind::RiftQuoteStart('\''),
                TokenKind::Char('a'),
                TokenKind::LParen,
                TokenKind::Char('b'),
                TokenKind::RParen,
                TokenKind::RiftQuoteEnd('\''),
                TokenKind::RiftFlags("im".to_string()),
                TokenKind::Eof,
            ]
        );

        // Quotes inside parenthesis don't close the literal.
        let raw = find_raw_literal("R\"(\")\"").unwrap().unwrap();
        assert_eq!(raw.body, 2..5);

        // Escaped quotes don't close the literal either.
        let raw = find_raw_literal("R'a\\'b'").unwrap().unwrap();
        assert_eq!(raw.body, 2..6);

        // A quote followed by something that is not a modifier is part of
        // the body.
        let raw = find_raw_literal("R'it's'x").unwrap().unwrap();
        assert_eq!(raw.body, 2..6);
        assert_eq!(raw.flags, "x");

        assert!(find_raw_literal("abc").unwrap().is_none());
        assert!(find_raw_literal("R'abc").is_err());
        assert!(find_raw_literal("R'abc\"").is_err());
        assert!(find_raw_literal("R\"abc'i").is_err());
    }
}

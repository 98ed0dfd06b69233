/*! Implements the `.rift` tokenizer.

The tokenizer takes the source code of a `.rift` file and produces a
sequence of tokens, each one represented by a variant of [`Token`]. Trivia
(whitespace, newlines and comments) is reported as well, the parser is the
one deciding what to ignore.
*/

use logos::Logos;

use crate::Span;


/// A token in the source code.
///
/// Each token carries the [`Span`] that indicates where it is located.
#[allow(non_camel_case_types)]
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    // Directives.
    PATTERN_KW(Span),
    FLAGS_KW(Span),
    TEST_CASE_KW(Span),
    /// A directive that is not known, like `@foo`.
    DIRECTIVE(Span),

    // Keywords.
    TRUE_KW(Span),
    FALSE_KW(Span),

    // Literals and identifiers.
    IDENT(Span),
    STRING_LIT(Span),

    // Punctuation.
    COMMA(Span),
    EQUAL(Span),
    L_BRACE(Span),
    R_BRACE(Span),
    L_BRACKET(Span),
    R_BRACKET(Span),

    // Trivia
    COMMENT(Span),
    NEWLINE(Span),
    WHITESPACE(Span),

    /// Not a real token. Used when a portion of the source code doesn't
    /// match any of the tokens.
    UNKNOWN(Span),
}

impl Token {
    /// Returns true if this is trivia token.
    pub fn is_trivia(&self) -> bool {
        matches!(
            self,
            Token::NEWLINE(_) | Token::WHITESPACE(_) | Token::COMMENT(_)
        )
    }

    pub fn span(&self) -> Span {
        match self {
            Token::PATTERN_KW(span)
            | Token::FLAGS_KW(span)
            | Token::TEST_CASE_KW(span)
            | Token::DIRECTIVE(span)
            | Token::TRUE_KW(span)
            | Token::FALSE_KW(span)
            | Token::IDENT(span)
            | Token::STRING_LIT(span)
            | Token::COMMA(span)
            | Token::EQUAL(span)
            | Token::L_BRACE(span)
            | Token::R_BRACE(span)
            | Token::L_BRACKET(span)
            | Token::R_BRACKET(span)
            | Token::COMMENT(span)
            | Token::NEWLINE(span)
            | Token::WHITESPACE(span)
            | Token::UNKNOWN(span) => span.clone(),
        }
    }

    /// Description of the token, as used in error messages.
    pub fn description(&self) -> &'static str {
        match self {
            Token::PATTERN_KW(_) => "`@pattern`",
            Token::FLAGS_KW(_) => "`@flags`",
            Token::TEST_CASE_KW(_) => "`@test_case`",
            Token::DIRECTIVE(_) => "directive",
            Token::TRUE_KW(_) => "`true`",
            Token::FALSE_KW(_) => "`false`",
            Token::IDENT(_) => "identifier",
            Token::STRING_LIT(_) => "string",
            Token::COMMA(_) => "`,`",
            Token::EQUAL(_) => "`=`",
            Token::L_BRACE(_) => "`{`",
            Token::R_BRACE(_) => "`}`",
            Token::L_BRACKET(_) => "`[`",
            Token::R_BRACKET(_) => "`]`",
            Token::COMMENT(_) => "comment",
            Token::NEWLINE(_) => "newline",
            Token::WHITESPACE(_) => "whitespace",
            Token::UNKNOWN(_) => "unknown token",
        }
    }
}

/// Takes the source code of a `.rift` file and produces a sequence of
/// tokens.
///
/// When some portion of the source doesn't match any token, the tokenizer
/// issues [`Token::UNKNOWN`] covering the text up to the next whitespace
/// and keeps going. An unterminated string produces an [`Token::UNKNOWN`]
/// that extends up to the end of the line.
pub(crate) struct Tokenizer<'src> {
    lexer: logos::Lexer<'src, RiftToken>,
}

impl<'src> Tokenizer<'src> {
    /// Creates a new [`Tokenizer`].
    pub fn new(source: &'src str) -> Self {
        Self { lexer: RiftToken::lexer(source) }
    }

    /// Returns the next token.
    pub fn next_token(&mut self) -> Option<Token> {
        match self.lexer.next()? {
            Ok(token) => Some(convert_token(token, Span::from(self.lexer.span()))),
            Err(()) => Some(self.unexpected_token()),
        }
    }

    fn unexpected_token(&mut self) -> Token {
        let start = self.lexer.span().start;
        let rest = &self.lexer.source()[start..];

        let unexpected = if rest.starts_with(['"', '\'']) {
            rest.split('\n').next().unwrap_or(rest)
        } else {
            rest.split(char::is_whitespace).next().unwrap_or(rest)
        };

        // If `unexpected` is larger than the current token, bump the lexer
        // to the end of `unexpected`.
        self.lexer.bump(unexpected.len().saturating_sub(self.lexer.span().len()));

        Token::UNKNOWN(Span::from(self.lexer.span()))
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

/// Tokens recognized by the logos lexer.
#[derive(logos::Logos, Debug, PartialEq)]
enum RiftToken {
    #[token("@pattern")]
    Pattern,
    #[token("@flags")]
    Flags,
    #[token("@test_case")]
    TestCase,
    #[regex("@[a-zA-Z_][a-zA-Z0-9_]*")]
    Directive,

    #[token("true")]
    True,
    #[token("false")]
    False,

    #[regex("[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,

    // Strings are delimited by single or double quotes, in-between the
    // quotes they contain either an escape sequence, or anything that is
    // not the quote, a backslash or a newline.
    #[regex(
        r#"(?x)                         # allow comments in the regexp
        "                               # starts with double quotes
        (                               # any number of
          \\.                           #   escape sequence
          |                             #   or ..
          [^"\n\\]                      #   anything except quotes, newlines and backslashes
        )*
        "                               # ends with double quotes
        "#)
    ]
    #[regex(
        r#"(?x)
        '
        (
          \\.
          |
          [^'\n\\]
        )*
        '
        "#)
    ]
    StringLit,

    #[token(",")]
    Comma,
    #[token("=")]
    Equal,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,

    #[regex("#[^\n]*")]
    Comment,

    #[regex("[ \t\r]+")]
    Whitespace,

    #[token("\n")]
    Newline,
}

fn convert_token(token: RiftToken, span: Span) -> Token {
    match token {
        RiftToken::Pattern => Token::PATTERN_KW(span),
        RiftToken::Flags => Token::FLAGS_KW(span),
        RiftToken::TestCase => Token::TEST_CASE_KW(span),
        RiftToken::Directive => Token::DIRECTIVE(span),
        RiftToken::True => Token::TRUE_KW(span),
        RiftToken::False => Token::FALSE_KW(span),
        RiftToken::Ident => Token::IDENT(span),
        RiftToken::StringLit => Token::STRING_LIT(span),
        RiftToken::Comma => Token::COMMA(span),
        RiftToken::Equal => Token::EQUAL(span),
        RiftToken::LBrace => Token::L_BRACE(span),
        RiftToken::RBrace => Token::R_BRACE(span),
        RiftToken::LBracket => Token::L_BRACKET(span),
        RiftToken::RBracket => Token::R_BRACKET(span),
        RiftToken::Comment => Token::COMMENT(span),
        RiftToken::Whitespace => Token::WHITESPACE(span),
        RiftToken::Newline => Token::NEWLINE(span),
    }
}

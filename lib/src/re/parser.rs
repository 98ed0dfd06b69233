use std::ops::Range;

use log::trace;

use crate::errors::{Error, ErrorKind};
use crate::flags::Flags;
use crate::re::ast::{
    Anchor, Ast, BackrefTarget, Class, ClassKind, Condition, Conditional,
    Group, GroupKind, OptionSet, Repeat, SyntaxTree,
};
use crate::re::lexer::{
    is_raw_literal, Assertion, GroupOpen, Lexer, Token, TokenKind,
};
use crate::stack::ensure_sufficient_stack;

/// Default limit for the nesting of groups.
pub const DEFAULT_MAX_DEPTH: usize = 1000;

/// A pattern parser.
///
/// Takes the source of a pattern and produces its [`SyntaxTree`]. The parser
/// only checks the syntax, semantic checks like the existence of the groups
/// referenced by backreferences are done by the
/// [`crate::re::validator::Validator`].
pub struct Parser {
    flags: Flags,
    max_depth: usize,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    /// Creates a parser with no flags.
    pub fn new() -> Self {
        Self { flags: Flags::empty(), max_depth: DEFAULT_MAX_DEPTH }
    }

    /// Flags that affect parsing: EXTENDED, STRICT, RIFT_SYNTAX and
    /// ERROR_RECOVERY. Other flags are passed through to the tree.
    pub fn flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    /// Maximum nesting of groups. Deeper patterns are rejected with
    /// [`ErrorKind::LimitExceeded`].
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Parses the pattern.
    ///
    /// With ERROR_RECOVERY, syntax errors are recorded in the tree instead
    /// of being returned, and the offending part of the pattern is replaced
    /// by [`Ast::Invalid`]. Errors that leave nothing sensible to parse,
    /// like a malformed raw literal, are returned anyway.
    pub fn parse(&self, source: &str) -> Result<SyntaxTree, Error> {
        if is_raw_literal(source) && !self.flags.contains(Flags::RIFT_SYNTAX) {
            return Err(Error::new(
                ErrorKind::UnsupportedFeature,
                "raw literal patterns require the RIFT_SYNTAX flag",
            )
            .at(0));
        }

        let mut inner = ParserImpl {
            lexer: Lexer::new(source, self.flags),
            peeked: None,
            recover: self.flags.contains(Flags::ERROR_RECOVERY),
            depth: 0,
            max_depth: self.max_depth,
            group_count: 0,
            errors: Vec::new(),
        };

        let mut flags = self.flags;
        let mut raw = false;

        if matches!(inner.peek().kind, TokenKind::RiftPrefix) {
            inner.bump();
            match inner.bump() {
                Token { kind: TokenKind::RiftQuoteStart(_), .. } => {}
                token => return Err(unexpected(&token)),
            }
            raw = true;
            if let Some(literal) = inner.lexer.raw_literal() {
                flags |= literal.flags();
            }
        } else if let TokenKind::Error(err) = &inner.peek().kind {
            // A malformed raw literal.
            if is_raw_literal(source) {
                return Err(err.clone());
            }
        }

        let (mut root, mut alternatives) = inner.parse_alternation()?;

        loop {
            let token = inner.bump();
            match token.kind {
                TokenKind::Eof => break,
                TokenKind::RiftQuoteEnd(_) => {}
                TokenKind::RiftFlags(_) => {}
                TokenKind::RParen => {
                    inner.fail(Error::syntax(
                        "unbalanced parenthesis, unexpected ')'",
                        token.span.start,
                    ))?;
                    let (rest, _) = inner.parse_alternation()?;
                    root = Ast::Concat(vec![root, Ast::Invalid, rest]);
                    alternatives.clear();
                }
                _ => {
                    inner.fail(unexpected(&token))?;
                }
            }
        }

        trace!("parsed pattern {:?}: {}", source, root);

        Ok(SyntaxTree::new(root, flags).with_source_info(
            raw,
            alternatives,
            inner.errors,
        ))
    }
}

fn unexpected(token: &Token) -> Error {
    Error::new(ErrorKind::UnexpectedToken, format!("unexpected {}", describe(&token.kind)))
        .at(token.span.start)
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Char(c) => format!("character `{}`", c),
        TokenKind::RParen => "`)`".to_string(),
        TokenKind::Pipe => "`|`".to_string(),
        TokenKind::Eof => "end of pattern".to_string(),
        TokenKind::RiftPrefix => "raw literal prefix".to_string(),
        TokenKind::RiftQuoteStart(q) | TokenKind::RiftQuoteEnd(q) => {
            format!("quote `{}`", q)
        }
        TokenKind::RiftFlags(f) => format!("modifiers `{}`", f),
        TokenKind::Error(err) => err.message().to_string(),
        other => format!("{:?}", other),
    }
}

struct ParserImpl<'src> {
    lexer: Lexer<'src>,
    peeked: Option<Token>,
    recover: bool,
    depth: usize,
    max_depth: usize,
    group_count: usize,
    errors: Vec<Error>,
}

impl<'src> ParserImpl<'src> {
    fn peek(&mut self) -> &Token {
        self.peeked.get_or_insert_with(|| self.lexer.next_token())
    }

    fn bump(&mut self) -> Token {
        match self.peeked.take() {
            Some(token) => token,
            None => self.lexer.next_token(),
        }
    }

    /// Handles a recoverable error. Returns the placeholder node when
    /// recovering, or the error otherwise.
    fn fail(&mut self, err: Error) -> Result<Ast, Error> {
        if self.recover {
            self.errors.push(err);
            Ok(Ast::Invalid)
        } else {
            Err(err)
        }
    }

    fn at_branch_end(&mut self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Pipe
                | TokenKind::RParen
                | TokenKind::Eof
                | TokenKind::RiftQuoteEnd(_)
                | TokenKind::RiftFlags(_)
        )
    }

    /// Parses alternatives separated by `|`. Also returns the byte ranges
    /// of the alternatives when there is more than one.
    fn parse_alternation(&mut self) -> Result<(Ast, Vec<Range<usize>>), Error> {
        let mut spans = Vec::new();
        let mut start = self.peek().span.start;
        let mut branches = vec![self.parse_concat()?];

        while matches!(self.peek().kind, TokenKind::Pipe) {
            let pipe = self.bump();
            spans.push(start..pipe.span.start);
            start = pipe.span.end;
            branches.push(self.parse_concat()?);
        }

        if branches.len() == 1 {
            return Ok((branches.remove(0), Vec::new()));
        }

        spans.push(start..self.peek().span.start);
        Ok((Ast::Alternation(branches), spans))
    }

    fn parse_concat(&mut self) -> Result<Ast, Error> {
        let mut items = Vec::new();
        while !self.at_branch_end() {
            items.push(self.parse_repeat()?);
        }
        Ok(match items.len() {
            0 => Ast::Empty,
            1 => items.remove(0),
            _ => Ast::Concat(items),
        })
    }

    fn quantifier(&mut self) -> Option<(u32, Option<u32>)> {
        match self.peek().kind {
            TokenKind::Star => Some((0, None)),
            TokenKind::Plus => Some((1, None)),
            TokenKind::Question => Some((0, Some(1))),
            TokenKind::Repeat { min, max } => Some((min, max)),
            _ => None,
        }
    }

    fn parse_repeat(&mut self) -> Result<Ast, Error> {
        let atom = self.parse_atom()?;

        let Some((min, max)) = self.quantifier() else {
            return Ok(atom);
        };

        let quantifier = self.bump();

        if matches!(
            atom,
            Ast::Empty | Ast::Comment(_) | Ast::Options(_) | Ast::Verb(_)
        ) {
            return self.fail(Error::syntax(
                "nothing to repeat",
                quantifier.span.start,
            ));
        }

        let mut greedy = true;
        let mut possessive = false;
        if matches!(self.peek().kind, TokenKind::Question) {
            self.bump();
            greedy = false;
        } else if matches!(self.peek().kind, TokenKind::Plus) {
            self.bump();
            possessive = true;
        }

        let repeat = Ast::Repeat(Repeat {
            min,
            max,
            greedy,
            possessive,
            child: Box::new(atom),
        });

        if self.quantifier().is_some() {
            let token = self.bump();
            self.fail(Error::syntax(
                "nested quantifier, use a group to repeat a repetition",
                token.span.start,
            ))?;
        }

        Ok(repeat)
    }

    fn parse_atom(&mut self) -> Result<Ast, Error> {
        let token = self.bump();
        let start = token.span.start;

        let ast = match token.kind {
            TokenKind::Char(c) => Ast::Literal(c),
            TokenKind::Dot => Ast::Dot,
            TokenKind::DigitClass(negated) => perl_class('d', negated),
            TokenKind::WordClass(negated) => perl_class('w', negated),
            TokenKind::WhitespaceClass(negated) => perl_class('s', negated),
            TokenKind::Property(spec) => {
                Ast::Class(Class { kind: ClassKind::Property, spec })
            }
            TokenKind::Class(spec) => {
                let kind = if is_single_posix(&spec) {
                    ClassKind::Posix
                } else {
                    ClassKind::Bracket
                };
                Ast::Class(Class { kind, spec })
            }
            TokenKind::AnchorStart => Ast::Anchor(Anchor::Caret),
            TokenKind::AnchorEnd => Ast::Anchor(Anchor::Dollar),
            TokenKind::Assertion(assertion) => match assertion {
                Assertion::StartOfInput => Ast::Anchor(Anchor::StartOfInput),
                Assertion::EndOfInput => Ast::Anchor(Anchor::EndOfInput),
                Assertion::EndOfInputOrNewline => {
                    Ast::Anchor(Anchor::EndOfInputOrNewline)
                }
                Assertion::WordBoundary => Ast::WordBoundary { negated: false },
                Assertion::NotWordBoundary => {
                    Ast::WordBoundary { negated: true }
                }
            },
            TokenKind::LParen => {
                self.group_count += 1;
                let index = self.group_count;
                let child = self.parse_group_body(start, None)?;
                Ast::Group(Group {
                    kind: GroupKind::Capturing { index, name: None },
                    child: Box::new(child),
                })
            }
            TokenKind::GroupOpen(open) => self.parse_group(start, open)?,
            TokenKind::Backref(n) => Ast::Backref(BackrefTarget::Number(n)),
            TokenKind::NamedBackref(name) => {
                Ast::Backref(BackrefTarget::Name(name))
            }
            TokenKind::Comment(text) => Ast::Comment(text),
            TokenKind::Verb(verb) => Ast::Verb(verb),
            TokenKind::Star
            | TokenKind::Plus
            | TokenKind::Question
            | TokenKind::Repeat { .. } => {
                return self.fail(Error::syntax("nothing to repeat", start))
            }
            TokenKind::Error(err) => return self.fail(err),
            _ => return self.fail(unexpected(&token)),
        };

        Ok(ast)
    }

    fn parse_group(&mut self, start: usize, open: GroupOpen) -> Result<Ast, Error> {
        let ast = match open {
            GroupOpen::NonCapturing => Ast::Group(Group {
                kind: GroupKind::NonCapturing,
                child: Box::new(self.parse_group_body(start, None)?),
            }),
            GroupOpen::Named(name) => {
                self.group_count += 1;
                let index = self.group_count;
                Ast::Group(Group {
                    kind: GroupKind::Capturing { index, name: Some(name) },
                    child: Box::new(self.parse_group_body(start, None)?),
                })
            }
            GroupOpen::Look(kind) => Ast::Lookaround {
                kind,
                child: Box::new(self.parse_group_body(start, None)?),
            },
            GroupOpen::Atomic => {
                Ast::Atomic(Box::new(self.parse_group_body(start, None)?))
            }
            GroupOpen::Options { on, off, scoped: true } => {
                let options = OptionSet { on, off };
                let child = self.parse_group_body(start, Some(&options))?;
                Ast::Group(Group {
                    kind: GroupKind::Scoped(options),
                    child: Box::new(child),
                })
            }
            GroupOpen::Options { on, off, scoped: false } => {
                let options = OptionSet { on, off };
                self.apply_lexer_options(&options);
                Ast::Options(options)
            }
            GroupOpen::Condition(cond) => {
                let (yes, no) = self.parse_branches(start)?;
                Ast::Conditional(Conditional {
                    condition: Condition::Group(cond),
                    yes,
                    no,
                })
            }
            GroupOpen::ConditionLook(kind) => {
                let look = self.parse_group_body(start, None)?;
                let (yes, no) = self.parse_branches(start)?;
                Ast::Conditional(Conditional {
                    condition: Condition::Look { kind, child: Box::new(look) },
                    yes,
                    no,
                })
            }
        };
        Ok(ast)
    }

    /// Parses the branches of a conditional, up to and including the
    /// closing parenthesis.
    fn parse_branches(
        &mut self,
        start: usize,
    ) -> Result<(Box<Ast>, Option<Box<Ast>>), Error> {
        let body = self.parse_group_body(start, None)?;
        match body {
            Ast::Alternation(mut branches) => {
                if branches.len() > 2 {
                    self.fail(Error::syntax(
                        "conditional group with more than two branches",
                        start,
                    ))?;
                    branches.truncate(2);
                }
                let no = branches.pop().map(Box::new);
                let yes = branches.pop().unwrap_or(Ast::Empty);
                Ok((Box::new(yes), no))
            }
            body => Ok((Box::new(body), None)),
        }
    }

    fn apply_lexer_options(&mut self, options: &OptionSet) {
        if options.on.contains('x') {
            self.lexer.set_extended(true);
        }
        if options.off.contains('x') {
            self.lexer.set_extended(false);
        }
    }

    /// Parses the content of a group whose opening token was already
    /// consumed, and the closing parenthesis.
    fn parse_group_body(
        &mut self,
        start: usize,
        options: Option<&OptionSet>,
    ) -> Result<Ast, Error> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(Error::limit_exceeded(format!(
                "groups nested more than {} levels deep",
                self.max_depth
            ))
            .at(start));
        }

        let extended = self.lexer.extended();
        if let Some(options) = options {
            self.apply_lexer_options(options);
        }

        let (body, _) = ensure_sufficient_stack(|| self.parse_alternation())?;

        if matches!(self.peek().kind, TokenKind::RParen) {
            self.bump();
        } else {
            self.fail(Error::syntax(
                "unbalanced parenthesis, missing ')'",
                start,
            ))?;
        }

        self.lexer.set_extended(extended);
        self.depth -= 1;

        Ok(body)
    }
}

fn perl_class(letter: char, negated: bool) -> Ast {
    let letter = if negated { letter.to_ascii_uppercase() } else { letter };
    Ast::Class(Class { kind: ClassKind::Perl, spec: format!("\\{}", letter) })
}

/// True for bracket expressions like `[[:alpha:]]`.
fn is_single_posix(spec: &str) -> bool {
    spec.strip_prefix("[[:")
        .and_then(|s| s.strip_suffix(":]]"))
        .is_some_and(|name| !name.contains(':') && !name.contains('['))
}

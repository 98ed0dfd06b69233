use crate::errors::{Error, ErrorKind};
use crate::re::class::{
    case_variants, chars_eq, parse_escape, CharRanges, ClassSet, Escaped,
};

/// Prefix that makes a transition pattern case-insensitive.
pub(crate) const CASE_INSENSITIVE_PREFIX: &str = "(?i)";

/// Prefix that makes `.` match newlines too.
pub(crate) const DOTALL_PREFIX: &str = "(?s)";

/// What a transition pattern matches, decoded from its textual form.
///
/// Transition patterns are strings: `.` for any character but newline,
/// `(?s).` for any character, a class spec (`[a-z]`, `\d`, `\p{L}`), or a
/// sequence of literal characters where metacharacters are escaped. The
/// `(?i)` prefix makes literals and classes case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Matcher {
    Literal { chars: Vec<char>, case_insensitive: bool },
    Any { dotall: bool },
    Class { set: ClassSet, case_insensitive: bool },
}

impl Matcher {
    pub fn parse(pattern: &str) -> Result<Matcher, Error> {
        if pattern.is_empty() {
            return Err(Error::invalid_parameter(
                "transition pattern can't be empty",
            ));
        }

        let mut rest = pattern;
        let mut case_insensitive = false;
        let mut dotall = false;

        loop {
            if let Some(r) = rest.strip_prefix(CASE_INSENSITIVE_PREFIX) {
                case_insensitive = true;
                rest = r;
            } else if let Some(r) = rest.strip_prefix(DOTALL_PREFIX) {
                dotall = true;
                rest = r;
            } else {
                break;
            }
        }

        if rest == "." {
            return Ok(Matcher::Any { dotall });
        }

        if rest.starts_with('[') {
            let set = ClassSet::parse(rest)?;
            return Ok(Matcher::Class { set, case_insensitive });
        }

        let mut chars = Vec::new();
        let mut pos = 0;
        while pos < rest.len() {
            let c = match rest[pos..].chars().next() {
                Some(c) => c,
                None => break,
            };
            pos += c.len_utf8();
            if c != '\\' {
                chars.push(c);
                continue;
            }
            let (escaped, len) = parse_escape(&rest[pos..], false)?;
            match escaped {
                Escaped::Char(c) => chars.push(c),
                Escaped::Class(_) if chars.is_empty() && pos + len == rest.len() => {
                    let set = ClassSet::parse(rest)?;
                    return Ok(Matcher::Class { set, case_insensitive });
                }
                Escaped::Class(_) => {
                    return Err(Error::new(
                        ErrorKind::InvalidParameter,
                        "a transition pattern can't mix classes and literals",
                    ))
                }
            }
            pos += len;
        }

        if chars.is_empty() {
            return Err(Error::invalid_parameter(
                "transition pattern can't be empty",
            ));
        }

        Ok(Matcher::Literal { chars, case_insensitive })
    }

    /// True if the matcher consumes exactly one character.
    pub fn is_single_char(&self) -> bool {
        match self {
            Matcher::Literal { chars, .. } => chars.len() == 1,
            _ => true,
        }
    }

    pub fn matches_char(&self, c: char) -> bool {
        match self {
            Matcher::Literal { chars, case_insensitive } => {
                chars.len() == 1 && chars_eq(chars[0], c, *case_insensitive)
            }
            Matcher::Any { dotall } => *dotall || c != '\n',
            Matcher::Class { set, case_insensitive } => {
                set.contains(c, *case_insensitive)
            }
        }
    }

    /// If the matcher matches a prefix of `input`, returns the length of
    /// that prefix in bytes.
    pub fn match_prefix(&self, input: &str) -> Option<usize> {
        match self {
            Matcher::Literal { chars, case_insensitive } => {
                let mut len = 0;
                let mut it = input.chars();
                for expected in chars {
                    let c = it.next()?;
                    if !chars_eq(*expected, c, *case_insensitive) {
                        return None;
                    }
                    len += c.len_utf8();
                }
                Some(len)
            }
            _ => {
                let c = input.chars().next()?;
                self.matches_char(c).then_some(c.len_utf8())
            }
        }
    }

    /// Characters accepted by a single-character matcher.
    pub fn ranges(&self) -> Option<CharRanges> {
        match self {
            Matcher::Literal { chars, case_insensitive } => {
                if chars.len() != 1 {
                    return None;
                }
                let c = chars[0];
                let mut ranges = CharRanges::single(c);
                if *case_insensitive {
                    for v in case_variants(c) {
                        ranges = ranges.union(&CharRanges::single(v));
                    }
                }
                Some(ranges)
            }
            Matcher::Any { dotall: true } => Some(CharRanges::all()),
            Matcher::Any { dotall: false } => {
                Some(CharRanges::single('\n').negate())
            }
            Matcher::Class { set, case_insensitive } => {
                Some(set.ranges(*case_insensitive))
            }
        }
    }
}

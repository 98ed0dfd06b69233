/*! Character classes.

A character class is described by a class spec, which is the same text that
appears in a pattern: a bracket expression like `[a-z_]` or `[^[:alpha:]]`,
a Perl class like `\d`, or a Unicode property like `\p{L}`. Class specs are
stored verbatim in the automaton transitions and in bytecode programs, and
they are parsed into a [`ClassSet`] when a matcher needs them.

For algorithms that need to reason about the whole alphabet, like the subset
construction, a class can be turned into a sorted list of code point ranges
([`CharRanges`]).
*/

use std::fmt::Write;

use crate::errors::{Error, ErrorKind};

/// Largest Unicode scalar value.
const MAX_CHAR: u32 = 0x10FFFF;

/// Surrogates are not valid scalar values and never appear in ranges.
const SURROGATES: (u32, u32) = (0xD800, 0xDFFF);

/// Classes like `\d`, `\w` and `\s`. These are ASCII only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerlClass {
    /// `\d`
    Digit,
    /// `\w`
    Word,
    /// `\s`
    Space,
}

impl PerlClass {
    fn from_letter(c: char) -> Option<(PerlClass, bool)> {
        match c {
            'd' => Some((PerlClass::Digit, false)),
            'D' => Some((PerlClass::Digit, true)),
            'w' => Some((PerlClass::Word, false)),
            'W' => Some((PerlClass::Word, true)),
            's' => Some((PerlClass::Space, false)),
            'S' => Some((PerlClass::Space, true)),
            _ => None,
        }
    }

    fn ranges(self) -> &'static [(u32, u32)] {
        match self {
            PerlClass::Digit => &[(0x30, 0x39)],
            PerlClass::Word => {
                &[(0x30, 0x39), (0x41, 0x5A), (0x5F, 0x5F), (0x61, 0x7A)]
            }
            PerlClass::Space => &[(0x09, 0x0D), (0x20, 0x20)],
        }
    }
}

/// POSIX class names accepted inside bracket expressions.
pub const POSIX_CLASSES: &[&str] = &[
    "alnum", "alpha", "ascii", "blank", "cntrl", "digit", "graph", "lower",
    "print", "punct", "space", "upper", "word", "xdigit",
];

fn posix_ranges(name: &str) -> Option<&'static [(u32, u32)]> {
    let ranges: &'static [(u32, u32)] = match name {
        "alnum" => &[(0x30, 0x39), (0x41, 0x5A), (0x61, 0x7A)],
        "alpha" => &[(0x41, 0x5A), (0x61, 0x7A)],
        "ascii" => &[(0x00, 0x7F)],
        "blank" => &[(0x09, 0x09), (0x20, 0x20)],
        "cntrl" => &[(0x00, 0x1F), (0x7F, 0x7F)],
        "digit" => &[(0x30, 0x39)],
        "graph" => &[(0x21, 0x7E)],
        "lower" => &[(0x61, 0x7A)],
        "print" => &[(0x20, 0x7E)],
        "punct" => {
            &[(0x21, 0x2F), (0x3A, 0x40), (0x5B, 0x60), (0x7B, 0x7E)]
        }
        "space" => &[(0x09, 0x0D), (0x20, 0x20)],
        "upper" => &[(0x41, 0x5A)],
        "word" => &[(0x30, 0x39), (0x41, 0x5A), (0x5F, 0x5F), (0x61, 0x7A)],
        "xdigit" => &[(0x30, 0x39), (0x41, 0x46), (0x61, 0x66)],
        _ => return None,
    };
    Some(ranges)
}

/// Unicode properties accepted in `\p{...}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnicodeProperty {
    /// Any character.
    Any,
    /// ASCII characters.
    Ascii,
    /// Alphabetic characters.
    Letter,
    /// Uppercase characters.
    Uppercase,
    /// Lowercase characters.
    Lowercase,
    /// Numeric characters.
    Number,
    /// Alphabetic or numeric characters.
    Alphanumeric,
    /// White space.
    WhiteSpace,
    /// Control characters.
    Control,
}

impl UnicodeProperty {
    /// Returns the property with the given name.
    pub fn from_name(name: &str) -> Option<UnicodeProperty> {
        let prop = match name {
            "Any" => UnicodeProperty::Any,
            "ASCII" | "Ascii" => UnicodeProperty::Ascii,
            "L" | "Letter" | "Alpha" | "Alphabetic" => UnicodeProperty::Letter,
            "Lu" | "Upper" | "Uppercase" => UnicodeProperty::Uppercase,
            "Ll" | "Lower" | "Lowercase" => UnicodeProperty::Lowercase,
            "N" | "Number" | "Numeric" => UnicodeProperty::Number,
            "Alnum" | "Alphanumeric" => UnicodeProperty::Alphanumeric,
            "Z" | "Space" | "White_Space" | "Whitespace" => {
                UnicodeProperty::WhiteSpace
            }
            "Cc" | "Control" => UnicodeProperty::Control,
            _ => return None,
        };
        Some(prop)
    }

    /// True if the character has this property.
    pub fn contains(self, c: char) -> bool {
        match self {
            UnicodeProperty::Any => true,
            UnicodeProperty::Ascii => c.is_ascii(),
            UnicodeProperty::Letter => c.is_alphabetic(),
            UnicodeProperty::Uppercase => c.is_uppercase(),
            UnicodeProperty::Lowercase => c.is_lowercase(),
            UnicodeProperty::Number => c.is_numeric(),
            UnicodeProperty::Alphanumeric => c.is_alphanumeric(),
            UnicodeProperty::WhiteSpace => c.is_whitespace(),
            UnicodeProperty::Control => c.is_control(),
        }
    }
}

/// An element of a character class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassItem {
    /// Inclusive range. Single characters are ranges where both ends are
    /// equal.
    Range(char, char),
    /// A Perl class like `\d`, possibly negated (`\D`).
    Perl(PerlClass, bool),
    /// A POSIX class like `[:alpha:]`, possibly negated (`[:^alpha:]`).
    Posix(&'static str, bool),
    /// A Unicode property like `\p{L}`, possibly negated (`\P{L}`).
    Property(UnicodeProperty, bool),
}

impl ClassItem {
    fn contains(&self, c: char) -> bool {
        match self {
            ClassItem::Range(lo, hi) => *lo <= c && c <= *hi,
            ClassItem::Perl(class, negated) => {
                in_table(class.ranges(), c) != *negated
            }
            ClassItem::Posix(name, negated) => {
                posix_ranges(name).is_some_and(|r| in_table(r, c)) != *negated
            }
            ClassItem::Property(prop, negated) => prop.contains(c) != *negated,
        }
    }

    fn ranges(&self) -> CharRanges {
        match self {
            ClassItem::Range(lo, hi) => {
                CharRanges::from_pairs(vec![(*lo as u32, *hi as u32)])
            }
            ClassItem::Perl(class, negated) => {
                let r = CharRanges::from_pairs(class.ranges().to_vec());
                if *negated {
                    r.negate()
                } else {
                    r
                }
            }
            ClassItem::Posix(name, negated) => {
                let r = CharRanges::from_pairs(
                    posix_ranges(name).unwrap_or(&[]).to_vec(),
                );
                if *negated {
                    r.negate()
                } else {
                    r
                }
            }
            ClassItem::Property(prop, negated) => {
                let (prop, negated) = (*prop, *negated);
                CharRanges::from_predicate(|c| prop.contains(c) != negated)
            }
        }
    }
}

fn in_table(table: &[(u32, u32)], c: char) -> bool {
    let c = c as u32;
    table.iter().any(|(lo, hi)| *lo <= c && c <= *hi)
}

/// A parsed character class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSet {
    negated: bool,
    items: Vec<ClassItem>,
}

impl ClassSet {
    /// Parses a class spec. The whole string must be consumed.
    pub fn parse(spec: &str) -> Result<ClassSet, Error> {
        let mut parser = ClassParser { spec, pos: 0, strict: false };
        let set = parser.parse_spec()?;
        if parser.pos != spec.len() {
            return Err(Error::syntax(
                "unexpected characters after character class",
                parser.pos,
            ));
        }
        Ok(set)
    }

    /// Same as [`ClassSet::parse`] but rejects escapes of characters that
    /// don't have a special meaning.
    pub fn parse_strict(spec: &str) -> Result<ClassSet, Error> {
        let mut parser = ClassParser { spec, pos: 0, strict: true };
        let set = parser.parse_spec()?;
        if parser.pos != spec.len() {
            return Err(Error::syntax(
                "unexpected characters after character class",
                parser.pos,
            ));
        }
        Ok(set)
    }

    /// Parses the bracket expression at the start of `s` and returns its
    /// length in bytes. Used by the lexer to find where a class ends.
    pub fn scan_bracket(s: &str) -> Result<usize, Error> {
        let mut parser = ClassParser { spec: s, pos: 0, strict: false };
        parser.parse_bracket()?;
        Ok(parser.pos)
    }

    /// True if this is a negated class (`[^...]`).
    #[inline]
    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// Items in the class.
    #[inline]
    pub fn items(&self) -> &[ClassItem] {
        self.items.as_slice()
    }

    /// True if the class contains `c`. When `case_insensitive` is true, the
    /// other cases of `c` are considered too.
    pub fn contains(&self, c: char, case_insensitive: bool) -> bool {
        let mut found = self.items.iter().any(|item| item.contains(c));
        if !found && case_insensitive {
            found = case_variants(c)
                .into_iter()
                .any(|v| self.items.iter().any(|item| item.contains(v)));
        }
        found != self.negated
    }

    /// Code point ranges covered by this class.
    pub fn ranges(&self, case_insensitive: bool) -> CharRanges {
        if case_insensitive {
            return CharRanges::from_predicate(|c| self.contains(c, true));
        }
        let mut ranges = CharRanges::default();
        for item in &self.items {
            ranges = ranges.union(&item.ranges());
        }
        if self.negated {
            ranges.negate()
        } else {
            ranges
        }
    }
}

/// Returns the other-case forms of `c` that are a single character.
pub(crate) fn case_variants(c: char) -> Vec<char> {
    let mut variants = Vec::new();
    let mut lower = c.to_lowercase();
    if let (Some(l), None) = (lower.next(), lower.next()) {
        if l != c {
            variants.push(l);
        }
    }
    let mut upper = c.to_uppercase();
    if let (Some(u), None) = (upper.next(), upper.next()) {
        if u != c && !variants.contains(&u) {
            variants.push(u);
        }
    }
    variants
}

/// Compares two characters, optionally ignoring case.
pub(crate) fn chars_eq(a: char, b: char, case_insensitive: bool) -> bool {
    a == b || (case_insensitive && case_variants(a).contains(&b))
}

struct ClassParser<'a> {
    spec: &'a str,
    pos: usize,
    strict: bool,
}

/// What a single escape inside a class (or in a pattern) stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Escaped {
    Char(char),
    Class(ClassItem),
}

impl<'a> ClassParser<'a> {
    fn peek(&self) -> Option<char> {
        self.spec[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn rest(&self) -> &'a str {
        &self.spec[self.pos..]
    }

    fn parse_spec(&mut self) -> Result<ClassSet, Error> {
        match self.peek() {
            Some('[') => self.parse_bracket(),
            Some('\\') => {
                let start = self.pos;
                self.bump();
                match parse_escape(self.rest(), self.strict)
                    .map_err(|e| offset(e, self.pos))?
                {
                    (Escaped::Class(item), len) => {
                        self.pos += len;
                        Ok(ClassSet { negated: false, items: vec![item] })
                    }
                    (Escaped::Char(_), _) => Err(Error::syntax(
                        "escape sequence is not a character class",
                        start,
                    )),
                }
            }
            _ => Err(Error::syntax("expecting a character class", self.pos)),
        }
    }

    fn parse_bracket(&mut self) -> Result<ClassSet, Error> {
        let open = self.pos;
        if self.bump() != Some('[') {
            return Err(Error::syntax("expecting '['", open));
        }
        let mut negated = false;
        if self.peek() == Some('^') {
            self.bump();
            negated = true;
        }
        let mut items = Vec::new();
        loop {
            let item_start = self.pos;
            let item = match self.peek() {
                None => {
                    return Err(Error::syntax(
                        "unclosed character class",
                        open,
                    ))
                }
                Some(']') => {
                    self.bump();
                    break;
                }
                Some('[') if self.rest().starts_with("[:") => {
                    self.parse_posix()?
                }
                Some('\\') => {
                    self.bump();
                    let (escaped, len) = parse_escape(self.rest(), self.strict)
                        .map_err(|e| offset(e, self.pos))?;
                    self.pos += len;
                    escaped
                }
                Some(c) => {
                    self.bump();
                    Escaped::Char(c)
                }
            };

            // A '-' that is not the last character in the class starts a
            // range.
            let is_range = self.peek() == Some('-')
                && !self.rest().starts_with("-]")
                && self.rest().len() > 1;

            if !is_range {
                items.push(match item {
                    Escaped::Char(c) => ClassItem::Range(c, c),
                    Escaped::Class(item) => item,
                });
                continue;
            }

            let lo = match item {
                Escaped::Char(c) => c,
                Escaped::Class(_) => {
                    return Err(Error::syntax(
                        "unmatched '-' in character class",
                        self.pos,
                    ))
                }
            };
            let dash = self.pos;
            self.bump();
            let hi = match self.peek() {
                Some('\\') => {
                    self.bump();
                    let (escaped, len) = parse_escape(self.rest(), self.strict)
                        .map_err(|e| offset(e, self.pos))?;
                    self.pos += len;
                    match escaped {
                        Escaped::Char(c) => c,
                        Escaped::Class(_) => {
                            return Err(Error::syntax(
                                "unmatched '-' in character class",
                                dash,
                            ))
                        }
                    }
                }
                Some('[') if self.rest().starts_with("[:") => {
                    return Err(Error::syntax(
                        "unmatched '-' in character class",
                        dash,
                    ))
                }
                Some(c) => {
                    self.bump();
                    c
                }
                None => {
                    return Err(Error::syntax(
                        "unclosed character class",
                        open,
                    ))
                }
            };
            if lo > hi {
                return Err(Error::syntax(
                    "invalid range in character class",
                    item_start,
                ));
            }
            items.push(ClassItem::Range(lo, hi));
        }

        if items.is_empty() {
            return Err(Error::syntax("empty character class", open));
        }

        Ok(ClassSet { negated, items })
    }

    fn parse_posix(&mut self) -> Result<Escaped, Error> {
        let start = self.pos;
        // Skip "[:"
        self.pos += 2;
        let negated = if self.peek() == Some('^') {
            self.bump();
            true
        } else {
            false
        };
        let name_start = self.pos;
        let end = match self.rest().find(":]") {
            Some(end) => end,
            None => {
                return Err(Error::syntax(
                    "unclosed POSIX character class",
                    start,
                ))
            }
        };
        let name = &self.spec[name_start..name_start + end];
        self.pos = name_start + end + 2;
        match POSIX_CLASSES.iter().find(|n| **n == name) {
            Some(name) => Ok(Escaped::Class(ClassItem::Posix(*name, negated))),
            None => Err(Error::syntax(
                format!("unknown POSIX class name `{}`", name),
                start,
            )),
        }
    }
}

fn offset(err: Error, base: usize) -> Error {
    let pos = err.position().unwrap_or(0) + base;
    Error::new(err.kind(), err.message().to_string()).at(pos)
}

/// Parses the escape sequence at the start of `s` (the backslash has
/// already been consumed) and returns what it stands for and its length.
///
/// Only escapes that denote characters or classes are handled here, escapes
/// like `\b` or `\1` are the lexer's business.
pub(crate) fn parse_escape(
    s: &str,
    strict: bool,
) -> Result<(Escaped, usize), Error> {
    let c = match s.chars().next() {
        Some(c) => c,
        None => {
            return Err(Error::new(
                ErrorKind::InvalidEscape,
                "pattern ends with a backslash",
            )
            .at(0))
        }
    };
    if let Some((class, negated)) = PerlClass::from_letter(c) {
        return Ok((Escaped::Class(ClassItem::Perl(class, negated)), 1));
    }
    let simple = match c {
        'n' => Some('\n'),
        't' => Some('\t'),
        'r' => Some('\r'),
        'f' => Some('\x0C'),
        'v' => Some('\x0B'),
        'a' => Some('\x07'),
        'e' => Some('\x1B'),
        '0' => Some('\0'),
        'b' => Some('\x08'),
        _ => None,
    };
    if let Some(ch) = simple {
        return Ok((Escaped::Char(ch), 1));
    }
    match c {
        'p' | 'P' => {
            let negated = c == 'P';
            let rest = &s[1..];
            let (name, len) = if let Some(inner) = rest.strip_prefix('{') {
                match inner.find('}') {
                    Some(end) => (&inner[..end], end + 3),
                    None => {
                        return Err(Error::new(
                            ErrorKind::InvalidEscape,
                            "unclosed Unicode property",
                        )
                        .at(0))
                    }
                }
            } else {
                match rest.chars().next() {
                    Some(n) if n.is_ascii_alphabetic() => (&rest[..1], 2),
                    _ => {
                        return Err(Error::new(
                            ErrorKind::InvalidEscape,
                            "invalid Unicode property escape",
                        )
                        .at(0))
                    }
                }
            };
            match UnicodeProperty::from_name(name) {
                Some(prop) => Ok((
                    Escaped::Class(ClassItem::Property(prop, negated)),
                    len,
                )),
                None => Err(Error::new(
                    ErrorKind::UnsupportedFeature,
                    format!("unknown Unicode property `{}`", name),
                )
                .at(0)),
            }
        }
        'x' => {
            let rest = &s[1..];
            let (digits, len) = if let Some(inner) = rest.strip_prefix('{') {
                match inner.find('}') {
                    Some(end) => (&inner[..end], end + 3),
                    None => {
                        return Err(Error::new(
                            ErrorKind::InvalidEscape,
                            "unclosed hex escape",
                        )
                        .at(0))
                    }
                }
            } else {
                let n = rest
                    .chars()
                    .take(2)
                    .take_while(|c| c.is_ascii_hexdigit())
                    .count();
                if n != 2 {
                    return Err(Error::new(
                        ErrorKind::InvalidEscape,
                        "hex escape needs two digits",
                    )
                    .at(0));
                }
                (&rest[..2], 3)
            };
            u32::from_str_radix(digits, 16)
                .ok()
                .and_then(char::from_u32)
                .map(|ch| (Escaped::Char(ch), len))
                .ok_or_else(|| {
                    Error::new(
                        ErrorKind::InvalidEscape,
                        "invalid code point in hex escape",
                    )
                    .at(0)
                })
        }
        c if c.is_ascii_alphanumeric() => Err(Error::new(
            ErrorKind::InvalidEscape,
            format!("unknown escape sequence `\\{}`", c),
        )
        .at(0)),
        c if strict && !is_meta(c) => Err(Error::new(
            ErrorKind::InvalidEscape,
            format!("unnecessary escape `\\{}`", c),
        )
        .at(0)),
        c => Ok((Escaped::Char(c), c.len_utf8())),
    }
}

/// Characters that have a special meaning somewhere in a pattern.
pub(crate) fn is_meta(c: char) -> bool {
    matches!(
        c,
        '\\' | '.'
            | '+'
            | '*'
            | '?'
            | '('
            | ')'
            | '|'
            | '['
            | ']'
            | '{'
            | '}'
            | '^'
            | '$'
            | '#'
            | '&'
            | '-'
            | '~'
            | '/'
            | '\''
            | '"'
            | ' '
            | ':'
            | '<'
            | '>'
            | '='
            | '!'
            | ','
    )
}

/// Writes `c` in a form that is read back as the literal character, both
/// in a pattern and inside a bracket expression.
pub(crate) fn escape_char(c: char, out: &mut String) {
    match c {
        '\n' => out.push_str("\\n"),
        '\t' => out.push_str("\\t"),
        '\r' => out.push_str("\\r"),
        c if c.is_control() || (c as u32) > 0x7E && !c.is_alphanumeric() => {
            let _ = write!(out, "\\x{{{:x}}}", c as u32);
        }
        c if is_meta(c) => {
            out.push('\\');
            out.push(c);
        }
        c => out.push(c),
    }
}

/// Sorted, non-overlapping list of inclusive code point ranges.
///
/// Surrogates are never included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CharRanges(Vec<(u32, u32)>);

impl CharRanges {
    /// Creates a normalized set from arbitrary pairs.
    pub fn from_pairs(mut pairs: Vec<(u32, u32)>) -> Self {
        pairs.retain(|(lo, hi)| lo <= hi);
        pairs.sort_unstable();
        let mut merged: Vec<(u32, u32)> = Vec::with_capacity(pairs.len());
        for (lo, hi) in pairs {
            match merged.last_mut() {
                Some(last) if lo <= last.1.saturating_add(1) => {
                    last.1 = last.1.max(hi);
                }
                _ => merged.push((lo, hi)),
            }
        }
        Self(merged).without_surrogates()
    }

    /// Builds the set of all characters for which `pred` is true.
    pub fn from_predicate<F: Fn(char) -> bool>(pred: F) -> Self {
        let mut pairs = Vec::new();
        let mut start: Option<u32> = None;
        for cp in 0..=MAX_CHAR + 1 {
            let hit = char::from_u32(cp).is_some_and(&pred);
            match (hit, start) {
                (true, None) => start = Some(cp),
                (false, Some(s)) => {
                    pairs.push((s, cp - 1));
                    start = None;
                }
                _ => {}
            }
        }
        Self::from_pairs(pairs)
    }

    /// Set containing a single character.
    pub fn single(c: char) -> Self {
        Self(vec![(c as u32, c as u32)])
    }

    /// Set of all characters.
    pub fn all() -> Self {
        Self::from_pairs(vec![(0, MAX_CHAR)])
    }

    fn without_surrogates(self) -> Self {
        let (s_lo, s_hi) = SURROGATES;
        let mut out = Vec::with_capacity(self.0.len() + 1);
        for (lo, hi) in self.0 {
            if hi < s_lo || lo > s_hi {
                out.push((lo, hi));
                continue;
            }
            if lo < s_lo {
                out.push((lo, s_lo - 1));
            }
            if hi > s_hi {
                out.push((s_hi + 1, hi));
            }
        }
        Self(out)
    }

    /// Ranges in the set.
    #[inline]
    pub fn ranges(&self) -> &[(u32, u32)] {
        self.0.as_slice()
    }

    /// True if the set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if the set contains `c`.
    pub fn contains(&self, c: char) -> bool {
        let c = c as u32;
        self.0
            .binary_search_by(|(lo, hi)| {
                if *hi < c {
                    std::cmp::Ordering::Less
                } else if *lo > c {
                    std::cmp::Ordering::Greater
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    /// Union of two sets.
    pub fn union(&self, other: &CharRanges) -> CharRanges {
        let mut pairs = self.0.clone();
        pairs.extend_from_slice(&other.0);
        Self::from_pairs(pairs)
    }

    /// Complement of the set.
    pub fn negate(&self) -> CharRanges {
        let mut pairs = Vec::with_capacity(self.0.len() + 1);
        let mut next = 0u32;
        for (lo, hi) in &self.0 {
            if *lo > next {
                pairs.push((next, lo - 1));
            }
            next = hi + 1;
        }
        if next <= MAX_CHAR {
            pairs.push((next, MAX_CHAR));
        }
        Self::from_pairs(pairs)
    }

    /// Writes the set as a class spec that [`ClassSet::parse`] reads back as
    /// the same set. A set with a single character is written as that
    /// character, escaped if necessary.
    pub fn to_spec(&self) -> String {
        let mut out = String::new();
        if let [(lo, hi)] = self.0.as_slice() {
            if lo == hi {
                if let Some(c) = char::from_u32(*lo) {
                    escape_char(c, &mut out);
                    return out;
                }
            }
        }
        out.push('[');
        for (lo, hi) in &self.0 {
            let (Some(lo), Some(hi)) = (char::from_u32(*lo), char::from_u32(*hi))
            else {
                continue;
            };
            escape_char(lo, &mut out);
            if hi != lo {
                out.push('-');
                escape_char(hi, &mut out);
            }
        }
        out.push(']');
        out
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{CharRanges, ClassItem, ClassSet, PerlClass};
    use crate::errors::ErrorKind;

    #[test]
    fn parse_bracket() {
        let set = ClassSet::parse("[a-z_]").unwrap();
        assert_eq!(
            set.items(),
            &[ClassItem::Range('a', 'z'), ClassItem::Range('_', '_')]
        );
        assert!(set.contains('q', false));
        assert!(!set.contains('Q', false));
        assert!(set.contains('Q', true));

        let set = ClassSet::parse("[^[:digit:]\\s]").unwrap();
        assert!(set.is_negated());
        assert!(!set.contains('5', false));
        assert!(!set.contains(' ', false));
        assert!(set.contains('x', false));

        let set = ClassSet::parse("\\d").unwrap();
        assert_eq!(set.items(), &[ClassItem::Perl(PerlClass::Digit, false)]);

        let set = ClassSet::parse("[-a-]").unwrap();
        assert!(set.contains('-', false));
        assert!(set.contains('a', false));
    }

    #[test]
    fn parse_errors() {
        let err = ClassSet::parse("[]").unwrap_err();
        assert_eq!(err.message(), "empty character class");

        let err = ClassSet::parse("[abc").unwrap_err();
        assert_eq!(err.message(), "unclosed character class");

        let err = ClassSet::parse("[z-a]").unwrap_err();
        assert_eq!(err.message(), "invalid range in character class");

        let err = ClassSet::parse("[\\d-z]").unwrap_err();
        assert_eq!(err.message(), "unmatched '-' in character class");

        let err = ClassSet::parse("[[:bogus:]]").unwrap_err();
        assert_eq!(err.message(), "unknown POSIX class name `bogus`");

        let err = ClassSet::parse("[\\q]").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidEscape);
        assert_eq!(err.position(), Some(2));

        let err = ClassSet::parse("\\p{Klingon}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFeature);
    }

    #[test]
    fn ranges() {
        let r = ClassSet::parse("[a-cx]").unwrap().ranges(false);
        assert_eq!(r.ranges(), &[(0x61, 0x63), (0x78, 0x78)]);

        let r = ClassSet::parse("[^\\x00-\\x{10FFFF}]").unwrap().ranges(false);
        assert!(r.is_empty());

        let r = ClassSet::parse("[^a]").unwrap().ranges(false);
        assert!(r.contains('b'));
        assert!(!r.contains('a'));
        assert!(!r.ranges().iter().any(|(lo, hi)| *lo <= 0xD800 && 0xD800 <= *hi));

        let r = ClassSet::parse("[k]").unwrap().ranges(true);
        assert_eq!(r.ranges(), &[(0x4B, 0x4B), (0x6B, 0x6B), (0x212A, 0x212A)]);
    }

    #[test]
    fn spec_round_trip() {
        let r = CharRanges::from_pairs(vec![(0x30, 0x39), (0x2D, 0x2D), (0x0A, 0x0A)]);
        let spec = r.to_spec();
        assert_eq!(spec, "[\\n\\-0-9]");
        assert_eq!(ClassSet::parse(&spec).unwrap().ranges(false), r);
        assert_eq!(CharRanges::single('.').to_spec(), "\\.");
    }
}

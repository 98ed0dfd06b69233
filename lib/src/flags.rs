use std::fmt::{Display, Formatter};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Flags that control how a pattern is compiled and matched.
    ///
    /// Bit values are stable, they are stored in serialized patterns and in
    /// the bytecode header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Flags: u32 {
        /// Letters match regardless of case.
        const CASE_INSENSITIVE = 0x0000_0001;
        /// `^` and `$` match at line boundaries.
        const MULTILINE = 0x0000_0002;
        /// `.` matches newlines too.
        const DOTALL = 0x0000_0004;
        /// Whitespace and `#` comments in the pattern are ignored.
        const EXTENDED = 0x0000_0008;
        /// Matches must start at the search position.
        const ANCHORED = 0x0000_0010;
        /// Quantifiers are lazy by default, `?` makes them greedy.
        const UNGREEDY = 0x0000_0040;
        /// Input is UTF-8. Always the case, kept for compatibility.
        const UTF8 = 0x0000_0080;
        /// The parser recovers from syntax errors.
        const ERROR_RECOVERY = 0x0000_1000;
        /// Escapes of characters without a special meaning are errors.
        const STRICT = 0x0800_0000;
        /// Run the optimization pipeline on the compiled automaton.
        const OPTIMIZE = 0x2000_0000;
        /// Accept the raw-literal form `R'...'`.
        const RIFT_SYNTAX = 0x4000_0000;
        /// Convert the automaton into a DFA at compile time.
        const USE_DFA = 0x8000_0000;
    }
}

/// Names used for flags in `.rift` files and configuration.
const FLAG_NAMES: &[(&str, Flags)] = &[
    ("CASE_INSENSITIVE", Flags::CASE_INSENSITIVE),
    ("MULTILINE", Flags::MULTILINE),
    ("DOTALL", Flags::DOTALL),
    ("EXTENDED", Flags::EXTENDED),
    ("ANCHORED", Flags::ANCHORED),
    ("UNGREEDY", Flags::UNGREEDY),
    ("UTF8", Flags::UTF8),
    ("ERROR_RECOVERY", Flags::ERROR_RECOVERY),
    ("STRICT", Flags::STRICT),
    ("OPTIMIZE", Flags::OPTIMIZE),
    ("RIFT_SYNTAX", Flags::RIFT_SYNTAX),
    ("USE_DFA", Flags::USE_DFA),
];

impl Flags {
    /// Returns the flag that corresponds to a modifier letter, as used in
    /// `(?imsx)` option groups and after raw literals.
    pub fn from_modifier(c: char) -> Option<Flags> {
        match c {
            'i' => Some(Flags::CASE_INSENSITIVE),
            'm' => Some(Flags::MULTILINE),
            's' => Some(Flags::DOTALL),
            'x' => Some(Flags::EXTENDED),
            'U' => Some(Flags::UNGREEDY),
            'X' => Some(Flags::STRICT),
            'r' => Some(Flags::RIFT_SYNTAX),
            _ => None,
        }
    }

    /// Parses a string of modifier letters like `"ims"`.
    ///
    /// Returns the first unknown letter as error.
    pub fn from_modifiers(s: &str) -> Result<Flags, char> {
        s.chars().try_fold(Flags::empty(), |flags, c| {
            Flags::from_modifier(c).map(|f| flags | f).ok_or(c)
        })
    }

    /// Returns the flag with the given name (e.g. `CASE_INSENSITIVE`).
    ///
    /// The prefix `RIFT_FLAG_` is accepted and ignored, and so is the case
    /// of the name.
    pub fn from_dsl_name(name: &str) -> Option<Flags> {
        let name = name.trim();
        let name = name.strip_prefix("RIFT_FLAG_").unwrap_or(name);
        FLAG_NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, f)| *f)
    }

    /// Names of the flags that are set, in bit order.
    pub fn names(&self) -> Vec<&'static str> {
        FLAG_NAMES
            .iter()
            .filter(|(_, f)| self.contains(*f))
            .map(|(n, _)| *n)
            .collect()
    }
}

impl Display for Flags {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        f.write_str(&self.names().join("|"))
    }
}

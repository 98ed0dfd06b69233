/*! Parses `.rift` files.

A `.rift` file declares named patterns, the flags they are compiled with,
and test cases describing what each pattern must (or must not) match:

```text
# Numbers with an optional fraction.
@pattern NUMBER = "\d+(\.\d+)?"
@flags = [OPTIMIZE]
@test_case { input = "3.14", expect_match = true, match_groups = [".14"] }
@test_case { input = "pi", expect_match = false }
```

Test cases apply to the most recently declared pattern, unless they name
one explicitly with `pattern = NAME`. The result of parsing is a
[`RiftFile`], where patterns and test cases are queried by index.

```
# use rift_parser::Parser;
let file = Parser::new(r#"
@pattern WORD = "\w+"
@test_case { input = "hello" }
"#).parse().unwrap();

assert_eq!(file.pattern(0).unwrap().source, r"\w+");
assert_eq!(file.test_case(0).unwrap().input, "hello");
```
*/

use std::fmt::{Display, Formatter};
use std::ops::Range;

pub use crate::ast::{PatternDecl, RiftFile, TestCase};
pub use crate::errors::{Error, ErrorKind};
pub use crate::parser::Parser;

pub mod ast;

mod errors;
mod parser;
mod tokenizer;

/// Parses a `.rift` file.
///
/// This is a shortcut for `Parser::new(source).parse()`.
pub fn parse(source: &str) -> Result<RiftFile, Error> {
    Parser::new(source).parse()
}

/// Starting and ending positions of some token inside the source code.
#[derive(Default, Clone, Debug, Hash, Eq, PartialEq)]
pub struct Span(pub Range<u32>);

impl From<logos::Span> for Span {
    fn from(value: logos::Span) -> Self {
        Self(value.start as u32..value.end as u32)
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}..{}]", self.start(), self.end())
    }
}

impl Span {
    const MAX: usize = u32::MAX as usize;

    /// Offset within the source code (in bytes) were the span starts.
    #[inline]
    pub fn start(&self) -> usize {
        self.0.start as usize
    }

    /// Offset within the source code (in bytes) where the span ends.
    #[inline]
    pub fn end(&self) -> usize {
        self.0.end as usize
    }

    /// Returns the span as a range of byte offsets.
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.0.start as usize..self.0.end as usize
    }

    /// Returns a new [`Span`] that combines this span with `other`.
    ///
    /// The resulting span goes from `self.start()` to `other.end()`.
    pub fn combine(&self, other: &Self) -> Self {
        Self(self.0.start..other.0.end)
    }
}

/*! A regular expression engine built on finite automata.

RIFT compiles patterns into automata that can be executed in several ways:
by backtracking over the NFA (the default, supporting every construct,
including backreferences, lookarounds and atomic groups), by simulating the
NFA in lockstep, or by walking a DFA obtained with subset construction.
Compiled automata can also be lowered into a compact bytecode [`Program`]
that is serialized into a portable binary format.

Matching never runs unbounded. Every operation is subject to limits on
backtracking depth, elapsed time and number of transitions, and a
[`BailoutManager`] can abandon matches that show pathological behaviour.

There are two main types in this crate: [`Pattern`] and [`MatcherContext`].
A pattern is compiled once and is immutable, so it can be shared between
threads. A matcher context holds the input, a cursor and the capture groups
of the last match. Contexts are cheap, and each thread uses its own. The
[`ThreadSafeContext`] hands one to each thread that calls it.

# Example

```rust
# use rift::{Flags, MatcherContext, Pattern};
// Compile a pattern.
let pattern = Pattern::new(r"(\w+)@(\w+)\.com", Flags::empty()).unwrap();

// Create a context with the input.
let input = "write to joe@example.com";
let mut ctx = MatcherContext::with_input(input);

// Find the first match.
let m = ctx.find_next(&pattern).unwrap().unwrap();

assert_eq!(m.as_str(input), "joe@example.com");
assert_eq!(m.group(2).and_then(|g| g.as_str(input)), Some("example"));
```
*/

pub use automaton::Automaton;
pub use automaton::AutomatonKind;

pub use bytecode::Program;

pub use config::EngineConfig;

pub use errors::Error;
pub use errors::ErrorKind;
pub use errors::Status;

pub use flags::Flags;

pub use pattern::Pattern;

pub use runtime::BailoutManager;
pub use runtime::CaptureGroup;
pub use runtime::ExecMode;
pub use runtime::Executable;
pub use runtime::LimitConfig;
pub use runtime::LimitRegistry;
pub use runtime::Match;
pub use runtime::MatcherContext;
pub use runtime::ThreadSafeContext;

pub mod automaton;
pub mod baseline;
pub mod bytecode;
pub mod compiler;
pub mod config;
pub mod dsl;
pub mod errors;
pub mod flags;
pub mod pattern;
pub mod re;
pub mod runtime;

mod stack;

#[cfg(test)]
mod tests;

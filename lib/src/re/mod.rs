/*! Parsing of regular expression patterns.

Patterns go through three stages before they are handed to the compiler:
the [`lexer::Lexer`] splits the source into tokens, the [`parser::Parser`]
builds a [`ast::SyntaxTree`] out of them and the [`validator::Validator`]
checks the rules that can't be expressed in the grammar, like backreferences
to groups that don't exist.

Besides the conventional syntax, patterns can be written as raw literals,
`R'...'` or `R"..."`, followed by optional modifier letters. The body of a
raw literal is a pattern like any other, but the modifiers after the closing
quote are merged into the pattern's flags. Raw literals are only accepted
when the RIFT_SYNTAX flag is set.

Character classes are handled by the [`class`] module, which is shared with
the automaton, whose transitions are labelled with class specs.
*/

use crate::errors::Error;
use crate::flags::Flags;

pub mod ast;
pub mod class;
pub mod lexer;
pub mod parser;
pub mod validator;

#[cfg(test)]
mod tests;

/// Parses and validates `source` with the default limits.
pub fn parse(source: &str, flags: Flags) -> Result<ast::SyntaxTree, Error> {
    let tree = parser::Parser::new().flags(flags).parse(source)?;
    validator::Validator::new().validate(&tree)?;
    Ok(tree)
}

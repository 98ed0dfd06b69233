/*! Error types shared by every component of the engine.

All fallible operations return [`Error`], which carries an [`ErrorKind`]
from a closed taxonomy, a short human readable message and, when the error
can be traced back to the pattern source, the byte offset where it was
detected. Hosts that need a coarser classification use [`Status`].
*/

use std::fmt::{Display, Formatter};

use thiserror::Error;

/// Maximum length in bytes of an error message.
pub const MAX_MESSAGE_LEN: usize = 256;

/// Closed set of error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorKind {
    /// No error.
    None = 0,
    /// Memory could not be obtained.
    Memory = 1,
    /// A parameter was out of range or otherwise invalid.
    InvalidParameter = 2,
    /// Internal inconsistency.
    Internal = 3,
    /// Syntax error in a pattern.
    Syntax = 4,
    /// Unknown or malformed escape sequence.
    InvalidEscape = 5,
    /// A buffer was too small for the requested operation.
    BufferOverflow = 6,
    /// The pattern uses a feature that is not supported.
    UnsupportedFeature = 7,
    /// Some limit (depth, transitions, size) was exceeded.
    LimitExceeded = 8,
    /// The deadline of a match operation elapsed.
    Timeout = 9,
    /// The automaton is malformed or could not be built.
    InvalidAutomaton = 10,
    /// The bytecode is malformed.
    InvalidBytecode = 11,
    /// Conversion between representations failed.
    ConversionFailed = 12,
    /// The parser found a token it didn't expect.
    UnexpectedToken = 13,
    /// An allocation failed.
    MemoryAllocation = 14,
    /// The operation is not supported for this input.
    UnsupportedOperation = 15,
}

impl ErrorKind {
    /// All the error kinds, in code order.
    pub const ALL: [ErrorKind; 16] = [
        ErrorKind::None,
        ErrorKind::Memory,
        ErrorKind::InvalidParameter,
        ErrorKind::Internal,
        ErrorKind::Syntax,
        ErrorKind::InvalidEscape,
        ErrorKind::BufferOverflow,
        ErrorKind::UnsupportedFeature,
        ErrorKind::LimitExceeded,
        ErrorKind::Timeout,
        ErrorKind::InvalidAutomaton,
        ErrorKind::InvalidBytecode,
        ErrorKind::ConversionFailed,
        ErrorKind::UnexpectedToken,
        ErrorKind::MemoryAllocation,
        ErrorKind::UnsupportedOperation,
    ];

    /// Stable numeric code for this kind.
    #[inline]
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Returns the kind with the given numeric code.
    pub fn from_code(code: u32) -> Option<ErrorKind> {
        Self::ALL.get(code as usize).copied()
    }

    /// Name of the kind as it appears in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::None => "NONE",
            ErrorKind::Memory => "MEMORY",
            ErrorKind::InvalidParameter => "INVALID_PARAMETER",
            ErrorKind::Internal => "INTERNAL",
            ErrorKind::Syntax => "SYNTAX",
            ErrorKind::InvalidEscape => "INVALID_ESCAPE",
            ErrorKind::BufferOverflow => "BUFFER_OVERFLOW",
            ErrorKind::UnsupportedFeature => "UNSUPPORTED_FEATURE",
            ErrorKind::LimitExceeded => "LIMIT_EXCEEDED",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::InvalidAutomaton => "INVALID_AUTOMATON",
            ErrorKind::InvalidBytecode => "INVALID_BYTECODE",
            ErrorKind::ConversionFailed => "CONVERSION_FAILED",
            ErrorKind::UnexpectedToken => "UNEXPECTED_TOKEN",
            ErrorKind::MemoryAllocation => "MEMORY_ALLOCATION",
            ErrorKind::UnsupportedOperation => "UNSUPPORTED_OPERATION",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Error produced by the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    position: Option<usize>,
}

impl Error {
    /// Creates a new error. Messages longer than [`MAX_MESSAGE_LEN`] are
    /// truncated.
    pub fn new<M: Into<String>>(kind: ErrorKind, message: M) -> Self {
        let mut message = message.into();
        if message.len() > MAX_MESSAGE_LEN {
            let mut end = MAX_MESSAGE_LEN;
            while !message.is_char_boundary(end) {
                end -= 1;
            }
            message.truncate(end);
        }
        Self { kind, message, position: None }
    }

    /// Attaches a byte position to the error.
    pub fn at(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }

    /// Kind of the error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human readable message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Byte offset in the pattern source where the error was detected, if
    /// known.
    #[inline]
    pub fn position(&self) -> Option<usize> {
        self.position
    }

    /// Status kind used by hosts for this error.
    #[inline]
    pub fn status(&self) -> Status {
        Status::from(self.kind)
    }

    pub(crate) fn syntax<M: Into<String>>(message: M, position: usize) -> Self {
        Self::new(ErrorKind::Syntax, message).at(position)
    }

    pub(crate) fn invalid_parameter<M: Into<String>>(message: M) -> Self {
        Self::new(ErrorKind::InvalidParameter, message)
    }

    pub(crate) fn internal<M: Into<String>>(message: M) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub(crate) fn limit_exceeded<M: Into<String>>(message: M) -> Self {
        Self::new(ErrorKind::LimitExceeded, message)
    }

    pub(crate) fn unsupported_operation<M: Into<String>>(message: M) -> Self {
        Self::new(ErrorKind::UnsupportedOperation, message)
    }

    pub(crate) fn invalid_bytecode<M: Into<String>>(message: M) -> Self {
        Self::new(ErrorKind::InvalidBytecode, message)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.position {
            Some(pos) => write!(f, "{} at offset {}", self.message, pos),
            None => f.write_str(&self.message),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::new(ErrorKind::ConversionFailed, err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::new(ErrorKind::ConversionFailed, err.to_string())
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::new(ErrorKind::InvalidParameter, err.to_string())
    }
}

impl From<rift_parser::Error> for Error {
    fn from(err: rift_parser::Error) -> Self {
        let position = err.span().start();
        Error::new(ErrorKind::Syntax, err.to_string()).at(position)
    }
}

/// Process-wide status kinds used by hosts (like a command-line tool).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Success.
    Ok,
    /// Memory allocation failed.
    MemoryAllocation,
    /// Invalid parameter.
    InvalidParameter,
    /// Internal error.
    Internal,
    /// Buffer too small.
    BufferOverflow,
    /// Some limit was exceeded.
    LimitExceeded,
    /// A timeout elapsed.
    Timeout,
    /// The pattern has a syntax error.
    Syntax,
    /// The pattern or operation is not supported.
    Unsupported,
    /// Some serialized or in-memory representation is malformed.
    InvalidData,
    /// Unclassified error.
    Unknown,
}

impl Status {
    /// Exit code for a command-line host.
    ///
    /// `0` success, `1` general error, `2` invalid arguments, `3` compile
    /// error.
    pub fn exit_code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::InvalidParameter => 2,
            Status::Syntax | Status::Unsupported => 3,
            _ => 1,
        }
    }
}

impl From<ErrorKind> for Status {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::None => Status::Ok,
            ErrorKind::Memory | ErrorKind::MemoryAllocation => {
                Status::MemoryAllocation
            }
            ErrorKind::InvalidParameter => Status::InvalidParameter,
            ErrorKind::Internal => Status::Internal,
            ErrorKind::BufferOverflow => Status::BufferOverflow,
            ErrorKind::LimitExceeded => Status::LimitExceeded,
            ErrorKind::Timeout => Status::Timeout,
            ErrorKind::Syntax
            | ErrorKind::InvalidEscape
            | ErrorKind::UnexpectedToken => Status::Syntax,
            ErrorKind::UnsupportedFeature
            | ErrorKind::UnsupportedOperation => Status::Unsupported,
            ErrorKind::InvalidAutomaton
            | ErrorKind::InvalidBytecode
            | ErrorKind::ConversionFailed => Status::InvalidData,
        }
    }
}

impl From<Status> for ErrorKind {
    fn from(status: Status) -> Self {
        match status {
            Status::Ok => ErrorKind::None,
            Status::MemoryAllocation => ErrorKind::Memory,
            Status::InvalidParameter => ErrorKind::InvalidParameter,
            Status::BufferOverflow => ErrorKind::BufferOverflow,
            Status::LimitExceeded => ErrorKind::LimitExceeded,
            Status::Timeout => ErrorKind::Timeout,
            Status::Syntax => ErrorKind::Syntax,
            Status::Unsupported => ErrorKind::UnsupportedFeature,
            Status::InvalidData => ErrorKind::InvalidBytecode,
            Status::Internal | Status::Unknown => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{Error, ErrorKind, Status, MAX_MESSAGE_LEN};

    #[test]
    fn codes_round_trip() {
        for kind in ErrorKind::ALL {
            assert_eq!(ErrorKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(ErrorKind::from_code(16), None);
    }

    #[test]
    fn status_mapping_is_total() {
        for kind in ErrorKind::ALL {
            let status = Status::from(kind);
            // Mapping back and forth must land on a kind with the same status.
            assert_eq!(Status::from(ErrorKind::from(status)), status);
        }
        assert_eq!(Status::from(ErrorKind::None), Status::Ok);
        assert_eq!(Status::from(ErrorKind::Timeout), Status::Timeout);
        assert_eq!(ErrorKind::from(Status::Unknown), ErrorKind::Internal);
    }

    #[test]
    fn message_is_bounded() {
        let err = Error::new(ErrorKind::Syntax, "é".repeat(300));
        assert!(err.message().len() <= MAX_MESSAGE_LEN);
        assert_eq!(err.message().chars().count(), MAX_MESSAGE_LEN / 2);
    }

    #[test]
    fn display() {
        let err = Error::syntax("unbalanced parenthesis", 3);
        assert_eq!(err.to_string(), "unbalanced parenthesis at offset 3");
        assert_eq!(err.status().exit_code(), 3);
    }
}

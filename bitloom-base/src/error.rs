// We want a few things here:
// 1. A way to create a new error with a backtrace
// 2. A way to centralize setting a breakpoint to trap any error in the system fairly soon
//    after it's created (or at least when it's propagated from a library we use back to us)
// 3. Same but for logging / emitting error messages into the tracing/logging system
// 4. A semantic kind on every error, so callers and tests can tell a failed
//    zeros-check from a bad pattern without parsing message strings.

use backtrace_error::DynBacktraceError;
use std::borrow::Cow;
use tracing::error;

#[cfg(test)]
use test_log::test;

/// Semantic classification of engine failures. Every error is fatal to the
/// maker that raised it; there is no in-band recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The tokenizer could not consume the pattern at some position.
    InvalidPattern,
    /// A read returned fewer bits than the pattern required, or the data
    /// stream ran dry during construction.
    IncompleteData,
    /// A `z<n>` check found a set bit.
    Zeros,
    /// An `o<n>` check found a clear bit.
    Ones,
    /// An `=expr;` equality check failed.
    Assertion,
    /// An `=#"L"` label equality check failed.
    MatchLabel,
    /// Unbalanced `[` / `]`.
    Nesting,
    /// An operation that needs a byte boundary ran off one.
    Alignment,
    /// An endian swap was applied to a width that is not a multiple of 8.
    EndianWidth,
    /// A jump or marker would have to revisit already-parsed bits.
    NonConstructibleJump,
    /// A label was referenced before any binding.
    UnknownLabel,
    /// A reversal partially overlaps one scheduled by an earlier operation,
    /// which would break buffer<->format coordinate translation.
    OverlappingReversal,
    /// Anything propagated from outside the engine.
    Other,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    #[allow(dead_code)]
    inner: DynBacktraceError,
}
pub type Result<T> = std::result::Result<T, Error>;

struct SimpleErr(Cow<'static, str>);
impl std::fmt::Debug for SimpleErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Display for SimpleErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for SimpleErr {}

impl<E: std::error::Error + Send + Sync + 'static> From<E> for Error {
    fn from(err: E) -> Error {
        Error::new(err)
    }
}

impl Error {
    pub fn new<E: std::error::Error + Send + Sync + 'static>(err: E) -> Error {
        Error::with_kind(ErrorKind::Other, err)
    }

    pub fn with_kind<E: std::error::Error + Send + Sync + 'static>(
        kind: ErrorKind,
        err: E,
    ) -> Error {
        error!(target: "bitloom", "{:?}: {:?}", kind, err);
        let dbe = DynBacktraceError::from(err);
        Error { kind, inner: dbe }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub fn err(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::new(SimpleErr(msg.into()))
}

pub fn fail(kind: ErrorKind, msg: impl Into<Cow<'static, str>>) -> Error {
    Error::with_kind(kind, SimpleErr(msg.into()))
}

#[test]
fn test_error() {
    let e = err("test error");
    assert_eq!(e.kind(), ErrorKind::Other);
    let e = fail(ErrorKind::Zeros, "nonzero bit");
    assert_eq!(e.kind(), ErrorKind::Zeros);
}

//! Error interface for this crate.
//!
//! Every error type raised by the parser, assembler, and simulator
//! implements [`Error`], which exposes optional span and help information
//! that a front-end can use to render a precise diagnostic.
//!
//! This module also re-exports the error types of the other modules.
use std::borrow::Cow;
use std::ops::Range;

pub use crate::asm::{AsmDiagnostic, AsmErrKind, AsmErrors};
pub use crate::config::ConfigErr;
pub use crate::parse::lex::LexErr;
pub use crate::parse::{ParseErr, ParseErrKind};
pub use crate::sim::exception::{FaultReport, RuntimeFault};
pub use crate::sim::mem::MemErr;
pub use crate::sim::{LoadErr, SimErr};

/// Column spans (within one source line) which are associated with an error.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum ErrSpan {
    /// One span.
    One(Range<usize>),
    /// Two spans.
    Two([Range<usize>; 2]),
    /// Any number of spans.
    Many(Vec<Range<usize>>),
}
impl ErrSpan {
    /// Gets the first span of this error span.
    pub fn first(&self) -> Range<usize> {
        match self {
            ErrSpan::One(r)      => r.clone(),
            ErrSpan::Two([r, _]) => r.clone(),
            ErrSpan::Many(r)     => r.first().cloned().unwrap_or(0..0),
        }
    }

    /// Iterates over all spans.
    pub fn iter(&self) -> impl Iterator<Item=&Range<usize>> {
        match self {
            ErrSpan::One(r)  => std::slice::from_ref(r).iter(),
            ErrSpan::Two(r)  => r.iter(),
            ErrSpan::Many(r) => r.iter(),
        }
    }
}
impl From<Range<usize>> for ErrSpan {
    fn from(value: Range<usize>) -> Self {
        ErrSpan::One(value)
    }
}
impl From<[Range<usize>; 2]> for ErrSpan {
    fn from(value: [Range<usize>; 2]) -> Self {
        ErrSpan::Two(value)
    }
}
impl From<Vec<Range<usize>>> for ErrSpan {
    fn from(value: Vec<Range<usize>>) -> Self {
        match <[_; 2]>::try_from(value) {
            Ok(pair) => ErrSpan::Two(pair),
            Err(mut v) if v.len() == 1 => ErrSpan::One(v.remove(0)),
            Err(v) => ErrSpan::Many(v),
        }
    }
}

/// Unified error interface for all errors in this crate.
///
/// Note that the [`Display`] implementation is used for a brief message,
/// whereas [`Error::help`] is used for any clarifying messages.
///
/// [`Display`]: std::fmt::Display
pub trait Error: std::error::Error {
    /// The range where this error occurs in source (if it applies).
    fn span(&self) -> Option<ErrSpan> {
        None
    }

    /// A clarifying message to help aid someone in how to fix the message.
    fn help(&self) -> Option<Cow<str>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::ErrSpan;

    #[test]
    fn test_span_from_vec() {
        assert_eq!(ErrSpan::from(vec![0..2]), ErrSpan::One(0..2));
        assert_eq!(ErrSpan::from(vec![0..2, 4..5]), ErrSpan::Two([0..2, 4..5]));
        assert_eq!(ErrSpan::from(vec![0..2, 4..5, 7..9]), ErrSpan::Many(vec![0..2, 4..5, 7..9]));
        assert_eq!(ErrSpan::Many(vec![]).first(), 0..0);
    }
}

//! Module containing the universal error type
use std::time::Duration;
use thiserror::Error;

/// Universal error type for `placefield`
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The expression could not be parsed
    #[error("syntax error in `{expr}` at offset {offset}: {message}")]
    Syntax {
        /// Full text of the offending expression
        expr: String,
        /// Byte offset at which parsing failed
        offset: usize,
        /// Human-readable description
        message: String,
    },

    /// Reference to a variable which is neither free nor bound by `sum`
    #[error("`{0}` is not defined")]
    UnknownVariable(String),

    /// Call to a function which is not a builtin
    #[error("`{0}` is not a function")]
    UnknownFunction(String),

    /// Builtin called with the wrong number of arguments
    #[error("`{name}` expects {expected} argument(s), got {actual}")]
    BadArity {
        /// Builtin name
        name: &'static str,
        /// Human-readable arity, e.g. "2" or "at least 1"
        expected: &'static str,
        /// Number of arguments at the call site
        actual: usize,
    },

    /// The first argument of `sum` must be a plain identifier
    #[error("`sum` needs an identifier as its first argument")]
    BadSumBinding,

    /// Evaluation was stopped by a cancel token or its deadline
    #[error("evaluation was interrupted")]
    Interrupted,

    /// The grid renderer failed for a reason of its own
    #[error("renderer failed: {0}")]
    Renderer(String),

    /// The worker panicked while rendering
    #[error("worker panicked: {0}")]
    WorkerPanic(String),

    /// The worker exited without reporting a result
    #[error("worker exited without reporting a result")]
    WorkerLost,

    /// The batch did not finish before its deadline
    #[error("evaluation exceeded the {0:?} deadline")]
    Timeout(Duration),

    /// The operating system refused to start a worker
    #[error("could not spawn worker: {0}")]
    Spawn(String),

    /// Free variable names must be distinct identifiers
    #[error("invalid free variable names `{0}` and `{1}`")]
    BadFreeVars(String, String),
}

/// Coarse classification of an [`Error`]
///
/// Hosts use this to pick messaging: a `Syntax` or `RuntimeFault` means the
/// expression itself is wrong, while `Timeout` means it was too expensive.
#[derive(Copy, Clone, Debug, Eq, PartialEq, strum::Display)]
pub enum ErrorKind {
    /// The expression failed to compile
    Syntax,
    /// The expression (or renderer) failed during evaluation
    RuntimeFault,
    /// The batch ran past its deadline
    Timeout,
}

impl Error {
    /// Classifies this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Syntax { .. } | Error::BadFreeVars(..) => ErrorKind::Syntax,
            // A worker that never started is not the expression's fault
            Error::Timeout(..) | Error::Interrupted | Error::Spawn(..) => {
                ErrorKind::Timeout
            }
            Error::UnknownVariable(..)
            | Error::UnknownFunction(..)
            | Error::BadArity { .. }
            | Error::BadSumBinding
            | Error::Renderer(..)
            | Error::WorkerPanic(..)
            | Error::WorkerLost => ErrorKind::RuntimeFault,
        }
    }

    /// Checks whether this error should mark the expression as invalid
    pub fn is_expression_fault(&self) -> bool {
        matches!(self.kind(), ErrorKind::Syntax | ErrorKind::RuntimeFault)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_kinds() {
        let e = Error::Syntax {
            expr: "x +* y".to_owned(),
            offset: 3,
            message: "unexpected `*`".to_owned(),
        };
        assert_eq!(e.kind(), ErrorKind::Syntax);
        assert!(e.is_expression_fault());

        let e = Error::UnknownVariable("z".to_owned());
        assert_eq!(e.kind(), ErrorKind::RuntimeFault);
        assert!(e.is_expression_fault());

        let e = Error::Timeout(Duration::from_millis(2000));
        assert_eq!(e.kind(), ErrorKind::Timeout);
        assert!(!e.is_expression_fault());
        assert_eq!(e.to_string(), "evaluation exceeded the 2s deadline");
    }
}

//! Error handling for the SIL toolchain
//!
//! Two regimes live here. [`Error`] is the user-facing diagnostic raised while
//! reading SIL text; it always carries a [`Span`]. [`InvariantViolation`] is
//! the payload of a fatal panic raised when an optimizer or link-naming
//! precondition does not hold, which means an earlier stage produced bad IR.

use std::fmt;

use crate::utils::{SourceMap, Span};
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Parser error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // ==================== Syntax Errors ====================

    #[error("expected {expected}, got {got}")]
    UnexpectedToken {
        expected: String,
        got: String,
        span: Span,
    },

    #[error("expected {0}")]
    Expected(String, Span),

    #[error("invalid literal '{text}'")]
    InvalidLiteral { text: String, span: Span },

    #[error("unknown instruction '{name}'")]
    UnknownOpcode { name: String, span: Span },

    #[error("unknown attribute '[{name}]'")]
    UnknownAttribute { name: String, span: Span },

    // ==================== Name Resolution Errors ====================

    #[error("use of undefined basic block '{name}'")]
    UndefinedBlock { name: String, span: Span },

    #[error("use of undefined value '%{name}'")]
    UndefinedValue { name: String, span: Span },

    #[error("use of undefined function '@{name}'")]
    UndefinedFunction { name: String, span: Span },

    #[error("use of undefined global '@{name}'")]
    UndefinedGlobal { name: String, span: Span },

    #[error("use of undefined scope {slot}")]
    UndefinedScope { slot: u32, span: Span },

    #[error("redefinition of '{name}'")]
    Redefinition { name: String, span: Span },

    #[error("unknown type '{name}'")]
    UnknownType { name: String, span: Span },

    #[error("type '{ty}' has no field '{field}'")]
    UnknownField {
        ty: String,
        field: String,
        span: Span,
    },

    #[error("type '{ty}' has no case '{case}'")]
    UnknownCase {
        ty: String,
        case: String,
        span: Span,
    },

    // ==================== Consistency Errors ====================

    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        expected: String,
        got: String,
        span: Span,
    },

    #[error("ownership mismatch: expected {expected}, got {got}")]
    OwnershipMismatch {
        expected: String,
        got: String,
        span: Span,
    },

    #[error("argument count mismatch: expected {expected}, got {got}")]
    ArgCountMismatch {
        expected: usize,
        got: usize,
        span: Span,
    },

    #[error("basic block '{block}' does not end in a terminator")]
    MissingTerminator { block: String, span: Span },

    #[error("{message}")]
    Malformed { message: String, span: Span },
}

impl Error {
    /// Get the span associated with this error
    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedToken { span, .. } => *span,
            Self::Expected(_, span) => *span,
            Self::InvalidLiteral { span, .. } => *span,
            Self::UnknownOpcode { span, .. } => *span,
            Self::UnknownAttribute { span, .. } => *span,
            Self::UndefinedBlock { span, .. } => *span,
            Self::UndefinedValue { span, .. } => *span,
            Self::UndefinedFunction { span, .. } => *span,
            Self::UndefinedGlobal { span, .. } => *span,
            Self::UndefinedScope { span, .. } => *span,
            Self::Redefinition { span, .. } => *span,
            Self::UnknownType { span, .. } => *span,
            Self::UnknownField { span, .. } => *span,
            Self::UnknownCase { span, .. } => *span,
            Self::TypeMismatch { span, .. } => *span,
            Self::OwnershipMismatch { span, .. } => *span,
            Self::ArgCountMismatch { span, .. } => *span,
            Self::MissingTerminator { span, .. } => *span,
            Self::Malformed { span, .. } => *span,
        }
    }
}

/// An [`Error`] resolved against the source text it was reported for.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub error: Error,
    pub line: usize,
    pub column: usize,
}

impl Diagnostic {
    pub fn new(error: Error, map: &SourceMap) -> Self {
        let (line, column) = map.line_col(error.span().start);
        Self {
            error,
            line,
            column,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: error: {}", self.line, self.column, self.error)
    }
}

/// Panic payload for a violated internal invariant.
///
/// Raised through [`sil_invariant!`](crate::sil_invariant) with
/// `std::panic::panic_any`, so a harness can tell it apart from ordinary
/// panics by downcasting the unwind payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation {
    pub message: String,
    pub file: &'static str,
    pub line: u32,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "internal invariant violated - {}:{}: {}",
            self.file, self.line, self.message
        )
    }
}

/// Asserts an internal invariant, raising an [`InvariantViolation`] panic
/// when it does not hold.
#[macro_export]
macro_rules! sil_invariant {
    ($cond:expr, $msg:expr) => {
        if !$cond {
            $crate::invariant_violation!($msg);
        }
    };

    ($cond:expr, $fmt:expr, $($arg:tt)*) => {
        if !$cond {
            $crate::invariant_violation!($fmt, $($arg)*);
        }
    };
}

/// Unconditionally raises an [`InvariantViolation`] panic.
#[macro_export]
macro_rules! invariant_violation {
    ($msg:expr) => {
        ::std::panic::panic_any($crate::utils::InvariantViolation {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        })
    };

    ($fmt:expr, $($arg:tt)*) => {
        ::std::panic::panic_any($crate::utils::InvariantViolation {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        })
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic;

    #[test]
    fn test_diagnostic_location() {
        let map = SourceMap::new("sil @f\n  bogus\n");
        let error = Error::UnknownOpcode {
            name: "bogus".into(),
            span: Span::new(9, 14),
        };
        let diag = Diagnostic::new(error, &map);
        assert_eq!((diag.line, diag.column), (2, 3));
        assert_eq!(diag.to_string(), "2:3: error: unknown instruction 'bogus'");
    }

    #[test]
    fn test_invariant_payload_is_distinguishable() {
        let result = panic::catch_unwind(|| {
            crate::sil_invariant!(1 + 1 == 3, "arithmetic is broken: {}", 2);
        });
        let payload = result.unwrap_err();
        let violation = payload
            .downcast_ref::<InvariantViolation>()
            .expect("invariant payload");
        assert_eq!(violation.message, "arithmetic is broken: 2");
    }
}

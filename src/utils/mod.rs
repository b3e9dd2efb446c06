//! Utility module

mod error;
mod span;

pub use error::{Diagnostic, Error, InvariantViolation, Result};
pub use span::{SourceMap, Span};

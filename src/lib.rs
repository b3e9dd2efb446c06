//! silc - SIL compiler core
//!
//! The SSA control-flow-graph IR ("SIL") with its textual parser and
//! printer, the simplify-cfg pass, and the subsystem that names and links
//! the symbols emitted for it.

pub mod ast;
pub mod backend;
pub mod frontend;
pub mod middle;
pub mod types;
pub mod utils;

pub use frontend::{parse_sil, parse_sil_module};
pub use middle::ir::{Function, SilModule};
pub use utils::{Diagnostic, Error, InvariantViolation, Result};

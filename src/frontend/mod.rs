//! Frontend module - SIL lexer and parser

pub mod lexer;
pub mod parser;
pub mod token;

pub use parser::{parse_sil, parse_sil_module};

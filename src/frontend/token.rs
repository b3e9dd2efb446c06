//! Token definitions for SIL text

use std::fmt;

use crate::utils::Span;

/// A token produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// First token of its line, with no indentation
    pub at_line_start: bool,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span, at_line_start: bool) -> Self {
        Self {
            kind,
            span,
            at_line_start,
        }
    }

    pub fn eof(span: Span) -> Self {
        Self::new(TokenKind::Eof, span, true)
    }

    /// The identifier text, if this is an identifier
    pub fn ident(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Ident(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_ident(&self, text: &str) -> bool {
        self.ident() == Some(text)
    }
}

/// Token kinds. SIL keywords are contextual, so they lex as identifiers.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // ============ Names ============
    /// bb0, integer_literal, Builtin
    Ident(String),
    /// %0, %x
    LocalName(String),
    /// @foo, @owned, @convention
    AtName(String),

    // ============ Literals ============
    /// Decimal or 0x-prefixed hexadecimal, optionally negative
    Integer(i128),
    StringLit(String),

    // ============ Punctuation ============
    /// $
    Dollar,
    /// #
    Hash,
    /// !
    Bang,
    /// *
    Star,
    /// .
    Dot,
    /// ,
    Comma,
    /// :
    Colon,
    /// =
    Equal,
    /// ->
    Arrow,
    /// (
    LParen,
    /// )
    RParen,
    /// {
    LBrace,
    /// }
    RBrace,
    /// [
    LBracket,
    /// ]
    RBracket,

    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(s) => write!(f, "'{}'", s),
            TokenKind::LocalName(s) => write!(f, "'%{}'", s),
            TokenKind::AtName(s) => write!(f, "'@{}'", s),
            TokenKind::Integer(n) => write!(f, "integer {}", n),
            TokenKind::StringLit(s) => write!(f, "string {:?}", s),
            TokenKind::Dollar => write!(f, "'$'"),
            TokenKind::Hash => write!(f, "'#'"),
            TokenKind::Bang => write!(f, "'!'"),
            TokenKind::Star => write!(f, "'*'"),
            TokenKind::Dot => write!(f, "'.'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::Colon => write!(f, "':'"),
            TokenKind::Equal => write!(f, "'='"),
            TokenKind::Arrow => write!(f, "'->'"),
            TokenKind::LParen => write!(f, "'('"),
            TokenKind::RParen => write!(f, "')'"),
            TokenKind::LBrace => write!(f, "'{{'"),
            TokenKind::RBrace => write!(f, "'}}'"),
            TokenKind::LBracket => write!(f, "'['"),
            TokenKind::RBracket => write!(f, "']'"),
            TokenKind::Eof => write!(f, "end of file"),
        }
    }
}

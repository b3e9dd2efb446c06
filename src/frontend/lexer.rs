//! Lexer for SIL text
//!
//! Converts source text into a stream of tokens. Spans are byte offsets.

use crate::frontend::token::{Token, TokenKind};
use crate::utils::{Error, Result, Span};

/// The lexer state
pub struct Lexer<'a> {
    source: &'a str,
    /// Characters with their byte offsets
    chars: Vec<(usize, char)>,
    /// Current position in `chars`
    pos: usize,
    /// Start position of the current token in `chars`
    start: usize,
    /// Whether only unindented line breaks precede the current token
    line_start: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().collect(),
            pos: 0,
            start: 0,
            line_start: true,
        }
    }

    /// Lex the whole input. The last token is always [`TokenKind::Eof`].
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.pos + 1).map(|(_, c)| *c)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        self.pos += 1;
        c
    }

    fn offset(&self, pos: usize) -> usize {
        self.chars
            .get(pos)
            .map(|(o, _)| *o)
            .unwrap_or(self.source.len())
    }

    fn make_span(&self) -> Span {
        Span::new(self.offset(self.start), self.offset(self.pos))
    }

    fn make_token(&self, kind: TokenKind, at_line_start: bool) -> Token {
        Token::new(kind, self.make_span(), at_line_start)
    }

    fn text(&self, from: usize) -> &'a str {
        &self.source[self.offset(from)..self.offset(self.pos)]
    }

    /// Skip whitespace and `//` comments
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                '\n' => {
                    self.line_start = true;
                    self.advance();
                }
                ' ' | '\t' | '\r' => {
                    self.line_start = false;
                    self.advance();
                }
                '/' if self.peek_next() == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn read_word(&mut self, extra: &[char]) -> &'a str {
        let from = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || extra.contains(&c) {
                self.advance();
            } else {
                break;
            }
        }
        self.text(from)
    }

    fn read_number(&mut self, negative: bool) -> Result<TokenKind> {
        let digits_start = self.pos;
        let radix = if self.peek() == Some('0') && matches!(self.peek_next(), Some('x') | Some('X')) {
            self.advance();
            self.advance();
            16
        } else {
            10
        };
        let body_start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_hexdigit() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        let body: String = self.text(body_start).chars().filter(|c| *c != '_').collect();
        match i128::from_str_radix(&body, radix) {
            Ok(value) => Ok(TokenKind::Integer(if negative { -value } else { value })),
            Err(_) => Err(Error::InvalidLiteral {
                text: self.text(digits_start).to_string(),
                span: self.make_span(),
            }),
        }
    }

    fn read_string(&mut self) -> Result<TokenKind> {
        let mut value = String::new();
        loop {
            match self.advance() {
                Some('"') => return Ok(TokenKind::StringLit(value)),
                Some('\\') => match self.advance() {
                    Some('n') => value.push('\n'),
                    Some('r') => value.push('\r'),
                    Some('t') => value.push('\t'),
                    Some('0') => value.push('\0'),
                    Some('\\') => value.push('\\'),
                    Some('"') => value.push('"'),
                    Some('\'') => value.push('\''),
                    Some('u') => value.push(self.read_unicode_escape()?),
                    _ => return Err(self.invalid_literal()),
                },
                Some('\n') | None => return Err(self.invalid_literal()),
                Some(c) => value.push(c),
            }
        }
    }

    /// `\u{XXXX}` after the `u`
    fn read_unicode_escape(&mut self) -> Result<char> {
        if self.advance() != Some('{') {
            return Err(self.invalid_literal());
        }
        let from = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
            self.advance();
        }
        let digits = self.text(from);
        if self.advance() != Some('}') {
            return Err(self.invalid_literal());
        }
        u32::from_str_radix(digits, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.invalid_literal())
    }

    fn invalid_literal(&self) -> Error {
        Error::InvalidLiteral {
            text: self.text(self.start).to_string(),
            span: self.make_span(),
        }
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();
        self.start = self.pos;
        let at_line_start = self.line_start;
        self.line_start = false;

        let Some(c) = self.advance() else {
            return Ok(Token::eof(self.make_span()));
        };

        let kind = match c {
            c if c.is_alphabetic() || c == '_' => {
                self.pos -= 1;
                TokenKind::Ident(self.read_word(&[]).to_string())
            }
            c if c.is_ascii_digit() => {
                self.pos -= 1;
                self.read_number(false)?
            }
            '-' if self.peek() == Some('>') => {
                self.advance();
                TokenKind::Arrow
            }
            '-' if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.read_number(true)?,
            '%' => TokenKind::LocalName(self.read_word(&[]).to_string()),
            '@' => TokenKind::AtName(self.read_word(&['$']).to_string()),
            '"' => self.read_string()?,
            '$' => TokenKind::Dollar,
            '#' => TokenKind::Hash,
            '!' => TokenKind::Bang,
            '*' => TokenKind::Star,
            '.' => TokenKind::Dot,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '=' => TokenKind::Equal,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            other => {
                return Err(Error::UnexpectedToken {
                    expected: "token".to_string(),
                    got: format!("'{}'", other),
                    span: self.make_span(),
                })
            }
        };
        Ok(self.make_token(kind, at_line_start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_instruction_line() {
        assert_eq!(
            lex("%1 = integer_literal $Builtin.Int1, -1 // comment"),
            vec![
                TokenKind::LocalName("1".into()),
                TokenKind::Equal,
                TokenKind::Ident("integer_literal".into()),
                TokenKind::Dollar,
                TokenKind::Ident("Builtin".into()),
                TokenKind::Dot,
                TokenKind::Ident("Int1".into()),
                TokenKind::Comma,
                TokenKind::Integer(-1),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_function_type() {
        assert_eq!(
            lex("@convention(thin) () -> @owned K"),
            vec![
                TokenKind::AtName("convention".into()),
                TokenKind::LParen,
                TokenKind::Ident("thin".into()),
                TokenKind::RParen,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Arrow,
                TokenKind::AtName("owned".into()),
                TokenKind::Ident("K".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_hex_and_strings() {
        assert_eq!(
            lex(r#"0x3FF0000000000000 "a\"b\u{e9}""#),
            vec![
                TokenKind::Integer(0x3FF0000000000000),
                TokenKind::StringLit("a\"bé".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_line_start_tracking() {
        let tokens = Lexer::new("sil @f\n  br bb1\nsil").tokenize().unwrap();
        let starts: Vec<bool> = tokens.iter().map(|t| t.at_line_start).collect();
        assert_eq!(starts, vec![true, false, false, false, true, true]);
    }

    #[test]
    fn test_unterminated_string() {
        assert!(matches!(
            Lexer::new("\"abc\n").tokenize(),
            Err(Error::InvalidLiteral { .. })
        ));
    }
}

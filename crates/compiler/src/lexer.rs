//! Hand-written lexer. No external tokenizer crate — the grammar is small
//! enough that a `Peekable<Chars>` scanner is the idiomatic choice here, the
//! same way the teacher's own front end hand-rolls its scanning.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use crate::token::{keyword, Token, TokenKind};

#[derive(Debug, Clone)]
pub struct LexError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for LexError {}

pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') => {
                    let mut clone = self.chars.clone();
                    clone.next();
                    match clone.peek() {
                        Some('/') => {
                            while let Some(c) = self.peek() {
                                if c == '\n' {
                                    break;
                                }
                                self.advance();
                            }
                        }
                        Some('*') => {
                            let (line, column) = (self.line, self.column);
                            self.advance();
                            self.advance();
                            loop {
                                match self.advance() {
                                    None => {
                                        return Err(LexError {
                                            message: "unterminated block comment".into(),
                                            line,
                                            column,
                                        })
                                    }
                                    Some('*') if self.peek() == Some('/') => {
                                        self.advance();
                                        break;
                                    }
                                    _ => {}
                                }
                            }
                        }
                        _ => return Ok(()),
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_trivia()?;
        let (line, column) = (self.line, self.column);
        let Some(c) = self.advance() else {
            return Ok(Token { kind: TokenKind::Eof, line, column });
        };
        use TokenKind::*;
        let kind = match c {
            '(' => LParen,
            ')' => RParen,
            '{' => LBrace,
            '}' => RBrace,
            '[' => LBracket,
            ']' => RBracket,
            ',' => Comma,
            ';' => Semi,
            ':' => Colon,
            '.' => {
                if self.peek() == Some('.') {
                    self.advance();
                    DotDot
                } else {
                    Dot
                }
            }
            '?' => Question,
            '+' => {
                if self.peek() == Some('+') {
                    self.advance();
                    PlusPlus
                } else if self.peek() == Some('=') {
                    self.advance();
                    PlusAssign
                } else {
                    Plus
                }
            }
            '-' => {
                if self.peek() == Some('-') {
                    self.advance();
                    MinusMinus
                } else if self.peek() == Some('=') {
                    self.advance();
                    MinusAssign
                } else {
                    Minus
                }
            }
            '*' => {
                if self.peek() == Some('=') {
                    self.advance();
                    StarAssign
                } else {
                    Star
                }
            }
            '%' => {
                if self.peek() == Some('=') {
                    self.advance();
                    PercentAssign
                } else {
                    Percent
                }
            }
            '~' => Tilde,
            '^' => {
                if self.peek() == Some('=') {
                    self.advance();
                    CaretAssign
                } else {
                    Caret
                }
            }
            '/' => {
                if self.peek() == Some('=') {
                    self.advance();
                    SlashAssign
                } else {
                    Slash
                }
            }
            '=' => {
                if self.peek() == Some('=') {
                    self.advance();
                    Eq
                } else {
                    Assign
                }
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.advance();
                    NotEq
                } else {
                    Bang
                }
            }
            '<' => {
                if self.peek() == Some('=') {
                    self.advance();
                    Le
                } else if self.peek() == Some('<') {
                    self.advance();
                    if self.peek() == Some('=') {
                        self.advance();
                        ShlAssign
                    } else {
                        Shl
                    }
                } else {
                    Lt
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.advance();
                    Ge
                } else if self.peek() == Some('>') {
                    self.advance();
                    if self.peek() == Some('=') {
                        self.advance();
                        ShrAssign
                    } else {
                        Shr
                    }
                } else {
                    Gt
                }
            }
            '&' => {
                if self.peek() == Some('&') {
                    self.advance();
                    AndAnd
                } else if self.peek() == Some('=') {
                    self.advance();
                    AmpAssign
                } else {
                    Amp
                }
            }
            '|' => {
                if self.peek() == Some('|') {
                    self.advance();
                    OrOr
                } else if self.peek() == Some('=') {
                    self.advance();
                    PipeAssign
                } else {
                    Pipe
                }
            }
            '"' => return self.string(line, column),
            c if c.is_ascii_digit() => return self.number(c, line, column),
            c if c.is_alphabetic() || c == '_' => return self.ident_or_keyword(c, line, column),
            other => {
                return Err(LexError {
                    message: format!("unexpected character '{other}'"),
                    line,
                    column,
                })
            }
        };
        Ok(Token { kind, line, column })
    }

    fn string(&mut self, line: u32, column: u32) -> Result<Token, LexError> {
        let mut s = String::new();
        loop {
            match self.advance() {
                None => {
                    return Err(LexError {
                        message: "unterminated string literal".into(),
                        line,
                        column,
                    })
                }
                Some('"') => break,
                Some('\\') => match self.advance() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('r') => s.push('\r'),
                    Some('0') => s.push('\0'),
                    Some('"') => s.push('"'),
                    Some('\\') => s.push('\\'),
                    Some('x') => s.push(self.hex_escape(line, column)?),
                    Some(other) => s.push(other),
                    None => {
                        return Err(LexError {
                            message: "unterminated escape sequence".into(),
                            line,
                            column,
                        })
                    }
                },
                Some(c) => s.push(c),
            }
        }
        Ok(Token { kind: TokenKind::Str(s), line, column })
    }

    /// `\xHH`: exactly two hex digits, the byte value used as a char.
    fn hex_escape(&mut self, line: u32, column: u32) -> Result<char, LexError> {
        let mut digits = String::new();
        for _ in 0..2 {
            match self.advance() {
                Some(c) if c.is_ascii_hexdigit() => digits.push(c),
                _ => {
                    return Err(LexError {
                        message: "invalid \\x escape: expected two hex digits".into(),
                        line,
                        column,
                    })
                }
            }
        }
        let byte = u8::from_str_radix(&digits, 16).expect("validated hex digits");
        Ok(byte as char)
    }

    fn number(&mut self, first: char, line: u32, column: u32) -> Result<Token, LexError> {
        let mut s = String::new();
        s.push(first);
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                s.push(c);
                self.advance();
            } else if c == '.' && !is_float {
                is_float = true;
                s.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let kind = if is_float {
            let v: f64 = s.parse().map_err(|_| LexError {
                message: format!("invalid float literal '{s}'"),
                line,
                column,
            })?;
            TokenKind::Float(v)
        } else {
            let v: i64 = s.parse().map_err(|_| LexError {
                message: format!("invalid int literal '{s}'"),
                line,
                column,
            })?;
            TokenKind::Int(v)
        };
        Ok(Token { kind, line, column })
    }

    fn ident_or_keyword(&mut self, first: char, line: u32, column: u32) -> Result<Token, LexError> {
        let mut s = String::new();
        s.push(first);
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                s.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let kind = keyword(&s).unwrap_or(TokenKind::Ident(s));
        Ok(Token { kind, line, column })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_an_auto_statement() {
        assert_eq!(
            kinds("auto x = 1 + 2;"),
            vec![
                TokenKind::Auto,
                TokenKind::Ident("x".into()),
                TokenKind::Assign,
                TokenKind::Int(1),
                TokenKind::Plus,
                TokenKind::Int(2),
                TokenKind::Semi,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn skips_line_and_block_comments() {
        assert_eq!(
            kinds("1 // trailing\n/* block */ 2"),
            vec![TokenKind::Int(1), TokenKind::Int(2), TokenKind::Eof]
        );
    }

    #[test]
    fn unterminated_block_comment_is_a_lex_error() {
        let err = Lexer::new("1 /* never closed").tokenize().unwrap_err();
        assert_eq!(err.message, "unterminated block comment");
    }

    #[test]
    fn lexes_string_escapes() {
        assert_eq!(
            kinds(r#""a\nb\t\r\0""#),
            vec![TokenKind::Str("a\nb\t\r\0".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn lexes_hex_escape() {
        assert_eq!(kinds(r#""\x41""#), vec![TokenKind::Str("A".into()), TokenKind::Eof]);
    }

    #[test]
    fn distinguishes_two_char_operators() {
        assert_eq!(
            kinds("a == b && c <= d"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Eq,
                TokenKind::Ident("b".into()),
                TokenKind::AndAnd,
                TokenKind::Ident("c".into()),
                TokenKind::Le,
                TokenKind::Ident("d".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_compound_assignment_and_increment_operators() {
        assert_eq!(
            kinds("x += 1; y <<= 2; z++; w--;"),
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::PlusAssign,
                TokenKind::Int(1),
                TokenKind::Semi,
                TokenKind::Ident("y".into()),
                TokenKind::ShlAssign,
                TokenKind::Int(2),
                TokenKind::Semi,
                TokenKind::Ident("z".into()),
                TokenKind::PlusPlus,
                TokenKind::Semi,
                TokenKind::Ident("w".into()),
                TokenKind::MinusMinus,
                TokenKind::Semi,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unexpected_character_is_an_error() {
        let err = Lexer::new("1 @ 2").tokenize().unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 3);
    }
}

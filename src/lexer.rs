use crate::error::{byte_offset_to_line, LangError, LangResult, Location};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: std::ops::Range<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    Integer(i64),
    StringLiteral(String),
    True,
    False,
    Null,
    Fn,
    If,
    Else,
    Return,
    Newline,
    Semicolon,
    Colon,
    Comma,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Assign,
    Declare,
    Equal,
    NotEqual,
    LessThan,
    LessThanEq,
    GreaterThan,
    GreaterThanEq,
    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Identifier(name) => format!("identifier '{}'", name),
            TokenKind::Integer(n) => format!("integer {}", n),
            TokenKind::StringLiteral(s) => format!("string {:?}", s),
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Eof => "end of input".to_string(),
            other => format!("'{}'", other.lexeme()),
        }
    }

    fn lexeme(&self) -> &'static str {
        match self {
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Null => "null",
            TokenKind::Fn => "fn",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::Return => "return",
            TokenKind::Semicolon => ";",
            TokenKind::Colon => ":",
            TokenKind::Comma => ",",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Bang => "!",
            TokenKind::Assign => "=",
            TokenKind::Declare => ":=",
            TokenKind::Equal => "==",
            TokenKind::NotEqual => "!=",
            TokenKind::LessThan => "<",
            TokenKind::LessThanEq => "<=",
            TokenKind::GreaterThan => ">",
            TokenKind::GreaterThanEq => ">=",
            TokenKind::Identifier(_)
            | TokenKind::Integer(_)
            | TokenKind::StringLiteral(_)
            | TokenKind::Newline
            | TokenKind::Eof => "",
        }
    }
}

pub struct Lexer<'a> {
    chars: std::str::Chars<'a>,
    current_index: usize,
    next_index: usize,
    peeked: Option<char>,
    source: &'a str,
    file_path: PathBuf,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self::with_file(input, PathBuf::from("<unknown>"))
    }

    pub fn with_file(input: &'a str, file_path: PathBuf) -> Self {
        Self {
            chars: input.chars(),
            current_index: 0,
            next_index: 0,
            peeked: None,
            source: input,
            file_path,
        }
    }

    fn error_with_location(&self, message: String, byte_offset: usize) -> LangError {
        let line = byte_offset_to_line(self.source, byte_offset);
        LangError::Lexer {
            message,
            location: Some(Location::new(self.file_path.clone(), line)),
        }
    }

    pub fn lex(mut self) -> LangResult<Vec<Token>> {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek_char() {
            if ch == '\n' {
                let start = self.current_index;
                self.advance_char();
                tokens.push(Token {
                    kind: TokenKind::Newline,
                    span: start..self.current_index,
                });
                continue;
            }

            if ch.is_whitespace() {
                self.consume_whitespace();
                continue;
            }

            let start = self.current_index;
            let kind = match ch {
                'a'..='z' | 'A'..='Z' | '_' => self.read_identifier(),
                '0'..='9' => self.read_integer(start)?,
                '"' => self.read_string(start)?,
                ';' => self.single(TokenKind::Semicolon),
                ',' => self.single(TokenKind::Comma),
                '(' => self.single(TokenKind::LParen),
                ')' => self.single(TokenKind::RParen),
                '[' => self.single(TokenKind::LBracket),
                ']' => self.single(TokenKind::RBracket),
                '{' => self.single(TokenKind::LBrace),
                '}' => self.single(TokenKind::RBrace),
                '+' => self.single(TokenKind::Plus),
                '-' => self.single(TokenKind::Minus),
                '*' => self.single(TokenKind::Star),
                '%' => self.single(TokenKind::Percent),
                '/' => {
                    self.advance_char();
                    if matches!(self.peek_char(), Some('/')) {
                        self.consume_comment();
                        continue;
                    }
                    TokenKind::Slash
                }
                ':' => self.with_equals(TokenKind::Colon, TokenKind::Declare),
                '=' => self.with_equals(TokenKind::Assign, TokenKind::Equal),
                '!' => self.with_equals(TokenKind::Bang, TokenKind::NotEqual),
                '<' => self.with_equals(TokenKind::LessThan, TokenKind::LessThanEq),
                '>' => self.with_equals(TokenKind::GreaterThan, TokenKind::GreaterThanEq),
                _ => {
                    return Err(self.error_with_location(
                        format!("Unexpected character '{}' at {}", ch, start),
                        start,
                    ))
                }
            };

            tokens.push(Token {
                kind,
                span: start..self.current_index,
            });
        }

        tokens.push(Token {
            kind: TokenKind::Eof,
            span: self.current_index..self.current_index,
        });

        Ok(tokens)
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance_char();
        kind
    }

    /// Consume one char, and a following `=` if present.
    fn with_equals(&mut self, bare: TokenKind, joined: TokenKind) -> TokenKind {
        self.advance_char();
        if matches!(self.peek_char(), Some('=')) {
            self.advance_char();
            joined
        } else {
            bare
        }
    }

    fn consume_whitespace(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() && ch != '\n' {
                self.advance_char();
            } else {
                break;
            }
        }
    }

    fn consume_comment(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch == '\n' {
                break;
            }
            self.advance_char();
        }
    }

    fn read_identifier(&mut self) -> TokenKind {
        let mut ident = String::new();

        while let Some(ch) = self.peek_char() {
            if ch.is_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.advance_char();
            } else {
                break;
            }
        }

        match ident.as_str() {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            "fn" => TokenKind::Fn,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "return" => TokenKind::Return,
            _ => TokenKind::Identifier(ident),
        }
    }

    fn read_integer(&mut self, start: usize) -> LangResult<TokenKind> {
        let mut number = String::new();

        while let Some(ch) = self.peek_char() {
            if ch.is_ascii_digit() {
                number.push(ch);
                self.advance_char();
            } else {
                break;
            }
        }

        let value = number.parse::<i64>().map_err(|err| {
            self.error_with_location(
                format!("Invalid integer literal '{}': {}", number, err),
                start,
            )
        })?;

        Ok(TokenKind::Integer(value))
    }

    fn read_string(&mut self, start: usize) -> LangResult<TokenKind> {
        self.advance_char(); // consume opening quote
        let mut content = String::new();

        while let Some(ch) = self.peek_char() {
            match ch {
                '"' => {
                    self.advance_char();
                    return Ok(TokenKind::StringLiteral(content));
                }
                '\\' => {
                    self.advance_char();
                    let escaped = match self.peek_char() {
                        Some('"') => '"',
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('\\') => '\\',
                        Some('r') => '\r',
                        Some(other) => {
                            return Err(self.error_with_location(
                                format!("Unsupported escape sequence '\\{}'", other),
                                self.current_index,
                            ))
                        }
                        None => {
                            return Err(self.error_with_location(
                                "Unterminated escape sequence in string".to_string(),
                                self.current_index,
                            ))
                        }
                    };
                    content.push(escaped);
                    self.advance_char();
                }
                _ => {
                    content.push(ch);
                    self.advance_char();
                }
            }
        }

        Err(self.error_with_location("Unterminated string literal".to_string(), start))
    }

    fn peek_char(&mut self) -> Option<char> {
        if let Some(ch) = self.peeked {
            Some(ch)
        } else {
            self.peeked = self.chars.next();
            if let Some(ch) = self.peeked {
                self.next_index = self.current_index + ch.len_utf8();
            }
            self.peeked
        }
    }

    fn advance_char(&mut self) -> Option<char> {
        let ch = self.peek_char();
        if let Some(actual) = ch {
            self.current_index = self.next_index;
            self.peeked = None;
            Some(actual)
        } else {
            None
        }
    }
}

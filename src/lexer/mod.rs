pub mod token;

use std::error::Error;
use std::fmt;

use crate::source::Span;
use token::{Token, TokenKind};

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub span: Span,
    pub line: usize,
    pub column: usize,
}

impl LexError {
    fn new(message: impl Into<String>, span: Span, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            span,
            line,
            column,
        }
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lex error at line {}, column {}: {}",
            self.line, self.column, self.message
        )
    }
}

impl Error for LexError {}

pub fn lex(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).lex()
}

struct Lexer {
    chars: Vec<char>,
    current: usize,
    start: usize,
    line: usize,
    column: usize,
    token_line: usize,
    token_column: usize,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            current: 0,
            start: 0,
            line: 1,
            column: 1,
            token_line: 1,
            token_column: 1,
            tokens: Vec::new(),
        }
    }

    fn lex(mut self) -> Result<Vec<Token>, LexError> {
        while !self.is_at_end() {
            self.start_token();
            self.scan_token()?;
        }

        self.start_token();
        self.add_token(TokenKind::Eof);
        Ok(self.tokens)
    }

    fn scan_token(&mut self) -> Result<(), LexError> {
        let c = self.advance();
        match c {
            '(' => self.add_token(TokenKind::LeftParen),
            ')' => self.add_token(TokenKind::RightParen),
            '{' => self.add_token(TokenKind::LeftBrace),
            '}' => self.add_token(TokenKind::RightBrace),
            '[' => self.add_token(TokenKind::LeftBracket),
            ']' => self.add_token(TokenKind::RightBracket),
            ',' => self.add_token(TokenKind::Comma),
            '.' => self.add_token(TokenKind::Dot),
            ':' => self.add_token(TokenKind::Colon),
            ';' => self.add_token(TokenKind::Semicolon),
            '+' => self.add_token(TokenKind::Plus),
            '*' => self.add_token(TokenKind::Star),
            '&' => self.add_token(TokenKind::Ampersand),
            '-' => {
                if self.matches('>') {
                    self.add_token(TokenKind::Arrow);
                } else {
                    self.add_token(TokenKind::Minus);
                }
            }
            '=' => {
                if self.matches('=') {
                    self.add_token(TokenKind::EqualEqual);
                } else {
                    self.add_token(TokenKind::Equal);
                }
            }
            '<' => {
                if self.matches('=') {
                    self.add_token(TokenKind::LessEqual);
                } else {
                    self.add_token(TokenKind::Less);
                }
            }
            '>' => {
                if self.matches('=') {
                    self.add_token(TokenKind::GreaterEqual);
                } else {
                    self.add_token(TokenKind::Greater);
                }
            }
            '/' => {
                if self.matches('/') {
                    self.skip_line_comment();
                } else if self.matches('*') {
                    self.skip_block_comment()?;
                } else {
                    self.add_token(TokenKind::Slash);
                }
            }
            '"' => self.string()?,
            ' ' | '\r' | '\t' | '\n' => {}
            d if d.is_ascii_digit() => self.number()?,
            a if is_ident_start(a) => self.identifier(),
            _ => {
                return Err(self.error(format!("unexpected character '{}'", c)));
            }
        }

        Ok(())
    }

    fn string(&mut self) -> Result<(), LexError> {
        let mut value = String::new();
        let mut closed = false;

        while !self.is_at_end() {
            let c = self.advance();
            match c {
                '"' => {
                    closed = true;
                    break;
                }
                '\\' => {
                    if self.is_at_end() {
                        break;
                    }
                    let escaped = self.advance();
                    match escaped {
                        '"' => value.push('"'),
                        '\\' => value.push('\\'),
                        'n' => value.push('\n'),
                        'r' => value.push('\r'),
                        't' => value.push('\t'),
                        '0' => value.push('\0'),
                        other => value.push(other),
                    }
                }
                _ => value.push(c),
            }
        }

        if !closed {
            return Err(self.error("unterminated string literal"));
        }

        self.add_token(TokenKind::String(value));
        Ok(())
    }

    fn number(&mut self) -> Result<(), LexError> {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        let mut is_float = false;
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            is_float = true;
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let lexeme = self.current_lexeme();
        if is_float {
            let value = lexeme
                .parse::<f64>()
                .map_err(|_| self.error(format!("invalid float literal '{}'", lexeme)))?;
            self.add_token(TokenKind::Float(value));
        } else {
            let value = lexeme
                .parse::<i64>()
                .map_err(|_| self.error(format!("invalid int literal '{}'", lexeme)))?;
            self.add_token(TokenKind::Int(value));
        }

        Ok(())
    }

    fn identifier(&mut self) {
        while is_ident_continue(self.peek()) {
            self.advance();
        }

        let lexeme = self.current_lexeme();
        let kind = match lexeme.as_str() {
            "function" => TokenKind::Function,
            "extern" => TokenKind::Extern,
            "struct" => TokenKind::Struct,
            "import" => TokenKind::Import,
            "let" => TokenKind::Let,
            "return" => TokenKind::Return,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            _ => TokenKind::Identifier(lexeme),
        };

        self.add_token(kind);
    }

    fn skip_line_comment(&mut self) {
        while !self.is_at_end() && self.peek() != '\n' {
            self.advance();
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), LexError> {
        while !self.is_at_end() {
            if self.peek() == '*' && self.peek_next() == '/' {
                self.advance();
                self.advance();
                return Ok(());
            }
            self.advance();
        }

        Err(self.error("unterminated block comment"))
    }

    fn add_token(&mut self, kind: TokenKind) {
        let lexeme = self.current_lexeme();
        self.tokens.push(Token::new(
            kind,
            lexeme,
            Span::new(self.start, self.current),
            self.token_line,
            self.token_column,
        ));
    }

    fn error(&self, message: impl Into<String>) -> LexError {
        LexError::new(
            message,
            Span::new(self.start, self.current),
            self.token_line,
            self.token_column,
        )
    }

    fn start_token(&mut self) {
        self.start = self.current;
        self.token_line = self.line;
        self.token_column = self.column;
    }

    fn current_lexeme(&self) -> String {
        self.chars[self.start..self.current].iter().collect()
    }

    fn matches(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.peek() != expected {
            return false;
        }
        self.advance();
        true
    }

    fn peek(&self) -> char {
        self.chars.get(self.current).copied().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        self.chars.get(self.current + 1).copied().unwrap_or('\0')
    }

    fn advance(&mut self) -> char {
        let c = self.chars[self.current];
        self.current += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.chars.len()
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}

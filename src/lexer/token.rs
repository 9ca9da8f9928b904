use crate::source::Span;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Dot,
    Colon,
    Semicolon,
    Plus,
    Minus,
    Star,
    Slash,
    Ampersand,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Arrow,
    Identifier(String),
    Int(i64),
    Float(f64),
    String(String),
    Function,
    Extern,
    Struct,
    Import,
    Let,
    Return,
    If,
    Else,
    While,
    For,
    Eof,
}

impl TokenKind {
    /// Whether two kinds are the same token, ignoring literal payloads.
    pub fn same_kind(&self, other: &TokenKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: Span,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: String, span: Span, line: usize, column: usize) -> Self {
        Self {
            kind,
            lexeme,
            span,
            line,
            column,
        }
    }
}

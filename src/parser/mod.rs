pub mod ast;
mod expr;

use std::error::Error;
use std::fmt;

use crate::lexer::token::{Token, TokenKind};
use crate::source::Span;
use crate::types::Type;
use ast::{
    Block, Decl, Document, ExternDecl, Field, FunctionDecl, ImportDecl, Param, ProtoFunc, Stmt,
    StructProto,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, token: &Token) -> Self {
        Self {
            message: message.into(),
            span: token.span,
            line: token.line,
            column: token.column,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "parse error at line {}, column {}: {}",
            self.line, self.column, self.message
        )
    }
}

impl Error for ParseError {}

/// Lexes and parses a whole source file.
pub fn parse(source: &str) -> Result<Document, Box<dyn Error>> {
    let tokens = crate::lexer::lex(source)?;
    let document = Parser::new(tokens).parse_document()?;
    Ok(document)
}

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0 }
    }

    pub fn parse_document(&mut self) -> Result<Document, ParseError> {
        let mut items = Vec::new();

        while !self.is_at_end() {
            items.push(self.declaration()?);
            self.matches_symbol(TokenKind::Semicolon);
        }

        Ok(Document { items })
    }

    fn declaration(&mut self) -> Result<Decl, ParseError> {
        let start = self.peek().span;

        if self.matches_symbol(TokenKind::Function) {
            let proto = self.prototype()?;
            let body = self.block()?;
            let span = start.join(body.span);
            return Ok(Decl::Function(FunctionDecl { proto, body, span }));
        }

        if self.matches_symbol(TokenKind::Extern) {
            self.matches_symbol(TokenKind::Function);
            let proto = self.prototype()?;
            let span = start.join(proto.span);
            return Ok(Decl::Extern(ExternDecl { proto, span }));
        }

        if self.matches_symbol(TokenKind::Struct) {
            return self.struct_declaration(start).map(Decl::Struct);
        }

        if self.matches_symbol(TokenKind::Import) {
            let path = match self.peek_kind() {
                TokenKind::String(path) => path.clone(),
                _ => return Err(ParseError::new("expected path string after 'import'", self.peek())),
            };
            self.advance();
            let span = start.join(self.previous().span);
            return Ok(Decl::Import(ImportDecl {
                path,
                span,
                document: None,
            }));
        }

        Err(ParseError::new(
            "expected 'function', 'extern', 'struct' or 'import'",
            self.peek(),
        ))
    }

    fn prototype(&mut self) -> Result<ProtoFunc, ParseError> {
        let (name, name_span) = self.consume_identifier("expected function name")?;
        self.consume_symbol(TokenKind::LeftParen, "expected '(' after function name")?;

        let mut params = Vec::new();
        if !self.check_kind(&TokenKind::RightParen) {
            loop {
                let (param_name, span) = self.consume_identifier("expected parameter name")?;
                self.consume_symbol(TokenKind::Colon, "expected ':' after parameter name")?;
                let ty = self.parse_type()?;
                params.push(Param {
                    ty,
                    name: param_name,
                    span: span.join(self.previous().span),
                });

                if !self.matches_symbol(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume_symbol(TokenKind::RightParen, "expected ')' after parameter list")?;

        let return_type = if self.matches_symbol(TokenKind::Colon) {
            self.parse_type()?
        } else {
            Type::Void
        };

        Ok(ProtoFunc {
            name,
            name_span,
            return_type,
            params,
            span: name_span.join(self.previous().span),
        })
    }

    fn struct_declaration(&mut self, start: Span) -> Result<StructProto, ParseError> {
        let (name, _) = self.consume_identifier("expected struct name")?;
        self.consume_symbol(TokenKind::LeftBrace, "expected '{' after struct name")?;

        let mut fields: Vec<Field> = Vec::new();
        while !self.check_kind(&TokenKind::RightBrace) && !self.is_at_end() {
            let (field_name, span) = self.consume_identifier("expected field name")?;
            if fields.iter().any(|field| field.name == field_name) {
                return Err(ParseError::new(
                    format!("duplicate field '{}' in struct '{}'", field_name, name),
                    self.previous(),
                ));
            }
            self.consume_symbol(TokenKind::Colon, "expected ':' after field name")?;
            let ty = self.parse_type()?;
            fields.push(Field {
                name: field_name,
                ty,
                span: span.join(self.previous().span),
            });
            if !self.matches_symbol(TokenKind::Semicolon) {
                self.matches_symbol(TokenKind::Comma);
            }
        }
        self.consume_symbol(TokenKind::RightBrace, "expected '}' to close struct")?;

        Ok(StructProto {
            name,
            fields,
            span: start.join(self.previous().span),
        })
    }

    pub(crate) fn parse_type(&mut self) -> Result<Type, ParseError> {
        let (name, _) = self.consume_identifier("expected type name")?;
        let mut ty = Type::from_name(&name).unwrap_or(Type::Struct(name));
        while self.matches_symbol(TokenKind::Star) {
            ty = Type::pointer_to(ty);
        }
        Ok(ty)
    }

    fn block(&mut self) -> Result<Block, ParseError> {
        self.consume_symbol(TokenKind::LeftBrace, "expected '{' to open block")?;
        let start = self.previous().span;

        let mut stmts = Vec::new();
        while !self.check_kind(&TokenKind::RightBrace) && !self.is_at_end() {
            stmts.push(self.statement()?);
            self.matches_symbol(TokenKind::Semicolon);
        }
        self.consume_symbol(TokenKind::RightBrace, "expected '}' to close block")?;

        Ok(Block {
            stmts,
            span: start.join(self.previous().span),
        })
    }

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        let start = self.peek().span;

        if self.matches_symbol(TokenKind::Let) {
            return self.let_statement(start);
        }

        if self.matches_symbol(TokenKind::Return) {
            if self.check_kind(&TokenKind::Semicolon) || self.check_kind(&TokenKind::RightBrace) {
                return Ok(Stmt::Return {
                    value: None,
                    span: start,
                });
            }
            let value = self.expression()?;
            let span = start.join(value.span);
            return Ok(Stmt::Return {
                value: Some(value),
                span,
            });
        }

        if self.matches_symbol(TokenKind::If) {
            return self.if_statement(start);
        }

        if self.matches_symbol(TokenKind::While) {
            let cond = self.parenthesized_condition("while")?;
            let body = self.block()?;
            let span = start.join(body.span);
            return Ok(Stmt::While { cond, body, span });
        }

        if self.matches_symbol(TokenKind::For) {
            return self.for_statement(start);
        }

        let expr = self.expression()?;
        Ok(Stmt::Expr(expr))
    }

    fn let_statement(&mut self, start: Span) -> Result<Stmt, ParseError> {
        let (name, _) = self.consume_identifier("expected variable name after 'let'")?;
        self.consume_symbol(TokenKind::Colon, "expected ':' after variable name")?;
        let ty = self.parse_type()?;
        let init = if self.matches_symbol(TokenKind::Equal) {
            Some(self.expression()?)
        } else {
            None
        };

        Ok(Stmt::Let {
            name,
            ty,
            init,
            span: start.join(self.previous().span),
        })
    }

    fn if_statement(&mut self, start: Span) -> Result<Stmt, ParseError> {
        let mut branches = Vec::new();
        let mut else_block = None;

        loop {
            let cond = self.parenthesized_condition("if")?;
            let body = self.block()?;
            branches.push((cond, body));

            if !self.matches_symbol(TokenKind::Else) {
                break;
            }
            if !self.matches_symbol(TokenKind::If) {
                else_block = Some(self.block()?);
                break;
            }
        }

        Ok(Stmt::If {
            branches,
            else_block,
            span: start.join(self.previous().span),
        })
    }

    fn for_statement(&mut self, start: Span) -> Result<Stmt, ParseError> {
        self.consume_symbol(TokenKind::LeftParen, "expected '(' after 'for'")?;
        let init_start = self.peek().span;
        let init = if self.matches_symbol(TokenKind::Let) {
            self.let_statement(init_start)?
        } else {
            Stmt::Expr(self.expression()?)
        };
        self.consume_symbol(TokenKind::Semicolon, "expected ';' after loop initializer")?;
        let cond = self.expression()?;
        self.consume_symbol(TokenKind::Semicolon, "expected ';' after loop condition")?;
        let step = self.expression()?;
        self.consume_symbol(TokenKind::RightParen, "expected ')' after loop increment")?;
        let body = self.block()?;
        let span = start.join(body.span);

        Ok(Stmt::For {
            init: Box::new(init),
            cond,
            step,
            body,
            span,
        })
    }

    fn parenthesized_condition(&mut self, keyword: &str) -> Result<ast::Expr, ParseError> {
        self.consume_symbol(
            TokenKind::LeftParen,
            &format!("expected '(' after '{}'", keyword),
        )?;
        let cond = self.expression()?;
        self.consume_symbol(TokenKind::RightParen, "expected ')' after condition")?;
        Ok(cond)
    }

    pub(crate) fn matches_symbol(&mut self, kind: TokenKind) -> bool {
        if self.check_kind(&kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn consume_symbol(&mut self, kind: TokenKind, message: &str) -> Result<(), ParseError> {
        if self.check_kind(&kind) {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::new(message, self.peek()))
        }
    }

    pub(crate) fn consume_identifier(&mut self, message: &str) -> Result<(String, Span), ParseError> {
        match self.peek_kind() {
            TokenKind::Identifier(name) => {
                let value = name.clone();
                let span = self.advance().span;
                Ok((value, span))
            }
            _ => Err(ParseError::new(message, self.peek())),
        }
    }

    pub(crate) fn check_kind(&self, kind: &TokenKind) -> bool {
        self.peek_kind().same_kind(kind)
    }

    pub(crate) fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    pub(crate) fn is_at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    pub(crate) fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    pub(crate) fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    pub(crate) fn peek_kind_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.current + offset).map(|token| &token.kind)
    }

    pub(crate) fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }
}

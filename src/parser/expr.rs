use crate::lexer::token::TokenKind;
use crate::source::Span;

use super::ast::{BinaryOp, Expr, ExprKind, FieldInit, UnaryOp};
use super::{ParseError, Parser};

impl Parser {
    pub(crate) fn expression(&mut self) -> Result<Expr, ParseError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, ParseError> {
        let expr = self.comparison()?;

        if self.matches_symbol(TokenKind::Equal) {
            if !is_assignable(&expr) {
                return Err(ParseError::new("invalid assignment target", self.previous()));
            }
            let value = self.assignment()?;
            let span = expr.span.join(value.span);
            return Ok(Expr::new(
                ExprKind::Assign {
                    target: Box::new(expr),
                    value: Box::new(value),
                },
                span,
            ));
        }

        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.additive()?;

        loop {
            let op = match self.peek_kind() {
                TokenKind::EqualEqual => BinaryOp::Eq,
                TokenKind::Less => BinaryOp::Lt,
                TokenKind::Greater => BinaryOp::Gt,
                TokenKind::LessEqual => BinaryOp::Le,
                TokenKind::GreaterEqual => BinaryOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.additive()?;
            expr = binary(expr, op, rhs);
        }

        Ok(expr)
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.term()?;

        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.term()?;
            expr = binary(expr, op, rhs);
        }

        Ok(expr)
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.unary()?;

        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.unary()?;
            expr = binary(expr, op, rhs);
        }

        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek_kind() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Star => UnaryOp::Deref,
            TokenKind::Ampersand => UnaryOp::Ref,
            _ => return self.postfix(),
        };
        let start = self.advance().span;
        let operand = self.unary()?;
        let span = start.join(operand.span);
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;

        loop {
            if self.matches_symbol(TokenKind::Dot) {
                let (field, field_span) = self.consume_identifier("expected field name after '.'")?;
                let span = expr.span.join(field_span);
                expr = Expr::new(
                    ExprKind::Dot {
                        lhs: Box::new(expr),
                        field,
                    },
                    span,
                );
            } else if self.matches_symbol(TokenKind::Arrow) {
                let (field, field_span) = self.consume_identifier("expected field name after '->'")?;
                let span = expr.span.join(field_span);
                let pointee_span = expr.span;
                let deref = Expr::new(
                    ExprKind::Unary {
                        op: UnaryOp::Deref,
                        operand: Box::new(expr),
                    },
                    pointee_span,
                );
                expr = Expr::new(
                    ExprKind::Dot {
                        lhs: Box::new(deref),
                        field,
                    },
                    span,
                );
            } else if self.matches_symbol(TokenKind::LeftBracket) {
                let index = self.expression()?;
                self.consume_symbol(TokenKind::RightBracket, "expected ']' after index")?;
                let span = expr.span.join(self.previous().span);
                expr = Expr::new(
                    ExprKind::ArrayAccess {
                        target: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                );
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Int(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::Int(value), token.span))
            }
            TokenKind::Float(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::Float(value), token.span))
            }
            TokenKind::String(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::String(value), token.span))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                if self.check_kind(&TokenKind::LeftParen) {
                    return self.call(name, token.span);
                }
                if self.looks_like_struct_literal() {
                    return self.struct_literal(name, token.span);
                }
                Ok(Expr::new(ExprKind::Variable(name), token.span))
            }
            TokenKind::LeftParen => {
                self.advance();
                let mut expr = self.expression()?;
                self.consume_symbol(TokenKind::RightParen, "expected ')' after expression")?;
                expr.span = token.span.join(self.previous().span);
                Ok(expr)
            }
            _ => Err(ParseError::new("expected expression", &token)),
        }
    }

    fn call(&mut self, callee: String, callee_span: Span) -> Result<Expr, ParseError> {
        self.consume_symbol(TokenKind::LeftParen, "expected '(' after function name")?;
        let mut args = Vec::new();
        if !self.check_kind(&TokenKind::RightParen) {
            loop {
                args.push(self.expression()?);
                if !self.matches_symbol(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume_symbol(TokenKind::RightParen, "expected ')' after arguments")?;

        Ok(Expr::new(
            ExprKind::Call {
                callee,
                callee_span,
                args,
            },
            callee_span.join(self.previous().span),
        ))
    }

    // `Name { field: ...` or `Name { }`
    fn looks_like_struct_literal(&self) -> bool {
        if !self.check_kind(&TokenKind::LeftBrace) {
            return false;
        }
        match (self.peek_kind_at(1), self.peek_kind_at(2)) {
            (Some(TokenKind::RightBrace), _) => true,
            (Some(TokenKind::Identifier(_)), Some(TokenKind::Colon)) => true,
            _ => false,
        }
    }

    fn struct_literal(&mut self, name: String, start: Span) -> Result<Expr, ParseError> {
        self.consume_symbol(TokenKind::LeftBrace, "expected '{' in struct literal")?;
        let mut fields = Vec::new();
        while !self.check_kind(&TokenKind::RightBrace) && !self.is_at_end() {
            let (field, field_span) = self.consume_identifier("expected field name")?;
            self.consume_symbol(TokenKind::Colon, "expected ':' after field name")?;
            let value = self.expression()?;
            let span = field_span.join(value.span);
            fields.push(FieldInit {
                name: field,
                value,
                span,
            });
            self.matches_symbol(TokenKind::Comma);
        }
        self.consume_symbol(TokenKind::RightBrace, "expected '}' to close struct literal")?;

        Ok(Expr::new(
            ExprKind::StructLiteral { name, fields },
            start.join(self.previous().span),
        ))
    }
}

fn binary(lhs: Expr, op: BinaryOp, rhs: Expr) -> Expr {
    let span = lhs.span.join(rhs.span);
    Expr::new(
        ExprKind::Binary {
            lhs: Box::new(lhs),
            op,
            rhs: Box::new(rhs),
        },
        span,
    )
}

fn is_assignable(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Variable(_)
            | ExprKind::Dot { .. }
            | ExprKind::ArrayAccess { .. }
            | ExprKind::Unary {
                op: UnaryOp::Deref,
                ..
            }
    )
}

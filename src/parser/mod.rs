// Copyright 2025 The Flows Engine Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use crate::ast::{BinaryOp, Expr, Loc, UnaryOp};
use crate::common::{EquationError, EquationResult};
use crate::eqn_err;
use crate::token::{Lexer, Spanned, Token};
use crate::value::Variant;

/// Parses a formula into an unbound expression.  Binding (name and
/// function resolution) happens later, against the compilation
/// context's state-variable index.
pub fn parse(text: &str) -> EquationResult<Expr> {
    let tokens: Result<Vec<Spanned<Token>>, EquationError> = Lexer::new(text).collect();
    let tokens = tokens?;
    if tokens.is_empty() {
        return eqn_err!(EmptyEquation, 0, 0);
    }

    let len = text.len();
    let mut parser = Parser {
        tokens,
        pos: 0,
        text_len: len,
    };
    let expr = parser.expr()?;
    match parser.peek() {
        Some((start, _, end)) => eqn_err!(ExtraToken, start as u16, end as u16),
        None => Ok(expr),
    }
}

struct Parser<'input> {
    tokens: Vec<Spanned<Token<'input>>>,
    pos: usize,
    text_len: usize,
}

impl<'input> Parser<'input> {
    fn peek(&self) -> Option<Spanned<Token<'input>>> {
        self.tokens.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<Spanned<Token<'input>>> {
        let tok = self.peek();
        self.pos += 1;
        tok
    }

    fn eof_err<T>(&self) -> EquationResult<T> {
        let end = self.text_len as u16;
        eqn_err!(UnrecognizedEof, end, end)
    }

    fn expect(&mut self, expected: Token) -> EquationResult<Spanned<Token<'input>>> {
        match self.bump() {
            Some(tok) if tok.1 == expected => Ok(tok),
            Some((start, _, end)) => eqn_err!(UnrecognizedToken, start as u16, end as u16),
            None => self.eof_err(),
        }
    }

    fn expr(&mut self) -> EquationResult<Expr> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> EquationResult<Expr> {
        let mut lhs = self.and_expr()?;
        while let Some((_, Token::Or, _)) = self.peek() {
            self.bump();
            let rhs = self.and_expr()?;
            let loc = lhs.loc().union(&rhs.loc());
            lhs = Expr::Op2(BinaryOp::Or, Box::new(lhs), Box::new(rhs), loc);
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> EquationResult<Expr> {
        let mut lhs = self.not_expr()?;
        while let Some((_, Token::And, _)) = self.peek() {
            self.bump();
            let rhs = self.not_expr()?;
            let loc = lhs.loc().union(&rhs.loc());
            lhs = Expr::Op2(BinaryOp::And, Box::new(lhs), Box::new(rhs), loc);
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> EquationResult<Expr> {
        if let Some((start, Token::Not, _)) = self.peek() {
            self.bump();
            let operand = self.not_expr()?;
            let loc = Loc::new(start, operand.loc().end as usize);
            return Ok(Expr::Op1(UnaryOp::Not, Box::new(operand), loc));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> EquationResult<Expr> {
        let lhs = self.additive()?;
        let op = match self.peek() {
            Some((_, Token::Gt, _)) => BinaryOp::Gt,
            Some((_, Token::Gte, _)) => BinaryOp::Gte,
            Some((_, Token::Lt, _)) => BinaryOp::Lt,
            Some((_, Token::Lte, _)) => BinaryOp::Lte,
            Some((_, Token::Eq, _)) => BinaryOp::Eq,
            Some((_, Token::Neq, _)) => BinaryOp::Neq,
            _ => return Ok(lhs),
        };
        self.bump();
        let rhs = self.additive()?;
        let loc = lhs.loc().union(&rhs.loc());
        Ok(Expr::Op2(op, Box::new(lhs), Box::new(rhs), loc))
    }

    fn additive(&mut self) -> EquationResult<Expr> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some((_, Token::Plus, _)) => BinaryOp::Add,
                Some((_, Token::Minus, _)) => BinaryOp::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.multiplicative()?;
            let loc = lhs.loc().union(&rhs.loc());
            lhs = Expr::Op2(op, Box::new(lhs), Box::new(rhs), loc);
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> EquationResult<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some((_, Token::Mul, _)) => BinaryOp::Mul,
                Some((_, Token::Div, _)) => BinaryOp::Div,
                Some((_, Token::Mod, _)) => BinaryOp::Mod,
                _ => break,
            };
            self.bump();
            let rhs = self.unary()?;
            let loc = lhs.loc().union(&rhs.loc());
            lhs = Expr::Op2(op, Box::new(lhs), Box::new(rhs), loc);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> EquationResult<Expr> {
        match self.peek() {
            Some((start, Token::Minus, _)) => {
                self.bump();
                let operand = self.unary()?;
                let loc = Loc::new(start, operand.loc().end as usize);
                Ok(Expr::Op1(UnaryOp::Negative, Box::new(operand), loc))
            }
            Some((_, Token::Plus, _)) => {
                self.bump();
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> EquationResult<Expr> {
        let lhs = self.primary()?;
        if let Some((_, Token::Exp, _)) = self.peek() {
            self.bump();
            // right-associative
            let rhs = self.unary()?;
            let loc = lhs.loc().union(&rhs.loc());
            return Ok(Expr::Op2(BinaryOp::Exp, Box::new(lhs), Box::new(rhs), loc));
        }
        Ok(lhs)
    }

    fn primary(&mut self) -> EquationResult<Expr> {
        match self.bump() {
            Some((start, Token::Num(text), end)) => {
                let loc = Loc::new(start, end);
                let value = parse_number(text, &loc)?;
                Ok(Expr::Const(value, loc))
            }
            Some((start, Token::True, end)) => {
                Ok(Expr::Const(Variant::Bool(true), Loc::new(start, end)))
            }
            Some((start, Token::False, end)) => {
                Ok(Expr::Const(Variant::Bool(false), Loc::new(start, end)))
            }
            Some((start, Token::Ident(name), end)) => {
                if let Some((_, Token::LParen, _)) = self.peek() {
                    self.bump();
                    let (args, close) = self.call_args()?;
                    Ok(Expr::App(
                        name.to_string(),
                        args,
                        Loc::new(start, close),
                    ))
                } else {
                    Ok(Expr::Var(name.to_string(), Loc::new(start, end)))
                }
            }
            Some((_, Token::LParen, _)) => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some((start, _, end)) => eqn_err!(UnrecognizedToken, start as u16, end as u16),
            None => self.eof_err(),
        }
    }

    fn call_args(&mut self) -> EquationResult<(Vec<Expr>, usize)> {
        let mut args = vec![];
        if let Some((_, Token::RParen, end)) = self.peek() {
            self.bump();
            return Ok((args, end));
        }
        loop {
            args.push(self.expr()?);
            match self.bump() {
                Some((_, Token::Comma, _)) => continue,
                Some((_, Token::RParen, end)) => return Ok((args, end)),
                Some((start, _, end)) => {
                    return eqn_err!(UnrecognizedToken, start as u16, end as u16)
                }
                None => return self.eof_err(),
            }
        }
    }
}

fn parse_number(text: &str, loc: &Loc) -> EquationResult<Variant> {
    if text.contains(['.', 'e', 'E']) {
        match text.parse::<f64>() {
            Ok(n) => Ok(Variant::Double(n)),
            Err(_) => eqn_err!(ExpectedNumber, loc.start, loc.end),
        }
    } else {
        match text.parse::<i64>() {
            Ok(n) => Ok(Variant::Int(n)),
            // fall back for literals wider than i64
            Err(_) => match text.parse::<f64>() {
                Ok(n) => Ok(Variant::Double(n)),
                Err(_) => eqn_err!(ExpectedNumber, loc.start, loc.end),
            },
        }
    }
}

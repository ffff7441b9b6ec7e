//! Recursive-descent parser. Binary operators are parsed by precedence
//! climbing over a fixed table, the conventional shape for a small
//! C-family expression grammar.

use std::fmt;
use std::path::PathBuf;

use oyc_runtime::SourceLocation;

use crate::ast::*;
use crate::token::{Token, TokenKind};

#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub at: SourceLocation,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.at, self.message)
    }
}

impl std::error::Error for ParseError {}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    file: PathBuf,
}

type PResult<T> = Result<T, ParseError>;

impl Parser {
    pub fn new(tokens: Vec<Token>, file: PathBuf) -> Self {
        Parser { tokens, pos: 0, file }
    }

    pub fn parse_program(mut self) -> PResult<Program> {
        let mut body = Vec::new();
        while !self.check(&TokenKind::Eof) {
            body.push(self.statement()?);
        }
        Ok(Program { body })
    }

    // --- token stream helpers ---

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let i = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[i]
    }

    fn loc(&self) -> SourceLocation {
        let t = self.peek();
        SourceLocation::new(self.file.clone(), t.line, t.column)
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, kind: &TokenKind) -> PResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(ParseError {
                message: format!("expected {kind:?}, found {:?}", self.peek().kind),
                at: self.loc(),
            })
        }
    }

    fn ident(&mut self) -> PResult<String> {
        match self.peek().kind.clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(ParseError {
                message: format!("expected identifier, found {other:?}"),
                at: self.loc(),
            }),
        }
    }

    // --- statements ---

    fn statement(&mut self) -> PResult<Stmt> {
        let loc = self.loc();
        let kind = match self.peek().kind.clone() {
            TokenKind::Auto => self.let_stmt()?,
            TokenKind::If => self.if_stmt()?,
            TokenKind::While => self.while_stmt()?,
            TokenKind::Do => self.do_while_stmt()?,
            TokenKind::For => self.for_stmt()?,
            TokenKind::Foreach => self.foreach_stmt()?,
            TokenKind::Switch => self.switch_stmt()?,
            TokenKind::Break => {
                self.advance();
                self.eat(&TokenKind::Semi)?;
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                self.eat(&TokenKind::Semi)?;
                StmtKind::Continue
            }
            TokenKind::Return => self.return_stmt()?,
            TokenKind::Delete => self.delete_stmt()?,
            TokenKind::LBrace => {
                self.advance();
                let body = self.block()?;
                StmtKind::Block(body)
            }
            _ => self.expr_stmt()?,
        };
        Ok(Stmt { kind, loc })
    }

    fn block(&mut self) -> PResult<Vec<Stmt>> {
        let mut body = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            body.push(self.statement()?);
        }
        self.eat(&TokenKind::RBrace)?;
        Ok(body)
    }

    /// A brace-delimited block, or a single statement treated as a
    /// one-statement body — both are valid bodies for `if`/`while`/etc.
    fn stmt_or_block(&mut self) -> PResult<Vec<Stmt>> {
        if self.check(&TokenKind::LBrace) {
            self.advance();
            self.block()
        } else {
            Ok(vec![self.statement()?])
        }
    }

    fn let_stmt(&mut self) -> PResult<StmtKind> {
        self.advance();
        let name = self.ident()?;
        self.eat(&TokenKind::Assign)?;
        let value = self.expr()?;
        self.eat(&TokenKind::Semi)?;
        Ok(StmtKind::Let { name, value })
    }

    /// Parses `auto name = expr ;` as a bare `Stmt`, used for the optional
    /// init clause on `if`/`switch`.
    fn optional_init(&mut self) -> PResult<Option<Box<Stmt>>> {
        if self.check(&TokenKind::Auto) {
            let loc = self.loc();
            let kind = self.let_stmt()?;
            Ok(Some(Box::new(Stmt { kind, loc })))
        } else {
            Ok(None)
        }
    }

    fn if_stmt(&mut self) -> PResult<StmtKind> {
        self.advance();
        self.eat(&TokenKind::LParen)?;
        let init = self.optional_init()?;
        let cond = self.expr()?;
        self.eat(&TokenKind::RParen)?;
        let then_body = self.stmt_or_block()?;
        let else_body = if self.check(&TokenKind::Else) {
            self.advance();
            if self.check(&TokenKind::If) {
                let loc = self.loc();
                vec![Stmt {
                    kind: self.if_stmt()?,
                    loc,
                }]
            } else {
                self.stmt_or_block()?
            }
        } else {
            Vec::new()
        };
        Ok(StmtKind::If {
            init,
            cond,
            then_body,
            else_body,
        })
    }

    fn while_stmt(&mut self) -> PResult<StmtKind> {
        self.advance();
        self.eat(&TokenKind::LParen)?;
        let cond = self.expr()?;
        self.eat(&TokenKind::RParen)?;
        let body = self.stmt_or_block()?;
        Ok(StmtKind::While { cond, body })
    }

    fn do_while_stmt(&mut self) -> PResult<StmtKind> {
        self.advance();
        let body = self.stmt_or_block()?;
        self.eat(&TokenKind::While)?;
        self.eat(&TokenKind::LParen)?;
        let cond = self.expr()?;
        self.eat(&TokenKind::RParen)?;
        self.eat(&TokenKind::Semi)?;
        Ok(StmtKind::DoWhile { body, cond })
    }

    /// Classic three-clause `for (init; cond; step) { ... }`.
    fn for_stmt(&mut self) -> PResult<StmtKind> {
        self.advance();
        self.eat(&TokenKind::LParen)?;
        let init = if self.check(&TokenKind::Semi) {
            None
        } else if self.check(&TokenKind::Auto) {
            let loc = self.loc();
            Some(Box::new(Stmt { kind: self.let_stmt()?, loc }))
        } else {
            let loc = self.loc();
            let e = self.expr()?;
            self.eat(&TokenKind::Semi)?;
            Some(Box::new(Stmt { kind: StmtKind::Expr(e), loc }))
        };
        if init.is_none() {
            self.eat(&TokenKind::Semi)?;
        }
        let cond = if self.check(&TokenKind::Semi) {
            None
        } else {
            Some(self.expr()?)
        };
        self.eat(&TokenKind::Semi)?;
        let step = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(self.expr()?)
        };
        self.eat(&TokenKind::RParen)?;
        let body = self.stmt_or_block()?;
        Ok(StmtKind::ForC { init, cond, step, body })
    }

    /// `foreach (auto k, v : iterable) { ... }` (spec §4.2).
    fn foreach_stmt(&mut self) -> PResult<StmtKind> {
        self.advance();
        self.eat(&TokenKind::LParen)?;
        self.eat(&TokenKind::Auto)?;
        let key_name = self.ident()?;
        self.eat(&TokenKind::Comma)?;
        let value_name = self.ident()?;
        self.eat(&TokenKind::Colon)?;
        let iterable = self.expr()?;
        self.eat(&TokenKind::RParen)?;
        let body = self.stmt_or_block()?;
        Ok(StmtKind::ForEach {
            key_name,
            value_name,
            iterable,
            body,
        })
    }

    /// `switch (init? ; expr) { case CONST: ... default: ... }`.
    fn switch_stmt(&mut self) -> PResult<StmtKind> {
        self.advance();
        self.eat(&TokenKind::LParen)?;
        let init = self.optional_init()?;
        let subject = self.expr()?;
        self.eat(&TokenKind::RParen)?;
        self.eat(&TokenKind::LBrace)?;
        let mut cases = Vec::new();
        let mut default = None;
        while !self.check(&TokenKind::RBrace) {
            if self.check(&TokenKind::Case) {
                self.advance();
                let constant = self.expr()?;
                self.eat(&TokenKind::Colon)?;
                let mut body = Vec::new();
                while !self.check(&TokenKind::Case)
                    && !self.check(&TokenKind::Default)
                    && !self.check(&TokenKind::RBrace)
                {
                    body.push(self.statement()?);
                }
                cases.push((constant, body));
            } else if self.check(&TokenKind::Default) {
                self.advance();
                self.eat(&TokenKind::Colon)?;
                let mut body = Vec::new();
                while !self.check(&TokenKind::Case)
                    && !self.check(&TokenKind::Default)
                    && !self.check(&TokenKind::RBrace)
                {
                    body.push(self.statement()?);
                }
                default = Some(body);
            } else {
                return Err(ParseError {
                    message: format!("expected case or default, found {:?}", self.peek().kind),
                    at: self.loc(),
                });
            }
        }
        self.eat(&TokenKind::RBrace)?;
        Ok(StmtKind::Switch {
            init,
            subject,
            cases,
            default,
        })
    }

    fn return_stmt(&mut self) -> PResult<StmtKind> {
        self.advance();
        let value = if self.check(&TokenKind::Semi) {
            None
        } else {
            Some(self.expr()?)
        };
        self.eat(&TokenKind::Semi)?;
        Ok(StmtKind::Return(value))
    }

    fn delete_stmt(&mut self) -> PResult<StmtKind> {
        self.advance();
        let target = self.lvalue()?;
        self.eat(&TokenKind::Semi)?;
        Ok(StmtKind::Delete(target))
    }

    fn expr_stmt(&mut self) -> PResult<StmtKind> {
        let expr = self.expr()?;
        self.eat(&TokenKind::Semi)?;
        Ok(StmtKind::Expr(expr))
    }

    fn lvalue(&mut self) -> PResult<LValue> {
        let primary = self.primary()?;
        let expr = self.postfix(primary)?;
        expr_to_lvalue(&expr)
    }

    // --- expressions: precedence climbing ---

    fn expr(&mut self) -> PResult<Expr> {
        self.assignment()
    }

    /// Right-associative: `=` and every compound-assignment operator.
    fn assignment(&mut self) -> PResult<Expr> {
        let lhs = self.ternary()?;
        let op = match self.peek().kind {
            TokenKind::Assign => None,
            TokenKind::PlusAssign => Some(BinaryOp::Add),
            TokenKind::MinusAssign => Some(BinaryOp::Sub),
            TokenKind::StarAssign => Some(BinaryOp::Mul),
            TokenKind::SlashAssign => Some(BinaryOp::Div),
            TokenKind::PercentAssign => Some(BinaryOp::Mod),
            TokenKind::ShlAssign => Some(BinaryOp::Shl),
            TokenKind::ShrAssign => Some(BinaryOp::Shr),
            TokenKind::AmpAssign => Some(BinaryOp::BitAnd),
            TokenKind::PipeAssign => Some(BinaryOp::BitOr),
            TokenKind::CaretAssign => Some(BinaryOp::BitXor),
            _ => return Ok(lhs),
        };
        let loc = self.loc();
        self.advance();
        let target = expr_to_lvalue(&lhs)?;
        let value = self.assignment()?;
        Ok(Expr {
            kind: ExprKind::Assign {
                target,
                op,
                value: Box::new(value),
            },
            loc,
        })
    }

    fn ternary(&mut self) -> PResult<Expr> {
        let cond = self.logical_or()?;
        if self.check(&TokenKind::Question) {
            let loc = self.loc();
            self.advance();
            let then = self.expr()?;
            self.eat(&TokenKind::Colon)?;
            let els = self.expr()?;
            Ok(Expr {
                kind: ExprKind::Ternary {
                    cond: Box::new(cond),
                    then: Box::new(then),
                    els: Box::new(els),
                },
                loc,
            })
        } else {
            Ok(cond)
        }
    }

    fn logical_or(&mut self) -> PResult<Expr> {
        let mut lhs = self.logical_and()?;
        while self.check(&TokenKind::OrOr) {
            let loc = self.loc();
            self.advance();
            let rhs = self.logical_and()?;
            lhs = Expr {
                kind: ExprKind::Logical(LogicalOp::Or, Box::new(lhs), Box::new(rhs)),
                loc,
            };
        }
        Ok(lhs)
    }

    fn logical_and(&mut self) -> PResult<Expr> {
        let mut lhs = self.bit_or()?;
        while self.check(&TokenKind::AndAnd) {
            let loc = self.loc();
            self.advance();
            let rhs = self.bit_or()?;
            lhs = Expr {
                kind: ExprKind::Logical(LogicalOp::And, Box::new(lhs), Box::new(rhs)),
                loc,
            };
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> PResult<Expr> {
        let mut lhs = self.comparison()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Eq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::NotEq,
                _ => break,
            };
            let loc = self.loc();
            self.advance();
            let rhs = self.comparison()?;
            lhs = Expr {
                kind: ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)),
                loc,
            };
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> PResult<Expr> {
        let mut lhs = self.shift()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Ge => BinaryOp::Ge,
                _ => break,
            };
            let loc = self.loc();
            self.advance();
            let rhs = self.shift()?;
            lhs = Expr {
                kind: ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)),
                loc,
            };
        }
        Ok(lhs)
    }

    fn bit_or(&mut self) -> PResult<Expr> {
        let mut lhs = self.bit_xor()?;
        while self.check(&TokenKind::Pipe) {
            let loc = self.loc();
            self.advance();
            let rhs = self.bit_xor()?;
            lhs = Expr {
                kind: ExprKind::Binary(BinaryOp::BitOr, Box::new(lhs), Box::new(rhs)),
                loc,
            };
        }
        Ok(lhs)
    }

    fn bit_xor(&mut self) -> PResult<Expr> {
        let mut lhs = self.bit_and()?;
        while self.check(&TokenKind::Caret) {
            let loc = self.loc();
            self.advance();
            let rhs = self.bit_and()?;
            lhs = Expr {
                kind: ExprKind::Binary(BinaryOp::BitXor, Box::new(lhs), Box::new(rhs)),
                loc,
            };
        }
        Ok(lhs)
    }

    fn bit_and(&mut self) -> PResult<Expr> {
        let mut lhs = self.equality()?;
        while self.check(&TokenKind::Amp) {
            let loc = self.loc();
            self.advance();
            let rhs = self.equality()?;
            lhs = Expr {
                kind: ExprKind::Binary(BinaryOp::BitAnd, Box::new(lhs), Box::new(rhs)),
                loc,
            };
        }
        Ok(lhs)
    }

    fn shift(&mut self) -> PResult<Expr> {
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Shl => BinaryOp::Shl,
                TokenKind::Shr => BinaryOp::Shr,
                _ => break,
            };
            let loc = self.loc();
            self.advance();
            let rhs = self.additive()?;
            lhs = Expr {
                kind: ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)),
                loc,
            };
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> PResult<Expr> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let loc = self.loc();
            self.advance();
            let rhs = self.multiplicative()?;
            lhs = Expr {
                kind: ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)),
                loc,
            };
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> PResult<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            let loc = self.loc();
            self.advance();
            let rhs = self.unary()?;
            lhs = Expr {
                kind: ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)),
                loc,
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> PResult<Expr> {
        let loc = self.loc();
        match self.peek().kind {
            TokenKind::Minus => {
                self.advance();
                let expr = self.unary()?;
                Ok(Expr { kind: ExprKind::Unary(UnaryOp::Neg, Box::new(expr)), loc })
            }
            TokenKind::Bang => {
                self.advance();
                let expr = self.unary()?;
                Ok(Expr { kind: ExprKind::Unary(UnaryOp::Not, Box::new(expr)), loc })
            }
            TokenKind::Tilde => {
                self.advance();
                let expr = self.unary()?;
                Ok(Expr { kind: ExprKind::Unary(UnaryOp::BitNot, Box::new(expr)), loc })
            }
            TokenKind::PlusPlus => {
                self.advance();
                let target = self.lvalue()?;
                Ok(Expr { kind: ExprKind::PreIncDec { op: IncDecOp::Inc, target }, loc })
            }
            TokenKind::MinusMinus => {
                self.advance();
                let target = self.lvalue()?;
                Ok(Expr { kind: ExprKind::PreIncDec { op: IncDecOp::Dec, target }, loc })
            }
            TokenKind::TypeOf => {
                self.advance();
                let expr = self.unary()?;
                Ok(Expr { kind: ExprKind::TypeOf(Box::new(expr)), loc })
            }
            TokenKind::SizeOf => {
                self.advance();
                let expr = self.unary()?;
                Ok(Expr { kind: ExprKind::SizeOf(Box::new(expr)), loc })
            }
            TokenKind::Bool | TokenKind::IntKw | TokenKind::FloatKw | TokenKind::StrKw => {
                let kind = self.peek().kind.clone();
                self.advance();
                // cast syntax: `int(expr)`
                self.eat(&TokenKind::LParen)?;
                let expr = self.expr()?;
                self.eat(&TokenKind::RParen)?;
                let cast_kind = match kind {
                    TokenKind::Bool => oyc_runtime::CastKind::Bool,
                    TokenKind::IntKw => oyc_runtime::CastKind::Int,
                    TokenKind::FloatKw => oyc_runtime::CastKind::Float,
                    _ => oyc_runtime::CastKind::Str,
                };
                Ok(Expr { kind: ExprKind::Cast(cast_kind, Box::new(expr)), loc })
            }
            _ => {
                let primary = self.primary()?;
                self.postfix(primary)
            }
        }
    }

    fn postfix(&mut self, mut expr: Expr) -> PResult<Expr> {
        loop {
            let loc = self.loc();
            match self.peek().kind {
                TokenKind::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check(&TokenKind::RParen) {
                        loop {
                            args.push(self.expr()?);
                            if self.check(&TokenKind::Comma) {
                                self.advance();
                            } else {
                                break;
                            }
                        }
                    }
                    self.eat(&TokenKind::RParen)?;
                    expr = Expr {
                        kind: ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        loc,
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let key = self.expr()?;
                    self.eat(&TokenKind::RBracket)?;
                    expr = Expr {
                        kind: ExprKind::Index(Box::new(expr), Box::new(key)),
                        loc,
                    };
                }
                TokenKind::Dot => {
                    self.advance();
                    let name = self.ident()?;
                    let key = Expr {
                        kind: ExprKind::Str(name),
                        loc: loc.clone(),
                    };
                    expr = Expr {
                        kind: ExprKind::Index(Box::new(expr), Box::new(key)),
                        loc,
                    };
                }
                TokenKind::PlusPlus => {
                    self.advance();
                    let target = expr_to_lvalue(&expr)?;
                    expr = Expr {
                        kind: ExprKind::PostIncDec { op: IncDecOp::Inc, target },
                        loc,
                    };
                }
                TokenKind::MinusMinus => {
                    self.advance();
                    let target = expr_to_lvalue(&expr)?;
                    expr = Expr {
                        kind: ExprKind::PostIncDec { op: IncDecOp::Dec, target },
                        loc,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// The token right after `(` tells a grouped expression apart from a
    /// closure literal: `(auto ...` or the empty-parameter-list `()` both
    /// start a closure; anything else is a parenthesized expression.
    fn peek_is_closure_start(&self) -> bool {
        matches!(self.peek_at(1).kind, TokenKind::Auto) || {
            matches!(self.peek_at(1).kind, TokenKind::RParen)
                && matches!(self.peek_at(2).kind, TokenKind::LBrace)
        }
    }

    fn primary(&mut self) -> PResult<Expr> {
        let loc = self.loc();
        let kind = match self.peek().kind.clone() {
            TokenKind::Null => {
                self.advance();
                ExprKind::Null
            }
            TokenKind::True => {
                self.advance();
                ExprKind::Bool(true)
            }
            TokenKind::False => {
                self.advance();
                ExprKind::Bool(false)
            }
            TokenKind::Int(n) => {
                self.advance();
                ExprKind::Int(n)
            }
            TokenKind::Float(f) => {
                self.advance();
                ExprKind::Float(f)
            }
            TokenKind::Str(s) => {
                self.advance();
                ExprKind::Str(s)
            }
            TokenKind::Ident(name) => {
                self.advance();
                ExprKind::Ident(name)
            }
            TokenKind::Require => {
                self.advance();
                self.eat(&TokenKind::LParen)?;
                let path = self.expr()?;
                let mut args = Vec::new();
                while self.check(&TokenKind::Comma) {
                    self.advance();
                    args.push(self.expr()?);
                }
                self.eat(&TokenKind::RParen)?;
                ExprKind::Require {
                    path: Box::new(path),
                    args,
                }
            }
            TokenKind::LParen if self.peek_is_closure_start() => {
                let (params, body) = self.closure_tail()?;
                ExprKind::Function { params, body }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.expr()?;
                self.eat(&TokenKind::RParen)?;
                inner.kind
            }
            TokenKind::LBracket => {
                self.advance();
                self.eat(&TokenKind::RBracket)?;
                self.eat(&TokenKind::LBrace)?;
                let mut items = Vec::new();
                if !self.check(&TokenKind::RBrace) {
                    loop {
                        if self.check(&TokenKind::LBracket) {
                            self.advance();
                            let idx = self.expr()?;
                            self.eat(&TokenKind::RBracket)?;
                            self.eat(&TokenKind::Assign)?;
                            let value = self.expr()?;
                            items.push(ArrayItem::Indexed(idx, value));
                        } else {
                            items.push(ArrayItem::Positional(self.expr()?));
                        }
                        if self.check(&TokenKind::Comma) {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.eat(&TokenKind::RBrace)?;
                ExprKind::Array(items)
            }
            TokenKind::StructKw => self.struct_literal()?,
            other => {
                return Err(ParseError {
                    message: format!("unexpected token {other:?}"),
                    at: loc,
                })
            }
        };
        Ok(Expr { kind, loc })
    }

    /// `(auto p1, auto p2, …) { body }` (spec §4.2 "Primary").
    fn closure_tail(&mut self) -> PResult<(Vec<String>, Vec<Stmt>)> {
        self.eat(&TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                self.eat(&TokenKind::Auto)?;
                params.push(self.ident()?);
                if self.check(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.eat(&TokenKind::RParen)?;
        self.eat(&TokenKind::LBrace)?;
        let body = self.block()?;
        Ok((params, body))
    }

    /// `struct { .name = expr, [key] = expr, name = expr, ... }` (spec §4.2
    /// "Struct items").
    fn struct_literal(&mut self) -> PResult<ExprKind> {
        self.eat(&TokenKind::StructKw)?;
        self.eat(&TokenKind::LBrace)?;
        let mut fields = Vec::new();
        if !self.check(&TokenKind::RBrace) {
            loop {
                let key = if self.check(&TokenKind::LBracket) {
                    self.advance();
                    let k = self.expr()?;
                    self.eat(&TokenKind::RBracket)?;
                    StructKey::Computed(k)
                } else if self.check(&TokenKind::Dot) {
                    self.advance();
                    StructKey::Ident(self.ident()?)
                } else {
                    StructKey::Ident(self.ident()?)
                };
                self.eat(&TokenKind::Assign)?;
                let value = self.expr()?;
                fields.push((key, value));
                if self.check(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.eat(&TokenKind::RBrace)?;
        Ok(ExprKind::Struct(fields))
    }
}

fn expr_to_lvalue(expr: &Expr) -> PResult<LValue> {
    match &expr.kind {
        ExprKind::Ident(name) => Ok(LValue::Ident(name.clone())),
        ExprKind::Index(obj, key) => Ok(LValue::Index(obj.clone(), key.clone())),
        _ => Err(ParseError {
            message: "invalid assignment target".into(),
            at: expr.loc.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(src: &str) -> Program {
        let tokens = Lexer::new(src).tokenize().unwrap();
        Parser::new(tokens, PathBuf::from("<test>")).parse_program().unwrap()
    }

    #[test]
    fn parses_auto_and_arithmetic_precedence() {
        let prog = parse("auto x = 1 + 2 * 3;");
        assert_eq!(prog.body.len(), 1);
        match &prog.body[0].kind {
            StmtKind::Let { name, value } => {
                assert_eq!(name, "x");
                match &value.kind {
                    ExprKind::Binary(BinaryOp::Add, lhs, rhs) => {
                        assert!(matches!(lhs.kind, ExprKind::Int(1)));
                        assert!(matches!(rhs.kind, ExprKind::Binary(BinaryOp::Mul, _, _)));
                    }
                    other => panic!("expected Add at the top, got {other:?}"),
                }
            }
            other => panic!("expected Let, got {other:?}"),
        }
    }

    #[test]
    fn bitwise_and_binds_looser_than_equality() {
        // C-family gotcha (spec §4.2): `a & b == c` is `a & (b == c)`, not
        // `(a & b) == c` — equality binds tighter than the bitwise operators.
        let prog = parse("a & b == c;");
        match &prog.body[0].kind {
            StmtKind::Expr(e) => match &e.kind {
                ExprKind::Binary(BinaryOp::BitAnd, lhs, rhs) => {
                    assert!(matches!(lhs.kind, ExprKind::Ident(_)));
                    assert!(matches!(rhs.kind, ExprKind::Binary(BinaryOp::Eq, _, _)));
                }
                other => panic!("expected BitAnd at the top, got {other:?}"),
            },
            other => panic!("expected Expr stmt, got {other:?}"),
        }
    }

    #[test]
    fn parses_field_access_as_string_index() {
        let prog = parse("x.foo;");
        match &prog.body[0].kind {
            StmtKind::Expr(e) => match &e.kind {
                ExprKind::Index(_, key) => {
                    assert!(matches!(&key.kind, ExprKind::Str(s) if s == "foo"));
                }
                other => panic!("expected Index, got {other:?}"),
            },
            other => panic!("expected Expr stmt, got {other:?}"),
        }
    }

    #[test]
    fn parses_foreach_loop() {
        let prog = parse("foreach (auto k, v : arr) { trace(k); }");
        assert!(matches!(prog.body[0].kind, StmtKind::ForEach { .. }));
    }

    #[test]
    fn parses_closure_literal_bound_by_auto() {
        let prog = parse("auto add = (auto a, auto b) { return a + b; };");
        match &prog.body[0].kind {
            StmtKind::Let { name, value } => {
                assert_eq!(name, "add");
                assert!(matches!(value.kind, ExprKind::Function { .. }));
            }
            other => panic!("expected Let, got {other:?}"),
        }
    }

    #[test]
    fn parses_array_literal_with_explicit_indices() {
        let prog = parse("[] {0, 1, null, 3, [2] = 2, [4] = 4};");
        match &prog.body[0].kind {
            StmtKind::Expr(e) => match &e.kind {
                ExprKind::Array(items) => assert_eq!(items.len(), 6),
                other => panic!("expected Array, got {other:?}"),
            },
            other => panic!("expected Expr stmt, got {other:?}"),
        }
    }

    #[test]
    fn parses_struct_literal_with_mixed_keys() {
        let prog = parse(r#"struct { .foo = 1, bar = 2, [baz()] = 3 };"#);
        match &prog.body[0].kind {
            StmtKind::Expr(e) => match &e.kind {
                ExprKind::Struct(fields) => assert_eq!(fields.len(), 3),
                other => panic!("expected Struct, got {other:?}"),
            },
            other => panic!("expected Expr stmt, got {other:?}"),
        }
    }

    #[test]
    fn parses_switch_with_fallthrough_and_default() {
        let prog = parse(
            "switch (x) { case 1: trace(1); case 2: trace(2); break; default: trace(0); }",
        );
        match &prog.body[0].kind {
            StmtKind::Switch { cases, default, .. } => {
                assert_eq!(cases.len(), 2);
                assert!(default.is_some());
            }
            other => panic!("expected Switch, got {other:?}"),
        }
    }

    #[test]
    fn parses_ternary_and_compound_assignment() {
        let prog = parse("auto x = a > b ? a : b; x += 1;");
        assert!(matches!(prog.body[0].kind, StmtKind::Let { .. }));
        match &prog.body[1].kind {
            StmtKind::Expr(e) => assert!(matches!(
                e.kind,
                ExprKind::Assign { op: Some(BinaryOp::Add), .. }
            )),
            other => panic!("expected Expr stmt, got {other:?}"),
        }
    }

    #[test]
    fn parses_classic_for_and_do_while() {
        let prog = parse("for (auto i = 0; i < 10; i++) { trace(i); } do { x--; } while (x > 0);");
        assert!(matches!(prog.body[0].kind, StmtKind::ForC { .. }));
        assert!(matches!(prog.body[1].kind, StmtKind::DoWhile { .. }));
    }

    #[test]
    fn rejects_invalid_assignment_target() {
        let tokens = Lexer::new("1 = 2;").tokenize().unwrap();
        let err = Parser::new(tokens, PathBuf::from("<test>"))
            .parse_program()
            .unwrap_err();
        assert!(err.message.contains("unexpected") || err.message.contains("invalid"));
    }
}

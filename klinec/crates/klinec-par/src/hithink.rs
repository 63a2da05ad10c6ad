//! Parser for the Hithink/TDX dialect.
//!
//! The statement surface is deliberately small:
//!
//! ```text
//! NAME :  expr ;      output binding (stored and registered for plotting)
//! NAME := expr ;      internal binding
//! Select expr ;       sugar for `select: expr ;`
//! expr ;              bare expression statement (DRAWTEXT and friends)
//! ```
//!
//! Expressions climb `or → and → comparison → ± → * / → unary - →
//! subscript/call/primary`. A `[k]` subscript is history access and lowers to
//! `ref(x, k)` in the compiler.

use klinec_lex::{HithinkLexer, Token, TokenKind};

use crate::{Lit, SyntaxError};

#[derive(Debug)]
pub enum Stmt {
    /// `NAME : expr ;` (`output` true) or `NAME := expr ;` (`output` false).
    Assign {
        name: Token,
        value: Expr,
        output: bool,
    },
    Expression(Expr),
}

#[derive(Debug)]
pub enum Expr {
    Literal(Lit),
    Variable(Token),
    Unary {
        op: Token,
        operand: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: Token,
        right: Box<Expr>,
    },
    Call {
        name: Token,
        args: Vec<Expr>,
    },
    Subscript {
        target: Box<Expr>,
        index: Box<Expr>,
    },
}

pub struct HithinkParser<'a> {
    lexer: HithinkLexer<'a>,
    current: Token,
    previous: Token,
    errors: Vec<SyntaxError>,
    panic_mode: bool,
}

impl<'a> HithinkParser<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut parser = HithinkParser {
            lexer: HithinkLexer::new(source),
            current: Token::empty(),
            previous: Token::empty(),
            errors: Vec::new(),
            panic_mode: false,
        };
        parser.advance();
        parser
    }

    pub fn parse(&mut self) -> Vec<Stmt> {
        let mut statements = Vec::new();
        while !self.check(TokenKind::Eof) {
            match self.statement() {
                Some(stmt) => statements.push(stmt),
                None => self.synchronize(),
            }
        }
        statements
    }

    pub fn had_error(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn take_errors(&mut self) -> Vec<SyntaxError> {
        std::mem::take(&mut self.errors)
    }

    fn statement(&mut self) -> Option<Stmt> {
        if self.match_token(TokenKind::Select) {
            let keyword = self.previous.clone();
            let value = self.expression()?;
            self.consume(TokenKind::Semicolon, "Expect ';' after select condition.")?;
            // Sugar for an output binding named `select`.
            let name = Token::new(TokenKind::Identifier, "select", keyword.line);
            return Some(Stmt::Assign {
                name,
                value,
                output: true,
            });
        }

        // `IDENT :` and `IDENT :=` open a binding; everything else is an
        // expression statement. One token of lookahead disambiguates.
        if self.check(TokenKind::Identifier) {
            let next = self.lexer.peek_next_token().kind;
            if next == TokenKind::Colon || next == TokenKind::ColonEqual {
                let name = self.current.clone();
                self.advance();
                let output = self.match_token(TokenKind::Colon);
                if !output {
                    self.consume(TokenKind::ColonEqual, "Expect ':=' for variable assignment.")?;
                }
                let value = self.expression()?;
                self.consume(TokenKind::Semicolon, "Expect ';' after statement.")?;
                return Some(Stmt::Assign {
                    name,
                    value,
                    output,
                });
            }
        }

        let expr = self.expression()?;
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.")?;
        Some(Stmt::Expression(expr))
    }

    fn expression(&mut self) -> Option<Expr> {
        self.logic_or()
    }

    fn logic_or(&mut self) -> Option<Expr> {
        let mut expr = self.logic_and()?;
        while self.match_token(TokenKind::Or) {
            let op = self.previous.clone();
            let right = self.logic_and()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Some(expr)
    }

    fn logic_and(&mut self) -> Option<Expr> {
        let mut expr = self.comparison()?;
        while self.match_token(TokenKind::And) {
            let op = self.previous.clone();
            let right = self.comparison()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Some(expr)
    }

    fn comparison(&mut self) -> Option<Expr> {
        let mut expr = self.term()?;
        while self.match_any(&[
            TokenKind::Greater,
            TokenKind::GreaterEqual,
            TokenKind::Less,
            TokenKind::LessEqual,
            TokenKind::Equal,
            TokenKind::BangEqual,
        ]) {
            let op = self.previous.clone();
            let right = self.term()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Some(expr)
    }

    fn term(&mut self) -> Option<Expr> {
        let mut expr = self.factor()?;
        while self.match_any(&[TokenKind::Minus, TokenKind::Plus]) {
            let op = self.previous.clone();
            let right = self.factor()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Some(expr)
    }

    fn factor(&mut self) -> Option<Expr> {
        let mut expr = self.unary()?;
        while self.match_any(&[TokenKind::Slash, TokenKind::Star]) {
            let op = self.previous.clone();
            let right = self.unary()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Some(expr)
    }

    fn unary(&mut self) -> Option<Expr> {
        if self.match_token(TokenKind::Minus) {
            let op = self.previous.clone();
            let operand = self.unary()?;
            return Some(Expr::Unary {
                op,
                operand: Box::new(operand),
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Option<Expr> {
        let mut expr = self.primary()?;
        while self.match_token(TokenKind::LBracket) {
            let index = self.expression()?;
            self.consume(TokenKind::RBracket, "Expect ']' after subscript.")?;
            expr = Expr::Subscript {
                target: Box::new(expr),
                index: Box::new(index),
            };
        }
        Some(expr)
    }

    fn primary(&mut self) -> Option<Expr> {
        if self.match_token(TokenKind::Number) {
            return self.number_literal();
        }
        if self.match_token(TokenKind::Str) {
            let lexeme = &self.previous.lexeme;
            let value = lexeme[1..lexeme.len() - 1].to_string();
            return Some(Expr::Literal(Lit::Str(value)));
        }
        if self.match_token(TokenKind::Identifier) {
            let name = self.previous.clone();
            if self.match_token(TokenKind::LParen) {
                return self.finish_call(name);
            }
            return Some(Expr::Variable(name));
        }
        if self.match_token(TokenKind::LParen) {
            let expr = self.expression()?;
            self.consume(TokenKind::RParen, "Expect ')' after expression.")?;
            return Some(expr);
        }

        self.error_at_current("Expect expression.");
        None
    }

    fn number_literal(&mut self) -> Option<Expr> {
        match self.previous.lexeme.parse::<f64>() {
            Ok(n) => Some(Expr::Literal(Lit::Num(n))),
            Err(_) => {
                self.error_at_previous("Invalid number literal.");
                None
            }
        }
    }

    fn finish_call(&mut self, name: Token) -> Option<Expr> {
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                if args.len() >= 255 {
                    self.error_at_current("Cannot have more than 255 arguments.");
                    return None;
                }
                args.push(self.expression()?);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "Expect ')' after arguments.")?;
        Some(Expr::Call { name, args })
    }

    fn advance(&mut self) {
        self.previous = std::mem::replace(&mut self.current, Token::empty());
        loop {
            self.current = self.lexer.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = self.current.lexeme.clone();
            self.error_at_current(&message);
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Option<()> {
        if self.check(kind) {
            self.advance();
            return Some(());
        }
        self.error_at_current(message);
        None
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn match_any(&mut self, kinds: &[TokenKind]) -> bool {
        kinds.iter().any(|&kind| self.match_token(kind))
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn error_at_current(&mut self, message: &str) {
        let token = self.current.clone();
        self.error_at(&token, message);
    }

    fn error_at_previous(&mut self, message: &str) {
        let token = self.previous.clone();
        self.error_at(&token, message);
    }

    // Panic mode suppresses cascading diagnostics until the parser has
    // synchronized to a statement boundary.
    fn error_at(&mut self, token: &Token, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.errors.push(SyntaxError::at_token(token, message));
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        self.advance();
        while !self.check(TokenKind::Eof) {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            self.advance();
        }
    }
}

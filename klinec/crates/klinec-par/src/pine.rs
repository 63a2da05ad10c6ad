//! Parser for the Pine-like dialect.
//!
//! Statements are `if (cond) { … } [else { … }]`, `name = expr`, and bare
//! expressions; there are no statement terminators. Member access chains
//! (`ta.sma`, `color.red`, `input.int`) stay structural in the AST and are
//! flattened into qualified names by the compiler.

use klinec_lex::{PineLexer, Token, TokenKind};

use crate::{Lit, SyntaxError};

#[derive(Debug)]
pub enum Stmt {
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Vec<Stmt>,
    },
    Assign {
        name: Token,
        value: Expr,
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
    /// `callee(args…)`; the callee is a variable or member access.
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `object.member`, e.g. `ta.sma` or `color.red`.
    Member {
        object: Box<Expr>,
        member: Token,
    },
}

pub struct PineParser<'a> {
    lexer: PineLexer<'a>,
    current: Token,
    previous: Token,
    errors: Vec<SyntaxError>,
    panic_mode: bool,
}

impl<'a> PineParser<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut parser = PineParser {
            lexer: PineLexer::new(source),
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
        if self.match_token(TokenKind::If) {
            return self.if_statement();
        }
        if is_assignable(self.current.kind) && self.lexer.peek_next_token().kind == TokenKind::Equal
        {
            return self.assignment();
        }
        let expr = self.expression()?;
        Some(Stmt::Expression(expr))
    }

    fn if_statement(&mut self) -> Option<Stmt> {
        self.consume(TokenKind::LParen, "Expect '(' after 'if'.")?;
        let condition = self.expression()?;
        self.consume(TokenKind::RParen, "Expect ')' after if condition.")?;

        self.consume(TokenKind::LBrace, "Expect '{' before then branch.")?;
        let mut then_branch = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            then_branch.push(self.statement()?);
        }
        self.consume(TokenKind::RBrace, "Expect '}' after then branch.")?;

        let mut else_branch = Vec::new();
        if self.match_token(TokenKind::Else) {
            self.consume(TokenKind::LBrace, "Expect '{' before else branch.")?;
            while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
                else_branch.push(self.statement()?);
            }
            self.consume(TokenKind::RBrace, "Expect '}' after else branch.")?;
        }

        Some(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn assignment(&mut self) -> Option<Stmt> {
        let name = self.current.clone();
        self.advance();
        self.consume(TokenKind::Equal, "Expect '=' after variable name in assignment.")?;
        let value = self.expression()?;
        Some(Stmt::Assign { name, value })
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
            TokenKind::Less,
            TokenKind::GreaterEqual,
            TokenKind::LessEqual,
            TokenKind::EqualEqual,
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
        while self.match_any(&[TokenKind::Plus, TokenKind::Minus]) {
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
        while self.match_any(&[TokenKind::Star, TokenKind::Slash]) {
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
        if self.match_token(TokenKind::Not) {
            let op = self.previous.clone();
            let operand = self.unary()?;
            return Some(Expr::Unary {
                op,
                operand: Box::new(operand),
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> Option<Expr> {
        if self.match_token(TokenKind::Number) {
            return match self.previous.lexeme.parse::<f64>() {
                Ok(n) => Some(Expr::Literal(Lit::Num(n))),
                Err(_) => {
                    self.error_at_previous("Invalid number literal.");
                    None
                }
            };
        }
        if self.match_token(TokenKind::Str) {
            let lexeme = &self.previous.lexeme;
            return Some(Expr::Literal(Lit::Str(lexeme[1..lexeme.len() - 1].to_string())));
        }
        if self.match_token(TokenKind::True) {
            return Some(Expr::Literal(Lit::Bool(true)));
        }
        if self.match_token(TokenKind::False) {
            return Some(Expr::Literal(Lit::Bool(false)));
        }
        if self.match_token(TokenKind::LParen) {
            let expr = self.expression()?;
            self.consume(TokenKind::RParen, "Expect ')' after expression.")?;
            return Some(expr);
        }

        if is_name_like(self.current.kind) {
            self.advance();
            let mut expr = Expr::Variable(self.previous.clone());

            // Postfix chains: calls and member accesses, in any order, so
            // `ta.sma(close, 14)` and `input.int(14, "len")` both work.
            loop {
                if self.match_token(TokenKind::LParen) {
                    expr = self.finish_call(expr)?;
                } else if self.match_token(TokenKind::Dot) {
                    if !is_member_name(self.current.kind) {
                        self.error_at_current("Expect property name after '.'.");
                        return None;
                    }
                    self.advance();
                    expr = Expr::Member {
                        object: Box::new(expr),
                        member: self.previous.clone(),
                    };
                } else {
                    break;
                }
            }
            return Some(expr);
        }

        self.error_at_current("Expect expression.");
        None
    }

    fn finish_call(&mut self, callee: Expr) -> Option<Expr> {
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
        Some(Expr::Call {
            callee: Box::new(callee),
            args,
        })
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

    fn error_at(&mut self, token: &Token, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.errors.push(SyntaxError::at_token(token, message));
    }

    // Pine has no `;`, so recovery just drops the offending token and
    // resumes at what looks like a statement start.
    fn synchronize(&mut self) {
        self.panic_mode = false;
        self.advance();
        while !self.check(TokenKind::Eof) {
            if self.check(TokenKind::If) || is_assignable(self.current.kind) {
                return;
            }
            self.advance();
        }
    }
}

/// Tokens allowed on the left of `=`.
fn is_assignable(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Identifier
            | TokenKind::Input
            | TokenKind::Int
            | TokenKind::Float
            | TokenKind::Bool
            | TokenKind::Color
    )
}

/// Tokens that can head a variable/call expression.
fn is_name_like(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Identifier
            | TokenKind::Input
            | TokenKind::Int
            | TokenKind::Float
            | TokenKind::Bool
            | TokenKind::Color
            | TokenKind::Plot
            | TokenKind::PlotShape
    )
}

/// Tokens allowed after `.` (keyword type names double as member names).
fn is_member_name(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Identifier
            | TokenKind::Int
            | TokenKind::Float
            | TokenKind::Bool
            | TokenKind::Color
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Vec<Stmt> {
        let mut parser = PineParser::new(source);
        let statements = parser.parse();
        assert!(!parser.had_error(), "unexpected errors: {:?}", parser.take_errors());
        statements
    }

    #[test]
    fn assignment_with_member_call() {
        let stmts = parse_ok("ma = ta.sma(close, 14)");
        let Stmt::Assign { name, value } = &stmts[0] else {
            panic!("expected assignment");
        };
        assert_eq!(name.lexeme, "ma");
        let Expr::Call { callee, args } = value else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 2);
        assert!(matches!(callee.as_ref(), Expr::Member { .. }));
    }

    #[test]
    fn if_else_blocks() {
        let stmts = parse_ok("if (close > open) { x = 1 } else { x = 2 }");
        let Stmt::If {
            then_branch,
            else_branch,
            ..
        } = &stmts[0]
        else {
            panic!("expected if");
        };
        assert_eq!(then_branch.len(), 1);
        assert_eq!(else_branch.len(), 1);
    }

    #[test]
    fn plot_keyword_is_callable() {
        let stmts = parse_ok("plot(close, color.red)");
        let Stmt::Expression(Expr::Call { callee, args }) = &stmts[0] else {
            panic!("expected call statement");
        };
        assert!(matches!(callee.as_ref(), Expr::Variable(t) if t.lexeme == "plot"));
        assert!(matches!(args[1], Expr::Member { .. }));
    }

    #[test]
    fn input_int_parses_as_member_call() {
        let stmts = parse_ok("len = input.int(14, \"Length\")");
        let Stmt::Assign { value, .. } = &stmts[0] else {
            panic!("expected assignment");
        };
        let Expr::Call { callee, .. } = value else {
            panic!("expected call");
        };
        let Expr::Member { object, member } = callee.as_ref() else {
            panic!("expected member callee");
        };
        assert!(matches!(object.as_ref(), Expr::Variable(t) if t.kind == TokenKind::Input));
        assert_eq!(member.lexeme, "int");
    }

    #[test]
    fn missing_property_name_is_an_error() {
        let mut parser = PineParser::new("x = color.");
        parser.parse();
        assert!(parser.had_error());
    }
}

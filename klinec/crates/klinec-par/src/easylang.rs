//! Parser for the EasyLanguage dialect.
//!
//! Declaration headers come first (`Inputs: …;`, `Variables: …;`), then
//! statements: `If cond Then …`, assignments, `PlotN(value[, color]);`, and
//! bare call statements. Blocks are `Begin … End;`. A comma-separated
//! declaration list produces one AST node carrying every declared name.

use klinec_lex::{EasyLanguageLexer, Token, TokenKind};

use crate::{Lit, SyntaxError};

/// One `Name(default)` entry of an `Inputs:`/`Variables:` list.
#[derive(Debug)]
pub struct Declaration {
    pub name: Token,
    pub initializer: Option<Expr>,
}

#[derive(Debug)]
pub enum Stmt {
    Inputs(Vec<Declaration>),
    Variables(Vec<Declaration>),
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Vec<Stmt>,
    },
    Assign {
        name: Token,
        value: Expr,
    },
    /// `Plot1(value[, color]);` — the token keeps the source spelling
    /// (`Plot1`, `plot2`, …) which becomes the output column name.
    Plot {
        name: Token,
        value: Expr,
        color: Option<Expr>,
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
    /// `Close[1]` history access; lowered to `ref` by the compiler.
    Subscript {
        target: Box<Expr>,
        index: Box<Expr>,
    },
}

pub struct EasyLanguageParser<'a> {
    lexer: EasyLanguageLexer<'a>,
    current: Token,
    previous: Token,
    errors: Vec<SyntaxError>,
    panic_mode: bool,
}

impl<'a> EasyLanguageParser<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut parser = EasyLanguageParser {
            lexer: EasyLanguageLexer::new(source),
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
            match self.declaration() {
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

    fn declaration(&mut self) -> Option<Stmt> {
        if self.match_token(TokenKind::Inputs) {
            let decls = self.declaration_list("input")?;
            return Some(Stmt::Inputs(decls));
        }
        if self.match_token(TokenKind::Variables) {
            let decls = self.declaration_list("variable")?;
            return Some(Stmt::Variables(decls));
        }
        self.statement()
    }

    fn declaration_list(&mut self, what: &str) -> Option<Vec<Declaration>> {
        self.consume(TokenKind::Colon, "Expect ':' after declaration keyword.")?;
        let mut decls = Vec::new();
        loop {
            if !self.check(TokenKind::Identifier) {
                self.error_at_current(&format!("Expect {} name.", what));
                return None;
            }
            let name = self.current.clone();
            self.advance();
            let initializer = if self.match_token(TokenKind::LParen) {
                let init = self.expression()?;
                self.consume(TokenKind::RParen, "Expect ')' after initial value.")?;
                Some(init)
            } else {
                None
            };
            decls.push(Declaration { name, initializer });
            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after declaration.")?;
        Some(decls)
    }

    fn statement(&mut self) -> Option<Stmt> {
        if self.match_token(TokenKind::If) {
            return self.if_statement();
        }

        if self.check(TokenKind::Identifier) {
            // `PlotN(…)` is a statement of its own.
            if is_plot_name(&self.current.lexeme) && self.lexer.peek_next_token().kind == TokenKind::LParen
            {
                let name = self.current.clone();
                self.advance();
                return self.plot_statement(name);
            }
            if self.lexer.peek_next_token().kind == TokenKind::Equal {
                return self.assignment();
            }
            if self.lexer.peek_next_token().kind == TokenKind::LParen {
                let expr = self.expression()?;
                self.consume(TokenKind::Semicolon, "Expect ';' after function call statement.")?;
                return Some(Stmt::Expression(expr));
            }
        }

        self.error_at_current("Expected a statement.");
        None
    }

    fn plot_statement(&mut self, name: Token) -> Option<Stmt> {
        self.consume(TokenKind::LParen, "Expect '(' after plot name.")?;
        let value = self.expression()?;
        let color = if self.match_token(TokenKind::Comma) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenKind::RParen, "Expect ')' after plot arguments.")?;
        self.consume(TokenKind::Semicolon, "Expect ';' after plot statement.")?;
        Some(Stmt::Plot { name, value, color })
    }

    fn if_statement(&mut self) -> Option<Stmt> {
        let condition = self.expression()?;
        self.consume(TokenKind::Then, "Expect 'Then' after if condition.")?;

        let then_branch = self.branch()?;
        let else_branch = if self.match_token(TokenKind::Else) {
            self.branch()?
        } else {
            Vec::new()
        };

        Some(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    /// Either a `Begin … End;` block or a single statement.
    fn branch(&mut self) -> Option<Vec<Stmt>> {
        if self.match_token(TokenKind::Begin) {
            let mut statements = Vec::new();
            while !self.check(TokenKind::End) && !self.check(TokenKind::Eof) {
                statements.push(self.statement()?);
            }
            self.consume(TokenKind::End, "Expect 'End' after block.")?;
            self.consume(TokenKind::Semicolon, "Expect ';' after 'End'.")?;
            Some(statements)
        } else {
            Some(vec![self.statement()?])
        }
    }

    fn assignment(&mut self) -> Option<Stmt> {
        let name = self.current.clone();
        self.advance();
        self.consume(TokenKind::Equal, "Expect '=' for assignment.")?;
        let value = self.expression()?;
        self.consume(TokenKind::Semicolon, "Expect ';' after assignment statement.")?;
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
        // A single `=` is equality in EasyLanguage expressions.
        while self.match_any(&[
            TokenKind::Greater,
            TokenKind::Less,
            TokenKind::GreaterEqual,
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
        if self.match_token(TokenKind::Not) {
            let op = self.previous.clone();
            let operand = self.unary()?;
            return Some(Expr::Unary {
                op,
                operand: Box::new(operand),
            });
        }
        self.call()
    }

    fn call(&mut self) -> Option<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.match_token(TokenKind::LParen) {
                let Expr::Variable(name) = expr else {
                    self.error_at_current("Expected function name before '('.");
                    return None;
                };
                let mut args = Vec::new();
                if !self.check(TokenKind::RParen) {
                    loop {
                        args.push(self.expression()?);
                        if !self.match_token(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.consume(TokenKind::RParen, "Expect ')' after arguments.")?;
                expr = Expr::Call { name, args };
            } else if self.match_token(TokenKind::LBracket) {
                let index = self.expression()?;
                self.consume(TokenKind::RBracket, "Expect ']' after subscript.")?;
                expr = Expr::Subscript {
                    target: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }
        Some(expr)
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
        if self.match_token(TokenKind::True) {
            return Some(Expr::Literal(Lit::Bool(true)));
        }
        if self.match_token(TokenKind::False) {
            return Some(Expr::Literal(Lit::Bool(false)));
        }
        if self.match_token(TokenKind::Str) {
            let lexeme = &self.previous.lexeme;
            return Some(Expr::Literal(Lit::Str(lexeme[1..lexeme.len() - 1].to_string())));
        }
        if self.match_token(TokenKind::LParen) {
            let expr = self.expression()?;
            self.consume(TokenKind::RParen, "Expect ')' after expression.")?;
            return Some(expr);
        }
        if self.match_token(TokenKind::Identifier) {
            return Some(Expr::Variable(self.previous.clone()));
        }

        self.error_at_current("Expect expression.");
        None
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

/// `plot` followed by a digit, case-insensitively: `Plot1`, `plot2`, …
fn is_plot_name(lexeme: &str) -> bool {
    let lower = lexeme.to_ascii_lowercase();
    match lower.strip_prefix("plot") {
        Some(rest) => !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Vec<Stmt> {
        let mut parser = EasyLanguageParser::new(source);
        let statements = parser.parse();
        assert!(!parser.had_error(), "unexpected errors: {:?}", parser.take_errors());
        statements
    }

    #[test]
    fn inputs_list_keeps_every_declaration() {
        let stmts = parse_ok("Inputs: Length(14), Price(2);");
        let Stmt::Inputs(decls) = &stmts[0] else {
            panic!("expected inputs");
        };
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[0].name.lexeme, "Length");
        assert!(decls[0].initializer.is_some());
    }

    #[test]
    fn if_then_begin_end_with_else() {
        let stmts = parse_ok(
            "Variables: X(0);\n\
             If Close > 10 Then Begin X = 1; End; Else X = 2;",
        );
        let Stmt::If {
            then_branch,
            else_branch,
            ..
        } = &stmts[1]
        else {
            panic!("expected if");
        };
        assert_eq!(then_branch.len(), 1);
        assert_eq!(else_branch.len(), 1);
    }

    #[test]
    fn plot_n_statement() {
        let stmts = parse_ok("Plot1(Close, \"red\");");
        let Stmt::Plot { name, color, .. } = &stmts[0] else {
            panic!("expected plot");
        };
        assert_eq!(name.lexeme, "Plot1");
        assert!(color.is_some());
    }

    #[test]
    fn single_equal_compares_inside_expressions() {
        let stmts = parse_ok("Variables: X(0);\nIf Close = 10 Then X = 1;");
        let Stmt::If { condition, .. } = &stmts[1] else {
            panic!("expected if");
        };
        assert!(matches!(
            condition,
            Expr::Binary { op, .. } if op.kind == TokenKind::Equal
        ));
    }

    #[test]
    fn subscript_history_access() {
        let stmts = parse_ok("Variables: X(0);\nX = Close[1];");
        let Stmt::Assign { value, .. } = &stmts[1] else {
            panic!("expected assignment");
        };
        assert!(matches!(value, Expr::Subscript { .. }));
    }

    #[test]
    fn bare_statement_outside_forms_is_an_error() {
        let mut parser = EasyLanguageParser::new("42;");
        parser.parse();
        assert!(parser.had_error());
    }
}

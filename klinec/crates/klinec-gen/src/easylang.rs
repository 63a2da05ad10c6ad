//! EasyLanguage compiler.
//!
//! `Inputs:`/`Variables:` declarations compile to plain stores of their
//! defaults, `If/Then/Else` lowers through `JUMP_IF_FALSE`/`JUMP`, and
//! `PlotN(value[, color])` becomes a `CALL_PLOT` with the `PlotN` spelling as
//! the synthesized plot name. `Average` and `RSI` rewrite to the `ta.`
//! builtins; other function names are lower-cased and must exist in the
//! builtin table.

use klinec_ir::{Bytecode, OpCode};
use klinec_lex::TokenKind;
use klinec_par::easylang::{Declaration, EasyLanguageParser, Expr, Stmt};
use klinec_par::Lit;
use klinec_util::Value;

use crate::emit::Emitter;
use crate::CompileError;

/// Compiles EasyLanguage source to bytecode.
pub fn compile(source: &str) -> Result<Bytecode, CompileError> {
    let mut parser = EasyLanguageParser::new(source);
    let statements = parser.parse();
    if parser.had_error() {
        return Err(CompileError::Syntax {
            errors: parser.take_errors(),
        });
    }

    let mut compiler = Compiler { e: Emitter::new() };
    compiler.statements(&statements)?;
    Ok(compiler.e.finish())
}

/// Data-series names, case-insensitively (`Close`, `CLOSE`, `close`).
fn data_alias(name: &str) -> Option<&'static str> {
    Some(match name.to_ascii_lowercase().as_str() {
        "close" => "close",
        "open" => "open",
        "high" => "high",
        "low" => "low",
        "volume" => "volume",
        "date" => "date",
        "time" => "time",
        _ => return None,
    })
}

/// EasyLanguage spellings of builtin indicators.
fn function_rewrite(name: &str) -> Option<&'static str> {
    Some(match name.to_ascii_lowercase().as_str() {
        "average" => "ta.sma",
        "rsi" => "ta.rsi",
        _ => return None,
    })
}

struct Compiler {
    e: Emitter,
}

impl Compiler {
    fn statements(&mut self, statements: &[Stmt]) -> Result<(), CompileError> {
        for statement in statements {
            self.statement(statement)?;
        }
        Ok(())
    }

    fn statement(&mut self, statement: &Stmt) -> Result<(), CompileError> {
        match statement {
            // Inputs and variables both become globals holding their
            // declared value; the store re-runs on every bar.
            Stmt::Inputs(decls) | Stmt::Variables(decls) => self.declarations(decls),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.expression(condition)?;
                let skip_then = self.e.emit_jump(OpCode::JumpIfFalse);
                self.statements(then_branch)?;

                if else_branch.is_empty() {
                    self.e.patch_jump(skip_then)
                } else {
                    let skip_else = self.e.emit_jump(OpCode::Jump);
                    self.e.patch_jump(skip_then)?;
                    self.statements(else_branch)?;
                    self.e.patch_jump(skip_else)
                }
            }
            Stmt::Assign { name, value } => {
                self.expression(value)?;
                self.e.resolve_store(&name.lexeme);
                Ok(())
            }
            Stmt::Plot { name, value, color } => {
                // CALL_PLOT pops name, value, color: push color lowest.
                match color {
                    Some(color) => self.expression(color)?,
                    None => self.e.emit_constant(Value::Str("default_color".to_string())),
                }
                self.expression(value)?;
                self.e.emit_constant(Value::Str(name.lexeme.clone()));
                self.e.emit_with(OpCode::CallPlot, 3);
                self.e.emit(OpCode::Pop);
                Ok(())
            }
            Stmt::Expression(expr) => {
                self.expression(expr)?;
                self.e.emit(OpCode::Pop);
                Ok(())
            }
        }
    }

    fn declarations(&mut self, decls: &[Declaration]) -> Result<(), CompileError> {
        for decl in decls {
            match &decl.initializer {
                Some(init) => self.expression(init)?,
                None => self.e.emit_constant(Value::Num(0.0)),
            }
            self.e.resolve_store(&decl.name.lexeme);
        }
        Ok(())
    }

    fn expression(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Literal(lit) => {
                self.e.emit_constant(match lit {
                    Lit::Num(n) => Value::Num(*n),
                    Lit::Str(s) => Value::Str(s.clone()),
                    Lit::Bool(b) => Value::Bool(*b),
                });
                Ok(())
            }
            Expr::Variable(name) => {
                match data_alias(&name.lexeme) {
                    Some(canonical) => self.e.resolve_load(canonical),
                    None => self.e.resolve_load(&name.lexeme),
                }
                Ok(())
            }
            Expr::Unary { op, operand } => match op.kind {
                TokenKind::Not => {
                    self.expression(operand)?;
                    self.e.emit_call("not", 1, op.line)
                }
                _ => Err(CompileError::UnsupportedOperator {
                    op: op.lexeme.clone(),
                    line: op.line,
                }),
            },
            Expr::Binary { left, op, right } => {
                self.expression(left)?;
                self.expression(right)?;
                let opcode = match op.kind {
                    TokenKind::Plus => OpCode::Add,
                    TokenKind::Minus => OpCode::Sub,
                    TokenKind::Star => OpCode::Mul,
                    TokenKind::Slash => OpCode::Div,
                    TokenKind::Greater => OpCode::Greater,
                    TokenKind::GreaterEqual => OpCode::GreaterEqual,
                    TokenKind::Less => OpCode::Less,
                    TokenKind::LessEqual => OpCode::LessEqual,
                    // A bare `=` compares in EasyLanguage expressions.
                    TokenKind::Equal => OpCode::EqualEqual,
                    TokenKind::BangEqual => OpCode::BangEqual,
                    TokenKind::And => OpCode::LogicalAnd,
                    TokenKind::Or => OpCode::LogicalOr,
                    _ => {
                        return Err(CompileError::UnsupportedOperator {
                            op: op.lexeme.clone(),
                            line: op.line,
                        })
                    }
                };
                self.e.emit_math(opcode);
                Ok(())
            }
            Expr::Call { name, args } => {
                for arg in args {
                    self.expression(arg)?;
                }
                let func = match function_rewrite(&name.lexeme) {
                    Some(rewritten) => rewritten.to_string(),
                    None => name.lexeme.to_ascii_lowercase(),
                };
                self.e.emit_call(&func, args.len(), name.line)
            }
            Expr::Subscript { target, index } => {
                self.expression(target)?;
                self.expression(index)?;
                self.e.emit_call("ref", 2, 0)
            }
        }
    }
}

//! Hithink/TDX compiler.
//!
//! `NAME : expr ;` stores into a global slot and registers it for plotting;
//! `NAME := expr ;` stores only. Data-series aliases (`C`, `VOL`, …) map to
//! the canonical lower-case names, function names are lower-cased before the
//! builtin table lookup, `x[k]` lowers to `ref(x, k)`, and
//! `DRAWTEXT(cond, price, text)` lowers to a conditional `CALL_PLOT`.

use klinec_ir::{Bytecode, OpCode};
use klinec_lex::TokenKind;
use klinec_par::hithink::{Expr, HithinkParser, Stmt};
use klinec_par::Lit;
use klinec_util::Value;

use crate::emit::Emitter;
use crate::CompileError;

/// Compiles Hithink source to bytecode.
pub fn compile(source: &str) -> Result<Bytecode, CompileError> {
    let mut parser = HithinkParser::new(source);
    let statements = parser.parse();
    if parser.had_error() {
        return Err(CompileError::Syntax {
            errors: parser.take_errors(),
        });
    }

    let mut compiler = Compiler { e: Emitter::new() };
    for statement in &statements {
        compiler.statement(statement)?;
    }
    Ok(compiler.e.finish())
}

/// Upper-case data-series aliases to canonical VM names.
fn data_alias(name: &str) -> Option<&'static str> {
    Some(match name.to_ascii_uppercase().as_str() {
        "CLOSE" | "C" => "close",
        "OPEN" | "O" => "open",
        "HIGH" | "H" => "high",
        "LOW" | "L" => "low",
        "VOLUME" | "VOL" | "V" => "volume",
        "DATE" => "date",
        "TIME" => "time",
        _ => return None,
    })
}

struct Compiler {
    e: Emitter,
}

impl Compiler {
    fn statement(&mut self, statement: &Stmt) -> Result<(), CompileError> {
        match statement {
            Stmt::Assign {
                name,
                value,
                output,
            } => {
                self.expression(value)?;
                if *output {
                    // The store peeks so the value survives for plotting;
                    // the POP rebalances the statement.
                    self.e.resolve_store_and_plot(&name.lexeme);
                    self.e.emit(OpCode::Pop);
                } else {
                    self.e.resolve_store(&name.lexeme);
                }
                Ok(())
            }
            Stmt::Expression(expr) => {
                if let Expr::Call { name, args } = expr {
                    if name.lexeme.eq_ignore_ascii_case("drawtext") {
                        return self.drawtext(name.line, args);
                    }
                }
                self.expression(expr)?;
                self.e.emit(OpCode::Pop);
                Ok(())
            }
        }
    }

    /// `DRAWTEXT(cond, price, text)`: when `cond` is falsy the whole plot is
    /// skipped. Both paths leave the stack empty, so the jump lands after
    /// the balancing `POP`.
    fn drawtext(&mut self, line: u32, args: &[Expr]) -> Result<(), CompileError> {
        if args.len() != 3 {
            return Err(CompileError::Unsupported {
                message: "DRAWTEXT expects 3 arguments (condition, price, text)".to_string(),
                line,
            });
        }

        self.expression(&args[0])?;
        let skip = self.e.emit_jump(OpCode::JumpIfFalse);

        // CALL_PLOT pops name, value, color: push color lowest, name last.
        self.e.emit_constant(Value::Str("default_color".to_string()));
        self.expression(&args[1])?; // price
        self.expression(&args[2])?; // text, becomes the plot name
        self.e.emit_with(OpCode::CallPlot, 3);
        self.e.emit(OpCode::Pop);

        self.e.patch_jump(skip)
    }

    fn expression(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Literal(lit) => {
                self.e.emit_constant(literal_value(lit));
                Ok(())
            }
            Expr::Variable(name) => {
                match data_alias(&name.lexeme) {
                    Some(canonical) => self.e.resolve_load(canonical),
                    None => self.e.resolve_load(&name.lexeme),
                }
                Ok(())
            }
            Expr::Unary { op, operand } => {
                match op.kind {
                    // Negation as `0 - x`, through a proper intermediate
                    // slot so the result is history-capable.
                    TokenKind::Minus => {
                        self.e.emit_constant(Value::Num(0.0));
                        self.expression(operand)?;
                        self.e.emit_math(OpCode::Sub);
                        Ok(())
                    }
                    _ => Err(CompileError::UnsupportedOperator {
                        op: op.lexeme.clone(),
                        line: op.line,
                    }),
                }
            }
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
                if name.lexeme.eq_ignore_ascii_case("drawtext") {
                    return Err(CompileError::Unsupported {
                        message: "DRAWTEXT is only valid as a statement".to_string(),
                        line: name.line,
                    });
                }
                for arg in args {
                    self.expression(arg)?;
                }
                let func = name.lexeme.to_ascii_lowercase();
                self.e.emit_call(&func, args.len(), name.line)
            }
            Expr::Subscript { target, index } => {
                // `x[k]` is history access: `ref(x, k)`.
                self.expression(target)?;
                self.expression(index)?;
                self.e.emit_call("ref", 2, 0)
            }
        }
    }
}

fn literal_value(lit: &Lit) -> Value {
    match lit {
        Lit::Num(n) => Value::Num(*n),
        Lit::Str(s) => Value::Str(s.clone()),
        Lit::Bool(b) => Value::Bool(*b),
    }
}

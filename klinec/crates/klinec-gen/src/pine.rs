//! Pine compiler.
//!
//! Member accesses flatten to qualified builtin names at call sites
//! (`ta.sma`, `input.int`) and to color-string constants in value position
//! (`color.red` → `"color.red"`). `plot`/`plotshape` calls become
//! `CALL_PLOT`; as expressions they yield `true`, so an expression statement
//! stays balanced through its trailing `POP`.

use klinec_ir::{Bytecode, OpCode};
use klinec_lex::TokenKind;
use klinec_par::pine::{Expr, PineParser, Stmt};
use klinec_par::Lit;
use klinec_util::Value;

use crate::emit::Emitter;
use crate::CompileError;

/// Compiles Pine source to bytecode.
pub fn compile(source: &str) -> Result<Bytecode, CompileError> {
    let mut parser = PineParser::new(source);
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
            Stmt::Expression(expr) => {
                self.expression(expr)?;
                self.e.emit(OpCode::Pop);
                Ok(())
            }
        }
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
                self.e.resolve_load(&name.lexeme);
                Ok(())
            }
            Expr::Member { object, member } => {
                // In value position only color constants make sense:
                // `color.red` compiles to the string "color.red".
                if let Expr::Variable(ns) = object.as_ref() {
                    if ns.kind == TokenKind::Color {
                        self.e
                            .emit_constant(Value::Str(format!("color.{}", member.lexeme)));
                        return Ok(());
                    }
                }
                Err(CompileError::Unsupported {
                    message: "unsupported member access in value position".to_string(),
                    line: member.line,
                })
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
                    TokenKind::EqualEqual => OpCode::EqualEqual,
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
            Expr::Call { callee, args } => self.call(callee, args),
        }
    }

    fn call(&mut self, callee: &Expr, args: &[Expr]) -> Result<(), CompileError> {
        match callee {
            Expr::Variable(name)
                if name.kind == TokenKind::Plot || name.kind == TokenKind::PlotShape =>
            {
                self.plot_call(name.lexeme.clone(), name.line, args)
            }
            Expr::Variable(name) => {
                for arg in args {
                    self.expression(arg)?;
                }
                self.e.emit_call(&name.lexeme, args.len(), name.line)
            }
            Expr::Member { object, member } => {
                let Expr::Variable(ns) = object.as_ref() else {
                    return Err(CompileError::Unsupported {
                        message: "unsupported callee: member access on non-variable".to_string(),
                        line: member.line,
                    });
                };
                for arg in args {
                    self.expression(arg)?;
                }
                let func = format!("{}.{}", ns.lexeme, member.lexeme);
                self.e.emit_call(&func, args.len(), member.line)
            }
            _ => Err(CompileError::Unsupported {
                message: "unsupported callee expression type".to_string(),
                line: 0,
            }),
        }
    }

    /// `plot(value[, color])` → `CALL_PLOT` with the keyword's own spelling
    /// as the plot name. The call pushes `true`.
    fn plot_call(&mut self, name: String, line: u32, args: &[Expr]) -> Result<(), CompileError> {
        if args.is_empty() || args.len() > 2 {
            return Err(CompileError::ArityMismatch {
                name,
                min: 1,
                max: 2,
                got: args.len(),
                line,
            });
        }
        match args.get(1) {
            Some(color) => self.expression(color)?,
            None => self.e.emit_constant(Value::Str("default_color".to_string())),
        }
        self.expression(&args[0])?;
        self.e.emit_constant(Value::Str(name));
        self.e.emit_with(OpCode::CallPlot, 3);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(bytecode: &Bytecode) -> Vec<OpCode> {
        bytecode.instructions.iter().map(|i| i.op).collect()
    }

    #[test]
    fn member_call_flattens_to_qualified_name() {
        let bc = compile("ma = ta.sma(close, 14)").unwrap();
        let call = bc
            .instructions
            .iter()
            .find(|i| i.op == OpCode::CallBuiltinFunc)
            .unwrap();
        assert!(matches!(
            &bc.constants[call.operand as usize],
            Value::Str(s) if s == "ta.sma"
        ));
    }

    #[test]
    fn plot_statement_is_balanced() {
        let bc = compile("plot(close, color.red)").unwrap();
        assert_eq!(
            ops(&bc),
            vec![
                OpCode::PushConst,      // "color.red"
                OpCode::LoadBuiltinVar, // close
                OpCode::PushConst,      // "plot"
                OpCode::CallPlot,
                OpCode::Pop,
                OpCode::Halt,
            ]
        );
        assert!(matches!(&bc.constants[0], Value::Str(s) if s == "color.red"));
    }

    #[test]
    fn input_int_is_an_ordinary_builtin_call() {
        let bc = compile("len = input.int(14, \"Length\")").unwrap();
        let call = bc
            .instructions
            .iter()
            .find(|i| i.op == OpCode::CallBuiltinFunc)
            .unwrap();
        assert!(matches!(
            &bc.constants[call.operand as usize],
            Value::Str(s) if s == "input.int"
        ));
    }

    #[test]
    fn if_without_else_patches_past_then() {
        let bc = compile("if (close > open) { x = 1 }").unwrap();
        let seq = ops(&bc);
        let jif = seq.iter().position(|&op| op == OpCode::JumpIfFalse).unwrap();
        let target = jif + 1 + bc.instructions[jif].operand as usize;
        assert_eq!(bc.instructions[target].op, OpCode::Halt);
    }

    #[test]
    fn color_member_outside_color_namespace_is_rejected() {
        assert!(matches!(
            compile("x = foo.red"),
            Err(CompileError::Unsupported { .. })
        ));
    }
}

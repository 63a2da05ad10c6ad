//! Textual bytecode serialization.
//!
//! The stable on-disk form has four sections, always in this order:
//!
//! ```text
//! --- Bytecode ---
//! 0: PUSH_CONST 0
//! 1: STORE_GLOBAL 0
//! 2: HALT
//!
//! --- Variable Number ---
//! 0
//!
//! --- Constant Pool ---
//! 0: 14
//!
//! --- Global Name Pool ---
//! 0: MA5
//!
//! --- Validation ---
//! Checksum: 123456789
//! ```
//!
//! Constants render as a plain decimal, `true`/`false`, `"string"`,
//! `Series(name)` (name-only placeholder, data is never serialized), or
//! `monostate` for the empty value. The checksum line is mandatory;
//! deserialization recomputes it and rejects any mismatch before a single
//! byte of VM state changes.

use std::fmt::Write;

use klinec_util::{new_series_ref, Series, Value};
use thiserror::Error;

use crate::checksum::{format_number, generate};
use crate::{Bytecode, Instruction, OpCode};

/// Errors raised while parsing or validating textual bytecode.
#[derive(Debug, Error)]
pub enum BytecodeError {
    #[error("unknown opcode in bytecode text: {0}")]
    UnknownOpcode(String),

    #[error("could not parse instruction line: {0:?}")]
    BadInstruction(String),

    #[error("could not parse variable number: {0:?}")]
    BadVarCount(String),

    #[error("could not parse constant value: {0:?}")]
    BadConstant(String),

    #[error("validation checksum not found in the bytecode text")]
    MissingChecksum,

    #[error("checksum mismatch: the bytecode text is corrupted or has been tampered with (expected {expected}, actual {actual})")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("instruction {index}: {op} operand {operand} is out of range")]
    OperandOutOfRange {
        index: usize,
        op: &'static str,
        operand: i32,
    },

    #[error("instruction {index}: jump offset {operand} leaves the program")]
    BadJump { index: usize, operand: i32 },
}

pub(crate) fn to_text(bytecode: &Bytecode) -> String {
    let mut out = String::from("--- Bytecode ---\n");
    for (i, instr) in bytecode.instructions.iter().enumerate() {
        if instr.op.has_operand() {
            let _ = writeln!(out, "{}: {} {}", i, instr.op.mnemonic(), instr.operand);
        } else {
            let _ = writeln!(out, "{}: {}", i, instr.op.mnemonic());
        }
    }

    out.push_str("\n--- Variable Number ---\n");
    let _ = writeln!(out, "{}", bytecode.var_count);

    out.push_str("\n--- Constant Pool ---\n");
    for (i, constant) in bytecode.constants.iter().enumerate() {
        let repr = match constant {
            Value::Num(n) => format_number(*n),
            Value::Bool(b) => (if *b { "true" } else { "false" }).to_string(),
            Value::Str(s) => format!("\"{}\"", s),
            Value::Series(s) => format!("Series({})", s.borrow().name()),
            Value::None => "monostate".to_string(),
        };
        let _ = writeln!(out, "{}: {}", i, repr);
    }

    out.push_str("\n--- Global Name Pool ---\n");
    for (i, name) in bytecode.global_names.iter().enumerate() {
        let _ = writeln!(out, "{}: {}", i, name);
    }

    out.push_str("\n--- Validation ---\n");
    let _ = writeln!(out, "Checksum: {}", generate(bytecode));
    out
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Instructions,
    VarCount,
    Constants,
    Globals,
    Validation,
}

pub(crate) fn from_text(source: &str) -> Result<Bytecode, BytecodeError> {
    let mut bytecode = Bytecode::default();
    let mut section = Section::None;
    let mut expected_checksum: Option<u32> = None;

    for line in source.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }

        match line {
            "--- Bytecode ---" => {
                section = Section::Instructions;
                continue;
            }
            "--- Variable Number ---" => {
                section = Section::VarCount;
                continue;
            }
            "--- Constant Pool ---" => {
                section = Section::Constants;
                continue;
            }
            "--- Global Name Pool ---" => {
                section = Section::Globals;
                continue;
            }
            "--- Validation ---" => {
                section = Section::Validation;
                continue;
            }
            _ => {}
        }

        match section {
            Section::Instructions => {
                bytecode.instructions.push(parse_instruction(line)?);
            }
            Section::VarCount => {
                bytecode.var_count = line
                    .trim()
                    .parse()
                    .map_err(|_| BytecodeError::BadVarCount(line.to_string()))?;
            }
            Section::Constants => {
                let repr = strip_index(line);
                bytecode.constants.push(parse_constant(repr)?);
            }
            Section::Globals => {
                bytecode.global_names.push(strip_index(line).to_string());
            }
            Section::Validation => {
                if let Some(rest) = line.strip_prefix("Checksum:") {
                    expected_checksum = rest.trim().parse().ok();
                }
            }
            Section::None => {}
        }
    }

    let expected = expected_checksum.ok_or(BytecodeError::MissingChecksum)?;
    let actual = generate(&bytecode);
    if actual != expected {
        return Err(BytecodeError::ChecksumMismatch { expected, actual });
    }

    bytecode.validate()?;
    Ok(bytecode)
}

/// Drops the leading `index: ` part of a pool line.
fn strip_index(line: &str) -> &str {
    match line.find(": ") {
        Some(pos) => &line[pos + 2..],
        None => line,
    }
}

fn parse_instruction(line: &str) -> Result<Instruction, BytecodeError> {
    let mut parts = line.split_whitespace();
    let _index = parts
        .next()
        .ok_or_else(|| BytecodeError::BadInstruction(line.to_string()))?;
    let mnemonic = parts
        .next()
        .ok_or_else(|| BytecodeError::BadInstruction(line.to_string()))?;
    let op = OpCode::from_mnemonic(mnemonic)
        .ok_or_else(|| BytecodeError::UnknownOpcode(mnemonic.to_string()))?;
    let operand = match parts.next() {
        Some(text) => text
            .parse()
            .map_err(|_| BytecodeError::BadInstruction(line.to_string()))?,
        None => 0,
    };
    Ok(Instruction { op, operand })
}

fn parse_constant(repr: &str) -> Result<Value, BytecodeError> {
    if repr == "true" {
        return Ok(Value::Bool(true));
    }
    if repr == "false" {
        return Ok(Value::Bool(false));
    }
    if repr == "monostate" {
        return Ok(Value::None);
    }
    if repr.len() >= 2 && repr.starts_with('"') && repr.ends_with('"') {
        return Ok(Value::Str(repr[1..repr.len() - 1].to_string()));
    }
    if let Some(name) = repr.strip_prefix("Series(").and_then(|r| r.strip_suffix(')')) {
        return Ok(Value::Series(new_series_ref(Series::new(name))));
    }
    repr.parse::<f64>()
        .map(Value::Num)
        .map_err(|_| BytecodeError::BadConstant(repr.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Bytecode {
        Bytecode {
            instructions: vec![
                Instruction::new(OpCode::PushConst, 0),
                Instruction::new(OpCode::PushConst, 1),
                Instruction::new(OpCode::Add, 0),
                Instruction::new(OpCode::StoreAndPlotGlobal, 0),
                Instruction::new(OpCode::Pop, 0),
                Instruction::new(OpCode::Halt, 0),
            ],
            constants: vec![
                Value::Num(2.5),
                Value::Num(4.0),
                Value::Str("default_color".into()),
                Value::Bool(true),
                Value::None,
                Value::Series(new_series_ref(Series::new("close"))),
            ],
            global_names: vec!["RESULT".into()],
            var_count: 1,
        }
    }

    #[test]
    fn round_trip_preserves_everything() {
        let original = sample();
        let text = original.to_text();
        let loaded = Bytecode::from_text(&text).unwrap();

        assert_eq!(loaded.instructions, original.instructions);
        assert_eq!(loaded.global_names, original.global_names);
        assert_eq!(loaded.var_count, original.var_count);
        assert_eq!(loaded.constants.len(), original.constants.len());
        assert_eq!(loaded.checksum(), original.checksum());
    }

    #[test]
    fn series_constants_are_name_only_placeholders() {
        let text = sample().to_text();
        assert!(text.contains("Series(close)"));
        let loaded = Bytecode::from_text(&text).unwrap();
        match &loaded.constants[5] {
            Value::Series(s) => {
                assert_eq!(s.borrow().name(), "close");
                assert!(s.borrow().is_empty());
            }
            other => panic!("expected series constant, got {:?}", other),
        }
    }

    #[test]
    fn tampered_operand_fails_the_checksum() {
        let text = sample().to_text();
        // Flip the operand of the PUSH_CONST at index 1 from 1 to 2.
        let tampered = text.replace("1: PUSH_CONST 1", "1: PUSH_CONST 2");
        assert_ne!(text, tampered);
        match Bytecode::from_text(&tampered) {
            Err(BytecodeError::ChecksumMismatch { .. }) => {}
            other => panic!("expected checksum mismatch, got {:?}", other),
        }
    }

    #[test]
    fn missing_checksum_is_rejected() {
        let text = sample().to_text();
        let truncated = text.split("--- Validation ---").next().unwrap().to_string();
        assert!(matches!(
            Bytecode::from_text(&truncated),
            Err(BytecodeError::MissingChecksum)
        ));
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        let text = sample().to_text().replace("PUSH_CONST", "PUSH_THING");
        assert!(matches!(
            Bytecode::from_text(&text),
            Err(BytecodeError::UnknownOpcode(_))
        ));
    }

    #[test]
    fn operandless_mnemonics_print_bare() {
        let text = sample().to_text();
        assert!(text.contains("4: POP\n"));
        assert!(text.contains("5: HALT\n"));
    }
}

//! klinec-ir - The shared bytecode representation.
//!
//! Every frontend compiles to this one instruction set, and the VM executes
//! nothing else. The crate also owns the stable textual serialization (with
//! its FNV-1a validation checksum) and the builtin signature table that the
//! compilers and the VM both consult, so the calling convention has a single
//! source of truth.

mod checksum;
mod opcode;
pub mod signatures;
mod text;

pub use checksum::Fnv1a;
pub use opcode::OpCode;
pub use signatures::{builtin_arity, Arity};
pub use text::BytecodeError;

use klinec_util::Value;

/// One VM instruction: an opcode and a single integer operand.
///
/// The operand meaning depends on the opcode: constant-pool index, global
/// slot, relative forward jump distance, intermediate-series slot, or (for
/// `CALL_PLOT`) the fixed argument count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub op: OpCode,
    pub operand: i32,
}

impl Instruction {
    pub fn new(op: OpCode, operand: i32) -> Self {
        Instruction { op, operand }
    }
}

/// A compiled program.
#[derive(Clone, Debug, Default)]
pub struct Bytecode {
    pub instructions: Vec<Instruction>,
    pub constants: Vec<Value>,
    pub global_names: Vec<String>,
    /// Number of intermediate-series slots used by arithmetic, comparison,
    /// and logic instructions.
    pub var_count: usize,
}

impl Bytecode {
    /// Renders the stable four-section textual form.
    pub fn to_text(&self) -> String {
        text::to_text(self)
    }

    /// Parses the textual form, verifying the embedded checksum.
    pub fn from_text(source: &str) -> Result<Bytecode, BytecodeError> {
        text::from_text(source)
    }

    /// 32-bit FNV-1a hash over the canonical serialization.
    pub fn checksum(&self) -> u32 {
        checksum::generate(self)
    }

    /// Structural well-formedness: every operand within its pool, every jump
    /// landing on an instruction, `var_count` covering every math slot.
    pub fn validate(&self) -> Result<(), BytecodeError> {
        let n = self.instructions.len();
        for (i, instr) in self.instructions.iter().enumerate() {
            let operand = instr.operand;
            match instr.op {
                OpCode::PushConst | OpCode::LoadBuiltinVar | OpCode::CallBuiltinFunc => {
                    if operand < 0 || operand as usize >= self.constants.len() {
                        return Err(BytecodeError::OperandOutOfRange {
                            index: i,
                            op: instr.op.mnemonic(),
                            operand,
                        });
                    }
                }
                OpCode::LoadGlobal | OpCode::StoreGlobal | OpCode::StoreAndPlotGlobal => {
                    if operand < 0 || operand as usize >= self.global_names.len() {
                        return Err(BytecodeError::OperandOutOfRange {
                            index: i,
                            op: instr.op.mnemonic(),
                            operand,
                        });
                    }
                }
                OpCode::Jump | OpCode::JumpIfFalse => {
                    // Relative and forward-only, measured from the following
                    // instruction; landing one past the end is legal.
                    if operand < 0 || i + 1 + operand as usize > n {
                        return Err(BytecodeError::BadJump { index: i, operand });
                    }
                }
                op if op.is_math() => {
                    if operand < 0 || operand as usize >= self.var_count {
                        return Err(BytecodeError::OperandOutOfRange {
                            index: i,
                            op: op.mnemonic(),
                            operand,
                        });
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Bytecode {
        Bytecode {
            instructions: vec![
                Instruction::new(OpCode::PushConst, 0),
                Instruction::new(OpCode::StoreGlobal, 0),
                Instruction::new(OpCode::Halt, 0),
            ],
            constants: vec![Value::Num(1.5)],
            global_names: vec!["X".into()],
            var_count: 0,
        }
    }

    #[test]
    fn valid_bytecode_passes_validation() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn constant_operand_out_of_range_is_rejected() {
        let mut bc = sample();
        bc.instructions[0].operand = 3;
        assert!(matches!(
            bc.validate(),
            Err(BytecodeError::OperandOutOfRange { index: 0, .. })
        ));
    }

    #[test]
    fn math_slot_must_fit_var_count() {
        let mut bc = sample();
        bc.instructions[1] = Instruction::new(OpCode::Add, 0);
        assert!(bc.validate().is_err());
        bc.var_count = 1;
        assert!(bc.validate().is_ok());
    }

    #[test]
    fn jump_must_stay_inside_the_program() {
        let mut bc = sample();
        bc.instructions[0] = Instruction::new(OpCode::Jump, 2);
        assert!(bc.validate().is_ok());
        bc.instructions[0] = Instruction::new(OpCode::Jump, 3);
        assert!(matches!(bc.validate(), Err(BytecodeError::BadJump { .. })));
    }
}

//! The shared bytecode emitter.

use indexmap::IndexMap;
use klinec_ir::{builtin_arity, Bytecode, Instruction, OpCode};
use klinec_util::Value;

use crate::CompileError;

/// Jump operand placeholder, also the largest encodable forward distance.
const JUMP_PLACEHOLDER: i32 = 0xFFFF;

/// Names that resolve to host-registered data series instead of globals.
pub(crate) fn is_builtin_series(name: &str) -> bool {
    matches!(
        name,
        "open" | "high" | "low" | "close" | "volume" | "time" | "date"
    )
}

/// Append-only bytecode builder shared by the three compilers.
///
/// Globals are allocated on first mention, in order, so the slot index of a
/// name equals its position in the global name pool. Every arithmetic,
/// comparison, or logic instruction takes a fresh intermediate-series slot;
/// per-site identity is what lets nested expressions keep their own history
/// across bars.
pub(crate) struct Emitter {
    bytecode: Bytecode,
    slots: IndexMap<String, usize>,
}

impl Emitter {
    pub fn new() -> Self {
        Emitter {
            bytecode: Bytecode::default(),
            slots: IndexMap::new(),
        }
    }

    pub fn emit(&mut self, op: OpCode) {
        self.bytecode.instructions.push(Instruction::new(op, 0));
    }

    pub fn emit_with(&mut self, op: OpCode, operand: i32) {
        self.bytecode.instructions.push(Instruction::new(op, operand));
    }

    /// Math opcode with a freshly allocated intermediate slot.
    pub fn emit_math(&mut self, op: OpCode) {
        debug_assert!(op.is_math());
        let slot = self.bytecode.var_count;
        self.bytecode.var_count += 1;
        self.emit_with(op, slot as i32);
    }

    pub fn add_constant(&mut self, value: Value) -> i32 {
        self.bytecode.constants.push(value);
        (self.bytecode.constants.len() - 1) as i32
    }

    pub fn emit_constant(&mut self, value: Value) {
        let index = self.add_constant(value);
        self.emit_with(OpCode::PushConst, index);
    }

    /// Loads `name`: a builtin data series by name, or a global by slot.
    pub fn resolve_load(&mut self, name: &str) {
        if is_builtin_series(name) {
            let index = self.add_constant(Value::Str(name.to_string()));
            self.emit_with(OpCode::LoadBuiltinVar, index);
        } else {
            let slot = self.global_slot(name);
            self.emit_with(OpCode::LoadGlobal, slot);
        }
    }

    pub fn resolve_store(&mut self, name: &str) {
        let slot = self.global_slot(name);
        self.emit_with(OpCode::StoreGlobal, slot);
    }

    /// Store that also registers the slot's series for plotting. The opcode
    /// peeks, so callers follow it with a `POP` to balance the statement.
    pub fn resolve_store_and_plot(&mut self, name: &str) {
        let slot = self.global_slot(name);
        self.emit_with(OpCode::StoreAndPlotGlobal, slot);
    }

    fn global_slot(&mut self, name: &str) -> i32 {
        if let Some(&slot) = self.slots.get(name) {
            return slot as i32;
        }
        let slot = self.slots.len();
        self.slots.insert(name.to_string(), slot);
        self.bytecode.global_names.push(name.to_string());
        slot as i32
    }

    /// Emits a forward jump with a placeholder operand; returns the site to
    /// patch once the target is known.
    pub fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_with(op, JUMP_PLACEHOLDER);
        self.bytecode.instructions.len() - 1
    }

    /// Patches `site` to jump to the next instruction to be emitted. The
    /// operand is relative to the instruction after the jump.
    pub fn patch_jump(&mut self, site: usize) -> Result<(), CompileError> {
        let distance = self.bytecode.instructions.len() - site - 1;
        if distance > JUMP_PLACEHOLDER as usize {
            return Err(CompileError::JumpTooFar);
        }
        self.bytecode.instructions[site].operand = distance as i32;
        Ok(())
    }

    /// Compiled-arguments call: validates the arity range, pads optional
    /// trailing arguments with `monostate` constants up to `max`, and emits
    /// the call. The caller has already compiled `argc` argument values.
    pub fn emit_call(&mut self, func: &str, argc: usize, line: u32) -> Result<(), CompileError> {
        let arity = builtin_arity(func).ok_or_else(|| CompileError::UnknownFunction {
            name: func.to_string(),
            line,
        })?;
        if argc < arity.min || argc > arity.max {
            return Err(CompileError::ArityMismatch {
                name: func.to_string(),
                min: arity.min,
                max: arity.max,
                got: argc,
                line,
            });
        }
        for _ in argc..arity.max {
            self.emit_constant(Value::None);
        }
        let index = self.add_constant(Value::Str(func.to_string()));
        self.emit_with(OpCode::CallBuiltinFunc, index);
        Ok(())
    }

    /// Seals the program with `HALT` and hands the bytecode over.
    pub fn finish(mut self) -> Bytecode {
        self.emit(OpCode::Halt);
        tracing::debug!(
            instructions = self.bytecode.instructions.len(),
            constants = self.bytecode.constants.len(),
            globals = self.bytecode.global_names.len(),
            var_count = self.bytecode.var_count,
            "bytecode emitted"
        );
        self.bytecode
    }
}

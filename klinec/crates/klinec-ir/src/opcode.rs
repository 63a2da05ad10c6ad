//! The instruction set.

/// Opcodes of the kline VM.
///
/// The discriminants are the stable integers used by the canonical checksum
/// serialization; appending new opcodes is allowed, renumbering is not.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// Push `constants[operand]`.
    PushConst = 0,
    /// Discard the top of the stack.
    Pop = 1,

    // Arithmetic, comparison, and logic. The operand is the intermediate
    // series slot receiving the per-bar result.
    Add = 2,
    Sub = 3,
    Mul = 4,
    Div = 5,
    Less = 6,
    LessEqual = 7,
    EqualEqual = 8,
    BangEqual = 9,
    Greater = 10,
    GreaterEqual = 11,
    LogicalAnd = 12,
    LogicalOr = 13,

    /// Push the builtin data series named by `constants[operand]`.
    LoadBuiltinVar = 14,
    /// Push `globals[operand]`.
    LoadGlobal = 15,
    /// Pop a value into the global slot, lifting scalars into a series.
    StoreGlobal = 16,
    /// Like `StoreGlobal` but peeks, and registers the slot's series for
    /// plotting on first execution.
    StoreAndPlotGlobal = 17,
    /// Pop a name, rename the series on top of the stack in place.
    RenameSeries = 18,

    /// Pop a condition; when falsy, skip `operand` instructions.
    JumpIfFalse = 19,
    /// Skip `operand` instructions.
    Jump = 20,

    /// Invoke the builtin named by `constants[operand]`, push its result.
    CallBuiltinFunc = 21,
    /// Pop name, value, color; register the plot. Operand is always 3.
    CallPlot = 22,

    /// End of the current bar.
    Halt = 23,
}

impl OpCode {
    /// Mnemonic used by the textual bytecode form.
    pub fn mnemonic(self) -> &'static str {
        match self {
            OpCode::PushConst => "PUSH_CONST",
            OpCode::Pop => "POP",
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Mul => "MUL",
            OpCode::Div => "DIV",
            OpCode::Less => "LESS",
            OpCode::LessEqual => "LESS_EQUAL",
            OpCode::EqualEqual => "EQUAL_EQUAL",
            OpCode::BangEqual => "BANG_EQUAL",
            OpCode::Greater => "GREATER",
            OpCode::GreaterEqual => "GREATER_EQUAL",
            OpCode::LogicalAnd => "LOGICAL_AND",
            OpCode::LogicalOr => "LOGICAL_OR",
            OpCode::LoadBuiltinVar => "LOAD_BUILTIN_VAR",
            OpCode::LoadGlobal => "LOAD_GLOBAL",
            OpCode::StoreGlobal => "STORE_GLOBAL",
            OpCode::StoreAndPlotGlobal => "STORE_AND_PLOT_GLOBAL",
            OpCode::RenameSeries => "RENAME_SERIES",
            OpCode::JumpIfFalse => "JUMP_IF_FALSE",
            OpCode::Jump => "JUMP",
            OpCode::CallBuiltinFunc => "CALL_BUILTIN_FUNC",
            OpCode::CallPlot => "CALL_PLOT",
            OpCode::Halt => "HALT",
        }
    }

    pub fn from_mnemonic(name: &str) -> Option<OpCode> {
        Some(match name {
            "PUSH_CONST" => OpCode::PushConst,
            "POP" => OpCode::Pop,
            "ADD" => OpCode::Add,
            "SUB" => OpCode::Sub,
            "MUL" => OpCode::Mul,
            "DIV" => OpCode::Div,
            "LESS" => OpCode::Less,
            "LESS_EQUAL" => OpCode::LessEqual,
            "EQUAL_EQUAL" => OpCode::EqualEqual,
            "BANG_EQUAL" => OpCode::BangEqual,
            "GREATER" => OpCode::Greater,
            "GREATER_EQUAL" => OpCode::GreaterEqual,
            "LOGICAL_AND" => OpCode::LogicalAnd,
            "LOGICAL_OR" => OpCode::LogicalOr,
            "LOAD_BUILTIN_VAR" => OpCode::LoadBuiltinVar,
            "LOAD_GLOBAL" => OpCode::LoadGlobal,
            "STORE_GLOBAL" => OpCode::StoreGlobal,
            "STORE_AND_PLOT_GLOBAL" => OpCode::StoreAndPlotGlobal,
            "RENAME_SERIES" => OpCode::RenameSeries,
            "JUMP_IF_FALSE" => OpCode::JumpIfFalse,
            "JUMP" => OpCode::Jump,
            "CALL_BUILTIN_FUNC" => OpCode::CallBuiltinFunc,
            "CALL_PLOT" => OpCode::CallPlot,
            "HALT" => OpCode::Halt,
            _ => return None,
        })
    }

    /// Arithmetic, comparison, or logic op whose operand is an intermediate
    /// series slot.
    pub fn is_math(self) -> bool {
        matches!(
            self,
            OpCode::Add
                | OpCode::Sub
                | OpCode::Mul
                | OpCode::Div
                | OpCode::Less
                | OpCode::LessEqual
                | OpCode::EqualEqual
                | OpCode::BangEqual
                | OpCode::Greater
                | OpCode::GreaterEqual
                | OpCode::LogicalAnd
                | OpCode::LogicalOr
        )
    }

    /// Whether the textual form prints an operand after the mnemonic.
    pub fn has_operand(self) -> bool {
        !matches!(self, OpCode::Pop | OpCode::RenameSeries | OpCode::Halt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OpCode; 24] = [
        OpCode::PushConst,
        OpCode::Pop,
        OpCode::Add,
        OpCode::Sub,
        OpCode::Mul,
        OpCode::Div,
        OpCode::Less,
        OpCode::LessEqual,
        OpCode::EqualEqual,
        OpCode::BangEqual,
        OpCode::Greater,
        OpCode::GreaterEqual,
        OpCode::LogicalAnd,
        OpCode::LogicalOr,
        OpCode::LoadBuiltinVar,
        OpCode::LoadGlobal,
        OpCode::StoreGlobal,
        OpCode::StoreAndPlotGlobal,
        OpCode::RenameSeries,
        OpCode::JumpIfFalse,
        OpCode::Jump,
        OpCode::CallBuiltinFunc,
        OpCode::CallPlot,
        OpCode::Halt,
    ];

    #[test]
    fn mnemonics_round_trip() {
        for op in ALL {
            assert_eq!(OpCode::from_mnemonic(op.mnemonic()), Some(op));
        }
        assert_eq!(OpCode::from_mnemonic("NOPE"), None);
    }

    #[test]
    fn discriminants_are_dense_and_stable() {
        for (i, op) in ALL.iter().enumerate() {
            assert_eq!(*op as u8 as usize, i);
        }
    }
}

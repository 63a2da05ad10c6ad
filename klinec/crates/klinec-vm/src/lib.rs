//! klinec-vm - The stack virtual machine.
//!
//! One `Vm` owns one evaluation: host data series go in through
//! [`Vm::register_series`], a program goes in through [`Vm::load_bytecode`]
//! (textual form, checksum-verified), and [`Vm::execute`] runs every
//! instruction once per bar. Output comes back as the ordered plot registry
//! and its CSV rendering.
//!
//! Execution is strictly single-threaded and bar-ordered. Arithmetic,
//! comparison, and logic results are written into per-site intermediate
//! series so every expression is history-capable; user globals are lifted to
//! series on first store for the same reason. Builtin indicator functions
//! keep their cross-bar memory in a per-VM result cache keyed by a canonical
//! `name(arg~arg~…)` string.

mod builtins;
mod context;
mod output;

pub use context::FunctionContext;

use klinec_ir::{Bytecode, BytecodeError, OpCode};
use klinec_util::{new_series_ref, Series, SeriesExt, SeriesRef, Value, ValueError};
use rustc_hash::FxHashMap;
use thiserror::Error;

/// A registered plot: the output series plus its display color.
#[derive(Clone, Debug)]
pub struct PlottedSeries {
    pub series: SeriesRef,
    pub color: String,
}

/// What went wrong during a bar, without location context.
#[derive(Debug, Error)]
pub enum RuntimeErrorKind {
    #[error("no bytecode loaded")]
    NoBytecode,

    #[error("stack underflow")]
    StackUnderflow,

    #[error("execution ran past the end of the program (missing HALT)")]
    MissingHalt,

    #[error("undefined built-in variable: {0}")]
    UndefinedVariable(String),

    #[error("undefined built-in function: {0}")]
    UndefinedFunction(String),

    #[error("{name} expects between {min} and {max} arguments, got {got}")]
    ArityMismatch {
        name: String,
        min: usize,
        max: usize,
        got: usize,
    },

    #[error("argument index {index} out of bounds ({count} provided)")]
    BadArgument { index: usize, count: usize },

    #[error("invalid intermediate variable slot {0}")]
    BadSlot(i32),

    #[error("constant index {0} out of range")]
    BadConstant(i32),

    #[error("global slot {0} out of range")]
    BadGlobal(i32),

    #[error("cannot store a {0} into a global slot")]
    BadStore(&'static str),

    #[error(transparent)]
    Value(#[from] ValueError),
}

/// A runtime failure, located at the bar and instruction that raised it.
#[derive(Debug, Error)]
#[error("{kind} @bar_index: {bar} @ip: {offset}")]
pub struct RuntimeError {
    #[source]
    pub kind: RuntimeErrorKind,
    pub bar: i64,
    pub offset: usize,
}

/// Builtin function body. Receives an isolated invocation context instead of
/// the VM stack, so a builtin can never unbalance the machine.
pub type BuiltinFn = fn(&mut FunctionContext) -> Result<Value, RuntimeErrorKind>;

#[derive(Clone, Copy)]
pub(crate) struct BuiltinInfo {
    pub func: BuiltinFn,
    pub min_args: usize,
    pub max_args: usize,
}

/// The stack VM. See the crate docs for the execution model.
pub struct Vm {
    bytecode: Bytecode,
    stack: Vec<Value>,
    globals: Vec<Value>,
    vars: Vec<SeriesRef>,
    plotted: Vec<PlottedSeries>,
    builtin_vars: FxHashMap<String, SeriesRef>,
    builtins: FxHashMap<&'static str, BuiltinInfo>,
    cache: FxHashMap<String, SeriesRef>,
    total_bars: i64,
    bar_index: i64,
    last_error: Option<String>,
}

impl Default for Vm {
    fn default() -> Self {
        Vm::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        let mut builtins = FxHashMap::default();
        builtins::register_all(&mut builtins);
        Vm {
            bytecode: Bytecode::default(),
            stack: Vec::new(),
            globals: Vec::new(),
            vars: Vec::new(),
            plotted: Vec::new(),
            builtin_vars: FxHashMap::default(),
            builtins,
            cache: FxHashMap::default(),
            total_bars: 0,
            bar_index: 0,
            last_error: None,
        }
    }

    /// Installs a host data series (`close`, `open`, …) before execution.
    pub fn register_series(&mut self, name: &str, data: Vec<f64>) -> SeriesRef {
        let series = new_series_ref(Series::from_data(name, data));
        self.builtin_vars.insert(name.to_string(), series.clone());
        series
    }

    /// Handle to a registered series, e.g. to push fresh bars before an
    /// incremental [`Vm::execute`].
    pub fn get_series(&self, name: &str) -> Option<SeriesRef> {
        self.builtin_vars.get(name).cloned()
    }

    /// Parses textual bytecode, verifies its checksum, and resets all
    /// runtime state. On error the VM is left untouched.
    pub fn load_bytecode(&mut self, text: &str) -> Result<(), BytecodeError> {
        let bytecode = Bytecode::from_text(text)?;
        self.load_compiled(bytecode);
        Ok(())
    }

    /// Installs already-parsed bytecode, resetting globals, intermediates,
    /// the plot registry, and the builtin cache. Registered data series
    /// survive a reload.
    pub fn load_compiled(&mut self, bytecode: Bytecode) {
        tracing::debug!(
            instructions = bytecode.instructions.len(),
            globals = bytecode.global_names.len(),
            var_count = bytecode.var_count,
            checksum = bytecode.checksum(),
            "bytecode loaded"
        );
        self.globals = vec![Value::None; bytecode.global_names.len()];
        self.vars = (0..bytecode.var_count)
            .map(|i| new_series_ref(Series::new(format!("_tmp{}", i))))
            .collect();
        self.plotted.clear();
        self.cache.clear();
        self.stack.clear();
        self.total_bars = 0;
        self.bar_index = 0;
        self.last_error = None;
        self.bytecode = bytecode;
    }

    /// Runs from the current bar up to (but not including) `total_bars`.
    ///
    /// Calling again with a larger total continues where the last run left
    /// off (incremental mode); calling with the same total is a no-op, which
    /// is what makes re-execution idempotent.
    pub fn execute(&mut self, total_bars: usize) -> Result<(), RuntimeError> {
        if self.bytecode.instructions.is_empty() {
            return Err(self.fail(RuntimeErrorKind::NoBytecode, 0));
        }
        self.total_bars = total_bars as i64;
        tracing::debug!(from = self.bar_index, to = total_bars, "execute");
        while self.bar_index < self.total_bars {
            if let Err((kind, offset)) = self.run_current_bar() {
                return Err(self.fail(kind, offset));
            }
            self.bar_index += 1;
        }
        Ok(())
    }

    fn fail(&mut self, kind: RuntimeErrorKind, offset: usize) -> RuntimeError {
        let error = RuntimeError {
            kind,
            bar: self.bar_index,
            offset,
        };
        self.last_error = Some(error.to_string());
        tracing::debug!(error = %error, "execution failed");
        error
    }

    /// Human-readable message of the most recent failure, if any.
    pub fn last_error_message(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Next bar to be computed.
    pub fn bar_index(&self) -> i64 {
        self.bar_index
    }

    pub fn total_bars(&self) -> i64 {
        self.total_bars
    }

    /// The ordered plot registry; insertion order is output-column order.
    pub fn plotted(&self) -> &[PlottedSeries] {
        &self.plotted
    }

    fn run_current_bar(&mut self) -> Result<(), (RuntimeErrorKind, usize)> {
        self.stack.clear();
        let bar = self.bar_index;
        let mut ip = 0usize;

        loop {
            let Some(&instr) = self.bytecode.instructions.get(ip) else {
                return Err((RuntimeErrorKind::MissingHalt, ip));
            };
            let operand = instr.operand;

            let step = (|| -> Result<bool, RuntimeErrorKind> {
                match instr.op {
                    OpCode::PushConst => {
                        let value = self
                            .bytecode
                            .constants
                            .get(operand as usize)
                            .ok_or(RuntimeErrorKind::BadConstant(operand))?
                            .clone();
                        self.stack.push(value);
                    }
                    OpCode::Pop => {
                        self.pop()?;
                    }
                    op if op.is_math() => {
                        let right = self.pop()?;
                        let left = self.pop()?;
                        let result = self.binary_op(op, &left, &right)?;
                        self.push_numeric(result, operand)?;
                    }
                    OpCode::LoadBuiltinVar => {
                        let name = self.constant_str(operand)?;
                        match self.builtin_vars.get(&name) {
                            Some(series) => self.stack.push(Value::Series(series.clone())),
                            None => return Err(RuntimeErrorKind::UndefinedVariable(name)),
                        }
                    }
                    OpCode::LoadGlobal => {
                        let value = self
                            .globals
                            .get(operand as usize)
                            .ok_or(RuntimeErrorKind::BadGlobal(operand))?
                            .clone();
                        self.stack.push(value);
                    }
                    OpCode::StoreGlobal => {
                        let value = self.pop()?;
                        self.store_global(operand, value)?;
                    }
                    OpCode::StoreAndPlotGlobal => {
                        // Peek, not pop: the value may feed a later POP.
                        let value = self
                            .stack
                            .last()
                            .cloned()
                            .ok_or(RuntimeErrorKind::StackUnderflow)?;
                        let series = self.store_global(operand, value)?;
                        self.register_plot(series, "default_color".to_string());
                    }
                    OpCode::RenameSeries => {
                        let name = self.pop()?;
                        let top = self
                            .stack
                            .last()
                            .ok_or(RuntimeErrorKind::StackUnderflow)?;
                        let series = top.as_series()?;
                        series.borrow_mut().rename(name.as_str()?.to_string());
                    }
                    OpCode::JumpIfFalse => {
                        let condition = self.pop()?;
                        if !condition.as_bool(bar)? {
                            return Ok(true);
                        }
                    }
                    OpCode::Jump => {
                        return Ok(true);
                    }
                    OpCode::CallBuiltinFunc => {
                        let name = self.constant_str(operand)?;
                        let result = self.call_builtin(&name)?;
                        self.stack.push(result);
                    }
                    OpCode::CallPlot => {
                        self.call_plot()?;
                    }
                    OpCode::Halt => {
                        debug_assert!(self.stack.is_empty(), "stack not empty at HALT");
                        self.stack.clear();
                        return Ok(false);
                    }
                    _ => unreachable!("math opcodes are handled by the guard arm"),
                }
                Ok(false)
            })();

            match step {
                // Relative forward jump, measured from the next instruction.
                Ok(true) => ip += 1 + operand.max(0) as usize,
                Ok(false) => {
                    if instr.op == OpCode::Halt {
                        return Ok(());
                    }
                    ip += 1;
                }
                Err(kind) => return Err((kind, ip)),
            }
        }
    }

    fn pop(&mut self) -> Result<Value, RuntimeErrorKind> {
        self.stack.pop().ok_or(RuntimeErrorKind::StackUnderflow)
    }

    fn constant_str(&self, operand: i32) -> Result<String, RuntimeErrorKind> {
        let value = self
            .bytecode
            .constants
            .get(operand as usize)
            .ok_or(RuntimeErrorKind::BadConstant(operand))?;
        Ok(value.as_str()?.to_string())
    }

    fn binary_op(
        &self,
        op: OpCode,
        left: &Value,
        right: &Value,
    ) -> Result<f64, RuntimeErrorKind> {
        let bar = self.bar_index;
        let l = left.as_num(bar)?;
        let r = right.as_num(bar)?;
        let truthy = |v: f64| v != 0.0 && !v.is_nan();
        Ok(match op {
            OpCode::Add => l + r,
            OpCode::Sub => l - r,
            OpCode::Mul => l * r,
            OpCode::Div => {
                if r == 0.0 {
                    f64::NAN
                } else {
                    l / r
                }
            }
            OpCode::Less => bool_num(l < r),
            OpCode::LessEqual => bool_num(l <= r),
            OpCode::EqualEqual => bool_num(l == r),
            OpCode::BangEqual => bool_num(l != r),
            OpCode::Greater => bool_num(l > r),
            OpCode::GreaterEqual => bool_num(l >= r),
            OpCode::LogicalAnd => bool_num(truthy(l) && truthy(r)),
            OpCode::LogicalOr => bool_num(truthy(l) || truthy(r)),
            _ => unreachable!("not a binary opcode"),
        })
    }

    /// Writes a math result into its intermediate slot at the current bar
    /// and pushes that series, so downstream consumers see real history.
    fn push_numeric(&mut self, value: f64, slot: i32) -> Result<(), RuntimeErrorKind> {
        let series = self
            .vars
            .get(slot as usize)
            .ok_or(RuntimeErrorKind::BadSlot(slot))?
            .clone();
        series.set_at(self.bar_index, value);
        self.stack.push(Value::Series(series));
        Ok(())
    }

    /// The store-upgrade rule: a slot already holding a series receives the
    /// incoming value at the current bar; an empty slot lifts a scalar into
    /// a fresh series named after the global, or adopts an incoming series
    /// outright (renaming it). Every user variable ends up time-indexed.
    fn store_global(&mut self, slot: i32, value: Value) -> Result<SeriesRef, RuntimeErrorKind> {
        let index = slot as usize;
        let bar = self.bar_index;
        if index >= self.globals.len() {
            return Err(RuntimeErrorKind::BadGlobal(slot));
        }
        match &self.globals[index] {
            Value::Series(existing) => {
                let existing = existing.clone();
                match &value {
                    Value::Num(_) | Value::Bool(_) | Value::Series(_) => {
                        existing.set_at(bar, value.as_num(bar)?);
                    }
                    other => return Err(RuntimeErrorKind::BadStore(other.type_name())),
                }
                Ok(existing)
            }
            Value::None => match value {
                Value::Num(_) | Value::Bool(_) => {
                    let series =
                        new_series_ref(Series::new(self.bytecode.global_names[index].clone()));
                    series.set_at(bar, value.as_num(bar)?);
                    self.globals[index] = Value::Series(series.clone());
                    Ok(series)
                }
                Value::Series(series) => {
                    series
                        .borrow_mut()
                        .rename(self.bytecode.global_names[index].clone());
                    self.globals[index] = Value::Series(series.clone());
                    Ok(series)
                }
                other => Err(RuntimeErrorKind::BadStore(other.type_name())),
            },
            other => Err(RuntimeErrorKind::BadStore(other.type_name())),
        }
    }

    /// Appends to the plot registry unless this series object is already
    /// registered. Registry order is output-column order.
    fn register_plot(&mut self, series: SeriesRef, color: String) {
        let already = self
            .plotted
            .iter()
            .any(|p| std::rc::Rc::ptr_eq(&p.series, &series));
        if !already {
            self.plotted.push(PlottedSeries { series, color });
        }
    }

    /// `CALL_PLOT`: pop name, value, color; copy the value's current-bar
    /// scalar into a stable output series named after the plot; register it.
    /// Pushes `true` so the surrounding expression statement stays regular.
    fn call_plot(&mut self) -> Result<(), RuntimeErrorKind> {
        let bar = self.bar_index;
        let name = self.pop()?.as_str()?.to_string();
        let value = self.pop()?;
        let color = self.pop()?;

        let key = format!("plot({})", name);
        let series = self
            .cache
            .entry(key)
            .or_insert_with(|| new_series_ref(Series::new(name)))
            .clone();
        series.set_at(bar, value.as_num(bar)?);

        let color = match &color {
            Value::Str(s) => s.clone(),
            _ => "default_color".to_string(),
        };
        self.register_plot(series, color);
        self.stack.push(Value::Bool(true));
        Ok(())
    }

    /// `CALL_BUILTIN_FUNC`: pop exactly `max_args` values (the compiler pads
    /// optional trailing arguments with `none`), trim the padding, validate
    /// the arity range, route the call through a cached result series, and
    /// return the builtin's value.
    fn call_builtin(&mut self, name: &str) -> Result<Value, RuntimeErrorKind> {
        let info = *self
            .builtins
            .get(name)
            .ok_or_else(|| RuntimeErrorKind::UndefinedFunction(name.to_string()))?;

        if self.stack.len() < info.max_args {
            return Err(RuntimeErrorKind::StackUnderflow);
        }
        let mut args = self.stack.split_off(self.stack.len() - info.max_args);
        while args.len() > info.min_args && matches!(args.last(), Some(Value::None)) {
            args.pop();
        }
        if args.len() < info.min_args {
            return Err(RuntimeErrorKind::ArityMismatch {
                name: name.to_string(),
                min: info.min_args,
                max: info.max_args,
                got: args.len(),
            });
        }

        let key = cache_key(name, &args);
        let result = self
            .cache
            .entry(key.clone())
            .or_insert_with(|| new_series_ref(Series::new(key)))
            .clone();

        let mut ctx = FunctionContext::new(
            args,
            result,
            self.bar_index,
            self.total_bars,
            &self.builtin_vars,
            &mut self.cache,
        );
        (info.func)(&mut ctx)
    }
}

fn bool_num(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Canonical cache key giving indicator calls their cross-bar memory:
/// `name(arg~arg~…)` where series contribute their name and scalars their
/// decimal rendering. Two textually identical call sites share state.
fn cache_key(name: &str, args: &[Value]) -> String {
    let mut parts = Vec::with_capacity(args.len());
    for arg in args {
        parts.push(match arg {
            Value::Series(s) => s.series_name(),
            Value::Num(n) => format!("{}", n),
            Value::Bool(b) => (if *b { "true" } else { "false" }).to_string(),
            Value::Str(s) => s.clone(),
            Value::None => String::new(),
        });
    }
    format!("{}({})", name, parts.join("~"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use klinec_ir::Instruction;

    fn nan_eq(a: f64, b: f64) -> bool {
        (a.is_nan() && b.is_nan()) || (a - b).abs() < 1e-9
    }

    fn halt_only() -> Bytecode {
        Bytecode {
            instructions: vec![Instruction::new(OpCode::Halt, 0)],
            constants: vec![],
            global_names: vec![],
            var_count: 0,
        }
    }

    #[test]
    fn execute_without_bytecode_fails() {
        let mut vm = Vm::new();
        let err = vm.execute(1).unwrap_err();
        assert!(matches!(err.kind, RuntimeErrorKind::NoBytecode));
        assert!(vm.last_error_message().is_some());
    }

    #[test]
    fn scalar_store_lifts_to_a_named_series() {
        let mut vm = Vm::new();
        let mut bc = halt_only();
        bc.constants.push(Value::Num(7.5));
        bc.global_names.push("X".to_string());
        bc.instructions.insert(0, Instruction::new(OpCode::PushConst, 0));
        bc.instructions.insert(1, Instruction::new(OpCode::StoreGlobal, 0));
        vm.load_compiled(bc);
        vm.execute(3).unwrap();

        let Value::Series(series) = &vm.globals[0] else {
            panic!("global was not lifted to a series");
        };
        assert_eq!(series.borrow().name(), "X");
        assert_eq!(series.borrow().data(), &[7.5, 7.5, 7.5]);
    }

    #[test]
    fn series_store_adopts_and_renames() {
        let mut vm = Vm::new();
        vm.register_series("close", vec![1.0, 2.0]);
        let mut bc = halt_only();
        bc.constants.push(Value::Str("close".to_string()));
        bc.global_names.push("X".to_string());
        bc.instructions
            .insert(0, Instruction::new(OpCode::LoadBuiltinVar, 0));
        bc.instructions.insert(1, Instruction::new(OpCode::StoreGlobal, 0));
        vm.load_compiled(bc);
        vm.execute(2).unwrap();

        let close = vm.get_series("close").unwrap();
        // The first store adopts the close series itself and renames it.
        assert_eq!(close.borrow().name(), "X");
        let Value::Series(series) = &vm.globals[0] else {
            panic!("global was not a series");
        };
        assert!(std::rc::Rc::ptr_eq(series, &close));
    }

    #[test]
    fn division_by_zero_yields_nan() {
        let mut vm = Vm::new();
        let bc = Bytecode {
            instructions: vec![
                Instruction::new(OpCode::PushConst, 0),
                Instruction::new(OpCode::PushConst, 1),
                Instruction::new(OpCode::Div, 0),
                Instruction::new(OpCode::StoreGlobal, 0),
                Instruction::new(OpCode::Halt, 0),
            ],
            constants: vec![Value::Num(1.0), Value::Num(0.0)],
            global_names: vec!["X".to_string()],
            var_count: 1,
        };
        vm.load_compiled(bc);
        vm.execute(1).unwrap();
        let Value::Series(series) = &vm.globals[0] else {
            panic!("global was not a series");
        };
        assert!(series.borrow().get(0).is_nan());
    }

    #[test]
    fn stack_underflow_is_located() {
        let mut vm = Vm::new();
        let bc = Bytecode {
            instructions: vec![
                Instruction::new(OpCode::Pop, 0),
                Instruction::new(OpCode::Halt, 0),
            ],
            constants: vec![],
            global_names: vec![],
            var_count: 0,
        };
        vm.load_compiled(bc);
        let err = vm.execute(1).unwrap_err();
        assert!(matches!(err.kind, RuntimeErrorKind::StackUnderflow));
        assert_eq!(err.bar, 0);
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn undefined_builtin_variable_is_a_runtime_error() {
        let mut vm = Vm::new();
        let bc = Bytecode {
            instructions: vec![
                Instruction::new(OpCode::LoadBuiltinVar, 0),
                Instruction::new(OpCode::Pop, 0),
                Instruction::new(OpCode::Halt, 0),
            ],
            constants: vec![Value::Str("close".to_string())],
            global_names: vec![],
            var_count: 0,
        };
        vm.load_compiled(bc);
        let err = vm.execute(1).unwrap_err();
        assert!(matches!(err.kind, RuntimeErrorKind::UndefinedVariable(_)));
    }

    #[test]
    fn cache_key_uses_series_names_and_scalar_reprs() {
        let close = new_series_ref(Series::new("close"));
        let key = cache_key("ma", &[Value::Series(close), Value::Num(3.0)]);
        assert_eq!(key, "ma(close~3)");
    }

    #[test]
    fn failed_load_leaves_state_unchanged() {
        let mut vm = Vm::new();
        let mut bc = halt_only();
        bc.constants.push(Value::Num(1.0));
        bc.global_names.push("X".to_string());
        bc.instructions.insert(0, Instruction::new(OpCode::PushConst, 0));
        bc.instructions.insert(1, Instruction::new(OpCode::StoreAndPlotGlobal, 0));
        bc.instructions.insert(2, Instruction::new(OpCode::Pop, 0));
        vm.load_compiled(bc.clone());
        vm.execute(1).unwrap();
        assert_eq!(vm.plotted().len(), 1);

        let mut text = bc.to_text();
        text = text.replace("0: PUSH_CONST 0", "0: PUSH_CONST 1");
        assert!(vm.load_bytecode(&text).is_err());
        // The previous program and its results are still in place.
        assert_eq!(vm.plotted().len(), 1);
        assert_eq!(vm.bar_index(), 1);
        assert!(nan_eq(vm.plotted()[0].series.borrow().get(0), 1.0));
    }
}

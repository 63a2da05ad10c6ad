//! Bytecode validation checksum.
//!
//! The checksum is a 32-bit FNV-1a hash over a canonical serialization of
//! the bytecode; serializer and deserializer both call [`generate`] so the
//! two sides can never disagree about the canonical form.

use std::fmt::Write;

use klinec_util::Value;

use crate::Bytecode;

const FNV_PRIME: u32 = 0x0100_0193;
const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;

/// Streaming 32-bit FNV-1a hash. Deterministic on every platform.
#[derive(Clone, Copy, Debug)]
pub struct Fnv1a(u32);

impl Fnv1a {
    pub fn new() -> Self {
        Fnv1a(FNV_OFFSET_BASIS)
    }

    pub fn update(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= u32::from(b);
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }

    pub fn finish(self) -> u32 {
        self.0
    }
}

impl Default for Fnv1a {
    fn default() -> Self {
        Fnv1a::new()
    }
}

/// Canonical decimal rendering of a number; shared by the checksum and the
/// constant-pool text form so both always agree.
pub(crate) fn format_number(n: f64) -> String {
    format!("{}", n)
}

/// Hashes `var_count`, every instruction as `op:operand;`, every constant in
/// a type-tagged form, and every global name, with `|` section separators.
pub(crate) fn generate(bytecode: &Bytecode) -> u32 {
    let mut canonical = String::new();

    let _ = write!(canonical, "{}|", bytecode.var_count);

    for instr in &bytecode.instructions {
        let _ = write!(canonical, "{}:{};", instr.op as u8, instr.operand);
    }
    canonical.push('|');

    for constant in &bytecode.constants {
        match constant {
            Value::None => canonical.push_str("m;"),
            Value::Num(n) => {
                let _ = write!(canonical, "d:{};", format_number(*n));
            }
            Value::Bool(b) => {
                let _ = write!(canonical, "b:{};", if *b { '1' } else { '0' });
            }
            Value::Str(s) => {
                let _ = write!(canonical, "s:{}:{};", s.len(), s);
            }
            Value::Series(s) => {
                let name = s.borrow().name().to_string();
                let _ = write!(canonical, "r:{}:{};", name.len(), name);
            }
        }
    }
    canonical.push('|');

    for name in &bytecode.global_names {
        let _ = write!(canonical, "{};", name);
    }

    let mut hasher = Fnv1a::new();
    hasher.update(canonical.as_bytes());
    hasher.finish()
}

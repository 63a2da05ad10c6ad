//! Builtin signature table.
//!
//! One table shared by the compilers and the VM. The compilers use it to
//! reject unknown names and bad argument counts and to pad optional trailing
//! arguments with `monostate` constants, so every call site pushes exactly
//! `max` values; the VM uses it to size its pops and to re-validate arity on
//! hand-written bytecode.

/// Accepted argument-count range of a builtin. `min == max` for fixed arity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: usize,
}

const fn fixed(n: usize) -> Arity {
    Arity { min: n, max: n }
}

const fn between(min: usize, max: usize) -> Arity {
    Arity { min, max }
}

/// Arity of a builtin function by canonical (lower-case / rewritten) name.
///
/// Returns `None` for names the VM does not know; the compilers turn that
/// into a compile error.
pub fn builtin_arity(name: &str) -> Option<Arity> {
    Some(match name {
        // Moving averages and smoothers.
        "ma" => fixed(2),
        "sma" => fixed(3),
        "wma" => fixed(2),
        "tma" => fixed(2),
        "ema" | "expma" => fixed(2),
        "expmema" => fixed(2),
        "mema" => fixed(2),
        "xma" => fixed(2),
        "dma" => fixed(2),
        "ama" => fixed(2),
        "ta.sma" => fixed(2),
        "ta.ema" => fixed(2),
        "ta.rsi" => fixed(2),

        // Window extremes.
        "hhv" | "llv" | "hv" | "lv" | "hhvbars" | "llvbars" => fixed(2),
        "findhigh" | "findhighbars" | "findlow" | "findlowbars" => fixed(4),

        // References.
        "ref" | "refv" | "hod" | "lod" | "lowrange" | "refdate" => fixed(2),
        "reverse" => fixed(1),
        "const" => fixed(1),

        // Accumulation and bar counting.
        "sum" | "sumbars" | "count" | "mular" => fixed(2),
        "barscount" | "barslast" | "barssince" | "barsstatus" | "barslastcount" => fixed(1),
        "barssincen" => fixed(2),
        "currbarscount" | "totalbarscount" | "islastbar" => fixed(0),

        // Statistics.
        "avedev" | "devsq" | "std" | "stddev" | "stdp" | "var" | "varp" | "slope" => fixed(2),
        "covar" | "betax" | "relate" => fixed(3),
        "beta" | "forcast" => fixed(2),

        // Math.
        "abs" | "acos" | "asin" | "atan" | "ceil" | "ceiling" | "cos" | "exp" | "floor"
        | "facepart" | "intpart" | "ln" | "log" | "sign" | "sin" | "sqrt" | "tan" => fixed(1),
        "max" | "min" | "mod" | "pow" | "round2" => fixed(2),
        "round" => between(1, 2),
        "rand" => fixed(0),
        "between" | "range" => fixed(3),

        // Selection and logic.
        "if" | "ifc" | "iff" | "ifn" => fixed(3),
        "valuewhen" => fixed(2),
        "cross" | "longcross" => fixed(2),
        "every" | "exist" => fixed(2),
        "last" => fixed(3),
        "not" | "isnull" | "testskip" => fixed(1),
        "filter" | "tfilt" | "tfilter" => fixed(2),
        "nday" | "upnday" | "downnday" => fixed(2),

        // Chip-distribution and SAR family (stubs with real arities).
        "cost" => between(0, 1),
        "costex" => between(0, 2),
        "lfs" => fixed(0),
        "lwinner" | "pwinner" | "winner" | "ppart" => between(0, 1),
        "sar" | "sarturn" | "newsar" => between(0, 4),
        "totalrange" => fixed(0),

        // Script inputs.
        "input.int" => fixed(2),

        _ => return None,
    })
}

/// Every canonical builtin name. Lets the VM's registry tests prove that the
/// signature table and the implementation table cover each other exactly.
pub fn known_names() -> impl Iterator<Item = &'static str> {
    NAMES.iter().copied()
}

const NAMES: &[&str] = &[
    // Moving averages and smoothers.
    "ma", "sma", "wma", "tma", "ema", "expma", "expmema", "mema", "xma", "dma", "ama",
    "ta.sma", "ta.ema", "ta.rsi",
    // Window extremes.
    "hhv", "llv", "hv", "lv", "hhvbars", "llvbars",
    "findhigh", "findhighbars", "findlow", "findlowbars",
    // References.
    "ref", "refv", "hod", "lod", "lowrange", "refdate", "reverse", "const",
    // Accumulation and bar counting.
    "sum", "sumbars", "count", "mular",
    "barscount", "barslast", "barssince", "barsstatus", "barslastcount", "barssincen",
    "currbarscount", "totalbarscount", "islastbar",
    // Statistics.
    "avedev", "devsq", "std", "stddev", "stdp", "var", "varp", "slope",
    "covar", "betax", "relate", "beta", "forcast",
    // Math.
    "abs", "acos", "asin", "atan", "ceil", "ceiling", "cos", "exp", "floor",
    "facepart", "intpart", "ln", "log", "sign", "sin", "sqrt", "tan",
    "max", "min", "mod", "pow", "round2", "round", "rand", "between", "range",
    // Selection and logic.
    "if", "ifc", "iff", "ifn", "valuewhen", "cross", "longcross", "every", "exist",
    "last", "not", "isnull", "testskip", "filter", "tfilt", "tfilter",
    "nday", "upnday", "downnday",
    // Chip-distribution and SAR family.
    "cost", "costex", "lfs", "lwinner", "pwinner", "winner", "ppart",
    "sar", "sarturn", "newsar", "totalrange",
    // Script inputs.
    "input.int",
];

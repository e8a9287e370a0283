//! Value types, literal constants and other small value-like IR pieces.

use super::var::Location;
use std::fmt;

/// WebAssembly value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::I32 => write!(f, "i32"),
            ValueType::I64 => write!(f, "i64"),
            ValueType::F32 => write!(f, "f32"),
            ValueType::F64 => write!(f, "f64"),
        }
    }
}

impl ValueType {
    /// Convert a wasmparser value type. Vector and reference types have no
    /// counterpart in this IR and yield `None`.
    pub fn from_wasmparser(vt: wasmparser::ValType) -> Option<Self> {
        use wasmparser::ValType;
        match vt {
            ValType::I32 => Some(ValueType::I32),
            ValType::I64 => Some(ValueType::I64),
            ValType::F32 => Some(ValueType::F32),
            ValType::F64 => Some(ValueType::F64),
            _ => None,
        }
    }
}

/// Ordered list of value types (parameters, results, locals, block signatures).
pub type TypeVector = Vec<ValueType>;

/// Typed literal. Floats are kept as raw bits so NaN payloads survive intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstValue {
    I32(u32),
    I64(u64),
    F32(u32),
    F64(u64),
}

/// A literal constant together with where it was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Const {
    pub loc: Location,
    pub value: ConstValue,
}

const F32_EXPONENT_AND_QUIET: u32 = 0x7fc0_0000;
const F64_EXPONENT_AND_QUIET: u64 = 0x7ff8_0000_0000_0000;

impl Const {
    pub fn new(value: ConstValue) -> Self {
        Self {
            loc: Location::Unknown,
            value,
        }
    }

    pub fn i32(value: u32) -> Self {
        Self::new(ConstValue::I32(value))
    }

    pub fn i64(value: u64) -> Self {
        Self::new(ConstValue::I64(value))
    }

    pub fn f32_bits(bits: u32) -> Self {
        Self::new(ConstValue::F32(bits))
    }

    pub fn f64_bits(bits: u64) -> Self {
        Self::new(ConstValue::F64(bits))
    }

    pub fn f32(value: f32) -> Self {
        Self::f32_bits(value.to_bits())
    }

    pub fn f64(value: f64) -> Self {
        Self::f64_bits(value.to_bits())
    }

    pub fn with_loc(mut self, loc: Location) -> Self {
        self.loc = loc;
        self
    }

    pub fn ty(&self) -> ValueType {
        match self.value {
            ConstValue::I32(_) => ValueType::I32,
            ConstValue::I64(_) => ValueType::I64,
            ConstValue::F32(_) => ValueType::F32,
            ConstValue::F64(_) => ValueType::F64,
        }
    }

    /// A NaN with only the quiet bit set in its payload (either sign).
    pub fn is_canonical_nan(&self) -> bool {
        match self.value {
            ConstValue::F32(bits) => bits & 0x7fff_ffff == F32_EXPONENT_AND_QUIET,
            ConstValue::F64(bits) => bits & 0x7fff_ffff_ffff_ffff == F64_EXPONENT_AND_QUIET,
            ConstValue::I32(_) | ConstValue::I64(_) => false,
        }
    }

    /// A NaN with the quiet bit set; the rest of the payload is arbitrary.
    pub fn is_arithmetic_nan(&self) -> bool {
        match self.value {
            ConstValue::F32(bits) => bits & F32_EXPONENT_AND_QUIET == F32_EXPONENT_AND_QUIET,
            ConstValue::F64(bits) => bits & F64_EXPONENT_AND_QUIET == F64_EXPONENT_AND_QUIET,
            ConstValue::I32(_) | ConstValue::I64(_) => false,
        }
    }
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            ConstValue::I32(v) => write!(f, "i32.const {}", v as i32),
            ConstValue::I64(v) => write!(f, "i64.const {}", v as i64),
            ConstValue::F32(bits) => write!(f, "f32.const {}", f32::from_bits(bits)),
            ConstValue::F64(bits) => write!(f, "f64.const {}", f64::from_bits(bits)),
        }
    }
}

/// Size limits of a table (in elements) or memory (in pages).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Limits {
    pub initial: u64,
    pub max: Option<u64>,
    pub is_shared: bool,
}

impl Limits {
    pub fn new(initial: u64, max: Option<u64>) -> Self {
        Self {
            initial,
            max,
            is_shared: false,
        }
    }
}

impl fmt::Display for Limits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.initial)?;
        if let Some(max) = self.max {
            write!(f, " {}", max)?;
        }
        if self.is_shared {
            write!(f, " shared")?;
        }
        Ok(())
    }
}

/// Kind of an importable/exportable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternalKind {
    Func,
    Table,
    Memory,
    Global,
    Except,
}

impl fmt::Display for ExternalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExternalKind::Func => "func",
            ExternalKind::Table => "table",
            ExternalKind::Memory => "memory",
            ExternalKind::Global => "global",
            ExternalKind::Except => "except",
        };
        write!(f, "{}", s)
    }
}

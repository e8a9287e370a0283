//! Numeric and memory opcodes carried by `Binary`, `Compare`, `Convert`,
//! `Unary`, `Load` and `Store` expressions.
//!
//! Variant names match `wasmparser::Operator` so a single table drives both
//! the enum and the decoder mapping.

use super::types::ValueType;
use std::fmt;

/// Which expression node an opcode belongs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpcodeClass {
    Binary,
    Compare,
    Convert,
    Unary,
    Load,
    Store,
}

macro_rules! result_type {
    (Void) => {
        None
    };
    ($ty:ident) => {
        Some(ValueType::$ty)
    };
}

macro_rules! define_opcodes {
    ($( $variant:ident => $text:literal, $class:ident, $result:ident; )*) => {
        /// An MVP numeric or memory instruction.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $( $variant, )*
        }

        impl Opcode {
            /// Every opcode, in table order.
            pub const ALL: &'static [Opcode] = &[ $( Opcode::$variant, )* ];

            /// Text-format mnemonic (`i32.add`).
            pub fn name(&self) -> &'static str {
                match self {
                    $( Opcode::$variant => $text, )*
                }
            }

            pub fn class(&self) -> OpcodeClass {
                match self {
                    $( Opcode::$variant => OpcodeClass::$class, )*
                }
            }

            /// Type of the value the instruction pushes; `None` for stores.
            ///
            /// Note: all comparisons (and `eqz`) produce i32.
            pub fn result_type(&self) -> Option<ValueType> {
                match self {
                    $( Opcode::$variant => result_type!($result), )*
                }
            }

            /// Map a decoded operator onto its opcode, if it is one of ours.
            pub fn from_operator(op: &wasmparser::Operator<'_>) -> Option<Opcode> {
                match op {
                    $( wasmparser::Operator::$variant { .. } => Some(Opcode::$variant), )*
                    _ => None,
                }
            }
        }
    };
}

define_opcodes! {
    // memory
    I32Load => "i32.load", Load, I32;
    I64Load => "i64.load", Load, I64;
    F32Load => "f32.load", Load, F32;
    F64Load => "f64.load", Load, F64;
    I32Load8S => "i32.load8_s", Load, I32;
    I32Load8U => "i32.load8_u", Load, I32;
    I32Load16S => "i32.load16_s", Load, I32;
    I32Load16U => "i32.load16_u", Load, I32;
    I64Load8S => "i64.load8_s", Load, I64;
    I64Load8U => "i64.load8_u", Load, I64;
    I64Load16S => "i64.load16_s", Load, I64;
    I64Load16U => "i64.load16_u", Load, I64;
    I64Load32S => "i64.load32_s", Load, I64;
    I64Load32U => "i64.load32_u", Load, I64;
    I32Store => "i32.store", Store, Void;
    I64Store => "i64.store", Store, Void;
    F32Store => "f32.store", Store, Void;
    F64Store => "f64.store", Store, Void;
    I32Store8 => "i32.store8", Store, Void;
    I32Store16 => "i32.store16", Store, Void;
    I64Store8 => "i64.store8", Store, Void;
    I64Store16 => "i64.store16", Store, Void;
    I64Store32 => "i64.store32", Store, Void;

    // comparisons
    I32Eq => "i32.eq", Compare, I32;
    I32Ne => "i32.ne", Compare, I32;
    I32LtS => "i32.lt_s", Compare, I32;
    I32LtU => "i32.lt_u", Compare, I32;
    I32GtS => "i32.gt_s", Compare, I32;
    I32GtU => "i32.gt_u", Compare, I32;
    I32LeS => "i32.le_s", Compare, I32;
    I32LeU => "i32.le_u", Compare, I32;
    I32GeS => "i32.ge_s", Compare, I32;
    I32GeU => "i32.ge_u", Compare, I32;
    I64Eq => "i64.eq", Compare, I32;
    I64Ne => "i64.ne", Compare, I32;
    I64LtS => "i64.lt_s", Compare, I32;
    I64LtU => "i64.lt_u", Compare, I32;
    I64GtS => "i64.gt_s", Compare, I32;
    I64GtU => "i64.gt_u", Compare, I32;
    I64LeS => "i64.le_s", Compare, I32;
    I64LeU => "i64.le_u", Compare, I32;
    I64GeS => "i64.ge_s", Compare, I32;
    I64GeU => "i64.ge_u", Compare, I32;
    F32Eq => "f32.eq", Compare, I32;
    F32Ne => "f32.ne", Compare, I32;
    F32Lt => "f32.lt", Compare, I32;
    F32Gt => "f32.gt", Compare, I32;
    F32Le => "f32.le", Compare, I32;
    F32Ge => "f32.ge", Compare, I32;
    F64Eq => "f64.eq", Compare, I32;
    F64Ne => "f64.ne", Compare, I32;
    F64Lt => "f64.lt", Compare, I32;
    F64Gt => "f64.gt", Compare, I32;
    F64Le => "f64.le", Compare, I32;
    F64Ge => "f64.ge", Compare, I32;

    // unary
    I32Clz => "i32.clz", Unary, I32;
    I32Ctz => "i32.ctz", Unary, I32;
    I32Popcnt => "i32.popcnt", Unary, I32;
    I64Clz => "i64.clz", Unary, I64;
    I64Ctz => "i64.ctz", Unary, I64;
    I64Popcnt => "i64.popcnt", Unary, I64;
    F32Abs => "f32.abs", Unary, F32;
    F32Neg => "f32.neg", Unary, F32;
    F32Ceil => "f32.ceil", Unary, F32;
    F32Floor => "f32.floor", Unary, F32;
    F32Trunc => "f32.trunc", Unary, F32;
    F32Nearest => "f32.nearest", Unary, F32;
    F32Sqrt => "f32.sqrt", Unary, F32;
    F64Abs => "f64.abs", Unary, F64;
    F64Neg => "f64.neg", Unary, F64;
    F64Ceil => "f64.ceil", Unary, F64;
    F64Floor => "f64.floor", Unary, F64;
    F64Trunc => "f64.trunc", Unary, F64;
    F64Nearest => "f64.nearest", Unary, F64;
    F64Sqrt => "f64.sqrt", Unary, F64;

    // binary
    I32Add => "i32.add", Binary, I32;
    I32Sub => "i32.sub", Binary, I32;
    I32Mul => "i32.mul", Binary, I32;
    I32DivS => "i32.div_s", Binary, I32;
    I32DivU => "i32.div_u", Binary, I32;
    I32RemS => "i32.rem_s", Binary, I32;
    I32RemU => "i32.rem_u", Binary, I32;
    I32And => "i32.and", Binary, I32;
    I32Or => "i32.or", Binary, I32;
    I32Xor => "i32.xor", Binary, I32;
    I32Shl => "i32.shl", Binary, I32;
    I32ShrS => "i32.shr_s", Binary, I32;
    I32ShrU => "i32.shr_u", Binary, I32;
    I32Rotl => "i32.rotl", Binary, I32;
    I32Rotr => "i32.rotr", Binary, I32;
    I64Add => "i64.add", Binary, I64;
    I64Sub => "i64.sub", Binary, I64;
    I64Mul => "i64.mul", Binary, I64;
    I64DivS => "i64.div_s", Binary, I64;
    I64DivU => "i64.div_u", Binary, I64;
    I64RemS => "i64.rem_s", Binary, I64;
    I64RemU => "i64.rem_u", Binary, I64;
    I64And => "i64.and", Binary, I64;
    I64Or => "i64.or", Binary, I64;
    I64Xor => "i64.xor", Binary, I64;
    I64Shl => "i64.shl", Binary, I64;
    I64ShrS => "i64.shr_s", Binary, I64;
    I64ShrU => "i64.shr_u", Binary, I64;
    I64Rotl => "i64.rotl", Binary, I64;
    I64Rotr => "i64.rotr", Binary, I64;
    F32Add => "f32.add", Binary, F32;
    F32Sub => "f32.sub", Binary, F32;
    F32Mul => "f32.mul", Binary, F32;
    F32Div => "f32.div", Binary, F32;
    F32Min => "f32.min", Binary, F32;
    F32Max => "f32.max", Binary, F32;
    F32Copysign => "f32.copysign", Binary, F32;
    F64Add => "f64.add", Binary, F64;
    F64Sub => "f64.sub", Binary, F64;
    F64Mul => "f64.mul", Binary, F64;
    F64Div => "f64.div", Binary, F64;
    F64Min => "f64.min", Binary, F64;
    F64Max => "f64.max", Binary, F64;
    F64Copysign => "f64.copysign", Binary, F64;

    // conversions; eqz is grouped here because it changes the operand's meaning
    I32Eqz => "i32.eqz", Convert, I32;
    I64Eqz => "i64.eqz", Convert, I32;
    I32WrapI64 => "i32.wrap_i64", Convert, I32;
    I32TruncF32S => "i32.trunc_f32_s", Convert, I32;
    I32TruncF32U => "i32.trunc_f32_u", Convert, I32;
    I32TruncF64S => "i32.trunc_f64_s", Convert, I32;
    I32TruncF64U => "i32.trunc_f64_u", Convert, I32;
    I64ExtendI32S => "i64.extend_i32_s", Convert, I64;
    I64ExtendI32U => "i64.extend_i32_u", Convert, I64;
    I64TruncF32S => "i64.trunc_f32_s", Convert, I64;
    I64TruncF32U => "i64.trunc_f32_u", Convert, I64;
    I64TruncF64S => "i64.trunc_f64_s", Convert, I64;
    I64TruncF64U => "i64.trunc_f64_u", Convert, I64;
    F32ConvertI32S => "f32.convert_i32_s", Convert, F32;
    F32ConvertI32U => "f32.convert_i32_u", Convert, F32;
    F32ConvertI64S => "f32.convert_i64_s", Convert, F32;
    F32ConvertI64U => "f32.convert_i64_u", Convert, F32;
    F32DemoteF64 => "f32.demote_f64", Convert, F32;
    F64ConvertI32S => "f64.convert_i32_s", Convert, F64;
    F64ConvertI32U => "f64.convert_i32_u", Convert, F64;
    F64ConvertI64S => "f64.convert_i64_s", Convert, F64;
    F64ConvertI64U => "f64.convert_i64_u", Convert, F64;
    F64PromoteF32 => "f64.promote_f32", Convert, F64;
    I32ReinterpretF32 => "i32.reinterpret_f32", Convert, I32;
    I64ReinterpretF64 => "i64.reinterpret_f64", Convert, I64;
    F32ReinterpretI32 => "f32.reinterpret_i32", Convert, F32;
    F64ReinterpretI64 => "f64.reinterpret_i64", Convert, F64;
}

impl Opcode {
    /// Number of bytes a load or store touches, which is also its natural
    /// (maximum) alignment. `None` for non-memory opcodes.
    pub fn memory_size(&self) -> Option<u32> {
        match self {
            Opcode::I32Load8S
            | Opcode::I32Load8U
            | Opcode::I64Load8S
            | Opcode::I64Load8U
            | Opcode::I32Store8
            | Opcode::I64Store8 => Some(1),

            Opcode::I32Load16S
            | Opcode::I32Load16U
            | Opcode::I64Load16S
            | Opcode::I64Load16U
            | Opcode::I32Store16
            | Opcode::I64Store16 => Some(2),

            Opcode::I32Load
            | Opcode::F32Load
            | Opcode::I64Load32S
            | Opcode::I64Load32U
            | Opcode::I32Store
            | Opcode::F32Store
            | Opcode::I64Store32 => Some(4),

            Opcode::I64Load | Opcode::F64Load | Opcode::I64Store | Opcode::F64Store => Some(8),

            _ => None,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

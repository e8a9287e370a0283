//! Folding of flat operator streams into nested expression lists.
//!
//! Structured instructions open a frame on an explicit stack; `end` closes it
//! and pushes the finished node into the enclosing frame. Nesting depth is
//! bounded by the heap, not the call stack.

use crate::ir::{
    Block, BrTable, Catch, Const, Expr, ExprKind, ExprList, FuncSignature, IfExpr, LoadStore,
    Location, Opcode, OpcodeClass, TryExpr, TypeVector, ValueType, Var, INVALID_INDEX,
};
use anyhow::{anyhow, bail, Context, Result};
use wasmparser::{BlockType, FunctionBody, MemArg, Operator, ValType};

/// Upper bound on declared locals per function, matching common engine limits.
const MAX_LOCALS: u64 = 50_000;

pub(super) fn value_type(ty: ValType) -> Result<ValueType> {
    ValueType::from_wasmparser(ty).ok_or_else(|| anyhow!("unsupported value type {:?}", ty))
}

pub(super) fn signature(ty: &wasmparser::FuncType) -> Result<FuncSignature> {
    let param_types = ty
        .params()
        .iter()
        .map(|&t| value_type(t))
        .collect::<Result<TypeVector>>()?;
    let result_types = ty
        .results()
        .iter()
        .map(|&t| value_type(t))
        .collect::<Result<TypeVector>>()?;
    Ok(FuncSignature::new(param_types, result_types))
}

/// Read a function body: its declared locals and its instruction tree.
pub(super) fn read_body(
    body: &FunctionBody<'_>,
    types: &[FuncSignature],
    exceptions: bool,
) -> Result<(TypeVector, ExprList)> {
    let mut locals = TypeVector::new();
    let mut total: u64 = 0;
    for local in body.get_locals_reader().context("getting locals reader")? {
        let (count, ty) = local.context("reading local")?;
        total += u64::from(count);
        if total > MAX_LOCALS {
            bail!("too many locals ({} > {})", total, MAX_LOCALS);
        }
        let ty = value_type(ty)?;
        locals.extend(std::iter::repeat(ty).take(count as usize));
    }

    let mut folder = Folder::new(types, exceptions);
    let mut reader = body
        .get_operators_reader()
        .context("getting operators reader")?;
    while !reader.eof() {
        let (op, offset) = reader.read_with_offset().context("reading operator")?;
        folder
            .operator(&op, Location::binary(offset))
            .with_context(|| format!("translating operator {:?} at {:#x}", op, offset))?;
    }
    Ok((locals, folder.finish()?))
}

/// Read a constant expression (global initializer or segment offset).
pub(super) fn read_const_expr(expr: &wasmparser::ConstExpr<'_>) -> Result<ExprList> {
    let mut reader = expr.get_operators_reader();
    let mut exprs = ExprList::new();
    loop {
        let (op, offset) = reader
            .read_with_offset()
            .context("reading constant expression")?;
        let loc = Location::binary(offset);
        let kind = match op {
            Operator::End => break,
            Operator::I32Const { value } => ExprKind::Const(Const::i32(value as u32).with_loc(loc)),
            Operator::I64Const { value } => ExprKind::Const(Const::i64(value as u64).with_loc(loc)),
            Operator::F32Const { value } => {
                ExprKind::Const(Const::f32_bits(value.bits()).with_loc(loc))
            }
            Operator::F64Const { value } => {
                ExprKind::Const(Const::f64_bits(value.bits()).with_loc(loc))
            }
            Operator::GlobalGet { global_index } => {
                ExprKind::GetGlobal(Var::index(global_index).with_loc(loc))
            }
            other => bail!("unsupported constant expression operator: {:?}", other),
        };
        exprs.push(Expr::at(loc, kind));
    }
    Ok(exprs)
}

fn memarg(op: &Operator<'_>) -> Option<MemArg> {
    match *op {
        Operator::I32Load { memarg }
        | Operator::I64Load { memarg }
        | Operator::F32Load { memarg }
        | Operator::F64Load { memarg }
        | Operator::I32Load8S { memarg }
        | Operator::I32Load8U { memarg }
        | Operator::I32Load16S { memarg }
        | Operator::I32Load16U { memarg }
        | Operator::I64Load8S { memarg }
        | Operator::I64Load8U { memarg }
        | Operator::I64Load16S { memarg }
        | Operator::I64Load16U { memarg }
        | Operator::I64Load32S { memarg }
        | Operator::I64Load32U { memarg }
        | Operator::I32Store { memarg }
        | Operator::I64Store { memarg }
        | Operator::F32Store { memarg }
        | Operator::F64Store { memarg }
        | Operator::I32Store8 { memarg }
        | Operator::I32Store16 { memarg }
        | Operator::I64Store8 { memarg }
        | Operator::I64Store16 { memarg }
        | Operator::I64Store32 { memarg } => Some(memarg),
        _ => None,
    }
}

fn load_store(opcode: Opcode, op: &Operator<'_>) -> Result<LoadStore> {
    let memarg = memarg(op).ok_or_else(|| anyhow!("{} has no memory immediate", opcode))?;
    if memarg.memory != 0 {
        bail!("multi-memory access not supported (memory={})", memarg.memory);
    }
    let align = 1u32
        .checked_shl(u32::from(memarg.align))
        .ok_or_else(|| anyhow!("alignment exponent {} too large", memarg.align))?;
    let offset = u32::try_from(memarg.offset).context("64-bit memory offset")?;
    Ok(LoadStore {
        opcode,
        align,
        offset,
    })
}

// ─── Frame stack ────────────────────────────────────────────────────────────

enum FrameKind {
    Func,
    Block,
    Loop,
    /// `true_exprs` is set once `else` has been seen.
    If { true_exprs: Option<ExprList> },
    /// `body` is set at the first handler; `handler` is the handler whose
    /// instructions are currently being collected.
    Try {
        body: Option<ExprList>,
        catches: Vec<Catch>,
        handler: Option<(Location, Var)>,
    },
}

struct Frame {
    kind: FrameKind,
    loc: Location,
    sig: TypeVector,
    exprs: ExprList,
}

struct Folder<'a> {
    types: &'a [FuncSignature],
    exceptions: bool,
    frames: Vec<Frame>,
    finished: Option<ExprList>,
}

impl<'a> Folder<'a> {
    fn new(types: &'a [FuncSignature], exceptions: bool) -> Self {
        Self {
            types,
            exceptions,
            frames: vec![Frame {
                kind: FrameKind::Func,
                loc: Location::Unknown,
                sig: TypeVector::new(),
                exprs: ExprList::new(),
            }],
            finished: None,
        }
    }

    fn finish(self) -> Result<ExprList> {
        match self.finished {
            Some(exprs) if self.frames.is_empty() => Ok(exprs),
            _ => bail!("function body ends inside an open block"),
        }
    }

    fn top(&mut self) -> Result<&mut Frame> {
        self.frames
            .last_mut()
            .ok_or_else(|| anyhow!("operator after the final `end`"))
    }

    fn block_sig(&self, blockty: BlockType) -> Result<TypeVector> {
        match blockty {
            BlockType::Empty => Ok(TypeVector::new()),
            BlockType::Type(ty) => Ok(vec![value_type(ty)?]),
            BlockType::FuncType(index) => {
                let sig = self
                    .types
                    .get(index as usize)
                    .ok_or_else(|| anyhow!("block type {} out of range", index))?;
                if !sig.param_types.is_empty() {
                    bail!("block parameters not supported");
                }
                Ok(sig.result_types.clone())
            }
        }
    }

    fn open(&mut self, kind: FrameKind, loc: Location, blockty: BlockType) -> Result<()> {
        let sig = self.block_sig(blockty)?;
        self.frames.push(Frame {
            kind,
            loc,
            sig,
            exprs: ExprList::new(),
        });
        Ok(())
    }

    fn require_exceptions(&self, op: &Operator<'_>) -> Result<()> {
        if !self.exceptions {
            bail!("exception handling is disabled: {:?}", op);
        }
        Ok(())
    }

    fn else_branch(&mut self) -> Result<()> {
        let frame = self.top()?;
        match &mut frame.kind {
            FrameKind::If { true_exprs } if true_exprs.is_none() => {
                *true_exprs = Some(std::mem::take(&mut frame.exprs));
                Ok(())
            }
            _ => bail!("`else` outside of `if`"),
        }
    }

    fn handler(&mut self, loc: Location, var: Var) -> Result<()> {
        let frame = self.top()?;
        let FrameKind::Try {
            body,
            catches,
            handler,
        } = &mut frame.kind
        else {
            bail!("handler outside of `try`");
        };
        let exprs = std::mem::take(&mut frame.exprs);
        match handler.take() {
            Some((prev_loc, prev_var)) => catches.push(Catch::new(prev_var, exprs).with_loc(prev_loc)),
            None => *body = Some(exprs),
        }
        *handler = Some((loc, var));
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        let Frame {
            kind,
            loc,
            sig,
            exprs,
        } = self
            .frames
            .pop()
            .ok_or_else(|| anyhow!("`end` without an open block"))?;
        let kind = match kind {
            FrameKind::Func => {
                self.finished = Some(exprs);
                return Ok(());
            }
            FrameKind::Block => ExprKind::Block(Block::new(exprs).with_sig(sig)),
            FrameKind::Loop => ExprKind::Loop(Block::new(exprs).with_sig(sig)),
            FrameKind::If { true_exprs: None } => {
                ExprKind::If(IfExpr::new(Block::new(exprs).with_sig(sig), None))
            }
            FrameKind::If {
                true_exprs: Some(true_exprs),
            } => ExprKind::If(IfExpr::new(
                Block::new(true_exprs).with_sig(sig),
                Some(exprs),
            )),
            FrameKind::Try {
                body,
                mut catches,
                handler,
            } => {
                let body = match handler {
                    Some((catch_loc, var)) => {
                        catches.push(Catch::new(var, exprs).with_loc(catch_loc));
                        body.unwrap_or_default()
                    }
                    None => exprs,
                };
                let mut expr = TryExpr::new(Block::new(body).with_sig(sig));
                expr.catches = catches;
                ExprKind::Try(expr)
            }
        };
        self.top()?.exprs.push(Expr::at(loc, kind));
        Ok(())
    }

    fn operator(&mut self, op: &Operator<'_>, loc: Location) -> Result<()> {
        let var = |index: u32| Var::index(index).with_loc(loc);
        let kind = match op {
            Operator::Block { blockty } => return self.open(FrameKind::Block, loc, *blockty),
            Operator::Loop { blockty } => return self.open(FrameKind::Loop, loc, *blockty),
            Operator::If { blockty } => {
                return self.open(FrameKind::If { true_exprs: None }, loc, *blockty)
            }
            Operator::Else => return self.else_branch(),
            Operator::Try { blockty } => {
                self.require_exceptions(op)?;
                let kind = FrameKind::Try {
                    body: None,
                    catches: Vec::new(),
                    handler: None,
                };
                return self.open(kind, loc, *blockty);
            }
            Operator::Catch { tag_index } => {
                self.require_exceptions(op)?;
                if *tag_index == INVALID_INDEX {
                    bail!("catch tag index {} is reserved", tag_index);
                }
                return self.handler(loc, var(*tag_index));
            }
            Operator::CatchAll => {
                self.require_exceptions(op)?;
                return self.handler(loc, var(INVALID_INDEX));
            }
            Operator::End => return self.end(),

            Operator::Nop => ExprKind::Nop,
            Operator::Unreachable => ExprKind::Unreachable,
            Operator::Return => ExprKind::Return,
            Operator::Drop => ExprKind::Drop,
            Operator::Select => ExprKind::Select,

            Operator::Br { relative_depth } => ExprKind::Br(var(*relative_depth)),
            Operator::BrIf { relative_depth } => ExprKind::BrIf(var(*relative_depth)),
            Operator::BrTable { targets } => {
                let list = targets
                    .targets()
                    .map(|t| t.map(var))
                    .collect::<Result<Vec<_>, _>>()
                    .context("reading br_table targets")?;
                ExprKind::BrTable(BrTable {
                    targets: list,
                    default_target: var(targets.default()),
                })
            }

            Operator::Call { function_index } => ExprKind::Call(var(*function_index)),
            Operator::CallIndirect {
                type_index,
                table_index,
            } => {
                if *table_index != 0 {
                    bail!("call_indirect on table {} not supported", table_index);
                }
                ExprKind::CallIndirect(var(*type_index))
            }

            Operator::LocalGet { local_index } => ExprKind::GetLocal(var(*local_index)),
            Operator::LocalSet { local_index } => ExprKind::SetLocal(var(*local_index)),
            Operator::LocalTee { local_index } => ExprKind::TeeLocal(var(*local_index)),
            Operator::GlobalGet { global_index } => ExprKind::GetGlobal(var(*global_index)),
            Operator::GlobalSet { global_index } => ExprKind::SetGlobal(var(*global_index)),

            Operator::MemorySize { mem } | Operator::MemoryGrow { mem } if *mem != 0 => {
                bail!("multi-memory not supported (memory={})", mem)
            }
            Operator::MemorySize { .. } => ExprKind::CurrentMemory,
            Operator::MemoryGrow { .. } => ExprKind::GrowMemory,

            Operator::I32Const { value } => {
                ExprKind::Const(Const::i32(*value as u32).with_loc(loc))
            }
            Operator::I64Const { value } => {
                ExprKind::Const(Const::i64(*value as u64).with_loc(loc))
            }
            Operator::F32Const { value } => {
                ExprKind::Const(Const::f32_bits(value.bits()).with_loc(loc))
            }
            Operator::F64Const { value } => {
                ExprKind::Const(Const::f64_bits(value.bits()).with_loc(loc))
            }

            Operator::Throw { tag_index } => {
                self.require_exceptions(op)?;
                ExprKind::Throw(var(*tag_index))
            }
            Operator::Rethrow { relative_depth } => {
                self.require_exceptions(op)?;
                ExprKind::Rethrow(var(*relative_depth))
            }

            _ => {
                let opcode = Opcode::from_operator(op)
                    .ok_or_else(|| anyhow!("unsupported operator"))?;
                match opcode.class() {
                    OpcodeClass::Binary => ExprKind::Binary(opcode),
                    OpcodeClass::Compare => ExprKind::Compare(opcode),
                    OpcodeClass::Convert => ExprKind::Convert(opcode),
                    OpcodeClass::Unary => ExprKind::Unary(opcode),
                    OpcodeClass::Load => ExprKind::Load(load_store(opcode, op)?),
                    OpcodeClass::Store => ExprKind::Store(load_store(opcode, op)?),
                }
            }
        };
        self.top()?.exprs.push(Expr::at(loc, kind));
        Ok(())
    }
}

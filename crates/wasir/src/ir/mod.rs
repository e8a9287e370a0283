//! In-memory representation of a WebAssembly module.
//!
//! The IR stores structure only. Names stay unresolved until a consumer
//! resolves them through the binding tables; nothing here checks indices or
//! types.

mod binding;
mod expr;
mod func;
mod module;
mod opcode;
mod types;
mod var;

pub use binding::{make_type_binding_reverse_mapping, Binding, BindingTable};
pub use expr::{
    Block, BrTable, Catch, Expr, ExprKind, ExprList, ExprTag, ExprTreeIter, IfExpr, LoadStore,
    TryExpr,
};
pub use func::{Func, FuncDeclaration, FuncSignature, FuncType};
pub use module::{
    DataSegment, ElemSegment, Exception, Export, Global, Import, ImportKind, Memory, Module,
    ModuleField, ModuleFieldKind, ModuleFieldTag, Table,
};
pub use opcode::{Opcode, OpcodeClass};
pub use types::{Const, ConstValue, ExternalKind, Limits, TypeVector, ValueType};
pub use var::{Index, Location, Var, VarKind, INVALID_INDEX};

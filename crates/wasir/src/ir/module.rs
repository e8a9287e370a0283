//! Module container: an ordered list of fields plus the per-kind views and
//! binding tables derived from it.
//!
//! Fields are stored once, in declaration order. Each per-kind index space
//! (funcs, globals, ...) is a vector of positions into that list, appended to
//! in the same call that appends the field, so the views can never disagree
//! with the list. Imported entities sit in the same index space as local ones,
//! in the order they were appended.

use super::binding::{Binding, BindingTable};
use super::expr::ExprList;
use super::func::{Func, FuncDeclaration, FuncSignature, FuncType};
use super::types::{ExternalKind, Limits, TypeVector, ValueType};
use super::var::{Index, Location, Var};
use std::fmt;

// ─── Declarations ───────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Global {
    pub name: Option<String>,
    pub ty: ValueType,
    pub mutable: bool,
    /// Constant initializer; empty for imported globals.
    pub init_expr: ExprList,
}

impl Global {
    pub fn new(ty: ValueType, mutable: bool) -> Self {
        Self {
            name: None,
            ty,
            mutable,
            init_expr: ExprList::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: Option<String>,
    pub elem_limits: Limits,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory {
    pub name: Option<String>,
    pub page_limits: Limits,
}

/// Active element segment: function references written into a table.
#[derive(Debug)]
pub struct ElemSegment {
    pub table_var: Var,
    pub offset: ExprList,
    pub vars: Vec<Var>,
}

/// Active data segment: bytes written into a memory.
#[derive(Debug)]
pub struct DataSegment {
    pub memory_var: Var,
    pub offset: ExprList,
    pub data: Vec<u8>,
}

/// An exception (tag) declaration and the types of its payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Exception {
    pub name: Option<String>,
    pub sig: TypeVector,
}

#[derive(Debug)]
pub enum ImportKind {
    Func(Box<Func>),
    Table(Table),
    Memory(Memory),
    Global(Global),
    Except(Exception),
}

#[derive(Debug)]
pub struct Import {
    pub module_name: String,
    pub field_name: String,
    pub kind: ImportKind,
}

impl Import {
    pub fn new(module_name: impl Into<String>, field_name: impl Into<String>, kind: ImportKind) -> Self {
        Self {
            module_name: module_name.into(),
            field_name: field_name.into(),
            kind,
        }
    }

    pub fn external_kind(&self) -> ExternalKind {
        match self.kind {
            ImportKind::Func(_) => ExternalKind::Func,
            ImportKind::Table(_) => ExternalKind::Table,
            ImportKind::Memory(_) => ExternalKind::Memory,
            ImportKind::Global(_) => ExternalKind::Global,
            ImportKind::Except(_) => ExternalKind::Except,
        }
    }

    /// Name the imported entity binds in its own namespace, if any.
    fn bound_name(&self) -> Option<&str> {
        match &self.kind {
            ImportKind::Func(f) => f.name.as_deref(),
            ImportKind::Table(t) => t.name.as_deref(),
            ImportKind::Memory(m) => m.name.as_deref(),
            ImportKind::Global(g) => g.name.as_deref(),
            ImportKind::Except(e) => e.name.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub name: String,
    pub kind: ExternalKind,
    pub var: Var,
}

impl Export {
    pub fn new(name: impl Into<String>, kind: ExternalKind, var: Var) -> Self {
        Self {
            name: name.into(),
            kind,
            var,
        }
    }
}

// ─── Fields ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleFieldTag {
    Func,
    Global,
    Import,
    Export,
    FuncType,
    Table,
    ElemSegment,
    Memory,
    DataSegment,
    Start,
    Except,
}

impl fmt::Display for ModuleFieldTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModuleFieldTag::Func => "func",
            ModuleFieldTag::Global => "global",
            ModuleFieldTag::Import => "import",
            ModuleFieldTag::Export => "export",
            ModuleFieldTag::FuncType => "type",
            ModuleFieldTag::Table => "table",
            ModuleFieldTag::ElemSegment => "elem",
            ModuleFieldTag::Memory => "memory",
            ModuleFieldTag::DataSegment => "data",
            ModuleFieldTag::Start => "start",
            ModuleFieldTag::Except => "except",
        };
        f.pad(s)
    }
}

#[derive(Debug)]
pub enum ModuleFieldKind {
    Func(Box<Func>),
    Global(Global),
    Import(Import),
    Export(Export),
    FuncType(FuncType),
    Table(Table),
    ElemSegment(ElemSegment),
    Memory(Memory),
    DataSegment(DataSegment),
    Start(Var),
    Except(Exception),
}

#[derive(Debug)]
pub struct ModuleField {
    pub loc: Location,
    pub kind: ModuleFieldKind,
}

impl ModuleField {
    pub fn new(loc: Location, kind: ModuleFieldKind) -> Self {
        Self { loc, kind }
    }

    pub fn tag(&self) -> ModuleFieldTag {
        match &self.kind {
            ModuleFieldKind::Func(_) => ModuleFieldTag::Func,
            ModuleFieldKind::Global(_) => ModuleFieldTag::Global,
            ModuleFieldKind::Import(_) => ModuleFieldTag::Import,
            ModuleFieldKind::Export(_) => ModuleFieldTag::Export,
            ModuleFieldKind::FuncType(_) => ModuleFieldTag::FuncType,
            ModuleFieldKind::Table(_) => ModuleFieldTag::Table,
            ModuleFieldKind::ElemSegment(_) => ModuleFieldTag::ElemSegment,
            ModuleFieldKind::Memory(_) => ModuleFieldTag::Memory,
            ModuleFieldKind::DataSegment(_) => ModuleFieldTag::DataSegment,
            ModuleFieldKind::Start(_) => ModuleFieldTag::Start,
            ModuleFieldKind::Except(_) => ModuleFieldTag::Except,
        }
    }

    // The `as_*` accessors for importable kinds see through imports.

    pub fn as_func(&self) -> Option<&Func> {
        match &self.kind {
            ModuleFieldKind::Func(f) => Some(&**f),
            ModuleFieldKind::Import(Import {
                kind: ImportKind::Func(f),
                ..
            }) => Some(&**f),
            _ => None,
        }
    }

    pub fn as_func_mut(&mut self) -> Option<&mut Func> {
        match &mut self.kind {
            ModuleFieldKind::Func(f) => Some(&mut **f),
            ModuleFieldKind::Import(Import {
                kind: ImportKind::Func(f),
                ..
            }) => Some(&mut **f),
            _ => None,
        }
    }

    pub fn as_global(&self) -> Option<&Global> {
        match &self.kind {
            ModuleFieldKind::Global(g) => Some(g),
            ModuleFieldKind::Import(Import {
                kind: ImportKind::Global(g),
                ..
            }) => Some(g),
            _ => None,
        }
    }

    pub fn as_global_mut(&mut self) -> Option<&mut Global> {
        match &mut self.kind {
            ModuleFieldKind::Global(g) => Some(g),
            ModuleFieldKind::Import(Import {
                kind: ImportKind::Global(g),
                ..
            }) => Some(g),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match &self.kind {
            ModuleFieldKind::Table(t) => Some(t),
            ModuleFieldKind::Import(Import {
                kind: ImportKind::Table(t),
                ..
            }) => Some(t),
            _ => None,
        }
    }

    pub fn as_memory(&self) -> Option<&Memory> {
        match &self.kind {
            ModuleFieldKind::Memory(m) => Some(m),
            ModuleFieldKind::Import(Import {
                kind: ImportKind::Memory(m),
                ..
            }) => Some(m),
            _ => None,
        }
    }

    pub fn as_except(&self) -> Option<&Exception> {
        match &self.kind {
            ModuleFieldKind::Except(e) => Some(e),
            ModuleFieldKind::Import(Import {
                kind: ImportKind::Except(e),
                ..
            }) => Some(e),
            _ => None,
        }
    }

    pub fn as_import(&self) -> Option<&Import> {
        match &self.kind {
            ModuleFieldKind::Import(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_export(&self) -> Option<&Export> {
        match &self.kind {
            ModuleFieldKind::Export(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_func_type(&self) -> Option<&FuncType> {
        match &self.kind {
            ModuleFieldKind::FuncType(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_elem_segment(&self) -> Option<&ElemSegment> {
        match &self.kind {
            ModuleFieldKind::ElemSegment(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_data_segment(&self) -> Option<&DataSegment> {
        match &self.kind {
            ModuleFieldKind::DataSegment(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_start(&self) -> Option<&Var> {
        match &self.kind {
            ModuleFieldKind::Start(v) => Some(v),
            _ => None,
        }
    }
}

// ─── Module ─────────────────────────────────────────────────────────────────

/// A WebAssembly module.
///
/// Name resolution is not performed here: vars stay as the producer wrote
/// them, and lookups resolve against the binding tables on demand.
#[derive(Debug, Default)]
pub struct Module {
    pub loc: Location,
    pub name: Option<String>,
    fields: Vec<ModuleField>,

    // Positions into `fields`, one vector per index space.
    func_fields: Vec<usize>,
    global_fields: Vec<usize>,
    import_fields: Vec<usize>,
    export_fields: Vec<usize>,
    func_type_fields: Vec<usize>,
    table_fields: Vec<usize>,
    elem_segment_fields: Vec<usize>,
    memory_fields: Vec<usize>,
    data_segment_fields: Vec<usize>,
    except_fields: Vec<usize>,
    start_field: Option<usize>,

    num_func_imports: Index,
    num_table_imports: Index,
    num_memory_imports: Index,
    num_global_imports: Index,
    num_except_imports: Index,

    func_bindings: BindingTable,
    global_bindings: BindingTable,
    export_bindings: BindingTable,
    func_type_bindings: BindingTable,
    table_bindings: BindingTable,
    memory_bindings: BindingTable,
    except_bindings: BindingTable,
}

fn bind(table: &mut BindingTable, name: Option<&str>, loc: Location, index: usize) {
    if let Some(name) = name {
        table.insert(name, Binding::new(loc, index as Index));
    }
}

fn in_range(bindings: &BindingTable, len: usize, var: &Var) -> Option<Index> {
    bindings
        .find_index(var)
        .filter(|&index| (index as usize) < len)
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field, updating the per-kind views, binding tables, import
    /// counters and start field in the same step.
    pub fn append_field(&mut self, field: ModuleField) {
        let pos = self.fields.len();
        let loc = field.loc;
        match &field.kind {
            ModuleFieldKind::Func(f) => {
                bind(&mut self.func_bindings, f.name.as_deref(), loc, self.func_fields.len());
                self.func_fields.push(pos);
            }
            ModuleFieldKind::Global(g) => {
                bind(&mut self.global_bindings, g.name.as_deref(), loc, self.global_fields.len());
                self.global_fields.push(pos);
            }
            ModuleFieldKind::Import(import) => {
                let name = import.bound_name();
                match import.kind {
                    ImportKind::Func(_) => {
                        bind(&mut self.func_bindings, name, loc, self.func_fields.len());
                        self.func_fields.push(pos);
                        self.num_func_imports += 1;
                    }
                    ImportKind::Table(_) => {
                        bind(&mut self.table_bindings, name, loc, self.table_fields.len());
                        self.table_fields.push(pos);
                        self.num_table_imports += 1;
                    }
                    ImportKind::Memory(_) => {
                        bind(&mut self.memory_bindings, name, loc, self.memory_fields.len());
                        self.memory_fields.push(pos);
                        self.num_memory_imports += 1;
                    }
                    ImportKind::Global(_) => {
                        bind(&mut self.global_bindings, name, loc, self.global_fields.len());
                        self.global_fields.push(pos);
                        self.num_global_imports += 1;
                    }
                    ImportKind::Except(_) => {
                        bind(&mut self.except_bindings, name, loc, self.except_fields.len());
                        self.except_fields.push(pos);
                        self.num_except_imports += 1;
                    }
                }
                self.import_fields.push(pos);
            }
            ModuleFieldKind::Export(e) => {
                bind(&mut self.export_bindings, Some(e.name.as_str()), loc, self.export_fields.len());
                self.export_fields.push(pos);
            }
            ModuleFieldKind::FuncType(t) => {
                bind(&mut self.func_type_bindings, t.name.as_deref(), loc, self.func_type_fields.len());
                self.func_type_fields.push(pos);
            }
            ModuleFieldKind::Table(t) => {
                bind(&mut self.table_bindings, t.name.as_deref(), loc, self.table_fields.len());
                self.table_fields.push(pos);
            }
            ModuleFieldKind::ElemSegment(_) => self.elem_segment_fields.push(pos),
            ModuleFieldKind::Memory(m) => {
                bind(&mut self.memory_bindings, m.name.as_deref(), loc, self.memory_fields.len());
                self.memory_fields.push(pos);
            }
            ModuleFieldKind::DataSegment(_) => self.data_segment_fields.push(pos),
            // A later start field replaces an earlier one.
            ModuleFieldKind::Start(_) => self.start_field = Some(pos),
            ModuleFieldKind::Except(e) => {
                bind(&mut self.except_bindings, e.name.as_deref(), loc, self.except_fields.len());
                self.except_fields.push(pos);
            }
        }
        self.fields.push(field);
    }

    /// Find a type with the same params and results as `sig`, or append an
    /// anonymous one. Returns its index in the type space.
    pub fn append_implicit_func_type(&mut self, loc: Location, sig: FuncSignature) -> Index {
        if let Some(index) = self.func_type_index_for_sig(&sig) {
            return index;
        }
        let index = self.func_type_fields.len() as Index;
        self.append_field(ModuleField::new(loc, ModuleFieldKind::FuncType(FuncType::new(sig))));
        index
    }

    pub fn fields(&self) -> &[ModuleField] {
        &self.fields
    }

    pub fn start(&self) -> Option<&Var> {
        self.start_field
            .and_then(|pos| self.fields.get(pos))
            .and_then(ModuleField::as_start)
    }

    pub fn num_func_imports(&self) -> Index {
        self.num_func_imports
    }

    pub fn num_table_imports(&self) -> Index {
        self.num_table_imports
    }

    pub fn num_memory_imports(&self) -> Index {
        self.num_memory_imports
    }

    pub fn num_global_imports(&self) -> Index {
        self.num_global_imports
    }

    pub fn num_except_imports(&self) -> Index {
        self.num_except_imports
    }

    pub fn func_bindings(&self) -> &BindingTable {
        &self.func_bindings
    }

    pub fn global_bindings(&self) -> &BindingTable {
        &self.global_bindings
    }

    pub fn export_bindings(&self) -> &BindingTable {
        &self.export_bindings
    }

    pub fn func_type_bindings(&self) -> &BindingTable {
        &self.func_type_bindings
    }

    pub fn table_bindings(&self) -> &BindingTable {
        &self.table_bindings
    }

    pub fn memory_bindings(&self) -> &BindingTable {
        &self.memory_bindings
    }

    pub fn except_bindings(&self) -> &BindingTable {
        &self.except_bindings
    }

    // ── Lookup by var ──

    pub fn func_index(&self, var: &Var) -> Option<Index> {
        in_range(&self.func_bindings, self.func_fields.len(), var)
    }

    pub fn global_index(&self, var: &Var) -> Option<Index> {
        in_range(&self.global_bindings, self.global_fields.len(), var)
    }

    pub fn table_index(&self, var: &Var) -> Option<Index> {
        in_range(&self.table_bindings, self.table_fields.len(), var)
    }

    pub fn memory_index(&self, var: &Var) -> Option<Index> {
        in_range(&self.memory_bindings, self.memory_fields.len(), var)
    }

    pub fn except_index(&self, var: &Var) -> Option<Index> {
        in_range(&self.except_bindings, self.except_fields.len(), var)
    }

    pub fn func_type_index(&self, var: &Var) -> Option<Index> {
        in_range(&self.func_type_bindings, self.func_type_fields.len(), var)
    }

    pub fn export_index(&self, var: &Var) -> Option<Index> {
        in_range(&self.export_bindings, self.export_fields.len(), var)
    }

    pub fn get_func(&self, var: &Var) -> Option<&Func> {
        self.func(self.func_index(var)?)
    }

    pub fn get_func_mut(&mut self, var: &Var) -> Option<&mut Func> {
        let index = self.func_index(var)?;
        self.func_mut(index)
    }

    pub fn get_global(&self, var: &Var) -> Option<&Global> {
        self.global(self.global_index(var)?)
    }

    pub fn get_global_mut(&mut self, var: &Var) -> Option<&mut Global> {
        let index = self.global_index(var)?;
        self.global_mut(index)
    }

    pub fn get_table(&self, var: &Var) -> Option<&Table> {
        self.table(self.table_index(var)?)
    }

    pub fn get_memory(&self, var: &Var) -> Option<&Memory> {
        self.memory(self.memory_index(var)?)
    }

    pub fn get_except(&self, var: &Var) -> Option<&Exception> {
        self.except(self.except_index(var)?)
    }

    pub fn get_func_type(&self, var: &Var) -> Option<&FuncType> {
        self.func_type(self.func_type_index(var)?)
    }

    pub fn get_export(&self, name: &str) -> Option<&Export> {
        let binding = self.export_bindings.find(name)?;
        self.export(binding.index)
    }

    pub fn func_mut(&mut self, index: Index) -> Option<&mut Func> {
        let pos = *self.func_fields.get(index as usize)?;
        self.fields.get_mut(pos).and_then(ModuleField::as_func_mut)
    }

    pub fn global_mut(&mut self, index: Index) -> Option<&mut Global> {
        let pos = *self.global_fields.get(index as usize)?;
        self.fields.get_mut(pos).and_then(ModuleField::as_global_mut)
    }

    // ── Signatures ──

    pub fn func_type_index_for_sig(&self, sig: &FuncSignature) -> Option<Index> {
        self.func_types()
            .position(|ty| ty.sig == *sig)
            .map(|pos| pos as Index)
    }

    /// Type index a declaration refers to: its explicit type var if it has
    /// one, otherwise the first type whose signature matches.
    pub fn func_type_index_for_decl(&self, decl: &FuncDeclaration) -> Option<Index> {
        match &decl.type_var {
            Some(var) => self.func_type_index(var),
            None => self.func_type_index_for_sig(&decl.sig),
        }
    }
}

/// Per-kind iteration, count and by-index access.
macro_rules! index_space_accessors {
    ($($positions:ident: $ty:ty => $iter:ident, $count:ident, $at:ident, $as:ident;)*) => {
        impl Module {
            $(
                pub fn $iter(&self) -> impl Iterator<Item = &$ty> + '_ {
                    self.$positions
                        .iter()
                        .filter_map(move |&pos| self.fields.get(pos).and_then(ModuleField::$as))
                }

                pub fn $count(&self) -> usize {
                    self.$positions.len()
                }

                pub fn $at(&self, index: Index) -> Option<&$ty> {
                    self.$positions
                        .get(index as usize)
                        .and_then(|&pos| self.fields.get(pos))
                        .and_then(ModuleField::$as)
                }
            )*
        }
    };
}

index_space_accessors! {
    func_fields: Func => funcs, num_funcs, func, as_func;
    global_fields: Global => globals, num_globals, global, as_global;
    import_fields: Import => imports, num_imports, import, as_import;
    export_fields: Export => exports, num_exports, export, as_export;
    func_type_fields: FuncType => func_types, num_func_types, func_type, as_func_type;
    table_fields: Table => tables, num_tables, table, as_table;
    elem_segment_fields: ElemSegment => elem_segments, num_elem_segments, elem_segment, as_elem_segment;
    memory_fields: Memory => memories, num_memories, memory, as_memory;
    data_segment_fields: DataSegment => data_segments, num_data_segments, data_segment, as_data_segment;
    except_fields: Exception => excepts, num_excepts, except, as_except;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::expr::{Expr, ExprKind};
    use crate::ir::types::Const;

    fn sig(params: &[ValueType], results: &[ValueType]) -> FuncSignature {
        FuncSignature::new(params.to_vec(), results.to_vec())
    }

    fn func_field(name: Option<&str>) -> ModuleField {
        let mut func = Func::new(FuncDeclaration::inline(sig(&[], &[])));
        func.name = name.map(str::to_string);
        ModuleField::new(Location::Unknown, ModuleFieldKind::Func(Box::new(func)))
    }

    fn func_import(name: &str) -> ModuleField {
        let func = Func::new(FuncDeclaration::inline(sig(&[ValueType::I32], &[]))).with_name(name);
        ModuleField::new(
            Location::Unknown,
            ModuleFieldKind::Import(Import::new("env", name.trim_start_matches('$'), ImportKind::Func(Box::new(func)))),
        )
    }

    fn global_field(name: &str) -> ModuleField {
        let mut global = Global::new(ValueType::I32, true);
        global.name = Some(name.to_string());
        global.init_expr.push(Expr::new(ExprKind::Const(Const::i32(0))));
        ModuleField::new(Location::Unknown, ModuleFieldKind::Global(global))
    }

    fn memory_field() -> ModuleField {
        ModuleField::new(
            Location::Unknown,
            ModuleFieldKind::Memory(Memory {
                name: None,
                page_limits: Limits::new(1, None),
            }),
        )
    }

    fn export_field(name: &str, index: Index) -> ModuleField {
        ModuleField::new(
            Location::Unknown,
            ModuleFieldKind::Export(Export::new(name, ExternalKind::Func, Var::index(index))),
        )
    }

    #[test]
    fn test_append_field_keeps_order_and_views() {
        let mut module = Module::new();
        module.append_field(func_field(Some("$a")));
        module.append_field(global_field("$g"));
        module.append_field(memory_field());
        module.append_field(func_field(None));
        module.append_field(export_field("a", 0));

        let tags: Vec<_> = module.fields().iter().map(ModuleField::tag).collect();
        assert_eq!(
            tags,
            vec![
                ModuleFieldTag::Func,
                ModuleFieldTag::Global,
                ModuleFieldTag::Memory,
                ModuleFieldTag::Func,
                ModuleFieldTag::Export
            ]
        );
        assert_eq!(module.num_funcs(), 2);
        assert_eq!(module.num_globals(), 1);
        assert_eq!(module.num_memories(), 1);
        assert_eq!(module.num_exports(), 1);
        assert_eq!(module.num_tables(), 0);
        assert_eq!(module.func(0).and_then(|f| f.name.as_deref()), Some("$a"));
        assert_eq!(module.func(1).and_then(|f| f.name.as_deref()), None);
    }

    #[test]
    fn test_implicit_func_type_dedups_by_value() {
        let mut module = Module::new();
        let first = module.append_implicit_func_type(Location::Unknown, sig(&[ValueType::I32], &[ValueType::I32]));
        let second = module.append_implicit_func_type(Location::Unknown, sig(&[ValueType::I32], &[ValueType::I32]));
        assert_eq!(first, second);
        assert_eq!(module.num_func_types(), 1);
        assert_eq!(module.fields().len(), 1);
    }

    #[test]
    fn test_implicit_func_type_differing_results_is_new() {
        let mut module = Module::new();
        let first = module.append_implicit_func_type(Location::Unknown, sig(&[ValueType::I32], &[ValueType::I32]));
        let second = module.append_implicit_func_type(Location::Unknown, sig(&[ValueType::I32], &[ValueType::I64]));
        assert_ne!(first, second);
        assert_eq!(module.num_func_types(), 2);
    }

    #[test]
    fn test_implicit_func_type_matches_named_type() {
        let mut module = Module::new();
        module.append_field(ModuleField::new(
            Location::Unknown,
            ModuleFieldKind::FuncType(FuncType::new(sig(&[], &[ValueType::F32])).with_name("$t")),
        ));
        let index = module.append_implicit_func_type(Location::Unknown, sig(&[], &[ValueType::F32]));
        assert_eq!(index, 0);
        assert_eq!(module.num_func_types(), 1);
    }

    #[test]
    fn test_imports_precede_local_funcs() {
        let mut module = Module::new();
        module.append_field(func_import("$log"));
        module.append_field(func_import("$abort"));
        module.append_field(func_field(Some("$main")));

        assert_eq!(module.num_func_imports(), 2);
        assert_eq!(module.num_imports(), 2);
        assert_eq!(module.num_funcs(), 3);
        assert_eq!(module.func_index(&Var::name("$main")), Some(2));
        assert_eq!(module.func_index(&Var::name("$abort")), Some(1));
        assert_eq!(module.import(0).map(|i| i.field_name.as_str()), Some("log"));
        assert_eq!(module.import(0).map(Import::external_kind), Some(ExternalKind::Func));
    }

    #[test]
    fn test_unknown_name_is_not_found() {
        let mut module = Module::new();
        module.append_field(func_field(Some("$a")));
        assert_eq!(module.func_index(&Var::name("$missing")), None);
        assert!(module.get_func(&Var::name("$missing")).is_none());
        assert!(module.get_global(&Var::name("$a")).is_none());
    }

    #[test]
    fn test_out_of_range_index_is_not_found() {
        let mut module = Module::new();
        module.append_field(func_field(None));
        assert!(module.get_func(&Var::index(0)).is_some());
        assert!(module.get_func(&Var::index(1)).is_none());
        assert!(module.get_memory(&Var::index(0)).is_none());
    }

    #[test]
    fn test_duplicate_names_first_wins() {
        let mut module = Module::new();
        module.append_field(global_field("$g"));
        module.append_field(global_field("$g"));
        assert_eq!(module.global_index(&Var::name("$g")), Some(0));
        assert_eq!(module.global_bindings().duplicates().len(), 1);
        assert_eq!(module.num_globals(), 2);
    }

    #[test]
    fn test_last_start_wins() {
        let mut module = Module::new();
        assert!(module.start().is_none());
        module.append_field(ModuleField::new(Location::Unknown, ModuleFieldKind::Start(Var::index(0))));
        module.append_field(ModuleField::new(Location::Unknown, ModuleFieldKind::Start(Var::name("$init"))));
        assert_eq!(module.start(), Some(&Var::name("$init")));
    }

    #[test]
    fn test_get_export_by_name() {
        let mut module = Module::new();
        module.append_field(func_field(None));
        module.append_field(export_field("run", 0));
        let export = module.get_export("run").map(|e| e.var.clone());
        assert_eq!(export, Some(Var::index(0)));
        assert!(module.get_export("walk").is_none());
        assert_eq!(module.export_index(&Var::name("run")), Some(0));
    }

    #[test]
    fn test_get_func_mut_rewrites_body() {
        let mut module = Module::new();
        module.append_field(func_field(Some("$f")));
        if let Some(func) = module.get_func_mut(&Var::name("$f")) {
            func.exprs.push(Expr::new(ExprKind::Nop));
        }
        assert_eq!(module.get_func(&Var::name("$f")).map(|f| f.exprs.len()), Some(1));
    }

    #[test]
    fn test_func_type_index_for_decl() {
        let mut module = Module::new();
        module.append_field(ModuleField::new(
            Location::Unknown,
            ModuleFieldKind::FuncType(FuncType::new(sig(&[], &[])).with_name("$void")),
        ));
        module.append_implicit_func_type(Location::Unknown, sig(&[ValueType::I64], &[]));

        let typed = FuncDeclaration::typed(Var::name("$void"), sig(&[], &[]));
        let inline = FuncDeclaration::inline(sig(&[ValueType::I64], &[]));
        let unknown = FuncDeclaration::inline(sig(&[ValueType::F64], &[]));
        assert_eq!(module.func_type_index_for_decl(&typed), Some(0));
        assert_eq!(module.func_type_index_for_decl(&inline), Some(1));
        assert_eq!(module.func_type_index_for_decl(&unknown), None);
    }

    #[test]
    fn test_imported_except_and_global_counters() {
        let mut module = Module::new();
        module.append_field(ModuleField::new(
            Location::Unknown,
            ModuleFieldKind::Import(Import::new(
                "env",
                "err",
                ImportKind::Except(Exception {
                    name: Some("$err".to_string()),
                    sig: vec![ValueType::I32],
                }),
            )),
        ));
        module.append_field(ModuleField::new(
            Location::Unknown,
            ModuleFieldKind::Import(Import::new("env", "g", ImportKind::Global(Global::new(ValueType::F64, false)))),
        ));
        module.append_field(ModuleField::new(
            Location::Unknown,
            ModuleFieldKind::Except(Exception::default()),
        ));

        assert_eq!(module.num_except_imports(), 1);
        assert_eq!(module.num_global_imports(), 1);
        assert_eq!(module.num_excepts(), 2);
        assert_eq!(module.get_except(&Var::name("$err")).map(|e| e.sig.len()), Some(1));
        assert_eq!(module.global(0).map(|g| g.ty), Some(ValueType::F64));
    }

    #[test]
    fn test_long_field_list_drops() {
        let mut module = Module::new();
        for i in 0..200_000u32 {
            module.append_field(export_field(&format!("e{}", i), 0));
        }
        assert_eq!(module.num_exports(), 200_000);
        drop(module);
    }
}

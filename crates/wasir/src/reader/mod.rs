//! WebAssembly binary reader.
//!
//! This module wraps the `wasmparser` crate to build a [`Module`] from a
//! `.wasm` binary. Sections are turned into fields as they arrive; the fields
//! are appended to the module only at the end, once the trailing `name`
//! section (if any) has attached debug names.

mod body;

use crate::ir::{
    Binding, DataSegment, ElemSegment, Exception, Export, ExternalKind, Func, FuncDeclaration,
    FuncSignature, FuncType, Global, Import, ImportKind, Limits, Location, Memory, Module,
    ModuleField, ModuleFieldKind, Table, Var,
};
use crate::ReadOptions;
use anyhow::{anyhow, bail, Context, Result};
use body::{read_body, read_const_expr, signature, value_type};
use std::collections::HashMap;
use wasmparser::{KnownCustom, Name, Parser, Payload, TypeRef, WasmFeatures};

/// Names from the `name` custom section, keyed by function index.
#[derive(Default)]
struct DebugNames {
    module: Option<String>,
    funcs: HashMap<u32, String>,
    locals: HashMap<u32, Vec<(u32, String)>>,
}

/// Fields collected so far, plus the state needed to pair code entries with
/// their function declarations.
#[derive(Default)]
struct Collected {
    types: Vec<FuncSignature>,
    fields: Vec<ModuleField>,
    /// Field positions of locally defined functions, in function-section order.
    defined_funcs: Vec<usize>,
    next_body: usize,
    names: DebugNames,
}

impl Collected {
    fn sig(&self, type_index: u32) -> Result<FuncSignature> {
        self.types
            .get(type_index as usize)
            .cloned()
            .ok_or_else(|| anyhow!("type index {} out of range", type_index))
    }

    fn push(&mut self, offset: usize, kind: ModuleFieldKind) {
        self.fields
            .push(ModuleField::new(Location::binary(offset), kind));
    }
}

fn features(options: &ReadOptions) -> WasmFeatures {
    let mut features = WasmFeatures::default();
    if options.exceptions {
        features.insert(WasmFeatures::EXCEPTIONS | WasmFeatures::LEGACY_EXCEPTIONS);
    } else {
        features.remove(WasmFeatures::EXCEPTIONS | WasmFeatures::LEGACY_EXCEPTIONS);
    }
    features
}

fn limits(initial: u64, maximum: Option<u64>, shared: bool) -> Limits {
    Limits {
        initial,
        max: maximum,
        is_shared: shared,
    }
}

fn external_kind(kind: wasmparser::ExternalKind) -> ExternalKind {
    match kind {
        wasmparser::ExternalKind::Func => ExternalKind::Func,
        wasmparser::ExternalKind::Table => ExternalKind::Table,
        wasmparser::ExternalKind::Memory => ExternalKind::Memory,
        wasmparser::ExternalKind::Global => ExternalKind::Global,
        wasmparser::ExternalKind::Tag => ExternalKind::Except,
    }
}

fn read_import(
    collected: &Collected,
    import: &wasmparser::Import<'_>,
    options: &ReadOptions,
) -> Result<ImportKind> {
    let kind = match import.ty {
        TypeRef::Func(type_index) => {
            let decl = FuncDeclaration::typed(Var::index(type_index), collected.sig(type_index)?);
            ImportKind::Func(Box::new(Func::new(decl)))
        }
        TypeRef::Table(ty) => ImportKind::Table(Table {
            name: None,
            elem_limits: limits(ty.initial, ty.maximum, false),
        }),
        TypeRef::Memory(ty) => ImportKind::Memory(Memory {
            name: None,
            page_limits: limits(ty.initial, ty.maximum, ty.shared),
        }),
        TypeRef::Global(ty) => ImportKind::Global(Global::new(value_type(ty.content_type)?, ty.mutable)),
        TypeRef::Tag(ty) => {
            if !options.exceptions {
                bail!("exception handling is disabled: tag import");
            }
            ImportKind::Except(Exception {
                name: None,
                sig: collected.sig(ty.func_type_idx)?.param_types,
            })
        }
    };
    Ok(kind)
}

fn read_element(element: wasmparser::Element<'_>) -> Result<Option<ElemSegment>> {
    match element.kind {
        wasmparser::ElementKind::Active {
            table_index,
            offset_expr,
        } => {
            let offset = read_const_expr(&offset_expr).context("reading element offset")?;
            let mut vars = Vec::new();
            match element.items {
                wasmparser::ElementItems::Functions(funcs) => {
                    for func_index in funcs {
                        let index = func_index.context("reading element func index")?;
                        vars.push(Var::index(index));
                    }
                }
                wasmparser::ElementItems::Expressions(..) => {
                    bail!("expression-based element segments not supported");
                }
            }
            Ok(Some(ElemSegment {
                table_var: Var::index(table_index.unwrap_or(0)),
                offset,
                vars,
            }))
        }
        // Only active segments are applied at instantiation.
        wasmparser::ElementKind::Passive | wasmparser::ElementKind::Declared => Ok(None),
    }
}

fn read_data(data: wasmparser::Data<'_>) -> Result<Option<DataSegment>> {
    match data.kind {
        wasmparser::DataKind::Active {
            memory_index,
            offset_expr,
        } => Ok(Some(DataSegment {
            memory_var: Var::index(memory_index),
            offset: read_const_expr(&offset_expr).context("reading data offset")?,
            data: data.data.to_vec(),
        })),
        wasmparser::DataKind::Passive => Ok(None),
    }
}

fn read_names(reader: wasmparser::NameSectionReader<'_>, names: &mut DebugNames) -> Result<()> {
    for name in reader {
        match name.context("reading name subsection")? {
            Name::Module { name, .. } => names.module = Some(format!("${}", name)),
            Name::Function(map) => {
                for naming in map {
                    let naming = naming.context("reading function name")?;
                    names.funcs.insert(naming.index, format!("${}", naming.name));
                }
            }
            Name::Local(map) => {
                for indirect in map {
                    let indirect = indirect.context("reading local names")?;
                    let mut locals = Vec::new();
                    for naming in indirect.names {
                        let naming = naming.context("reading local name")?;
                        locals.push((naming.index, format!("${}", naming.name)));
                    }
                    names.locals.insert(indirect.index, locals);
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Attach debug names to a function and bind its parameters and locals.
fn apply_names(func: &mut Func, func_index: u32, names: &mut DebugNames) {
    if let Some(name) = names.funcs.remove(&func_index) {
        func.name = Some(name);
    }
    let num_params = func.num_params();
    for (index, name) in names.locals.remove(&func_index).unwrap_or_default() {
        if index < num_params {
            func.param_bindings
                .insert(name, Binding::new(Location::Unknown, index));
        } else {
            func.local_bindings
                .insert(name, Binding::new(Location::Unknown, index - num_params));
        }
    }
}

/// Decode a WebAssembly binary into a [`Module`].
///
/// Decoding is structural: indices are not validated, but operators and
/// value types outside the supported set are rejected.
pub fn read_binary(bytes: &[u8], options: &ReadOptions) -> Result<Module> {
    let mut parser = Parser::new(0);
    parser.set_features(features(options));

    let mut collected = Collected::default();

    for payload in parser.parse_all(bytes) {
        let payload = payload.context("parsing wasm payload")?;

        match payload {
            Payload::Version { num, encoding, .. } => {
                if matches!(encoding, wasmparser::Encoding::Component) {
                    bail!("components are not supported");
                }
                if num != 1 {
                    bail!("unknown binary version {}", num);
                }
            }

            Payload::TypeSection(reader) => {
                let offset = reader.range().start;
                for ty in reader.into_iter_err_on_gc_types() {
                    let ty = ty.context("reading function type")?;
                    let sig = signature(&ty).context("reading function type")?;
                    collected.types.push(sig.clone());
                    collected.push(offset, ModuleFieldKind::FuncType(FuncType::new(sig)));
                }
            }

            Payload::ImportSection(reader) => {
                for item in reader.into_iter_with_offsets() {
                    let (offset, import) = item.context("reading import")?;
                    let kind = read_import(&collected, &import, options)
                        .with_context(|| format!("reading import {}.{}", import.module, import.name))?;
                    collected.push(
                        offset,
                        ModuleFieldKind::Import(Import::new(import.module, import.name, kind)),
                    );
                }
            }

            Payload::FunctionSection(reader) => {
                for item in reader.into_iter_with_offsets() {
                    let (offset, type_index) = item.context("reading function type index")?;
                    let decl = FuncDeclaration::typed(Var::index(type_index), collected.sig(type_index)?);
                    collected.defined_funcs.push(collected.fields.len());
                    collected.push(offset, ModuleFieldKind::Func(Box::new(Func::new(decl))));
                }
            }

            Payload::TableSection(reader) => {
                for item in reader.into_iter_with_offsets() {
                    let (offset, table) = item.context("reading table type")?;
                    collected.push(
                        offset,
                        ModuleFieldKind::Table(Table {
                            name: None,
                            elem_limits: limits(table.ty.initial, table.ty.maximum, false),
                        }),
                    );
                }
            }

            Payload::MemorySection(reader) => {
                for item in reader.into_iter_with_offsets() {
                    let (offset, ty) = item.context("reading memory type")?;
                    collected.push(
                        offset,
                        ModuleFieldKind::Memory(Memory {
                            name: None,
                            page_limits: limits(ty.initial, ty.maximum, ty.shared),
                        }),
                    );
                }
            }

            Payload::TagSection(reader) => {
                if !options.exceptions {
                    bail!("exception handling is disabled: tag section");
                }
                for item in reader.into_iter_with_offsets() {
                    let (offset, tag) = item.context("reading tag")?;
                    let sig = collected.sig(tag.func_type_idx)?.param_types;
                    collected.push(offset, ModuleFieldKind::Except(Exception { name: None, sig }));
                }
            }

            Payload::GlobalSection(reader) => {
                for item in reader.into_iter_with_offsets() {
                    let (offset, global) = item.context("reading global")?;
                    let mut ir_global =
                        Global::new(value_type(global.ty.content_type)?, global.ty.mutable);
                    ir_global.init_expr =
                        read_const_expr(&global.init_expr).context("reading global initializer")?;
                    collected.push(offset, ModuleFieldKind::Global(ir_global));
                }
            }

            Payload::ExportSection(reader) => {
                for item in reader.into_iter_with_offsets() {
                    let (offset, export) = item.context("reading export")?;
                    let ir_export = Export::new(
                        export.name,
                        external_kind(export.kind),
                        Var::index(export.index),
                    );
                    collected.push(offset, ModuleFieldKind::Export(ir_export));
                }
            }

            Payload::StartSection { func, range } => {
                collected.push(range.start, ModuleFieldKind::Start(Var::index(func)));
            }

            Payload::ElementSection(reader) => {
                for item in reader.into_iter_with_offsets() {
                    let (offset, element) = item.context("reading element segment")?;
                    if let Some(segment) = read_element(element)? {
                        collected.push(offset, ModuleFieldKind::ElemSegment(segment));
                    }
                }
            }

            Payload::DataSection(reader) => {
                for item in reader.into_iter_with_offsets() {
                    let (offset, data) = item.context("reading data segment")?;
                    if let Some(segment) = read_data(data)? {
                        collected.push(offset, ModuleFieldKind::DataSegment(segment));
                    }
                }
            }

            Payload::CodeSectionEntry(body) => {
                let index = collected.next_body;
                let pos = *collected
                    .defined_funcs
                    .get(index)
                    .ok_or_else(|| anyhow!("code entry {} has no function declaration", index))?;
                let (locals, exprs) = read_body(&body, &collected.types, options.exceptions)
                    .with_context(|| format!("reading body of function {}", index))?;
                let func = collected
                    .fields
                    .get_mut(pos)
                    .and_then(ModuleField::as_func_mut)
                    .ok_or_else(|| anyhow!("field {} is not a function", pos))?;
                func.local_types = locals;
                func.exprs = exprs;
                collected.next_body += 1;
            }

            Payload::CustomSection(reader) if options.read_debug_names => {
                if let KnownCustom::Name(names) = reader.as_known() {
                    read_names(names, &mut collected.names).context("reading name section")?;
                }
            }

            _ => {}
        }
    }

    if collected.next_body != collected.defined_funcs.len() {
        bail!(
            "function and code section counts differ ({} vs {})",
            collected.defined_funcs.len(),
            collected.next_body
        );
    }

    let Collected {
        fields, mut names, ..
    } = collected;
    let mut module = Module::new();
    module.name = names.module.take();
    let mut func_index = 0;
    for mut field in fields {
        if let Some(func) = field.as_func_mut() {
            apply_names(func, func_index, &mut names);
            func_index += 1;
        }
        module.append_field(field);
    }
    Ok(module)
}

/// Convert WebAssembly text to binary with `wat`, then read it.
pub fn read_text(text: &[u8], options: &ReadOptions) -> Result<Module> {
    let wasm = wat::parse_bytes(text).context("parsing module text")?;
    read_binary(&wasm, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ExprTag, ValueType};

    fn read_wat(wat: &str) -> Result<Module> {
        let wasm = wat::parse_str(wat)?;
        read_binary(&wasm, &ReadOptions::default())
    }

    #[test]
    fn read_minimal_module() -> Result<()> {
        let module = read_wat("(module)")?;
        assert!(module.fields().is_empty());
        assert_eq!(module.num_funcs(), 0);
        Ok(())
    }

    #[test]
    fn read_add_function() -> Result<()> {
        let module = read_wat(
            r#"
            (module
                (func (param i32 i32) (result i32)
                    local.get 0
                    local.get 1
                    i32.add
                )
            )
        "#,
        )?;
        assert_eq!(module.num_func_types(), 1);
        assert_eq!(module.num_funcs(), 1);
        let func = module.func(0).ok_or_else(|| anyhow!("missing func"))?;
        assert_eq!(func.num_params(), 2);
        assert_eq!(func.num_results(), 1);
        let tags: Vec<_> = func.exprs.iter().map(|e| e.tag()).collect();
        assert_eq!(tags, vec![ExprTag::GetLocal, ExprTag::GetLocal, ExprTag::Binary]);
        Ok(())
    }

    #[test]
    fn read_memory_limits() -> Result<()> {
        let module = read_wat("(module (memory 2 10))")?;
        let memory = module.memory(0).ok_or_else(|| anyhow!("missing memory"))?;
        assert_eq!(memory.page_limits, Limits::new(2, Some(10)));
        Ok(())
    }

    #[test]
    fn read_mutable_global() -> Result<()> {
        let module = read_wat("(module (global (mut i32) (i32.const 42)))")?;
        let global = module.global(0).ok_or_else(|| anyhow!("missing global"))?;
        assert!(global.mutable);
        assert_eq!(global.ty, ValueType::I32);
        assert_eq!(global.init_expr.len(), 1);
        assert!(global.init_expr[0].is(ExprTag::Const));
        Ok(())
    }

    #[test]
    fn read_function_import_counts() -> Result<()> {
        let module = read_wat(
            r#"
            (module
                (import "env" "print" (func (param i32)))
                (import "env" "read" (func (result i32)))
                (import "env" "counter" (global i32))
                (func (result i32) i32.const 99)
            )
        "#,
        )?;
        assert_eq!(module.num_imports(), 3);
        assert_eq!(module.num_func_imports(), 2);
        assert_eq!(module.num_global_imports(), 1);
        assert_eq!(module.num_funcs(), 3);
        assert_eq!(module.import(1).map(|i| i.field_name.as_str()), Some("read"));
        // the local function comes after both imports
        assert_eq!(module.func(2).map(|f| f.exprs.len()), Some(1));
        Ok(())
    }

    #[test]
    fn read_debug_names_bind_funcs_and_locals() -> Result<()> {
        let module = read_wat(
            r#"
            (module
                (func $inc (param $x i32) (result i32) (local $one i32)
                    i32.const 1
                    local.set $one
                    local.get $x
                    local.get $one
                    i32.add)
            )
        "#,
        )?;
        let func = module
            .get_func(&Var::name("$inc"))
            .ok_or_else(|| anyhow!("func not bound"))?;
        assert_eq!(func.local_index(&Var::name("$x")), Some(0));
        assert_eq!(func.local_index(&Var::name("$one")), Some(1));
        assert_eq!(func.param_and_local_names(), vec!["$x".to_string(), "$one".to_string()]);
        Ok(())
    }

    #[test]
    fn read_without_debug_names() -> Result<()> {
        let wasm = wat::parse_str("(module (func $f))")?;
        let options = ReadOptions {
            read_debug_names: false,
            ..ReadOptions::default()
        };
        let module = read_binary(&wasm, &options)?;
        assert!(module.get_func(&Var::name("$f")).is_none());
        assert!(module.get_func(&Var::index(0)).is_some());
        Ok(())
    }

    #[test]
    fn read_malformed_bytes_fails() {
        assert!(read_binary(b"\0asm\x01\0\0\0\xff", &ReadOptions::default()).is_err());
        assert!(read_binary(b"not wasm", &ReadOptions::default()).is_err());
    }

    #[test]
    fn read_unknown_version_fails() {
        for version in [0x02u8, 0x0e, 0xff] {
            let bytes = [0, b'a', b's', b'm', version, 0, 0, 0];
            let err = read_binary(&bytes, &ReadOptions::default())
                .err()
                .map(|e| format!("{:#}", e));
            assert!(
                err.as_deref().is_some_and(|e| e.contains("unknown binary version")),
                "version {:#x}: {:?}",
                version,
                err
            );
        }
        assert!(read_binary(b"\0asm\x01\0\0\0", &ReadOptions::default()).is_ok());
    }

    #[test]
    fn read_reserved_catch_tag_index_fails() {
        // type () -> (); tag 0; func 0 body: try catch 0xffffffff end end
        let bytes: &[u8] = &[
            0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, // header
            0x01, 0x04, 0x01, 0x60, 0x00, 0x00, // type section
            0x03, 0x02, 0x01, 0x00, // function section
            0x0d, 0x03, 0x01, 0x00, 0x00, // tag section
            0x0a, 0x0d, 0x01, 0x0b, 0x00, // code section, one 11-byte body, no locals
            0x06, 0x40, // try (empty block type)
            0x07, 0xff, 0xff, 0xff, 0xff, 0x0f, // catch 0xffffffff
            0x0b, 0x0b, // end end
        ];
        let err = read_binary(bytes, &ReadOptions::default())
            .err()
            .map(|e| format!("{:#}", e));
        assert!(
            err.as_deref().is_some_and(|e| e.contains("reserved")),
            "{:?}",
            err
        );
    }

    #[test]
    fn read_simd_is_unsupported() {
        let result = read_wat(
            r#"(module (func (result v128) v128.const i64x2 0 0))"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn read_text_directly() -> Result<()> {
        let module = read_text(b"(module (memory 1))", &ReadOptions::default())?;
        assert_eq!(module.num_memories(), 1);
        Ok(())
    }
}

//! Human-readable structural summary of a module.

use crate::ir::{
    ExprKind, ExprList, ImportKind, Module, ModuleField, ModuleFieldKind, TypeVector,
};

/// Coarse instruction families, for the per-module histogram.
const FAMILIES: [&str; 6] = ["control", "parametric", "variable", "memory", "numeric", "exception"];

fn family(kind: &ExprKind) -> usize {
    match kind {
        ExprKind::Block(_)
        | ExprKind::Loop(_)
        | ExprKind::If(_)
        | ExprKind::Br(_)
        | ExprKind::BrIf(_)
        | ExprKind::BrTable(_)
        | ExprKind::Call(_)
        | ExprKind::CallIndirect(_)
        | ExprKind::Return
        | ExprKind::Nop
        | ExprKind::Unreachable => 0,
        ExprKind::Drop | ExprKind::Select => 1,
        ExprKind::GetLocal(_)
        | ExprKind::SetLocal(_)
        | ExprKind::TeeLocal(_)
        | ExprKind::GetGlobal(_)
        | ExprKind::SetGlobal(_) => 2,
        ExprKind::Load(_) | ExprKind::Store(_) | ExprKind::CurrentMemory | ExprKind::GrowMemory => 3,
        ExprKind::Const(_)
        | ExprKind::Binary(_)
        | ExprKind::Compare(_)
        | ExprKind::Convert(_)
        | ExprKind::Unary(_) => 4,
        ExprKind::Try(_) | ExprKind::Throw(_) | ExprKind::Rethrow(_) => 5,
    }
}

fn types(types: &TypeVector) -> String {
    let names: Vec<String> = types.iter().map(ToString::to_string).collect();
    format!("[{}]", names.join(" "))
}

fn name(name: Option<&str>) -> &str {
    name.unwrap_or("-")
}

fn count(exprs: &ExprList, histogram: &mut [usize; FAMILIES.len()]) -> usize {
    let mut total = 0;
    for (_, expr) in exprs.tree_iter() {
        histogram[family(&expr.kind)] += 1;
        total += 1;
    }
    total
}

fn describe(field: &ModuleField, histogram: &mut [usize; FAMILIES.len()]) -> String {
    match &field.kind {
        ModuleFieldKind::Func(func) => format!(
            "{} {} locals={} exprs={}",
            name(func.name.as_deref()),
            func.decl.sig,
            func.num_locals(),
            count(&func.exprs, histogram)
        ),
        ModuleFieldKind::Global(global) => format!(
            "{} {}{} init={}",
            name(global.name.as_deref()),
            if global.mutable { "mut " } else { "" },
            global.ty,
            count(&global.init_expr, histogram)
        ),
        ModuleFieldKind::Import(import) => {
            let what = match &import.kind {
                ImportKind::Func(func) => format!("{} {}", name(func.name.as_deref()), func.decl.sig),
                ImportKind::Table(table) => format!("{} {}", name(table.name.as_deref()), table.elem_limits),
                ImportKind::Memory(memory) => {
                    format!("{} {}", name(memory.name.as_deref()), memory.page_limits)
                }
                ImportKind::Global(global) => format!(
                    "{} {}{}",
                    name(global.name.as_deref()),
                    if global.mutable { "mut " } else { "" },
                    global.ty
                ),
                ImportKind::Except(except) => {
                    format!("{} {}", name(except.name.as_deref()), types(&except.sig))
                }
            };
            format!(
                "\"{}\".\"{}\" {} {}",
                import.module_name,
                import.field_name,
                import.external_kind(),
                what
            )
        }
        ModuleFieldKind::Export(export) => {
            format!("\"{}\" {} {}", export.name, export.kind, export.var)
        }
        ModuleFieldKind::FuncType(ty) => format!("{} {}", name(ty.name.as_deref()), ty.sig),
        ModuleFieldKind::Table(table) => format!("{} {}", name(table.name.as_deref()), table.elem_limits),
        ModuleFieldKind::ElemSegment(segment) => format!(
            "table={} offset={} funcs={}",
            segment.table_var,
            count(&segment.offset, histogram),
            segment.vars.len()
        ),
        ModuleFieldKind::Memory(memory) => {
            format!("{} {}", name(memory.name.as_deref()), memory.page_limits)
        }
        ModuleFieldKind::DataSegment(segment) => format!(
            "memory={} offset={} bytes={}",
            segment.memory_var,
            count(&segment.offset, histogram),
            segment.data.len()
        ),
        ModuleFieldKind::Start(var) => var.to_string(),
        ModuleFieldKind::Except(except) => format!("{} {}", name(except.name.as_deref()), types(&except.sig)),
    }
}

/// One line per field in declaration order, then per-kind counts, import
/// counters and an instruction histogram.
pub fn summarize(module: &Module) -> String {
    let mut out = String::new();
    let mut histogram = [0usize; FAMILIES.len()];

    out.push_str(&format!("module {}\n", name(module.name.as_deref())));
    for (i, field) in module.fields().iter().enumerate() {
        out.push_str(&format!(
            "{:>4} {:<6} {}\n",
            i,
            field.tag(),
            describe(field, &mut histogram)
        ));
    }

    out.push_str(&format!(
        "types={} funcs={} tables={} memories={} globals={} excepts={} exports={} elems={} data={}\n",
        module.num_func_types(),
        module.num_funcs(),
        module.num_tables(),
        module.num_memories(),
        module.num_globals(),
        module.num_excepts(),
        module.num_exports(),
        module.num_elem_segments(),
        module.num_data_segments(),
    ));
    out.push_str(&format!(
        "imports: funcs={} tables={} memories={} globals={} excepts={}\n",
        module.num_func_imports(),
        module.num_table_imports(),
        module.num_memory_imports(),
        module.num_global_imports(),
        module.num_except_imports(),
    ));
    if let Some(start) = module.start() {
        out.push_str(&format!("start: {}\n", start));
    }

    let parts: Vec<String> = FAMILIES
        .iter()
        .zip(histogram.iter())
        .map(|(family, n)| format!("{}={}", family, n))
        .collect();
    out.push_str(&format!("instructions: {}\n", parts.join(" ")));
    out
}

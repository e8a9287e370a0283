//! Integration tests for the binary reader.
//!
//! Inputs are written as WAT, assembled with `wat`, and read back into the IR.

use anyhow::{anyhow, Context, Result};
use wasir::ir::{ExprTag, ExternalKind, ModuleFieldTag, Opcode, ValueType, Var};
use wasir::{read_binary, read_module, Module, ReadOptions};

fn read_wat(wat_source: &str) -> Result<Module> {
    let wasm = wat::parse_str(wat_source).context("failed to parse WAT")?;
    read_binary(&wasm, &ReadOptions::default())
}

#[test]
fn test_fields_follow_section_order() -> Result<()> {
    let module = read_wat(
        r#"
        (module
            (import "env" "log" (func $log (param i32)))
            (memory 1)
            (global $g (mut i32) (i32.const 0))
            (func $main (export "main")
                global.get $g
                call $log)
            (start $main)
        )
    "#,
    )?;

    let tags: Vec<_> = module.fields().iter().map(|f| f.tag()).collect();
    assert_eq!(
        tags,
        vec![
            ModuleFieldTag::FuncType,
            ModuleFieldTag::FuncType,
            ModuleFieldTag::Import,
            ModuleFieldTag::Func,
            ModuleFieldTag::Memory,
            ModuleFieldTag::Global,
            ModuleFieldTag::Export,
            ModuleFieldTag::Start,
        ]
    );
    assert_eq!(module.start(), Some(&Var::index(1)));
    Ok(())
}

#[test]
fn test_func_index_space_puts_imports_first() -> Result<()> {
    let module = read_wat(
        r#"
        (module
            (import "env" "a" (func $a))
            (import "env" "b" (func $b))
            (func $local)
        )
    "#,
    )?;
    assert_eq!(module.num_func_imports(), 2);
    assert_eq!(module.func_index(&Var::name("$local")), Some(2));
    assert_eq!(module.func_index(&Var::name("$b")), Some(1));
    Ok(())
}

#[test]
fn test_structured_control_is_nested() -> Result<()> {
    let module = read_wat(
        r#"
        (module
            (func (param i32) (result i32)
                (block $outer (result i32)
                    (loop $inner
                        local.get 0
                        br_if $inner)
                    local.get 0
                    (if (result i32)
                        (then i32.const 1)
                        (else i32.const 2))))
        )
    "#,
    )?;
    let func = module.func(0).ok_or_else(|| anyhow!("missing func"))?;
    assert_eq!(func.exprs.len(), 1);

    let block = func.exprs[0]
        .as_block()
        .ok_or_else(|| anyhow!("expected block"))?;
    assert_eq!(block.sig, vec![ValueType::I32]);
    let inner_tags: Vec<_> = block.exprs.iter().map(|e| e.tag()).collect();
    assert_eq!(inner_tags, vec![ExprTag::Loop, ExprTag::GetLocal, ExprTag::If]);

    let depths: Vec<_> = func.exprs.tree_iter().map(|(depth, _)| depth).collect();
    assert_eq!(depths.iter().max(), Some(&2));

    // br_if targets the loop by relative depth
    let lp = block.exprs[0]
        .as_loop()
        .ok_or_else(|| anyhow!("expected loop"))?;
    assert_eq!(lp.exprs[1].var(), Some(&Var::index(0)));
    Ok(())
}

#[test]
fn test_else_if_chain() -> Result<()> {
    let module = read_wat(
        r#"
        (module
            (func (param i32) (result i32)
                local.get 0
                (if (result i32)
                    (then i32.const 10)
                    (else
                        local.get 0
                        (if (result i32)
                            (then i32.const 20)
                            (else i32.const 30))))))
    "#,
    )?;
    let func = module.func(0).ok_or_else(|| anyhow!("missing func"))?;
    let outer = func.exprs[1].as_if().ok_or_else(|| anyhow!("expected if"))?;
    let false_exprs = outer
        .false_exprs
        .as_ref()
        .ok_or_else(|| anyhow!("expected else"))?;
    assert_eq!(false_exprs.len(), 2);
    let inner = false_exprs[1].as_if().ok_or_else(|| anyhow!("expected nested if"))?;
    assert!(inner.false_exprs.is_some());
    Ok(())
}

#[test]
fn test_br_table_targets() -> Result<()> {
    let module = read_wat(
        r#"
        (module
            (func (param i32)
                (block (block
                    local.get 0
                    br_table 0 1 0)))
        )
    "#,
    )?;
    let func = module.func(0).ok_or_else(|| anyhow!("missing func"))?;
    let table = func
        .exprs
        .tree_iter()
        .find_map(|(_, e)| e.as_br_table())
        .ok_or_else(|| anyhow!("expected br_table"))?;
    assert_eq!(table.targets, vec![Var::index(0), Var::index(1)]);
    assert_eq!(table.default_target, Var::index(0));
    Ok(())
}

#[test]
fn test_loads_and_stores_keep_immediates() -> Result<()> {
    let module = read_wat(
        r#"
        (module
            (memory 1)
            (func (param i32)
                local.get 0
                local.get 0
                i32.load16_u offset=8 align=2
                i32.store offset=4)
        )
    "#,
    )?;
    let func = module.func(0).ok_or_else(|| anyhow!("missing func"))?;
    let load = match &func.exprs[2].kind {
        wasir::ExprKind::Load(load) => *load,
        other => anyhow::bail!("expected load, got {:?}", other),
    };
    assert_eq!(load.opcode, Opcode::I32Load16U);
    assert_eq!(load.offset, 8);
    assert_eq!(load.align, 2);
    assert!(func.exprs[3].is(ExprTag::Store));
    Ok(())
}

#[test]
fn test_try_catch_and_tags() -> Result<()> {
    let module = read_wat(
        r#"
        (module
            (tag $e (param i32))
            (func $f (result i32)
                try (result i32)
                    i32.const 7
                    throw $e
                catch $e
                catch_all
                    i32.const 0
                end)
        )
    "#,
    )?;
    assert_eq!(module.num_excepts(), 1);
    assert_eq!(module.except(0).map(|e| e.sig.clone()), Some(vec![ValueType::I32]));

    let func = module.func(0).ok_or_else(|| anyhow!("missing func"))?;
    let try_expr = func.exprs[0].as_try().ok_or_else(|| anyhow!("expected try"))?;
    assert_eq!(try_expr.catches.len(), 2);
    assert!(!try_expr.catches[0].is_catch_all());
    assert!(try_expr.catch_all().is_some());
    assert!(try_expr.block.exprs[1].is(ExprTag::Throw));
    Ok(())
}

#[test]
fn test_exceptions_can_be_disabled() -> Result<()> {
    let wasm = wat::parse_str("(module (tag (param i32)))")?;
    let options = ReadOptions {
        exceptions: false,
        ..ReadOptions::default()
    };
    assert!(read_binary(&wasm, &options).is_err());
    Ok(())
}

#[test]
fn test_segments() -> Result<()> {
    let module = read_wat(
        r#"
        (module
            (table 2 funcref)
            (memory 1)
            (func $a)
            (func $b)
            (elem (i32.const 0) $a $b)
            (data (i32.const 16) "Hello")
        )
    "#,
    )?;
    let elem = module.elem_segment(0).ok_or_else(|| anyhow!("missing elem"))?;
    assert_eq!(elem.vars, vec![Var::index(0), Var::index(1)]);
    assert_eq!(elem.offset.len(), 1);
    let data = module.data_segment(0).ok_or_else(|| anyhow!("missing data"))?;
    assert_eq!(data.data, b"Hello");
    assert_eq!(data.memory_var, Var::index(0));
    Ok(())
}

#[test]
fn test_exports_resolve_by_name() -> Result<()> {
    let module = read_wat(
        r#"
        (module
            (func (export "first") (result i32) i32.const 1)
            (func (export "second") (result i32) i32.const 2)
            (memory (export "mem") 1)
        )
    "#,
    )?;
    let second = module.get_export("second").ok_or_else(|| anyhow!("missing export"))?;
    assert_eq!(second.kind, ExternalKind::Func);
    assert_eq!(second.var, Var::index(1));
    assert_eq!(module.get_export("mem").map(|e| e.kind), Some(ExternalKind::Memory));
    assert!(module.get_export("third").is_none());
    Ok(())
}

#[test]
fn test_signatures_are_interned() -> Result<()> {
    let mut module = read_wat(
        r#"
        (module
            (func (param i32) (result i32) local.get 0)
            (func (param i32) (result i32) local.get 0)
        )
    "#,
    )?;
    // wat already shares the type; asking again must not add one
    assert_eq!(module.num_func_types(), 1);
    let func_sig = module.func(0).map(|f| f.decl.sig.clone()).ok_or_else(|| anyhow!("missing func"))?;
    let index = module.append_implicit_func_type(wasir::ir::Location::Unknown, func_sig);
    assert_eq!(index, 0);
    assert_eq!(module.num_func_types(), 1);
    Ok(())
}

#[test]
fn test_read_module_accepts_text_and_binary() -> Result<()> {
    let text = b"(module (func))";
    let binary = wat::parse_bytes(text)?.into_owned();
    let from_text = read_module(text, &ReadOptions::default())?;
    let from_binary = read_module(&binary, &ReadOptions::default())?;
    assert_eq!(from_text.num_funcs(), from_binary.num_funcs());
    Ok(())
}

#[test]
fn test_deeply_nested_blocks() -> Result<()> {
    const DEPTH: usize = 10_000;
    let mut wat = String::from("(module (func ");
    for _ in 0..DEPTH {
        wat.push_str("block ");
    }
    for _ in 0..DEPTH {
        wat.push_str("end ");
    }
    wat.push_str("))");

    let module = read_wat(&wat)?;
    let func = module.func(0).ok_or_else(|| anyhow!("missing func"))?;
    assert_eq!(func.exprs.tree_len(), DEPTH);
    drop(module);
    Ok(())
}

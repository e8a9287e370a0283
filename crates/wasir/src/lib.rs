//! wasir — in-memory IR for WebAssembly modules and test scripts.
//!
//! The [`ir`] module holds the module representation: instruction trees,
//! fields, per-kind index spaces and name bindings. [`reader`] fills it from a
//! binary (or from text, via `wat`), [`script`] models test scripts built from
//! such modules, and [`dump`] renders a structural summary.

pub mod dump;
pub mod ir;
pub mod reader;
pub mod script;

// Re-export key types for convenience
pub use anyhow::{Context, Result};
pub use ir::{Expr, ExprKind, ExprList, Module, ModuleField, ModuleFieldKind, Var};
pub use reader::{read_binary, read_text};
pub use script::{Action, Command, CommandKind, Script, ScriptModule};

/// Configuration for the binary reader.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Read the `name` custom section and bind `$`-prefixed names for
    /// functions, parameters and locals.
    pub read_debug_names: bool,
    /// Accept exception-handling instructions and tags.
    pub exceptions: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            read_debug_names: true,
            exceptions: true,
        }
    }
}

/// Read a module from either binary or text, depending on the magic bytes.
///
/// # Example
/// ```no_run
/// use wasir::{read_module, ReadOptions};
///
/// let bytes = std::fs::read("input.wasm").unwrap();
/// let module = read_module(&bytes, &ReadOptions::default()).unwrap();
/// print!("{}", wasir::dump::summarize(&module));
/// ```
pub fn read_module(bytes: &[u8], options: &ReadOptions) -> Result<Module> {
    if bytes.starts_with(b"\0asm") {
        read_binary(bytes, options).context("failed to read WebAssembly binary")
    } else {
        read_text(bytes, options).context("failed to read WebAssembly text")
    }
}

//! Test-script model: modules, actions and assertions in script order.
//!
//! Modules that a script expects to be malformed or invalid are kept as raw
//! bytes ([`ScriptModule::Undecoded`]). Building a script never fails because
//! of them; errors only surface when a runner calls [`ScriptModule::decode`].

use crate::ir::{Binding, BindingTable, Const, Index, Location, Module, Var};
use crate::reader::{read_binary, read_text};
use crate::ReadOptions;
use anyhow::{Context, Result};
use std::fmt;

// ─── Script modules ─────────────────────────────────────────────────────────

/// How the bytes of an undecoded module are to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleSource {
    /// `(module binary "...")`
    Binary,
    /// `(module quote "...")`
    Quoted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndecodedModule {
    pub loc: Location,
    pub name: Option<String>,
    pub source: ModuleSource,
    pub data: Vec<u8>,
}

/// A module as written in a script: either already built, or raw bytes whose
/// decoding is left to [`decode`](Self::decode).
#[derive(Debug)]
pub enum ScriptModule {
    Decoded(Box<Module>),
    Undecoded(UndecodedModule),
}

impl ScriptModule {
    pub fn binary(loc: Location, name: Option<String>, data: Vec<u8>) -> Self {
        ScriptModule::Undecoded(UndecodedModule {
            loc,
            name,
            source: ModuleSource::Binary,
            data,
        })
    }

    pub fn quoted(loc: Location, name: Option<String>, data: Vec<u8>) -> Self {
        ScriptModule::Undecoded(UndecodedModule {
            loc,
            name,
            source: ModuleSource::Quoted,
            data,
        })
    }

    pub fn loc(&self) -> Location {
        match self {
            ScriptModule::Decoded(module) => module.loc,
            ScriptModule::Undecoded(raw) => raw.loc,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            ScriptModule::Decoded(module) => module.name.as_deref(),
            ScriptModule::Undecoded(raw) => raw.name.as_deref(),
        }
    }

    pub fn is_decoded(&self) -> bool {
        matches!(self, ScriptModule::Decoded(_))
    }

    /// Turn the script module into a [`Module`]. Binary bytes go through the
    /// binary reader, quoted text through `wat` first; the script's name and
    /// location are carried over.
    pub fn decode(self, options: &ReadOptions) -> Result<Module> {
        let raw = match self {
            ScriptModule::Decoded(module) => return Ok(*module),
            ScriptModule::Undecoded(raw) => raw,
        };
        let mut module = match raw.source {
            ModuleSource::Binary => read_binary(&raw.data, options),
            ModuleSource::Quoted => read_text(&raw.data, options),
        }
        .with_context(|| format!("decoding module at {}", raw.loc))?;
        module.loc = raw.loc;
        if raw.name.is_some() {
            module.name = raw.name;
        }
        Ok(module)
    }
}

impl From<Module> for ScriptModule {
    fn from(module: Module) -> Self {
        ScriptModule::Decoded(Box::new(module))
    }
}

// ─── Actions ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    Invoke { args: Vec<Const> },
    Get,
}

/// Invoke an exported function or read an exported global.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub loc: Location,
    /// Module to act on; `None` means the most recently defined module.
    pub module_var: Option<Var>,
    /// Export name.
    pub name: String,
    pub kind: ActionKind,
}

impl Action {
    pub fn invoke(module_var: Option<Var>, name: impl Into<String>, args: Vec<Const>) -> Self {
        Self {
            loc: Location::Unknown,
            module_var,
            name: name.into(),
            kind: ActionKind::Invoke { args },
        }
    }

    pub fn get(module_var: Option<Var>, name: impl Into<String>) -> Self {
        Self {
            loc: Location::Unknown,
            module_var,
            name: name.into(),
            kind: ActionKind::Get,
        }
    }

    pub fn with_loc(mut self, loc: Location) -> Self {
        self.loc = loc;
        self
    }
}

// ─── Commands ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Module,
    Action,
    Register,
    AssertMalformed,
    AssertInvalid,
    AssertInvalidNonBinary,
    AssertUnlinkable,
    AssertUninstantiable,
    AssertReturn,
    AssertReturnCanonicalNan,
    AssertReturnArithmeticNan,
    AssertTrap,
    AssertExhaustion,
}

impl CommandKind {
    pub const ALL: [CommandKind; 13] = [
        CommandKind::Module,
        CommandKind::Action,
        CommandKind::Register,
        CommandKind::AssertMalformed,
        CommandKind::AssertInvalid,
        CommandKind::AssertInvalidNonBinary,
        CommandKind::AssertUnlinkable,
        CommandKind::AssertUninstantiable,
        CommandKind::AssertReturn,
        CommandKind::AssertReturnCanonicalNan,
        CommandKind::AssertReturnArithmeticNan,
        CommandKind::AssertTrap,
        CommandKind::AssertExhaustion,
    ];

    /// Script keyword.
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Module => "module",
            CommandKind::Action => "action",
            CommandKind::Register => "register",
            CommandKind::AssertMalformed => "assert_malformed",
            CommandKind::AssertInvalid => "assert_invalid",
            CommandKind::AssertInvalidNonBinary => "assert_invalid_non_binary",
            CommandKind::AssertUnlinkable => "assert_unlinkable",
            CommandKind::AssertUninstantiable => "assert_uninstantiable",
            CommandKind::AssertReturn => "assert_return",
            CommandKind::AssertReturnCanonicalNan => "assert_return_canonical_nan",
            CommandKind::AssertReturnArithmeticNan => "assert_return_arithmetic_nan",
            CommandKind::AssertTrap => "assert_trap",
            CommandKind::AssertExhaustion => "assert_exhaustion",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One step of a script.
#[derive(Debug)]
pub enum Command {
    Module(Box<Module>),
    Action(Action),
    /// Make a module's exports importable under `module_name`.
    Register {
        module_name: String,
        var: Option<Var>,
    },
    AssertMalformed {
        module: ScriptModule,
        text: String,
    },
    AssertInvalid {
        module: ScriptModule,
        text: String,
    },
    /// Invalid in the text format only; binary readers skip it.
    AssertInvalidNonBinary {
        module: ScriptModule,
        text: String,
    },
    AssertUnlinkable {
        module: ScriptModule,
        text: String,
    },
    AssertUninstantiable {
        module: ScriptModule,
        text: String,
    },
    AssertReturn {
        action: Action,
        expected: Vec<Const>,
    },
    AssertReturnCanonicalNan {
        action: Action,
    },
    AssertReturnArithmeticNan {
        action: Action,
    },
    AssertTrap {
        action: Action,
        text: String,
    },
    AssertExhaustion {
        action: Action,
        text: String,
    },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Module(_) => CommandKind::Module,
            Command::Action(_) => CommandKind::Action,
            Command::Register { .. } => CommandKind::Register,
            Command::AssertMalformed { .. } => CommandKind::AssertMalformed,
            Command::AssertInvalid { .. } => CommandKind::AssertInvalid,
            Command::AssertInvalidNonBinary { .. } => CommandKind::AssertInvalidNonBinary,
            Command::AssertUnlinkable { .. } => CommandKind::AssertUnlinkable,
            Command::AssertUninstantiable { .. } => CommandKind::AssertUninstantiable,
            Command::AssertReturn { .. } => CommandKind::AssertReturn,
            Command::AssertReturnCanonicalNan { .. } => CommandKind::AssertReturnCanonicalNan,
            Command::AssertReturnArithmeticNan { .. } => CommandKind::AssertReturnArithmeticNan,
            Command::AssertTrap { .. } => CommandKind::AssertTrap,
            Command::AssertExhaustion { .. } => CommandKind::AssertExhaustion,
        }
    }

    pub fn action(&self) -> Option<&Action> {
        match self {
            Command::Action(action)
            | Command::AssertReturn { action, .. }
            | Command::AssertReturnCanonicalNan { action }
            | Command::AssertReturnArithmeticNan { action }
            | Command::AssertTrap { action, .. }
            | Command::AssertExhaustion { action, .. } => Some(action),
            _ => None,
        }
    }

    pub fn script_module(&self) -> Option<&ScriptModule> {
        match self {
            Command::AssertMalformed { module, .. }
            | Command::AssertInvalid { module, .. }
            | Command::AssertInvalidNonBinary { module, .. }
            | Command::AssertUnlinkable { module, .. }
            | Command::AssertUninstantiable { module, .. } => Some(module),
            _ => None,
        }
    }

    /// Compare the results of this command's action against its expectation.
    ///
    /// Exact returns compare raw bits (so NaN payloads must match); the NaN
    /// assertions require at least one result, each of the right NaN class. Returns
    /// `None` for commands that do not assert on a return value.
    pub fn check_return(&self, actual: &[Const]) -> Option<bool> {
        match self {
            Command::AssertReturn { expected, .. } => Some(
                expected.len() == actual.len()
                    && expected.iter().zip(actual).all(|(e, a)| e.value == a.value),
            ),
            Command::AssertReturnCanonicalNan { .. } => {
                Some(!actual.is_empty() && actual.iter().all(Const::is_canonical_nan))
            }
            Command::AssertReturnArithmeticNan { .. } => {
                Some(!actual.is_empty() && actual.iter().all(Const::is_arithmetic_nan))
            }
            _ => None,
        }
    }
}

// ─── Script ─────────────────────────────────────────────────────────────────

/// Commands in script order, plus the names of the modules they define.
#[derive(Debug, Default)]
pub struct Script {
    commands: Vec<Command>,
    module_bindings: BindingTable,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command. A named module command also binds its name to the
    /// command's position; the first module with a given name keeps it.
    pub fn append_command(&mut self, command: Command) {
        if let Command::Module(module) = &command {
            if let Some(name) = &module.name {
                let index = self.commands.len() as Index;
                self.module_bindings
                    .insert(name.as_str(), Binding::new(module.loc, index));
            }
        }
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn module_bindings(&self) -> &BindingTable {
        &self.module_bindings
    }

    pub fn first_module(&self) -> Option<&Module> {
        self.commands.iter().find_map(defined_module)
    }

    pub fn last_module(&self) -> Option<&Module> {
        self.commands.iter().rev().find_map(defined_module)
    }

    /// Resolve a module var: names through the module bindings, indices as
    /// command positions. The command found must define a module.
    pub fn get_module(&self, var: &Var) -> Option<&Module> {
        let index = self.module_bindings.find_index(var)?;
        self.commands.get(index as usize).and_then(defined_module)
    }

    /// The module an action targets: its explicit var, or else the most
    /// recently defined module.
    pub fn action_module(&self, action: &Action) -> Option<&Module> {
        match &action.module_var {
            Some(var) => self.get_module(var),
            None => self.last_module(),
        }
    }
}

fn defined_module(command: &Command) -> Option<&Module> {
    match command {
        Command::Module(module) => Some(&**module),
        _ => None,
    }
}

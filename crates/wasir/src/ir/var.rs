//! Source locations and symbolic references.
//!
//! A [`Var`] names an entity in one of the module's index spaces (function,
//! global, table, memory, label, exception, type). Producers usually emit
//! names (`$foo`); a later resolution pass rewrites them into indices. The IR
//! itself never checks that either form actually refers to anything.

use std::fmt;

/// Position in one of the module's index spaces.
pub type Index = u32;

/// Reserved index meaning "absent". A [`Catch`](super::Catch) whose var holds
/// this value is a catch-all handler.
pub const INVALID_INDEX: Index = Index::MAX;

/// Where a node came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Location {
    /// Synthesized node, or the producer did not track positions.
    #[default]
    Unknown,
    /// A span on a single line of a text source (1-based line and columns).
    Text {
        line: u32,
        first_column: u32,
        last_column: u32,
    },
    /// Byte offset into a binary module.
    Binary { offset: usize },
}

impl Location {
    pub fn text(line: u32, first_column: u32, last_column: u32) -> Self {
        Location::Text {
            line,
            first_column,
            last_column,
        }
    }

    pub fn binary(offset: usize) -> Self {
        Location::Binary { offset }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Unknown => write!(f, "<unknown>"),
            Location::Text {
                line,
                first_column,
                last_column,
            } => write!(f, "{}:{}-{}", line, first_column, last_column),
            Location::Binary { offset } => write!(f, "@{:#x}", offset),
        }
    }
}

/// Active payload of a [`Var`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VarKind {
    Index(Index),
    Name(String),
}

/// Reference to a namespaced entity: either a resolved index or a name that
/// still has to be looked up in a binding table.
#[derive(Debug, Clone)]
pub struct Var {
    pub loc: Location,
    kind: VarKind,
}

impl Var {
    pub fn index(index: Index) -> Self {
        Self {
            loc: Location::Unknown,
            kind: VarKind::Index(index),
        }
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self {
            loc: Location::Unknown,
            kind: VarKind::Name(name.into()),
        }
    }

    pub fn with_loc(mut self, loc: Location) -> Self {
        self.loc = loc;
        self
    }

    pub fn kind(&self) -> &VarKind {
        &self.kind
    }

    pub fn is_index(&self) -> bool {
        matches!(self.kind, VarKind::Index(_))
    }

    pub fn is_name(&self) -> bool {
        matches!(self.kind, VarKind::Name(_))
    }

    pub fn as_index(&self) -> Option<Index> {
        match self.kind {
            VarKind::Index(index) => Some(index),
            VarKind::Name(_) => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match &self.kind {
            VarKind::Name(name) => Some(name),
            VarKind::Index(_) => None,
        }
    }

    /// Replace the payload with an index, dropping any previous name.
    /// Resolvers call this once a name has been found in a binding table.
    pub fn set_index(&mut self, index: Index) {
        self.kind = VarKind::Index(index);
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.kind = VarKind::Name(name.into());
    }
}

impl Default for Var {
    fn default() -> Self {
        Var::index(INVALID_INDEX)
    }
}

/// Vars compare by payload only; the location is diagnostic metadata.
impl PartialEq for Var {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for Var {}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            VarKind::Index(index) => write!(f, "{}", index),
            VarKind::Name(name) => write!(f, "{}", name),
        }
    }
}

impl From<Index> for Var {
    fn from(index: Index) -> Self {
        Var::index(index)
    }
}

impl From<&str> for Var {
    fn from(name: &str) -> Self {
        Var::name(name)
    }
}

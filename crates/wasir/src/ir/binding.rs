//! Name → index binding tables.
//!
//! Each namespace of a module (and the parameters/locals of each function, and
//! the module aliases of a script) has one table. Tables are filled while
//! fields are appended; nothing here checks that the bound index is in range.

use super::types::ValueType;
use super::var::{Index, Location, Var, VarKind};
use std::collections::HashMap;

/// Where a name was declared and the index it stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub loc: Location,
    pub index: Index,
}

impl Binding {
    pub fn new(loc: Location, index: Index) -> Self {
        Self { loc, index }
    }
}

/// A single namespace's name table.
///
/// Policy: the first definition of a name wins. Later definitions of the same
/// name are kept in [`duplicates`](Self::duplicates) so a validator can report
/// them; they never shadow the original.
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    entries: HashMap<String, Binding>,
    duplicates: Vec<(String, Binding)>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`. Returns the already-existing binding if the name was taken,
    /// in which case the new binding is only recorded as a duplicate.
    pub fn insert(&mut self, name: impl Into<String>, binding: Binding) -> Option<Binding> {
        let name = name.into();
        match self.entries.get(&name) {
            Some(existing) => {
                let existing = *existing;
                self.duplicates.push((name, binding));
                Some(existing)
            }
            None => {
                self.entries.insert(name, binding);
                None
            }
        }
    }

    pub fn find(&self, name: &str) -> Option<&Binding> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Turn a var into an index: index vars pass through unchanged, names are
    /// looked up. Range checks are the caller's business.
    pub fn find_index(&self, var: &Var) -> Option<Index> {
        match var.kind() {
            VarKind::Index(index) => Some(*index),
            VarKind::Name(name) => self.find(name).map(|b| b.index),
        }
    }

    pub fn duplicates(&self) -> &[(String, Binding)] {
        &self.duplicates
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Binding)> {
        self.entries.iter().map(|(name, b)| (name.as_str(), b))
    }
}

/// Build an index → name table for a list of typed slots (params or locals).
///
/// The result has one entry per type; slots with no bound name are empty
/// strings, and bindings pointing past the end are ignored.
pub fn make_type_binding_reverse_mapping(
    types: &[ValueType],
    bindings: &BindingTable,
) -> Vec<String> {
    let mut names = vec![String::new(); types.len()];
    for (name, binding) in bindings.iter() {
        if let Some(slot) = names.get_mut(binding.index as usize) {
            *slot = name.to_string();
        }
    }
    names
}

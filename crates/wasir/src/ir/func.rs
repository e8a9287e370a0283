//! Function signatures, type declarations and function definitions.

use super::binding::{make_type_binding_reverse_mapping, BindingTable};
use super::expr::ExprList;
use super::types::{TypeVector, ValueType};
use super::var::{Index, Var, VarKind};
use std::fmt;

/// Parameter and result types of a function. Compared by value, which is what
/// signature interning relies on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FuncSignature {
    pub param_types: TypeVector,
    pub result_types: TypeVector,
}

impl FuncSignature {
    pub fn new(param_types: TypeVector, result_types: TypeVector) -> Self {
        Self {
            param_types,
            result_types,
        }
    }

    pub fn num_params(&self) -> Index {
        self.param_types.len() as Index
    }

    pub fn num_results(&self) -> Index {
        self.result_types.len() as Index
    }

    pub fn param_type(&self, index: Index) -> Option<ValueType> {
        self.param_types.get(index as usize).copied()
    }

    pub fn result_type(&self, index: Index) -> Option<ValueType> {
        self.result_types.get(index as usize).copied()
    }
}

impl fmt::Display for FuncSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(param")?;
        for ty in &self.param_types {
            write!(f, " {}", ty)?;
        }
        write!(f, ") (result")?;
        for ty in &self.result_types {
            write!(f, " {}", ty)?;
        }
        write!(f, ")")
    }
}

/// A `(type ...)` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FuncType {
    pub name: Option<String>,
    pub sig: FuncSignature,
}

impl FuncType {
    pub fn new(sig: FuncSignature) -> Self {
        Self { name: None, sig }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// The type part of a function or import declaration.
///
/// `type_var` is set when the declaration names a module type (`(type $t)`);
/// `sig` holds the inline signature, or the referenced type's signature once
/// a resolver has copied it over. Accessors always read `sig`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FuncDeclaration {
    pub type_var: Option<Var>,
    pub sig: FuncSignature,
}

impl FuncDeclaration {
    pub fn inline(sig: FuncSignature) -> Self {
        Self {
            type_var: None,
            sig,
        }
    }

    pub fn typed(type_var: Var, sig: FuncSignature) -> Self {
        Self {
            type_var: Some(type_var),
            sig,
        }
    }

    pub fn has_func_type(&self) -> bool {
        self.type_var.is_some()
    }

    pub fn num_params(&self) -> Index {
        self.sig.num_params()
    }

    pub fn num_results(&self) -> Index {
        self.sig.num_results()
    }

    pub fn param_type(&self, index: Index) -> Option<ValueType> {
        self.sig.param_type(index)
    }

    pub fn result_type(&self, index: Index) -> Option<ValueType> {
        self.sig.result_type(index)
    }
}

/// A function. Imported functions use the same type; only `name` and `decl`
/// carry information for them.
#[derive(Debug, Default)]
pub struct Func {
    pub name: Option<String>,
    pub decl: FuncDeclaration,
    /// Declared locals, excluding parameters.
    pub local_types: TypeVector,
    pub param_bindings: BindingTable,
    /// Indices are relative to the first local, not to the first parameter.
    pub local_bindings: BindingTable,
    pub exprs: ExprList,
}

impl Func {
    pub fn new(decl: FuncDeclaration) -> Self {
        Self {
            decl,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn num_params(&self) -> Index {
        self.decl.num_params()
    }

    pub fn num_results(&self) -> Index {
        self.decl.num_results()
    }

    pub fn num_locals(&self) -> Index {
        self.local_types.len() as Index
    }

    pub fn num_params_and_locals(&self) -> Index {
        self.num_params() + self.num_locals()
    }

    pub fn param_type(&self, index: Index) -> Option<ValueType> {
        self.decl.param_type(index)
    }

    pub fn result_type(&self, index: Index) -> Option<ValueType> {
        self.decl.result_type(index)
    }

    /// Type of a slot in the combined parameter + local index space.
    pub fn local_type(&self, index: Index) -> Option<ValueType> {
        let num_params = self.num_params();
        if index < num_params {
            self.param_type(index)
        } else {
            self.local_types.get((index - num_params) as usize).copied()
        }
    }

    /// Resolve a `local.get`/`local.set` operand to its slot in the combined
    /// index space: parameter names first, then local names (offset by the
    /// parameter count). Unknown names and out-of-range indices are `None`.
    pub fn local_index(&self, var: &Var) -> Option<Index> {
        match var.kind() {
            VarKind::Index(index) => (*index < self.num_params_and_locals()).then_some(*index),
            VarKind::Name(name) => {
                if let Some(binding) = self.param_bindings.find(name) {
                    return Some(binding.index);
                }
                self.local_bindings
                    .find(name)
                    .map(|binding| self.num_params() + binding.index)
            }
        }
    }

    /// One name per parameter and local slot (empty when unnamed).
    pub fn param_and_local_names(&self) -> Vec<String> {
        let mut names =
            make_type_binding_reverse_mapping(&self.decl.sig.param_types, &self.param_bindings);
        names.extend(make_type_binding_reverse_mapping(
            &self.local_types,
            &self.local_bindings,
        ));
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::binding::Binding;
    use crate::ir::var::Location;

    fn sample_func() -> Func {
        let sig = FuncSignature::new(vec![ValueType::I32, ValueType::I64], vec![ValueType::F32]);
        let mut func = Func::new(FuncDeclaration::inline(sig)).with_name("$f");
        func.local_types = vec![ValueType::F64, ValueType::I32];
        func.param_bindings
            .insert("$a", Binding::new(Location::Unknown, 0));
        func.param_bindings
            .insert("$b", Binding::new(Location::Unknown, 1));
        func.local_bindings
            .insert("$tmp", Binding::new(Location::Unknown, 1));
        func
    }

    #[test]
    fn test_signature_equality_is_structural() {
        let a = FuncSignature::new(vec![ValueType::I32], vec![ValueType::I32]);
        let b = FuncSignature::new(vec![ValueType::I32], vec![ValueType::I32]);
        let c = FuncSignature::new(vec![ValueType::I32], vec![ValueType::I64]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_signature_accessors() {
        let sig = FuncSignature::new(vec![ValueType::I32, ValueType::F64], vec![]);
        assert_eq!(sig.num_params(), 2);
        assert_eq!(sig.num_results(), 0);
        assert_eq!(sig.param_type(1), Some(ValueType::F64));
        assert_eq!(sig.param_type(2), None);
        assert_eq!(sig.result_type(0), None);
    }

    #[test]
    fn test_signature_display() {
        let sig = FuncSignature::new(vec![ValueType::I32, ValueType::I32], vec![ValueType::I64]);
        assert_eq!(sig.to_string(), "(param i32 i32) (result i64)");
    }

    #[test]
    fn test_declaration_uniform_accessors() {
        let sig = FuncSignature::new(vec![ValueType::F32], vec![ValueType::F32]);
        let inline = FuncDeclaration::inline(sig.clone());
        let typed = FuncDeclaration::typed(Var::name("$t"), sig);
        assert!(!inline.has_func_type());
        assert!(typed.has_func_type());
        assert_eq!(inline.num_params(), typed.num_params());
        assert_eq!(inline.result_type(0), typed.result_type(0));
    }

    #[test]
    fn test_func_counts() {
        let func = sample_func();
        assert_eq!(func.num_params(), 2);
        assert_eq!(func.num_locals(), 2);
        assert_eq!(func.num_params_and_locals(), 4);
        assert_eq!(func.num_results(), 1);
    }

    #[test]
    fn test_local_type_spans_params_and_locals() {
        let func = sample_func();
        assert_eq!(func.local_type(0), Some(ValueType::I32));
        assert_eq!(func.local_type(2), Some(ValueType::F64));
        assert_eq!(func.local_type(3), Some(ValueType::I32));
        assert_eq!(func.local_type(4), None);
    }

    #[test]
    fn test_local_index_by_name() {
        let func = sample_func();
        assert_eq!(func.local_index(&Var::name("$b")), Some(1));
        // locals are offset by the parameter count
        assert_eq!(func.local_index(&Var::name("$tmp")), Some(3));
        assert_eq!(func.local_index(&Var::name("$nope")), None);
    }

    #[test]
    fn test_local_index_by_index_is_range_checked() {
        let func = sample_func();
        assert_eq!(func.local_index(&Var::index(3)), Some(3));
        assert_eq!(func.local_index(&Var::index(4)), None);
    }

    #[test]
    fn test_param_and_local_names() {
        let func = sample_func();
        assert_eq!(
            func.param_and_local_names(),
            vec![
                "$a".to_string(),
                "$b".to_string(),
                String::new(),
                "$tmp".to_string()
            ]
        );
    }
}

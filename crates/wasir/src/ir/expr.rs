//! Instruction trees.
//!
//! A function body (and every block, loop, if-branch, try body and catch
//! handler) is an [`ExprList`]: an owned, ordered sequence of [`Expr`] nodes.
//! Structured nodes own their nested sequences, so a function body is a tree.
//!
//! Trees come from untrusted input and can be arbitrarily deep. Nothing in
//! this module recurses on the native call stack:
//! - [`ExprList`]'s `Drop` moves nested nodes onto a heap work-list and frees
//!   them one at a time.
//! - [`ExprList::tree_iter`] walks the tree with an explicit stack.
//!
//! - [`ExprList`]'s `Debug` prints only its length and top-level tags, so
//!   formatting a node never descends into nested sequences.

use super::opcode::Opcode;
use super::types::{Const, TypeVector};
use super::var::{Location, Var, INVALID_INDEX};
use std::fmt;
use std::ops::{Deref, DerefMut};

/// Tag of an [`ExprKind`] variant, for O(1) exact kind checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExprTag {
    Binary,
    Block,
    Br,
    BrIf,
    BrTable,
    Call,
    CallIndirect,
    Compare,
    Const,
    Convert,
    CurrentMemory,
    Drop,
    GetGlobal,
    GetLocal,
    GrowMemory,
    If,
    Load,
    Loop,
    Nop,
    Rethrow,
    Return,
    Select,
    SetGlobal,
    SetLocal,
    Store,
    TeeLocal,
    Throw,
    Try,
    Unary,
    Unreachable,
}

/// A labelled sequence with a declared result signature.
#[derive(Debug, Default)]
pub struct Block {
    pub label: Option<String>,
    pub sig: TypeVector,
    pub exprs: ExprList,
}

impl Block {
    pub fn new(exprs: ExprList) -> Self {
        Self {
            label: None,
            sig: TypeVector::new(),
            exprs,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_sig(mut self, sig: TypeVector) -> Self {
        self.sig = sig;
        self
    }
}

/// `if` with its true branch and optional false branch.
///
/// An else-if chain is a false branch consisting of exactly one `If` node;
/// see [`IfExpr::else_if`].
#[derive(Debug)]
pub struct IfExpr {
    pub true_block: Block,
    pub false_exprs: Option<ExprList>,
}

impl IfExpr {
    pub fn new(true_block: Block, false_exprs: Option<ExprList>) -> Self {
        Self {
            true_block,
            false_exprs,
        }
    }

    /// The next `if` of an else-if chain, when the false branch is exactly one.
    pub fn else_if(&self) -> Option<&IfExpr> {
        match self.false_exprs.as_deref() {
            Some([only]) => only.as_if(),
            _ => None,
        }
    }
}

/// One exception handler of a `try`.
#[derive(Debug)]
pub struct Catch {
    pub loc: Location,
    /// The exception being caught, or the invalid index for catch-all.
    pub var: Var,
    pub exprs: ExprList,
}

impl Catch {
    pub fn new(var: Var, exprs: ExprList) -> Self {
        Self {
            loc: Location::Unknown,
            var,
            exprs,
        }
    }

    pub fn catch_all(exprs: ExprList) -> Self {
        Self::new(Var::index(INVALID_INDEX), exprs)
    }

    pub fn with_loc(mut self, loc: Location) -> Self {
        self.loc = loc;
        self
    }

    /// True only for the sentinel *index*. An unresolved name is never a
    /// catch-all, even if resolving it later fails.
    pub fn is_catch_all(&self) -> bool {
        self.var.as_index() == Some(INVALID_INDEX)
    }
}

/// `try` body with its ordered handlers. At most one handler should be a
/// catch-all; that is the producer's responsibility.
#[derive(Debug)]
pub struct TryExpr {
    pub block: Block,
    pub catches: Vec<Catch>,
}

impl TryExpr {
    pub fn new(block: Block) -> Self {
        Self {
            block,
            catches: Vec::new(),
        }
    }

    pub fn catch_all(&self) -> Option<&Catch> {
        self.catches.iter().find(|c| c.is_catch_all())
    }
}

/// `br_table` targets. An empty target list is legal: every index takes the
/// default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrTable {
    pub targets: Vec<Var>,
    pub default_target: Var,
}

/// Immediates of a load or store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadStore {
    pub opcode: Opcode,
    /// Alignment in bytes (a power of two).
    pub align: u32,
    pub offset: u32,
}

/// Node payload, one variant per instruction kind.
#[derive(Debug)]
pub enum ExprKind {
    Binary(Opcode),
    Block(Block),
    Br(Var),
    BrIf(Var),
    BrTable(BrTable),
    Call(Var),
    /// Carries the signature's type var.
    CallIndirect(Var),
    Compare(Opcode),
    Const(Const),
    Convert(Opcode),
    CurrentMemory,
    Drop,
    GetGlobal(Var),
    GetLocal(Var),
    GrowMemory,
    If(IfExpr),
    Load(LoadStore),
    Loop(Block),
    Nop,
    Rethrow(Var),
    Return,
    Select,
    SetGlobal(Var),
    SetLocal(Var),
    Store(LoadStore),
    TeeLocal(Var),
    Throw(Var),
    Try(TryExpr),
    Unary(Opcode),
    Unreachable,
}

/// One instruction.
#[derive(Debug)]
pub struct Expr {
    pub loc: Location,
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self {
            loc: Location::Unknown,
            kind,
        }
    }

    pub fn at(loc: Location, kind: ExprKind) -> Self {
        Self { loc, kind }
    }

    pub fn tag(&self) -> ExprTag {
        match &self.kind {
            ExprKind::Binary(_) => ExprTag::Binary,
            ExprKind::Block(_) => ExprTag::Block,
            ExprKind::Br(_) => ExprTag::Br,
            ExprKind::BrIf(_) => ExprTag::BrIf,
            ExprKind::BrTable(_) => ExprTag::BrTable,
            ExprKind::Call(_) => ExprTag::Call,
            ExprKind::CallIndirect(_) => ExprTag::CallIndirect,
            ExprKind::Compare(_) => ExprTag::Compare,
            ExprKind::Const(_) => ExprTag::Const,
            ExprKind::Convert(_) => ExprTag::Convert,
            ExprKind::CurrentMemory => ExprTag::CurrentMemory,
            ExprKind::Drop => ExprTag::Drop,
            ExprKind::GetGlobal(_) => ExprTag::GetGlobal,
            ExprKind::GetLocal(_) => ExprTag::GetLocal,
            ExprKind::GrowMemory => ExprTag::GrowMemory,
            ExprKind::If(_) => ExprTag::If,
            ExprKind::Load(_) => ExprTag::Load,
            ExprKind::Loop(_) => ExprTag::Loop,
            ExprKind::Nop => ExprTag::Nop,
            ExprKind::Rethrow(_) => ExprTag::Rethrow,
            ExprKind::Return => ExprTag::Return,
            ExprKind::Select => ExprTag::Select,
            ExprKind::SetGlobal(_) => ExprTag::SetGlobal,
            ExprKind::SetLocal(_) => ExprTag::SetLocal,
            ExprKind::Store(_) => ExprTag::Store,
            ExprKind::TeeLocal(_) => ExprTag::TeeLocal,
            ExprKind::Throw(_) => ExprTag::Throw,
            ExprKind::Try(_) => ExprTag::Try,
            ExprKind::Unary(_) => ExprTag::Unary,
            ExprKind::Unreachable => ExprTag::Unreachable,
        }
    }

    pub fn is(&self, tag: ExprTag) -> bool {
        self.tag() == tag
    }

    // ─── Downcasts ──────────────────────────────────────────────────────────

    /// The block of a `block` node (not of a `loop`).
    pub fn as_block(&self) -> Option<&Block> {
        match &self.kind {
            ExprKind::Block(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_loop(&self) -> Option<&Block> {
        match &self.kind {
            ExprKind::Loop(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_if(&self) -> Option<&IfExpr> {
        match &self.kind {
            ExprKind::If(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_try(&self) -> Option<&TryExpr> {
        match &self.kind {
            ExprKind::Try(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_br_table(&self) -> Option<&BrTable> {
        match &self.kind {
            ExprKind::BrTable(t) => Some(t),
            _ => None,
        }
    }

    /// Opcode of an opcode-operand or load/store node.
    pub fn opcode(&self) -> Option<Opcode> {
        match &self.kind {
            ExprKind::Binary(op)
            | ExprKind::Compare(op)
            | ExprKind::Convert(op)
            | ExprKind::Unary(op) => Some(*op),
            ExprKind::Load(ls) | ExprKind::Store(ls) => Some(ls.opcode),
            _ => None,
        }
    }

    /// The single operand of a var-operand node.
    pub fn var(&self) -> Option<&Var> {
        match &self.kind {
            ExprKind::Br(v)
            | ExprKind::BrIf(v)
            | ExprKind::Call(v)
            | ExprKind::CallIndirect(v)
            | ExprKind::GetGlobal(v)
            | ExprKind::GetLocal(v)
            | ExprKind::SetGlobal(v)
            | ExprKind::SetLocal(v)
            | ExprKind::TeeLocal(v)
            | ExprKind::Throw(v)
            | ExprKind::Rethrow(v) => Some(v),
            _ => None,
        }
    }

    // ─── Var traversal ──────────────────────────────────────────────────────

    /// Calls `f` with every var this node references directly (not those in
    /// nested sequences). Handler vars of a `try` count as its own.
    pub fn for_each_var<F: FnMut(&Var)>(&self, mut f: F) {
        match &self.kind {
            ExprKind::BrTable(table) => {
                for target in &table.targets {
                    f(target);
                }
                f(&table.default_target);
            }
            ExprKind::Try(t) => {
                for c in &t.catches {
                    if !c.is_catch_all() {
                        f(&c.var);
                    }
                }
            }
            _ => {
                if let Some(v) = self.var() {
                    f(v);
                }
            }
        }
    }

    /// Mutable counterpart of [`for_each_var`](Self::for_each_var), for
    /// resolvers rewriting names into indices.
    pub fn for_each_var_mut<F: FnMut(&mut Var)>(&mut self, mut f: F) {
        match &mut self.kind {
            ExprKind::BrTable(table) => {
                for target in &mut table.targets {
                    f(target);
                }
                f(&mut table.default_target);
            }
            ExprKind::Try(t) => {
                for c in &mut t.catches {
                    if !c.is_catch_all() {
                        f(&mut c.var);
                    }
                }
            }
            ExprKind::Br(v)
            | ExprKind::BrIf(v)
            | ExprKind::Call(v)
            | ExprKind::CallIndirect(v)
            | ExprKind::GetGlobal(v)
            | ExprKind::GetLocal(v)
            | ExprKind::SetGlobal(v)
            | ExprKind::SetLocal(v)
            | ExprKind::TeeLocal(v)
            | ExprKind::Throw(v)
            | ExprKind::Rethrow(v) => f(v),
            _ => {}
        }
    }

    // ─── Nested sequences ───────────────────────────────────────────────────

    /// Sequences owned by this node, in traversal order.
    pub fn child_lists(&self) -> Vec<&ExprList> {
        match &self.kind {
            ExprKind::Block(b) | ExprKind::Loop(b) => vec![&b.exprs],
            ExprKind::If(i) => {
                let mut lists = vec![&i.true_block.exprs];
                if let Some(false_exprs) = &i.false_exprs {
                    lists.push(false_exprs);
                }
                lists
            }
            ExprKind::Try(t) => std::iter::once(&t.block.exprs)
                .chain(t.catches.iter().map(|c| &c.exprs))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Move every directly nested node into `out`, leaving this node's
    /// sequences empty.
    fn take_children(&mut self, out: &mut Vec<Expr>) {
        match &mut self.kind {
            ExprKind::Block(b) | ExprKind::Loop(b) => out.append(&mut b.exprs.exprs),
            ExprKind::If(i) => {
                out.append(&mut i.true_block.exprs.exprs);
                if let Some(false_exprs) = &mut i.false_exprs {
                    out.append(&mut false_exprs.exprs);
                }
            }
            ExprKind::Try(t) => {
                out.append(&mut t.block.exprs.exprs);
                for c in &mut t.catches {
                    out.append(&mut c.exprs.exprs);
                }
            }
            _ => {}
        }
    }
}

/// Owned instruction sequence.
#[derive(Default)]
pub struct ExprList {
    exprs: Vec<Expr>,
}

impl ExprList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, expr: Expr) {
        self.exprs.push(expr);
    }

    /// Take the nodes out, leaving this list empty.
    pub fn into_vec(mut self) -> Vec<Expr> {
        std::mem::take(&mut self.exprs)
    }

    /// Pre-order walk over this sequence and everything nested in it, yielding
    /// each node with its nesting depth (0 for this list's own nodes).
    pub fn tree_iter(&self) -> ExprTreeIter<'_> {
        ExprTreeIter {
            stack: vec![(0, self.exprs.iter())],
        }
    }

    /// Number of nodes in the whole tree.
    pub fn tree_len(&self) -> usize {
        self.tree_iter().count()
    }
}

impl Drop for ExprList {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.exprs);
        while let Some(mut expr) = pending.pop() {
            expr.take_children(&mut pending);
            // `expr` only owns empty sequences now, so dropping it is shallow.
        }
    }
}

impl fmt::Debug for ExprList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags: Vec<ExprTag> = self.exprs.iter().map(Expr::tag).collect();
        f.debug_struct("ExprList")
            .field("len", &self.exprs.len())
            .field("tags", &tags)
            .finish()
    }
}

impl Deref for ExprList {
    type Target = [Expr];

    fn deref(&self) -> &[Expr] {
        &self.exprs
    }
}

impl DerefMut for ExprList {
    fn deref_mut(&mut self) -> &mut [Expr] {
        &mut self.exprs
    }
}

impl From<Vec<Expr>> for ExprList {
    fn from(exprs: Vec<Expr>) -> Self {
        Self { exprs }
    }
}

impl FromIterator<Expr> for ExprList {
    fn from_iter<I: IntoIterator<Item = Expr>>(iter: I) -> Self {
        Self {
            exprs: iter.into_iter().collect(),
        }
    }
}

impl Extend<Expr> for ExprList {
    fn extend<I: IntoIterator<Item = Expr>>(&mut self, iter: I) {
        self.exprs.extend(iter);
    }
}

impl<'a> IntoIterator for &'a ExprList {
    type Item = &'a Expr;
    type IntoIter = std::slice::Iter<'a, Expr>;

    fn into_iter(self) -> Self::IntoIter {
        self.exprs.iter()
    }
}

/// Iterator returned by [`ExprList::tree_iter`].
pub struct ExprTreeIter<'a> {
    stack: Vec<(usize, std::slice::Iter<'a, Expr>)>,
}

impl<'a> Iterator for ExprTreeIter<'a> {
    type Item = (usize, &'a Expr);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (depth, iter) = self.stack.last_mut()?;
            let depth = *depth;
            match iter.next() {
                Some(expr) => {
                    for list in expr.child_lists().into_iter().rev() {
                        self.stack.push((depth + 1, list.iter()));
                    }
                    return Some((depth, expr));
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

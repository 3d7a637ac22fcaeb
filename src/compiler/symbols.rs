//! Symbol tables: globals, locals, functions.
//!
//! Identity is the insertion-order slot index, never a hashed name. Names are
//! slices into the source buffer; nothing is copied or interned.

use indexmap::{IndexMap, IndexSet};

/// Global variables. The slot index baked into the bytecode is the
/// insertion index.
#[derive(Default)]
pub struct GlobalTable<'src> {
    names: IndexSet<&'src str>,
}

impl<'src> GlobalTable<'src> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new global; `None` if the name is already taken.
    pub fn define(&mut self, name: &'src str) -> Option<u16> {
        if self.names.contains(name) {
            return None;
        }
        let (slot, _) = self.names.insert_full(name);
        Some(slot as u16)
    }

    pub fn resolve(&self, name: &str) -> Option<u16> {
        self.names.get_index_of(name).map(|i| i as u16)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Slot-ordered names, for the VM's storage and the disassembler.
    pub fn into_names(self) -> Vec<&'src str> {
        self.names.into_iter().collect()
    }
}

/// A block-scoped local or a function parameter. Parameters carry negative
/// slots; body locals count up from zero per function.
#[derive(Debug, Clone, Copy)]
pub struct Local<'src> {
    pub name: &'src str,
    pub slot: i16,
    pub depth: u32,
}

/// The scope-stacked local table. Records are pushed in declaration order
/// and popped wholesale when their scope ends.
#[derive(Default)]
pub struct LocalTable<'src> {
    locals: Vec<Local<'src>>,
}

impl<'src> LocalTable<'src> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Innermost binding of `name`, if any. Locals shadow outer locals and
    /// globals.
    pub fn resolve(&self, name: &str) -> Option<i16> {
        self.locals
            .iter()
            .rev()
            .find(|local| local.name == name)
            .map(|local| local.slot)
    }

    /// Whether `name` is already bound in the scope at `depth`.
    pub fn declared_in_scope(&self, name: &str, depth: u32) -> bool {
        self.locals
            .iter()
            .rev()
            .take_while(|local| local.depth >= depth)
            .any(|local| local.depth == depth && local.name == name)
    }

    pub fn push(&mut self, name: &'src str, slot: i16, depth: u32) {
        self.locals.push(Local { name, slot, depth });
    }

    /// Drop every record of the scope at `depth`; returns how many were
    /// dropped (the emitter owes one `ipop` per dropped record).
    pub fn pop_scope(&mut self, depth: u32) -> usize {
        let before = self.locals.len();
        while self.locals.last().is_some_and(|local| local.depth == depth) {
            self.locals.pop();
        }
        before - self.locals.len()
    }

    /// Drop every record at `depth` or deeper; error-path cleanup when a
    /// surrounding construct is abandoned mid-parse.
    pub fn unwind_to(&mut self, depth: u32) {
        self.locals.retain(|local| local.depth < depth);
    }

    /// Drop the parameter records (negative slots) of the scope at `depth`.
    /// Parameters are cleaned up by the caller, not by the epilogue's
    /// `ipop`s, so they must not be counted by [`LocalTable::pop_scope`].
    pub fn drop_params(&mut self, depth: u32) {
        self.locals
            .retain(|local| !(local.depth == depth && local.slot < 0));
    }

    /// How many body locals (non-negative slots) are live right now. A
    /// `return` must discard exactly these before jumping out; the shared
    /// epilogue only cleans up the fall-through path.
    pub fn live_body_locals(&self) -> usize {
        self.locals.iter().filter(|local| local.slot >= 0).count()
    }

    /// Give the last `arity` records their argument slots
    /// `-(2+arity) … -3`, left to right.
    pub fn assign_arg_slots(&mut self, arity: u8) {
        let arity = arity as usize;
        let first = self.locals.len() - arity;
        for (i, local) in self.locals[first..].iter_mut().enumerate() {
            local.slot = -(2 + arity as i16 - i as i16);
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FunctionInfo {
    pub address: usize,
    pub arity: u8,
}

/// Defined functions. Names are unique; redefinition is a compile error.
#[derive(Default)]
pub struct FunctionTable<'src> {
    functions: IndexMap<&'src str, FunctionInfo>,
}

impl<'src> FunctionTable<'src> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function; `false` if the name is already defined.
    pub fn declare(&mut self, name: &'src str, address: usize, arity: u8) -> bool {
        if self.functions.contains_key(name) {
            return false;
        }
        self.functions.insert(name, FunctionInfo { address, arity });
        true
    }

    pub fn lookup(&self, name: &str) -> Option<FunctionInfo> {
        self.functions.get(name).copied()
    }

    pub fn defined(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_slots_follow_insertion_order() {
        let mut globals = GlobalTable::new();
        assert_eq!(globals.define("a"), Some(0));
        assert_eq!(globals.define("b"), Some(1));
        assert_eq!(globals.define("a"), None);
        assert_eq!(globals.resolve("b"), Some(1));
        assert_eq!(globals.resolve("c"), None);
        assert_eq!(globals.into_names(), vec!["a", "b"]);
    }

    #[test]
    fn locals_shadow_by_innermost() {
        let mut locals = LocalTable::new();
        locals.push("x", 0, 1);
        locals.push("x", 1, 2);
        assert_eq!(locals.resolve("x"), Some(1));
        assert_eq!(locals.pop_scope(2), 1);
        assert_eq!(locals.resolve("x"), Some(0));
    }

    #[test]
    fn redefinition_is_scoped() {
        let mut locals = LocalTable::new();
        locals.push("x", 0, 1);
        assert!(locals.declared_in_scope("x", 1));
        assert!(!locals.declared_in_scope("x", 2));
    }

    #[test]
    fn argument_slots_are_negative() {
        let mut locals = LocalTable::new();
        locals.push("a", 0, 1);
        locals.push("b", 0, 1);
        locals.assign_arg_slots(2);
        assert_eq!(locals.resolve("a"), Some(-4));
        assert_eq!(locals.resolve("b"), Some(-3));
        locals.push("tmp", 0, 1);
        locals.drop_params(1);
        assert_eq!(locals.resolve("a"), None);
        assert_eq!(locals.pop_scope(1), 1);
    }

    #[test]
    fn function_names_are_unique() {
        let mut functions = FunctionTable::new();
        assert!(functions.declare("main", 0, 0));
        assert!(!functions.declare("main", 9, 1));
        let info = functions.lookup("main").unwrap();
        assert_eq!(info.address, 0);
        assert_eq!(info.arity, 0);
    }
}

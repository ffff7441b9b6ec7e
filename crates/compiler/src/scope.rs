//! Register allocation and closure-capture analysis.
//!
//! Grounded on the teacher's `capture_analysis.rs`: a stack of per-function
//! contexts, resolved innermost-out, with each function lazily recording an
//! upvalue descriptor the first time one of its nested closures reaches past
//! it for a name it doesn't declare itself.

use std::collections::HashMap;

use oyc_runtime::UpvalueSource;

/// Where a resolved name lives, from the perspective of the function that
/// asked for it.
#[derive(Debug, Clone, Copy)]
pub enum Resolved {
    Local(u16),
    Upvalue(u16),
}

struct Block {
    locals: HashMap<String, u16>,
}

pub struct FuncScope {
    blocks: Vec<Block>,
    next_register: u16,
    max_register: u16,
    pub upvalues: Vec<UpvalueSource>,
    upvalue_names: Vec<String>,
}

impl FuncScope {
    fn new() -> Self {
        FuncScope {
            blocks: vec![Block { locals: HashMap::new() }],
            next_register: 0,
            max_register: 0,
            upvalues: Vec::new(),
            upvalue_names: Vec::new(),
        }
    }

    /// Declares `name` in the innermost block. Errors if `name` is already
    /// declared in that same block — redeclaration in the same scope is a
    /// semantic error, not a shadowing rebind (a nested block may still
    /// shadow an outer one freely; `find_local` already walks blocks
    /// innermost-first for that).
    fn declare_local(&mut self, name: &str) -> Result<u16, String> {
        if self
            .blocks
            .last()
            .expect("a function always has at least one block")
            .locals
            .contains_key(name)
        {
            return Err(format!("'{name}' is already declared in this scope"));
        }
        let reg = self.alloc_register();
        self.blocks
            .last_mut()
            .expect("a function always has at least one block")
            .locals
            .insert(name.to_string(), reg);
        Ok(reg)
    }

    fn alloc_register(&mut self) -> u16 {
        let reg = self.next_register;
        self.next_register += 1;
        self.max_register = self.max_register.max(self.next_register);
        reg
    }

    fn find_local(&self, name: &str) -> Option<u16> {
        self.blocks.iter().rev().find_map(|b| b.locals.get(name).copied())
    }
}

/// Tracks the chain of function scopes currently being compiled, innermost
/// last, and performs upvalue resolution across it.
pub struct ScopeStack {
    functions: Vec<FuncScope>,
}

impl ScopeStack {
    pub fn new() -> Self {
        ScopeStack { functions: Vec::new() }
    }

    pub fn enter_function(&mut self) {
        self.functions.push(FuncScope::new());
    }

    /// Leaves the current function scope, returning its register high-water
    /// mark and the upvalue descriptor list codegen attaches to the
    /// `Prototype`.
    pub fn leave_function(&mut self) -> (u16, Vec<UpvalueSource>) {
        let f = self.functions.pop().expect("unbalanced enter/leave_function");
        (f.max_register, f.upvalues)
    }

    pub fn enter_block(&mut self) {
        self.current_mut().blocks.push(Block { locals: HashMap::new() });
    }

    pub fn leave_block(&mut self) {
        self.current_mut().blocks.pop();
    }

    /// Declares a local in the current block. Returns `Err` with a message
    /// describing the conflict if `name` is already declared in that same
    /// block (spec §4.2: "Redeclaration in the same scope is an error").
    pub fn declare_local(&mut self, name: &str) -> Result<u16, String> {
        self.current_mut().declare_local(name)
    }

    pub fn alloc_temp(&mut self) -> u16 {
        self.current_mut().alloc_register()
    }

    fn current_mut(&mut self) -> &mut FuncScope {
        self.functions.last_mut().expect("no active function scope")
    }

    /// Resolves `name` against the function at the top of the stack,
    /// recursing into enclosing functions and registering upvalue
    /// descriptors as needed. Returns `None` if `name` is never declared in
    /// any enclosing scope.
    pub fn resolve(&mut self, name: &str) -> Option<Resolved> {
        self.resolve_at(self.functions.len().saturating_sub(1), name)
    }

    fn resolve_at(&mut self, level: usize, name: &str) -> Option<Resolved> {
        if let Some(reg) = self.functions[level].find_local(name) {
            return Some(Resolved::Local(reg));
        }
        if level == 0 {
            return None;
        }
        // Already captured by this function? Reuse the existing slot.
        if let Some(idx) = self.functions[level]
            .upvalue_names
            .iter()
            .position(|n| n == name)
        {
            return Some(Resolved::Upvalue(idx as u16));
        }
        let parent = self.resolve_at(level - 1, name)?;
        let source = match parent {
            Resolved::Local(reg) => UpvalueSource::ParentLocal(reg),
            Resolved::Upvalue(idx) => UpvalueSource::ParentUpvalue(idx),
        };
        let f = &mut self.functions[level];
        f.upvalues.push(source);
        f.upvalue_names.push(name.to_string());
        Some(Resolved::Upvalue((f.upvalues.len() - 1) as u16))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_a_local_in_the_same_function() {
        let mut s = ScopeStack::new();
        s.enter_function();
        let reg = s.declare_local("x").unwrap();
        assert!(matches!(s.resolve("x"), Some(Resolved::Local(r)) if r == reg));
    }

    #[test]
    fn captures_a_parent_local_as_an_upvalue() {
        let mut s = ScopeStack::new();
        s.enter_function();
        let outer_reg = s.declare_local("counter").unwrap();
        s.enter_function();
        let resolved = s.resolve("counter");
        assert!(matches!(resolved, Some(Resolved::Upvalue(0))));
        let (_, upvalues) = s.leave_function();
        assert_eq!(upvalues, vec![UpvalueSource::ParentLocal(outer_reg)]);
    }

    #[test]
    fn reuses_the_same_upvalue_slot_for_repeat_references() {
        let mut s = ScopeStack::new();
        s.enter_function();
        s.declare_local("x").unwrap();
        s.enter_function();
        let first = s.resolve("x");
        let second = s.resolve("x");
        assert!(matches!((first, second), (Some(Resolved::Upvalue(a)), Some(Resolved::Upvalue(b))) if a == b));
    }

    #[test]
    fn unknown_name_resolves_to_none() {
        let mut s = ScopeStack::new();
        s.enter_function();
        assert!(s.resolve("nope").is_none());
    }

    #[test]
    fn redeclaring_a_name_in_the_same_block_is_an_error() {
        let mut s = ScopeStack::new();
        s.enter_function();
        s.declare_local("x").unwrap();
        assert!(s.declare_local("x").is_err());
    }

    #[test]
    fn redeclaring_a_name_in_a_nested_block_shadows_instead_of_erroring() {
        let mut s = ScopeStack::new();
        s.enter_function();
        s.declare_local("x").unwrap();
        s.enter_block();
        assert!(s.declare_local("x").is_ok());
    }
}

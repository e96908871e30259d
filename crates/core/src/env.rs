//! Lexical environments
//!
//! An environment is a name→value map plus a parent link. Closures share
//! (do not copy) their enclosing environment, so a mutation through one
//! closure is observed by every other closure capturing the same scope.
//!
//! The generation marker is consulted by the cycle collector so each
//! environment chain is traversed at most once per collection phase.

use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// Handle to a lexical scope. Clone is O(1) and shares the scope.
#[derive(Clone, Debug)]
pub struct Env(Rc<EnvCell>);

#[derive(Debug)]
pub struct EnvCell {
    bindings: RefCell<HashMap<String, Value>>,
    parent: Option<Env>,
    generation: Cell<u64>,
}

impl Env {
    /// A scope with no parent.
    pub fn root() -> Env {
        Env::with_parent(None)
    }

    /// A scope extending `self`; lookups fall through to the parent.
    pub fn child(&self) -> Env {
        Env::with_parent(Some(self.clone()))
    }

    fn with_parent(parent: Option<Env>) -> Env {
        let env = Env(Rc::new(EnvCell {
            bindings: RefCell::new(HashMap::new()),
            parent,
            generation: Cell::new(0),
        }));
        crate::cycle::track_env(&env);
        env
    }

    /// Bind a name in this scope, shadowing any outer binding.
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.0.bindings.borrow_mut().insert(name.into(), value);
    }

    /// Look a name up through the scope chain.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut scope = self;
        loop {
            if let Some(v) = scope.0.bindings.borrow().get(name) {
                return Some(v.clone());
            }
            match &scope.0.parent {
                Some(parent) => scope = parent,
                None => return None,
            }
        }
    }

    /// Update an existing binding in place, searching the chain outward.
    /// Returns `false` if the name is bound nowhere. Mutations made through
    /// a captured scope are visible to every closure sharing it.
    pub fn update(&self, name: &str, value: Value) -> bool {
        let mut scope = self;
        loop {
            let mut bindings = scope.0.bindings.borrow_mut();
            if let Some(slot) = bindings.get_mut(name) {
                *slot = value;
                return true;
            }
            drop(bindings);
            match &scope.0.parent {
                Some(parent) => scope = parent,
                None => return false,
            }
        }
    }

    pub fn parent(&self) -> Option<&Env> {
        self.0.parent.as_ref()
    }

    /// Pointer identity of the scope.
    pub fn same(&self, other: &Env) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// Visit every binding in this scope (not the chain).
    pub fn for_each_binding(&self, mut f: impl FnMut(&str, &Value)) {
        for (name, value) in self.0.bindings.borrow().iter() {
            f(name, value);
        }
    }

    /// Check-and-set the generation marker. Returns `true` the first time it
    /// is called with a given generation, `false` on repeat visits.
    pub fn enter_generation(&self, generation: u64) -> bool {
        if self.0.generation.get() == generation {
            return false;
        }
        self.0.generation.set(generation);
        true
    }

    pub(crate) fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    pub(crate) fn downgrade(&self) -> std::rc::Weak<EnvCell> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn from_cell(cell: Rc<EnvCell>) -> Env {
        Env(cell)
    }

    /// Drop every binding in this scope. Called by the cycle collector on
    /// scopes that are unreachable; severing the bindings lets the plain
    /// reference counts finish the job.
    pub(crate) fn clear_bindings(&self) {
        self.0.bindings.borrow_mut().clear();
    }
}

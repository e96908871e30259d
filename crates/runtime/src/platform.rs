//! Platform function registry
//!
//! Host-provided effectful operations (filesystem, networking, clocks,
//! randomness, console) are registered here by name and dispatched by the
//! evaluator exactly like built-ins, minus the type-parameter step. The
//! runtime itself registers nothing; the host decides what exists.

use std::collections::HashMap;
use std::rc::Rc;
use tern_core::Value;

/// A host-provided operation: positional arguments in, value out. An `Err`
/// becomes a propagating error at the calling IR node.
pub type PlatformFn = Rc<dyn Fn(&[Value]) -> Result<Value, String>>;

/// Name → function table.
#[derive(Clone, Default)]
pub struct PlatformRegistry {
    functions: HashMap<String, PlatformFn>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        function: impl Fn(&[Value]) -> Result<Value, String> + 'static,
    ) {
        self.functions.insert(name.into(), Rc::new(function));
    }

    pub fn lookup(&self, name: &str) -> Option<PlatformFn> {
        self.functions.get(name).cloned()
    }
}

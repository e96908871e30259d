//! The homoiconic IR term tree
//!
//! IR nodes are immutable terms behind cheap-clone handles. Every node
//! carries its static type and a (possibly empty) source-location stack.
//! Function literals reconstructed from their value form keep a back
//! reference to that form so re-serialization reproduces the original bytes.

use crate::error::Location;
use std::cell::RefCell;
use std::rc::Rc;
use tern_core::{Type, Value};

/// Handle to an IR node. Clone is O(1).
#[derive(Clone, Debug)]
pub struct Ir(Rc<IrNode>);

#[derive(Debug)]
pub struct IrNode {
    kind: IrKind,
    ty: Type,
    locations: Vec<Location>,
    /// The value form this node was reflected from, kept for function
    /// literals so they re-serialize byte-faithfully.
    literal_form: RefCell<Option<Value>>,
}

/// One arm of a `match` node.
#[derive(Debug)]
pub struct MatchCase {
    pub name: String,
    pub bind: Option<String>,
    pub body: Ir,
}

/// A function or async-function literal.
#[derive(Debug)]
pub struct FnLiteral {
    pub params: Vec<String>,
    pub body: Ir,
}

#[derive(Debug)]
pub enum IrKind {
    Literal(Value),
    Variable(String),
    Let { name: String, value: Ir },
    Assign { name: String, value: Ir },
    Block(Vec<Ir>),
    If { condition: Ir, then: Ir, otherwise: Option<Ir> },
    Match { subject: Ir, cases: Vec<MatchCase> },
    While { label: Option<String>, condition: Ir, body: Ir },
    ForArray { label: Option<String>, var: String, iterable: Ir, body: Ir },
    ForSet { label: Option<String>, var: String, iterable: Ir, body: Ir },
    ForDict { label: Option<String>, key_var: String, value_var: String, iterable: Ir, body: Ir },
    Function(FnLiteral),
    AsyncFunction(FnLiteral),
    Call { callee: Ir, args: Vec<Ir> },
    AsyncCall { callee: Ir, args: Vec<Ir> },
    Builtin { name: String, type_args: Vec<Type>, args: Vec<Ir> },
    Platform { name: String, args: Vec<Ir> },
    Return(Ir),
    Break(Option<String>),
    Continue(Option<String>),
    Raise(Ir),
    Try {
        body: Ir,
        message_var: String,
        stack_var: String,
        catch: Ir,
        finally: Option<Ir>,
    },
    NewArray(Vec<Ir>),
    NewSet(Vec<Ir>),
    NewDict(Vec<(Ir, Ir)>),
    NewRef(Ir),
    NewVector(Vec<Ir>),
    NewMatrix { rows: usize, cols: usize, items: Vec<Ir> },
    StructNew(Vec<Ir>),
    GetField { subject: Ir, field: String },
    VariantNew { case: String, payload: Ir },
    WrapRecursive(Ir),
    UnwrapRecursive(Ir),
}

impl Ir {
    pub fn new(kind: IrKind, ty: Type) -> Ir {
        Ir::with_locations(kind, ty, Vec::new())
    }

    pub fn with_locations(kind: IrKind, ty: Type, locations: Vec<Location>) -> Ir {
        Ir(Rc::new(IrNode {
            kind,
            ty,
            locations,
            literal_form: RefCell::new(None),
        }))
    }

    pub fn kind(&self) -> &IrKind {
        &self.0.kind
    }

    pub fn ty(&self) -> &Type {
        &self.0.ty
    }

    pub fn locations(&self) -> &[Location] {
        &self.0.locations
    }

    /// The originating value form, if this node was reflected from one.
    pub fn literal_form(&self) -> Option<Value> {
        self.0.literal_form.borrow().clone()
    }

    pub fn set_literal_form(&self, form: Value) {
        *self.0.literal_form.borrow_mut() = Some(form);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_carries_type_and_locations() {
        let node = Ir::with_locations(
            IrKind::Literal(Value::integer(1)),
            Type::integer(),
            vec![Location::new("main.tn", 1, 1)],
        );
        assert!(node.ty().equal(&Type::integer()));
        assert_eq!(node.locations().len(), 1);
        assert!(node.literal_form().is_none());
    }

    #[test]
    fn test_literal_form_back_reference() {
        let node = Ir::new(IrKind::Break(None), Type::never());
        node.set_literal_form(Value::string("form"));
        assert_eq!(node.literal_form().unwrap().as_string(), Some("form"));
    }
}

//! The IR evaluator
//!
//! A single recursive dispatch over IR terms, threading a five-way outcome
//! sum through itself: normal completion, `return`, labeled `break` and
//! `continue`, and propagating errors with a growing location stack.
//!
//! Closures share their enclosing environment, so mutations flow both ways
//! between a closure and its creation scope. Every call brackets the cycle
//! collector's depth counter; the collection itself runs only when the
//! outermost call returns.

use crate::builtins::BuiltinRegistry;
use crate::error::{Location, RuntimeError, locations_to_value};
use crate::ir::{FnLiteral, Ir, IrKind};
use crate::platform::PlatformRegistry;
use std::rc::Rc;
use tern_core::{Env, Type, Value, cycle};
use tracing::trace;

/// The evaluation outcome threaded through the evaluator.
#[derive(Clone, Debug)]
pub enum Eval {
    Value(Value),
    Return(Value),
    Break(Option<String>),
    Continue(Option<String>),
    Error(RuntimeError),
}

impl Eval {
    /// Collapse to a host-facing result. Control-flow outcomes that escape
    /// the outermost frame are reported as errors.
    pub fn into_result(self) -> Result<Value, RuntimeError> {
        match self {
            Eval::Value(v) | Eval::Return(v) => Ok(v),
            Eval::Break(_) => Err(RuntimeError::new("break outside of loop")),
            Eval::Continue(_) => Err(RuntimeError::new("continue outside of loop")),
            Eval::Error(e) => Err(e),
        }
    }
}

/// The compiled body of a function value, stored behind the core's opaque
/// function payload.
pub struct ClosureBody {
    pub params: Vec<String>,
    pub body: Ir,
    pub is_async: bool,
    /// The value form the literal was reflected from, for byte-faithful
    /// re-serialization.
    pub literal: Option<Value>,
}

macro_rules! try_val {
    ($e:expr) => {
        match $e {
            Eval::Value(v) => v,
            other => return other,
        }
    };
}

/// The tree-walking interpreter. Owns the built-in and platform registries.
pub struct Evaluator {
    builtins: BuiltinRegistry,
    platform: PlatformRegistry,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    /// An evaluator with the default built-ins and no platform functions.
    pub fn new() -> Self {
        Self {
            builtins: BuiltinRegistry::with_defaults(),
            platform: PlatformRegistry::new(),
        }
    }

    pub fn with_registries(builtins: BuiltinRegistry, platform: PlatformRegistry) -> Self {
        Self { builtins, platform }
    }

    pub fn builtins_mut(&mut self) -> &mut BuiltinRegistry {
        &mut self.builtins
    }

    pub fn platform_mut(&mut self) -> &mut PlatformRegistry {
        &mut self.platform
    }

    /// Evaluate a top-level node. Brackets the collector so unreachable
    /// cycles are reclaimed when this outermost frame returns.
    pub fn run(&self, node: &Ir, env: &Env) -> Eval {
        cycle::enter_call();
        let out = self.eval(node, env);
        cycle::leave_call();
        out
    }

    /// Invoke a function value with positional arguments. This is the host
    /// entry point; at its return the cycle collector runs.
    pub fn call_function(&self, callee: &Value, args: &[Value]) -> Eval {
        self.call_closure(callee, args, &[])
    }

    /// The recursive dispatch. Public so hosts can evaluate nested IR while
    /// managing their own call bracketing.
    pub fn eval(&self, node: &Ir, env: &Env) -> Eval {
        match node.kind() {
            IrKind::Literal(v) => Eval::Value(v.clone()),
            IrKind::Variable(name) => match env.lookup(name) {
                Some(v) => Eval::Value(v),
                None => self.err(node, format!("undefined variable '{}'", name)),
            },
            IrKind::Let { name, value } => {
                let v = try_val!(self.eval(value, env));
                env.define(name.clone(), v);
                Eval::Value(Value::null())
            }
            IrKind::Assign { name, value } => {
                let v = try_val!(self.eval(value, env));
                if env.update(name, v) {
                    Eval::Value(Value::null())
                } else {
                    self.err(node, format!("undefined variable '{}'", name))
                }
            }
            IrKind::Block(statements) => {
                let mut last = Value::null();
                for statement in statements {
                    last = try_val!(self.eval(statement, env));
                }
                Eval::Value(last)
            }
            IrKind::If { condition, then, otherwise } => {
                let c = try_val!(self.eval(condition, env));
                if c.truthy() {
                    self.eval(then, env)
                } else if let Some(otherwise) = otherwise {
                    self.eval(otherwise, env)
                } else {
                    Eval::Value(Value::null())
                }
            }
            IrKind::Match { subject, cases } => {
                let v = try_val!(self.eval(subject, env));
                let Some((_, case_name, payload)) = v.variant_parts() else {
                    return self.err(node, "match on a non-variant value");
                };
                for case in cases {
                    if case.name == case_name {
                        let scope = env.child();
                        if let Some(bind) = &case.bind {
                            scope.define(bind.clone(), payload.clone());
                        }
                        return self.eval(&case.body, &scope);
                    }
                }
                self.err(node, format!("match: unhandled case '{}'", case_name))
            }
            IrKind::While { label, condition, body } => {
                loop {
                    let c = try_val!(self.eval(condition, env));
                    if !c.truthy() {
                        break;
                    }
                    let scope = env.child();
                    match self.eval(body, &scope) {
                        Eval::Value(_) => {}
                        Eval::Break(l) if label_matches(label, &l) => break,
                        Eval::Continue(l) if label_matches(label, &l) => continue,
                        other => return other,
                    }
                }
                Eval::Value(Value::null())
            }
            IrKind::ForArray { label, var, iterable, body } => {
                let it = try_val!(self.eval(iterable, env));
                let Some(items) = it.array_items().map(<[Value]>::to_vec) else {
                    return self.err(node, "for-array over a non-array value");
                };
                self.run_loop(label, &items, body, env, |scope, item| {
                    scope.define(var.clone(), item.clone());
                })
            }
            IrKind::ForSet { label, var, iterable, body } => {
                let it = try_val!(self.eval(iterable, env));
                let Some(items) = it.set_items().map(<[Value]>::to_vec) else {
                    return self.err(node, "for-set over a non-set value");
                };
                self.run_loop(label, &items, body, env, |scope, item| {
                    scope.define(var.clone(), item.clone());
                })
            }
            IrKind::ForDict { label, key_var, value_var, iterable, body } => {
                let it = try_val!(self.eval(iterable, env));
                let Some(entries) = it.dict_entries().map(<[(Value, Value)]>::to_vec) else {
                    return self.err(node, "for-dict over a non-dict value");
                };
                self.run_loop(label, &entries, body, env, |scope, (key, value)| {
                    scope.define(key_var.clone(), key.clone());
                    scope.define(value_var.clone(), value.clone());
                })
            }
            IrKind::Function(literal) => Eval::Value(self.make_closure(node, literal, env, false)),
            IrKind::AsyncFunction(literal) => {
                Eval::Value(self.make_closure(node, literal, env, true))
            }
            IrKind::Call { callee, args } | IrKind::AsyncCall { callee, args } => {
                let f = try_val!(self.eval(callee, env));
                let mut argv = Vec::with_capacity(args.len());
                for arg in args {
                    argv.push(try_val!(self.eval(arg, env)));
                }
                self.call_closure(&f, &argv, node.locations())
            }
            IrKind::Builtin { name, type_args, args } => {
                let mut argv = Vec::with_capacity(args.len());
                for arg in args {
                    argv.push(try_val!(self.eval(arg, env)));
                }
                let Some(factory) = self.builtins.lookup(name) else {
                    return self.err(node, format!("unknown built-in '{}'", name));
                };
                trace!(name = %name, "builtin dispatch");
                // Factory and implementation run back to back; nothing may
                // evaluate IR in between.
                let implementation = match factory(type_args) {
                    Ok(f) => f,
                    Err(message) => return self.err(node, message),
                };
                match implementation(&argv) {
                    Ok(v) => Eval::Value(v),
                    Err(message) => self.err(node, message),
                }
            }
            IrKind::Platform { name, args } => {
                let mut argv = Vec::with_capacity(args.len());
                for arg in args {
                    argv.push(try_val!(self.eval(arg, env)));
                }
                let Some(function) = self.platform.lookup(name) else {
                    return self.err(node, format!("unknown platform function '{}'", name));
                };
                trace!(name = %name, "platform dispatch");
                match function(&argv) {
                    Ok(v) => Eval::Value(v),
                    Err(message) => self.err(node, message),
                }
            }
            IrKind::Return(value) => {
                let v = try_val!(self.eval(value, env));
                Eval::Return(v)
            }
            IrKind::Break(label) => Eval::Break(label.clone()),
            IrKind::Continue(label) => Eval::Continue(label.clone()),
            IrKind::Raise(message) => {
                let v = try_val!(self.eval(message, env));
                let Some(text) = v.as_string() else {
                    return self.err(node, "error message must be a string");
                };
                Eval::Error(RuntimeError::at(text, node.locations().to_vec()))
            }
            IrKind::Try { body, message_var, stack_var, catch, finally } => {
                let mut result = self.eval(body, env);
                if let Eval::Error(err) = result {
                    let scope = env.child();
                    scope.define(message_var.clone(), Value::string(err.message.clone()));
                    scope.define(stack_var.clone(), locations_to_value(&err.locations));
                    result = self.eval(catch, &scope);
                }
                if let Some(finally) = finally {
                    if !is_noop_literal(finally) {
                        match self.eval(finally, env) {
                            Eval::Value(_) => {}
                            // A finally that does not complete normally
                            // replaces the prior outcome.
                            other => result = other,
                        }
                    }
                }
                result
            }
            IrKind::NewArray(items) => {
                let Some(elem) = self.node_elem_type(node) else {
                    return self.err(node, "array node lacks an element type");
                };
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(try_val!(self.eval(item, env)));
                }
                Eval::Value(Value::array(elem, out))
            }
            IrKind::NewSet(items) => {
                let Some(elem) = self.node_elem_type(node) else {
                    return self.err(node, "set node lacks an element type");
                };
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(try_val!(self.eval(item, env)));
                }
                Eval::Value(Value::set(elem, out))
            }
            IrKind::NewDict(entries) => {
                let Some((key_ty, value_ty)) =
                    node.ty().unwrap_recursive().and_then(|t| t.dict_types())
                else {
                    return self.err(node, "dict node lacks key/value types");
                };
                let mut out = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let k = try_val!(self.eval(key, env));
                    let v = try_val!(self.eval(value, env));
                    out.push((k, v));
                }
                Eval::Value(Value::dict(key_ty, value_ty, out))
            }
            IrKind::NewRef(target) => {
                let Some(elem) = self.node_elem_type(node) else {
                    return self.err(node, "ref node lacks an element type");
                };
                let v = try_val!(self.eval(target, env));
                Eval::Value(Value::ref_of(elem, v))
            }
            IrKind::NewVector(items) => {
                let Some(elem) = self.node_elem_type(node) else {
                    return self.err(node, "vector node lacks an element type");
                };
                let Some(mut buffer) = tern_core::value::buffer_for(&elem, items.len()) else {
                    return self.err(node, format!("vector cannot pack element type {}", elem));
                };
                for item in items {
                    let v = try_val!(self.eval(item, env));
                    if let Err(message) = buffer.push_value(&v) {
                        return self.err(node, message);
                    }
                }
                Eval::Value(Value::vector(buffer))
            }
            IrKind::NewMatrix { rows, cols, items } => {
                let Some(elem) = self.node_elem_type(node) else {
                    return self.err(node, "matrix node lacks an element type");
                };
                let Some(mut buffer) = tern_core::value::buffer_for(&elem, items.len()) else {
                    return self.err(node, format!("matrix cannot pack element type {}", elem));
                };
                for item in items {
                    let v = try_val!(self.eval(item, env));
                    if let Err(message) = buffer.push_value(&v) {
                        return self.err(node, message);
                    }
                }
                match Value::matrix(*rows, *cols, buffer) {
                    Ok(v) => Eval::Value(v),
                    Err(message) => self.err(node, message),
                }
            }
            IrKind::StructNew(fields) => {
                let Some(ty) = node.ty().unwrap_recursive() else {
                    return self.err(node, "struct node type is not finalized");
                };
                let mut out = Vec::with_capacity(fields.len());
                for field in fields {
                    out.push(try_val!(self.eval(field, env)));
                }
                match Value::struct_of(ty, out) {
                    Ok(v) => Eval::Value(v),
                    Err(message) => self.err(node, message),
                }
            }
            IrKind::GetField { subject, field } => {
                let v = try_val!(self.eval(subject, env));
                if v.struct_fields().is_none() {
                    return self.err(node, "field access on a non-struct value");
                }
                match v.field(field) {
                    Some(value) => Eval::Value(value),
                    None => self.err(node, format!("unknown field '{}'", field)),
                }
            }
            IrKind::VariantNew { case, payload } => {
                let Some(ty) = node.ty().unwrap_recursive() else {
                    return self.err(node, "variant node type is not finalized");
                };
                let p = try_val!(self.eval(payload, env));
                match Value::variant(ty, case.clone(), p) {
                    Ok(v) => Eval::Value(v),
                    Err(message) => self.err(node, message),
                }
            }
            // Wrap/unwrap carry type information only; the value passes
            // through untouched.
            IrKind::WrapRecursive(inner) | IrKind::UnwrapRecursive(inner) => self.eval(inner, env),
        }
    }

    fn make_closure(&self, node: &Ir, literal: &FnLiteral, env: &Env, is_async: bool) -> Value {
        let body = ClosureBody {
            params: literal.params.clone(),
            body: literal.body.clone(),
            is_async,
            literal: node.literal_form(),
        };
        Value::function(env.clone(), Rc::new(body))
    }

    fn call_closure(&self, callee: &Value, args: &[Value], call_site: &[Location]) -> Eval {
        let error = |message: String| {
            Eval::Error(RuntimeError::at(message, call_site.to_vec()))
        };
        let Some(payload) = callee.function_body() else {
            return error("call of a non-function value".to_string());
        };
        let Ok(body) = payload.downcast::<ClosureBody>() else {
            return error("call of a foreign function body".to_string());
        };
        let Some(captured) = callee.function_env() else {
            return error("function environment has been collected".to_string());
        };
        if args.len() != body.params.len() {
            return error(format!(
                "function expects {} arguments, got {}",
                body.params.len(),
                args.len()
            ));
        }
        let scope = captured.child();
        for (param, arg) in body.params.iter().zip(args.iter()) {
            scope.define(param.clone(), arg.clone());
        }
        cycle::enter_call();
        let out = self.eval(&body.body, &scope);
        cycle::leave_call();
        match out {
            Eval::Return(v) | Eval::Value(v) => Eval::Value(v),
            Eval::Break(_) => error("break outside of loop".to_string()),
            Eval::Continue(_) => error("continue outside of loop".to_string()),
            Eval::Error(e) => Eval::Error(e.push_locations(call_site)),
        }
    }

    fn run_loop<T>(
        &self,
        label: &Option<String>,
        items: &[T],
        body: &Ir,
        env: &Env,
        mut bind: impl FnMut(&Env, &T),
    ) -> Eval {
        for item in items {
            let scope = env.child();
            bind(&scope, item);
            match self.eval(body, &scope) {
                Eval::Value(_) => {}
                Eval::Break(l) if label_matches(label, &l) => break,
                Eval::Continue(l) if label_matches(label, &l) => continue,
                other => return other,
            }
        }
        Eval::Value(Value::null())
    }

    fn node_elem_type(&self, node: &Ir) -> Option<Type> {
        node.ty().unwrap_recursive().and_then(|t| t.elem())
    }

    fn err(&self, node: &Ir, message: impl Into<String>) -> Eval {
        Eval::Error(RuntimeError::at(message, node.locations().to_vec()))
    }
}

/// An absent control-flow label matches the innermost loop; a present label
/// matches only the loop carrying it.
fn label_matches(loop_label: &Option<String>, control_label: &Option<String>) -> bool {
    control_label.is_none() || control_label == loop_label
}

fn is_noop_literal(node: &Ir) -> bool {
    matches!(node.kind(), IrKind::Literal(v) if v.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::MatchCase;
    use tern_core::Field;

    fn lit_int(n: i64) -> Ir {
        Ir::new(IrKind::Literal(Value::integer(n)), Type::integer())
    }

    fn var(name: &str) -> Ir {
        Ir::new(IrKind::Variable(name.to_string()), Type::integer())
    }

    fn let_(name: &str, value: Ir) -> Ir {
        Ir::new(
            IrKind::Let {
                name: name.to_string(),
                value,
            },
            Type::null(),
        )
    }

    fn assign(name: &str, value: Ir) -> Ir {
        Ir::new(
            IrKind::Assign {
                name: name.to_string(),
                value,
            },
            Type::null(),
        )
    }

    fn block(statements: Vec<Ir>) -> Ir {
        Ir::new(IrKind::Block(statements), Type::null())
    }

    fn add(a: Ir, b: Ir) -> Ir {
        // The default registry carries no arithmetic; tests install "add".
        Ir::new(
            IrKind::Builtin {
                name: "add".to_string(),
                type_args: vec![],
                args: vec![a, b],
            },
            Type::integer(),
        )
    }

    fn evaluator_with_add() -> Evaluator {
        let mut evaluator = Evaluator::new();
        evaluator.builtins_mut().register_simple("add", |args| {
            let a = args[0].as_integer().ok_or("add: not an integer")?;
            let b = args[1].as_integer().ok_or("add: not an integer")?;
            Ok(Value::integer(a + b))
        });
        evaluator
    }

    fn value_of(out: Eval) -> Value {
        match out {
            Eval::Value(v) => v,
            other => panic!("expected value, got {:?}", other),
        }
    }

    #[test]
    fn test_sum_of_array_loop() {
        let evaluator = evaluator_with_add();
        let env = Env::root();
        let arr_ty = Type::array(Type::integer());
        let program = block(vec![
            let_(
                "arr",
                Ir::new(
                    IrKind::NewArray(vec![lit_int(10), lit_int(20), lit_int(30)]),
                    arr_ty,
                ),
            ),
            let_("sum", lit_int(0)),
            Ir::new(
                IrKind::ForArray {
                    label: None,
                    var: "item".to_string(),
                    iterable: var("arr"),
                    body: assign("sum", add(var("sum"), var("item"))),
                },
                Type::null(),
            ),
            var("sum"),
        ]);
        let out = value_of(evaluator.run(&program, &env));
        assert_eq!(out.as_integer(), Some(60));
    }

    #[test]
    fn test_mutable_closure_capture() {
        let evaluator = evaluator_with_add();
        let env = Env::root();
        let fn_ty = Type::function(vec![], Type::integer());
        let inc_body = block(vec![
            assign("counter", add(var("counter"), lit_int(1))),
            var("counter"),
        ]);
        let call_inc = Ir::new(
            IrKind::Call {
                callee: var("inc"),
                args: vec![],
            },
            Type::integer(),
        );
        let program = block(vec![
            let_("counter", lit_int(0)),
            let_(
                "inc",
                Ir::new(
                    IrKind::Function(FnLiteral {
                        params: vec![],
                        body: inc_body,
                    }),
                    fn_ty,
                ),
            ),
            call_inc.clone(),
            call_inc.clone(),
            call_inc,
        ]);
        let out = value_of(evaluator.run(&program, &env));
        assert_eq!(out.as_integer(), Some(3));
        assert_eq!(env.lookup("counter").unwrap().as_integer(), Some(3));
    }

    #[test]
    fn test_if_truthiness() {
        let evaluator = Evaluator::new();
        let env = Env::root();
        let node = Ir::new(
            IrKind::If {
                condition: Ir::new(IrKind::Literal(Value::null()), Type::null()),
                then: lit_int(1),
                otherwise: None,
            },
            Type::null(),
        );
        assert!(value_of(evaluator.run(&node, &env)).is_null());
    }

    #[test]
    fn test_try_catch_binds_message_and_stack() {
        let evaluator = Evaluator::new();
        let env = Env::root();
        let raise = Ir::with_locations(
            IrKind::Raise(Ir::new(
                IrKind::Literal(Value::string("boom")),
                Type::string(),
            )),
            Type::never(),
            vec![Location::new("main.tn", 2, 5)],
        );
        let node = Ir::new(
            IrKind::Try {
                body: raise,
                message_var: "msg".to_string(),
                stack_var: "stack".to_string(),
                catch: block(vec![var("stack"), var("msg")]),
                finally: None,
            },
            Type::string(),
        );
        let out = value_of(evaluator.run(&node, &env));
        assert_eq!(out.as_string(), Some("boom"));
    }

    #[test]
    fn test_finally_overrides_with_late_error() {
        let evaluator = Evaluator::new();
        let env = Env::root();
        let node = Ir::new(
            IrKind::Try {
                body: lit_int(1),
                message_var: "m".to_string(),
                stack_var: "s".to_string(),
                catch: lit_int(2),
                finally: Some(Ir::new(
                    IrKind::Raise(Ir::new(
                        IrKind::Literal(Value::string("late")),
                        Type::string(),
                    )),
                    Type::never(),
                )),
            },
            Type::integer(),
        );
        match evaluator.run(&node, &env) {
            Eval::Error(e) => assert_eq!(e.message, "late"),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_labeled_break_propagates_past_inner_loop() {
        let evaluator = Evaluator::new();
        let env = Env::root();
        // outer: while true { inner: while true { break outer } }; 7
        let inner = Ir::new(
            IrKind::While {
                label: Some("inner".to_string()),
                condition: Ir::new(IrKind::Literal(Value::boolean(true)), Type::boolean()),
                body: Ir::new(
                    IrKind::Break(Some("outer".to_string())),
                    Type::never(),
                ),
            },
            Type::null(),
        );
        let outer = Ir::new(
            IrKind::While {
                label: Some("outer".to_string()),
                condition: Ir::new(IrKind::Literal(Value::boolean(true)), Type::boolean()),
                body: inner,
            },
            Type::null(),
        );
        let program = block(vec![outer, lit_int(7)]);
        assert_eq!(value_of(evaluator.run(&program, &env)).as_integer(), Some(7));
    }

    #[test]
    fn test_match_selects_case_and_binds_payload() {
        let evaluator = Evaluator::new();
        let env = Env::root();
        let ty = Type::variant_of(vec![
            Field::new("none", Type::null()),
            Field::new("some", Type::integer()),
        ]);
        let subject = Ir::new(
            IrKind::VariantNew {
                case: "some".to_string(),
                payload: lit_int(41),
            },
            ty.clone(),
        );
        let node = Ir::new(
            IrKind::Match {
                subject,
                cases: vec![
                    MatchCase {
                        name: "none".to_string(),
                        bind: None,
                        body: lit_int(0),
                    },
                    MatchCase {
                        name: "some".to_string(),
                        bind: Some("x".to_string()),
                        body: var("x"),
                    },
                ],
            },
            Type::integer(),
        );
        assert_eq!(value_of(evaluator.run(&node, &env)).as_integer(), Some(41));
    }

    #[test]
    fn test_call_appends_location() {
        let evaluator = Evaluator::new();
        let env = Env::root();
        let raise = Ir::with_locations(
            IrKind::Raise(Ir::new(
                IrKind::Literal(Value::string("inner")),
                Type::string(),
            )),
            Type::never(),
            vec![Location::new("lib.tn", 1, 1)],
        );
        let f = Ir::new(
            IrKind::Function(FnLiteral {
                params: vec![],
                body: raise,
            }),
            Type::function(vec![], Type::never()),
        );
        let call = Ir::with_locations(
            IrKind::Call {
                callee: f,
                args: vec![],
            },
            Type::never(),
            vec![Location::new("main.tn", 9, 3)],
        );
        match evaluator.run(&call, &env) {
            Eval::Error(e) => {
                assert_eq!(e.locations.len(), 2);
                assert_eq!(e.locations[0].filename, "lib.tn");
                assert_eq!(e.locations[1].filename, "main.tn");
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_undefined_variable() {
        let evaluator = Evaluator::new();
        let env = Env::root();
        match evaluator.run(&var("ghost"), &env) {
            Eval::Error(e) => assert!(e.message.contains("undefined variable")),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_return_unwraps_at_call_boundary() {
        let evaluator = Evaluator::new();
        let env = Env::root();
        let body = block(vec![
            Ir::new(IrKind::Return(lit_int(5)), Type::never()),
            lit_int(9),
        ]);
        let f = Ir::new(
            IrKind::Function(FnLiteral {
                params: vec![],
                body,
            }),
            Type::function(vec![], Type::integer()),
        );
        let call = Ir::new(
            IrKind::Call {
                callee: f,
                args: vec![],
            },
            Type::integer(),
        );
        assert_eq!(value_of(evaluator.run(&call, &env)).as_integer(), Some(5));
    }
}

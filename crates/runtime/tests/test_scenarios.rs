//! End-to-end evaluator scenarios
//!
//! Each test builds a small IR program by hand, runs it through a fresh
//! evaluator, and checks the observable outcome: loop accumulation, mutable
//! closure capture, error propagation with location stacks, finally
//! semantics, and labeled control flow.

use tern_core::{Env, Field, Type, Value, compare, equal};
use tern_runtime::error::Location;
use tern_runtime::{Eval, Evaluator, FnLiteral, Ir, IrKind};

fn lit_int(n: i64) -> Ir {
    Ir::new(IrKind::Literal(Value::integer(n)), Type::integer())
}

fn lit_str(s: &str) -> Ir {
    Ir::new(IrKind::Literal(Value::string(s)), Type::string())
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

fn call(callee: Ir, args: Vec<Ir>) -> Ir {
    Ir::new(IrKind::Call { callee, args }, Type::integer())
}

fn add(a: Ir, b: Ir) -> Ir {
    Ir::new(
        IrKind::Builtin {
            name: "add".to_string(),
            type_args: vec![],
            args: vec![a, b],
        },
        Type::integer(),
    )
}

fn evaluator() -> Evaluator {
    let mut evaluator = Evaluator::new();
    evaluator.builtins_mut().register_simple("add", |args| {
        let a = args[0].as_integer().ok_or("add: not an integer")?;
        let b = args[1].as_integer().ok_or("add: not an integer")?;
        Ok(Value::integer(a + b))
    });
    evaluator
}

fn run_value(evaluator: &Evaluator, program: &Ir, env: &Env) -> Value {
    match evaluator.run(program, env) {
        Eval::Value(v) => v,
        other => panic!("expected a value, got {:?}", other),
    }
}

#[test]
fn test_sum_of_array() {
    let evaluator = evaluator();
    let env = Env::root();
    let program = block(vec![
        let_(
            "arr",
            Ir::new(
                IrKind::NewArray(vec![lit_int(10), lit_int(20), lit_int(30)]),
                Type::array(Type::integer()),
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
    assert_eq!(run_value(&evaluator, &program, &env).as_integer(), Some(60));
}

#[test]
fn test_mutable_closure_capture() {
    let evaluator = evaluator();
    let env = Env::root();
    let inc = Ir::new(
        IrKind::Function(FnLiteral {
            params: vec![],
            body: block(vec![
                assign("counter", add(var("counter"), lit_int(1))),
                var("counter"),
            ]),
        }),
        Type::function(vec![], Type::integer()),
    );
    let program = block(vec![
        let_("counter", lit_int(0)),
        let_("inc", inc),
        call(var("inc"), vec![]),
        call(var("inc"), vec![]),
        call(var("inc"), vec![]),
    ]);
    assert_eq!(run_value(&evaluator, &program, &env).as_integer(), Some(3));
    assert_eq!(env.lookup("counter").unwrap().as_integer(), Some(3));
}

#[test]
fn test_sibling_closures_share_environment() {
    let evaluator = evaluator();
    let env = Env::root();
    let bump = Ir::new(
        IrKind::Function(FnLiteral {
            params: vec![],
            body: assign("n", add(var("n"), lit_int(10))),
        }),
        Type::function(vec![], Type::null()),
    );
    let read = Ir::new(
        IrKind::Function(FnLiteral {
            params: vec![],
            body: var("n"),
        }),
        Type::function(vec![], Type::integer()),
    );
    let program = block(vec![
        let_("n", lit_int(5)),
        let_("bump", bump),
        let_("read", read),
        call(var("bump"), vec![]),
        call(var("read"), vec![]),
    ]);
    assert_eq!(run_value(&evaluator, &program, &env).as_integer(), Some(15));
}

#[test]
fn test_try_catch_location_stack() {
    let evaluator = evaluator();
    let env = Env::root();
    // raise inside a function, called from a located call site: the catch
    // sees both frames, innermost first.
    let raiser = Ir::new(
        IrKind::Function(FnLiteral {
            params: vec![],
            body: Ir::with_locations(
                IrKind::Raise(lit_str("boom")),
                Type::never(),
                vec![Location::new("lib.tn", 3, 9)],
            ),
        }),
        Type::function(vec![], Type::never()),
    );
    let located_call = Ir::with_locations(
        IrKind::Call {
            callee: var("f"),
            args: vec![],
        },
        Type::never(),
        vec![Location::new("main.tn", 12, 1)],
    );
    let program = block(vec![
        let_("f", raiser),
        Ir::new(
            IrKind::Try {
                body: located_call,
                message_var: "msg".to_string(),
                stack_var: "stack".to_string(),
                catch: block(vec![var("stack")]),
                finally: None,
            },
            Type::null(),
        ),
    ]);
    let stack = run_value(&evaluator, &program, &env);
    let frames = stack.array_items().unwrap();
    assert!(frames.len() >= 2);
    for frame in frames {
        assert!(frame.field("filename").is_some());
        assert!(frame.field("line").is_some());
        assert!(frame.field("column").is_some());
    }
    assert_eq!(frames[0].field("filename").unwrap().as_string(), Some("lib.tn"));
    assert_eq!(frames[1].field("filename").unwrap().as_string(), Some("main.tn"));
}

#[test]
fn test_catch_yields_message() {
    let evaluator = evaluator();
    let env = Env::root();
    let program = Ir::new(
        IrKind::Try {
            body: Ir::new(IrKind::Raise(lit_str("boom")), Type::never()),
            message_var: "msg".to_string(),
            stack_var: "stack".to_string(),
            catch: Ir::new(IrKind::Variable("msg".to_string()), Type::string()),
            finally: None,
        },
        Type::string(),
    );
    assert_eq!(
        run_value(&evaluator, &program, &env).as_string(),
        Some("boom")
    );
}

#[test]
fn test_finally_overrides_everything() {
    let evaluator = evaluator();
    let env = Env::root();
    let program = Ir::new(
        IrKind::Try {
            body: lit_int(1),
            message_var: "m".to_string(),
            stack_var: "s".to_string(),
            catch: lit_int(2),
            finally: Some(Ir::new(IrKind::Raise(lit_str("late")), Type::never())),
        },
        Type::integer(),
    );
    match evaluator.run(&program, &env) {
        Eval::Error(e) => assert_eq!(e.message, "late"),
        other => panic!("expected error, got {:?}", other),
    }
}

#[test]
fn test_control_flow_passes_through_try() {
    let evaluator = evaluator();
    let env = Env::root();
    // A break inside a try body is not caught; the loop exits normally.
    let loop_body = Ir::new(
        IrKind::Try {
            body: Ir::new(IrKind::Break(None), Type::never()),
            message_var: "m".to_string(),
            stack_var: "s".to_string(),
            catch: lit_int(0),
            finally: None,
        },
        Type::null(),
    );
    let program = block(vec![
        Ir::new(
            IrKind::While {
                label: None,
                condition: Ir::new(IrKind::Literal(Value::boolean(true)), Type::boolean()),
                body: loop_body,
            },
            Type::null(),
        ),
        lit_int(11),
    ]);
    assert_eq!(run_value(&evaluator, &program, &env).as_integer(), Some(11));
}

#[test]
fn test_unlabeled_break_exits_innermost_loop_only() {
    let evaluator = evaluator();
    let env = Env::root();
    // for item in [1,2,3] { inner: while true { break } ; sum = sum + item }
    let inner = Ir::new(
        IrKind::While {
            label: Some("inner".to_string()),
            condition: Ir::new(IrKind::Literal(Value::boolean(true)), Type::boolean()),
            body: Ir::new(IrKind::Break(None), Type::never()),
        },
        Type::null(),
    );
    let program = block(vec![
        let_("sum", lit_int(0)),
        Ir::new(
            IrKind::ForArray {
                label: None,
                var: "item".to_string(),
                iterable: Ir::new(
                    IrKind::NewArray(vec![lit_int(1), lit_int(2), lit_int(3)]),
                    Type::array(Type::integer()),
                ),
                body: block(vec![inner, assign("sum", add(var("sum"), var("item")))]),
            },
            Type::null(),
        ),
        var("sum"),
    ]);
    assert_eq!(run_value(&evaluator, &program, &env).as_integer(), Some(6));
}

#[test]
fn test_continue_with_label_skips_inner_loop() {
    let evaluator = evaluator();
    let env = Env::root();
    // outer: for i in [1,2,3] { while true { continue outer }; sum = sum + i }
    // The labeled continue propagates past the inner loop, so sum stays 0.
    let inner = Ir::new(
        IrKind::While {
            label: None,
            condition: Ir::new(IrKind::Literal(Value::boolean(true)), Type::boolean()),
            body: Ir::new(IrKind::Continue(Some("outer".to_string())), Type::never()),
        },
        Type::null(),
    );
    let program = block(vec![
        let_("sum", lit_int(0)),
        Ir::new(
            IrKind::ForArray {
                label: Some("outer".to_string()),
                var: "i".to_string(),
                iterable: Ir::new(
                    IrKind::NewArray(vec![lit_int(1), lit_int(2), lit_int(3)]),
                    Type::array(Type::integer()),
                ),
                body: block(vec![inner, assign("sum", add(var("sum"), var("i")))]),
            },
            Type::null(),
        ),
        var("sum"),
    ]);
    assert_eq!(run_value(&evaluator, &program, &env).as_integer(), Some(0));
}

#[test]
fn test_heterogeneous_sort_order() {
    let mut items = vec![
        Value::boolean(true),
        Value::integer(0),
        Value::integer(-1),
        Value::string("a"),
        Value::null(),
    ];
    items.sort_by(compare);
    let expected = [
        Value::null(),
        Value::boolean(true),
        Value::integer(-1),
        Value::integer(0),
        Value::string("a"),
    ];
    for (got, want) in items.iter().zip(expected.iter()) {
        assert!(equal(got, want));
    }
}

#[test]
fn test_match_on_variant() {
    let evaluator = evaluator();
    let env = Env::root();
    let ty = Type::variant_of(vec![
        Field::new("err", Type::string()),
        Field::new("ok", Type::integer()),
    ]);
    let program = Ir::new(
        IrKind::Match {
            subject: Ir::new(
                IrKind::VariantNew {
                    case: "ok".to_string(),
                    payload: lit_int(33),
                },
                ty,
            ),
            cases: vec![
                tern_runtime::MatchCase {
                    name: "err".to_string(),
                    bind: Some("e".to_string()),
                    body: lit_int(-1),
                },
                tern_runtime::MatchCase {
                    name: "ok".to_string(),
                    bind: Some("v".to_string()),
                    body: Ir::new(IrKind::Variable("v".to_string()), Type::integer()),
                },
            ],
        },
        Type::integer(),
    );
    assert_eq!(run_value(&evaluator, &program, &env).as_integer(), Some(33));
}

#[test]
fn test_async_markers_execute_synchronously() {
    let evaluator = evaluator();
    let env = Env::root();
    let f = Ir::new(
        IrKind::AsyncFunction(FnLiteral {
            params: vec!["x".to_string()],
            body: add(var("x"), lit_int(1)),
        }),
        Type::async_function(vec![Type::integer()], Type::integer()),
    );
    let program = Ir::new(
        IrKind::AsyncCall {
            callee: f,
            args: vec![lit_int(41)],
        },
        Type::integer(),
    );
    assert_eq!(run_value(&evaluator, &program, &env).as_integer(), Some(42));
}

#[test]
fn test_platform_function_error_carries_location() {
    let mut evaluator = Evaluator::new();
    evaluator
        .platform_mut()
        .register("host_fail", |_args| Err("host refused".to_string()));
    let env = Env::root();
    let program = Ir::with_locations(
        IrKind::Platform {
            name: "host_fail".to_string(),
            args: vec![],
        },
        Type::null(),
        vec![Location::new("main.tn", 4, 2)],
    );
    match evaluator.run(&program, &env) {
        Eval::Error(e) => {
            assert_eq!(e.message, "host refused");
            assert_eq!(e.locations[0].filename, "main.tn");
        }
        other => panic!("expected error, got {:?}", other),
    }
}

#[test]
fn test_host_call_function() {
    let evaluator = evaluator();
    let env = Env::root();
    let f = Ir::new(
        IrKind::Function(FnLiteral {
            params: vec!["a".to_string(), "b".to_string()],
            body: add(var("a"), var("b")),
        }),
        Type::function(vec![Type::integer(), Type::integer()], Type::integer()),
    );
    let closure = run_value(&evaluator, &f, &env);
    let out = evaluator
        .call_function(&closure, &[Value::integer(2), Value::integer(3)])
        .into_result()
        .unwrap();
    assert_eq!(out.as_integer(), Some(5));
    // Arity mismatch is an error, not a crash.
    assert!(
        evaluator
            .call_function(&closure, &[Value::integer(1)])
            .into_result()
            .is_err()
    );
}

//! IR ↔ value reflection
//!
//! The IR is homoiconic: every node is describable as a value of the
//! recursive shape returned by [`ir_type`], a struct of the node's kind,
//! its static type (in the type-of-types shape), and its source-location
//! array. [`value_of_ir`] and [`ir_of_value`] convert both ways.
//!
//! A function literal reconstructed from its value form keeps a back
//! reference to that form, and [`value_of_ir`] returns the remembered form
//! verbatim, so reflect → evaluate → reflect reproduces the original bytes.

use crate::error::{location_struct_type, locations_from_value, locations_to_value};
use crate::ir::{FnLiteral, Ir, IrKind, MatchCase};
use crate::reflect::{
    struct_value, type_of_value, type_type, value_from_value, value_of_type, value_of_value,
};
use tern_core::{Field, Type, Value};

thread_local! {
    static IR_TYPE: Type = build_ir_type();
}

/// The type of reflected IR nodes.
pub fn ir_type() -> Type {
    IR_TYPE.with(Type::clone)
}

fn option_type(inner: Type) -> Type {
    Type::variant_of(vec![
        Field::new("None", Type::null()),
        Field::new("Some", inner),
    ])
}

fn build_ir_type() -> Type {
    Type::recursive(|me| {
        let tt = type_type();
        let vt = crate::reflect::value_type();
        let opt_node = option_type(me.clone());
        let opt_str = option_type(Type::string());
        let nodes = Type::array(me.clone());
        let loop_payload = |extra: Vec<Field>| {
            let mut fields = vec![
                Field::new("body", me.clone()),
                Field::new("iterable", me.clone()),
                Field::new("label", opt_str.clone()),
            ];
            fields.extend(extra);
            Type::struct_of(fields)
        };
        let fn_payload = Type::struct_of(vec![
            Field::new("body", me.clone()),
            Field::new("params", Type::array(Type::string())),
        ]);
        let call_payload = Type::struct_of(vec![
            Field::new("args", nodes.clone()),
            Field::new("callee", me.clone()),
        ]);
        let kind = Type::variant_of(vec![
            Field::new("Literal", vt),
            Field::new("Variable", Type::string()),
            Field::new(
                "Let",
                Type::struct_of(vec![
                    Field::new("name", Type::string()),
                    Field::new("value", me.clone()),
                ]),
            ),
            Field::new(
                "Assign",
                Type::struct_of(vec![
                    Field::new("name", Type::string()),
                    Field::new("value", me.clone()),
                ]),
            ),
            Field::new("Block", nodes.clone()),
            Field::new(
                "If",
                Type::struct_of(vec![
                    Field::new("condition", me.clone()),
                    Field::new("otherwise", opt_node.clone()),
                    Field::new("then", me.clone()),
                ]),
            ),
            Field::new(
                "Match",
                Type::struct_of(vec![
                    Field::new(
                        "cases",
                        Type::array(Type::struct_of(vec![
                            Field::new("bind", opt_str.clone()),
                            Field::new("body", me.clone()),
                            Field::new("name", Type::string()),
                        ])),
                    ),
                    Field::new("subject", me.clone()),
                ]),
            ),
            Field::new(
                "While",
                Type::struct_of(vec![
                    Field::new("body", me.clone()),
                    Field::new("condition", me.clone()),
                    Field::new("label", opt_str.clone()),
                ]),
            ),
            Field::new(
                "ForArray",
                loop_payload(vec![Field::new("var", Type::string())]),
            ),
            Field::new(
                "ForSet",
                loop_payload(vec![Field::new("var", Type::string())]),
            ),
            Field::new(
                "ForDict",
                loop_payload(vec![
                    Field::new("key", Type::string()),
                    Field::new("value", Type::string()),
                ]),
            ),
            Field::new("Function", fn_payload.clone()),
            Field::new("AsyncFunction", fn_payload),
            Field::new("Call", call_payload.clone()),
            Field::new("AsyncCall", call_payload),
            Field::new(
                "Builtin",
                Type::struct_of(vec![
                    Field::new("args", nodes.clone()),
                    Field::new("name", Type::string()),
                    Field::new("types", Type::array(tt.clone())),
                ]),
            ),
            Field::new(
                "Platform",
                Type::struct_of(vec![
                    Field::new("args", nodes.clone()),
                    Field::new("name", Type::string()),
                ]),
            ),
            Field::new("Return", me.clone()),
            Field::new("Break", opt_str.clone()),
            Field::new("Continue", opt_str.clone()),
            Field::new("Raise", me.clone()),
            Field::new(
                "Try",
                Type::struct_of(vec![
                    Field::new("body", me.clone()),
                    Field::new("catch", me.clone()),
                    Field::new("finally", opt_node.clone()),
                    Field::new("message", Type::string()),
                    Field::new("stack", Type::string()),
                ]),
            ),
            Field::new("NewArray", nodes.clone()),
            Field::new("NewSet", nodes.clone()),
            Field::new(
                "NewDict",
                Type::array(Type::struct_of(vec![
                    Field::new("key", me.clone()),
                    Field::new("value", me.clone()),
                ])),
            ),
            Field::new("NewRef", me.clone()),
            Field::new("NewVector", nodes.clone()),
            Field::new(
                "NewMatrix",
                Type::struct_of(vec![
                    Field::new("cols", Type::integer()),
                    Field::new("items", nodes.clone()),
                    Field::new("rows", Type::integer()),
                ]),
            ),
            Field::new("Struct", nodes.clone()),
            Field::new(
                "GetField",
                Type::struct_of(vec![
                    Field::new("field", Type::string()),
                    Field::new("subject", me.clone()),
                ]),
            ),
            Field::new(
                "Variant",
                Type::struct_of(vec![
                    Field::new("case", Type::string()),
                    Field::new("value", me.clone()),
                ]),
            ),
            Field::new("WrapRecursive", me.clone()),
            Field::new("UnwrapRecursive", me.clone()),
        ]);
        Type::struct_of(vec![
            Field::new("kind", kind),
            Field::new("locations", Type::array(location_struct_type())),
            Field::new("type", tt),
        ])
    })
}

/// The struct shape of reflected nodes (the wrapper's inner term).
fn node_struct_type() -> Result<Type, String> {
    ir_type()
        .unwrap_recursive()
        .ok_or_else(|| "IR shape is not finalized".to_string())
}

fn kind_variant_type() -> Result<Type, String> {
    node_struct_type()?
        .member_type("kind")
        .ok_or_else(|| "IR shape lacks a kind field".to_string())
}

fn mk_option(ty: &Type, value: Option<Value>) -> Result<Value, String> {
    match value {
        Some(v) => Value::variant(ty.clone(), "Some", v),
        None => Value::variant(ty.clone(), "None", Value::null()),
    }
}

fn option_of(value: &Value) -> Result<Option<Value>, String> {
    let (_, case, payload) = value
        .variant_parts()
        .ok_or_else(|| "option must be a variant".to_string())?;
    match case {
        "None" => Ok(None),
        "Some" => Ok(Some(payload.clone())),
        other => Err(format!("unknown option case '{}'", other)),
    }
}

fn string_option(ty: &Type, value: &Option<String>) -> Result<Value, String> {
    mk_option(ty, value.as_ref().map(|s| Value::string(s.clone())))
}

/// Reflect an IR node into its value form.
pub fn value_of_ir(node: &Ir) -> Result<Value, String> {
    // Function literals re-serialize as the exact value they came from.
    if let Some(form) = node.literal_form() {
        return Ok(form);
    }
    let kind_ty = kind_variant_type()?;
    let (case, payload) = encode_kind(node, &kind_ty)?;
    let kind_value = Value::variant(kind_ty, case, payload)?;
    struct_value(
        node_struct_type()?,
        vec![
            ("kind", kind_value),
            ("locations", locations_to_value(node.locations())),
            ("type", value_of_type(node.ty())?),
        ],
    )
}

fn nodes_value(nodes: &[Ir]) -> Result<Value, String> {
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        out.push(value_of_ir(node)?);
    }
    Ok(Value::array(ir_type(), out))
}

fn encode_kind(node: &Ir, kind_ty: &Type) -> Result<(&'static str, Value), String> {
    let payload_of = |case: &str| -> Result<Type, String> {
        kind_ty
            .member_type(case)
            .ok_or_else(|| format!("IR shape lacks a {} case", case))
    };
    let opt_field = |payload_ty: &Type, name: &str| -> Result<Type, String> {
        payload_ty
            .member_type(name)
            .ok_or_else(|| format!("IR payload lacks a {} field", name))
    };
    match node.kind() {
        IrKind::Literal(v) => Ok(("Literal", value_of_value(v)?)),
        IrKind::Variable(name) => Ok(("Variable", Value::string(name.clone()))),
        IrKind::Let { name, value } => {
            let ty = payload_of("Let")?;
            Ok((
                "Let",
                struct_value(
                    ty,
                    vec![
                        ("name", Value::string(name.clone())),
                        ("value", value_of_ir(value)?),
                    ],
                )?,
            ))
        }
        IrKind::Assign { name, value } => {
            let ty = payload_of("Assign")?;
            Ok((
                "Assign",
                struct_value(
                    ty,
                    vec![
                        ("name", Value::string(name.clone())),
                        ("value", value_of_ir(value)?),
                    ],
                )?,
            ))
        }
        IrKind::Block(statements) => Ok(("Block", nodes_value(statements)?)),
        IrKind::If { condition, then, otherwise } => {
            let ty = payload_of("If")?;
            let opt_ty = opt_field(&ty, "otherwise")?;
            let otherwise_value = match otherwise {
                Some(node) => Some(value_of_ir(node)?),
                None => None,
            };
            Ok((
                "If",
                struct_value(
                    ty,
                    vec![
                        ("condition", value_of_ir(condition)?),
                        ("otherwise", mk_option(&opt_ty, otherwise_value)?),
                        ("then", value_of_ir(then)?),
                    ],
                )?,
            ))
        }
        IrKind::Match { subject, cases } => {
            let ty = payload_of("Match")?;
            let cases_ty = opt_field(&ty, "cases")?;
            let case_ty = cases_ty
                .elem()
                .ok_or_else(|| "Match cases payload is not an array".to_string())?;
            let bind_ty = opt_field(&case_ty, "bind")?;
            let mut out = Vec::with_capacity(cases.len());
            for case in cases {
                out.push(struct_value(
                    case_ty.clone(),
                    vec![
                        ("bind", string_option(&bind_ty, &case.bind)?),
                        ("body", value_of_ir(&case.body)?),
                        ("name", Value::string(case.name.clone())),
                    ],
                )?);
            }
            Ok((
                "Match",
                struct_value(
                    ty,
                    vec![
                        ("cases", Value::array(case_ty, out)),
                        ("subject", value_of_ir(subject)?),
                    ],
                )?,
            ))
        }
        IrKind::While { label, condition, body } => {
            let ty = payload_of("While")?;
            let label_ty = opt_field(&ty, "label")?;
            Ok((
                "While",
                struct_value(
                    ty,
                    vec![
                        ("body", value_of_ir(body)?),
                        ("condition", value_of_ir(condition)?),
                        ("label", string_option(&label_ty, label)?),
                    ],
                )?,
            ))
        }
        IrKind::ForArray { label, var, iterable, body } => {
            encode_for("ForArray", label, iterable, body, &[("var", var)], &payload_of)
        }
        IrKind::ForSet { label, var, iterable, body } => {
            encode_for("ForSet", label, iterable, body, &[("var", var)], &payload_of)
        }
        IrKind::ForDict { label, key_var, value_var, iterable, body } => encode_for(
            "ForDict",
            label,
            iterable,
            body,
            &[("key", key_var), ("value", value_var)],
            &payload_of,
        ),
        IrKind::Function(literal) => Ok(("Function", encode_fn(literal, &payload_of("Function")?)?)),
        IrKind::AsyncFunction(literal) => Ok((
            "AsyncFunction",
            encode_fn(literal, &payload_of("AsyncFunction")?)?,
        )),
        IrKind::Call { callee, args } => Ok(("Call", encode_call(callee, args, &payload_of("Call")?)?)),
        IrKind::AsyncCall { callee, args } => Ok((
            "AsyncCall",
            encode_call(callee, args, &payload_of("AsyncCall")?)?,
        )),
        IrKind::Builtin { name, type_args, args } => {
            let ty = payload_of("Builtin")?;
            let mut types = Vec::with_capacity(type_args.len());
            for t in type_args {
                types.push(value_of_type(t)?);
            }
            Ok((
                "Builtin",
                struct_value(
                    ty,
                    vec![
                        ("args", nodes_value(args)?),
                        ("name", Value::string(name.clone())),
                        ("types", Value::array(type_type(), types)),
                    ],
                )?,
            ))
        }
        IrKind::Platform { name, args } => {
            let ty = payload_of("Platform")?;
            Ok((
                "Platform",
                struct_value(
                    ty,
                    vec![
                        ("args", nodes_value(args)?),
                        ("name", Value::string(name.clone())),
                    ],
                )?,
            ))
        }
        IrKind::Return(value) => Ok(("Return", value_of_ir(value)?)),
        IrKind::Break(label) => {
            let ty = payload_of("Break")?;
            Ok(("Break", string_option(&ty, label)?))
        }
        IrKind::Continue(label) => {
            let ty = payload_of("Continue")?;
            Ok(("Continue", string_option(&ty, label)?))
        }
        IrKind::Raise(message) => Ok(("Raise", value_of_ir(message)?)),
        IrKind::Try { body, message_var, stack_var, catch, finally } => {
            let ty = payload_of("Try")?;
            let finally_ty = opt_field(&ty, "finally")?;
            let finally_value = match finally {
                Some(node) => Some(value_of_ir(node)?),
                None => None,
            };
            Ok((
                "Try",
                struct_value(
                    ty,
                    vec![
                        ("body", value_of_ir(body)?),
                        ("catch", value_of_ir(catch)?),
                        ("finally", mk_option(&finally_ty, finally_value)?),
                        ("message", Value::string(message_var.clone())),
                        ("stack", Value::string(stack_var.clone())),
                    ],
                )?,
            ))
        }
        IrKind::NewArray(items) => Ok(("NewArray", nodes_value(items)?)),
        IrKind::NewSet(items) => Ok(("NewSet", nodes_value(items)?)),
        IrKind::NewDict(entries) => {
            let entries_ty = payload_of("NewDict")?;
            let entry_ty = entries_ty
                .elem()
                .ok_or_else(|| "NewDict payload is not an array".to_string())?;
            let mut out = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                out.push(struct_value(
                    entry_ty.clone(),
                    vec![
                        ("key", value_of_ir(key)?),
                        ("value", value_of_ir(value)?),
                    ],
                )?);
            }
            Ok(("NewDict", Value::array(entry_ty, out)))
        }
        IrKind::NewRef(target) => Ok(("NewRef", value_of_ir(target)?)),
        IrKind::NewVector(items) => Ok(("NewVector", nodes_value(items)?)),
        IrKind::NewMatrix { rows, cols, items } => {
            let ty = payload_of("NewMatrix")?;
            Ok((
                "NewMatrix",
                struct_value(
                    ty,
                    vec![
                        ("cols", Value::integer(*cols as i64)),
                        ("items", nodes_value(items)?),
                        ("rows", Value::integer(*rows as i64)),
                    ],
                )?,
            ))
        }
        IrKind::StructNew(fields) => Ok(("Struct", nodes_value(fields)?)),
        IrKind::GetField { subject, field } => {
            let ty = payload_of("GetField")?;
            Ok((
                "GetField",
                struct_value(
                    ty,
                    vec![
                        ("field", Value::string(field.clone())),
                        ("subject", value_of_ir(subject)?),
                    ],
                )?,
            ))
        }
        IrKind::VariantNew { case, payload } => {
            let ty = payload_of("Variant")?;
            Ok((
                "Variant",
                struct_value(
                    ty,
                    vec![
                        ("case", Value::string(case.clone())),
                        ("value", value_of_ir(payload)?),
                    ],
                )?,
            ))
        }
        IrKind::WrapRecursive(inner) => Ok(("WrapRecursive", value_of_ir(inner)?)),
        IrKind::UnwrapRecursive(inner) => Ok(("UnwrapRecursive", value_of_ir(inner)?)),
    }
}

fn encode_for(
    case: &'static str,
    label: &Option<String>,
    iterable: &Ir,
    body: &Ir,
    vars: &[(&str, &String)],
    payload_of: &impl Fn(&str) -> Result<Type, String>,
) -> Result<(&'static str, Value), String> {
    let ty = payload_of(case)?;
    let label_ty = ty
        .member_type("label")
        .ok_or_else(|| "loop payload lacks a label field".to_string())?;
    let mut pairs = vec![
        ("body", value_of_ir(body)?),
        ("iterable", value_of_ir(iterable)?),
        ("label", string_option(&label_ty, label)?),
    ];
    for (name, var) in vars.iter().copied() {
        pairs.push((name, Value::string(var.clone())));
    }
    Ok((case, struct_value(ty, pairs)?))
}

fn encode_fn(literal: &FnLiteral, payload_ty: &Type) -> Result<Value, String> {
    let params = literal
        .params
        .iter()
        .map(|p| Value::string(p.clone()))
        .collect();
    struct_value(
        payload_ty.clone(),
        vec![
            ("body", value_of_ir(&literal.body)?),
            ("params", Value::array(Type::string(), params)),
        ],
    )
}

fn encode_call(callee: &Ir, args: &[Ir], payload_ty: &Type) -> Result<Value, String> {
    struct_value(
        payload_ty.clone(),
        vec![
            ("args", nodes_value(args)?),
            ("callee", value_of_ir(callee)?),
        ],
    )
}

/// Reconstruct an IR node from its value form. Inverse of [`value_of_ir`].
pub fn ir_of_value(value: &Value) -> Result<Ir, String> {
    let kind_value = get(value, "kind")?;
    let type_value = get(value, "type")?;
    let locations_value = get(value, "locations")?;
    let ty = type_of_value(&type_value)?;
    let locations = locations_from_value(&locations_value)?;
    let (_, case, payload) = kind_value
        .variant_parts()
        .ok_or_else(|| "IR kind must be a variant".to_string())?;
    let kind = decode_kind(case, payload)?;
    let node = Ir::with_locations(kind, ty, locations);
    if matches!(node.kind(), IrKind::Function(_) | IrKind::AsyncFunction(_)) {
        node.set_literal_form(value.clone());
    }
    Ok(node)
}

fn decode_kind(case: &str, payload: &Value) -> Result<IrKind, String> {
    match case {
        "Literal" => Ok(IrKind::Literal(value_from_value(payload)?)),
        "Variable" => Ok(IrKind::Variable(as_string(payload)?)),
        "Let" => Ok(IrKind::Let {
            name: get_string(payload, "name")?,
            value: get_node(payload, "value")?,
        }),
        "Assign" => Ok(IrKind::Assign {
            name: get_string(payload, "name")?,
            value: get_node(payload, "value")?,
        }),
        "Block" => Ok(IrKind::Block(get_nodes(payload)?)),
        "If" => Ok(IrKind::If {
            condition: get_node(payload, "condition")?,
            then: get_node(payload, "then")?,
            otherwise: get_opt_node(payload, "otherwise")?,
        }),
        "Match" => {
            let subject = get_node(payload, "subject")?;
            let cases_value = get(payload, "cases")?;
            let items = cases_value
                .array_items()
                .ok_or_else(|| "Match cases must be an array".to_string())?;
            let mut cases = Vec::with_capacity(items.len());
            for item in items {
                cases.push(MatchCase {
                    name: get_string(item, "name")?,
                    bind: get_opt_string(item, "bind")?,
                    body: get_node(item, "body")?,
                });
            }
            Ok(IrKind::Match { subject, cases })
        }
        "While" => Ok(IrKind::While {
            label: get_opt_string(payload, "label")?,
            condition: get_node(payload, "condition")?,
            body: get_node(payload, "body")?,
        }),
        "ForArray" => Ok(IrKind::ForArray {
            label: get_opt_string(payload, "label")?,
            var: get_string(payload, "var")?,
            iterable: get_node(payload, "iterable")?,
            body: get_node(payload, "body")?,
        }),
        "ForSet" => Ok(IrKind::ForSet {
            label: get_opt_string(payload, "label")?,
            var: get_string(payload, "var")?,
            iterable: get_node(payload, "iterable")?,
            body: get_node(payload, "body")?,
        }),
        "ForDict" => Ok(IrKind::ForDict {
            label: get_opt_string(payload, "label")?,
            key_var: get_string(payload, "key")?,
            value_var: get_string(payload, "value")?,
            iterable: get_node(payload, "iterable")?,
            body: get_node(payload, "body")?,
        }),
        "Function" => Ok(IrKind::Function(decode_fn(payload)?)),
        "AsyncFunction" => Ok(IrKind::AsyncFunction(decode_fn(payload)?)),
        "Call" => Ok(IrKind::Call {
            callee: get_node(payload, "callee")?,
            args: decode_args(payload)?,
        }),
        "AsyncCall" => Ok(IrKind::AsyncCall {
            callee: get_node(payload, "callee")?,
            args: decode_args(payload)?,
        }),
        "Builtin" => {
            let types_value = get(payload, "types")?;
            let items = types_value
                .array_items()
                .ok_or_else(|| "Builtin types must be an array".to_string())?;
            let mut type_args = Vec::with_capacity(items.len());
            for item in items {
                type_args.push(type_of_value(item)?);
            }
            Ok(IrKind::Builtin {
                name: get_string(payload, "name")?,
                type_args,
                args: decode_args(payload)?,
            })
        }
        "Platform" => Ok(IrKind::Platform {
            name: get_string(payload, "name")?,
            args: decode_args(payload)?,
        }),
        "Return" => Ok(IrKind::Return(ir_of_value(payload)?)),
        "Break" => Ok(IrKind::Break(opt_string(payload)?)),
        "Continue" => Ok(IrKind::Continue(opt_string(payload)?)),
        "Raise" => Ok(IrKind::Raise(ir_of_value(payload)?)),
        "Try" => Ok(IrKind::Try {
            body: get_node(payload, "body")?,
            message_var: get_string(payload, "message")?,
            stack_var: get_string(payload, "stack")?,
            catch: get_node(payload, "catch")?,
            finally: get_opt_node(payload, "finally")?,
        }),
        "NewArray" => Ok(IrKind::NewArray(get_nodes(payload)?)),
        "NewSet" => Ok(IrKind::NewSet(get_nodes(payload)?)),
        "NewDict" => {
            let items = payload
                .array_items()
                .ok_or_else(|| "NewDict payload must be an array".to_string())?;
            let mut entries = Vec::with_capacity(items.len());
            for item in items {
                entries.push((get_node(item, "key")?, get_node(item, "value")?));
            }
            Ok(IrKind::NewDict(entries))
        }
        "NewRef" => Ok(IrKind::NewRef(ir_of_value(payload)?)),
        "NewVector" => Ok(IrKind::NewVector(get_nodes(payload)?)),
        "NewMatrix" => {
            let rows = get_integer(payload, "rows")?;
            let cols = get_integer(payload, "cols")?;
            if rows < 0 || cols < 0 {
                return Err("NewMatrix dimensions must be non-negative".to_string());
            }
            let items_value = get(payload, "items")?;
            Ok(IrKind::NewMatrix {
                rows: rows as usize,
                cols: cols as usize,
                items: get_nodes(&items_value)?,
            })
        }
        "Struct" => Ok(IrKind::StructNew(get_nodes(payload)?)),
        "GetField" => Ok(IrKind::GetField {
            subject: get_node(payload, "subject")?,
            field: get_string(payload, "field")?,
        }),
        "Variant" => Ok(IrKind::VariantNew {
            case: get_string(payload, "case")?,
            payload: get_node(payload, "value")?,
        }),
        "WrapRecursive" => Ok(IrKind::WrapRecursive(ir_of_value(payload)?)),
        "UnwrapRecursive" => Ok(IrKind::UnwrapRecursive(ir_of_value(payload)?)),
        other => Err(format!("unknown IR constructor '{}'", other)),
    }
}

fn decode_fn(payload: &Value) -> Result<FnLiteral, String> {
    let params_value = get(payload, "params")?;
    let items = params_value
        .array_items()
        .ok_or_else(|| "function params must be an array".to_string())?;
    let mut params = Vec::with_capacity(items.len());
    for item in items {
        params.push(as_string(item)?);
    }
    Ok(FnLiteral {
        params,
        body: get_node(payload, "body")?,
    })
}

fn decode_args(payload: &Value) -> Result<Vec<Ir>, String> {
    let args_value = get(payload, "args")?;
    get_nodes(&args_value)
}

fn get(payload: &Value, name: &str) -> Result<Value, String> {
    payload
        .field(name)
        .ok_or_else(|| format!("IR payload lacks a '{}' field", name))
}

fn as_string(value: &Value) -> Result<String, String> {
    value
        .as_string()
        .map(str::to_string)
        .ok_or_else(|| "expected a string".to_string())
}

fn get_string(payload: &Value, name: &str) -> Result<String, String> {
    as_string(&get(payload, name)?)
}

fn get_integer(payload: &Value, name: &str) -> Result<i64, String> {
    get(payload, name)?
        .as_integer()
        .ok_or_else(|| format!("'{}' must be an integer", name))
}

fn get_node(payload: &Value, name: &str) -> Result<Ir, String> {
    ir_of_value(&get(payload, name)?)
}

fn get_nodes(value: &Value) -> Result<Vec<Ir>, String> {
    let items = value
        .array_items()
        .ok_or_else(|| "expected an array of IR nodes".to_string())?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        out.push(ir_of_value(item)?);
    }
    Ok(out)
}

fn opt_string(value: &Value) -> Result<Option<String>, String> {
    match option_of(value)? {
        Some(v) => Ok(Some(as_string(&v)?)),
        None => Ok(None),
    }
}

fn get_opt_string(payload: &Value, name: &str) -> Result<Option<String>, String> {
    opt_string(&get(payload, name)?)
}

fn get_opt_node(payload: &Value, name: &str) -> Result<Option<Ir>, String> {
    match option_of(&get(payload, name)?)? {
        Some(v) => Ok(Some(ir_of_value(&v)?)),
        None => Ok(None),
    }
}

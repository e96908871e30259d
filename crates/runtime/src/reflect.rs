//! Type ↔ value reflection
//!
//! Types are themselves describable as values: the distinguished recursive
//! variant type returned by [`type_type`] has one case per type constructor,
//! with payloads mirroring the constructor arguments. [`value_of_type`] and
//! [`type_of_value`] form an exact inverse pair.
//!
//! Self-reference is encoded positionally: a `.Recursive n` leaf refers to
//! the n-th compound constructor counted outward from the leaf, on a context
//! stack maintained during conversion.
//!
//! The module also provides a self-describing value shape ([`value_type`])
//! used wherever a value of statically-unknown type must be embedded in
//! another value, e.g. literals inside reflected IR.

use tern_core::{Field, Type, TypeKind, Value, ValueKind};

thread_local! {
    static TYPE_TYPE: Type = build_type_type();
    static VALUE_TYPE: Type = build_value_type();
}

/// The type of reflected type terms.
pub fn type_type() -> Type {
    TYPE_TYPE.with(Type::clone)
}

/// The type of reflected values of unknown type.
pub fn value_type() -> Type {
    VALUE_TYPE.with(Type::clone)
}

/// Build a struct value from named fields; names are sorted to match the
/// struct type's canonical field order.
pub(crate) fn struct_value(ty: Type, mut pairs: Vec<(&str, Value)>) -> Result<Value, String> {
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    Value::struct_of(ty, pairs.into_iter().map(|(_, v)| v).collect())
}

fn build_type_type() -> Type {
    Type::recursive(|me| {
        let member = Type::struct_of(vec![
            Field::new("name", Type::string()),
            Field::new("type", me.clone()),
        ]);
        let signature = Type::struct_of(vec![
            Field::new("inputs", Type::array(me.clone())),
            Field::new("output", me.clone()),
        ]);
        Type::variant_of(vec![
            Field::new("Never", Type::null()),
            Field::new("Null", Type::null()),
            Field::new("Boolean", Type::null()),
            Field::new("Integer", Type::null()),
            Field::new("Float", Type::null()),
            Field::new("String", Type::null()),
            Field::new("DateTime", Type::null()),
            Field::new("Blob", Type::null()),
            Field::new("Array", me.clone()),
            Field::new("Set", me.clone()),
            Field::new(
                "Dict",
                Type::struct_of(vec![
                    Field::new("key", me.clone()),
                    Field::new("value", me.clone()),
                ]),
            ),
            Field::new("Struct", Type::array(member.clone())),
            Field::new("Variant", Type::array(member)),
            Field::new("Ref", me.clone()),
            Field::new("Vector", me.clone()),
            Field::new("Matrix", me.clone()),
            Field::new("Function", signature.clone()),
            Field::new("AsyncFunction", signature),
            Field::new("Recursive", Type::integer()),
        ])
    })
}

/// Reflect a type term into its value form.
pub fn value_of_type(ty: &Type) -> Result<Value, String> {
    let tt = type_type();
    encode_type(ty, &tt, &mut Vec::new(), Vec::new())
}

/// Context stack entry: the recursive wrappers directly enclosing one
/// compound constructor.
fn encode_type(
    ty: &Type,
    tt: &Type,
    ctx: &mut Vec<Vec<usize>>,
    mut pending: Vec<usize>,
) -> Result<Value, String> {
    if let Some(addr) = ty.recursive_addr() {
        if let Some(pos) = ctx.iter().rposition(|tags| tags.contains(&addr)) {
            let depth = (ctx.len() - pos) as i64;
            return Value::variant(tt.clone(), "Recursive", Value::integer(depth));
        }
        let inner = ty
            .recursive_inner()
            .ok_or_else(|| "recursive type is not finalized".to_string())?;
        pending.push(addr);
        return encode_type(&inner, tt, ctx, pending);
    }
    match ty.kind() {
        TypeKind::Never => Value::variant(tt.clone(), "Never", Value::null()),
        TypeKind::Null => Value::variant(tt.clone(), "Null", Value::null()),
        TypeKind::Boolean => Value::variant(tt.clone(), "Boolean", Value::null()),
        TypeKind::Integer => Value::variant(tt.clone(), "Integer", Value::null()),
        TypeKind::Float => Value::variant(tt.clone(), "Float", Value::null()),
        TypeKind::String => Value::variant(tt.clone(), "String", Value::null()),
        TypeKind::DateTime => Value::variant(tt.clone(), "DateTime", Value::null()),
        TypeKind::Blob => Value::variant(tt.clone(), "Blob", Value::null()),
        TypeKind::Recursive(_) | TypeKind::RecursiveRef(_) => {
            // Handled above; a dangling self-leaf has no enclosing wrapper.
            Err("self-reference outside its recursive wrapper".to_string())
        }
        _ => {
            // A compound constructor: enter a context-stack frame carrying
            // the wrapper tags collected on the way here, encode the
            // children inside it, then leave.
            ctx.push(std::mem::take(&mut pending));
            let payload = encode_compound_payload(ty, tt, ctx);
            ctx.pop();
            let (case, payload) = payload?;
            Value::variant(tt.clone(), case, payload)
        }
    }
}

fn encode_compound_payload(
    ty: &Type,
    tt: &Type,
    ctx: &mut Vec<Vec<usize>>,
) -> Result<(&'static str, Value), String> {
    match ty.kind() {
        TypeKind::Array(elem) => Ok(("Array", encode_type(elem, tt, ctx, Vec::new())?)),
        TypeKind::Set(elem) => Ok(("Set", encode_type(elem, tt, ctx, Vec::new())?)),
        TypeKind::Ref(elem) => Ok(("Ref", encode_type(elem, tt, ctx, Vec::new())?)),
        TypeKind::Vector(elem) => Ok(("Vector", encode_type(elem, tt, ctx, Vec::new())?)),
        TypeKind::Matrix(elem) => Ok(("Matrix", encode_type(elem, tt, ctx, Vec::new())?)),
        TypeKind::Dict { key, value } => {
            let k = encode_type(key, tt, ctx, Vec::new())?;
            let v = encode_type(value, tt, ctx, Vec::new())?;
            let payload_ty = tt
                .member_type("Dict")
                .ok_or_else(|| "type-of-types lacks a Dict case".to_string())?;
            Ok(("Dict", struct_value(payload_ty, vec![("key", k), ("value", v)])?))
        }
        TypeKind::Struct(fields) => Ok(("Struct", encode_members(fields, "Struct", tt, ctx)?)),
        TypeKind::Variant(cases) => Ok(("Variant", encode_members(cases, "Variant", tt, ctx)?)),
        TypeKind::Function { inputs, output } => Ok((
            "Function",
            encode_signature(inputs, output, "Function", tt, ctx)?,
        )),
        TypeKind::AsyncFunction { inputs, output } => Ok((
            "AsyncFunction",
            encode_signature(inputs, output, "AsyncFunction", tt, ctx)?,
        )),
        _ => Err("not a compound constructor".to_string()),
    }
}

fn encode_members(
    members: &[Field],
    case: &str,
    tt: &Type,
    ctx: &mut Vec<Vec<usize>>,
) -> Result<Value, String> {
    let payload_ty = tt
        .member_type(case)
        .ok_or_else(|| format!("type-of-types lacks a {} case", case))?;
    let member_ty = payload_ty
        .elem()
        .ok_or_else(|| format!("{} payload is not an array", case))?;
    let mut items = Vec::with_capacity(members.len());
    for member in members {
        let ty_value = encode_type(&member.ty, tt, ctx, Vec::new())?;
        items.push(struct_value(
            member_ty.clone(),
            vec![
                ("name", Value::string(member.name.clone())),
                ("type", ty_value),
            ],
        )?);
    }
    Ok(Value::array(member_ty, items))
}

fn encode_signature(
    inputs: &[Type],
    output: &Type,
    case: &str,
    tt: &Type,
    ctx: &mut Vec<Vec<usize>>,
) -> Result<Value, String> {
    let payload_ty = tt
        .member_type(case)
        .ok_or_else(|| format!("type-of-types lacks a {} case", case))?;
    let mut ins = Vec::with_capacity(inputs.len());
    for input in inputs {
        ins.push(encode_type(input, tt, ctx, Vec::new())?);
    }
    let out = encode_type(output, tt, ctx, Vec::new())?;
    struct_value(
        payload_ty,
        vec![
            ("inputs", Value::array(type_type(), ins)),
            ("output", out),
        ],
    )
}

/// Reconstruct a type term from its value form. Inverse of
/// [`value_of_type`].
pub fn type_of_value(value: &Value) -> Result<Type, String> {
    decode_type(value, &mut Vec::new())
}

struct RecEntry {
    wrapper: Type,
    used: bool,
}

fn decode_type(value: &Value, ctx: &mut Vec<RecEntry>) -> Result<Type, String> {
    let (_, case, payload) = value
        .variant_parts()
        .ok_or_else(|| "type value must be a variant".to_string())?;
    match case {
        "Never" => Ok(Type::never()),
        "Null" => Ok(Type::null()),
        "Boolean" => Ok(Type::boolean()),
        "Integer" => Ok(Type::integer()),
        "Float" => Ok(Type::float()),
        "String" => Ok(Type::string()),
        "DateTime" => Ok(Type::datetime()),
        "Blob" => Ok(Type::blob()),
        "Recursive" => {
            let depth = payload
                .as_integer()
                .ok_or_else(|| "Recursive payload must be an integer".to_string())?;
            if depth < 1 || depth as usize > ctx.len() {
                return Err(format!("Recursive depth {} out of range", depth));
            }
            let at = ctx.len() - depth as usize;
            ctx[at].used = true;
            ctx[at]
                .wrapper
                .recursive_self()
                .ok_or_else(|| "context entry is not a wrapper".to_string())
        }
        "Array" => decode_compound(ctx, |ctx| Ok(Type::array(decode_type(payload, ctx)?))),
        "Set" => decode_compound(ctx, |ctx| Ok(Type::set(decode_type(payload, ctx)?))),
        "Ref" => decode_compound(ctx, |ctx| Ok(Type::ref_of(decode_type(payload, ctx)?))),
        "Vector" => decode_compound(ctx, |ctx| {
            let elem = decode_type(payload, ctx)?;
            if !elem.is_numeric_elem() {
                return Err(format!("vector cannot pack element type {}", elem));
            }
            Ok(Type::vector(elem))
        }),
        "Matrix" => decode_compound(ctx, |ctx| {
            let elem = decode_type(payload, ctx)?;
            if !elem.is_numeric_elem() {
                return Err(format!("matrix cannot pack element type {}", elem));
            }
            Ok(Type::matrix(elem))
        }),
        "Dict" => decode_compound(ctx, |ctx| {
            let key = payload
                .field("key")
                .ok_or_else(|| "Dict payload lacks a key".to_string())?;
            let value = payload
                .field("value")
                .ok_or_else(|| "Dict payload lacks a value".to_string())?;
            Ok(Type::dict(
                decode_type(&key, ctx)?,
                decode_type(&value, ctx)?,
            ))
        }),
        "Struct" => decode_compound(ctx, |ctx| {
            Ok(Type::struct_of(decode_members(payload, ctx)?))
        }),
        "Variant" => decode_compound(ctx, |ctx| {
            Ok(Type::variant_of(decode_members(payload, ctx)?))
        }),
        "Function" => decode_compound(ctx, |ctx| {
            let (inputs, output) = decode_signature(payload, ctx)?;
            Ok(Type::function(inputs, output))
        }),
        "AsyncFunction" => decode_compound(ctx, |ctx| {
            let (inputs, output) = decode_signature(payload, ctx)?;
            Ok(Type::async_function(inputs, output))
        }),
        other => Err(format!("unknown type constructor '{}'", other)),
    }
}

/// Wrap a compound constructor in a placeholder wrapper; the wrapper only
/// survives if a `Recursive` leaf below referenced it.
fn decode_compound(
    ctx: &mut Vec<RecEntry>,
    build: impl FnOnce(&mut Vec<RecEntry>) -> Result<Type, String>,
) -> Result<Type, String> {
    ctx.push(RecEntry {
        wrapper: Type::recursive_begin(),
        used: false,
    });
    let term = build(ctx);
    let entry = ctx
        .pop()
        .unwrap_or_else(|| unreachable!("context stack underflow"));
    let term = term?;
    if entry.used {
        entry.wrapper.recursive_finalize(term);
        Ok(entry.wrapper)
    } else {
        Ok(term)
    }
}

fn decode_members(payload: &Value, ctx: &mut Vec<RecEntry>) -> Result<Vec<Field>, String> {
    let items = payload
        .array_items()
        .ok_or_else(|| "member payload must be an array".to_string())?;
    let mut members = Vec::with_capacity(items.len());
    for item in items {
        let name = item
            .field("name")
            .and_then(|v| v.as_string().map(str::to_string))
            .ok_or_else(|| "member lacks a name".to_string())?;
        let ty_value = item
            .field("type")
            .ok_or_else(|| "member lacks a type".to_string())?;
        members.push(Field::new(name, decode_type(&ty_value, ctx)?));
    }
    let mut names: Vec<&str> = members.iter().map(|m| m.name.as_str()).collect();
    names.sort_unstable();
    if names.windows(2).any(|w| w[0] == w[1]) {
        return Err("duplicate member names".to_string());
    }
    Ok(members)
}

fn decode_signature(payload: &Value, ctx: &mut Vec<RecEntry>) -> Result<(Vec<Type>, Type), String> {
    let inputs_value = payload
        .field("inputs")
        .ok_or_else(|| "signature lacks inputs".to_string())?;
    let output_value = payload
        .field("output")
        .ok_or_else(|| "signature lacks an output".to_string())?;
    let items = inputs_value
        .array_items()
        .ok_or_else(|| "signature inputs must be an array".to_string())?;
    let mut inputs = Vec::with_capacity(items.len());
    for item in items {
        inputs.push(decode_type(item, ctx)?);
    }
    Ok((inputs, decode_type(&output_value, ctx)?))
}

fn build_value_type() -> Type {
    let tt = type_type();
    Type::recursive(|me| {
        Type::variant_of(vec![
            Field::new("Null", Type::null()),
            Field::new("Boolean", Type::boolean()),
            Field::new("Integer", Type::integer()),
            Field::new("Float", Type::float()),
            Field::new("String", Type::string()),
            Field::new("DateTime", Type::datetime()),
            Field::new("Blob", Type::blob()),
            Field::new(
                "Array",
                Type::struct_of(vec![
                    Field::new("elem", tt.clone()),
                    Field::new("items", Type::array(me.clone())),
                ]),
            ),
            Field::new(
                "Set",
                Type::struct_of(vec![
                    Field::new("elem", tt.clone()),
                    Field::new("items", Type::array(me.clone())),
                ]),
            ),
            Field::new(
                "Dict",
                Type::struct_of(vec![
                    Field::new(
                        "entries",
                        Type::array(Type::struct_of(vec![
                            Field::new("key", me.clone()),
                            Field::new("value", me.clone()),
                        ])),
                    ),
                    Field::new("key", tt.clone()),
                    Field::new("value", tt.clone()),
                ]),
            ),
            Field::new(
                "Struct",
                Type::struct_of(vec![
                    Field::new("fields", Type::array(me.clone())),
                    Field::new("type", tt.clone()),
                ]),
            ),
            Field::new(
                "Variant",
                Type::struct_of(vec![
                    Field::new("case", Type::string()),
                    Field::new("type", tt.clone()),
                    Field::new("value", me.clone()),
                ]),
            ),
            Field::new(
                "Ref",
                Type::struct_of(vec![
                    Field::new("elem", tt.clone()),
                    Field::new("target", me.clone()),
                ]),
            ),
            Field::new(
                "Vector",
                Type::struct_of(vec![
                    Field::new("elem", tt.clone()),
                    Field::new("items", Type::array(me.clone())),
                ]),
            ),
            Field::new(
                "Matrix",
                Type::struct_of(vec![
                    Field::new("cols", Type::integer()),
                    Field::new("elem", tt.clone()),
                    Field::new("items", Type::array(me.clone())),
                    Field::new("rows", Type::integer()),
                ]),
            ),
        ])
    })
}

/// Reflect a value into the self-describing shape. Functions are code, not
/// data, and cannot be reflected; cyclic refs are rejected.
pub fn value_of_value(value: &Value) -> Result<Value, String> {
    encode_value(value, &mut Vec::new())
}

fn encode_value(value: &Value, refs: &mut Vec<usize>) -> Result<Value, String> {
    let vt = value_type();
    match value.kind() {
        ValueKind::Null => Value::variant(vt, "Null", Value::null()),
        ValueKind::Boolean(b) => Value::variant(vt, "Boolean", Value::boolean(*b)),
        ValueKind::Integer(n) => Value::variant(vt, "Integer", Value::integer(*n)),
        ValueKind::Float(x) => Value::variant(vt, "Float", Value::float(*x)),
        ValueKind::String(s) => Value::variant(vt, "String", Value::string(s.clone())),
        ValueKind::DateTime(ms) => Value::variant(vt, "DateTime", Value::datetime(*ms)),
        ValueKind::Blob(bytes) => Value::variant(vt, "Blob", Value::blob(bytes.clone())),
        ValueKind::Array { elem, items } => {
            let payload = collection_payload(&vt, "Array", elem, items, refs)?;
            Value::variant(vt, "Array", payload)
        }
        ValueKind::Set { elem, items } => {
            let payload = collection_payload(&vt, "Set", elem, items, refs)?;
            Value::variant(vt, "Set", payload)
        }
        ValueKind::Dict { key, value: value_ty, entries } => {
            let payload_ty = vt
                .member_type("Dict")
                .ok_or_else(|| "value shape lacks a Dict case".to_string())?;
            let entry_ty = payload_ty
                .member_type("entries")
                .and_then(|t| t.elem())
                .ok_or_else(|| "Dict entries payload is not an array".to_string())?;
            let mut out = Vec::with_capacity(entries.len());
            for (k, v) in entries {
                out.push(struct_value(
                    entry_ty.clone(),
                    vec![
                        ("key", encode_value(k, refs)?),
                        ("value", encode_value(v, refs)?),
                    ],
                )?);
            }
            let payload = struct_value(
                payload_ty,
                vec![
                    ("entries", Value::array(entry_ty, out)),
                    ("key", value_of_type(key)?),
                    ("value", value_of_type(value_ty)?),
                ],
            )?;
            Value::variant(vt, "Dict", payload)
        }
        ValueKind::Struct { ty, fields } => {
            let payload_ty = vt
                .member_type("Struct")
                .ok_or_else(|| "value shape lacks a Struct case".to_string())?;
            let mut out = Vec::with_capacity(fields.len());
            for field in fields {
                out.push(encode_value(field, refs)?);
            }
            let payload = struct_value(
                payload_ty,
                vec![
                    ("fields", Value::array(value_type(), out)),
                    ("type", value_of_type(ty)?),
                ],
            )?;
            Value::variant(vt, "Struct", payload)
        }
        ValueKind::Variant { ty, case, payload } => {
            let payload_ty = vt
                .member_type("Variant")
                .ok_or_else(|| "value shape lacks a Variant case".to_string())?;
            let body = struct_value(
                payload_ty,
                vec![
                    ("case", Value::string(case.clone())),
                    ("type", value_of_type(ty)?),
                    ("value", encode_value(payload, refs)?),
                ],
            )?;
            Value::variant(vt, "Variant", body)
        }
        ValueKind::Ref { elem, .. } => {
            if refs.contains(&value.addr()) {
                return Err("cyclic value cannot be reflected".to_string());
            }
            refs.push(value.addr());
            let target = value
                .ref_get()
                .ok_or_else(|| "ref value lacks a target".to_string())?;
            let encoded = encode_value(&target, refs);
            refs.pop();
            let payload_ty = vt
                .member_type("Ref")
                .ok_or_else(|| "value shape lacks a Ref case".to_string())?;
            let body = struct_value(
                payload_ty,
                vec![("elem", value_of_type(elem)?), ("target", encoded?)],
            )?;
            Value::variant(vt, "Ref", body)
        }
        ValueKind::Vector { data } => {
            let payload_ty = vt
                .member_type("Vector")
                .ok_or_else(|| "value shape lacks a Vector case".to_string())?;
            let mut items = Vec::with_capacity(data.len());
            for i in 0..data.len() {
                if let Some(v) = data.get(i) {
                    items.push(encode_value(&v, refs)?);
                }
            }
            let body = struct_value(
                payload_ty,
                vec![
                    ("elem", value_of_type(&data.elem_type())?),
                    ("items", Value::array(value_type(), items)),
                ],
            )?;
            Value::variant(vt, "Vector", body)
        }
        ValueKind::Matrix { rows, cols, data } => {
            let payload_ty = vt
                .member_type("Matrix")
                .ok_or_else(|| "value shape lacks a Matrix case".to_string())?;
            let mut items = Vec::with_capacity(data.len());
            for i in 0..data.len() {
                if let Some(v) = data.get(i) {
                    items.push(encode_value(&v, refs)?);
                }
            }
            let body = struct_value(
                payload_ty,
                vec![
                    ("cols", Value::integer(*cols as i64)),
                    ("elem", value_of_type(&data.elem_type())?),
                    ("items", Value::array(value_type(), items)),
                    ("rows", Value::integer(*rows as i64)),
                ],
            )?;
            Value::variant(vt, "Matrix", body)
        }
        ValueKind::Function(_) => Err("functions are code and cannot be reflected".to_string()),
    }
}

fn collection_payload(
    vt: &Type,
    case: &str,
    elem: &Type,
    items: &[Value],
    refs: &mut Vec<usize>,
) -> Result<Value, String> {
    let payload_ty = vt
        .member_type(case)
        .ok_or_else(|| format!("value shape lacks a {} case", case))?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        out.push(encode_value(item, refs)?);
    }
    struct_value(
        payload_ty,
        vec![
            ("elem", value_of_type(elem)?),
            ("items", Value::array(value_type(), out)),
        ],
    )
}

/// Rebuild a value from the self-describing shape. Inverse of
/// [`value_of_value`].
pub fn value_from_value(value: &Value) -> Result<Value, String> {
    let (_, case, payload) = value
        .variant_parts()
        .ok_or_else(|| "reflected value must be a variant".to_string())?;
    match case {
        "Null" => Ok(Value::null()),
        "Boolean" => payload
            .as_boolean()
            .map(Value::boolean)
            .ok_or_else(|| "Boolean payload mismatch".to_string()),
        "Integer" => payload
            .as_integer()
            .map(Value::integer)
            .ok_or_else(|| "Integer payload mismatch".to_string()),
        "Float" => payload
            .as_float()
            .map(Value::float)
            .ok_or_else(|| "Float payload mismatch".to_string()),
        "String" => payload
            .as_string()
            .map(Value::string)
            .ok_or_else(|| "String payload mismatch".to_string()),
        "DateTime" => payload
            .as_datetime()
            .map(Value::datetime)
            .ok_or_else(|| "DateTime payload mismatch".to_string()),
        "Blob" => payload
            .as_blob()
            .map(|b| Value::blob(b.to_vec()))
            .ok_or_else(|| "Blob payload mismatch".to_string()),
        "Array" => {
            let (elem, items) = decode_collection(payload)?;
            Ok(Value::array(elem, items))
        }
        "Set" => {
            let (elem, items) = decode_collection(payload)?;
            Ok(Value::set(elem, items))
        }
        "Dict" => {
            let key_ty = type_field(payload, "key")?;
            let value_ty = type_field(payload, "value")?;
            let entries_value = payload
                .field("entries")
                .ok_or_else(|| "Dict payload lacks entries".to_string())?;
            let items = entries_value
                .array_items()
                .ok_or_else(|| "Dict entries must be an array".to_string())?;
            let mut entries = Vec::with_capacity(items.len());
            for item in items {
                let k = item
                    .field("key")
                    .ok_or_else(|| "Dict entry lacks a key".to_string())?;
                let v = item
                    .field("value")
                    .ok_or_else(|| "Dict entry lacks a value".to_string())?;
                entries.push((value_from_value(&k)?, value_from_value(&v)?));
            }
            Ok(Value::dict(key_ty, value_ty, entries))
        }
        "Struct" => {
            let ty = type_field(payload, "type")?;
            let fields_value = payload
                .field("fields")
                .ok_or_else(|| "Struct payload lacks fields".to_string())?;
            let items = fields_value
                .array_items()
                .ok_or_else(|| "Struct fields must be an array".to_string())?;
            let mut fields = Vec::with_capacity(items.len());
            for item in items {
                fields.push(value_from_value(item)?);
            }
            Value::struct_of(ty, fields)
        }
        "Variant" => {
            let ty = type_field(payload, "type")?;
            let case_name = payload
                .field("case")
                .and_then(|v| v.as_string().map(str::to_string))
                .ok_or_else(|| "Variant payload lacks a case".to_string())?;
            let inner = payload
                .field("value")
                .ok_or_else(|| "Variant payload lacks a value".to_string())?;
            Value::variant(ty, case_name, value_from_value(&inner)?)
        }
        "Ref" => {
            let elem = type_field(payload, "elem")?;
            let target = payload
                .field("target")
                .ok_or_else(|| "Ref payload lacks a target".to_string())?;
            Ok(Value::ref_of(elem, value_from_value(&target)?))
        }
        "Vector" => {
            let (elem, items) = decode_collection(payload)?;
            let mut buffer = tern_core::value::buffer_for(&elem, items.len())
                .ok_or_else(|| format!("vector cannot pack element type {}", elem))?;
            for item in &items {
                buffer.push_value(item)?;
            }
            Ok(Value::vector(buffer))
        }
        "Matrix" => {
            let elem = type_field(payload, "elem")?;
            let rows = payload
                .field("rows")
                .and_then(|v| v.as_integer())
                .ok_or_else(|| "Matrix payload lacks rows".to_string())?;
            let cols = payload
                .field("cols")
                .and_then(|v| v.as_integer())
                .ok_or_else(|| "Matrix payload lacks cols".to_string())?;
            if rows < 0 || cols < 0 {
                return Err("Matrix dimensions must be non-negative".to_string());
            }
            let items_value = payload
                .field("items")
                .ok_or_else(|| "Matrix payload lacks items".to_string())?;
            let items = items_value
                .array_items()
                .ok_or_else(|| "Matrix items must be an array".to_string())?;
            let mut buffer = tern_core::value::buffer_for(&elem, items.len())
                .ok_or_else(|| format!("matrix cannot pack element type {}", elem))?;
            for item in items {
                buffer.push_value(&value_from_value(item)?)?;
            }
            Value::matrix(rows as usize, cols as usize, buffer)
        }
        other => Err(format!("unknown value constructor '{}'", other)),
    }
}

fn type_field(payload: &Value, name: &str) -> Result<Type, String> {
    let v = payload
        .field(name)
        .ok_or_else(|| format!("payload lacks a '{}' field", name))?;
    type_of_value(&v)
}

fn decode_collection(payload: &Value) -> Result<(Type, Vec<Value>), String> {
    let elem = type_field(payload, "elem")?;
    let items_value = payload
        .field("items")
        .ok_or_else(|| "collection payload lacks items".to_string())?;
    let items = items_value
        .array_items()
        .ok_or_else(|| "collection items must be an array".to_string())?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        out.push(value_from_value(item)?);
    }
    Ok((elem, out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_core::equal;

    fn round_trip_type(ty: &Type) {
        let reflected = value_of_type(ty).unwrap();
        let rebuilt = type_of_value(&reflected).unwrap();
        // Recursive wrappers compare by identity, so the round-trip law is
        // checked on the value forms, which are structural.
        let reflected_again = value_of_type(&rebuilt).unwrap();
        assert!(
            equal(&reflected, &reflected_again),
            "round trip of {}",
            ty
        );
    }

    #[test]
    fn test_primitive_round_trip() {
        for ty in [
            Type::never(),
            Type::null(),
            Type::boolean(),
            Type::integer(),
            Type::float(),
            Type::string(),
            Type::datetime(),
            Type::blob(),
        ] {
            let rebuilt = type_of_value(&value_of_type(&ty).unwrap()).unwrap();
            assert!(rebuilt.equal(&ty));
        }
    }

    #[test]
    fn test_compound_round_trip() {
        let ty = Type::dict(
            Type::string(),
            Type::array(Type::struct_of(vec![
                Field::new("flag", Type::boolean()),
                Field::new("score", Type::float()),
            ])),
        );
        let rebuilt = type_of_value(&value_of_type(&ty).unwrap()).unwrap();
        assert!(rebuilt.equal(&ty));
        round_trip_type(&ty);
    }

    #[test]
    fn test_function_round_trip() {
        let ty = Type::function(vec![Type::integer(), Type::string()], Type::boolean());
        let rebuilt = type_of_value(&value_of_type(&ty).unwrap()).unwrap();
        assert!(rebuilt.equal(&ty));
    }

    #[test]
    fn test_recursive_round_trip() {
        let ty = Type::recursive(|me| {
            Type::variant_of(vec![
                Field::new("leaf", Type::integer()),
                Field::new("node", Type::array(me.clone())),
            ])
        });
        let reflected = value_of_type(&ty).unwrap();
        // The self-reference inside `node: array<self>` sits two compound
        // constructors away from the variant the wrapper tags.
        let rebuilt = type_of_value(&reflected).unwrap();
        assert!(rebuilt.recursive_inner().is_some());
        round_trip_type(&ty);
    }

    #[test]
    fn test_recursive_depth_out_of_range() {
        let tt = type_type();
        let bad = Value::variant(tt, "Recursive", Value::integer(3)).unwrap();
        assert!(type_of_value(&bad).is_err());
    }

    #[test]
    fn test_value_reflection_round_trip() {
        let ty = Type::struct_of(vec![
            Field::new("name", Type::string()),
            Field::new("tags", Type::set(Type::integer())),
        ]);
        let v = Value::struct_of(
            ty,
            vec![
                Value::string("thing"),
                Value::set(
                    Type::integer(),
                    vec![Value::integer(2), Value::integer(1)],
                ),
            ],
        )
        .unwrap();
        let reflected = value_of_value(&v).unwrap();
        let rebuilt = value_from_value(&reflected).unwrap();
        assert!(equal(&v, &rebuilt));
    }

    #[test]
    fn test_function_value_not_reflectable() {
        use std::rc::Rc;
        let f = Value::function(tern_core::Env::root(), Rc::new(()));
        assert!(value_of_value(&f).is_err());
    }

    #[test]
    fn test_cyclic_ref_rejected() {
        let r = Value::ref_of(Type::null(), Value::null());
        let arr = Value::array(Type::ref_of(Type::null()), vec![r.clone()]);
        assert!(r.ref_set(arr));
        assert!(value_of_value(&r).is_err());
        // Break the cycle so the test leaves no garbage behind.
        assert!(r.ref_set(Value::null()));
    }
}

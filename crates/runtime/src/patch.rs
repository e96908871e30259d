//! Type-directed structural patches
//!
//! A patch over `T` is itself a value, of the parametric variant type
//!
//! ```text
//! Patch<T> = .unchanged
//!          | .replace { before: T, after: T }
//!          | .patch   <structural body depending on T>
//! ```
//!
//! The structural body per kind:
//!
//! - `array<E>`: array of `{key, offset, operation}` entries where the
//!   operation is `.delete(E)`, `.insert(E)`, or `.update(Patch<E>)`; the
//!   effective position is `key + offset`
//! - `set<E>`: dict keyed by element carrying `.delete` / `.insert`
//! - `dict<K,V>`: dict keyed by key carrying `.delete(V)` / `.insert(V)` /
//!   `.update(Patch<V>)`
//! - `struct`: a struct of the same shape holding per-field patches
//! - `variant`: the same cases holding a patch of the case payload
//! - `ref<E>`: `Patch<E>`
//! - scalars and opaque kinds: only `.unchanged` / `.replace`
//!
//! `diff` produces the minimal patch, `apply` replays it, `compose` folds
//! two sequential patches into one, `invert` reverses one. All four guard
//! against recursive types: re-entering a wrapper already on the operation's
//! stack degrades to replace-only semantics.

use tern_core::{Field, Type, TypeKind, Value, equal};
use tern_core::compare;

/// The `Patch<T>` variant type for a given `T`.
pub fn patch_type(ty: &Type) -> Type {
    patch_type_guarded(ty, &mut Vec::new())
}

fn patch_type_guarded(ty: &Type, stack: &mut Vec<usize>) -> Type {
    let mut cases = vec![
        Field::new("unchanged", Type::null()),
        Field::new(
            "replace",
            Type::struct_of(vec![
                Field::new("after", ty.clone()),
                Field::new("before", ty.clone()),
            ]),
        ),
    ];
    if let Some(body) = patch_body_type(ty, stack) {
        cases.push(Field::new("patch", body));
    }
    Type::variant_of(cases)
}

fn patch_body_type(ty: &Type, stack: &mut Vec<usize>) -> Option<Type> {
    if let Some(addr) = ty.recursive_addr() {
        if stack.contains(&addr) {
            // Re-entered wrapper: replace-only semantics inside.
            return None;
        }
        let inner = ty.recursive_inner()?;
        stack.push(addr);
        let body = patch_body_type(&inner, stack);
        stack.pop();
        return body;
    }
    match ty.kind() {
        TypeKind::Array(elem) => {
            let operation = Type::variant_of(vec![
                Field::new("delete", elem.clone()),
                Field::new("insert", elem.clone()),
                Field::new("update", patch_type_guarded(elem, stack)),
            ]);
            Some(Type::array(Type::struct_of(vec![
                Field::new("key", Type::integer()),
                Field::new("offset", Type::integer()),
                Field::new("operation", operation),
            ])))
        }
        TypeKind::Set(elem) => Some(Type::dict(
            elem.clone(),
            Type::variant_of(vec![
                Field::new("delete", Type::null()),
                Field::new("insert", Type::null()),
            ]),
        )),
        TypeKind::Dict { key, value } => Some(Type::dict(
            key.clone(),
            Type::variant_of(vec![
                Field::new("delete", value.clone()),
                Field::new("insert", value.clone()),
                Field::new("update", patch_type_guarded(value, stack)),
            ]),
        )),
        TypeKind::Struct(fields) => Some(Type::struct_of(
            fields
                .iter()
                .map(|f| Field::new(f.name.clone(), patch_type_guarded(&f.ty, stack)))
                .collect(),
        )),
        TypeKind::Variant(cases) => Some(Type::variant_of(
            cases
                .iter()
                .map(|c| Field::new(c.name.clone(), patch_type_guarded(&c.ty, stack)))
                .collect(),
        )),
        TypeKind::Ref(elem) => Some(patch_type_guarded(elem, stack)),
        _ => None,
    }
}

fn mk_unchanged(pt: &Type) -> Result<Value, String> {
    Value::variant(pt.clone(), "unchanged", Value::null())
}

fn mk_replace(pt: &Type, before: &Value, after: &Value) -> Result<Value, String> {
    let body_ty = pt
        .member_type("replace")
        .ok_or_else(|| "patch type lacks a replace case".to_string())?;
    let body = Value::struct_of(body_ty, vec![after.clone(), before.clone()])?;
    Value::variant(pt.clone(), "replace", body)
}

fn mk_patch(pt: &Type, body: Value) -> Result<Value, String> {
    Value::variant(pt.clone(), "patch", body)
}

/// Diff two values at a type, producing the minimal patch.
pub fn diff(before: &Value, after: &Value, ty: &Type) -> Result<Value, String> {
    diff_guarded(before, after, ty, &mut Vec::new())
}

fn diff_guarded(
    before: &Value,
    after: &Value,
    ty: &Type,
    stack: &mut Vec<usize>,
) -> Result<Value, String> {
    let pt = patch_type(ty);
    if equal(before, after) {
        return mk_unchanged(&pt);
    }
    if let Some(addr) = ty.recursive_addr() {
        if stack.contains(&addr) {
            return mk_replace(&pt, before, after);
        }
        let inner = ty
            .recursive_inner()
            .ok_or_else(|| "recursive type is not finalized".to_string())?;
        stack.push(addr);
        let out = diff_guarded(before, after, &inner, stack);
        stack.pop();
        return out;
    }
    match ty.kind() {
        TypeKind::Array(_) => {
            let xs = before
                .array_items()
                .ok_or_else(|| "diff: array type over a non-array value".to_string())?;
            let ys = after
                .array_items()
                .ok_or_else(|| "diff: array type over a non-array value".to_string())?;
            let body = diff_array(xs, ys, &pt)?;
            mk_patch(&pt, body)
        }
        TypeKind::Set(elem) => {
            let xs = before
                .set_items()
                .ok_or_else(|| "diff: set type over a non-set value".to_string())?;
            let ys = after
                .set_items()
                .ok_or_else(|| "diff: set type over a non-set value".to_string())?;
            let body = diff_set(xs, ys, elem, &pt)?;
            mk_patch(&pt, body)
        }
        TypeKind::Dict { key, value } => {
            let xs = before
                .dict_entries()
                .ok_or_else(|| "diff: dict type over a non-dict value".to_string())?;
            let ys = after
                .dict_entries()
                .ok_or_else(|| "diff: dict type over a non-dict value".to_string())?;
            let body = diff_dict(xs, ys, key, value, &pt, stack)?;
            mk_patch(&pt, body)
        }
        TypeKind::Struct(fields) => {
            let xs = before
                .struct_fields()
                .ok_or_else(|| "diff: struct type over a non-struct value".to_string())?;
            let ys = after
                .struct_fields()
                .ok_or_else(|| "diff: struct type over a non-struct value".to_string())?;
            if xs.len() != fields.len() || ys.len() != fields.len() {
                return Err("diff: struct value does not match its type".to_string());
            }
            let body_ty = pt
                .member_type("patch")
                .ok_or_else(|| "struct patch type lacks a body".to_string())?;
            let mut out = Vec::with_capacity(fields.len());
            for (i, field) in fields.iter().enumerate() {
                out.push(diff_guarded(&xs[i], &ys[i], &field.ty, stack)?);
            }
            mk_patch(&pt, Value::struct_of(body_ty, out)?)
        }
        TypeKind::Variant(_) => {
            let (_, case_a, payload_a) = before
                .variant_parts()
                .ok_or_else(|| "diff: variant type over a non-variant value".to_string())?;
            let (_, case_b, payload_b) = after
                .variant_parts()
                .ok_or_else(|| "diff: variant type over a non-variant value".to_string())?;
            if case_a != case_b {
                return mk_replace(&pt, before, after);
            }
            let case_ty = ty
                .member_type(case_a)
                .ok_or_else(|| format!("diff: variant type lacks case '{}'", case_a))?;
            let body_ty = pt
                .member_type("patch")
                .ok_or_else(|| "variant patch type lacks a body".to_string())?;
            let inner = diff_guarded(payload_a, payload_b, &case_ty, stack)?;
            mk_patch(&pt, Value::variant(body_ty, case_a, inner)?)
        }
        TypeKind::Ref(elem) => {
            let a = before
                .ref_get()
                .ok_or_else(|| "diff: ref type over a non-ref value".to_string())?;
            let b = after
                .ref_get()
                .ok_or_else(|| "diff: ref type over a non-ref value".to_string())?;
            let inner = diff_guarded(&a, &b, elem, stack)?;
            mk_patch(&pt, inner)
        }
        // Scalars and opaque kinds admit no structural body.
        _ => mk_replace(&pt, before, after),
    }
}

/// Classical LCS over element equality; unmatched left elements become
/// deletes, unmatched right elements become inserts. The running delete and
/// insert counts keep each key an index into the working sequence at the
/// moment its operation applies.
fn diff_array(xs: &[Value], ys: &[Value], pt: &Type) -> Result<Value, String> {
    let body_ty = pt
        .member_type("patch")
        .ok_or_else(|| "array patch type lacks a body".to_string())?;
    let entry_ty = body_ty
        .elem()
        .ok_or_else(|| "array patch body is not an array".to_string())?;
    let op_ty = entry_ty
        .member_type("operation")
        .ok_or_else(|| "array patch entry lacks an operation".to_string())?;

    let pairs = lcs_pairs(xs, ys);
    let mut ops: Vec<Value> = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);
    let (mut deletes, mut inserts) = (0i64, 0i64);
    let mut emit_gap = |upto_i: usize,
                        upto_j: usize,
                        i: &mut usize,
                        j: &mut usize,
                        ops: &mut Vec<Value>|
     -> Result<(), String> {
        while *i < upto_i {
            let key = *i as i64 - deletes + inserts;
            let op = Value::variant(op_ty.clone(), "delete", xs[*i].clone())?;
            ops.push(entry_value(&entry_ty, key, 0, op)?);
            deletes += 1;
            *i += 1;
        }
        while *j < upto_j {
            let key = *i as i64 - deletes + inserts;
            let op = Value::variant(op_ty.clone(), "insert", ys[*j].clone())?;
            ops.push(entry_value(&entry_ty, key, 0, op)?);
            inserts += 1;
            *j += 1;
        }
        Ok(())
    };
    for (bi, aj) in &pairs {
        emit_gap(*bi, *aj, &mut i, &mut j, &mut ops)?;
        i = bi + 1;
        j = aj + 1;
    }
    emit_gap(xs.len(), ys.len(), &mut i, &mut j, &mut ops)?;
    Ok(Value::array(entry_ty, ops))
}

fn entry_value(entry_ty: &Type, key: i64, offset: i64, operation: Value) -> Result<Value, String> {
    Value::struct_of(
        entry_ty.clone(),
        vec![Value::integer(key), Value::integer(offset), operation],
    )
}

/// Matched index pairs of the longest common subsequence under value
/// equality, in increasing order on both sides.
fn lcs_pairs(xs: &[Value], ys: &[Value]) -> Vec<(usize, usize)> {
    let n = xs.len();
    let m = ys.len();
    let mut dp = vec![0u32; (n + 1) * (m + 1)];
    let at = |i: usize, j: usize| i * (m + 1) + j;
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            dp[at(i, j)] = if equal(&xs[i], &ys[j]) {
                dp[at(i + 1, j + 1)] + 1
            } else {
                dp[at(i + 1, j)].max(dp[at(i, j + 1)])
            };
        }
    }
    let mut pairs = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if equal(&xs[i], &ys[j]) {
            pairs.push((i, j));
            i += 1;
            j += 1;
        } else if dp[at(i + 1, j)] >= dp[at(i, j + 1)] {
            i += 1;
        } else {
            j += 1;
        }
    }
    pairs
}

fn diff_set(xs: &[Value], ys: &[Value], elem: &Type, pt: &Type) -> Result<Value, String> {
    let body_ty = pt
        .member_type("patch")
        .ok_or_else(|| "set patch type lacks a body".to_string())?;
    let (_, op_ty) = body_ty
        .dict_types()
        .ok_or_else(|| "set patch body is not a dict".to_string())?;
    let mut entries = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);
    while i < xs.len() || j < ys.len() {
        let order = match (xs.get(i), ys.get(j)) {
            (Some(x), Some(y)) => compare(x, y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => break,
        };
        match order {
            std::cmp::Ordering::Equal => {
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => {
                let op = Value::variant(op_ty.clone(), "delete", Value::null())?;
                entries.push((xs[i].clone(), op));
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                let op = Value::variant(op_ty.clone(), "insert", Value::null())?;
                entries.push((ys[j].clone(), op));
                j += 1;
            }
        }
    }
    Ok(Value::dict(elem.clone(), op_ty, entries))
}

fn diff_dict(
    xs: &[(Value, Value)],
    ys: &[(Value, Value)],
    key_ty: &Type,
    value_ty: &Type,
    pt: &Type,
    stack: &mut Vec<usize>,
) -> Result<Value, String> {
    let body_ty = pt
        .member_type("patch")
        .ok_or_else(|| "dict patch type lacks a body".to_string())?;
    let (_, op_ty) = body_ty
        .dict_types()
        .ok_or_else(|| "dict patch body is not a dict".to_string())?;
    let mut entries = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);
    while i < xs.len() || j < ys.len() {
        let order = match (xs.get(i), ys.get(j)) {
            (Some(x), Some(y)) => compare(&x.0, &y.0),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => break,
        };
        match order {
            std::cmp::Ordering::Equal => {
                if !equal(&xs[i].1, &ys[j].1) {
                    let inner = diff_guarded(&xs[i].1, &ys[j].1, value_ty, stack)?;
                    let op = Value::variant(op_ty.clone(), "update", inner)?;
                    entries.push((xs[i].0.clone(), op));
                }
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => {
                let op = Value::variant(op_ty.clone(), "delete", xs[i].1.clone())?;
                entries.push((xs[i].0.clone(), op));
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                let op = Value::variant(op_ty.clone(), "insert", ys[j].1.clone())?;
                entries.push((ys[j].0.clone(), op));
                j += 1;
            }
        }
    }
    Ok(Value::dict(key_ty.clone(), op_ty, entries))
}

/// Apply a patch to a base value.
pub fn apply(base: &Value, patch: &Value, ty: &Type) -> Result<Value, String> {
    apply_guarded(base, patch, ty, &mut Vec::new())
}

fn apply_guarded(
    base: &Value,
    patch: &Value,
    ty: &Type,
    stack: &mut Vec<usize>,
) -> Result<Value, String> {
    let (_, case, payload) = patch
        .variant_parts()
        .ok_or_else(|| "apply: patch must be a variant value".to_string())?;
    match case {
        "unchanged" => Ok(base.clone()),
        "replace" => payload
            .field("after")
            .ok_or_else(|| "apply: replace patch lacks an after field".to_string()),
        "patch" => {
            if let Some(addr) = ty.recursive_addr() {
                if stack.contains(&addr) {
                    return Err("apply: structural patch re-enters a recursive type".to_string());
                }
                let inner = ty
                    .recursive_inner()
                    .ok_or_else(|| "recursive type is not finalized".to_string())?;
                stack.push(addr);
                let out = apply_structural(base, payload, &inner, stack);
                stack.pop();
                return out;
            }
            apply_structural(base, payload, ty, stack)
        }
        other => Err(format!("apply: unknown patch case '{}'", other)),
    }
}

fn apply_structural(
    base: &Value,
    body: &Value,
    ty: &Type,
    stack: &mut Vec<usize>,
) -> Result<Value, String> {
    match ty.kind() {
        TypeKind::Array(elem) => {
            let mut working = base
                .array_items()
                .ok_or_else(|| "apply: array patch over a non-array value".to_string())?
                .to_vec();
            let entries = body
                .array_items()
                .ok_or_else(|| "apply: array patch body is not an array".to_string())?;
            for entry in entries {
                let key = entry
                    .field("key")
                    .and_then(|v| v.as_integer())
                    .ok_or_else(|| "apply: array patch entry lacks a key".to_string())?;
                let offset = entry
                    .field("offset")
                    .and_then(|v| v.as_integer())
                    .unwrap_or(0);
                let position = key + offset;
                if position < 0 {
                    return Err(format!("apply: array position {} out of range", position));
                }
                let position = position as usize;
                let operation = entry
                    .field("operation")
                    .ok_or_else(|| "apply: array patch entry lacks an operation".to_string())?;
                let (_, op_case, op_payload) = operation
                    .variant_parts()
                    .ok_or_else(|| "apply: array operation is not a variant".to_string())?;
                match op_case {
                    "delete" => {
                        if position >= working.len() {
                            return Err(format!(
                                "apply: delete position {} out of range",
                                position
                            ));
                        }
                        working.remove(position);
                    }
                    "insert" => {
                        if position > working.len() {
                            return Err(format!(
                                "apply: insert position {} out of range",
                                position
                            ));
                        }
                        working.insert(position, op_payload.clone());
                    }
                    "update" => {
                        if position >= working.len() {
                            return Err(format!(
                                "apply: update position {} out of range",
                                position
                            ));
                        }
                        working[position] = apply_guarded(&working[position], op_payload, elem, stack)?;
                    }
                    other => return Err(format!("apply: unknown array operation '{}'", other)),
                }
            }
            Ok(Value::array(elem.clone(), working))
        }
        TypeKind::Set(elem) => {
            let mut items = base
                .set_items()
                .ok_or_else(|| "apply: set patch over a non-set value".to_string())?
                .to_vec();
            let entries = body
                .dict_entries()
                .ok_or_else(|| "apply: set patch body is not a dict".to_string())?;
            for (element, operation) in entries {
                let (_, op_case, _) = operation
                    .variant_parts()
                    .ok_or_else(|| "apply: set operation is not a variant".to_string())?;
                let slot = items.binary_search_by(|probe| compare(probe, element));
                match (op_case, slot) {
                    ("delete", Ok(at)) => {
                        items.remove(at);
                    }
                    ("delete", Err(_)) => {
                        return Err("apply: delete of an absent set element".to_string());
                    }
                    ("insert", Err(at)) => {
                        items.insert(at, element.clone());
                    }
                    ("insert", Ok(_)) => {
                        return Err("apply: insert of a present set element".to_string());
                    }
                    (other, _) => {
                        return Err(format!("apply: unknown set operation '{}'", other));
                    }
                }
            }
            Ok(Value::set(elem.clone(), items))
        }
        TypeKind::Dict { key, value } => {
            let mut entries = base
                .dict_entries()
                .ok_or_else(|| "apply: dict patch over a non-dict value".to_string())?
                .to_vec();
            let ops = body
                .dict_entries()
                .ok_or_else(|| "apply: dict patch body is not a dict".to_string())?;
            for (k, operation) in ops {
                let (_, op_case, op_payload) = operation
                    .variant_parts()
                    .ok_or_else(|| "apply: dict operation is not a variant".to_string())?;
                let slot = entries.binary_search_by(|probe| compare(&probe.0, k));
                match (op_case, slot) {
                    ("delete", Ok(at)) => {
                        entries.remove(at);
                    }
                    ("delete", Err(_)) => {
                        return Err("apply: delete of an absent dict key".to_string());
                    }
                    ("insert", Err(at)) => {
                        entries.insert(at, (k.clone(), op_payload.clone()));
                    }
                    ("insert", Ok(_)) => {
                        return Err("apply: insert of a present dict key".to_string());
                    }
                    ("update", Ok(at)) => {
                        entries[at].1 = apply_guarded(&entries[at].1, op_payload, value, stack)?;
                    }
                    ("update", Err(_)) => {
                        return Err("apply: update of an absent dict key".to_string());
                    }
                    (other, _) => {
                        return Err(format!("apply: unknown dict operation '{}'", other));
                    }
                }
            }
            Ok(Value::dict(key.clone(), value.clone(), entries))
        }
        TypeKind::Struct(fields) => {
            let base_fields = base
                .struct_fields()
                .ok_or_else(|| "apply: struct patch over a non-struct value".to_string())?;
            let patch_fields = body
                .struct_fields()
                .ok_or_else(|| "apply: struct patch body is not a struct".to_string())?;
            if base_fields.len() != fields.len() || patch_fields.len() != fields.len() {
                return Err("apply: struct value does not match its type".to_string());
            }
            let mut out = Vec::with_capacity(fields.len());
            for (i, field) in fields.iter().enumerate() {
                out.push(apply_guarded(&base_fields[i], &patch_fields[i], &field.ty, stack)?);
            }
            Value::struct_of(ty.clone(), out)
        }
        TypeKind::Variant(_) => {
            let (base_ty, base_case, base_payload) = base
                .variant_parts()
                .ok_or_else(|| "apply: variant patch over a non-variant value".to_string())?;
            let (_, patch_case, inner) = body
                .variant_parts()
                .ok_or_else(|| "apply: variant patch body is not a variant".to_string())?;
            if base_case != patch_case {
                return Err(format!(
                    "apply: variant patch case '{}' does not match value case '{}'",
                    patch_case, base_case
                ));
            }
            let case_ty = ty
                .member_type(base_case)
                .ok_or_else(|| format!("apply: variant type lacks case '{}'", base_case))?;
            let payload = apply_guarded(base_payload, inner, &case_ty, stack)?;
            Value::variant(base_ty.clone(), base_case, payload)
        }
        TypeKind::Ref(elem) => {
            let target = base
                .ref_get()
                .ok_or_else(|| "apply: ref patch over a non-ref value".to_string())?;
            let patched = apply_guarded(&target, body, elem, stack)?;
            Ok(Value::ref_of(elem.clone(), patched))
        }
        _ => Err("apply: structural patch over an unpatchable kind".to_string()),
    }
}

/// Invert a patch, so `apply(apply(a, p), invert(p)) = a`.
pub fn invert(patch: &Value, ty: &Type) -> Result<Value, String> {
    invert_guarded(patch, ty, &mut Vec::new())
}

fn invert_guarded(patch: &Value, ty: &Type, stack: &mut Vec<usize>) -> Result<Value, String> {
    let (patch_ty, case, payload) = patch
        .variant_parts()
        .ok_or_else(|| "invert: patch must be a variant value".to_string())?;
    match case {
        "unchanged" => Ok(patch.clone()),
        "replace" => {
            let before = payload
                .field("before")
                .ok_or_else(|| "invert: replace patch lacks a before field".to_string())?;
            let after = payload
                .field("after")
                .ok_or_else(|| "invert: replace patch lacks an after field".to_string())?;
            mk_replace(patch_ty, &after, &before)
        }
        "patch" => {
            if let Some(addr) = ty.recursive_addr() {
                if stack.contains(&addr) {
                    return Err("invert: structural patch re-enters a recursive type".to_string());
                }
                let inner = ty
                    .recursive_inner()
                    .ok_or_else(|| "recursive type is not finalized".to_string())?;
                stack.push(addr);
                let body = invert_structural(payload, &inner, stack);
                stack.pop();
                return Ok(Value::variant(patch_ty.clone(), "patch", body?)?);
            }
            let body = invert_structural(payload, ty, stack)?;
            Ok(Value::variant(patch_ty.clone(), "patch", body)?)
        }
        other => Err(format!("invert: unknown patch case '{}'", other)),
    }
}

fn invert_structural(body: &Value, ty: &Type, stack: &mut Vec<usize>) -> Result<Value, String> {
    match ty.kind() {
        TypeKind::Array(elem) => {
            let entries = body
                .array_items()
                .ok_or_else(|| "invert: array patch body is not an array".to_string())?;
            let entry_ty = body
                .elem_type()
                .ok_or_else(|| "invert: array patch body lacks an entry type".to_string())?;
            let mut out = Vec::with_capacity(entries.len());
            for entry in entries.iter().rev() {
                let key = entry
                    .field("key")
                    .and_then(|v| v.as_integer())
                    .ok_or_else(|| "invert: array patch entry lacks a key".to_string())?;
                let offset = entry
                    .field("offset")
                    .and_then(|v| v.as_integer())
                    .unwrap_or(0);
                let operation = entry
                    .field("operation")
                    .ok_or_else(|| "invert: array patch entry lacks an operation".to_string())?;
                let (op_ty, op_case, op_payload) = operation
                    .variant_parts()
                    .ok_or_else(|| "invert: array operation is not a variant".to_string())?;
                let inverted = match op_case {
                    "delete" => Value::variant(op_ty.clone(), "insert", op_payload.clone())?,
                    "insert" => Value::variant(op_ty.clone(), "delete", op_payload.clone())?,
                    "update" => Value::variant(
                        op_ty.clone(),
                        "update",
                        invert_guarded(op_payload, elem, stack)?,
                    )?,
                    other => return Err(format!("invert: unknown array operation '{}'", other)),
                };
                out.push(entry_value(&entry_ty, key, offset, inverted)?);
            }
            Ok(Value::array(entry_ty, out))
        }
        TypeKind::Set(_) => {
            let entries = body
                .dict_entries()
                .ok_or_else(|| "invert: set patch body is not a dict".to_string())?;
            let (key_ty, op_ty) = body_dict_types(body)?;
            let mut out = Vec::with_capacity(entries.len());
            for (element, operation) in entries {
                let (_, op_case, _) = operation
                    .variant_parts()
                    .ok_or_else(|| "invert: set operation is not a variant".to_string())?;
                let swapped = match op_case {
                    "delete" => Value::variant(op_ty.clone(), "insert", Value::null())?,
                    "insert" => Value::variant(op_ty.clone(), "delete", Value::null())?,
                    other => return Err(format!("invert: unknown set operation '{}'", other)),
                };
                out.push((element.clone(), swapped));
            }
            Ok(Value::dict(key_ty, op_ty, out))
        }
        TypeKind::Dict { value, .. } => {
            let entries = body
                .dict_entries()
                .ok_or_else(|| "invert: dict patch body is not a dict".to_string())?;
            let (key_ty, op_ty) = body_dict_types(body)?;
            let mut out = Vec::with_capacity(entries.len());
            for (k, operation) in entries {
                let (_, op_case, op_payload) = operation
                    .variant_parts()
                    .ok_or_else(|| "invert: dict operation is not a variant".to_string())?;
                let swapped = match op_case {
                    "delete" => Value::variant(op_ty.clone(), "insert", op_payload.clone())?,
                    "insert" => Value::variant(op_ty.clone(), "delete", op_payload.clone())?,
                    "update" => Value::variant(
                        op_ty.clone(),
                        "update",
                        invert_guarded(op_payload, value, stack)?,
                    )?,
                    other => return Err(format!("invert: unknown dict operation '{}'", other)),
                };
                out.push((k.clone(), swapped));
            }
            Ok(Value::dict(key_ty, op_ty, out))
        }
        TypeKind::Struct(fields) => {
            let body_fields = body
                .struct_fields()
                .ok_or_else(|| "invert: struct patch body is not a struct".to_string())?;
            let body_ty = body
                .struct_type()
                .ok_or_else(|| "invert: struct patch body lacks a type".to_string())?
                .clone();
            if body_fields.len() != fields.len() {
                return Err("invert: struct patch does not match its type".to_string());
            }
            let mut out = Vec::with_capacity(fields.len());
            for (i, field) in fields.iter().enumerate() {
                out.push(invert_guarded(&body_fields[i], &field.ty, stack)?);
            }
            Value::struct_of(body_ty, out)
        }
        TypeKind::Variant(_) => {
            let (body_ty, case, inner) = body
                .variant_parts()
                .ok_or_else(|| "invert: variant patch body is not a variant".to_string())?;
            let case_ty = ty
                .member_type(case)
                .ok_or_else(|| format!("invert: variant type lacks case '{}'", case))?;
            Value::variant(body_ty.clone(), case, invert_guarded(inner, &case_ty, stack)?)
        }
        TypeKind::Ref(elem) => invert_guarded(body, elem, stack),
        _ => Err("invert: structural patch over an unpatchable kind".to_string()),
    }
}

fn body_dict_types(body: &Value) -> Result<(Type, Type), String> {
    body.type_of()
        .and_then(|t| t.dict_types())
        .ok_or_else(|| "patch body is not a dict".to_string())
}

/// Compose two sequential patches: `apply(a, compose(p, q)) =
/// apply(apply(a, p), q)`.
pub fn compose(first: &Value, second: &Value, ty: &Type) -> Result<Value, String> {
    compose_guarded(first, second, ty, &mut Vec::new())
}

fn compose_guarded(
    first: &Value,
    second: &Value,
    ty: &Type,
    stack: &mut Vec<usize>,
) -> Result<Value, String> {
    let (first_ty, first_case, first_payload) = first
        .variant_parts()
        .ok_or_else(|| "compose: patch must be a variant value".to_string())?;
    let (_, second_case, second_payload) = second
        .variant_parts()
        .ok_or_else(|| "compose: patch must be a variant value".to_string())?;
    match (first_case, second_case) {
        ("unchanged", _) => Ok(second.clone()),
        (_, "unchanged") => Ok(first.clone()),
        ("replace", "replace") => {
            let before = first_payload
                .field("before")
                .ok_or_else(|| "compose: replace patch lacks a before field".to_string())?;
            let after = second_payload
                .field("after")
                .ok_or_else(|| "compose: replace patch lacks an after field".to_string())?;
            mk_replace(first_ty, &before, &after)
        }
        ("replace", "patch") => {
            let before = first_payload
                .field("before")
                .ok_or_else(|| "compose: replace patch lacks a before field".to_string())?;
            let after = first_payload
                .field("after")
                .ok_or_else(|| "compose: replace patch lacks an after field".to_string())?;
            let patched = apply(&after, second, ty)?;
            mk_replace(first_ty, &before, &patched)
        }
        ("patch", "replace") => {
            let before = second_payload
                .field("before")
                .ok_or_else(|| "compose: replace patch lacks a before field".to_string())?;
            let after = second_payload
                .field("after")
                .ok_or_else(|| "compose: replace patch lacks an after field".to_string())?;
            let undone = apply(&before, &invert(first, ty)?, ty)?;
            mk_replace(first_ty, &undone, &after)
        }
        ("patch", "patch") => {
            if let Some(addr) = ty.recursive_addr() {
                if stack.contains(&addr) {
                    return Err("compose: structural patch re-enters a recursive type".to_string());
                }
                let inner = ty
                    .recursive_inner()
                    .ok_or_else(|| "recursive type is not finalized".to_string())?;
                stack.push(addr);
                let body = compose_structural(first_payload, second_payload, &inner, stack);
                stack.pop();
                return Ok(Value::variant(first_ty.clone(), "patch", body?)?);
            }
            let body = compose_structural(first_payload, second_payload, ty, stack)?;
            Ok(Value::variant(first_ty.clone(), "patch", body)?)
        }
        (a, b) => Err(format!("compose: unknown patch cases '{}' and '{}'", a, b)),
    }
}

fn compose_structural(
    first: &Value,
    second: &Value,
    ty: &Type,
    stack: &mut Vec<usize>,
) -> Result<Value, String> {
    match ty.kind() {
        TypeKind::Array(_) => {
            // Sequential application: concatenating the operation lists is
            // exact, because apply replays them in order.
            let xs = first
                .array_items()
                .ok_or_else(|| "compose: array patch body is not an array".to_string())?;
            let ys = second
                .array_items()
                .ok_or_else(|| "compose: array patch body is not an array".to_string())?;
            let entry_ty = first
                .elem_type()
                .ok_or_else(|| "compose: array patch body lacks an entry type".to_string())?;
            let mut out = xs.to_vec();
            out.extend(ys.iter().cloned());
            Ok(Value::array(entry_ty, out))
        }
        TypeKind::Set(_) => {
            let (key_ty, op_ty) = body_dict_types(first)?;
            let xs = first
                .dict_entries()
                .ok_or_else(|| "compose: set patch body is not a dict".to_string())?;
            let ys = second
                .dict_entries()
                .ok_or_else(|| "compose: set patch body is not a dict".to_string())?;
            let mut out: Vec<(Value, Value)> = Vec::new();
            merge_keyed(xs, ys, &mut |element, left, right| {
                match (left, right) {
                    (Some(op), None) => out.push((element.clone(), op.clone())),
                    (None, Some(op)) => out.push((element.clone(), op.clone())),
                    (Some(l), Some(r)) => {
                        let lc = variant_case(l)?;
                        let rc = variant_case(r)?;
                        match (lc.as_str(), rc.as_str()) {
                            // insert then delete, delete then insert: cancel.
                            ("insert", "delete") | ("delete", "insert") => {}
                            _ => {
                                return Err(format!(
                                    "compose: conflicting set operations '{}' and '{}'",
                                    lc, rc
                                ));
                            }
                        }
                    }
                    (None, None) => {}
                }
                Ok(())
            })?;
            Ok(Value::dict(key_ty, op_ty, out))
        }
        TypeKind::Dict { value, .. } => {
            let (key_ty, op_ty) = body_dict_types(first)?;
            let xs = first
                .dict_entries()
                .ok_or_else(|| "compose: dict patch body is not a dict".to_string())?;
            let ys = second
                .dict_entries()
                .ok_or_else(|| "compose: dict patch body is not a dict".to_string())?;
            let mut out: Vec<(Value, Value)> = Vec::new();
            let value_ty = value.clone();
            let mut combine = |l: &Value, r: &Value, stack: &mut Vec<usize>| -> Result<Option<Value>, String> {
                let (_, lc, lp) = l
                    .variant_parts()
                    .ok_or_else(|| "patch operation is not a variant".to_string())?;
                let (_, rc, rp) = r
                    .variant_parts()
                    .ok_or_else(|| "patch operation is not a variant".to_string())?;
                match (lc, rc) {
                    ("insert", "delete") => Ok(None),
                    ("insert", "update") => {
                        let patched = apply_guarded(lp, rp, &value_ty, stack)?;
                        Ok(Some(Value::variant(op_ty.clone(), "insert", patched)?))
                    }
                    ("delete", "insert") => {
                        let vt = patch_type(&value_ty);
                        let replacement = mk_replace(&vt, lp, rp)?;
                        Ok(Some(Value::variant(op_ty.clone(), "update", replacement)?))
                    }
                    ("update", "update") => {
                        let folded = compose_guarded(lp, rp, &value_ty, stack)?;
                        Ok(Some(Value::variant(op_ty.clone(), "update", folded)?))
                    }
                    ("update", "delete") => {
                        let undone = invert_guarded(lp, &value_ty, stack)?;
                        let original = apply_guarded(rp, &undone, &value_ty, stack)?;
                        Ok(Some(Value::variant(op_ty.clone(), "delete", original)?))
                    }
                    (a, b) => Err(format!(
                        "compose: conflicting dict operations '{}' and '{}'",
                        a, b
                    )),
                }
            };
            merge_keyed(xs, ys, &mut |key, left, right| {
                match (left, right) {
                    (Some(op), None) | (None, Some(op)) => {
                        out.push((key.clone(), op.clone()));
                    }
                    (Some(l), Some(r)) => {
                        if let Some(op) = combine(l, r, stack)? {
                            out.push((key.clone(), op));
                        }
                    }
                    (None, None) => {}
                }
                Ok(())
            })?;
            Ok(Value::dict(key_ty, op_ty, out))
        }
        TypeKind::Struct(fields) => {
            let xs = first
                .struct_fields()
                .ok_or_else(|| "compose: struct patch body is not a struct".to_string())?;
            let ys = second
                .struct_fields()
                .ok_or_else(|| "compose: struct patch body is not a struct".to_string())?;
            let body_ty = first
                .struct_type()
                .ok_or_else(|| "compose: struct patch body lacks a type".to_string())?
                .clone();
            if xs.len() != fields.len() || ys.len() != fields.len() {
                return Err("compose: struct patch does not match its type".to_string());
            }
            let mut out = Vec::with_capacity(fields.len());
            for (i, field) in fields.iter().enumerate() {
                out.push(compose_guarded(&xs[i], &ys[i], &field.ty, stack)?);
            }
            Value::struct_of(body_ty, out)
        }
        TypeKind::Variant(_) => {
            let (body_ty, first_case, first_inner) = first
                .variant_parts()
                .ok_or_else(|| "compose: variant patch body is not a variant".to_string())?;
            let (_, second_case, second_inner) = second
                .variant_parts()
                .ok_or_else(|| "compose: variant patch body is not a variant".to_string())?;
            if first_case != second_case {
                return Err(format!(
                    "compose: variant patches with differing cases '{}' and '{}'",
                    first_case, second_case
                ));
            }
            let case_ty = ty
                .member_type(first_case)
                .ok_or_else(|| format!("compose: variant type lacks case '{}'", first_case))?;
            let folded = compose_guarded(first_inner, second_inner, &case_ty, stack)?;
            Value::variant(body_ty.clone(), first_case, folded)
        }
        TypeKind::Ref(elem) => compose_guarded(first, second, elem, stack),
        _ => Err("compose: structural patch over an unpatchable kind".to_string()),
    }
}

fn variant_case(value: &Value) -> Result<String, String> {
    value
        .variant_parts()
        .map(|(_, case, _)| case.to_string())
        .ok_or_else(|| "patch operation is not a variant".to_string())
}

/// Merge two key-sorted entry lists, invoking the callback with the
/// operation(s) present on each side for every key in either.
fn merge_keyed(
    xs: &[(Value, Value)],
    ys: &[(Value, Value)],
    f: &mut impl FnMut(&Value, Option<&Value>, Option<&Value>) -> Result<(), String>,
) -> Result<(), String> {
    let (mut i, mut j) = (0usize, 0usize);
    while i < xs.len() || j < ys.len() {
        let order = match (xs.get(i), ys.get(j)) {
            (Some(x), Some(y)) => compare(&x.0, &y.0),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => break,
        };
        match order {
            std::cmp::Ordering::Equal => {
                f(&xs[i].0, Some(&xs[i].1), Some(&ys[j].1))?;
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => {
                f(&xs[i].0, Some(&xs[i].1), None)?;
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                f(&ys[j].0, None, Some(&ys[j].1))?;
                j += 1;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_array(items: &[i64]) -> Value {
        Value::array(
            Type::integer(),
            items.iter().map(|n| Value::integer(*n)).collect(),
        )
    }

    fn string_int_dict(entries: &[(&str, i64)]) -> Value {
        Value::dict(
            Type::string(),
            Type::integer(),
            entries
                .iter()
                .map(|(k, v)| (Value::string(*k), Value::integer(*v)))
                .collect(),
        )
    }

    #[test]
    fn test_diff_equal_is_unchanged() {
        let ty = Type::integer();
        let p = diff(&Value::integer(4), &Value::integer(4), &ty).unwrap();
        let (_, case, _) = p.variant_parts().unwrap();
        assert_eq!(case, "unchanged");
    }

    #[test]
    fn test_scalar_diff_is_replace_and_applies() {
        let ty = Type::integer();
        let p = diff(&Value::integer(1), &Value::integer(2), &ty).unwrap();
        let out = apply(&Value::integer(1), &p, &ty).unwrap();
        assert_eq!(out.as_integer(), Some(2));
    }

    #[test]
    fn test_array_patch_round_trip() {
        let ty = Type::array(Type::integer());
        let a = int_array(&[1, 2, 3]);
        let b = int_array(&[1, 4, 3, 5]);
        let p = diff(&a, &b, &ty).unwrap();
        assert!(equal(&apply(&a, &p, &ty).unwrap(), &b));
        let inverse = invert(&p, &ty).unwrap();
        assert!(equal(&apply(&b, &inverse, &ty).unwrap(), &a));
    }

    #[test]
    fn test_array_diff_preserves_common_subsequence() {
        let ty = Type::array(Type::integer());
        let a = int_array(&[1, 2, 3, 4, 5]);
        let b = int_array(&[2, 3, 9, 5]);
        let p = diff(&a, &b, &ty).unwrap();
        assert!(equal(&apply(&a, &p, &ty).unwrap(), &b));
    }

    #[test]
    fn test_set_patch() {
        let ty = Type::set(Type::integer());
        let a = Value::set(
            Type::integer(),
            vec![Value::integer(1), Value::integer(2)],
        );
        let b = Value::set(
            Type::integer(),
            vec![Value::integer(2), Value::integer(3)],
        );
        let p = diff(&a, &b, &ty).unwrap();
        assert!(equal(&apply(&a, &p, &ty).unwrap(), &b));
        let inverse = invert(&p, &ty).unwrap();
        assert!(equal(&apply(&b, &inverse, &ty).unwrap(), &a));
    }

    #[test]
    fn test_dict_compose() {
        let ty = Type::dict(Type::string(), Type::integer());
        let a = string_int_dict(&[("x", 1)]);
        let b = string_int_dict(&[("x", 2), ("y", 3)]);
        let c = string_int_dict(&[("y", 4)]);
        let p1 = diff(&a, &b, &ty).unwrap();
        let p2 = diff(&b, &c, &ty).unwrap();
        let folded = compose(&p1, &p2, &ty).unwrap();
        assert!(equal(&apply(&a, &folded, &ty).unwrap(), &c));
    }

    #[test]
    fn test_compose_laws_with_replace() {
        let ty = Type::integer();
        let p = diff(&Value::integer(1), &Value::integer(2), &ty).unwrap();
        let q = diff(&Value::integer(2), &Value::integer(3), &ty).unwrap();
        let folded = compose(&p, &q, &ty).unwrap();
        assert!(equal(
            &apply(&Value::integer(1), &folded, &ty).unwrap(),
            &Value::integer(3)
        ));
        let unchanged = diff(&Value::integer(5), &Value::integer(5), &ty).unwrap();
        assert!(equal(&compose(&unchanged, &p, &ty).unwrap(), &p));
        assert!(equal(&compose(&p, &unchanged, &ty).unwrap(), &p));
    }

    #[test]
    fn test_struct_patch_recurses_per_field() {
        let ty = Type::struct_of(vec![
            Field::new("a", Type::integer()),
            Field::new("b", Type::string()),
        ]);
        let before = Value::struct_of(
            ty.clone(),
            vec![Value::integer(1), Value::string("old")],
        )
        .unwrap();
        let after = Value::struct_of(
            ty.clone(),
            vec![Value::integer(1), Value::string("new")],
        )
        .unwrap();
        let p = diff(&before, &after, &ty).unwrap();
        let (_, case, body) = p.variant_parts().unwrap();
        assert_eq!(case, "patch");
        // Field `a` is unchanged, field `b` replaced.
        let a_patch = body.field("a").unwrap();
        let (_, a_case, _) = a_patch.variant_parts().unwrap();
        assert_eq!(a_case, "unchanged");
        assert!(equal(&apply(&before, &p, &ty).unwrap(), &after));
    }

    #[test]
    fn test_variant_case_change_forces_replace() {
        let ty = Type::variant_of(vec![
            Field::new("left", Type::integer()),
            Field::new("right", Type::string()),
        ]);
        let l = Value::variant(ty.clone(), "left", Value::integer(1)).unwrap();
        let r = Value::variant(ty.clone(), "right", Value::string("x")).unwrap();
        let p = diff(&l, &r, &ty).unwrap();
        let (_, case, _) = p.variant_parts().unwrap();
        assert_eq!(case, "replace");
        assert!(equal(&apply(&l, &p, &ty).unwrap(), &r));
    }

    #[test]
    fn test_ref_patch_recurses_on_pointee() {
        let ty = Type::ref_of(Type::integer());
        let a = Value::ref_of(Type::integer(), Value::integer(1));
        let b = Value::ref_of(Type::integer(), Value::integer(2));
        let p = diff(&a, &b, &ty).unwrap();
        assert!(equal(&apply(&a, &p, &ty).unwrap(), &b));
    }

    #[test]
    fn test_recursive_type_degrades_to_replace() {
        // recursive<variant{leaf: integer, node: array<self>}>
        let ty = Type::recursive(|me| {
            Type::variant_of(vec![
                Field::new("leaf", Type::integer()),
                Field::new("node", Type::array(me.clone())),
            ])
        });
        let inner = ty.recursive_inner().unwrap();
        let leaf1 = Value::variant(inner.clone(), "leaf", Value::integer(1)).unwrap();
        let leaf2 = Value::variant(inner.clone(), "leaf", Value::integer(2)).unwrap();
        let node1 = Value::variant(
            inner.clone(),
            "node",
            Value::array(ty.clone(), vec![leaf1.clone()]),
        )
        .unwrap();
        let node2 = Value::variant(
            inner.clone(),
            "node",
            Value::array(ty.clone(), vec![leaf2.clone()]),
        )
        .unwrap();
        let p = diff(&node1, &node2, &ty).unwrap();
        assert!(equal(&apply(&node1, &p, &ty).unwrap(), &node2));
        let inverse = invert(&p, &ty).unwrap();
        assert!(equal(&apply(&node2, &inverse, &ty).unwrap(), &node1));
    }

    #[test]
    fn test_compose_variant_case_mismatch_errors() {
        let ty = Type::variant_of(vec![
            Field::new("left", Type::integer()),
            Field::new("right", Type::integer()),
        ]);
        let l1 = Value::variant(ty.clone(), "left", Value::integer(1)).unwrap();
        let l2 = Value::variant(ty.clone(), "left", Value::integer(2)).unwrap();
        let r1 = Value::variant(ty.clone(), "right", Value::integer(1)).unwrap();
        let r2 = Value::variant(ty.clone(), "right", Value::integer(2)).unwrap();
        let p = diff(&l1, &l2, &ty).unwrap();
        let q = diff(&r1, &r2, &ty).unwrap();
        assert!(compose(&p, &q, &ty).is_err());
    }

    #[test]
    fn test_offset_biases_position() {
        // A hand-built patch with a non-zero offset: delete at key 0 with
        // offset 1 removes index 1.
        let ty = Type::array(Type::integer());
        let pt = patch_type(&ty);
        let body_ty = pt.member_type("patch").unwrap();
        let entry_ty = body_ty.elem().unwrap();
        let op_ty = entry_ty.member_type("operation").unwrap();
        let op = Value::variant(op_ty, "delete", Value::integer(2)).unwrap();
        let entry = entry_value(&entry_ty, 0, 1, op).unwrap();
        let patch = mk_patch(&pt, Value::array(entry_ty, vec![entry])).unwrap();
        let base = int_array(&[1, 2, 3]);
        let out = apply(&base, &patch, &ty).unwrap();
        assert!(equal(&out, &int_array(&[1, 3])));
    }
}

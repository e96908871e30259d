//! The JSON codec
//!
//! Type-directed, with pinned conventions:
//!
//! - integers as JSON numbers without a fractional part; datetimes as their
//!   epoch-millisecond numbers
//! - floats as shortest-round-trip decimals; NaN and infinities are rejected
//! - blobs as `"0x…"` hex strings
//! - arrays, sets, vectors as JSON arrays; matrices as arrays of row arrays
//! - dicts as JSON objects only when the key type is string, otherwise as
//!   arrays of `[key, value]` pairs
//! - structs as objects; variants as single-field objects `{"case": payload}`
//! - refs encode their target

use crate::codec::CodecError;
use serde_json::{Map, Number};
use tern_core::{Type, TypeKind, Value, ValueKind};

/// Encode a value to JSON text.
pub fn encode_json(value: &Value, ty: &Type) -> Result<String, CodecError> {
    let json = to_json(value, ty)?;
    serde_json::to_string(&json).map_err(|e| CodecError::InvalidData(e.to_string()))
}

/// Decode JSON text to a value, directed by the type.
pub fn decode_json(text: &str, ty: &Type) -> Result<Value, CodecError> {
    let json: serde_json::Value =
        serde_json::from_str(text).map_err(|e| CodecError::Parse {
            position: 0,
            message: e.to_string(),
        })?;
    from_json(&json, ty)
}

fn mismatch(expected: &str, value: &Value) -> CodecError {
    CodecError::TypeMismatch(format!("expected {}, got {:?}", expected, value.kind()))
}

/// Build the JSON tree for a value.
pub fn to_json(value: &Value, ty: &Type) -> Result<serde_json::Value, CodecError> {
    let ty = ty
        .unwrap_recursive()
        .ok_or_else(|| CodecError::InvalidData("recursive type is not finalized".to_string()))?;
    match ty.kind() {
        TypeKind::Never => Err(CodecError::InvalidData(
            "type never has no values".to_string(),
        )),
        TypeKind::Null => match value.kind() {
            ValueKind::Null => Ok(serde_json::Value::Null),
            _ => Err(mismatch("null", value)),
        },
        TypeKind::Boolean => value
            .as_boolean()
            .map(serde_json::Value::Bool)
            .ok_or_else(|| mismatch("a boolean", value)),
        TypeKind::Integer => value
            .as_integer()
            .map(|n| serde_json::Value::Number(n.into()))
            .ok_or_else(|| mismatch("an integer", value)),
        TypeKind::Float => {
            let x = value.as_float().ok_or_else(|| mismatch("a float", value))?;
            Number::from_f64(x)
                .map(serde_json::Value::Number)
                .ok_or(CodecError::NonFiniteFloat(x))
        }
        TypeKind::String => value
            .as_string()
            .map(|s| serde_json::Value::String(s.to_string()))
            .ok_or_else(|| mismatch("a string", value)),
        TypeKind::DateTime => value
            .as_datetime()
            .map(|ms| serde_json::Value::Number(ms.into()))
            .ok_or_else(|| mismatch("a datetime", value)),
        TypeKind::Blob => value
            .as_blob()
            .map(|b| serde_json::Value::String(format!("0x{}", hex::encode(b))))
            .ok_or_else(|| mismatch("a blob", value)),
        TypeKind::Array(elem) => {
            let items = value
                .array_items()
                .ok_or_else(|| mismatch("an array", value))?;
            items
                .iter()
                .map(|item| to_json(item, elem))
                .collect::<Result<Vec<_>, _>>()
                .map(serde_json::Value::Array)
        }
        TypeKind::Set(elem) => {
            let items = value.set_items().ok_or_else(|| mismatch("a set", value))?;
            items
                .iter()
                .map(|item| to_json(item, elem))
                .collect::<Result<Vec<_>, _>>()
                .map(serde_json::Value::Array)
        }
        TypeKind::Dict { key, value: value_ty } => {
            let entries = value
                .dict_entries()
                .ok_or_else(|| mismatch("a dict", value))?;
            if matches!(key.kind(), TypeKind::String) {
                let mut map = Map::new();
                for (k, v) in entries {
                    let k = k
                        .as_string()
                        .ok_or_else(|| mismatch("a string key", k))?;
                    map.insert(k.to_string(), to_json(v, value_ty)?);
                }
                Ok(serde_json::Value::Object(map))
            } else {
                let mut pairs = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    pairs.push(serde_json::Value::Array(vec![
                        to_json(k, key)?,
                        to_json(v, value_ty)?,
                    ]));
                }
                Ok(serde_json::Value::Array(pairs))
            }
        }
        TypeKind::Struct(fields) => {
            let values = value
                .struct_fields()
                .ok_or_else(|| mismatch("a struct", value))?;
            if values.len() != fields.len() {
                return Err(CodecError::TypeMismatch(
                    "struct value does not match its type".to_string(),
                ));
            }
            let mut map = Map::new();
            for (field, v) in fields.iter().zip(values.iter()) {
                map.insert(field.name.clone(), to_json(v, &field.ty)?);
            }
            Ok(serde_json::Value::Object(map))
        }
        TypeKind::Variant(_) => {
            let (_, case, payload) = value
                .variant_parts()
                .ok_or_else(|| mismatch("a variant", value))?;
            let case_ty = ty.member_type(case).ok_or_else(|| {
                CodecError::TypeMismatch(format!("variant type lacks case '{}'", case))
            })?;
            let mut map = Map::new();
            map.insert(case.to_string(), to_json(payload, &case_ty)?);
            Ok(serde_json::Value::Object(map))
        }
        TypeKind::Ref(elem) => {
            let target = value.ref_get().ok_or_else(|| mismatch("a ref", value))?;
            to_json(&target, elem)
        }
        TypeKind::Vector(elem) => {
            let data = value
                .buffer()
                .ok_or_else(|| mismatch("a vector", value))?;
            let mut items = Vec::with_capacity(data.len());
            for i in 0..data.len() {
                if let Some(v) = data.get(i) {
                    items.push(to_json(&v, elem)?);
                }
            }
            Ok(serde_json::Value::Array(items))
        }
        TypeKind::Matrix(elem) => {
            let data = value
                .buffer()
                .ok_or_else(|| mismatch("a matrix", value))?;
            let (rows, cols) = value
                .matrix_dims()
                .ok_or_else(|| mismatch("a matrix", value))?;
            let mut out = Vec::with_capacity(rows);
            for r in 0..rows {
                let mut row = Vec::with_capacity(cols);
                for c in 0..cols {
                    if let Some(v) = data.get(r * cols + c) {
                        row.push(to_json(&v, elem)?);
                    }
                }
                out.push(serde_json::Value::Array(row));
            }
            Ok(serde_json::Value::Array(out))
        }
        TypeKind::Function { .. } | TypeKind::AsyncFunction { .. } => {
            Err(CodecError::FunctionNotSerializable)
        }
        TypeKind::Recursive(_) | TypeKind::RecursiveRef(_) => Err(CodecError::InvalidData(
            "recursive type is not finalized".to_string(),
        )),
    }
}

fn json_mismatch(expected: &str, json: &serde_json::Value) -> CodecError {
    CodecError::InvalidData(format!("expected {}, got {}", expected, json))
}

/// Rebuild a value from a JSON tree, directed by the type.
pub fn from_json(json: &serde_json::Value, ty: &Type) -> Result<Value, CodecError> {
    let ty = ty
        .unwrap_recursive()
        .ok_or_else(|| CodecError::InvalidData("recursive type is not finalized".to_string()))?;
    match ty.kind() {
        TypeKind::Never => Err(CodecError::InvalidData(
            "type never has no values".to_string(),
        )),
        TypeKind::Null => match json {
            serde_json::Value::Null => Ok(Value::null()),
            _ => Err(json_mismatch("null", json)),
        },
        TypeKind::Boolean => json
            .as_bool()
            .map(Value::boolean)
            .ok_or_else(|| json_mismatch("a boolean", json)),
        TypeKind::Integer => json
            .as_i64()
            .map(Value::integer)
            .ok_or_else(|| json_mismatch("an integer", json)),
        TypeKind::Float => json
            .as_f64()
            .map(Value::float)
            .ok_or_else(|| json_mismatch("a number", json)),
        TypeKind::String => json
            .as_str()
            .map(Value::string)
            .ok_or_else(|| json_mismatch("a string", json)),
        TypeKind::DateTime => json
            .as_i64()
            .map(Value::datetime)
            .ok_or_else(|| json_mismatch("an epoch-millisecond number", json)),
        TypeKind::Blob => {
            let s = json
                .as_str()
                .ok_or_else(|| json_mismatch("a hex string", json))?;
            let hex_str = s
                .strip_prefix("0x")
                .ok_or_else(|| CodecError::InvalidData("blob lacks 0x prefix".to_string()))?;
            hex::decode(hex_str)
                .map(Value::blob)
                .map_err(|e| CodecError::InvalidData(e.to_string()))
        }
        TypeKind::Array(elem) => {
            let items = json
                .as_array()
                .ok_or_else(|| json_mismatch("an array", json))?;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(from_json(item, elem)?);
            }
            Ok(Value::array(elem.clone(), out))
        }
        TypeKind::Set(elem) => {
            let items = json
                .as_array()
                .ok_or_else(|| json_mismatch("an array", json))?;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(from_json(item, elem)?);
            }
            Ok(Value::set(elem.clone(), out))
        }
        TypeKind::Dict { key, value: value_ty } => {
            let mut entries = Vec::new();
            if matches!(key.kind(), TypeKind::String) {
                let map = json
                    .as_object()
                    .ok_or_else(|| json_mismatch("an object", json))?;
                for (k, v) in map {
                    entries.push((Value::string(k.clone()), from_json(v, value_ty)?));
                }
            } else {
                let items = json
                    .as_array()
                    .ok_or_else(|| json_mismatch("an array of pairs", json))?;
                for item in items {
                    let pair = item
                        .as_array()
                        .filter(|p| p.len() == 2)
                        .ok_or_else(|| json_mismatch("a [key, value] pair", item))?;
                    entries.push((from_json(&pair[0], key)?, from_json(&pair[1], value_ty)?));
                }
            }
            Ok(Value::dict(key.clone(), value_ty.clone(), entries))
        }
        TypeKind::Struct(fields) => {
            let map = json
                .as_object()
                .ok_or_else(|| json_mismatch("an object", json))?;
            let mut values = Vec::with_capacity(fields.len());
            for field in fields {
                let v = map.get(&field.name).ok_or_else(|| {
                    CodecError::InvalidData(format!("object lacks field '{}'", field.name))
                })?;
                values.push(from_json(v, &field.ty)?);
            }
            Value::struct_of(ty.clone(), values).map_err(CodecError::InvalidData)
        }
        TypeKind::Variant(_) => {
            let map = json
                .as_object()
                .ok_or_else(|| json_mismatch("a single-field object", json))?;
            if map.len() != 1 {
                return Err(CodecError::InvalidData(
                    "variant object must have exactly one field".to_string(),
                ));
            }
            let (case, payload) = map
                .iter()
                .next()
                .unwrap_or_else(|| unreachable!("length checked"));
            let case_ty = ty.member_type(case).ok_or_else(|| {
                CodecError::InvalidData(format!("unknown variant case '{}'", case))
            })?;
            let payload = from_json(payload, &case_ty)?;
            Value::variant(ty.clone(), case.clone(), payload).map_err(CodecError::InvalidData)
        }
        TypeKind::Ref(elem) => {
            let target = from_json(json, elem)?;
            Ok(Value::ref_of(elem.clone(), target))
        }
        TypeKind::Vector(elem) => {
            let items = json
                .as_array()
                .ok_or_else(|| json_mismatch("an array", json))?;
            let mut buffer = tern_core::value::buffer_for(elem, items.len())
                .ok_or_else(|| CodecError::InvalidData("vector element type".to_string()))?;
            for item in items {
                let v = from_json(item, elem)?;
                buffer.push_value(&v).map_err(CodecError::InvalidData)?;
            }
            Ok(Value::vector(buffer))
        }
        TypeKind::Matrix(elem) => {
            let rows_json = json
                .as_array()
                .ok_or_else(|| json_mismatch("an array of rows", json))?;
            let mut cols = None;
            let mut items = Vec::new();
            for row in rows_json {
                let row = row
                    .as_array()
                    .ok_or_else(|| json_mismatch("a row array", row))?;
                match cols {
                    None => cols = Some(row.len()),
                    Some(width) if width != row.len() => {
                        return Err(CodecError::InvalidData(
                            "matrix rows have unequal lengths".to_string(),
                        ));
                    }
                    Some(_) => {}
                }
                for item in row {
                    items.push(from_json(item, elem)?);
                }
            }
            let mut buffer = tern_core::value::buffer_for(elem, items.len())
                .ok_or_else(|| CodecError::InvalidData("matrix element type".to_string()))?;
            for item in &items {
                buffer.push_value(item).map_err(CodecError::InvalidData)?;
            }
            Value::matrix(rows_json.len(), cols.unwrap_or(0), buffer)
                .map_err(CodecError::InvalidData)
        }
        TypeKind::Function { .. } | TypeKind::AsyncFunction { .. } => {
            Err(CodecError::FunctionNotSerializable)
        }
        TypeKind::Recursive(_) | TypeKind::RecursiveRef(_) => Err(CodecError::InvalidData(
            "recursive type is not finalized".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_core::{Field, equal};

    fn round_trip(value: &Value, ty: &Type) {
        let text = encode_json(value, ty).unwrap();
        let parsed = decode_json(&text, ty).unwrap_or_else(|e| panic!("decode '{}': {}", text, e));
        assert!(equal(value, &parsed), "round trip of '{}'", text);
    }

    #[test]
    fn test_scalars() {
        round_trip(&Value::null(), &Type::null());
        round_trip(&Value::integer(-3), &Type::integer());
        round_trip(&Value::float(0.25), &Type::float());
        round_trip(&Value::string("a\"b"), &Type::string());
        round_trip(&Value::datetime(1_700_000_000_123), &Type::datetime());
        round_trip(&Value::blob(vec![0xab, 0xcd]), &Type::blob());
    }

    #[test]
    fn test_nan_rejected() {
        assert!(matches!(
            encode_json(&Value::float(f64::NAN), &Type::float()),
            Err(CodecError::NonFiniteFloat(_))
        ));
    }

    #[test]
    fn test_string_keyed_dict_is_object() {
        let ty = Type::dict(Type::string(), Type::integer());
        let d = Value::dict(
            Type::string(),
            Type::integer(),
            vec![(Value::string("a"), Value::integer(1))],
        );
        assert_eq!(encode_json(&d, &ty).unwrap(), "{\"a\":1}");
        round_trip(&d, &ty);
    }

    #[test]
    fn test_non_string_dict_is_pair_array() {
        let ty = Type::dict(Type::integer(), Type::string());
        let d = Value::dict(
            Type::integer(),
            Type::string(),
            vec![(Value::integer(2), Value::string("two"))],
        );
        assert_eq!(encode_json(&d, &ty).unwrap(), "[[2,\"two\"]]");
        round_trip(&d, &ty);
    }

    #[test]
    fn test_variant_single_field_object() {
        let ty = Type::variant_of(vec![
            Field::new("none", Type::null()),
            Field::new("some", Type::integer()),
        ]);
        let none = Value::variant(ty.clone(), "none", Value::null()).unwrap();
        let some = Value::variant(ty.clone(), "some", Value::integer(4)).unwrap();
        assert_eq!(encode_json(&none, &ty).unwrap(), "{\"none\":null}");
        assert_eq!(encode_json(&some, &ty).unwrap(), "{\"some\":4}");
        round_trip(&none, &ty);
        round_trip(&some, &ty);
    }

    #[test]
    fn test_struct_and_nested() {
        let ty = Type::struct_of(vec![
            Field::new("flags", Type::array(Type::boolean())),
            Field::new("id", Type::integer()),
        ]);
        let v = Value::struct_of(
            ty.clone(),
            vec![
                Value::array(Type::boolean(), vec![Value::boolean(true)]),
                Value::integer(9),
            ],
        )
        .unwrap();
        round_trip(&v, &ty);
    }

    #[test]
    fn test_ref_encodes_target() {
        let ty = Type::ref_of(Type::integer());
        let r = Value::ref_of(Type::integer(), Value::integer(5));
        assert_eq!(encode_json(&r, &ty).unwrap(), "5");
        round_trip(&r, &ty);
    }

    #[test]
    fn test_matrix_rows() {
        let ty = Type::matrix(Type::integer());
        let m = Value::matrix(2, 2, tern_core::Buffer::Integer(vec![1, 2, 3, 4])).unwrap();
        assert_eq!(encode_json(&m, &ty).unwrap(), "[[1,2],[3,4]]");
        round_trip(&m, &ty);
    }
}

//! The binary codec
//!
//! Length-prefixed and type-directed: unsigned lengths are LEB128 varints,
//! signed integers are zigzag varints, floats are their IEEE-754 bits in
//! little-endian order. The output is bitwise identical across platforms.
//!
//! Per kind: null encodes to nothing; booleans to one byte; strings and
//! blobs to a length then raw bytes; containers to a count then elements;
//! structs to their fields in type order; variants to the case index then
//! the payload; refs to their target; matrices to rows, cols, then the
//! row-major elements.

use crate::codec::CodecError;
use tern_core::{Buffer, Type, TypeKind, Value, ValueKind};

/// Encode a value to bytes.
pub fn encode_binary(value: &Value, ty: &Type) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    write_value(value, ty, &mut out)?;
    Ok(out)
}

/// Decode bytes to a value, directed by the type. The input must be exactly
/// one encoded value.
pub fn decode_binary(bytes: &[u8], ty: &Type) -> Result<Value, CodecError> {
    let mut reader = Reader { bytes, pos: 0 };
    let value = read_value(&mut reader, ty)?;
    if reader.pos != bytes.len() {
        return Err(CodecError::InvalidData("trailing bytes".to_string()));
    }
    Ok(value)
}

fn write_varint(mut n: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (n & 0x7f) as u8;
        n >>= 7;
        if n == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn zigzag(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

fn unzigzag(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

fn write_signed(n: i64, out: &mut Vec<u8>) {
    write_varint(zigzag(n), out);
}

fn mismatch(expected: &str, value: &Value) -> CodecError {
    CodecError::TypeMismatch(format!("expected {}, got {:?}", expected, value.kind()))
}

fn write_value(value: &Value, ty: &Type, out: &mut Vec<u8>) -> Result<(), CodecError> {
    let ty = ty
        .unwrap_recursive()
        .ok_or_else(|| CodecError::InvalidData("recursive type is not finalized".to_string()))?;
    match ty.kind() {
        TypeKind::Never => Err(CodecError::InvalidData(
            "type never has no values".to_string(),
        )),
        TypeKind::Null => match value.kind() {
            ValueKind::Null => Ok(()),
            _ => Err(mismatch("null", value)),
        },
        TypeKind::Boolean => {
            let b = value
                .as_boolean()
                .ok_or_else(|| mismatch("a boolean", value))?;
            out.push(u8::from(b));
            Ok(())
        }
        TypeKind::Integer => {
            let n = value
                .as_integer()
                .ok_or_else(|| mismatch("an integer", value))?;
            write_signed(n, out);
            Ok(())
        }
        TypeKind::Float => {
            let x = value.as_float().ok_or_else(|| mismatch("a float", value))?;
            out.extend_from_slice(&x.to_bits().to_le_bytes());
            Ok(())
        }
        TypeKind::String => {
            let s = value
                .as_string()
                .ok_or_else(|| mismatch("a string", value))?;
            write_varint(s.len() as u64, out);
            out.extend_from_slice(s.as_bytes());
            Ok(())
        }
        TypeKind::DateTime => {
            let ms = value
                .as_datetime()
                .ok_or_else(|| mismatch("a datetime", value))?;
            write_signed(ms, out);
            Ok(())
        }
        TypeKind::Blob => {
            let b = value.as_blob().ok_or_else(|| mismatch("a blob", value))?;
            write_varint(b.len() as u64, out);
            out.extend_from_slice(b);
            Ok(())
        }
        TypeKind::Array(elem) => {
            let items = value
                .array_items()
                .ok_or_else(|| mismatch("an array", value))?;
            write_varint(items.len() as u64, out);
            for item in items {
                write_value(item, elem, out)?;
            }
            Ok(())
        }
        TypeKind::Set(elem) => {
            let items = value.set_items().ok_or_else(|| mismatch("a set", value))?;
            write_varint(items.len() as u64, out);
            for item in items {
                write_value(item, elem, out)?;
            }
            Ok(())
        }
        TypeKind::Dict { key, value: value_ty } => {
            let entries = value
                .dict_entries()
                .ok_or_else(|| mismatch("a dict", value))?;
            write_varint(entries.len() as u64, out);
            for (k, v) in entries {
                write_value(k, key, out)?;
                write_value(v, value_ty, out)?;
            }
            Ok(())
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
            for (field, v) in fields.iter().zip(values.iter()) {
                write_value(v, &field.ty, out)?;
            }
            Ok(())
        }
        TypeKind::Variant(cases) => {
            let (_, case, payload) = value
                .variant_parts()
                .ok_or_else(|| mismatch("a variant", value))?;
            let index = ty.member_index(case).ok_or_else(|| {
                CodecError::TypeMismatch(format!("variant type lacks case '{}'", case))
            })?;
            write_varint(index as u64, out);
            write_value(payload, &cases[index].ty, out)
        }
        TypeKind::Ref(elem) => {
            let target = value.ref_get().ok_or_else(|| mismatch("a ref", value))?;
            write_value(&target, elem, out)
        }
        TypeKind::Vector(elem) => {
            let data = value
                .buffer()
                .ok_or_else(|| mismatch("a vector", value))?;
            write_varint(data.len() as u64, out);
            write_buffer(data, elem, out)
        }
        TypeKind::Matrix(elem) => {
            let data = value
                .buffer()
                .ok_or_else(|| mismatch("a matrix", value))?;
            let (rows, cols) = value
                .matrix_dims()
                .ok_or_else(|| mismatch("a matrix", value))?;
            write_varint(rows as u64, out);
            write_varint(cols as u64, out);
            write_buffer(data, elem, out)
        }
        TypeKind::Function { .. } | TypeKind::AsyncFunction { .. } => {
            Err(CodecError::FunctionNotSerializable)
        }
        TypeKind::Recursive(_) | TypeKind::RecursiveRef(_) => Err(CodecError::InvalidData(
            "recursive type is not finalized".to_string(),
        )),
    }
}

fn write_buffer(data: &Buffer, elem: &Type, out: &mut Vec<u8>) -> Result<(), CodecError> {
    if !data.elem_type().equal(elem) {
        return Err(CodecError::TypeMismatch(
            "packed buffer does not match element type".to_string(),
        ));
    }
    match data {
        Buffer::Integer(items) => {
            for n in items {
                write_signed(*n, out);
            }
        }
        Buffer::Float(items) => {
            for x in items {
                out.extend_from_slice(&x.to_bits().to_le_bytes());
            }
        }
        Buffer::Boolean(items) => {
            for b in items {
                out.push(u8::from(*b));
            }
        }
    }
    Ok(())
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn byte(&mut self) -> Result<u8, CodecError> {
        let b = *self.bytes.get(self.pos).ok_or(CodecError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.pos + n > self.bytes.len() {
            return Err(CodecError::Truncated);
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn varint(&mut self) -> Result<u64, CodecError> {
        let mut n = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.byte()?;
            if shift >= 64 {
                return Err(CodecError::InvalidData("varint overflow".to_string()));
            }
            n |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(n);
            }
            shift += 7;
        }
    }

    fn signed(&mut self) -> Result<i64, CodecError> {
        Ok(unzigzag(self.varint()?))
    }

    fn length(&mut self) -> Result<usize, CodecError> {
        let n = self.varint()?;
        usize::try_from(n).map_err(|_| CodecError::InvalidData("length overflow".to_string()))
    }

    fn float(&mut self) -> Result<f64, CodecError> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(f64::from_bits(u64::from_le_bytes(buf)))
    }
}

fn read_value(reader: &mut Reader<'_>, ty: &Type) -> Result<Value, CodecError> {
    let ty = ty
        .unwrap_recursive()
        .ok_or_else(|| CodecError::InvalidData("recursive type is not finalized".to_string()))?;
    match ty.kind() {
        TypeKind::Never => Err(CodecError::InvalidData(
            "type never has no values".to_string(),
        )),
        TypeKind::Null => Ok(Value::null()),
        TypeKind::Boolean => match reader.byte()? {
            0 => Ok(Value::boolean(false)),
            1 => Ok(Value::boolean(true)),
            other => Err(CodecError::InvalidData(format!(
                "invalid boolean byte {}",
                other
            ))),
        },
        TypeKind::Integer => Ok(Value::integer(reader.signed()?)),
        TypeKind::Float => Ok(Value::float(reader.float()?)),
        TypeKind::String => {
            let len = reader.length()?;
            let bytes = reader.take(len)?;
            String::from_utf8(bytes.to_vec())
                .map(Value::string)
                .map_err(|_| CodecError::InvalidData("string is not valid UTF-8".to_string()))
        }
        TypeKind::DateTime => Ok(Value::datetime(reader.signed()?)),
        TypeKind::Blob => {
            let len = reader.length()?;
            Ok(Value::blob(reader.take(len)?.to_vec()))
        }
        TypeKind::Array(elem) => {
            let len = reader.length()?;
            let mut items = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                items.push(read_value(reader, elem)?);
            }
            Ok(Value::array(elem.clone(), items))
        }
        TypeKind::Set(elem) => {
            let len = reader.length()?;
            let mut items = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                items.push(read_value(reader, elem)?);
            }
            Ok(Value::set(elem.clone(), items))
        }
        TypeKind::Dict { key, value: value_ty } => {
            let len = reader.length()?;
            let mut entries = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                let k = read_value(reader, key)?;
                let v = read_value(reader, value_ty)?;
                entries.push((k, v));
            }
            Ok(Value::dict(key.clone(), value_ty.clone(), entries))
        }
        TypeKind::Struct(fields) => {
            let mut values = Vec::with_capacity(fields.len());
            for field in fields {
                values.push(read_value(reader, &field.ty)?);
            }
            Value::struct_of(ty.clone(), values).map_err(CodecError::InvalidData)
        }
        TypeKind::Variant(cases) => {
            let index = reader.length()?;
            let case = cases.get(index).ok_or_else(|| {
                CodecError::InvalidData(format!("variant case index {} out of range", index))
            })?;
            let payload = read_value(reader, &case.ty)?;
            Value::variant(ty.clone(), case.name.clone(), payload)
                .map_err(CodecError::InvalidData)
        }
        TypeKind::Ref(elem) => {
            let target = read_value(reader, elem)?;
            Ok(Value::ref_of(elem.clone(), target))
        }
        TypeKind::Vector(elem) => {
            let len = reader.length()?;
            let buffer = read_buffer(reader, elem, len)?;
            Ok(Value::vector(buffer))
        }
        TypeKind::Matrix(elem) => {
            let rows = reader.length()?;
            let cols = reader.length()?;
            let total = rows
                .checked_mul(cols)
                .ok_or_else(|| CodecError::InvalidData("matrix size overflow".to_string()))?;
            let buffer = read_buffer(reader, elem, total)?;
            Value::matrix(rows, cols, buffer).map_err(CodecError::InvalidData)
        }
        TypeKind::Function { .. } | TypeKind::AsyncFunction { .. } => {
            Err(CodecError::FunctionNotSerializable)
        }
        TypeKind::Recursive(_) | TypeKind::RecursiveRef(_) => Err(CodecError::InvalidData(
            "recursive type is not finalized".to_string(),
        )),
    }
}

fn read_buffer(reader: &mut Reader<'_>, elem: &Type, len: usize) -> Result<Buffer, CodecError> {
    match elem.kind() {
        TypeKind::Integer => {
            let mut items = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                items.push(reader.signed()?);
            }
            Ok(Buffer::Integer(items))
        }
        TypeKind::Float => {
            let mut items = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                items.push(reader.float()?);
            }
            Ok(Buffer::Float(items))
        }
        TypeKind::Boolean => {
            let mut items = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                items.push(match reader.byte()? {
                    0 => false,
                    1 => true,
                    other => {
                        return Err(CodecError::InvalidData(format!(
                            "invalid boolean byte {}",
                            other
                        )));
                    }
                });
            }
            Ok(Buffer::Boolean(items))
        }
        _ => Err(CodecError::InvalidData(
            "buffer element type is not packable".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_core::{Field, equal};

    fn round_trip(value: &Value, ty: &Type) {
        let bytes = encode_binary(value, ty).unwrap();
        let parsed = decode_binary(&bytes, ty)
            .unwrap_or_else(|e| panic!("decode {:?}: {}", bytes, e));
        assert!(equal(value, &parsed), "round trip of {:?}", bytes);
    }

    #[test]
    fn test_varint_boundaries() {
        for n in [0u64, 1, 127, 128, 300, u64::MAX] {
            let mut out = Vec::new();
            write_varint(n, &mut out);
            let mut reader = Reader { bytes: &out, pos: 0 };
            assert_eq!(reader.varint().unwrap(), n);
        }
    }

    #[test]
    fn test_zigzag() {
        assert_eq!(zigzag(0), 0);
        assert_eq!(zigzag(-1), 1);
        assert_eq!(zigzag(1), 2);
        for n in [0i64, -1, 1, i64::MIN, i64::MAX, 123_456, -123_456] {
            assert_eq!(unzigzag(zigzag(n)), n);
        }
    }

    #[test]
    fn test_scalar_round_trips() {
        round_trip(&Value::null(), &Type::null());
        round_trip(&Value::boolean(true), &Type::boolean());
        round_trip(&Value::integer(i64::MIN), &Type::integer());
        round_trip(&Value::float(f64::NAN), &Type::float());
        round_trip(&Value::float(-0.0), &Type::float());
        round_trip(&Value::string("héllo"), &Type::string());
        round_trip(&Value::datetime(-9_000_000), &Type::datetime());
        round_trip(&Value::blob(vec![0, 1, 255]), &Type::blob());
    }

    #[test]
    fn test_null_encodes_to_nothing() {
        assert!(encode_binary(&Value::null(), &Type::null())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_container_round_trips() {
        round_trip(
            &Value::array(Type::integer(), vec![Value::integer(-5), Value::integer(5)]),
            &Type::array(Type::integer()),
        );
        round_trip(
            &Value::set(Type::string(), vec![Value::string("b"), Value::string("a")]),
            &Type::set(Type::string()),
        );
        round_trip(
            &Value::dict(
                Type::integer(),
                Type::string(),
                vec![(Value::integer(1), Value::string("one"))],
            ),
            &Type::dict(Type::integer(), Type::string()),
        );
    }

    #[test]
    fn test_struct_variant_round_trips() {
        let sty = Type::struct_of(vec![
            Field::new("a", Type::integer()),
            Field::new("b", Type::boolean()),
        ]);
        round_trip(
            &Value::struct_of(sty.clone(), vec![Value::integer(1), Value::boolean(false)])
                .unwrap(),
            &sty,
        );
        let vty = Type::variant_of(vec![
            Field::new("none", Type::null()),
            Field::new("some", Type::integer()),
        ]);
        round_trip(
            &Value::variant(vty.clone(), "some", Value::integer(6)).unwrap(),
            &vty,
        );
    }

    #[test]
    fn test_vector_matrix_round_trips() {
        round_trip(
            &Value::vector(Buffer::Boolean(vec![true, false])),
            &Type::vector(Type::boolean()),
        );
        round_trip(
            &Value::matrix(2, 2, Buffer::Float(vec![1.0, 2.0, 3.0, 4.0])).unwrap(),
            &Type::matrix(Type::float()),
        );
    }

    #[test]
    fn test_truncated_input() {
        let ty = Type::array(Type::integer());
        let bytes = encode_binary(
            &Value::array(Type::integer(), vec![Value::integer(300)]),
            &ty,
        )
        .unwrap();
        assert!(matches!(
            decode_binary(&bytes[..bytes.len() - 1], &ty),
            Err(CodecError::Truncated)
        ));
    }

    #[test]
    fn test_deterministic_output() {
        let ty = Type::dict(Type::string(), Type::integer());
        let a = Value::dict(
            Type::string(),
            Type::integer(),
            vec![
                (Value::string("b"), Value::integer(2)),
                (Value::string("a"), Value::integer(1)),
            ],
        );
        let b = Value::dict(
            Type::string(),
            Type::integer(),
            vec![
                (Value::string("a"), Value::integer(1)),
                (Value::string("b"), Value::integer(2)),
            ],
        );
        assert_eq!(
            encode_binary(&a, &ty).unwrap(),
            encode_binary(&b, &ty).unwrap()
        );
    }
}

//! The CSV codec
//!
//! Defined for arrays of structs only. The header row is the struct type's
//! field names in type order; each data row holds the canonically printed
//! field values, quoted per RFC 4180 where needed. Round-tripping is well
//! defined only when every field type is a scalar.

use crate::codec::CodecError;
use crate::codec::text::parse_text;
use tern_core::{PrintConfig, Type, TypeKind, Value, print_value};

fn is_scalar(ty: &Type) -> bool {
    matches!(
        ty.kind(),
        TypeKind::Null
            | TypeKind::Boolean
            | TypeKind::Integer
            | TypeKind::Float
            | TypeKind::String
            | TypeKind::DateTime
            | TypeKind::Blob
    )
}

fn row_type(ty: &Type) -> Result<Type, CodecError> {
    let ty = ty
        .unwrap_recursive()
        .ok_or_else(|| CodecError::InvalidData("recursive type is not finalized".to_string()))?;
    let TypeKind::Array(elem) = ty.kind() else {
        return Err(CodecError::TypeMismatch(
            "CSV requires an array of structs".to_string(),
        ));
    };
    let elem = elem
        .unwrap_recursive()
        .ok_or_else(|| CodecError::InvalidData("recursive type is not finalized".to_string()))?;
    if !matches!(elem.kind(), TypeKind::Struct(_)) {
        return Err(CodecError::TypeMismatch(
            "CSV requires an array of structs".to_string(),
        ));
    }
    for field in elem.fields().unwrap_or(&[]) {
        if !is_scalar(&field.ty) {
            return Err(CodecError::TypeMismatch(format!(
                "CSV field '{}' is not a scalar",
                field.name
            )));
        }
    }
    Ok(elem)
}

fn quote_cell(cell: &str, out: &mut String) {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') || cell.contains('\r') {
        out.push('"');
        for c in cell.chars() {
            if c == '"' {
                out.push('"');
            }
            out.push(c);
        }
        out.push('"');
    } else {
        out.push_str(cell);
    }
}

/// Encode an array of structs as CSV text.
pub fn encode_csv(value: &Value, ty: &Type) -> Result<String, CodecError> {
    let row_ty = row_type(ty)?;
    let fields = row_ty.fields().unwrap_or(&[]);
    let rows = value
        .array_items()
        .ok_or_else(|| CodecError::TypeMismatch("CSV requires an array value".to_string()))?;
    let mut out = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        quote_cell(&field.name, &mut out);
    }
    out.push('\n');
    let config = PrintConfig::compact();
    for row in rows {
        let values = row
            .struct_fields()
            .ok_or_else(|| CodecError::TypeMismatch("CSV row is not a struct".to_string()))?;
        if values.len() != fields.len() {
            return Err(CodecError::TypeMismatch(
                "CSV row does not match the struct type".to_string(),
            ));
        }
        for (i, v) in values.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            quote_cell(&print_value(v, &config), &mut out);
        }
        out.push('\n');
    }
    Ok(out)
}

/// Decode CSV text to an array of structs, directed by the type.
pub fn decode_csv(text: &str, ty: &Type) -> Result<Value, CodecError> {
    let row_ty = row_type(ty)?;
    let fields = row_ty.fields().unwrap_or(&[]).to_vec();
    let mut records = split_records(text)?;
    if records.is_empty() {
        return Err(CodecError::InvalidData("CSV lacks a header row".to_string()));
    }
    let header = records.remove(0);
    if header.len() != fields.len() {
        return Err(CodecError::InvalidData(format!(
            "CSV header has {} columns, type has {} fields",
            header.len(),
            fields.len()
        )));
    }
    for (cell, field) in header.iter().zip(fields.iter()) {
        if cell != &field.name {
            return Err(CodecError::InvalidData(format!(
                "CSV header column '{}' does not match field '{}'",
                cell, field.name
            )));
        }
    }
    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        if record.len() != fields.len() {
            return Err(CodecError::InvalidData(format!(
                "CSV row has {} columns, expected {}",
                record.len(),
                fields.len()
            )));
        }
        let mut values = Vec::with_capacity(fields.len());
        for (cell, field) in record.iter().zip(fields.iter()) {
            values.push(parse_text(cell, &field.ty)?);
        }
        rows.push(Value::struct_of(row_ty.clone(), values).map_err(CodecError::InvalidData)?);
    }
    Ok(Value::array(row_ty, rows))
}

/// Split CSV text into records of unquoted cells, honoring quoted commas,
/// quotes, and newlines.
fn split_records(text: &str) -> Result<Vec<Vec<String>>, CodecError> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut chars = text.chars().peekable();
    let mut any = false;
    while let Some(c) = chars.next() {
        any = true;
        if quoted {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        cell.push('"');
                    } else {
                        quoted = false;
                    }
                }
                _ => cell.push(c),
            }
        } else {
            match c {
                '"' if cell.is_empty() => quoted = true,
                ',' => {
                    record.push(std::mem::take(&mut cell));
                }
                '\n' => {
                    record.push(std::mem::take(&mut cell));
                    records.push(std::mem::take(&mut record));
                }
                '\r' => {}
                _ => cell.push(c),
            }
        }
    }
    if quoted {
        return Err(CodecError::InvalidData("unterminated quoted cell".to_string()));
    }
    if any && (!cell.is_empty() || !record.is_empty()) {
        record.push(cell);
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_core::{Field, equal};

    fn people_type() -> Type {
        Type::array(Type::struct_of(vec![
            Field::new("age", Type::integer()),
            Field::new("name", Type::string()),
        ]))
    }

    fn people_value() -> Value {
        let row_ty = people_type().elem().unwrap();
        Value::array(
            row_ty.clone(),
            vec![
                Value::struct_of(
                    row_ty.clone(),
                    vec![Value::integer(34), Value::string("ada")],
                )
                .unwrap(),
                Value::struct_of(
                    row_ty,
                    vec![Value::integer(41), Value::string("grace, ret.")],
                )
                .unwrap(),
            ],
        )
    }

    #[test]
    fn test_header_and_quoting() {
        let csv = encode_csv(&people_value(), &people_type()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("age,name"));
        assert_eq!(lines.next(), Some("34,\"\"\"ada\"\"\""));
        // The printed string form itself contains quotes and a comma.
        assert_eq!(lines.next(), Some("41,\"\"\"grace, ret.\"\"\""));
    }

    #[test]
    fn test_round_trip() {
        let value = people_value();
        let ty = people_type();
        let csv = encode_csv(&value, &ty).unwrap();
        let parsed = decode_csv(&csv, &ty).unwrap();
        assert!(equal(&value, &parsed));
    }

    #[test]
    fn test_non_struct_rejected() {
        let ty = Type::array(Type::integer());
        assert!(matches!(
            encode_csv(&Value::array(Type::integer(), vec![]), &ty),
            Err(CodecError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_non_scalar_field_rejected() {
        let ty = Type::array(Type::struct_of(vec![Field::new(
            "xs",
            Type::array(Type::integer()),
        )]));
        assert!(matches!(
            encode_csv(&Value::array(ty.elem().unwrap(), vec![]), &ty),
            Err(CodecError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_header_mismatch_rejected() {
        assert!(decode_csv("name,age\n", &people_type()).is_err());
    }
}

//! The text codec
//!
//! The canonical printer in the core crate is the encoding side; this module
//! provides the type-directed parser. Parsing the printed form of any
//! non-function value with its original type reproduces the value exactly.

use crate::codec::CodecError;
use tern_core::print::datetime_from_parts;
use tern_core::{PrintConfig, Type, TypeKind, Value, print_value};

/// Encode a value to its canonical text form.
pub fn print_text(value: &Value) -> String {
    print_value(value, &PrintConfig::compact())
}

/// Parse the canonical text form, directed by the type.
pub fn parse_text(input: &str, ty: &Type) -> Result<Value, CodecError> {
    let mut parser = Parser {
        bytes: input.as_bytes(),
        pos: 0,
    };
    parser.skip_ws();
    let value = parser.parse(ty)?;
    parser.skip_ws();
    if parser.pos != parser.bytes.len() {
        return Err(parser.fail("trailing input"));
    }
    Ok(value)
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn fail(&self, message: impl Into<String>) -> CodecError {
        CodecError::Parse {
            position: self.pos,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, b: u8) -> Result<(), CodecError> {
        if self.peek() == Some(b) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.fail(format!("expected '{}'", b as char)))
        }
    }

    fn expect_keyword(&mut self, word: &str) -> Result<(), CodecError> {
        if self.bytes[self.pos..].starts_with(word.as_bytes()) {
            self.pos += word.len();
            Ok(())
        } else {
            Err(self.fail(format!("expected '{}'", word)))
        }
    }

    fn parse(&mut self, ty: &Type) -> Result<Value, CodecError> {
        let ty = ty
            .unwrap_recursive()
            .ok_or_else(|| self.fail("recursive type is not finalized"))?;
        match ty.kind() {
            TypeKind::Never => Err(self.fail("type never has no values")),
            TypeKind::Null => {
                self.expect_keyword("null")?;
                Ok(Value::null())
            }
            TypeKind::Boolean => {
                if self.bytes[self.pos..].starts_with(b"true") {
                    self.pos += 4;
                    Ok(Value::boolean(true))
                } else if self.bytes[self.pos..].starts_with(b"false") {
                    self.pos += 5;
                    Ok(Value::boolean(false))
                } else {
                    Err(self.fail("expected a boolean"))
                }
            }
            TypeKind::Integer => Ok(Value::integer(self.parse_integer()?)),
            TypeKind::Float => Ok(Value::float(self.parse_float()?)),
            TypeKind::String => Ok(Value::string(self.parse_string()?)),
            TypeKind::DateTime => Ok(Value::datetime(self.parse_datetime()?)),
            TypeKind::Blob => {
                self.expect_keyword("0x")?;
                let start = self.pos;
                while matches!(self.peek(), Some(b) if b.is_ascii_hexdigit()) {
                    self.pos += 1;
                }
                let hex_str = std::str::from_utf8(&self.bytes[start..self.pos])
                    .map_err(|_| self.fail("blob is not valid hex"))?;
                let bytes = hex::decode(hex_str).map_err(|e| self.fail(e.to_string()))?;
                Ok(Value::blob(bytes))
            }
            TypeKind::Array(elem) => {
                let items = self.parse_seq(b'[', b']', elem)?;
                Ok(Value::array(elem.clone(), items))
            }
            TypeKind::Set(elem) => {
                let items = self.parse_seq(b'{', b'}', elem)?;
                Ok(Value::set(elem.clone(), items))
            }
            TypeKind::Dict { key, value } => {
                self.expect(b'{')?;
                let mut entries = Vec::new();
                self.skip_ws();
                if self.peek() != Some(b'}') {
                    loop {
                        self.skip_ws();
                        let k = self.parse(key)?;
                        self.skip_ws();
                        self.expect(b':')?;
                        self.skip_ws();
                        let v = self.parse(value)?;
                        entries.push((k, v));
                        self.skip_ws();
                        if self.peek() == Some(b',') {
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                }
                self.skip_ws();
                self.expect(b'}')?;
                Ok(Value::dict(key.clone(), value.clone(), entries))
            }
            TypeKind::Struct(fields) => {
                self.expect(b'{')?;
                let mut values = Vec::with_capacity(fields.len());
                for (i, field) in fields.iter().enumerate() {
                    self.skip_ws();
                    if i > 0 {
                        self.expect(b',')?;
                        self.skip_ws();
                    }
                    let name = self.parse_identifier()?;
                    if name != field.name {
                        return Err(self.fail(format!(
                            "expected field '{}', found '{}'",
                            field.name, name
                        )));
                    }
                    self.skip_ws();
                    self.expect(b':')?;
                    self.skip_ws();
                    values.push(self.parse(&field.ty)?);
                }
                self.skip_ws();
                self.expect(b'}')?;
                Value::struct_of(ty.clone(), values).map_err(CodecError::InvalidData)
            }
            TypeKind::Variant(_) => {
                self.expect(b'.')?;
                let case = self.parse_identifier()?;
                let case_ty = ty
                    .member_type(&case)
                    .ok_or_else(|| self.fail(format!("unknown variant case '{}'", case)))?;
                let payload = if matches!(case_ty.kind(), TypeKind::Null) {
                    Value::null()
                } else {
                    self.skip_ws();
                    self.parse(&case_ty)?
                };
                Value::variant(ty.clone(), case, payload).map_err(CodecError::InvalidData)
            }
            TypeKind::Ref(elem) => {
                self.expect(b'&')?;
                let target = self.parse(elem)?;
                Ok(Value::ref_of(elem.clone(), target))
            }
            TypeKind::Vector(elem) => {
                let items = self.parse_seq(b'[', b']', elem)?;
                let mut buffer = tern_core::value::buffer_for(elem, items.len())
                    .ok_or_else(|| self.fail("vector element type is not packable"))?;
                for item in &items {
                    buffer.push_value(item).map_err(CodecError::InvalidData)?;
                }
                Ok(Value::vector(buffer))
            }
            TypeKind::Matrix(elem) => {
                self.expect(b'[')?;
                let mut rows = 0usize;
                let mut cols = None;
                let mut items: Vec<Value> = Vec::new();
                self.skip_ws();
                if self.peek() != Some(b']') {
                    loop {
                        self.skip_ws();
                        let row = self.parse_seq(b'[', b']', elem)?;
                        match cols {
                            None => cols = Some(row.len()),
                            Some(width) if width != row.len() => {
                                return Err(self.fail("matrix rows have unequal lengths"));
                            }
                            Some(_) => {}
                        }
                        rows += 1;
                        items.extend(row);
                        self.skip_ws();
                        if self.peek() == Some(b',') {
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                }
                self.skip_ws();
                self.expect(b']')?;
                let mut buffer = tern_core::value::buffer_for(elem, items.len())
                    .ok_or_else(|| self.fail("matrix element type is not packable"))?;
                for item in &items {
                    buffer.push_value(item).map_err(CodecError::InvalidData)?;
                }
                Value::matrix(rows, cols.unwrap_or(0), buffer).map_err(CodecError::InvalidData)
            }
            TypeKind::Function { .. } | TypeKind::AsyncFunction { .. } => {
                Err(CodecError::FunctionNotSerializable)
            }
            TypeKind::Recursive(_) | TypeKind::RecursiveRef(_) => {
                Err(self.fail("recursive type is not finalized"))
            }
        }
    }

    fn parse_seq(&mut self, open: u8, close: u8, elem: &Type) -> Result<Vec<Value>, CodecError> {
        self.expect(open)?;
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() != Some(close) {
            loop {
                self.skip_ws();
                items.push(self.parse(elem)?);
                self.skip_ws();
                if self.peek() == Some(b',') {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        self.skip_ws();
        self.expect(close)?;
        Ok(items)
    }

    fn parse_identifier(&mut self) -> Result<String, CodecError> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || b == b'_') {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.fail("expected an identifier"));
        }
        String::from_utf8(self.bytes[start..self.pos].to_vec())
            .map_err(|_| self.fail("identifier is not valid UTF-8"))
    }

    fn parse_integer(&mut self) -> Result<i64, CodecError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.fail("expected an integer"));
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.fail("integer out of range"))
    }

    fn parse_float(&mut self) -> Result<f64, CodecError> {
        if self.bytes[self.pos..].starts_with(b"NaN") {
            self.pos += 3;
            return Ok(f64::NAN);
        }
        if self.bytes[self.pos..].starts_with(b"Infinity") {
            self.pos += 8;
            return Ok(f64::INFINITY);
        }
        if self.bytes[self.pos..].starts_with(b"-Infinity") {
            self.pos += 9;
            return Ok(f64::NEG_INFINITY);
        }
        let start = self.pos;
        while matches!(
            self.peek(),
            Some(b) if b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E')
        ) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.fail("expected a float"));
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.fail("malformed float"))
    }

    fn parse_string(&mut self) -> Result<String, CodecError> {
        self.expect(b'"')?;
        let mut out = String::new();
        loop {
            let b = self.bump().ok_or(CodecError::Truncated)?;
            match b {
                b'"' => return Ok(out),
                b'\\' => {
                    let esc = self.bump().ok_or(CodecError::Truncated)?;
                    match esc {
                        b'"' => out.push('"'),
                        b'\\' => out.push('\\'),
                        b'n' => out.push('\n'),
                        b'r' => out.push('\r'),
                        b't' => out.push('\t'),
                        b'b' => out.push('\x08'),
                        b'f' => out.push('\x0C'),
                        b'u' => {
                            let unit = self.parse_hex4()?;
                            let c = if (0xD800..=0xDBFF).contains(&unit) {
                                // High surrogate: the low half must follow.
                                if self.bump() != Some(b'\\') || self.bump() != Some(b'u') {
                                    return Err(self.fail("unpaired surrogate"));
                                }
                                let low = self.parse_hex4()?;
                                if !(0xDC00..=0xDFFF).contains(&low) {
                                    return Err(self.fail("unpaired surrogate"));
                                }
                                let code =
                                    0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
                                char::from_u32(code)
                            } else {
                                char::from_u32(unit)
                            };
                            out.push(c.ok_or_else(|| self.fail("invalid escape"))?);
                        }
                        other => {
                            return Err(
                                self.fail(format!("unknown escape '\\{}'", other as char))
                            );
                        }
                    }
                }
                _ => {
                    // Re-read the full UTF-8 scalar starting here.
                    let rest = &self.bytes[self.pos - 1..];
                    let s = std::str::from_utf8(rest)
                        .map_err(|_| self.fail("string is not valid UTF-8"))?;
                    let c = s
                        .chars()
                        .next()
                        .ok_or(CodecError::Truncated)?;
                    out.push(c);
                    self.pos += c.len_utf8() - 1;
                }
            }
        }
    }

    fn parse_hex4(&mut self) -> Result<u32, CodecError> {
        let mut unit = 0u32;
        for _ in 0..4 {
            let b = self.bump().ok_or(CodecError::Truncated)?;
            let digit = (b as char)
                .to_digit(16)
                .ok_or_else(|| self.fail("expected a hex digit"))?;
            unit = unit * 16 + digit;
        }
        Ok(unit)
    }

    fn parse_datetime(&mut self) -> Result<i64, CodecError> {
        let negative_year = self.peek() == Some(b'-');
        if negative_year {
            self.pos += 1;
        }
        let year_digits = self.parse_unsigned()?;
        let year = if negative_year {
            -(year_digits as i64)
        } else {
            year_digits as i64
        };
        self.expect(b'-')?;
        let month = self.parse_unsigned()? as u32;
        self.expect(b'-')?;
        let day = self.parse_unsigned()? as u32;
        self.expect(b'T')?;
        let hour = self.parse_unsigned()? as u32;
        self.expect(b':')?;
        let minute = self.parse_unsigned()? as u32;
        self.expect(b':')?;
        let second = self.parse_unsigned()? as u32;
        self.expect(b'.')?;
        let millis = self.parse_unsigned()? as u32;
        self.expect(b'Z')?;
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return Err(self.fail("datetime out of range"));
        }
        if hour > 23 || minute > 59 || second > 59 || millis > 999 {
            return Err(self.fail("datetime out of range"));
        }
        Ok(datetime_from_parts(
            year, month, day, hour, minute, second, millis,
        ))
    }

    fn parse_unsigned(&mut self) -> Result<u64, CodecError> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.fail("expected digits"));
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.fail("number out of range"))
    }
}

//! Canonical text printing
//!
//! Produces the canonical text form of a value. For every kind except
//! functions the output round-trips through the text codec when parsed with
//! the original type.
//!
//! # Format
//!
//! - Null: `null`
//! - Boolean: `true` / `false`
//! - Integer: decimal
//! - Float: shortest round-trip decimal in the `Number.toString` convention
//!   (except that the sign of negative zero is preserved)
//! - String: `"..."` with standard escapes and `\uXXXX` for other controls
//! - DateTime: ISO-8601 UTC with millisecond precision
//! - Blob: `0x` followed by lowercase hex
//! - Array / vector: `[a, b]`; matrix: `[[a, b], [c, d]]`
//! - Set: `{a, b}`; dict: `{k: v}`; struct: `{name: v}`
//! - Variant: `.case` or `.case payload`
//! - Ref: `&target`
//! - Function: `<function>` (print-only)

use crate::value::{Buffer, Value, ValueKind};
use std::fmt::Write;

/// Output configuration. The compact form is the canonical one; pretty
/// printing is for diagnostics.
#[derive(Clone)]
pub struct PrintConfig {
    pub pretty: bool,
    pub indent: usize,
}

impl Default for PrintConfig {
    fn default() -> Self {
        Self {
            pretty: false,
            indent: 2,
        }
    }
}

impl PrintConfig {
    pub fn compact() -> Self {
        Self::default()
    }

    pub fn pretty() -> Self {
        Self {
            pretty: true,
            indent: 2,
        }
    }
}

/// Print a value to its canonical text form.
pub fn print_value(value: &Value, config: &PrintConfig) -> String {
    let mut buf = String::new();
    format_value(value, config, 0, &mut buf);
    buf
}

fn format_value(value: &Value, config: &PrintConfig, depth: usize, buf: &mut String) {
    match value.kind() {
        ValueKind::Null => buf.push_str("null"),
        ValueKind::Boolean(b) => buf.push_str(if *b { "true" } else { "false" }),
        ValueKind::Integer(n) => {
            let _ = write!(buf, "{}", n);
        }
        ValueKind::Float(x) => buf.push_str(&format_float(*x)),
        ValueKind::String(s) => format_string(s, buf),
        ValueKind::DateTime(ms) => buf.push_str(&format_datetime(*ms)),
        ValueKind::Blob(bytes) => {
            buf.push_str("0x");
            buf.push_str(&hex::encode(bytes));
        }
        ValueKind::Array { items, .. } => format_seq(items, "[", "]", config, depth, buf),
        ValueKind::Set { items, .. } => format_seq(items, "{", "}", config, depth, buf),
        ValueKind::Dict { entries, .. } => {
            format_pairs(entries.iter().map(|(k, v)| (k, v)), config, depth, buf, |k, buf| {
                format_value(k, config, depth + 1, buf)
            });
        }
        ValueKind::Struct { ty, fields } => {
            let names = ty.fields().unwrap_or(&[]);
            format_pairs(
                names.iter().map(|f| &f.name).zip(fields.iter()),
                config,
                depth,
                buf,
                |name, buf| buf.push_str(name),
            );
        }
        ValueKind::Variant { case, payload, .. } => {
            buf.push('.');
            buf.push_str(case);
            if !payload.is_null() {
                buf.push(' ');
                format_value(payload, config, depth, buf);
            }
        }
        ValueKind::Ref { target, .. } => {
            buf.push('&');
            format_value(&target.borrow(), config, depth, buf);
        }
        ValueKind::Vector { data } => format_buffer(data, buf),
        ValueKind::Matrix { rows, cols, data } => {
            buf.push('[');
            for r in 0..*rows {
                if r > 0 {
                    buf.push_str(", ");
                }
                buf.push('[');
                for c in 0..*cols {
                    if c > 0 {
                        buf.push_str(", ");
                    }
                    if let Some(v) = data.get(r * cols + c) {
                        format_value(&v, config, depth, buf);
                    }
                }
                buf.push(']');
            }
            buf.push(']');
        }
        ValueKind::Function(_) => buf.push_str("<function>"),
    }
}

fn format_seq(items: &[Value], open: &str, close: &str, config: &PrintConfig, depth: usize, buf: &mut String) {
    buf.push_str(open);
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            buf.push(',');
            if !config.pretty {
                buf.push(' ');
            }
        }
        if config.pretty {
            newline_indent(config, depth + 1, buf);
        }
        format_value(item, config, depth + 1, buf);
    }
    if config.pretty && !items.is_empty() {
        newline_indent(config, depth, buf);
    }
    buf.push_str(close);
}

fn format_pairs<'a, K: 'a>(
    pairs: impl Iterator<Item = (K, &'a Value)>,
    config: &PrintConfig,
    depth: usize,
    buf: &mut String,
    mut key: impl FnMut(K, &mut String),
) {
    buf.push('{');
    let mut any = false;
    for (i, (k, v)) in pairs.enumerate() {
        any = true;
        if i > 0 {
            buf.push(',');
            if !config.pretty {
                buf.push(' ');
            }
        }
        if config.pretty {
            newline_indent(config, depth + 1, buf);
        }
        key(k, buf);
        buf.push_str(": ");
        format_value(v, config, depth + 1, buf);
    }
    if config.pretty && any {
        newline_indent(config, depth, buf);
    }
    buf.push('}');
}

fn format_buffer(data: &Buffer, buf: &mut String) {
    buf.push('[');
    for i in 0..data.len() {
        if i > 0 {
            buf.push_str(", ");
        }
        match data {
            Buffer::Integer(v) => {
                let _ = write!(buf, "{}", v[i]);
            }
            Buffer::Float(v) => buf.push_str(&format_float(v[i])),
            Buffer::Boolean(v) => buf.push_str(if v[i] { "true" } else { "false" }),
        }
    }
    buf.push(']');
}

fn newline_indent(config: &PrintConfig, depth: usize, buf: &mut String) {
    buf.push('\n');
    for _ in 0..depth * config.indent {
        buf.push(' ');
    }
}

/// Escape a string into its quoted text form.
pub fn format_string(s: &str, buf: &mut String) {
    buf.push('"');
    for c in s.chars() {
        match c {
            '"' => buf.push_str("\\\""),
            '\\' => buf.push_str("\\\\"),
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            '\t' => buf.push_str("\\t"),
            '\x08' => buf.push_str("\\b"),
            '\x0C' => buf.push_str("\\f"),
            c if c.is_control() => {
                let _ = write!(buf, "\\u{:04x}", c as u32);
            }
            c => buf.push(c),
        }
    }
    buf.push('"');
}

/// Shortest round-trip float text in the `Number.toString` convention.
///
/// One pinned deviation: negative zero prints as `-0` so the sign bit
/// survives the text round-trip.
pub fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "NaN".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if x == 0.0 {
        return if x.is_sign_negative() { "-0" } else { "0" }.to_string();
    }
    let negative = x < 0.0;
    let magnitude = x.abs();

    // `{:e}` gives the shortest round-trip digits as d[.ddd]e<exp>.
    let sci = format!("{:e}", magnitude);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };
    let digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
    let digits = digits.trim_end_matches('0');
    let digits = if digits.is_empty() { "0" } else { digits };
    let k = digits.len() as i32;
    // Decimal point position: value = 0.digits * 10^n.
    let n = exp + 1;

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    if (k..=21).contains(&n) {
        // Integer with trailing zeros.
        out.push_str(digits);
        for _ in 0..(n - k) {
            out.push('0');
        }
    } else if (1..=21).contains(&n) {
        // Point inside the digits.
        out.push_str(&digits[..n as usize]);
        out.push('.');
        out.push_str(&digits[n as usize..]);
    } else if (-5..=0).contains(&n) {
        // Leading zeros after "0.".
        out.push_str("0.");
        for _ in 0..-n {
            out.push('0');
        }
        out.push_str(digits);
    } else {
        // Exponent form.
        out.push_str(&digits[..1]);
        if k > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        out.push('e');
        let e = n - 1;
        if e >= 0 {
            out.push('+');
        }
        let _ = write!(out, "{}", e);
    }
    out
}

/// ISO-8601 UTC text for an epoch-milliseconds instant.
pub fn format_datetime(epoch_millis: i64) -> String {
    let days = epoch_millis.div_euclid(86_400_000);
    let ms_of_day = epoch_millis.rem_euclid(86_400_000);
    let (year, month, day) = civil_from_days(days);
    let hour = ms_of_day / 3_600_000;
    let minute = (ms_of_day / 60_000) % 60;
    let second = (ms_of_day / 1_000) % 60;
    let millis = ms_of_day % 1_000;
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        year, month, day, hour, minute, second, millis
    )
}

/// Epoch-milliseconds for a civil date and time of day.
pub fn datetime_from_parts(
    year: i64,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
    millis: u32,
) -> i64 {
    let days = days_from_civil(year, month, day);
    days * 86_400_000
        + i64::from(hour) * 3_600_000
        + i64::from(minute) * 60_000
        + i64::from(second) * 1_000
        + i64::from(millis)
}

// Civil-date conversion after Howard Hinnant's algorithms; days are counted
// from 1970-01-01 in the proleptic Gregorian calendar.

fn days_from_civil(y: i64, m: u32, d: u32) -> i64 {
    let y = y - i64::from(m <= 2);
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = i64::from(if m > 2 { m - 3 } else { m + 9 });
    let doy = (153 * mp + 2) / 5 + i64::from(d) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (y + i64::from(m <= 2), m, d)
}

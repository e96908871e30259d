//! Evaluation errors and source locations
//!
//! A runtime error carries a message and a location stack. The stack grows
//! as the error unwinds: each call boundary appends its own call-site
//! locations beneath the ones already recorded, so the innermost frame comes
//! first.

use std::fmt;
use tern_core::{Field, Type, Value};

/// A source position recorded on IR nodes and propagated with errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub filename: String,
    pub line: i64,
    pub column: i64,
}

impl Location {
    pub fn new(filename: impl Into<String>, line: i64, column: i64) -> Self {
        Self {
            filename: filename.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.filename, self.line, self.column)
    }
}

/// A propagating evaluation error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeError {
    pub message: String,
    pub locations: Vec<Location>,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
        }
    }

    pub fn at(message: impl Into<String>, locations: Vec<Location>) -> Self {
        Self {
            message: message.into(),
            locations,
        }
    }

    /// Append call-site locations beneath the existing stack.
    pub fn push_locations(mut self, locations: &[Location]) -> Self {
        self.locations.extend_from_slice(locations);
        self
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        for loc in &self.locations {
            write!(f, "\n  at {}", loc)?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

/// The struct type of one reflected location: `{column, filename, line}`.
pub fn location_struct_type() -> Type {
    Type::struct_of(vec![
        Field::new("column", Type::integer()),
        Field::new("filename", Type::string()),
        Field::new("line", Type::integer()),
    ])
}

/// A location stack as an array of location structs, in propagation order.
pub fn locations_to_value(locations: &[Location]) -> Value {
    let ty = location_struct_type();
    let entries = locations
        .iter()
        .map(|loc| {
            Value::struct_of(
                ty.clone(),
                vec![
                    Value::integer(loc.column),
                    Value::string(loc.filename.clone()),
                    Value::integer(loc.line),
                ],
            )
            .unwrap_or_else(|_| unreachable!("location struct arity"))
        })
        .collect();
    Value::array(ty, entries)
}

/// Rebuild a location stack from its array-of-structs value form.
pub fn locations_from_value(value: &Value) -> Result<Vec<Location>, String> {
    let items = value
        .array_items()
        .ok_or_else(|| "location stack must be an array".to_string())?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let column = item
            .field("column")
            .and_then(|v| v.as_integer())
            .ok_or_else(|| "location lacks a column".to_string())?;
        let filename = item
            .field("filename")
            .and_then(|v| v.as_string().map(str::to_string))
            .ok_or_else(|| "location lacks a filename".to_string())?;
        let line = item
            .field("line")
            .and_then(|v| v.as_integer())
            .ok_or_else(|| "location lacks a line".to_string())?;
        out.push(Location { filename, line, column });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_stack_grows_downward() {
        let err = RuntimeError::at("boom", vec![Location::new("inner.tn", 3, 1)])
            .push_locations(&[Location::new("outer.tn", 9, 5)]);
        assert_eq!(err.locations[0].filename, "inner.tn");
        assert_eq!(err.locations[1].filename, "outer.tn");
        assert_eq!(err.to_string(), "boom\n  at inner.tn:3:1\n  at outer.tn:9:5");
    }
}

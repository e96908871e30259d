//! Serialization codecs
//!
//! Every codec is type-directed: encoding and decoding take the static type
//! of the value, and `decode(encode(v, t), t)` is the identity for every
//! admissible value. Function values are code, not data, and no codec
//! accepts them.
//!
//! - `text`: the canonical printed form and its parser
//! - `json`: JSON with the pinned dict/blob/variant conventions
//! - `binary`: length-prefixed varint/zigzag, platform-identical output
//! - `csv`: arrays of structs with scalar fields

pub mod binary;
pub mod csv;
pub mod json;
pub mod text;

use std::fmt;

/// Failure while encoding or decoding.
#[derive(Debug)]
pub enum CodecError {
    /// Function values cannot be serialized.
    FunctionNotSerializable,
    /// JSON cannot carry NaN or infinities.
    NonFiniteFloat(f64),
    /// The value does not match the type directing the codec.
    TypeMismatch(String),
    /// Malformed input at a byte position.
    Parse { position: usize, message: String },
    /// Structurally invalid input.
    InvalidData(String),
    /// Input ended before the value was complete.
    Truncated,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::FunctionNotSerializable => {
                write!(f, "functions are code and cannot be serialized")
            }
            CodecError::NonFiniteFloat(x) => {
                write!(f, "cannot serialize non-finite float: {}", x)
            }
            CodecError::TypeMismatch(message) => write!(f, "type mismatch: {}", message),
            CodecError::Parse { position, message } => {
                write!(f, "parse error at byte {}: {}", position, message)
            }
            CodecError::InvalidData(message) => write!(f, "invalid data: {}", message),
            CodecError::Truncated => write!(f, "input truncated"),
        }
    }
}

impl std::error::Error for CodecError {}

//! Tern Core: the value and type universe of the Tern runtime
//!
//! This crate provides the language-agnostic foundation the evaluator is
//! built on:
//!
//! - `types`: static type descriptors (shared primitives, parameterized
//!   constructors, recursive wrappers)
//! - `value`: the tagged value universe behind cheap-clone handles
//! - `compare`: structural equality and the deterministic total ordering
//! - `print`: canonical text printing (the text codec's output side)
//! - `env`: lexical environments shared by closures
//! - `cycle`: trial-deletion cycle collection over values and environments

pub mod compare;
pub mod cycle;
pub mod env;
pub mod print;
pub mod types;
pub mod value;

pub use compare::{compare, equal, float_compare, float_equal};
pub use cycle::{CollectStats, collect, enter_call, leave_call, tracked_value_count};
pub use env::Env;
pub use print::{PrintConfig, format_datetime, format_float, print_value};
pub use types::{Field, Type, TypeKind};
pub use value::{Buffer, Value, ValueKind};

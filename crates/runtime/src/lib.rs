//! Tern Runtime: the portable runtime for the Tern expression language
//!
//! Consumes a serialized, fully-typed IR together with its static type
//! tree, executes it by tree-walking interpretation, and returns structural
//! values that may be serialized back.
//!
//! # Modules
//!
//! - `error`: runtime errors with source-location stacks
//! - `ir`: the homoiconic IR term tree
//! - `eval`: the tree-walking evaluator and its outcome sum
//! - `builtins`: the name → factory → implementation operation registry
//! - `platform`: the host-provided effectful function registry
//! - `reflect`: type ↔ value reflection and the self-describing value shape
//! - `ir_reflect`: IR ↔ value reflection
//! - `patch`: type-directed diff / apply / compose / invert
//! - `codec`: text, JSON, binary, and CSV codecs
//!
//! # Host workflow
//!
//! Decode a program with a codec, rebuild its types and IR through the
//! reflection shapes, register built-ins and platform functions, build a
//! root environment, and invoke the evaluator:
//!
//! ```rust,ignore
//! use tern_runtime::{Evaluator, codec, ir_reflect, reflect};
//! use tern_core::Env;
//!
//! let program_value = codec::json::decode_json(&bytes, &ir_reflect::ir_type())?;
//! let program = ir_reflect::ir_of_value(&program_value)?;
//! let evaluator = Evaluator::new();
//! let env = Env::root();
//! let outcome = evaluator.run(&program, &env);
//! ```

pub mod builtins;
pub mod codec;
pub mod error;
pub mod eval;
pub mod ir;
pub mod ir_reflect;
pub mod patch;
pub mod platform;
pub mod reflect;

pub use builtins::{BuiltinFactory, BuiltinImpl, BuiltinRegistry};
pub use error::{Location, RuntimeError};
pub use eval::{ClosureBody, Eval, Evaluator};
pub use ir::{FnLiteral, Ir, IrKind, MatchCase};
pub use ir_reflect::{ir_of_value, ir_type, value_of_ir};
pub use patch::{apply, compose, diff, invert, patch_type};
pub use platform::{PlatformFn, PlatformRegistry};
pub use reflect::{type_of_value, type_type, value_of_type, value_of_value, value_from_value, value_type};

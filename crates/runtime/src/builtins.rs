//! Built-in operation registry
//!
//! Built-ins are looked up by name and resolved in two steps: the registered
//! **factory** receives the type parameters of the invocation and returns
//! the concrete **implementation**. The implementation captures its type
//! context by move, so specializing operations (the patch engine, the typed
//! codecs) carry their types without any out-of-band channel. The evaluator
//! still calls factory and implementation back to back, with no IR
//! evaluation in between.
//!
//! Implementations report failure with `Err(message)`; the evaluator turns
//! that into a propagating error carrying the invoking node's locations.

use crate::codec;
use crate::patch;
use std::collections::HashMap;
use std::rc::Rc;
use tern_core::{PrintConfig, Type, Value, compare, equal, print_value};

/// A concrete built-in implementation: positional arguments in, value out.
pub type BuiltinImpl = Rc<dyn Fn(&[Value]) -> Result<Value, String>>;

/// A named factory: type parameters in, implementation out.
pub type BuiltinFactory = Rc<dyn Fn(&[Type]) -> Result<BuiltinImpl, String>>;

/// Name → factory table.
#[derive(Clone, Default)]
pub struct BuiltinRegistry {
    factories: HashMap<String, BuiltinFactory>,
}

fn expect_args(args: &[Value], count: usize, name: &str) -> Result<(), String> {
    if args.len() == count {
        Ok(())
    } else {
        Err(format!(
            "{}: expected {} arguments, got {}",
            name,
            count,
            args.len()
        ))
    }
}

fn expect_types(types: &[Type], count: usize, name: &str) -> Result<Type, String> {
    if types.len() == count {
        Ok(types[0].clone())
    } else {
        Err(format!(
            "{}: expected {} type parameters, got {}",
            name,
            count,
            types.len()
        ))
    }
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-loaded with the comparison operators, the patch
    /// family, and the codec entry points.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_comparisons();
        registry.register_patch_ops();
        registry.register_codec_ops();
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: BuiltinFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Register an operation that does not specialize on type parameters.
    pub fn register_simple(
        &mut self,
        name: impl Into<String>,
        op: impl Fn(&[Value]) -> Result<Value, String> + 'static,
    ) {
        let op: BuiltinImpl = Rc::new(op);
        self.register(
            name,
            Rc::new(move |_types: &[Type]| Ok(op.clone())),
        );
    }

    pub fn lookup(&self, name: &str) -> Option<BuiltinFactory> {
        self.factories.get(name).cloned()
    }

    fn register_comparisons(&mut self) {
        self.register_simple("equal", |args| {
            expect_args(args, 2, "equal")?;
            Ok(Value::boolean(equal(&args[0], &args[1])))
        });
        self.register_simple("not_equal", |args| {
            expect_args(args, 2, "not_equal")?;
            Ok(Value::boolean(!equal(&args[0], &args[1])))
        });
        self.register_simple("compare", |args| {
            expect_args(args, 2, "compare")?;
            Ok(Value::integer(match compare(&args[0], &args[1]) {
                std::cmp::Ordering::Less => -1,
                std::cmp::Ordering::Equal => 0,
                std::cmp::Ordering::Greater => 1,
            }))
        });
        self.register_simple("less", |args| {
            expect_args(args, 2, "less")?;
            Ok(Value::boolean(compare(&args[0], &args[1]).is_lt()))
        });
        self.register_simple("less_equal", |args| {
            expect_args(args, 2, "less_equal")?;
            Ok(Value::boolean(compare(&args[0], &args[1]).is_le()))
        });
        self.register_simple("greater", |args| {
            expect_args(args, 2, "greater")?;
            Ok(Value::boolean(compare(&args[0], &args[1]).is_gt()))
        });
        self.register_simple("greater_equal", |args| {
            expect_args(args, 2, "greater_equal")?;
            Ok(Value::boolean(compare(&args[0], &args[1]).is_ge()))
        });
    }

    fn register_patch_ops(&mut self) {
        self.register(
            "diff",
            Rc::new(|types: &[Type]| {
                let ty = expect_types(types, 1, "diff")?;
                Ok(Rc::new(move |args: &[Value]| {
                    expect_args(args, 2, "diff")?;
                    patch::diff(&args[0], &args[1], &ty)
                }) as BuiltinImpl)
            }),
        );
        self.register(
            "apply",
            Rc::new(|types: &[Type]| {
                let ty = expect_types(types, 1, "apply")?;
                Ok(Rc::new(move |args: &[Value]| {
                    expect_args(args, 2, "apply")?;
                    patch::apply(&args[0], &args[1], &ty)
                }) as BuiltinImpl)
            }),
        );
        self.register(
            "compose",
            Rc::new(|types: &[Type]| {
                let ty = expect_types(types, 1, "compose")?;
                Ok(Rc::new(move |args: &[Value]| {
                    expect_args(args, 2, "compose")?;
                    patch::compose(&args[0], &args[1], &ty)
                }) as BuiltinImpl)
            }),
        );
        self.register(
            "invert",
            Rc::new(|types: &[Type]| {
                let ty = expect_types(types, 1, "invert")?;
                Ok(Rc::new(move |args: &[Value]| {
                    expect_args(args, 1, "invert")?;
                    patch::invert(&args[0], &ty)
                }) as BuiltinImpl)
            }),
        );
    }

    fn register_codec_ops(&mut self) {
        self.register_simple("print", |args| {
            expect_args(args, 1, "print")?;
            Ok(Value::string(print_value(&args[0], &PrintConfig::compact())))
        });
        self.register(
            "parse",
            Rc::new(|types: &[Type]| {
                let ty = expect_types(types, 1, "parse")?;
                Ok(Rc::new(move |args: &[Value]| {
                    expect_args(args, 1, "parse")?;
                    let text = args[0]
                        .as_string()
                        .ok_or_else(|| "parse: argument must be a string".to_string())?;
                    codec::text::parse_text(text, &ty).map_err(|e| e.to_string())
                }) as BuiltinImpl)
            }),
        );
        self.register(
            "to_json",
            Rc::new(|types: &[Type]| {
                let ty = expect_types(types, 1, "to_json")?;
                Ok(Rc::new(move |args: &[Value]| {
                    expect_args(args, 1, "to_json")?;
                    codec::json::encode_json(&args[0], &ty)
                        .map(Value::string)
                        .map_err(|e| e.to_string())
                }) as BuiltinImpl)
            }),
        );
        self.register(
            "from_json",
            Rc::new(|types: &[Type]| {
                let ty = expect_types(types, 1, "from_json")?;
                Ok(Rc::new(move |args: &[Value]| {
                    expect_args(args, 1, "from_json")?;
                    let text = args[0]
                        .as_string()
                        .ok_or_else(|| "from_json: argument must be a string".to_string())?;
                    codec::json::decode_json(text, &ty).map_err(|e| e.to_string())
                }) as BuiltinImpl)
            }),
        );
        self.register(
            "to_binary",
            Rc::new(|types: &[Type]| {
                let ty = expect_types(types, 1, "to_binary")?;
                Ok(Rc::new(move |args: &[Value]| {
                    expect_args(args, 1, "to_binary")?;
                    codec::binary::encode_binary(&args[0], &ty)
                        .map(Value::blob)
                        .map_err(|e| e.to_string())
                }) as BuiltinImpl)
            }),
        );
        self.register(
            "from_binary",
            Rc::new(|types: &[Type]| {
                let ty = expect_types(types, 1, "from_binary")?;
                Ok(Rc::new(move |args: &[Value]| {
                    expect_args(args, 1, "from_binary")?;
                    let bytes = args[0]
                        .as_blob()
                        .ok_or_else(|| "from_binary: argument must be a blob".to_string())?;
                    codec::binary::decode_binary(bytes, &ty).map_err(|e| e.to_string())
                }) as BuiltinImpl)
            }),
        );
        self.register(
            "to_csv",
            Rc::new(|types: &[Type]| {
                let ty = expect_types(types, 1, "to_csv")?;
                Ok(Rc::new(move |args: &[Value]| {
                    expect_args(args, 1, "to_csv")?;
                    codec::csv::encode_csv(&args[0], &ty)
                        .map(Value::string)
                        .map_err(|e| e.to_string())
                }) as BuiltinImpl)
            }),
        );
        self.register(
            "from_csv",
            Rc::new(|types: &[Type]| {
                let ty = expect_types(types, 1, "from_csv")?;
                Ok(Rc::new(move |args: &[Value]| {
                    expect_args(args, 1, "from_csv")?;
                    let text = args[0]
                        .as_string()
                        .ok_or_else(|| "from_csv: argument must be a string".to_string())?;
                    codec::csv::decode_csv(text, &ty).map_err(|e| e.to_string())
                }) as BuiltinImpl)
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_unknown() {
        let registry = BuiltinRegistry::new();
        assert!(registry.lookup("equal").is_none());
        assert!(BuiltinRegistry::with_defaults().lookup("equal").is_some());
    }

    #[test]
    fn test_comparison_defers_to_core_order() {
        let registry = BuiltinRegistry::with_defaults();
        let factory = registry.lookup("less").unwrap();
        let op = factory(&[]).unwrap();
        let out = op(&[Value::integer(-1), Value::integer(0)]).unwrap();
        assert_eq!(out.as_boolean(), Some(true));
    }

    #[test]
    fn test_factory_captures_type_context() {
        let registry = BuiltinRegistry::with_defaults();
        let factory = registry.lookup("parse").unwrap();
        let parse_int = factory(&[Type::integer()]).unwrap();
        let out = parse_int(&[Value::string("42")]).unwrap();
        assert_eq!(out.as_integer(), Some(42));
    }

    #[test]
    fn test_arity_errors() {
        let registry = BuiltinRegistry::with_defaults();
        let factory = registry.lookup("equal").unwrap();
        let op = factory(&[]).unwrap();
        assert!(op(&[Value::integer(1)]).is_err());
        assert!(registry.lookup("diff").unwrap()(&[]).is_err());
    }
}

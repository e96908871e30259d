//! The Tern value universe
//!
//! Values are tagged records behind cheap-clone handles. Scalars are frozen
//! at construction; the only mutable edges in the graph are `ref` targets and
//! the environment captured by a function. That restriction is what lets the
//! cycle collector break garbage cycles by severing just those two edges.
//!
//! Cycle-capable kinds (array, set, dict, struct, variant, ref, function)
//! register with the thread-local collector at construction.
//!
//! Set items and dict keys are kept strictly ascending under the total value
//! ordering; struct fields are stored in the order given by the struct type.

use crate::compare;
use crate::env::Env;
use crate::types::{Type, TypeKind};
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Handle to a value. Clone is O(1) and shares the record.
#[derive(Clone, Debug)]
pub struct Value(Rc<ValueKind>);

/// Packed storage for vector and matrix values.
#[derive(Clone, Debug, PartialEq)]
pub enum Buffer {
    Integer(Vec<i64>),
    Float(Vec<f64>),
    Boolean(Vec<bool>),
}

impl Buffer {
    pub fn len(&self) -> usize {
        match self {
            Buffer::Integer(v) => v.len(),
            Buffer::Float(v) => v.len(),
            Buffer::Boolean(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The element type this buffer packs.
    pub fn elem_type(&self) -> Type {
        match self {
            Buffer::Integer(_) => Type::integer(),
            Buffer::Float(_) => Type::float(),
            Buffer::Boolean(_) => Type::boolean(),
        }
    }

    /// The element at `i` boxed back into a value.
    pub fn get(&self, i: usize) -> Option<Value> {
        match self {
            Buffer::Integer(v) => v.get(i).map(|n| Value::integer(*n)),
            Buffer::Float(v) => v.get(i).map(|n| Value::float(*n)),
            Buffer::Boolean(v) => v.get(i).map(|b| Value::boolean(*b)),
        }
    }
}

/// A function value: a captured environment plus an opaque body owned by the
/// evaluator layer. The environment slot is cleared by the cycle collector
/// when the function is unreachable.
pub struct FunctionData {
    env: RefCell<Option<Env>>,
    body: Rc<dyn Any>,
}

impl fmt::Debug for FunctionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function>")
    }
}

/// The tagged value record.
#[derive(Debug)]
pub enum ValueKind {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// Milliseconds since the Unix epoch, signed.
    DateTime(i64),
    Blob(Vec<u8>),
    Array {
        elem: Type,
        items: Vec<Value>,
    },
    /// Items strictly ascending under the total value ordering.
    Set {
        elem: Type,
        items: Vec<Value>,
    },
    /// Entries strictly ascending by key.
    Dict {
        key: Type,
        value: Type,
        entries: Vec<(Value, Value)>,
    },
    /// Field values parallel to the struct type's (sorted) field list.
    Struct {
        ty: Type,
        fields: Vec<Value>,
    },
    Variant {
        ty: Type,
        case: String,
        payload: Value,
    },
    /// Single-slot mutable cell.
    Ref {
        elem: Type,
        target: RefCell<Value>,
    },
    Vector {
        data: Buffer,
    },
    /// Row-major packed buffer, `rows * cols` elements.
    Matrix {
        rows: usize,
        cols: usize,
        data: Buffer,
    },
    Function(FunctionData),
}

thread_local! {
    static NULL: Value = Value(Rc::new(ValueKind::Null));
}

impl Value {
    /// The shared null sentinel.
    pub fn null() -> Value {
        NULL.with(|v| v.clone())
    }

    pub fn boolean(b: bool) -> Value {
        Value(Rc::new(ValueKind::Boolean(b)))
    }

    pub fn integer(n: i64) -> Value {
        Value(Rc::new(ValueKind::Integer(n)))
    }

    pub fn float(x: f64) -> Value {
        Value(Rc::new(ValueKind::Float(x)))
    }

    pub fn string(s: impl Into<String>) -> Value {
        Value(Rc::new(ValueKind::String(s.into())))
    }

    pub fn datetime(epoch_millis: i64) -> Value {
        Value(Rc::new(ValueKind::DateTime(epoch_millis)))
    }

    pub fn blob(bytes: Vec<u8>) -> Value {
        Value(Rc::new(ValueKind::Blob(bytes)))
    }

    pub fn array(elem: Type, items: Vec<Value>) -> Value {
        Value::tracked(ValueKind::Array { elem, items })
    }

    /// Build a set: items are sorted and deduplicated under the total value
    /// ordering so the strictly-ascending invariant holds by construction.
    pub fn set(elem: Type, mut items: Vec<Value>) -> Value {
        items.sort_by(compare::compare);
        items.dedup_by(|a, b| compare::equal(a, b));
        Value::tracked(ValueKind::Set { elem, items })
    }

    /// Build a dict: entries are sorted by key; a later duplicate key wins.
    pub fn dict(key: Type, value: Type, mut entries: Vec<(Value, Value)>) -> Value {
        entries.sort_by(|a, b| compare::compare(&a.0, &b.0));
        // Keep the last entry for any run of equal keys.
        let mut deduped: Vec<(Value, Value)> = Vec::with_capacity(entries.len());
        for entry in entries {
            match deduped.last() {
                Some(last) if compare::equal(&last.0, &entry.0) => {
                    *deduped.last_mut().unwrap_or_else(|| unreachable!()) = entry;
                }
                _ => deduped.push(entry),
            }
        }
        Value::tracked(ValueKind::Dict {
            key,
            value,
            entries: deduped,
        })
    }

    /// Build a struct. `fields` must be parallel to the type's field list.
    pub fn struct_of(ty: Type, fields: Vec<Value>) -> Result<Value, String> {
        let declared = ty
            .fields()
            .ok_or_else(|| format!("struct value requires a struct type, got {}", ty))?;
        if declared.len() != fields.len() {
            return Err(format!(
                "struct {} expects {} fields, got {}",
                ty,
                declared.len(),
                fields.len()
            ));
        }
        Ok(Value::tracked(ValueKind::Struct { ty, fields }))
    }

    /// Build a variant. The case must be declared by the type.
    pub fn variant(ty: Type, case: impl Into<String>, payload: Value) -> Result<Value, String> {
        let case = case.into();
        if ty.member_index(&case).is_none() {
            return Err(format!("variant {} has no case '{}'", ty, case));
        }
        Ok(Value::tracked(ValueKind::Variant { ty, case, payload }))
    }

    pub fn ref_of(elem: Type, target: Value) -> Value {
        Value::tracked(ValueKind::Ref {
            elem,
            target: RefCell::new(target),
        })
    }

    pub fn vector(data: Buffer) -> Value {
        Value(Rc::new(ValueKind::Vector { data }))
    }

    pub fn matrix(rows: usize, cols: usize, data: Buffer) -> Result<Value, String> {
        if rows * cols != data.len() {
            return Err(format!(
                "matrix dimensions {}x{} do not match buffer length {}",
                rows,
                cols,
                data.len()
            ));
        }
        Ok(Value(Rc::new(ValueKind::Matrix { rows, cols, data })))
    }

    /// Build a function value. The body is owned by the evaluator layer and
    /// opaque to the core.
    pub fn function(env: Env, body: Rc<dyn Any>) -> Value {
        Value::tracked(ValueKind::Function(FunctionData {
            env: RefCell::new(Some(env)),
            body,
        }))
    }

    fn tracked(kind: ValueKind) -> Value {
        let value = Value(Rc::new(kind));
        crate::cycle::track_value(&value);
        value
    }

    pub fn kind(&self) -> &ValueKind {
        &self.0
    }

    /// Pointer identity of the record.
    pub fn same(&self, other: &Value) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn is_null(&self) -> bool {
        matches!(&*self.0, ValueKind::Null)
    }

    /// Truthiness: false and null are falsy, everything else is truthy.
    pub fn truthy(&self) -> bool {
        !matches!(&*self.0, ValueKind::Null | ValueKind::Boolean(false))
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match &*self.0 {
            ValueKind::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match &*self.0 {
            ValueKind::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match &*self.0 {
            ValueKind::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match &*self.0 {
            ValueKind::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<i64> {
        match &*self.0 {
            ValueKind::DateTime(ms) => Some(*ms),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match &*self.0 {
            ValueKind::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn array_items(&self) -> Option<&[Value]> {
        match &*self.0 {
            ValueKind::Array { items, .. } => Some(items),
            _ => None,
        }
    }

    pub fn set_items(&self) -> Option<&[Value]> {
        match &*self.0 {
            ValueKind::Set { items, .. } => Some(items),
            _ => None,
        }
    }

    pub fn dict_entries(&self) -> Option<&[(Value, Value)]> {
        match &*self.0 {
            ValueKind::Dict { entries, .. } => Some(entries),
            _ => None,
        }
    }

    /// Membership test against a set's sorted items.
    pub fn set_contains(&self, item: &Value) -> bool {
        match self.set_items() {
            Some(items) => items
                .binary_search_by(|probe| compare::compare(probe, item))
                .is_ok(),
            None => false,
        }
    }

    /// Look a key up in a dict's sorted entries.
    pub fn dict_get(&self, key: &Value) -> Option<Value> {
        let entries = self.dict_entries()?;
        let i = entries
            .binary_search_by(|probe| compare::compare(&probe.0, key))
            .ok()?;
        Some(entries[i].1.clone())
    }

    pub fn struct_type(&self) -> Option<&Type> {
        match &*self.0 {
            ValueKind::Struct { ty, .. } => Some(ty),
            _ => None,
        }
    }

    pub fn struct_fields(&self) -> Option<&[Value]> {
        match &*self.0 {
            ValueKind::Struct { fields, .. } => Some(fields),
            _ => None,
        }
    }

    /// A struct field value by name.
    pub fn field(&self, name: &str) -> Option<Value> {
        match &*self.0 {
            ValueKind::Struct { ty, fields } => {
                let i = ty.member_index(name)?;
                fields.get(i).cloned()
            }
            _ => None,
        }
    }

    pub fn variant_parts(&self) -> Option<(&Type, &str, &Value)> {
        match &*self.0 {
            ValueKind::Variant { ty, case, payload } => Some((ty, case, payload)),
            _ => None,
        }
    }

    pub fn ref_get(&self) -> Option<Value> {
        match &*self.0 {
            ValueKind::Ref { target, .. } => Some(target.borrow().clone()),
            _ => None,
        }
    }

    /// Replace a ref's target. Returns `false` for non-ref values.
    pub fn ref_set(&self, value: Value) -> bool {
        match &*self.0 {
            ValueKind::Ref { target, .. } => {
                *target.borrow_mut() = value;
                true
            }
            _ => false,
        }
    }

    pub fn buffer(&self) -> Option<&Buffer> {
        match &*self.0 {
            ValueKind::Vector { data } | ValueKind::Matrix { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn matrix_dims(&self) -> Option<(usize, usize)> {
        match &*self.0 {
            ValueKind::Matrix { rows, cols, .. } => Some((*rows, *cols)),
            _ => None,
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(&*self.0, ValueKind::Function(_))
    }

    /// The environment captured by a function value. `None` for non-function
    /// values and for functions already severed by the collector.
    pub fn function_env(&self) -> Option<Env> {
        match &*self.0 {
            ValueKind::Function(data) => data.env.borrow().clone(),
            _ => None,
        }
    }

    /// The opaque body installed by the evaluator layer.
    pub fn function_body(&self) -> Option<Rc<dyn Any>> {
        match &*self.0 {
            ValueKind::Function(data) => Some(data.body.clone()),
            _ => None,
        }
    }

    /// The static element type of an array or set value.
    pub fn elem_type(&self) -> Option<Type> {
        match &*self.0 {
            ValueKind::Array { elem, .. }
            | ValueKind::Set { elem, .. }
            | ValueKind::Ref { elem, .. } => Some(elem.clone()),
            ValueKind::Vector { data } => Some(data.elem_type()),
            ValueKind::Matrix { data, .. } => Some(data.elem_type()),
            _ => None,
        }
    }

    /// Infer the static type of a value. Functions are not inferable from
    /// the value alone and yield `None`; the evaluator knows their type from
    /// the IR.
    pub fn type_of(&self) -> Option<Type> {
        match &*self.0 {
            ValueKind::Null => Some(Type::null()),
            ValueKind::Boolean(_) => Some(Type::boolean()),
            ValueKind::Integer(_) => Some(Type::integer()),
            ValueKind::Float(_) => Some(Type::float()),
            ValueKind::String(_) => Some(Type::string()),
            ValueKind::DateTime(_) => Some(Type::datetime()),
            ValueKind::Blob(_) => Some(Type::blob()),
            ValueKind::Array { elem, .. } => Some(Type::array(elem.clone())),
            ValueKind::Set { elem, .. } => Some(Type::set(elem.clone())),
            ValueKind::Dict { key, value, .. } => Some(Type::dict(key.clone(), value.clone())),
            ValueKind::Struct { ty, .. } | ValueKind::Variant { ty, .. } => Some(ty.clone()),
            ValueKind::Ref { elem, .. } => Some(Type::ref_of(elem.clone())),
            ValueKind::Vector { data } => Some(Type::vector(data.elem_type())),
            ValueKind::Matrix { data, .. } => Some(Type::matrix(data.elem_type())),
            ValueKind::Function(_) => None,
        }
    }

    /// True for kinds whose containers can participate in reference cycles.
    pub fn is_cycle_capable(&self) -> bool {
        matches!(
            &*self.0,
            ValueKind::Array { .. }
                | ValueKind::Set { .. }
                | ValueKind::Dict { .. }
                | ValueKind::Struct { .. }
                | ValueKind::Variant { .. }
                | ValueKind::Ref { .. }
                | ValueKind::Function(_)
        )
    }

    /// Visit every directly-owned child value. Function values own their
    /// environment, which is reported separately through `env_edge`.
    pub fn for_each_child(&self, mut f: impl FnMut(&Value)) {
        match &*self.0 {
            ValueKind::Array { items, .. } | ValueKind::Set { items, .. } => {
                for item in items {
                    f(item);
                }
            }
            ValueKind::Dict { entries, .. } => {
                for (k, v) in entries {
                    f(k);
                    f(v);
                }
            }
            ValueKind::Struct { fields, .. } => {
                for field in fields {
                    f(field);
                }
            }
            ValueKind::Variant { payload, .. } => f(payload),
            ValueKind::Ref { target, .. } => f(&target.borrow()),
            _ => {}
        }
    }

    /// The environment edge of a function value, if still attached.
    pub fn env_edge(&self) -> Option<Env> {
        self.function_env()
    }

    pub(crate) fn downgrade(&self) -> std::rc::Weak<ValueKind> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn from_cell(cell: Rc<ValueKind>) -> Value {
        Value(cell)
    }

    pub(crate) fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// Sever the mutable edges of this value. Called by the cycle collector
    /// on unreachable values; reference counts then unwind the rest.
    pub(crate) fn sever(&self) {
        match &*self.0 {
            ValueKind::Ref { target, .. } => {
                *target.borrow_mut() = Value::null();
            }
            ValueKind::Function(data) => {
                *data.env.borrow_mut() = None;
            }
            _ => {}
        }
    }
}

/// Kind rank for the total ordering:
/// null < boolean < integer < float < string < datetime < blob < array < set
/// < dict < struct < variant < ref < vector < matrix < function.
pub fn kind_rank(value: &Value) -> u8 {
    match value.kind() {
        ValueKind::Null => 0,
        ValueKind::Boolean(_) => 1,
        ValueKind::Integer(_) => 2,
        ValueKind::Float(_) => 3,
        ValueKind::String(_) => 4,
        ValueKind::DateTime(_) => 5,
        ValueKind::Blob(_) => 6,
        ValueKind::Array { .. } => 7,
        ValueKind::Set { .. } => 8,
        ValueKind::Dict { .. } => 9,
        ValueKind::Struct { .. } => 10,
        ValueKind::Variant { .. } => 11,
        ValueKind::Ref { .. } => 12,
        ValueKind::Vector { .. } => 13,
        ValueKind::Matrix { .. } => 14,
        ValueKind::Function(_) => 15,
    }
}

/// An empty buffer for a packable element type, or `None` for types a
/// vector/matrix cannot carry.
pub fn buffer_for(elem: &Type, len: usize) -> Option<Buffer> {
    match elem.kind() {
        TypeKind::Integer => Some(Buffer::Integer(Vec::with_capacity(len))),
        TypeKind::Float => Some(Buffer::Float(Vec::with_capacity(len))),
        TypeKind::Boolean => Some(Buffer::Boolean(Vec::with_capacity(len))),
        _ => None,
    }
}

impl Buffer {
    /// Append a boxed value of the matching scalar kind.
    pub fn push_value(&mut self, value: &Value) -> Result<(), String> {
        match (self, value.kind()) {
            (Buffer::Integer(v), ValueKind::Integer(n)) => {
                v.push(*n);
                Ok(())
            }
            (Buffer::Float(v), ValueKind::Float(x)) => {
                v.push(*x);
                Ok(())
            }
            (Buffer::Boolean(v), ValueKind::Boolean(b)) => {
                v.push(*b);
                Ok(())
            }
            (buf, _) => Err(format!(
                "cannot pack {:?} into a {} buffer",
                value,
                buf.elem_type()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_singleton() {
        assert!(Value::null().same(&Value::null()));
        assert!(Value::null().is_null());
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::null().truthy());
        assert!(!Value::boolean(false).truthy());
        assert!(Value::boolean(true).truthy());
        assert!(Value::integer(0).truthy());
        assert!(Value::string("").truthy());
    }

    #[test]
    fn test_set_sorted_unique() {
        let s = Value::set(
            Type::integer(),
            vec![
                Value::integer(3),
                Value::integer(1),
                Value::integer(3),
                Value::integer(2),
            ],
        );
        let items: Vec<i64> = s
            .set_items()
            .unwrap()
            .iter()
            .map(|v| v.as_integer().unwrap())
            .collect();
        assert_eq!(items, vec![1, 2, 3]);
        assert!(s.set_contains(&Value::integer(2)));
        assert!(!s.set_contains(&Value::integer(4)));
    }

    #[test]
    fn test_dict_sorted_last_wins() {
        let d = Value::dict(
            Type::string(),
            Type::integer(),
            vec![
                (Value::string("b"), Value::integer(2)),
                (Value::string("a"), Value::integer(1)),
                (Value::string("b"), Value::integer(9)),
            ],
        );
        let entries = d.dict_entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0.as_string(), Some("a"));
        assert_eq!(d.dict_get(&Value::string("b")).unwrap().as_integer(), Some(9));
    }

    #[test]
    fn test_struct_field_lookup() {
        use crate::types::Field;
        let ty = Type::struct_of(vec![
            Field::new("y", Type::integer()),
            Field::new("x", Type::integer()),
        ]);
        // Fields sorted: x, y.
        let s = Value::struct_of(ty, vec![Value::integer(10), Value::integer(20)]).unwrap();
        assert_eq!(s.field("x").unwrap().as_integer(), Some(10));
        assert_eq!(s.field("y").unwrap().as_integer(), Some(20));
        assert!(s.field("z").is_none());
    }

    #[test]
    fn test_variant_case_checked() {
        use crate::types::Field;
        let ty = Type::variant_of(vec![
            Field::new("some", Type::integer()),
            Field::new("none", Type::null()),
        ]);
        assert!(Value::variant(ty.clone(), "some", Value::integer(1)).is_ok());
        assert!(Value::variant(ty, "other", Value::null()).is_err());
    }

    #[test]
    fn test_ref_cell() {
        let r = Value::ref_of(Type::integer(), Value::integer(1));
        assert_eq!(r.ref_get().unwrap().as_integer(), Some(1));
        assert!(r.ref_set(Value::integer(2)));
        assert_eq!(r.ref_get().unwrap().as_integer(), Some(2));
        assert!(!Value::integer(0).ref_set(Value::null()));
    }

    #[test]
    fn test_matrix_dims_checked() {
        assert!(Value::matrix(2, 2, Buffer::Integer(vec![1, 2, 3, 4])).is_ok());
        assert!(Value::matrix(2, 2, Buffer::Integer(vec![1, 2, 3])).is_err());
    }
}

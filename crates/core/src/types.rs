//! Static type descriptors for the Tern value universe
//!
//! Types are immutable terms behind cheap-clone handles. Primitive terms are
//! per-thread singletons, so `Type::integer() == Type::integer()` is a pointer
//! comparison. Parameterized constructors own their argument terms.
//!
//! Struct fields and variant cases are sorted lexicographically by name and
//! the sorted order is part of the type's identity.
//!
//! # Recursive types
//!
//! A recursive type is a wrapper whose inner term may reference the wrapper
//! itself. Construction is two-phase: allocate the wrapper, build the inner
//! term using [`Type::recursive_self`] leaves, then [`Type::recursive_finalize`].
//! Self-reference leaves hold a weak back-edge, so a finished wrapper owns its
//! inner term without forming a strong cycle. Wrappers and their self-leaves
//! compare by cell identity only.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::{Rc, Weak};

/// Handle to a type term. Clone is O(1).
#[derive(Clone, Debug)]
pub struct Type(Rc<TypeKind>);

/// The tagged type term.
#[derive(Debug)]
pub enum TypeKind {
    Never,
    Null,
    Boolean,
    Integer,
    Float,
    String,
    DateTime,
    Blob,
    Array(Type),
    Set(Type),
    Dict { key: Type, value: Type },
    Struct(Vec<Field>),
    Variant(Vec<Field>),
    Ref(Type),
    Vector(Type),
    Matrix(Type),
    Function { inputs: Vec<Type>, output: Type },
    AsyncFunction { inputs: Vec<Type>, output: Type },
    /// Recursive wrapper; owns the inner term once finalized.
    Recursive(Rc<RecursiveCell>),
    /// Self-reference leaf inside a recursive wrapper's inner term.
    RecursiveRef(Weak<RecursiveCell>),
}

/// A named member of a struct or variant type.
#[derive(Clone, Debug)]
pub struct Field {
    pub name: String,
    pub ty: Type,
}

/// Interior node of a recursive wrapper. `inner` is `None` while the wrapper
/// is still under construction.
#[derive(Debug)]
pub struct RecursiveCell {
    inner: RefCell<Option<Type>>,
}

thread_local! {
    static PRIMITIVES: Primitives = Primitives::new();
}

struct Primitives {
    never: Type,
    null: Type,
    boolean: Type,
    integer: Type,
    float: Type,
    string: Type,
    datetime: Type,
    blob: Type,
}

impl Primitives {
    fn new() -> Self {
        Self {
            never: Type(Rc::new(TypeKind::Never)),
            null: Type(Rc::new(TypeKind::Null)),
            boolean: Type(Rc::new(TypeKind::Boolean)),
            integer: Type(Rc::new(TypeKind::Integer)),
            float: Type(Rc::new(TypeKind::Float)),
            string: Type(Rc::new(TypeKind::String)),
            datetime: Type(Rc::new(TypeKind::DateTime)),
            blob: Type(Rc::new(TypeKind::Blob)),
        }
    }
}

impl Type {
    pub fn never() -> Type {
        PRIMITIVES.with(|p| p.never.clone())
    }

    pub fn null() -> Type {
        PRIMITIVES.with(|p| p.null.clone())
    }

    pub fn boolean() -> Type {
        PRIMITIVES.with(|p| p.boolean.clone())
    }

    pub fn integer() -> Type {
        PRIMITIVES.with(|p| p.integer.clone())
    }

    pub fn float() -> Type {
        PRIMITIVES.with(|p| p.float.clone())
    }

    pub fn string() -> Type {
        PRIMITIVES.with(|p| p.string.clone())
    }

    pub fn datetime() -> Type {
        PRIMITIVES.with(|p| p.datetime.clone())
    }

    pub fn blob() -> Type {
        PRIMITIVES.with(|p| p.blob.clone())
    }

    pub fn array(elem: Type) -> Type {
        Type(Rc::new(TypeKind::Array(elem)))
    }

    pub fn set(elem: Type) -> Type {
        Type(Rc::new(TypeKind::Set(elem)))
    }

    pub fn dict(key: Type, value: Type) -> Type {
        Type(Rc::new(TypeKind::Dict { key, value }))
    }

    /// Build a struct type. Fields are sorted by name; the sorted order is
    /// part of the type's identity. Duplicate names are a caller bug.
    pub fn struct_of(mut fields: Vec<Field>) -> Type {
        fields.sort_by(|a, b| a.name.cmp(&b.name));
        debug_assert!(fields.windows(2).all(|w| w[0].name != w[1].name));
        Type(Rc::new(TypeKind::Struct(fields)))
    }

    /// Build a variant type. Cases are sorted by name, same as structs.
    pub fn variant_of(mut cases: Vec<Field>) -> Type {
        cases.sort_by(|a, b| a.name.cmp(&b.name));
        debug_assert!(cases.windows(2).all(|w| w[0].name != w[1].name));
        Type(Rc::new(TypeKind::Variant(cases)))
    }

    pub fn ref_of(elem: Type) -> Type {
        Type(Rc::new(TypeKind::Ref(elem)))
    }

    pub fn vector(elem: Type) -> Type {
        debug_assert!(elem.is_numeric_elem());
        Type(Rc::new(TypeKind::Vector(elem)))
    }

    pub fn matrix(elem: Type) -> Type {
        debug_assert!(elem.is_numeric_elem());
        Type(Rc::new(TypeKind::Matrix(elem)))
    }

    pub fn function(inputs: Vec<Type>, output: Type) -> Type {
        Type(Rc::new(TypeKind::Function { inputs, output }))
    }

    pub fn async_function(inputs: Vec<Type>, output: Type) -> Type {
        Type(Rc::new(TypeKind::AsyncFunction { inputs, output }))
    }

    /// Allocate a recursive wrapper in the building state.
    pub fn recursive_begin() -> Type {
        Type(Rc::new(TypeKind::Recursive(Rc::new(RecursiveCell {
            inner: RefCell::new(None),
        }))))
    }

    /// A self-reference leaf for a wrapper created by [`Type::recursive_begin`].
    /// Returns `None` if `self` is not a recursive wrapper.
    pub fn recursive_self(&self) -> Option<Type> {
        match &*self.0 {
            TypeKind::Recursive(cell) => {
                Some(Type(Rc::new(TypeKind::RecursiveRef(Rc::downgrade(cell)))))
            }
            _ => None,
        }
    }

    /// Install the inner term, completing construction. Returns `false` if
    /// `self` is not a wrapper or was already finalized.
    pub fn recursive_finalize(&self, inner: Type) -> bool {
        match &*self.0 {
            TypeKind::Recursive(cell) => {
                let mut slot = cell.inner.borrow_mut();
                if slot.is_some() {
                    return false;
                }
                *slot = Some(inner);
                true
            }
            _ => false,
        }
    }

    /// Two-phase construction in one step: the builder receives the self
    /// leaf and returns the inner term.
    pub fn recursive(build: impl FnOnce(&Type) -> Type) -> Type {
        let wrapper = Type::recursive_begin();
        let self_leaf = wrapper
            .recursive_self()
            .unwrap_or_else(|| unreachable!("recursive_begin returns a wrapper"));
        let inner = build(&self_leaf);
        wrapper.recursive_finalize(inner);
        wrapper
    }

    /// The inner term of a recursive wrapper or self-leaf, if finalized.
    pub fn recursive_inner(&self) -> Option<Type> {
        self.recursive_cell()
            .and_then(|cell| cell.inner.borrow().clone())
    }

    /// Stable identity of the recursive cell behind a wrapper or self-leaf.
    /// `None` for non-recursive types.
    pub fn recursive_addr(&self) -> Option<usize> {
        self.recursive_cell().map(|cell| Rc::as_ptr(&cell) as usize)
    }

    fn recursive_cell(&self) -> Option<Rc<RecursiveCell>> {
        match &*self.0 {
            TypeKind::Recursive(cell) => Some(cell.clone()),
            TypeKind::RecursiveRef(weak) => weak.upgrade(),
            _ => None,
        }
    }

    pub fn kind(&self) -> &TypeKind {
        &self.0
    }

    /// Pointer identity of the underlying term.
    pub fn same(&self, other: &Type) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// True for the element types a vector or matrix may carry.
    pub fn is_numeric_elem(&self) -> bool {
        matches!(
            &*self.0,
            TypeKind::Integer | TypeKind::Float | TypeKind::Boolean
        )
    }

    /// Strip any number of recursive wrappers, yielding the structural term.
    /// Returns `self` unchanged for non-recursive types; returns `None` only
    /// for a wrapper that was never finalized.
    pub fn unwrap_recursive(&self) -> Option<Type> {
        let mut current = self.clone();
        loop {
            match &*current.0 {
                TypeKind::Recursive(_) | TypeKind::RecursiveRef(_) => {
                    current = current.recursive_inner()?;
                }
                _ => return Some(current),
            }
        }
    }

    /// Element type of an array, set, vector, or matrix.
    pub fn elem(&self) -> Option<Type> {
        match &*self.0 {
            TypeKind::Array(e) | TypeKind::Set(e) | TypeKind::Vector(e) | TypeKind::Matrix(e) => {
                Some(e.clone())
            }
            TypeKind::Ref(e) => Some(e.clone()),
            _ => None,
        }
    }

    pub fn dict_types(&self) -> Option<(Type, Type)> {
        match &*self.0 {
            TypeKind::Dict { key, value } => Some((key.clone(), value.clone())),
            _ => None,
        }
    }

    pub fn fields(&self) -> Option<&[Field]> {
        match &*self.0 {
            TypeKind::Struct(fields) | TypeKind::Variant(fields) => Some(fields),
            _ => None,
        }
    }

    /// Index of a struct field or variant case by name.
    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.fields()?.iter().position(|f| f.name == name)
    }

    /// Type of a struct field or variant case payload by name.
    pub fn member_type(&self, name: &str) -> Option<Type> {
        let fields = self.fields()?;
        fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.ty.clone())
    }

    pub fn function_types(&self) -> Option<(&[Type], Type)> {
        match &*self.0 {
            TypeKind::Function { inputs, output }
            | TypeKind::AsyncFunction { inputs, output } => {
                Some((inputs.as_slice(), output.clone()))
            }
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match &*self.0 {
            TypeKind::Never => 0,
            TypeKind::Null => 1,
            TypeKind::Boolean => 2,
            TypeKind::Integer => 3,
            TypeKind::Float => 4,
            TypeKind::String => 5,
            TypeKind::DateTime => 6,
            TypeKind::Blob => 7,
            TypeKind::Array(_) => 8,
            TypeKind::Set(_) => 9,
            TypeKind::Dict { .. } => 10,
            TypeKind::Struct(_) => 11,
            TypeKind::Variant(_) => 12,
            TypeKind::Ref(_) => 13,
            TypeKind::Vector(_) => 14,
            TypeKind::Matrix(_) => 15,
            TypeKind::Function { .. } => 16,
            TypeKind::AsyncFunction { .. } => 17,
            TypeKind::Recursive(_) | TypeKind::RecursiveRef(_) => 18,
        }
    }

    /// Structural equality. Pointer identity short-circuits; recursive
    /// wrappers compare by cell identity only.
    pub fn equal(&self, other: &Type) -> bool {
        if self.same(other) {
            return true;
        }
        match (&*self.0, &*other.0) {
            (TypeKind::Never, TypeKind::Never)
            | (TypeKind::Null, TypeKind::Null)
            | (TypeKind::Boolean, TypeKind::Boolean)
            | (TypeKind::Integer, TypeKind::Integer)
            | (TypeKind::Float, TypeKind::Float)
            | (TypeKind::String, TypeKind::String)
            | (TypeKind::DateTime, TypeKind::DateTime)
            | (TypeKind::Blob, TypeKind::Blob) => true,
            (TypeKind::Array(a), TypeKind::Array(b))
            | (TypeKind::Set(a), TypeKind::Set(b))
            | (TypeKind::Ref(a), TypeKind::Ref(b))
            | (TypeKind::Vector(a), TypeKind::Vector(b))
            | (TypeKind::Matrix(a), TypeKind::Matrix(b)) => a.equal(b),
            (TypeKind::Dict { key: ka, value: va }, TypeKind::Dict { key: kb, value: vb }) => {
                ka.equal(kb) && va.equal(vb)
            }
            (TypeKind::Struct(a), TypeKind::Struct(b))
            | (TypeKind::Variant(a), TypeKind::Variant(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|(x, y)| x.name == y.name && x.ty.equal(&y.ty))
            }
            (
                TypeKind::Function { inputs: ia, output: oa },
                TypeKind::Function { inputs: ib, output: ob },
            )
            | (
                TypeKind::AsyncFunction { inputs: ia, output: oa },
                TypeKind::AsyncFunction { inputs: ib, output: ob },
            ) => {
                ia.len() == ib.len()
                    && ia.iter().zip(ib.iter()).all(|(x, y)| x.equal(y))
                    && oa.equal(ob)
            }
            _ => match (self.recursive_cell(), other.recursive_cell()) {
                (Some(a), Some(b)) => Rc::ptr_eq(&a, &b),
                _ => false,
            },
        }
    }

    /// Deterministic total order over type terms. Used wherever a canonical
    /// ordering of types is needed; values carry their own ordering.
    pub fn compare(&self, other: &Type) -> Ordering {
        if self.same(other) {
            return Ordering::Equal;
        }
        let rank = self.rank().cmp(&other.rank());
        if rank != Ordering::Equal {
            return rank;
        }
        match (&*self.0, &*other.0) {
            (TypeKind::Array(a), TypeKind::Array(b))
            | (TypeKind::Set(a), TypeKind::Set(b))
            | (TypeKind::Ref(a), TypeKind::Ref(b))
            | (TypeKind::Vector(a), TypeKind::Vector(b))
            | (TypeKind::Matrix(a), TypeKind::Matrix(b)) => a.compare(b),
            (TypeKind::Dict { key: ka, value: va }, TypeKind::Dict { key: kb, value: vb }) => {
                ka.compare(kb).then_with(|| va.compare(vb))
            }
            (TypeKind::Struct(a), TypeKind::Struct(b))
            | (TypeKind::Variant(a), TypeKind::Variant(b)) => {
                a.len().cmp(&b.len()).then_with(|| {
                    for (x, y) in a.iter().zip(b.iter()) {
                        let by_name = x.name.cmp(&y.name);
                        if by_name != Ordering::Equal {
                            return by_name;
                        }
                        let by_type = x.ty.compare(&y.ty);
                        if by_type != Ordering::Equal {
                            return by_type;
                        }
                    }
                    Ordering::Equal
                })
            }
            (
                TypeKind::Function { inputs: ia, output: oa },
                TypeKind::Function { inputs: ib, output: ob },
            )
            | (
                TypeKind::AsyncFunction { inputs: ia, output: oa },
                TypeKind::AsyncFunction { inputs: ib, output: ob },
            ) => ia.len().cmp(&ib.len()).then_with(|| {
                for (x, y) in ia.iter().zip(ib.iter()) {
                    let c = x.compare(y);
                    if c != Ordering::Equal {
                        return c;
                    }
                }
                oa.compare(ob)
            }),
            _ => {
                // Same rank, structurally incomparable: recursive wrappers
                // order by cell address (stable within a process).
                let pa = self.recursive_cell().map_or(0, |c| Rc::as_ptr(&c) as usize);
                let pb = other.recursive_cell().map_or(0, |c| Rc::as_ptr(&c) as usize);
                pa.cmp(&pb)
            }
        }
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.equal(other)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            TypeKind::Never => write!(f, "never"),
            TypeKind::Null => write!(f, "null"),
            TypeKind::Boolean => write!(f, "boolean"),
            TypeKind::Integer => write!(f, "integer"),
            TypeKind::Float => write!(f, "float"),
            TypeKind::String => write!(f, "string"),
            TypeKind::DateTime => write!(f, "datetime"),
            TypeKind::Blob => write!(f, "blob"),
            TypeKind::Array(e) => write!(f, "array<{}>", e),
            TypeKind::Set(e) => write!(f, "set<{}>", e),
            TypeKind::Dict { key, value } => write!(f, "dict<{}, {}>", key, value),
            TypeKind::Struct(fields) => {
                write!(f, "struct{{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.ty)?;
                }
                write!(f, "}}")
            }
            TypeKind::Variant(cases) => {
                write!(f, "variant{{")?;
                for (i, case) in cases.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", case.name, case.ty)?;
                }
                write!(f, "}}")
            }
            TypeKind::Ref(e) => write!(f, "ref<{}>", e),
            TypeKind::Vector(e) => write!(f, "vector<{}>", e),
            TypeKind::Matrix(e) => write!(f, "matrix<{}>", e),
            TypeKind::Function { inputs, output } => {
                write!(f, "fn(")?;
                for (i, input) in inputs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", input)?;
                }
                write!(f, ") -> {}", output)
            }
            TypeKind::AsyncFunction { inputs, output } => {
                write!(f, "async fn(")?;
                for (i, input) in inputs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", input)?;
                }
                write!(f, ") -> {}", output)
            }
            TypeKind::Recursive(cell) => match &*cell.inner.borrow() {
                Some(inner) => write!(f, "recursive<{}>", inner),
                None => write!(f, "recursive<...>"),
            },
            TypeKind::RecursiveRef(_) => write!(f, "self"),
        }
    }
}

impl Field {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

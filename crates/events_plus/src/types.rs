//! # Core Type Definitions
//!
//! The value model shared by descriptors, callables and predefined arguments.
//!
//! ## Key Types
//!
//! - [`TypeRef`] - canonical, fully-qualified type name as it appears in member tokens
//! - [`Value`] - one element of an untyped argument vector
//! - [`Signature`] - ordered parameter types of a callable or publisher
//! - [`ArgumentType`] / [`ReturnValue`] - conversions between Rust types and [`Value`]
//! - [`ArgumentList`] - tuples of argument types, used for typed publishing
//!
//! Aggregates ([`Vector2`], [`Vector3`], [`Vector4`], [`Quaternion`], [`Rect`],
//! [`Bounds`], [`Color`], [`Curve`]) are plain data carriers. They exist so that
//! persisted arguments keep their shape; no math is attached to them.

use crate::error::EventError;
use crate::macros::for_each_arity;
use crate::reflect::ObjectRef;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::hash::{Hash, Hasher};

// ============================================================================
// Canonical Type Names
// ============================================================================

/// Fully-qualified names of the built-in argument types.
pub mod names {
    pub const BOOL: &str = "System.Boolean";
    pub const INT: &str = "System.Int32";
    pub const LONG: &str = "System.Int64";
    pub const FLOAT: &str = "System.Single";
    pub const DOUBLE: &str = "System.Double";
    pub const STRING: &str = "System.String";
    pub const VECTOR2: &str = "UnityEngine.Vector2";
    pub const VECTOR3: &str = "UnityEngine.Vector3";
    pub const VECTOR4: &str = "UnityEngine.Vector4";
    pub const QUATERNION: &str = "UnityEngine.Quaternion";
    pub const RECT: &str = "UnityEngine.Rect";
    pub const BOUNDS: &str = "UnityEngine.Bounds";
    pub const COLOR: &str = "UnityEngine.Color";
    pub const CURVE: &str = "UnityEngine.AnimationCurve";

    /// Every built-in name, in declaration order.
    pub const BUILTIN: [&str; 14] = [
        BOOL, INT, LONG, FLOAT, DOUBLE, STRING, VECTOR2, VECTOR3, VECTOR4, QUATERNION, RECT,
        BOUNDS, COLOR, CURVE,
    ];
}

/// Reference to a type by its fully-qualified name.
///
/// Equality is plain string equality; no aliasing or coercion between types
/// is ever performed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeRef(CompactString);

impl TypeRef {
    pub fn named(name: &str) -> Self {
        Self(CompactString::new(name))
    }

    /// The type reference for a Rust argument type.
    pub fn of<T: ArgumentType>() -> Self {
        T::type_ref()
    }

    pub fn name(&self) -> &str {
        self.0.as_str()
    }

    /// True when the name is one of [`names::BUILTIN`].
    pub fn is_builtin(&self) -> bool {
        names::BUILTIN.contains(&self.name())
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Aggregate Values
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };
}

/// Axis-aligned rectangle given by its position and size.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Axis-aligned box given by its center and full size.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub center: Vector3,
    pub size: Vector3,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Keyframe {
    pub time: f32,
    pub value: f32,
    pub in_tangent: f32,
    pub out_tangent: f32,
}

/// Keyframed curve data.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Curve {
    pub keys: Vec<Keyframe>,
}

// ============================================================================
// Untyped Values
// ============================================================================

/// One element of an untyped argument vector.
///
/// Enum and object values carry their own [`TypeRef`] because their type is
/// not implied by the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Vector2(Vector2),
    Vector3(Vector3),
    Vector4(Vector4),
    Quaternion(Quaternion),
    Rect(Rect),
    Bounds(Bounds),
    Color(Color),
    Curve(Curve),
    Enum { type_ref: TypeRef, ordinal: i32 },
    /// A possibly-null reference to a registered object type
    Object { type_ref: TypeRef, object: Option<ObjectRef> },
}

impl Value {
    pub fn type_ref(&self) -> TypeRef {
        match self {
            Value::Bool(_) => TypeRef::named(names::BOOL),
            Value::Int(_) => TypeRef::named(names::INT),
            Value::Long(_) => TypeRef::named(names::LONG),
            Value::Float(_) => TypeRef::named(names::FLOAT),
            Value::Double(_) => TypeRef::named(names::DOUBLE),
            Value::String(_) => TypeRef::named(names::STRING),
            Value::Vector2(_) => TypeRef::named(names::VECTOR2),
            Value::Vector3(_) => TypeRef::named(names::VECTOR3),
            Value::Vector4(_) => TypeRef::named(names::VECTOR4),
            Value::Quaternion(_) => TypeRef::named(names::QUATERNION),
            Value::Rect(_) => TypeRef::named(names::RECT),
            Value::Bounds(_) => TypeRef::named(names::BOUNDS),
            Value::Color(_) => TypeRef::named(names::COLOR),
            Value::Curve(_) => TypeRef::named(names::CURVE),
            Value::Enum { type_ref, .. } | Value::Object { type_ref, .. } => type_ref.clone(),
        }
    }

    /// True when this value can be passed where `expected` is declared.
    pub fn matches(&self, expected: &TypeRef) -> bool {
        match self {
            Value::Enum { type_ref, .. } | Value::Object { type_ref, .. } => type_ref == expected,
            other => other.type_ref() == *expected,
        }
    }
}

// ============================================================================
// Conversion Traits
// ============================================================================

/// A Rust type that can travel through an untyped argument vector.
pub trait ArgumentType: Sized + Send + Sync + 'static {
    fn type_ref() -> TypeRef;

    /// Extracts a value of this type, or `None` when the variant or type name differs.
    fn from_value(value: &Value) -> Option<Self>;

    fn into_value(self) -> Value;

    /// True when a missing object reference is a valid value of this type.
    fn accepts_null() -> bool {
        false
    }
}

/// A Rust type that can be returned from a reflected method.
///
/// Return values are discarded by every callable shape; the trait only records
/// the declared return type and lets `Result` returns propagate their errors.
pub trait ReturnValue: Send + 'static {
    fn return_type() -> Option<TypeRef>;

    fn into_return(self) -> Result<Option<Value>, EventError>;
}

impl ReturnValue for () {
    fn return_type() -> Option<TypeRef> {
        None
    }

    fn into_return(self) -> Result<Option<Value>, EventError> {
        Ok(None)
    }
}

impl<R: ReturnValue> ReturnValue for Result<R, EventError> {
    fn return_type() -> Option<TypeRef> {
        R::return_type()
    }

    fn into_return(self) -> Result<Option<Value>, EventError> {
        self.and_then(R::into_return)
    }
}

/// Enumerations registered through [`argument_enum!`](crate::argument_enum).
pub trait EnumType: ArgumentType {
    /// `(variant name, ordinal)` pairs in declaration order.
    fn variants() -> &'static [(&'static str, i32)];
}

macro_rules! builtin_argument {
    ($ty:ty, $variant:ident, $name:expr) => {
        impl ArgumentType for $ty {
            fn type_ref() -> TypeRef {
                TypeRef::named($name)
            }

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(inner) => Some(inner.clone()),
                    _ => None,
                }
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }
        }

        impl ReturnValue for $ty {
            fn return_type() -> Option<TypeRef> {
                Some(TypeRef::named($name))
            }

            fn into_return(self) -> Result<Option<Value>, EventError> {
                Ok(Some(Value::$variant(self)))
            }
        }
    };
}

builtin_argument!(bool, Bool, names::BOOL);
builtin_argument!(i32, Int, names::INT);
builtin_argument!(i64, Long, names::LONG);
builtin_argument!(f32, Float, names::FLOAT);
builtin_argument!(f64, Double, names::DOUBLE);
builtin_argument!(String, String, names::STRING);
builtin_argument!(Vector2, Vector2, names::VECTOR2);
builtin_argument!(Vector3, Vector3, names::VECTOR3);
builtin_argument!(Vector4, Vector4, names::VECTOR4);
builtin_argument!(Quaternion, Quaternion, names::QUATERNION);
builtin_argument!(Rect, Rect, names::RECT);
builtin_argument!(Bounds, Bounds, names::BOUNDS);
builtin_argument!(Color, Color, names::COLOR);
builtin_argument!(Curve, Curve, names::CURVE);

/// Pulls the next argument off `args` and converts it.
pub(crate) fn take_argument<A: ArgumentType>(
    args: &mut std::slice::Iter<'_, Value>,
) -> Result<A, EventError> {
    let value = args.next().ok_or_else(|| {
        EventError::ArgumentMismatch(format!("missing argument of type '{}'", A::type_ref()))
    })?;
    A::from_value(value).ok_or_else(|| {
        EventError::ArgumentMismatch(format!(
            "expected '{}', received '{}'",
            A::type_ref(),
            value.type_ref()
        ))
    })
}

// ============================================================================
// Signatures
// ============================================================================

/// Ordered parameter types of a callable or a publisher's event.
///
/// Equality and hashing compare the types only; nullability is a property of
/// the Rust parameter and never affects matching.
#[derive(Debug, Clone, Default)]
pub struct Signature {
    types: SmallVec<[TypeRef; 4]>,
    nullable: SmallVec<[bool; 4]>,
}

impl Signature {
    pub fn new(types: impl IntoIterator<Item = TypeRef>) -> Self {
        let types: SmallVec<[TypeRef; 4]> = types.into_iter().collect();
        let nullable = types.iter().map(|_| false).collect();
        Self { types, nullable }
    }

    fn with_nullable(types: Vec<TypeRef>, nullable: Vec<bool>) -> Self {
        Self {
            types: types.into_iter().collect(),
            nullable: nullable.into_iter().collect(),
        }
    }

    /// The zero-parameter signature.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Signature of a tuple of argument types, e.g. `Signature::of::<(i32, String)>()`.
    pub fn of<L: ArgumentList>() -> Self {
        L::signature()
    }

    pub fn arity(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn types(&self) -> &[TypeRef] {
        &self.types
    }

    /// Whether parameter `index` takes a missing object reference.
    pub fn accepts_null(&self, index: usize) -> bool {
        self.nullable.get(index).copied().unwrap_or(false)
    }

    /// Checks an argument vector against this signature.
    pub fn check(&self, args: &[Value]) -> Result<(), EventError> {
        if args.len() != self.arity() {
            return Err(EventError::ArgumentMismatch(format!(
                "expected {} argument(s) {}, received {}",
                self.arity(),
                self,
                args.len()
            )));
        }
        for (index, (value, expected)) in args.iter().zip(self.types.iter()).enumerate() {
            if !value.matches(expected) {
                return Err(EventError::ArgumentMismatch(format!(
                    "argument {} expected '{}', received '{}'",
                    index,
                    expected,
                    value.type_ref()
                )));
            }
        }
        Ok(())
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.types == other.types
    }
}

impl Eq for Signature {}

impl Hash for Signature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.types.hash(state);
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (index, ty) in self.types.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            f.write_str(ty.name())?;
        }
        f.write_str(")")
    }
}

/// Tuples of [`ArgumentType`]s, from `()` up to ten elements.
pub trait ArgumentList {
    fn signature() -> Signature;

    fn into_values(self) -> Vec<Value>;
}

macro_rules! impl_argument_list {
    ($($arg:ident),*) => {
        impl<$($arg: ArgumentType),*> ArgumentList for ($($arg,)*) {
            fn signature() -> Signature {
                let types: Vec<TypeRef> = vec![$($arg::type_ref()),*];
                let nullable: Vec<bool> = vec![$($arg::accepts_null()),*];
                Signature::with_nullable(types, nullable)
            }

            #[allow(non_snake_case)]
            fn into_values(self) -> Vec<Value> {
                let ($($arg,)*) = self;
                vec![$($arg.into_value()),*]
            }
        }
    };
}

for_each_arity!(impl_argument_list);

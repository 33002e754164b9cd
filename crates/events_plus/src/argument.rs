//! # Argument Value Container
//!
//! [`ArgumentValue`] stores one predefined call argument in its persisted
//! shape: a type tag naming the active payload plus a fixed set of payload
//! slots. Which slots are meaningful depends on the tag; the rest are ignored.
//!
//! | tag                        | slots                     |
//! |----------------------------|---------------------------|
//! | bool, int, long, enum      | `long_value`              |
//! | float                      | `x1`                      |
//! | double                     | `double_value`            |
//! | string                     | `string_value`            |
//! | vector2 .. color, bounds   | `x1 y1 z1 x2 y2 z2`       |
//! | curve                      | `curve_value`             |
//! | registered object type     | `object_value` (runtime)  |
//!
//! Reads are lenient: an unknown tag yields `None`. Writes are strict: a value
//! whose type differs from the tag is refused with [`EventError::TagMismatch`].

use crate::error::EventError;
use crate::reflect::{ObjectRef, TypeRegistry};
use crate::types::{
    names, ArgumentType, Bounds, Color, Curve, Quaternion, Rect, TypeRef, Value, Vector2, Vector3,
    Vector4,
};
use serde::{Deserialize, Serialize};

/// A tagged argument slot as stored by an authoring tool.
///
/// Object references cannot be persisted and are skipped by serde; they are
/// attached at runtime with [`ArgumentValue::set_value`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArgumentValue {
    #[serde(rename = "type")]
    type_tag: TypeRef,
    #[serde(skip)]
    object_value: Option<ObjectRef>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    string_value: String,
    #[serde(default)]
    x1: f32,
    #[serde(default)]
    x2: f32,
    #[serde(default)]
    y1: f32,
    #[serde(default)]
    y2: f32,
    #[serde(default)]
    z1: f32,
    #[serde(default)]
    z2: f32,
    #[serde(default)]
    long_value: i64,
    #[serde(default)]
    double_value: f64,
    #[serde(default, skip_serializing_if = "curve_is_empty")]
    curve_value: Curve,
}

fn curve_is_empty(curve: &Curve) -> bool {
    curve.keys.is_empty()
}

impl ArgumentValue {
    /// Empty container for `type_tag`; every slot holds its default.
    pub fn new(type_tag: TypeRef) -> Self {
        Self {
            type_tag,
            ..Self::default()
        }
    }

    /// Container tagged with the value's own type and holding it.
    pub fn from_value(value: Value) -> Self {
        let mut argument = Self::new(value.type_ref());
        argument.write(value);
        argument
    }

    pub fn of<A: ArgumentType>(value: A) -> Self {
        Self::from_value(value.into_value())
    }

    pub fn type_tag(&self) -> &TypeRef {
        &self.type_tag
    }

    /// Reads the active payload.
    ///
    /// Built-in tags map straight onto their slots. Any other tag is looked up
    /// in `types`: enum types yield their ordinal, object types their
    /// reference. Unknown tags, ints outside the `i32` range and enum ordinals
    /// naming no variant yield `None`.
    pub fn value(&self, types: &TypeRegistry) -> Option<Value> {
        let value = match self.type_tag.name() {
            names::BOOL => Value::Bool(self.long_value != 0),
            names::INT => Value::Int(i32::try_from(self.long_value).ok()?),
            names::LONG => Value::Long(self.long_value),
            names::FLOAT => Value::Float(self.x1),
            names::DOUBLE => Value::Double(self.double_value),
            names::STRING => Value::String(self.string_value.clone()),
            names::VECTOR2 => Value::Vector2(Vector2 { x: self.x1, y: self.y1 }),
            names::VECTOR3 => Value::Vector3(Vector3 { x: self.x1, y: self.y1, z: self.z1 }),
            names::VECTOR4 => Value::Vector4(Vector4 {
                x: self.x1,
                y: self.y1,
                z: self.z1,
                w: self.x2,
            }),
            names::QUATERNION => Value::Quaternion(Quaternion {
                x: self.x1,
                y: self.y1,
                z: self.z1,
                w: self.x2,
            }),
            names::RECT => Value::Rect(Rect {
                x: self.x1,
                y: self.y1,
                width: self.z1,
                height: self.x2,
            }),
            names::BOUNDS => Value::Bounds(Bounds {
                center: Vector3 { x: self.x1, y: self.y1, z: self.z1 },
                size: Vector3 { x: self.x2, y: self.y2, z: self.z2 },
            }),
            names::COLOR => Value::Color(Color {
                r: self.x1,
                g: self.y1,
                b: self.z1,
                a: self.x2,
            }),
            names::CURVE => Value::Curve(self.curve_value.clone()),
            _ => return self.registered_value(types),
        };
        Some(value)
    }

    fn registered_value(&self, types: &TypeRegistry) -> Option<Value> {
        if let Some(variants) = types.enum_variants(&self.type_tag) {
            let ordinal = i32::try_from(self.long_value).ok()?;
            return variants
                .iter()
                .any(|(_, declared)| *declared == ordinal)
                .then(|| Value::Enum {
                    type_ref: self.type_tag.clone(),
                    ordinal,
                });
        }
        if types.is_object_type(&self.type_tag) {
            return Some(Value::Object {
                type_ref: self.type_tag.clone(),
                object: self.object_value.clone(),
            });
        }
        None
    }

    /// Like [`ArgumentValue::value`], but reports why nothing could be read.
    pub fn try_value(&self, types: &TypeRegistry) -> Result<Value, EventError> {
        self.value(types).ok_or_else(|| {
            EventError::Binding(format!(
                "argument tagged '{}' has no readable value",
                self.type_tag
            ))
        })
    }

    /// Typed read.
    pub fn get<A: ArgumentType>(&self, types: &TypeRegistry) -> Option<A> {
        self.value(types).and_then(|value| A::from_value(&value))
    }

    /// Stores `value`, which must be of the tagged type.
    ///
    /// # Errors
    ///
    /// [`EventError::TagMismatch`] when the value's type differs from the tag,
    /// or when an object reference points at an object of another type. The
    /// container is left untouched.
    pub fn set_value(&mut self, value: Value) -> Result<(), EventError> {
        let actual = match &value {
            Value::Object { object: Some(object), .. } => object.type_ref().clone(),
            other => other.type_ref(),
        };
        if !value.matches(&self.type_tag) || actual != self.type_tag {
            return Err(EventError::TagMismatch {
                expected: actual.name().to_string(),
                actual: self.type_tag.name().to_string(),
            });
        }
        self.write(value);
        Ok(())
    }

    /// Typed write.
    pub fn set<A: ArgumentType>(&mut self, value: A) -> Result<(), EventError> {
        self.set_value(value.into_value())
    }

    fn write(&mut self, value: Value) {
        match value {
            Value::Bool(v) => self.long_value = i64::from(v),
            Value::Int(v) => self.long_value = i64::from(v),
            Value::Long(v) => self.long_value = v,
            Value::Float(v) => self.x1 = v,
            Value::Double(v) => self.double_value = v,
            Value::String(v) => self.string_value = v,
            Value::Vector2(v) => self.write_slots([v.x, v.y, 0.0, 0.0]),
            Value::Vector3(v) => self.write_slots([v.x, v.y, v.z, 0.0]),
            Value::Vector4(v) => self.write_slots([v.x, v.y, v.z, v.w]),
            Value::Quaternion(v) => self.write_slots([v.x, v.y, v.z, v.w]),
            Value::Rect(v) => self.write_slots([v.x, v.y, v.width, v.height]),
            Value::Color(v) => self.write_slots([v.r, v.g, v.b, v.a]),
            Value::Bounds(v) => {
                self.write_slots([v.center.x, v.center.y, v.center.z, v.size.x]);
                self.y2 = v.size.y;
                self.z2 = v.size.z;
            }
            Value::Curve(v) => self.curve_value = v,
            Value::Enum { ordinal, .. } => self.long_value = i64::from(ordinal),
            Value::Object { object, .. } => self.object_value = object,
        }
    }

    fn write_slots(&mut self, [x1, y1, z1, x2]: [f32; 4]) {
        self.x1 = x1;
        self.y1 = y1;
        self.z1 = z1;
        self.x2 = x2;
    }
}

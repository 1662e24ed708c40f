//! Dynamic value model.
//!
//! `Value` is the single type flowing through node execution. Accessors
//! follow the constructor/`as_*`/`is_*` convention used throughout the
//! runtime; narrowing accessors are loss-free (an `Int` never reads as a
//! float unless the conversion is exact, a `Float` never reads as int).

use std::fmt;

use crate::intern::InternedString;

/// A dynamically typed runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent/uninitialized value.
    Undefined,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// IEEE 754 double.
    Float(f64),
    /// Interned string.
    Str(InternedString),
}

impl Value {
    /// Create an integer value.
    #[inline]
    pub const fn int(v: i64) -> Self {
        Value::Int(v)
    }

    /// Create a float value.
    #[inline]
    pub const fn float(v: f64) -> Self {
        Value::Float(v)
    }

    /// Create a boolean value.
    #[inline]
    pub const fn bool(v: bool) -> Self {
        Value::Bool(v)
    }

    /// Create a string value from an interned handle.
    #[inline]
    pub fn str(v: impl Into<InternedString>) -> Self {
        Value::Str(v.into())
    }

    /// The undefined value.
    #[inline]
    pub const fn undefined() -> Self {
        Value::Undefined
    }

    /// Extract as integer (exact only).
    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Extract as float. Integers widen when the conversion round-trips.
    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => {
                let f = *v as f64;
                (f as i64 == *v).then_some(f)
            }
            _ => None,
        }
    }

    /// Extract as boolean (no coercion).
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Extract as string handle.
    #[inline]
    pub fn as_str(&self) -> Option<&InternedString> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn is_int(&self) -> bool {
        matches!(self, Value::Int(_))
    }

    #[inline]
    pub fn is_float(&self) -> bool {
        matches!(self, Value::Float(_))
    }

    #[inline]
    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    #[inline]
    pub fn is_str(&self) -> bool {
        matches!(self, Value::Str(_))
    }

    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Human-readable type name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Undefined
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(v) => f.write_str(v.as_str()),
        }
    }
}

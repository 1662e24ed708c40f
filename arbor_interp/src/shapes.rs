//! Operand shape classification.
//!
//! Specializing nodes key their guards on 4-bit value-kind tags; binary
//! sites pack both operand kinds into a single byte for compact guard
//! storage and single-compare checks.
//!
//! Layout of a packed pair:
//! ```text
//! [bits 7-4] left operand kind
//! [bits 3-0] right operand kind
//! ```

use arbor_core::Value;

/// 4-bit kind tag for guard keys.
///
/// Starts at 1; 0 is reserved as the empty sentinel in guard storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueKind {
    Undefined = 1,
    Bool = 2,
    Int = 3,
    Float = 4,
    Str = 5,
    /// Unknown/mixed; forces the generic path.
    Unknown = 15,
}

impl ValueKind {
    /// Classify a value's kind. Hot path; a single tag match.
    #[inline(always)]
    pub fn classify(value: &Value) -> Self {
        match value {
            Value::Undefined => ValueKind::Undefined,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
        }
    }

    /// Pack two kinds into an operand-pair byte.
    #[inline(always)]
    pub const fn pack(left: Self, right: Self) -> OperandShapes {
        OperandShapes(((left as u8) << 4) | (right as u8))
    }
}

/// Packed operand kinds of a binary site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct OperandShapes(pub u8);

impl OperandShapes {
    /// Int + Int (the common case). With Int=3: (3 << 4) | 3.
    pub const INT_INT: Self = OperandShapes(0x33);
    /// Float + Float. With Float=4: (4 << 4) | 4.
    pub const FLOAT_FLOAT: Self = OperandShapes(0x44);
    /// Int + Float.
    pub const INT_FLOAT: Self = OperandShapes(0x34);
    /// Float + Int.
    pub const FLOAT_INT: Self = OperandShapes(0x43);
    /// Str + Str.
    pub const STR_STR: Self = OperandShapes(0x55);

    /// Classify a pair of values.
    #[inline(always)]
    pub fn of(left: &Value, right: &Value) -> Self {
        ValueKind::pack(ValueKind::classify(left), ValueKind::classify(right))
    }

    /// Left operand kind.
    #[inline]
    pub fn left(self) -> ValueKind {
        kind_from_bits((self.0 >> 4) & 0x0F)
    }

    /// Right operand kind.
    #[inline]
    pub fn right(self) -> ValueKind {
        kind_from_bits(self.0 & 0x0F)
    }

    #[inline(always)]
    pub const fn is_int_int(self) -> bool {
        self.0 == Self::INT_INT.0
    }

    #[inline(always)]
    pub const fn is_numeric(self) -> bool {
        let left = (self.0 >> 4) & 0x0F;
        let right = self.0 & 0x0F;
        (left == 3 || left == 4) && (right == 3 || right == 4)
    }

    #[inline(always)]
    pub const fn is_mixed_numeric(self) -> bool {
        self.0 == Self::INT_FLOAT.0 || self.0 == Self::FLOAT_INT.0
    }
}

#[inline]
fn kind_from_bits(bits: u8) -> ValueKind {
    match bits {
        1 => ValueKind::Undefined,
        2 => ValueKind::Bool,
        3 => ValueKind::Int,
        4 => ValueKind::Float,
        5 => ValueKind::Str,
        _ => ValueKind::Unknown,
    }
}

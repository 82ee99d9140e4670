//! Value types and condition codes of the IR.

use strum::{Display, EnumIter, EnumString};

/// The type of an IR value.
///
/// Instructions carry an `Option<DataType>`: `None` is the "no type yet" state of phis and
/// catch-phis whose type is only known once their inputs have been materialized.
///
/// # Examples
///
/// ```rust
/// use irscope::ir::DataType;
///
/// assert_eq!(DataType::Int32.common_type(), DataType::Int64);
/// assert_eq!(DataType::Float32.common_type(), DataType::Float32);
/// assert_eq!(DataType::Reference.to_string(), "ref");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
pub enum DataType {
    /// Boolean, 0 or 1
    #[strum(serialize = "b")]
    Bool,
    /// Unsigned 8-bit integer
    #[strum(serialize = "u8")]
    Uint8,
    /// Signed 8-bit integer
    #[strum(serialize = "i8")]
    Int8,
    /// Unsigned 16-bit integer (characters)
    #[strum(serialize = "u16")]
    Uint16,
    /// Signed 16-bit integer
    #[strum(serialize = "i16")]
    Int16,
    /// Unsigned 32-bit integer
    #[strum(serialize = "u32")]
    Uint32,
    /// Signed 32-bit integer
    #[strum(serialize = "i32")]
    Int32,
    /// Unsigned 64-bit integer
    #[strum(serialize = "u64")]
    Uint64,
    /// Signed 64-bit integer
    #[strum(serialize = "i64")]
    Int64,
    /// IEEE 754 single precision
    #[strum(serialize = "f32")]
    Float32,
    /// IEEE 754 double precision
    #[strum(serialize = "f64")]
    Float64,
    /// Managed object reference
    #[strum(serialize = "ref")]
    Reference,
    /// Raw pointer (resolved method or class addresses)
    #[strum(serialize = "ptr")]
    Pointer,
    /// No value
    #[strum(serialize = "void")]
    Void,
    /// Tagged value of a dynamic language
    #[strum(serialize = "any")]
    Any,
}

impl DataType {
    /// Returns true for boolean, integer and floating point types.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        self.is_integral() || self.is_float()
    }

    /// Returns true for boolean and integer types.
    #[must_use]
    pub const fn is_integral(self) -> bool {
        matches!(
            self,
            DataType::Bool
                | DataType::Uint8
                | DataType::Int8
                | DataType::Uint16
                | DataType::Int16
                | DataType::Uint32
                | DataType::Int32
                | DataType::Uint64
                | DataType::Int64
        )
    }

    /// Returns true for `Float32` and `Float64`.
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    /// Returns true for managed references.
    #[must_use]
    pub const fn is_reference(self) -> bool {
        matches!(self, DataType::Reference)
    }

    /// Returns true for types occupying 64 bits.
    #[must_use]
    pub const fn is_64_bits(self) -> bool {
        matches!(
            self,
            DataType::Uint64 | DataType::Int64 | DataType::Float64 | DataType::Pointer
        )
    }

    /// The type two values must share to be merged by a phi.
    ///
    /// All integral types collapse to `Int64`, every other type is its own common type.
    #[must_use]
    pub const fn common_type(self) -> DataType {
        if self.is_integral() {
            DataType::Int64
        } else {
            self
        }
    }
}

/// Condition codes used by `Compare`, `If` and `IfImm`.
///
/// `B`, `Be`, `A` and `Ae` are the unsigned comparisons (below, below or equal, above,
/// above or equal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "UPPERCASE")]
#[allow(missing_docs)]
pub enum ConditionCode {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    B,
    Be,
    A,
    Ae,
}

impl ConditionCode {
    /// The condition that holds exactly when `self` does not.
    #[must_use]
    pub const fn inverse(self) -> ConditionCode {
        match self {
            ConditionCode::Eq => ConditionCode::Ne,
            ConditionCode::Ne => ConditionCode::Eq,
            ConditionCode::Lt => ConditionCode::Ge,
            ConditionCode::Le => ConditionCode::Gt,
            ConditionCode::Gt => ConditionCode::Le,
            ConditionCode::Ge => ConditionCode::Lt,
            ConditionCode::B => ConditionCode::Ae,
            ConditionCode::Be => ConditionCode::A,
            ConditionCode::A => ConditionCode::Be,
            ConditionCode::Ae => ConditionCode::B,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_common_type() {
        for ty in DataType::iter() {
            if ty.is_integral() {
                assert_eq!(ty.common_type(), DataType::Int64, "{ty}");
            } else {
                assert_eq!(ty.common_type(), ty, "{ty}");
            }
        }
    }

    #[test]
    fn test_classification() {
        assert!(DataType::Bool.is_numeric());
        assert!(DataType::Float64.is_numeric());
        assert!(!DataType::Reference.is_numeric());
        assert!(!DataType::Any.is_numeric());
        assert!(DataType::Pointer.is_64_bits());
        assert!(!DataType::Int32.is_64_bits());
    }

    #[test]
    fn test_type_names() {
        assert_eq!(DataType::Uint16.to_string(), "u16");
        assert_eq!(DataType::from_str("f64").ok(), Some(DataType::Float64));
        assert_eq!(ConditionCode::Be.to_string(), "BE");
    }

    #[test]
    fn test_inverse_condition() {
        for cc in ConditionCode::iter() {
            assert_eq!(cc.inverse().inverse(), cc);
            assert_ne!(cc.inverse(), cc);
        }
    }
}

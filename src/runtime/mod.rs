//! The interface between the builder and the virtual machine.
//!
//! The builder never inspects class files itself. Everything it needs to know about
//! methods, fields, classes and literal arrays is asked through [`RuntimeInterface`]. A
//! failed resolution is not an error: the builder falls back to runtime resolution and
//! records a slot in the [`UnresolvedTypes`] table.
//!
//! [`StaticRuntime`] is a table-driven implementation for embedders that already know the
//! shape of the program, and for tests.

mod table;
mod unresolved;

use std::fmt;

use strum::{Display, EnumIter};

use crate::ir::DataType;

pub use table::{FieldDesc, MethodDesc, StaticRuntime};
pub use unresolved::{SlotKind, UnresolvedTypes};

macro_rules! runtime_handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw runtime handle.
            #[must_use]
            pub const fn new(raw: u64) -> Self {
                $name(raw)
            }

            /// The raw runtime handle.
            #[must_use]
            pub const fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

runtime_handle!(
    /// Opaque handle of a resolved method.
    MethodPtr,
    "method"
);
runtime_handle!(
    /// Opaque handle of a resolved field.
    FieldPtr,
    "field"
);
runtime_handle!(
    /// Opaque handle of a resolved class.
    ClassPtr,
    "class"
);

/// Methods the builder expands inline instead of calling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[allow(missing_docs)]
pub enum IntrinsicId {
    MathAbsI32,
    MathAbsI64,
    MathAbsF32,
    MathAbsF64,
    MathSqrtF32,
    MathSqrtF64,
    MathMinI32,
    MathMinI64,
    MathMinF32,
    MathMinF64,
    MathMaxI32,
    MathMaxI64,
    MathMaxF32,
    MathMaxF64,
    FloatIsNan,
    DoubleIsNan,
    StringLength,
    StringIsEmpty,
    CharIsUpperCase,
    CharToUpperCase,
    CharIsLowerCase,
    CharToLowerCase,
    ObjectMonitorEnter,
    ObjectMonitorExit,
    /// A runtime intrinsic without an inline expansion
    #[strum(to_string = "Other({0})")]
    Other(u32),
}

impl IntrinsicId {
    /// Returns true if the generic `Intrinsic` instruction needs a save state input, i.e.
    /// the intrinsic can call back into the runtime.
    #[must_use]
    pub const fn requires_state(self) -> bool {
        matches!(self, IntrinsicId::Other(_))
    }
}

/// A resolved field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedField {
    /// Field handle
    pub field: FieldPtr,
    /// Declaring class
    pub class: ClassPtr,
    /// Type id of the declaring class in the caller's bytecode
    pub class_id: u32,
    /// Accesses must be volatile
    pub volatile: bool,
}

/// One element of a literal array.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    /// Integer element of any width
    Int(i64),
    /// `f32` element
    Float32(f32),
    /// `f64` element
    Float64(f64),
    /// String element, by string id
    String(u32),
}

/// Constant array stored in the program, loaded by `lda.const`.
#[derive(Debug, Clone, PartialEq)]
pub struct LiteralArray {
    /// Type id of the array class
    pub type_id: u32,
    /// Element type; `Reference` for string arrays
    pub component: DataType,
    /// Elements
    pub values: Vec<Literal>,
}

/// Queries the builder issues against the virtual machine.
///
/// The interface is shared by all threads building graphs concurrently, hence `Send + Sync`.
/// Implementations must tolerate concurrent read-only queries; the only mutation,
/// [`UnresolvedTypes::add_table_slot`], is synchronized by the table itself.
///
/// Methods taking a `caller` and an `id` interpret the id in the context of the caller's
/// bytecode.
pub trait RuntimeInterface: Send + Sync {
    /// Printable name of a method.
    fn method_name(&self, method: MethodPtr) -> String {
        method.to_string()
    }

    /// Number of registers of a method, arguments excluded.
    fn registers_count(&self, method: MethodPtr) -> usize;

    /// Number of arguments of a method, including `this`.
    fn arguments_count(&self, method: MethodPtr) -> usize;

    /// Type of argument `index`, with `this` as argument 0 of instance methods.
    fn argument_type(&self, method: MethodPtr, index: usize) -> DataType;

    /// Return type of a method.
    fn return_type(&self, method: MethodPtr) -> DataType;

    /// Returns true for static methods.
    fn is_method_static(&self, method: MethodPtr) -> bool;

    /// Returns true for methods of a dynamic language, which carry environment slots.
    fn is_dynamic_method(&self, _method: MethodPtr) -> bool {
        false
    }

    /// Type id of the class declaring `method`.
    fn class_id_of_method(&self, method: MethodPtr) -> u32;

    /// Resolves a callee.
    fn resolve_method(&self, caller: MethodPtr, method_id: u32) -> Option<MethodPtr>;

    /// Returns true if the callee is static, resolved or not.
    fn is_method_static_by_id(&self, caller: MethodPtr, method_id: u32) -> bool;

    /// Number of declared arguments of a callee, `this` excluded.
    fn method_arguments_count_by_id(&self, caller: MethodPtr, method_id: u32) -> usize;

    /// Type of declared argument `index` of a callee, `this` excluded.
    fn method_argument_type_by_id(&self, caller: MethodPtr, method_id: u32, index: usize)
        -> DataType;

    /// Return type of a callee.
    fn method_return_type_by_id(&self, caller: MethodPtr, method_id: u32) -> DataType;

    /// Type id of the class declaring a callee.
    fn class_id_of_method_id(&self, caller: MethodPtr, method_id: u32) -> u32;

    /// Returns true for methods declared by an interface.
    fn is_interface_method(&self, _method: MethodPtr) -> bool {
        false
    }

    /// Intrinsic the callee maps to, if any.
    fn intrinsic_id(&self, _caller: MethodPtr, _method_id: u32) -> Option<IntrinsicId> {
        None
    }

    /// Resolves a field.
    fn resolve_field(&self, caller: MethodPtr, field_id: u32, is_static: bool)
        -> Option<ResolvedField>;

    /// Type of a field, resolved or not.
    fn field_type_by_id(&self, caller: MethodPtr, field_id: u32) -> DataType;

    /// Type id of the class declaring a field, resolved or not.
    fn field_class_id_by_id(&self, caller: MethodPtr, field_id: u32) -> u32;

    /// Resolves a class.
    fn resolve_class(&self, caller: MethodPtr, type_id: u32) -> Option<ClassPtr>;

    /// Component type of an array class.
    fn array_component_type(&self, _caller: MethodPtr, _type_id: u32) -> DataType {
        DataType::Reference
    }

    /// A literal array.
    fn literal_array(&self, caller: MethodPtr, id: u32) -> Option<LiteralArray>;

    /// Returns true when strings store their length shifted by a compression bit.
    fn is_compressed_strings_enabled(&self) -> bool {
        false
    }

    /// Registry of runtime-resolution slots.
    fn unresolved_types(&self) -> &UnresolvedTypes;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles() {
        let method = MethodPtr::new(7);
        assert_eq!(method.raw(), 7);
        assert_eq!(method.to_string(), "method#7");
        assert_eq!(ClassPtr::new(3).to_string(), "class#3");
    }

    #[test]
    fn test_intrinsic_requires_state() {
        assert!(IntrinsicId::Other(4).requires_state());
        assert!(!IntrinsicId::MathAbsI32.requires_state());
        assert_eq!(IntrinsicId::Other(4).to_string(), "Other(4)");
    }
}

//! IR instruction opcodes.

use strum::{Display, EnumIter, IntoStaticStr};

/// Opcode of an IR instruction.
///
/// Opcodes are grouped by concern: graph structure (constants, parameters, phis and save
/// states), arithmetic, control flow, runtime checks, memory access, class and type loading,
/// and calls. Resolution of unresolved symbols is modelled by separate `Resolve*`
/// instructions feeding `*Resolved*` users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[allow(missing_docs)]
pub enum Opcode {
    // Graph structure
    Constant,
    Parameter,
    NullPtr,
    Phi,
    CatchPhi,
    SaveState,
    SafePoint,
    SaveStateDeoptimize,
    SaveStateOsr,

    // Arithmetic and logic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    AShr,
    Neg,
    Not,
    Abs,
    Sqrt,
    Min,
    Max,
    Cast,
    Cmp,
    Compare,

    // Control flow
    If,
    IfImm,
    Return,
    ReturnVoid,
    Throw,

    // Checks
    NullCheck,
    BoundsCheck,
    NegativeCheck,
    ZeroCheck,
    RefTypeCheck,

    // Arrays
    LoadArray,
    StoreArray,
    LenArray,
    NewArray,
    FillConstArray,
    LoadConstArray,

    // Objects and fields
    NewObject,
    LoadObject,
    StoreObject,
    ResolveObjectField,
    LoadResolvedObjectField,
    StoreResolvedObjectField,
    LoadStatic,
    StoreStatic,
    ResolveObjectFieldStatic,
    LoadResolvedObjectFieldStatic,
    StoreResolvedObjectFieldStatic,
    UnresolvedStoreStatic,
    Monitor,

    // Classes and types
    InitClass,
    LoadAndInitClass,
    UnresolvedLoadAndInitClass,
    LoadClass,
    LoadType,
    UnresolvedLoadType,
    LoadString,
    CheckCast,
    IsInstance,

    // Calls
    CallStatic,
    CallVirtual,
    ResolveStatic,
    ResolveVirtual,
    CallResolvedStatic,
    CallResolvedVirtual,
    Intrinsic,

    // Dynamic method environment
    LoadConstantPool,
    LoadLexicalEnv,
    LoadFromConstantPool,
}

impl Opcode {
    /// Returns true for all save-state flavours.
    #[must_use]
    pub const fn is_save_state(self) -> bool {
        matches!(
            self,
            Opcode::SaveState
                | Opcode::SafePoint
                | Opcode::SaveStateDeoptimize
                | Opcode::SaveStateOsr
        )
    }

    /// Returns true for `Phi` and `CatchPhi`.
    #[must_use]
    pub const fn is_phi_like(self) -> bool {
        matches!(self, Opcode::Phi | Opcode::CatchPhi)
    }

    /// Returns true for runtime checks, which throw instead of their user.
    #[must_use]
    pub const fn is_check(self) -> bool {
        matches!(
            self,
            Opcode::NullCheck
                | Opcode::BoundsCheck
                | Opcode::NegativeCheck
                | Opcode::ZeroCheck
                | Opcode::RefTypeCheck
        )
    }

    /// Returns true for instructions that end a basic block.
    #[must_use]
    pub const fn is_terminator(self) -> bool {
        matches!(
            self,
            Opcode::If | Opcode::IfImm | Opcode::Return | Opcode::ReturnVoid | Opcode::Throw
        )
    }

    /// Returns true for calls of any resolution kind, intrinsics excluded.
    #[must_use]
    pub const fn is_call(self) -> bool {
        matches!(
            self,
            Opcode::CallStatic
                | Opcode::CallVirtual
                | Opcode::CallResolvedStatic
                | Opcode::CallResolvedVirtual
        )
    }

    /// Returns true for instructions that may raise an exception and therefore feed the
    /// catch-phis of every handler covering them.
    #[must_use]
    pub const fn can_throw(self) -> bool {
        self.is_check()
            || self.is_call()
            || matches!(
                self,
                Opcode::Throw
                    | Opcode::NewArray
                    | Opcode::NewObject
                    | Opcode::FillConstArray
                    | Opcode::LoadConstArray
                    | Opcode::ResolveObjectField
                    | Opcode::ResolveObjectFieldStatic
                    | Opcode::UnresolvedStoreStatic
                    | Opcode::InitClass
                    | Opcode::LoadAndInitClass
                    | Opcode::UnresolvedLoadAndInitClass
                    | Opcode::LoadClass
                    | Opcode::UnresolvedLoadType
                    | Opcode::LoadString
                    | Opcode::CheckCast
                    | Opcode::IsInstance
                    | Opcode::ResolveStatic
                    | Opcode::ResolveVirtual
                    | Opcode::Intrinsic
                    | Opcode::Monitor
            )
    }

    /// Returns true for instructions that must never be removed by dead code elimination
    /// even without users.
    #[must_use]
    pub const fn has_side_effects(self) -> bool {
        self.can_throw()
            || self.is_terminator()
            || matches!(
                self,
                Opcode::StoreArray
                    | Opcode::StoreObject
                    | Opcode::StoreResolvedObjectField
                    | Opcode::StoreStatic
                    | Opcode::StoreResolvedObjectFieldStatic
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_opcode_groups_are_disjoint() {
        for opcode in Opcode::iter() {
            assert!(!(opcode.is_save_state() && opcode.is_phi_like()), "{opcode}");
            assert!(!(opcode.is_save_state() && opcode.can_throw()), "{opcode}");
            if opcode.is_check() {
                assert!(opcode.can_throw(), "{opcode}");
            }
        }
    }

    #[test]
    fn test_opcode_names() {
        assert_eq!(Opcode::CallResolvedStatic.to_string(), "CallResolvedStatic");
        let name: &'static str = Opcode::SaveStateOsr.into();
        assert_eq!(name, "SaveStateOsr");
    }
}

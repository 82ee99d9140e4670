//! Builder configuration
//!
//! Limits and switches that shape the graph produced by [`IrBuilder`](crate::builder::IrBuilder).
//! The compilation mode itself (AOT, OSR) is part of [`GraphMode`](crate::ir::GraphMode).

/// Configuration of one graph build.
///
/// # Examples
///
/// ```rust
/// use irscope::builder::BuilderOptions;
///
/// let options = BuilderOptions {
///     unfold_const_array_max_size: 0,
///     ..BuilderOptions::default()
/// };
/// assert!(options.use_safepoint);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct BuilderOptions {
    /// Largest accepted method, in bytes of bytecode (default: 30000)
    pub max_bytecode_size: usize,

    /// Largest accepted number of registers plus arguments plus accumulator (default: 8192)
    /// Must not exceed `VirtualRegister::MAX_NUM_VIRT_REGS`
    pub max_vregs_num: usize,

    /// Emit `SafePoint`s in the start block and at loop headers (default: true)
    pub use_safepoint: bool,

    /// Expand calls to known intrinsics inline (default: true)
    pub encode_intrinsics: bool,

    /// Constant arrays up to this many elements are unfolded into element stores
    /// (default: 1000)
    pub unfold_const_array_max_size: usize,

    /// Treat every method, field and class as unresolved (default: false)
    /// Exercises the runtime-resolution paths
    pub force_unresolved: bool,

    /// Keep every value in every save state (default: false)
    /// Skips save-state pruning in the phi resolver
    pub non_optimizing: bool,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            max_bytecode_size: 30000,
            max_vregs_num: 8192,
            use_safepoint: true,
            encode_intrinsics: true,
            unfold_const_array_max_size: 1000,
            force_unresolved: false,
            non_optimizing: false,
        }
    }
}

impl BuilderOptions {
    /// Configuration for a baseline compiler: no intrinsics and no save-state pruning.
    #[must_use]
    pub fn non_optimizing() -> Self {
        Self {
            encode_intrinsics: false,
            non_optimizing: true,
            ..Self::default()
        }
    }

    /// Configuration that routes every symbol through runtime resolution.
    #[must_use]
    pub fn unresolved_stress() -> Self {
        Self {
            force_unresolved: true,
            ..Self::default()
        }
    }
}

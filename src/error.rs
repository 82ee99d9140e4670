use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Building a graph is all-or-nothing: when any of these errors is returned, the partially
/// built graph has already been dropped. Failures to resolve methods, fields or classes at
/// compile time are deliberately *not* errors; they produce runtime-resolution instruction
/// shapes instead.
///
/// # Error Categories
///
/// ## Input Errors
/// - [`Error::Malformed`] - Bytecode with missing operands, bad jump targets or broken try ranges
/// - [`Error::UndefinedRegister`] - A virtual register was read before any definition reached it
///
/// ## Method Limitations
/// - [`Error::MethodTooLarge`] - Bytecode size exceeds the configured maximum
/// - [`Error::TooManyVRegs`] - Method uses more virtual registers than allowed
/// - [`Error::VRegLimitTooBig`] - Configured register limit exceeds the hard maximum
/// - [`Error::TooManyTryBlocks`] - Method has more try blocks than supported
/// - [`Error::OsrNotSupported`] - Method shape cannot be compiled for on-stack replacement
///
/// ## Graph Errors
/// - [`Error::GraphError`] - Control flow graph could not be analyzed
/// - [`Error::VerificationFailed`] - The graph checker found an inconsistency
///
/// # Examples
///
/// ```rust,ignore
/// use irscope::{prelude::*, Error};
///
/// match IrBuilder::new(&runtime, method, &code).build() {
///     Ok(graph) => println!("{graph}"),
///     Err(Error::UndefinedRegister { vreg, pc }) => {
///         eprintln!("v{vreg} read before definition at pc {pc}");
///     }
///     Err(e) => eprintln!("compilation rejected: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The bytecode is damaged and could not be translated.
    ///
    /// The error includes the source location where the malformation was detected for
    /// debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A virtual register was read on a path where it was never written.
    ///
    /// This is the only structural failure of the instruction builder. Once raised, the
    /// builder's failure flag stays set and the graph must be discarded.
    #[error("register v{vreg} is read before being defined at pc {pc:#x}")]
    UndefinedRegister {
        /// Index of the virtual register that was read
        vreg: usize,
        /// Bytecode offset of the reading instruction
        pc: u32,
    },

    /// The method bytecode is larger than [`BuilderOptions::max_bytecode_size`](crate::builder::BuilderOptions::max_bytecode_size).
    #[error("Method is too big: size={size}, limit={limit}")]
    MethodTooLarge {
        /// Size of the method bytecode in bytes
        size: usize,
        /// Configured limit
        limit: usize,
    },

    /// The method uses too many virtual registers.
    #[error("Method has too many virtual registers: count={count}, limit={limit}")]
    TooManyVRegs {
        /// Registers plus arguments used by the method
        count: usize,
        /// Configured limit
        limit: usize,
    },

    /// The configured register limit is above what a virtual register can encode.
    #[error("Virtual register limit {limit} is greater than the maximum {max}")]
    VRegLimitTooBig {
        /// Configured limit
        limit: usize,
        /// Hard maximum
        max: usize,
    },

    /// The method declares more try blocks than the builder supports.
    #[error("Method has too many try blocks: count={count}, limit={limit}")]
    TooManyTryBlocks {
        /// Number of try blocks in the method
        count: usize,
        /// Supported maximum
        limit: usize,
    },

    /// The method cannot be compiled in on-stack-replacement mode.
    #[error("OSR compilation is not supported: {0}")]
    OsrNotSupported(String),

    /// Error during control flow graph construction or analysis.
    #[error("{0}")]
    GraphError(String),

    /// The graph checker detected an inconsistent graph.
    #[error("Graph verification failed: {0}")]
    VerificationFailed(String),
}

use thiserror::Error;

use crate::{
    emulation::Register,
    stubs::{Abi, Architecture, Library},
};

macro_rules! emulation_fault {
    // Single string version
    ($address:expr, $msg:literal) => {
        crate::Error::EmulationFault {
            address: $address,
            reason: format!($msg),
        }
    };

    // Format string with arguments version
    ($address:expr, $fmt:literal, $($arg:tt)*) => {
        crate::Error::EmulationFault {
            address: $address,
            reason: format!($fmt, $($arg)*),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every variant terminates the current operation. Nothing in this crate converts an error
/// into a default or best-effort value, and the driver never retries.
///
/// # Error Categories
///
/// ## Registry Errors
/// - [`Error::NotSupported`] - No stub set registered for the requested target
/// - [`Error::UnknownSymbol`] - The stub set does not implement the requested function
///
/// ## Calling Convention Errors
/// - [`Error::InvalidArgumentWidth`] - Value or width does not fit the ABI's argument slot
/// - [`Error::AbiMismatch`] - ABI used against a context of another architecture
///
/// ## Emulation Errors
/// - [`Error::EmulationFault`] - The engine could not execute an instruction
/// - [`Error::EmulationTimeout`] - The driver's step budget was exhausted
/// - [`Error::InvalidRegister`] - Register name does not exist on the architecture
///
/// # Examples
///
/// ```rust
/// use stubscope::{lookup, Abi, Architecture, Error, Library};
///
/// match lookup(Architecture::X86, Abi::SysVAmd64, Library::Libc) {
///     Ok(_) => unreachable!(),
///     Err(Error::NotSupported { architecture, abi, .. }) => {
///         println!("no stubs for {architecture}/{abi}");
///     }
///     Err(e) => println!("Other error: {e}"),
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The requested (architecture, ABI, library) triple has no registered stub set.
    ///
    /// Registration is static, so this never resolves itself by retrying.
    #[error("No stub set registered for {architecture}/{abi}/{library}")]
    NotSupported {
        /// The requested architecture
        architecture: Architecture,
        /// The requested calling convention
        abi: Abi,
        /// The requested library
        library: Library,
    },

    /// The requested function is not part of the stub set's symbol table.
    #[error("Unknown stub symbol - {0}")]
    UnknownSymbol(String),

    /// A value was marshaled with a width that does not match the ABI's argument slot.
    ///
    /// Raised both for an explicit width that differs from the architecture's word size and
    /// for a value that needs more bytes than one slot provides. Values are never truncated.
    #[error("Argument of {width} bytes does not fit a {expected}-byte slot")]
    InvalidArgumentWidth {
        /// Width in bytes that was requested or that the value requires
        width: usize,
        /// Width in bytes of one argument slot
        expected: usize,
    },

    /// A calling convention was used with a context of a different architecture.
    #[error("ABI {abi} can not be used on {architecture}")]
    AbiMismatch {
        /// The calling convention that was requested
        abi: Abi,
        /// The architecture of the execution context
        architecture: Architecture,
    },

    /// The execution engine reported a fault while stepping an instruction.
    ///
    /// Stub code is trusted, so a fault points at the setup: a wrong base address, an entry
    /// outside the installed blob, or corrupted memory.
    #[error("Emulation fault at 0x{address:x}: {reason}")]
    EmulationFault {
        /// Address of the faulting instruction
        address: u64,
        /// Description of the fault
        reason: String,
    },

    /// The driver executed its maximum number of steps without reaching the sentinel.
    #[error("Emulation exceeded its step budget ({executed} of {limit} steps)")]
    EmulationTimeout {
        /// Steps executed before giving up
        executed: u64,
        /// The configured step budget
        limit: u64,
    },

    /// The register does not exist on the context's architecture.
    #[error("Register {register} does not exist on {architecture}")]
    InvalidRegister {
        /// The requested register
        register: Register,
        /// The architecture of the execution context
        architecture: Architecture,
    },
}

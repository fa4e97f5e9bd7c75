//! # stubscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the stubscope library. Import this module to get quick access to everything needed
//! to look up, install and invoke stubs.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all stubscope operations
pub use crate::Error;

/// The result type used throughout stubscope
pub use crate::Result;

// ================================================================================================
// Stub Registry
// ================================================================================================

/// Registry key components
pub use crate::stubs::{Abi, Architecture, Library};

/// Stub sets and the process-wide catalog
pub use crate::stubs::{StubRegistry, StubSet, SymbolTable};

/// Registry entry points
pub use crate::stubs::{install, lookup};

// ================================================================================================
// Emulation
// ================================================================================================

/// The engine interface and its register names
pub use crate::emulation::{ExecutionContext, Register};

/// Calling conventions
pub use crate::emulation::{ArgumentPassing, CallingConvention};

/// Driver, its configuration and results
pub use crate::emulation::{invoke, Completion, Driver, DriverConfig, Invocation, SENTINEL};

/// Reference engine
pub use crate::emulation::{Flags, X86Machine};

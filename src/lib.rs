// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # stubscope
//!
//! Precompiled libc stubs for binary emulators, and the driver that runs them.
//!
//! When an emulated binary calls `strlen`, `strcmp` or `memcpy`, the C runtime is usually
//! not part of the analyzed image. `stubscope` ships small, position independent machine
//! code implementations of such functions for every supported (architecture, ABI) pair,
//! installs them into the emulator's memory, and runs them with a fetch/step loop until the
//! stub returns.
//!
//! ## Features
//!
//! - **Stub catalog** - Relocatable libc stubs for System V i386 and System V AMD64
//! - **Calling conventions** - Stack and register argument passing with an explicit sentinel
//!   return address
//! - **Engine agnostic** - The driver only needs the [`ExecutionContext`] trait
//! - **Bounded execution** - Step budget with [`Error::EmulationTimeout`]
//! - **Reference engine** - [`X86Machine`], an `iced-x86` based interpreter for 32- and
//!   64-bit x86
//!
//! ## Quick Start
//!
//! ```rust
//! use stubscope::prelude::*;
//!
//! let stubs = lookup(Architecture::X86, Abi::SysVI386, Library::Libc)?;
//! let mut machine = X86Machine::new(Architecture::X86);
//! let base = install(stubs, 0x6660_0000, &mut machine)?;
//!
//! machine.set_register(Register::Esp, 0x7fff_fff0)?;
//! machine.set_memory(0x1000, b"trIton StuBS\0")?;
//! machine.set_memory(0x2000, b"TritOn stUbS\0")?;
//!
//! let result = invoke(
//!     stubs.entry(base, "strncasecmp")?,
//!     &mut machine,
//!     Abi::SysVI386,
//!     &[0x1000, 0x2000, 12],
//! )?;
//! assert_eq!(result, 0);
//! # Ok::<(), stubscope::Error>(())
//! ```
//!
//! ## Modules
//!
//! - [`stubs`] - The stub registry, stub sets and their symbol tables
//! - [`emulation`] - Execution context trait, calling conventions, driver and reference engine
//! - [`prelude`] - Convenient re-exports
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade: `debug` per invocation and stub set
//! installation, `trace` per executed instruction, `warn` when the step budget runs out.
//! No logger is installed by the library.

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use stubscope::prelude::*;
///
/// let stubs = lookup(Architecture::X86_64, Abi::SysVAmd64, Library::Libc)?;
/// assert!(stubs.symbols().contains("strlen"));
/// # Ok::<(), stubscope::Error>(())
/// ```
pub mod prelude;

pub mod emulation;
pub mod stubs;

/// `stubscope` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `stubscope` Error type
///
/// Every fallible operation of the crate reports one of its variants.
pub use error::Error;

pub use emulation::{
    invoke, CallingConvention, Completion, Driver, DriverConfig, ExecutionContext, Register,
    X86Machine, SENTINEL,
};
pub use stubs::{install, lookup, Abi, Architecture, Library, StubRegistry, StubSet};

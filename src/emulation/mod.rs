//! Stub execution: calling conventions, the driver loop and a reference engine.
//!
//! This module runs code from a [`crate::stubs::StubSet`] inside an execution context. It
//! never interprets instructions itself; it decides *which* code runs, sets up the call
//! frame, and decides *when to stop*.
//!
//! # Architecture
//!
//! ```text
//! invoke(entry, ctx, abi, args)
//!   │
//!   ├─► CallingConvention::of(abi).prepare_call()   marshal args, plant sentinel
//!   ├─► Driver::run()                               fetch 16 bytes ─► ctx.step() ─► ip == 0?
//!   ├─► CallingConvention::return_value()           rax / eax
//!   └─► restore caller stack pointer
//! ```
//!
//! # Key Components
//!
//! - [`ExecutionContext`] - The engine interface: memory, registers, single step
//! - [`CallingConvention`] - Per-ABI argument marshaling and return register
//! - [`Driver`] / [`DriverConfig`] - The fetch/step loop and its step budget
//! - [`X86Machine`] - Reference engine for 32- and 64-bit x86 built on `iced-x86`
//!
//! # Termination
//!
//! Every invocation pushes [`SENTINEL`] (address 0) as the return address, for stack and
//! register passing ABIs alike. The stub's final `ret` pops it into the instruction
//! pointer and the driver halts. Address 0 must therefore never hold stub code.

mod config;
mod context;
mod convention;
mod driver;
mod machine;

pub use config::{DriverConfig, DEFAULT_FETCH_SIZE, DEFAULT_MAX_STEPS};
pub use context::{ExecutionContext, Register};
pub use convention::{ArgumentPassing, CallingConvention, STACK_ALIGNMENT};
pub use driver::{invoke, Completion, Driver, Invocation, SENTINEL};
pub use machine::{Flags, X86Machine, PAGE_SIZE};

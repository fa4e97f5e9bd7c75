//! The stub driver: runs one stub invocation to completion.
//!
//! The driver is a two-state machine. It starts *Running* with the instruction pointer at
//! the stub's entry and repeats:
//!
//! 1. fetch [`DriverConfig::fetch_size`] bytes at the instruction pointer,
//! 2. hand them to [`ExecutionContext::step`],
//! 3. re-read the instruction pointer and stop (*Halted*) once it equals [`SENTINEL`].
//!
//! The sentinel is planted as the return address by the calling convention, so the stub's
//! final `ret` is what ends the run. A stub that never returns is cut off by the step
//! budget with [`Error::EmulationTimeout`].

use log::{debug, trace, warn};

use crate::{
    emulation::{CallingConvention, DriverConfig, ExecutionContext},
    stubs::Abi,
    Error, Result,
};

/// Return address planted for every invocation; reaching it ends the run.
pub const SENTINEL: u64 = 0;

/// Frame of one stub invocation, produced by [`CallingConvention::prepare_call`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation {
    /// Address of the stub's first instruction
    pub entry: u64,
    /// Stack pointer before any argument was marshaled
    pub caller_stack_pointer: u64,
    /// Stack pointer the stub starts with; points at the return address
    pub entry_stack_pointer: u64,
    /// The return address planted on the stack (always [`SENTINEL`])
    pub return_address: u64,
}

/// Outcome of a completed invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Contents of the ABI's return register
    pub value: u64,
    /// Instructions executed until the sentinel was reached
    pub steps: u64,
}

/// Runs stubs on an [`ExecutionContext`].
///
/// # Example
///
/// ```rust
/// use stubscope::{install, lookup, Abi, Architecture, Driver, DriverConfig, ExecutionContext, Library, X86Machine};
///
/// let stubs = lookup(Architecture::X86, Abi::SysVI386, Library::Libc)?;
/// let mut machine = X86Machine::new(Architecture::X86);
/// let base = install(stubs, 0x6660_0000, &mut machine)?;
/// machine.set_register(stubscope::Register::Esp, 0x7fff_fff0)?;
/// machine.set_memory(0x1000, b"stub\0")?;
///
/// let driver = Driver::new(DriverConfig::default().with_max_steps(1_000));
/// let completion = driver.call(&mut machine, Abi::SysVI386, stubs.entry(base, "strlen")?, &[0x1000])?;
/// assert_eq!(completion.value, 4);
/// # Ok::<(), stubscope::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Driver {
    config: DriverConfig,
}

impl Driver {
    /// Creates a driver with the given configuration.
    #[must_use]
    pub fn new(config: DriverConfig) -> Self {
        Self { config }
    }

    /// The driver's configuration.
    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Steps `ctx` from `entry` until the instruction pointer reaches [`SENTINEL`].
    ///
    /// The stack must already hold the sentinel return address. An `entry` equal to the
    /// sentinel executes nothing.
    ///
    /// # Returns
    ///
    /// The number of executed instructions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmulationTimeout`] once the step budget is exhausted and propagates
    /// every error of the context, in particular [`Error::EmulationFault`], unchanged.
    pub fn run<C>(&self, ctx: &mut C, entry: u64) -> Result<u64>
    where
        C: ExecutionContext + ?Sized,
    {
        let ip_register = ctx.architecture().instruction_pointer();
        ctx.set_register(ip_register, entry)?;

        let mut steps = 0u64;
        let mut pc = entry;
        while pc != SENTINEL {
            if self.config.is_bounded() && steps >= self.config.max_steps {
                warn!(
                    "stub at 0x{entry:x} did not return within {} steps (stopped at 0x{pc:x})",
                    self.config.max_steps
                );
                return Err(Error::EmulationTimeout {
                    executed: steps,
                    limit: self.config.max_steps,
                });
            }

            let window = ctx.get_memory(pc, self.config.fetch_size)?;
            ctx.step(pc, &window)?;
            steps += 1;

            pc = ctx.get_register(ip_register)?;
            trace!("step {steps}: next 0x{pc:x}");
        }

        Ok(steps)
    }

    /// Invokes the stub at `entry` with `args` marshaled per `abi`.
    ///
    /// Arguments go directly below the current stack pointer unless
    /// [`DriverConfig::stack_alignment`] asks for an aligned argument area. With an empty
    /// `args` only the sentinel is pushed, completing a frame built with
    /// [`CallingConvention::push`].
    ///
    /// After the stub returned, the caller's stack pointer is restored (unless
    /// [`DriverConfig::restore_stack`] is off), so repeated calls on one context start from
    /// the same stack. On error the context is left as the failing step left it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AbiMismatch`] and [`Error::InvalidArgumentWidth`] from marshaling,
    /// [`Error::EmulationTimeout`] from the step budget, and propagates context errors.
    pub fn call<C>(&self, ctx: &mut C, abi: Abi, entry: u64, args: &[u64]) -> Result<Completion>
    where
        C: ExecutionContext + ?Sized,
    {
        let convention = CallingConvention::of(abi);
        let invocation =
            convention.prepare_aligned_call(ctx, entry, args, self.config.stack_alignment)?;
        debug!(
            "invoking 0x{entry:x} ({abi}) with {} args, sp 0x{:x}",
            args.len(),
            invocation.entry_stack_pointer
        );

        let steps = self.run(ctx, invocation.entry)?;
        let value = convention.return_value(ctx)?;
        if self.config.restore_stack {
            ctx.set_register(convention.stack_pointer(), invocation.caller_stack_pointer)?;
        }

        debug!("0x{entry:x} returned 0x{value:x} after {steps} steps");
        Ok(Completion { value, steps })
    }
}

/// Invokes a stub with the default [`DriverConfig`] and returns the ABI return register.
///
/// # Arguments
///
/// * `entry` - Absolute entry address (install base plus symbol offset)
/// * `ctx` - Execution context the stub set was installed into
/// * `abi` - Calling convention the stub was compiled for
/// * `args` - Word-sized integer or pointer arguments
///
/// # Errors
///
/// See [`Driver::call`].
///
/// # Example
///
/// ```rust
/// use stubscope::{install, invoke, lookup, Abi, Architecture, ExecutionContext, Library, Register, X86Machine};
///
/// let stubs = lookup(Architecture::X86_64, Abi::SysVAmd64, Library::Libc)?;
/// let mut machine = X86Machine::new(Architecture::X86_64);
/// let base = install(stubs, 0x6660_0000, &mut machine)?;
/// machine.set_register(Register::Rsp, 0x7fff_fff0)?;
/// machine.set_memory(0x1000, b"triton stubs\0")?;
///
/// let length = invoke(stubs.entry(base, "strlen")?, &mut machine, Abi::SysVAmd64, &[0x1000])?;
/// assert_eq!(length, 12);
/// # Ok::<(), stubscope::Error>(())
/// ```
pub fn invoke<C>(entry: u64, ctx: &mut C, abi: Abi, args: &[u64]) -> Result<u64>
where
    C: ExecutionContext + ?Sized,
{
    Ok(Driver::default().call(ctx, abi, entry, args)?.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        emulation::Register,
        stubs::Architecture,
        test::MockContext,
    };

    fn context() -> MockContext {
        let mut ctx = MockContext::new(Architecture::X86_64);
        ctx.set_register(Register::Rsp, 0x8000).unwrap();
        ctx
    }

    #[test]
    fn runs_until_sentinel() {
        let mut ctx = context();
        ctx.transition(0x100, 0x104)
            .transition(0x104, 0x108)
            .transition(0x108, SENTINEL);

        let steps = Driver::default().run(&mut ctx, 0x100).unwrap();
        assert_eq!(steps, 3);
        assert_eq!(ctx.fetched(), &[(0x100, 16), (0x104, 16), (0x108, 16)]);
    }

    #[test]
    fn sentinel_entry_executes_nothing() {
        let mut ctx = context();
        assert_eq!(Driver::default().run(&mut ctx, SENTINEL).unwrap(), 0);
        assert!(ctx.fetched().is_empty());
    }

    #[test]
    fn fetch_size_is_configurable() {
        let mut ctx = context();
        ctx.transition(0x100, SENTINEL);

        let driver = Driver::new(DriverConfig::default().with_fetch_size(15));
        driver.run(&mut ctx, 0x100).unwrap();
        assert_eq!(ctx.fetched(), &[(0x100, 15)]);
    }

    #[test]
    fn step_budget() {
        let mut ctx = context();
        ctx.transition(0x100, 0x100);

        let driver = Driver::new(DriverConfig::default().with_max_steps(50));
        assert_eq!(
            driver.run(&mut ctx, 0x100).unwrap_err(),
            Error::EmulationTimeout {
                executed: 50,
                limit: 50
            }
        );
        assert_eq!(ctx.fetched().len(), 50);
    }

    #[test]
    fn faults_propagate_unchanged() {
        let mut ctx = context();
        ctx.transition(0x100, 0x200);

        let error = Driver::default().run(&mut ctx, 0x100).unwrap_err();
        assert_eq!(error, emulation_fault!(0x200, "no transition"));
        assert_eq!(ctx.fetched().len(), 2);
    }

    #[test]
    fn call_restores_stack_and_reads_return() {
        let mut ctx = context();
        ctx.transition(0x100, SENTINEL);
        ctx.set_register(Register::Rax, 42).unwrap();

        let completion = Driver::default()
            .call(&mut ctx, Abi::SysVAmd64, 0x100, &[1, 2])
            .unwrap();
        assert_eq!(completion, Completion { value: 42, steps: 1 });
        assert_eq!(ctx.get_register(Register::Rsp).unwrap(), 0x8000);
        assert_eq!(ctx.get_register(Register::Rdi).unwrap(), 1);
        assert_eq!(ctx.get_register(Register::Rsi).unwrap(), 2);
    }

    #[test]
    fn call_keeps_frame_when_asked() {
        let mut ctx = context();
        ctx.transition(0x100, SENTINEL);

        Driver::new(DriverConfig::default().with_restore_stack(false))
            .call(&mut ctx, Abi::SysVAmd64, 0x100, &[])
            .unwrap();
        assert_eq!(ctx.get_register(Register::Rsp).unwrap(), 0x8000 - 8);
    }

    #[test]
    fn call_aligns_when_configured() {
        let mut ctx = context();
        ctx.set_register(Register::Rsp, 0x8008).unwrap();
        ctx.transition(0x100, SENTINEL);

        Driver::new(
            DriverConfig::default()
                .with_restore_stack(false)
                .with_stack_alignment(16),
        )
        .call(&mut ctx, Abi::SysVAmd64, 0x100, &[1, 2, 3, 4, 5, 6, 7])
        .unwrap();
        assert_eq!(ctx.get_register(Register::Rsp).unwrap(), 0x7fe8);
        assert_eq!(ctx.read_word(0x7ff0).unwrap(), 7);
    }

    #[test]
    fn invoke_rejects_foreign_abi() {
        let mut ctx = context();
        assert_eq!(
            invoke(0x100, &mut ctx, Abi::SysVI386, &[]).unwrap_err(),
            Error::AbiMismatch {
                abi: Abi::SysVI386,
                architecture: Architecture::X86_64
            }
        );
        assert!(ctx.fetched().is_empty());
    }
}

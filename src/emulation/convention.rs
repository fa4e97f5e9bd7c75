//! Calling-convention adapters.
//!
//! A [`CallingConvention`] knows how a caller hands arguments to a function compiled for one
//! [`Abi`], where the function expects its return address, and where it leaves its result.
//! Conventions are static tables; [`CallingConvention::of`] picks the one for an ABI, and the
//! driver is written once against that table.
//!
//! # Call Frame
//!
//! Before the stub's first instruction runs, the frame looks the same for every ABI:
//!
//! ```text
//! higher addresses
//!   caller stack pointer ──► (untouched caller data)
//!                            stack argument n-1
//!                            ...
//!                            stack argument 0
//!   entry stack pointer  ──► sentinel return address (0)
//! lower addresses
//! ```
//!
//! Stack arguments start immediately below the caller's stack pointer and the sentinel sits
//! directly below them, so arguments pushed beforehand with [`CallingConvention::push`] are
//! seen by the stub exactly as if they had been passed to [`CallingConvention::prepare_call`].
//! [`CallingConvention::prepare_aligned_call`] inserts padding above the arguments instead,
//! so that the argument area starts on an alignment boundary.
//!
//! For [`Abi::SysVAmd64`] the first six arguments travel in registers and only the rest are
//! stack arguments; for [`Abi::SysVI386`] every argument is a stack argument.

use crate::{
    emulation::{driver::Invocation, ExecutionContext, Register, SENTINEL},
    stubs::{Abi, Architecture},
    Error, Result,
};

/// Stack-pointer alignment at the call site required by both System V ABIs.
pub const STACK_ALIGNMENT: u64 = 16;

/// How a convention hands arguments to the callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentPassing {
    /// Leading arguments go to these registers in order; the remainder go on the stack.
    Registers(&'static [Register]),
    /// Every argument goes on the stack, the first argument nearest the top.
    Stack,
}

/// Argument marshaling rules of one ABI.
#[derive(Debug, PartialEq, Eq)]
pub struct CallingConvention {
    abi: Abi,
    passing: ArgumentPassing,
    return_register: Register,
}

static SYSV_AMD64: CallingConvention = CallingConvention {
    abi: Abi::SysVAmd64,
    passing: ArgumentPassing::Registers(&[
        Register::Rdi,
        Register::Rsi,
        Register::Rdx,
        Register::Rcx,
        Register::R8,
        Register::R9,
    ]),
    return_register: Register::Rax,
};

static SYSV_I386: CallingConvention = CallingConvention {
    abi: Abi::SysVI386,
    passing: ArgumentPassing::Stack,
    return_register: Register::Eax,
};

impl CallingConvention {
    /// Returns the convention table for `abi`.
    #[must_use]
    pub fn of(abi: Abi) -> &'static CallingConvention {
        match abi {
            Abi::SysVAmd64 => &SYSV_AMD64,
            Abi::SysVI386 => &SYSV_I386,
        }
    }

    /// The ABI this table describes.
    #[must_use]
    pub fn abi(&self) -> Abi {
        self.abi
    }

    /// The architecture the ABI belongs to.
    #[must_use]
    pub fn architecture(&self) -> Architecture {
        self.abi.architecture()
    }

    /// How arguments are passed.
    #[must_use]
    pub fn passing(&self) -> ArgumentPassing {
        self.passing
    }

    /// Registers carrying the leading arguments; empty for pure stack passing.
    #[must_use]
    pub fn argument_registers(&self) -> &'static [Register] {
        match self.passing {
            ArgumentPassing::Registers(registers) => registers,
            ArgumentPassing::Stack => &[],
        }
    }

    /// Size in bytes of one argument slot and of the return address.
    #[must_use]
    pub fn word_size(&self) -> usize {
        self.architecture().word_size()
    }

    /// Register the callee leaves its result in.
    #[must_use]
    pub fn return_register(&self) -> Register {
        self.return_register
    }

    /// The stack pointer register.
    #[must_use]
    pub fn stack_pointer(&self) -> Register {
        self.architecture().stack_pointer()
    }

    /// The instruction pointer register.
    #[must_use]
    pub fn instruction_pointer(&self) -> Register {
        self.architecture().instruction_pointer()
    }

    /// Fails with [`Error::AbiMismatch`] unless `ctx` runs this convention's architecture.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AbiMismatch`] on an architecture mismatch.
    pub fn check<C>(&self, ctx: &C) -> Result<()>
    where
        C: ExecutionContext + ?Sized,
    {
        let architecture = ctx.architecture();
        if architecture == self.architecture() {
            Ok(())
        } else {
            Err(Error::AbiMismatch {
                abi: self.abi,
                architecture,
            })
        }
    }

    /// Checks that `value` fits into one argument slot without truncation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgumentWidth`] with the number of bytes the value needs.
    pub fn check_value(&self, value: u64) -> Result<()> {
        let expected = self.word_size();
        if value & !self.architecture().word_mask() == 0 {
            return Ok(());
        }

        let bits = u64::BITS - value.leading_zeros();
        Err(Error::InvalidArgumentWidth {
            width: bits.div_ceil(8) as usize,
            expected,
        })
    }

    /// Pushes one word onto the stack: decrement the stack pointer by the word size, then
    /// store `value` little-endian at the new top of stack.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The execution context to push onto
    /// * `value` - Value to store
    /// * `width` - Width in bytes the caller intends to push; must equal the word size
    ///
    /// # Returns
    ///
    /// The new stack pointer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgumentWidth`] if `width` differs from the word size or the
    /// value needs more bytes than a word, [`Error::AbiMismatch`] for a context of another
    /// architecture, and propagates context errors.
    pub fn push<C>(&self, ctx: &mut C, value: u64, width: usize) -> Result<u64>
    where
        C: ExecutionContext + ?Sized,
    {
        self.check(ctx)?;
        let expected = self.word_size();
        if width != expected {
            return Err(Error::InvalidArgumentWidth { width, expected });
        }
        self.check_value(value)?;
        self.push_word(ctx, value)
    }

    fn push_word<C>(&self, ctx: &mut C, value: u64) -> Result<u64>
    where
        C: ExecutionContext + ?Sized,
    {
        let sp_register = self.stack_pointer();
        let sp = ctx
            .get_register(sp_register)?
            .wrapping_sub(self.word_size() as u64)
            & self.architecture().word_mask();

        ctx.set_register(sp_register, sp)?;
        ctx.write_word(sp, value)?;
        Ok(sp)
    }

    /// Marshals `args` and plants the sentinel return address, leaving `ctx` as if a `call`
    /// to `entry` had just executed (the instruction pointer itself is set by the driver).
    ///
    /// Stack arguments are pushed at the current stack pointer and the sentinel directly
    /// below them. With an empty `args` only the sentinel is pushed, which completes a frame
    /// whose arguments the caller already pushed with [`push`](Self::push).
    ///
    /// Every argument is validated before the context is touched, so a rejected call leaves
    /// the context unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AbiMismatch`] for a context of another architecture,
    /// [`Error::InvalidArgumentWidth`] for an argument that does not fit a slot, and
    /// propagates context errors.
    pub fn prepare_call<C>(&self, ctx: &mut C, entry: u64, args: &[u64]) -> Result<Invocation>
    where
        C: ExecutionContext + ?Sized,
    {
        self.prepare_aligned_call(ctx, entry, args, 0)
    }

    /// Like [`prepare_call`](Self::prepare_call), but first aligns the stack pointer down to
    /// `alignment` and pads it so the stack argument area starts on an `alignment` boundary.
    /// At entry `sp + word` is then aligned.
    ///
    /// An `alignment` of 0 and an empty `args` both skip the alignment: arguments the caller
    /// pushed beforehand must stay directly above the sentinel.
    ///
    /// # Errors
    ///
    /// See [`prepare_call`](Self::prepare_call).
    pub fn prepare_aligned_call<C>(
        &self,
        ctx: &mut C,
        entry: u64,
        args: &[u64],
        alignment: u64,
    ) -> Result<Invocation>
    where
        C: ExecutionContext + ?Sized,
    {
        self.check(ctx)?;
        for arg in args {
            self.check_value(*arg)?;
        }

        let registers = self.argument_registers();
        let split = registers.len().min(args.len());
        let (in_registers, on_stack) = args.split_at(split);

        let sp_register = self.stack_pointer();
        let word = self.word_size() as u64;
        let caller_stack_pointer = ctx.get_register(sp_register)?;

        if alignment > 0 && !args.is_empty() {
            let area = on_stack.len() as u64 * word;
            let padding = (alignment - area % alignment) % alignment;
            let aligned = (caller_stack_pointer - caller_stack_pointer % alignment)
                .wrapping_sub(padding)
                & self.architecture().word_mask();
            ctx.set_register(sp_register, aligned)?;
        }

        for arg in on_stack.iter().rev() {
            self.push_word(ctx, *arg)?;
        }
        for (register, arg) in registers.iter().zip(in_registers) {
            ctx.set_register(*register, *arg)?;
        }
        let entry_stack_pointer = self.push_word(ctx, SENTINEL)?;

        Ok(Invocation {
            entry,
            caller_stack_pointer,
            entry_stack_pointer,
            return_address: SENTINEL,
        })
    }

    /// Reads argument `index` as the callee sees it at its first instruction.
    ///
    /// Stack argument `k` lives at `sp + word * (k + 1)`, just above the return address.
    /// The address wraps at the architecture's address width like every other stack access,
    /// so any `index` reads some word.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AbiMismatch`] for a context of another architecture and propagates
    /// context errors.
    pub fn argument<C>(&self, ctx: &C, index: usize) -> Result<u64>
    where
        C: ExecutionContext + ?Sized,
    {
        self.check(ctx)?;
        let registers = self.argument_registers();
        if let Some(register) = registers.get(index) {
            return ctx.get_register(*register);
        }

        let word = self.word_size() as u64;
        let slot = ((index - registers.len()) as u64).wrapping_add(1);
        let sp = ctx.get_register(self.stack_pointer())?;
        let address = sp.wrapping_add(slot.wrapping_mul(word)) & self.architecture().word_mask();
        ctx.read_word(address)
    }

    /// Reads the callee's result from the return register.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AbiMismatch`] for a context of another architecture and propagates
    /// context errors.
    pub fn return_value<C>(&self, ctx: &C) -> Result<u64>
    where
        C: ExecutionContext + ?Sized,
    {
        self.check(ctx)?;
        Ok(ctx.get_register(self.return_register)? & self.architecture().word_mask())
    }
}

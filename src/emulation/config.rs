//! Driver configuration.
//!
//! [`DriverConfig`] controls how the stub driver fetches instructions, how long it lets a
//! stub run, and how it leaves the stack behind once the stub returned.
//!
//! # Presets
//!
//! - [`DriverConfig::default()`] - bounded run, suitable for trusted stubs
//! - [`DriverConfig::unbounded()`] - no step budget; a stub that never returns hangs the caller
//!
//! # Example
//!
//! ```rust
//! use stubscope::DriverConfig;
//!
//! let config = DriverConfig::default().with_max_steps(10_000);
//! assert_eq!(config.max_steps, 10_000);
//! assert_eq!(config.fetch_size, 16);
//! ```

/// Number of bytes handed to the engine per step.
///
/// The longest valid x86 instruction is 15 bytes, so 16 covers both supported
/// architectures.
pub const DEFAULT_FETCH_SIZE: usize = 16;

/// Default step budget for a single invocation.
pub const DEFAULT_MAX_STEPS: u64 = 1_000_000;

/// Configuration of the stub driver.
///
/// # Default Values
///
/// | Setting | Default Value |
/// |---------|---------------|
/// | `max_steps` | 1,000,000 |
/// | `fetch_size` | 16 |
/// | `restore_stack` | true |
/// | `stack_alignment` | 0 (off) |
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriverConfig {
    /// Maximum instructions executed per invocation.
    ///
    /// Set to 0 for unlimited execution. When exceeded, the run stops with
    /// [`crate::Error::EmulationTimeout`].
    pub max_steps: u64,

    /// Size of the byte window fetched at the instruction pointer for each step.
    pub fetch_size: usize,

    /// Restore the caller's stack pointer once the stub returned.
    ///
    /// This performs the caller-side cleanup of a `call`: pushed arguments and the
    /// sentinel return address are dropped, so repeated invocations on one context start
    /// from the same stack pointer.
    pub restore_stack: bool,

    /// Align the argument area of a call to this many bytes before marshaling.
    ///
    /// Set to 0 to push arguments directly at the caller's stack pointer. Calls without
    /// arguments are never aligned, so a frame the caller pushed by hand stays intact.
    /// [`crate::emulation::STACK_ALIGNMENT`] is what System V compilers assume.
    pub stack_alignment: u64,
}

impl Default for DriverConfig {
    /// Creates the default driver configuration.
    ///
    /// See the struct documentation for default values.
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            fetch_size: DEFAULT_FETCH_SIZE,
            restore_stack: true,
            stack_alignment: 0,
        }
    }
}

impl DriverConfig {
    /// Creates a configuration without a step budget.
    ///
    /// The run only ends when the stub returns to the sentinel or the engine faults.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            max_steps: 0,
            ..Self::default()
        }
    }

    /// Sets the step budget (0 disables it).
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Sets the fetch window size.
    #[must_use]
    pub fn with_fetch_size(mut self, fetch_size: usize) -> Self {
        self.fetch_size = fetch_size;
        self
    }

    /// Sets whether the caller's stack pointer is restored after the stub returned.
    #[must_use]
    pub fn with_restore_stack(mut self, restore_stack: bool) -> Self {
        self.restore_stack = restore_stack;
        self
    }

    /// Sets the alignment of the argument area (0 disables it).
    #[must_use]
    pub fn with_stack_alignment(mut self, stack_alignment: u64) -> Self {
        self.stack_alignment = stack_alignment;
        self
    }

    /// Returns `true` if a step budget is enforced.
    #[must_use]
    pub fn is_bounded(&self) -> bool {
        self.max_steps > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        let config = DriverConfig::default();
        assert!(config.is_bounded());
        assert_eq!(config.max_steps, DEFAULT_MAX_STEPS);
        assert!(config.restore_stack);
        assert_eq!(config.stack_alignment, 0);

        let config = DriverConfig::unbounded();
        assert!(!config.is_bounded());
        assert_eq!(config.fetch_size, DEFAULT_FETCH_SIZE);
    }

    #[test]
    fn builders() {
        let config = DriverConfig::unbounded()
            .with_max_steps(5)
            .with_fetch_size(15)
            .with_restore_stack(false)
            .with_stack_alignment(16);
        assert_eq!(
            config,
            DriverConfig {
                max_steps: 5,
                fetch_size: 15,
                restore_stack: false,
                stack_alignment: 16,
            }
        );
    }
}

//! [`run_guarded`] executes a caller-supplied block so that an
//! illegal-instruction fault raised by the block (the mechanism behind
//! precondition and assertion traps) is intercepted and reported as a normal
//! return value instead of terminating the process. It exists so test code
//! can assert "this call trips its precondition" without crashing the test
//! run.
//!
//! Only the illegal-instruction fault class is intercepted. Every other
//! fault keeps its default, normally fatal, disposition so a real crash is
//! never masked, and an illegal instruction on a thread without an armed
//! guard stays fatal as well.
//!
//! # Linux
//!
//! On Linux this is done by installing a process-wide
//! [`SIGILL`](https://man7.org/linux/man-pages/man7/signal.7.html) action
//! while at least one thread is guarded, together with a registry of armed
//! threads keyed by kernel thread id. When the signal is delivered, the
//! handler classifies the fault; for an armed thread it advances the saved
//! program counter in the delivered `ucontext` past the trapping opcode and
//! records the fault, so returning from the handler resumes the block just
//! after the trap. Faults on unarmed threads, and `SIGILL`s sent with
//! `kill(2)` rather than raised by the CPU, are handed back to whatever
//! action was installed before arming.
//!
//! # Macos
//!
//! On Macos we use [exception ports](https://flylib.com/books/en/3.126.1.109/1/).
//! Arming swaps a fresh receive port in as the calling thread's exception
//! port for `EXC_MASK_BAD_INSTRUCTION` only, and spawns a server thread that
//! waits for a single exception message. The kernel suspends the faulting
//! thread until the server has rewritten its thread state past the trapping
//! opcode and replied; replying with a failure code instead makes the kernel
//! fall through to the previously registered (normally fatal) handling.
//!
//! Note that a thread exception port takes precedence over signal handlers
//! registered for the equivalent signal, so combining this crate with a
//! `SIGILL` handler on Macos will not behave the way you might expect.
//!
//! # Caveats
//!
//! The guarded block is *resumed past* the faulting instruction, it is not
//! unwound: the rest of the block still runs, minus whatever the skipped
//! statement would have done. Guards do not nest on a single thread, though
//! independent threads may each run their own guarded call concurrently.
//! This is test-harness machinery; using it to paper over faults in
//! production code is almost certainly a mistake.

#![allow(unsafe_code)]

mod error;
mod outcome;

pub use error::Error;
pub use outcome::Outcome;
pub use trap_context::TrapRecord;

#[cfg(feature = "debug-print")]
#[macro_export]
macro_rules! debug_print {
    ($s:literal) => {
        let cstr = concat!($s, "\n");
        $crate::write_stderr(cstr);
    };
}

#[cfg(not(feature = "debug-print"))]
#[macro_export]
macro_rules! debug_print {
    ($s:literal) => {};
}

/// Writes the specified string directly to stderr.
///
/// This is safe to be called from within a compromised context.
#[inline]
pub fn write_stderr(s: &'static str) {
    unsafe {
        libc::write(2, s.as_ptr().cast(), s.len());
    }
}

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        mod linux;
        use linux as imp;
    } else if #[cfg(target_os = "macos")] {
        mod mac;
        use mac as imp;
    }
}

/// Runs `block` on the calling thread with illegal-instruction interception
/// armed.
///
/// Returns [`Outcome::Completed`] with the block's value if no fault
/// occurred, or [`Outcome::Trapped`] with a [`TrapRecord`] if the block hit
/// an illegal instruction and was resumed past it. Failures of the
/// interception machinery itself surface as [`Error`]; a failure to arm
/// aborts the call before the block runs.
///
/// # Examples
///
/// ```
/// use trap_guard::Outcome;
///
/// let outcome = trap_guard::run_guarded(|| 2 + 2).unwrap();
/// assert!(matches!(outcome, Outcome::Completed(4)));
/// ```
///
/// A block that traps keeps running past the faulting opcode, but its value
/// is discarded in favor of the fault record:
///
/// ```
/// let outcome = trap_guard::run_guarded(|| {
///     fault_generator::raise_illegal_instruction();
///     42
/// })
/// .unwrap();
/// assert!(outcome.is_trapped());
/// ```
pub fn run_guarded<T>(block: impl FnOnce() -> T) -> Result<Outcome<T>, Error> {
    imp::run_guarded(block)
}

//! Small helpers that deliberately fault the calling thread, used to
//! exercise fault-interception machinery in tests.

use std::arch::asm;

/// Executes the architecture's canonical undefined opcode, raising `SIGILL`
/// on Linux and an `EXC_BAD_INSTRUCTION` Mach exception on MacOS.
///
/// If the fault is resolved by advancing the program counter past the
/// opcode, execution continues normally after this call.
pub fn raise_illegal_instruction() {
    unsafe {
        #[cfg(target_arch = "x86_64")]
        asm!("ud2");

        #[cfg(target_arch = "aarch64")]
        asm!("udf #0");
    }
}

/// Raises `SIGSEGV` on unix by reading through a null reference.
pub fn raise_segfault() {
    let s: &u32 = unsafe {
        // avoid deref_nullptr lint
        fn definitely_not_null() -> *const u32 {
            std::ptr::null()
        }
        &*definitely_not_null()
    };

    println!("ok...");
    println!("we are crashing by accessing a null reference: {s}");
}

/// Raises `SIGTRAP` on unix via a breakpoint instruction.
pub fn raise_trap() {
    unsafe {
        #[cfg(target_arch = "x86_64")]
        asm!("int3");

        #[cfg(target_arch = "aarch64")]
        asm!("brk #0");
    }
}

/// Raises `SIGABRT` on unix.
pub fn raise_abort() {
    std::process::abort();
}

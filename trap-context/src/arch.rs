//! Per-architecture policy for resuming a thread past a trapping opcode.

use crate::RegisterSnapshot;

/// How a CPU architecture reports an illegal-instruction trap, and how far
/// the saved program counter must be advanced so the resumed thread does not
/// immediately re-trap.
///
/// The advance distance is the width of the canonical trapping opcode for
/// the architecture (`ud2`, `udf #0`). An architecture where trapping
/// encodings have more than one width needs its own implementation of
/// [`TrapArch::skip_trap_instruction`] rather than a constant.
pub trait TrapArch {
    /// Byte width of the canonical trapping opcode.
    const TRAP_INSTRUCTION_LEN: u64;

    fn program_counter(state: &RegisterSnapshot) -> u64;

    fn set_program_counter(state: &mut RegisterSnapshot, pc: u64);

    /// Advances the program counter past the faulting opcode, returning the
    /// resume address.
    fn skip_trap_instruction(state: &mut RegisterSnapshot) -> u64 {
        let resumed = Self::program_counter(state) + Self::TRAP_INSTRUCTION_LEN;
        Self::set_program_counter(state, resumed);
        resumed
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        /// Traps via the 2-byte `ud2` opcode
        pub enum X86_64 {}

        impl TrapArch for X86_64 {
            const TRAP_INSTRUCTION_LEN: u64 = 2;

            #[inline]
            fn program_counter(state: &RegisterSnapshot) -> u64 {
                #[cfg(any(target_os = "linux", target_os = "android"))]
                {
                    state.uc_mcontext.gregs[libc::REG_RIP as usize] as u64
                }
                #[cfg(target_os = "macos")]
                {
                    state.rip
                }
            }

            #[inline]
            fn set_program_counter(state: &mut RegisterSnapshot, pc: u64) {
                #[cfg(any(target_os = "linux", target_os = "android"))]
                {
                    state.uc_mcontext.gregs[libc::REG_RIP as usize] = pc as libc::greg_t;
                }
                #[cfg(target_os = "macos")]
                {
                    state.rip = pc;
                }
            }
        }

        /// The architecture this crate was compiled for.
        pub type Target = X86_64;
    } else if #[cfg(target_arch = "aarch64")] {
        /// Traps via the 4-byte `udf #0` opcode
        pub enum Aarch64 {}

        impl TrapArch for Aarch64 {
            const TRAP_INSTRUCTION_LEN: u64 = 4;

            #[inline]
            fn program_counter(state: &RegisterSnapshot) -> u64 {
                #[cfg(any(target_os = "linux", target_os = "android"))]
                {
                    state.uc_mcontext.pc
                }
                #[cfg(target_os = "macos")]
                {
                    state.pc
                }
            }

            #[inline]
            fn set_program_counter(state: &mut RegisterSnapshot, pc: u64) {
                #[cfg(any(target_os = "linux", target_os = "android"))]
                {
                    state.uc_mcontext.pc = pc;
                }
                #[cfg(target_os = "macos")]
                {
                    state.pc = pc;
                }
            }
        }

        /// The architecture this crate was compiled for.
        pub type Target = Aarch64;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn advances_pc_by_trap_width() {
        // SAFETY: an all-zero snapshot is a valid value, only the program
        // counter is touched
        let mut state: RegisterSnapshot = unsafe { std::mem::zeroed() };

        Target::set_program_counter(&mut state, 0x1000);
        assert_eq!(Target::program_counter(&state), 0x1000);

        let resumed = Target::skip_trap_instruction(&mut state);
        assert_eq!(resumed, 0x1000 + Target::TRAP_INSTRUCTION_LEN);
        assert_eq!(Target::program_counter(&state), resumed);
    }
}

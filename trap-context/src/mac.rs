use mach2::{exception_types as et, mach_types as mt, thread_status as ts};

/// Details of an intercepted illegal-instruction fault.
#[derive(Copy, Clone, Debug)]
pub struct TrapRecord {
    /// The exception kind, always `EXC_BAD_INSTRUCTION` for intercepted
    /// faults
    pub kind: et::exception_type_t,
    /// The first exception code word, the exception subtype
    pub code: et::mach_exception_data_type_t,
    /// Optional second code word with fault details
    pub subcode: Option<et::mach_exception_data_type_t>,
    /// The thread that faulted
    pub thread: mt::thread_t,
    /// The task the thread belongs to
    pub task: mt::task_t,
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        /// `x86_thread_state64_t`, `mach/i386/_structs.h`
        #[repr(C)]
        #[derive(Copy, Clone, Debug)]
        pub struct RegisterSnapshot {
            pub rax: u64,
            pub rbx: u64,
            pub rcx: u64,
            pub rdx: u64,
            pub rdi: u64,
            pub rsi: u64,
            pub rbp: u64,
            pub rsp: u64,
            pub r8: u64,
            pub r9: u64,
            pub r10: u64,
            pub r11: u64,
            pub r12: u64,
            pub r13: u64,
            pub r14: u64,
            pub r15: u64,
            pub rip: u64,
            pub rflags: u64,
            pub cs: u64,
            pub fs: u64,
            pub gs: u64,
        }

        /// `x86_THREAD_STATE64`, `mach/i386/thread_status.h`
        pub const THREAD_STATE_FLAVOR: ts::thread_state_flavor_t = 4;
    } else if #[cfg(target_arch = "aarch64")] {
        /// `arm_thread_state64_t`, `mach/arm/_structs.h`
        #[repr(C)]
        #[derive(Copy, Clone, Debug)]
        pub struct RegisterSnapshot {
            pub x: [u64; 29],
            pub fp: u64,
            pub lr: u64,
            pub sp: u64,
            pub pc: u64,
            pub cpsr: u32,
            pub flags: u32,
        }

        /// `ARM_THREAD_STATE64`, `mach/arm/thread_status.h`
        pub const THREAD_STATE_FLAVOR: ts::thread_state_flavor_t = 6;
    }
}

/// The length of [`RegisterSnapshot`] in `natural_t` words, as expected by
/// `thread_get_state`/`thread_set_state`.
pub const THREAD_STATE_COUNT: mach2::message::mach_msg_type_number_t =
    (std::mem::size_of::<RegisterSnapshot>() / std::mem::size_of::<u32>()) as u32;

/// The register state the kernel hands to a fault handler for the faulting
/// thread, program counter included.
///
/// The [`crate::arch`] accessors read and write the program counter inside
/// the embedded `mcontext`.
pub type RegisterSnapshot = libc::ucontext_t;

/// Details of an intercepted illegal-instruction fault.
#[derive(Copy, Clone, Debug)]
pub struct TrapRecord {
    /// The delivered signal, always `SIGILL` for intercepted faults
    pub signo: i32,
    /// The kernel's fault subtype (`si_code`, eg. `ILL_ILLOPC`)
    pub code: i64,
    /// Address of the faulting instruction
    pub address: u64,
    /// The thread that faulted
    pub tid: libc::pid_t,
    /// The process the thread belongs to
    pub pid: libc::pid_t,
}

use crate::{outcome::OutcomeFlag, Error};
use std::{collections::BTreeMap, mem, ptr, sync::Arc};
use trap_context::{
    arch::{Target, TrapArch},
    RegisterSnapshot, TrapRecord,
};

/// All armed threads, plus the `SIGILL` action that was in effect before the
/// first of them armed.
///
/// The action is installed when the registry gains its first entry and
/// restored when it loses its last, so unguarded processes are untouched.
struct Registry {
    armed: BTreeMap<libc::pid_t, Arc<OutcomeFlag>>,
    previous: Option<libc::sigaction>,
}

impl Registry {
    const fn new() -> Self {
        Self {
            armed: BTreeMap::new(),
            previous: None,
        }
    }
}

static REGISTRY: parking_lot::Mutex<Registry> = parking_lot::const_mutex(Registry::new());

#[inline]
pub(super) fn current_thread() -> libc::pid_t {
    // SAFETY: syscall
    unsafe { libc::syscall(libc::SYS_gettid) as libc::pid_t }
}

/// Arms the given thread, installing the process-wide `SIGILL` action if it
/// is the first armed thread.
pub(super) fn arm(tid: libc::pid_t) -> Result<Arc<OutcomeFlag>, Error> {
    let mut registry = REGISTRY.lock();

    if registry.armed.contains_key(&tid) {
        return Err(Error::AlreadyGuarded);
    }

    if registry.previous.is_none() {
        // SAFETY: syscalls
        unsafe {
            let mut sa: libc::sigaction = mem::zeroed();
            libc::sigemptyset(&mut sa.sa_mask);
            libc::sigaddset(&mut sa.sa_mask, libc::SIGILL);
            sa.sa_sigaction = trap_handler as usize;
            sa.sa_flags = libc::SA_SIGINFO;

            let mut previous = mem::zeroed();
            if libc::sigaction(libc::SIGILL, &sa, &mut previous) == -1 {
                return Err(Error::PortAllocation(std::io::Error::last_os_error()));
            }

            registry.previous = Some(previous);
        }
    }

    let shared = Arc::new(OutcomeFlag::new());
    registry.armed.insert(tid, shared.clone());

    Ok(shared)
}

/// Disarms the given thread, restoring the previous `SIGILL` action once no
/// armed threads remain.
pub(super) fn disarm(tid: libc::pid_t) {
    let mut registry = REGISTRY.lock();

    registry.armed.remove(&tid);

    if registry.armed.is_empty() {
        if let Some(previous) = registry.previous.take() {
            // Best effort, there is nothing the caller could do with a
            // failure here
            // SAFETY: syscall
            unsafe {
                libc::sigaction(libc::SIGILL, &previous, ptr::null_mut());
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    /// An illegal-instruction fault on an armed thread: patch and resume.
    Intercept,
    /// Anything else is handed back to the previously installed action,
    /// which normally terminates the process.
    Forward,
}

/// Accept only a hardware-raised `SIGILL` (`si_code > 0`; `kill()`-style
/// deliveries carry zero or negative codes) on a thread with an armed guard.
fn classify(signo: i32, si_code: i32, armed: bool) -> Verdict {
    if signo == libc::SIGILL && si_code > 0 && armed {
        Verdict::Intercept
    } else {
        Verdict::Forward
    }
}

/// The action installed for `SIGILL` while any thread is armed, invoked by
/// the kernel on the faulting thread.
unsafe extern "C" fn trap_handler(signo: i32, info: *mut libc::siginfo_t, uc: *mut libc::c_void) {
    let info = &*info;
    let tid = current_thread();

    let entry = { REGISTRY.lock().armed.get(&tid).cloned() };

    match classify(signo, info.si_code, entry.is_some()) {
        Verdict::Intercept => {
            debug_print!("intercepted illegal instruction");

            let state = &mut *uc.cast::<RegisterSnapshot>();
            let record = TrapRecord {
                signo,
                code: info.si_code as i64,
                address: Target::program_counter(state),
                tid,
                pid: std::process::id() as libc::pid_t,
            };

            // Returning from the handler restores the patched context,
            // resuming the thread just past the trapping opcode
            Target::skip_trap_instruction(state);

            if let Some(shared) = entry {
                shared.set_trapped(record);
            }
        }
        Verdict::Forward => {
            debug_print!("forwarding fault to the previous action");
            forward_to_previous(signo, info);
        }
    }
}

/// Reinstates the pre-arm `SIGILL` action so the fault is delivered to it
/// instead. The process is expected to die at that point, so no attempt is
/// made to keep other armed guards alive.
unsafe fn forward_to_previous(signo: i32, info: &libc::siginfo_t) {
    let previous = { REGISTRY.lock().previous.take() };

    match previous {
        Some(previous) => {
            if libc::sigaction(signo, &previous, ptr::null_mut()) == -1 {
                libc::signal(signo, libc::SIG_DFL);
            }
        }
        None => {
            libc::signal(signo, libc::SIG_DFL);
        }
    }

    if info.si_code <= 0 {
        // The signal came from kill() and will not re-raise itself when the
        // handler returns, so queue it again ourselves
        if libc::syscall(libc::SYS_tgkill, std::process::id(), current_thread(), signo) < 0 {
            libc::_exit(1);
        }
    }
    // A synchronous hardware fault re-raises itself when the handler returns
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn classifies_faults() {
        assert_eq!(
            classify(libc::SIGILL, libc::ILL_ILLOPC, true),
            Verdict::Intercept
        );
        assert_eq!(
            classify(libc::SIGILL, libc::ILL_ILLOPN, true),
            Verdict::Intercept
        );

        // no guard armed on the faulting thread
        assert_eq!(
            classify(libc::SIGILL, libc::ILL_ILLOPC, false),
            Verdict::Forward
        );
        // user-sent, si_code is SI_USER (0) or SI_TKILL (negative)
        assert_eq!(classify(libc::SIGILL, 0, true), Verdict::Forward);
        assert_eq!(classify(libc::SIGILL, -6, true), Verdict::Forward);
        // a different fault class entirely
        assert_eq!(
            classify(libc::SIGSEGV, libc::SEGV_MAPERR, true),
            Verdict::Forward
        );
    }

    #[test]
    fn rejects_double_arm() {
        let tid = current_thread();

        let _shared = arm(tid).unwrap();
        assert!(matches!(arm(tid), Err(Error::AlreadyGuarded)));

        disarm(tid);

        // and a disarmed thread can arm again
        let _shared = arm(tid).unwrap();
        disarm(tid);
    }
}

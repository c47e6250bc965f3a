use crate::Error;
use trap_context::TrapRecord;

/// How a guarded call concluded.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The block ran to completion without faulting.
    Completed(T),
    /// The block hit an illegal-instruction fault. The fault was intercepted
    /// and the thread resumed past the trapping opcode, so the block still
    /// ran to its end, but its value is discarded in favor of the record.
    Trapped(TrapRecord),
}

impl<T> Outcome<T> {
    /// True if the block trapped.
    #[inline]
    pub fn is_trapped(&self) -> bool {
        matches!(self, Self::Trapped(_))
    }

    /// The record of the intercepted fault, if the block trapped.
    #[inline]
    pub fn trap(&self) -> Option<&TrapRecord> {
        match self {
            Self::Trapped(record) => Some(record),
            Self::Completed(_) => None,
        }
    }

    /// The block's value, if it completed without faulting.
    #[inline]
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Trapped(_) => None,
        }
    }
}

/// Resolution of a guarded call, shared between the calling thread and the
/// handler context that resolves the fault.
pub(crate) enum FlagState {
    NotTriggered,
    Triggered(TrapRecord),
    Error(Error),
}

/// A set-at-most-once tri-state flag.
///
/// The first resolution wins and later writes are ignored, so the flag makes
/// exactly one monotonic transition per guarded call.
pub(crate) struct OutcomeFlag {
    state: parking_lot::Mutex<FlagState>,
}

impl OutcomeFlag {
    pub(crate) fn new() -> Self {
        Self {
            state: parking_lot::Mutex::new(FlagState::NotTriggered),
        }
    }

    pub(crate) fn set_trapped(&self, record: TrapRecord) {
        self.set(FlagState::Triggered(record));
    }

    pub(crate) fn set_error(&self, error: Error) {
        self.set(FlagState::Error(error));
    }

    fn set(&self, next: FlagState) {
        let mut state = self.state.lock();
        if matches!(*state, FlagState::NotTriggered) {
            *state = next;
        }
    }

    /// Consumes the resolution. Taking the lock is what orders this read
    /// after the resolving write from the handler context.
    pub(crate) fn take(&self) -> FlagState {
        std::mem::replace(&mut *self.state.lock(), FlagState::NotTriggered)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn record(code: i64) -> TrapRecord {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            TrapRecord {
                signo: libc::SIGILL,
                code,
                address: 0x1000,
                tid: 1,
                pid: 1,
            }
        }
        #[cfg(target_os = "macos")]
        {
            TrapRecord {
                kind: mach2::exception_types::EXC_BAD_INSTRUCTION as i32,
                code,
                subcode: None,
                thread: 0,
                task: 0,
            }
        }
    }

    #[test]
    fn first_resolution_wins() {
        let flag = OutcomeFlag::new();
        flag.set_trapped(record(1));
        flag.set_trapped(record(2));
        flag.set_error(Error::Timeout);

        match flag.take() {
            FlagState::Triggered(r) => assert_eq!(r.code, 1),
            _ => panic!("expected the first trap record"),
        }
    }

    #[test]
    fn error_resolution_is_final_too() {
        let flag = OutcomeFlag::new();
        flag.set_error(Error::Timeout);
        flag.set_trapped(record(1));

        assert!(matches!(flag.take(), FlagState::Error(Error::Timeout)));
    }

    #[test]
    fn unresolved_flag_reads_not_triggered() {
        let flag = OutcomeFlag::new();
        assert!(matches!(flag.take(), FlagState::NotTriggered));
    }
}

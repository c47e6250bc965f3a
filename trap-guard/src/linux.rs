mod state;

use crate::{
    outcome::{FlagState, OutcomeFlag},
    Error, Outcome,
};
use std::sync::Arc;

/// Armed state for the calling thread. Disarms on drop so abnormal exits,
/// including panics unwinding out of the block, still restore the thread.
struct ThreadGuard {
    tid: libc::pid_t,
    shared: Arc<OutcomeFlag>,
    disarmed: bool,
}

impl ThreadGuard {
    fn arm() -> Result<Self, Error> {
        let tid = state::current_thread();
        let shared = state::arm(tid)?;

        Ok(Self {
            tid,
            shared,
            disarmed: false,
        })
    }

    fn finish<T>(mut self, value: T) -> Result<Outcome<T>, Error> {
        self.disarm();

        match self.shared.take() {
            FlagState::NotTriggered => Ok(Outcome::Completed(value)),
            FlagState::Triggered(record) => Ok(Outcome::Trapped(record)),
            FlagState::Error(error) => Err(error),
        }
    }

    fn disarm(&mut self) {
        if !self.disarmed {
            self.disarmed = true;
            state::disarm(self.tid);
        }
    }
}

impl Drop for ThreadGuard {
    fn drop(&mut self) {
        self.disarm();
    }
}

pub(crate) fn run_guarded<T>(block: impl FnOnce() -> T) -> Result<Outcome<T>, Error> {
    let guard = ThreadGuard::arm()?;
    let value = block();
    guard.finish(value)
}

mod ffi;
mod state;

use crate::{outcome::FlagState, Error, Outcome};

pub(crate) fn run_guarded<T>(block: impl FnOnce() -> T) -> Result<Outcome<T>, Error> {
    let mut guard = state::ArmedGuard::arm()?;
    let value = block();

    // Tearing the port down joins the exception server, which is what makes
    // the resolution read below race-free
    guard.disarm()?;

    match guard.take_resolution() {
        FlagState::NotTriggered => Ok(Outcome::Completed(value)),
        FlagState::Triggered(record) => Ok(Outcome::Trapped(record)),
        FlagState::Error(error) => Err(error),
    }
}

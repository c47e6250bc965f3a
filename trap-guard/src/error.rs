use std::fmt;

/// An error raised while arming, observing, or disarming a guarded call.
#[derive(Debug)]
pub enum Error {
    /// The fault-delivery endpoint could not be allocated or attached to the
    /// calling thread. The block was never run.
    PortAllocation(std::io::Error),
    /// Receiving the fault message, or replying to it, failed.
    MessageDelivery(std::io::Error),
    /// The faulting thread's register state could not be read or written
    /// while patching the resume address.
    StatePatch(std::io::Error),
    /// A guarded call is already armed on this thread; guards do not nest.
    AlreadyGuarded,
    /// The exception server did not shut down within the bounded disarm
    /// wait.
    Timeout,
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::PortAllocation(inner)
            | Self::MessageDelivery(inner)
            | Self::StatePatch(inner) => Some(inner),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PortAllocation(e) => write!(f, "unable to arm the fault-delivery endpoint: {e}"),
            Self::MessageDelivery(e) => write!(f, "fault message receive/reply failed: {e}"),
            Self::StatePatch(e) => write!(f, "unable to patch the faulting thread's state: {e}"),
            Self::AlreadyGuarded => f.write_str("a guarded call is already armed on this thread"),
            Self::Timeout => f.write_str("the exception server did not shut down in time"),
        }
    }
}

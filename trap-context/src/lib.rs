//! Portable types describing an intercepted illegal-instruction fault: the
//! per-platform [`TrapRecord`] and [`RegisterSnapshot`], and the
//! per-architecture resume policy in [`arch`].

// crate-specific exceptions:
#![allow(unsafe_code)]

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        mod linux;
        pub use linux::*;
    } else if #[cfg(target_os = "macos")] {
        mod mac;
        pub use mac::*;
    }
}

pub mod arch;

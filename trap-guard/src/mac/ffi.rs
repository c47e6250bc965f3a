//! Bindings for the Mach APIs that `mach2` does not expose. Each one notes
//! the header in usr/include/mach it was lifted from.

#![allow(nonstandard_style)]

pub use mach2::{
    exception_types as et,
    kern_return::{kern_return_t, KERN_FAILURE, KERN_SUCCESS},
    mach_init::mach_thread_self,
    mach_port as mp, mach_types as mt, message as msg,
    port::{self, mach_port_t, MACH_PORT_NULL},
    thread_act, thread_status as ts,
    traps::mach_task_self,
};

/// Number of top level exception types
///
/// This is platform independent, but located in `<arch>/exception.h`
pub const EXC_TYPES_COUNT: usize = 14;

cfg_if::cfg_if! {
    if #[cfg(any(target_arch = "x86", target_arch = "x86_64"))] {
        pub const THREAD_STATE_NONE: ts::thread_state_flavor_t = 13;
    } else if #[cfg(any(target_arch = "arm", target_arch = "aarch64"))] {
        pub const THREAD_STATE_NONE: ts::thread_state_flavor_t = 5;
    }
}

/// The `mach_exception_raise` request id when `MACH_EXCEPTION_CODES` is in
/// the behavior, taken from mach_exc in /usr/include/mach/exc.defs. The
/// matching reply id is the request id + 100.
pub const MACH_EXCEPTION_RAISE: i32 = 2405;

/// `mach_msg` receive results we expect when `mach_port_destroy` pulls the
/// port out from under a pending receive
///
/// `mach/message.h`
pub const MACH_RCV_INVALID_NAME: kern_return_t = 0x1000_4002;
pub const MACH_RCV_PORT_CHANGED: kern_return_t = 0x1000_4006;
pub const MACH_RCV_PORT_DIED: kern_return_t = 0x1000_4009;

/// Network Data Representation Record
///
/// ndr.h
#[repr(C)]
#[derive(Copy, Clone)]
pub struct NDR_record_t {
    pub mig_vers: u8,
    pub if_vers: u8,
    pub reserved1: u8,
    pub mig_encoding: u8,
    pub int_rep: u8,
    pub char_rep: u8,
    pub float_rep: u8,
    pub reserved2: u8,
}

/// These structures and techniques are illustrated in Mac OS X Internals,
/// Amit Singh, ch 9.7
#[repr(C)]
pub struct ExceptionMessage {
    pub header: msg::mach_msg_header_t,
    pub body: msg::mach_msg_body_t,
    pub thread: msg::mach_msg_port_descriptor_t,
    pub task: msg::mach_msg_port_descriptor_t,
    pub ndr: NDR_record_t,
    pub exception: et::exception_type_t,
    pub code_count: msg::mach_msg_type_number_t,
    pub code: [i64; 2],
    pub padding: [u8; 512],
}

/// Whenever MIG detects an error, it sends back a generic `mig_reply_error_t`
/// format message. Clients must accept these in addition to the expected
/// reply message format.
///
/// `mig_errors.h`
#[repr(C)]
pub struct ExceptionRaiseReply {
    pub header: msg::mach_msg_header_t,
    pub ndr: NDR_record_t,
    pub ret_code: kern_return_t,
}

extern "C" {
    /// Atomically swaps the exception ports matching `exception_mask` that
    /// are registered for the thread with the new port, returning the
    /// previously registered ports so that they can be restored later.
    ///
    /// thread_act.h
    pub fn thread_swap_exception_ports(
        thread: mt::thread_t,
        exception_mask: et::exception_mask_t,
        new_port: mach_port_t,
        behavior: et::exception_behavior_t,
        new_flavor: ts::thread_state_flavor_t,
        masks: *mut et::exception_mask_t,
        masks_count: *mut msg::mach_msg_type_number_t,
        old_handlers: *mut mach_port_t,
        old_behaviors: *mut et::exception_behavior_t,
        old_flavors: *mut ts::thread_state_flavor_t,
    ) -> kern_return_t;

    /// Sets the exception port for the specified exceptions on the thread.
    ///
    /// thread_act.h
    pub fn thread_set_exception_ports(
        thread: mt::thread_t,
        exception_mask: et::exception_mask_t,
        new_port: mach_port_t,
        behavior: et::exception_behavior_t,
        new_flavor: ts::thread_state_flavor_t,
    ) -> kern_return_t;

    /// The host NDR
    ///
    /// <arch>/ndr_def.h
    pub static NDR_record: NDR_record_t;
}

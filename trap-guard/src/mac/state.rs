use super::ffi::*;
use crate::{
    outcome::{FlagState, OutcomeFlag},
    Error,
};
use std::{
    collections::BTreeMap,
    mem,
    sync::Arc,
    time::{Duration, Instant},
};
use trap_context::{
    arch::{Target, TrapArch},
    RegisterSnapshot, TrapRecord, THREAD_STATE_COUNT, THREAD_STATE_FLAVOR,
};

/// Threads with an armed guard.
///
/// The exception port itself is thread scoped; the registry only enforces
/// no-nesting and lets the classifier confirm the faulting thread really is
/// armed.
static REGISTRY: parking_lot::Mutex<BTreeMap<mt::thread_t, Arc<OutcomeFlag>>> =
    parking_lot::const_mutex(BTreeMap::new());

/// How long disarm waits for the server thread to wind down after the port
/// is torn down.
const SERVER_SHUTDOWN_WAIT: Duration = Duration::from_secs(5);

#[inline]
fn kern_ret(func: impl FnOnce() -> kern_return_t) -> Result<(), std::io::Error> {
    let res = func();

    if res == KERN_SUCCESS {
        Ok(())
    } else {
        Err(std::io::Error::from_raw_os_error(res))
    }
}

struct PreviousPort {
    /// The exception the port is masking
    mask: et::exception_mask_t,
    /// The port that is sent messages when the exception occurs
    port: mach_port_t,
    /// The way in which the exception is raised
    behavior: et::exception_behavior_t,
    /// The CPU context included with the exception
    flavor: ts::thread_state_flavor_t,
}

struct PreviousPorts {
    count: usize,
    ports: [PreviousPort; EXC_TYPES_COUNT],
}

struct AllocatedPort {
    port: mach_port_t,
}

impl Drop for AllocatedPort {
    fn drop(&mut self) {
        // mach_port_destroy rather than deallocate so that a receive still
        // pending on the port fails instead of waiting forever
        // SAFETY: syscall
        unsafe {
            mp::mach_port_destroy(mach_task_self(), self.port);
        }
    }
}

/// A guarded call armed on the calling thread: the receive port swapped in
/// as the thread's exception port, the ports it displaced, and the server
/// thread that resolves at most one fault message.
pub(super) struct ArmedGuard {
    thread: mt::thread_t,
    port: Option<AllocatedPort>,
    previous: PreviousPorts,
    server: Option<std::thread::JoinHandle<()>>,
    shared: Arc<OutcomeFlag>,
    disarmed: bool,
}

impl ArmedGuard {
    /// Arms the calling thread: swaps a fresh receive port in as its
    /// exception port for the illegal-instruction class only, then starts
    /// the exception server.
    pub(super) fn arm() -> Result<Self, Error> {
        // SAFETY: this is basically just a lot of syscalls we're doing
        unsafe {
            let thread = mach_thread_self();

            if REGISTRY.lock().contains_key(&thread) {
                return Err(Error::AlreadyGuarded);
            }

            let current_task = mach_task_self();
            let mut port = MACH_PORT_NULL;

            // Create a receive right so that we can actually receive
            // exception messages on the port
            kern_ret(|| {
                mp::mach_port_allocate(current_task, port::MACH_PORT_RIGHT_RECEIVE, &mut port)
            })
            .map_err(Error::PortAllocation)?;

            let port = AllocatedPort { port };

            // Add send right
            kern_ret(|| {
                mp::mach_port_insert_right(
                    current_task,
                    port.port,
                    port.port,
                    msg::MACH_MSG_TYPE_MAKE_SEND,
                )
            })
            .map_err(Error::PortAllocation)?;

            let behavior =
                // Send a mach_exception_raise message including the identity
                et::EXCEPTION_DEFAULT |
                // Send 64-bit code and subcode in the exception header
                et::MACH_EXCEPTION_CODES;

            let mut count = EXC_TYPES_COUNT as u32;
            let mut masks = [0; EXC_TYPES_COUNT];
            let mut ports = [0; EXC_TYPES_COUNT];
            let mut behaviors = [0; EXC_TYPES_COUNT];
            let mut flavors = [0; EXC_TYPES_COUNT];

            // Swap the exception port for the illegal-instruction class
            // only; every other class keeps whatever was registered before
            kern_ret(|| {
                thread_swap_exception_ports(
                    thread,
                    et::EXC_MASK_BAD_INSTRUCTION,
                    port.port,
                    behavior as _,
                    THREAD_STATE_NONE,
                    masks.as_mut_ptr(),
                    &mut count,
                    ports.as_mut_ptr(),
                    behaviors.as_mut_ptr(),
                    flavors.as_mut_ptr(),
                )
            })
            .map_err(Error::PortAllocation)?;

            let mut previous: PreviousPorts = mem::zeroed();
            previous.count = count as usize;
            for i in 0..previous.count {
                previous.ports[i] = PreviousPort {
                    mask: masks[i],
                    port: ports[i],
                    behavior: behaviors[i],
                    flavor: flavors[i],
                };
            }

            let shared = Arc::new(OutcomeFlag::new());
            REGISTRY.lock().insert(thread, shared.clone());

            let server_shared = shared.clone();
            let server_port = port.port;
            let server = std::thread::spawn(move || {
                exception_server(server_port, thread, server_shared);
            });

            Ok(Self {
                thread,
                port: Some(port),
                previous,
                server: Some(server),
                shared,
                disarmed: false,
            })
        }
    }

    /// Restores the displaced exception ports, tears the receive port down
    /// (which breaks a still-pending receive), and joins the server with a
    /// bounded wait.
    pub(super) fn disarm(&mut self) -> Result<(), Error> {
        if self.disarmed {
            return Ok(());
        }
        self.disarmed = true;

        REGISTRY.lock().remove(&self.thread);

        // SAFETY: syscalls
        unsafe {
            // Detach our port first (the displaced set may not have covered
            // the mask at all), then reinstate what was there before. Best
            // effort, the guard is going away either way
            let _ = thread_set_exception_ports(
                self.thread,
                et::EXC_MASK_BAD_INSTRUCTION,
                MACH_PORT_NULL,
                et::EXCEPTION_DEFAULT as _,
                THREAD_STATE_NONE,
            );

            for pp in &self.previous.ports[..self.previous.count] {
                let _ = thread_set_exception_ports(
                    self.thread,
                    pp.mask,
                    pp.port,
                    pp.behavior,
                    pp.flavor,
                );
            }
        }

        self.port.take();

        if let Some(server) = self.server.take() {
            let deadline = Instant::now() + SERVER_SHUTDOWN_WAIT;
            while !server.is_finished() {
                if Instant::now() >= deadline {
                    debug_print!("exception server outlived the disarm wait");
                    return Err(Error::Timeout);
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            let _ = server.join();
        }

        Ok(())
    }

    pub(super) fn take_resolution(&self) -> FlagState {
        self.shared.take()
    }
}

impl Drop for ArmedGuard {
    fn drop(&mut self) {
        let _ = self.disarm();
    }
}

/// Verdict on a received exception message.
enum Fault {
    /// An illegal-instruction fault raised by the guarded thread of this
    /// task: patch and resume.
    Illegal(TrapRecord),
    /// Anything else. Replying with a failure code makes the kernel fall
    /// through to the previously registered, normally fatal, handling.
    ForwardToDefault,
}

fn classify(request: &ExceptionMessage, guarded_thread: mt::thread_t) -> Fault {
    // A forked child inheriting our port sends its exceptions here too; the
    // failure reply moves the kernel on to the handler for that task
    if request.header.msgh_id != MACH_EXCEPTION_RAISE
        || request.task.name != unsafe { mach_task_self() }
        || request.exception != et::EXC_BAD_INSTRUCTION as i32
    {
        return Fault::ForwardToDefault;
    }

    let thread = request.thread.name;
    if thread != guarded_thread || !REGISTRY.lock().contains_key(&thread) {
        return Fault::ForwardToDefault;
    }

    Fault::Illegal(TrapRecord {
        kind: request.exception,
        code: request.code[0],
        subcode: (request.code_count > 1).then_some(request.code[1]),
        thread,
        task: request.task.name,
    })
}

/// Rewrites the suspended thread's saved register state so the kernel
/// resumes it just past the trapping opcode, returning the resume address.
fn patch_thread_state(thread: mt::thread_t) -> Result<u64, Error> {
    // SAFETY: syscalls on a thread the kernel has suspended for us
    unsafe {
        let mut state: RegisterSnapshot = mem::zeroed();
        let mut count = THREAD_STATE_COUNT;

        kern_ret(|| {
            thread_act::thread_get_state(
                thread,
                THREAD_STATE_FLAVOR,
                (&mut state as *mut RegisterSnapshot).cast(),
                &mut count,
            )
        })
        .map_err(Error::StatePatch)?;

        let resumed = Target::skip_trap_instruction(&mut state);

        kern_ret(|| {
            thread_act::thread_set_state(
                thread,
                THREAD_STATE_FLAVOR,
                (&mut state as *mut RegisterSnapshot).cast(),
                count,
            )
        })
        .map_err(Error::StatePatch)?;

        Ok(resumed)
    }
}

/// Waits for at most one message on the guarded thread's exception port and
/// resolves it. The faulting thread stays suspended by the kernel until the
/// reply is sent, so the patch below always lands before the thread resumes.
fn exception_server(port: mach_port_t, guarded_thread: mt::thread_t, shared: Arc<OutcomeFlag>) {
    // SAFETY: syscalls + plain-old-data message buffers
    unsafe {
        let mut request: ExceptionMessage = mem::zeroed();
        request.header.msgh_local_port = port;
        request.header.msgh_size = mem::size_of_val(&request) as u32;

        let kret = msg::mach_msg(
            &mut request.header,
            msg::MACH_RCV_MSG | msg::MACH_RCV_LARGE,
            0,
            mem::size_of_val(&request) as u32,
            port,
            msg::MACH_MSG_TIMEOUT_NONE,
            MACH_PORT_NULL,
        );

        if kret != KERN_SUCCESS {
            // The disarm path destroys the port to break this receive once
            // the block has finished without faulting; anything else is a
            // real delivery failure
            if !matches!(
                kret,
                MACH_RCV_PORT_CHANGED | MACH_RCV_PORT_DIED | MACH_RCV_INVALID_NAME
            ) {
                shared.set_error(Error::MessageDelivery(std::io::Error::from_raw_os_error(
                    kret,
                )));
            }
            debug_print!("exception server wound down without a fault");
            return;
        }

        let ret_code = match classify(&request, guarded_thread) {
            Fault::Illegal(record) => {
                debug_print!("intercepted illegal instruction");

                match patch_thread_state(record.thread) {
                    Ok(_) => {
                        shared.set_trapped(record);
                        KERN_SUCCESS
                    }
                    Err(error) => {
                        // The failure reply is deliberate: resuming with an
                        // unpatched program counter would re-trap forever
                        shared.set_error(error);
                        KERN_FAILURE
                    }
                }
            }
            Fault::ForwardToDefault => {
                debug_print!("rejecting fault, falling through to default handling");
                KERN_FAILURE
            }
        };

        // This reply format was derived from the exc_server generated by
        // 'mig -v /usr/include/mach/mach_exc.defs'
        let mut reply: ExceptionRaiseReply = mem::zeroed();
        reply.header.msgh_bits =
            msg::MACH_MSGH_BITS(request.header.msgh_bits & msg::MACH_MSGH_BITS_REMOTE_MASK, 0);
        reply.header.msgh_size = mem::size_of_val(&reply) as u32;
        reply.header.msgh_remote_port = request.header.msgh_remote_port;
        reply.header.msgh_local_port = MACH_PORT_NULL;
        reply.header.msgh_id = request.header.msgh_id + 100;
        reply.ndr = NDR_record;
        reply.ret_code = ret_code;

        let kret = msg::mach_msg(
            &mut reply.header,
            msg::MACH_SEND_MSG,
            mem::size_of_val(&reply) as u32,
            0,
            MACH_PORT_NULL,
            msg::MACH_MSG_TIMEOUT_NONE,
            MACH_PORT_NULL,
        );

        if kret != KERN_SUCCESS {
            shared.set_error(Error::MessageDelivery(std::io::Error::from_raw_os_error(
                kret,
            )));
        }
    }
}

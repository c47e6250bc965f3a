//! An illegal instruction on a thread without an armed guard must stay
//! fatal, even while a guard is armed on another thread; the faulting half
//! of this test runs in a child process.

use std::process::Command;

const CHILD_ENV: &str = "TRAP_GUARD_TEST_UNGUARDED_CHILD";

#[test]
fn unguarded_thread_fault_stays_fatal() {
    if std::env::var_os(CHILD_ENV).is_some() {
        let _ = trap_guard::run_guarded(|| {
            // this thread is armed, the spawned one is not
            let _ = std::thread::spawn(fault_generator::raise_illegal_instruction).join();
        });

        // the fault on the unguarded thread kills the process first
        std::process::exit(0);
    }

    let status = Command::new(std::env::current_exe().unwrap())
        .env(CHILD_ENV, "1")
        .status()
        .unwrap();

    assert!(!status.success());

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(status.signal(), Some(libc::SIGILL));
    }
}

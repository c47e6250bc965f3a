//! A fault class other than illegal-instruction must keep its default fatal
//! behavior, so the faulting half of this test runs in a child process.

use std::process::Command;

const CHILD_ENV: &str = "TRAP_GUARD_TEST_SEGV_CHILD";

#[test]
fn does_not_intercept_segfault() {
    if std::env::var_os(CHILD_ENV).is_some() {
        let _ = trap_guard::run_guarded(fault_generator::raise_segfault);

        // the segfault keeps its default disposition, so this is unreachable
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
        assert_eq!(status.signal(), Some(libc::SIGSEGV));
    }
}

use trap_guard::Outcome;

#[test]
fn intercepts_illegal_instruction() {
    let mut reached = false;
    let mut resumed = false;

    let outcome = trap_guard::run_guarded(|| {
        reached = true;

        fault_generator::raise_illegal_instruction();

        // only reachable because the fault was patched past
        resumed = true;
        42
    })
    .unwrap();

    assert!(reached);
    assert!(resumed, "the thread was not resumed past the trap");

    let record = match outcome {
        Outcome::Trapped(record) => record,
        Outcome::Completed(_) => panic!("the fault was not intercepted"),
    };

    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        assert_eq!(record.signo, libc::SIGILL);
        // a hardware-raised fault, not a kill()
        assert!(record.code > 0);
        assert_ne!(record.address, 0);
        assert_eq!(record.pid, std::process::id() as libc::pid_t);
    }

    #[cfg(target_os = "macos")]
    {
        // EXC_BAD_INSTRUCTION
        assert_eq!(record.kind, 2);
        assert_ne!(record.thread, 0);
    }
}

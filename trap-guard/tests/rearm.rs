use trap_guard::Outcome;

/// Alternating trapped and completed calls on one thread must not leak any
/// armed state from one call into the next.
#[test]
fn disarm_leaves_no_stale_state() {
    for i in 0..3 {
        let trapped = trap_guard::run_guarded(|| {
            fault_generator::raise_illegal_instruction();
        })
        .unwrap();
        assert!(trapped.is_trapped(), "iteration {i} did not trap");

        let completed = trap_guard::run_guarded(|| i).unwrap();
        assert!(matches!(completed, Outcome::Completed(n) if n == i));
    }
}

use trap_guard::{Error, Outcome};

/// Guards do not nest on a single thread: the inner arm fails before its
/// block runs, and the outer call is unaffected.
#[test]
fn nested_guard_on_same_thread_is_rejected() {
    let outcome = trap_guard::run_guarded(|| {
        let inner = trap_guard::run_guarded(|| 1);
        assert!(matches!(inner, Err(Error::AlreadyGuarded)));
        2
    })
    .unwrap();

    assert!(matches!(outcome, Outcome::Completed(2)));

    // the rejected inner call must not have disturbed the outer disarm
    let after = trap_guard::run_guarded(|| 3).unwrap();
    assert!(matches!(after, Outcome::Completed(3)));
}

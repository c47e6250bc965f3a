use trap_guard::Outcome;

/// A panic unwinding out of the block still disarms the thread, so the
/// thread can be guarded again afterwards.
#[test]
fn disarms_after_panicking_block() {
    let result = std::panic::catch_unwind(|| {
        let _ = trap_guard::run_guarded(|| -> u32 { panic!("boom") });
    });
    assert!(result.is_err());

    let outcome = trap_guard::run_guarded(|| 5).unwrap();
    assert!(matches!(outcome, Outcome::Completed(5)));
}

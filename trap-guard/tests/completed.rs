use trap_guard::Outcome;

#[test]
fn completes_without_fault() {
    let outcome = trap_guard::run_guarded(|| 42).unwrap();
    assert!(matches!(outcome, Outcome::Completed(42)));

    // The prior fault-delivery configuration was restored on disarm, so
    // arming the same thread again must succeed
    let again = trap_guard::run_guarded(|| "ok").unwrap();
    assert_eq!(again.completed(), Some("ok"));
}

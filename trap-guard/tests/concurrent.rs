use std::sync::{Arc, Barrier};

/// Guarded calls on two distinct threads run at the same time and each
/// report their own outcome.
#[test]
fn independent_threads_do_not_interfere() {
    let barrier = Arc::new(Barrier::new(2));

    let trapping = {
        let barrier = barrier.clone();
        std::thread::spawn(move || {
            trap_guard::run_guarded(|| {
                barrier.wait();
                fault_generator::raise_illegal_instruction();
                1
            })
            .unwrap()
        })
    };

    let completing = {
        let barrier = barrier.clone();
        std::thread::spawn(move || {
            trap_guard::run_guarded(|| {
                barrier.wait();
                2
            })
            .unwrap()
        })
    };

    let trapped = trapping.join().unwrap();
    let completed = completing.join().unwrap();

    assert!(trapped.is_trapped());
    assert_eq!(completed.completed(), Some(2));
}

/// Both threads trapping at once each get their own record.
#[test]
fn concurrent_traps_resolve_independently() {
    let barrier = Arc::new(Barrier::new(2));

    let spawn = |barrier: Arc<Barrier>| {
        std::thread::spawn(move || {
            trap_guard::run_guarded(|| {
                barrier.wait();
                fault_generator::raise_illegal_instruction();
            })
            .unwrap()
        })
    };

    let a = spawn(barrier.clone());
    let b = spawn(barrier);

    let a = a.join().unwrap();
    let b = b.join().unwrap();

    assert!(a.is_trapped());
    assert!(b.is_trapped());

    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        let (ra, rb) = (a.trap().unwrap(), b.trap().unwrap());
        assert_ne!(ra.tid, rb.tid);
    }
}

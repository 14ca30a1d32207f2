use std::panic;
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

// https://github.com/rust-lang/rfcs/issues/2798#issuecomment-552949300
pub fn panic_after<T, F>(millis: u64, f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T,
    F: Send + 'static,
{
    let (done_tx, done_rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        let val = f();
        done_tx.send(()).expect("Unable to send completion signal");
        val
    });

    match done_rx.recv_timeout(Duration::from_millis(millis)) {
        Ok(_) => handle.join().expect("Thread panicked"),
        Err(e) => panic!("Thread took too long: {}", e),
    }
}

lazy_static! {
    static ref SERIAL_TEST_LOCK: Mutex<()> = Mutex::default();
}

// force some tests to be executed serially
pub fn serial_test<F>(f: F)
where
    F: FnOnce(),
{
    // Ignore poisoning left by an earlier failed test.
    let _lock = SERIAL_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    f();
}

// Always execute a cleanup closure no matter the test panics or not.
pub fn with_cleanup<T, C>(test: T, cleanup: C)
where
    T: FnOnce() + panic::UnwindSafe,
    C: FnOnce(),
{
    let res = panic::catch_unwind(test);
    cleanup();
    if let Err(e) = res {
        panic::resume_unwind(e);
    }
}

/// Options for a small, quick runtime: few types, few fields, no allocation-triggered
/// collections.
pub fn small_options(plan: crate::plan::PlanSelector) -> crate::util::options::Options {
    let mut options = crate::util::options::Options::builtin();
    options.plan = plan;
    options.type_count = 16;
    options.max_fields = 4;
    options.stress_factor = 0;
    options
}

pub fn small_runtime(plan: crate::plan::PlanSelector) -> std::sync::Arc<crate::Runtime> {
    let options = small_options(plan);
    let plugin = crate::plan::create(plan, &options);
    std::sync::Arc::new(crate::Runtime::new(plugin.as_ref(), &options).unwrap())
}

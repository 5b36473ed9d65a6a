//! Private helpers for testing and examples in stream_events.

use std::env;
use std::panic;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// Runs a test on a separate thread and fails it if it does not finish in time.
///
/// Queue workers and blocking waits can hang a broken test forever. The watchdog turns such a
/// hang into a failure after 10 seconds, or 60 seconds under Miri.
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the watchdog is disabled and
/// the test runs directly on the calling thread so that hanging mutations can be detected.
///
/// # Panics
///
/// Panics if the test exceeds the timeout. Panics of the test itself are propagated.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// let answer = with_watchdog(|| 6 * 7);
/// assert_eq!(answer, 42);
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let (tx, rx) = mpsc::channel();

    let test_thread = thread::spawn(move || {
        let result = test_fn();
        // The receiver is gone if we already timed out.
        drop(tx.send(result));
    });

    match rx.recv_timeout(watchdog_timeout()) {
        Ok(result) => {
            test_thread.join().expect("test thread should not panic after sending its result");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test exceeded the {:?} watchdog timeout", watchdog_timeout());
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_thread.join() {
            Ok(()) => panic!("test thread disconnected without a result"),
            Err(payload) => panic::resume_unwind(payload),
        },
    }
}

/// Polls `condition` until it returns `true` or the watchdog timeout elapses.
///
/// Returns whether the condition was observed to hold.
#[must_use]
pub fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now()
        .checked_add(watchdog_timeout())
        .expect("deadline is near enough to be representable");

    while Instant::now() < deadline {
        if condition() {
            return true;
        }

        thread::sleep(Duration::from_millis(1));
    }

    condition()
}

fn watchdog_timeout() -> Duration {
    if cfg!(miri) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(10)
    }
}

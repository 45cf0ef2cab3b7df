use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Longest single sleep between checks of the stop flag.
const STOP_POLL: Duration = Duration::from_millis(50);

/// Sleep for `ms`, waking early once `stop` is set.
///
/// Returns `false` when the pause was cut short.
pub fn sleep_interruptible(stop: &AtomicBool, ms: u64) -> bool {
    let deadline = Instant::now() + Duration::from_millis(ms);
    loop {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(STOP_POLL.min(deadline - now));
    }
}

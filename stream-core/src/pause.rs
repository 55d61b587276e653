use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::constants::SHUTDOWN_POLL_TICK;

/// Спит `interval`, проверяя `shutdown` каждые `SHUTDOWN_POLL_TICK`.
/// Возвращает `false`, если пауза прервана остановкой.
pub fn pause(interval: Duration, shutdown: &AtomicBool) -> bool {
    pause_with_tick(interval, shutdown, SHUTDOWN_POLL_TICK)
}

pub fn pause_with_tick(interval: Duration, shutdown: &AtomicBool, tick: Duration) -> bool {
    let started = Instant::now();
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        let elapsed = started.elapsed();
        if elapsed >= interval {
            return true;
        }
        std::thread::sleep((interval - elapsed).min(tick));
    }
}

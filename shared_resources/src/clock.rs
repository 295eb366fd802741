use std::thread;
use std::time::Duration;

use lazy_static::lazy_static;
use parking_lot::{Condvar, Mutex};

/// Global simulation clock.
///
/// Every simulated delay in the system (car movement, doors, boarding,
/// request generation) goes through `sleep`, so the whole simulation can be
/// sped up, slowed down or paused live without touching the control logic.
const MIN_SPEED: f64 = 0.1;
const MAX_SPEED: f64 = 30.0;

lazy_static! {
    static ref SPEED: Mutex<f64> = Mutex::new(1.0);
    static ref PAUSED: Mutex<bool> = Mutex::new(false);
    static ref PAUSE_CVAR: Condvar = Condvar::new();
}

pub fn speed() -> f64 {
    *SPEED.lock()
}

pub fn set_speed(new_speed: f64) {
    if !new_speed.is_finite() {
        return;
    }
    *SPEED.lock() = new_speed.clamp(MIN_SPEED, MAX_SPEED);
}

pub fn is_paused() -> bool {
    *PAUSED.lock()
}

pub fn set_paused(paused: bool) {
    *PAUSED.lock() = paused;
    if !paused {
        PAUSE_CVAR.notify_all();
    }
}

pub fn toggle_pause() {
    let mut paused = PAUSED.lock();
    *paused = !*paused;
    if !*paused {
        PAUSE_CVAR.notify_all();
    }
}

pub fn sleep(base_millis: u64) {
    if base_millis == 0 {
        return;
    }

    // Pause barrier
    {
        let mut paused = PAUSED.lock();
        while *paused {
            let _ = PAUSE_CVAR.wait_for(&mut paused, Duration::from_millis(50));
        }
    }

    let s = speed();
    let scaled = ((base_millis as f64 / s).round() as u64).max(1);
    thread::sleep(Duration::from_millis(scaled));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    // Single test: the clock state is global, so exercising clamping and
    // scaling from separate concurrent test threads would race.
    #[test]
    fn speed_is_clamped_and_scales_sleep() {
        set_speed(1000.0);
        assert_eq!(speed(), MAX_SPEED);
        set_speed(0.0001);
        assert_eq!(speed(), MIN_SPEED);
        set_speed(f64::NAN);
        assert_eq!(speed(), MIN_SPEED);

        set_speed(MAX_SPEED);
        let start = Instant::now();
        sleep(300);
        // 300 ms at 30x is 10 ms; allow generous scheduling slack.
        assert!(start.elapsed() < Duration::from_millis(200));
        set_speed(1.0);
    }

    #[test]
    fn zero_sleep_returns_immediately() {
        let start = Instant::now();
        sleep(0);
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}

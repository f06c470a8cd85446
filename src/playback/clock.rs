//! Millisecond clocks for the scheduler
//!
//! Tick counts are `u32` and wrap; compare them only through `ticks_diff`.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Signed distance from `b` to `a`, correct across wraparound
pub fn ticks_diff(a: u32, b: u32) -> i32 {
    a.wrapping_sub(b) as i32
}

/// Source of monotonic, wrapping millisecond ticks
pub trait Clock {
    /// Current tick count
    fn now_ms(&self) -> u32;

    /// Block for roughly `ms` milliseconds
    fn pause(&mut self, ms: u32);
}

/// Wall clock backed by `Instant`
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        // truncation is the wraparound
        self.origin.elapsed().as_millis() as u32
    }

    fn pause(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }
}

/// Clock that only moves when paused
///
/// Clones share the same time, so a test can read the clock while the
/// scheduler owns it.
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    now: Rc<Cell<u32>>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start at an arbitrary tick, e.g. just before wraparound
    pub fn starting_at(ms: u32) -> Self {
        Self {
            now: Rc::new(Cell::new(ms)),
        }
    }
}

impl Clock for VirtualClock {
    fn now_ms(&self) -> u32 {
        self.now.get()
    }

    fn pause(&mut self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_diff_across_wrap() {
        assert_eq!(ticks_diff(10, 5), 5);
        assert_eq!(ticks_diff(5, 10), -5);
        assert_eq!(ticks_diff(3, u32::MAX - 1), 5);
        assert_eq!(ticks_diff(u32::MAX - 1, 3), -5);
    }

    #[test]
    fn test_virtual_clock_shared() {
        let clock = VirtualClock::starting_at(u32::MAX);
        let mut handle = clock.clone();
        handle.pause(2);
        assert_eq!(clock.now_ms(), 1);
    }

    #[test]
    fn test_system_clock_advances() {
        let mut clock = SystemClock::new();
        let start = clock.now_ms();
        clock.pause(2);
        assert!(ticks_diff(clock.now_ms(), start) >= 2);
    }
}

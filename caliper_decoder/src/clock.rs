/*!
Debounced clock edge waits.

Every wait is bounded by a poll count rather than by elapsed time: a host that
gets descheduled mid-wait would otherwise blow through a time budget without
having looked at the line at all.
*/

use crate::error_mask::{ErrorMask, Flag};
use crate::gpio::Gpio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Result of one clock wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockWait {
    /// Ticks from the start of the wait until it finished or gave up
    pub duration: u32,

    /// Anomalies seen during this wait only
    pub errors: ErrorMask,
}

impl ClockWait {
    /// The poll budget ran out before the clock settled at the target level
    pub fn timed_out(&self) -> bool {
        self.errors.has(Flag::Timeout)
    }
}

/// Waits for the clock line to settle at a level
#[derive(Debug, Clone)]
pub struct ClockWaiter {
    pin: u8,
    poll_budget: u32,
    running: Option<Arc<AtomicBool>>,
}

impl ClockWaiter {
    /// Create a waiter polling `pin` at most `poll_budget` times per wait
    pub fn new(pin: u8, poll_budget: u32) -> Self {
        Self {
            pin,
            poll_budget,
            running: None,
        }
    }

    /// End every wait early, as a timeout, once `running` is cleared
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = Some(running);
        self
    }

    fn stopped(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.load(Ordering::Relaxed))
    }

    /// Poll the clock until it reads `target` on `min_stable` consecutive polls.
    ///
    /// A run broken before reaching `min_stable` counts as one clock glitch.
    /// Reaching the target within the first `min_stable + 1` polls means the
    /// line was already there when the wait began, so the real transition was
    /// missed and [`Flag::TooLateForClock`] is set.
    pub fn wait_for_level<G: Gpio>(
        &self,
        gpio: &mut G,
        target: bool,
        min_stable: u32,
    ) -> ClockWait {
        let min_stable = min_stable.max(1);
        let started = gpio.now();
        let mut errors = ErrorMask::new();
        let mut run = 0u32;
        let mut polls = 0u32;

        loop {
            if gpio.read(self.pin) == target {
                run += 1;
                if run >= min_stable {
                    if polls <= min_stable {
                        errors.set(Flag::TooLateForClock);
                    }
                    break;
                }
            } else if run > 0 {
                run = 0;
                errors.add_clock_glitch();
            }

            if polls >= self.poll_budget || self.stopped() {
                errors.set(Flag::Timeout);
                break;
            }
            polls += 1;
        }

        ClockWait {
            duration: gpio.now().since(started),
            errors,
        }
    }
}

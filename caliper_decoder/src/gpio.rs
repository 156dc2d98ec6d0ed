/*!
GPIO collaborator interface.

The decoder only needs to read two input lines, drive one output line and
read a free-running microsecond counter. Anything that provides those can
stand behind [`Gpio`]: a real pin driver or the simulated caliper in
[`crate::sim`].
*/

use crate::error::{CaliperError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Microsecond timestamp from a free-running counter.
///
/// Only differences between ticks are meaningful. The counter may wrap, so
/// differences are always taken with wrapping arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tick(pub u32);

impl Tick {
    /// Ticks elapsed from `earlier` to `self`, tolerating one wrap
    pub fn since(self, earlier: Tick) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }
}

/// Pin direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// Hardware access required by the decoder
pub trait Gpio {
    /// Set the direction of a pin
    fn configure(&mut self, pin: u8, direction: Direction) -> Result<()>;

    /// Drive an output pin
    fn write(&mut self, pin: u8, level: bool) -> Result<()>;

    /// Sample an input pin.
    ///
    /// This sits in the innermost polling loop, so it cannot fail; backends
    /// that can hit read errors must map them to a level themselves.
    fn read(&mut self, pin: u8) -> bool;

    /// Current value of the microsecond counter
    fn now(&mut self) -> Tick;

    /// Pause between frame attempts
    fn delay(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }

    /// Release every claimed pin
    fn shutdown(&mut self) -> Result<()>;
}

/// Pin assignment (BCM numbering on a Raspberry Pi)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinConfig {
    /// Output that powers the caliper (header pin 19)
    pub power: u8,

    /// Caliper clock input (header pin 21)
    pub clock: u8,

    /// Caliper data input (header pin 23)
    pub data: u8,
}

impl PinConfig {
    /// Reject assignments that reuse a pin
    pub fn validate(&self) -> Result<()> {
        if self.power == self.clock || self.power == self.data || self.clock == self.data {
            return Err(CaliperError::pin(format!(
                "power, clock and data must be distinct pins (got {}, {}, {})",
                self.power, self.clock, self.data
            )));
        }
        Ok(())
    }
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            power: 10,
            clock: 9,
            data: 11,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_difference() {
        assert_eq!(Tick(150).since(Tick(100)), 50);
    }

    #[test]
    fn test_tick_difference_across_wrap() {
        let before = Tick(u32::MAX - 9);
        let after = Tick(20);
        assert_eq!(after.since(before), 30);
    }

    #[test]
    fn test_default_pins() {
        let pins = PinConfig::default();
        assert_eq!((pins.power, pins.clock, pins.data), (10, 9, 11));
        assert!(pins.validate().is_ok());
    }

    #[test]
    fn test_duplicate_pins_rejected() {
        let pins = PinConfig {
            power: 9,
            clock: 9,
            data: 11,
        };
        assert!(matches!(pins.validate(), Err(CaliperError::Pin(_))));
    }
}

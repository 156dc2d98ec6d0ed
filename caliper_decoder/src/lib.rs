/*!
# Caliper Decoder

Bit-level decoder for the synchronous serial output of low-cost digital
calipers that transmit two 24-bit words per frame (20480 counts per inch).

## Core Types

- [`ErrorMask`] - Anomaly flags and glitch counters for one decode attempt
- [`RawWord`] - 24-bit word assembled LSB first
- [`Frame`] - Two decoded words plus the anomalies seen while decoding them
- [`Reading`] - A frame converted to millimeters

## Modules

- [`gpio`] - GPIO collaborator trait and tick arithmetic
- [`clock`] - Debounced clock edge waits
- [`sync`] - Start-of-frame detection
- [`word`] - Data sampling and word assembly
- [`decoder`] - Whole-frame decoding
- [`reader`] - Retry policy and the read loop
- [`units`] - Count to millimeter conversion
- [`sim`] - Simulated caliper for tests and dry runs
*/

pub mod clock;
pub mod decoder;
pub mod error;
pub mod error_mask;
pub mod frame;
pub mod gpio;
pub mod reader;
pub mod sim;
pub mod sync;
pub mod units;
pub mod word;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use decoder::{CaliperSession, FrameOutcome};
pub use error::{CaliperError, Result};
pub use error_mask::{ErrorMask, Severity};
pub use frame::Frame;
pub use gpio::{Direction, Gpio, PinConfig, Tick};
pub use reader::{LoopStats, ReadEvent, ReadLoop, RetryPolicy};
pub use units::Reading;
pub use word::RawWord;

/// Version information for the decoder library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol constants
pub mod protocol {
    use serde::{Deserialize, Serialize};

    /// Data bits in one caliper word
    pub const BITS_PER_WORD: u32 = 24;

    /// Words transmitted per frame (absolute position, then display value)
    pub const WORDS_PER_FRAME: usize = 2;

    /// Bits accepted while hunting for a late word boundary before giving up
    pub const MAX_BITS_PER_WORD: u32 = 28;

    /// Mask selecting the 24 data bits of a word
    pub const WORD_MASK: u32 = 0x00FF_FFFF;

    /// Sign bit of a 24-bit word
    pub const WORD_SIGN_BIT: u32 = 0x0080_0000;

    /// Caliper resolution
    pub const COUNTS_PER_INCH: f64 = 20480.0;

    /// Millimeters per inch
    pub const MM_PER_INCH: f64 = 25.4;

    /// Millimeters per raw count (25.4 / 20480)
    pub const MM_PER_COUNT: f64 = MM_PER_INCH / COUNTS_PER_INCH;

    /// Decoder timing parameters, in ticks (microseconds) and poll counts.
    ///
    /// Defaults reproduce the caliper's native framing at 76.8 kbit/s.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct ProtocolConfig {
        /// Shortest accepted start pulse
        pub start_pulse_min: u32,

        /// Longest accepted start pulse
        pub start_pulse_max: u32,

        /// Clock-high dwell above which a word boundary is assumed
        pub word_boundary_dwell: u32,

        /// No clock activity for longer than this means the caliper is off
        pub clock_stuck_ticks: u32,

        /// Consecutive high reads required before accepting the pre-frame high
        pub sync_stable_reads: u32,

        /// Consecutive reads required to accept any other clock edge
        pub edge_stable_reads: u32,

        /// Start pulses this short or shorter are treated as glitches
        pub glitch_dwell: u32,

        /// Data line samples per bit
        pub oversample: u32,

        /// Poll budget for a single clock wait
        pub poll_budget: u32,
    }

    impl Default for ProtocolConfig {
        fn default() -> Self {
            Self {
                start_pulse_min: 45,
                start_pulse_max: 60,
                word_boundary_dwell: 20,
                clock_stuck_ticks: 400_000, // caliper sends ~3 frames per second
                sync_stable_reads: 20,
                edge_stable_reads: 3,
                glitch_dwell: 1,
                oversample: 3,
                poll_budget: 10_000_000,
            }
        }
    }
}

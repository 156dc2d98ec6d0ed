/*!
Per-attempt anomaly accumulator.

An [`ErrorMask`] starts empty at the beginning of each frame attempt and only
ever grows: flags are set, glitch counters climb (saturating at 255). The
decoder never clears a mask mid-attempt except for discarding noise collected
before a valid start pulse.
*/

use serde::Serialize;
use std::fmt;

/// Structural and advisory anomaly flags.
///
/// The discriminants are the bit positions used by the compact hex report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u32)]
pub enum Flag {
    TooLateForClock = 0x0001_0000,
    StartTooShort = 0x0010_0000,
    StartTooLong = 0x0020_0000,
    WrongBitCount = 0x0040_0000,
    ClockStuckLow = 0x0100_0000,
    Timeout = 0x4000_0000,
}

impl Flag {
    /// Every flag, in report order
    pub const ALL: [Flag; 6] = [
        Flag::TooLateForClock,
        Flag::StartTooShort,
        Flag::StartTooLong,
        Flag::WrongBitCount,
        Flag::ClockStuckLow,
        Flag::Timeout,
    ];

    /// Bit used for this flag in [`ErrorMask::to_bits`]
    pub fn bit(self) -> u32 {
        self as u32
    }

    /// Structural flags abort the attempt; the rest only qualify a reading
    pub fn is_structural(self) -> bool {
        !matches!(self, Flag::TooLateForClock)
    }

    /// Human readable name
    pub fn as_str(self) -> &'static str {
        match self {
            Flag::TooLateForClock => "too late for clock",
            Flag::StartTooShort => "start too short",
            Flag::StartTooLong => "start too long",
            Flag::WrongBitCount => "wrong bit count",
            Flag::ClockStuckLow => "clock stuck low",
            Flag::Timeout => "clock timeout",
        }
    }
}

/// How much a mask should be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    /// Nothing unusual was observed
    Clean,
    /// Glitches or late edges, but the frame structure was intact
    Degraded,
    /// The frame structure was broken; any decoded value is unusable
    Fatal,
}

const CLOCK_GLITCH_SHIFT: u32 = 0;
const DATA_GLITCH_SHIFT: u32 = 8;

/// Anomalies accumulated during one frame attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ErrorMask {
    clock_glitches: u8,
    data_glitches: u8,
    flags: u32,
}

impl ErrorMask {
    /// An empty mask
    pub fn new() -> Self {
        Self::default()
    }

    /// A mask with a single flag set
    pub fn with(flag: Flag) -> Self {
        let mut mask = Self::new();
        mask.set(flag);
        mask
    }

    /// Set a flag
    pub fn set(&mut self, flag: Flag) {
        self.flags |= flag.bit();
    }

    /// Check whether a flag is set
    pub fn has(&self, flag: Flag) -> bool {
        self.flags & flag.bit() != 0
    }

    /// Count one spurious clock transition
    pub fn add_clock_glitch(&mut self) {
        self.clock_glitches = self.clock_glitches.saturating_add(1);
    }

    /// Count one ambiguous data sample group
    pub fn add_data_glitch(&mut self) {
        self.data_glitches = self.data_glitches.saturating_add(1);
    }

    /// Clock glitch count
    pub fn clock_glitches(&self) -> u8 {
        self.clock_glitches
    }

    /// Data glitch count
    pub fn data_glitches(&self) -> u8 {
        self.data_glitches
    }

    /// Fold another mask into this one
    pub fn merge(&mut self, other: ErrorMask) {
        self.flags |= other.flags;
        self.clock_glitches = self.clock_glitches.saturating_add(other.clock_glitches);
        self.data_glitches = self.data_glitches.saturating_add(other.data_glitches);
    }

    /// Flags currently set, in report order
    pub fn flags(&self) -> impl Iterator<Item = Flag> + '_ {
        Flag::ALL.into_iter().filter(move |flag| self.has(*flag))
    }

    /// No flag set and no glitches counted
    pub fn is_empty(&self) -> bool {
        self.flags == 0 && self.clock_glitches == 0 && self.data_glitches == 0
    }

    /// Any structural flag set
    pub fn is_fatal(&self) -> bool {
        self.flags().any(Flag::is_structural)
    }

    /// Overall classification of this mask
    pub fn severity(&self) -> Severity {
        if self.is_fatal() {
            Severity::Fatal
        } else if self.is_empty() {
            Severity::Clean
        } else {
            Severity::Degraded
        }
    }

    /// Pack into the compact 32-bit report layout.
    ///
    /// Clock glitches occupy bits 0-7, data glitches bits 8-15 and each
    /// [`Flag`] its own bit above that.
    pub fn to_bits(&self) -> u32 {
        self.flags
            | (self.clock_glitches as u32) << CLOCK_GLITCH_SHIFT
            | (self.data_glitches as u32) << DATA_GLITCH_SHIFT
    }

    /// Unpack from the compact 32-bit report layout, ignoring unknown bits
    pub fn from_bits(bits: u32) -> Self {
        let known = Flag::ALL.iter().fold(0, |acc, flag| acc | flag.bit());
        Self {
            clock_glitches: ((bits >> CLOCK_GLITCH_SHIFT) & 0xFF) as u8,
            data_glitches: ((bits >> DATA_GLITCH_SHIFT) & 0xFF) as u8,
            flags: bits & known,
        }
    }
}

impl fmt::Display for ErrorMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "clean");
        }

        write!(f, "{:#x}", self.to_bits())?;
        if self.clock_glitches > 0 {
            write!(f, ", {} clock glitches", self.clock_glitches)?;
        }
        if self.data_glitches > 0 {
            write!(f, ", {} data glitches", self.data_glitches)?;
        }
        for flag in self.flags() {
            write!(f, ", {}", flag.as_str())?;
        }
        Ok(())
    }
}

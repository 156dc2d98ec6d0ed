/*!
Data sampling and word assembly.

Each bit is read during the clock-low half of its cell. The data line is
sampled several times and majority-voted, and the bits are shifted in LSB
first. A clock-high dwell longer than a normal bit cell marks the end of a
word.
*/

use crate::clock::ClockWaiter;
use crate::error_mask::{ErrorMask, Flag};
use crate::gpio::Gpio;
use crate::protocol::{ProtocolConfig, BITS_PER_WORD, MAX_BITS_PER_WORD, WORD_MASK, WORD_SIGN_BIT};
use serde::Serialize;

/// A 24-bit word as transmitted by the caliper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RawWord(u32);

impl RawWord {
    /// Wrap a value, discarding everything above bit 23
    pub fn new(value: u32) -> Self {
        Self(value & WORD_MASK)
    }

    /// Encode a signed count as its 24-bit two's complement form
    pub fn from_signed(value: i32) -> Self {
        Self::new(value as u32)
    }

    /// Like [`RawWord::from_signed`], but `None` for counts a word cannot hold
    pub fn checked_from_signed(value: i32) -> Option<Self> {
        let half = WORD_SIGN_BIT as i32;
        (-half..half).contains(&value).then(|| Self::from_signed(value))
    }

    /// Unsigned 24-bit value
    pub fn value(self) -> u32 {
        self.0
    }

    /// Value interpreted as a signed 24-bit count
    pub fn signed(self) -> i32 {
        sign_extend(self.0)
    }
}

/// Sign-extend the low 24 bits of `value`
pub fn sign_extend(value: u32) -> i32 {
    let value = value & WORD_MASK;
    if value & WORD_SIGN_BIT != 0 {
        value as i32 - (1 << BITS_PER_WORD)
    } else {
        value as i32
    }
}

/// Outcome of oversampling one bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitVote {
    pub bit: bool,

    /// The samples disagreed
    pub mixed: bool,
}

/// Majority vote over `samples` reads of which `high` were high
pub fn majority(high: u32, samples: u32) -> BitVote {
    BitVote {
        bit: high * 2 > samples,
        mixed: high > 0 && high < samples,
    }
}

/// Oversampling reader for the data line
#[derive(Debug, Clone, Copy)]
pub struct BitSampler {
    pin: u8,
    oversample: u32,
}

impl BitSampler {
    pub fn new(pin: u8, oversample: u32) -> Self {
        Self {
            pin,
            oversample: oversample.max(1),
        }
    }

    /// Read the data line `oversample` times in quick succession and vote
    pub fn sample<G: Gpio>(&self, gpio: &mut G) -> BitVote {
        let high = (0..self.oversample).filter(|_| gpio.read(self.pin)).count() as u32;
        majority(high, self.oversample)
    }
}

/// Accumulates bits LSB first
#[derive(Debug, Clone, Copy, Default)]
pub struct WordAssembler {
    value: u32,
    bits: u32,
}

impl WordAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shift in the next bit. Bits beyond the 24th are counted but dropped.
    pub fn push(&mut self, bit: bool) {
        if bit && self.bits < BITS_PER_WORD {
            self.value |= 1 << self.bits;
        }
        self.bits += 1;
    }

    /// Bits pushed so far
    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn finish(self) -> RawWord {
        RawWord::new(self.value)
    }
}

/// Reads one word, starting just after the falling clock edge of its first bit.
///
/// Returns `None` if a clock wait timed out; the frame is desynchronized and
/// `errors` carries [`Flag::Timeout`]. A word boundary at any count other than
/// 24 bits sets [`Flag::WrongBitCount`] but still yields the bits captured.
pub fn read_word<G: Gpio>(
    gpio: &mut G,
    sampler: &BitSampler,
    waiter: &ClockWaiter,
    config: &ProtocolConfig,
    errors: &mut ErrorMask,
) -> Option<RawWord> {
    let mut word = WordAssembler::new();

    loop {
        let vote = sampler.sample(gpio);
        if vote.mixed {
            errors.add_data_glitch();
        }
        word.push(vote.bit);

        let rise = waiter.wait_for_level(gpio, true, config.edge_stable_reads);
        errors.merge(rise.errors);
        if rise.timed_out() {
            return None;
        }

        let fall = waiter.wait_for_level(gpio, false, config.edge_stable_reads);
        errors.merge(fall.errors);
        if fall.timed_out() {
            return None;
        }

        if fall.duration > config.word_boundary_dwell {
            if word.bits() != BITS_PER_WORD {
                errors.set(Flag::WrongBitCount);
            }
            return Some(word.finish());
        }

        if word.bits() >= MAX_BITS_PER_WORD {
            errors.set(Flag::WrongBitCount);
            return Some(word.finish());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGpio;
    use proptest::prelude::*;

    #[test]
    fn test_sign_extension() {
        assert_eq!(sign_extend(0), 0);
        assert_eq!(sign_extend(0x7F_FFFF), 8_388_607);
        assert_eq!(sign_extend(0x80_0000), -8_388_608);
        assert_eq!(sign_extend(0xFF_FFFF), -1);
        assert_eq!(sign_extend(0xFF00_0001), 1);
    }

    #[test]
    fn test_raw_word_from_signed() {
        assert_eq!(RawWord::from_signed(-500).value(), 0xFF_FE0C);
        assert_eq!(RawWord::from_signed(-500).signed(), -500);
        assert_eq!(RawWord::from_signed(7_430_000).signed(), 7_430_000);
    }

    #[test]
    fn test_majority_of_three() {
        let cases = [
            (0, false, false),
            (1, false, true),
            (2, true, true),
            (3, true, false),
        ];
        for (high, bit, mixed) in cases {
            assert_eq!(majority(high, 3), BitVote { bit, mixed }, "{} high", high);
        }
    }

    #[test]
    fn test_assembler_is_lsb_first() {
        let mut word = WordAssembler::new();
        for bit in [true, false, true, true] {
            word.push(bit);
        }
        assert_eq!(word.bits(), 4);
        assert_eq!(word.finish().value(), 0b1101);
    }

    #[test]
    fn test_assembler_drops_overrun_bits() {
        let mut word = WordAssembler::new();
        for _ in 0..26 {
            word.push(true);
        }
        assert_eq!(word.bits(), 26);
        assert_eq!(word.finish().value(), WORD_MASK);
    }

    #[test]
    fn test_sampler_flags_one_glitch_per_bit() {
        let mut gpio = ScriptedGpio::new().data(&[true, false, true]);
        let sampler = BitSampler::new(gpio.pins().data, 3);
        let vote = sampler.sample(&mut gpio);
        assert!(vote.bit);
        assert!(vote.mixed);
        assert_eq!(gpio.reads, 3);
    }

    proptest! {
        #[test]
        fn prop_sign_extend_matches_twos_complement(v in 0u32..0x100_0000) {
            let signed = sign_extend(v);
            let expected = if v & 0x80_0000 != 0 { v as i64 - 0x100_0000 } else { v as i64 };
            prop_assert_eq!(signed as i64, expected);
            prop_assert_eq!(RawWord::from_signed(signed).value(), v);
        }

        #[test]
        fn prop_majority_of_any_triple(a: bool, b: bool, c: bool) {
            let high = [a, b, c].iter().filter(|s| **s).count() as u32;
            let vote = majority(high, 3);
            prop_assert_eq!(vote.bit, high >= 2);
            prop_assert_eq!(vote.mixed, !(a == b && b == c));
        }
    }
}

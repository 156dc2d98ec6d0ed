/*!
Simulated caliper.

Generates the clock/data waveform a caliper would put on the wire and serves
it through the [`Gpio`] trait with a virtual clock. Every pin read advances
virtual time by a fixed cost, and [`Gpio::delay`] advances it without
sleeping, so whole read loops run deterministically and much faster than real
time. Used by the unit tests and by the reader's `--simulate` mode.
*/

use crate::error::{CaliperError, Result};
use crate::gpio::{Direction, Gpio, PinConfig, Tick};
use crate::protocol::{BITS_PER_WORD, WORDS_PER_FRAME};
use crate::word::RawWord;
use std::time::Duration;

/// Default virtual cost of one pin read
pub const DEFAULT_READ_COST_NS: u64 = 250;

/// Offset of the injected data spike from the falling clock edge. With the
/// default read cost it lands on the middle of the three data samples.
const DATA_GLITCH_OFFSET_NS: u64 = 1_000;

/// Offset of the injected clock spike from the falling clock edge
const CLOCK_GLITCH_OFFSET_NS: u64 = 2_000;

/// Nominal caliper timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTiming {
    /// Width of the clock-high start pulse
    pub start_pulse_ns: u64,

    /// Clock-low half of a bit cell (data valid)
    pub bit_low_ns: u64,

    /// Clock-high half of a bit cell
    pub bit_high_ns: u64,

    /// Clock-high dwell after the last bit of a word
    pub word_gap_ns: u64,

    /// Clock-low idle time between frames
    pub idle_ns: u64,
}

impl FrameTiming {
    /// Time taken by one frame, idle gap excluded
    pub fn frame_ns(&self, bits: [u32; 2]) -> u64 {
        let cells: u64 = bits.iter().map(|b| *b as u64).sum();
        // The last cell of each word ends in the word gap instead of a bit-high half
        self.start_pulse_ns
            + cells * self.bit_low_ns
            + cells.saturating_sub(2) * self.bit_high_ns
            + 2 * self.word_gap_ns
    }
}

impl Default for FrameTiming {
    fn default() -> Self {
        Self {
            start_pulse_ns: 55_000,
            bit_low_ns: 6_000,
            bit_high_ns: 7_000,
            word_gap_ns: 50_000,
            idle_ns: 2_000_000,
        }
    }
}

/// Faults injected into a simulated frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disturbance {
    /// One-read clock spike during the data half of a bit cell
    ClockGlitch { word: usize, bit: u32 },

    /// Flips the middle data sample of a bit
    DataGlitch { word: usize, bit: u32 },
}

/// Content of one simulated transmission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimFrame {
    pub words: [RawWord; 2],

    /// Bits actually clocked out per word, normally 24
    pub bits: [u32; 2],

    pub disturbances: Vec<Disturbance>,
}

impl SimFrame {
    /// Frame carrying two raw signed words, each truncated to 24 bits
    pub fn from_words(absolute: i32, display_raw: i32) -> Self {
        Self {
            words: [RawWord::from_signed(absolute), RawWord::from_signed(display_raw)],
            bits: [BITS_PER_WORD; WORDS_PER_FRAME],
            disturbances: Vec::new(),
        }
    }

    /// Frame for a caliper showing `display_counts`; the second word carries its negation.
    ///
    /// Fails when either value does not fit a signed 24-bit word.
    pub fn from_reading(absolute: i32, display_counts: i32) -> Result<Self> {
        let absolute_word = RawWord::checked_from_signed(absolute).ok_or_else(|| {
            CaliperError::config(format!("absolute count {} exceeds 24 bits", absolute))
        })?;
        let display_word = display_counts
            .checked_neg()
            .and_then(RawWord::checked_from_signed)
            .ok_or_else(|| {
                CaliperError::config(format!("display count {} exceeds 24 bits", display_counts))
            })?;

        Ok(Self {
            words: [absolute_word, display_word],
            bits: [BITS_PER_WORD; WORDS_PER_FRAME],
            disturbances: Vec::new(),
        })
    }

    /// Clock out `bits` bits for `word` instead of 24.
    ///
    /// Panics if `word` is not 0 or 1.
    pub fn with_bit_count(mut self, word: usize, bits: u32) -> Self {
        assert!(word < WORDS_PER_FRAME, "a frame has two words, got index {}", word);
        self.bits[word] = bits;
        self
    }

    pub fn with_disturbance(mut self, disturbance: Disturbance) -> Self {
        self.disturbances.push(disturbance);
        self
    }

    fn has(&self, disturbance: Disturbance) -> bool {
        self.disturbances.contains(&disturbance)
    }
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    start_ns: u64,
    clock: bool,
    data: bool,
}

/// Piecewise-constant clock/data waveform
#[derive(Debug, Clone, Default)]
pub struct Waveform {
    segments: Vec<Segment>,
    length_ns: u64,
}

impl Waveform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total length
    pub fn length_ns(&self) -> u64 {
        self.length_ns
    }

    /// Append a constant stretch
    pub fn push(&mut self, clock: bool, data: bool, duration_ns: u64) {
        if duration_ns == 0 {
            return;
        }
        self.segments.push(Segment {
            start_ns: self.length_ns,
            clock,
            data,
        });
        self.length_ns += duration_ns;
    }

    /// Append clock-low idle time
    pub fn push_idle(&mut self, duration_ns: u64) {
        self.push(false, false, duration_ns);
    }

    /// Append a whole transmission: start pulse, both words, word gaps
    pub fn push_frame(&mut self, frame: &SimFrame, timing: &FrameTiming) {
        self.push(true, false, timing.start_pulse_ns);

        for (index, word) in frame.words.iter().enumerate() {
            let bits = frame.bits[index];
            for bit in 0..bits {
                let level = bit < 32 && (word.value() >> bit) & 1 == 1;
                self.push_bit_low(frame, index, bit, level, timing.bit_low_ns);

                let high_ns = if bit + 1 == bits {
                    timing.word_gap_ns
                } else {
                    timing.bit_high_ns
                };
                self.push(true, level, high_ns);
            }
        }
    }

    fn push_bit_low(&mut self, frame: &SimFrame, word: usize, bit: u32, level: bool, low_ns: u64) {
        let data_glitch = frame.has(Disturbance::DataGlitch { word, bit });
        let clock_glitch = frame.has(Disturbance::ClockGlitch { word, bit });
        let spike = DEFAULT_READ_COST_NS;
        let mut used = 0;

        if data_glitch {
            self.push(false, level, DATA_GLITCH_OFFSET_NS);
            self.push(false, !level, spike);
            used = DATA_GLITCH_OFFSET_NS + spike;
        }
        if clock_glitch {
            self.push(false, level, CLOCK_GLITCH_OFFSET_NS.saturating_sub(used));
            self.push(true, level, spike);
            used = used.max(CLOCK_GLITCH_OFFSET_NS) + spike;
        }
        self.push(false, level, low_ns.saturating_sub(used));
    }

    fn levels_at(&self, t_ns: u64) -> (bool, bool) {
        let index = self.segments.partition_point(|s| s.start_ns <= t_ns);
        match index.checked_sub(1).and_then(|i| self.segments.get(i)) {
            Some(segment) => (segment.clock, segment.data),
            None => (false, false),
        }
    }
}

/// A caliper on the other end of a virtual GPIO header
#[derive(Debug, Clone)]
pub struct SimulatedCaliper {
    pins: PinConfig,
    waveform: Waveform,
    looping: bool,
    read_cost_ns: u64,
    cursor_ns: u64,
    tick_offset: u32,
    powered: bool,
    paced: bool,
    configured: Vec<(u8, Direction)>,
    released: bool,
}

impl SimulatedCaliper {
    /// Play `waveform` once, then hold its final levels
    pub fn new(pins: PinConfig, waveform: Waveform) -> Self {
        Self {
            pins,
            waveform,
            looping: false,
            read_cost_ns: DEFAULT_READ_COST_NS,
            cursor_ns: 0,
            tick_offset: 0,
            powered: true,
            paced: false,
            configured: Vec::new(),
            released: false,
        }
    }

    /// Repeat `waveform` forever
    pub fn looping(pins: PinConfig, waveform: Waveform) -> Self {
        Self {
            looping: true,
            ..Self::new(pins, waveform)
        }
    }

    /// A caliper transmitting `frame` over and over, three times a second
    pub fn transmitting(pins: PinConfig, frame: &SimFrame) -> Self {
        let timing = FrameTiming {
            idle_ns: 330_000_000,
            ..FrameTiming::default()
        };
        let mut waveform = Waveform::new();
        waveform.push_idle(timing.idle_ns);
        waveform.push_frame(frame, &timing);
        Self::looping(pins, waveform)
    }

    /// Start the tick counter at `offset` to exercise wrap handling
    pub fn with_tick_offset(mut self, offset: u32) -> Self {
        self.tick_offset = offset;
        self
    }

    /// Also sleep for real on [`Gpio::delay`], so output arrives at the pace
    /// a real caliper would produce it
    pub fn paced(mut self) -> Self {
        self.paced = true;
        self
    }

    pub fn with_read_cost(mut self, read_cost_ns: u64) -> Self {
        self.read_cost_ns = read_cost_ns;
        self
    }

    pub fn pins(&self) -> PinConfig {
        self.pins
    }

    /// Virtual time consumed so far
    pub fn elapsed_us(&self) -> u64 {
        self.cursor_ns / 1_000
    }

    /// Whether the power pin is currently driven high
    pub fn is_powered(&self) -> bool {
        self.powered
    }

    /// Whether [`Gpio::shutdown`] has been called
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Direction last set for `pin`
    pub fn direction(&self, pin: u8) -> Option<Direction> {
        self.configured
            .iter()
            .rev()
            .find(|(p, _)| *p == pin)
            .map(|(_, direction)| *direction)
    }

    fn levels_now(&self) -> (bool, bool) {
        if !self.powered {
            return (false, false);
        }
        let length = self.waveform.length_ns();
        let t = if self.looping && length > 0 {
            self.cursor_ns % length
        } else {
            self.cursor_ns
        };
        self.waveform.levels_at(t)
    }
}

impl Gpio for SimulatedCaliper {
    fn configure(&mut self, pin: u8, direction: Direction) -> Result<()> {
        self.configured.push((pin, direction));
        Ok(())
    }

    fn write(&mut self, pin: u8, level: bool) -> Result<()> {
        if pin == self.pins.power {
            self.powered = level;
        }
        Ok(())
    }

    fn read(&mut self, pin: u8) -> bool {
        self.cursor_ns += self.read_cost_ns;
        let (clock, data) = self.levels_now();
        if pin == self.pins.clock {
            clock
        } else if pin == self.pins.data {
            data
        } else {
            false
        }
    }

    fn now(&mut self) -> Tick {
        Tick(((self.cursor_ns / 1_000) as u32).wrapping_add(self.tick_offset))
    }

    fn delay(&mut self, duration: Duration) {
        self.cursor_ns += duration.as_nanos() as u64;
        if self.paced {
            std::thread::sleep(duration);
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        self.released = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waveform_levels() {
        let mut waveform = Waveform::new();
        waveform.push(false, false, 1_000);
        waveform.push(true, true, 500);
        waveform.push(false, true, 0); // ignored
        waveform.push(false, true, 250);

        assert_eq!(waveform.length_ns(), 1_750);
        assert_eq!(waveform.levels_at(0), (false, false));
        assert_eq!(waveform.levels_at(999), (false, false));
        assert_eq!(waveform.levels_at(1_000), (true, true));
        assert_eq!(waveform.levels_at(1_600), (false, true));
        // Holds the final level past the end
        assert_eq!(waveform.levels_at(10_000), (false, true));
    }

    #[test]
    fn test_frame_length() {
        let timing = FrameTiming::default();
        let frame = SimFrame::from_words(1, 2);
        let mut waveform = Waveform::new();
        waveform.push_frame(&frame, &timing);
        assert_eq!(waveform.length_ns(), timing.frame_ns(frame.bits));
    }

    #[test]
    fn test_glitches_do_not_change_frame_length() {
        let timing = FrameTiming::default();
        let frame = SimFrame::from_words(1, 2)
            .with_disturbance(Disturbance::DataGlitch { word: 0, bit: 3 })
            .with_disturbance(Disturbance::ClockGlitch { word: 0, bit: 3 });
        let mut waveform = Waveform::new();
        waveform.push_frame(&frame, &timing);
        assert_eq!(waveform.length_ns(), timing.frame_ns(frame.bits));
    }

    #[test]
    fn test_frame_length_with_tiny_bit_counts() {
        let timing = FrameTiming::default();
        let frame = SimFrame::from_words(0, 0).with_bit_count(0, 0).with_bit_count(1, 1);
        let expected = timing.start_pulse_ns + timing.bit_low_ns + 2 * timing.word_gap_ns;
        assert_eq!(timing.frame_ns(frame.bits), expected);
    }

    #[test]
    #[should_panic(expected = "a frame has two words")]
    fn test_bit_count_for_third_word_panics() {
        let _ = SimFrame::from_words(0, 0).with_bit_count(2, 24);
    }

    #[test]
    fn test_reading_frame_negates_display() {
        let frame = SimFrame::from_reading(1_000, 250).unwrap();
        assert_eq!(frame.words[0].signed(), 1_000);
        assert_eq!(frame.words[1].signed(), -250);
    }

    #[test]
    fn test_reading_frame_rejects_counts_beyond_24_bits() {
        // 20 m is past what a word can hold; silently wrapping would show a different value
        assert!(SimFrame::from_reading(16_125_984, 0).is_err());
        assert!(SimFrame::from_reading(0, 16_125_984).is_err());
        assert!(SimFrame::from_reading(0, i32::MIN).is_err());
        // Negating the most negative word overflows it by one
        assert!(SimFrame::from_reading(0, -8_388_608).is_err());
        assert!(SimFrame::from_reading(-8_388_608, 8_388_607).is_ok());
    }

    #[test]
    fn test_power_off_silences_clock() {
        let mut waveform = Waveform::new();
        waveform.push(true, true, 10_000);
        let pins = PinConfig::default();
        let mut caliper = SimulatedCaliper::new(pins, waveform);

        assert!(caliper.read(pins.clock));
        caliper.write(pins.power, false).unwrap();
        assert!(!caliper.read(pins.clock));
        assert!(!caliper.read(pins.data));
    }

    #[test]
    fn test_delay_advances_virtual_time() {
        let mut caliper = SimulatedCaliper::new(PinConfig::default(), Waveform::new());
        caliper.delay(Duration::from_millis(3));
        assert_eq!(caliper.now(), Tick(3_000));
        assert_eq!(caliper.elapsed_us(), 3_000);
    }
}

/*!
Decoded frame structure.

A frame is only built once both words have been assembled; a transmission
that breaks off earlier never becomes a `Frame`.
*/

use crate::error_mask::{ErrorMask, Severity};
use crate::word::RawWord;
use serde::Serialize;

/// One complete transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Frame {
    /// Absolute position word, then the display word
    pub words: [RawWord; 2],

    /// Anomalies seen between the start pulse and the last bit
    pub errors: ErrorMask,

    /// Measured start pulse width in ticks
    pub start_width: u32,
}

impl Frame {
    pub fn new(words: [RawWord; 2], errors: ErrorMask, start_width: u32) -> Self {
        Self {
            words,
            errors,
            start_width,
        }
    }

    /// Absolute position in counts since the caliper powered up
    pub fn absolute(&self) -> i32 {
        self.words[0].signed()
    }

    /// Second word as transmitted (the negated display value)
    pub fn display_raw(&self) -> i32 {
        self.words[1].signed()
    }

    /// Whether the values can be trusted at all
    pub fn is_usable(&self) -> bool {
        self.errors.severity() != Severity::Fatal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_mask::Flag;

    #[test]
    fn test_frame_accessors() {
        let frame = Frame::new(
            [RawWord::from_signed(7_430_000), RawWord::from_signed(-500)],
            ErrorMask::new(),
            50,
        );
        assert_eq!(frame.absolute(), 7_430_000);
        assert_eq!(frame.display_raw(), -500);
        assert!(frame.is_usable());
    }

    #[test]
    fn test_wrong_bit_count_frame_is_unusable() {
        let frame = Frame::new(
            [RawWord::new(1), RawWord::new(2)],
            ErrorMask::with(Flag::WrongBitCount),
            50,
        );
        assert!(!frame.is_usable());
    }
}

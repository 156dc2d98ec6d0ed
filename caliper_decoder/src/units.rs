/*!
Count to millimeter conversion.

The caliper counts 20480 steps per inch. The first word is an absolute
position relative to where the caliper was switched on (modulo 5 mm it is
absolute even across power cycles). The second word is the negative of the
value on the display, which the zero button resets.
*/

use crate::error_mask::ErrorMask;
use crate::frame::Frame;
use crate::protocol::MM_PER_COUNT;
use serde::Serialize;

/// Convert signed caliper counts to millimeters
pub fn counts_to_mm(counts: i32) -> f64 {
    counts as f64 * MM_PER_COUNT
}

/// Convert millimeters to the nearest whole count
pub fn mm_to_counts(mm: f64) -> i32 {
    (mm / MM_PER_COUNT).round() as i32
}

/// A frame converted to physical units
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    /// Absolute word as a signed count
    pub absolute_raw: i32,

    /// Display word as a signed count, as transmitted
    pub display_raw: i32,

    pub absolute_mm: f64,

    /// Value shown on the caliper display
    pub display_mm: f64,

    pub errors: ErrorMask,
}

impl Reading {
    pub fn from_frame(frame: &Frame) -> Self {
        let absolute_raw = frame.absolute();
        let display_raw = frame.display_raw();
        Self {
            absolute_raw,
            display_raw,
            absolute_mm: counts_to_mm(absolute_raw),
            display_mm: -counts_to_mm(display_raw),
            errors: frame.errors,
        }
    }

    /// Both values in millimeters, absolute first
    pub fn mm(&self) -> [f64; 2] {
        [self.absolute_mm, self.display_mm]
    }
}

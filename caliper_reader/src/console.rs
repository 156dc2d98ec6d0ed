/*!
Per-attempt output on stdout.

Logging goes to stderr, so stdout carries nothing but one line per attempt
and can be piped straight into a plotting script.
*/

use crate::config::OutputFormat;
use caliper_decoder::error_mask::Flag;
use caliper_decoder::{ErrorMask, ReadEvent, Reading};
use chrono::Local;
use serde_json::{json, Value};
use std::io::{self, Write};

/// Fixed-width line for an accepted reading
pub fn reading_line(reading: &Reading) -> String {
    let mut line = format!(
        "i1={:8} i2={:8}  Abs:{:8.3}mm  Disp:{:8.3}mm",
        reading.absolute_raw, reading.display_raw, reading.absolute_mm, reading.display_mm
    );

    let errors = &reading.errors;
    if !errors.is_empty() {
        line.push_str(&format!(
            " L:{} Gl:{:2},{} ",
            u8::from(errors.has(Flag::TooLateForClock)),
            errors.clock_glitches(),
            errors.data_glitches()
        ));
        line.push_str(&glitch_bar(errors));
    }
    line
}

/// One `g` per clock glitch followed by one `D` per data glitch
pub fn glitch_bar(errors: &ErrorMask) -> String {
    let mut bar = "g".repeat(errors.clock_glitches() as usize);
    bar.push_str(&"D".repeat(errors.data_glitches() as usize));
    bar
}

/// Line for a discarded attempt: hex report plus the structural flags present
pub fn failure_line(errors: &ErrorMask) -> String {
    let mut line = format!("Decode fail, error {:x}", errors.to_bits());
    for flag in errors.flags().filter(|flag| flag.is_structural()) {
        line.push_str(",  ");
        line.push_str(flag.as_str());
    }
    line
}

/// JSON object for one attempt, stamped with local time
pub fn json_event(event: &ReadEvent) -> Value {
    let timestamp = Local::now().to_rfc3339();
    match event {
        ReadEvent::Reading(reading) => json!({
            "timestamp": timestamp,
            "ok": true,
            "absolute_raw": reading.absolute_raw,
            "display_raw": reading.display_raw,
            "absolute_mm": reading.absolute_mm,
            "display_mm": reading.display_mm,
            "errors": json_errors(&reading.errors),
        }),
        ReadEvent::Failed(errors) => json!({
            "timestamp": timestamp,
            "ok": false,
            "errors": json_errors(errors),
        }),
    }
}

fn json_errors(errors: &ErrorMask) -> Value {
    let flags: Vec<&str> = errors.flags().map(Flag::as_str).collect();
    json!({
        "bits": errors.to_bits(),
        "clock_glitches": errors.clock_glitches(),
        "data_glitches": errors.data_glitches(),
        "flags": flags,
    })
}

/// Writes attempts to stdout in the configured format
pub struct Console {
    format: OutputFormat,
}

impl Console {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn render(&self, event: &ReadEvent) -> String {
        match (self.format, event) {
            (OutputFormat::Json, event) => json_event(event).to_string(),
            (OutputFormat::Text, ReadEvent::Reading(reading)) => reading_line(reading),
            (OutputFormat::Text, ReadEvent::Failed(errors)) => failure_line(errors),
        }
    }

    /// Print one attempt and flush, so readers of a pipe see it immediately
    pub fn emit(&self, event: &ReadEvent) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", self.render(event))?;
        stdout.flush()
    }
}

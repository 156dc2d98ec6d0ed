/*!
Common error types for the caliper decoder.

Decode anomalies (glitches, bad start pulses, missed edges) are not errors in
this sense; they are reported through [`crate::ErrorMask`]. The variants here
cover failures of the collaborators around the decoder.
*/

use thiserror::Error;

/// Common result type used throughout the decoder library
pub type Result<T> = std::result::Result<T, CaliperError>;

/// Errors raised by GPIO backends and session setup
#[derive(Error, Debug)]
pub enum CaliperError {
    /// GPIO backend failures (claiming, configuring or driving a pin)
    #[error("GPIO error on pin {pin}: {message}")]
    Gpio { pin: u8, message: String },

    /// I/O errors from file-backed GPIO implementations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid pin assignment
    #[error("Invalid pin configuration: {0}")]
    Pin(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CaliperError {
    /// Create a new GPIO error for a pin
    pub fn gpio(pin: u8, msg: impl Into<String>) -> Self {
        Self::Gpio {
            pin,
            message: msg.into(),
        }
    }

    /// Create a new pin configuration error
    pub fn pin(msg: impl Into<String>) -> Self {
        Self::Pin(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

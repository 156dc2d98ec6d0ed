/*!
Whole-frame decoding and the GPIO session that owns the pins.
*/

use crate::clock::ClockWaiter;
use crate::error::Result;
use crate::error_mask::{ErrorMask, Flag};
use crate::frame::Frame;
use crate::gpio::{Direction, Gpio, PinConfig};
use crate::protocol::{ProtocolConfig, WORDS_PER_FRAME};
use crate::sync::FrameSync;
use crate::word::{read_word, BitSampler, RawWord};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of one decode attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Both words were assembled. The frame's mask may still be fatal
    /// (wrong bit count), in which case its values must not be used.
    Decoded(Frame),

    /// The attempt ended before both words were read
    Aborted(ErrorMask),
}

impl FrameOutcome {
    /// Anomalies of this attempt
    pub fn errors(&self) -> ErrorMask {
        match self {
            FrameOutcome::Decoded(frame) => frame.errors,
            FrameOutcome::Aborted(errors) => *errors,
        }
    }
}

/// Decodes one transmission: start pulse, then two 24-bit words
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    sync: FrameSync,
    waiter: ClockWaiter,
    sampler: BitSampler,
    config: ProtocolConfig,
}

impl FrameDecoder {
    pub fn new(pins: &PinConfig, config: ProtocolConfig) -> Self {
        let waiter = ClockWaiter::new(pins.clock, config.poll_budget);
        Self {
            sync: FrameSync::new(waiter.clone(), config),
            waiter,
            sampler: BitSampler::new(pins.data, config.oversample),
            config,
        }
    }

    /// Abort clock waits once `running` is cleared
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.waiter = self.waiter.with_running_flag(running);
        self.sync = FrameSync::new(self.waiter.clone(), self.config);
        self
    }

    /// Run one decode attempt against `gpio`
    pub fn decode<G: Gpio>(&self, gpio: &mut G) -> FrameOutcome {
        let start = match self.sync.detect_start(gpio) {
            Ok(start) => start,
            Err(errors) => return FrameOutcome::Aborted(errors),
        };

        // Noise picked up while waiting for the start pulse says nothing
        // about the frame itself
        let mut errors = ErrorMask::new();
        let mut words = [RawWord::default(); WORDS_PER_FRAME];

        for word in words.iter_mut() {
            match read_word(gpio, &self.sampler, &self.waiter, &self.config, &mut errors) {
                Some(value) => *word = value,
                None => {
                    errors.set(Flag::Timeout);
                    return FrameOutcome::Aborted(errors);
                }
            }
        }

        FrameOutcome::Decoded(Frame::new(words, errors, start.width))
    }
}

/// Claimed GPIO pins with the caliper powered.
///
/// Pins are released when the session is closed or dropped, whichever comes
/// first. The power line is left as it is unless [`power_off`] was called.
///
/// [`power_off`]: CaliperSession::power_off
pub struct CaliperSession<G: Gpio> {
    gpio: G,
    pins: PinConfig,
    decoder: FrameDecoder,
    released: bool,
}

impl<G: Gpio> CaliperSession<G> {
    /// Claim the pins and switch the caliper supply on.
    ///
    /// If any pin cannot be claimed, the ones already claimed are released
    /// before the error is returned.
    pub fn open(gpio: G, pins: PinConfig, config: ProtocolConfig) -> Result<Self> {
        pins.validate()?;

        // Built first so that Drop releases whatever was claimed on failure
        let mut session = Self {
            gpio,
            pins,
            decoder: FrameDecoder::new(&pins, config),
            released: false,
        };
        session.claim()?;

        info!(
            power = pins.power,
            clock = pins.clock,
            data = pins.data,
            "caliper session opened"
        );
        Ok(session)
    }

    fn claim(&mut self) -> Result<()> {
        let pins = self.pins;
        self.gpio.configure(pins.power, Direction::Output)?;
        self.gpio.write(pins.power, true)?;
        self.gpio.configure(pins.clock, Direction::Input)?;
        self.gpio.configure(pins.data, Direction::Input)
    }

    /// Let clock waits give up as soon as `running` is cleared, instead of
    /// running out their poll budget on a dead line
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.decoder = self.decoder.clone().with_running_flag(running);
        self
    }

    /// Decode the next transmission
    pub fn decode_frame(&mut self) -> FrameOutcome {
        let outcome = self.decoder.decode(&mut self.gpio);
        debug!(errors = %outcome.errors(), "decode attempt finished");
        outcome
    }

    /// Cut the caliper supply
    pub fn power_off(&mut self) -> Result<()> {
        info!("switching caliper supply off");
        self.gpio.write(self.pins.power, false)
    }

    /// Sleep between attempts
    pub fn pause(&mut self, duration: Duration) {
        self.gpio.delay(duration);
    }

    pub fn pins(&self) -> PinConfig {
        self.pins
    }

    pub fn gpio(&self) -> &G {
        &self.gpio
    }

    /// Release the pins, reporting any backend failure
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        info!("releasing GPIO");
        self.gpio.shutdown()
    }
}

impl<G: Gpio> Drop for CaliperSession<G> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to release GPIO: {}", e);
        }
    }
}

/*!
Start-of-frame detection.

Between transmissions the clock line sits idle for roughly a third of a
second. A frame opens with a single long clock-high start pulse, 45 to 60
ticks wide, followed by the data bits. The line floats while idle, so the
high level is only accepted after a long run of consistent reads, and very
short highs are treated as noise and re-synchronized.
*/

use crate::clock::ClockWaiter;
use crate::error_mask::{ErrorMask, Flag};
use crate::gpio::Gpio;
use crate::protocol::ProtocolConfig;
use tracing::trace;

/// A start pulse that passed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartPulse {
    /// Measured pulse width in ticks
    pub width: u32,

    /// Noise seen while hunting for the pulse; not part of the frame
    pub sync_noise: ErrorMask,
}

/// Start pulse detector
#[derive(Debug, Clone)]
pub struct FrameSync {
    waiter: ClockWaiter,
    config: ProtocolConfig,
}

impl FrameSync {
    /// Create a detector using `waiter` for all clock edges
    pub fn new(waiter: ClockWaiter, config: ProtocolConfig) -> Self {
        Self { waiter, config }
    }

    /// Wait for the next start pulse and validate its width.
    ///
    /// On failure the returned mask holds everything seen during the attempt,
    /// including the flag that ended it.
    pub fn detect_start<G: Gpio>(&self, gpio: &mut G) -> Result<StartPulse, ErrorMask> {
        let cfg = &self.config;
        let entered = gpio.now();
        let mut errors = ErrorMask::new();

        let width = loop {
            let high = self.waiter.wait_for_level(gpio, true, cfg.sync_stable_reads);
            errors.merge(high.errors);
            if high.timed_out() || high.duration > cfg.clock_stuck_ticks {
                // Nothing for longer than a whole transmission period
                errors.set(Flag::ClockStuckLow);
                return Err(errors);
            }

            let low = self.waiter.wait_for_level(gpio, false, cfg.edge_stable_reads);
            errors.merge(low.errors);
            if low.timed_out() || low.duration > cfg.clock_stuck_ticks {
                errors.set(Flag::ClockStuckLow);
                return Err(errors);
            }

            if low.duration > cfg.glitch_dwell {
                break low.duration;
            }

            errors.add_clock_glitch();
            if gpio.now().since(entered) > cfg.clock_stuck_ticks {
                errors.set(Flag::Timeout);
                return Err(errors);
            }
        };

        trace!(width, noise = %errors, "start pulse candidate");

        if width < cfg.start_pulse_min {
            errors.set(Flag::StartTooShort);
            return Err(errors);
        }
        if width > cfg.start_pulse_max {
            errors.set(Flag::StartTooLong);
            return Err(errors);
        }

        Ok(StartPulse {
            width,
            sync_noise: errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::PinConfig;
    use crate::sim::{FrameTiming, SimulatedCaliper, Waveform};
    use crate::testing::ScriptedGpio;

    /// Idle low, then a high pulse that measures exactly `width` ticks
    fn pulse(width: u32) -> ScriptedGpio {
        let cfg = ProtocolConfig::default();
        // The low wait measures the remaining high reads plus the stable low reads
        let high_reads = cfg.sync_stable_reads + width - cfg.edge_stable_reads;
        ScriptedGpio::new()
            .clock(false, 30)
            .clock(true, high_reads as usize)
            .clock(false, 10)
    }

    fn detector(gpio: &ScriptedGpio) -> FrameSync {
        let cfg = ProtocolConfig::default();
        FrameSync::new(ClockWaiter::new(gpio.pins().clock, cfg.poll_budget), cfg)
    }

    #[test]
    fn test_start_width_window() {
        for width in [45, 50, 60] {
            let mut gpio = pulse(width);
            let start = detector(&gpio).detect_start(&mut gpio).unwrap();
            assert_eq!(start.width, width);
        }
    }

    #[test]
    fn test_start_too_short() {
        let mut gpio = pulse(44);
        let errors = detector(&gpio).detect_start(&mut gpio).unwrap_err();
        assert!(errors.has(Flag::StartTooShort));
        assert!(errors.is_fatal());
    }

    #[test]
    fn test_start_too_long() {
        let mut gpio = pulse(61);
        let errors = detector(&gpio).detect_start(&mut gpio).unwrap_err();
        assert!(errors.has(Flag::StartTooLong));
        assert!(!errors.has(Flag::StartTooShort));
    }

    #[test]
    fn test_sync_noise_is_reported_separately() {
        let cfg = ProtocolConfig::default();
        let mut gpio = ScriptedGpio::new()
            .clock(false, 30)
            .clock(true, 5)
            .clock(false, 1)
            .clock(true, (cfg.sync_stable_reads + 50 - cfg.edge_stable_reads) as usize)
            .clock(false, 10);
        let start = detector(&gpio).detect_start(&mut gpio).unwrap();
        assert_eq!(start.width, 50);
        assert_eq!(start.sync_noise.clock_glitches(), 1);
    }

    #[test]
    fn test_brief_high_is_resynchronized() {
        let timing = FrameTiming::default();
        let mut waveform = Waveform::new();
        waveform.push_idle(200_000);
        waveform.push(true, false, 5_000); // passes the sync run, far too short to be a start
        waveform.push_idle(200_000);
        waveform.push(true, false, timing.start_pulse_ns);
        waveform.push_idle(200_000);

        let mut gpio = SimulatedCaliper::new(PinConfig::default(), waveform);
        let start = detector_for(&gpio).detect_start(&mut gpio).unwrap();
        assert!((45..=60).contains(&start.width));
        assert!(start.sync_noise.clock_glitches() >= 1);
    }

    #[test]
    fn test_dead_line_is_stuck() {
        let mut waveform = Waveform::new();
        waveform.push_idle(1_000_000);
        let mut gpio = SimulatedCaliper::new(PinConfig::default(), waveform);

        let errors = detector_for(&gpio).detect_start(&mut gpio).unwrap_err();
        assert!(errors.has(Flag::ClockStuckLow));
        // Bounded by the poll budget, not by the line ever moving
        assert!(gpio.elapsed_us() < 5_000_000);
    }

    #[test]
    fn test_clock_held_high_is_stuck() {
        let mut waveform = Waveform::new();
        waveform.push(true, false, 1_000_000);
        let mut gpio = SimulatedCaliper::new(PinConfig::default(), waveform);

        let errors = detector_for(&gpio).detect_start(&mut gpio).unwrap_err();
        assert!(errors.has(Flag::ClockStuckLow));
    }

    fn detector_for(gpio: &SimulatedCaliper) -> FrameSync {
        let cfg = ProtocolConfig::default();
        FrameSync::new(ClockWaiter::new(gpio.pins().clock, cfg.poll_budget), cfg)
    }
}

/*!
Retry policy and the read loop.

The caliper transmits about three times a second whether or not anyone is
listening, so there is no point in backing off after a failure: the loop
sleeps just long enough to let the broken transmission finish and tries to
catch the next one. After a clean frame it sleeps most of a period, since the
next frame cannot arrive any sooner.
*/

use crate::decoder::{CaliperSession, FrameOutcome};
use crate::error_mask::{ErrorMask, Flag, Severity};
use crate::gpio::Gpio;
use crate::units::Reading;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Sleep intervals between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Pause after a failed attempt, shorter than one transmission
    pub settle_us: u64,

    /// Pause after a clean frame, most of one transmission period
    pub idle_sleep_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            settle_us: 1_500,
            idle_sleep_ms: 300,
        }
    }
}

impl RetryPolicy {
    /// How long to wait after an attempt with the given outcome
    pub fn pause_after(&self, event: &ReadEvent) -> Option<Duration> {
        match event {
            ReadEvent::Failed(_) => Some(Duration::from_micros(self.settle_us)),
            ReadEvent::Reading(reading) if reading.errors.is_empty() => {
                Some(Duration::from_millis(self.idle_sleep_ms))
            }
            // Timing was already marginal; sleeping could miss the next frame
            ReadEvent::Reading(_) => None,
        }
    }
}

/// What one attempt produced
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadEvent {
    /// An accepted frame, possibly with glitch counts
    Reading(Reading),

    /// A discarded attempt
    Failed(ErrorMask),
}

/// Loop phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Between attempts
    Idle,
    /// Inside a frame decode
    Decoding,
}

/// Attempt counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub attempts: u64,
    pub accepted: u64,
    pub clean: u64,
    pub degraded: u64,
    pub failed: u64,
    pub stuck: u64,
}

/// Repeatedly decodes frames and applies the retry policy
#[derive(Debug, Clone)]
pub struct ReadLoop {
    policy: RetryPolicy,
    single: bool,
    state: LoopState,
    stats: LoopStats,
}

impl ReadLoop {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            single: false,
            state: LoopState::Idle,
            stats: LoopStats::default(),
        }
    }

    /// Stop after the first attempt, whatever its outcome
    pub fn single_reading(mut self, single: bool) -> Self {
        self.single = single;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Decode one frame and classify it
    pub fn attempt<G: Gpio>(&mut self, session: &mut CaliperSession<G>) -> ReadEvent {
        let outcome = self.decode(session);
        self.record(outcome)
    }

    fn decode<G: Gpio>(&mut self, session: &mut CaliperSession<G>) -> FrameOutcome {
        self.state = LoopState::Decoding;
        let outcome = session.decode_frame();
        self.state = LoopState::Idle;
        outcome
    }

    fn record(&mut self, outcome: FrameOutcome) -> ReadEvent {
        self.stats.attempts += 1;
        let event = classify(outcome);

        match &event {
            ReadEvent::Reading(reading) => {
                self.stats.accepted += 1;
                if reading.errors.is_empty() {
                    self.stats.clean += 1;
                } else {
                    self.stats.degraded += 1;
                }
                debug!(
                    absolute = reading.absolute_raw,
                    display = reading.display_raw,
                    errors = %reading.errors,
                    "frame accepted"
                );
            }
            ReadEvent::Failed(errors) => {
                self.stats.failed += 1;
                if errors.has(Flag::ClockStuckLow) {
                    self.stats.stuck += 1;
                    warn!("No clock activity, is the caliper powered and connected?");
                } else {
                    debug!(errors = %errors, "frame discarded");
                }
            }
        }

        event
    }

    /// Run until `running` is cleared, or for one attempt in single-reading mode.
    ///
    /// Every attempt, failed or not, is handed to `on_event` before the next
    /// one starts. An attempt aborted after `running` was cleared is dropped
    /// without being reported or counted.
    pub fn run<G, F>(
        &mut self,
        session: &mut CaliperSession<G>,
        running: &AtomicBool,
        mut on_event: F,
    ) -> LoopStats
    where
        G: Gpio,
        F: FnMut(&ReadEvent),
    {
        while running.load(Ordering::SeqCst) {
            let outcome = self.decode(session);
            if matches!(outcome, FrameOutcome::Aborted(_)) && !running.load(Ordering::SeqCst) {
                debug!("attempt interrupted");
                break;
            }

            let event = self.record(outcome);
            on_event(&event);

            if self.single {
                break;
            }
            if let Some(pause) = self.policy.pause_after(&event) {
                session.pause(pause);
            }
        }

        let stats = self.stats;
        info!("📊 Read loop stats:");
        info!("   Attempts: {}", stats.attempts);
        info!(
            "   Accepted: {} ({} clean, {} with glitches)",
            stats.accepted, stats.clean, stats.degraded
        );
        info!("   Failed: {} ({} with no clock)", stats.failed, stats.stuck);
        stats
    }
}

/// Accept frames whose mask is at most degraded; discard everything else
pub fn classify(outcome: FrameOutcome) -> ReadEvent {
    match outcome {
        FrameOutcome::Decoded(frame) if frame.errors.severity() != Severity::Fatal => {
            ReadEvent::Reading(Reading::from_frame(&frame))
        }
        FrameOutcome::Decoded(frame) => ReadEvent::Failed(frame.errors),
        FrameOutcome::Aborted(errors) => ReadEvent::Failed(errors),
    }
}

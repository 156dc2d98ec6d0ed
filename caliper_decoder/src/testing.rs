//! Scripted GPIO for unit tests: every read consumes one queued level and
//! advances the tick counter by one.

use crate::error::Result;
use crate::gpio::{Direction, Gpio, PinConfig, Tick};
use std::collections::VecDeque;

pub(crate) struct ScriptedGpio {
    pins: PinConfig,
    clock: VecDeque<bool>,
    data: VecDeque<bool>,
    last_clock: bool,
    last_data: bool,
    ticks: u32,
    pub reads: u32,
}

impl ScriptedGpio {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(ticks: u32) -> Self {
        Self {
            pins: PinConfig::default(),
            clock: VecDeque::new(),
            data: VecDeque::new(),
            last_clock: false,
            last_data: false,
            ticks,
            reads: 0,
        }
    }

    pub fn pins(&self) -> PinConfig {
        self.pins
    }

    /// Queue `count` clock reads at `level`
    pub fn clock(mut self, level: bool, count: usize) -> Self {
        self.clock.extend(std::iter::repeat(level).take(count));
        self
    }

    /// Queue data reads
    pub fn data(mut self, levels: &[bool]) -> Self {
        self.data.extend(levels.iter().copied());
        self
    }

    fn next(queue: &mut VecDeque<bool>, last: &mut bool) -> bool {
        if let Some(level) = queue.pop_front() {
            *last = level;
        }
        *last
    }
}

impl Gpio for ScriptedGpio {
    fn configure(&mut self, _pin: u8, _direction: Direction) -> Result<()> {
        Ok(())
    }

    fn write(&mut self, _pin: u8, _level: bool) -> Result<()> {
        Ok(())
    }

    fn read(&mut self, pin: u8) -> bool {
        self.ticks = self.ticks.wrapping_add(1);
        self.reads += 1;
        if pin == self.pins.clock {
            Self::next(&mut self.clock, &mut self.last_clock)
        } else if pin == self.pins.data {
            Self::next(&mut self.data, &mut self.last_data)
        } else {
            false
        }
    }

    fn now(&mut self) -> Tick {
        Tick(self.ticks)
    }

    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

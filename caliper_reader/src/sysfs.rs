/*!
Linux sysfs GPIO backend.

Each pin is exported through `<root>/export` and driven through its
`gpioN/direction` and `gpioN/value` files. The value file stays open for the
whole session and is re-read from offset zero on every sample, which keeps a
read to two syscalls.
*/

use caliper_decoder::{CaliperError, Direction, Gpio, Result, Tick};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Time allowed for udev to make a freshly exported pin writable
const EXPORT_SETTLE: Duration = Duration::from_millis(100);

struct ClaimedPin {
    direction: Direction,
    value: File,
    exported_by_us: bool,
}

/// GPIO through `/sys/class/gpio`
pub struct SysfsGpio {
    root: PathBuf,
    base: u32,
    pins: HashMap<u8, ClaimedPin>,
    epoch: Instant,
    read_errors: u64,
}

impl SysfsGpio {
    /// Backend rooted at `root`, with header pin `n` mapped to line `base + n`
    pub fn new<P: AsRef<Path>>(root: P, base: u32) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            base,
            pins: HashMap::new(),
            epoch: Instant::now(),
            read_errors: 0,
        }
    }

    /// Reads that failed and were reported as low
    pub fn read_errors(&self) -> u64 {
        self.read_errors
    }

    fn line_dir(&self, pin: u8) -> PathBuf {
        self.root.join(format!("gpio{}", self.base + pin as u32))
    }

    /// Export the pin unless it is already visible; returns whether we exported it
    fn export(&self, pin: u8) -> Result<bool> {
        let dir = self.line_dir(pin);
        if dir.exists() {
            return Ok(false);
        }

        let line = self.base + pin as u32;
        std::fs::write(self.root.join("export"), line.to_string())
            .map_err(|e| {
                CaliperError::gpio(pin, format!("export of line {} failed: {}", line, e))
            })?;
        thread::sleep(EXPORT_SETTLE);

        if !dir.exists() {
            return Err(CaliperError::gpio(
                pin,
                format!("{} did not appear after export", dir.display()),
            ));
        }
        Ok(true)
    }

    fn unexport(&self, pin: u8) -> Result<()> {
        let line = self.base + pin as u32;
        std::fs::write(self.root.join("unexport"), line.to_string())
            .map_err(|e| {
                CaliperError::gpio(pin, format!("unexport of line {} failed: {}", line, e))
            })
    }

    fn read_level(value: &mut File) -> std::io::Result<bool> {
        let mut buf = [0u8; 1];
        value.seek(SeekFrom::Start(0))?;
        value.read_exact(&mut buf)?;
        Ok(buf[0] == b'1')
    }
}

impl Gpio for SysfsGpio {
    fn configure(&mut self, pin: u8, direction: Direction) -> Result<()> {
        let exported_by_us = self.export(pin)?;
        let dir = self.line_dir(pin);

        let setting = match direction {
            Direction::Input => "in",
            Direction::Output => "out",
        };
        std::fs::write(dir.join("direction"), setting)
            .map_err(|e| {
                CaliperError::gpio(pin, format!("cannot set direction {}: {}", setting, e))
            })?;

        let value = OpenOptions::new()
            .read(true)
            .write(direction == Direction::Output)
            .open(dir.join("value"))
            .map_err(|e| CaliperError::gpio(pin, format!("cannot open value file: {}", e)))?;

        debug!(pin, line = self.base + pin as u32, ?direction, "pin claimed");
        self.pins.insert(
            pin,
            ClaimedPin {
                direction,
                value,
                exported_by_us,
            },
        );
        Ok(())
    }

    fn write(&mut self, pin: u8, level: bool) -> Result<()> {
        let claimed = match self.pins.get_mut(&pin) {
            Some(claimed) if claimed.direction == Direction::Output => claimed,
            _ => return Err(CaliperError::gpio(pin, "not configured as an output")),
        };

        let text: &[u8] = if level { b"1" } else { b"0" };
        claimed
            .value
            .seek(SeekFrom::Start(0))
            .and_then(|_| claimed.value.write_all(text))
            .and_then(|_| claimed.value.flush())
            .map_err(|e| CaliperError::gpio(pin, format!("write failed: {}", e)))
    }

    fn read(&mut self, pin: u8) -> bool {
        let Some(claimed) = self.pins.get_mut(&pin) else {
            return false;
        };
        match Self::read_level(&mut claimed.value) {
            Ok(level) => level,
            Err(e) => {
                // Reported as low so the decoder's stuck-clock detection takes over
                if self.read_errors == 0 {
                    warn!("GPIO {} read failed: {}", pin, e);
                }
                self.read_errors += 1;
                false
            }
        }
    }

    fn now(&mut self) -> Tick {
        // Truncation wraps the counter roughly every 71 minutes, which Tick tolerates
        Tick(self.epoch.elapsed().as_micros() as u32)
    }

    fn shutdown(&mut self) -> Result<()> {
        let pins: Vec<(u8, ClaimedPin)> = self.pins.drain().collect();
        let mut first_error = None;

        for (pin, claimed) in pins {
            // Outputs stay exported so the supply keeps its level after exit
            if claimed.direction == Direction::Input && claimed.exported_by_us {
                drop(claimed.value);
                if let Err(e) = self.unexport(pin) {
                    first_error.get_or_insert(e);
                }
            }
        }

        if self.read_errors > 0 {
            warn!("{} GPIO reads failed during the session", self.read_errors);
        }
        info!("🔌 GPIO released");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

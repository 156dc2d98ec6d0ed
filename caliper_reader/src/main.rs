/*!
# Caliper Reader

Reads a digital caliper wired to three Raspberry Pi GPIO lines and prints one
line per received frame: both raw words and their millimeter values.

## Wiring (BCM numbering, configurable)

- GPIO 10 (header pin 19) powers the caliper
- GPIO 9 (header pin 21) is the caliper clock
- GPIO 11 (header pin 23) is the caliper data line

## Usage

### Continuous reading
```bash
caliper_reader
```

### One reading, then switch the caliper off
```bash
caliper_reader -s -o
```

### Switch the caliper off without reading
```bash
caliper_reader -o
```

### Dry run against a simulated caliper
```bash
caliper_reader --simulate --sim-mm 42.5 --json
```
*/

use anyhow::{bail, Context, Result};
use caliper_decoder::sim::{SimFrame, SimulatedCaliper};
use caliper_decoder::units::mm_to_counts;
use caliper_decoder::{CaliperSession, Gpio, ReadLoop};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, Level};

mod config;
mod console;
mod sysfs;

use config::{AppConfig, OutputFormat};
use console::Console;
use sysfs::SysfsGpio;

#[derive(Parser)]
#[command(name = "caliper_reader")]
#[command(about = "Decode the serial output of a digital caliper over GPIO")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "caliper.toml")]
    config: PathBuf,

    /// Take a single reading and exit
    #[arg(short, long)]
    single: bool,

    /// Switch the caliper supply off (after the reading when combined with -s)
    #[arg(short = 'o', long = "off")]
    off: bool,

    /// Read from a simulated caliper instead of GPIO
    #[arg(long)]
    simulate: bool,

    /// Display value transmitted by the simulated caliper, in mm
    #[arg(long, default_value = "12.5", requires = "simulate")]
    sim_mm: f64,

    /// Print JSON lines instead of the console format
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate configuration file
    Config {
        /// Output path for configuration file
        #[arg(short, long, default_value = "caliper.toml")]
        output: PathBuf,
    },
}

/// Options that shape one reader run
struct RunOptions {
    single: bool,
    off: bool,
    format: OutputFormat,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging goes to stderr to keep stdout clean for readings
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    if let Some(Commands::Config { output }) = cli.command {
        return generate_config_file(output);
    }

    let config = AppConfig::load_or_default(&cli.config)?;
    let options = RunOptions {
        single: cli.single,
        off: cli.off,
        format: if cli.json { OutputFormat::Json } else { config.output.format },
    };

    // Set up Ctrl+C handler before claiming pins, which can take a while
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        eprintln!("\n🛑 Received Ctrl+C, shutting down gracefully...");
        flag.store(false, Ordering::SeqCst);
    })
    .with_context(|| "Failed to install signal handler")?;

    if cli.simulate {
        info!("🧪 Reading from a simulated caliper showing {:.3} mm", cli.sim_mm);
        let frame = simulated_frame(cli.sim_mm)?;
        let gpio = SimulatedCaliper::transmitting(config.pins, &frame).paced();
        run_reader(gpio, &config, &options, running)
    } else {
        info!("📡 Using sysfs GPIO at {}", config.gpio.sysfs_root);
        let gpio = SysfsGpio::new(&config.gpio.sysfs_root, config.gpio.base);
        run_reader(gpio, &config, &options, running)
    }
}

/// Frame sent by a simulated caliper whose display shows `mm`
fn simulated_frame(mm: f64) -> Result<SimFrame> {
    if !mm.is_finite() {
        bail!("--sim-mm must be a finite number, got {}", mm);
    }
    let counts = mm_to_counts(mm);
    SimFrame::from_reading(counts, counts)
        .with_context(|| format!("--sim-mm {} is outside the caliper's 24-bit range", mm))
}

/// Claim the pins, then either power the caliper off or run the read loop
fn run_reader<G: Gpio>(
    gpio: G,
    config: &AppConfig,
    options: &RunOptions,
    running: Arc<AtomicBool>,
) -> Result<()> {
    let mut session = CaliperSession::open(gpio, config.pins, config.protocol)
        .with_context(|| "Failed to claim caliper GPIO pins")?
        .with_running_flag(Arc::clone(&running));
    info!(
        "🚀 Caliper powered (decoder v{}), waiting for frames",
        caliper_decoder::VERSION
    );

    if options.off && !options.single {
        println!("Turn off caliper supply");
        session
            .power_off()
            .with_context(|| "Failed to switch the caliper off")?;
        session.close()?;
        return Ok(());
    }

    let console = Console::new(options.format);
    let mut read_loop = ReadLoop::new(config.reader).single_reading(options.single);
    read_loop.run(&mut session, &running, |event| {
        if let Err(e) = console.emit(event) {
            error!("Failed to write reading: {}", e);
        }
    });

    if options.off {
        println!("Turning off caliper supply");
        session
            .power_off()
            .with_context(|| "Failed to switch the caliper off")?;
    }

    session.close()?;
    info!("✅ Caliper reader stopped");
    Ok(())
}

/// Generate a configuration file with default values
fn generate_config_file(output_path: PathBuf) -> Result<()> {
    let config = AppConfig::new();
    config.save_to_file(&output_path)?;

    info!("✅ Configuration file generated: {}", output_path.display());
    info!("📝 Edit the file to match your wiring and timing, then run:");
    info!("   caliper_reader --config {}", output_path.display());

    Ok(())
}

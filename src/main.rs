//! ADXL343 telemetry streamer - fixed-rate acquisition to a serial link
//!
//! Initializes the ADXL343 behind an FT232H (or the built-in simulator),
//! samples it periodically and writes one `|ts, ax, ay, az` line per sample to
//! stdout or a serial port. Any fault drives the bus idle and ends the run.
//!
//! Usage:
//!   adxl343-streamer --simulate
//!   adxl343-streamer --channel 0 --port /dev/ttyUSB1 --rate 100

use adxl343_telemetry::config::{DEFAULT_BAUD, DEFAULT_CLOCK_HZ, DEFAULT_SAMPLE_HZ};
use adxl343_telemetry::{
    open_serial, Adxl343, BusConfig, DeviceConfig, RegisterBus, SafetyMonitor, Sampler,
    SamplerConfig, Scheduler, SerialConfig, SimulatedAdxl343, TelemetryError, WireEncoder,
};
use clap::Parser;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "adxl343-streamer")]
#[command(about = "Stream ADXL343 acceleration samples as text telemetry", long_about = None)]
struct Args {
    /// FT232H SPI channel index
    #[arg(short, long, default_value_t = 0)]
    channel: u32,

    /// Use the built-in simulated sensor instead of hardware
    #[arg(long)]
    simulate: bool,

    /// Serial port for telemetry output (stdout if omitted)
    #[arg(short, long)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(short, long, default_value_t = DEFAULT_BAUD)]
    baud: u32,

    /// Sample rate in Hz (fixed for the whole run)
    #[arg(short, long, default_value_t = DEFAULT_SAMPLE_HZ)]
    rate: u32,

    /// SPI clock in Hz
    #[arg(long, default_value_t = DEFAULT_CLOCK_HZ)]
    spi_clock: u32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let sampler_config = SamplerConfig {
        frequency_hz: args.rate,
    };
    if let Err(e) = sampler_config.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let bus_config = BusConfig {
        clock_hz: args.spi_clock,
        ..BusConfig::default()
    };

    let output: Box<dyn Write + Send> = match &args.port {
        Some(port) => {
            let serial = SerialConfig {
                baud: args.baud,
                ..SerialConfig::new(port.as_str())
            };
            Box::new(open_serial(&serial)?)
        }
        None => Box::new(io::stdout()),
    };

    eprintln!("ADXL343 Telemetry Streamer");
    eprintln!("==========================");
    eprintln!("Sample rate: {} Hz", sampler_config.frequency_hz);
    eprintln!("Output: {}", args.port.as_deref().unwrap_or("stdout"));

    if args.simulate {
        eprintln!("Sensor: simulated\n");
        let sim = SimulatedAdxl343::new();
        sim.enable_motion();
        let (spi, cs) = sim.split();
        return run(spi, cs, output, sampler_config);
    }

    eprintln!("Sensor: FT232H channel {} @ {} Hz SPI\n", args.channel, bus_config.clock_hz);
    run_hardware(args.channel, &bus_config, output, sampler_config)
}

#[cfg(feature = "ftdi")]
fn run_hardware(
    channel: u32,
    bus_config: &BusConfig,
    output: Box<dyn Write + Send>,
    sampler_config: SamplerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let (spi, cs) = match adxl343_telemetry::Ft232hSpi::open(channel, bus_config) {
        Ok(halves) => halves,
        Err(TelemetryError::NoChannelsFound) => {
            eprintln!("Error: No FT232H devices found.");
            eprintln!("Please check:");
            eprintln!("  1. FT232H is connected via USB");
            eprintln!("  2. FTDI drivers are installed");
            eprintln!("  3. No other application is using the device");
            return Err(Box::new(TelemetryError::NoChannelsFound));
        }
        Err(e) => {
            eprintln!("Error opening SPI channel: {}", e);
            return Err(Box::new(e));
        }
    };
    run(spi, cs, output, sampler_config)
}

#[cfg(not(feature = "ftdi"))]
fn run_hardware(
    _channel: u32,
    _bus_config: &BusConfig,
    _output: Box<dyn Write + Send>,
    _sampler_config: SamplerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Error: built without FT232H support.");
    eprintln!("Rebuild with `--features ftdi` or pass --simulate.");
    Err(Box::new(TelemetryError::InvalidParameter(
        "FT232H backend not available".to_string(),
    )))
}

fn run<SPI, CS>(
    spi: SPI,
    cs: CS,
    output: Box<dyn Write + Send>,
    sampler_config: SamplerConfig,
) -> Result<(), Box<dyn std::error::Error>>
where
    SPI: SpiBus<u8> + Send + 'static,
    CS: OutputPin + Send + 'static,
{
    // Everything fallible outside the sampler is set up before it is armed
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;
    let scheduler = Scheduler::new(sampler_config)?;

    let sensor = Adxl343::new(RegisterBus::new(spi, cs), DeviceConfig::default());
    let safety = SafetyMonitor::new();

    let sampler = match Sampler::initialize(sensor, WireEncoder::new(output), safety) {
        Ok(s) => s,
        Err(TelemetryError::DeviceNotDetected(id)) => {
            eprintln!("Error: ADXL343 not detected (DEVID 0x{:02X})", id);
            eprintln!("Please check:");
            eprintln!("  1. ADXL343 is wired for 4-wire SPI (CS, SCLK, SDA/SDI, SDO)");
            eprintln!("  2. Power supply to ADXL343 is correct (3.3V)");
            eprintln!("  3. Chip select is on the configured FT232H pin");
            return Err(Box::new(TelemetryError::DeviceNotDetected(id)));
        }
        Err(e) => {
            eprintln!("Error initializing sensor: {}", e);
            return Err(Box::new(e));
        }
    };

    let mut handle = scheduler.arm(sampler)?;
    eprintln!("Streaming... Press Ctrl+C to stop\n");

    let fault = loop {
        if let Some(fault) = handle.wait_timeout(Duration::from_millis(100)) {
            break fault;
        }
        if !running.load(Ordering::SeqCst) {
            break handle.interrupt();
        }
    };

    let samples = handle.samples_emitted();
    match fault {
        TelemetryError::Interrupted => {
            eprintln!("\nStopped by user.");
            eprintln!("Total samples: {}", samples);
            if handle.skipped_ticks() > 0 {
                eprintln!("Skipped ticks: {}", handle.skipped_ticks());
            }
            Ok(())
        }
        e => {
            eprintln!("\nSAFE STATE: {}", e);
            eprintln!("Total samples before fault: {}", samples);
            Err(Box::new(e))
        }
    }
}

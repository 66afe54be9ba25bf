//! Telemetry viewer - decode the streamer's serial output on the host
//!
//! Reads newline-terminated lines from a serial port (or stdin), skips the
//! device's diagnostic output and prints each telemetry record with the host
//! time and the device-side interval since the previous record.
//!
//! Usage:
//!   telemetry-viewer --port /dev/ttyUSB0 --baud 115200
//!   adxl343-streamer --simulate | telemetry-viewer --stdin

use adxl343_telemetry::config::DEFAULT_BAUD;
use adxl343_telemetry::{open_serial, render_now, HostDecoder, SerialConfig, TelemetryError};
use clap::Parser;
use std::io::{self, BufRead, BufReader, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "telemetry-viewer")]
#[command(about = "Display ADXL343 telemetry received over serial", long_about = None)]
struct Args {
    /// Serial port the streamer is attached to
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Serial baud rate
    #[arg(short, long, default_value_t = DEFAULT_BAUD)]
    baud: u32,

    /// Read lines from stdin instead of a serial port
    #[arg(long)]
    stdin: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        eprintln!("ERROR: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(&args, &running) {
        eprintln!("ERROR: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args, running: &AtomicBool) -> Result<(), TelemetryError> {
    let source: Box<dyn Read> = if args.stdin {
        Box::new(io::stdin())
    } else {
        let port = open_serial(&SerialConfig {
            baud: args.baud,
            ..SerialConfig::new(args.port.as_str())
        })?;
        println!("Connected to {} at {} baud\n", args.port, args.baud);
        Box::new(port)
    };

    let mut reader = BufReader::new(source);
    let mut decoder = HostDecoder::new();
    let mut buf = Vec::new();

    while running.load(Ordering::SeqCst) {
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                if let Some(sample) = decoder.decode(&String::from_utf8_lossy(&buf)) {
                    println!("{}", render_now(&sample));
                }
                buf.clear();
            }
            // No data within the port timeout; a partial line stays buffered
            Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    if !running.load(Ordering::SeqCst) {
        println!("\nStopped by user.");
    }
    log::info!(
        "{} records decoded, {} malformed lines dropped",
        decoder.decoded(),
        decoder.dropped()
    );
    Ok(())
}

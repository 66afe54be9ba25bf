//! ADXL343 accelerometer telemetry over SPI
//!
//! This library reads triaxial acceleration from an ADXL343 through the FTDI
//! FT232H USB-to-SPI bridge (feature `ftdi`) or a built-in simulator, samples
//! it at a fixed rate, and streams each sample as a text line that the host
//! viewer decodes and displays.
//!
//! # Quick Start
//!
//! ## One Sample
//! ```
//! use adxl343_telemetry::{Adxl343, DeviceConfig, RegisterBus, SimulatedAdxl343};
//!
//! let sim = SimulatedAdxl343::new();
//! sim.set_raw_axes(0, 0, 256);
//! let (spi, cs) = sim.split();
//!
//! let mut sensor = Adxl343::new(RegisterBus::new(spi, cs), DeviceConfig::default());
//! sensor.initialize()?;
//! let sample = sensor.acquire_sample(0)?;
//! assert!((sample.az - 9.80665).abs() < 1e-9);
//! # Ok::<(), adxl343_telemetry::TelemetryError>(())
//! ```
//!
//! ## Periodic Streaming
//! ```no_run
//! use adxl343_telemetry::*;
//!
//! let sim = SimulatedAdxl343::new();
//! let (spi, cs) = sim.split();
//! let sensor = Adxl343::new(RegisterBus::new(spi, cs), DeviceConfig::default());
//!
//! // Initialization failure leaves the monitor safe and returns the fault
//! let sampler = Sampler::initialize(sensor, WireEncoder::new(std::io::stdout()), SafetyMonitor::new())?;
//!
//! // 100 Hz until the first fault
//! let mut handle = Scheduler::new(SamplerConfig::default())?.arm(sampler)?;
//! let fault = handle.wait();
//! eprintln!("stopped: {}", fault);
//! # Ok::<(), adxl343_telemetry::TelemetryError>(())
//! ```
//!
//! ## Host Decoding
//! ```
//! use adxl343_telemetry::HostDecoder;
//!
//! let mut decoder = HostDecoder::new();
//! decoder.decode("|1000, 0.000000, 0.000000, 9.806650");
//! let sample = decoder.decode("|1250, 0.000000, 0.000000, 9.806650").unwrap();
//! assert!((sample.dt_secs - 0.25).abs() < 1e-12);
//! ```

pub mod adxl343;
pub mod bus;
pub mod common;
pub mod config;
pub mod error;
#[cfg(feature = "ftdi")]
mod ffi;
#[cfg(feature = "ftdi")]
pub mod ft232h;
pub mod host;
pub mod safety;
pub mod sampler;
pub mod scheduler;
pub mod sim;
pub mod transport;
pub mod wire;

// Re-export public API
pub use adxl343::{Adxl343, DeviceConfig, Range, RawSample, Sample};
pub use bus::{RegisterAddress, RegisterBus};
pub use common::TimeKeeper;
pub use config::{BitOrder, BusConfig, ChipSelectPin, SamplerConfig, SerialConfig};
pub use error::{Result, TelemetryError};
#[cfg(feature = "ftdi")]
pub use ft232h::{Ft232hBus, Ft232hChipSelect, Ft232hSpi};
pub use host::{parse_line, render, render_now, DecodedSample, HostDecoder, Line, TelemetryRecord};
pub use safety::{ForceIdle, SafetyMonitor, SafetyState};
pub use sampler::{Sampler, TickOutcome};
pub use scheduler::{Scheduler, SchedulerHandle};
pub use sim::SimulatedAdxl343;
pub use transport::open_serial;
pub use wire::{encode_record, WireEncoder};

//! One acquisition cycle: clock → sensor → encoder, under the safety monitor

use crate::adxl343::Adxl343;
use crate::common::TimeKeeper;
use crate::error::{Result, TelemetryError};
use crate::safety::SafetyMonitor;
use crate::wire::WireEncoder;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;
use std::io::Write;

/// Result of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A record was written to the transport
    Emitted,
    /// The monitor is safe; the bus was not touched
    Halted,
}

/// Initialized sensor plus its record sink
///
/// Only [`Sampler::initialize`] produces one, so anything holding a sampler
/// knows the device passed its identity check and is measuring.
pub struct Sampler<SPI, CS, W: Write> {
    sensor: Adxl343<SPI, CS>,
    encoder: WireEncoder<W>,
    clock: TimeKeeper,
    safety: SafetyMonitor,
}

impl<SPI, CS, W> Sampler<SPI, CS, W>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
    W: Write,
{
    /// Run the one-time device setup and arm the safety monitor
    ///
    /// Any failure trips `safety` and is returned; the monitor stays safe.
    pub fn initialize(
        mut sensor: Adxl343<SPI, CS>,
        encoder: WireEncoder<W>,
        safety: SafetyMonitor,
    ) -> Result<Self> {
        let clock = TimeKeeper::new();

        if let Err(e) = sensor.initialize() {
            return Err(safety.enter_safe_state(&mut sensor, e));
        }

        if !safety.arm() {
            let e = TelemetryError::InvalidParameter(
                "safety monitor already tripped".to_string(),
            );
            return Err(safety.enter_safe_state(&mut sensor, e));
        }
        log::info!("Sampler armed");

        Ok(Self {
            sensor,
            encoder,
            clock,
            safety,
        })
    }

    /// Acquire and emit one sample
    ///
    /// Returns `Err` exactly once, for the fault that trips the monitor.
    /// Afterwards every tick is a no-op.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        if !self.safety.is_armed() {
            return Ok(TickOutcome::Halted);
        }

        let now_ms = self.clock.now_ms();
        match self.cycle(now_ms) {
            Ok(()) => Ok(TickOutcome::Emitted),
            Err(e) => Err(self.safety.enter_safe_state(&mut self.sensor, e)),
        }
    }

    /// Stop sampling for an external reason, through the safety monitor
    pub fn halt(&mut self, reason: TelemetryError) -> TelemetryError {
        self.safety.enter_safe_state(&mut self.sensor, reason)
    }

    pub fn safety(&self) -> &SafetyMonitor {
        &self.safety
    }

    pub fn samples_emitted(&self) -> u64 {
        self.encoder.records()
    }

    fn cycle(&mut self, now_ms: u32) -> Result<()> {
        let sample = self.sensor.acquire_sample(now_ms)?;
        self.encoder.emit(&sample)
    }
}

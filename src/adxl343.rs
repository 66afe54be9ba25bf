//! ADXL343 accelerometer driver over the SPI register interface

use crate::bus::{RegisterAddress, RegisterBus};
use crate::error::{Result, TelemetryError};
use crate::safety::ForceIdle;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;
use std::time::Duration;

// Expected DEVID value
const DEVID_VALUE: u8 = 0xE5;

// POWER_CTL bits
const POWER_CTL_MEASURE: u8 = 0x08;

// DATA_FORMAT bits
const DATA_FORMAT_FULL_RES: u8 = 0x08;

/// Standard gravity in m/s²
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// m/s² per LSB in full-resolution mode (256 LSB/g)
pub const FULL_RES_SCALE: f64 = STANDARD_GRAVITY / 256.0;

/// Measurement range (DATA_FORMAT bits D1:D0)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Range {
    G2 = 0b00,
    G4 = 0b01,
    G8 = 0b10,
    G16 = 0b11,
}

/// Sensor configuration written once during initialization
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceConfig {
    pub range: Range,
    pub full_resolution: bool,
    /// Wait after enabling measurement before the first sample
    pub settle_delay: Duration,
}

impl Default for DeviceConfig {
    /// ±8 g, full resolution (DATA_FORMAT = 0x0A), 100 ms settle
    fn default() -> Self {
        Self {
            range: Range::G8,
            full_resolution: true,
            settle_delay: Duration::from_millis(100),
        }
    }
}

impl DeviceConfig {
    pub fn data_format(&self) -> u8 {
        let full_res = if self.full_resolution {
            DATA_FORMAT_FULL_RES
        } else {
            0
        };
        full_res | self.range as u8
    }

    /// m/s² per LSB for this format
    ///
    /// Full resolution keeps 3.9 mg/LSB at every range; 10-bit mode halves
    /// the counts per g for each range step.
    pub fn scale(&self) -> f64 {
        if self.full_resolution {
            FULL_RES_SCALE
        } else {
            STANDARD_GRAVITY / f64::from(256u16 >> (self.range as u8))
        }
    }
}

/// Raw axis counts from one burst read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl RawSample {
    /// Decode `(x_lo, x_hi, y_lo, y_hi, z_lo, z_hi)`
    pub fn from_le_bytes(bytes: [u8; 6]) -> Self {
        Self {
            x: i16::from_le_bytes([bytes[0], bytes[1]]),
            y: i16::from_le_bytes([bytes[2], bytes[3]]),
            z: i16::from_le_bytes([bytes[4], bytes[5]]),
        }
    }

    pub fn scaled(&self, timestamp_ms: u32, scale: f64) -> Sample {
        Sample {
            timestamp_ms,
            ax: f64::from(self.x) * scale,
            ay: f64::from(self.y) * scale,
            az: f64::from(self.z) * scale,
        }
    }
}

/// Timestamped acceleration sample in m/s²
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Device milliseconds since boot (wraps at 2^32)
    pub timestamp_ms: u32,
    pub ax: f64,
    pub ay: f64,
    pub az: f64,
}

/// ADXL343 sensor interface
pub struct Adxl343<SPI, CS> {
    bus: RegisterBus<SPI, CS>,
    config: DeviceConfig,
}

impl<SPI, CS> Adxl343<SPI, CS>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
{
    pub fn new(bus: RegisterBus<SPI, CS>, config: DeviceConfig) -> Self {
        Self { bus, config }
    }

    /// Verify the device identity and switch it into measurement mode
    ///
    /// A single failed step is terminal; there is no retry.
    pub fn initialize(&mut self) -> Result<()> {
        let devid = self.read_register(RegisterAddress::DEVID)?;
        if devid != DEVID_VALUE {
            return Err(TelemetryError::DeviceNotDetected(devid));
        }
        log::info!("ADXL343 detected (DEVID 0x{:02X})", devid);

        let format = self.config.data_format();
        self.bus.write(RegisterAddress::DATA_FORMAT, format)?;

        let power = self.read_register(RegisterAddress::POWER_CTL)?;
        self.bus
            .write(RegisterAddress::POWER_CTL, power | POWER_CTL_MEASURE)?;
        log::debug!(
            "DATA_FORMAT=0x{:02X} POWER_CTL=0x{:02X}",
            format,
            power | POWER_CTL_MEASURE
        );

        if !self.config.settle_delay.is_zero() {
            std::thread::sleep(self.config.settle_delay);
        }

        Ok(())
    }

    /// Burst-read DATAX0..DATAZ1
    pub fn read_raw(&mut self) -> Result<RawSample> {
        let mut data = [0u8; 6];
        self.bus.read_into(RegisterAddress::DATAX0, &mut data)?;
        Ok(RawSample::from_le_bytes(data))
    }

    /// Read one sample and stamp it with `now_ms`
    pub fn acquire_sample(&mut self, now_ms: u32) -> Result<Sample> {
        let raw = self.read_raw()?;
        Ok(raw.scaled(now_ms, self.config.scale()))
    }

    fn read_register(&mut self, register: RegisterAddress) -> Result<u8> {
        let mut value = [0u8];
        self.bus.read_into(register, &mut value)?;
        Ok(value[0])
    }
}

impl<SPI, CS> ForceIdle for Adxl343<SPI, CS>
where
    CS: OutputPin,
{
    fn force_idle(&mut self) {
        self.bus.force_idle();
    }
}

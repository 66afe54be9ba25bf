//! Fixed acquisition settings consumed once at startup
//!
//! Nothing here is reconfigurable after the sampler is armed. The binaries
//! let command-line flags override the defaults before initialization.

use crate::error::{Result, TelemetryError};
use embedded_hal::spi::{Mode, MODE_3};

/// Default SPI clock (1 MHz)
pub const DEFAULT_CLOCK_HZ: u32 = 1_000_000;

/// Default sampling frequency
pub const DEFAULT_SAMPLE_HZ: u32 = 100;

/// Default serial link speed
pub const DEFAULT_BAUD: u32 = 115_200;

/// Bit order on the SPI wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOrder {
    MsbFirst,
    LsbFirst,
}

/// FT232H pin used as the ADXL343 chip select
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipSelectPin {
    /// ADBUS3 (default wiring)
    D3,
    D4,
    D5,
    D6,
    D7,
}

/// SPI bus settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    pub clock_hz: u32,
    /// Clock polarity and phase (ADXL343 requires CPOL=1, CPHA=1)
    pub mode: Mode,
    pub bit_order: BitOrder,
    pub chip_select: ChipSelectPin,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            clock_hz: DEFAULT_CLOCK_HZ,
            mode: MODE_3,
            bit_order: BitOrder::MsbFirst,
            chip_select: ChipSelectPin::D3,
        }
    }
}

impl BusConfig {
    /// Check the settings against what the ADXL343 supports (5 MHz max SPI clock)
    pub fn validate(&self) -> Result<()> {
        if self.clock_hz == 0 || self.clock_hz > 5_000_000 {
            return Err(TelemetryError::InvalidParameter(format!(
                "SPI clock must be between 1 Hz and 5 MHz, got {} Hz",
                self.clock_hz
            )));
        }
        Ok(())
    }
}

/// Periodic sampling settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerConfig {
    pub frequency_hz: u32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            frequency_hz: DEFAULT_SAMPLE_HZ,
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.frequency_hz == 0 || self.frequency_hz > 1000 {
            return Err(TelemetryError::InvalidParameter(format!(
                "Sample rate must be between 1-1000 Hz, got {}",
                self.frequency_hz
            )));
        }
        Ok(())
    }
}

/// Serial link settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    pub port: String,
    pub baud: u32,
}

impl SerialConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud: DEFAULT_BAUD,
        }
    }
}

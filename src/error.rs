//! Error types for the ADXL343 telemetry pipeline

use thiserror::Error;

#[cfg(feature = "ftdi")]
use crate::ffi::{status_to_string, FT_OK, FT_STATUS};

/// Error type for telemetry operations
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// DEVID register did not hold the ADXL343 identity
    #[error("ADXL343 not detected: expected DEVID 0xE5, got 0x{0:02X}")]
    DeviceNotDetected(u8),

    /// SPI transfer or chip-select fault during a register transaction
    #[error("Bus transaction failed: {0}")]
    BusTransactionFailure(String),

    /// Host-side telemetry line that could not be decoded
    #[error("Malformed telemetry line: {0}")]
    MalformedTelemetryLine(String),

    /// Register address outside the 6-bit address space
    #[error("Invalid register address: 0x{0:02X} (max 0x3F)")]
    InvalidRegister(u8),

    /// Failure writing records to (or reading them from) the transport
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Serial port could not be opened or configured
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// FTDI driver error
    #[cfg(feature = "ftdi")]
    #[error("FTDI error: {status} ({description})")]
    FtdiError {
        status: FT_STATUS,
        description: String,
    },

    /// No SPI channels found
    #[error("No SPI channels found")]
    NoChannelsFound,

    /// Invalid channel index
    #[error("Invalid channel index: {0}")]
    InvalidChannel(u32),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Sampling stopped on request
    #[error("Sampling interrupted by user")]
    Interrupted,
}

#[cfg(feature = "ftdi")]
impl From<FT_STATUS> for TelemetryError {
    fn from(status: FT_STATUS) -> Self {
        debug_assert_ne!(status, FT_OK, "FT_OK is not an error");
        TelemetryError::FtdiError {
            status,
            description: status_to_string(status).to_string(),
        }
    }
}

impl TelemetryError {
    /// Wrap a bus-level error from an embedded-hal implementation
    pub(crate) fn bus<E: core::fmt::Debug>(context: &str, err: E) -> Self {
        TelemetryError::BusTransactionFailure(format!("{}: {:?}", context, err))
    }
}

/// Result type for telemetry operations
pub type Result<T> = std::result::Result<T, TelemetryError>;

//! FT232H USB-to-SPI bridge via FTDI libMPSSE
//!
//! One MPSSE channel is split into an SPI half and a chip-select half so the
//! register interface can frame transactions itself. Both halves share the
//! channel; it is closed when the last half is dropped.

use crate::config::{BitOrder, BusConfig, ChipSelectPin};
use crate::error::{Result, TelemetryError};
use crate::ffi::*;
use embedded_hal::digital::{self, OutputPin};
use embedded_hal::spi::{self, Phase, Polarity, SpiBus};
use std::fmt;
use std::ptr;
use std::sync::Arc;

/// Status from a failed libMPSSE call
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Ft232hError {
    Status(FT_STATUS),
    ShortTransfer { expected: u32, actual: u32 },
}

impl fmt::Debug for Ft232hError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ft232hError::Status(status) => {
                write!(f, "{} ({})", status_to_string(*status), status)
            }
            Ft232hError::ShortTransfer { expected, actual } => {
                write!(f, "expected {} bytes, transferred {}", expected, actual)
            }
        }
    }
}

impl spi::Error for Ft232hError {
    fn kind(&self) -> spi::ErrorKind {
        spi::ErrorKind::Other
    }
}

impl digital::Error for Ft232hError {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

fn check(status: FT_STATUS) -> core::result::Result<(), Ft232hError> {
    if status == FT_OK {
        Ok(())
    } else {
        Err(Ft232hError::Status(status))
    }
}

fn check_len(expected: usize, actual: DWORD) -> core::result::Result<(), Ft232hError> {
    if actual as usize != expected {
        return Err(Ft232hError::ShortTransfer {
            expected: expected as u32,
            actual,
        });
    }
    Ok(())
}

struct Channel {
    handle: FT_HANDLE,
}

// libMPSSE serializes access per handle; the halves never call it concurrently
// because the register interface owns both.
unsafe impl Send for Channel {}
unsafe impl Sync for Channel {}

impl Drop for Channel {
    fn drop(&mut self) {
        unsafe {
            SPI_ToggleCS(self.handle, 0);
            SPI_CloseChannel(self.handle);
        }
    }
}

fn config_options(config: &BusConfig) -> DWORD {
    let mode = match (config.mode.polarity, config.mode.phase) {
        (Polarity::IdleLow, Phase::CaptureOnFirstTransition) => SPI_CONFIG_OPTION_MODE0,
        (Polarity::IdleLow, Phase::CaptureOnSecondTransition) => SPI_CONFIG_OPTION_MODE1,
        (Polarity::IdleHigh, Phase::CaptureOnFirstTransition) => SPI_CONFIG_OPTION_MODE2,
        (Polarity::IdleHigh, Phase::CaptureOnSecondTransition) => SPI_CONFIG_OPTION_MODE3,
    };
    let cs = match config.chip_select {
        ChipSelectPin::D3 => SPI_CONFIG_OPTION_CS_DBUS3,
        ChipSelectPin::D4 => SPI_CONFIG_OPTION_CS_DBUS4,
        ChipSelectPin::D5 => SPI_CONFIG_OPTION_CS_DBUS5,
        ChipSelectPin::D6 => SPI_CONFIG_OPTION_CS_DBUS6,
        ChipSelectPin::D7 => SPI_CONFIG_OPTION_CS_DBUS7,
    };
    mode | cs | SPI_CONFIG_OPTION_CS_ACTIVELOW
}

/// FT232H SPI channel opener
pub struct Ft232hSpi;

impl Ft232hSpi {
    /// Open and configure an SPI channel
    ///
    /// # Arguments
    /// * `channel_index` - Index of the SPI channel to use (usually 0)
    /// * `config` - Clock, mode and chip-select wiring
    pub fn open(channel_index: u32, config: &BusConfig) -> Result<(Ft232hBus, Ft232hChipSelect)> {
        config.validate()?;
        if config.bit_order == BitOrder::LsbFirst {
            return Err(TelemetryError::InvalidParameter(
                "libMPSSE SPI only supports MSB-first transfers".to_string(),
            ));
        }

        let mut num_channels: DWORD = 0;
        let status = unsafe { SPI_GetNumChannels(&mut num_channels) };
        if status != FT_OK {
            return Err(status.into());
        }

        if num_channels == 0 {
            return Err(TelemetryError::NoChannelsFound);
        }

        if channel_index >= num_channels {
            return Err(TelemetryError::InvalidChannel(channel_index));
        }

        let mut handle: FT_HANDLE = ptr::null_mut();
        let status = unsafe { SPI_OpenChannel(channel_index, &mut handle) };
        if status != FT_OK {
            return Err(status.into());
        }

        let mut channel_config = ChannelConfig {
            ClockRate: config.clock_hz,
            LatencyTimer: 1, // 1ms latency (minimum stable value)
            configOptions: config_options(config),
            Pin: 0,
            reserved: 0,
        };

        let status = unsafe { SPI_InitChannel(handle, &mut channel_config) };
        if status != FT_OK {
            unsafe { SPI_CloseChannel(handle) };
            return Err(status.into());
        }

        log::info!(
            "FT232H channel {} open: {} Hz, options 0x{:02X}",
            channel_index,
            config.clock_hz,
            channel_config.configOptions
        );

        let channel = Arc::new(Channel { handle });
        Ok((
            Ft232hBus {
                channel: channel.clone(),
            },
            Ft232hChipSelect { channel },
        ))
    }
}

/// Data half of an FT232H SPI channel (no chip-select handling)
pub struct Ft232hBus {
    channel: Arc<Channel>,
}

impl spi::ErrorType for Ft232hBus {
    type Error = Ft232hError;
}

impl SpiBus<u8> for Ft232hBus {
    fn read(&mut self, words: &mut [u8]) -> core::result::Result<(), Ft232hError> {
        if words.is_empty() {
            return Ok(());
        }
        let mut transferred: DWORD = 0;
        let status = unsafe {
            SPI_Read(
                self.channel.handle,
                words.as_mut_ptr(),
                words.len() as DWORD,
                &mut transferred,
                SPI_TRANSFER_OPTIONS_SIZE_IN_BYTES,
            )
        };
        check(status)?;
        check_len(words.len(), transferred)
    }

    fn write(&mut self, words: &[u8]) -> core::result::Result<(), Ft232hError> {
        if words.is_empty() {
            return Ok(());
        }
        let mut transferred: DWORD = 0;
        let status = unsafe {
            SPI_Write(
                self.channel.handle,
                words.as_ptr(),
                words.len() as DWORD,
                &mut transferred,
                SPI_TRANSFER_OPTIONS_SIZE_IN_BYTES,
            )
        };
        check(status)?;
        check_len(words.len(), transferred)
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> core::result::Result<(), Ft232hError> {
        let len = read.len().max(write.len());
        let mut outgoing = write.to_vec();
        outgoing.resize(len, 0x00);
        let mut incoming = vec![0u8; len];

        self.exchange(&mut incoming, &outgoing)?;
        read.copy_from_slice(&incoming[..read.len()]);
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> core::result::Result<(), Ft232hError> {
        let outgoing = words.to_vec();
        self.exchange(words, &outgoing)
    }

    fn flush(&mut self) -> core::result::Result<(), Ft232hError> {
        // libMPSSE transfers complete before returning
        Ok(())
    }
}

impl Ft232hBus {
    fn exchange(&mut self, incoming: &mut [u8], outgoing: &[u8]) -> core::result::Result<(), Ft232hError> {
        if outgoing.is_empty() {
            return Ok(());
        }
        let mut transferred: DWORD = 0;
        let status = unsafe {
            SPI_ReadWrite(
                self.channel.handle,
                incoming.as_mut_ptr(),
                outgoing.as_ptr(),
                outgoing.len() as DWORD,
                &mut transferred,
                SPI_TRANSFER_OPTIONS_SIZE_IN_BYTES,
            )
        };
        check(status)?;
        check_len(outgoing.len(), transferred)
    }
}

/// Chip-select half of an FT232H SPI channel
pub struct Ft232hChipSelect {
    channel: Arc<Channel>,
}

impl digital::ErrorType for Ft232hChipSelect {
    type Error = Ft232hError;
}

impl OutputPin for Ft232hChipSelect {
    /// Assert chip select (line low with the active-low option)
    fn set_low(&mut self) -> core::result::Result<(), Ft232hError> {
        check(unsafe { SPI_ToggleCS(self.channel.handle, 1) })
    }

    fn set_high(&mut self) -> core::result::Result<(), Ft232hError> {
        check(unsafe { SPI_ToggleCS(self.channel.handle, 0) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::spi::{MODE_0, MODE_3};

    #[test]
    fn test_config_options_default_wiring() {
        assert_eq!(config_options(&BusConfig::default()), 0x23);
    }

    #[test]
    fn test_config_options_mode_and_pin() {
        let config = BusConfig {
            mode: MODE_0,
            chip_select: ChipSelectPin::D5,
            ..BusConfig::default()
        };
        assert_eq!(config_options(&config), 0x08 | 0x20);
        assert_eq!(BusConfig::default().mode, MODE_3);
    }
}

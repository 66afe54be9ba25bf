//! Serial transport for telemetry records

use crate::config::SerialConfig;
use crate::error::Result;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::time::Duration;

/// Read timeout used by the host viewer between lines
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Open a serial port at 8N1 with no flow control
///
/// # Arguments
/// * `config` - Port path (e.g., "/dev/ttyUSB0" or "COM21") and baud rate
pub fn open_serial(config: &SerialConfig) -> Result<Box<dyn SerialPort>> {
    let port = serialport::new(config.port.as_str(), config.baud)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(READ_TIMEOUT)
        .open()?;

    log::info!("Opened serial port: {} at {} baud", config.port, config.baud);
    Ok(port)
}

//! ADXL343 register access over a chip-select-framed SPI bus
//!
//! Every call is one indivisible transaction: chip select is asserted, the
//! command byte (and data) is clocked out, optional data is clocked in, and
//! chip select is released again on every exit path.

use crate::error::{Result, TelemetryError};
use crate::safety::ForceIdle;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

/// Read flag in the command byte
const CMD_READ: u8 = 0x80;
/// Multi-byte flag: the device auto-increments its register pointer
const CMD_MULTI_BYTE: u8 = 0x40;
/// Address bits of the command byte
const ADDRESS_MASK: u8 = 0x3F;

/// 6-bit ADXL343 register address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterAddress(u8);

impl RegisterAddress {
    pub const DEVID: Self = Self(0x00);
    pub const POWER_CTL: Self = Self(0x2D);
    pub const DATA_FORMAT: Self = Self(0x31);
    pub const DATAX0: Self = Self(0x32);

    /// Checked constructor; addresses above 0x3F do not exist on the device
    pub fn new(address: u8) -> Result<Self> {
        if address > ADDRESS_MASK {
            return Err(TelemetryError::InvalidRegister(address));
        }
        Ok(Self(address))
    }

    pub(crate) fn write_command(self) -> u8 {
        self.0 & ADDRESS_MASK
    }

    pub(crate) fn read_command(self, count: usize) -> u8 {
        let multi = if count > 1 { CMD_MULTI_BYTE } else { 0 };
        CMD_READ | multi | (self.0 & ADDRESS_MASK)
    }
}

/// Register interface owning the SPI bus and its chip-select line
pub struct RegisterBus<SPI, CS> {
    spi: SPI,
    cs: CS,
}

impl<SPI, CS> RegisterBus<SPI, CS>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
{
    /// Take ownership of the bus and drive chip select to idle
    pub fn new(spi: SPI, mut cs: CS) -> Self {
        if cs.set_high().is_err() {
            log::warn!("Chip select did not acknowledge initial idle level");
        }
        Self { spi, cs }
    }

    /// Write `value` to `register`
    pub fn write(&mut self, register: RegisterAddress, value: u8) -> Result<()> {
        let frame = [register.write_command(), value];
        self.transaction(|spi| spi.write(&frame))
    }

    /// Read `count` consecutive registers starting at `register`
    pub fn read(&mut self, register: RegisterAddress, count: usize) -> Result<Vec<u8>> {
        let mut data = vec![0u8; count];
        self.read_into(register, &mut data)?;
        Ok(data)
    }

    /// Fill `buf` from consecutive registers, without allocating
    ///
    /// An empty buffer returns immediately with no bus activity.
    pub fn read_into(&mut self, register: RegisterAddress, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }

        let command = [register.read_command(buf.len())];
        self.transaction(|spi| {
            spi.write(&command)?;
            spi.read(buf)
        })
    }

    fn transaction<F>(&mut self, body: F) -> Result<()>
    where
        F: FnOnce(&mut SPI) -> core::result::Result<(), SPI::Error>,
    {
        if let Err(e) = self.cs.set_low() {
            let _ = self.cs.set_high();
            return Err(TelemetryError::bus("chip select assert", e));
        }

        let outcome = body(&mut self.spi).and_then(|_| self.spi.flush());
        let released = self.cs.set_high();

        outcome.map_err(|e| TelemetryError::bus("spi transfer", e))?;
        released.map_err(|e| TelemetryError::bus("chip select release", e))?;
        Ok(())
    }
}

impl<SPI, CS> ForceIdle for RegisterBus<SPI, CS>
where
    CS: OutputPin,
{
    /// Pin errors are ignored; this runs on the fault path.
    fn force_idle(&mut self) {
        if self.cs.set_high().is_err() {
            log::warn!("Chip select did not acknowledge idle request");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedAdxl343;

    fn bus() -> (SimulatedAdxl343, RegisterBus<crate::sim::SimSpi, crate::sim::SimChipSelect>) {
        let sim = SimulatedAdxl343::new();
        let (spi, cs) = sim.split();
        (sim, RegisterBus::new(spi, cs))
    }

    #[test]
    fn test_register_address_range() {
        assert!(RegisterAddress::new(0x3F).is_ok());
        assert!(matches!(
            RegisterAddress::new(0x40),
            Err(TelemetryError::InvalidRegister(0x40))
        ));
    }

    #[test]
    fn test_write_then_single_read_commands() {
        let (sim, mut bus) = bus();
        for r in [0x00u8, 0x1E, 0x2D, 0x31, 0x3F] {
            let reg = RegisterAddress::new(r).unwrap();
            sim.clear_log();

            bus.write(reg, 0xA5).unwrap();
            let value = bus.read(reg, 1).unwrap();

            let log = sim.transactions();
            assert_eq!(log.len(), 2);
            assert_eq!(log[0].written, vec![r & 0x3F, 0xA5]);
            assert_eq!(log[1].written, vec![0x80 | r]);
            assert_eq!(log[1].read_len, 1);
            // DEVID is read-only on the device
            if r != 0x00 {
                assert_eq!(value, vec![0xA5]);
            }
        }
    }

    #[test]
    fn test_multi_byte_read_command() {
        let (sim, mut bus) = bus();
        let data = bus.read(RegisterAddress::DATAX0, 6).unwrap();
        assert_eq!(data.len(), 6);

        let log = sim.transactions();
        assert_eq!(log[0].written, vec![0x80 | 0x40 | 0x32]);
        assert_eq!(log[0].read_len, 6);
    }

    #[test]
    fn test_zero_length_read_is_silent() {
        let (sim, mut bus) = bus();
        let data = bus.read(RegisterAddress::DATAX0, 0).unwrap();
        assert!(data.is_empty());
        assert!(sim.transactions().is_empty());
        assert_eq!(sim.cs_transitions(), 0);
    }

    #[test]
    fn test_chip_select_idle_after_transfer_fault() {
        let (sim, mut bus) = bus();
        sim.fail_next_transfers(1);

        let result = bus.write(RegisterAddress::POWER_CTL, 0x08);
        assert!(matches!(result, Err(TelemetryError::BusTransactionFailure(_))));
        assert!(sim.cs_is_high());

        // Bus remains usable once the transport recovers
        bus.write(RegisterAddress::POWER_CTL, 0x08).unwrap();
        assert!(sim.cs_is_high());
    }

    #[test]
    fn test_chip_select_idle_after_read_fault() {
        let (sim, mut bus) = bus();
        sim.fail_next_transfers(1);

        let result = bus.read(RegisterAddress::DATAX0, 6);
        assert!(result.is_err());
        assert!(sim.cs_is_high());
    }

    #[test]
    fn test_new_tolerates_faulty_pin() {
        let sim = SimulatedAdxl343::new();
        sim.fail_chip_select(true);
        let (spi, cs) = sim.split();
        let mut bus = RegisterBus::new(spi, cs);

        assert!(bus.write(RegisterAddress::POWER_CTL, 0x08).is_err());
        assert!(sim.transactions().is_empty());

        sim.fail_chip_select(false);
        bus.write(RegisterAddress::POWER_CTL, 0x08).unwrap();
        assert_eq!(sim.register(0x2D), 0x08);
        assert!(sim.cs_is_high());
    }

    #[test]
    fn test_force_idle_with_faulty_pin() {
        let (sim, mut bus) = bus();
        sim.fail_chip_select(true);
        bus.force_idle();
        sim.fail_chip_select(false);
        bus.force_idle();
        assert!(sim.cs_is_high());
    }
}

//! In-process ADXL343 register model
//!
//! Implements the same embedded-hal traits as the FT232H backend so the whole
//! pipeline can run without hardware. The model decodes command bytes the way
//! the device does (read flag, multi-byte flag, auto-increment), keeps a
//! transaction log, and can inject bus faults.

use embedded_hal::digital::{self, OutputPin};
use embedded_hal::spi::{self, SpiBus};
use std::sync::{Arc, Mutex, MutexGuard};

const REGISTER_COUNT: usize = 64;
const DEVID_VALUE: u8 = 0xE5;
const REG_DEVID: u8 = 0x00;
const REG_DATAX0: u8 = 0x32;
const REG_DATAZ1: u8 = 0x37;

/// Raw counts for 1 g in full-resolution mode
const ONE_G_COUNTS: f64 = 256.0;

/// Fault injected by the simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SimError {
    #[error("injected SPI transfer fault")]
    Transfer,
    #[error("injected chip-select fault")]
    ChipSelect,
}

impl spi::Error for SimError {
    fn kind(&self) -> spi::ErrorKind {
        match self {
            SimError::ChipSelect => spi::ErrorKind::ChipSelectFault,
            SimError::Transfer => spi::ErrorKind::Other,
        }
    }
}

impl digital::Error for SimError {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

/// One chip-select-framed exchange as seen by the device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    /// Bytes clocked in from the controller (command first)
    pub written: Vec<u8>,
    /// Number of bytes clocked out to the controller
    pub read_len: usize,
}

struct SimState {
    registers: [u8; REGISTER_COUNT],
    cs_low: bool,
    cs_transitions: usize,
    command: Option<u8>,
    pointer: u8,
    log: Vec<Transaction>,
    failing_transfers: usize,
    failing_cs: bool,
    motion_phase: Option<f64>,
}

impl SimState {
    fn new() -> Self {
        let mut registers = [0u8; REGISTER_COUNT];
        registers[REG_DEVID as usize] = DEVID_VALUE;
        Self {
            registers,
            cs_low: false,
            cs_transitions: 0,
            command: None,
            pointer: 0,
            log: Vec::new(),
            failing_transfers: 0,
            failing_cs: false,
            motion_phase: None,
        }
    }

    fn take_transfer_fault(&mut self) -> bool {
        if self.failing_transfers > 0 {
            self.failing_transfers -= 1;
            true
        } else {
            false
        }
    }

    fn multi_byte(&self) -> bool {
        self.command.map_or(false, |c| c & 0x40 != 0)
    }

    fn advance(&mut self) {
        if self.multi_byte() {
            self.pointer = (self.pointer + 1) & 0x3F;
        }
    }

    fn clock_in(&mut self, byte: u8) {
        match self.command {
            None => {
                self.command = Some(byte);
                self.pointer = byte & 0x3F;
                if byte & 0x80 != 0 && self.pointer == REG_DATAX0 {
                    self.step_motion();
                }
            }
            Some(command) if command & 0x80 == 0 => {
                let read_only = self.pointer == REG_DEVID
                    || (REG_DATAX0..=REG_DATAZ1).contains(&self.pointer);
                if !read_only {
                    self.registers[self.pointer as usize] = byte;
                }
                self.advance();
            }
            // Bytes clocked in during a read phase are ignored by the device
            Some(_) => {}
        }
    }

    fn clock_out(&mut self) -> u8 {
        match self.command {
            Some(command) if command & 0x80 != 0 => {
                let value = self.registers[self.pointer as usize];
                self.advance();
                value
            }
            _ => 0x00,
        }
    }

    fn set_axes(&mut self, x: i16, y: i16, z: i16) {
        let base = REG_DATAX0 as usize;
        self.registers[base..base + 2].copy_from_slice(&x.to_le_bytes());
        self.registers[base + 2..base + 4].copy_from_slice(&y.to_le_bytes());
        self.registers[base + 4..base + 6].copy_from_slice(&z.to_le_bytes());
    }

    /// Rotate the gravity vector slowly about the X axis
    fn step_motion(&mut self) {
        if let Some(phase) = self.motion_phase {
            let y = (ONE_G_COUNTS * phase.sin()).round() as i16;
            let z = (ONE_G_COUNTS * phase.cos()).round() as i16;
            self.set_axes(0, y, z);
            self.motion_phase = Some(phase + 0.01);
        }
    }
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Simulated ADXL343 with probe methods for inspecting bus traffic
#[derive(Clone)]
pub struct SimulatedAdxl343 {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedAdxl343 {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::new())),
        }
    }

    /// Bus and chip-select halves wired to this device
    pub fn split(&self) -> (SimSpi, SimChipSelect) {
        (
            SimSpi {
                state: self.state.clone(),
            },
            SimChipSelect {
                state: self.state.clone(),
            },
        )
    }

    /// Override the DEVID register (e.g. to model a missing device)
    pub fn set_identity(&self, id: u8) {
        lock(&self.state).registers[REG_DEVID as usize] = id;
    }

    /// Load raw axis counts into DATAX0..DATAZ1
    pub fn set_raw_axes(&self, x: i16, y: i16, z: i16) {
        lock(&self.state).set_axes(x, y, z);
    }

    /// Load the six data bytes exactly as they appear in the register file
    pub fn set_data_bytes(&self, bytes: [u8; 6]) {
        let base = REG_DATAX0 as usize;
        lock(&self.state).registers[base..base + 6].copy_from_slice(&bytes);
    }

    /// Animate the data registers on every burst read
    pub fn enable_motion(&self) {
        lock(&self.state).motion_phase = Some(0.0);
    }

    pub fn register(&self, address: u8) -> u8 {
        lock(&self.state).registers[(address & 0x3F) as usize]
    }

    /// Write a register directly, bypassing the bus
    pub fn set_register(&self, address: u8, value: u8) {
        lock(&self.state).registers[(address & 0x3F) as usize] = value;
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        lock(&self.state).log.clone()
    }

    pub fn transaction_count(&self) -> usize {
        lock(&self.state).log.len()
    }

    pub fn clear_log(&self) {
        lock(&self.state).log.clear();
    }

    pub fn cs_is_high(&self) -> bool {
        !lock(&self.state).cs_low
    }

    /// Number of chip-select level changes seen so far
    pub fn cs_transitions(&self) -> usize {
        lock(&self.state).cs_transitions
    }

    /// Make the next `count` SPI read/write calls fail
    pub fn fail_next_transfers(&self, count: usize) {
        lock(&self.state).failing_transfers = count;
    }

    /// Make every chip-select change fail while `failing` is set
    pub fn fail_chip_select(&self, failing: bool) {
        lock(&self.state).failing_cs = failing;
    }
}

impl Default for SimulatedAdxl343 {
    fn default() -> Self {
        Self::new()
    }
}

/// SPI half of the simulator
pub struct SimSpi {
    state: Arc<Mutex<SimState>>,
}

impl spi::ErrorType for SimSpi {
    type Error = SimError;
}

impl SpiBus<u8> for SimSpi {
    fn read(&mut self, words: &mut [u8]) -> Result<(), SimError> {
        let mut state = lock(&self.state);
        if state.take_transfer_fault() {
            return Err(SimError::Transfer);
        }
        if !state.cs_low {
            words.fill(0xFF);
            return Ok(());
        }
        for word in words.iter_mut() {
            *word = state.clock_out();
        }
        if let Some(current) = state.log.last_mut() {
            current.read_len += words.len();
        }
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), SimError> {
        let mut state = lock(&self.state);
        if state.take_transfer_fault() {
            return Err(SimError::Transfer);
        }
        if !state.cs_low {
            return Ok(());
        }
        for &word in words {
            state.clock_in(word);
        }
        if let Some(current) = state.log.last_mut() {
            current.written.extend_from_slice(words);
        }
        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), SimError> {
        SpiBus::write(self, write)?;
        SpiBus::read(self, read)
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), SimError> {
        let outgoing = words.to_vec();
        SpiBus::write(self, &outgoing)?;
        SpiBus::read(self, words)
    }

    fn flush(&mut self) -> Result<(), SimError> {
        Ok(())
    }
}

/// Chip-select half of the simulator (active low)
pub struct SimChipSelect {
    state: Arc<Mutex<SimState>>,
}

impl digital::ErrorType for SimChipSelect {
    type Error = SimError;
}

impl OutputPin for SimChipSelect {
    fn set_low(&mut self) -> Result<(), SimError> {
        let mut state = lock(&self.state);
        if state.failing_cs {
            return Err(SimError::ChipSelect);
        }
        if !state.cs_low {
            state.cs_low = true;
            state.cs_transitions += 1;
            state.command = None;
            state.log.push(Transaction::default());
        }
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), SimError> {
        let mut state = lock(&self.state);
        if state.failing_cs {
            return Err(SimError::ChipSelect);
        }
        if state.cs_low {
            state.cs_low = false;
            state.cs_transitions += 1;
            state.command = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_devid_defaults_to_adxl343() {
        let sim = SimulatedAdxl343::new();
        assert_eq!(sim.register(0x00), 0xE5);
    }

    #[test]
    fn test_burst_read_auto_increments() {
        let sim = SimulatedAdxl343::new();
        sim.set_raw_axes(1, -2, 3);
        let (mut spi, mut cs) = sim.split();

        cs.set_low().unwrap();
        SpiBus::write(&mut spi, &[0xC0 | 0x32]).unwrap();
        let mut buf = [0u8; 6];
        SpiBus::read(&mut spi, &mut buf).unwrap();
        cs.set_high().unwrap();

        assert_eq!(buf, [0x01, 0x00, 0xFE, 0xFF, 0x03, 0x00]);
    }

    #[test]
    fn test_single_read_does_not_increment() {
        let sim = SimulatedAdxl343::new();
        sim.set_data_bytes([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
        let (mut spi, mut cs) = sim.split();

        cs.set_low().unwrap();
        SpiBus::write(&mut spi, &[0x80 | 0x32]).unwrap();
        let mut buf = [0u8; 2];
        SpiBus::read(&mut spi, &mut buf).unwrap();
        cs.set_high().unwrap();

        assert_eq!(buf, [0x11, 0x11]);
    }

    #[test]
    fn test_traffic_ignored_while_deselected() {
        let sim = SimulatedAdxl343::new();
        let (mut spi, _cs) = sim.split();

        SpiBus::write(&mut spi, &[0x2D, 0x08]).unwrap();
        assert_eq!(sim.register(0x2D), 0x00);
        assert_eq!(sim.transaction_count(), 0);
    }

    #[test]
    fn test_data_registers_read_only() {
        let sim = SimulatedAdxl343::new();
        let (mut spi, mut cs) = sim.split();

        cs.set_low().unwrap();
        SpiBus::write(&mut spi, &[0x32, 0x7F]).unwrap();
        cs.set_high().unwrap();

        assert_eq!(sim.register(0x32), 0x00);
    }

    #[test]
    fn test_motion_keeps_one_g_magnitude() {
        let sim = SimulatedAdxl343::new();
        sim.enable_motion();
        let (mut spi, mut cs) = sim.split();

        for _ in 0..50 {
            cs.set_low().unwrap();
            SpiBus::write(&mut spi, &[0xC0 | 0x32]).unwrap();
            let mut buf = [0u8; 6];
            SpiBus::read(&mut spi, &mut buf).unwrap();
            cs.set_high().unwrap();

            let y = i16::from_le_bytes([buf[2], buf[3]]) as f64;
            let z = i16::from_le_bytes([buf[4], buf[5]]) as f64;
            let magnitude = (y * y + z * z).sqrt();
            assert!((magnitude - 256.0).abs() < 1.5);
        }
    }

    #[test]
    fn test_injected_faults_are_consumed() {
        let sim = SimulatedAdxl343::new();
        let (mut spi, mut cs) = sim.split();
        sim.fail_next_transfers(2);

        cs.set_low().unwrap();
        assert_eq!(SpiBus::write(&mut spi, &[0x00]), Err(SimError::Transfer));
        assert_eq!(SpiBus::write(&mut spi, &[0x00]), Err(SimError::Transfer));
        assert!(SpiBus::write(&mut spi, &[0x00]).is_ok());
        cs.set_high().unwrap();
    }
}

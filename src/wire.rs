//! Line-oriented telemetry record format
//!
//! One record per sample:
//!
//! ```text
//! |<timestamp_ms>, <ax>, <ay>, <az>
//! ```
//!
//! Accelerations carry exactly six decimal places. The host decoder relies on
//! the leading `|`, the `", "` separators and the fixed precision.

use crate::adxl343::Sample;
use crate::error::Result;
use std::io::Write;

/// Leading delimiter that marks a telemetry line
pub const RECORD_PREFIX: char = '|';

/// Format one record, without the trailing newline
pub fn encode_record(sample: &Sample) -> String {
    format!(
        "{}{}, {:.6}, {:.6}, {:.6}",
        RECORD_PREFIX, sample.timestamp_ms, sample.ax, sample.ay, sample.az
    )
}

/// Writes newline-terminated records to a byte stream
pub struct WireEncoder<W: Write> {
    out: W,
    records: u64,
}

impl<W: Write> WireEncoder<W> {
    pub fn new(out: W) -> Self {
        Self { out, records: 0 }
    }

    /// Write one record and flush it to the transport
    pub fn emit(&mut self, sample: &Sample) -> Result<()> {
        writeln!(self.out, "{}", encode_record(sample))?;
        self.out.flush()?;
        self.records += 1;
        Ok(())
    }

    /// Number of records written so far
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

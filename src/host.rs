//! Host-side decoding and rendering of the telemetry stream
//!
//! Lines that do not start with `|` are the device's own diagnostics and are
//! skipped. Telemetry lines that fail validation are dropped without
//! interrupting the stream.

use crate::error::{Result, TelemetryError};
use crate::wire::RECORD_PREFIX;
use chrono::NaiveTime;

/// Fields in one telemetry record
const FIELD_COUNT: usize = 4;

/// One parsed telemetry record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryRecord {
    pub timestamp_ms: i64,
    pub ax: f64,
    pub ay: f64,
    pub az: f64,
}

/// Classification of one input line
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Line {
    /// Non-telemetry output; ignored
    Diagnostic,
    Telemetry(TelemetryRecord),
}

/// Record plus the device-side time since the previous record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedSample {
    pub record: TelemetryRecord,
    pub dt_secs: f64,
}

/// Classify and parse a single line
///
/// Returns `MalformedTelemetryLine` for a `|` line with the wrong field count
/// or a field that is not numeric.
pub fn parse_line(line: &str) -> Result<Line> {
    let line = line.trim();
    if !line.starts_with(RECORD_PREFIX) {
        return Ok(Line::Diagnostic);
    }

    let body = line.trim_matches(RECORD_PREFIX);
    let fields: Vec<&str> = body.split(',').map(str::trim).collect();
    if fields.len() != FIELD_COUNT {
        return Err(TelemetryError::MalformedTelemetryLine(format!(
            "expected {} fields, got {}",
            FIELD_COUNT,
            fields.len()
        )));
    }

    let timestamp_ms = fields[0].parse::<i64>().map_err(|_| {
        TelemetryError::MalformedTelemetryLine(format!("invalid timestamp '{}'", fields[0]))
    })?;
    let axis = |index: usize| {
        fields[index].parse::<f64>().map_err(|_| {
            TelemetryError::MalformedTelemetryLine(format!(
                "invalid acceleration '{}'",
                fields[index]
            ))
        })
    };

    Ok(Line::Telemetry(TelemetryRecord {
        timestamp_ms,
        ax: axis(1)?,
        ay: axis(2)?,
        az: axis(3)?,
    }))
}

/// Stateful decoder tracking the previous device timestamp
#[derive(Debug, Default)]
pub struct HostDecoder {
    last_timestamp_ms: Option<i64>,
    decoded: u64,
    dropped: u64,
}

impl HostDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one line; `None` for diagnostics and dropped lines
    pub fn decode(&mut self, line: &str) -> Option<DecodedSample> {
        match parse_line(line) {
            Ok(Line::Telemetry(record)) => {
                let dt_secs = match self.last_timestamp_ms {
                    // Widened so arbitrary host input cannot overflow
                    Some(previous) => {
                        (i128::from(record.timestamp_ms) - i128::from(previous)) as f64 / 1000.0
                    }
                    None => 0.0,
                };
                self.last_timestamp_ms = Some(record.timestamp_ms);
                self.decoded += 1;
                Some(DecodedSample { record, dt_secs })
            }
            Ok(Line::Diagnostic) => None,
            Err(e) => {
                self.dropped += 1;
                log::debug!("Dropping line {:?}: {}", line.trim(), e);
                None
            }
        }
    }

    /// Telemetry lines accepted so far
    pub fn decoded(&self) -> u64 {
        self.decoded
    }

    /// Telemetry lines rejected so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Format a sample for the console with the given host wall-clock time
pub fn render(sample: &DecodedSample, host_time: NaiveTime) -> String {
    format!(
        "[{}] dt={:.3}s  ax={:.6}  ay={:.6}  az={:.6}",
        host_time.format("%H:%M:%S"),
        sample.dt_secs,
        sample.record.ax,
        sample.record.ay,
        sample.record.az
    )
}

/// Format a sample stamped with the local time now
pub fn render_now(sample: &DecodedSample) -> String {
    render(sample, chrono::Local::now().time())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adxl343::Sample;
    use crate::wire::encode_record;

    #[test]
    fn test_parse_valid_record() {
        let line = parse_line("|123456, 0.123456, -9.801234, 0.050000\r\n").unwrap();
        assert_eq!(
            line,
            Line::Telemetry(TelemetryRecord {
                timestamp_ms: 123456,
                ax: 0.123456,
                ay: -9.801234,
                az: 0.05,
            })
        );
    }

    #[test]
    fn test_diagnostic_lines_ignored() {
        assert_eq!(parse_line("SAFE STATE: Error -> boom").unwrap(), Line::Diagnostic);
        assert_eq!(parse_line("").unwrap(), Line::Diagnostic);

        let mut decoder = HostDecoder::new();
        assert!(decoder.decode("MPY: soft reboot").is_none());
        assert_eq!(decoder.dropped(), 0);
    }

    #[test]
    fn test_malformed_lines_dropped() {
        assert!(matches!(
            parse_line("|1000, 0.1, 0.2"),
            Err(TelemetryError::MalformedTelemetryLine(_))
        ));
        assert!(matches!(
            parse_line("|1000, 0.1, abc, 0.3"),
            Err(TelemetryError::MalformedTelemetryLine(_))
        ));
        assert!(matches!(
            parse_line("|10.5, 0.1, 0.2, 0.3"),
            Err(TelemetryError::MalformedTelemetryLine(_))
        ));

        let mut decoder = HostDecoder::new();
        assert!(decoder.decode("|1000, 0.1, 0.2").is_none());
        assert!(decoder.decode("|1000, 0.1, x, 0.3").is_none());
        assert!(decoder.decode("|1000, 0.1, 0.2, 0.3, 0.4").is_none());
        assert_eq!(decoder.dropped(), 3);
        assert_eq!(decoder.decoded(), 0);
    }

    #[test]
    fn test_first_line_dt_zero() {
        let mut decoder = HostDecoder::new();
        let first = decoder.decode("|987654, 0.0, 0.0, 9.8").unwrap();
        assert_eq!(first.dt_secs, 0.0);
    }

    #[test]
    fn test_dt_from_device_timestamps() {
        let mut decoder = HostDecoder::new();
        decoder.decode("|1000, 0.0, 0.0, 9.8").unwrap();
        let second = decoder.decode("|1250, 0.0, 0.0, 9.8").unwrap();
        assert!((second.dt_secs - 0.250).abs() < 1e-12);
    }

    #[test]
    fn test_dropped_line_does_not_reset_dt() {
        let mut decoder = HostDecoder::new();
        decoder.decode("|1000, 0.0, 0.0, 9.8").unwrap();
        assert!(decoder.decode("|1100, 0.0, bad, 9.8").is_none());
        assert!(decoder.decode("debug output").is_none());
        let next = decoder.decode("|1300, 0.0, 0.0, 9.8").unwrap();
        assert!((next.dt_secs - 0.300).abs() < 1e-12);
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let mut decoder = HostDecoder::new();
        decoder.decode("|9223372036854775807, 0.0, 0.0, 0.0").unwrap();
        let next = decoder.decode("|-9223372036854775808, 0.0, 0.0, 0.0").unwrap();

        let expected = -(u64::MAX as f64) / 1000.0;
        assert!(next.dt_secs.is_finite());
        assert!((next.dt_secs - expected).abs() / expected.abs() < 1e-12);

        let back = decoder.decode("|9223372036854775807, 0.0, 0.0, 0.0").unwrap();
        assert!((back.dt_secs + expected).abs() / expected.abs() < 1e-12);
    }

    #[test]
    fn test_render_format() {
        let sample = DecodedSample {
            record: TelemetryRecord {
                timestamp_ms: 1250,
                ax: 0.123456,
                ay: -9.801234,
                az: 0.05,
            },
            dt_secs: 0.25,
        };
        let time = NaiveTime::from_hms_opt(9, 5, 7).unwrap();
        assert_eq!(
            render(&sample, time),
            "[09:05:07] dt=0.250s  ax=0.123456  ay=-9.801234  az=0.050000"
        );
    }

    #[test]
    fn test_round_trip_through_wire_format() {
        let samples = [
            Sample { timestamp_ms: 0, ax: 0.0, ay: 0.0, az: 9.80665 },
            Sample { timestamp_ms: 10, ax: 0.61291, ay: -0.61291, az: 9.7683 },
            Sample { timestamp_ms: u32::MAX, ax: -78.4532, ay: 78.4532, az: -0.0000004 },
        ];

        let mut decoder = HostDecoder::new();
        for sample in &samples {
            let decoded = decoder.decode(&encode_record(sample)).unwrap();
            assert_eq!(decoded.record.timestamp_ms, i64::from(sample.timestamp_ms));
            assert!((decoded.record.ax - sample.ax).abs() <= 5e-7);
            assert!((decoded.record.ay - sample.ay).abs() <= 5e-7);
            assert!((decoded.record.az - sample.az).abs() <= 5e-7);
        }
    }
}

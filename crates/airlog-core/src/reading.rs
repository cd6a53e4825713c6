//! Timestamped sensor reading carried through both buffer tiers

use core::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

/// One timestamped sensor sample
///
/// A `None` field means the sensor failed to produce that value. It is kept
/// as `None` through both buffer tiers and rendered as `null` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Reading {
    /// Degrees Celsius
    pub temperature: Option<f32>,
    /// Relative humidity in percent
    pub humidity: Option<f32>,
    /// Gas sensor level, published under the `oxygen` key
    pub gas_level: Option<f32>,
    /// Seconds since the Unix epoch once the clock has been synchronized,
    /// otherwise seconds since boot. See [`crate::clock::ClockEstimator`].
    pub timestamp: u64,
}

impl Reading {
    pub const fn new(
        temperature: Option<f32>,
        humidity: Option<f32>,
        gas_level: Option<f32>,
        timestamp: u64,
    ) -> Self {
        Self {
            temperature,
            humidity,
            gas_level,
            timestamp,
        }
    }
}

fn write_field(f: &mut Formatter<'_>, value: Option<f32>) -> FmtResult {
    match value {
        Some(v) => write!(f, "{:.1}", v),
        None => f.write_str("null"),
    }
}

impl Display for Reading {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "[Reading] timestamp: {}, temperature: ", self.timestamp)?;
        write_field(f, self.temperature)?;
        f.write_str(", humidity: ")?;
        write_field(f, self.humidity)?;
        f.write_str(", gas: ")?;
        write_field(f, self.gas_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_display_renders_missing_fields_as_null() {
        let reading = Reading::new(Some(21.34), None, Some(3.0), 42);

        assert_eq!(
            reading.to_string(),
            "[Reading] timestamp: 42, temperature: 21.3, humidity: null, gas: 3.0"
        );
    }

    #[test]
    fn test_postcard_keeps_null_fields() {
        let reading = Reading::new(None, Some(48.5), None, 1_700_000_000);

        let bytes = postcard::to_allocvec(&reading).unwrap();
        let decoded: Reading = postcard::from_bytes(&bytes).unwrap();

        assert_eq!(decoded, reading);
        assert!(decoded.temperature.is_none());
        assert!(decoded.gas_level.is_none());
    }
}

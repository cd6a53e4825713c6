//! Sensor trait definitions and sampling
//!
//! Sensor drivers live outside this crate. The agent only needs three values
//! per sample and treats every failed read as a missing field; it never retries
//! a read within the same sample.

use log::warn;
use thiserror_no_std::Error;

use crate::reading::Reading;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor} read failed during {operation}: {details}")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
    #[error("{sensor} is not ready")]
    NotReady { sensor: &'static str },
}

/// Environmental sensor bank sampled once per send interval.
pub trait EnvironmentSensor {
    /// Temperature in degrees Celsius
    fn read_temperature(&mut self) -> impl Future<Output = Result<f32, SensorError>>;

    /// Relative humidity in percent
    fn read_humidity(&mut self) -> impl Future<Output = Result<f32, SensorError>>;

    /// Gas sensor level in the sensor's native unit
    fn read_gas_level(&mut self) -> impl Future<Output = Result<f32, SensorError>>;
}

/// Raw fields of one sample before the clock stamps it
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorFields {
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub gas_level: Option<f32>,
}

impl SensorFields {
    /// Attach a timestamp, producing a bufferable [`Reading`]
    pub const fn stamp(self, timestamp: u64) -> Reading {
        Reading::new(self.temperature, self.humidity, self.gas_level, timestamp)
    }

    /// Number of fields that failed to read
    pub fn failures(&self) -> u32 {
        [self.temperature, self.humidity, self.gas_level]
            .iter()
            .filter(|v| v.is_none())
            .count() as u32
    }
}

fn field(name: &'static str, result: Result<f32, SensorError>) -> Option<f32> {
    match result {
        Ok(value) if value.is_finite() => Some(value),
        Ok(value) => {
            warn!("{} produced a non-finite value ({}), recording null", name, value);
            None
        }
        Err(e) => {
            warn!("{} unavailable, recording null: {}", name, e);
            None
        }
    }
}

/// Read every field once. Failures become `None`.
pub async fn sample<S: EnvironmentSensor>(sensor: &mut S) -> SensorFields {
    let temperature = field("temperature", sensor.read_temperature().await);
    let humidity = field("humidity", sensor.read_humidity().await);
    let gas_level = field("gas level", sensor.read_gas_level().await);

    SensorFields {
        temperature,
        humidity,
        gas_level,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSensor;
    use embassy_futures::block_on;

    #[test]
    fn test_sample_maps_failures_to_null() {
        let mut sensor = ScriptedSensor::new(21.5, 40.0, 7.5);
        sensor.fail_humidity = true;

        let fields = block_on(sample(&mut sensor));

        assert_eq!(fields.temperature, Some(21.5));
        assert_eq!(fields.humidity, None);
        assert_eq!(fields.gas_level, Some(7.5));
        assert_eq!(fields.failures(), 1);
    }

    #[test]
    fn test_sample_rejects_non_finite_values() {
        let mut sensor = ScriptedSensor::new(f32::NAN, 40.0, f32::INFINITY);

        let fields = block_on(sample(&mut sensor));

        assert_eq!(fields.temperature, None);
        assert_eq!(fields.gas_level, None);
        assert_eq!(fields.failures(), 2);
    }

    #[test]
    fn test_stamp_keeps_missing_fields() {
        let fields = SensorFields {
            temperature: None,
            humidity: Some(55.0),
            gas_level: None,
        };

        let reading = fields.stamp(99);

        assert_eq!(reading, Reading::new(None, Some(55.0), None, 99));
    }
}

//! Synthetic sensor, uplink and indicator for driving the agent on a desktop

use std::ops::Range;
use std::time::{SystemTime, UNIX_EPOCH};

use airlog_core::connectivity::Uplink;
use airlog_core::delivery::Transport;
use airlog_core::sensors::{EnvironmentSensor, SensorError};
use airlog_core::status::{DeviceStatus, StatusIndicator};
use embassy_time::Duration;
use log::{info, warn};

/// Every this many samples the humidity read fails
const HUMIDITY_FAILURE_PERIOD: u32 = 7;

/// Sensor readings that vary slowly over time.
pub struct MockSensor {
    samples: u32,
}

impl MockSensor {
    pub fn new() -> Self {
        Self { samples: 0 }
    }

    fn t(&self) -> f64 {
        f64::from(self.samples) * 30.0
    }
}

impl EnvironmentSensor for MockSensor {
    async fn read_temperature(&mut self) -> Result<f32, SensorError> {
        self.samples += 1;
        let t = self.t();
        // 20–26 °C sinusoidal with slow drift
        Ok((23.0 + 3.0 * (t / 1200.0).sin() + 0.5 * (t / 370.0).cos()) as f32)
    }

    async fn read_humidity(&mut self) -> Result<f32, SensorError> {
        if self.samples % HUMIDITY_FAILURE_PERIOD == 0 {
            return Err(SensorError::ReadFailed {
                sensor: "mock",
                operation: "read humidity",
                details: "checksum mismatch",
            });
        }
        let t = self.t();
        Ok((50.0 + 10.0 * (t / 1800.0).sin() + 2.0 * (t / 230.0).cos()) as f32)
    }

    async fn read_gas_level(&mut self) -> Result<f32, SensorError> {
        let t = self.t();
        Ok((20.9 - 0.3 * (t / 3000.0).sin()) as f32)
    }
}

/// Uplink that is unreachable during scripted outage windows.
///
/// Outages are uptime ranges in seconds. An outage also kills an open
/// transport, so publishes fail until the supervisor reconnects.
pub struct FlakyUplink {
    outages: Vec<Range<u64>>,
    uptime: u64,
    open: bool,
    endpoint: String,
}

impl FlakyUplink {
    pub fn new(endpoint: &str, outages: Vec<Range<u64>>) -> Self {
        Self {
            outages,
            uptime: 0,
            open: false,
            endpoint: String::from(endpoint),
        }
    }

    pub fn set_uptime(&mut self, uptime: u64) {
        self.uptime = uptime;
        if self.open && self.in_outage() {
            warn!("Simulated outage at {}s, transport lost", uptime);
            self.open = false;
        }
    }

    fn in_outage(&self) -> bool {
        self.outages.iter().any(|o| o.contains(&self.uptime))
    }

    fn reachable(&self) -> Result<(), &'static str> {
        if self.in_outage() {
            Err("network unreachable")
        } else {
            Ok(())
        }
    }
}

impl Uplink for FlakyUplink {
    type Error = &'static str;

    async fn establish_link(&mut self, _timeout: Duration) -> Result<(), Self::Error> {
        self.open = false;
        self.reachable()
    }

    async fn synchronize_clock(&mut self, _timeout: Duration) -> Result<u64, Self::Error> {
        self.reachable()?;
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .map_err(|_| "host clock before epoch")
    }

    async fn prepare_session(
        &mut self,
        epoch_secs: u64,
        lifetime: Duration,
    ) -> Result<(), Self::Error> {
        info!(
            "Session token for {} issued at {} valid {}s",
            self.endpoint,
            epoch_secs,
            lifetime.as_secs()
        );
        Ok(())
    }

    async fn open_transport(&mut self, _timeout: Duration) -> Result<(), Self::Error> {
        self.reachable()?;
        self.open = true;
        Ok(())
    }
}

impl Transport for FlakyUplink {
    type Error = &'static str;

    fn connected(&self) -> bool {
        self.open
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Self::Error> {
        self.reachable()?;
        info!("→ {} {}", topic, String::from_utf8_lossy(payload));
        Ok(())
    }
}

/// Logs status changes in place of an LED
pub struct LogIndicator;

impl StatusIndicator for LogIndicator {
    fn show(&mut self, status: DeviceStatus) {
        info!("[Status] {}", status.label());
    }
}

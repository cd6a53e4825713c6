//! Scripted collaborators shared by the unit tests

use alloc::string::String;
use alloc::vec::Vec;

use embassy_time::Duration;

use crate::connectivity::{Stage, Uplink};
use crate::delivery::Transport;
use crate::sensors::{EnvironmentSensor, SensorError};
use crate::status::{DeviceStatus, StatusIndicator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejected;

pub struct ScriptedSensor {
    pub temperature: f32,
    pub humidity: f32,
    pub gas_level: f32,
    pub fail_humidity: bool,
}

impl ScriptedSensor {
    pub fn new(temperature: f32, humidity: f32, gas_level: f32) -> Self {
        Self {
            temperature,
            humidity,
            gas_level,
            fail_humidity: false,
        }
    }
}

impl EnvironmentSensor for ScriptedSensor {
    async fn read_temperature(&mut self) -> Result<f32, SensorError> {
        Ok(self.temperature)
    }

    async fn read_humidity(&mut self) -> Result<f32, SensorError> {
        if self.fail_humidity {
            return Err(SensorError::ReadFailed {
                sensor: "SHT40",
                operation: "measure humidity",
                details: "no ACK",
            });
        }
        Ok(self.humidity)
    }

    async fn read_gas_level(&mut self) -> Result<f32, SensorError> {
        Ok(self.gas_level)
    }
}

/// Records successful publishes; fails every publish once `fail_after` have succeeded
pub struct RecordingTransport {
    pub online: bool,
    pub fail_after: Option<usize>,
    pub published: Vec<(String, Vec<u8>)>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            online: true,
            fail_after: None,
            published: Vec::new(),
        }
    }
}

impl Transport for RecordingTransport {
    type Error = Rejected;

    fn connected(&self) -> bool {
        self.online
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Rejected> {
        if self.fail_after.is_some_and(|n| self.published.len() >= n) {
            return Err(Rejected);
        }
        self.published.push((String::from(topic), payload.to_vec()));
        Ok(())
    }
}

/// Uplink whose steps succeed unless `fail_stage` names them.
///
/// `calls` counts invocations of link, clock sync, session and transport.
pub struct ScriptedUplink {
    pub epoch_secs: u64,
    pub fail_stage: Option<Stage>,
    pub fail_publish: bool,
    pub transport_open: bool,
    pub calls: [u32; 4],
    pub last_session: Option<(u64, Duration)>,
    pub published: Vec<Vec<u8>>,
}

impl ScriptedUplink {
    pub fn new(epoch_secs: u64) -> Self {
        Self {
            epoch_secs,
            fail_stage: None,
            fail_publish: false,
            transport_open: false,
            calls: [0; 4],
            last_session: None,
            published: Vec::new(),
        }
    }

    fn step(&mut self, stage: Stage, index: usize) -> Result<(), Rejected> {
        self.calls[index] += 1;
        if self.fail_stage == Some(stage) {
            return Err(Rejected);
        }
        Ok(())
    }
}

impl Uplink for ScriptedUplink {
    type Error = Rejected;

    async fn establish_link(&mut self, _timeout: Duration) -> Result<(), Rejected> {
        self.transport_open = false;
        self.step(Stage::Link, 0)
    }

    async fn synchronize_clock(&mut self, _timeout: Duration) -> Result<u64, Rejected> {
        self.step(Stage::ClockSync, 1)?;
        Ok(self.epoch_secs)
    }

    async fn prepare_session(&mut self, epoch_secs: u64, lifetime: Duration) -> Result<(), Rejected> {
        self.step(Stage::Session, 2)?;
        self.last_session = Some((epoch_secs, lifetime));
        Ok(())
    }

    async fn open_transport(&mut self, _timeout: Duration) -> Result<(), Rejected> {
        self.step(Stage::Transport, 3)?;
        self.transport_open = true;
        Ok(())
    }
}

impl Transport for ScriptedUplink {
    type Error = Rejected;

    fn connected(&self) -> bool {
        self.transport_open
    }

    async fn publish(&mut self, _topic: &str, payload: &[u8]) -> Result<(), Rejected> {
        if self.fail_publish {
            return Err(Rejected);
        }
        self.published.push(payload.to_vec());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingIndicator {
    pub shown: Vec<DeviceStatus>,
}

impl StatusIndicator for RecordingIndicator {
    fn show(&mut self, status: DeviceStatus) {
        self.shown.push(status);
    }
}

//! The single cooperative control loop
//!
//! [`Agent`] owns one instance of every component and is driven by repeated
//! calls to [`Agent::run_once`]. Nothing runs in the background: sampling,
//! buffering, connection maintenance and delivery all happen inside that call,
//! so no state is shared and nothing needs locking.

use log::{debug, error, info};

use crate::clock::ClockEstimator;
use crate::config::{AgentConfig, DeviceConfig};
use crate::connectivity::{ConnectivitySupervisor, Uplink};
use crate::counter::PersistentCounter;
use crate::delivery::{DeliveryPipeline, DeliveryReport, Transport};
use crate::metrics::AgentMetrics;
use crate::reading::Reading;
use crate::sensors::{self, EnvironmentSensor};
use crate::status::{DeviceStatus, StatusIndicator};
use crate::storage::{BufferError, DEFAULT_RAM_CAPACITY, DurableStore, ScalarCell, TieredBuffer};

/// What one [`Agent::run_once`] call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// A reading was taken this cycle
    pub sampled: bool,
    /// The supervisor reported the connection ready
    pub ready: bool,
    /// Outcome of the drain, if one ran
    pub delivery: Option<DeliveryReport>,
}

pub struct Agent<Se, St, C, U, I, const N: usize = DEFAULT_RAM_CAPACITY>
where
    Se: EnvironmentSensor,
    St: DurableStore,
    C: ScalarCell,
    U: Uplink + Transport,
    I: StatusIndicator,
{
    sensor: Se,
    uplink: U,
    indicator: I,
    clock: ClockEstimator,
    buffer: TieredBuffer<St, N>,
    counter: PersistentCounter<C>,
    pipeline: DeliveryPipeline,
    supervisor: ConnectivitySupervisor,
    metrics: AgentMetrics,
    send_interval_secs: u64,
    /// Uptime of the last sample
    last_sample: Option<u64>,
    status: Option<DeviceStatus>,
}

impl<Se, St, C, U, I, const N: usize> Agent<Se, St, C, U, I, N>
where
    Se: EnvironmentSensor,
    St: DurableStore,
    C: ScalarCell,
    U: Uplink + Transport,
    I: StatusIndicator,
{
    /// Assemble the agent, recovering the overflow tier and message id from
    /// durable storage.
    pub fn new(
        config: &AgentConfig,
        device: &DeviceConfig<'_>,
        sensor: Se,
        uplink: U,
        indicator: I,
        store: St,
        cell: C,
    ) -> Result<Self, BufferError> {
        let buffer = TieredBuffer::open(store)?;
        let counter = PersistentCounter::load(cell, config.counter_address, config.counter_ceiling);

        info!(
            "Agent {} starting: {} readings recovered, RAM tier holds {}, message ids wrap at {}",
            device.device_id,
            buffer.pending_count(),
            buffer.ram_capacity(),
            counter.ceiling()
        );

        Ok(Self {
            sensor,
            uplink,
            indicator,
            clock: ClockEstimator::new(config.offline_increment),
            buffer,
            counter,
            pipeline: DeliveryPipeline::new(device.device_id, device.topic),
            supervisor: ConnectivitySupervisor::new(
                config.backoff,
                config.step_timeout,
                config.token_lifetime,
            ),
            metrics: AgentMetrics::default(),
            send_interval_secs: config.send_interval.as_secs(),
            last_sample: None,
            status: None,
        })
    }

    /// Run one pass of the control loop at `uptime` seconds since boot.
    pub async fn run_once(&mut self, uptime: u64) -> CycleReport {
        let ready = self.supervisor.tick(uptime, &mut self.uplink).await;
        if let Some(sync) = self.supervisor.last_clock_sync() {
            self.clock.synchronize(sync);
        }

        let mut fault = false;
        let sampled = self.sample_due(uptime);
        if sampled {
            self.last_sample = Some(uptime);
            fault |= self.sample(ready, uptime).await.is_err();
        }

        let delivery = if ready && self.buffer.pending_count() > 0 {
            let report = self
                .pipeline
                .drain(&mut self.buffer, &mut self.uplink, &mut self.counter)
                .await;
            self.metrics.record_delivery(&report);
            fault |= report.id_commit_failures > 0;
            Some(report)
        } else {
            None
        };

        self.metrics.connect_attempts = self.supervisor.attempts();
        self.metrics.corrupt_records_skipped = self.buffer.corrupt_skipped();
        self.update_status(ready, fault);

        CycleReport {
            sampled,
            ready,
            delivery,
        }
    }

    fn sample_due(&self, uptime: u64) -> bool {
        self.last_sample
            .is_none_or(|last| uptime.saturating_sub(last) >= self.send_interval_secs)
    }

    async fn sample(&mut self, online: bool, uptime: u64) -> Result<Reading, BufferError> {
        let fields = sensors::sample(&mut self.sensor).await;
        self.metrics.sensor_failures = self.metrics.sensor_failures.saturating_add(fields.failures());
        self.metrics.readings_sampled = self.metrics.readings_sampled.saturating_add(1);

        let reading = fields.stamp(self.clock.timestamp_for(online, uptime));
        match self.buffer.push(reading) {
            Ok(()) => {
                debug!("Buffered {} ({} pending)", reading, self.buffer.pending_count());
                Ok(reading)
            }
            Err(e) => {
                self.metrics.readings_dropped = self.metrics.readings_dropped.saturating_add(1);
                error!("{}: {}", e, reading);
                Err(e)
            }
        }
    }

    fn update_status(&mut self, ready: bool, fault: bool) {
        let status = if fault {
            DeviceStatus::Fault
        } else if ready {
            DeviceStatus::Online
        } else if self.clock.is_synchronized() {
            DeviceStatus::Offline
        } else {
            DeviceStatus::Connecting
        };

        if self.status != Some(status) {
            info!("Status: {}", status.label());
            self.indicator.show(status);
            self.status = Some(status);
        }
    }

    pub fn buffer(&self) -> &TieredBuffer<St, N> {
        &self.buffer
    }

    pub fn supervisor(&self) -> &ConnectivitySupervisor {
        &self.supervisor
    }

    pub fn counter(&self) -> &PersistentCounter<C> {
        &self.counter
    }

    pub fn clock(&self) -> &ClockEstimator {
        &self.clock
    }

    pub fn metrics(&self) -> &AgentMetrics {
        &self.metrics
    }

    pub fn uplink(&self) -> &U {
        &self.uplink
    }

    pub fn uplink_mut(&mut self) -> &mut U {
        &mut self.uplink
    }

    pub fn sensor_mut(&mut self) -> &mut Se {
        &mut self.sensor
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    /// Stop the agent, handing back the durable storage as a power cut would
    /// leave it. The RAM tier is discarded.
    pub fn shutdown(self) -> (St, C) {
        (self.buffer.into_store(), self.counter.into_cell())
    }
}

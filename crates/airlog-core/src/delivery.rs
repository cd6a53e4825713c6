//! Ordered draining of the tiered buffer to the remote collector
//!
//! One reading is in flight at a time. A reading is removed from the buffer
//! only after the transport reported the publish as successful, and the first
//! failed publish ends the drain so the next cycle starts from the same
//! reading. A crash between publish and removal can deliver a reading twice;
//! nothing is ever skipped.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Debug;

use log::{debug, error, info, warn};
use serde::{Serialize, Serializer};

use crate::counter::IdProvider;
use crate::reading::Reading;
use crate::storage::{DurableStore, TieredBuffer};

/// Publish side of the uplink (MQTT client or similar)
pub trait Transport {
    type Error: Debug;

    /// Whether a publish can currently be attempted
    fn connected(&self) -> bool;

    /// Publish one payload, resolving once the broker acknowledged it
    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), Self::Error>>;
}

/// Outcome of one [`DeliveryPipeline::drain`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Readings published and confirmed this cycle
    pub sent: u32,
    /// The drain stopped on an error rather than running out of readings or connection
    pub failed: bool,
    /// Message ids that could not be persisted after a successful publish
    pub id_commit_failures: u32,
}

/// JSON body of one published reading. Field order is part of the wire contract.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage<'a> {
    message_id: u32,
    device_id: &'a str,
    #[serde(serialize_with = "one_decimal")]
    temperature: Option<f32>,
    #[serde(serialize_with = "one_decimal")]
    humidity: Option<f32>,
    #[serde(rename = "oxygen", serialize_with = "one_decimal")]
    gas_level: Option<f32>,
    timestamp: u64,
}

/// Round half away from zero to one decimal place
fn round_to_tenth(value: f32) -> f64 {
    let scaled = f64::from(value) * 10.0;
    let rounded = if scaled >= 0.0 {
        (scaled + 0.5) as i64
    } else {
        (scaled - 0.5) as i64
    };
    rounded as f64 / 10.0
}

fn one_decimal<S: Serializer>(value: &Option<f32>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => serializer.serialize_f64(round_to_tenth(*v)),
        None => serializer.serialize_none(),
    }
}

pub struct DeliveryPipeline {
    device_id: String,
    topic: String,
}

impl DeliveryPipeline {
    pub fn new(device_id: &str, topic: &str) -> Self {
        Self {
            device_id: String::from(device_id),
            topic: String::from(topic),
        }
    }

    /// Render a reading as the JSON payload published under `message_id`
    pub fn format(&self, reading: &Reading, message_id: u32) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&WireMessage {
            message_id,
            device_id: &self.device_id,
            temperature: reading.temperature,
            humidity: reading.humidity,
            gas_level: reading.gas_level,
            timestamp: reading.timestamp,
        })
    }

    /// Publish buffered readings oldest first until the buffer is empty, the
    /// transport disconnects, or a publish fails.
    ///
    /// After each confirmed publish the reading is removed from the buffer and
    /// `ids` is committed to the following id. A failure to persist the id is
    /// counted but does not stop the drain.
    pub async fn drain<S, T, I, const N: usize>(
        &self,
        buffer: &mut TieredBuffer<S, N>,
        transport: &mut T,
        ids: &mut I,
    ) -> DeliveryReport
    where
        S: DurableStore,
        T: Transport,
        I: IdProvider,
    {
        let mut report = DeliveryReport::default();

        while buffer.pending_count() > 0 && transport.connected() {
            let reading = match buffer.peek_front() {
                Ok(Some(reading)) => reading,
                Ok(None) => break,
                Err(e) => {
                    error!("Cannot read the oldest buffered reading: {}", e);
                    report.failed = true;
                    break;
                }
            };

            let message_id = ids.next();
            let payload = match self.format(&reading, message_id) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("Failed to encode message {}: {}", message_id, e);
                    report.failed = true;
                    break;
                }
            };

            if let Err(e) = transport.publish(&self.topic, &payload).await {
                warn!(
                    "Publish of message {} failed, halting drain with {} pending: {:?}",
                    message_id,
                    buffer.pending_count(),
                    e
                );
                report.failed = true;
                break;
            }
            debug!("Published message {} ({} bytes)", message_id, payload.len());
            report.sent += 1;

            let confirmed = buffer.confirm_front();
            if ids.commit(message_id.wrapping_add(1)).is_err() {
                report.id_commit_failures += 1;
            }
            if let Err(e) = confirmed {
                error!(
                    "Message {} was published but could not be removed from the buffer: {}",
                    message_id, e
                );
                report.failed = true;
                break;
            }
        }

        if report.sent > 0 {
            info!(
                "Delivered {} readings, {} still pending",
                report.sent,
                buffer.pending_count()
            );
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::{DEFAULT_COUNTER_CEILING, PersistentCounter};
    use crate::storage::{BufferError, MemoryCell, MemoryStore, ScalarCell};
    use crate::testing::RecordingTransport;
    use alloc::string::String;
    use embassy_futures::block_on;

    fn reading(i: u64) -> Reading {
        Reading::new(Some(20.0), Some(45.0), Some(12.0), 1000 + i)
    }

    fn buffer_with<const N: usize>(count: u64) -> TieredBuffer<MemoryStore, N> {
        let mut buffer = TieredBuffer::open(MemoryStore::new()).unwrap();
        for i in 0..count {
            buffer.push(reading(i)).unwrap();
        }
        buffer
    }

    fn counter() -> PersistentCounter<MemoryCell> {
        PersistentCounter::load(MemoryCell::new(), 0, DEFAULT_COUNTER_CEILING)
    }

    fn timestamp_of(payload: &[u8]) -> u64 {
        let text = core::str::from_utf8(payload).unwrap();
        let start = text.find("\"timestamp\":").unwrap() + "\"timestamp\":".len();
        text[start..text.len() - 1].parse().unwrap()
    }

    #[test]
    fn test_format_field_order_and_precision() {
        let pipeline = DeliveryPipeline::new("node-01", "devices/node-01/events");
        let reading = Reading::new(Some(21.46), Some(40.0), Some(20.94), 1_700_000_000);

        let payload = pipeline.format(&reading, 7).unwrap();

        assert_eq!(
            String::from_utf8(payload).unwrap(),
            r#"{"messageId":7,"deviceId":"node-01","temperature":21.5,"humidity":40.0,"oxygen":20.9,"timestamp":1700000000}"#
        );
    }

    #[test]
    fn test_format_renders_missing_fields_as_null() {
        let pipeline = DeliveryPipeline::new("node-01", "t");
        let reading = Reading::new(None, Some(-3.25), None, 5);

        let payload = pipeline.format(&reading, 0).unwrap();

        assert_eq!(
            String::from_utf8(payload).unwrap(),
            r#"{"messageId":0,"deviceId":"node-01","temperature":null,"humidity":-3.3,"oxygen":null,"timestamp":5}"#
        );
    }

    #[test]
    fn test_drain_publishes_everything_in_order() {
        let pipeline = DeliveryPipeline::new("dev", "topic");
        let mut buffer = buffer_with::<50>(60);
        let mut transport = RecordingTransport::new();
        let mut ids = counter();

        let report = block_on(pipeline.drain(&mut buffer, &mut transport, &mut ids));

        assert_eq!(report, DeliveryReport { sent: 60, failed: false, id_commit_failures: 0 });
        assert_eq!(buffer.pending_count(), 0);
        assert_eq!(transport.published.len(), 60);
        for (i, (topic, payload)) in transport.published.iter().enumerate() {
            assert_eq!(topic, "topic");
            assert_eq!(timestamp_of(payload), 1000 + i as u64);
        }
        assert_eq!(ids.next(), 60);
    }

    #[test]
    fn test_publish_failure_halts_and_keeps_front() {
        let pipeline = DeliveryPipeline::new("dev", "topic");
        let mut buffer = buffer_with::<3>(5);
        let mut transport = RecordingTransport::new();
        transport.fail_after = Some(2);
        let mut ids = counter();

        let report = block_on(pipeline.drain(&mut buffer, &mut transport, &mut ids));

        assert_eq!(report.sent, 2);
        assert!(report.failed);
        assert_eq!(buffer.pending_count(), 3);
        assert_eq!(buffer.peek_front().unwrap(), Some(reading(2)));
        assert_eq!(ids.next(), 2);

        transport.fail_after = None;
        let report = block_on(pipeline.drain(&mut buffer, &mut transport, &mut ids));

        assert_eq!(report.sent, 3);
        assert_eq!(timestamp_of(&transport.published[2].1), 1002);
        assert_eq!(buffer.pending_count(), 0);
    }

    #[test]
    fn test_ram_failure_blocks_overflow_in_same_cycle() {
        let pipeline = DeliveryPipeline::new("dev", "topic");
        let mut buffer = buffer_with::<2>(4);
        let mut transport = RecordingTransport::new();
        transport.fail_after = Some(1);
        let mut ids = counter();

        block_on(pipeline.drain(&mut buffer, &mut transport, &mut ids));

        assert_eq!(buffer.ram_len(), 1);
        assert_eq!(buffer.overflow_len(), 2);
    }

    #[test]
    fn test_disconnected_transport_sends_nothing() {
        let pipeline = DeliveryPipeline::new("dev", "topic");
        let mut buffer = buffer_with::<4>(2);
        let mut transport = RecordingTransport::new();
        transport.online = false;
        let mut ids = counter();

        let report = block_on(pipeline.drain(&mut buffer, &mut transport, &mut ids));

        assert_eq!(report, DeliveryReport::default());
        assert_eq!(buffer.pending_count(), 2);
    }

    #[test]
    fn test_counter_write_failure_does_not_halt_drain() {
        let pipeline = DeliveryPipeline::new("dev", "topic");
        let mut buffer = buffer_with::<4>(3);
        let mut transport = RecordingTransport::new();
        let mut cell = MemoryCell::new();
        cell.set_reject_writes(true);
        let mut ids = PersistentCounter::load(cell, 0, DEFAULT_COUNTER_CEILING);

        let report = block_on(pipeline.drain(&mut buffer, &mut transport, &mut ids));

        assert_eq!(report.sent, 3);
        assert_eq!(report.id_commit_failures, 3);
        assert!(!report.failed);
        assert_eq!(ids.next(), 3);
    }

    #[test]
    fn test_counter_wrap_during_drain() {
        let pipeline = DeliveryPipeline::new("dev", "topic");
        let mut buffer = buffer_with::<4>(2);
        let mut transport = RecordingTransport::new();
        let mut cell = MemoryCell::new();
        cell.write_int(0, 999_999).unwrap();
        let mut ids = PersistentCounter::load(cell, 0, 1_000_000);

        block_on(pipeline.drain(&mut buffer, &mut transport, &mut ids));

        let first = core::str::from_utf8(&transport.published[0].1).unwrap();
        let second = core::str::from_utf8(&transport.published[1].1).unwrap();
        assert!(first.starts_with(r#"{"messageId":999999,"#));
        assert!(second.starts_with(r#"{"messageId":0,"#));
        let mut cell = ids.into_cell();
        assert_eq!(cell.read_int(0).unwrap(), 1);
    }

    #[test]
    fn test_unreadable_overflow_front_halts_without_publishing() {
        let pipeline = DeliveryPipeline::new("dev", "topic");
        // Reopen so both readings sit in overflow and nothing is left in RAM
        let mut buffer: TieredBuffer<MemoryStore, 1> =
            TieredBuffer::open(buffer_with::<1>(3).into_store()).unwrap();
        assert_eq!(buffer.ram_len(), 0);
        buffer.store_mut().set_reject_reads(true);
        let mut transport = RecordingTransport::new();
        let mut ids = counter();

        let report = block_on(pipeline.drain(&mut buffer, &mut transport, &mut ids));

        assert_eq!(report, DeliveryReport { sent: 0, failed: true, id_commit_failures: 0 });
        assert_eq!(buffer.pending_count(), 2);
        assert!(transport.published.is_empty());
        assert_eq!(buffer.confirm_front(), Err(BufferError::NotFound));
        assert_eq!(ids.next(), 0);

        buffer.store_mut().set_reject_reads(false);
        let report = block_on(pipeline.drain(&mut buffer, &mut transport, &mut ids));

        assert_eq!(report.sent, 2);
        assert_eq!(timestamp_of(&transport.published[0].1), 1001);
        assert_eq!(buffer.pending_count(), 0);
    }

    #[test]
    fn test_failed_removal_republishes_same_reading_next_cycle() {
        let pipeline = DeliveryPipeline::new("dev", "topic");
        let mut buffer = buffer_with::<1>(2);
        buffer.store_mut().set_reject_deletes(true);
        let mut transport = RecordingTransport::new();
        let mut ids = counter();

        let report = block_on(pipeline.drain(&mut buffer, &mut transport, &mut ids));

        // RAM reading confirmed, overflow reading published but kept
        assert_eq!(report.sent, 2);
        assert!(report.failed);
        assert_eq!(buffer.pending_count(), 1);
        assert_eq!(buffer.store().len(), 1);

        buffer.store_mut().set_reject_deletes(false);
        let report = block_on(pipeline.drain(&mut buffer, &mut transport, &mut ids));

        assert_eq!(report, DeliveryReport { sent: 1, failed: false, id_commit_failures: 0 });
        assert_eq!(transport.published.len(), 3);
        assert_eq!(timestamp_of(&transport.published[1].1), 1001);
        assert_eq!(timestamp_of(&transport.published[2].1), 1001);
        assert!(buffer.store().is_empty());
    }
}

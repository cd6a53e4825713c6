//! Running counters for the agent's recoverable failures

use core::fmt::Display;

use crate::delivery::DeliveryReport;

/// Cumulative counters since boot. Nothing here is persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentMetrics {
    pub readings_sampled: u32,
    /// Readings lost because the overflow store refused them
    pub readings_dropped: u32,
    /// Individual fields recorded as null
    pub sensor_failures: u32,
    pub messages_sent: u32,
    pub publish_failures: u32,
    pub counter_write_failures: u32,
    pub corrupt_records_skipped: u32,
    pub connect_attempts: u32,
}

impl AgentMetrics {
    pub fn record_delivery(&mut self, report: &DeliveryReport) {
        self.messages_sent = self.messages_sent.saturating_add(report.sent);
        self.counter_write_failures = self
            .counter_write_failures
            .saturating_add(report.id_commit_failures);
        if report.failed {
            self.publish_failures = self.publish_failures.saturating_add(1);
        }
    }
}

impl Display for AgentMetrics {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "[Metrics] sampled: {}, dropped: {}, null fields: {}, sent: {}, publish failures: {}, id write failures: {}, corrupt records: {}, connect attempts: {}",
            self.readings_sampled,
            self.readings_dropped,
            self.sensor_failures,
            self.messages_sent,
            self.publish_failures,
            self.counter_write_failures,
            self.corrupt_records_skipped,
            self.connect_attempts
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_delivery_accumulates() {
        let mut metrics = AgentMetrics::default();

        metrics.record_delivery(&DeliveryReport {
            sent: 3,
            failed: true,
            id_commit_failures: 1,
        });
        metrics.record_delivery(&DeliveryReport {
            sent: 2,
            failed: false,
            id_commit_failures: 0,
        });

        assert_eq!(metrics.messages_sent, 5);
        assert_eq!(metrics.publish_failures, 1);
        assert_eq!(metrics.counter_write_failures, 1);
    }
}

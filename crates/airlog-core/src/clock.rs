//! Timestamp estimation across connectivity regimes

use embassy_time::Duration;
use log::info;

/// Spacing of synthetic timestamps while offline
pub const DEFAULT_OFFLINE_INCREMENT: Duration = Duration::from_secs(30);

/// A successful wall-clock synchronization, anchored to device uptime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSync {
    /// Seconds since the Unix epoch reported by the time server
    pub epoch_secs: u64,
    /// Device uptime in seconds when the synchronization happened
    pub at_uptime: u64,
}

impl ClockSync {
    /// Wall-clock time at `uptime`, extrapolated from the anchor
    pub const fn now(&self, uptime: u64) -> u64 {
        self.epoch_secs
            .saturating_add(uptime.saturating_sub(self.at_uptime))
    }
}

/// Produces the timestamp stored with each reading.
///
/// Three regimes:
///
/// - **Synchronized and online**: current wall-clock time.
/// - **Synchronized, offline**: the last known time for the first offline
///   reading, then evenly spaced synthetic times `last + increment`.
/// - **Never synchronized**: seconds since boot. These values restart at zero
///   on every boot and are not comparable across restarts or with epoch
///   timestamps; consumers of stored data must treat small values as uptime.
#[derive(Debug, Clone)]
pub struct ClockEstimator {
    anchor: Option<ClockSync>,
    /// Last wall-clock time observed while online
    last_known: u64,
    /// Last timestamp handed out
    last_stored: u64,
    /// Set once an offline reading has been stamped since the last online one
    offline_streak: bool,
    offline_increment: u64,
}

impl ClockEstimator {
    pub const fn new(offline_increment: Duration) -> Self {
        Self {
            anchor: None,
            last_known: 0,
            last_stored: 0,
            offline_streak: false,
            offline_increment: offline_increment.as_secs(),
        }
    }

    /// Install a new synchronization anchor. Repeating the current anchor is a no-op.
    pub fn synchronize(&mut self, sync: ClockSync) {
        if self.anchor == Some(sync) {
            return;
        }

        info!(
            "Clock synchronized to {} at uptime {}s",
            sync.epoch_secs, sync.at_uptime
        );
        self.anchor = Some(sync);
        self.last_known = sync.epoch_secs;
        self.last_stored = sync.epoch_secs;
        self.offline_streak = false;
    }

    pub const fn is_synchronized(&self) -> bool {
        self.anchor.is_some()
    }

    pub const fn last_known_time(&self) -> u64 {
        self.last_known
    }

    /// Timestamp for a reading taken now.
    ///
    /// `online` is whether the agent is currently connected with a synchronized
    /// clock; `uptime` is seconds since boot.
    pub fn timestamp_for(&mut self, online: bool, uptime: u64) -> u64 {
        let Some(anchor) = self.anchor else {
            return uptime;
        };

        if online {
            let now = anchor.now(uptime);
            self.last_known = now;
            self.last_stored = now;
            self.offline_streak = false;
            return now;
        }

        if !self.offline_streak {
            self.offline_streak = true;
            self.last_stored = self.last_known;
            return self.last_known;
        }

        self.last_stored = self.last_stored.saturating_add(self.offline_increment);
        self.last_stored
    }
}

impl Default for ClockEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_OFFLINE_INCREMENT)
    }
}

//! Agent configuration, loaded before the agent starts and fixed afterwards

use embassy_time::Duration;
use serde::{Deserialize, Serialize};

use crate::clock::DEFAULT_OFFLINE_INCREMENT;
use crate::connectivity::{DEFAULT_BACKOFF, DEFAULT_STEP_TIMEOUT, DEFAULT_TOKEN_LIFETIME};
use crate::counter::DEFAULT_COUNTER_CEILING;

/// Default interval between sensor samples
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_secs(30);

/// Tuning of the buffering and delivery engine.
///
/// The RAM tier size is the `N` const generic of [`crate::agent::Agent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentConfig {
    /// Message ids wrap to zero on reaching this value
    pub counter_ceiling: u32,
    /// Scalar cell address holding the message id
    pub counter_address: u32,
    pub backoff: Duration,
    pub step_timeout: Duration,
    pub token_lifetime: Duration,
    pub offline_increment: Duration,
    pub send_interval: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            counter_ceiling: DEFAULT_COUNTER_CEILING,
            counter_address: 0,
            backoff: DEFAULT_BACKOFF,
            step_timeout: DEFAULT_STEP_TIMEOUT,
            token_lifetime: DEFAULT_TOKEN_LIFETIME,
            offline_increment: DEFAULT_OFFLINE_INCREMENT,
            send_interval: DEFAULT_SEND_INTERVAL,
        }
    }
}

/// Identity and network settings of one device
#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(bound(deserialize = "'de: 'a"))]
pub struct DeviceConfig<'a> {
    pub device_id: &'a str,
    /// Topic readings are published to
    pub topic: &'a str,
    /// Remote collector address, e.g. `mqtt.example.com:8883`
    pub endpoint: &'a str,
    pub internet: InternetConfig<'a>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct InternetConfig<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}

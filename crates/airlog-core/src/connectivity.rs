//! Connectivity state machine gating delivery
//!
//! Reaching the collector takes four ordered steps: bring the link up,
//! synchronize the wall clock, regenerate session credentials and open the
//! transport. [`ConnectivitySupervisor::tick`] runs the whole sequence as one
//! all-or-nothing attempt, rate limited by a fixed backoff. No failure is
//! fatal; the next eligible tick simply tries again.

use core::fmt::{Debug, Display, Formatter, Result as FmtResult};

use embassy_time::Duration;
use log::{info, warn};
use thiserror_no_std::Error;

use crate::clock::ClockSync;
use crate::delivery::Transport;

/// Minimum spacing between connection attempts
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(30);

/// Budget handed to each blocking step
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifetime of regenerated session credentials
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    LinkUp,
    TimeSynced,
    SessionReady,
    Connected,
}

/// One step of the connection sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Link,
    ClockSync,
    Session,
    Transport,
}

impl Stage {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::ClockSync => "clock sync",
            Self::Session => "session",
            Self::Transport => "transport",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.label())
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{stage} step failed")]
pub struct ConnectivityError {
    pub stage: Stage,
}

/// Network bring-up steps, implemented by the radio/MQTT glue.
///
/// Each step must give up within the timeout it is handed.
pub trait Uplink {
    type Error: Debug;

    /// Associate with the access point and obtain an address
    fn establish_link(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), Self::Error>>;

    /// Query a time server, returning seconds since the Unix epoch
    fn synchronize_clock(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<u64, Self::Error>>;

    /// Build fresh credentials valid from `epoch_secs` for `lifetime`
    fn prepare_session(
        &mut self,
        epoch_secs: u64,
        lifetime: Duration,
    ) -> impl Future<Output = Result<(), Self::Error>>;

    /// Connect the publish transport using the prepared credentials
    fn open_transport(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), Self::Error>>;
}

pub struct ConnectivitySupervisor {
    state: ConnectionState,
    /// Uptime of the last attempt; `None` until the first one
    last_attempt: Option<u64>,
    backoff: Duration,
    step_timeout: Duration,
    token_lifetime: Duration,
    /// Uptime at which the current session credentials expire
    session_expires_at: Option<u64>,
    last_sync: Option<ClockSync>,
    attempts: u32,
}

impl ConnectivitySupervisor {
    pub const fn new(backoff: Duration, step_timeout: Duration, token_lifetime: Duration) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            last_attempt: None,
            backoff,
            step_timeout,
            token_lifetime,
            session_expires_at: None,
            last_sync: None,
            attempts: 0,
        }
    }

    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether delivery may run
    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub const fn last_attempt(&self) -> Option<u64> {
        self.last_attempt
    }

    /// Connection attempts made since start
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Most recent successful clock synchronization
    pub const fn last_clock_sync(&self) -> Option<ClockSync> {
        self.last_sync
    }

    /// Advance the state machine at uptime `now` (seconds), returning readiness.
    ///
    /// While connected this only checks the transport is still up and the
    /// session has not expired; losing either drops back to `Disconnected`.
    /// Otherwise at most one full connection attempt is made, and only once
    /// the backoff since the previous attempt has elapsed.
    pub async fn tick<U>(&mut self, now: u64, uplink: &mut U) -> bool
    where
        U: Uplink + Transport,
    {
        if self.state == ConnectionState::Connected {
            if !uplink.connected() {
                warn!("Transport dropped, reconnecting");
                self.state = ConnectionState::Disconnected;
            } else if self.session_expires_at.is_some_and(|expiry| now >= expiry) {
                info!("Session credentials expired, reconnecting");
                self.state = ConnectionState::Disconnected;
            } else {
                return true;
            }
        }

        if let Some(last) = self.last_attempt
            && now.saturating_sub(last) < self.backoff.as_secs()
        {
            return false;
        }

        self.last_attempt = Some(now);
        self.attempts = self.attempts.saturating_add(1);

        match self.connect(now, uplink).await {
            Ok(()) => {
                info!("Connected after {} attempts", self.attempts);
                true
            }
            Err(e) => {
                warn!("{}; next attempt in {}s", e, self.backoff.as_secs());
                self.state = ConnectionState::Disconnected;
                false
            }
        }
    }

    async fn connect<U>(&mut self, now: u64, uplink: &mut U) -> Result<(), ConnectivityError>
    where
        U: Uplink + Transport,
    {
        self.state = ConnectionState::Disconnected;
        self.session_expires_at = None;
        info!("Connecting (attempt {})", self.attempts);

        uplink
            .establish_link(self.step_timeout)
            .await
            .map_err(|e| step_failed(Stage::Link, e))?;
        self.state = ConnectionState::LinkUp;

        let epoch_secs = uplink
            .synchronize_clock(self.step_timeout)
            .await
            .map_err(|e| step_failed(Stage::ClockSync, e))?;
        self.last_sync = Some(ClockSync {
            epoch_secs,
            at_uptime: now,
        });
        self.state = ConnectionState::TimeSynced;

        // Credentials are regenerated on every attempt, never reused across reconnects
        uplink
            .prepare_session(epoch_secs, self.token_lifetime)
            .await
            .map_err(|e| step_failed(Stage::Session, e))?;
        self.session_expires_at = Some(now.saturating_add(self.token_lifetime.as_secs()));
        self.state = ConnectionState::SessionReady;

        uplink
            .open_transport(self.step_timeout)
            .await
            .map_err(|e| step_failed(Stage::Transport, e))?;
        self.state = ConnectionState::Connected;

        Ok(())
    }
}

impl Default for ConnectivitySupervisor {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF, DEFAULT_STEP_TIMEOUT, DEFAULT_TOKEN_LIFETIME)
    }
}

fn step_failed<E: Debug>(stage: Stage, error: E) -> ConnectivityError {
    warn!("Connection {} step failed: {:?}", stage, error);
    ConnectivityError { stage }
}

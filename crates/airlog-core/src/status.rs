//! Device status reported to an indicator (LED, display badge)

/// Coarse agent status, shown only when it changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// No connection has been established yet
    Connecting,
    /// Connected and delivering
    Online,
    /// Was connected before; buffering until the link returns
    Offline,
    /// Readings or message ids could not be persisted this cycle
    Fault,
}

impl DeviceStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Connecting => "Connecting",
            Self::Online => "Online",
            Self::Offline => "Offline",
            Self::Fault => "Fault",
        }
    }
}

pub trait StatusIndicator {
    fn show(&mut self, status: DeviceStatus);
}

/// Indicator for headless builds
pub struct NoIndicator;

impl StatusIndicator for NoIndicator {
    fn show(&mut self, _status: DeviceStatus) {}
}

//! Restart-surviving message id

use log::{error, info, warn};
use thiserror_no_std::Error;

use crate::storage::ScalarCell;

/// The counter wraps to zero on reaching this value
pub const DEFAULT_COUNTER_CEILING: u32 = 1_000_000;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterError {
    #[error("failed to persist message id {value} at cell {address}")]
    WriteFailed { address: u32, value: u32 },
}

/// Source of outgoing message ids for the delivery pipeline
pub trait IdProvider {
    /// Id for the next message. Does not touch durable state.
    fn next(&self) -> u32;

    /// Record `value` as the id for the following message.
    fn commit(&mut self, value: u32) -> Result<(), CounterError>;
}

/// Monotonic message id persisted in a [`ScalarCell`].
///
/// The id is diagnostic only: it restarts at zero on reaching the ceiling and
/// is never used to deduplicate.
pub struct PersistentCounter<C: ScalarCell> {
    cell: C,
    address: u32,
    ceiling: u32,
    value: u32,
}

impl<C: ScalarCell> PersistentCounter<C> {
    /// Restore the last committed value from `cell`.
    ///
    /// Unreadable cells and values at or above the ceiling (such as erased
    /// flash) start the counter at zero.
    pub fn load(mut cell: C, address: u32, ceiling: u32) -> Self {
        let value = match cell.read_int(address) {
            Ok(v) if v < ceiling => v,
            Ok(v) => {
                warn!(
                    "Stored message id {:#x} is outside 0..{}, starting at 0",
                    v, ceiling
                );
                0
            }
            Err(e) => {
                warn!("Failed to read message id cell {}: {:?}", address, e);
                0
            }
        };

        info!("Message id restored at {}", value);

        Self {
            cell,
            address,
            ceiling,
            value,
        }
    }

    pub const fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Give the cell back, as a restart would
    pub fn into_cell(self) -> C {
        self.cell
    }
}

impl<C: ScalarCell> IdProvider for PersistentCounter<C> {
    fn next(&self) -> u32 {
        self.value
    }

    /// The in-memory value is updated even when the write fails, so ids stay
    /// unique for the rest of this session.
    fn commit(&mut self, value: u32) -> Result<(), CounterError> {
        let value = if value >= self.ceiling { 0 } else { value };
        self.value = value;

        self.cell.write_int(self.address, value).map_err(|e| {
            error!(
                "Failed to persist message id {} at cell {}: {:?}",
                value, self.address, e
            );
            CounterError::WriteFailed {
                address: self.address,
                value,
            }
        })
    }
}

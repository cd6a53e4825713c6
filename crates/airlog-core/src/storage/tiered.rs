//! Two-tier reading buffer: a fixed RAM ring backed by a durable overflow store
//!
//! ## Ordering
//!
//! Every reading held in RAM was pushed before every reading held in the
//! overflow store, and each tier is a strict FIFO. Pushes therefore only land
//! in RAM while the overflow tier is empty; once something has spilled, later
//! pushes append to the store until it drains. Draining consumes RAM first.
//!
//! ## Overflow keys
//!
//! Overflow records are keyed by a monotonic append counter, not by reading
//! timestamps, so duplicate or backwards timestamps cannot collide or reorder.
//! The live records always occupy `[overflow_head, overflow_next)`.
//!
//! ## Power loss
//!
//! The RAM tier is lost on power loss. The overflow tier is recovered by
//! [`TieredBuffer::open`], which rebuilds the head/next keys and the record
//! count from the store listing.

use heapless::Deque;
use log::{debug, error, info, warn};
use thiserror_no_std::Error;

use super::DurableStore;
use crate::reading::Reading;

/// Number of readings held in RAM before spilling to the overflow store
pub const DEFAULT_RAM_CAPACITY: usize = 50;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    #[error("overflow write failed, reading dropped")]
    OverflowWriteFailed,
    #[error("no peeked reading to confirm")]
    NotFound,
    #[error("overflow store {operation} failed for record {key:#010x}")]
    Store { operation: &'static str, key: u32 },
}

/// Where the last peeked reading came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Ram,
    Overflow(u32),
}

pub struct TieredBuffer<S: DurableStore, const N: usize = DEFAULT_RAM_CAPACITY> {
    ram: Deque<Reading, N>,
    store: S,
    /// Key of the oldest unread overflow record
    overflow_head: u32,
    /// Key the next spilled reading is written under
    overflow_next: u32,
    overflow_len: usize,
    /// Decoded overflow head, cached so repeated peeks after a failed publish
    /// don't re-read flash
    overflow_front: Option<(u32, Reading)>,
    peeked: Option<Tier>,
    corrupt_skipped: u32,
}

impl<S: DurableStore, const N: usize> TieredBuffer<S, N> {
    /// Open the buffer over `store`, recovering any overflow records left by
    /// a previous run.
    pub fn open(mut store: S) -> Result<Self, BufferError> {
        let mut keys = store.keys().map_err(|e| {
            error!("Failed to list overflow store: {:?}", e);
            BufferError::Store {
                operation: "list",
                key: 0,
            }
        })?;
        keys.sort_unstable();

        let (overflow_head, overflow_next) = match (keys.first(), keys.last()) {
            (Some(&first), Some(&last)) => (first, last.wrapping_add(1)),
            _ => (0, 0),
        };

        if !keys.is_empty() {
            info!(
                "Recovered {} overflow readings (records {:#010x}..{:#010x})",
                keys.len(),
                overflow_head,
                overflow_next
            );
        }

        Ok(Self {
            ram: Deque::new(),
            store,
            overflow_head,
            overflow_next,
            overflow_len: keys.len(),
            overflow_front: None,
            peeked: None,
            corrupt_skipped: 0,
        })
    }

    /// Append a reading behind everything already buffered.
    ///
    /// Fails with [`BufferError::OverflowWriteFailed`] only when the reading
    /// had to spill and the store refused it; the reading is then lost.
    pub fn push(&mut self, reading: Reading) -> Result<(), BufferError> {
        if self.overflow_len == 0 {
            match self.ram.push_back(reading) {
                Ok(()) => {
                    if self.ram.is_full() {
                        debug!("RAM tier full ({} readings), spilling from now on", N);
                    }
                    return Ok(());
                }
                Err(rejected) => return self.spill(rejected),
            }
        }

        self.spill(reading)
    }

    fn spill(&mut self, reading: Reading) -> Result<(), BufferError> {
        let key = self.overflow_next;

        let bytes = postcard::to_allocvec(&reading).map_err(|e| {
            error!("Failed to encode overflow reading: {:?}", e);
            BufferError::OverflowWriteFailed
        })?;

        self.store.put(key, &bytes).map_err(|e| {
            error!(
                "Overflow write for record {:#010x} failed, dropping reading: {:?}",
                key, e
            );
            BufferError::OverflowWriteFailed
        })?;

        self.overflow_next = key.wrapping_add(1);
        self.overflow_len += 1;
        Ok(())
    }

    /// The oldest unconfirmed reading, without removing it.
    ///
    /// Arms [`confirm_front`](Self::confirm_front) for the returned reading.
    pub fn peek_front(&mut self) -> Result<Option<Reading>, BufferError> {
        if let Some(reading) = self.ram.front() {
            self.peeked = Some(Tier::Ram);
            return Ok(Some(*reading));
        }

        match self.load_overflow_front() {
            Ok(Some((key, reading))) => {
                self.peeked = Some(Tier::Overflow(key));
                Ok(Some(reading))
            }
            Ok(None) => {
                self.peeked = None;
                Ok(None)
            }
            Err(e) => {
                self.peeked = None;
                Err(e)
            }
        }
    }

    fn load_overflow_front(&mut self) -> Result<Option<(u32, Reading)>, BufferError> {
        if let Some(front) = self.overflow_front {
            return Ok(Some(front));
        }

        while self.overflow_len > 0 && self.overflow_head != self.overflow_next {
            let key = self.overflow_head;
            let bytes = self.store.get(key).map_err(|e| {
                error!("Failed to read overflow record {:#010x}: {:?}", key, e);
                BufferError::Store {
                    operation: "read",
                    key,
                }
            })?;

            let Some(bytes) = bytes else {
                warn!("Overflow record {:#010x} is missing, skipping ahead", key);
                self.skip_to_next_stored_key(key)?;
                continue;
            };

            match postcard::from_bytes::<Reading>(&bytes) {
                Ok(reading) => {
                    self.overflow_front = Some((key, reading));
                    return Ok(Some((key, reading)));
                }
                Err(e) => {
                    error!(
                        "Overflow record {:#010x} is corrupt ({:?}), discarding",
                        key, e
                    );
                    self.remove_overflow_record(key)?;
                    self.corrupt_skipped = self.corrupt_skipped.saturating_add(1);
                }
            }
        }

        if self.overflow_len > 0 {
            warn!(
                "Overflow count says {} readings remain but none are stored, resetting",
                self.overflow_len
            );
            self.overflow_len = 0;
        }
        self.overflow_head = self.overflow_next;
        Ok(None)
    }

    /// Move the head past a gap in the key range to the next key actually stored
    fn skip_to_next_stored_key(&mut self, missing: u32) -> Result<(), BufferError> {
        let keys = self.store.keys().map_err(|e| {
            error!("Failed to list overflow store: {:?}", e);
            BufferError::Store {
                operation: "list",
                key: missing,
            }
        })?;

        self.overflow_head = keys
            .iter()
            .copied()
            .filter(|&k| k > missing && k < self.overflow_next)
            .min()
            .unwrap_or(self.overflow_next);
        Ok(())
    }

    fn remove_overflow_record(&mut self, key: u32) -> Result<(), BufferError> {
        self.store.delete(key).map_err(|e| {
            error!("Failed to delete overflow record {:#010x}: {:?}", key, e);
            BufferError::Store {
                operation: "delete",
                key,
            }
        })?;

        self.overflow_front = None;
        self.overflow_head = key.wrapping_add(1);
        self.overflow_len = self.overflow_len.saturating_sub(1);
        if self.overflow_len == 0 {
            self.overflow_head = self.overflow_next;
        }
        Ok(())
    }

    /// Remove the reading returned by the last [`peek_front`](Self::peek_front).
    ///
    /// Returns [`BufferError::NotFound`] without touching either tier if there
    /// is no outstanding peek. A failed overflow delete keeps the peek armed so
    /// the confirmation can be retried.
    pub fn confirm_front(&mut self) -> Result<(), BufferError> {
        match self.peeked.take() {
            None => Err(BufferError::NotFound),
            Some(Tier::Ram) => self
                .ram
                .pop_front()
                .map(|_| ())
                .ok_or(BufferError::NotFound),
            Some(Tier::Overflow(key)) => self.remove_overflow_record(key).inspect_err(|_| {
                self.peeked = Some(Tier::Overflow(key));
            }),
        }
    }

    /// Readings waiting for delivery across both tiers
    pub fn pending_count(&self) -> usize {
        self.ram.len() + self.overflow_len
    }

    pub fn ram_len(&self) -> usize {
        self.ram.len()
    }

    pub fn overflow_len(&self) -> usize {
        self.overflow_len
    }

    pub const fn ram_capacity(&self) -> usize {
        N
    }

    /// Corrupt overflow records discarded since the buffer was opened
    pub const fn corrupt_skipped(&self) -> u32 {
        self.corrupt_skipped
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Give the store back, discarding the RAM tier as a power loss would
    pub fn into_store(self) -> S {
        self.store
    }
}

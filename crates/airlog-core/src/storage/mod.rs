//! Durable storage abstractions and the tiered reading buffer
//!
//! The buffer spills into a [`DurableStore`] (flash filesystem, SD card) and
//! the message counter lives in a [`ScalarCell`] (non-volatile memory word).
//! Both are narrow on purpose: the device only needs whole-record writes and
//! single-word cells.

pub mod memory;
pub mod sd_card;
pub mod tiered;

pub use memory::*;
pub use tiered::*;

use alloc::vec::Vec;
use core::fmt::Debug;

/// Durable keyed record store backing the overflow tier.
///
/// Keys are issued by [`TieredBuffer`] from a monotonic append counter, so
/// ascending key order is insertion order.
pub trait DurableStore {
    type Error: Debug;

    /// Write a whole record, replacing any previous record under `key`
    fn put(&mut self, key: u32, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Read a record, `None` if no record exists under `key`
    fn get(&mut self, key: u32) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Remove a record. Removing a missing key is not an error.
    fn delete(&mut self, key: u32) -> Result<(), Self::Error>;

    /// Every stored key in ascending order
    fn keys(&mut self) -> Result<Vec<u32>, Self::Error>;
}

/// A word-sized non-volatile cell, addressed like an EEPROM/NVS slot
pub trait ScalarCell {
    type Error: Debug;

    fn read_int(&mut self, address: u32) -> Result<u32, Self::Error>;

    fn write_int(&mut self, address: u32, value: u32) -> Result<(), Self::Error>;
}

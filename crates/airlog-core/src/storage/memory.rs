//! RAM-backed implementations of the storage traits
//!
//! Used by host tests and anywhere a volatile stand-in for flash is wanted.
//! Both types can be told to reject writes, which is how storage-full and
//! worn-out-flash conditions are exercised.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use thiserror_no_std::Error;

use super::{DurableStore, ScalarCell};

/// Value an unwritten cell reads as, matching erased NOR flash
pub const ERASED_CELL: u32 = u32::MAX;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryStorageError {
    #[error("store is full ({0} records)")]
    Full(usize),
    #[error("write rejected")]
    WriteRejected,
    #[error("read rejected")]
    ReadRejected,
    #[error("delete rejected")]
    DeleteRejected,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: BTreeMap<u32, Vec<u8>>,
    max_records: Option<usize>,
    reject_writes: bool,
    reject_reads: bool,
    reject_deletes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that refuses new records once `max_records` are held
    pub fn with_max_records(max_records: usize) -> Self {
        Self {
            max_records: Some(max_records),
            ..Self::default()
        }
    }

    pub fn set_reject_writes(&mut self, reject: bool) {
        self.reject_writes = reject;
    }

    /// Fail every `get`, as an unreadable flash sector would
    pub fn set_reject_reads(&mut self, reject: bool) {
        self.reject_reads = reject;
    }

    pub fn set_reject_deletes(&mut self, reject: bool) {
        self.reject_deletes = reject;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Overwrite a record bypassing every limit, for simulating corruption
    pub fn insert_raw(&mut self, key: u32, bytes: &[u8]) {
        self.records.insert(key, bytes.to_vec());
    }
}

impl DurableStore for MemoryStore {
    type Error = MemoryStorageError;

    fn put(&mut self, key: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        if self.reject_writes {
            return Err(MemoryStorageError::WriteRejected);
        }
        if let Some(max) = self.max_records
            && self.records.len() >= max
            && !self.records.contains_key(&key)
        {
            return Err(MemoryStorageError::Full(max));
        }

        self.records.insert(key, bytes.to_vec());
        Ok(())
    }

    fn get(&mut self, key: u32) -> Result<Option<Vec<u8>>, Self::Error> {
        if self.reject_reads {
            return Err(MemoryStorageError::ReadRejected);
        }
        Ok(self.records.get(&key).cloned())
    }

    fn delete(&mut self, key: u32) -> Result<(), Self::Error> {
        if self.reject_deletes {
            return Err(MemoryStorageError::DeleteRejected);
        }
        self.records.remove(&key);
        Ok(())
    }

    fn keys(&mut self) -> Result<Vec<u32>, Self::Error> {
        Ok(self.records.keys().copied().collect())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCell {
    words: BTreeMap<u32, u32>,
    reject_writes: bool,
}

impl MemoryCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reject_writes(&mut self, reject: bool) {
        self.reject_writes = reject;
    }
}

impl ScalarCell for MemoryCell {
    type Error = MemoryStorageError;

    fn read_int(&mut self, address: u32) -> Result<u32, Self::Error> {
        Ok(self.words.get(&address).copied().unwrap_or(ERASED_CELL))
    }

    fn write_int(&mut self, address: u32, value: u32) -> Result<(), Self::Error> {
        if self.reject_writes {
            return Err(MemoryStorageError::WriteRejected);
        }
        self.words.insert(address, value);
        Ok(())
    }
}

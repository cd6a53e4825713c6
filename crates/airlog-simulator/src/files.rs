//! File-backed storage standing in for the device's flash filesystem and NVS

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use airlog_core::storage::{DurableStore, ERASED_CELL, ScalarCell};

const RECORD_EXTENSION: &str = "RDG";

/// One file per overflow record, named by its 8-digit hex key
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn record_path(&self, key: u32) -> PathBuf {
        self.dir.join(format!("{key:08X}.{RECORD_EXTENSION}"))
    }
}

fn parse_record_key(path: &Path) -> Option<u32> {
    if path.extension()?.to_str()? != RECORD_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.len() != 8 {
        return None;
    }
    u32::from_str_radix(stem, 16).ok()
}

impl DurableStore for FileStore {
    type Error = io::Error;

    fn put(&mut self, key: u32, bytes: &[u8]) -> io::Result<()> {
        // Renamed into place only once fully written
        let tmp = self.dir.join(format!("{key:08X}.tmp"));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, self.record_path(key))
    }

    fn get(&mut self, key: u32) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.record_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn delete(&mut self, key: u32) -> io::Result<()> {
        match fs::remove_file(self.record_path(key)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    fn keys(&mut self) -> io::Result<Vec<u32>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            if let Some(key) = parse_record_key(&entry?.path()) {
                keys.push(key);
            }
        }
        keys.sort_unstable();
        Ok(keys)
    }
}

/// A file of little-endian words; unwritten words read as erased
pub struct FileCell {
    path: PathBuf,
}

impl FileCell {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    fn load(&self) -> io::Result<Vec<u8>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

impl ScalarCell for FileCell {
    type Error = io::Error;

    fn read_int(&mut self, address: u32) -> io::Result<u32> {
        let bytes = self.load()?;
        let offset = address as usize * 4;
        Ok(bytes
            .get(offset..offset + 4)
            .and_then(|word| word.try_into().ok())
            .map_or(ERASED_CELL, u32::from_le_bytes))
    }

    fn write_int(&mut self, address: u32, value: u32) -> io::Result<()> {
        let mut bytes = self.load()?;
        let offset = address as usize * 4;
        if bytes.len() < offset + 4 {
            bytes.resize(offset + 4, 0xFF);
        }
        bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)
    }
}

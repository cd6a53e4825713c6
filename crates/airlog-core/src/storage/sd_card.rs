use alloc::vec;
use alloc::vec::Vec;
use core::fmt::Write;

use embedded_sdmmc::{Mode, SdCard, SdCardError, TimeSource, VolumeIdx, VolumeManager};
use heapless::String;

use super::DurableStore;

/// Extension of every overflow record file
const RECORD_EXTENSION: &str = "RDG";

/// Upper bound on a single record; anything larger is not one of ours
const MAX_RECORD_BYTES: u32 = 64;

type SdError = embedded_sdmmc::Error<SdCardError>;

/// 8.3 name for a record key, e.g. `0000002A.RDG`
fn record_name(key: u32) -> String<12> {
    let mut name = String::new();
    // 8 hex digits + '.' + 3 extension chars always fits
    let _ = write!(name, "{:08X}.{}", key, RECORD_EXTENSION);
    name
}

fn parse_record_key(base: &[u8], extension: &[u8]) -> Option<u32> {
    if extension != RECORD_EXTENSION.as_bytes() || base.len() != 8 {
        return None;
    }
    let digits = core::str::from_utf8(base).ok()?;
    u32::from_str_radix(digits, 16).ok()
}

/// Overflow store keeping one small file per record in the SD card root.
///
/// These SD card operations are blocking, like everything else on the control
/// loop. Each call opens and closes the volume so a power cut never leaves a
/// file handle open.
pub struct SdCardStore<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    volume_mgr: VolumeManager<SdCard<S, D>, T, 4, 4, 1>,
}

impl<S, D, T> SdCardStore<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    pub fn new(sd_card: SdCard<S, D>, ts: T) -> Self {
        let volume_mgr = VolumeManager::new(sd_card, ts);

        Self { volume_mgr }
    }
}

impl<S, D, T> DurableStore for SdCardStore<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    type Error = SdError;

    fn put(&mut self, key: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let name = record_name(key);

        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;
        let file = root_dir.open_file_in_dir(name.as_str(), Mode::ReadWriteCreateOrTruncate)?;

        file.write(bytes)?;

        // Explicitly close them to handle errors
        file.close()?;
        root_dir.close()?;
        volume0.close()?;

        Ok(())
    }

    fn get(&mut self, key: u32) -> Result<Option<Vec<u8>>, Self::Error> {
        let name = record_name(key);

        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;
        let file = match root_dir.open_file_in_dir(name.as_str(), Mode::ReadOnly) {
            Ok(file) => file,
            Err(embedded_sdmmc::Error::NotFound) => return Ok(None),
            Err(e) => return Err(e),
        };

        let length = file.length().min(MAX_RECORD_BYTES) as usize;
        let mut buffer = vec![0u8; length];
        let mut filled = 0;
        while filled < length {
            let bytes_read = file.read(&mut buffer[filled..])?;
            if bytes_read == 0 {
                break; // EOF
            }
            filled += bytes_read;
        }
        buffer.truncate(filled);

        file.close()?;
        root_dir.close()?;
        volume0.close()?;

        Ok(Some(buffer))
    }

    fn delete(&mut self, key: u32) -> Result<(), Self::Error> {
        let name = record_name(key);

        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;

        match root_dir.delete_file_in_dir(name.as_str()) {
            Ok(()) | Err(embedded_sdmmc::Error::NotFound) => {}
            Err(e) => return Err(e),
        }

        root_dir.close()?;
        volume0.close()?;

        Ok(())
    }

    fn keys(&mut self) -> Result<Vec<u32>, Self::Error> {
        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;

        // Directory order is allocation order, not key order
        let mut keys = Vec::new();
        root_dir.iterate_dir(|entry| {
            if entry.attributes.is_directory() {
                return;
            }
            if let Some(key) = parse_record_key(entry.name.base_name(), entry.name.extension()) {
                keys.push(key);
            }
        })?;

        root_dir.close()?;
        volume0.close()?;

        keys.sort_unstable();
        Ok(keys)
    }
}

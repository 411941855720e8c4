// Storage over a FAT volume (embedded-sdmmc)
// Volume 0 only. Path components must be valid 8.3 names.
// No RTC assumed; timestamps are fixed to 2025-01-01.

use embedded_sdmmc::{BlockDevice, Error, Mode, SdCard, TimeSource, Timestamp, VolumeIdx, VolumeManager};
use log::info;

use super::storage::{Storage, StorageError, split_path};

#[derive(Default, Clone, Copy)]
pub struct DummyTimeSource;

impl TimeSource for DummyTimeSource {
    fn get_timestamp(&self) -> Timestamp {
        Timestamp {
            year_since_1970: 55,
            zero_indexed_month: 0,
            zero_indexed_day: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }
}

pub struct SdStorage<D, T = DummyTimeSource>
where
    D: BlockDevice,
    T: TimeSource,
{
    pub volume_mgr: VolumeManager<D, T>,
}

impl<D: BlockDevice> SdStorage<D, DummyTimeSource> {
    pub fn new(device: D) -> Self {
        Self::with_time_source(device, DummyTimeSource)
    }
}

impl<SPI, DELAY> SdStorage<SdCard<SPI, DELAY>, DummyTimeSource>
where
    SPI: embedded_hal::spi::SpiDevice,
    DELAY: embedded_hal::delay::DelayNs,
{
    /// SD card on an SPI bus.
    pub fn from_spi(spi: SPI, delay: DELAY) -> Self {
        Self::new(SdCard::new(spi, delay))
    }
}

impl<D, T> SdStorage<D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    pub fn with_time_source(device: D, time_source: T) -> Self {
        match device.num_blocks() {
            Ok(blocks) => info!(
                "sd: {} blocks ({} MB)",
                blocks.0,
                blocks.0 as u64 * 512 / 1024 / 1024
            ),
            Err(e) => info!("sd: probe failed: {:?}", e),
        }
        Self {
            volume_mgr: VolumeManager::new(device, time_source),
        }
    }
}

fn open_err<E: core::fmt::Debug>(e: Error<E>) -> StorageError {
    match e {
        Error::NotFound | Error::FilenameError(_) => StorageError::NotFound,
        other => {
            log::warn!("sd: open failed: {:?}", other);
            StorageError::Read
        }
    }
}

// walk the path from the root dir, open its last component read-only
macro_rules! with_file {
    ($sd:expr, $path:expr, |$file:ident| $body:expr) => {{
        let mut parts = split_path($path).ok_or(StorageError::NotFound)?;
        let volume = $sd.volume_mgr.open_volume(VolumeIdx(0)).map_err(|e| {
            log::error!("sd: open volume failed: {:?}", e);
            StorageError::Read
        })?;
        let mut dir = volume.open_root_dir().map_err(open_err)?;
        let mut name = parts.next().ok_or(StorageError::NotFound)?;
        for next in parts {
            dir.change_dir(name).map_err(open_err)?;
            name = next;
        }
        let $file = dir.open_file_in_dir(name, Mode::ReadOnly).map_err(open_err)?;
        $body
    }};
}

impl<D, T> Storage for SdStorage<D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    fn file_size(&self, path: &str) -> Result<u32, StorageError> {
        with_file!(self, path, |file| Ok(file.length()))
    }

    fn read_chunk(&self, path: &str, offset: u32, buf: &mut [u8]) -> Result<usize, StorageError> {
        with_file!(self, path, |file| {
            file.seek_from_start(offset).map_err(|_| StorageError::Read)?;
            let mut total = 0;
            while !file.is_eof() && total < buf.len() {
                let n = file.read(&mut buf[total..]).map_err(|e| {
                    log::error!("sd: read {} failed: {:?}", path, e);
                    StorageError::Read
                })?;
                if n == 0 {
                    break;
                }
                total += n;
            }
            Ok(total)
        })
    }
}

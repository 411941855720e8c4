// Storage drivers: the file source a load reads from.
//
// storage: Storage trait, chunked read helper, in-memory backend
// sdcard:  FAT volume over any embedded-sdmmc block device

pub mod sdcard;
pub mod storage;

pub use sdcard::{DummyTimeSource, SdStorage};
pub use storage::{RamStorage, Storage, StorageError, read_file};
